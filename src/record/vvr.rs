#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    decode::{Decodable, Decoder},
    encode::{Encodable, Encoder},
    error::CdfError,
    record::RecordKind,
};
use std::io;

/// A Variable Values Record holds a contiguous run of uncompressed variable
/// records. Which records, and how each one is laid out, is known only to
/// the descriptor and index records pointing here.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug)]
pub struct Vvr {
    /// The raw record bytes, still in the file's data encoding.
    pub data: Vec<u8>,
}

impl Vvr {
    const KIND: &'static str = "VVR";
}

impl Decodable for Vvr {
    fn decode_be<R>(decoder: &mut Decoder<R>) -> Result<Self, CdfError>
    where
        R: io::Read + io::Seek,
    {
        let start = decoder.position()?;
        let record_size = i64::decode_be(decoder)?;
        let record_type = i32::decode_be(decoder)?;
        if record_type != RecordKind::Vvr as i32 {
            return Err(CdfError::bad_record(
                start,
                Vvr::KIND,
                format!("record type {record_type}, expected 7"),
            ));
        }

        let payload = u64::try_from(record_size)?.checked_sub(12).ok_or_else(|| {
            CdfError::bad_record(start, Vvr::KIND, format!("record size {record_size}"))
        })?;
        let data = decoder.read_bytes(usize::try_from(payload)?)?;

        decoder.finish_record(start, record_size, Vvr::KIND)?;
        Ok(Vvr { data })
    }
}

impl Encodable for Vvr {
    fn encoded_size(&self) -> u64 {
        12 + self.data.len() as u64
    }

    fn encode_be(&self, encoder: &mut Encoder) -> Result<(), CdfError> {
        let start = encoder.position();
        encoder.put_i64(self.encoded_size() as i64);
        encoder.put_i32(RecordKind::Vvr as i32);
        encoder.put_bytes(&self.data);
        encoder.finish_record(start, self.encoded_size(), Vvr::KIND)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::LoadOptions;

    #[test]
    fn test_vvr_roundtrip() -> Result<(), CdfError> {
        let vvr = Vvr {
            data: (0u8..64).collect(),
        };
        let mut encoder = Encoder::new();
        vvr.encode_be(&mut encoder)?;
        let bytes = encoder.into_bytes();
        assert_eq!(bytes.len(), 76);

        let mut decoder = Decoder::new(io::Cursor::new(bytes), LoadOptions::default());
        let decoded = Vvr::decode_be(&mut decoder)?;
        assert_eq!(decoded.data, (0u8..64).collect::<Vec<u8>>());
        Ok(())
    }
}

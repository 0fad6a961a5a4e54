#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    decode::{Decodable, Decoder},
    encode::{Encodable, Encoder},
    error::CdfError,
    record::RecordKind,
};
use std::io;

/// A Compressed Variable Values Record holds one compressed run of variable
/// records. The algorithm is named by the CPR the owning descriptor points at.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug)]
pub struct Cvvr {
    /// The compressed payload.
    pub data: Vec<u8>,
}

impl Cvvr {
    const KIND: &'static str = "CVVR";
}

impl Decodable for Cvvr {
    fn decode_be<R>(decoder: &mut Decoder<R>) -> Result<Self, CdfError>
    where
        R: io::Read + io::Seek,
    {
        let start = decoder.position()?;
        let record_size = i64::decode_be(decoder)?;
        let record_type = i32::decode_be(decoder)?;
        if record_type != RecordKind::Cvvr as i32 {
            return Err(CdfError::bad_record(
                start,
                Cvvr::KIND,
                format!("record type {record_type}, expected 13"),
            ));
        }

        let rfu_a = i32::decode_be(decoder)?;
        if rfu_a != 0 {
            return Err(CdfError::bad_record(
                start,
                Cvvr::KIND,
                format!("reserved field rfuA is {rfu_a}, expected 0"),
            ));
        }

        let compressed_size = u64::try_from(i64::decode_be(decoder)?)?;
        let data = decoder.read_bytes(usize::try_from(compressed_size)?)?;

        decoder.finish_record(start, record_size, Cvvr::KIND)?;
        Ok(Cvvr { data })
    }
}

impl Encodable for Cvvr {
    fn encoded_size(&self) -> u64 {
        24 + self.data.len() as u64
    }

    fn encode_be(&self, encoder: &mut Encoder) -> Result<(), CdfError> {
        let start = encoder.position();
        encoder.put_i64(self.encoded_size() as i64);
        encoder.put_i32(RecordKind::Cvvr as i32);
        encoder.put_i32(0); // rfuA
        encoder.put_i64(self.data.len() as i64);
        encoder.put_bytes(&self.data);
        encoder.finish_record(start, self.encoded_size(), Cvvr::KIND)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::LoadOptions;

    #[test]
    fn test_cvvr_roundtrip() -> Result<(), CdfError> {
        let cvvr = Cvvr {
            data: vec![0x1f, 0x8b, 8, 0],
        };
        let mut encoder = Encoder::new();
        cvvr.encode_be(&mut encoder)?;
        let bytes = encoder.into_bytes();
        assert_eq!(bytes.len(), 28);

        let mut decoder = Decoder::new(io::Cursor::new(bytes), LoadOptions::default());
        let decoded = Cvvr::decode_be(&mut decoder)?;
        assert_eq!(decoded.data, vec![0x1f, 0x8b, 8, 0]);
        Ok(())
    }

    #[test]
    fn test_cvvr_size_mismatch_is_rejected() {
        let mut encoder = Encoder::new();
        encoder.put_i64(30); // declares 6 payload bytes
        encoder.put_i32(RecordKind::Cvvr as i32);
        encoder.put_i32(0);
        encoder.put_i64(4); // but carries 4
        encoder.put_bytes(&[1, 2, 3, 4]);
        let mut decoder = Decoder::new(
            io::Cursor::new(encoder.into_bytes()),
            LoadOptions::default(),
        );
        assert!(matches!(
            Cvvr::decode_be(&mut decoder),
            Err(CdfError::BadRecord { kind: "CVVR", .. })
        ));
    }
}

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    decode::{Decodable, Decoder},
    encode::{Encodable, Encoder},
    error::CdfError,
    record::{link, RecordKind},
};
use std::io;

/// A Compressed CDF Record carries the whole compressed record image when
/// file-level compression is in use. It sits where the CDR normally is.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug)]
pub struct Ccr {
    /// File offset of the compressed parameters record.
    pub cpr_offset: u64,
    /// Size of the record image in its uncompressed form.
    pub uncompressed_size: u64,
    /// The compressed record image.
    pub data: Vec<u8>,
}

impl Ccr {
    const KIND: &'static str = "CCR";
}

impl Decodable for Ccr {
    fn decode_be<R>(decoder: &mut Decoder<R>) -> Result<Self, CdfError>
    where
        R: io::Read + io::Seek,
    {
        let start = decoder.position()?;
        let record_size = i64::decode_be(decoder)?;
        let record_type = i32::decode_be(decoder)?;
        if record_type != RecordKind::Ccr as i32 {
            return Err(CdfError::bad_record(
                start,
                Ccr::KIND,
                format!("record type {record_type}, expected 10"),
            ));
        }

        let cpr_offset = link(i64::decode_be(decoder)?)?
            .ok_or_else(|| CdfError::bad_record(start, Ccr::KIND, "no parameters record offset"))?;
        let uncompressed_size = u64::try_from(i64::decode_be(decoder)?)?;

        let rfu_a = i32::decode_be(decoder)?;
        if rfu_a != 0 {
            return Err(CdfError::bad_record(
                start,
                Ccr::KIND,
                format!("reserved field rfuA is {rfu_a}, expected 0"),
            ));
        }

        let payload = u64::try_from(record_size)?.checked_sub(32).ok_or_else(|| {
            CdfError::bad_record(start, Ccr::KIND, format!("record size {record_size}"))
        })?;
        let data = decoder.read_bytes(usize::try_from(payload)?)?;

        decoder.finish_record(start, record_size, Ccr::KIND)?;
        Ok(Ccr {
            cpr_offset,
            uncompressed_size,
            data,
        })
    }
}

impl Encodable for Ccr {
    fn encoded_size(&self) -> u64 {
        32 + self.data.len() as u64
    }

    fn encode_be(&self, encoder: &mut Encoder) -> Result<(), CdfError> {
        let start = encoder.position();
        encoder.put_i64(self.encoded_size() as i64);
        encoder.put_i32(RecordKind::Ccr as i32);
        encoder.put_i64(self.cpr_offset as i64);
        encoder.put_i64(self.uncompressed_size as i64);
        encoder.put_i32(0); // rfuA
        encoder.put_bytes(&self.data);
        encoder.finish_record(start, self.encoded_size(), Ccr::KIND)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::LoadOptions;

    #[test]
    fn test_ccr_roundtrip() -> Result<(), CdfError> {
        let ccr = Ccr {
            cpr_offset: 1234,
            uncompressed_size: 9000,
            data: vec![7u8; 40],
        };
        let mut encoder = Encoder::new();
        ccr.encode_be(&mut encoder)?;
        let bytes = encoder.into_bytes();
        assert_eq!(bytes.len(), 72);

        let mut decoder = Decoder::new(io::Cursor::new(bytes), LoadOptions::default());
        let decoded = Ccr::decode_be(&mut decoder)?;
        assert_eq!(decoded.cpr_offset, 1234);
        assert_eq!(decoded.uncompressed_size, 9000);
        assert_eq!(decoded.data, vec![7u8; 40]);
        Ok(())
    }
}

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    decode::{Decodable, Decoder},
    encode::{Encodable, Encoder},
    error::CdfError,
    record::RecordKind,
    repr::CdfCompression,
};
use std::io;

/// A Compressed Parameters Record names the algorithm and parameters used by
/// a CCR (whole-file compression) or by the CVVRs of one variable.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug)]
pub struct Cpr {
    /// The compression algorithm and its parameter.
    pub compression: CdfCompression,
}

impl Cpr {
    const KIND: &'static str = "CPR";
}

impl Decodable for Cpr {
    fn decode_be<R>(decoder: &mut Decoder<R>) -> Result<Self, CdfError>
    where
        R: io::Read + io::Seek,
    {
        let start = decoder.position()?;
        let record_size = i64::decode_be(decoder)?;
        let record_type = i32::decode_be(decoder)?;
        if record_type != RecordKind::Cpr as i32 {
            return Err(CdfError::bad_record(
                start,
                Cpr::KIND,
                format!("record type {record_type}, expected 11"),
            ));
        }

        let code = i32::decode_be(decoder)?;

        let rfu_a = i32::decode_be(decoder)?;
        if rfu_a != 0 {
            return Err(CdfError::bad_record(
                start,
                Cpr::KIND,
                format!("reserved field rfuA is {rfu_a}, expected 0"),
            ));
        }

        let parameter_count = usize::try_from(i32::decode_be(decoder)?)?;
        let parameters = i32::decode_vec_be(decoder, parameter_count)?;
        let compression = CdfCompression::from_cpr(code, &parameters)?;

        decoder.finish_record(start, record_size, Cpr::KIND)?;
        Ok(Cpr { compression })
    }
}

impl Encodable for Cpr {
    fn encoded_size(&self) -> u64 {
        28
    }

    fn encode_be(&self, encoder: &mut Encoder) -> Result<(), CdfError> {
        let start = encoder.position();
        encoder.put_i64(self.encoded_size() as i64);
        encoder.put_i32(RecordKind::Cpr as i32);
        encoder.put_i32(self.compression.code());
        encoder.put_i32(0); // rfuA
        encoder.put_i32(1); // pCount
        encoder.put_i32(self.compression.parameter());
        encoder.finish_record(start, self.encoded_size(), Cpr::KIND)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::LoadOptions;

    #[test]
    fn test_cpr_roundtrip() -> Result<(), CdfError> {
        for compression in [
            CdfCompression::Rle0,
            CdfCompression::Huffman,
            CdfCompression::AdaptiveHuffman,
            CdfCompression::Gzip(6),
        ] {
            let mut encoder = Encoder::new();
            Cpr { compression }.encode_be(&mut encoder)?;
            let bytes = encoder.into_bytes();
            assert_eq!(bytes.len(), 28);

            let mut decoder = Decoder::new(io::Cursor::new(bytes), LoadOptions::default());
            let decoded = Cpr::decode_be(&mut decoder)?;
            assert_eq!(decoded.compression, compression);
        }
        Ok(())
    }

    #[test]
    fn test_cpr_rejects_bad_gzip_level() -> Result<(), CdfError> {
        let mut encoder = Encoder::new();
        encoder.put_i64(28);
        encoder.put_i32(RecordKind::Cpr as i32);
        encoder.put_i32(5); // gzip
        encoder.put_i32(0);
        encoder.put_i32(1);
        encoder.put_i32(12); // level outside 1..=9
        let mut decoder = Decoder::new(
            io::Cursor::new(encoder.into_bytes()),
            LoadOptions::default(),
        );
        assert!(matches!(
            Cpr::decode_be(&mut decoder),
            Err(CdfError::CorruptedIndex(_))
        ));
        Ok(())
    }
}

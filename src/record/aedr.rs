#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    decode::{Decodable, Decoder},
    encode::{Encodable, Encoder},
    error::CdfError,
    record::{link, RecordKind, RecordList},
    types::CdfDataType,
};
use std::io;

/// Which entry chain of the owning attribute this record belongs to. The two
/// flavors share a layout and differ only in their record type code.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AedrKind {
    /// A global or rVariable entry.
    GrEntry,
    /// A zVariable entry.
    ZEntry,
}

impl AedrKind {
    fn code(self) -> i32 {
        match self {
            AedrKind::GrEntry => RecordKind::AgrEdr as i32,
            AedrKind::ZEntry => RecordKind::AzEdr as i32,
        }
    }
}

/// An Attribute Entry Descriptor Record holds one entry of an attribute: its
/// entry number, data type and raw value bytes in the file's data encoding.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug)]
pub struct Aedr {
    /// Which entry chain this record sits on.
    pub kind: AedrKind,
    /// The file offset of the next entry record of the same chain.
    pub aedr_next: Option<u64>,
    /// The number of the attribute this entry belongs to.
    pub attr_num: i32,
    /// The type of the value stored in this entry.
    pub data_type: CdfDataType,
    /// The entry number: a position for global attributes, a variable number
    /// for variable attributes.
    pub num: i32,
    /// The number of elements stored within this entry.
    pub num_elems: i32,
    /// The number of strings stored within this entry.
    pub num_strings: i32,
    /// The raw value bytes, still in the file's data encoding.
    pub value: Vec<u8>,
}

impl Aedr {
    const HEADER_SIZE: u64 = 56;
    const KIND: &'static str = "AEDR";
}

impl Decodable for Aedr {
    fn decode_be<R>(decoder: &mut Decoder<R>) -> Result<Self, CdfError>
    where
        R: io::Read + io::Seek,
    {
        let start = decoder.position()?;
        let record_size = i64::decode_be(decoder)?;
        let record_type = i32::decode_be(decoder)?;
        let kind = if record_type == RecordKind::AgrEdr as i32 {
            AedrKind::GrEntry
        } else if record_type == RecordKind::AzEdr as i32 {
            AedrKind::ZEntry
        } else {
            return Err(CdfError::bad_record(
                start,
                Aedr::KIND,
                format!("record type {record_type}, expected 5 or 9"),
            ));
        };

        let aedr_next = link(i64::decode_be(decoder)?)?;
        let attr_num = i32::decode_be(decoder)?;
        let data_type: CdfDataType = i32::decode_be(decoder)?.try_into()?;
        let num = i32::decode_be(decoder)?;
        let num_elems = i32::decode_be(decoder)?;
        let num_strings = i32::decode_be(decoder)?;

        for (field, expected) in [("rfuB", 0), ("rfuC", 0), ("rfuD", -1), ("rfuE", -1)] {
            let value = i32::decode_be(decoder)?;
            if value != expected {
                return Err(CdfError::bad_record(
                    start,
                    Aedr::KIND,
                    format!("reserved field {field} is {value}, expected {expected}"),
                ));
            }
        }

        let value_bytes = u64::try_from(record_size)?
            .checked_sub(Aedr::HEADER_SIZE)
            .ok_or_else(|| {
                CdfError::bad_record(start, Aedr::KIND, format!("record size {record_size}"))
            })?;
        let expected = usize::try_from(num_elems)? * data_type.element_size();
        if value_bytes as usize != expected {
            return Err(CdfError::bad_record(
                start,
                Aedr::KIND,
                format!("{value_bytes} value bytes for {num_elems} {} elements", data_type.name()),
            ));
        }
        let value = decoder.read_bytes(value_bytes as usize)?;

        decoder.finish_record(start, record_size, Aedr::KIND)?;
        Ok(Aedr {
            kind,
            aedr_next,
            attr_num,
            data_type,
            num,
            num_elems,
            num_strings,
            value,
        })
    }
}

impl Encodable for Aedr {
    fn encoded_size(&self) -> u64 {
        Aedr::HEADER_SIZE + self.value.len() as u64
    }

    fn encode_be(&self, encoder: &mut Encoder) -> Result<(), CdfError> {
        let start = encoder.position();
        encoder.put_i64(self.encoded_size() as i64);
        encoder.put_i32(self.kind.code());
        encoder.put_link(self.aedr_next);
        encoder.put_i32(self.attr_num);
        encoder.put_i32(self.data_type.code());
        encoder.put_i32(self.num);
        encoder.put_i32(self.num_elems);
        encoder.put_i32(self.num_strings);
        encoder.put_i32(0); // rfuB
        encoder.put_i32(0); // rfuC
        encoder.put_i32(-1); // rfuD
        encoder.put_i32(-1); // rfuE
        encoder.put_bytes(&self.value);
        encoder.finish_record(start, self.encoded_size(), Aedr::KIND)
    }
}

impl RecordList for Aedr {
    fn next_record(&self) -> Option<u64> {
        self.aedr_next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::LoadOptions;

    #[test]
    fn test_aedr_roundtrip() -> Result<(), CdfError> {
        let aedr = Aedr {
            kind: AedrKind::GrEntry,
            aedr_next: None,
            attr_num: 0,
            data_type: CdfDataType::Char,
            num: 0,
            num_elems: 20,
            num_strings: 1,
            value: b"a cdf text attribute".to_vec(),
        };
        let mut encoder = Encoder::new();
        aedr.encode_be(&mut encoder)?;
        let bytes = encoder.into_bytes();
        assert_eq!(bytes.len(), 76);

        let mut decoder = Decoder::new(io::Cursor::new(bytes), LoadOptions::default());
        let decoded = Aedr::decode_be(&mut decoder)?;
        assert_eq!(decoded.kind, AedrKind::GrEntry);
        assert_eq!(decoded.data_type, CdfDataType::Char);
        assert_eq!(decoded.num_elems, 20);
        assert_eq!(decoded.value, b"a cdf text attribute");
        assert_eq!(decoded.next_record(), None);
        Ok(())
    }

    #[test]
    fn test_aedr_z_entry_type_code() -> Result<(), CdfError> {
        let aedr = Aedr {
            kind: AedrKind::ZEntry,
            aedr_next: Some(4096),
            attr_num: 2,
            data_type: CdfDataType::Real4,
            num: 1,
            num_elems: 3,
            num_strings: 0,
            value: vec![0u8; 12],
        };
        let mut encoder = Encoder::new();
        aedr.encode_be(&mut encoder)?;
        let bytes = encoder.into_bytes();
        assert_eq!(&bytes[8..12], &9i32.to_be_bytes());

        let mut decoder = Decoder::new(io::Cursor::new(bytes), LoadOptions::default());
        let decoded = Aedr::decode_be(&mut decoder)?;
        assert_eq!(decoded.kind, AedrKind::ZEntry);
        assert_eq!(decoded.next_record(), Some(4096));
        Ok(())
    }

    #[test]
    fn test_aedr_rejects_inconsistent_length() {
        let mut encoder = Encoder::new();
        encoder.put_i64(60);
        encoder.put_i32(5);
        encoder.put_i64(-1);
        encoder.put_i32(0);
        encoder.put_i32(CdfDataType::Int4.code());
        encoder.put_i32(0);
        encoder.put_i32(7); // 7 CDF_INT4 elements cannot fit in 4 value bytes
        encoder.put_i32(0);
        encoder.put_i32(0);
        encoder.put_i32(0);
        encoder.put_i32(-1);
        encoder.put_i32(-1);
        encoder.put_i32(0);
        let mut decoder = Decoder::new(
            io::Cursor::new(encoder.into_bytes()),
            LoadOptions::default(),
        );
        assert!(matches!(
            Aedr::decode_be(&mut decoder),
            Err(CdfError::BadRecord { kind: "AEDR", .. })
        ));
    }
}

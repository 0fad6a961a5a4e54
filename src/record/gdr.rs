#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    decode::{Decodable, Decoder},
    encode::{Encodable, Encoder},
    error::CdfError,
    record::{link, RecordKind},
};
use std::io;

/// The Global Descriptor Record follows the CDF Descriptor Record at the file offset noted in the
/// CDR `gdr_offset` field. It heads the attribute and variable linked lists.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug)]
pub struct Gdr {
    /// The file offset of the first rVariable Descriptor Record.
    pub rvdr_head: Option<u64>,
    /// The file offset of the first zVariable Descriptor Record.
    pub zvdr_head: Option<u64>,
    /// The file offset of the first Attribute Descriptor Record.
    pub adr_head: Option<u64>,
    /// The file offset representing the end-of-file.
    pub eof: u64,
    /// Number of rVariables.
    pub num_rvars: i32,
    /// Number of attributes.
    pub num_attributes: i32,
    /// Maximum record number over all rVariables.
    pub r_max_rec: i32,
    /// Number of zVariables.
    pub num_zvars: i32,
    /// The file offset of the first Unused Internal Record.
    pub uir_head: Option<u64>,
    /// Date of the last leap second update, as YYYYMMDD.
    pub leapsecond_last_updated: i32,
    /// Dimension sizes shared by every rVariable.
    pub r_dim_sizes: Vec<i32>,
}

impl Gdr {
    const KIND: &'static str = "GDR";
}

impl Decodable for Gdr {
    fn decode_be<R>(decoder: &mut Decoder<R>) -> Result<Self, CdfError>
    where
        R: io::Read + io::Seek,
    {
        let start = decoder.position()?;
        let record_size = i64::decode_be(decoder)?;
        let record_type = i32::decode_be(decoder)?;
        if record_type != RecordKind::Gdr as i32 {
            return Err(CdfError::bad_record(
                start,
                Gdr::KIND,
                format!("record type {record_type}, expected 2"),
            ));
        }

        let rvdr_head = link(i64::decode_be(decoder)?)?;
        let zvdr_head = link(i64::decode_be(decoder)?)?;
        let adr_head = link(i64::decode_be(decoder)?)?;
        let eof = u64::try_from(i64::decode_be(decoder)?)?;

        let num_rvars = i32::decode_be(decoder)?;
        let num_attributes = i32::decode_be(decoder)?;
        let r_max_rec = i32::decode_be(decoder)?;
        let num_r_dims = i32::decode_be(decoder)?;
        let num_zvars = i32::decode_be(decoder)?;
        let uir_head = link(i64::decode_be(decoder)?)?;

        let rfu_c = i32::decode_be(decoder)?;
        if rfu_c != 0 {
            return Err(CdfError::bad_record(
                start,
                Gdr::KIND,
                format!("reserved field rfuC is {rfu_c}, expected 0"),
            ));
        }
        let leapsecond_last_updated = i32::decode_be(decoder)?;
        let rfu_e = i32::decode_be(decoder)?;
        if rfu_e != -1 {
            return Err(CdfError::bad_record(
                start,
                Gdr::KIND,
                format!("reserved field rfuE is {rfu_e}, expected -1"),
            ));
        }

        let r_dim_sizes = i32::decode_vec_be(decoder, usize::try_from(num_r_dims)?)?;

        decoder.finish_record(start, record_size, Gdr::KIND)?;
        Ok(Gdr {
            rvdr_head,
            zvdr_head,
            adr_head,
            eof,
            num_rvars,
            num_attributes,
            r_max_rec,
            num_zvars,
            uir_head,
            leapsecond_last_updated,
            r_dim_sizes,
        })
    }
}

impl Encodable for Gdr {
    fn encoded_size(&self) -> u64 {
        84 + 4 * self.r_dim_sizes.len() as u64
    }

    fn encode_be(&self, encoder: &mut Encoder) -> Result<(), CdfError> {
        let start = encoder.position();
        encoder.put_i64(self.encoded_size() as i64);
        encoder.put_i32(RecordKind::Gdr as i32);
        encoder.put_link(self.rvdr_head);
        encoder.put_link(self.zvdr_head);
        encoder.put_link(self.adr_head);
        encoder.put_i64(self.eof as i64);
        encoder.put_i32(self.num_rvars);
        encoder.put_i32(self.num_attributes);
        encoder.put_i32(self.r_max_rec);
        encoder.put_i32(self.r_dim_sizes.len() as i32);
        encoder.put_i32(self.num_zvars);
        encoder.put_link(self.uir_head);
        encoder.put_i32(0); // rfuC
        encoder.put_i32(self.leapsecond_last_updated);
        encoder.put_i32(-1); // rfuE
        for &size in &self.r_dim_sizes {
            encoder.put_i32(size);
        }
        encoder.finish_record(start, self.encoded_size(), Gdr::KIND)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::LoadOptions;

    #[test]
    fn test_gdr_roundtrip() -> Result<(), CdfError> {
        let gdr = Gdr {
            rvdr_head: None,
            zvdr_head: Some(3968),
            adr_head: Some(404),
            eof: 117_050,
            num_rvars: 0,
            num_attributes: 11,
            r_max_rec: -1,
            num_zvars: 21,
            uir_head: Some(10_964),
            leapsecond_last_updated: 20_170_101,
            r_dim_sizes: vec![],
        };
        let mut encoder = Encoder::new();
        gdr.encode_be(&mut encoder)?;
        let bytes = encoder.into_bytes();
        assert_eq!(bytes.len(), 84);

        let mut decoder = Decoder::new(io::Cursor::new(bytes), LoadOptions::default());
        let decoded = Gdr::decode_be(&mut decoder)?;
        assert_eq!(decoded.rvdr_head, None);
        assert_eq!(decoded.zvdr_head, Some(3968));
        assert_eq!(decoded.adr_head, Some(404));
        assert_eq!(decoded.eof, 117_050);
        assert_eq!(decoded.num_attributes, 11);
        assert_eq!(decoded.num_zvars, 21);
        assert_eq!(decoded.leapsecond_last_updated, 20_170_101);
        Ok(())
    }

    #[test]
    fn test_gdr_roundtrip_with_r_dims() -> Result<(), CdfError> {
        let gdr = Gdr {
            rvdr_head: Some(4405),
            zvdr_head: None,
            adr_head: Some(376),
            eof: 8_420_394,
            num_rvars: 15,
            num_attributes: 27,
            r_max_rec: 134_639,
            num_zvars: 0,
            uir_head: None,
            leapsecond_last_updated: -1,
            r_dim_sizes: vec![3],
        };
        let mut encoder = Encoder::new();
        gdr.encode_be(&mut encoder)?;
        let bytes = encoder.into_bytes();
        assert_eq!(bytes.len(), 88);

        let mut decoder = Decoder::new(io::Cursor::new(bytes), LoadOptions::default());
        let decoded = Gdr::decode_be(&mut decoder)?;
        assert_eq!(decoded.num_rvars, 15);
        assert_eq!(decoded.r_max_rec, 134_639);
        assert_eq!(decoded.r_dim_sizes, vec![3]);
        Ok(())
    }
}

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    decode::{Decodable, Decoder},
    encode::{Encodable, Encoder},
    error::CdfError,
    record::{link, RecordKind},
    types::CdfDataType,
};
use std::io;

/// Whether a variable descriptor is the historical rVariable flavor, which
/// inherits its dimensions from the GDR, or the zVariable flavor with its
/// own dimension block. The writer only ever emits zVariables.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VdrKind {
    /// rVariable descriptor, record type 3.
    R,
    /// zVariable descriptor, record type 8.
    Z,
}

impl VdrKind {
    fn code(self) -> i32 {
        match self {
            VdrKind::R => RecordKind::Rvdr as i32,
            VdrKind::Z => RecordKind::Zvdr as i32,
        }
    }

    /// Record name used in error reports.
    pub fn record_name(self) -> &'static str {
        match self {
            VdrKind::R => "rVDR",
            VdrKind::Z => "zVDR",
        }
    }
}

/// Per-variable options stored in the VDR flags field.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, PartialEq, Eq)]
pub struct VdrFlags {
    /// Whether each record holds distinct data (true) or one logical record
    /// is replicated (false).
    pub record_variance: bool,
    /// Whether this variable declares a pad value.
    pub pad_specified: bool,
    /// Whether this variable's data records are compressed.
    pub compressed: bool,
}

impl VdrFlags {
    fn bits(&self) -> i32 {
        i32::from(self.record_variance)
            | i32::from(self.pad_specified) << 1
            | i32::from(self.compressed) << 2
    }
}

/// Describes one variable stored in the CDF file.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug)]
pub struct Vdr {
    /// Which descriptor flavor this is.
    pub kind: VdrKind,
    /// The file offset this record was read from; zero for records being built.
    pub offset: u64,
    /// File offset pointing to the next VDR of the same flavor.
    pub vdr_next: Option<u64>,
    /// Type of data stored in this variable.
    pub data_type: CdfDataType,
    /// Maximum record number stored in this variable.
    pub max_rec: i32,
    /// File offset of the first Variable Index Record.
    pub vxr_head: Option<u64>,
    /// File offset of the last Variable Index Record.
    pub vxr_tail: Option<u64>,
    /// Boolean flags.
    pub flags: VdrFlags,
    /// Handling of missing records: 0 none, 1 pad-filled, 2 previous-filled.
    pub s_records: i32,
    /// Number of elements of the data type in each value; the string length
    /// for character variables.
    pub num_elems: i32,
    /// Number (identifier) for this variable.
    pub num: i32,
    /// Offset of the compression or sparseness parameters record.
    pub cpr_spr_offset: Option<u64>,
    /// Number of records the creating library aimed to keep per index entry.
    pub blocking_factor: i32,
    /// Name of this variable.
    pub name: String,
    /// Declared dimension sizes.
    pub dim_sizes: Vec<i32>,
    /// Per-dimension variance.
    pub dim_variances: Vec<bool>,
    /// Raw pad value bytes in the file's data encoding, when declared.
    pub pad_bytes: Option<Vec<u8>>,
}

impl Vdr {
    /// Decode a descriptor of a known flavor. rVariable descriptors take
    /// their dimension sizes from the GDR, which must already be decoded.
    pub fn decode_be_kind<R>(decoder: &mut Decoder<R>, kind: VdrKind) -> Result<Self, CdfError>
    where
        R: io::Read + io::Seek,
    {
        let start = decoder.position()?;
        let record_size = i64::decode_be(decoder)?;
        let record_type = i32::decode_be(decoder)?;
        if record_type != kind.code() {
            return Err(CdfError::bad_record(
                start,
                kind.record_name(),
                format!("record type {record_type}, expected {}", kind.code()),
            ));
        }

        let vdr_next = link(i64::decode_be(decoder)?)?;
        let data_type: CdfDataType = i32::decode_be(decoder)?.try_into()?;
        let max_rec = i32::decode_be(decoder)?;
        let vxr_head = link(i64::decode_be(decoder)?)?;
        let vxr_tail = link(i64::decode_be(decoder)?)?;

        let flags = i32::decode_be(decoder)?;
        let flags = VdrFlags {
            record_variance: flags & 1 == 1,
            pad_specified: flags & 2 == 2,
            compressed: flags & 4 == 4,
        };

        let s_records = i32::decode_be(decoder)?;

        for (field, expected) in [("rfuB", 0), ("rfuC", -1), ("rfuF", -1)] {
            let value = i32::decode_be(decoder)?;
            if value != expected {
                return Err(CdfError::bad_record(
                    start,
                    kind.record_name(),
                    format!("reserved field {field} is {value}, expected {expected}"),
                ));
            }
        }

        let num_elems = i32::decode_be(decoder)?;
        let num = i32::decode_be(decoder)?;
        let cpr_spr_offset = link(i64::decode_be(decoder)?)?;
        let blocking_factor = i32::decode_be(decoder)?;
        let name = decoder.read_name(256)?;

        let dim_sizes = match kind {
            VdrKind::Z => {
                let num_dims = usize::try_from(i32::decode_be(decoder)?)?;
                i32::decode_vec_be(decoder, num_dims)?
            }
            VdrKind::R => decoder.context.r_dim_sizes()?.to_vec(),
        };

        let mut dim_variances = vec![false; dim_sizes.len()];
        for varies in dim_variances.iter_mut() {
            *varies = i32::decode_be(decoder)? == -1;
        }

        let pad_bytes = if flags.pad_specified {
            let pad_size = usize::try_from(num_elems)? * data_type.element_size();
            Some(decoder.read_bytes(pad_size)?)
        } else {
            None
        };

        decoder.finish_record(start, record_size, kind.record_name())?;
        Ok(Vdr {
            kind,
            offset: start,
            vdr_next,
            data_type,
            max_rec,
            vxr_head,
            vxr_tail,
            flags,
            s_records,
            num_elems,
            num,
            cpr_spr_offset,
            blocking_factor,
            name,
            dim_sizes,
            dim_variances,
            pad_bytes,
        })
    }
}

impl Decodable for Vdr {
    fn decode_be<R>(decoder: &mut Decoder<R>) -> Result<Self, CdfError>
    where
        R: io::Read + io::Seek,
    {
        Vdr::decode_be_kind(decoder, VdrKind::Z)
    }
}

impl Encodable for Vdr {
    fn encoded_size(&self) -> u64 {
        let dims = self.dim_sizes.len() as u64;
        let pad = self.pad_bytes.as_ref().map_or(0, |p| p.len() as u64);
        match self.kind {
            VdrKind::Z => 344 + 8 * dims + pad,
            VdrKind::R => 340 + 4 * dims + pad,
        }
    }

    fn encode_be(&self, encoder: &mut Encoder) -> Result<(), CdfError> {
        let start = encoder.position();
        encoder.put_i64(self.encoded_size() as i64);
        encoder.put_i32(self.kind.code());
        encoder.put_link(self.vdr_next);
        encoder.put_i32(self.data_type.code());
        encoder.put_i32(self.max_rec);
        encoder.put_link(self.vxr_head);
        encoder.put_link(self.vxr_tail);
        encoder.put_i32(self.flags.bits());
        encoder.put_i32(self.s_records);
        encoder.put_i32(0); // rfuB
        encoder.put_i32(-1); // rfuC
        encoder.put_i32(-1); // rfuF
        encoder.put_i32(self.num_elems);
        encoder.put_i32(self.num);
        encoder.put_link(self.cpr_spr_offset);
        encoder.put_i32(self.blocking_factor);
        encoder.put_name(&self.name, 256, self.kind.record_name())?;
        if self.kind == VdrKind::Z {
            encoder.put_i32(self.dim_sizes.len() as i32);
            for &size in &self.dim_sizes {
                encoder.put_i32(size);
            }
        }
        for &varies in &self.dim_variances {
            encoder.put_i32(if varies { -1 } else { 0 });
        }
        if let Some(pad) = &self.pad_bytes {
            encoder.put_bytes(pad);
        }
        encoder.finish_record(start, self.encoded_size(), self.kind.record_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::LoadOptions;

    fn sample() -> Vdr {
        Vdr {
            kind: VdrKind::Z,
            offset: 0,
            vdr_next: None,
            data_type: CdfDataType::Real8,
            max_rec: 3,
            vxr_head: Some(2048),
            vxr_tail: Some(2048),
            flags: VdrFlags {
                record_variance: true,
                pad_specified: true,
                compressed: false,
            },
            s_records: 0,
            num_elems: 1,
            num: 0,
            cpr_spr_offset: None,
            blocking_factor: 0,
            name: "var3d".to_string(),
            dim_sizes: vec![3, 2],
            dim_variances: vec![true, true],
            pad_bytes: Some((-1.0f64).to_le_bytes().to_vec()),
        }
    }

    #[test]
    fn test_zvdr_roundtrip() -> Result<(), CdfError> {
        let vdr = sample();
        let mut encoder = Encoder::new();
        vdr.encode_be(&mut encoder)?;
        let bytes = encoder.into_bytes();
        assert_eq!(bytes.len(), 344 + 16 + 8);

        let mut decoder = Decoder::new(io::Cursor::new(bytes), LoadOptions::default());
        let decoded = Vdr::decode_be_kind(&mut decoder, VdrKind::Z)?;
        assert_eq!(decoded.name, "var3d");
        assert_eq!(decoded.data_type, CdfDataType::Real8);
        assert_eq!(decoded.max_rec, 3);
        assert_eq!(decoded.dim_sizes, vec![3, 2]);
        assert_eq!(decoded.dim_variances, vec![true, true]);
        assert_eq!(decoded.pad_bytes, Some((-1.0f64).to_le_bytes().to_vec()));
        assert!(decoded.flags.record_variance);
        assert!(!decoded.flags.compressed);
        Ok(())
    }

    #[test]
    fn test_rvdr_takes_dimensions_from_context() -> Result<(), CdfError> {
        let mut vdr = sample();
        vdr.kind = VdrKind::R;
        vdr.dim_sizes = vec![3];
        vdr.dim_variances = vec![true];
        vdr.pad_bytes = None;
        vdr.flags.pad_specified = false;

        let mut encoder = Encoder::new();
        vdr.encode_be(&mut encoder)?;
        let bytes = encoder.into_bytes();
        assert_eq!(bytes.len(), 344);

        let mut decoder = Decoder::new(io::Cursor::new(bytes), LoadOptions::default());
        decoder.context.set_r_dim_sizes(vec![3]);
        let decoded = Vdr::decode_be_kind(&mut decoder, VdrKind::R)?;
        assert_eq!(decoded.dim_sizes, vec![3]);
        assert_eq!(decoded.dim_variances, vec![true]);
        Ok(())
    }

    #[test]
    fn test_vdr_flavor_mismatch() -> Result<(), CdfError> {
        let vdr = sample();
        let mut encoder = Encoder::new();
        vdr.encode_be(&mut encoder)?;
        let mut decoder = Decoder::new(
            io::Cursor::new(encoder.into_bytes()),
            LoadOptions::default(),
        );
        decoder.context.set_r_dim_sizes(vec![]);
        assert!(matches!(
            Vdr::decode_be_kind(&mut decoder, VdrKind::R),
            Err(CdfError::BadRecord { kind: "rVDR", .. })
        ));
        Ok(())
    }
}

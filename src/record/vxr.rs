#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    decode::{Decodable, Decoder},
    encode::{Encodable, Encoder},
    error::CdfError,
    record::{link, RecordKind, RecordList},
};
use std::io;

/// A Variable Index Record maps ranges of record numbers onto the file
/// offsets of the data records holding them. Entries may also point at
/// lower-level index records.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug)]
pub struct Vxr {
    /// File offset pointing to the next VXR.
    pub vxr_next: Option<u64>,
    /// Number of index slots allocated in this VXR.
    pub num_entries: i32,
    /// The number of index slots actually used.
    pub num_used_entries: i32,
    /// First record number covered by each slot.
    pub first: Vec<i32>,
    /// Last record number covered by each slot.
    pub last: Vec<i32>,
    /// File offset of the VVR, CVVR or lower-level VXR for each slot.
    pub offsets: Vec<i64>,
}

impl Vxr {
    const KIND: &'static str = "VXR";

    /// The used `(first, last, offset)` triples of this index.
    /// # Errors
    /// Returns a [`CdfError::CorruptedIndex`] if a used slot holds the unused
    /// sentinel.
    pub fn used_entries(&self) -> Result<Vec<(u32, u32, u64)>, CdfError> {
        let used = usize::try_from(self.num_used_entries)?;
        let mut entries = Vec::with_capacity(used);
        for slot in 0..used {
            let (first, last, offset) = (self.first[slot], self.last[slot], self.offsets[slot]);
            if first < 0 || last < 0 || offset <= 0 {
                return Err(CdfError::CorruptedIndex(format!(
                    "index slot {slot} is marked used but holds ({first}, {last}, {offset})"
                )));
            }
            entries.push((first as u32, last as u32, offset as u64));
        }
        Ok(entries)
    }
}

impl Decodable for Vxr {
    fn decode_be<R>(decoder: &mut Decoder<R>) -> Result<Self, CdfError>
    where
        R: io::Read + io::Seek,
    {
        let start = decoder.position()?;
        let record_size = i64::decode_be(decoder)?;
        let record_type = i32::decode_be(decoder)?;
        if record_type != RecordKind::Vxr as i32 {
            return Err(CdfError::bad_record(
                start,
                Vxr::KIND,
                format!("record type {record_type}, expected 6"),
            ));
        }

        let vxr_next = link(i64::decode_be(decoder)?)?;
        let num_entries = i32::decode_be(decoder)?;
        let num_used_entries = i32::decode_be(decoder)?;
        if num_used_entries < 0 || num_used_entries > num_entries {
            return Err(CdfError::bad_record(
                start,
                Vxr::KIND,
                format!("{num_used_entries} used of {num_entries} index slots"),
            ));
        }

        let slots = usize::try_from(num_entries)?;
        let first = i32::decode_vec_be(decoder, slots)?;
        let last = i32::decode_vec_be(decoder, slots)?;
        let offsets = i64::decode_vec_be(decoder, slots)?;

        decoder.finish_record(start, record_size, Vxr::KIND)?;
        Ok(Vxr {
            vxr_next,
            num_entries,
            num_used_entries,
            first,
            last,
            offsets,
        })
    }
}

impl Encodable for Vxr {
    fn encoded_size(&self) -> u64 {
        28 + 16 * self.num_entries as u64
    }

    fn encode_be(&self, encoder: &mut Encoder) -> Result<(), CdfError> {
        let start = encoder.position();
        encoder.put_i64(self.encoded_size() as i64);
        encoder.put_i32(RecordKind::Vxr as i32);
        encoder.put_link(self.vxr_next);
        encoder.put_i32(self.num_entries);
        encoder.put_i32(self.num_used_entries);
        for &first in &self.first {
            encoder.put_i32(first);
        }
        for &last in &self.last {
            encoder.put_i32(last);
        }
        for &offset in &self.offsets {
            encoder.put_i64(offset);
        }
        encoder.finish_record(start, self.encoded_size(), Vxr::KIND)
    }
}

impl RecordList for Vxr {
    fn next_record(&self) -> Option<u64> {
        self.vxr_next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::LoadOptions;

    #[test]
    fn test_vxr_roundtrip() -> Result<(), CdfError> {
        let vxr = Vxr {
            vxr_next: None,
            num_entries: 1,
            num_used_entries: 1,
            first: vec![0],
            last: vec![100],
            offsets: vec![4096],
        };
        let mut encoder = Encoder::new();
        vxr.encode_be(&mut encoder)?;
        let bytes = encoder.into_bytes();
        assert_eq!(bytes.len(), 44);

        let mut decoder = Decoder::new(io::Cursor::new(bytes), LoadOptions::default());
        let decoded = Vxr::decode_be(&mut decoder)?;
        assert_eq!(decoded.used_entries()?, vec![(0, 100, 4096)]);
        assert_eq!(decoded.next_record(), None);
        Ok(())
    }

    #[test]
    fn test_vxr_empty_slots_are_skipped() -> Result<(), CdfError> {
        let vxr = Vxr {
            vxr_next: Some(8192),
            num_entries: 3,
            num_used_entries: 1,
            first: vec![0, -1, -1],
            last: vec![9, -1, -1],
            offsets: vec![4096, -1, -1],
        };
        let mut encoder = Encoder::new();
        vxr.encode_be(&mut encoder)?;
        let mut decoder = Decoder::new(
            io::Cursor::new(encoder.into_bytes()),
            LoadOptions::default(),
        );
        let decoded = Vxr::decode_be(&mut decoder)?;
        assert_eq!(decoded.used_entries()?, vec![(0, 9, 4096)]);
        assert_eq!(decoded.next_record(), Some(8192));
        Ok(())
    }

    #[test]
    fn test_vxr_used_slot_with_sentinel_is_corrupt() -> Result<(), CdfError> {
        let vxr = Vxr {
            vxr_next: None,
            num_entries: 1,
            num_used_entries: 1,
            first: vec![-1],
            last: vec![-1],
            offsets: vec![-1],
        };
        let mut encoder = Encoder::new();
        vxr.encode_be(&mut encoder)?;
        let mut decoder = Decoder::new(
            io::Cursor::new(encoder.into_bytes()),
            LoadOptions::default(),
        );
        let decoded = Vxr::decode_be(&mut decoder)?;
        assert!(matches!(
            decoded.used_entries(),
            Err(CdfError::CorruptedIndex(_))
        ));
        Ok(())
    }
}

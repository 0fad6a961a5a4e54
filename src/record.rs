use std::io;

use crate::decode::{Decodable, Decoder};
use crate::error::CdfError;

/// Attribute Descriptor Record
pub mod adr;
/// Attribute Entry Descriptor Record (g/rEntry and zEntry flavors)
pub mod aedr;
/// Compressed CDF Record
pub mod ccr;
/// CDF Descriptor Record
pub mod cdr;
/// Compressed Parameters Record
pub mod cpr;
/// Compressed Variable Values Record
pub mod cvvr;
/// Global Descriptor Record
pub mod gdr;
/// Variable Descriptor Record (rVariable and zVariable flavors)
pub mod vdr;
/// Variable Values Record
pub mod vvr;
/// Variable Index Record
pub mod vxr;

/// A CDF file contains 2 or more internal records that organize the contents of the CDF.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Unused Internal Record
    Uir = -1,
    /// CDF Descriptor Record. All CDF files must contain this record.
    Cdr = 1,
    /// Global Descriptor Record. All CDF files must contain this record.
    Gdr = 2,
    /// rVariable Descriptor Record
    Rvdr = 3,
    /// Attribute Descriptor Record
    Adr = 4,
    /// Attribute g/rEntry Descriptor Record
    AgrEdr = 5,
    /// Variable Index Record
    Vxr = 6,
    /// Variable Values Record
    Vvr = 7,
    /// zVariable Descriptor Record
    Zvdr = 8,
    /// Attribute zEntry Descriptor Record
    AzEdr = 9,
    /// Compressed CDF Record
    Ccr = 10,
    /// Compressed Parameters Record
    Cpr = 11,
    /// Sparseness Parameters Record
    Spr = 12,
    /// Compressed Variable Values Record
    Cvvr = 13,
}

impl RecordKind {
    /// Map a record type code back to a kind, if it is one.
    pub fn from_code(code: i32) -> Option<RecordKind> {
        match code {
            -1 => Some(RecordKind::Uir),
            1 => Some(RecordKind::Cdr),
            2 => Some(RecordKind::Gdr),
            3 => Some(RecordKind::Rvdr),
            4 => Some(RecordKind::Adr),
            5 => Some(RecordKind::AgrEdr),
            6 => Some(RecordKind::Vxr),
            7 => Some(RecordKind::Vvr),
            8 => Some(RecordKind::Zvdr),
            9 => Some(RecordKind::AzEdr),
            10 => Some(RecordKind::Ccr),
            11 => Some(RecordKind::Cpr),
            12 => Some(RecordKind::Spr),
            13 => Some(RecordKind::Cvvr),
            _ => None,
        }
    }
}

/// The file-offset value written where a record has no link to store.
pub const LINK_SENTINEL: i64 = -1;

/// Interpret a link field. Archives in the wild terminate lists with either
/// a zero offset or the all-ones sentinel; both mean "no link".
pub(crate) fn link(raw: i64) -> Result<Option<u64>, CdfError> {
    if raw == 0 || raw == LINK_SENTINEL {
        Ok(None)
    } else {
        Ok(Some(u64::try_from(raw)?))
    }
}

/// The raw value to write for an optional link field.
pub(crate) fn link_value(link: Option<u64>) -> i64 {
    match link {
        Some(offset) => offset as i64,
        None => LINK_SENTINEL,
    }
}

/// This trait should be implemented for CDF record types that are stored in the form of a linked-
/// list with an attribute that points to the next record of the same type.
pub trait RecordList {
    /// Returns the file offset pointer to the next record in the linked-list.
    fn next_record(&self) -> Option<u64>;
}

/// Corrupt files can wire a record list into a cycle; cap the walk well above
/// anything a valid file produces.
const MAX_LIST_LEN: usize = 1 << 24;

/// Unravel a linked-list of CDF records into a single Vec. Any record walked
/// this way must be [`Decodable`] and [`RecordList`].
///
/// # Errors
/// Returns a [`CdfError`] if any record fails to decode or the list does not
/// terminate.
pub fn walk_list<R, T>(decoder: &mut Decoder<R>, head: Option<u64>) -> Result<Vec<T>, CdfError>
where
    R: io::Read + io::Seek,
    T: Decodable + RecordList,
{
    let mut result = Vec::new();
    let mut next = head;
    while let Some(offset) = next {
        if result.len() >= MAX_LIST_LEN {
            return Err(CdfError::CorruptedIndex(
                "record list does not terminate".to_string(),
            ));
        }
        decoder.seek_to(offset)?;
        let record = T::decode_be(decoder)?;
        next = record.next_record();
        result.push(record);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_sentinels() -> Result<(), CdfError> {
        assert_eq!(link(0)?, None);
        assert_eq!(link(LINK_SENTINEL)?, None);
        assert_eq!(link(312)?, Some(312));
        assert!(link(-2).is_err());
        Ok(())
    }

    #[test]
    fn test_record_kind_codes() {
        assert_eq!(RecordKind::from_code(13), Some(RecordKind::Cvvr));
        assert_eq!(RecordKind::from_code(-1), Some(RecordKind::Uir));
        assert_eq!(RecordKind::from_code(14), None);
        assert_eq!(RecordKind::Zvdr as i32, 8);
    }
}

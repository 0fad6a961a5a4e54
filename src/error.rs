use std::io;
use std::num::TryFromIntError;

use thiserror::Error;

/// Errors raised while reading or writing CDF files.
#[derive(Error, Debug)]
pub enum CdfError {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("not a CDF file - magic {0:#010x}")]
    NotACdf(u32),

    #[error("unsupported CDF version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    #[error("unsupported data encoding - {0}")]
    UnsupportedEncoding(&'static str),

    #[error("bad {kind} record at offset {offset:#x} - {detail}")]
    BadRecord {
        offset: u64,
        kind: &'static str,
        detail: String,
    },

    #[error("corrupted variable index - {0}")]
    CorruptedIndex(String),

    #[error("{stage} failed for {algorithm} - {detail}")]
    Compression {
        algorithm: &'static str,
        stage: &'static str,
        detail: String,
    },

    #[error("type mismatch - expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("duplicate name - {0}")]
    DuplicateName(String),

    #[error("decoded size {requested} bytes exceeds the {limit} byte ceiling")]
    ResourceExceeded { requested: u64, limit: u64 },
}

impl CdfError {
    /// Shorthand for a [`CdfError::BadRecord`] with a formatted detail message.
    pub(crate) fn bad_record(
        offset: u64,
        kind: &'static str,
        detail: impl Into<String>,
    ) -> CdfError {
        CdfError::BadRecord {
            offset,
            kind,
            detail: detail.into(),
        }
    }
}

// Counts and sizes stored in the file are signed; a negative value never has a
// valid use so the conversion failure maps onto the index taxonomy.
impl From<TryFromIntError> for CdfError {
    fn from(err: TryFromIntError) -> CdfError {
        CdfError::CorruptedIndex(format!("integer field out of range - {err}"))
    }
}

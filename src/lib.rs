//! Reader and writer for NASA CDF v3 files.
//!
//! A [`Cdf`] holds insertion-ordered maps of [`Attribute`]s and [`Variable`]s
//! and can be loaded from or saved to the single-file CDF format, including
//! per-variable and whole-file compression. The [`time`] module converts the
//! three CDF time encodings onto a common nanoseconds-since-1970 axis.
//!
//! ```no_run
//! let cdf = cdfio::load("observations.cdf").expect("a readable CDF");
//! for (name, variable) in cdf.variables.iter() {
//!     println!("{name}: {:?} x {}", variable.shape(), variable.len());
//! }
//! ```

use std::fs;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

/// The in-memory object model.
pub mod cdf;
/// Stream de/compression for data records and whole files.
pub mod compress;
/// The decoder: record stream plumbing and the file parser.
pub mod decode;
/// The encoder: record serialization and file layout.
pub mod encode;
/// Error taxonomy.
pub mod error;
/// Insertion-ordered name map.
pub mod nomap;
/// Typed views of every on-disk record kind.
pub mod record;
/// Version, encoding, majority and compression descriptors.
pub mod repr;
/// Epoch arithmetic and leap second handling.
pub mod time;
/// Data type tags and tagged value cells.
pub mod types;

pub use crate::cdf::{Attribute, Cdf, Entry, Variable};
pub use crate::decode::LoadOptions;
pub use crate::error::CdfError;
pub use crate::nomap::Nomap;
pub use crate::repr::{AttributeScope, CdfCompression, CdfMajority, CdfVersion};
pub use crate::types::{CdfDataType, CdfValue, DataCell};

/// Read a CDF file from disk, returning `None` on any failure. Use
/// [`load_strict`] to learn why a file was rejected.
pub fn load<P: AsRef<Path>>(path: P) -> Option<Cdf> {
    load_strict(path).ok()
}

/// Read a CDF file from disk with default options.
/// # Errors
/// Returns the [`CdfError`] describing the failure.
pub fn load_strict<P: AsRef<Path>>(path: P) -> Result<Cdf, CdfError> {
    load_with(path, &LoadOptions::default())
}

/// Read a CDF file from disk.
/// # Errors
/// Returns the [`CdfError`] describing the failure.
pub fn load_with<P: AsRef<Path>>(path: P, options: &LoadOptions) -> Result<Cdf, CdfError> {
    let bytes = fs::read(path)?;
    load_from_bytes(bytes, options)
}

/// Decode a CDF file held in memory.
/// # Errors
/// Returns the [`CdfError`] describing the failure.
pub fn load_from_bytes(bytes: Vec<u8>, options: &LoadOptions) -> Result<Cdf, CdfError> {
    decode::decode_cdf(Cursor::new(bytes), options)
}

/// Decode a CDF file from any seekable byte source.
/// # Errors
/// Returns the [`CdfError`] describing the failure.
pub fn load_from_reader<R: Read + Seek>(reader: R, options: &LoadOptions) -> Result<Cdf, CdfError> {
    decode::decode_cdf(reader, options)
}

/// Encode a file and return its bytes.
/// # Errors
/// Returns the [`CdfError`] describing the failure; no bytes are produced
/// on error.
pub fn save_to_vec(cdf: &Cdf) -> Result<Vec<u8>, CdfError> {
    encode::encode_cdf(cdf)
}

/// Encode a file and write it to disk. The file is only written once the
/// whole image has been encoded.
/// # Errors
/// Returns the [`CdfError`] describing the failure.
pub fn save<P: AsRef<Path>>(cdf: &Cdf, path: P) -> Result<(), CdfError> {
    let bytes = save_to_vec(cdf)?;
    fs::write(path, bytes)?;
    Ok(())
}

/// Encode a file into any writable sink. Nothing reaches the sink on error.
/// # Errors
/// Returns the [`CdfError`] describing the failure.
pub fn save_to_writer<W: Write>(cdf: &Cdf, sink: &mut W) -> Result<(), CdfError> {
    let bytes = save_to_vec(cdf)?;
    sink.write_all(&bytes)?;
    Ok(())
}

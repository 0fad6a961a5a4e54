use std::io::{self, SeekFrom};

use log::{debug, trace};

use crate::cdf::{Attribute, Cdf, DeferredSlab, Segment, Variable};
use crate::compress;
use crate::error::CdfError;
use crate::record::{walk_list, RecordKind};
use crate::record::{
    adr::Adr,
    aedr::Aedr,
    ccr::Ccr,
    cdr::Cdr,
    cpr::Cpr,
    cvvr::Cvvr,
    gdr::Gdr,
    vdr::{Vdr, VdrKind},
    vvr::Vvr,
    vxr::Vxr,
};
use crate::repr::{CdfCompression, CdfMajority, Endian};
use crate::types::{CdfDataType, DataCell};

/// First magic word of a version 3 file.
pub(crate) const MAGIC_V3: u32 = 0xCDF3_0001;
/// First magic word of a version 2.6/2.7 file.
pub(crate) const MAGIC_V26: u32 = 0xCDF2_6002;
/// Second magic word of an uncompressed file, also the only magic of pre-2.6 files.
pub(crate) const MAGIC_UNCOMPRESSED: u32 = 0x0000_FFFF;
/// Second magic word of a whole-file compressed file.
pub(crate) const MAGIC_COMPRESSED: u32 = 0xCCCC_0001;

/// Nested variable index records deeper than this indicate a reference loop.
const MAX_VXR_DEPTH: usize = 64;

/// Options controlling how a CDF file is loaded.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Defer decompression and decoding of variable data until first access.
    /// The compressed record payloads are still copied out of the source at
    /// load time, so the source does not need to outlive the file.
    pub lazy: bool,
    /// Treat character attribute payloads as ISO 8859-1 instead of UTF-8.
    pub iso_8859_1: bool,
    /// Ceiling on the decoded size of any single variable, in bytes.
    pub max_decoded_bytes: u64,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            lazy: false,
            iso_8859_1: false,
            max_decoded_bytes: 1 << 30,
        }
    }
}

/// Trait for decoding a value from the big-endian record stream.
pub trait Decodable: Sized {
    /// Decode a value from the decoder's current position.
    /// # Errors
    /// Returns a [`CdfError`] if the decoding fails for any reason.
    fn decode_be<R>(decoder: &mut Decoder<R>) -> Result<Self, CdfError>
    where
        R: io::Read + io::Seek;

    /// Decode a sequential collection of this type into a vector.
    fn decode_vec_be<R>(decoder: &mut Decoder<R>, count: usize) -> Result<Vec<Self>, CdfError>
    where
        R: io::Read + io::Seek,
    {
        let mut result = Vec::with_capacity(count);
        for _ in 0..count {
            result.push(Self::decode_be(decoder)?);
        }
        Ok(result)
    }
}

// Record fields are stored big-endian regardless of the data encoding; only
// the value payloads follow the CDR encoding byte.
macro_rules! impl_decodable_primitives {
    ($($t:ident),*) => {
        $(
            impl Decodable for $t {
                fn decode_be<R>(decoder: &mut Decoder<R>) -> Result<Self, CdfError>
                where
                    R: io::Read + io::Seek,
                {
                    let mut buffer = [0u8; std::mem::size_of::<$t>()];
                    decoder.reader.read_exact(&mut buffer[..])?;
                    Ok($t::from_be_bytes(buffer))
                }
            }
        )*
    };
}

impl_decodable_primitives!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

/// Struct containing the reader and decoding configurations.
pub struct Decoder<R>
where
    R: io::Read + io::Seek,
{
    /// A reader is some object that implements [`io::Read`] and [`io::Seek`].
    pub reader: R,
    /// Context keeps track of values that are needed by other records for decoding.
    pub context: DecodeContext,
}

impl<R> Decoder<R>
where
    R: io::Read + io::Seek,
{
    /// Create a new decoder over some reader.
    pub fn new(reader: R, options: LoadOptions) -> Self {
        Decoder {
            reader,
            context: DecodeContext::new(options),
        }
    }

    /// Current absolute offset in the byte source.
    pub fn position(&mut self) -> Result<u64, CdfError> {
        Ok(self.reader.stream_position()?)
    }

    /// Seek to an absolute offset.
    pub fn seek_to(&mut self, offset: u64) -> Result<(), CdfError> {
        self.reader.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    /// Read exactly `count` bytes into an owned buffer.
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>, CdfError> {
        let mut buffer = vec![0u8; count];
        self.reader.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    /// Read a fixed-width NUL-padded name field.
    pub fn read_name(&mut self, num_bytes: usize) -> Result<String, CdfError> {
        let buffer = self.read_bytes(num_bytes)?;
        let end = buffer.iter().position(|&b| b == 0).unwrap_or(num_bytes);
        Ok(String::from_utf8_lossy(&buffer[..end]).into_owned())
    }

    /// Validate that a record's declared size matches the bytes consumed
    /// decoding it.
    pub fn finish_record(
        &mut self,
        start: u64,
        record_size: i64,
        kind: &'static str,
    ) -> Result<(), CdfError> {
        let consumed = i64::try_from(self.position()? - start)?;
        if consumed != record_size {
            return Err(CdfError::bad_record(
                start,
                kind,
                format!("declared size {record_size}, decoded {consumed} bytes"),
            ));
        }
        Ok(())
    }

    /// Read the record type code stored at `offset` without committing to a
    /// full decode. The position afterwards is unspecified.
    pub fn peek_record_kind(&mut self, offset: u64) -> Result<i32, CdfError> {
        self.seek_to(offset)?;
        let _record_size = i64::decode_be(self)?;
        i32::decode_be(self)
    }
}

/// Stores various contextual values read in the CDF that other records depend on for their
/// decoding.
pub struct DecodeContext {
    /// Options the file is being loaded with.
    pub options: LoadOptions,
    endianness: Option<Endian>,
    row_major: Option<bool>,
    r_dim_sizes: Option<Vec<i32>>,
}

impl DecodeContext {
    fn new(options: LoadOptions) -> Self {
        DecodeContext {
            options,
            endianness: None,
            row_major: None,
            r_dim_sizes: None,
        }
    }

    /// Sets the endianness of value payloads within this CDF file.
    pub fn set_endianness(&mut self, endianness: Endian) {
        self.endianness = Some(endianness);
    }

    /// Gets the endianness of value payloads within this CDF file.
    /// # Errors
    /// Raises a [`CdfError::CorruptedIndex`] if no CDR has been decoded yet.
    pub fn endianness(&self) -> Result<Endian, CdfError> {
        self.endianness.ok_or_else(|| {
            CdfError::CorruptedIndex("no endianness stored in the decoding context".to_string())
        })
    }

    /// Sets whether variable records are stored row-major.
    pub fn set_row_majority(&mut self, row_major: bool) {
        self.row_major = Some(row_major);
    }

    /// Gets whether variable records are stored row-major.
    /// # Errors
    /// Raises a [`CdfError::CorruptedIndex`] if no CDR has been decoded yet.
    pub fn is_row_major(&self) -> Result<bool, CdfError> {
        self.row_major.ok_or_else(|| {
            CdfError::CorruptedIndex("no majority stored in the decoding context".to_string())
        })
    }

    /// Sets the shared dimension sizes that rVariables inherit from the GDR.
    pub fn set_r_dim_sizes(&mut self, sizes: Vec<i32>) {
        self.r_dim_sizes = Some(sizes);
    }

    /// Gets the shared dimension sizes that rVariables inherit from the GDR.
    /// # Errors
    /// Raises a [`CdfError::CorruptedIndex`] if no GDR has been decoded yet.
    pub fn r_dim_sizes(&self) -> Result<&[i32], CdfError> {
        self.r_dim_sizes.as_deref().ok_or_else(|| {
            CdfError::CorruptedIndex(
                "no rVariable dimensions stored in the decoding context".to_string(),
            )
        })
    }
}

/// Decode a complete CDF file from a random-access byte source.
pub fn decode_cdf<R>(reader: R, options: &LoadOptions) -> Result<Cdf, CdfError>
where
    R: io::Read + io::Seek,
{
    let mut decoder = Decoder::new(reader, options.clone());
    decode_image(&mut decoder, true)
}

/// Decode the record graph starting at the magic words. `allow_compressed`
/// is cleared when re-parsing an image recovered from a CCR, so a nested
/// compression wrapper cannot recurse.
fn decode_image<R>(decoder: &mut Decoder<R>, allow_compressed: bool) -> Result<Cdf, CdfError>
where
    R: io::Read + io::Seek,
{
    decoder.seek_to(0)?;
    let m1 = u32::decode_be(decoder)?;
    let m2 = u32::decode_be(decoder)?;

    match m1 {
        MAGIC_V3 => {}
        MAGIC_V26 | MAGIC_UNCOMPRESSED => {
            return Err(CdfError::UnsupportedVersion { major: 2, minor: 6 })
        }
        other => return Err(CdfError::NotACdf(other)),
    }

    let compressed = match m2 {
        MAGIC_UNCOMPRESSED => false,
        MAGIC_COMPRESSED => true,
        other => return Err(CdfError::NotACdf(other)),
    };

    if compressed {
        if !allow_compressed {
            return Err(CdfError::CorruptedIndex(
                "nested whole-file compression".to_string(),
            ));
        }
        return decode_compressed_image(decoder);
    }

    debug!("parsing CDF descriptor records");
    let cdr = Cdr::decode_be(decoder)?;
    decoder.seek_to(cdr.gdr_offset)?;
    let gdr = Gdr::decode_be(decoder)?;
    decoder.context.set_r_dim_sizes(gdr.r_dim_sizes.clone());

    let majority = if decoder.context.is_row_major()? {
        CdfMajority::Row
    } else {
        CdfMajority::Column
    };

    debug!(
        "walking {} attributes and {} variables",
        gdr.num_attributes,
        gdr.num_rvars + gdr.num_zvars
    );
    let attributes = decode_attributes(decoder, &gdr)?;
    let variables = decode_variables(decoder, &gdr)?;

    Ok(Cdf {
        version: cdr.version,
        majority,
        compression: CdfCompression::None,
        attributes,
        variables,
    })
}

/// Inflate a whole-file compressed image and parse the result.
fn decode_compressed_image<R>(decoder: &mut Decoder<R>) -> Result<Cdf, CdfError>
where
    R: io::Read + io::Seek,
{
    decoder.seek_to(8)?;
    let ccr = Ccr::decode_be(decoder)?;
    decoder.seek_to(ccr.cpr_offset)?;
    let cpr = Cpr::decode_be(decoder)?;

    debug!(
        "inflating whole-file {} image, {} compressed bytes",
        cpr.compression.name(),
        ccr.data.len()
    );
    let inflated = compress::inflate(cpr.compression, &ccr.data)?;
    if inflated.len() as u64 != ccr.uncompressed_size {
        return Err(CdfError::CorruptedIndex(format!(
            "whole-file image inflated to {} bytes, CCR declares {}",
            inflated.len(),
            ccr.uncompressed_size
        )));
    }

    let mut image = Vec::with_capacity(8 + inflated.len());
    image.extend_from_slice(&MAGIC_V3.to_be_bytes());
    image.extend_from_slice(&MAGIC_UNCOMPRESSED.to_be_bytes());
    image.extend_from_slice(&inflated);

    let mut inner = Decoder::new(io::Cursor::new(image), decoder.context.options.clone());
    let mut cdf = decode_image(&mut inner, false)?;
    cdf.compression = cpr.compression;
    Ok(cdf)
}

/// Walk the ADR linked list and both entry chains of each attribute.
fn decode_attributes<R>(
    decoder: &mut Decoder<R>,
    gdr: &Gdr,
) -> Result<crate::nomap::Nomap<Attribute>, CdfError>
where
    R: io::Read + io::Seek,
{
    let mut attributes = crate::nomap::Nomap::new();
    let adr_vec: Vec<Adr> = walk_list(decoder, gdr.adr_head)?;
    for adr in adr_vec {
        trace!("attribute {:?} scope {:?}", adr.name, adr.scope);
        let mut attribute = Attribute::new(adr.name.clone(), adr.scope);
        let gr_entries: Vec<Aedr> = walk_list(decoder, adr.agredr_head)?;
        let z_entries: Vec<Aedr> = walk_list(decoder, adr.azedr_head)?;
        for aedr in gr_entries.iter().chain(z_entries.iter()) {
            let cell = entry_cell(decoder, aedr)?;
            attribute
                .push_entry(aedr.num, cell)
                .map_err(|_| duplicate_entry(&adr.name, aedr.num))?;
        }
        if attributes.contains(&adr.name) {
            return Err(CdfError::DuplicateName(adr.name));
        }
        attributes.insert(adr.name, attribute);
    }
    Ok(attributes)
}

fn duplicate_entry(attribute: &str, number: i32) -> CdfError {
    CdfError::CorruptedIndex(format!(
        "duplicate entry number {number} in attribute {attribute:?}"
    ))
}

/// Materialize one attribute entry into a cell. Character payloads become a
/// single string value; numeric payloads are swapped to the in-memory
/// little-endian convention.
fn entry_cell<R>(decoder: &mut Decoder<R>, aedr: &Aedr) -> Result<DataCell, CdfError>
where
    R: io::Read + io::Seek,
{
    let mut bytes = aedr.value.clone();
    if aedr.data_type.is_string() {
        if decoder.context.options.iso_8859_1 {
            bytes = latin1_to_utf8(&bytes);
        }
        let num_elems = bytes.len().max(1);
        if bytes.is_empty() {
            bytes.push(0x20);
        }
        return DataCell::from_bytes(aedr.data_type, num_elems, bytes);
    }
    if decoder.context.endianness()? == Endian::Big {
        crate::types::swap_bytes_in_place(&mut bytes, aedr.data_type.swap_width());
    }
    DataCell::from_bytes(aedr.data_type, 1, bytes)
}

/// Re-encode an ISO 8859-1 byte string as UTF-8.
fn latin1_to_utf8(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().map(|&b| b as char).collect::<String>().into()
}

/// Walk the rVDR and zVDR linked lists and reconstruct every variable.
fn decode_variables<R>(
    decoder: &mut Decoder<R>,
    gdr: &Gdr,
) -> Result<crate::nomap::Nomap<Variable>, CdfError>
where
    R: io::Read + io::Seek,
{
    let mut variables = crate::nomap::Nomap::new();
    let mut numbers = Vec::new();

    let rvdr_vec = walk_vdr_list(decoder, gdr.rvdr_head, VdrKind::R)?;
    let zvdr_vec = walk_vdr_list(decoder, gdr.zvdr_head, VdrKind::Z)?;
    for vdr in rvdr_vec.into_iter().chain(zvdr_vec) {
        let variable = build_variable(decoder, vdr)?;
        numbers.push(variable.num());
        if variables.contains(variable.name()) {
            return Err(CdfError::DuplicateName(variable.name().to_string()));
        }
        variables.insert(variable.name().to_string(), variable);
    }

    let mut sorted = numbers.clone();
    sorted.sort_unstable();
    if sorted.iter().enumerate().any(|(i, &n)| n != i as i32) {
        return Err(CdfError::CorruptedIndex(format!(
            "variable numbers are not dense - {numbers:?}"
        )));
    }
    Ok(variables)
}

// The VDR linked-list walk cannot use `walk_list` directly because the
// decoder must be told which flavor it is about to read.
fn walk_vdr_list<R>(
    decoder: &mut Decoder<R>,
    head: Option<u64>,
    kind: VdrKind,
) -> Result<Vec<Vdr>, CdfError>
where
    R: io::Read + io::Seek,
{
    let mut result = Vec::new();
    let mut next = head;
    while let Some(offset) = next {
        decoder.seek_to(offset)?;
        let vdr = Vdr::decode_be_kind(decoder, kind)?;
        next = vdr.vdr_next;
        result.push(vdr);
    }
    Ok(result)
}

/// Turn one descriptor record into a model variable, collecting its data
/// segments from the variable index chain.
fn build_variable<R>(decoder: &mut Decoder<R>, vdr: Vdr) -> Result<Variable, CdfError>
where
    R: io::Read + io::Seek,
{
    trace!("variable {:?} number {}", vdr.name, vdr.num);
    let num_elems = usize::try_from(vdr.num_elems)?;
    if !vdr.data_type.is_string() && num_elems != 1 {
        return Err(CdfError::bad_record(
            vdr.offset,
            vdr.kind.record_name(),
            format!("{num_elems} elements for a non-string variable"),
        ));
    }

    let shape: Vec<u32> = vdr
        .dim_sizes
        .iter()
        .map(|&s| u32::try_from(s))
        .collect::<Result<_, _>>()?;
    let values_per_record: u64 = shape
        .iter()
        .zip(vdr.dim_variances.iter())
        .filter(|(_, &varies)| varies)
        .map(|(&size, _)| size as u64)
        .product();
    let value_size = (vdr.data_type.element_size() * num_elems) as u64;
    let record_bytes = values_per_record * value_size;

    let records_stored: u64 = if vdr.flags.record_variance {
        u64::try_from(vdr.max_rec + 1).unwrap_or(0)
    } else {
        u64::from(vdr.max_rec >= 0)
    };

    let limit = decoder.context.options.max_decoded_bytes;
    let requested = records_stored * record_bytes;
    if requested > limit {
        return Err(CdfError::ResourceExceeded { requested, limit });
    }

    let compression = if vdr.flags.compressed {
        let cpr_offset = vdr.cpr_spr_offset.ok_or_else(|| {
            CdfError::CorruptedIndex(format!(
                "variable {:?} is compressed but has no parameters record",
                vdr.name
            ))
        })?;
        decoder.seek_to(cpr_offset)?;
        Cpr::decode_be(decoder)?.compression
    } else {
        CdfCompression::None
    };

    let pad = match &vdr.pad_bytes {
        Some(raw) => Some(pad_cell(decoder, vdr.data_type, num_elems, raw)?),
        None => None,
    };

    let mut segments = Vec::new();
    if let Some(head) = vdr.vxr_head {
        collect_segments(
            decoder,
            head,
            records_stored,
            compression,
            0,
            &mut segments,
        )?;
    }

    let slab = DeferredSlab::new(
        segments,
        decoder.context.endianness()? == Endian::Big,
        decoder.context.is_row_major()?,
        vdr.s_records,
    );

    let variable = Variable::from_decode(
        vdr.name,
        vdr.num,
        vdr.data_type,
        shape,
        vdr.dim_variances,
        vdr.flags.record_variance,
        num_elems,
        vdr.max_rec,
        compression,
        u32::try_from(vdr.blocking_factor.max(0))?,
        pad,
        slab,
    );

    if !decoder.context.options.lazy {
        variable.data()?;
    }
    Ok(variable)
}

/// Decode a declared pad value into a cell, swapping to native order.
fn pad_cell<R>(
    decoder: &mut Decoder<R>,
    data_type: CdfDataType,
    num_elems: usize,
    raw: &[u8],
) -> Result<DataCell, CdfError>
where
    R: io::Read + io::Seek,
{
    let mut bytes = raw.to_vec();
    if !data_type.is_string() && decoder.context.endianness()? == Endian::Big {
        crate::types::swap_bytes_in_place(&mut bytes, data_type.swap_width());
    }
    DataCell::from_bytes(data_type, if data_type.is_string() { num_elems } else { 1 }, bytes)
}

/// Follow a variable index chain, descending into nested index records, and
/// copy out every referenced data record.
fn collect_segments<R>(
    decoder: &mut Decoder<R>,
    head: u64,
    records_stored: u64,
    compression: CdfCompression,
    depth: usize,
    segments: &mut Vec<Segment>,
) -> Result<(), CdfError>
where
    R: io::Read + io::Seek,
{
    if depth > MAX_VXR_DEPTH {
        return Err(CdfError::CorruptedIndex(
            "variable index records nest too deeply".to_string(),
        ));
    }

    let mut next = Some(head);
    while let Some(offset) = next {
        decoder.seek_to(offset)?;
        let vxr = Vxr::decode_be(decoder)?;
        for (first, last, target) in vxr.used_entries()? {
            if first > last || u64::from(last) >= records_stored {
                return Err(CdfError::CorruptedIndex(format!(
                    "index entry [{first}, {last}] outside the {records_stored} stored records"
                )));
            }
            match RecordKind::from_code(decoder.peek_record_kind(target)?) {
                Some(RecordKind::Vxr) => {
                    collect_segments(
                        decoder,
                        target,
                        records_stored,
                        compression,
                        depth + 1,
                        segments,
                    )?;
                }
                Some(RecordKind::Vvr) => {
                    decoder.seek_to(target)?;
                    let vvr = Vvr::decode_be(decoder)?;
                    segments.push(Segment::new(first, last, CdfCompression::None, vvr.data));
                }
                Some(RecordKind::Cvvr) => {
                    decoder.seek_to(target)?;
                    let cvvr = Cvvr::decode_be(decoder)?;
                    segments.push(Segment::new(first, last, compression, cvvr.data));
                }
                _ => {
                    return Err(CdfError::CorruptedIndex(format!(
                        "index entry points at offset {target:#x}, which is not a data record"
                    )));
                }
            }
        }
        next = vxr.vxr_next;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_garbage_magic() {
        let bytes = b"PK\x03\x04 definitely not a cdf".to_vec();
        let result = decode_cdf(io::Cursor::new(bytes), &LoadOptions::default());
        assert!(matches!(result, Err(CdfError::NotACdf(_))));
    }

    #[test]
    fn test_reject_version2_magic() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC_V26.to_be_bytes());
        bytes.extend_from_slice(&MAGIC_UNCOMPRESSED.to_be_bytes());
        let result = decode_cdf(io::Cursor::new(bytes), &LoadOptions::default());
        assert!(matches!(
            result,
            Err(CdfError::UnsupportedVersion { major: 2, .. })
        ));
    }

    #[test]
    fn test_reject_bad_second_magic() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC_V3.to_be_bytes());
        bytes.extend_from_slice(&0xDEAD_BEEFu32.to_be_bytes());
        let result = decode_cdf(io::Cursor::new(bytes), &LoadOptions::default());
        assert!(matches!(result, Err(CdfError::NotACdf(0xDEAD_BEEF))));
    }

    #[test]
    fn test_latin1_conversion() {
        assert_eq!(latin1_to_utf8(b"caf\xe9"), "café".as_bytes());
    }

    #[test]
    fn test_primitive_decoding_is_big_endian() -> Result<(), CdfError> {
        let bytes = 0x0102_0304u32.to_be_bytes();
        let mut decoder = Decoder::new(io::Cursor::new(bytes.to_vec()), LoadOptions::default());
        assert_eq!(u32::decode_be(&mut decoder)?, 0x0102_0304);
        Ok(())
    }
}

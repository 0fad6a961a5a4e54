use log::debug;

use crate::cdf::{Cdf, Variable};
use crate::compress;
use crate::decode::{MAGIC_COMPRESSED, MAGIC_UNCOMPRESSED, MAGIC_V3};
use crate::error::CdfError;
use crate::record::{
    adr::Adr,
    aedr::{Aedr, AedrKind},
    ccr::Ccr,
    cdr::{Cdr, CdrFlags},
    cpr::Cpr,
    cvvr::Cvvr,
    gdr::Gdr,
    vdr::{Vdr, VdrFlags, VdrKind},
    vvr::Vvr,
    vxr::Vxr,
};
use crate::repr::{AttributeScope, CdfCompression, CdfEncoding, CdfMajority};

/// Trait for serializing a record into the big-endian record stream.
pub trait Encodable {
    /// Exact number of bytes [`Encodable::encode_be`] emits, including the
    /// 12-byte record prefix.
    fn encoded_size(&self) -> u64;

    /// Append this record to the encoder.
    /// # Errors
    /// Returns a [`CdfError`] if a field cannot be represented on disk.
    fn encode_be(&self, encoder: &mut Encoder) -> Result<(), CdfError>;
}

/// Accumulates the encoded byte image. Nothing reaches the caller's sink
/// until the whole image has been built, so a failed encode emits no bytes.
#[derive(Default)]
pub struct Encoder {
    buffer: Vec<u8>,
}

impl Encoder {
    /// Create an empty encoder.
    pub fn new() -> Self {
        Encoder::default()
    }

    /// Current absolute offset, i.e. the number of bytes written so far.
    pub fn position(&self) -> u64 {
        self.buffer.len() as u64
    }

    /// Consume the encoder and return the encoded image.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Append a big-endian 4-byte signed integer.
    pub fn put_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    /// Append a big-endian 4-byte unsigned integer.
    pub fn put_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    /// Append a big-endian 8-byte signed integer.
    pub fn put_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    /// Append an offset link, or the sentinel if there is none.
    pub fn put_link(&mut self, link: Option<u64>) {
        self.put_i64(crate::record::link_value(link));
    }

    /// Append raw bytes.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Append a NUL-padded fixed-width name field.
    /// # Errors
    /// Returns a [`CdfError::BadRecord`] if the name does not fit.
    pub fn put_name(&mut self, name: &str, width: usize, kind: &'static str) -> Result<(), CdfError> {
        let bytes = name.as_bytes();
        if bytes.len() > width {
            return Err(CdfError::bad_record(
                self.position(),
                kind,
                format!("name {name:?} longer than {width} bytes"),
            ));
        }
        self.buffer.extend_from_slice(bytes);
        self.buffer.extend(std::iter::repeat(0u8).take(width - bytes.len()));
        Ok(())
    }

    /// Validate that a record emitted exactly the size it declared.
    pub fn finish_record(
        &self,
        start: u64,
        declared: u64,
        kind: &'static str,
    ) -> Result<(), CdfError> {
        let written = self.position() - start;
        if written != declared {
            return Err(CdfError::bad_record(
                start,
                kind,
                format!("declared size {declared}, emitted {written} bytes"),
            ));
        }
        Ok(())
    }
}

/// One variable's worth of records ready for layout.
struct VariableRecords {
    vdr: Vdr,
    cpr: Option<Cpr>,
    vxr: Vxr,
    data: Option<DataRecord>,
}

enum DataRecord {
    Plain(Vvr),
    Compressed(Cvvr),
}

impl DataRecord {
    fn encoded_size(&self) -> u64 {
        match self {
            DataRecord::Plain(vvr) => vvr.encoded_size(),
            DataRecord::Compressed(cvvr) => cvvr.encoded_size(),
        }
    }

    fn encode_be(&self, encoder: &mut Encoder) -> Result<(), CdfError> {
        match self {
            DataRecord::Plain(vvr) => vvr.encode_be(encoder),
            DataRecord::Compressed(cvvr) => cvvr.encode_be(encoder),
        }
    }
}

/// Serialize a file into a contiguous byte buffer.
pub fn encode_cdf(cdf: &Cdf) -> Result<Vec<u8>, CdfError> {
    if cdf.version.major != 3 {
        return Err(CdfError::UnsupportedVersion {
            major: cdf.version.major,
            minor: cdf.version.minor,
        });
    }

    let mut ordered: Vec<&Variable> = cdf.variables.values().collect();
    ordered.sort_by_key(|variable| variable.num());
    for (index, variable) in ordered.iter().enumerate() {
        if variable.num() != index as i32 {
            return Err(CdfError::CorruptedIndex(format!(
                "variable numbers are not dense - {:?} is number {}",
                variable.name(),
                variable.num()
            )));
        }
    }

    let row_major = cdf.majority == CdfMajority::Row;

    // Build every record with its payload; links are patched once the layout
    // assigns offsets.
    let mut cdr = build_cdr(cdf, row_major);
    let mut gdr = build_gdr(cdf);
    let mut attribute_records = build_attribute_records(cdf)?;
    let mut variable_records = ordered
        .iter()
        .map(|variable| build_variable_records(variable, row_major))
        .collect::<Result<Vec<_>, _>>()?;

    // Sizing pass: accumulate absolute offsets in emission order.
    let mut next_offset = 8 + cdr.encoded_size();
    let gdr_offset = next_offset;
    next_offset += gdr.encoded_size();

    let mut attribute_offsets: Vec<(u64, Vec<u64>)> = Vec::with_capacity(attribute_records.len());
    for (adr, aedrs) in &attribute_records {
        let adr_at = next_offset;
        next_offset += adr.encoded_size();
        let mut entry_offsets = Vec::with_capacity(aedrs.len());
        for aedr in aedrs {
            entry_offsets.push(next_offset);
            next_offset += aedr.encoded_size();
        }
        attribute_offsets.push((adr_at, entry_offsets));
    }

    let mut variable_offsets: Vec<(u64, Option<u64>, u64, Option<u64>)> =
        Vec::with_capacity(variable_records.len());
    for records in &variable_records {
        let vdr_at = next_offset;
        next_offset += records.vdr.encoded_size();
        let cpr_at = records.cpr.as_ref().map(|cpr| {
            let at = next_offset;
            next_offset += cpr.encoded_size();
            at
        });
        let vxr_at = next_offset;
        next_offset += records.vxr.encoded_size();
        let data_at = records.data.as_ref().map(|data| {
            let at = next_offset;
            next_offset += data.encoded_size();
            at
        });
        variable_offsets.push((vdr_at, cpr_at, vxr_at, data_at));
    }
    let eof = next_offset;

    // Patch links.
    cdr.gdr_offset = gdr_offset;
    gdr.adr_head = attribute_offsets.first().map(|(at, _)| *at);
    gdr.zvdr_head = variable_offsets.first().map(|(at, _, _, _)| *at);
    gdr.eof = eof;

    for (index, (adr, aedrs)) in attribute_records.iter_mut().enumerate() {
        adr.num = index as i32;
        adr.adr_next = attribute_offsets.get(index + 1).map(|(at, _)| *at);
        let entry_offsets = &attribute_offsets[index].1;
        let head = entry_offsets.first().copied();
        match adr.scope {
            AttributeScope::Global => adr.agredr_head = head,
            AttributeScope::Variable => adr.azedr_head = head,
        }
        for (entry_index, aedr) in aedrs.iter_mut().enumerate() {
            aedr.aedr_next = entry_offsets.get(entry_index + 1).copied();
            aedr.attr_num = index as i32;
        }
    }

    for (index, records) in variable_records.iter_mut().enumerate() {
        let (_, cpr_at, vxr_at, data_at) = variable_offsets[index];
        records.vdr.vdr_next = variable_offsets.get(index + 1).map(|(at, _, _, _)| *at);
        records.vdr.cpr_spr_offset = cpr_at;
        records.vdr.vxr_head = Some(vxr_at);
        records.vdr.vxr_tail = Some(vxr_at);
        if let Some(at) = data_at {
            records.vxr.offsets[0] = at as i64;
        }
    }

    // Emission pass.
    debug!(
        "emitting {} attributes, {} variables, {} bytes",
        attribute_records.len(),
        variable_records.len(),
        eof
    );
    let mut encoder = Encoder::new();
    encoder.put_u32(MAGIC_V3);
    encoder.put_u32(MAGIC_UNCOMPRESSED);

    cdr.encode_be(&mut encoder)?;
    expect_offset(&encoder, gdr_offset, "GDR")?;
    gdr.encode_be(&mut encoder)?;

    for (index, (adr, aedrs)) in attribute_records.iter().enumerate() {
        expect_offset(&encoder, attribute_offsets[index].0, "ADR")?;
        adr.encode_be(&mut encoder)?;
        for (entry_index, aedr) in aedrs.iter().enumerate() {
            expect_offset(&encoder, attribute_offsets[index].1[entry_index], "AEDR")?;
            aedr.encode_be(&mut encoder)?;
        }
    }

    for (index, records) in variable_records.iter().enumerate() {
        let (vdr_at, cpr_at, vxr_at, data_at) = variable_offsets[index];
        expect_offset(&encoder, vdr_at, "VDR")?;
        records.vdr.encode_be(&mut encoder)?;
        if let (Some(cpr), Some(at)) = (&records.cpr, cpr_at) {
            expect_offset(&encoder, at, "CPR")?;
            cpr.encode_be(&mut encoder)?;
        }
        expect_offset(&encoder, vxr_at, "VXR")?;
        records.vxr.encode_be(&mut encoder)?;
        if let (Some(data), Some(at)) = (&records.data, data_at) {
            expect_offset(&encoder, at, "VVR")?;
            data.encode_be(&mut encoder)?;
        }
    }

    let inner = encoder.into_bytes();
    debug_assert_eq!(inner.len() as u64, eof);

    match cdf.compression {
        CdfCompression::None => Ok(inner),
        compression => wrap_compressed(&inner, compression),
    }
}

fn expect_offset(encoder: &Encoder, expected: u64, kind: &'static str) -> Result<(), CdfError> {
    if encoder.position() != expected {
        return Err(CdfError::bad_record(
            encoder.position(),
            kind,
            format!("layout placed this record at {expected:#x}"),
        ));
    }
    Ok(())
}

/// Wrap an uncompressed image in the CCR/CPR whole-file compression carrier.
fn wrap_compressed(inner: &[u8], compression: CdfCompression) -> Result<Vec<u8>, CdfError> {
    let payload = compress::deflate(compression, &inner[8..])?;
    let ccr = Ccr {
        cpr_offset: 0,
        uncompressed_size: (inner.len() - 8) as u64,
        data: payload,
    };
    let cpr = Cpr { compression };

    let mut encoder = Encoder::new();
    encoder.put_u32(MAGIC_V3);
    encoder.put_u32(MAGIC_COMPRESSED);
    let ccr = Ccr {
        cpr_offset: 8 + ccr.encoded_size(),
        ..ccr
    };
    ccr.encode_be(&mut encoder)?;
    cpr.encode_be(&mut encoder)?;
    Ok(encoder.into_bytes())
}

fn build_cdr(cdf: &Cdf, row_major: bool) -> Cdr {
    Cdr {
        gdr_offset: 0,
        version: cdf.version,
        encoding: CdfEncoding::IbmPc,
        flags: CdrFlags {
            row_major,
            single_file: true,
            has_checksum: false,
            md5_checksum: false,
        },
        identifier: -1,
        copyright: "\nCommon Data Format (CDF)\nhttps://cdf.gsfc.nasa.gov\n".to_string(),
    }
}

fn build_gdr(cdf: &Cdf) -> Gdr {
    Gdr {
        rvdr_head: None,
        zvdr_head: None,
        adr_head: None,
        eof: 0,
        num_rvars: 0,
        num_attributes: cdf.attributes.len() as i32,
        r_max_rec: -1,
        num_zvars: cdf.variables.len() as i32,
        uir_head: None,
        leapsecond_last_updated: 20170101,
        r_dim_sizes: Vec::new(),
    }
}

fn build_attribute_records(cdf: &Cdf) -> Result<Vec<(Adr, Vec<Aedr>)>, CdfError> {
    let mut result = Vec::with_capacity(cdf.attributes.len());
    for attribute in cdf.attributes.values() {
        let kind = match attribute.scope {
            AttributeScope::Global => AedrKind::GrEntry,
            AttributeScope::Variable => AedrKind::ZEntry,
        };
        let mut aedrs = Vec::with_capacity(attribute.entries().len());
        for entry in attribute.entries() {
            let cell = &entry.cell;
            let (num_elems, num_strings) = if cell.data_type().is_string() {
                (cell.num_elems() as i32, 1)
            } else {
                (cell.len() as i32, 0)
            };
            aedrs.push(Aedr {
                kind,
                aedr_next: None,
                attr_num: 0,
                data_type: cell.data_type(),
                num: entry.number,
                num_elems,
                num_strings,
                value: cell.as_bytes().to_vec(),
            });
        }
        let max_entry = attribute
            .entries()
            .iter()
            .map(|entry| entry.number)
            .max()
            .unwrap_or(-1);
        let (num_gr_entries, max_gr_entry, num_z_entries, max_z_entry) = match attribute.scope {
            AttributeScope::Global => (aedrs.len() as i32, max_entry, 0, -1),
            AttributeScope::Variable => (0, -1, aedrs.len() as i32, max_entry),
        };
        result.push((
            Adr {
                adr_next: None,
                agredr_head: None,
                azedr_head: None,
                scope: attribute.scope,
                num: 0,
                num_gr_entries,
                max_gr_entry,
                num_z_entries,
                max_z_entry,
                name: attribute.name.clone(),
            },
            aedrs,
        ));
    }
    Ok(result)
}

fn build_variable_records(
    variable: &Variable,
    row_major: bool,
) -> Result<VariableRecords, CdfError> {
    let cell = variable.data()?;
    let mut slab = cell.as_bytes().to_vec();
    if !row_major {
        variable.transpose_to_column_major(&mut slab);
    }

    let records_stored = variable.records_stored();
    let max_stored = records_stored as i64 - 1;

    let data = if records_stored == 0 {
        None
    } else if variable.compression == CdfCompression::None {
        Some(DataRecord::Plain(Vvr { data: slab }))
    } else {
        let payload = compress::deflate(variable.compression, &slab)?;
        Some(DataRecord::Compressed(Cvvr { data: payload }))
    };

    let cpr = (variable.compression != CdfCompression::None).then(|| Cpr {
        compression: variable.compression,
    });

    let vxr = Vxr {
        vxr_next: None,
        num_entries: 1,
        num_used_entries: i32::from(data.is_some()),
        first: vec![if data.is_some() { 0 } else { -1 }],
        last: vec![if data.is_some() { max_stored as i32 } else { -1 }],
        offsets: vec![-1],
    };

    let vdr = Vdr {
        kind: VdrKind::Z,
        offset: 0,
        vdr_next: None,
        data_type: variable.data_type(),
        max_rec: variable.max_rec(),
        vxr_head: None,
        vxr_tail: None,
        flags: VdrFlags {
            record_variance: variable.record_variance(),
            pad_specified: variable.pad().is_some(),
            compressed: variable.compression != CdfCompression::None,
        },
        s_records: 0,
        num_elems: variable.num_elems() as i32,
        num: variable.num(),
        cpr_spr_offset: None,
        blocking_factor: variable.blocking_factor as i32,
        name: variable.name().to_string(),
        dim_sizes: variable.shape().iter().map(|&s| s as i32).collect(),
        dim_variances: variable.dim_variances().to_vec(),
        pad_bytes: variable.pad().map(|pad| pad.as_bytes().to_vec()),
    };

    Ok(VariableRecords {
        vdr,
        cpr,
        vxr,
        data,
    })
}

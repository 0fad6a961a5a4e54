#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    decode::{Decodable, Decoder},
    encode::{Encodable, Encoder},
    error::CdfError,
    record::{link, RecordKind, RecordList},
    repr::AttributeScope,
};
use std::io;

/// The Attribute Descriptor Record contains information on one attribute in the CDF and heads its
/// two entry chains.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug)]
pub struct Adr {
    /// The file offset of the next ADR.
    pub adr_next: Option<u64>,
    /// The file offset of the first g/rEntry record of this attribute.
    pub agredr_head: Option<u64>,
    /// The file offset of the first zEntry record of this attribute.
    pub azedr_head: Option<u64>,
    /// Scope of this attribute.
    pub scope: AttributeScope,
    /// The numeric identifier for this attribute.
    pub num: i32,
    /// The number of g/rEntries stored within this attribute.
    pub num_gr_entries: i32,
    /// The maximum g/rEntry number.
    pub max_gr_entry: i32,
    /// The number of zEntries stored within this attribute.
    pub num_z_entries: i32,
    /// The maximum zEntry number.
    pub max_z_entry: i32,
    /// Name of this attribute.
    pub name: String,
}

impl Adr {
    const SIZE: u64 = 324;
    const KIND: &'static str = "ADR";
}

impl Decodable for Adr {
    fn decode_be<R>(decoder: &mut Decoder<R>) -> Result<Self, CdfError>
    where
        R: io::Read + io::Seek,
    {
        let start = decoder.position()?;
        let record_size = i64::decode_be(decoder)?;
        let record_type = i32::decode_be(decoder)?;
        if record_type != RecordKind::Adr as i32 {
            return Err(CdfError::bad_record(
                start,
                Adr::KIND,
                format!("record type {record_type}, expected 4"),
            ));
        }

        let adr_next = link(i64::decode_be(decoder)?)?;
        let agredr_head = link(i64::decode_be(decoder)?)?;
        let scope: AttributeScope = i32::decode_be(decoder)?.try_into()?;
        let num = i32::decode_be(decoder)?;
        let num_gr_entries = i32::decode_be(decoder)?;
        let max_gr_entry = i32::decode_be(decoder)?;

        let rfu_a = i32::decode_be(decoder)?;
        if rfu_a != 0 {
            return Err(CdfError::bad_record(
                start,
                Adr::KIND,
                format!("reserved field rfuA is {rfu_a}, expected 0"),
            ));
        }

        let azedr_head = link(i64::decode_be(decoder)?)?;
        let num_z_entries = i32::decode_be(decoder)?;
        let max_z_entry = i32::decode_be(decoder)?;

        let rfu_e = i32::decode_be(decoder)?;
        if rfu_e != -1 {
            return Err(CdfError::bad_record(
                start,
                Adr::KIND,
                format!("reserved field rfuE is {rfu_e}, expected -1"),
            ));
        }

        let name = decoder.read_name(256)?;

        decoder.finish_record(start, record_size, Adr::KIND)?;
        Ok(Adr {
            adr_next,
            agredr_head,
            azedr_head,
            scope,
            num,
            num_gr_entries,
            max_gr_entry,
            num_z_entries,
            max_z_entry,
            name,
        })
    }
}

impl Encodable for Adr {
    fn encoded_size(&self) -> u64 {
        Adr::SIZE
    }

    fn encode_be(&self, encoder: &mut Encoder) -> Result<(), CdfError> {
        let start = encoder.position();
        encoder.put_i64(Adr::SIZE as i64);
        encoder.put_i32(RecordKind::Adr as i32);
        encoder.put_link(self.adr_next);
        encoder.put_link(self.agredr_head);
        encoder.put_i32(self.scope.code());
        encoder.put_i32(self.num);
        encoder.put_i32(self.num_gr_entries);
        encoder.put_i32(self.max_gr_entry);
        encoder.put_i32(0); // rfuA
        encoder.put_link(self.azedr_head);
        encoder.put_i32(self.num_z_entries);
        encoder.put_i32(self.max_z_entry);
        encoder.put_i32(-1); // rfuE
        encoder.put_name(&self.name, 256, Adr::KIND)?;
        encoder.finish_record(start, Adr::SIZE, Adr::KIND)
    }
}

impl RecordList for Adr {
    fn next_record(&self) -> Option<u64> {
        self.adr_next
    }
}

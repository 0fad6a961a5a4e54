#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    decode::{Decodable, Decoder},
    encode::{Encodable, Encoder},
    error::CdfError,
    record::{link, RecordKind},
    repr::{CdfEncoding, CdfVersion},
};
use std::io;

/// Flags pertaining to this CDF file.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, PartialEq, Eq)]
pub struct CdrFlags {
    /// Whether variable records are row-major (true) or column-major (false).
    pub row_major: bool,
    /// Whether this is a single file CDF, as opposed to multi-file CDFs.
    pub single_file: bool,
    /// Whether this CDF file has a checksum.
    pub has_checksum: bool,
    /// Whether the checksum is an MD5 checksum.
    pub md5_checksum: bool,
}

impl CdrFlags {
    fn bits(&self) -> i32 {
        i32::from(self.row_major)
            | i32::from(self.single_file) << 1
            | i32::from(self.has_checksum) << 2
            | i32::from(self.md5_checksum) << 3
    }
}

/// The CDF Descriptor Record is present in all CDF files at a file offset of 8 bytes and contains
/// general information about the CDF.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug)]
pub struct Cdr {
    /// The file offset of the global descriptor record.
    pub gdr_offset: u64,
    /// The version of the CDF library used to create this file.
    pub version: CdfVersion,
    /// The encoding for data stored inside this CDF.
    pub encoding: CdfEncoding,
    /// Flags holding information on different options for this file.
    pub flags: CdrFlags,
    /// Identifier stamped by the creating library.
    pub identifier: i32,
    /// The copyright string.
    pub copyright: String,
}

impl Cdr {
    const SIZE: u64 = 312;
    const KIND: &'static str = "CDR";
}

impl Decodable for Cdr {
    fn decode_be<R>(decoder: &mut Decoder<R>) -> Result<Self, CdfError>
    where
        R: io::Read + io::Seek,
    {
        let start = decoder.position()?;
        let record_size = i64::decode_be(decoder)?;
        let record_type = i32::decode_be(decoder)?;
        if record_type != RecordKind::Cdr as i32 {
            return Err(CdfError::bad_record(
                start,
                Cdr::KIND,
                format!("record type {record_type}, expected 1"),
            ));
        }

        let gdr_offset = link(i64::decode_be(decoder)?)?
            .ok_or_else(|| CdfError::bad_record(start, Cdr::KIND, "no global descriptor offset"))?;

        let version = i32::decode_be(decoder)?;
        let release = i32::decode_be(decoder)?;
        if version != 3 {
            return Err(CdfError::UnsupportedVersion {
                major: u16::try_from(version)?,
                minor: u16::try_from(release)?,
            });
        }

        let encoding: CdfEncoding = i32::decode_be(decoder)?.try_into()?;
        decoder.context.set_endianness(encoding.endianness()?);

        let flags = i32::decode_be(decoder)?;
        let flags = CdrFlags {
            row_major: flags & 1 == 1,
            single_file: flags & 2 == 2,
            has_checksum: flags & 4 == 4,
            md5_checksum: flags & 8 == 8,
        };
        if !flags.single_file {
            return Err(CdfError::bad_record(
                start,
                Cdr::KIND,
                "multi-file CDFs are not supported",
            ));
        }
        decoder.context.set_row_majority(flags.row_major);

        let rfu_a = i32::decode_be(decoder)?;
        if rfu_a != 0 {
            return Err(CdfError::bad_record(
                start,
                Cdr::KIND,
                format!("reserved field rfuA is {rfu_a}, expected 0"),
            ));
        }
        let rfu_b = i32::decode_be(decoder)?;
        if rfu_b != 0 {
            return Err(CdfError::bad_record(
                start,
                Cdr::KIND,
                format!("reserved field rfuB is {rfu_b}, expected 0"),
            ));
        }

        let increment = i32::decode_be(decoder)?;
        let version = CdfVersion::new(
            u16::try_from(version)?,
            u16::try_from(release)?,
            u16::try_from(increment)?,
        );

        let identifier = i32::decode_be(decoder)?;
        let _rfu_e = i32::decode_be(decoder)?;
        let copyright = decoder.read_name(256)?;

        decoder.finish_record(start, record_size, Cdr::KIND)?;
        Ok(Cdr {
            gdr_offset,
            version,
            encoding,
            flags,
            identifier,
            copyright,
        })
    }
}

impl Encodable for Cdr {
    fn encoded_size(&self) -> u64 {
        Cdr::SIZE
    }

    fn encode_be(&self, encoder: &mut Encoder) -> Result<(), CdfError> {
        let start = encoder.position();
        encoder.put_i64(Cdr::SIZE as i64);
        encoder.put_i32(RecordKind::Cdr as i32);
        encoder.put_i64(self.gdr_offset as i64);
        encoder.put_i32(i32::from(self.version.major));
        encoder.put_i32(i32::from(self.version.minor));
        encoder.put_i32(self.encoding.code());
        encoder.put_i32(self.flags.bits());
        encoder.put_i32(0); // rfuA
        encoder.put_i32(0); // rfuB
        encoder.put_i32(i32::from(self.version.patch));
        encoder.put_i32(self.identifier);
        encoder.put_i32(-1); // rfuE
        encoder.put_name(&self.copyright, 256, Cdr::KIND)?;
        encoder.finish_record(start, Cdr::SIZE, Cdr::KIND)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::LoadOptions;
    use crate::repr::Endian;

    fn sample() -> Cdr {
        Cdr {
            gdr_offset: 320,
            version: CdfVersion::new(3, 8, 1),
            encoding: CdfEncoding::IbmPc,
            flags: CdrFlags {
                row_major: true,
                single_file: true,
                has_checksum: false,
                md5_checksum: false,
            },
            identifier: -1,
            copyright: "a short copyright".to_string(),
        }
    }

    #[test]
    fn test_cdr_roundtrip() -> Result<(), CdfError> {
        let mut encoder = Encoder::new();
        sample().encode_be(&mut encoder)?;
        let bytes = encoder.into_bytes();
        assert_eq!(bytes.len(), 312);

        let mut decoder = Decoder::new(io::Cursor::new(bytes), LoadOptions::default());
        let cdr = Cdr::decode_be(&mut decoder)?;
        assert_eq!(cdr.gdr_offset, 320);
        assert_eq!(cdr.version, CdfVersion::new(3, 8, 1));
        assert_eq!(cdr.encoding, CdfEncoding::IbmPc);
        assert!(cdr.flags.row_major);
        assert_eq!(cdr.copyright, "a short copyright");
        assert_eq!(decoder.context.endianness()?, Endian::Little);
        assert!(decoder.context.is_row_major()?);
        Ok(())
    }

    #[test]
    fn test_cdr_rejects_version_2() {
        // The encoder only ever writes version 3 files; fabricate the bytes.
        let mut encoder = Encoder::new();
        encoder.put_i64(312);
        encoder.put_i32(RecordKind::Cdr as i32);
        encoder.put_i64(320);
        encoder.put_i32(2);
        encoder.put_i32(7);
        let mut decoder = Decoder::new(
            io::Cursor::new(encoder.into_bytes()),
            LoadOptions::default(),
        );
        assert!(matches!(
            Cdr::decode_be(&mut decoder),
            Err(CdfError::UnsupportedVersion { major: 2, minor: 7 })
        ));
    }

    #[test]
    fn test_cdr_rejects_wrong_record_type() {
        let mut encoder = Encoder::new();
        encoder.put_i64(312);
        encoder.put_i32(RecordKind::Gdr as i32);
        let mut decoder = Decoder::new(
            io::Cursor::new(encoder.into_bytes()),
            LoadOptions::default(),
        );
        assert!(matches!(
            Cdr::decode_be(&mut decoder),
            Err(CdfError::BadRecord { kind: "CDR", .. })
        ));
    }
}

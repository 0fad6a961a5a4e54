#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::CdfError;

/// Data Encodings used in CDF (from CDF specification Table 5.11). Floating-point representations
/// other than IEEE754 are not implemented and will raise an error.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CdfEncoding {
    /// eXternal Data Representation
    Network = 1,
    /// Sun Representation
    Sun = 2,
    /// VAX Representation
    Vax = 3,
    /// DECStation Representation
    DecStation = 4,
    /// SGi Representation
    Sgi = 5,
    /// Intel Windows, Linux, MacOS Intel, Solaris Intel
    IbmPc = 6,
    /// IBM RS-6000 Representation
    IbmRs = 7,
    /// Macintosh Power PC Representation
    MacPpc = 9,
    /// HP 9000 Series Representation
    Hp = 11,
    /// NeXT Representation
    Next = 12,
    /// DEC Alpha/OSF1 Representation
    AlphaOsf1 = 13,
    /// DEC Alpha/Open VMS Representation (Double precision floats in D_FLOAT encoding)
    AlphaVmsD = 14,
    /// DEC Alpha/Open VMS Representation (Double precision floats in G_FLOAT encoding)
    AlphaVmsG = 15,
    /// DEC Alpha/Open VMS Representation (Single/Double precision floats in IEEE 754 encoding)
    AlphaVmsI = 16,
    /// ARM little-endian Representation
    ArmLittle = 17,
    /// ARM big-endian Representation
    ArmBig = 18,
    /// Itanium 64 on OpenVMS Representation (Single/Double precision floats in IEEE 754 encoding)
    Ia64VmsI = 19,
    /// Itanium 64 on OpenVMS Representation (Single/Double precision floats in Digital D_FLOAT
    /// encoding)
    Ia64VmsD = 20,
    /// Itanium 64 on OpenVMS Representation (Single/Double precision floats in Digital G_FLOAT
    /// encoding)
    Ia64VmsG = 21,
}

impl CdfEncoding {
    /// Returns the endianness associated with this CDF data encoding.
    /// # Errors
    /// Returns [`CdfError::UnsupportedEncoding`] for representations whose floating-point
    /// format is not IEEE754.
    pub fn endianness(self) -> Result<Endian, CdfError> {
        match self {
            CdfEncoding::Network
            | CdfEncoding::Sun
            | CdfEncoding::Next
            | CdfEncoding::MacPpc
            | CdfEncoding::Sgi
            | CdfEncoding::IbmRs
            | CdfEncoding::ArmBig => Ok(Endian::Big),

            CdfEncoding::DecStation
            | CdfEncoding::IbmPc
            | CdfEncoding::AlphaOsf1
            | CdfEncoding::AlphaVmsI
            | CdfEncoding::ArmLittle
            | CdfEncoding::Ia64VmsI => Ok(Endian::Little),

            CdfEncoding::Vax => Err(CdfError::UnsupportedEncoding("VAX")),
            CdfEncoding::Hp => Err(CdfError::UnsupportedEncoding("HP 9000")),
            CdfEncoding::AlphaVmsD | CdfEncoding::Ia64VmsD => {
                Err(CdfError::UnsupportedEncoding("Digital D_FLOAT"))
            }
            CdfEncoding::AlphaVmsG | CdfEncoding::Ia64VmsG => {
                Err(CdfError::UnsupportedEncoding("Digital G_FLOAT"))
            }
        }
    }

    /// The integer written in the CDR for this encoding.
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for CdfEncoding {
    type Error = CdfError;
    fn try_from(value: i32) -> Result<Self, CdfError> {
        match value {
            1 => Ok(CdfEncoding::Network),
            2 => Ok(CdfEncoding::Sun),
            3 => Ok(CdfEncoding::Vax),
            4 => Ok(CdfEncoding::DecStation),
            5 => Ok(CdfEncoding::Sgi),
            6 => Ok(CdfEncoding::IbmPc),
            7 => Ok(CdfEncoding::IbmRs),
            9 => Ok(CdfEncoding::MacPpc),
            11 => Ok(CdfEncoding::Hp),
            12 => Ok(CdfEncoding::Next),
            13 => Ok(CdfEncoding::AlphaOsf1),
            14 => Ok(CdfEncoding::AlphaVmsD),
            15 => Ok(CdfEncoding::AlphaVmsG),
            16 => Ok(CdfEncoding::AlphaVmsI),
            17 => Ok(CdfEncoding::ArmLittle),
            18 => Ok(CdfEncoding::ArmBig),
            19 => Ok(CdfEncoding::Ia64VmsI),
            20 => Ok(CdfEncoding::Ia64VmsD),
            21 => Ok(CdfEncoding::Ia64VmsG),
            _ => Err(CdfError::UnsupportedEncoding("unknown encoding code")),
        }
    }
}

/// Enum to handle different endianess.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Endian {
    /// Big-Endian
    Big,
    /// Little-Endian
    Little,
}

/// Stores the version of the CDF in a simple implementation of semantic versioning.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CdfVersion {
    /// Major version
    pub major: u16,
    /// Minor version
    pub minor: u16,
    /// Patch version
    pub patch: u16,
}

impl CdfVersion {
    /// Create a new instance of this struct using user-defined values.
    pub fn new(major: u16, minor: u16, patch: u16) -> Self {
        CdfVersion {
            major,
            minor,
            patch,
        }
    }
}

/// Storage order of the dimensions within each variable record.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub enum CdfMajority {
    /// The last dimension varies fastest. This is the in-memory convention.
    #[default]
    Row,
    /// The first dimension varies fastest.
    Column,
}

/// Scope of an attribute, either global to the whole file or indexed per variable.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum AttributeScope {
    /// One entry per entry number, file-wide.
    Global,
    /// One entry per variable number.
    Variable,
}

impl AttributeScope {
    /// The integer written in the ADR for this scope.
    pub fn code(self) -> i32 {
        match self {
            AttributeScope::Global => 1,
            AttributeScope::Variable => 2,
        }
    }
}

impl TryFrom<i32> for AttributeScope {
    type Error = CdfError;
    fn try_from(value: i32) -> Result<Self, CdfError> {
        // 3 and 4 are the "assumed" scopes left behind by pre-v3 tools.
        match value {
            1 | 3 => Ok(AttributeScope::Global),
            2 | 4 => Ok(AttributeScope::Variable),
            v => Err(CdfError::CorruptedIndex(format!(
                "invalid attribute scope - {v}"
            ))),
        }
    }
}

/// Compression applied to a variable's data records or to the whole file.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub enum CdfCompression {
    /// No compression.
    #[default]
    None,
    /// Run-length encoding of zero bytes.
    Rle0,
    /// Huffman coding.
    Huffman,
    /// Adaptive Huffman coding.
    AdaptiveHuffman,
    /// Gzip compression with a level between 1 and 9.
    Gzip(u32),
}

impl CdfCompression {
    /// The compression type integer written in the CPR.
    pub fn code(self) -> i32 {
        match self {
            CdfCompression::None => 0,
            CdfCompression::Rle0 => 1,
            CdfCompression::Huffman => 2,
            CdfCompression::AdaptiveHuffman => 3,
            CdfCompression::Gzip(_) => 5,
        }
    }

    /// The single CPR parameter for this compression: the style of run-length
    /// or tree selection for the CDF-native algorithms, the level for gzip.
    pub fn parameter(self) -> i32 {
        match self {
            CdfCompression::Gzip(level) => level as i32,
            _ => 0,
        }
    }

    /// Human-readable algorithm name used in error reports.
    pub fn name(self) -> &'static str {
        match self {
            CdfCompression::None => "none",
            CdfCompression::Rle0 => "rle0",
            CdfCompression::Huffman => "huffman",
            CdfCompression::AdaptiveHuffman => "adaptive huffman",
            CdfCompression::Gzip(_) => "gzip",
        }
    }

    /// Rebuild the compression from the CPR type code and parameter list.
    /// # Errors
    /// Returns a [`CdfError::CorruptedIndex`] for an unknown code or an out-of-range gzip level.
    pub fn from_cpr(code: i32, parameters: &[i32]) -> Result<Self, CdfError> {
        match code {
            0 => Ok(CdfCompression::None),
            1 => Ok(CdfCompression::Rle0),
            2 => Ok(CdfCompression::Huffman),
            3 => Ok(CdfCompression::AdaptiveHuffman),
            5 => {
                let level = parameters.first().copied().unwrap_or(0);
                if !(1..=9).contains(&level) {
                    return Err(CdfError::CorruptedIndex(format!(
                        "invalid gzip level - {level}"
                    )));
                }
                Ok(CdfCompression::Gzip(level as u32))
            }
            v => Err(CdfError::CorruptedIndex(format!(
                "invalid compression code - {v}"
            ))),
        }
    }
}

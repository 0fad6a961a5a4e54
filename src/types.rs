/// The CDF format supports different data types like ints and floats of
/// different sizes. This module defines the closed set of type tags, the
/// tagged byte cell that carries every attribute entry, pad value and
/// variable slab, and the typed views onto it.
use crate::error::CdfError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The closed set of data types defined by the CDF specification, with their
/// wire codes as explicit discriminants.
#[repr(i32)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdfDataType {
    /// 1-byte signed integer.
    Int1 = 1,
    /// 2-byte signed integer.
    Int2 = 2,
    /// 4-byte signed integer.
    Int4 = 4,
    /// 8-byte signed integer.
    Int8 = 8,
    /// 1-byte unsigned integer.
    Uint1 = 11,
    /// 2-byte unsigned integer.
    Uint2 = 12,
    /// 4-byte unsigned integer.
    Uint4 = 14,
    /// IEEE754 single-precision float.
    Real4 = 21,
    /// IEEE754 double-precision float.
    Real8 = 22,
    /// Milliseconds since 0000-01-01T00:00:00, as a double.
    Epoch = 31,
    /// Picosecond-resolution time as a (seconds, picoseconds) pair of doubles.
    Epoch16 = 32,
    /// Nanoseconds since J2000 on the TT scale, as an 8-byte signed integer.
    TimeTt2000 = 33,
    /// 1-byte signed integer, historical alias of [`CdfDataType::Int1`].
    Byte = 41,
    /// IEEE754 single-precision float, historical alias of [`CdfDataType::Real4`].
    Float = 44,
    /// IEEE754 double-precision float, historical alias of [`CdfDataType::Real8`].
    Double = 45,
    /// Single byte of a character string.
    Char = 51,
    /// Single byte of an unsigned character string.
    Uchar = 52,
}

impl CdfDataType {
    /// Size in bytes of one element of this type.
    pub fn element_size(self) -> usize {
        match self {
            CdfDataType::Int1
            | CdfDataType::Uint1
            | CdfDataType::Byte
            | CdfDataType::Char
            | CdfDataType::Uchar => 1,
            CdfDataType::Int2 | CdfDataType::Uint2 => 2,
            CdfDataType::Int4 | CdfDataType::Uint4 | CdfDataType::Real4 | CdfDataType::Float => 4,
            CdfDataType::Int8
            | CdfDataType::Real8
            | CdfDataType::Epoch
            | CdfDataType::TimeTt2000
            | CdfDataType::Double => 8,
            CdfDataType::Epoch16 => 16,
        }
    }

    /// Width of the unit swapped when converting between big- and little-endian
    /// storage. Equal to the element size except for [`CdfDataType::Epoch16`],
    /// which is a pair of independently-swapped doubles.
    pub fn swap_width(self) -> usize {
        match self {
            CdfDataType::Epoch16 => 8,
            other => other.element_size(),
        }
    }

    /// Whether this type stores character strings.
    pub fn is_string(self) -> bool {
        matches!(self, CdfDataType::Char | CdfDataType::Uchar)
    }

    /// The wire code written in AEDRs and VDRs.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Human-readable tag name used in error reports.
    pub fn name(self) -> &'static str {
        match self {
            CdfDataType::Int1 => "CDF_INT1",
            CdfDataType::Int2 => "CDF_INT2",
            CdfDataType::Int4 => "CDF_INT4",
            CdfDataType::Int8 => "CDF_INT8",
            CdfDataType::Uint1 => "CDF_UINT1",
            CdfDataType::Uint2 => "CDF_UINT2",
            CdfDataType::Uint4 => "CDF_UINT4",
            CdfDataType::Real4 => "CDF_REAL4",
            CdfDataType::Real8 => "CDF_REAL8",
            CdfDataType::Epoch => "CDF_EPOCH",
            CdfDataType::Epoch16 => "CDF_EPOCH16",
            CdfDataType::TimeTt2000 => "CDF_TIME_TT2000",
            CdfDataType::Byte => "CDF_BYTE",
            CdfDataType::Float => "CDF_FLOAT",
            CdfDataType::Double => "CDF_DOUBLE",
            CdfDataType::Char => "CDF_CHAR",
            CdfDataType::Uchar => "CDF_UCHAR",
        }
    }

    /// Byte used to pad records when the variable declares no pad value:
    /// spaces for strings, zeros for everything else.
    pub fn default_pad_byte(self) -> u8 {
        if self.is_string() {
            0x20
        } else {
            0
        }
    }
}

impl TryFrom<i32> for CdfDataType {
    type Error = CdfError;
    fn try_from(value: i32) -> Result<Self, CdfError> {
        match value {
            1 => Ok(CdfDataType::Int1),
            2 => Ok(CdfDataType::Int2),
            4 => Ok(CdfDataType::Int4),
            8 => Ok(CdfDataType::Int8),
            11 => Ok(CdfDataType::Uint1),
            12 => Ok(CdfDataType::Uint2),
            14 => Ok(CdfDataType::Uint4),
            21 => Ok(CdfDataType::Real4),
            22 => Ok(CdfDataType::Real8),
            31 => Ok(CdfDataType::Epoch),
            32 => Ok(CdfDataType::Epoch16),
            33 => Ok(CdfDataType::TimeTt2000),
            41 => Ok(CdfDataType::Byte),
            44 => Ok(CdfDataType::Float),
            45 => Ok(CdfDataType::Double),
            51 => Ok(CdfDataType::Char),
            52 => Ok(CdfDataType::Uchar),
            v => Err(CdfError::CorruptedIndex(format!("invalid data type - {v}"))),
        }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Native Rust types that can view a [`DataCell`]. The set is closed; each
/// implementor lists the CDF tags it is byte-compatible with.
pub trait CdfValue: sealed::Sealed + Copy {
    /// Size of this value in bytes.
    const SIZE: usize;
    /// Name reported in [`CdfError::TypeMismatch`].
    const NAME: &'static str;
    /// Whether a cell tagged `data_type` can be viewed as this type.
    fn matches(data_type: CdfDataType) -> bool;
    /// Reassemble one value from little-endian bytes.
    fn from_le_bytes(bytes: &[u8]) -> Self;
    /// Append this value to `out` as little-endian bytes.
    fn write_le_bytes(self, out: &mut Vec<u8>);
}

macro_rules! impl_cdf_value {
    ($rust_type:ty, [$($tag:ident),+]) => {
        impl sealed::Sealed for $rust_type {}

        impl CdfValue for $rust_type {
            const SIZE: usize = std::mem::size_of::<$rust_type>();
            const NAME: &'static str = stringify!($rust_type);

            fn matches(data_type: CdfDataType) -> bool {
                matches!(data_type, $(CdfDataType::$tag)|+)
            }

            fn from_le_bytes(bytes: &[u8]) -> Self {
                <$rust_type>::from_le_bytes(bytes.try_into().unwrap())
            }

            fn write_le_bytes(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }
        }
    };
}

impl_cdf_value!(i8, [Int1, Byte]);
impl_cdf_value!(u8, [Uint1, Char, Uchar]);
impl_cdf_value!(i16, [Int2]);
impl_cdf_value!(u16, [Uint2]);
impl_cdf_value!(i32, [Int4]);
impl_cdf_value!(u32, [Uint4]);
impl_cdf_value!(i64, [Int8, TimeTt2000]);
impl_cdf_value!(f32, [Real4, Float]);
impl_cdf_value!(f64, [Real8, Double, Epoch, Epoch16]);

/// A tagged cell of values: the data type, the number of elements making up
/// one value (the declared string length for character types, 1 otherwise)
/// and the raw bytes in little-endian order.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct DataCell {
    data_type: CdfDataType,
    num_elems: usize,
    bytes: Vec<u8>,
}

impl DataCell {
    /// Build a cell from raw little-endian bytes.
    /// # Errors
    /// Returns a [`CdfError::TypeMismatch`] if the byte length is not a whole
    /// number of values, or if `num_elems` is used with a non-string type.
    pub fn from_bytes(
        data_type: CdfDataType,
        num_elems: usize,
        bytes: Vec<u8>,
    ) -> Result<Self, CdfError> {
        if num_elems == 0 || (num_elems != 1 && !data_type.is_string()) {
            return Err(CdfError::TypeMismatch {
                expected: "one element per value for non-string types",
                found: data_type.name(),
            });
        }
        let value_size = data_type.element_size() * num_elems;
        if bytes.len() % value_size != 0 {
            return Err(CdfError::TypeMismatch {
                expected: "a whole number of values",
                found: data_type.name(),
            });
        }
        Ok(DataCell {
            data_type,
            num_elems,
            bytes,
        })
    }

    /// Build a cell from a slice of native values.
    /// # Errors
    /// Returns a [`CdfError::TypeMismatch`] if `T` cannot view `data_type`.
    pub fn from_values<T: CdfValue>(
        data_type: CdfDataType,
        values: &[T],
    ) -> Result<Self, CdfError> {
        if !T::matches(data_type) {
            return Err(CdfError::TypeMismatch {
                expected: data_type.name(),
                found: T::NAME,
            });
        }
        let mut bytes = Vec::with_capacity(values.len() * T::SIZE);
        for value in values {
            value.write_le_bytes(&mut bytes);
        }
        DataCell::from_bytes(data_type, 1, bytes)
    }

    /// Build a single-value string cell. The declared string length becomes
    /// the byte length of `text` (at least one byte).
    /// # Errors
    /// Returns a [`CdfError::TypeMismatch`] if `data_type` is not a string type.
    pub fn from_string(data_type: CdfDataType, text: &str) -> Result<Self, CdfError> {
        if !data_type.is_string() {
            return Err(CdfError::TypeMismatch {
                expected: "CDF_CHAR or CDF_UCHAR",
                found: data_type.name(),
            });
        }
        let mut bytes = text.as_bytes().to_vec();
        if bytes.is_empty() {
            bytes.push(0x20);
        }
        let num_elems = bytes.len();
        Ok(DataCell {
            data_type,
            num_elems,
            bytes,
        })
    }

    /// A single default pad value of the given type.
    pub fn pad(data_type: CdfDataType, num_elems: usize) -> Self {
        let num_elems = if data_type.is_string() {
            num_elems.max(1)
        } else {
            1
        };
        DataCell {
            data_type,
            num_elems,
            bytes: vec![data_type.default_pad_byte(); data_type.element_size() * num_elems],
        }
    }

    /// The type tag of this cell.
    pub fn data_type(&self) -> CdfDataType {
        self.data_type
    }

    /// Elements per value: the declared string length for character types, 1 otherwise.
    pub fn num_elems(&self) -> usize {
        self.num_elems
    }

    /// Size in bytes of one value.
    pub fn value_size(&self) -> usize {
        self.data_type.element_size() * self.num_elems
    }

    /// Number of values stored in this cell.
    pub fn len(&self) -> usize {
        self.bytes.len() / self.value_size()
    }

    /// Whether the cell holds no values.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The raw little-endian bytes of this cell.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Typed copy of the cell contents.
    /// # Errors
    /// Returns a [`CdfError::TypeMismatch`] if `T` cannot view this cell's type.
    pub fn get<T: CdfValue>(&self) -> Result<Vec<T>, CdfError> {
        if !T::matches(self.data_type) {
            return Err(CdfError::TypeMismatch {
                expected: self.data_type.name(),
                found: T::NAME,
            });
        }
        Ok(self
            .bytes
            .chunks_exact(T::SIZE)
            .map(T::from_le_bytes)
            .collect())
    }

    /// The cell contents as text, with trailing NULs trimmed. Bytes that are
    /// not valid UTF-8 are replaced.
    /// # Errors
    /// Returns a [`CdfError::TypeMismatch`] for non-string cells.
    pub fn get_string(&self) -> Result<String, CdfError> {
        if !self.data_type.is_string() {
            return Err(CdfError::TypeMismatch {
                expected: "CDF_CHAR or CDF_UCHAR",
                found: self.data_type.name(),
            });
        }
        let end = self
            .bytes
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |pos| pos + 1);
        Ok(String::from_utf8_lossy(&self.bytes[..end]).into_owned())
    }

    /// Overwrite the cell contents in place. The replacement must match the
    /// cell's type and byte length exactly.
    /// # Errors
    /// Returns a [`CdfError::TypeMismatch`] on either mismatch.
    pub fn set<T: CdfValue>(&mut self, values: &[T]) -> Result<(), CdfError> {
        if !T::matches(self.data_type) {
            return Err(CdfError::TypeMismatch {
                expected: self.data_type.name(),
                found: T::NAME,
            });
        }
        if values.len() * T::SIZE != self.bytes.len() {
            return Err(CdfError::TypeMismatch {
                expected: "a replacement of the same byte length",
                found: T::NAME,
            });
        }
        self.bytes.clear();
        for value in values {
            value.write_le_bytes(&mut self.bytes);
        }
        Ok(())
    }
}

/// Swap every `width`-byte unit of `bytes` in place. Used to convert slabs
/// read from big-endian files into the little-endian in-memory convention
/// and back.
pub(crate) fn swap_bytes_in_place(bytes: &mut [u8], width: usize) {
    if width <= 1 {
        return;
    }
    for unit in bytes.chunks_exact_mut(width) {
        unit.reverse();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paste::paste;

    macro_rules! test_cell_type {
        ($rust_type:ty, $tag:ident, $val:expr) => {
            paste! {
                #[test]
                fn [< test_cell_roundtrip_ $tag:lower _ $rust_type >]() -> Result<(), CdfError> {
                    let values: Vec<$rust_type> = vec![$val; 7];
                    let cell = DataCell::from_values(CdfDataType::$tag, &values)?;
                    assert_eq!(cell.len(), 7);
                    assert_eq!(cell.get::<$rust_type>()?, values);
                    Ok(())
                }
            }
        };
    }

    test_cell_type!(i8, Int1, -7);
    test_cell_type!(i8, Byte, -7);
    test_cell_type!(i16, Int2, -7);
    test_cell_type!(i32, Int4, -7);
    test_cell_type!(i64, Int8, -7);
    test_cell_type!(i64, TimeTt2000, -7);
    test_cell_type!(u8, Uint1, 7);
    test_cell_type!(u16, Uint2, 7);
    test_cell_type!(u32, Uint4, 7);
    test_cell_type!(f32, Real4, -7.0);
    test_cell_type!(f32, Float, -7.0);
    test_cell_type!(f64, Real8, -7.0);
    test_cell_type!(f64, Double, -7.0);
    test_cell_type!(f64, Epoch, -7.0);

    #[test]
    fn test_cell_type_mismatch() -> Result<(), CdfError> {
        let cell = DataCell::from_values(CdfDataType::Real8, &[1.0f64, 2.0])?;
        assert!(matches!(
            cell.get::<f32>(),
            Err(CdfError::TypeMismatch { .. })
        ));
        assert!(DataCell::from_values(CdfDataType::Int4, &[1.0f64]).is_err());
        Ok(())
    }

    #[test]
    fn test_cell_string() -> Result<(), CdfError> {
        let cell = DataCell::from_string(CdfDataType::Char, "a cdf text attribute")?;
        assert_eq!(cell.len(), 1);
        assert_eq!(cell.num_elems(), 20);
        assert_eq!(cell.get_string()?, "a cdf text attribute");
        Ok(())
    }

    #[test]
    fn test_cell_epoch16_views_as_double_pairs() -> Result<(), CdfError> {
        let bytes = [1.0f64, 2.0, 3.0, 4.0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect::<Vec<u8>>();
        let cell = DataCell::from_bytes(CdfDataType::Epoch16, 1, bytes)?;
        assert_eq!(cell.len(), 2);
        assert_eq!(cell.get::<f64>()?, vec![1.0, 2.0, 3.0, 4.0]);
        Ok(())
    }

    #[test]
    fn test_cell_pad() {
        let cell = DataCell::pad(CdfDataType::Int4, 1);
        assert_eq!(cell.as_bytes(), &[0, 0, 0, 0]);
        let cell = DataCell::pad(CdfDataType::Char, 3);
        assert_eq!(cell.as_bytes(), b"   ");
    }

    #[test]
    fn test_cell_set_validates_size() -> Result<(), CdfError> {
        let mut cell = DataCell::from_values(CdfDataType::Real4, &[0.0f32; 4])?;
        cell.set(&[1.0f32, 2.0, 3.0, 4.0])?;
        assert_eq!(cell.get::<f32>()?, vec![1.0, 2.0, 3.0, 4.0]);
        assert!(cell.set(&[1.0f32]).is_err());
        Ok(())
    }

    #[test]
    fn test_swap_bytes_in_place() {
        let mut bytes = vec![1u8, 2, 3, 4, 5, 6, 7, 8];
        swap_bytes_in_place(&mut bytes, 4);
        assert_eq!(bytes, vec![4, 3, 2, 1, 8, 7, 6, 5]);
        swap_bytes_in_place(&mut bytes, 1);
        assert_eq!(bytes, vec![4, 3, 2, 1, 8, 7, 6, 5]);
    }
}

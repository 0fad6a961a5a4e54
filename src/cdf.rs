//! The in-memory object model: a [`Cdf`] owns its attributes and variables,
//! attributes own their entry cells, and variables own their data slab. All
//! on-disk offset references are resolved into this ownership tree during
//! decode.

use std::cell::OnceCell;

use crate::compress;
use crate::error::CdfError;
use crate::nomap::Nomap;
use crate::repr::{AttributeScope, CdfCompression, CdfMajority, CdfVersion};
use crate::types::{swap_bytes_in_place, CdfDataType, CdfValue, DataCell};

/// General struct to hold the contents of a CDF file.
#[derive(Debug, PartialEq)]
pub struct Cdf {
    /// Version triple recorded in the descriptor record.
    pub version: CdfVersion,
    /// Storage order of multi-dimensional records.
    pub majority: CdfMajority,
    /// Compression applied to the whole file when saved.
    pub compression: CdfCompression,
    /// Attributes by name, in insertion order.
    pub attributes: Nomap<Attribute>,
    /// Variables by name, in insertion order.
    pub variables: Nomap<Variable>,
}

impl Cdf {
    /// Create an empty file with row-major layout and no compression.
    pub fn new() -> Self {
        Cdf {
            version: CdfVersion::new(3, 8, 0),
            majority: CdfMajority::Row,
            compression: CdfCompression::None,
            attributes: Nomap::new(),
            variables: Nomap::new(),
        }
    }

    /// Add an attribute.
    /// # Errors
    /// Returns a [`CdfError::DuplicateName`] if one of the same name exists.
    pub fn add_attribute(&mut self, attribute: Attribute) -> Result<(), CdfError> {
        if self.attributes.contains(&attribute.name) {
            return Err(CdfError::DuplicateName(attribute.name));
        }
        self.attributes.insert(attribute.name.clone(), attribute);
        Ok(())
    }

    /// Add a variable, assigning it the next variable number.
    /// # Errors
    /// Returns a [`CdfError::DuplicateName`] if one of the same name exists.
    pub fn add_variable(&mut self, mut variable: Variable) -> Result<(), CdfError> {
        if self.variables.contains(&variable.name) {
            return Err(CdfError::DuplicateName(variable.name));
        }
        variable.num = self.variables.len() as i32;
        self.variables.insert(variable.name.clone(), variable);
        Ok(())
    }

    /// Remove a variable by name. The remaining variables are renumbered so
    /// the numbers stay dense.
    pub fn remove_variable(&mut self, name: &str) -> Option<Variable> {
        let removed = self.variables.remove(name)?;
        for variable in self.variables.values_mut() {
            if variable.num > removed.num {
                variable.num -= 1;
            }
        }
        Some(removed)
    }
}

impl Default for Cdf {
    fn default() -> Self {
        Cdf::new()
    }
}

/// One attribute entry: its entry number and value cell. Entry numbers index
/// positions for global attributes and variable numbers for variable
/// attributes; they are unique per attribute but need not be contiguous.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Entry {
    /// The entry number.
    pub number: i32,
    /// The entry value.
    pub cell: DataCell,
}

/// A named, scoped, ordered sequence of entries.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Attribute {
    /// Attribute name, at most 256 bytes on disk.
    pub name: String,
    /// Whether entries are indexed by position or by variable number.
    pub scope: AttributeScope,
    entries: Vec<Entry>,
}

impl Attribute {
    /// Create an attribute with no entries.
    pub fn new(name: impl Into<String>, scope: AttributeScope) -> Self {
        Attribute {
            name: name.into(),
            scope,
            entries: Vec::new(),
        }
    }

    /// Create a global attribute whose entries are numbered 0, 1, ...
    pub fn global(name: impl Into<String>, cells: Vec<DataCell>) -> Self {
        let entries = cells
            .into_iter()
            .enumerate()
            .map(|(number, cell)| Entry {
                number: number as i32,
                cell,
            })
            .collect();
        Attribute {
            name: name.into(),
            scope: AttributeScope::Global,
            entries,
        }
    }

    /// Append an entry.
    /// # Errors
    /// Returns a [`CdfError::CorruptedIndex`] if the entry number is taken.
    pub fn push_entry(&mut self, number: i32, cell: DataCell) -> Result<(), CdfError> {
        if self.entries.iter().any(|entry| entry.number == number) {
            return Err(CdfError::CorruptedIndex(format!(
                "duplicate entry number {number} in attribute {:?}",
                self.name
            )));
        }
        self.entries.push(Entry { number, cell });
        Ok(())
    }

    /// The entries in file order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Look up an entry cell by entry number.
    pub fn entry(&self, number: i32) -> Option<&DataCell> {
        self.entries
            .iter()
            .find(|entry| entry.number == number)
            .map(|entry| &entry.cell)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the attribute has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One run of data records copied out of the file, waiting to be decoded.
#[derive(Debug)]
pub(crate) struct Segment {
    first: u32,
    last: u32,
    compression: CdfCompression,
    bytes: Vec<u8>,
}

impl Segment {
    pub(crate) fn new(first: u32, last: u32, compression: CdfCompression, bytes: Vec<u8>) -> Self {
        Segment {
            first,
            last,
            compression,
            bytes,
        }
    }
}

/// The not-yet-decoded form of a variable's data: the index segments plus
/// everything needed to finish decoding them on first access.
#[derive(Debug)]
pub(crate) struct DeferredSlab {
    segments: Vec<Segment>,
    big_endian: bool,
    row_major: bool,
    s_records: i32,
    cell: OnceCell<DataCell>,
}

impl DeferredSlab {
    pub(crate) fn new(
        segments: Vec<Segment>,
        big_endian: bool,
        row_major: bool,
        s_records: i32,
    ) -> Self {
        DeferredSlab {
            segments,
            big_endian,
            row_major,
            s_records,
            cell: OnceCell::new(),
        }
    }
}

#[derive(Debug)]
enum VariableData {
    Materialized(DataCell),
    Deferred(DeferredSlab),
}

/// A typed, multi-dimensional variable and its record data.
#[derive(Debug)]
pub struct Variable {
    name: String,
    num: i32,
    data_type: CdfDataType,
    shape: Vec<u32>,
    dim_variances: Vec<bool>,
    record_variance: bool,
    num_elems: usize,
    max_rec: i32,
    /// Compression applied to this variable's data records on save.
    pub compression: CdfCompression,
    /// Records-per-index-entry hint carried through from the descriptor.
    pub blocking_factor: u32,
    pad: Option<DataCell>,
    data: VariableData,
}

impl Variable {
    /// Create a record-variant variable from a cell of data. The cell length
    /// must be a whole number of records of the given shape; every dimension
    /// varies.
    /// # Errors
    /// Returns a [`CdfError::TypeMismatch`] if the cell's tag disagrees, or a
    /// [`CdfError::CorruptedIndex`] for an impossible shape.
    pub fn new(
        name: impl Into<String>,
        data_type: CdfDataType,
        shape: Vec<u32>,
        data: DataCell,
    ) -> Result<Self, CdfError> {
        let name = name.into();
        if data.data_type() != data_type {
            return Err(CdfError::TypeMismatch {
                expected: data_type.name(),
                found: data.data_type().name(),
            });
        }
        let values_per_record: usize = shape.iter().map(|&s| s as usize).product();
        if values_per_record == 0 {
            return Err(CdfError::CorruptedIndex(format!(
                "variable {name:?} declares a zero-sized dimension"
            )));
        }
        if data.len() % values_per_record != 0 {
            return Err(CdfError::CorruptedIndex(format!(
                "variable {name:?} holds {} values, not a whole number of {values_per_record}-value records",
                data.len()
            )));
        }
        let records = data.len() / values_per_record;
        let dim_variances = vec![true; shape.len()];
        Ok(Variable {
            name,
            num: -1,
            data_type,
            num_elems: data.num_elems(),
            shape,
            dim_variances,
            record_variance: true,
            max_rec: records as i32 - 1,
            compression: CdfCompression::None,
            blocking_factor: 0,
            pad: None,
            data: VariableData::Materialized(data),
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_decode(
        name: String,
        num: i32,
        data_type: CdfDataType,
        shape: Vec<u32>,
        dim_variances: Vec<bool>,
        record_variance: bool,
        num_elems: usize,
        max_rec: i32,
        compression: CdfCompression,
        blocking_factor: u32,
        pad: Option<DataCell>,
        slab: DeferredSlab,
    ) -> Self {
        Variable {
            name,
            num,
            data_type,
            shape,
            dim_variances,
            record_variance,
            num_elems,
            max_rec,
            compression,
            blocking_factor,
            pad,
            data: VariableData::Deferred(slab),
        }
    }

    /// Variable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Variable number, a stable identifier dense over the file.
    pub fn num(&self) -> i32 {
        self.num
    }

    /// Declared data type.
    pub fn data_type(&self) -> CdfDataType {
        self.data_type
    }

    /// Declared dimension sizes, excluding the record dimension.
    pub fn shape(&self) -> &[u32] {
        &self.shape
    }

    /// Per-dimension variance.
    pub fn dim_variances(&self) -> &[bool] {
        &self.dim_variances
    }

    /// Whether each record holds distinct data.
    pub fn record_variance(&self) -> bool {
        self.record_variance
    }

    /// Elements per value: the declared string length for character
    /// variables, 1 otherwise.
    pub fn num_elems(&self) -> usize {
        self.num_elems
    }

    /// Highest record index, or -1 when there are none.
    pub fn max_rec(&self) -> i32 {
        self.max_rec
    }

    /// Number of logical records, counting virtual repetitions of a
    /// record-invariant variable.
    pub fn len(&self) -> usize {
        usize::try_from(self.max_rec + 1).unwrap_or(0)
    }

    /// Whether the variable holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The declared pad value, if any.
    pub fn pad(&self) -> Option<&DataCell> {
        self.pad.as_ref()
    }

    /// Switch between record-variant and record-invariant storage. Turning
    /// variance off requires at most one stored record; the virtual length
    /// can then be raised with [`Variable::set_len`].
    /// # Errors
    /// Returns a [`CdfError::CorruptedIndex`] if more than one record is
    /// already stored.
    pub fn set_record_variance(&mut self, record_variance: bool) -> Result<(), CdfError> {
        if !record_variance && self.records_stored() > 1 {
            return Err(CdfError::CorruptedIndex(format!(
                "variable {:?} stores {} records and cannot become record-invariant",
                self.name,
                self.records_stored()
            )));
        }
        if !self.record_variance && record_variance {
            self.max_rec = self.max_rec.min(0);
        }
        self.record_variance = record_variance;
        Ok(())
    }

    /// Set the number of logical records a record-invariant variable
    /// virtually repeats its stored record for.
    /// # Errors
    /// Returns a [`CdfError::CorruptedIndex`] on a record-variant variable.
    pub fn set_len(&mut self, records: usize) -> Result<(), CdfError> {
        if self.record_variance {
            return Err(CdfError::CorruptedIndex(format!(
                "variable {:?} is record-variant; its length follows its data",
                self.name
            )));
        }
        self.max_rec = records as i32 - 1;
        Ok(())
    }

    /// Declare a pad value for records no data was written for.
    /// # Errors
    /// Returns a [`CdfError::TypeMismatch`] unless the pad is a single value
    /// of the variable's type.
    pub fn set_pad(&mut self, pad: DataCell) -> Result<(), CdfError> {
        if pad.data_type() != self.data_type || pad.len() != 1 {
            return Err(CdfError::TypeMismatch {
                expected: self.data_type.name(),
                found: pad.data_type().name(),
            });
        }
        self.pad = Some(pad);
        Ok(())
    }

    /// Bytes in one value.
    pub(crate) fn value_size(&self) -> usize {
        self.data_type.element_size() * self.num_elems
    }

    /// Values in one stored record: the product of the varying dimensions.
    pub(crate) fn values_per_record(&self) -> usize {
        self.shape
            .iter()
            .zip(self.dim_variances.iter())
            .filter(|(_, &varies)| varies)
            .map(|(&size, _)| size as usize)
            .product()
    }

    /// Records physically stored: one for a record-invariant variable, the
    /// full count otherwise.
    pub(crate) fn records_stored(&self) -> u64 {
        if self.record_variance {
            u64::try_from(self.max_rec + 1).unwrap_or(0)
        } else {
            u64::from(self.max_rec >= 0)
        }
    }

    /// The materialized data slab, decoding it on first access if the file
    /// was loaded lazily.
    /// # Errors
    /// Returns the decode error of the deferred slab, if any.
    pub fn data(&self) -> Result<&DataCell, CdfError> {
        match &self.data {
            VariableData::Materialized(cell) => Ok(cell),
            VariableData::Deferred(slab) => {
                if slab.cell.get().is_none() {
                    let cell = self.materialize(slab)?;
                    // A race is impossible here (no Sync access); a second
                    // set is only reachable after the first succeeded.
                    let _ = slab.cell.set(cell);
                }
                Ok(slab.cell.get().expect("just initialized"))
            }
        }
    }

    /// Typed copy of every logical record. A record-invariant variable
    /// repeats its single stored record `len()` times.
    /// # Errors
    /// Returns a [`CdfError::TypeMismatch`] if `T` cannot view this type.
    pub fn get<T: CdfValue>(&self) -> Result<Vec<T>, CdfError> {
        let mut values = self.data()?.get::<T>()?;
        if !self.record_variance && self.max_rec > 0 && !values.is_empty() {
            let record = values.clone();
            for _ in 1..=self.max_rec {
                values.extend_from_slice(&record);
            }
        }
        Ok(values)
    }

    /// Replace the data slab in place. The replacement must match the
    /// variable's type and shape.
    /// # Errors
    /// Returns a [`CdfError::TypeMismatch`] on a type change, or a
    /// [`CdfError::CorruptedIndex`] if the length is not a whole number of
    /// records.
    pub fn set_data(&mut self, data: DataCell) -> Result<(), CdfError> {
        if data.data_type() != self.data_type || data.num_elems() != self.num_elems {
            return Err(CdfError::TypeMismatch {
                expected: self.data_type.name(),
                found: data.data_type().name(),
            });
        }
        let values_per_record = self.values_per_record();
        if values_per_record == 0 || data.len() % values_per_record != 0 {
            return Err(CdfError::CorruptedIndex(format!(
                "variable {:?} takes {values_per_record}-value records, got {} values",
                self.name,
                data.len()
            )));
        }
        let records = data.len() / values_per_record;
        if self.record_variance {
            self.max_rec = records as i32 - 1;
        } else if records > 1 {
            return Err(CdfError::CorruptedIndex(format!(
                "variable {:?} is record-invariant but got {records} records",
                self.name
            )));
        }
        self.data = VariableData::Materialized(data);
        Ok(())
    }

    /// Decode the deferred segments into one contiguous slab.
    fn materialize(&self, slab: &DeferredSlab) -> Result<DataCell, CdfError> {
        let value_size = self.value_size();
        let record_bytes = self.values_per_record() * value_size;
        let records = usize::try_from(self.records_stored())?;
        let mut bytes = vec![0u8; records * record_bytes];

        // Pad policy first; segments overwrite the records they cover.
        let pad_pattern = match &self.pad {
            Some(cell) => cell.as_bytes().to_vec(),
            None => vec![self.data_type.default_pad_byte(); value_size],
        };
        if !pad_pattern.is_empty() {
            for chunk in bytes.chunks_exact_mut(pad_pattern.len()) {
                chunk.copy_from_slice(&pad_pattern);
            }
        }

        let mut covered = vec![false; records];
        for segment in &slab.segments {
            let first = segment.first as usize;
            let last = segment.last as usize;
            if first > last || last >= records {
                return Err(CdfError::CorruptedIndex(format!(
                    "index entry [{first}, {last}] outside the {records} stored records"
                )));
            }
            for record in covered.iter_mut().take(last + 1).skip(first) {
                if *record {
                    return Err(CdfError::CorruptedIndex(format!(
                        "overlapping index entries at records [{first}, {last}]"
                    )));
                }
                *record = true;
            }

            let needed = (last - first + 1) * record_bytes;
            let start = first * record_bytes;
            match segment.compression {
                CdfCompression::None => {
                    // Data records may be over-allocated; short ones are corrupt.
                    if segment.bytes.len() < needed {
                        return Err(CdfError::CorruptedIndex(format!(
                            "data record holds {} bytes, records [{first}, {last}] need {needed}",
                            segment.bytes.len()
                        )));
                    }
                    bytes[start..start + needed].copy_from_slice(&segment.bytes[..needed]);
                }
                compression => {
                    let inflated = compress::inflate(compression, &segment.bytes)?;
                    if inflated.len() != needed {
                        return Err(CdfError::CorruptedIndex(format!(
                            "compressed record inflated to {} bytes, records [{first}, {last}] need {needed}",
                            inflated.len()
                        )));
                    }
                    bytes[start..start + needed].copy_from_slice(&inflated);
                }
            }
        }

        // Missing records fall back to the previous present record when the
        // descriptor asks for it.
        if slab.s_records == 2 && record_bytes > 0 {
            let mut previous: Option<usize> = None;
            for record in 0..records {
                if covered[record] {
                    previous = Some(record);
                } else if let Some(source) = previous {
                    let (src, dst) = (source * record_bytes, record * record_bytes);
                    bytes.copy_within(src..src + record_bytes, dst);
                }
            }
        }

        if slab.big_endian && !self.data_type.is_string() {
            swap_bytes_in_place(&mut bytes, self.data_type.swap_width());
        }

        if !slab.row_major {
            self.transpose_records(&mut bytes, true);
        }

        DataCell::from_bytes(self.data_type, self.num_elems.max(1), bytes)
    }

    /// Rearrange a row-major slab into column-major record layout for the
    /// encoder. Scalars and rank-1 records are unaffected.
    pub(crate) fn transpose_to_column_major(&self, bytes: &mut Vec<u8>) {
        self.transpose_records(bytes, false);
    }

    fn transpose_records(&self, bytes: &mut Vec<u8>, to_row_major: bool) {
        let dims: Vec<usize> = self
            .shape
            .iter()
            .zip(self.dim_variances.iter())
            .filter(|(_, &varies)| varies)
            .map(|(&size, _)| size as usize)
            .collect();
        transpose_slab(bytes, &dims, self.value_size(), to_row_major);
    }
}

impl PartialEq for Variable {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.num == other.num
            && self.data_type == other.data_type
            && self.shape == other.shape
            && self.dim_variances == other.dim_variances
            && self.record_variance == other.record_variance
            && self.num_elems == other.num_elems
            && self.max_rec == other.max_rec
            && self.compression == other.compression
            && self.pad == other.pad
            && match (self.data(), other.data()) {
                (Ok(left), Ok(right)) => left == right,
                _ => false,
            }
    }
}

/// Permute each record of a slab between row-major and column-major element
/// order. Rank 0 and rank 1 records have a single linearization, so they
/// pass through untouched.
fn transpose_slab(bytes: &mut Vec<u8>, dims: &[usize], value_size: usize, to_row_major: bool) {
    if dims.len() < 2 || value_size == 0 {
        return;
    }
    let values: usize = dims.iter().product();
    let record_bytes = values * value_size;
    if record_bytes == 0 || bytes.len() % record_bytes != 0 {
        return;
    }

    // Column-major strides: the first dimension varies fastest.
    let mut col_strides = vec![1usize; dims.len()];
    for dim in 1..dims.len() {
        col_strides[dim] = col_strides[dim - 1] * dims[dim - 1];
    }

    let mut scratch = vec![0u8; record_bytes];
    for record in bytes.chunks_exact_mut(record_bytes) {
        scratch.copy_from_slice(record);
        let mut coords = vec![0usize; dims.len()];
        for row_index in 0..values {
            let col_index: usize = coords
                .iter()
                .zip(col_strides.iter())
                .map(|(&coord, &stride)| coord * stride)
                .sum();
            let (from, to) = if to_row_major {
                (col_index, row_index)
            } else {
                (row_index, col_index)
            };
            record[to * value_size..(to + 1) * value_size]
                .copy_from_slice(&scratch[from * value_size..(from + 1) * value_size]);

            // Row-major order: the last coordinate varies fastest.
            for dim in (0..dims.len()).rev() {
                coords[dim] += 1;
                if coords[dim] < dims[dim] {
                    break;
                }
                coords[dim] = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doubles(count: usize) -> DataCell {
        let values: Vec<f64> = (0..count).map(|i| i as f64).collect();
        DataCell::from_values(CdfDataType::Real8, &values).expect("valid cell")
    }

    #[test]
    fn test_add_variable_assigns_dense_numbers() -> Result<(), CdfError> {
        let mut cdf = Cdf::new();
        cdf.add_variable(Variable::new("a", CdfDataType::Real8, vec![], doubles(3))?)?;
        cdf.add_variable(Variable::new("b", CdfDataType::Real8, vec![2], doubles(4))?)?;
        assert_eq!(cdf.variables["a"].num(), 0);
        assert_eq!(cdf.variables["b"].num(), 1);

        let duplicate = Variable::new("a", CdfDataType::Real8, vec![], doubles(1))?;
        assert!(matches!(
            cdf.add_variable(duplicate),
            Err(CdfError::DuplicateName(_))
        ));
        Ok(())
    }

    #[test]
    fn test_remove_variable_renumbers() -> Result<(), CdfError> {
        let mut cdf = Cdf::new();
        for name in ["a", "b", "c"] {
            cdf.add_variable(Variable::new(name, CdfDataType::Real8, vec![], doubles(1))?)?;
        }
        cdf.remove_variable("b");
        assert_eq!(cdf.variables["a"].num(), 0);
        assert_eq!(cdf.variables["c"].num(), 1);
        Ok(())
    }

    #[test]
    fn test_variable_shape_and_len() -> Result<(), CdfError> {
        let variable = Variable::new("var3d", CdfDataType::Real8, vec![3, 2], doubles(24))?;
        assert_eq!(variable.shape(), &[3, 2]);
        assert_eq!(variable.len(), 4);
        assert_eq!(variable.get::<f64>()?.len(), 24);
        assert!(Variable::new("bad", CdfDataType::Real8, vec![5], doubles(24)).is_err());
        Ok(())
    }

    #[test]
    fn test_attribute_entry_numbers_are_unique() {
        let mut attribute = Attribute::new("attr", AttributeScope::Global);
        attribute.push_entry(0, doubles(1)).expect("first entry");
        attribute.push_entry(2, doubles(1)).expect("sparse entry");
        assert!(attribute.push_entry(2, doubles(1)).is_err());
        assert_eq!(attribute.len(), 2);
        assert!(attribute.entry(1).is_none());
        assert!(attribute.entry(2).is_some());
    }

    #[test]
    fn test_record_invariant_expansion() -> Result<(), CdfError> {
        let mut variable = Variable::new("nrv", CdfDataType::Real8, vec![2], doubles(2))?;
        variable.set_record_variance(false)?;
        variable.set_len(5)?;
        assert_eq!(variable.len(), 5);
        let values = variable.get::<f64>()?;
        assert_eq!(values.len(), 10);
        assert_eq!(&values[8..], &values[0..2]);

        let mut full = Variable::new("rv", CdfDataType::Real8, vec![], doubles(3))?;
        assert!(full.set_record_variance(false).is_err());
        assert!(full.set_len(7).is_err());
        Ok(())
    }

    fn deferred(
        segments: Vec<Segment>,
        big_endian: bool,
        records: usize,
        pad: Option<DataCell>,
        s_records: i32,
    ) -> Variable {
        Variable::from_decode(
            "deferred".to_string(),
            0,
            CdfDataType::Int2,
            vec![2],
            vec![true],
            true,
            1,
            records as i32 - 1,
            CdfCompression::None,
            0,
            pad,
            DeferredSlab::new(segments, big_endian, true, s_records),
        )
    }

    #[test]
    fn test_materialize_fills_uncovered_records_with_pad() -> Result<(), CdfError> {
        let pad = DataCell::from_values(CdfDataType::Int2, &[-9i16])?;
        let segment = Segment::new(1, 1, CdfCompression::None, vec![1, 0, 2, 0]);
        let variable = deferred(vec![segment], false, 3, Some(pad), 0);
        assert_eq!(variable.get::<i16>()?, vec![-9, -9, 1, 2, -9, -9]);
        Ok(())
    }

    #[test]
    fn test_materialize_default_pad_is_zero() -> Result<(), CdfError> {
        let variable = deferred(vec![], false, 2, None, 0);
        assert_eq!(variable.get::<i16>()?, vec![0, 0, 0, 0]);
        Ok(())
    }

    #[test]
    fn test_materialize_rejects_overlap() {
        let segments = vec![
            Segment::new(0, 1, CdfCompression::None, vec![0u8; 8]),
            Segment::new(1, 2, CdfCompression::None, vec![0u8; 8]),
        ];
        let variable = deferred(segments, false, 3, None, 0);
        assert!(matches!(
            variable.data(),
            Err(CdfError::CorruptedIndex(_))
        ));
    }

    #[test]
    fn test_materialize_rejects_short_data_record() {
        let segment = Segment::new(0, 1, CdfCompression::None, vec![0u8; 4]);
        let variable = deferred(vec![segment], false, 2, None, 0);
        assert!(matches!(
            variable.data(),
            Err(CdfError::CorruptedIndex(_))
        ));
    }

    #[test]
    fn test_materialize_previous_record_fill() -> Result<(), CdfError> {
        let segment = Segment::new(0, 0, CdfCompression::None, vec![7, 0, 8, 0]);
        let variable = deferred(vec![segment], false, 3, None, 2);
        assert_eq!(variable.get::<i16>()?, vec![7, 8, 7, 8, 7, 8]);
        Ok(())
    }

    #[test]
    fn test_materialize_swaps_big_endian_payloads() -> Result<(), CdfError> {
        let bytes: Vec<u8> = [258i16, 3]
            .iter()
            .flat_map(|v| v.to_be_bytes())
            .collect();
        let segment = Segment::new(0, 0, CdfCompression::None, bytes);
        let variable = deferred(vec![segment], true, 1, None, 0);
        assert_eq!(variable.get::<i16>()?, vec![258, 3]);
        Ok(())
    }

    #[test]
    fn test_materialize_compressed_length_mismatch() -> Result<(), CdfError> {
        let packed = compress::deflate(CdfCompression::Rle0, &[0u8; 12])?;
        let segment = Segment::new(0, 1, CdfCompression::Rle0, packed);
        let variable = deferred(vec![segment], false, 2, None, 0);
        assert!(matches!(
            variable.data(),
            Err(CdfError::CorruptedIndex(_))
        ));
        Ok(())
    }

    #[test]
    fn test_materialize_compressed_segment() -> Result<(), CdfError> {
        let raw: Vec<u8> = [1i16, 2, 3, 4]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let packed = compress::deflate(CdfCompression::Gzip(6), &raw)?;
        let segment = Segment::new(0, 1, CdfCompression::Gzip(6), packed);
        let variable = deferred(vec![segment], false, 2, None, 0);
        assert_eq!(variable.get::<i16>()?, vec![1, 2, 3, 4]);
        Ok(())
    }

    #[test]
    fn test_set_data_validates() -> Result<(), CdfError> {
        let mut variable = Variable::new("v", CdfDataType::Real8, vec![2], doubles(4))?;
        variable.set_data(doubles(6))?;
        assert_eq!(variable.len(), 3);
        assert!(variable.set_data(doubles(3)).is_err());
        let floats = DataCell::from_values(CdfDataType::Real4, &[0f32; 4])?;
        assert!(matches!(
            variable.set_data(floats),
            Err(CdfError::TypeMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_set_pad_validates_type() -> Result<(), CdfError> {
        let mut variable = Variable::new("v", CdfDataType::Real8, vec![], doubles(2))?;
        variable.set_pad(DataCell::from_values(CdfDataType::Real8, &[-1.0f64])?)?;
        assert!(variable
            .set_pad(DataCell::from_values(CdfDataType::Real4, &[-1.0f32])?)
            .is_err());
        Ok(())
    }

    #[test]
    fn test_transpose_slab_rank2() {
        // A 2x3 record stored column-major: columns (0,3), (1,4), (2,5).
        let mut bytes = vec![0u8, 3, 1, 4, 2, 5];
        transpose_slab(&mut bytes, &[2, 3], 1, true);
        assert_eq!(bytes, vec![0, 1, 2, 3, 4, 5]);
        transpose_slab(&mut bytes, &[2, 3], 1, false);
        assert_eq!(bytes, vec![0, 3, 1, 4, 2, 5]);
    }

    #[test]
    fn test_transpose_slab_ignores_low_rank() {
        let mut bytes = vec![1u8, 2, 3, 4];
        transpose_slab(&mut bytes, &[4], 1, true);
        assert_eq!(bytes, vec![1, 2, 3, 4]);
        transpose_slab(&mut bytes, &[], 1, true);
        assert_eq!(bytes, vec![1, 2, 3, 4]);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_attribute_serializes() {
        let attribute = Attribute::global(
            "attr",
            vec![DataCell::from_string(CdfDataType::Char, "hello").expect("valid cell")],
        );
        let json = serde_json::to_string(&attribute).expect("serializable");
        assert!(json.contains("attr"));
    }
}

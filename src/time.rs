//! Conversions between the three CDF time encodings and a common axis of
//! signed nanoseconds since 1970-01-01T00:00:00 UTC.
//!
//! `tt2000` values tick at TAI rate, so converting them requires the
//! cumulative TAI-UTC leap second count at that instant. The table lives in
//! process-wide state so a newly announced leap second can be installed
//! without rebuilding; lookups clone an [`Arc`] snapshot and never hold the
//! lock while converting.

use std::sync::{Arc, PoisonError, RwLock};

use lazy_static::lazy_static;

use crate::error::CdfError;

/// Milliseconds between 0000-01-01T00:00:00 and 1970-01-01T00:00:00.
const MS_FROM_0AD_TO_1970: f64 = 62_167_219_200_000.0;

/// Seconds between 0000-01-01T00:00:00 and 1970-01-01T00:00:00.
const SECONDS_FROM_0AD_TO_1970: i64 = 62_167_219_200;

/// J2000 (2000-01-01T12:00:00 TT) on the ns-from-1970 axis before the leap
/// second correction is applied: `ns1970 = tt2000 + OFFSET - leap(tt2000)e9`.
/// The constant folds J2000's UTC reading (11:58:55.816) together with the
/// 32 leap seconds current at J2000.
const TT2000_NS1970_OFFSET: i64 = 946_727_967_816_000_000;

/// The IERS leap second table as `(tt2000 threshold, cumulative TAI-UTC
/// seconds at and after that instant)`, 1972-01-01 through 2017-01-01.
pub const DEFAULT_LEAP_SECONDS: [(i64, i64); 28] = [
    (-883_655_957_816_000_000, 10),
    (-867_931_156_816_000_000, 11),
    (-852_033_555_816_000_000, 12),
    (-820_497_554_816_000_000, 13),
    (-788_961_553_816_000_000, 14),
    (-757_425_552_816_000_000, 15),
    (-725_803_151_816_000_000, 16),
    (-694_267_150_816_000_000, 17),
    (-662_731_149_816_000_000, 18),
    (-631_195_148_816_000_000, 19),
    (-583_934_347_816_000_000, 20),
    (-552_398_346_816_000_000, 21),
    (-520_862_345_816_000_000, 22),
    (-457_703_944_816_000_000, 23),
    (-378_734_343_816_000_000, 24),
    (-315_575_942_816_000_000, 25),
    (-284_039_941_816_000_000, 26),
    (-236_779_140_816_000_000, 27),
    (-205_243_139_816_000_000, 28),
    (-173_707_138_816_000_000, 29),
    (-126_273_537_816_000_000, 30),
    (-79_012_736_816_000_000, 31),
    (-31_579_135_816_000_000, 32),
    (189_345_665_184_000_000, 33),
    (284_040_066_184_000_000, 34),
    (394_372_867_184_000_000, 35),
    (488_980_868_184_000_000, 36),
    (536_500_869_184_000_000, 37),
];

lazy_static! {
    static ref LEAP_SECONDS: RwLock<Arc<Vec<(i64, i64)>>> =
        RwLock::new(Arc::new(DEFAULT_LEAP_SECONDS.to_vec()));
}

fn leap_table() -> Arc<Vec<(i64, i64)>> {
    LEAP_SECONDS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Atomically replace the process-wide leap second table, e.g. after a new
/// leap second is announced. The table must be strictly ascending in both
/// the threshold and the cumulative count, with the count growing by one per
/// entry; conversions running concurrently keep the snapshot they started
/// with.
/// # Errors
/// Returns a [`CdfError::CorruptedIndex`] if the table is malformed.
pub fn replace_leap_seconds(table: Vec<(i64, i64)>) -> Result<(), CdfError> {
    let well_formed = table
        .windows(2)
        .all(|pair| pair[0].0 < pair[1].0 && pair[0].1 + 1 == pair[1].1);
    if table.is_empty() || !well_formed {
        return Err(CdfError::CorruptedIndex(
            "leap second table is not strictly ascending".to_string(),
        ));
    }
    *LEAP_SECONDS
        .write()
        .unwrap_or_else(PoisonError::into_inner) = Arc::new(table);
    Ok(())
}

/// Cumulative TAI-UTC seconds at the instant `tt2000`, by binary search over
/// the sorted thresholds.
pub fn leap_second(tt2000: i64) -> i64 {
    leap_in(&leap_table(), tt2000)
}

/// Cumulative TAI-UTC seconds at the instant `tt2000`, as a comparison-count
/// scan with no data-dependent branches. Produces bit-identical results to
/// [`leap_second`].
pub fn leap_second_branchless(tt2000: i64) -> i64 {
    leap_branchless_in(&leap_table(), tt2000)
}

fn leap_in(table: &[(i64, i64)], tt2000: i64) -> i64 {
    let index = table.partition_point(|&(threshold, _)| threshold <= tt2000);
    match index {
        0 => table.first().map_or(0, |&(_, count)| count - 1),
        _ => table[index - 1].1,
    }
}

#[inline(always)]
fn leap_branchless_in(table: &[(i64, i64)], tt2000: i64) -> i64 {
    let base = table.first().map_or(0, |&(_, count)| count - 1);
    let crossed: i64 = table
        .iter()
        .map(|&(threshold, _)| i64::from(tt2000 >= threshold))
        .sum();
    base + crossed
}

/// A CDF time value convertible to and from the ns-from-1970 axis.
pub trait CdfTime: Copy {
    /// This instant as nanoseconds since 1970-01-01T00:00:00 UTC.
    fn to_ns_from_1970(self) -> i64;
    /// The instant at `ns` nanoseconds since 1970-01-01T00:00:00 UTC.
    fn from_ns_from_1970(ns: i64) -> Self;

    #[doc(hidden)]
    fn convert_batch(input: &[Self], output: &mut [i64]) {
        for (value, out) in input.iter().zip(output.iter_mut()) {
            *out = value.to_ns_from_1970();
        }
    }
}

/// Milliseconds since 0000-01-01T00:00:00, stored as a double.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Epoch(pub f64);

impl CdfTime for Epoch {
    fn to_ns_from_1970(self) -> i64 {
        ((self.0 - MS_FROM_0AD_TO_1970) * 1e6) as i64
    }

    fn from_ns_from_1970(ns: i64) -> Self {
        Epoch(ns as f64 / 1e6 + MS_FROM_0AD_TO_1970)
    }
}

/// Seconds since 0000-01-01T00:00:00 plus picoseconds within that second,
/// stored as a pair of doubles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Epoch16 {
    /// Whole seconds since 0000-01-01T00:00:00.
    pub seconds: f64,
    /// Picoseconds within the current second.
    pub picoseconds: f64,
}

impl CdfTime for Epoch16 {
    fn to_ns_from_1970(self) -> i64 {
        let seconds = self.seconds as i64 - SECONDS_FROM_0AD_TO_1970;
        seconds * 1_000_000_000 + (self.picoseconds / 1e3).round() as i64
    }

    fn from_ns_from_1970(ns: i64) -> Self {
        Epoch16 {
            seconds: (ns.div_euclid(1_000_000_000) + SECONDS_FROM_0AD_TO_1970) as f64,
            picoseconds: (ns.rem_euclid(1_000_000_000) * 1000) as f64,
        }
    }
}

/// Nanoseconds since J2000 on the TT scale, stored as a signed 64-bit
/// integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tt2000(pub i64);

impl CdfTime for Tt2000 {
    fn to_ns_from_1970(self) -> i64 {
        self.0 + TT2000_NS1970_OFFSET - leap_second(self.0) * 1_000_000_000
    }

    /// Solves `t = ns - OFFSET + leap(t)e9` by fixed-point iteration; the
    /// leap count moves by at most one per step, so two steps settle it.
    fn from_ns_from_1970(ns: i64) -> Self {
        let table = leap_table();
        let mut t = ns - TT2000_NS1970_OFFSET;
        for _ in 0..3 {
            let next = ns - TT2000_NS1970_OFFSET + leap_in(&table, t) * 1_000_000_000;
            if next == t {
                break;
            }
            t = next;
        }
        Tt2000(t)
    }

    fn convert_batch(input: &[Self], output: &mut [i64]) {
        let table = leap_table();
        convert_tt2000_chunks(&table, input, output);
    }
}

/// Convert a batch of any CDF time encoding onto the ns-from-1970 axis.
/// `output` must be exactly as long as `input`.
pub fn to_ns_from_1970<T: CdfTime>(input: &[T], output: &mut [i64]) {
    assert_eq!(input.len(), output.len());
    T::convert_batch(input, output);
}

/// Scalar reference for the batch conversion; the batch kernels must match
/// this output byte for byte.
pub fn scalar_to_ns_from_1970<T: CdfTime>(input: &[T], output: &mut [i64]) {
    assert_eq!(input.len(), output.len());
    for (value, out) in input.iter().zip(output.iter_mut()) {
        *out = value.to_ns_from_1970();
    }
}

const BATCH_CHUNK: usize = 64;

/// Chunked tt2000 kernel, written so the straight-line integer arithmetic of
/// each chunk auto-vectorizes. Inputs are usually sorted, so once a whole
/// chunk sits past the final leap threshold the conversion collapses to a
/// single addition; mixed or out-of-order chunks take the branchless
/// per-element path and stay exact.
fn convert_tt2000_chunks(table: &[(i64, i64)], input: &[Tt2000], output: &mut [i64]) {
    let (last_threshold, last_count) = table.last().copied().unwrap_or((i64::MIN, 0));
    let settled_offset = TT2000_NS1970_OFFSET - last_count * 1_000_000_000;

    for (chunk_in, chunk_out) in input
        .chunks(BATCH_CHUNK)
        .zip(output.chunks_mut(BATCH_CHUNK))
    {
        let chunk_min = chunk_in.iter().map(|t| t.0).fold(i64::MAX, i64::min);
        if chunk_min >= last_threshold {
            for (t, out) in chunk_in.iter().zip(chunk_out.iter_mut()) {
                *out = t.0 + settled_offset;
            }
        } else {
            for (t, out) in chunk_in.iter().zip(chunk_out.iter_mut()) {
                *out = t.0 + TT2000_NS1970_OFFSET
                    - leap_branchless_in(table, t.0) * 1_000_000_000;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leap_table_fixpoints() {
        for &(threshold, count) in DEFAULT_LEAP_SECONDS.iter() {
            assert_eq!(leap_second(threshold), count);
            assert_eq!(leap_second(threshold - 1), count - 1);
            assert_eq!(leap_second_branchless(threshold), count);
            assert_eq!(leap_second_branchless(threshold - 1), count - 1);
        }
    }

    #[test]
    fn test_leap_lookups_agree_everywhere() {
        let mut t = -900_000_000_000_000_000i64;
        while t < 700_000_000_000_000_000 {
            assert_eq!(leap_second(t), leap_second_branchless(t), "at {t}");
            t += 86_400_000_000_007;
        }
    }

    #[test]
    fn test_tt2000_reference_instants() {
        // J2000 itself reads 11:58:55.816 UTC.
        assert_eq!(Tt2000(0).to_ns_from_1970(), 946_727_935_816_000_000);
        // 2020-01-01T00:00:00 UTC.
        assert_eq!(
            Tt2000(631_108_869_184_000_000).to_ns_from_1970(),
            1_577_836_800_000_000_000
        );
    }

    #[test]
    fn test_tt2000_2016_leap_boundary() {
        let threshold = 536_500_869_184_000_000;
        // 2016-12-31T23:59:59 UTC.
        assert_eq!(
            Tt2000(threshold - 2_000_000_000).to_ns_from_1970(),
            1_483_228_799_000_000_000
        );
        // The last nanosecond before the table flips to 37 seconds.
        assert_eq!(
            Tt2000(threshold - 1_000_000_001).to_ns_from_1970(),
            1_483_228_799_999_999_999
        );
        // 2017-01-01T00:00:00 UTC.
        assert_eq!(
            Tt2000(threshold).to_ns_from_1970(),
            1_483_228_800_000_000_000
        );
    }

    #[test]
    fn test_epoch_1970_is_zero() {
        assert_eq!(Epoch(62_167_219_200_000.0).to_ns_from_1970(), 0);
        assert_eq!(Epoch::from_ns_from_1970(0), Epoch(62_167_219_200_000.0));
    }

    #[test]
    fn test_epoch_roundtrip_at_ms_resolution() {
        for ms in [0.0f64, 1.0, 123_456_789.0, 1_577_836_800_000.0] {
            let epoch = Epoch(MS_FROM_0AD_TO_1970 + ms);
            let back = Epoch::from_ns_from_1970(epoch.to_ns_from_1970());
            assert!((back.0 - epoch.0).abs() < 1.0, "{ms}");
        }
    }

    #[test]
    fn test_epoch16_roundtrip_at_ns_resolution() {
        let value = Epoch16 {
            seconds: (SECONDS_FROM_0AD_TO_1970 + 1_577_836_800) as f64,
            picoseconds: 123_456_789_000.0,
        };
        let ns = value.to_ns_from_1970();
        assert_eq!(ns, 1_577_836_800_000_000_000 + 123_456_789);
        assert_eq!(Epoch16::from_ns_from_1970(ns), value);
    }

    #[test]
    fn test_tt2000_roundtrip() {
        // The second on either side of a leap threshold shares its reading
        // on the leap-free axis with the inserted second, so round-trip
        // identity holds everywhere except that degenerate window.
        for t in [
            -883_655_957_816_000_000 + 1_000_000_000,
            -31_579_135_816_000_000 + 86_400_000_000_000,
            0,
            189_345_665_184_000_000 + 1_000_000_000,
            536_500_869_184_000_000 + 1_000_000_000,
            631_108_869_184_000_000,
        ] {
            let value = Tt2000(t);
            assert_eq!(
                Tt2000::from_ns_from_1970(value.to_ns_from_1970()),
                value,
                "at {t}"
            );
        }
    }

    #[test]
    fn test_batch_matches_scalar() {
        let inputs: Vec<Tt2000> = (0..1024)
            .map(|i| Tt2000(-869_399_957_816_000_000 + i * 1_000_000_000))
            .collect();
        let mut expected = vec![0i64; inputs.len()];
        scalar_to_ns_from_1970(&inputs, &mut expected);
        let mut outputs = vec![0i64; inputs.len()];
        to_ns_from_1970(&inputs, &mut outputs);
        assert_eq!(outputs, expected);
    }

    #[test]
    fn test_batch_matches_scalar_unsorted() {
        let mut inputs: Vec<Tt2000> = (0..333)
            .map(|i| Tt2000(600_000_000_000_000_000 - i * 3_000_000_000_000_000))
            .collect();
        inputs.push(Tt2000(i64::from(u16::MAX)));
        let mut expected = vec![0i64; inputs.len()];
        scalar_to_ns_from_1970(&inputs, &mut expected);
        let mut outputs = vec![0i64; inputs.len()];
        to_ns_from_1970(&inputs, &mut outputs);
        assert_eq!(outputs, expected);
    }

    #[test]
    fn test_batch_epoch_kinds() {
        let epochs = vec![Epoch(MS_FROM_0AD_TO_1970), Epoch(MS_FROM_0AD_TO_1970 + 1.5)];
        let mut out = vec![0i64; 2];
        to_ns_from_1970(&epochs, &mut out);
        assert_eq!(out, vec![0, 1_500_000]);

        let epoch16s = vec![Epoch16 {
            seconds: SECONDS_FROM_0AD_TO_1970 as f64,
            picoseconds: 2_000.0,
        }];
        let mut out = vec![0i64; 1];
        to_ns_from_1970(&epoch16s, &mut out);
        assert_eq!(out, vec![2]);
    }

    #[test]
    fn test_replace_leap_seconds() -> Result<(), CdfError> {
        // Append a hypothetical 2035 leap second; existing entries keep
        // their values so concurrently running tests are unaffected.
        let mut table = DEFAULT_LEAP_SECONDS.to_vec();
        table.push((1_104_537_637_184_000_000, 38));
        replace_leap_seconds(table)?;
        assert_eq!(leap_second(1_104_537_637_184_000_000), 38);
        assert_eq!(leap_second(1_104_537_637_184_000_000 - 1), 37);

        assert!(replace_leap_seconds(Vec::new()).is_err());
        assert!(replace_leap_seconds(vec![(10, 5), (5, 6)]).is_err());

        replace_leap_seconds(DEFAULT_LEAP_SECONDS.to_vec())?;
        Ok(())
    }
}

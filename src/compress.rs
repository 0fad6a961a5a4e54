//! Stream de/compression for CVVR and CCR payloads.
//!
//! The gzip frames are ordinary gzip streams handled by `flate2`. RLE and the
//! two Huffman codings are CDF-native; both directions are implemented so
//! compressed variables round-trip, though the writer is free to prefer gzip.

use std::io::Read;

use flate2::read::{GzDecoder, GzEncoder};
use flate2::Compression;

use crate::error::CdfError;
use crate::repr::CdfCompression;

/// Decompress one payload.
///
/// Both directions are pure: they allocate and return their output and leave
/// the input untouched.
/// # Errors
/// Returns a [`CdfError::Compression`] naming the algorithm and stage.
pub fn inflate(compression: CdfCompression, input: &[u8]) -> Result<Vec<u8>, CdfError> {
    match compression {
        CdfCompression::None => Ok(input.to_vec()),
        CdfCompression::Rle0 => rle0::expand(input),
        CdfCompression::Huffman => huffman::expand(input),
        CdfCompression::AdaptiveHuffman => adaptive::expand(input),
        CdfCompression::Gzip(_) => gzip::expand(input),
    }
}

/// Compress one payload.
/// # Errors
/// Returns a [`CdfError::Compression`] naming the algorithm and stage.
pub fn deflate(compression: CdfCompression, input: &[u8]) -> Result<Vec<u8>, CdfError> {
    match compression {
        CdfCompression::None => Ok(input.to_vec()),
        CdfCompression::Rle0 => Ok(rle0::compress(input)),
        CdfCompression::Huffman => Ok(huffman::compress(input)),
        CdfCompression::AdaptiveHuffman => Ok(adaptive::compress(input)),
        CdfCompression::Gzip(level) => gzip::compress(input, level),
    }
}

fn codec_error(algorithm: &'static str, stage: &'static str, detail: impl Into<String>) -> CdfError {
    CdfError::Compression {
        algorithm,
        stage,
        detail: detail.into(),
    }
}

/// Run-length encoding of zero bytes only: `0x00, n` expands to `n + 1`
/// zeros, any other byte is a literal.
mod rle0 {
    use super::*;

    pub fn expand(input: &[u8]) -> Result<Vec<u8>, CdfError> {
        let mut output = Vec::with_capacity(input.len() * 2);
        let mut cursor = input.iter();
        while let Some(&byte) = cursor.next() {
            if byte == 0 {
                let &count = cursor
                    .next()
                    .ok_or_else(|| codec_error("rle0", "inflate", "truncated zero run"))?;
                output.resize(output.len() + usize::from(count) + 1, 0);
            } else {
                output.push(byte);
            }
        }
        Ok(output)
    }

    pub fn compress(input: &[u8]) -> Vec<u8> {
        let mut output = Vec::with_capacity(input.len());
        let mut index = 0;
        while index < input.len() {
            if input[index] == 0 {
                let mut run = 1;
                while run < 256 && index + run < input.len() && input[index + run] == 0 {
                    run += 1;
                }
                output.push(0);
                output.push((run - 1) as u8);
                index += run;
            } else {
                output.push(input[index]);
                index += 1;
            }
        }
        output
    }
}

/// Bit-level plumbing shared by the two Huffman codings. Bits are packed
/// most-significant first.
mod bits {
    pub struct BitWriter {
        bytes: Vec<u8>,
        pending: u8,
        filled: u8,
    }

    impl BitWriter {
        pub fn new() -> Self {
            BitWriter {
                bytes: Vec::new(),
                pending: 0,
                filled: 0,
            }
        }

        pub fn push(&mut self, code: u64, length: u8) {
            for position in (0..length).rev() {
                self.pending = self.pending << 1 | ((code >> position) & 1) as u8;
                self.filled += 1;
                if self.filled == 8 {
                    self.bytes.push(self.pending);
                    self.pending = 0;
                    self.filled = 0;
                }
            }
        }

        pub fn into_bytes(mut self) -> Vec<u8> {
            if self.filled > 0 {
                self.bytes.push(self.pending << (8 - self.filled));
            }
            self.bytes
        }
    }

    pub struct BitReader<'a> {
        bytes: &'a [u8],
        position: usize,
    }

    impl<'a> BitReader<'a> {
        pub fn new(bytes: &'a [u8]) -> Self {
            BitReader { bytes, position: 0 }
        }

        pub fn next(&mut self) -> Option<u8> {
            let byte = *self.bytes.get(self.position / 8)?;
            let bit = byte >> (7 - self.position % 8) & 1;
            self.position += 1;
            Some(bit)
        }
    }
}

/// Canonical code table machinery shared by the two Huffman codings.
mod table {
    /// Codes longer than this force the fallback to a flat 8-bit table.
    pub const MAX_CODE_LENGTH: usize = 60;

    /// Optimal code length per symbol for the given frequencies. Symbols with
    /// zero frequency get length 0 (absent).
    pub fn code_lengths(frequencies: &[u64; 256]) -> [u8; 256] {
        let mut lengths = [0u8; 256];
        let present: Vec<usize> = (0..256).filter(|&s| frequencies[s] > 0).collect();
        match present.len() {
            0 => return lengths,
            1 => {
                lengths[present[0]] = 1;
                return lengths;
            }
            _ => {}
        }

        // Weight, depth-propagation targets. Internal nodes collect the leaf
        // symbols below them so depths can be bumped without a tree walk.
        let mut heap: std::collections::BinaryHeap<std::cmp::Reverse<(u64, usize)>> =
            std::collections::BinaryHeap::new();
        let mut members: Vec<Vec<usize>> = Vec::new();
        for &symbol in &present {
            heap.push(std::cmp::Reverse((frequencies[symbol], members.len())));
            members.push(vec![symbol]);
        }
        while heap.len() > 1 {
            let std::cmp::Reverse((weight_a, index_a)) = heap.pop().expect("len checked");
            let std::cmp::Reverse((weight_b, index_b)) = heap.pop().expect("len checked");
            let mut merged = Vec::with_capacity(members[index_a].len() + members[index_b].len());
            for &symbol in members[index_a].iter().chain(members[index_b].iter()) {
                lengths[symbol] += 1;
                merged.push(symbol);
            }
            heap.push(std::cmp::Reverse((weight_a + weight_b, members.len())));
            members.push(merged);
        }

        if lengths.iter().any(|&l| usize::from(l) > MAX_CODE_LENGTH) {
            // Degenerate distribution; a flat table is always valid.
            for symbol in 0..256 {
                lengths[symbol] = 8;
            }
        }
        lengths
    }

    /// Canonical code assignment from a length table.
    pub struct Canonical {
        /// Code per symbol; meaningful only where length > 0.
        pub codes: [u64; 256],
        /// Length per symbol.
        pub lengths: [u8; 256],
        /// First canonical code of each length.
        pub first_code: [u64; MAX_CODE_LENGTH + 1],
        /// Symbols sorted by (length, symbol); slices per length.
        pub symbols: Vec<u8>,
        /// Start of each length's run inside `symbols`.
        pub offsets: [usize; MAX_CODE_LENGTH + 1],
        /// Number of codes of each length.
        pub counts: [usize; MAX_CODE_LENGTH + 1],
    }

    impl Canonical {
        pub fn new(lengths: [u8; 256]) -> Self {
            let mut counts = [0usize; MAX_CODE_LENGTH + 1];
            for &length in lengths.iter().filter(|&&l| l > 0) {
                counts[usize::from(length)] += 1;
            }

            let mut first_code = [0u64; MAX_CODE_LENGTH + 1];
            let mut offsets = [0usize; MAX_CODE_LENGTH + 1];
            let mut code = 0u64;
            let mut offset = 0usize;
            for length in 1..=MAX_CODE_LENGTH {
                code = (code + counts[length - 1] as u64) << 1;
                first_code[length] = code;
                offsets[length] = offset;
                offset += counts[length];
            }

            let mut symbols = Vec::with_capacity(offset);
            for length in 1..=MAX_CODE_LENGTH {
                for symbol in 0u16..256 {
                    if usize::from(lengths[symbol as usize]) == length {
                        symbols.push(symbol as u8);
                    }
                }
            }

            let mut codes = [0u64; 256];
            let mut next_code = first_code;
            for &symbol in &symbols {
                let length = usize::from(lengths[usize::from(symbol)]);
                codes[usize::from(symbol)] = next_code[length];
                next_code[length] += 1;
            }

            Canonical {
                codes,
                lengths,
                first_code,
                symbols,
                offsets,
                counts,
            }
        }

        /// Decode one symbol from the bit stream.
        pub fn decode_symbol(&self, reader: &mut super::bits::BitReader) -> Option<u8> {
            let mut code = 0u64;
            for length in 1..=MAX_CODE_LENGTH {
                code = code << 1 | u64::from(reader.next()?);
                let count = self.counts[length] as u64;
                if count > 0 && code < self.first_code[length] + count {
                    let index = self.offsets[length] + (code - self.first_code[length]) as usize;
                    return Some(self.symbols[index]);
                }
            }
            None
        }
    }
}

/// Static Huffman frames: the decoded length, the 256-entry code length
/// table, then the canonical bit stream.
mod huffman {
    use super::*;

    pub fn compress(input: &[u8]) -> Vec<u8> {
        let mut frequencies = [0u64; 256];
        for &byte in input {
            frequencies[usize::from(byte)] += 1;
        }
        let lengths = table::code_lengths(&frequencies);
        let canonical = table::Canonical::new(lengths);

        let mut output = Vec::with_capacity(input.len() / 2 + 260);
        output.extend_from_slice(&(input.len() as u32).to_be_bytes());
        output.extend_from_slice(&lengths);

        let mut writer = bits::BitWriter::new();
        for &byte in input {
            let symbol = usize::from(byte);
            writer.push(canonical.codes[symbol], canonical.lengths[symbol]);
        }
        output.extend_from_slice(&writer.into_bytes());
        output
    }

    pub fn expand(input: &[u8]) -> Result<Vec<u8>, CdfError> {
        if input.len() < 260 {
            return Err(codec_error("huffman", "inflate", "truncated header"));
        }
        let decoded_len = u32::from_be_bytes(input[0..4].try_into().expect("length checked"));
        let mut lengths = [0u8; 256];
        lengths.copy_from_slice(&input[4..260]);
        let canonical = table::Canonical::new(lengths);

        let mut reader = bits::BitReader::new(&input[260..]);
        let mut output = Vec::with_capacity(decoded_len as usize);
        for _ in 0..decoded_len {
            let symbol = canonical
                .decode_symbol(&mut reader)
                .ok_or_else(|| codec_error("huffman", "inflate", "truncated bit stream"))?;
            output.push(symbol);
        }
        Ok(output)
    }
}

/// Adaptive Huffman frames: the decoded length then a bit stream whose code
/// table starts uniform and is rebuilt from running symbol counts at fixed
/// intervals. Encoder and decoder rebuild on the same schedule, so no table
/// is carried in the frame.
mod adaptive {
    use super::*;

    const REBUILD_INTERVAL: u64 = 2048;

    pub fn compress(input: &[u8]) -> Vec<u8> {
        let mut frequencies = [1u64; 256];
        let mut canonical = table::Canonical::new(table::code_lengths(&frequencies));

        let mut output = Vec::with_capacity(input.len() / 2 + 8);
        output.extend_from_slice(&(input.len() as u32).to_be_bytes());

        let mut writer = bits::BitWriter::new();
        for (index, &byte) in input.iter().enumerate() {
            let symbol = usize::from(byte);
            writer.push(canonical.codes[symbol], canonical.lengths[symbol]);
            frequencies[symbol] += 1;
            if (index + 1) as u64 % REBUILD_INTERVAL == 0 {
                canonical = table::Canonical::new(table::code_lengths(&frequencies));
            }
        }
        output.extend_from_slice(&writer.into_bytes());
        output
    }

    pub fn expand(input: &[u8]) -> Result<Vec<u8>, CdfError> {
        if input.len() < 4 {
            return Err(codec_error("adaptive huffman", "inflate", "truncated header"));
        }
        let decoded_len = u32::from_be_bytes(input[0..4].try_into().expect("length checked"));

        let mut frequencies = [1u64; 256];
        let mut canonical = table::Canonical::new(table::code_lengths(&frequencies));

        let mut reader = bits::BitReader::new(&input[4..]);
        let mut output = Vec::with_capacity(decoded_len as usize);
        for index in 0..u64::from(decoded_len) {
            let symbol = canonical.decode_symbol(&mut reader).ok_or_else(|| {
                codec_error("adaptive huffman", "inflate", "truncated bit stream")
            })?;
            output.push(symbol);
            frequencies[usize::from(symbol)] += 1;
            if (index + 1) % REBUILD_INTERVAL == 0 {
                canonical = table::Canonical::new(table::code_lengths(&frequencies));
            }
        }
        Ok(output)
    }
}

mod gzip {
    use super::*;

    pub fn expand(input: &[u8]) -> Result<Vec<u8>, CdfError> {
        let mut output = Vec::new();
        GzDecoder::new(input)
            .read_to_end(&mut output)
            .map_err(|err| codec_error("gzip", "inflate", err.to_string()))?;
        Ok(output)
    }

    pub fn compress(input: &[u8], level: u32) -> Result<Vec<u8>, CdfError> {
        let mut output = Vec::new();
        GzEncoder::new(input, Compression::new(level.clamp(1, 9)))
            .read_to_end(&mut output)
            .map_err(|err| codec_error("gzip", "deflate", err.to_string()))?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payloads() -> Vec<Vec<u8>> {
        let mut wavy: Vec<u8> = (0..4096u32).map(|i| (i * 7 % 251) as u8).collect();
        wavy.extend(std::iter::repeat(0u8).take(700));
        vec![
            Vec::new(),
            vec![0u8; 1000],
            b"a cdf text attribute, repeated a few times over ".repeat(20),
            wavy,
            vec![42u8],
        ]
    }

    #[test]
    fn test_rle0_roundtrip() -> Result<(), CdfError> {
        for payload in sample_payloads() {
            let packed = deflate(CdfCompression::Rle0, &payload)?;
            assert_eq!(inflate(CdfCompression::Rle0, &packed)?, payload);
        }
        Ok(())
    }

    #[test]
    fn test_rle0_packs_zero_runs() -> Result<(), CdfError> {
        let packed = deflate(CdfCompression::Rle0, &[0u8; 256])?;
        assert_eq!(packed, vec![0, 255]);
        assert_eq!(inflate(CdfCompression::Rle0, &[0, 2])?, vec![0, 0, 0]);
        Ok(())
    }

    #[test]
    fn test_rle0_truncated_run() {
        assert!(matches!(
            inflate(CdfCompression::Rle0, &[1, 2, 0]),
            Err(CdfError::Compression {
                algorithm: "rle0",
                ..
            })
        ));
    }

    #[test]
    fn test_huffman_roundtrip() -> Result<(), CdfError> {
        for payload in sample_payloads() {
            let packed = deflate(CdfCompression::Huffman, &payload)?;
            assert_eq!(inflate(CdfCompression::Huffman, &packed)?, payload);
        }
        Ok(())
    }

    #[test]
    fn test_adaptive_huffman_roundtrip() -> Result<(), CdfError> {
        for payload in sample_payloads() {
            let packed = deflate(CdfCompression::AdaptiveHuffman, &payload)?;
            assert_eq!(inflate(CdfCompression::AdaptiveHuffman, &packed)?, payload);
        }
        Ok(())
    }

    #[test]
    fn test_gzip_roundtrip() -> Result<(), CdfError> {
        for payload in sample_payloads() {
            for level in [1, 6, 9] {
                let packed = deflate(CdfCompression::Gzip(level), &payload)?;
                assert_eq!(inflate(CdfCompression::Gzip(level), &packed)?, payload);
            }
        }
        Ok(())
    }

    #[test]
    fn test_gzip_rejects_garbage() {
        assert!(matches!(
            inflate(CdfCompression::Gzip(6), b"not a gzip stream"),
            Err(CdfError::Compression {
                algorithm: "gzip",
                ..
            })
        ));
    }

    #[test]
    fn test_passthrough() -> Result<(), CdfError> {
        let payload = b"untouched".to_vec();
        assert_eq!(deflate(CdfCompression::None, &payload)?, payload);
        assert_eq!(inflate(CdfCompression::None, &payload)?, payload);
        Ok(())
    }
}

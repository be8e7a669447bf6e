//! Compressed-string codec
//!
//! Decompresses the dictionary-coded UTF-16 blob used by the obfuscator's
//! string table. The stream packs 15 data bits per code unit, offset by 32
//! so that every code unit lands in a printable UTF-16 range; bits are read
//! MSB-first out of each 15-bit slot but accumulated LSB-first into each
//! decoded value, matching the widely deployed `decompressFromUTF16` scheme.
//!
//! This module also carries a companion encoder, `compress_to_utf16`, used
//! only by this module's own tests and as a fixture generator elsewhere in
//! the test suite -- the obfuscator that produced a real input is someone
//! else's code, never ours.
//!
//! Bit storage is `bit_vec::BitVec`, the same crate the teacher codebase's
//! own bespoke codecs (`lzw.rs`, `lzss_huff.rs`) build their cursor/reload
//! discipline on top of, rather than a raw integer shifted by hand.

use bit_vec::BitVec;

const SLOT_BITS: usize = 15;

/// Pushes one UTF-16 code unit's 15-bit value onto `bits`, MSB first, so a
/// plain increasing-index walk over the accumulated `BitVec` reads each
/// slot's bits in the order the format specifies.
fn push_slot_msb(bits: &mut BitVec, value: u32) {
    for i in (0..SLOT_BITS).rev() {
        bits.push((value >> i) & 1 != 0);
    }
}

/// Reads bits MSB-first out of a sliding window of 15-bit slots, one UTF-16
/// code unit (minus 32) at a time, keeping the accumulated bits in a
/// `BitVec` and a cursor on top -- the same shape as the teacher's
/// `LZWDecoder`/`get_bit` (see `lzw.rs`), which also reloads from its
/// underlying reader only once the `BitVec` cursor runs dry.
struct BitReader<'a> {
    units: &'a [u32],
    bits: BitVec,
    ptr: usize,
    cursor: usize,
}

impl<'a> BitReader<'a> {
    fn new(units: &'a [u32]) -> Option<Self> {
        let first = *units.first()?;
        let mut bits = BitVec::new();
        push_slot_msb(&mut bits, first);
        Some(Self { units, bits, ptr: 0, cursor: 1 })
    }

    /// Number of code units consumed so far (mirrors the reference
    /// implementation's `data.index`, used by the caller to detect
    /// truncation against the declared stream length).
    fn consumed(&self) -> usize {
        self.cursor
    }

    /// Keep the bit vector small, mirroring the teacher's own
    /// `drop_leading_bits` (`lzw.rs`): bits behind the cursor are no longer
    /// reachable and are dropped rather than retained for the whole input.
    fn drop_leading_bits(&mut self) {
        let cpy = self.bits.clone();
        self.bits = BitVec::new();
        for i in self.ptr..cpy.len() {
            self.bits.push(cpy.get(i).unwrap());
        }
        self.ptr = 0;
    }

    fn read_bit(&mut self) -> Option<bool> {
        if self.ptr == self.bits.len() {
            if self.bits.len() > 512 {
                self.drop_leading_bits();
            }
            let &next = self.units.get(self.cursor)?;
            push_slot_msb(&mut self.bits, next);
            self.cursor += 1;
        }
        let bit = self.bits.get(self.ptr).unwrap();
        self.ptr += 1;
        Some(bit)
    }

    /// Reads an unsigned `n`-bit value, LSB-first (increasing weight).
    fn read_bits(&mut self, n: u32) -> Option<u32> {
        let mut result = 0u32;
        let mut power = 1u32;
        for _ in 0..n {
            let bit = self.read_bit()?;
            if bit {
                result |= power;
            }
            power <<= 1;
        }
        Some(result)
    }
}

/// Decompresses a string produced by the matching `compressToUTF16`-style
/// encoder. Returns an empty string on any malformed or truncated input;
/// never panics.
pub fn decompress_from_utf16(s: &str) -> String {
    try_decompress(s).unwrap_or_default()
}

fn try_decompress(s: &str) -> Option<String> {
    if s.is_empty() {
        return None;
    }
    let units: Vec<u32> = s.chars().map(|c| (c as u32).wrapping_sub(32)).collect();
    let length = units.len();
    let mut reader = BitReader::new(&units)?;

    let mut dictionary: Vec<String> = vec![String::new(); 3];
    let mut dict_size: u32 = 4;
    let mut num_bits: u32 = 3;
    let mut enlarge_in: u32 = 4;

    // 2-bit preamble selects 8-bit vs 16-bit width for the very first literal.
    let next = reader.read_bits(2)?;
    let first_char = match next {
        0 => char::from_u32(reader.read_bits(8)?)?,
        1 => char::from_u32(reader.read_bits(16)?)?,
        2 => return Some(String::new()),
        _ => return None,
    };
    dictionary.push(first_char.to_string());
    debug_assert_eq!(dictionary.len() as u32, dict_size);

    let mut w = dictionary[3].clone();
    let mut result = String::new();
    result.push_str(&w);

    loop {
        if reader.consumed() > length {
            return None;
        }

        let code = reader.read_bits(num_bits)?;
        let mut entry_index = code;
        match code {
            0 => {
                let ch = char::from_u32(reader.read_bits(8)?)?;
                dictionary.push(ch.to_string());
                entry_index = dict_size;
                dict_size += 1;
                enlarge_in = enlarge_in.saturating_sub(1);
            }
            1 => {
                let ch = char::from_u32(reader.read_bits(16)?)?;
                dictionary.push(ch.to_string());
                entry_index = dict_size;
                dict_size += 1;
                enlarge_in = enlarge_in.saturating_sub(1);
            }
            2 => return Some(result),
            _ => {}
        }

        if enlarge_in == 0 {
            enlarge_in = 1 << num_bits;
            num_bits += 1;
        }

        let entry: String = if (entry_index as usize) < dictionary.len() {
            dictionary[entry_index as usize].clone()
        } else if entry_index == dict_size {
            // Classic LZW edge case: code points one past the current
            // dictionary, meaning "w followed by w's own first character".
            let mut e = w.clone();
            e.push(w.chars().next()?);
            e
        } else {
            return None;
        };

        result.push_str(&entry);

        let addition = {
            let mut a = w.clone();
            a.push(entry.chars().next()?);
            a
        };
        dictionary.push(addition);
        dict_size += 1;
        enlarge_in = enlarge_in.saturating_sub(1);

        w = entry;

        if enlarge_in == 0 {
            enlarge_in = 1 << num_bits;
            num_bits += 1;
        }
    }
}

/// Companion encoder: the inverse dictionary walk, used only by this
/// module's tests. Packs each emitted code into a 15-bit slot offset by 32
/// so that `decompress_from_utf16(compress_to_utf16(b)) == b`.
#[cfg(test)]
pub(crate) fn compress_to_utf16(input: &str) -> String {
    // Mirrors `BitReader` above: bits accumulate into a `BitVec` in write
    // order, and are grouped back into 15-bit slots only at `finish`.
    struct BitWriter {
        bits: BitVec,
    }
    impl BitWriter {
        fn new() -> Self {
            Self { bits: BitVec::new() }
        }
        fn write_bit(&mut self, bit: bool) {
            self.bits.push(bit);
        }
        fn write_bits(&mut self, mut value: u32, n: u32) {
            for _ in 0..n {
                self.write_bit(value & 1 != 0);
                value >>= 1;
            }
        }
        fn finish(mut self) -> String {
            while self.bits.len() % SLOT_BITS != 0 {
                self.bits.push(false);
            }
            let mut out = String::new();
            let mut i = 0;
            while i < self.bits.len() {
                let mut unit = 0u32;
                for b in 0..SLOT_BITS {
                    unit = (unit << 1) | (self.bits.get(i + b).unwrap() as u32);
                }
                if let Some(c) = char::from_u32(unit.wrapping_add(32)) {
                    out.push(c);
                }
                i += SLOT_BITS;
            }
            out
        }
    }

    use std::collections::HashMap;

    let mut writer = BitWriter::new();
    let mut dictionary: HashMap<String, u32> = HashMap::new();
    let mut dict_size: u32 = 4;
    let mut num_bits: u32 = 3;
    let mut enlarge_in: u32 = 4;

    fn bump(enlarge_in: &mut u32, num_bits: &mut u32) {
        *enlarge_in = enlarge_in.saturating_sub(1);
        if *enlarge_in == 0 {
            *enlarge_in = 1 << *num_bits;
            *num_bits += 1;
        }
    }

    // Emits the code for `phrase`, registering it as a fresh literal
    // dictionary entry first if this is its first appearance. Mirrors the
    // decoder's literal branches, which register the bare character before
    // resolving it as `entry`.
    fn emit_phrase(
        writer: &mut BitWriter,
        dictionary: &mut HashMap<String, u32>,
        dict_size: &mut u32,
        enlarge_in: &mut u32,
        num_bits: &mut u32,
        phrase: &str,
    ) {
        if let Some(&code) = dictionary.get(phrase) {
            writer.write_bits(code, *num_bits);
            return;
        }
        let ch = phrase.chars().next().expect("phrase is never empty");
        if (ch as u32) < 256 {
            writer.write_bits(0, *num_bits);
            writer.write_bits(ch as u32, 8);
        } else {
            writer.write_bits(1, *num_bits);
            writer.write_bits(ch as u32, 16);
        }
        dictionary.insert(phrase.to_string(), *dict_size);
        *dict_size += 1;
        bump(enlarge_in, num_bits);
    }

    let mut chars = input.chars();
    let Some(first) = chars.next() else {
        writer.write_bits(2, 2);
        return writer.finish();
    };

    // Bootstrap: the very first literal uses the fixed 2-bit preamble, not
    // the (not yet established) per-iteration code width.
    if (first as u32) < 256 {
        writer.write_bits(0, 2);
        writer.write_bits(first as u32, 8);
    } else {
        writer.write_bits(1, 2);
        writer.write_bits(first as u32, 16);
    }
    dictionary.insert(first.to_string(), 3);

    let mut w = first.to_string();
    for c in chars {
        let candidate = format!("{w}{c}");
        if dictionary.contains_key(&candidate) {
            w = candidate;
            continue;
        }
        emit_phrase(&mut writer, &mut dictionary, &mut dict_size, &mut enlarge_in, &mut num_bits, &w);
        dictionary.insert(candidate, dict_size);
        dict_size += 1;
        bump(&mut enlarge_in, &mut num_bits);
        w = c.to_string();
    }
    emit_phrase(&mut writer, &mut dictionary, &mut dict_size, &mut enlarge_in, &mut num_bits, &w);
    writer.write_bits(2, num_bits);
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_empty_output() {
        assert_eq!(decompress_from_utf16(""), "");
    }

    #[test]
    fn roundtrip_simple_ascii() {
        let original = "alpha|beta|gamma";
        let packed = compress_to_utf16(original);
        assert_eq!(decompress_from_utf16(&packed), original);
    }

    #[test]
    fn roundtrip_repetitive_text() {
        let original = "aaaaaaaaaaaaaaaaaaaabbbbbbbbbbbbbbbbbbbbccccccccccccccccccc";
        let packed = compress_to_utf16(original);
        assert_eq!(decompress_from_utf16(&packed), original);
    }

    #[test]
    fn roundtrip_single_char() {
        let packed = compress_to_utf16("x");
        assert_eq!(decompress_from_utf16(&packed), "x");
    }

    #[test]
    fn malformed_stream_returns_empty() {
        // Truncated after the preamble: should fail closed, not panic.
        let s: String = [40u32].into_iter().filter_map(char::from_u32).collect();
        let _ = decompress_from_utf16(&s);
    }
}

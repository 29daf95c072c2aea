//! Inline string encoding
//!
//! A short string lives entirely in the property record:
//!
//! ```text
//! bit  0..27  key + type (ShortString)
//! bit 28..32  encoding id
//! bit 33..38  length (characters, or bytes for UTF-8)
//! bit 39..    packed characters, `step` bits each, across up to four blocks
//! ```
//!
//! Encodings are tried from the narrowest alphabet to the widest; the first
//! one that covers every character and fits four blocks wins.

use super::bits::{WordReader, WordWriter};
use super::types::{self, PAYLOAD_SHIFT, PropertyType};
use crate::storage::records::PROPERTY_BLOCKS;
use crate::{Error, Result};

/// Strings longer than this many UTF-8 bytes always go to the string store
pub const MAX_INLINE_STRING_BYTES: usize = 32;

const HEADER_BITS: usize = 39;
const ENCODING_BITS: u32 = 5;
const LENGTH_BITS: u32 = 6;
const MAX_LENGTH: usize = (1 << LENGTH_BITS) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Utf8,
    Numerical,
    Date,
    Upper,
    Lower,
    Email,
    AlphaNum,
    Latin1,
}

/// Alphabet encodings in the order they are tried
const ALPHABETS: [Encoding; 6] = [
    Encoding::Numerical,
    Encoding::Date,
    Encoding::Upper,
    Encoding::Lower,
    Encoding::Email,
    Encoding::AlphaNum,
];

impl Encoding {
    fn id(self) -> u64 {
        match self {
            Encoding::Utf8 => 0,
            Encoding::Numerical => 1,
            Encoding::Date => 2,
            Encoding::Upper => 3,
            Encoding::Lower => 4,
            Encoding::Email => 5,
            Encoding::AlphaNum => 7,
            Encoding::Latin1 => 10,
        }
    }

    fn from_id(id: u64) -> Result<Self> {
        Ok(match id {
            0 => Encoding::Utf8,
            1 => Encoding::Numerical,
            2 => Encoding::Date,
            3 => Encoding::Upper,
            4 => Encoding::Lower,
            5 => Encoding::Email,
            7 => Encoding::AlphaNum,
            10 => Encoding::Latin1,
            other => {
                return Err(Error::codec(format!(
                    "Unknown short string encoding {}",
                    other
                )));
            }
        })
    }

    fn step(self) -> u32 {
        match self {
            Encoding::Numerical | Encoding::Date => 4,
            Encoding::Upper | Encoding::Lower | Encoding::Email => 5,
            Encoding::AlphaNum => 6,
            Encoding::Latin1 | Encoding::Utf8 => 8,
        }
    }

    fn alphabet(self) -> Option<&'static [u8]> {
        match self {
            Encoding::Numerical => Some(&b"0123456789 .-+,'"[..]),
            Encoding::Date => Some(&b"0123456789 -:/+,"[..]),
            Encoding::Upper => Some(&b" ABCDEFGHIJKLMNOPQRSTUVWXYZ_.-:/"[..]),
            Encoding::Lower => Some(&b" abcdefghijklmnopqrstuvwxyz_.-:/"[..]),
            Encoding::Email => Some(&b",abcdefghijklmnopqrstuvwxyz_.-+@"[..]),
            Encoding::AlphaNum => {
                Some(&b" ABCDEFGHIJKLMNOPQRSTUVWXYZ01234_abcdefghijklmnopqrstuvwxyz56789"[..])
            }
            Encoding::Latin1 | Encoding::Utf8 => None,
        }
    }

    fn fits(self, length: usize) -> bool {
        length <= MAX_LENGTH
            && HEADER_BITS + length * self.step() as usize <= PROPERTY_BLOCKS * 64
    }
}

fn blocks_for(bits: usize) -> usize {
    bits.div_ceil(64)
}

/// Encode `value` inline, or `None` when it must go to the string store
pub fn encode(key: u32, value: &str) -> Result<Option<Vec<u64>>> {
    if value.len() > MAX_INLINE_STRING_BYTES {
        return Ok(None);
    }
    let chars: Vec<char> = value.chars().collect();

    for encoding in ALPHABETS {
        if !encoding.fits(chars.len()) {
            continue;
        }
        let Some(alphabet) = encoding.alphabet() else {
            continue;
        };
        let codes: Option<Vec<u64>> = chars
            .iter()
            .map(|&c| {
                c.is_ascii()
                    .then(|| alphabet.iter().position(|&b| b == c as u8))
                    .flatten()
                    .map(|p| p as u64)
            })
            .collect();
        if let Some(codes) = codes {
            return write(key, encoding, &codes).map(Some);
        }
    }

    if Encoding::Latin1.fits(chars.len()) && chars.iter().all(|&c| (c as u32) <= 0xFF) {
        let codes: Vec<u64> = chars.iter().map(|&c| c as u64).collect();
        return write(key, Encoding::Latin1, &codes).map(Some);
    }

    if Encoding::Utf8.fits(value.len()) {
        let codes: Vec<u64> = value.bytes().map(u64::from).collect();
        return write(key, Encoding::Utf8, &codes).map(Some);
    }

    Ok(None)
}

fn write(key: u32, encoding: Encoding, codes: &[u64]) -> Result<Vec<u64>> {
    let step = encoding.step();
    let mut blocks = vec![0u64; blocks_for(HEADER_BITS + codes.len() * step as usize)];
    blocks[0] = types::header(key, PropertyType::ShortString)?;

    let mut writer = WordWriter::new(&mut blocks, PAYLOAD_SHIFT as usize);
    writer.put(encoding.id(), ENCODING_BITS)?;
    writer.put(codes.len() as u64, LENGTH_BITS)?;
    for &code in codes {
        writer.put(code, step)?;
    }
    Ok(blocks)
}

fn read_header(header: u64) -> Result<(Encoding, usize)> {
    let mut reader = WordReader::new(std::slice::from_ref(&header), PAYLOAD_SHIFT as usize);
    let encoding = Encoding::from_id(reader.get(ENCODING_BITS)?)?;
    let length = reader.get(LENGTH_BITS)? as usize;
    Ok((encoding, length))
}

/// Blocks occupied by the short string whose header is `header`
pub fn block_count(header: u64) -> Result<usize> {
    let (encoding, length) = read_header(header)?;
    Ok(blocks_for(HEADER_BITS + length * encoding.step() as usize))
}

/// Decode a short string from its blocks
pub fn decode(blocks: &[u64]) -> Result<String> {
    let header = *blocks
        .first()
        .ok_or_else(|| Error::codec("short string without header block"))?;
    let (encoding, length) = read_header(header)?;
    let step = encoding.step();

    let mut reader = WordReader::new(blocks, HEADER_BITS);
    match encoding {
        Encoding::Utf8 => {
            let mut bytes = Vec::with_capacity(length);
            for _ in 0..length {
                bytes.push(reader.get(step)? as u8);
            }
            String::from_utf8(bytes)
                .map_err(|e| Error::codec(format!("short string is not UTF-8: {}", e)))
        }
        Encoding::Latin1 => {
            let mut out = String::with_capacity(length);
            for _ in 0..length {
                out.push(char::from(reader.get(step)? as u8));
            }
            Ok(out)
        }
        _ => {
            let alphabet = encoding
                .alphabet()
                .ok_or_else(|| Error::codec("short string encoding without alphabet"))?;
            let mut out = String::with_capacity(length);
            for _ in 0..length {
                let code = reader.get(step)? as usize;
                let byte = alphabet.get(code).ok_or_else(|| {
                    Error::codec(format!("short string code {} outside alphabet", code))
                })?;
                out.push(*byte as char);
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoding_of(blocks: &[u64]) -> Encoding {
        read_header(blocks[0]).unwrap().0
    }

    #[test]
    fn test_picks_narrowest_alphabet() {
        let cases = [
            ("0123 456", Encoding::Numerical),
            ("2024/01/05", Encoding::Date),
            ("HELLO WORLD", Encoding::Upper),
            ("hello_world", Encoding::Lower),
            ("bob@example.com", Encoding::Email),
            ("Node42_abc", Encoding::AlphaNum),
            ("café", Encoding::Latin1),
            ("日本", Encoding::Utf8),
        ];
        for (input, expected) in cases {
            let blocks = encode(1, input).unwrap().unwrap();
            assert_eq!(encoding_of(&blocks), expected, "{}", input);
            assert_eq!(decode(&blocks).unwrap(), input);
        }
    }

    #[test]
    fn test_block_count_matches_written_blocks() {
        for input in ["", "a", "abcdefghijklmnopqrstuvwxyzabcdef", "Latin1 tëxt here"] {
            let blocks = encode(3, input).unwrap().unwrap();
            assert_eq!(block_count(blocks[0]).unwrap(), blocks.len(), "{}", input);
            assert!(blocks.len() <= PROPERTY_BLOCKS);
        }
    }

    #[test]
    fn test_long_strings_not_inlined() {
        let forty = "a".repeat(40);
        assert!(encode(1, &forty).unwrap().is_none());
        // 30 bytes of 8-bit codes do not fit four blocks
        assert!(encode(1, &"€".repeat(10)).unwrap().is_none());
        assert!(encode(1, &"é".repeat(16)).unwrap().is_some());
    }

    #[test]
    fn test_empty_string() {
        let blocks = encode(9, "").unwrap().unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(decode(&blocks).unwrap(), "");
    }

    #[test]
    fn test_unknown_encoding_rejected() {
        let header = types::header(1, PropertyType::ShortString).unwrap() | (9u64 << PAYLOAD_SHIFT);
        assert!(decode(&[header]).unwrap_err().is_corruption());
    }
}

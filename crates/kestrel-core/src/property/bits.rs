//! Bit packing over block words and byte buffers
//!
//! Both forms are LSB-first: the first value occupies the lowest bits of the
//! first word (or byte), and a value that straddles a boundary continues in
//! the low bits of the next one.

use crate::{Error, Result};

/// Mask of the low `bits` bits
pub(crate) fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Bits needed to hold `value` as an unsigned number (at least 1)
pub(crate) fn required_bits(value: u64) -> u32 {
    (64 - value.leading_zeros()).max(1)
}

/// Sequential writer into a slice of 64-bit words
pub(crate) struct WordWriter<'a> {
    words: &'a mut [u64],
    position: usize,
}

impl<'a> WordWriter<'a> {
    pub(crate) fn new(words: &'a mut [u64], position: usize) -> Self {
        Self { words, position }
    }

    pub(crate) fn put(&mut self, value: u64, bits: u32) -> Result<()> {
        let bits_usize = bits as usize;
        if self.position + bits_usize > self.words.len() * 64 {
            return Err(Error::codec(format!(
                "bit write of {} bits at {} overflows {} words",
                bits,
                self.position,
                self.words.len()
            )));
        }
        let value = value & mask(bits);
        let word = self.position / 64;
        let offset = self.position % 64;
        self.words[word] |= value << offset;
        let room = 64 - offset;
        if bits_usize > room {
            self.words[word + 1] |= value >> room;
        }
        self.position += bits_usize;
        Ok(())
    }
}

/// Sequential reader over a slice of 64-bit words
pub(crate) struct WordReader<'a> {
    words: &'a [u64],
    position: usize,
}

impl<'a> WordReader<'a> {
    pub(crate) fn new(words: &'a [u64], position: usize) -> Self {
        Self { words, position }
    }

    pub(crate) fn get(&mut self, bits: u32) -> Result<u64> {
        let bits_usize = bits as usize;
        if self.position + bits_usize > self.words.len() * 64 {
            return Err(Error::codec(format!(
                "bit read of {} bits at {} overruns {} blocks",
                bits,
                self.position,
                self.words.len()
            )));
        }
        let word = self.position / 64;
        let offset = self.position % 64;
        let mut value = self.words[word] >> offset;
        let room = 64 - offset;
        if bits_usize > room {
            value |= self.words[word + 1] << room;
        }
        self.position += bits_usize;
        Ok(value & mask(bits))
    }
}

/// Pack `values` at `bits` each into bytes
///
/// Returns the packed bytes and the number of bits used in the last byte
/// (0 for an empty result, 8 for a full last byte).
pub(crate) fn pack_bytes(values: impl IntoIterator<Item = u64>, bits: u32) -> (Vec<u8>, u8) {
    let mut out: Vec<u8> = Vec::new();
    let mut total_bits = 0usize;
    for value in values {
        let mut value = value & mask(bits);
        let mut remaining = bits as usize;
        while remaining > 0 {
            let offset = total_bits % 8;
            if offset == 0 {
                out.push(0);
            }
            let take = remaining.min(8 - offset);
            let last = out.len() - 1;
            out[last] |= ((value & mask(take as u32)) as u8) << offset;
            value = if take >= 64 { 0 } else { value >> take };
            remaining -= take;
            total_bits += take;
        }
    }
    let used_in_last = match total_bits % 8 {
        0 if total_bits > 0 => 8,
        rem => rem as u8,
    };
    (out, used_in_last)
}

/// Inverse of [`pack_bytes`]
pub(crate) fn unpack_bytes(data: &[u8], bits: u32, used_in_last: u8) -> Result<Vec<u64>> {
    if bits == 0 || bits > 64 {
        return Err(Error::codec(format!("invalid packed element width {}", bits)));
    }
    if data.is_empty() {
        return Ok(Vec::new());
    }
    if used_in_last == 0 || used_in_last > 8 {
        return Err(Error::codec(format!(
            "invalid bits used in last byte: {}",
            used_in_last
        )));
    }
    let total_bits = (data.len() - 1) * 8 + used_in_last as usize;
    let count = total_bits / bits as usize;

    let mut values = Vec::with_capacity(count);
    let mut position = 0usize;
    for _ in 0..count {
        let mut value = 0u64;
        let mut filled = 0usize;
        while filled < bits as usize {
            let byte = data[position / 8] as u64;
            let offset = position % 8;
            let take = (bits as usize - filled).min(8 - offset);
            value |= ((byte >> offset) & mask(take as u32)) << filled;
            filled += take;
            position += take;
        }
        values.push(value);
    }
    Ok(values)
}

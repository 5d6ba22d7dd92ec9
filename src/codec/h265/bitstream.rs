//! H.265/HEVC bitstream reader
//!
//! Provides utilities for reading bits and Exp-Golomb coded values from H.265 bitstreams.
//!
//! ## Exp-Golomb Codes
//!
//! H.265 uses Exponential-Golomb codes (Exp-Golomb) to encode many syntax elements.
//!
//! ### Unsigned Exp-Golomb (ue(v))
//!
//! Format: [M zeros][1][M bits for value]
//!
//! Examples:
//! - 0: `1` (1 bit)
//! - 1: `010` (3 bits)
//! - 2: `011` (3 bits)
//! - 3: `00100` (5 bits)
//!
//! ### Signed Exp-Golomb (se(v))
//!
//! Maps unsigned values to signed: 0 → 0, 1 → 1, 2 → -1, 3 → 2, 4 → -2, ...
//!
//! Syntax elements with a legal range are read through [`BitstreamReader::read_ue_max`]
//! and [`BitstreamReader::read_se_range`], which turn out-of-range values into parse
//! errors instead of letting them flow into array indexing further down.

use crate::error::{Error, Result};

/// Bitstream reader for H.265 RBSP data
///
/// Reads bits sequentially from a byte slice.
pub struct BitstreamReader<'a> {
    /// RBSP data (emulation prevention bytes already removed)
    data: &'a [u8],
    /// Current byte position
    byte_pos: usize,
    /// Current bit position within byte (0-7, where 0 is MSB)
    bit_pos: u8,
}

impl<'a> BitstreamReader<'a> {
    /// Create a new bitstream reader
    pub fn new(data: &'a [u8]) -> Self {
        BitstreamReader {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    /// Get current bit position in the stream
    pub fn position(&self) -> usize {
        self.byte_pos * 8 + self.bit_pos as usize
    }

    /// Number of unread bits
    pub fn bits_left(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.position())
    }

    /// Check if more data is available
    pub fn has_more_data(&self) -> bool {
        self.byte_pos < self.data.len()
    }

    /// True when the next bit starts a byte
    pub fn is_byte_aligned(&self) -> bool {
        self.bit_pos == 0
    }

    /// Read a single bit (returns 0 or 1)
    pub fn read_bit(&mut self) -> Result<u8> {
        if self.byte_pos >= self.data.len() {
            return Err(Error::parse("RBSP", "read past end of data"));
        }

        let byte = self.data[self.byte_pos];
        let bit = (byte >> (7 - self.bit_pos)) & 1;

        self.bit_pos += 1;
        if self.bit_pos == 8 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }

        Ok(bit)
    }

    /// Read N bits as u32 (N <= 32)
    pub fn read_bits(&mut self, n: u32) -> Result<u32> {
        if n > 32 {
            return Err(Error::parse("RBSP", "cannot read more than 32 bits at once"));
        }
        if n as usize > self.bits_left() {
            return Err(Error::parse("RBSP", "read past end of data"));
        }

        let mut value = 0u32;
        for _ in 0..n {
            value = (value << 1) | (self.read_bit()? as u32);
        }

        Ok(value)
    }

    /// Read N bits into a u8 (N <= 8)
    pub fn read_u8(&mut self, n: u32) -> Result<u8> {
        if n > 8 {
            return Err(Error::parse("RBSP", "cannot read more than 8 bits into u8"));
        }
        Ok(self.read_bits(n)? as u8)
    }

    /// Read N bits into a u16 (N <= 16)
    pub fn read_u16(&mut self, n: u32) -> Result<u16> {
        if n > 16 {
            return Err(Error::parse("RBSP", "cannot read more than 16 bits into u16"));
        }
        Ok(self.read_bits(n)? as u16)
    }

    /// Read boolean (1 bit)
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_bit()? == 1)
    }

    /// Read unsigned Exp-Golomb coded value ue(v)
    ///
    /// Algorithm:
    /// 1. Count leading zeros
    /// 2. Read that many additional bits
    /// 3. Compute value from formula
    pub fn read_ue(&mut self) -> Result<u32> {
        let mut leading_zeros = 0;
        while self.read_bit()? == 0 {
            leading_zeros += 1;
            if leading_zeros > 31 {
                return Err(Error::parse("RBSP", "Exp-Golomb code too long (>31 leading zeros)"));
            }
        }

        if leading_zeros == 0 {
            return Ok(0);
        }

        let value_part = self.read_bits(leading_zeros)?;

        // 2^leading_zeros - 1 + value_part, computed in u64 so 32 bits of
        // suffix cannot overflow
        let value = (1u64 << leading_zeros) - 1 + value_part as u64;
        u32::try_from(value).map_err(|_| Error::parse("RBSP", "Exp-Golomb value overflows u32"))
    }

    /// Read ue(v) and check it against an inclusive maximum
    pub fn read_ue_max(&mut self, max: u32, name: &'static str) -> Result<u32> {
        let value = self.read_ue()?;
        if value > max {
            return Err(Error::parse(
                name,
                format!("value {} exceeds maximum {}", value, max),
            ));
        }
        Ok(value)
    }

    /// Read signed Exp-Golomb coded value se(v)
    pub fn read_se(&mut self) -> Result<i32> {
        let unsigned = self.read_ue()? as i64;

        let signed = if unsigned % 2 == 1 {
            (unsigned + 1) / 2
        } else {
            -(unsigned / 2)
        };

        Ok(signed as i32)
    }

    /// Read se(v) and check it against an inclusive range
    pub fn read_se_range(&mut self, min: i32, max: i32, name: &'static str) -> Result<i32> {
        let value = self.read_se()?;
        if value < min || value > max {
            return Err(Error::parse(
                name,
                format!("value {} outside [{}, {}]", value, min, max),
            ));
        }
        Ok(value)
    }

    /// Skip N bits
    pub fn skip_bits(&mut self, n: u32) -> Result<()> {
        if n as usize > self.bits_left() {
            return Err(Error::parse("RBSP", "skip past end of data"));
        }
        let target = self.position() + n as usize;
        self.byte_pos = target / 8;
        self.bit_pos = (target % 8) as u8;
        Ok(())
    }

    /// Align to byte boundary (skip to next byte)
    pub fn byte_align(&mut self) {
        if self.bit_pos != 0 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
    }

    /// Read remaining bits in current byte (for RBSP trailing bits)
    pub fn read_rbsp_trailing_bits(&mut self) -> Result<()> {
        let stop_bit = self.read_bit()?;
        if stop_bit != 1 {
            return Err(Error::parse("RBSP", "trailing stop bit is not 1"));
        }

        while self.bit_pos != 0 {
            if self.read_bit()? != 0 {
                return Err(Error::parse("RBSP", "trailing alignment bits are not 0"));
            }
        }

        Ok(())
    }

    /// Check if there is more data before the RBSP trailing bits
    ///
    /// The stop bit is the last set bit of the payload; anything before it is data.
    pub fn more_rbsp_data(&self) -> bool {
        let last = match self.data.iter().rposition(|&b| b != 0) {
            Some(idx) => idx,
            None => return false,
        };
        let stop_bit_pos = last * 8 + 7 - self.data[last].trailing_zeros() as usize;

        self.position() < stop_bit_pos
    }
}

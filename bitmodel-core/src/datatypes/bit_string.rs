//! Bit string value

use crate::error::{EltError, EltResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Arbitrary string of bits, stored MSB first. A bit string can have any length including zero.
///
/// Bits past `num_bits` in the last byte are kept at zero so that two bit
/// strings holding the same bits always compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BitString {
    #[serde(with = "serde_bytes")]
    bytes: Vec<u8>,
    num_bits: usize,
}

impl BitString {
    /// Construct a new bit string.
    ///
    /// # Arguments
    ///
    /// * `bytes` - The bits, MSB first
    /// * `num_bits` - The number of significant bits
    ///
    /// # Errors
    ///
    /// Returns an error if `num_bits > bytes.len() * 8`.
    pub fn new(mut bytes: Vec<u8>, num_bits: usize) -> EltResult<Self> {
        if num_bits > bytes.len() * 8 {
            return Err(EltError::type_error(
                "BitString",
                "new",
                format!(
                    "{} bytes cannot hold {} bits, need {} bytes",
                    bytes.len(),
                    num_bits,
                    num_bits.div_ceil(8)
                ),
            ));
        }
        bytes.truncate(num_bits.div_ceil(8));
        if num_bits % 8 != 0 {
            if let Some(last) = bytes.last_mut() {
                *last &= 0xFF << (8 - num_bits % 8);
            }
        }
        Ok(Self { bytes, num_bits })
    }

    /// Empty bit string
    pub fn empty() -> Self {
        Self {
            bytes: Vec::new(),
            num_bits: 0,
        }
    }

    /// Build a bit string from the low `num_bits` of `value` (at most 64).
    pub fn from_uint(value: u64, num_bits: usize) -> EltResult<Self> {
        if num_bits > 64 {
            return Err(EltError::type_error(
                "BitString",
                "from_uint",
                format!("{} bits do not fit in an integer", num_bits),
            ));
        }
        let mut bytes = vec![0u8; num_bits.div_ceil(8)];
        for i in 0..num_bits {
            if (value >> (num_bits - 1 - i)) & 1 == 1 {
                bytes[i / 8] |= 0x80 >> (i % 8);
            }
        }
        Ok(Self { bytes, num_bits })
    }

    /// Get the bit string as byte array.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The number of bits.
    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    /// Get the bit at a specific position
    ///
    /// # Arguments
    /// * `index` - The bit index (0-based, MSB first)
    pub fn get_bit(&self, index: usize) -> EltResult<bool> {
        if index >= self.num_bits {
            return Err(EltError::index("BitString", "get_bit", index, self.num_bits));
        }
        Ok((self.bytes[index / 8] >> (7 - index % 8)) & 1 == 1)
    }

    /// Set the bit at a specific position
    pub fn set_bit(&mut self, index: usize, value: bool) -> EltResult<()> {
        if index >= self.num_bits {
            return Err(EltError::index("BitString", "set_bit", index, self.num_bits));
        }
        let mask = 0x80 >> (index % 8);
        if value {
            self.bytes[index / 8] |= mask;
        } else {
            self.bytes[index / 8] &= !mask;
        }
        Ok(())
    }
}

impl fmt::Display for BitString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0b")?;
        for i in 0..self.num_bits {
            let bit = (self.bytes[i / 8] >> (7 - i % 8)) & 1;
            write!(f, "{}", bit)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_string_new() {
        let bytes = vec![0xFF, 0x00, 0xAA];
        let bit_string = BitString::new(bytes.clone(), 24).unwrap();
        assert_eq!(bit_string.as_bytes(), &bytes);
        assert_eq!(bit_string.num_bits(), 24);
    }

    #[test]
    fn test_bit_string_invalid() {
        let result = BitString::new(vec![0xFF], 16);
        assert!(result.is_err());
    }

    #[test]
    fn test_bit_string_partial_byte_is_normalized() {
        let a = BitString::new(vec![0xFF], 4).unwrap();
        let b = BitString::new(vec![0xF0], 4).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "0b1111");
    }

    #[test]
    fn test_bit_string_from_uint() {
        let bs = BitString::from_uint(0b101, 3).unwrap();
        assert_eq!(bs.as_bytes(), &[0b1010_0000]);
        assert!(bs.get_bit(0).unwrap());
        assert!(!bs.get_bit(1).unwrap());
        assert!(bs.get_bit(3).is_err());
    }
}

//! Forward-only bit cursor used while decoding
//!
//! Bits are addressed MSB first: bit 0 is the high bit of the first byte.
//!
//! # Visible end
//!
//! Besides its position, the cursor carries a *visible end*. Reads that would
//! cross it fail with [`CursorError::OutOfBounds`]. A container whose size is
//! given by a preceding length field narrows the visible end with
//! [`BitCursor::bound`] for the duration of its own decoding; the returned
//! [`Bounded`] guard puts the previous end back when dropped, whatever way the
//! decoding exits.

use crate::datatypes::BitString;
use crate::error::CursorError;
use std::ops::{Deref, DerefMut};

/// Forward-only reader over a byte buffer
#[derive(Debug, Clone)]
pub struct BitCursor<'a> {
    buffer: &'a [u8],
    position: usize,
    end: usize,
}

impl<'a> BitCursor<'a> {
    /// Create a new cursor at bit 0, with the whole buffer visible
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            position: 0,
            end: buffer.len() * 8,
        }
    }

    /// Current absolute bit position
    pub fn position(&self) -> usize {
        self.position
    }

    /// Current visible end, in bits
    pub fn end(&self) -> usize {
        self.end
    }

    /// Length of the underlying buffer, in bits
    pub fn len_bits(&self) -> usize {
        self.buffer.len() * 8
    }

    /// Bits left before the visible end
    pub fn remaining(&self) -> usize {
        self.end.saturating_sub(self.position)
    }

    fn ensure(&self, need: usize) -> Result<(), CursorError> {
        if self
            .position
            .checked_add(need)
            .is_none_or(|stop| stop > self.end)
        {
            return Err(CursorError::OutOfBounds {
                pos: self.position,
                need,
                end: self.end,
            });
        }
        Ok(())
    }

    fn bit_at(&self, pos: usize) -> u8 {
        (self.buffer[pos / 8] >> (7 - pos % 8)) & 1
    }

    /// Read `n` bits (at most 64) as an unsigned integer
    pub fn read_uint(&mut self, n: usize) -> Result<u64, CursorError> {
        if n > 64 {
            return Err(CursorError::TooManyBits(n));
        }
        self.ensure(n)?;

        let mut value = 0u64;
        for pos in self.position..self.position + n {
            value = (value << 1) | self.bit_at(pos) as u64;
        }
        self.position += n;
        Ok(value)
    }

    /// Read `n` bits (at most 64) as a two's complement signed integer
    pub fn read_int(&mut self, n: usize) -> Result<i64, CursorError> {
        let value = self.read_uint(n)?;
        Ok(sign_extend(value, n))
    }

    /// Read `n` bits as bytes
    ///
    /// When `n` is not a multiple of 8, the last byte is left-aligned and
    /// padded with zero bits.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, CursorError> {
        self.ensure(n)?;

        let mut out = if self.position % 8 == 0 {
            let start = self.position / 8;
            self.buffer[start..start + n.div_ceil(8)].to_vec()
        } else {
            let mut out = vec![0u8; n.div_ceil(8)];
            for i in 0..n {
                out[i / 8] |= self.bit_at(self.position + i) << (7 - i % 8);
            }
            out
        };
        if n % 8 != 0 {
            if let Some(last) = out.last_mut() {
                *last &= 0xFF << (8 - n % 8);
            }
        }
        self.position += n;
        Ok(out)
    }

    /// Read `n` bits as a [`BitString`]
    pub fn read_bits(&mut self, n: usize) -> Result<BitString, CursorError> {
        let bytes = self.read_bytes(n)?;
        BitString::new(bytes, n).map_err(|_| CursorError::OutOfBounds {
            pos: self.position,
            need: n,
            end: self.end,
        })
    }

    /// Move the cursor back to a previously saved position
    ///
    /// The cursor is forward-only: this is only meant to restore a position
    /// obtained from [`BitCursor::position`] before a failed attempt.
    pub fn rewind_to(&mut self, target: usize) -> Result<(), CursorError> {
        if target > self.position {
            return Err(CursorError::Rewind {
                target,
                pos: self.position,
            });
        }
        self.position = target;
        Ok(())
    }

    /// Narrow the visible end to `position + len` bits
    ///
    /// # Errors
    ///
    /// Returns [`CursorError::BoundPastEnd`] if the new end would lie past the
    /// current visible end.
    pub fn bound(&mut self, len: usize) -> Result<Bounded<'_, 'a>, CursorError> {
        let end = match self.position.checked_add(len) {
            Some(end) if end <= self.end => end,
            _ => {
                return Err(CursorError::BoundPastEnd {
                    pos: self.position,
                    len,
                    end: self.end,
                })
            }
        };
        let saved_end = self.end;
        self.end = end;
        Ok(Bounded {
            cursor: self,
            saved_end,
        })
    }
}

/// Sign-extends the low `bits` of `value` to a full `i64`.
pub fn sign_extend(value: u64, bits: usize) -> i64 {
    if bits == 0 {
        return 0;
    }
    if bits >= 64 {
        return value as i64;
    }
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

/// A cursor whose visible end has been narrowed by [`BitCursor::bound`]
///
/// Dereferences to the cursor itself. Dropping the guard restores the visible
/// end that was in place before the bound.
pub struct Bounded<'c, 'a> {
    cursor: &'c mut BitCursor<'a>,
    saved_end: usize,
}

impl<'a> Deref for Bounded<'_, 'a> {
    type Target = BitCursor<'a>;

    fn deref(&self) -> &Self::Target {
        &*self.cursor
    }
}

impl<'a> DerefMut for Bounded<'_, 'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.cursor
    }
}

impl Drop for Bounded<'_, '_> {
    fn drop(&mut self) {
        self.cursor.end = self.saved_end;
    }
}

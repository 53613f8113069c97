//! Triple packer used while encoding
//!
//! Encoding an element tree produces a flat list of [`Triple`]s, each one a
//! raw value plus the number of bits it occupies. [`pack`] concatenates them
//! MSB first into a byte buffer.

use bytes::{BufMut, Bytes, BytesMut};

/// Kind of a [`Triple`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripleKind {
    Uint,
    Int,
    Bytes,
}

/// One packer input: a raw value and its bit length
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Triple {
    /// Unsigned integer, masked to `bl` bits
    Uint { val: u64, bl: usize },
    /// Signed integer, two's complement over `bl` bits
    Int { val: i64, bl: usize },
    /// Byte buffer, truncated or zero padded to `bl` bits
    Bytes { val: Vec<u8>, bl: usize },
}

impl Triple {
    pub fn kind(&self) -> TripleKind {
        match self {
            Triple::Uint { .. } => TripleKind::Uint,
            Triple::Int { .. } => TripleKind::Int,
            Triple::Bytes { .. } => TripleKind::Bytes,
        }
    }

    pub fn bit_length(&self) -> usize {
        match self {
            Triple::Uint { bl, .. } | Triple::Int { bl, .. } | Triple::Bytes { bl, .. } => *bl,
        }
    }
}

/// MSB-first bit writer
#[derive(Debug, Default)]
pub struct BitWriter {
    buffer: BytesMut,
    bits: usize,
}

impl BitWriter {
    /// Create a new writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new writer with initial capacity, in bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            bits: 0,
        }
    }

    /// Number of bits written so far
    pub fn bit_length(&self) -> usize {
        self.bits
    }

    fn push_bit(&mut self, bit: bool) {
        let offset = self.bits % 8;
        if offset == 0 {
            self.buffer.put_u8(0);
        }
        if bit {
            let last = self.buffer.len() - 1;
            self.buffer[last] |= 0x80 >> offset;
        }
        self.bits += 1;
    }

    /// Write the low `n` bits of `value`; bits above 64 are written as zero
    pub fn write_uint(&mut self, value: u64, n: usize) {
        for i in (0..n).rev() {
            self.push_bit(i < 64 && (value >> i) & 1 == 1);
        }
    }

    /// Write `value` as a two's complement integer over `n` bits
    pub fn write_int(&mut self, value: i64, n: usize) {
        for i in (0..n).rev() {
            let bit = if i < 64 { (value >> i) & 1 == 1 } else { value < 0 };
            self.push_bit(bit);
        }
    }

    /// Write the first `n` bits of `bytes`, zero padded if `bytes` is too short
    pub fn write_bytes(&mut self, bytes: &[u8], n: usize) {
        if self.bits % 8 == 0 && n % 8 == 0 && bytes.len() >= n / 8 {
            self.buffer.put_slice(&bytes[..n / 8]);
            self.bits += n;
            return;
        }
        for i in 0..n {
            let bit = bytes
                .get(i / 8)
                .is_some_and(|b| (b >> (7 - i % 8)) & 1 == 1);
            self.push_bit(bit);
        }
    }

    /// Write one triple
    pub fn write_triple(&mut self, triple: &Triple) {
        match triple {
            Triple::Uint { val, bl } => self.write_uint(*val, *bl),
            Triple::Int { val, bl } => self.write_int(*val, *bl),
            Triple::Bytes { val, bl } => self.write_bytes(val, *bl),
        }
    }

    /// Get the written bytes and their bit length
    pub fn finish(self) -> (Bytes, usize) {
        (self.buffer.freeze(), self.bits)
    }
}

/// Concatenate triples into a byte buffer
///
/// Returns the buffer (last byte zero padded) and the exact number of bits.
pub fn pack(triples: &[Triple]) -> (Bytes, usize) {
    let total: usize = triples.iter().map(Triple::bit_length).sum();
    let mut writer = BitWriter::with_capacity(total.div_ceil(8));
    for triple in triples {
        writer.write_triple(triple);
    }
    writer.finish()
}

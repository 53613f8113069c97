//! Representation modes and text helpers

use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// How an element renders its value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Repr {
    /// The raw value
    #[default]
    Raw,
    /// Packed bytes in hexadecimal
    Hex,
    /// Packed bits in binary
    Bin,
    /// Hex dump of the packed bytes
    Hd,
    /// Enumeration label when one exists, raw value otherwise
    Human,
}

/// Uppercase hexadecimal, no separator
pub fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{:02X}", b);
    }
    out
}

/// The first `bits` bits of `bytes`, as `0`/`1` characters
pub fn bin(bytes: &[u8], bits: usize) -> String {
    (0..bits)
        .map(|i| match bytes.get(i / 8) {
            Some(b) if (b >> (7 - i % 8)) & 1 == 1 => '1',
            _ => '0',
        })
        .collect()
}

/// Classic 16 bytes per line hex dump, with an ASCII column
pub fn hexdump(bytes: &[u8]) -> String {
    let mut out = String::new();
    for (line, chunk) in bytes.chunks(16).enumerate() {
        if line > 0 {
            out.push('\n');
        }
        let _ = write!(out, "{:04X}:", line * 16);
        for b in chunk {
            let _ = write!(out, " {:02X}", b);
        }
        for _ in chunk.len()..16 {
            out.push_str("   ");
        }
        out.push_str("  ");
        out.extend(chunk.iter().map(|&b| {
            if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '.'
            }
        }));
    }
    out
}

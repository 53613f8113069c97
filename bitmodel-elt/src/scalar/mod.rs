//! Scalar codecs plugged into [`crate::Atom`]
//!
//! A codec declares which [`Value`] variants an atom accepts and how a value
//! maps to and from bits. The engine never looks at the value itself.

mod buf;
mod int;

pub use buf::{BitStr, Buf};
pub use int::{Int, Uint};

use bitmodel_core::{BitCursor, CursorError, Triple, Value, ValueKind};
use std::fmt;

/// Value type plugged into an atom
pub trait ScalarCodec: fmt::Debug {
    fn type_name(&self) -> &'static str;

    /// Value variants accepted by the atom
    fn type_set(&self) -> &'static [ValueKind];

    fn default_value(&self) -> Value;

    /// Fixed bit length of the type, if it has one
    fn default_bit_length(&self) -> Option<usize> {
        None
    }

    /// Check a value against the type-set and the range allowed by `bl`
    fn check(&self, val: &Value, bl: Option<usize>) -> Result<(), String>;

    /// Check an explicit bit length
    fn check_bit_length(&self, _bl: usize) -> Result<(), String> {
        Ok(())
    }

    /// Bit length inferred from a value
    ///
    /// Never fails: a value outside the type-set yields a best-effort length.
    fn bit_length_of(&self, val: &Value) -> usize;

    /// Bits to consume when decoding without any explicit or computed length
    fn decode_bit_length(&self, _remaining: usize, current: &Value) -> usize {
        self.bit_length_of(current)
    }

    fn pack(&self, val: &Value, bl: usize) -> Result<Triple, String>;

    fn unpack(&self, cur: &mut BitCursor<'_>, bl: usize) -> Result<Value, CursorError>;

    fn render(&self, val: &Value) -> String {
        val.to_string()
    }
}

pub(crate) fn check_kind(codec: &dyn ScalarCodec, val: &Value) -> Result<(), String> {
    if codec.type_set().contains(&val.kind()) {
        Ok(())
    } else {
        Err(format!(
            "{} value given to a {} atom",
            val.kind(),
            codec.type_name()
        ))
    }
}

//! Byte buffers and bit strings

use super::{check_kind, ScalarCodec};
use bitmodel_core::{BitCursor, BitString, CursorError, Triple, Value, ValueKind};

/// Byte buffer, its length inferred from its value
///
/// With `rest` set, a decode without any known length consumes whatever is
/// left of the visible window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Buf {
    pub rest: bool,
}

impl Buf {
    pub fn rest() -> Self {
        Self { rest: true }
    }
}

impl ScalarCodec for Buf {
    fn type_name(&self) -> &'static str {
        "Buf"
    }

    fn type_set(&self) -> &'static [ValueKind] {
        &[ValueKind::Bytes]
    }

    fn default_value(&self) -> Value {
        Value::Bytes(Vec::new())
    }

    fn check(&self, val: &Value, _bl: Option<usize>) -> Result<(), String> {
        check_kind(self, val)
    }

    fn bit_length_of(&self, val: &Value) -> usize {
        match val {
            Value::Bytes(b) => b.len() * 8,
            Value::Bits(b) => b.num_bits(),
            _ => 0,
        }
    }

    fn decode_bit_length(&self, remaining: usize, current: &Value) -> usize {
        if self.rest {
            remaining
        } else {
            self.bit_length_of(current)
        }
    }

    fn pack(&self, val: &Value, bl: usize) -> Result<Triple, String> {
        match val {
            Value::Bytes(b) => Ok(Triple::Bytes { val: b.clone(), bl }),
            other => Err(format!("cannot pack {} as Buf", other.kind())),
        }
    }

    fn unpack(&self, cur: &mut BitCursor<'_>, bl: usize) -> Result<Value, CursorError> {
        cur.read_bytes(bl).map(Value::Bytes)
    }
}

/// Bit string, its length inferred from its value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BitStr;

impl ScalarCodec for BitStr {
    fn type_name(&self) -> &'static str {
        "BitStr"
    }

    fn type_set(&self) -> &'static [ValueKind] {
        &[ValueKind::Bits]
    }

    fn default_value(&self) -> Value {
        Value::Bits(BitString::empty())
    }

    fn check(&self, val: &Value, _bl: Option<usize>) -> Result<(), String> {
        check_kind(self, val)
    }

    fn bit_length_of(&self, val: &Value) -> usize {
        match val {
            Value::Bits(b) => b.num_bits(),
            Value::Bytes(b) => b.len() * 8,
            _ => 0,
        }
    }

    fn pack(&self, val: &Value, bl: usize) -> Result<Triple, String> {
        match val {
            Value::Bits(b) => Ok(Triple::Bytes {
                val: b.as_bytes().to_vec(),
                bl,
            }),
            other => Err(format!("cannot pack {} as BitStr", other.kind())),
        }
    }

    fn unpack(&self, cur: &mut BitCursor<'_>, bl: usize) -> Result<Value, CursorError> {
        cur.read_bits(bl).map(Value::Bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buf_lengths() {
        let val = Value::from(b"ABC");
        assert_eq!(Buf::default().bit_length_of(&val), 24);
        assert_eq!(Buf::default().decode_bit_length(40, &val), 24);
        assert_eq!(Buf::rest().decode_bit_length(40, &val), 40);
        assert_eq!(Buf::default().bit_length_of(&Value::Uint(3)), 0);
    }

    #[test]
    fn test_bitstr_unpack() {
        let mut cur = BitCursor::new(&[0b1010_0000]);
        let val = BitStr.unpack(&mut cur, 3).unwrap();
        assert_eq!(val, Value::Bits(BitString::from_uint(0b101, 3).unwrap()));
        assert_eq!(BitStr.bit_length_of(&val), 3);
    }
}

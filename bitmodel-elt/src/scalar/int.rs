//! Fixed width integers

use super::{check_kind, ScalarCodec};
use bitmodel_core::{BitCursor, CursorError, Triple, Value, ValueKind};

/// Unsigned integer over `bits` bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Uint {
    pub bits: usize,
}

/// Signed two's complement integer over `bits` bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Int {
    pub bits: usize,
}

fn check_width(bl: usize) -> Result<(), String> {
    if bl > 64 {
        Err(format!("{} bits do not fit in an integer", bl))
    } else {
        Ok(())
    }
}

impl ScalarCodec for Uint {
    fn type_name(&self) -> &'static str {
        "Uint"
    }

    fn type_set(&self) -> &'static [ValueKind] {
        &[ValueKind::Uint]
    }

    fn default_value(&self) -> Value {
        Value::Uint(0)
    }

    fn default_bit_length(&self) -> Option<usize> {
        Some(self.bits)
    }

    fn check(&self, val: &Value, bl: Option<usize>) -> Result<(), String> {
        check_kind(self, val)?;
        let bl = bl.unwrap_or(self.bits);
        check_width(bl)?;
        match val {
            Value::Uint(v) if bl < 64 && *v >> bl != 0 => {
                Err(format!("{} does not fit in {} unsigned bits", v, bl))
            }
            _ => Ok(()),
        }
    }

    fn check_bit_length(&self, bl: usize) -> Result<(), String> {
        check_width(bl)
    }

    fn bit_length_of(&self, _val: &Value) -> usize {
        self.bits
    }

    fn pack(&self, val: &Value, bl: usize) -> Result<Triple, String> {
        check_width(bl)?;
        match val {
            Value::Uint(v) => Ok(Triple::Uint { val: *v, bl }),
            other => Err(format!("cannot pack {} as Uint", other.kind())),
        }
    }

    fn unpack(&self, cur: &mut BitCursor<'_>, bl: usize) -> Result<Value, CursorError> {
        cur.read_uint(bl).map(Value::Uint)
    }
}

impl ScalarCodec for Int {
    fn type_name(&self) -> &'static str {
        "Int"
    }

    fn type_set(&self) -> &'static [ValueKind] {
        &[ValueKind::Int]
    }

    fn default_value(&self) -> Value {
        Value::Int(0)
    }

    fn default_bit_length(&self) -> Option<usize> {
        Some(self.bits)
    }

    fn check(&self, val: &Value, bl: Option<usize>) -> Result<(), String> {
        check_kind(self, val)?;
        let bl = bl.unwrap_or(self.bits);
        check_width(bl)?;
        if let Value::Int(v) = val {
            let (min, max) = match bl {
                0 => (0, 0),
                64 => (i64::MIN, i64::MAX),
                n => (-(1i64 << (n - 1)), (1i64 << (n - 1)) - 1),
            };
            if *v < min || *v > max {
                return Err(format!("{} does not fit in {} signed bits", v, bl));
            }
        }
        Ok(())
    }

    fn check_bit_length(&self, bl: usize) -> Result<(), String> {
        check_width(bl)
    }

    fn bit_length_of(&self, _val: &Value) -> usize {
        self.bits
    }

    fn pack(&self, val: &Value, bl: usize) -> Result<Triple, String> {
        check_width(bl)?;
        match val {
            Value::Int(v) => Ok(Triple::Int { val: *v, bl }),
            other => Err(format!("cannot pack {} as Int", other.kind())),
        }
    }

    fn unpack(&self, cur: &mut BitCursor<'_>, bl: usize) -> Result<Value, CursorError> {
        cur.read_int(bl).map(Value::Int)
    }
}

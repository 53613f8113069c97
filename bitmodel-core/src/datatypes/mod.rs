//! Value types carried by elements

pub mod bit_string;
pub mod value;

pub use bit_string::BitString;
pub use value::{Key, Value, ValueKind};

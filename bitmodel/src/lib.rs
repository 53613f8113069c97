//! bitmodel - declarative, bit-precise binary object model
//!
//! A record format is described once as a tree of elements, then encoded to
//! or decoded from a bit stream.
//!
//! # Architecture
//!
//! This library is organized as a workspace with multiple crates:
//!
//! - `bitmodel-core`: errors, value model, bit cursor, packer, safety switches
//! - `bitmodel-elt`: the element kinds (`Atom`, `Envelope`, `Array`,
//!   `Sequence`, `Alt`), attribute resolution and the stock scalar codecs
//!
//! # Usage
//!
//! ```
//! use bitmodel::{Atom, EltExt, Envelope, Value};
//!
//! let tlv = Envelope::new(
//!     "TLV",
//!     vec![
//!         Atom::uint8("Tag").into(),
//!         Atom::uint8("Len")
//!             .with_val_auto(|s| Ok((s.sibling("Value")?.bit_length()? / 8) as u64))
//!             .into(),
//!         Atom::buf("Value")
//!             .with_bl_auto(|s| Ok(s.sibling("Len")?.value()?.as_uint().unwrap_or(0) as usize * 8))
//!             .into(),
//!     ],
//! );
//! tlv.set_val(Value::keyed([("Tag", Value::Uint(5)), ("Value", Value::from(b"AB"))]))
//!     .unwrap();
//! assert_eq!(&tlv.to_bytes().unwrap()[..], &[5, 2, b'A', b'B']);
//! ```

// Re-export core types
pub use bitmodel_core::{
    pack, BitCursor, BitString, CursorError, EltError, EltResult, Key, Repr, Safety, SafetyGuard,
    Triple, Value, ValueKind,
};

// Re-export the element engine
pub use bitmodel_elt::{
    Alt, Array, Atom, Attrs, Element, Elt, EltExt, EltId, EltKind, EnumDict, Envelope,
    Node, RepeatPolicy, Scope, Sequence,
};

// Encoded output buffer
pub use bytes::Bytes;

/// Scalar codecs
pub mod scalar {
    pub use bitmodel_elt::scalar::*;
}

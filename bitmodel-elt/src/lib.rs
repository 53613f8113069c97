//! Element engine
//!
//! Five element kinds describe a binary record declaratively:
//!
//! - [`Atom`]: one typed scalar value, through a [`ScalarCodec`]
//! - [`Envelope`]: an ordered, named collection of children of any kind
//! - [`Array`]: a repetition of one template, storing values only
//! - [`Sequence`]: a repetition of independently mutable template clones
//! - [`Alt`]: a union of elements chosen by a selector value
//!
//! Every kind implements [`Elt`]; [`EltExt`] provides the entry points
//! (`value`, `set_val`, `bit_length`, `to_bytes`, `from_bytes`, ...).
//! Attributes resolve as explicit, then callback, then default, and callbacks
//! receive the [`Scope`] of their element to reach its siblings.

pub mod alt;
pub mod array;
pub mod atom;
pub mod element;
pub mod elt;
pub mod envelope;
pub mod repeat;
pub mod resolve;
pub mod scalar;
pub mod scope;
pub mod sequence;

pub use alt::Alt;
pub use array::Array;
pub use atom::Atom;
pub use element::Element;
pub use elt::{Attrs, Elt, EltBase, EltExt, EltId, EltKind, EnumDict};
pub use envelope::Envelope;
pub use repeat::RepeatPolicy;
pub use resolve::{callback, Callback, Resolvable, Source};
pub use scalar::{BitStr, Buf, Int, ScalarCodec, Uint};
pub use scope::{Node, Scope};
pub use sequence::Sequence;

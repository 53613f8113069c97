//! Core types for the bitmodel element engine
//!
//! This crate provides the pieces every element kind builds on: the error
//! taxonomy, the value model, the forward-only bit cursor used while decoding,
//! the triple packer used while encoding, the per-thread safety configuration
//! and the text helpers behind element representations.

pub mod config;
pub mod cursor;
pub mod datatypes;
pub mod error;
pub mod packer;
pub mod repr;

pub use config::{Safety, SafetyGuard};
pub use cursor::{BitCursor, Bounded};
pub use datatypes::{BitString, Key, Value, ValueKind};
pub use error::{CursorError, EltError, EltResult};
pub use packer::{pack, BitWriter, Triple, TripleKind};
pub use repr::Repr;

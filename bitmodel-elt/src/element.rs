//! Owned element of any kind

use crate::alt::Alt;
use crate::array::Array;
use crate::atom::Atom;
use crate::elt::{Elt, EltBase, EltKind, EnumDict};
use crate::envelope::Envelope;
use crate::scope::{Node, Scope};
use crate::sequence::Sequence;
use bitmodel_core::{BitCursor, EltResult, Triple, Value};
use std::rc::Rc;

/// A node of the element tree
#[derive(Debug, Clone)]
pub enum Element {
    Atom(Atom),
    Envelope(Envelope),
    Array(Array),
    Sequence(Sequence),
    Alt(Alt),
}

macro_rules! dispatch {
    ($self:expr, $e:ident => $body:expr) => {
        match $self {
            Element::Atom($e) => $body,
            Element::Envelope($e) => $body,
            Element::Array($e) => $body,
            Element::Sequence($e) => $body,
            Element::Alt($e) => $body,
        }
    };
}

macro_rules! accessors {
    ($($variant:ident, $ty:ty, $as_ref:ident, $as_mut:ident;)*) => {
        $(
            impl From<$ty> for Element {
                fn from(elt: $ty) -> Self {
                    Element::$variant(elt)
                }
            }

            impl Element {
                pub fn $as_ref(&self) -> Option<&$ty> {
                    match self {
                        Element::$variant(elt) => Some(elt),
                        _ => None,
                    }
                }

                pub fn $as_mut(&mut self) -> Option<&mut $ty> {
                    match self {
                        Element::$variant(elt) => Some(elt),
                        _ => None,
                    }
                }
            }
        )*
    };
}

accessors! {
    Atom, Atom, as_atom, as_atom_mut;
    Envelope, Envelope, as_envelope, as_envelope_mut;
    Array, Array, as_array, as_array_mut;
    Sequence, Sequence, as_sequence, as_sequence_mut;
    Alt, Alt, as_alt, as_alt_mut;
}

impl Elt for Element {
    fn base(&self) -> &EltBase {
        dispatch!(self, e => e.base())
    }

    fn base_mut(&mut self) -> &mut EltBase {
        dispatch!(self, e => e.base_mut())
    }

    fn kind(&self) -> EltKind {
        dispatch!(self, e => e.kind())
    }

    fn as_dyn(&self) -> &dyn Elt {
        dispatch!(self, e => e.as_dyn())
    }

    fn value_in(&self, scope: &Scope<'_>) -> EltResult<Value> {
        dispatch!(self, e => e.value_in(scope))
    }

    fn set_val_in(&self, scope: &Scope<'_>, val: Value) -> EltResult<()> {
        dispatch!(self, e => e.set_val_in(scope, val))
    }

    fn clear_val(&self) {
        dispatch!(self, e => e.clear_val())
    }

    fn bit_length_in(&self, scope: &Scope<'_>) -> EltResult<usize> {
        dispatch!(self, e => e.bit_length_in(scope))
    }

    fn set_bl_in(&self, scope: &Scope<'_>, bl: Option<usize>) -> EltResult<()> {
        dispatch!(self, e => e.set_bl_in(scope, bl))
    }

    fn transparent_in(&self, scope: &Scope<'_>) -> EltResult<bool> {
        dispatch!(self, e => e.transparent_in(scope))
    }

    fn encode_in(&self, scope: &Scope<'_>, out: &mut Vec<Triple>) -> EltResult<()> {
        dispatch!(self, e => e.encode_in(scope, out))
    }

    fn decode_in(&self, scope: &Scope<'_>, cur: &mut BitCursor<'_>) -> EltResult<()> {
        dispatch!(self, e => e.decode_in(scope, cur))
    }

    fn enum_table_in(&self, scope: &Scope<'_>) -> EltResult<Option<Rc<EnumDict>>> {
        dispatch!(self, e => e.enum_table_in(scope))
    }

    fn enum_label_in(&self, scope: &Scope<'_>) -> EltResult<Option<String>> {
        dispatch!(self, e => e.enum_label_in(scope))
    }

    fn lookup(&self, scope: &Scope<'_>, name: &str) -> Option<Node<'_>> {
        dispatch!(self, e => e.lookup(scope, name))
    }

    fn lookup_at(&self, scope: &Scope<'_>, index: usize) -> Option<Node<'_>> {
        dispatch!(self, e => e.lookup_at(scope, index))
    }

    fn child_count(&self, scope: &Scope<'_>) -> usize {
        dispatch!(self, e => e.child_count(scope))
    }

    fn is_static(&self) -> bool {
        dispatch!(self, e => e.is_static())
    }

    fn callbacks(&self) -> Vec<&'static str> {
        dispatch!(self, e => e.callbacks())
    }

    fn repr_in(&self, scope: &Scope<'_>) -> EltResult<String> {
        dispatch!(self, e => e.repr_in(scope))
    }

    fn show_in(&self, scope: &Scope<'_>, out: &mut String) -> EltResult<()> {
        dispatch!(self, e => e.show_in(scope, out))
    }
}

//! Element scope
//!
//! A [`Scope`] is an element together with the chain of composites that
//! contain it during a walk. It is what callbacks receive, and how they reach
//! a sibling length or discriminator field:
//!
//! ```
//! use bitmodel_elt::{Atom, Envelope, EltExt};
//!
//! let len = Atom::uint8("Len").with_val_auto(|s| {
//!     Ok((s.sibling("Value")?.bit_length()? / 8) as u64)
//! });
//! let tlv = Envelope::new("TLV", vec![len.into(), Atom::buf("Value").into()]);
//! tlv.child("Value").unwrap().set_val(b"ABC").unwrap();
//! assert_eq!(&tlv.to_bytes().unwrap()[..], &[3, b'A', b'B', b'C']);
//! ```

use crate::element::Element;
use crate::elt::Elt;
use bitmodel_core::{EltError, EltResult, Value};
use std::fmt;
use std::rc::Rc;

/// Handle on an element reached during navigation
///
/// Most composites lend their children for as long as they are borrowed. A
/// `Sequence` hands out shared items instead, since a decode may replace them.
#[derive(Clone)]
pub enum Node<'a> {
    Borrowed(&'a dyn Elt),
    Shared(Rc<Element>),
}

impl Node<'_> {
    pub fn elt(&self) -> &dyn Elt {
        match self {
            Node::Borrowed(elt) => *elt,
            Node::Shared(elt) => elt.as_dyn(),
        }
    }
}

impl<'a> From<&'a dyn Elt> for Node<'a> {
    fn from(elt: &'a dyn Elt) -> Self {
        Node::Borrowed(elt)
    }
}

/// An element and its containers, innermost first
#[derive(Clone)]
pub struct Scope<'a> {
    node: Node<'a>,
    parent: Option<&'a Scope<'a>>,
}

impl<'a> Scope<'a> {
    /// Scope of an element walked without any container
    pub fn root(elt: &'a dyn Elt) -> Self {
        Self {
            node: Node::Borrowed(elt),
            parent: None,
        }
    }

    /// Scope of an element inside `parent`
    pub fn nested(elt: &'a dyn Elt, parent: &'a Scope<'a>) -> Self {
        Self::under(Node::Borrowed(elt), parent)
    }

    fn under(node: Node<'a>, parent: &'a Scope<'a>) -> Self {
        Self {
            node,
            parent: Some(parent),
        }
    }

    /// Scope of an element standing in place of `of`, under the same container
    ///
    /// Used by `Alt` to walk its active alternative as if it were the Alt.
    pub fn stand_in(elt: &'a dyn Elt, of: &Scope<'a>) -> Self {
        Self {
            node: Node::Borrowed(elt),
            parent: of.parent,
        }
    }

    pub fn elt(&self) -> &dyn Elt {
        self.node.elt()
    }

    pub fn name(&self) -> &str {
        self.elt().base().name()
    }

    /// Scope of the containing composite, if any
    pub fn container(&self) -> Option<&'a Scope<'a>> {
        self.parent
    }

    /// Number of containers above this element
    pub fn depth(&self) -> usize {
        self.parent.map_or(0, |p| p.depth() + 1)
    }

    /// Absolute hierarchy level: the sum of the relative levels along the chain
    pub fn abs_hier(&self) -> u32 {
        self.elt().base().hier() + self.parent.map_or(0, |p| p.abs_hier())
    }

    /// Scope of the sibling named `name` in the same container
    pub fn sibling(&self, name: &str) -> EltResult<Scope<'a>> {
        let parent = self.parent.ok_or_else(|| {
            EltError::contract(self.name(), "sibling", "element has no container")
        })?;
        let node = parent.elt().lookup(parent, name).ok_or_else(|| {
            EltError::contract(
                parent.name(),
                "sibling",
                format!("no child named {:?}", name),
            )
        })?;
        Ok(Scope::under(node, parent))
    }

    /// Scope of the child named `name` of this element
    pub fn child(&'a self, name: &str) -> EltResult<Scope<'a>> {
        let node = self.elt().lookup(self, name).ok_or_else(|| {
            EltError::contract(self.name(), "child", format!("no child named {:?}", name))
        })?;
        Ok(Scope::under(node, self))
    }

    /// Scope of the child at `index` of this element
    pub fn child_at(&'a self, index: usize) -> EltResult<Scope<'a>> {
        let elt = self.elt();
        let node = elt
            .lookup_at(self, index)
            .ok_or_else(|| EltError::index(self.name(), "child_at", index, elt.child_count(self)))?;
        Ok(Scope::under(node, self))
    }

    pub fn value(&self) -> EltResult<Value> {
        self.elt().value_in(self)
    }

    /// Assign a value to the element within its containers, so that callbacks
    /// reading siblings (an `Alt` selector for instance) resolve
    pub fn set_val(&self, val: impl Into<Value>) -> EltResult<()> {
        self.elt().set_val_in(self, val.into())
    }

    pub fn bit_length(&self) -> EltResult<usize> {
        self.elt().bit_length_in(self)
    }

    pub fn is_transparent(&self) -> EltResult<bool> {
        self.elt().transparent_in(self)
    }
}

impl fmt::Debug for Scope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut path = vec![self.name()];
        let mut cur = self.parent;
        while let Some(p) = cur {
            path.push(p.name());
            cur = p.parent;
        }
        path.reverse();
        write!(f, "Scope({})", path.join("/"))
    }
}

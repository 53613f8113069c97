//! The element capability set shared by every element kind
//!
//! [`Elt`] is the object-safe contract the walks are written against: each
//! method receives the [`Scope`] of the element it is called on, so callbacks
//! can reach the containers. [`EltExt`] adds the scope-free entry points used
//! on a root element (or any element whose callbacks do not look outside it).

use crate::resolve::{callback, Resolvable};
use crate::scope::{Node, Scope};
use bitmodel_core::{pack, repr, BitCursor, EltError, EltResult, Repr, Safety, Triple, Value};
use bytes::Bytes;
use serde::Serialize;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Enumeration table of an atom: raw value to human readable label
pub type EnumDict = BTreeMap<Value, String>;

/// Identity of an element instance
///
/// Two elements can be equal by value and still be distinct members of the
/// same envelope; composites track their children by this identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EltId(u64);

impl EltId {
    pub(crate) fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        EltId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// The five element kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EltKind {
    Atom,
    Envelope,
    Array,
    Sequence,
    Alt,
}

/// Attributes every element carries
///
/// Cloning an element clones its base with a fresh identity and without a
/// container: the clone is detached.
#[derive(Debug)]
pub struct EltBase {
    name: String,
    desc: String,
    rep: Cell<Repr>,
    hier: Cell<u32>,
    pub(crate) trans: Resolvable<bool>,
    id: EltId,
    container: Cell<Option<EltId>>,
}

impl EltBase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            desc: String::new(),
            rep: Cell::new(Repr::default()),
            hier: Cell::new(0),
            trans: Resolvable::new(),
            id: EltId::fresh(),
            container: Cell::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn desc(&self) -> &str {
        &self.desc
    }

    pub fn set_desc(&mut self, desc: impl Into<String>) {
        self.desc = desc.into();
    }

    pub fn repr_mode(&self) -> Repr {
        self.rep.get()
    }

    pub fn set_repr(&self, rep: Repr) {
        self.rep.set(rep);
    }

    /// Hierarchy level, relative to the container
    pub fn hier(&self) -> u32 {
        self.hier.get()
    }

    pub fn set_hier(&self, hier: u32) {
        self.hier.set(hier);
    }

    pub fn id(&self) -> EltId {
        self.id
    }

    /// Identity of the composite currently holding this element
    pub fn container(&self) -> Option<EltId> {
        self.container.get()
    }

    pub(crate) fn attach(&self, container: EltId) {
        self.container.set(Some(container));
    }

    pub(crate) fn detach(&self) {
        self.container.set(None);
    }

    /// Set or clear the explicit transparency
    pub fn set_trans(&self, trans: Option<bool>) {
        self.trans.set(trans);
    }

    pub fn set_trans_auto<F>(&self, f: F)
    where
        F: Fn(&Scope<'_>) -> EltResult<bool> + 'static,
    {
        self.trans.set_auto(Some(callback(f)));
    }

    pub fn clear_trans_auto(&self) {
        self.trans.set_auto(None);
    }

    pub(crate) fn callbacks(&self) -> Vec<&'static str> {
        if self.trans.has_auto() {
            vec!["trans"]
        } else {
            Vec::new()
        }
    }
}

impl Clone for EltBase {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            desc: self.desc.clone(),
            rep: self.rep.clone(),
            hier: self.hier.clone(),
            trans: self.trans.clone(),
            id: EltId::fresh(),
            container: Cell::new(None),
        }
    }
}

/// Element capability set
pub trait Elt {
    fn base(&self) -> &EltBase;

    fn base_mut(&mut self) -> &mut EltBase;

    fn kind(&self) -> EltKind;

    fn as_dyn(&self) -> &dyn Elt;

    /// Resolved value
    fn value_in(&self, scope: &Scope<'_>) -> EltResult<Value>;

    /// Assign an explicit value
    fn set_val_in(&self, scope: &Scope<'_>, val: Value) -> EltResult<()>;

    /// Clear explicit values, reverting to callbacks and defaults
    fn clear_val(&self);

    /// Resolved bit length, 0 when transparent
    fn bit_length_in(&self, scope: &Scope<'_>) -> EltResult<usize>;

    /// Set or clear an explicit bit length
    fn set_bl_in(&self, _scope: &Scope<'_>, _bl: Option<usize>) -> EltResult<()> {
        Err(EltError::contract(
            self.base().name(),
            "set_bl",
            "the bit length of a composite follows from its content",
        ))
    }

    fn transparent_in(&self, scope: &Scope<'_>) -> EltResult<bool> {
        self.base()
            .trans
            .resolve(scope, "transparency", || false, |_| Ok(()))
    }

    /// Append the packer input for this element
    fn encode_in(&self, scope: &Scope<'_>, out: &mut Vec<Triple>) -> EltResult<()>;

    /// Consume bits from the cursor
    fn decode_in(&self, scope: &Scope<'_>, cur: &mut BitCursor<'_>) -> EltResult<()>;

    fn enum_table_in(&self, _scope: &Scope<'_>) -> EltResult<Option<Rc<EnumDict>>> {
        Ok(None)
    }

    fn enum_label_in(&self, scope: &Scope<'_>) -> EltResult<Option<String>> {
        match self.enum_table_in(scope)? {
            Some(table) => {
                let val = self.value_in(scope)?;
                Ok(table.get(&val).cloned())
            }
            None => Ok(None),
        }
    }

    /// Child addressable by name, for scope navigation
    fn lookup(&self, _scope: &Scope<'_>, _name: &str) -> Option<Node<'_>> {
        None
    }

    fn lookup_at(&self, _scope: &Scope<'_>, _index: usize) -> Option<Node<'_>> {
        None
    }

    fn child_count(&self, _scope: &Scope<'_>) -> usize {
        0
    }

    /// True when no callback is set anywhere in this subtree
    fn is_static(&self) -> bool;

    /// Names of the callback slots currently set on this element
    fn callbacks(&self) -> Vec<&'static str>;

    /// One-line representation
    fn repr_in(&self, scope: &Scope<'_>) -> EltResult<String>;

    /// Indented multi-line listing of the subtree
    fn show_in(&self, scope: &Scope<'_>, out: &mut String) -> EltResult<()>;
}

/// Introspection snapshot of an element
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attrs {
    pub name: String,
    pub desc: String,
    pub kind: EltKind,
    pub rep: Repr,
    pub hier: u32,
    pub val: Option<Value>,
    pub bl: Option<usize>,
    pub trans: Option<bool>,
    pub dict: Option<Vec<(Value, String)>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub callbacks: Vec<&'static str>,
}

/// Turn a fault into `None` under the fuzzing relaxation
pub(crate) fn degrade<T>(name: &str, op: &str, res: EltResult<T>) -> EltResult<Option<T>> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(err) if Safety::current().fuzzing => {
            log::warn!("{}: {}: fault suppressed: {}", name, op, err);
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

pub(crate) fn indent(scope: &Scope<'_>) -> String {
    "    ".repeat(scope.abs_hier() as usize)
}

/// Element name, marked when the element is transparent
pub(crate) fn title(scope: &Scope<'_>) -> EltResult<String> {
    let name = scope.name();
    let trans = degrade(name, "transparency", scope.is_transparent())?.unwrap_or(false);
    Ok(if trans {
        format!("{} [transparent]", name)
    } else {
        name.to_string()
    })
}

/// Packed form of the element rendered in a hex, binary or hex dump mode
pub(crate) fn packed_text(scope: &Scope<'_>, rep: Repr) -> EltResult<String> {
    let mut triples = Vec::new();
    scope.elt().encode_in(scope, &mut triples)?;
    let (buf, bits) = pack(&triples);
    Ok(match rep {
        Repr::Bin => format!("0b{}", repr::bin(&buf, bits)),
        Repr::Hd => format!("\n{}", repr::hexdump(&buf)),
        _ => format!("0x{}", repr::hex(&buf)),
    })
}

pub(crate) fn snapshot(scope: &Scope<'_>, full: bool) -> EltResult<Attrs> {
    let elt = scope.elt();
    let base = elt.base();
    let name = base.name();
    let dict = degrade(name, "dict", elt.enum_table_in(scope))?
        .flatten()
        .map(|t| t.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
    Ok(Attrs {
        name: name.to_string(),
        desc: base.desc().to_string(),
        kind: elt.kind(),
        rep: base.repr_mode(),
        hier: base.hier(),
        val: degrade(name, "value", elt.value_in(scope))?,
        bl: degrade(name, "bit_length", elt.bit_length_in(scope))?,
        trans: degrade(name, "transparency", elt.transparent_in(scope))?,
        dict,
        callbacks: if full { elt.callbacks() } else { Vec::new() },
    })
}

/// Scope-free entry points, available on every element
pub trait EltExt: Elt {
    fn name(&self) -> &str {
        self.base().name()
    }

    fn id(&self) -> EltId {
        self.base().id()
    }

    fn container(&self) -> Option<EltId> {
        self.base().container()
    }

    fn value(&self) -> EltResult<Value> {
        let scope = Scope::root(self.as_dyn());
        self.value_in(&scope)
    }

    fn set_val(&self, val: impl Into<Value>) -> EltResult<()> {
        let scope = Scope::root(self.as_dyn());
        self.set_val_in(&scope, val.into())
    }

    fn set_bl(&self, bl: Option<usize>) -> EltResult<()> {
        let scope = Scope::root(self.as_dyn());
        self.set_bl_in(&scope, bl)
    }

    fn bit_length(&self) -> EltResult<usize> {
        let scope = Scope::root(self.as_dyn());
        self.bit_length_in(&scope)
    }

    fn is_transparent(&self) -> EltResult<bool> {
        let scope = Scope::root(self.as_dyn());
        self.transparent_in(&scope)
    }

    fn enum_label(&self) -> EltResult<Option<String>> {
        let scope = Scope::root(self.as_dyn());
        self.enum_label_in(&scope)
    }

    fn to_triples(&self) -> EltResult<Vec<Triple>> {
        let scope = Scope::root(self.as_dyn());
        let mut out = Vec::new();
        self.encode_in(&scope, &mut out)?;
        Ok(out)
    }

    fn to_bytes(&self) -> EltResult<Bytes> {
        let triples = self.to_triples()?;
        Ok(pack(&triples).0)
    }

    /// Decode from a cursor positioned at the start of this element
    fn from_cursor(&self, cur: &mut BitCursor<'_>) -> EltResult<()> {
        let scope = Scope::root(self.as_dyn());
        self.decode_in(&scope, cur)
    }

    /// Decode from the start of `buf`, returning the number of bits consumed
    fn from_bytes(&self, buf: &[u8]) -> EltResult<usize> {
        let mut cur = BitCursor::new(buf);
        self.from_cursor(&mut cur)?;
        Ok(cur.position())
    }

    fn attrs(&self) -> EltResult<Attrs> {
        snapshot(&Scope::root(self.as_dyn()), false)
    }

    /// Snapshot including the names of the callback slots in use
    fn attrs_full(&self) -> EltResult<Attrs> {
        snapshot(&Scope::root(self.as_dyn()), true)
    }

    fn repr(&self) -> EltResult<String> {
        let scope = Scope::root(self.as_dyn());
        self.repr_in(&scope)
    }

    fn show(&self) -> EltResult<String> {
        let scope = Scope::root(self.as_dyn());
        let mut out = String::new();
        self.show_in(&scope, &mut out)?;
        Ok(out)
    }

    fn with_desc(mut self, desc: impl Into<String>) -> Self
    where
        Self: Sized,
    {
        self.base_mut().set_desc(desc);
        self
    }

    fn with_repr(self, rep: Repr) -> Self
    where
        Self: Sized,
    {
        self.base().set_repr(rep);
        self
    }

    fn with_hier(self, hier: u32) -> Self
    where
        Self: Sized,
    {
        self.base().set_hier(hier);
        self
    }

    fn with_trans(self, trans: bool) -> Self
    where
        Self: Sized,
    {
        self.base().set_trans(Some(trans));
        self
    }

    fn with_trans_auto<F>(self, f: F) -> Self
    where
        Self: Sized,
        F: Fn(&Scope<'_>) -> EltResult<bool> + 'static,
    {
        self.base().set_trans_auto(f);
        self
    }
}

impl<T: Elt + ?Sized> EltExt for T {}

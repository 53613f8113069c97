//! Homogeneous repetition of template clones

use crate::element::Element;
use crate::elt::{indent, packed_text, title, Elt, EltBase, EltKind};
use crate::repeat::{decode_repeated, RepeatPolicy};
use crate::resolve::{callback, Resolvable};
use crate::scope::{Node, Scope};
use bitmodel_core::{BitCursor, EltError, EltResult, Repr, Safety, Triple, Value};
use log::trace;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Repetition of independently mutable clones of one template
///
/// Slots between the stored items and an explicit count are placeholders
/// standing for the template itself until [`Sequence::item`] individualizes
/// them. Items are shared with the scopes that navigate into them, so a
/// decode that replaces them leaves those scopes valid.
pub struct Sequence {
    base: EltBase,
    tmpl: Box<Element>,
    items: RefCell<Vec<Rc<Element>>>,
    num: Resolvable<usize>,
    bl: Resolvable<usize>,
    policy: Cell<RepeatPolicy>,
}

impl Sequence {
    pub fn new(name: impl Into<String>, tmpl: impl Into<Element>) -> Self {
        Self {
            base: EltBase::new(name),
            tmpl: Box::new(tmpl.into()),
            items: RefCell::new(Vec::new()),
            num: Resolvable::new(),
            bl: Resolvable::new(),
            policy: Cell::new(RepeatPolicy::default()),
        }
    }

    pub fn template(&self) -> &Element {
        &self.tmpl
    }

    /// Number of individual items, placeholders excluded
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// Number of slots: the explicit count, or the number of items
    pub fn slots(&self) -> usize {
        self.num.raw().unwrap_or(0).max(self.len())
    }

    pub fn num(&self) -> Option<usize> {
        self.num.raw()
    }

    pub fn set_num(&self, num: Option<usize>) -> EltResult<()> {
        if let Some(n) = num {
            let len = self.len();
            if len > n && Safety::current().check_static {
                return Err(EltError::contract(
                    self.base.name(),
                    "set_num",
                    format!("{} items already stored, more than {}", len, n),
                ));
            }
        }
        self.num.set(num);
        Ok(())
    }

    pub fn with_num(self, num: usize) -> EltResult<Self> {
        self.set_num(Some(num))?;
        Ok(self)
    }

    /// Install a decode-time repetition count callback
    pub fn set_num_auto<F>(&self, f: F)
    where
        F: Fn(&Scope<'_>) -> EltResult<usize> + 'static,
    {
        self.num.set_auto(Some(callback(f)));
    }

    pub fn with_num_auto<F>(self, f: F) -> Self
    where
        F: Fn(&Scope<'_>) -> EltResult<usize> + 'static,
    {
        self.set_num_auto(f);
        self
    }

    /// Install a decode-time length callback bounding the repetitions
    pub fn set_bl_auto<F>(&self, f: F)
    where
        F: Fn(&Scope<'_>) -> EltResult<usize> + 'static,
    {
        self.bl.set_auto(Some(callback(f)));
    }

    pub fn with_bl_auto<F>(self, f: F) -> Self
    where
        F: Fn(&Scope<'_>) -> EltResult<usize> + 'static,
    {
        self.set_bl_auto(f);
        self
    }

    pub fn policy(&self) -> RepeatPolicy {
        self.policy.get()
    }

    pub fn set_policy(&self, policy: RepeatPolicy) {
        self.policy.set(policy);
    }

    pub fn with_policy(self, policy: RepeatPolicy) -> Self {
        self.set_policy(policy);
        self
    }

    /// Claim `item`; a level of 0 becomes 1, any other level is kept
    fn adopt(&self, item: &Element) {
        item.base().attach(self.base.id());
        if item.base().hier() == 0 {
            item.base().set_hier(1);
        }
    }

    /// Fresh clone of the template, held by this sequence
    fn spawn(&self) -> Rc<Element> {
        let item = (*self.tmpl).clone();
        self.adopt(&item);
        Rc::new(item)
    }

    /// Hand back a removed item, detached
    ///
    /// An item a scope still shares is returned as a copy.
    fn release(item: Rc<Element>) -> Element {
        item.base().detach();
        Rc::try_unwrap(item).unwrap_or_else(|shared| (*shared).clone())
    }

    fn check_item(&self, op: &'static str, item: &Element) -> EltResult<()> {
        if !Safety::current().check_static {
            return Ok(());
        }
        if item.kind() != self.tmpl.kind() {
            return Err(EltError::type_error(
                self.base.name(),
                op,
                format!(
                    "{:?} item given to a sequence of {:?}",
                    item.kind(),
                    self.tmpl.kind()
                ),
            ));
        }
        if let Some(owner) = item.base().container() {
            return Err(EltError::contract(
                self.base.name(),
                op,
                format!("{} is already held by {:?}", item.base().name(), owner),
            ));
        }
        Ok(())
    }

    fn check_room(&self, op: &'static str, len: usize) -> EltResult<()> {
        match self.num.raw() {
            Some(n) if len > n && Safety::current().check_static => Err(EltError::contract(
                self.base.name(),
                op,
                format!("count {} reached", n),
            )),
            _ => Ok(()),
        }
    }

    fn check_index(&self, op: &'static str, index: usize, len: usize) -> EltResult<()> {
        if index >= len {
            return Err(EltError::index(self.base.name(), op, index, len));
        }
        Ok(())
    }

    pub fn append(&mut self, item: impl Into<Element>) -> EltResult<()> {
        let item = item.into();
        self.check_item("append", &item)?;
        self.check_room("append", self.len() + 1)?;
        self.adopt(&item);
        self.items.get_mut().push(Rc::new(item));
        Ok(())
    }

    /// Append a template clone holding `val`
    pub fn append_val(&mut self, val: impl Into<Value>) -> EltResult<()> {
        self.check_room("append", self.len() + 1)?;
        let item = self.spawn();
        item.set_val_in(
            &Scope::nested(item.as_dyn(), &Scope::root(self.as_dyn())),
            val.into(),
        )?;
        self.items.get_mut().push(item);
        Ok(())
    }

    pub fn insert(&mut self, index: usize, item: impl Into<Element>) -> EltResult<()> {
        let item = item.into();
        let len = self.len();
        if index > len {
            return Err(EltError::index(self.base.name(), "insert", index, len));
        }
        self.check_item("insert", &item)?;
        self.check_room("insert", len + 1)?;
        self.adopt(&item);
        self.items.get_mut().insert(index, Rc::new(item));
        Ok(())
    }

    /// Swap the item at `index`, keeping its hierarchy level
    pub fn replace(&mut self, index: usize, item: impl Into<Element>) -> EltResult<Element> {
        let item = item.into();
        self.check_index("replace", index, self.len())?;
        self.check_item("replace", &item)?;
        let items = self.items.get_mut();
        let hier = items[index].base().hier();
        item.base().attach(self.base.id());
        item.base().set_hier(hier);
        let prev = std::mem::replace(&mut items[index], Rc::new(item));
        Ok(Self::release(prev))
    }

    pub fn remove(&mut self, index: usize) -> EltResult<Element> {
        self.check_index("remove", index, self.len())?;
        let item = self.items.get_mut().remove(index);
        Ok(Self::release(item))
    }

    pub fn pop(&mut self) -> EltResult<Element> {
        let name = self.base.name();
        let item = self
            .items
            .get_mut()
            .pop()
            .ok_or_else(|| EltError::contract(name, "pop", "sequence is empty"))?;
        Ok(Self::release(item))
    }

    pub fn clear(&mut self) -> Vec<Element> {
        let items = std::mem::take(self.items.get_mut());
        items.into_iter().map(Self::release).collect()
    }

    /// Item at `index`, individualizing placeholders up to it
    pub fn item(&self, index: usize) -> EltResult<Rc<Element>> {
        let slots = self.slots();
        self.check_index("item", index, slots)?;
        if index >= self.len() {
            let mut items = self.items.try_borrow_mut().map_err(|_| {
                EltError::contract(self.base.name(), "item", "items are borrowed")
            })?;
            while items.len() <= index {
                items.push(self.spawn());
            }
        }
        Ok(Rc::clone(&self.items.borrow()[index]))
    }

    /// Mutable access to the item at `index`, individualizing placeholders
    ///
    /// Fails while the item is shared through [`Sequence::item`].
    pub fn item_mut(&mut self, index: usize) -> EltResult<&mut Element> {
        self.check_index("item", index, self.slots())?;
        while self.items.get_mut().len() <= index {
            let item = self.spawn();
            self.items.get_mut().push(item);
        }
        let name = self.base.name();
        Rc::get_mut(&mut self.items.get_mut()[index])
            .ok_or_else(|| EltError::contract(name, "item_mut", "item is shared"))
    }

    /// Run `f` over every slot, placeholders standing for the template
    fn each_slot<F>(&self, scope: &Scope<'_>, mut f: F) -> EltResult<()>
    where
        F: FnMut(&Element, &Scope<'_>) -> EltResult<()>,
    {
        let items = self.items.borrow();
        for item in items.iter() {
            let item: &Element = item;
            f(item, &Scope::nested(item.as_dyn(), scope))?;
        }
        for _ in items.len()..self.slots() {
            f(&*self.tmpl, &Scope::nested(self.tmpl.as_dyn(), scope))?;
        }
        Ok(())
    }

    fn decode_items(&self, scope: &Scope<'_>, cur: &mut BitCursor<'_>) -> EltResult<()> {
        let count = self.num.resolve_opt(scope, "count", |_| Ok(()))?;
        let items = decode_repeated(self.base.name(), cur, count, self.policy.get(), |cur, i| {
            let item = self.spawn();
            trace!("{:?}: repetition {} at bit {}", scope, i, cur.position());
            item.decode_in(&Scope::nested(item.as_dyn(), scope), cur)?;
            Ok(item)
        })?;
        let mut slot = self.items.try_borrow_mut().map_err(|_| {
            EltError::contract(self.base.name(), "decode", "items are borrowed")
        })?;
        for old in slot.iter() {
            old.base().detach();
        }
        *slot = items;
        Ok(())
    }
}

impl Clone for Sequence {
    fn clone(&self) -> Self {
        let seq = Self {
            base: self.base.clone(),
            tmpl: self.tmpl.clone(),
            items: RefCell::new(
                self.items
                    .borrow()
                    .iter()
                    .map(|item| Rc::new((**item).clone()))
                    .collect(),
            ),
            num: self.num.clone(),
            bl: self.bl.clone(),
            policy: self.policy.clone(),
        };
        for item in seq.items.borrow().iter() {
            item.base().attach(seq.base.id());
        }
        seq
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequence")
            .field("base", &self.base)
            .field("tmpl", &self.tmpl)
            .field("items", &self.items.borrow())
            .field("num", &self.num)
            .finish()
    }
}

impl Elt for Sequence {
    fn base(&self) -> &EltBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EltBase {
        &mut self.base
    }

    fn kind(&self) -> EltKind {
        EltKind::Sequence
    }

    fn as_dyn(&self) -> &dyn Elt {
        self
    }

    fn value_in(&self, scope: &Scope<'_>) -> EltResult<Value> {
        let mut out = Vec::with_capacity(self.slots());
        self.each_slot(scope, |item, s| {
            out.push(item.value_in(s)?);
            Ok(())
        })?;
        Ok(Value::List(out))
    }

    /// Replace every item by a template clone holding the matching value
    fn set_val_in(&self, scope: &Scope<'_>, val: Value) -> EltResult<()> {
        let vals = match val {
            Value::List(vals) => vals,
            other => {
                return Err(EltError::type_error(
                    self.base.name(),
                    "set_val",
                    format!("expected a list, got {}", other.kind()),
                ))
            }
        };
        self.check_room("set_val", vals.len())?;
        let mut items = Vec::with_capacity(vals.len());
        for v in vals {
            let item = self.spawn();
            item.set_val_in(&Scope::nested(item.as_dyn(), scope), v)?;
            items.push(item);
        }
        let mut slot = self.items.try_borrow_mut().map_err(|_| {
            EltError::contract(self.base.name(), "set_val", "items are borrowed")
        })?;
        for old in slot.iter() {
            old.base().detach();
        }
        *slot = items;
        Ok(())
    }

    fn clear_val(&self) {
        for item in self.items.borrow().iter() {
            item.clear_val();
        }
    }

    fn bit_length_in(&self, scope: &Scope<'_>) -> EltResult<usize> {
        if self.transparent_in(scope)? {
            return Ok(0);
        }
        let mut total = 0;
        self.each_slot(scope, |item, s| {
            total += item.bit_length_in(s)?;
            Ok(())
        })?;
        Ok(total)
    }

    fn encode_in(&self, scope: &Scope<'_>, out: &mut Vec<Triple>) -> EltResult<()> {
        if self.transparent_in(scope)? {
            return Ok(());
        }
        self.each_slot(scope, |item, s| item.encode_in(s, out))
    }

    fn decode_in(&self, scope: &Scope<'_>, cur: &mut BitCursor<'_>) -> EltResult<()> {
        if self.transparent_in(scope)? {
            return Ok(());
        }
        match self.bl.resolve_opt(scope, "bit_length", |_| Ok(()))? {
            Some(bl) => {
                let mut bounded = cur.bound(bl)?;
                self.decode_items(scope, &mut bounded)
            }
            None => self.decode_items(scope, cur),
        }
    }

    /// Stored items, then placeholders standing for the template
    fn lookup_at(&self, _scope: &Scope<'_>, index: usize) -> Option<Node<'_>> {
        if let Some(item) = self.items.borrow().get(index) {
            return Some(Node::Shared(Rc::clone(item)));
        }
        (index < self.slots()).then(|| Node::Borrowed(self.tmpl.as_dyn()))
    }

    fn child_count(&self, _scope: &Scope<'_>) -> usize {
        self.slots()
    }

    fn is_static(&self) -> bool {
        self.callbacks().is_empty()
            && self.tmpl.is_static()
            && self.items.borrow().iter().all(|item| item.is_static())
    }

    fn callbacks(&self) -> Vec<&'static str> {
        let mut out = self.base.callbacks();
        if self.num.has_auto() {
            out.push("num");
        }
        if self.bl.has_auto() {
            out.push("bl");
        }
        out
    }

    fn repr_in(&self, scope: &Scope<'_>) -> EltResult<String> {
        let title = title(scope)?;
        match self.base.repr_mode() {
            Repr::Raw | Repr::Human => {
                let mut body = String::new();
                self.each_slot(scope, |item, s| {
                    body.push_str(&item.repr_in(s)?);
                    Ok(())
                })?;
                Ok(format!("<{} : {}>", title, body))
            }
            rep => Ok(format!("<{} : {}>", title, packed_text(scope, rep)?)),
        }
    }

    fn show_in(&self, scope: &Scope<'_>, out: &mut String) -> EltResult<()> {
        let pad = indent(scope);
        let title = title(scope)?;
        match self.base.repr_mode() {
            Repr::Raw | Repr::Human => {
                out.push_str(&format!("{}### {} ###\n", pad, title));
                self.each_slot(scope, |item, s| item.show_in(s, out))
            }
            rep => {
                let text = packed_text(scope, rep)?;
                out.push_str(&format!("{}### {} : {} ###\n", pad, title, text));
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Atom;
    use crate::elt::EltExt;
    use crate::envelope::Envelope;

    fn tlv() -> Envelope {
        Envelope::new(
            "TLV",
            vec![
                Atom::uint8("T").into(),
                Atom::uint8("L")
                    .with_val_auto(|s| Ok((s.sibling("V")?.bit_length()? / 8) as u64))
                    .into(),
                Atom::buf("V")
                    .with_bl_auto(|s| {
                        Ok(s.sibling("L")?.value()?.as_uint().unwrap_or(0) as usize * 8)
                    })
                    .into(),
            ],
        )
    }

    #[test]
    fn test_decode_open_ended_tlvs() {
        let seq = Sequence::new("Items", tlv());
        let used = seq
            .from_bytes(&[1, 2, b'a', b'b', 2, 1, b'c', 3, 5])
            .unwrap();
        assert_eq!(used, 56);
        assert_eq!(seq.len(), 2);
        let second = seq.item(1).unwrap();
        let v = second.as_envelope().unwrap().child("V").unwrap().value().unwrap();
        assert_eq!(v, Value::from(b"c"));
        assert_eq!(second.container(), Some(seq.id()));
    }

    #[test]
    fn test_items_diverge_independently() {
        let mut seq = Sequence::new("Items", tlv());
        seq.append_val(Value::keyed([("T", Value::Uint(1)), ("V", Value::from(b"xy"))]))
            .unwrap();
        seq.append_val(Value::keyed([("T", Value::Uint(2))])).unwrap();
        assert_eq!(&seq.to_bytes().unwrap()[..], &[1, 2, b'x', b'y', 2, 0]);

        let first = seq.item_mut(0).unwrap().as_envelope().unwrap();
        first.child("L").unwrap().base().set_trans(Some(true));
        assert_eq!(&seq.to_bytes().unwrap()[..], &[1, b'x', b'y', 2, 0]);
        let tmpl = seq.template().as_envelope().unwrap();
        assert!(!tmpl.child("L").unwrap().is_transparent().unwrap());
    }

    #[test]
    fn test_count_and_placeholders() {
        let mut seq = Sequence::new("Bytes", Atom::uint8("B").with_default(9u8).unwrap())
            .with_num(3)
            .unwrap();
        seq.append(Atom::uint8("B").with_val(1u8).unwrap()).unwrap();
        assert_eq!(seq.len(), 1);
        assert_eq!(&seq.to_bytes().unwrap()[..], &[1, 9, 9]);
        assert_eq!(seq.bit_length().unwrap(), 24);

        seq.item(2).unwrap().set_val(4u8).unwrap();
        assert_eq!(seq.len(), 3);
        assert_eq!(&seq.to_bytes().unwrap()[..], &[1, 9, 4]);
        assert_eq!(seq.template().value().unwrap(), Value::Uint(9));

        let err = seq.append(Atom::uint8("B")).unwrap_err();
        assert!(matches!(err, EltError::Contract { op: "append", .. }));
        assert!(seq.item(3).is_err());
        assert_eq!(seq.len(), 3);
    }

    #[test]
    fn test_kind_must_match_template() {
        let mut seq = Sequence::new("Bytes", Atom::uint8("B"));
        let err = seq.append(Envelope::new("E", vec![])).unwrap_err();
        assert!(matches!(err, EltError::Type { op: "append", .. }));
        assert!(seq.is_empty());
    }

    #[test]
    fn test_remove_replace_pop() {
        let mut seq = Sequence::new("Bytes", Atom::uint8("B"));
        seq.set_val(Value::List(vec![Value::Uint(1), Value::Uint(2)]))
            .unwrap();
        let new = Atom::uint8("B").with_val(5u8).unwrap();
        let old = seq.replace(0, new).unwrap();
        assert_eq!(old.container(), None);
        assert_eq!(seq.value().unwrap(), Value::List(vec![Value::Uint(5), Value::Uint(2)]));

        let removed = seq.remove(1).unwrap();
        assert_eq!(removed.value().unwrap(), Value::Uint(2));
        assert_eq!(seq.pop().unwrap().value().unwrap(), Value::Uint(5));
        assert!(matches!(seq.pop().unwrap_err(), EltError::Contract { op: "pop", .. }));
    }

    #[test]
    fn test_navigate_items() {
        let mut seq = Sequence::new("Items", tlv()).with_num(2).unwrap();
        seq.append_val(Value::keyed([("T", Value::Uint(1)), ("V", Value::from(b"xy"))]))
            .unwrap();
        {
            let root = Scope::root(&seq);
            assert_eq!(seq.child_count(&root), 2);

            let first = root.child_at(0).unwrap();
            assert_eq!(first.child("V").unwrap().value().unwrap(), Value::from(b"xy"));
            assert_eq!(first.child("L").unwrap().value().unwrap(), Value::Uint(2));
            let placeholder = root.child_at(1).unwrap();
            assert_eq!(placeholder.child("T").unwrap().value().unwrap(), Value::Uint(0));
            assert!(matches!(
                root.child_at(2).unwrap_err(),
                EltError::Index { index: 2, len: 2, .. }
            ));
        }

        let held = seq.item(0).unwrap();
        assert!(matches!(
            seq.item_mut(0).unwrap_err(),
            EltError::Contract { op: "item_mut", .. }
        ));
        drop(held);
        assert!(seq.item_mut(0).is_ok());
    }

    #[test]
    fn test_field_after_items_reads_into_them() {
        let seq = Sequence::new("Items", Atom::uint8("B")).with_num_auto(|_| Ok(2));
        let last = Atom::uint8("Last").with_val_auto(|s| {
            Ok(s.sibling("Items")?.child_at(1)?.value()?.as_uint().unwrap_or(0))
        });
        let env = Envelope::new("Msg", vec![seq.into(), last.into()]);
        env.from_bytes(&[3, 9, 0]).unwrap();
        assert_eq!(env.child("Last").unwrap().value().unwrap(), Value::Uint(0));
        env.child("Last").unwrap().as_atom().unwrap().clear_val();
        let root = Scope::root(&env);
        assert_eq!(root.child("Last").unwrap().value().unwrap(), Value::Uint(9));
    }

    #[test]
    fn test_counted_decode() {
        let seq = Sequence::new("Bytes", Atom::uint8("B")).with_num_auto(|_| Ok(2));
        assert_eq!(seq.from_bytes(&[7, 8, 9]).unwrap(), 16);
        assert_eq!(seq.value().unwrap(), Value::List(vec![Value::Uint(7), Value::Uint(8)]));
    }

    #[test]
    fn test_clone_reattaches_items() {
        let mut seq = Sequence::new("Bytes", Atom::uint8("B"));
        seq.append_val(1u8).unwrap();
        let copy = seq.clone();
        assert_eq!(copy.item(0).unwrap().container(), Some(copy.id()));
        copy.item(0).unwrap().set_val(2u8).unwrap();
        assert_eq!(seq.value().unwrap(), Value::List(vec![Value::Uint(1)]));
    }
}

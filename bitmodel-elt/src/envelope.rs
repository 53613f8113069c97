//! Heterogeneous composite

use crate::element::Element;
use crate::elt::{indent, packed_text, title, Elt, EltBase, EltId, EltKind};
use crate::resolve::{callback, Resolvable};
use crate::scope::{Node, Scope};
use bitmodel_core::{BitCursor, EltError, EltResult, Key, Repr, Safety, Triple, Value};
use log::trace;
use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::ops::{Bound, RangeBounds};

/// Lookup tables over the children, rebuilt lazily after a mutation
#[derive(Debug, Default)]
struct Index {
    by_name: HashMap<String, usize>,
    by_id: HashMap<EltId, usize>,
    stale: bool,
}

/// Ordered, named collection of owned children
///
/// Every child's container is this envelope's id for as long as the child is
/// held. Two children may share a name; name lookups return the first one.
pub struct Envelope {
    base: EltBase,
    content: Vec<Element>,
    index: RefCell<Index>,
    bl: Resolvable<usize>,
    iter_trans: bool,
}

impl Envelope {
    pub fn new(name: impl Into<String>, content: Vec<Element>) -> Self {
        let env = Self::detached(name, content);
        for child in &env.content {
            env.adopt(child);
        }
        env
    }

    fn detached(name: impl Into<String>, content: Vec<Element>) -> Self {
        Self {
            base: EltBase::new(name),
            content,
            index: RefCell::new(Index {
                stale: true,
                ..Index::default()
            }),
            bl: Resolvable::new(),
            iter_trans: false,
        }
    }

    /// Claim `child`; a level of 0 becomes 1, any other level is kept
    fn adopt(&self, child: &Element) {
        child.base().attach(self.base.id());
        if child.base().hier() == 0 {
            child.base().set_hier(1);
        }
    }

    fn check_free(&self, op: &'static str, child: &Element) -> EltResult<()> {
        if Safety::current().check_static {
            if let Some(owner) = child.base().container() {
                return Err(EltError::contract(
                    self.base.name(),
                    op,
                    format!("{} is already held by {:?}", child.base().name(), owner),
                ));
            }
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.index.get_mut().stale = true;
    }

    fn fresh_index(&self) -> Ref<'_, Index> {
        if self.index.borrow().stale {
            let mut index = self.index.borrow_mut();
            index.by_name.clear();
            index.by_id.clear();
            for (i, child) in self.content.iter().enumerate() {
                index
                    .by_name
                    .entry(child.base().name().to_string())
                    .or_insert(i);
                index.by_id.insert(child.base().id(), i);
            }
            index.stale = false;
        }
        self.index.borrow()
    }

    /// All children, transparent ones included
    pub fn content(&self) -> &[Element] {
        &self.content
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Children in order, skipping transparent ones unless
    /// [`Envelope::set_iter_transparent`] is on
    pub fn iter(&self) -> EltResult<impl Iterator<Item = &Element>> {
        let scope = Scope::root(self);
        let visible = self.visible_in(&scope)?;
        Ok(visible.into_iter().map(move |i| &self.content[i]))
    }

    /// Make iteration yield transparent children too
    pub fn set_iter_transparent(&mut self, on: bool) {
        self.iter_trans = on;
    }

    fn visible_in(&self, scope: &Scope<'_>) -> EltResult<Vec<usize>> {
        let mut out = Vec::with_capacity(self.content.len());
        for (i, child) in self.content.iter().enumerate() {
            if self.iter_trans || !child.transparent_in(&Scope::nested(child.as_dyn(), scope))? {
                out.push(i);
            }
        }
        Ok(out)
    }

    /// Claim `child` at the end
    ///
    /// A child still at level 0 is placed one level below this envelope; a
    /// level set beforehand with `with_hier` is kept.
    pub fn append(&mut self, child: impl Into<Element>) -> EltResult<()> {
        let child = child.into();
        self.check_free("append", &child)?;
        self.adopt(&child);
        self.content.push(child);
        self.touch();
        Ok(())
    }

    pub fn insert(&mut self, index: usize, child: impl Into<Element>) -> EltResult<()> {
        let child = child.into();
        if index > self.content.len() {
            return Err(EltError::index(
                self.base.name(),
                "insert",
                index,
                self.content.len(),
            ));
        }
        self.check_free("insert", &child)?;
        self.adopt(&child);
        self.content.insert(index, child);
        self.touch();
        Ok(())
    }

    pub fn extend<I>(&mut self, children: I) -> EltResult<()>
    where
        I: IntoIterator<Item = Element>,
    {
        let children: Vec<Element> = children.into_iter().collect();
        for child in &children {
            self.check_free("extend", child)?;
        }
        for child in children {
            self.adopt(&child);
            self.content.push(child);
        }
        self.touch();
        Ok(())
    }

    /// Remove the child with identity `id`, handing it back detached
    pub fn remove(&mut self, id: EltId) -> EltResult<Element> {
        let index = self.index_of(id).ok_or_else(|| {
            EltError::contract(self.base.name(), "remove", format!("{:?} is not a child", id))
        })?;
        self.remove_at(index)
    }

    pub fn remove_at(&mut self, index: usize) -> EltResult<Element> {
        if index >= self.content.len() {
            return Err(EltError::index(
                self.base.name(),
                "remove",
                index,
                self.content.len(),
            ));
        }
        let child = self.content.remove(index);
        child.base().detach();
        self.touch();
        Ok(child)
    }

    pub fn pop(&mut self) -> EltResult<Element> {
        let child = self
            .content
            .pop()
            .ok_or_else(|| EltError::contract(self.base.name(), "pop", "envelope is empty"))?;
        child.base().detach();
        self.touch();
        Ok(child)
    }

    pub fn clear(&mut self) -> Vec<Element> {
        let content = std::mem::take(&mut self.content);
        for child in &content {
            child.base().detach();
        }
        self.touch();
        content
    }

    /// Swap the child `old` for `new` in place, keeping its hierarchy level
    pub fn replace(&mut self, old: EltId, new: impl Into<Element>) -> EltResult<Element> {
        let new = new.into();
        let index = self.index_of(old).ok_or_else(|| {
            EltError::contract(
                self.base.name(),
                "replace",
                format!("{:?} is not a child", old),
            )
        })?;
        self.check_free("replace", &new)?;
        let hier = self.content[index].base().hier();
        new.base().attach(self.base.id());
        new.base().set_hier(hier);
        let prev = std::mem::replace(&mut self.content[index], new);
        prev.base().detach();
        self.touch();
        Ok(prev)
    }

    pub fn index_of(&self, id: EltId) -> Option<usize> {
        self.fresh_index().by_id.get(&id).copied()
    }

    pub fn index_of_name(&self, name: &str) -> Option<usize> {
        self.fresh_index().by_name.get(name).copied()
    }

    /// First child named `name`
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.index_of_name(name).map(|i| &self.content[i])
    }

    /// First child named `name`, mutably
    ///
    /// Renaming the child through the returned reference is picked up by the
    /// next lookup.
    pub fn child_mut(&mut self, name: &str) -> Option<&mut Element> {
        let index = self.index_of_name(name)?;
        self.touch();
        self.content.get_mut(index)
    }

    pub fn by_id(&self, id: EltId) -> Option<&Element> {
        self.index_of(id).map(|i| &self.content[i])
    }

    pub fn at(&self, index: usize) -> Option<&Element> {
        self.content.get(index)
    }

    pub fn at_mut(&mut self, index: usize) -> Option<&mut Element> {
        self.touch();
        self.content.get_mut(index)
    }

    /// Detached envelope holding copies of the children in `range`
    ///
    /// Neither this envelope nor the returned one claims the copies.
    pub fn slice(&self, range: impl RangeBounds<usize>) -> EltResult<Envelope> {
        let len = self.content.len();
        let start = match range.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s
                .checked_add(1)
                .ok_or_else(|| EltError::index(self.base.name(), "slice", s, len))?,
            Bound::Unbounded => 0,
        };
        let stop = match range.end_bound() {
            Bound::Included(&e) => e
                .checked_add(1)
                .ok_or_else(|| EltError::index(self.base.name(), "slice", e, len))?,
            Bound::Excluded(&e) => e,
            Bound::Unbounded => len,
        };
        if stop > len {
            return Err(EltError::index(self.base.name(), "slice", stop, len));
        }
        if start > stop {
            return Err(EltError::index(self.base.name(), "slice", start, stop));
        }
        let copies = self.content[start..stop].to_vec();
        let env = Self::detached(self.base.name(), copies);
        env.base.set_repr(self.base.repr_mode());
        Ok(env)
    }

    /// Install a decode-time length callback bounding the children
    pub fn set_bl_auto<F>(&self, f: F)
    where
        F: Fn(&Scope<'_>) -> EltResult<usize> + 'static,
    {
        self.bl.set_auto(Some(callback(f)));
    }

    pub fn clear_bl_auto(&self) {
        self.bl.set_auto(None);
    }

    pub fn with_bl_auto<F>(self, f: F) -> Self
    where
        F: Fn(&Scope<'_>) -> EltResult<usize> + 'static,
    {
        self.set_bl_auto(f);
        self
    }

    /// Translate bulk assignment keys to content indices
    ///
    /// Keys that are all names are looked up by name, otherwise every key
    /// must be an index.
    fn key_indices<'k>(
        &self,
        op: &'static str,
        keys: impl Iterator<Item = &'k Key> + Clone,
    ) -> EltResult<Vec<usize>> {
        let by_name = keys.clone().all(|k| matches!(k, Key::Name(_)));
        keys.map(|key| match key {
            Key::Name(name) if by_name => self.index_of_name(name).ok_or_else(|| {
                EltError::contract(self.base.name(), op, format!("no child named {:?}", name))
            }),
            Key::Name(name) => Err(EltError::contract(
                self.base.name(),
                op,
                format!("name key {:?} mixed with index keys", name),
            )),
            Key::Index(i) if *i < self.content.len() => Ok(*i),
            Key::Index(i) => Err(EltError::index(
                self.base.name(),
                op,
                *i,
                self.content.len(),
            )),
        })
        .collect()
    }

    fn check_positional(&self, op: &'static str, len: usize) -> EltResult<()> {
        if len > self.content.len() {
            return Err(EltError::index(
                self.base.name(),
                op,
                len - 1,
                self.content.len(),
            ));
        }
        Ok(())
    }

    /// Assign bit lengths to the children, index-aligned with `content()`
    pub fn set_bl_positional(&self, bls: &[Option<usize>]) -> EltResult<()> {
        self.check_positional("set_bl", bls.len())?;
        let scope = Scope::root(self);
        for (child, bl) in self.content.iter().zip(bls) {
            child.set_bl_in(&Scope::nested(child.as_dyn(), &scope), *bl)?;
        }
        Ok(())
    }

    /// Assign bit lengths to the children by name or by index
    pub fn set_bl_keyed(&self, bls: &[(Key, Option<usize>)]) -> EltResult<()> {
        let indices = self.key_indices("set_bl", bls.iter().map(|(k, _)| k))?;
        let scope = Scope::root(self);
        for (i, (_, bl)) in indices.into_iter().zip(bls) {
            let child = &self.content[i];
            child.set_bl_in(&Scope::nested(child.as_dyn(), &scope), *bl)?;
        }
        Ok(())
    }

    fn decode_children(&self, scope: &Scope<'_>, cur: &mut BitCursor<'_>) -> EltResult<()> {
        for child in &self.content {
            child.decode_in(&Scope::nested(child.as_dyn(), scope), cur)?;
        }
        Ok(())
    }
}

impl Clone for Envelope {
    fn clone(&self) -> Self {
        let content = self.content.clone();
        let env = Self {
            base: self.base.clone(),
            content,
            index: RefCell::new(Index {
                stale: true,
                ..Index::default()
            }),
            bl: self.bl.clone(),
            iter_trans: self.iter_trans,
        };
        for (orig, copy) in self.content.iter().zip(&env.content) {
            if orig.base().container() == Some(self.base.id()) {
                copy.base().attach(env.base.id());
            }
        }
        env
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("base", &self.base)
            .field("content", &self.content)
            .field("iter_trans", &self.iter_trans)
            .finish()
    }
}

impl Elt for Envelope {
    fn base(&self) -> &EltBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EltBase {
        &mut self.base
    }

    fn kind(&self) -> EltKind {
        EltKind::Envelope
    }

    fn as_dyn(&self) -> &dyn Elt {
        self
    }

    /// Values of the children yielded by iteration
    fn value_in(&self, scope: &Scope<'_>) -> EltResult<Value> {
        let mut out = Vec::with_capacity(self.content.len());
        for i in self.visible_in(scope)? {
            let child = &self.content[i];
            out.push(child.value_in(&Scope::nested(child.as_dyn(), scope))?);
        }
        Ok(Value::List(out))
    }

    /// Positional values are aligned with the children yielded by iteration,
    /// as `value_in` lists them; keyed values are addressed by child name or
    /// by `content()` index
    ///
    /// A child's transparency is resolved once the children before it hold
    /// their new values, so a flag earlier in the list can reveal a field.
    fn set_val_in(&self, scope: &Scope<'_>, val: Value) -> EltResult<()> {
        match val {
            Value::List(vals) => {
                self.check_positional("set_val", vals.len())?;
                let total = vals.len();
                let mut vals = vals.into_iter();
                let mut used = 0;
                for child in &self.content {
                    if used == total {
                        break;
                    }
                    let s = Scope::nested(child.as_dyn(), scope);
                    if !self.iter_trans && child.transparent_in(&s)? {
                        continue;
                    }
                    if let Some(v) = vals.next() {
                        child.set_val_in(&s, v)?;
                        used += 1;
                    }
                }
                if used < total {
                    return Err(EltError::index(self.base.name(), "set_val", used, used));
                }
                Ok(())
            }
            Value::Keyed(pairs) => {
                let indices = self.key_indices("set_val", pairs.iter().map(|(k, _)| k))?;
                for (i, (_, v)) in indices.into_iter().zip(pairs) {
                    let child = &self.content[i];
                    child.set_val_in(&Scope::nested(child.as_dyn(), scope), v)?;
                }
                Ok(())
            }
            other => Err(EltError::type_error(
                self.base.name(),
                "set_val",
                format!("expected a list or keyed value, got {}", other.kind()),
            )),
        }
    }

    fn clear_val(&self) {
        for child in &self.content {
            child.clear_val();
        }
    }

    fn bit_length_in(&self, scope: &Scope<'_>) -> EltResult<usize> {
        if self.transparent_in(scope)? {
            return Ok(0);
        }
        let mut total = 0;
        for child in &self.content {
            total += child.bit_length_in(&Scope::nested(child.as_dyn(), scope))?;
        }
        Ok(total)
    }

    fn encode_in(&self, scope: &Scope<'_>, out: &mut Vec<Triple>) -> EltResult<()> {
        if self.transparent_in(scope)? {
            return Ok(());
        }
        for child in &self.content {
            child.encode_in(&Scope::nested(child.as_dyn(), scope), out)?;
        }
        Ok(())
    }

    fn decode_in(&self, scope: &Scope<'_>, cur: &mut BitCursor<'_>) -> EltResult<()> {
        if self.transparent_in(scope)? {
            return Ok(());
        }
        trace!("{:?}: decode at bit {}", scope, cur.position());
        match self.bl.resolve_opt(scope, "bit_length", |_| Ok(()))? {
            Some(bl) => {
                let mut bounded = cur.bound(bl)?;
                self.decode_children(scope, &mut bounded)
            }
            None => self.decode_children(scope, cur),
        }
    }

    fn lookup(&self, _scope: &Scope<'_>, name: &str) -> Option<Node<'_>> {
        self.child(name).map(|child| Node::Borrowed(child.as_dyn()))
    }

    fn lookup_at(&self, _scope: &Scope<'_>, index: usize) -> Option<Node<'_>> {
        self.content.get(index).map(|child| Node::Borrowed(child.as_dyn()))
    }

    fn child_count(&self, _scope: &Scope<'_>) -> usize {
        self.content.len()
    }

    fn is_static(&self) -> bool {
        self.callbacks().is_empty() && self.content.iter().all(|child| child.is_static())
    }

    fn callbacks(&self) -> Vec<&'static str> {
        let mut out = self.base.callbacks();
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
                for i in self.visible_in(scope)? {
                    let child = &self.content[i];
                    body.push_str(&child.repr_in(&Scope::nested(child.as_dyn(), scope))?);
                }
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
                for i in self.visible_in(scope)? {
                    let child = &self.content[i];
                    child.show_in(&Scope::nested(child.as_dyn(), scope), out)?;
                }
            }
            rep => {
                let text = packed_text(scope, rep)?;
                out.push_str(&format!("{}### {} : {} ###\n", pad, title, text));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Atom;
    use crate::elt::EltExt;
    use bitmodel_core::CursorError;

    fn header() -> Envelope {
        Envelope::new(
            "Header",
            vec![
                Atom::uint8("Tag").into(),
                Atom::uint8("Len").into(),
                Atom::buf("Value").into(),
            ],
        )
    }

    #[test]
    fn test_ownership() {
        let mut env = header();
        let child = Atom::uint8("Extra");
        let id = child.id();
        assert_eq!(child.container(), None);

        env.append(child).unwrap();
        assert_eq!(env.by_id(id).unwrap().container(), Some(env.id()));
        assert_eq!(env.index_of(id), Some(3));

        let removed = env.remove(id).unwrap();
        assert_eq!(removed.container(), None);
        assert_eq!(env.index_of(id), None);
        assert!(matches!(
            env.remove(id).unwrap_err(),
            EltError::Contract { op: "remove", .. }
        ));
    }

    #[test]
    fn test_attach_keeps_explicit_level() {
        let mut env = header();
        env.append(Atom::uint8("Deep").with_hier(3)).unwrap();
        env.append(Atom::uint8("Flat")).unwrap();
        assert_eq!(env.child("Deep").unwrap().base().hier(), 3);
        assert_eq!(env.child("Flat").unwrap().base().hier(), 1);
        assert!(env.show().unwrap().contains("            <Deep : 0>\n"));
    }

    #[test]
    fn test_duplicate_names_by_identity() {
        let mut env = Envelope::new("Items", vec![]);
        let first = Atom::uint8("Item").with_val(1u8).unwrap();
        let second = Atom::uint8("Item").with_val(2u8).unwrap();
        let second_id = second.id();
        env.append(first).unwrap();
        env.append(second).unwrap();

        assert_eq!(env.child("Item").unwrap().value().unwrap(), Value::Uint(1));
        assert_eq!(env.index_of(second_id), Some(1));
        env.remove(second_id).unwrap();
        assert_eq!(env.value().unwrap(), Value::List(vec![Value::Uint(1)]));
    }

    #[test]
    fn test_insert_pop_clear() {
        let mut env = header();
        assert!(env.insert(4, Atom::uint8("x")).is_err());
        env.insert(0, Atom::uint8("First")).unwrap();
        assert_eq!(env.at(0).unwrap().name(), "First");
        assert_eq!(env.index_of_name("Tag"), Some(1));

        let last = env.pop().unwrap();
        assert_eq!(last.name(), "Value");
        assert_eq!(last.container(), None);

        let all = env.clear();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|c| c.container().is_none()));
        assert!(env.is_empty());
        assert!(matches!(env.pop().unwrap_err(), EltError::Contract { op: "pop", .. }));
    }

    #[test]
    fn test_replace_keeps_position_and_level() {
        let mut env = header();
        let len_id = env.child("Len").unwrap().id();
        env.child("Len").unwrap().base().set_hier(3);

        let new = Atom::uint16("Len");
        let new_id = new.id();
        let old = env.replace(len_id, new).unwrap();
        assert_eq!(old.container(), None);
        assert_eq!(env.index_of(new_id), Some(1));
        assert_eq!(env.at(1).unwrap().base().hier(), 3);
        assert_eq!(env.bit_length().unwrap(), 24);
    }

    #[test]
    fn test_transparent_children_skipped() {
        let mut env = header();
        env.child("Len").unwrap().base().set_trans(Some(true));
        env.set_val(Value::List(vec![Value::Uint(1), Value::from(b"A")]))
            .unwrap();

        assert_eq!(env.bit_length().unwrap(), 16);
        assert_eq!(&env.to_bytes().unwrap()[..], &[1, b'A']);
        assert_eq!(env.iter().unwrap().count(), 2);
        assert_eq!(env.content().len(), 3);
        assert_eq!(
            env.value().unwrap(),
            Value::List(vec![Value::Uint(1), Value::from(b"A")])
        );
        let three = Value::List(vec![Value::Uint(2), Value::from(b"B"), Value::Uint(9)]);
        assert!(matches!(
            env.set_val(three.clone()).unwrap_err(),
            EltError::Index { op: "set_val", .. }
        ));

        env.set_iter_transparent(true);
        assert_eq!(env.iter().unwrap().count(), 3);
        assert!(env.set_val(three).is_err());
        env.set_val(Value::List(vec![Value::Uint(2), Value::Uint(9), Value::from(b"B")]))
            .unwrap();
        assert_eq!(env.child("Len").unwrap().value().unwrap(), Value::Uint(9));
    }

    #[test]
    fn test_positional_values_round_trip() {
        let env = Envelope::new(
            "Triple",
            vec![
                Atom::uint8("A").with_val(1u8).unwrap().into(),
                Atom::uint8("B").with_trans(true).into(),
                Atom::uint8("C").with_val(3u8).unwrap().into(),
            ],
        );
        let vals = env.value().unwrap();
        assert_eq!(vals, Value::List(vec![Value::Uint(1), Value::Uint(3)]));

        let copy = env.clone();
        copy.clear_val();
        copy.set_val(vals.clone()).unwrap();
        assert_eq!(copy.value().unwrap(), vals);
        assert_eq!(&copy.to_bytes().unwrap()[..], &[1, 3]);
    }

    #[test]
    fn test_positional_values_follow_flag() {
        let opt = Atom::uint8("Opt")
            .with_trans_auto(|s| Ok(s.sibling("Flags")?.value()? == Value::Uint(0)));
        let env = Envelope::new(
            "Msg",
            vec![Atom::uint8("Flags").into(), opt.into(), Atom::uint8("Tail").into()],
        );
        let vals = Value::List(vec![Value::Uint(1), Value::Uint(5), Value::Uint(6)]);
        env.set_val(vals.clone()).unwrap();
        assert_eq!(&env.to_bytes().unwrap()[..], &[1, 5, 6]);
        assert_eq!(env.value().unwrap(), vals);
    }

    #[test]
    fn test_extend() {
        let mut env = header();
        env.extend([Atom::uint8("X").into(), Atom::uint8("Y").into()])
            .unwrap();
        assert_eq!(env.len(), 5);
        assert_eq!(env.index_of_name("Y"), Some(4));
        assert!(env.content().iter().all(|c| c.container() == Some(env.id())));

        let holder = Envelope::new("Holder", vec![Atom::uint8("Held").into()]);
        let attached = holder.at(0).unwrap().clone();
        attached.base().attach(holder.id());
        let err = env
            .extend([Atom::uint8("Z").into(), attached])
            .unwrap_err();
        assert!(matches!(err, EltError::Contract { op: "extend", .. }));
        assert_eq!(env.len(), 5);
        assert!(env.child("Z").is_none());
    }

    #[test]
    fn test_keyed_assignment() {
        let env = header();
        env.set_val(Value::keyed([("Value", Value::from(b"AB")), ("Tag", Value::Uint(5))]))
            .unwrap();
        assert_eq!(&env.to_bytes().unwrap()[..], &[5, 0, b'A', b'B']);

        env.set_val(Value::keyed([(1usize, 7u8)])).unwrap();
        assert_eq!(env.child("Len").unwrap().value().unwrap(), Value::Uint(7));

        let mixed = Value::Keyed(vec![
            (Key::from("Tag"), Value::Uint(1)),
            (Key::from(2usize), Value::Uint(1)),
        ]);
        assert!(matches!(env.set_val(mixed).unwrap_err(), EltError::Contract { .. }));
        assert!(env.set_val(Value::keyed([("Nope", 1u8)])).is_err());
        assert!(env.set_val(Value::Uint(1)).is_err());
    }

    #[test]
    fn test_bulk_bit_lengths() {
        let env = header();
        env.set_bl_positional(&[None, Some(4), Some(16)]).unwrap();
        assert_eq!(env.bit_length().unwrap(), 28);
        env.set_bl_keyed(&[(Key::from("Len"), None)]).unwrap();
        assert_eq!(env.bit_length().unwrap(), 32);
        assert!(env.set_bl_positional(&[None, None, None, None]).is_err());
    }

    #[test]
    fn test_bounded_decode_restores_end() {
        let inner = Envelope::new("Inner", vec![Atom::buf_rest("Data").into()])
            .with_bl_auto(|s| Ok(s.sibling("Len")?.value()?.as_uint().unwrap_or(0) as usize * 8));
        let outer = Envelope::new(
            "Outer",
            vec![Atom::uint8("Len").into(), inner.into(), Atom::uint8("Trailer").into()],
        );

        let used = outer.from_bytes(&[2, b'h', b'i', 0xEE]).unwrap();
        assert_eq!(used, 32);
        let inner = outer.child("Inner").unwrap().as_envelope().unwrap();
        assert_eq!(inner.child("Data").unwrap().value().unwrap(), Value::from(b"hi"));
        assert_eq!(outer.child("Trailer").unwrap().value().unwrap(), Value::Uint(0xEE));
    }

    #[test]
    fn test_bound_past_end() {
        let inner = Envelope::new("Inner", vec![Atom::buf_rest("Data").into()])
            .with_bl_auto(|_| Ok(64));
        let outer = Envelope::new("Outer", vec![inner.into()]);
        assert!(matches!(
            outer.from_bytes(&[1, 2]).unwrap_err(),
            EltError::Cursor(CursorError::BoundPastEnd { .. })
        ));
    }

    #[test]
    fn test_slice_is_detached() {
        let env = header();
        let part = env.slice(1..).unwrap();
        assert_eq!(part.len(), 2);
        assert_eq!(part.at(0).unwrap().name(), "Len");
        assert!(part.content().iter().all(|c| c.container().is_none()));
        assert_ne!(part.at(0).unwrap().id(), env.at(1).unwrap().id());
        assert!(env.slice(2..5).is_err());
        assert!(matches!(
            env.slice(..=usize::MAX).unwrap_err(),
            EltError::Index { op: "slice", .. }
        ));
        assert!(matches!(
            env.slice((Bound::Excluded(usize::MAX), Bound::Unbounded))
                .unwrap_err(),
            EltError::Index { op: "slice", .. }
        ));
    }

    #[test]
    fn test_clone_reattaches() {
        let env = header();
        let copy = env.clone();
        assert_ne!(copy.id(), env.id());
        assert!(copy.content().iter().all(|c| c.container() == Some(copy.id())));
        copy.child("Tag").unwrap().set_val(3u8).unwrap();
        assert_eq!(env.child("Tag").unwrap().value().unwrap(), Value::Uint(0));
    }

    #[test]
    fn test_rename_through_child_mut() {
        let mut env = header();
        env.child_mut("Tag").unwrap().base_mut().set_name("Type");
        assert!(env.child("Tag").is_none());
        assert_eq!(env.index_of_name("Type"), Some(0));
    }

    #[test]
    fn test_show() {
        let env = header();
        env.child("Tag").unwrap().set_val(1u8).unwrap();
        let text = env.show().unwrap();
        assert!(text.starts_with("### Header ###\n"));
        assert!(text.contains("    <Tag : 1>\n"));
        assert_eq!(env.repr().unwrap(), "<Header : <Tag : 1><Len : 0><Value : 0x>>");
    }
}

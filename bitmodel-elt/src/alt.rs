//! Discriminated alternative

use crate::element::Element;
use crate::elt::{Elt, EltBase, EltKind, EnumDict};
use crate::resolve::{call, callback, Callback};
use crate::scope::{Node, Scope};
use bitmodel_core::{BitCursor, EltError, EltResult, Triple, Value};
use log::debug;
use once_cell::unsync::OnceCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// A union of elements keyed by a selector value
///
/// The selector runs on every access, against the scope of the Alt, so it can
/// read a sibling discriminator. The alternative for a key is cloned from the
/// generator on first access and kept in its slot: repeated access returns the
/// same element, borrowed for as long as the Alt is.
pub struct Alt {
    base: EltBase,
    r#gen: Rc<BTreeMap<Value, Element>>,
    default: Option<Box<Element>>,
    sel: Callback<Value>,
    live: BTreeMap<Value, OnceCell<Element>>,
}

impl Alt {
    pub fn new<K, I, V, F>(name: impl Into<String>, r#gen: I, sel: F) -> Self
    where
        K: Into<Value>,
        I: IntoIterator<Item = (K, Element)>,
        V: Into<Value>,
        F: Fn(&Scope<'_>) -> EltResult<V> + 'static,
    {
        let r#gen: BTreeMap<Value, Element> = r#gen.into_iter().map(|(k, e)| (k.into(), e)).collect();
        let live = r#gen.keys().map(|k| (k.clone(), OnceCell::new())).collect();
        Self {
            base: EltBase::new(name),
            r#gen: Rc::new(r#gen),
            default: None,
            sel: callback(move |s| sel(s).map(Into::into)),
            live,
        }
    }

    /// Fallback for selector values the generator does not map
    pub fn with_default(mut self, elt: impl Into<Element>) -> Self {
        let elt = elt.into();
        elt.base().attach(self.base.id());
        self.default = Some(Box::new(elt));
        self
    }

    pub fn generator(&self) -> &BTreeMap<Value, Element> {
        &self.r#gen
    }

    pub fn default_elt(&self) -> Option<&Element> {
        self.default.as_deref()
    }

    /// Keys materialized so far
    pub fn materialized(&self) -> Vec<Value> {
        self.live
            .iter()
            .filter(|(_, slot)| slot.get().is_some())
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Current selector value, `None` when the selector faults
    pub fn select(&self) -> Option<Value> {
        self.select_in(&Scope::root(self))
    }

    pub fn select_in(&self, scope: &Scope<'_>) -> Option<Value> {
        match call(&self.sel, scope, "select") {
            Ok(key) => Some(key),
            Err(err) => {
                debug!("{}: no selection: {}", self.base.name(), err);
                None
            }
        }
    }

    /// The active alternative
    pub fn active(&self) -> EltResult<&Element> {
        self.active_in(&Scope::root(self))
    }

    pub fn active_in(&self, scope: &Scope<'_>) -> EltResult<&Element> {
        let key = self.select_in(scope);
        if let Some(key) = &key {
            if let (Some(slot), Some(proto)) = (self.live.get(key), self.r#gen.get(key)) {
                return Ok(slot.get_or_init(|| {
                    let elt = proto.clone();
                    elt.base().attach(self.base.id());
                    elt
                }));
            }
        }
        match self.default.as_deref() {
            Some(elt) => {
                debug!("{}: falling back to default for {:?}", self.base.name(), key);
                Ok(elt)
            }
            None => Err(EltError::NoSelection {
                elt: self.base.name().to_string(),
                op: "active",
                key: key.map_or_else(|| "none".to_string(), |k| k.to_string()),
            }),
        }
    }

    /// Run `f` on the active alternative, standing in place of the Alt
    fn forward<T, F>(&self, scope: &Scope<'_>, f: F) -> EltResult<T>
    where
        F: FnOnce(&Element, &Scope<'_>) -> EltResult<T>,
    {
        let active = self.active_in(scope)?;
        let s = Scope::stand_in(active.as_dyn(), scope);
        f(active, &s)
    }
}

impl Clone for Alt {
    fn clone(&self) -> Self {
        let base = self.base.clone();
        let adopt = |elt: &Element| {
            let copy = elt.clone();
            copy.base().attach(base.id());
            copy
        };
        let default = self.default.as_deref().map(&adopt).map(Box::new);
        let live = self
            .live
            .iter()
            .map(|(k, slot)| {
                let copy = OnceCell::new();
                if let Some(elt) = slot.get() {
                    let _ = copy.set(adopt(elt));
                }
                (k.clone(), copy)
            })
            .collect();
        Self {
            r#gen: Rc::clone(&self.r#gen),
            default,
            sel: Rc::clone(&self.sel),
            live,
            base,
        }
    }
}

impl fmt::Debug for Alt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Alt")
            .field("base", &self.base)
            .field("gen", &self.r#gen.keys().collect::<Vec<_>>())
            .field("default", &self.default.is_some())
            .field("live", &self.materialized())
            .finish()
    }
}

impl Elt for Alt {
    fn base(&self) -> &EltBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EltBase {
        &mut self.base
    }

    fn kind(&self) -> EltKind {
        EltKind::Alt
    }

    fn as_dyn(&self) -> &dyn Elt {
        self
    }

    fn value_in(&self, scope: &Scope<'_>) -> EltResult<Value> {
        self.forward(scope, |e, s| e.value_in(s))
    }

    fn set_val_in(&self, scope: &Scope<'_>, val: Value) -> EltResult<()> {
        self.forward(scope, |e, s| e.set_val_in(s, val))
    }

    fn clear_val(&self) {
        for elt in self.live.values().filter_map(OnceCell::get) {
            elt.clear_val();
        }
        if let Some(elt) = &self.default {
            elt.clear_val();
        }
    }

    fn bit_length_in(&self, scope: &Scope<'_>) -> EltResult<usize> {
        if self.transparent_in(scope)? {
            return Ok(0);
        }
        self.forward(scope, |e, s| e.bit_length_in(s))
    }

    fn set_bl_in(&self, scope: &Scope<'_>, bl: Option<usize>) -> EltResult<()> {
        self.forward(scope, |e, s| e.set_bl_in(s, bl))
    }

    /// The Alt's own transparency wins when set, else the active one's
    fn transparent_in(&self, scope: &Scope<'_>) -> EltResult<bool> {
        let trans = &self.base().trans;
        if trans.has_raw() || trans.has_auto() {
            return trans.resolve(scope, "transparency", || false, |_| Ok(()));
        }
        self.forward(scope, |e, s| e.transparent_in(s))
    }

    fn encode_in(&self, scope: &Scope<'_>, out: &mut Vec<Triple>) -> EltResult<()> {
        if self.transparent_in(scope)? {
            return Ok(());
        }
        self.forward(scope, |e, s| e.encode_in(s, out))
    }

    fn decode_in(&self, scope: &Scope<'_>, cur: &mut BitCursor<'_>) -> EltResult<()> {
        if self.transparent_in(scope)? {
            return Ok(());
        }
        self.forward(scope, |e, s| e.decode_in(s, cur))
    }

    fn enum_table_in(&self, scope: &Scope<'_>) -> EltResult<Option<Rc<EnumDict>>> {
        self.forward(scope, |e, s| e.enum_table_in(s))
    }

    fn enum_label_in(&self, scope: &Scope<'_>) -> EltResult<Option<String>> {
        self.forward(scope, |e, s| e.enum_label_in(s))
    }

    /// Children of the active alternative
    fn lookup(&self, scope: &Scope<'_>, name: &str) -> Option<Node<'_>> {
        let active = self.active_in(scope).ok()?;
        active.lookup(&Scope::stand_in(active.as_dyn(), scope), name)
    }

    fn lookup_at(&self, scope: &Scope<'_>, index: usize) -> Option<Node<'_>> {
        let active = self.active_in(scope).ok()?;
        active.lookup_at(&Scope::stand_in(active.as_dyn(), scope), index)
    }

    fn child_count(&self, scope: &Scope<'_>) -> usize {
        self.forward(scope, |e, s| Ok(e.child_count(s)))
            .unwrap_or(0)
    }

    fn is_static(&self) -> bool {
        false
    }

    fn callbacks(&self) -> Vec<&'static str> {
        let mut out = self.base.callbacks();
        out.push("sel");
        out
    }

    fn repr_in(&self, scope: &Scope<'_>) -> EltResult<String> {
        self.forward(scope, |e, s| e.repr_in(s))
    }

    fn show_in(&self, scope: &Scope<'_>, out: &mut String) -> EltResult<()> {
        self.forward(scope, |e, s| e.show_in(s, out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::Atom;
    use crate::elt::EltExt;
    use crate::envelope::Envelope;

    fn body() -> Alt {
        Alt::new(
            "Body",
            [
                (1u8, Element::from(Atom::uint8("A"))),
                (2u8, Element::from(Atom::uint16("B"))),
            ],
            |s| Ok(s.sibling("Type")?.value()?),
        )
    }

    fn msg(alt: Alt) -> Envelope {
        Envelope::new("Msg", vec![Atom::uint8("Type").into(), alt.into()])
    }

    #[test]
    fn test_selection_follows_discriminator() {
        let env = msg(body());
        env.child("Type").unwrap().set_val(1u8).unwrap();
        let root = Scope::root(&env);
        root.child("Body").unwrap().set_val(7u8).unwrap();
        assert_eq!(env.bit_length().unwrap(), 16);
        assert_eq!(&env.to_bytes().unwrap()[..], &[1, 7]);
        assert!(env.child("Body").unwrap().value().is_err());

        env.child("Type").unwrap().set_val(2u8).unwrap();
        assert_eq!(env.bit_length().unwrap(), 24);
        assert_eq!(&env.to_bytes().unwrap()[..], &[2, 0, 0]);
    }

    #[test]
    fn test_decode_selects_after_discriminator() {
        let env = msg(body());
        assert_eq!(env.from_bytes(&[2, 0x12, 0x34]).unwrap(), 24);
        let root = Scope::root(&env);
        assert_eq!(root.child("Body").unwrap().value().unwrap(), Value::Uint(0x1234));
        assert_eq!(
            env.value().unwrap(),
            Value::List(vec![Value::Uint(2), Value::Uint(0x1234)])
        );
    }

    #[test]
    fn test_identity_stable() {
        let alt = Alt::new("Body", [(1u8, Element::from(Atom::uint8("A")))], |_| Ok(1u8));
        let first = alt.active().unwrap();
        let second = alt.active().unwrap();
        assert!(std::ptr::eq(first, second));
        assert_eq!(first.container(), Some(alt.id()));
        first.set_val(5u8).unwrap();
        assert_eq!(alt.value().unwrap(), Value::Uint(5));
        assert_eq!(alt.materialized(), vec![Value::Uint(1)]);
    }

    #[test]
    fn test_default_fallback() {
        let alt = Alt::new("Body", [(1u8, Element::from(Atom::uint8("A")))], |_| Ok(9u8))
            .with_default(Atom::buf_rest("Raw"));
        assert_eq!(alt.active().unwrap().name(), "Raw");
        assert_eq!(alt.from_bytes(b"xyz").unwrap(), 24);
        assert_eq!(alt.value().unwrap(), Value::from(b"xyz"));
        assert!(alt.materialized().is_empty());
    }

    #[test]
    fn test_unmapped_without_default() {
        let alt = Alt::new(
            "Body",
            [
                (1u8, Element::from(Atom::uint8("A"))),
                (2u8, Element::from(Atom::uint8("B"))),
            ],
            |_| Ok(3u8),
        );
        assert!(matches!(alt.value().unwrap_err(), EltError::NoSelection { .. }));
        assert!(alt.bit_length().is_err());
        assert!(alt.to_bytes().is_err());
    }

    #[test]
    fn test_faulting_selector() {
        let alt = Alt::new("Body", [(1u8, Element::from(Atom::uint8("A")))], |s| {
            Ok(s.sibling("Type")?.value()?)
        });
        assert_eq!(alt.select(), None);
        assert!(matches!(alt.active().unwrap_err(), EltError::NoSelection { .. }));
    }

    #[test]
    fn test_own_transparency_wins() {
        let env = msg(body());
        env.child("Type").unwrap().set_val(1u8).unwrap();
        let alt = env.child("Body").unwrap();
        alt.base().set_trans(Some(true));
        assert_eq!(env.bit_length().unwrap(), 8);
        alt.base().set_trans(None);
        assert_eq!(env.bit_length().unwrap(), 16);
    }

    #[test]
    fn test_navigate_into_active() {
        let one = Envelope::new("One", vec![Atom::uint8("X").into(), Atom::uint8("Y").into()]);
        let body = Alt::new("Body", [(1u8, Element::from(one))], |s| {
            Ok(s.sibling("Type")?.value()?)
        });
        let echo = Atom::uint8("Echo").with_val_auto(|s| {
            Ok(s.sibling("Body")?.child("X")?.value()?.as_uint().unwrap_or(0))
        });
        let env = Envelope::new(
            "Msg",
            vec![Atom::uint8("Type").into(), body.into(), echo.into()],
        );
        env.child("Type").unwrap().set_val(1u8).unwrap();

        let root = Scope::root(&env);
        let body = root.child("Body").unwrap();
        body.child("X").unwrap().set_val(4u8).unwrap();
        assert_eq!(body.child_at(1).unwrap().name(), "Y");
        assert_eq!(body.elt().child_count(&body), 2);
        assert_eq!(&env.to_bytes().unwrap()[..], &[1, 4, 0, 4]);

        env.child("Type").unwrap().set_val(2u8).unwrap();
        assert!(body.child("X").is_err());
        assert_eq!(body.elt().child_count(&body), 0);
    }

    #[test]
    fn test_clone_deep_copies_live_entries() {
        let alt = Alt::new("Body", [(1u8, Element::from(Atom::uint8("A")))], |_| Ok(1u8));
        alt.set_val(3u8).unwrap();
        let copy = alt.clone();
        copy.set_val(4u8).unwrap();
        assert_eq!(alt.value().unwrap(), Value::Uint(3));
        assert_eq!(copy.value().unwrap(), Value::Uint(4));
        assert_eq!(copy.active().unwrap().container(), Some(copy.id()));
    }
}

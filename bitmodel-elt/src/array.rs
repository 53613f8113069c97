//! Homogeneous repetition of a template's value

use crate::element::Element;
use crate::elt::{indent, packed_text, title, Elt, EltBase, EltExt, EltKind};
use crate::repeat::{decode_repeated, RepeatPolicy};
use crate::resolve::{callback, Resolvable};
use crate::scope::Scope;
use bitmodel_core::{BitCursor, EltError, EltResult, Repr, Safety, Triple, Value};
use log::trace;
use std::cell::{Cell, RefCell};

/// Template default value, length and packed form, kept when the template
/// has no callback anywhere
#[derive(Debug, Clone)]
struct TemplateCache {
    val: Value,
    bl: usize,
    pack: Vec<Triple>,
}

impl TemplateCache {
    fn build(tmpl: &Element) -> Option<Self> {
        if !tmpl.is_static() {
            return None;
        }
        Some(Self {
            val: tmpl.value().ok()?,
            bl: tmpl.bit_length().ok()?,
            pack: tmpl.to_triples().ok()?,
        })
    }
}

/// Repetition of one template, storing values only
///
/// With an explicit count, every mutation is bounded by it, and fewer
/// stored values are padded with the template default.
#[derive(Debug, Clone)]
pub struct Array {
    base: EltBase,
    tmpl: Box<Element>,
    cache: Option<TemplateCache>,
    vals: RefCell<Vec<Value>>,
    num: Resolvable<usize>,
    bl: Resolvable<usize>,
    policy: Cell<RepeatPolicy>,
}

impl Array {
    pub fn new(name: impl Into<String>, tmpl: impl Into<Element>) -> Self {
        let tmpl: Element = tmpl.into();
        let cache = TemplateCache::build(&tmpl);
        Self {
            base: EltBase::new(name),
            tmpl: Box::new(tmpl),
            cache,
            vals: RefCell::new(Vec::new()),
            num: Resolvable::new(),
            bl: Resolvable::new(),
            policy: Cell::new(RepeatPolicy::default()),
        }
    }

    pub fn template(&self) -> &Element {
        &self.tmpl
    }

    /// Stored values, without padding
    pub fn values(&self) -> Vec<Value> {
        self.vals.borrow().clone()
    }

    /// Number of stored values
    pub fn len(&self) -> usize {
        self.vals.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.vals.borrow().is_empty()
    }

    /// Explicit repetition count
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
                    format!("{} values already stored, more than {}", len, n),
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

    fn default_val(&self) -> EltResult<Value> {
        match &self.cache {
            Some(cache) => Ok(cache.val.clone()),
            None => self.tmpl.value(),
        }
    }

    fn is_default(&self, val: &Value) -> bool {
        self.cache.as_ref().is_some_and(|c| &c.val == val)
    }

    /// Template copy holding `val`
    fn instance(&self, val: Value) -> EltResult<Element> {
        let elt = (*self.tmpl).clone();
        elt.set_val(val)?;
        Ok(elt)
    }

    /// Canonical form of `val` as held by the template
    fn format(&self, val: Value) -> EltResult<Value> {
        if self.is_default(&val) {
            return Ok(val);
        }
        self.instance(val)?.value()
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

    pub fn append(&mut self, val: impl Into<Value>) -> EltResult<()> {
        self.check_room("append", self.len() + 1)?;
        let val = self.format(val.into())?;
        self.vals.get_mut().push(val);
        Ok(())
    }

    pub fn insert(&mut self, index: usize, val: impl Into<Value>) -> EltResult<()> {
        let len = self.len();
        if index > len {
            return Err(EltError::index(self.base.name(), "insert", index, len));
        }
        self.check_room("insert", len + 1)?;
        let val = self.format(val.into())?;
        self.vals.get_mut().insert(index, val);
        Ok(())
    }

    pub fn extend<I, V>(&mut self, vals: I) -> EltResult<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let vals = vals
            .into_iter()
            .map(|v| self.format(v.into()))
            .collect::<EltResult<Vec<_>>>()?;
        self.check_room("extend", self.len() + vals.len())?;
        self.vals.get_mut().extend(vals);
        Ok(())
    }

    pub fn replace(&mut self, index: usize, val: impl Into<Value>) -> EltResult<Value> {
        self.check_index("replace", index, self.len())?;
        let val = self.format(val.into())?;
        Ok(std::mem::replace(&mut self.vals.get_mut()[index], val))
    }

    pub fn remove(&mut self, index: usize) -> EltResult<Value> {
        self.check_index("remove", index, self.len())?;
        Ok(self.vals.get_mut().remove(index))
    }

    pub fn pop(&mut self) -> EltResult<Value> {
        let name = self.base.name();
        self.vals
            .get_mut()
            .pop()
            .ok_or_else(|| EltError::contract(name, "pop", "array is empty"))
    }

    pub fn clear(&mut self) {
        self.vals.get_mut().clear();
    }

    /// Stored values padded with the template default up to the count
    fn padded(&self) -> EltResult<Vec<Value>> {
        let mut vals = self.values();
        if let Some(n) = self.num.raw() {
            if vals.len() < n {
                let default = self.default_val()?;
                vals.resize(n, default);
            }
        }
        Ok(vals)
    }

    fn decode_items(&self, scope: &Scope<'_>, cur: &mut BitCursor<'_>) -> EltResult<()> {
        let count = self.num.resolve_opt(scope, "count", |_| Ok(()))?;
        let vals = decode_repeated(self.base.name(), cur, count, self.policy.get(), |cur, i| {
            let work = (*self.tmpl).clone();
            let s = Scope::nested(work.as_dyn(), scope);
            trace!("{:?}: repetition {} at bit {}", scope, i, cur.position());
            work.decode_in(&s, cur)?;
            work.value_in(&s)
        })?;
        *self.vals.borrow_mut() = vals;
        Ok(())
    }
}

impl Elt for Array {
    fn base(&self) -> &EltBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EltBase {
        &mut self.base
    }

    fn kind(&self) -> EltKind {
        EltKind::Array
    }

    fn as_dyn(&self) -> &dyn Elt {
        self
    }

    fn value_in(&self, _scope: &Scope<'_>) -> EltResult<Value> {
        Ok(Value::List(self.padded()?))
    }

    fn set_val_in(&self, _scope: &Scope<'_>, val: Value) -> EltResult<()> {
        match val {
            Value::List(vals) => {
                self.check_room("set_val", vals.len())?;
                let vals = vals
                    .into_iter()
                    .map(|v| self.format(v))
                    .collect::<EltResult<Vec<_>>>()?;
                *self.vals.borrow_mut() = vals;
                Ok(())
            }
            other => Err(EltError::type_error(
                self.base.name(),
                "set_val",
                format!("expected a list, got {}", other.kind()),
            )),
        }
    }

    fn clear_val(&self) {
        self.vals.borrow_mut().clear();
    }

    fn bit_length_in(&self, scope: &Scope<'_>) -> EltResult<usize> {
        if self.transparent_in(scope)? {
            return Ok(0);
        }
        let mut total = 0;
        for val in self.padded()? {
            total += match &self.cache {
                Some(cache) if cache.val == val => cache.bl,
                _ => {
                    let elt = self.instance(val)?;
                    elt.bit_length_in(&Scope::nested(elt.as_dyn(), scope))?
                }
            };
        }
        Ok(total)
    }

    fn encode_in(&self, scope: &Scope<'_>, out: &mut Vec<Triple>) -> EltResult<()> {
        if self.transparent_in(scope)? {
            return Ok(());
        }
        for val in self.padded()? {
            match &self.cache {
                Some(cache) if cache.val == val => out.extend(cache.pack.iter().cloned()),
                _ => {
                    let elt = self.instance(val)?;
                    elt.encode_in(&Scope::nested(elt.as_dyn(), scope), out)?;
                }
            }
        }
        Ok(())
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

    fn is_static(&self) -> bool {
        self.callbacks().is_empty() && self.tmpl.is_static()
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
            Repr::Raw | Repr::Human => Ok(format!("<{} : {}>", title, self.value_in(scope)?)),
            rep => Ok(format!("<{} : {}>", title, packed_text(scope, rep)?)),
        }
    }

    fn show_in(&self, scope: &Scope<'_>, out: &mut String) -> EltResult<()> {
        let pad = indent(scope);
        let title = title(scope)?;
        match self.base.repr_mode() {
            Repr::Raw | Repr::Human => {
                out.push_str(&format!("{}### {} ###\n", pad, title));
                for val in self.padded()? {
                    let elt = self.instance(val)?;
                    if elt.base().hier() == 0 {
                        elt.base().set_hier(1);
                    }
                    elt.show_in(&Scope::nested(elt.as_dyn(), scope), out)?;
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

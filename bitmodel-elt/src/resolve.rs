//! Attribute resolution
//!
//! Every attribute that can be set, computed or defaulted (value, bit length,
//! transparency, enumeration table, repetition count) is stored as a
//! [`Resolvable`]: an explicit slot and a callback slot. Resolution order is
//! explicit, then callback, then the type default. Clearing the explicit slot
//! reverts to whatever the callback or the default produce.

use crate::scope::Scope;
use bitmodel_core::{EltError, EltResult, Safety};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A callback computing an attribute from the element's scope
pub type Callback<T> = Rc<dyn Fn(&Scope<'_>) -> EltResult<T>>;

/// Where the value of an attribute currently comes from
pub enum Source<T> {
    Explicit(T),
    Computed(Callback<T>),
    Default,
}

/// Explicit slot plus callback slot for one attribute
///
/// Both slots live in cells: a decode walk fills explicit values through a
/// shared reference while sibling elements are being read by callbacks.
pub struct Resolvable<T> {
    raw: RefCell<Option<T>>,
    auto: RefCell<Option<Callback<T>>>,
}

impl<T: Clone> Resolvable<T> {
    pub fn new() -> Self {
        Self {
            raw: RefCell::new(None),
            auto: RefCell::new(None),
        }
    }

    /// Set or clear the explicit slot
    pub fn set(&self, value: Option<T>) {
        *self.raw.borrow_mut() = value;
    }

    /// Set or clear the callback slot
    pub fn set_auto(&self, auto: Option<Callback<T>>) {
        *self.auto.borrow_mut() = auto;
    }

    pub fn raw(&self) -> Option<T> {
        self.raw.borrow().clone()
    }

    pub fn has_raw(&self) -> bool {
        self.raw.borrow().is_some()
    }

    pub fn has_auto(&self) -> bool {
        self.auto.borrow().is_some()
    }

    /// Current source, cloned out so that no borrow is held while a callback runs
    pub fn source(&self) -> Source<T> {
        if let Some(value) = self.raw.borrow().as_ref() {
            return Source::Explicit(value.clone());
        }
        match self.auto.borrow().as_ref() {
            Some(auto) => Source::Computed(Rc::clone(auto)),
            None => Source::Default,
        }
    }

    /// Resolve the attribute
    ///
    /// `check` validates callback results when dynamic checks are active.
    pub fn resolve(
        &self,
        scope: &Scope<'_>,
        op: &'static str,
        default: impl FnOnce() -> T,
        check: impl FnOnce(&T) -> Result<(), String>,
    ) -> EltResult<T> {
        match self.resolve_opt(scope, op, check)? {
            Some(value) => Ok(value),
            None => Ok(default()),
        }
    }

    /// Resolve the attribute, `None` standing for the type default
    pub fn resolve_opt(
        &self,
        scope: &Scope<'_>,
        op: &'static str,
        check: impl FnOnce(&T) -> Result<(), String>,
    ) -> EltResult<Option<T>> {
        match self.source() {
            Source::Explicit(value) => Ok(Some(value)),
            Source::Computed(auto) => {
                let value = call(&auto, scope, op)?;
                if Safety::current().validates_dynamic() {
                    check(&value).map_err(|detail| EltError::resolution(scope.name(), op, detail))?;
                }
                Ok(Some(value))
            }
            Source::Default => Ok(None),
        }
    }
}

/// Wrap a closure as a [`Callback`]
pub fn callback<T, F>(f: F) -> Callback<T>
where
    F: Fn(&Scope<'_>) -> EltResult<T> + 'static,
{
    Rc::new(f)
}

/// Run a callback, tagging its failure with the element and operation
///
/// Cursor faults go through untouched so that repetition loops still see them.
pub fn call<T>(auto: &Callback<T>, scope: &Scope<'_>, op: &'static str) -> EltResult<T> {
    auto(scope).map_err(|err| match err {
        EltError::Cursor(_) | EltError::Resolution { .. } => err,
        other => EltError::resolution(scope.name(), op, other.to_string()),
    })
}

impl<T: Clone> Default for Resolvable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for Resolvable<T> {
    fn clone(&self) -> Self {
        Self {
            raw: RefCell::new(self.raw.borrow().clone()),
            auto: RefCell::new(self.auto.borrow().clone()),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Resolvable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolvable")
            .field("raw", &self.raw.borrow())
            .field("auto", &self.auto.borrow().is_some())
            .finish()
    }
}

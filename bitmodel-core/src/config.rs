//! Safety configuration
//!
//! The engine is single threaded, so the active configuration is kept per
//! thread. [`Safety::install`] swaps it for the lifetime of the returned
//! guard:
//!
//! ```
//! use bitmodel_core::Safety;
//!
//! let relaxed = Safety { fuzzing: true, ..Safety::default() };
//! {
//!     let _guard = relaxed.install();
//!     assert!(Safety::current().fuzzing);
//! }
//! assert!(!Safety::current().fuzzing);
//! ```

use serde::{Deserialize, Serialize};
use std::cell::Cell;

thread_local! {
    static CURRENT: Cell<Safety> = const { Cell::new(Safety::DEFAULT) };
}

/// Safety checks applied by element operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Safety {
    /// Validate explicitly assigned values against the declared type-set,
    /// and check attach preconditions on composites
    pub check_static: bool,
    /// Validate values produced by callbacks the same way
    pub check_dynamic: bool,
    /// Skip dynamic validation and degrade size and representation queries
    /// instead of failing. Packing still reports every fault.
    pub fuzzing: bool,
}

impl Safety {
    pub const DEFAULT: Safety = Safety {
        check_static: true,
        check_dynamic: true,
        fuzzing: false,
    };

    /// Configuration active on this thread
    pub fn current() -> Safety {
        CURRENT.with(Cell::get)
    }

    /// Make this configuration active until the guard is dropped
    pub fn install(self) -> SafetyGuard {
        let previous = CURRENT.with(|c| c.replace(self));
        SafetyGuard { previous }
    }

    /// Whether callback results must be validated
    pub fn validates_dynamic(&self) -> bool {
        self.check_dynamic && !self.fuzzing
    }
}

impl Default for Safety {
    fn default() -> Self {
        Safety::DEFAULT
    }
}

/// Restores the previous [`Safety`] when dropped
#[must_use = "the configuration is restored as soon as the guard is dropped"]
pub struct SafetyGuard {
    previous: Safety,
}

impl Drop for SafetyGuard {
    fn drop(&mut self) {
        CURRENT.with(|c| c.set(self.previous));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_nests() {
        let off = Safety {
            check_static: false,
            ..Safety::default()
        };
        let fuzz = Safety {
            fuzzing: true,
            ..Safety::default()
        };
        {
            let _a = off.install();
            {
                let _b = fuzz.install();
                assert_eq!(Safety::current(), fuzz);
                assert!(!Safety::current().validates_dynamic());
            }
            assert_eq!(Safety::current(), off);
        }
        assert_eq!(Safety::current(), Safety::default());
    }
}

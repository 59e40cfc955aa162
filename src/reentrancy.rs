//! Debug-only reentrancy tracking for the pair table.
//!
//! User code (`Eq`, `Hash`, `Drop`) runs while the table is in the middle
//! of an operation. Calling back into the same table from there would see
//! it half-updated, so debug builds panic on nested entry. Release builds
//! compile the checks away but keep the table `!Sync`.

use core::cell::Cell;
use core::marker::PhantomData;

/// Per-table tracker. Each entry point holds `let _g = self.reentrancy.enter("op");`.
#[derive(Debug, Default)]
pub(crate) struct DebugReentrancy {
    // Name of the operation in progress, if any.
    #[cfg(debug_assertions)]
    active: Cell<Option<&'static str>>,
    // Send but not Sync in every profile.
    _nosync: PhantomData<Cell<()>>,
}

impl DebugReentrancy {
    pub(crate) const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            active: Cell::new(None),
            _nosync: PhantomData,
        }
    }

    /// Mark `op` as in progress until the guard drops.
    #[inline]
    pub(crate) fn enter(&self, op: &'static str) -> ReentrancyGuard<'_> {
        #[cfg(debug_assertions)]
        {
            if let Some(outer) = self.active.get() {
                panic!("pair table re-entered by `{op}` while `{outer}` was in progress");
            }
            self.active.set(Some(op));
            ReentrancyGuard { owner: self }
        }

        #[cfg(not(debug_assertions))]
        {
            let _ = op;
            ReentrancyGuard { _z: PhantomData }
        }
    }
}

pub(crate) struct ReentrancyGuard<'a> {
    #[cfg(debug_assertions)]
    owner: &'a DebugReentrancy,
    #[cfg(not(debug_assertions))]
    _z: PhantomData<&'a ()>,
}

impl Drop for ReentrancyGuard<'_> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            debug_assert!(self.owner.active.get().is_some());
            self.owner.active.set(None);
        }
    }
}

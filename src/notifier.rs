//! Notifier registry: routes the module's single callback import.
//!
//! The module has exactly one way to say "poll me again": it calls the
//! `__notifier_callback(slot)` import. Every in-flight bridge owns one or two
//! slots here, and `dispatch` routes the call to the matching notifier.
//!
//! Slots come from a monotonic counter and are never handed out while still
//! live (reserved or registered). Dispatching to a slot that has already been
//! unregistered is a benign no-op: the module may wake a waker after the host
//! has finished with the operation.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Token identifying one pending poll operation across the module boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slot(u32);

impl Slot {
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Slot as received through the `i32` notifier import.
    pub const fn from_abi(raw: i32) -> Self {
        Self(raw as u32)
    }

    pub const fn index(self) -> u32 {
        self.0
    }

    /// Slot as passed to `*_poll` exports (`i64` on the wire).
    pub const fn to_abi(self) -> i64 {
        self.0 as i64
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Zero-argument continuation invoked when the module fires a slot.
///
/// Notifiers may run on any thread and inside an export call, so they must
/// only record the wake-up (flag + waker), never call back into the module.
pub type Notifier = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct SlotTable {
    next: u32,
    // `None` = reserved, not yet bound.
    slots: HashMap<Slot, Option<Notifier>>,
}

#[derive(Default)]
pub struct NotifierRegistry {
    table: Mutex<SlotTable>,
}

impl NotifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next unused slot.
    pub fn reserve_slot(&self) -> Slot {
        let mut table = self.lock();
        loop {
            let slot = Slot(table.next);
            table.next = table.next.wrapping_add(1);
            // Only reachable after the counter wraps.
            if table.slots.contains_key(&slot) {
                continue;
            }
            table.slots.insert(slot, None);
            tracing::trace!(%slot, "reserved notifier slot");
            return slot;
        }
    }

    /// Binds `notifier` to a reserved, still unbound `slot`. Returns `false`
    /// and leaves the table untouched otherwise.
    pub fn register(&self, slot: Slot, notifier: Notifier) -> bool {
        let mut table = self.lock();
        match table.slots.get_mut(&slot) {
            Some(binding @ None) => {
                *binding = Some(notifier);
                tracing::trace!(%slot, "registered notifier");
                true
            }
            Some(Some(_)) => {
                tracing::warn!(%slot, "refusing to rebind live notifier slot");
                false
            }
            None => {
                tracing::warn!(%slot, "refusing to bind unreserved notifier slot");
                false
            }
        }
    }

    /// Reserves a slot and binds `notifier` to it in one step.
    pub fn register_notifier(&self, notifier: Notifier) -> Slot {
        let slot = self.reserve_slot();
        self.register(slot, notifier);
        slot
    }

    /// Runs the notifier bound to `slot`. Returns `false` when the slot is
    /// not (or no longer) bound.
    ///
    /// The notifier runs after the table lock is released, so it may itself
    /// reserve, register or unregister slots.
    pub fn dispatch(&self, slot: Slot) -> bool {
        let notifier = self.lock().slots.get(&slot).cloned().flatten();
        match notifier {
            Some(notifier) => {
                tracing::trace!(%slot, "dispatching notifier");
                notifier();
                true
            }
            None => {
                tracing::trace!(%slot, "ignoring notification for stale slot");
                false
            }
        }
    }

    /// Removes the binding. Unregistering an absent slot is a no-op.
    pub fn unregister(&self, slot: Slot) -> bool {
        let removed = self.lock().slots.remove(&slot).is_some();
        if removed {
            tracing::trace!(%slot, "unregistered notifier");
        }
        removed
    }

    pub fn is_registered(&self, slot: Slot) -> bool {
        matches!(self.lock().slots.get(&slot), Some(Some(_)))
    }

    /// Number of live slots, reserved or bound.
    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, SlotTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for NotifierRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.lock();
        f.debug_struct("NotifierRegistry")
            .field("next", &table.next)
            .field("live", &table.slots.len())
            .finish()
    }
}

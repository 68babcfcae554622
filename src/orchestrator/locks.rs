//! Logical exclusive locks for the microphone and speaker
//!
//! These are ownership records, not blocking mutexes: a turn either acquires
//! a free resource or fails, and cancellation releases a turn's locks in one
//! synchronous step. Recording and playback can therefore never hold a lock
//! from two different turns at once.

use std::sync::Mutex;

use super::TurnId;

/// The two exclusive device resources
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Microphone,
    Speaker,
}

#[derive(Default)]
struct Table {
    microphone: Option<TurnId>,
    speaker: Option<TurnId>,
}

impl Table {
    fn slot(&mut self, resource: Resource) -> &mut Option<TurnId> {
        match resource {
            Resource::Microphone => &mut self.microphone,
            Resource::Speaker => &mut self.speaker,
        }
    }
}

/// Lock table keyed by owning turn
pub struct ResourceLocks {
    table: Mutex<Table>,
}

impl ResourceLocks {
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: Mutex::new(Table::default()),
        }
    }

    /// Try to acquire a resource for a turn
    ///
    /// Returns true if the resource was free or already owned by this turn.
    pub fn try_acquire(&self, resource: Resource, owner: TurnId) -> bool {
        let Ok(mut table) = self.table.lock() else {
            return false;
        };
        let slot = table.slot(resource);
        match *slot {
            None => {
                *slot = Some(owner);
                tracing::trace!(%owner, ?resource, "lock acquired");
                true
            }
            Some(current) if current == owner => true,
            Some(current) => {
                tracing::debug!(%owner, held_by = %current, ?resource, "lock busy");
                false
            }
        }
    }

    /// Release a resource if this turn owns it
    ///
    /// A no-op for non-owners, so a superseded turn's late release can never
    /// free a lock its successor holds.
    pub fn release(&self, resource: Resource, owner: TurnId) {
        if let Ok(mut table) = self.table.lock() {
            let slot = table.slot(resource);
            if *slot == Some(owner) {
                *slot = None;
                tracing::trace!(%owner, ?resource, "lock released");
            }
        }
    }

    /// Release every resource this turn owns
    pub fn release_all(&self, owner: TurnId) {
        if let Ok(mut table) = self.table.lock() {
            if table.microphone == Some(owner) {
                table.microphone = None;
            }
            if table.speaker == Some(owner) {
                table.speaker = None;
            }
        }
    }

    /// Current holder of a resource
    #[must_use]
    pub fn holder(&self, resource: Resource) -> Option<TurnId> {
        self.table
            .lock()
            .map(|mut table| *table.slot(resource))
            .unwrap_or(None)
    }
}

impl Default for ResourceLocks {
    fn default() -> Self {
        Self::new()
    }
}

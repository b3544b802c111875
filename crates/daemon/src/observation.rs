use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use signoff_core::model::{ContributionKey, ObservationPhase, Visa};
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
struct Entry {
    id: Uuid,
    phase: ObservationPhase,
}

/// Observation phase per contribution.
///
/// All transitions happen under one map-level lock. A key is free for a new
/// observation when it is absent or its previous observation is terminal.
#[derive(Debug, Default)]
pub struct ObservationRegistry {
    entries: Mutex<HashMap<ContributionKey, Entry>>,
}

impl ObservationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ContributionKey, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new observation, returning its id, unless one is active.
    pub fn begin(&self, key: &ContributionKey) -> Option<Uuid> {
        let mut entries = self.lock();
        if entries
            .get(key)
            .is_some_and(|e| e.phase == ObservationPhase::Observing)
        {
            return None;
        }
        let id = Uuid::new_v4();
        entries.insert(
            key.clone(),
            Entry {
                id,
                phase: ObservationPhase::Observing,
            },
        );
        Some(id)
    }

    /// True iff no observation was active and one was registered.
    pub fn try_begin(&self, key: &ContributionKey) -> bool {
        self.begin(key).is_some()
    }

    pub fn status(&self, key: &ContributionKey) -> Option<ObservationPhase> {
        self.lock().get(key).map(|e| e.phase)
    }

    /// Whether observation `id` is still the active one for `key`.
    pub fn is_active(&self, key: &ContributionKey, id: Uuid) -> bool {
        self.lock()
            .get(key)
            .is_some_and(|e| e.id == id && e.phase == ObservationPhase::Observing)
    }

    /// Marks observation `id` finished. Returns false when it is no longer active.
    pub fn end(&self, key: &ContributionKey, id: Uuid, result: &Visa) -> bool {
        let mut entries = self.lock();
        match entries.get_mut(key) {
            Some(e) if e.id == id && e.phase == ObservationPhase::Observing => {
                e.phase = ObservationPhase::Finished;
                tracing::info!(
                    key = %key,
                    status = %result.status,
                    blockers = result.blockers,
                    "observation finished"
                );
                true
            }
            _ => false,
        }
    }

    /// Flags the active observation of `key` as cancelled.
    pub fn cancel(&self, key: &ContributionKey) -> bool {
        let mut entries = self.lock();
        match entries.get_mut(key) {
            Some(e) if e.phase == ObservationPhase::Observing => {
                e.phase = ObservationPhase::Cancelled;
                true
            }
            _ => false,
        }
    }

    /// Removes observation `id` as if it never started.
    pub fn rollback(&self, key: &ContributionKey, id: Uuid) {
        let mut entries = self.lock();
        if entries.get(key).is_some_and(|e| e.id == id) {
            entries.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ContributionKey {
        ContributionKey::new("apache", "pull/6224/head")
    }

    #[test]
    fn second_begin_is_refused_while_observing() {
        let reg = ObservationRegistry::new();
        assert_eq!(reg.status(&key()), None);
        assert!(reg.try_begin(&key()));
        assert_eq!(reg.status(&key()), Some(ObservationPhase::Observing));
        assert!(!reg.try_begin(&key()));
    }

    #[test]
    fn key_is_reusable_after_end() {
        let reg = ObservationRegistry::new();
        let first = reg.begin(&key()).unwrap();
        assert!(reg.end(&key(), first, &Visa::failed("x")));
        assert_eq!(reg.status(&key()), Some(ObservationPhase::Finished));

        let second = reg.begin(&key()).unwrap();
        assert_ne!(first, second);
        assert!(!reg.is_active(&key(), first));
        assert!(reg.is_active(&key(), second));
        assert!(!reg.end(&key(), first, &Visa::failed("stale")));
    }

    #[test]
    fn cancel_only_affects_active_observation() {
        let reg = ObservationRegistry::new();
        assert!(!reg.cancel(&key()));
        let id = reg.begin(&key()).unwrap();
        assert!(reg.cancel(&key()));
        assert_eq!(reg.status(&key()), Some(ObservationPhase::Cancelled));
        assert!(!reg.is_active(&key(), id));
        assert!(!reg.end(&key(), id, &Visa::failed("late")));
        assert!(!reg.cancel(&key()));
    }

    #[test]
    fn rollback_removes_entry() {
        let reg = ObservationRegistry::new();
        let id = reg.begin(&key()).unwrap();
        reg.rollback(&key(), id);
        assert_eq!(reg.status(&key()), None);
    }
}

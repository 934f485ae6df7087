use dispatch_catalog::Category;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::DispatchError;
use crate::incident::{Responder, ResponderStatus};

/// Owns the responder records and the busy/available bookkeeping.
///
/// Eligibility and the claim that follows it happen under one lock, so a
/// responder can never be handed out as "available" twice at once.
#[derive(Clone, Default)]
pub struct ResponderRoster {
    inner: Arc<Mutex<BTreeMap<String, Responder>>>,
}

impl ResponderRoster {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Responder>> {
        self.inner.lock().expect("responder roster mutex poisoned")
    }

    /// Add or replace a responder. Returns `true` if the id was new.
    pub fn register(&self, responder: Responder) -> bool {
        self.lock().insert(responder.id.clone(), responder).is_none()
    }

    pub fn get(&self, id: &str) -> Option<Responder> {
        self.lock().get(id).cloned()
    }

    pub fn all(&self) -> Vec<Responder> {
        self.lock().values().cloned().collect()
    }

    /// Responders matching the category that are currently available,
    /// ordered by id. Busy responders drop out of the pool.
    pub fn find_eligible(&self, category: Category) -> Vec<Responder> {
        self.lock()
            .values()
            .filter(|r| r.category == category && r.status == ResponderStatus::Available)
            .cloned()
            .collect()
    }

    /// Atomically check eligibility and take the assignment: the responder
    /// must match the category and be available, and leaves this call busy
    /// with its active count bumped.
    pub fn claim_eligible(
        &self,
        id: &str,
        category: Category,
    ) -> Result<Responder, DispatchError> {
        let mut roster = self.lock();
        let responder = roster
            .get_mut(id)
            .ok_or_else(|| DispatchError::UnknownResponder(id.to_string()))?;
        if responder.category != category || responder.status != ResponderStatus::Available {
            return Err(DispatchError::NoEligibleResponder(category));
        }
        responder.active_incidents += 1;
        responder.status = ResponderStatus::Busy;
        Ok(responder.clone())
    }

    /// Drop one assignment; the responder becomes available again when the
    /// count reaches zero.
    pub fn release(&self, id: &str) -> Result<Responder, DispatchError> {
        let mut roster = self.lock();
        let responder = roster
            .get_mut(id)
            .ok_or_else(|| DispatchError::UnknownResponder(id.to_string()))?;
        responder.active_incidents = responder.active_incidents.saturating_sub(1);
        if responder.active_incidents == 0 {
            responder.status = ResponderStatus::Available;
        }
        Ok(responder.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> ResponderRoster {
        let roster = ResponderRoster::new();
        roster.register(Responder::new("resp-1", "Avery", Category::Fire));
        roster.register(Responder::new("resp-2", "Blake", Category::Fire));
        roster.register(Responder::new("resp-3", "Casey", Category::Medical));
        roster
    }

    #[test]
    fn eligibility_filters_category_and_status() {
        let roster = roster();
        let eligible = roster.find_eligible(Category::Fire);
        assert_eq!(eligible.len(), 2);
        assert!(eligible.iter().all(|r| r.category == Category::Fire));
    }

    #[test]
    fn claim_makes_responder_busy_and_ineligible() {
        let roster = roster();
        let claimed = roster
            .claim_eligible("resp-1", Category::Fire)
            .expect("claim");
        assert_eq!(claimed.status, ResponderStatus::Busy);
        assert_eq!(claimed.active_incidents, 1);

        let eligible = roster.find_eligible(Category::Fire);
        assert!(eligible.iter().all(|r| r.id != "resp-1"));

        assert!(matches!(
            roster.claim_eligible("resp-1", Category::Fire),
            Err(DispatchError::NoEligibleResponder(Category::Fire))
        ));
    }

    #[test]
    fn category_mismatch_is_not_eligible() {
        let roster = roster();
        assert!(matches!(
            roster.claim_eligible("resp-3", Category::Fire),
            Err(DispatchError::NoEligibleResponder(Category::Fire))
        ));
    }

    #[test]
    fn busy_iff_active_incidents_positive() {
        let roster = roster();
        roster.claim_eligible("resp-1", Category::Fire).expect("claim");
        let released = roster.release("resp-1").expect("release");
        assert_eq!(released.active_incidents, 0);
        assert_eq!(released.status, ResponderStatus::Available);
    }

    #[test]
    fn unknown_responder_is_rejected() {
        let roster = roster();
        assert!(matches!(
            roster.claim_eligible("ghost", Category::Fire),
            Err(DispatchError::UnknownResponder(_))
        ));
    }
}

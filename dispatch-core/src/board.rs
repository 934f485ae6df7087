use chrono::Utc;
use dispatch_catalog::{Category, Priority};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::DispatchError;
use crate::incident::{Incident, IncidentFacts, IncidentReport, IncidentStatus};

/// Outcome of a state-machine transition. `Noop` means the incident was
/// already in the target state; callers must not repeat side effects.
#[derive(Debug)]
pub enum Transition {
    Applied(Incident),
    Noop(Incident),
}

#[derive(Default)]
struct BoardInner {
    incidents: BTreeMap<i64, Incident>,
    next_id: i64,
}

/// Owns the canonical incident records and enforces the legal status
/// transitions: pending → ongoing → solved, no skips, no way back.
/// Incidents are never deleted; ids are assigned monotonically.
#[derive(Clone)]
pub struct IncidentBoard {
    inner: Arc<Mutex<BoardInner>>,
}

impl Default for IncidentBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl IncidentBoard {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BoardInner {
                incidents: BTreeMap::new(),
                next_id: 1,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BoardInner> {
        self.inner.lock().expect("incident board mutex poisoned")
    }

    pub fn create(&self, report: &IncidentReport, category: Category, priority: Priority) -> Incident {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;

        let now = Utc::now();
        let incident = Incident {
            id,
            incident_type: report.incident_type.clone(),
            category,
            priority,
            status: IncidentStatus::Pending,
            location: report.location.clone(),
            description: report.description.clone(),
            reporter_id: report.reporter_id.clone(),
            responder_id: None,
            facts: report.facts.clone(),
            created_at: now,
            updated_at: now,
        };
        inner.incidents.insert(id, incident.clone());
        incident
    }

    pub fn get(&self, id: i64) -> Option<Incident> {
        self.lock().incidents.get(&id).cloned()
    }

    pub fn all(&self) -> Vec<Incident> {
        self.lock().incidents.values().cloned().collect()
    }

    /// pending → ongoing, stamping the responder. Idempotent when already
    /// ongoing; rejected when solved.
    pub fn assign(&self, id: i64, responder_id: &str) -> Result<Transition, DispatchError> {
        let mut inner = self.lock();
        let incident = inner
            .incidents
            .get_mut(&id)
            .ok_or(DispatchError::UnknownIncident(id))?;
        match incident.status {
            IncidentStatus::Pending => {
                incident.status = IncidentStatus::Ongoing;
                incident.responder_id = Some(responder_id.to_string());
                incident.updated_at = Utc::now();
                Ok(Transition::Applied(incident.clone()))
            }
            IncidentStatus::Ongoing => Ok(Transition::Noop(incident.clone())),
            IncidentStatus::Solved => Err(DispatchError::InvalidTransition {
                incident: id,
                from: IncidentStatus::Solved,
                attempted: "assign",
            }),
        }
    }

    /// ongoing → solved. Idempotent when already solved; a pending incident
    /// cannot skip straight to solved.
    pub fn resolve(&self, id: i64) -> Result<Transition, DispatchError> {
        let mut inner = self.lock();
        let incident = inner
            .incidents
            .get_mut(&id)
            .ok_or(DispatchError::UnknownIncident(id))?;
        match incident.status {
            IncidentStatus::Ongoing => {
                incident.status = IncidentStatus::Solved;
                incident.updated_at = Utc::now();
                Ok(Transition::Applied(incident.clone()))
            }
            IncidentStatus::Solved => Ok(Transition::Noop(incident.clone())),
            IncidentStatus::Pending => Err(DispatchError::InvalidTransition {
                incident: id,
                from: IncidentStatus::Pending,
                attempted: "resolve",
            }),
        }
    }

    /// Fold later-reported facts into the record.
    pub fn amend_facts(&self, id: i64, facts: IncidentFacts) -> Result<Incident, DispatchError> {
        let mut inner = self.lock();
        let incident = inner
            .incidents
            .get_mut(&id)
            .ok_or(DispatchError::UnknownIncident(id))?;
        incident.facts.merge(facts);
        incident.updated_at = Utc::now();
        Ok(incident.clone())
    }

    /// Raise the priority to `candidate` if it is more urgent; a less
    /// urgent candidate never lowers it.
    pub fn raise_priority(&self, id: i64, candidate: Priority) -> Result<Incident, DispatchError> {
        let mut inner = self.lock();
        let incident = inner
            .incidents
            .get_mut(&id)
            .ok_or(DispatchError::UnknownIncident(id))?;
        let raised = incident.priority.raise_to(candidate);
        if raised != incident.priority {
            incident.priority = raised;
            incident.updated_at = Utc::now();
        }
        Ok(incident.clone())
    }

    pub fn counts_by_status(&self) -> BTreeMap<String, usize> {
        let inner = self.lock();
        let mut out = BTreeMap::new();
        for incident in inner.incidents.values() {
            *out.entry(incident.status.as_str().to_string()).or_insert(0) += 1;
        }
        out
    }

    pub fn counts_by_category(&self) -> BTreeMap<String, usize> {
        let inner = self.lock();
        let mut out = BTreeMap::new();
        for incident in inner.incidents.values() {
            *out.entry(incident.category.to_string()).or_insert(0) += 1;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(incident_type: &str) -> IncidentReport {
        IncidentReport {
            incident_type: incident_type.into(),
            location: "Main St".into(),
            description: "something happened".into(),
            reporter_id: "rep-1".into(),
            facts: IncidentFacts::default(),
        }
    }

    fn board_with_one() -> (IncidentBoard, i64) {
        let board = IncidentBoard::new();
        let incident = board.create(&report("structure_fire"), Category::Fire, Priority::Critical);
        (board, incident.id)
    }

    #[test]
    fn ids_are_monotonic() {
        let board = IncidentBoard::new();
        let a = board.create(&report("a"), Category::General, Priority::Medium);
        let b = board.create(&report("b"), Category::General, Priority::Medium);
        assert!(b.id > a.id);
    }

    #[test]
    fn assign_moves_pending_to_ongoing() {
        let (board, id) = board_with_one();
        let Transition::Applied(incident) = board.assign(id, "resp-1").expect("assign") else {
            panic!("expected applied transition");
        };
        assert_eq!(incident.status, IncidentStatus::Ongoing);
        assert_eq!(incident.responder_id.as_deref(), Some("resp-1"));
        assert!(incident.updated_at >= incident.created_at);
    }

    #[test]
    fn assign_is_idempotent_on_ongoing() {
        let (board, id) = board_with_one();
        board.assign(id, "resp-1").expect("first assign");
        let Transition::Noop(incident) = board.assign(id, "resp-2").expect("second assign") else {
            panic!("expected noop");
        };
        assert_eq!(incident.responder_id.as_deref(), Some("resp-1"));
    }

    #[test]
    fn pending_cannot_resolve() {
        let (board, id) = board_with_one();
        let err = board.resolve(id).expect_err("must reject");
        assert!(matches!(
            err,
            DispatchError::InvalidTransition {
                from: IncidentStatus::Pending,
                attempted: "resolve",
                ..
            }
        ));
        assert_eq!(board.get(id).expect("incident").status, IncidentStatus::Pending);
    }

    #[test]
    fn solved_is_terminal() {
        let (board, id) = board_with_one();
        board.assign(id, "resp-1").expect("assign");
        board.resolve(id).expect("resolve");

        assert!(matches!(
            board.assign(id, "resp-2"),
            Err(DispatchError::InvalidTransition { .. })
        ));
        assert!(matches!(
            board.resolve(id).expect("idempotent resolve"),
            Transition::Noop(_)
        ));
    }

    #[test]
    fn priority_only_rises() {
        let board = IncidentBoard::new();
        let incident = board.create(&report("gas_leak"), Category::Fire, Priority::High);
        let same = board
            .raise_priority(incident.id, Priority::Low)
            .expect("raise");
        assert_eq!(same.priority, Priority::High);

        let raised = board
            .raise_priority(incident.id, Priority::Critical)
            .expect("raise");
        assert_eq!(raised.priority, Priority::Critical);
    }
}

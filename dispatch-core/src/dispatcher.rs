use chrono::Utc;
use dispatch_catalog::{Category, Priority, ReferenceCatalog};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use crate::board::{IncidentBoard, Transition};
use crate::dispatch_log::{ActionKind, DispatchAction, DispatchLog};
use crate::error::DispatchError;
use crate::incident::{
    Incident, IncidentFacts, IncidentReport, IncidentStatus, Responder, validate_report,
};
use crate::priority;
use crate::resources::ResourceLedger;
use crate::roster::ResponderRoster;
use crate::store::StateStore;

#[derive(Clone, Debug, Serialize)]
pub struct ResourceSnapshot {
    pub available: BTreeMap<String, u32>,
    pub deployed: BTreeMap<i64, BTreeMap<String, u32>>,
}

/// The triage and dispatch core: classifies incoming incidents, drives the
/// incident state machine, allocates scarce resources, matches responders,
/// and stamps the dispatch trail around every decision.
///
/// Each aggregate guards its own state; compound operations compensate
/// (claim, then transition, releasing the claim if the transition lost a
/// race) rather than holding two locks at once.
#[derive(Clone)]
pub struct Dispatcher {
    catalog: Arc<ReferenceCatalog>,
    board: IncidentBoard,
    roster: ResponderRoster,
    ledger: ResourceLedger,
    store: Arc<dyn StateStore>,
    log: DispatchLog,
}

impl Dispatcher {
    pub fn new(catalog: ReferenceCatalog, store: Arc<dyn StateStore>, log: DispatchLog) -> Self {
        let ledger = ResourceLedger::new(catalog.inventory());
        Self {
            catalog: Arc::new(catalog),
            board: IncidentBoard::new(),
            roster: ResponderRoster::new(),
            ledger,
            store,
            log,
        }
    }

    pub fn catalog(&self) -> &ReferenceCatalog {
        &self.catalog
    }

    /// File a new incident: validate, derive category and priority, create
    /// it pending. Unknown types degrade to the `general` category and the
    /// default priority rather than being rejected.
    pub fn report_incident(&self, report: IncidentReport) -> Result<i64, DispatchError> {
        validate_report(&report).map_err(DispatchError::Validation)?;

        let category = self
            .catalog
            .category_of(&report.incident_type)
            .unwrap_or(Category::General);
        let priority = priority::classify(&self.catalog, &report.incident_type, category, &report.facts);

        let incident = self.board.create(&report, category, priority);
        self.store.create_incident(&incident)?;
        self.append_action(
            &incident,
            ActionKind::IncidentReported,
            format!(
                "incident reported: {} at {}",
                incident.incident_type, incident.location
            ),
            Some(serde_json::json!({
                "priority": incident.priority.code(),
                "category": incident.category.as_str(),
            })),
        );
        Ok(incident.id)
    }

    /// Fold later-reported facts into an incident and re-classify. The
    /// priority can only rise.
    pub fn amend_facts(
        &self,
        incident_id: i64,
        facts: IncidentFacts,
    ) -> Result<Priority, DispatchError> {
        let merged = self.board.amend_facts(incident_id, facts)?;
        let before = merged.priority;
        let candidate = priority::classify(
            &self.catalog,
            &merged.incident_type,
            merged.category,
            &merged.facts,
        );
        let updated = self.board.raise_priority(incident_id, candidate)?;
        self.store.update_incident(&updated)?;
        if updated.priority != before {
            self.append_action(
                &updated,
                ActionKind::PriorityRaised,
                format!("priority raised to {}", updated.priority),
                Some(serde_json::json!({
                    "from": before.code(),
                    "to": updated.priority.code(),
                })),
            );
        }
        Ok(updated.priority)
    }

    /// Assign a responder, moving the incident from pending to ongoing and
    /// auto-deploying the category's resource table. The eligibility check
    /// and the claim are atomic; assigning an already-ongoing incident is a
    /// no-op success.
    pub fn assign_responder(
        &self,
        incident_id: i64,
        responder_id: &str,
    ) -> Result<(), DispatchError> {
        let incident = self
            .board
            .get(incident_id)
            .ok_or(DispatchError::UnknownIncident(incident_id))?;
        match incident.status {
            IncidentStatus::Ongoing => return Ok(()),
            IncidentStatus::Solved => {
                return Err(DispatchError::InvalidTransition {
                    incident: incident_id,
                    from: IncidentStatus::Solved,
                    attempted: "assign",
                });
            }
            IncidentStatus::Pending => {}
        }

        let claimed = self.roster.claim_eligible(responder_id, incident.category)?;
        match self.board.assign(incident_id, responder_id) {
            Ok(Transition::Applied(updated)) => {
                self.store.update_incident(&updated)?;
                self.store.upsert_responder(&claimed)?;
                self.append_action(
                    &updated,
                    ActionKind::ResponderAssigned,
                    format!("responder {responder_id} assigned"),
                    Some(serde_json::json!({ "responder_id": responder_id })),
                );
                self.auto_deploy(&updated);
                Ok(())
            }
            Ok(Transition::Noop(_)) => {
                // Lost the race to another assignment; undo the claim.
                let _ = self.roster.release(responder_id);
                Ok(())
            }
            Err(err) => {
                let _ = self.roster.release(responder_id);
                Err(err)
            }
        }
    }

    /// Assign the first eligible responder for the incident's category.
    pub fn auto_assign(&self, incident_id: i64) -> Result<String, DispatchError> {
        let incident = self
            .board
            .get(incident_id)
            .ok_or(DispatchError::UnknownIncident(incident_id))?;
        match incident.status {
            IncidentStatus::Ongoing => {
                return Ok(incident.responder_id.unwrap_or_default());
            }
            IncidentStatus::Solved => {
                return Err(DispatchError::InvalidTransition {
                    incident: incident_id,
                    from: IncidentStatus::Solved,
                    attempted: "assign",
                });
            }
            IncidentStatus::Pending => {}
        }

        let candidates = self.roster.find_eligible(incident.category);
        for candidate in candidates {
            if self.assign_responder(incident_id, &candidate.id).is_ok() {
                return Ok(candidate.id);
            }
        }
        Err(DispatchError::NoEligibleResponder(incident.category))
    }

    /// Resolve an ongoing incident: return every outstanding deployment,
    /// release the responder, mark it solved. Resolving twice is a no-op
    /// success; counters move only once.
    pub fn resolve_incident(&self, incident_id: i64) -> Result<(), DispatchError> {
        match self.board.resolve(incident_id)? {
            Transition::Applied(updated) => {
                for (resource_type, quantity) in self.ledger.return_all(incident_id) {
                    if let Err(err) = self.store.record_return(incident_id, &resource_type, quantity)
                    {
                        warn!(incident = incident_id, resource = %resource_type, %err,
                              "failed to persist resource return");
                    }
                    self.append_action(
                        &updated,
                        ActionKind::ResourceReturned,
                        format!("returned {quantity} {resource_type}"),
                        Some(serde_json::json!({
                            "resource_type": resource_type,
                            "quantity": quantity,
                        })),
                    );
                }

                if let Some(responder_id) = updated.responder_id.as_deref() {
                    match self.roster.release(responder_id) {
                        Ok(released) => {
                            if let Err(err) = self.store.upsert_responder(&released) {
                                warn!(responder = responder_id, %err,
                                      "failed to persist responder release");
                            }
                        }
                        Err(err) => {
                            warn!(responder = responder_id, %err, "release failed on resolve");
                        }
                    }
                }

                self.store.update_incident(&updated)?;
                self.append_action(
                    &updated,
                    ActionKind::IncidentResolved,
                    "incident resolved".into(),
                    None,
                );
                Ok(())
            }
            Transition::Noop(_) => Ok(()),
        }
    }

    pub fn register_responder(&self, responder: Responder) -> Result<(), DispatchError> {
        if responder.id.trim().is_empty() {
            return Err(DispatchError::Validation("responder id is required".into()));
        }
        self.roster.register(responder.clone());
        self.store.upsert_responder(&responder)?;
        Ok(())
    }

    pub fn find_eligible(&self, category: Category) -> Vec<Responder> {
        self.roster.find_eligible(category)
    }

    pub fn responders(&self) -> Vec<Responder> {
        self.roster.all()
    }

    pub fn incident(&self, id: i64) -> Option<Incident> {
        self.board.get(id)
    }

    pub fn incidents(&self) -> Vec<Incident> {
        self.board.all()
    }

    pub fn resource_status(&self) -> ResourceSnapshot {
        ResourceSnapshot {
            available: self.ledger.available(),
            deployed: self.ledger.deployed(),
        }
    }

    pub fn stats_by_status(&self) -> BTreeMap<String, usize> {
        self.board.counts_by_status()
    }

    pub fn stats_by_category(&self) -> BTreeMap<String, usize> {
        self.board.counts_by_category()
    }

    pub fn actions_for(&self, incident_id: i64) -> Result<Vec<DispatchAction>, DispatchError> {
        self.log.actions_for(incident_id)
    }

    pub fn recent_actions(&self, limit: usize) -> Result<Vec<DispatchAction>, DispatchError> {
        self.log.recent(limit)
    }

    /// Attempt the category's auto-deploy table. Shortfall is advisory: it
    /// is logged and recorded, never blocks the dispatch.
    fn auto_deploy(&self, incident: &Incident) {
        for (resource_type, quantity) in self.catalog.auto_deploy(incident.category) {
            match self.ledger.deploy(&resource_type, incident.id, quantity) {
                Ok(()) => {
                    if let Err(err) =
                        self.store
                            .record_deployment(incident.id, &resource_type, quantity)
                    {
                        warn!(incident = incident.id, resource = %resource_type, %err,
                              "failed to persist deployment");
                    }
                    self.append_action(
                        incident,
                        ActionKind::ResourceDeployed,
                        format!("deployed {quantity} {resource_type}"),
                        Some(serde_json::json!({
                            "resource_type": resource_type,
                            "quantity": quantity,
                        })),
                    );
                }
                Err(err) => {
                    warn!(incident = incident.id, resource = %resource_type, %err,
                          "auto-deploy shortfall");
                    self.append_action(
                        incident,
                        ActionKind::ResourceShortfall,
                        format!("could not deploy {quantity} {resource_type}"),
                        Some(serde_json::json!({
                            "resource_type": resource_type,
                            "quantity": quantity,
                            "reason": err.to_string(),
                        })),
                    );
                }
            }
        }
    }

    fn append_action(
        &self,
        incident: &Incident,
        kind: ActionKind,
        description: String,
        details: Option<serde_json::Value>,
    ) {
        let _ = self.log.append(&DispatchAction {
            id: None,
            incident_id: incident.id,
            category: incident.category.to_string(),
            kind,
            description,
            details,
            timestamp: Utc::now().to_rfc3339(),
        });
    }
}

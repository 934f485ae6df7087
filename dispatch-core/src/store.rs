use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::error::DispatchError;
use crate::incident::{Incident, Responder};

/// Logical persistence operations the dispatcher issues. The core never
/// touches storage directly; implementations pick the technology and tests
/// substitute [`MemoryStore`].
pub trait StateStore: Send + Sync {
    fn create_incident(&self, incident: &Incident) -> Result<(), DispatchError>;
    fn update_incident(&self, incident: &Incident) -> Result<(), DispatchError>;
    fn upsert_responder(&self, responder: &Responder) -> Result<(), DispatchError>;
    fn record_deployment(
        &self,
        incident_id: i64,
        resource_type: &str,
        quantity: u32,
    ) -> Result<(), DispatchError>;
    fn record_return(
        &self,
        incident_id: i64,
        resource_type: &str,
        quantity: u32,
    ) -> Result<(), DispatchError>;
}

#[derive(Default)]
struct MemoryInner {
    incidents: BTreeMap<i64, Incident>,
    responders: BTreeMap<String, Responder>,
    deployments: Vec<(i64, String, u32)>,
    returns: Vec<(i64, String, u32)>,
}

/// In-memory store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().expect("memory store mutex poisoned")
    }

    pub fn incident(&self, id: i64) -> Option<Incident> {
        self.lock().incidents.get(&id).cloned()
    }

    pub fn responder(&self, id: &str) -> Option<Responder> {
        self.lock().responders.get(id).cloned()
    }

    pub fn deployment_records(&self) -> Vec<(i64, String, u32)> {
        self.lock().deployments.clone()
    }

    pub fn return_records(&self) -> Vec<(i64, String, u32)> {
        self.lock().returns.clone()
    }
}

impl StateStore for MemoryStore {
    fn create_incident(&self, incident: &Incident) -> Result<(), DispatchError> {
        let mut inner = self.lock();
        if inner.incidents.contains_key(&incident.id) {
            return Err(DispatchError::Storage(format!(
                "incident {} already exists",
                incident.id
            )));
        }
        inner.incidents.insert(incident.id, incident.clone());
        Ok(())
    }

    fn update_incident(&self, incident: &Incident) -> Result<(), DispatchError> {
        self.lock().incidents.insert(incident.id, incident.clone());
        Ok(())
    }

    fn upsert_responder(&self, responder: &Responder) -> Result<(), DispatchError> {
        self.lock()
            .responders
            .insert(responder.id.clone(), responder.clone());
        Ok(())
    }

    fn record_deployment(
        &self,
        incident_id: i64,
        resource_type: &str,
        quantity: u32,
    ) -> Result<(), DispatchError> {
        self.lock()
            .deployments
            .push((incident_id, resource_type.to_string(), quantity));
        Ok(())
    }

    fn record_return(
        &self,
        incident_id: i64,
        resource_type: &str,
        quantity: u32,
    ) -> Result<(), DispatchError> {
        self.lock()
            .returns
            .push((incident_id, resource_type.to_string(), quantity));
        Ok(())
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::DispatchError;

/// An allocation of scarce units to one incident. `returned_at == None`
/// means the deployment is still outstanding.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Deployment {
    pub incident_id: i64,
    pub resource_type: String,
    pub quantity: u32,
    pub deployed_at: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
}

impl Deployment {
    fn outstanding(&self) -> bool {
        self.returned_at.is_none()
    }
}

#[derive(Debug)]
struct ResourcePool {
    total: u32,
    available: u32,
}

#[derive(Debug, Default)]
struct LedgerInner {
    pools: BTreeMap<String, ResourcePool>,
    deployments: Vec<Deployment>,
}

/// Tracks the fixed inventory of scarce units (ambulances, fire trucks,
/// police cars, tow trucks) and their allocation to incidents.
///
/// Cloneable handle around one mutex: a deploy can never read a stale
/// availability count, and `available + outstanding == total` holds for
/// every resource type at all times.
#[derive(Clone)]
pub struct ResourceLedger {
    inner: Arc<Mutex<LedgerInner>>,
}

impl ResourceLedger {
    pub fn new(inventory: &BTreeMap<String, u32>) -> Self {
        let pools = inventory
            .iter()
            .map(|(name, count)| {
                (
                    name.clone(),
                    ResourcePool {
                        total: *count,
                        available: *count,
                    },
                )
            })
            .collect();
        Self {
            inner: Arc::new(Mutex::new(LedgerInner {
                pools,
                deployments: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LedgerInner> {
        self.inner.lock().expect("resource ledger mutex poisoned")
    }

    /// Allocate `quantity` units to an incident. Fails without mutating
    /// anything when fewer than `quantity` units are available.
    pub fn deploy(
        &self,
        resource_type: &str,
        incident_id: i64,
        quantity: u32,
    ) -> Result<(), DispatchError> {
        if quantity == 0 {
            return Err(DispatchError::Validation("quantity must be positive".into()));
        }
        let mut inner = self.lock();
        let pool = inner
            .pools
            .get_mut(resource_type)
            .ok_or_else(|| DispatchError::UnknownResource(resource_type.to_string()))?;
        if pool.available < quantity {
            return Err(DispatchError::ResourceUnavailable {
                resource: resource_type.to_string(),
                requested: quantity,
                available: pool.available,
            });
        }
        pool.available -= quantity;
        inner.deployments.push(Deployment {
            incident_id,
            resource_type: resource_type.to_string(),
            quantity,
            deployed_at: Utc::now(),
            returned_at: None,
        });
        Ok(())
    }

    /// Return `quantity` units deployed to an incident. Partial returns
    /// consume outstanding records oldest-first and leave the balance
    /// outstanding.
    pub fn return_units(
        &self,
        incident_id: i64,
        resource_type: &str,
        quantity: u32,
    ) -> Result<(), DispatchError> {
        if quantity == 0 {
            return Err(DispatchError::Validation("quantity must be positive".into()));
        }
        let mut inner = self.lock();
        if !inner.pools.contains_key(resource_type) {
            return Err(DispatchError::UnknownResource(resource_type.to_string()));
        }

        let outstanding: u32 = inner
            .deployments
            .iter()
            .filter(|d| {
                d.outstanding() && d.incident_id == incident_id && d.resource_type == resource_type
            })
            .map(|d| d.quantity)
            .sum();
        if outstanding < quantity {
            return Err(DispatchError::Validation(format!(
                "incident {incident_id} has only {outstanding} '{resource_type}' outstanding, \
                 cannot return {quantity}"
            )));
        }

        let now = Utc::now();
        let mut remaining = quantity;
        let mut returned_splits = Vec::new();
        for deployment in inner.deployments.iter_mut().filter(|d| {
            d.outstanding() && d.incident_id == incident_id && d.resource_type == resource_type
        }) {
            if remaining == 0 {
                break;
            }
            if deployment.quantity <= remaining {
                remaining -= deployment.quantity;
                deployment.returned_at = Some(now);
            } else {
                // Split the record: the returned part keeps its own row so
                // the trail still sums to the original deployment.
                deployment.quantity -= remaining;
                returned_splits.push(Deployment {
                    incident_id,
                    resource_type: resource_type.to_string(),
                    quantity: remaining,
                    deployed_at: deployment.deployed_at,
                    returned_at: Some(now),
                });
                remaining = 0;
            }
        }
        inner.deployments.extend(returned_splits);

        if let Some(pool) = inner.pools.get_mut(resource_type) {
            pool.available += quantity;
        }
        Ok(())
    }

    /// Return every outstanding deployment for an incident. Yields the
    /// `(resource_type, quantity)` pairs that were returned.
    pub fn return_all(&self, incident_id: i64) -> Vec<(String, u32)> {
        let mut inner = self.lock();
        let now = Utc::now();
        let mut returned: BTreeMap<String, u32> = BTreeMap::new();

        for deployment in inner
            .deployments
            .iter_mut()
            .filter(|d| d.outstanding() && d.incident_id == incident_id)
        {
            *returned.entry(deployment.resource_type.clone()).or_insert(0) +=
                deployment.quantity;
            deployment.returned_at = Some(now);
        }
        for (resource_type, quantity) in &returned {
            if let Some(pool) = inner.pools.get_mut(resource_type) {
                pool.available += quantity;
            }
        }
        returned.into_iter().collect()
    }

    pub fn available(&self) -> BTreeMap<String, u32> {
        self.lock()
            .pools
            .iter()
            .map(|(name, pool)| (name.clone(), pool.available))
            .collect()
    }

    pub fn capacity(&self) -> BTreeMap<String, u32> {
        self.lock()
            .pools
            .iter()
            .map(|(name, pool)| (name.clone(), pool.total))
            .collect()
    }

    /// Outstanding quantities grouped by incident, then resource type.
    pub fn deployed(&self) -> BTreeMap<i64, BTreeMap<String, u32>> {
        let inner = self.lock();
        let mut out: BTreeMap<i64, BTreeMap<String, u32>> = BTreeMap::new();
        for deployment in inner.deployments.iter().filter(|d| d.outstanding()) {
            *out.entry(deployment.incident_id)
                .or_default()
                .entry(deployment.resource_type.clone())
                .or_insert(0) += deployment.quantity;
        }
        out
    }

    pub fn outstanding_for(&self, incident_id: i64) -> BTreeMap<String, u32> {
        self.deployed().remove(&incident_id).unwrap_or_default()
    }
}

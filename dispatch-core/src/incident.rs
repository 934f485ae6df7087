use chrono::{DateTime, Utc};
use dispatch_catalog::{Category, Priority};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Pending,
    Ongoing,
    Solved,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Pending => "pending",
            IncidentStatus::Ongoing => "ongoing",
            IncidentStatus::Solved => "solved",
        }
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Facts reported alongside an incident. `answers` carries free-text
/// question responses the core treats as opaque.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentFacts {
    #[serde(default)]
    pub anyone_injured: bool,
    #[serde(default)]
    pub answers: BTreeMap<String, String>,
}

impl IncidentFacts {
    /// Fold later-reported facts into this set. The injury flag is sticky.
    pub fn merge(&mut self, other: IncidentFacts) {
        self.anyone_injured |= other.anyone_injured;
        self.answers.extend(other.answers);
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Incident {
    pub id: i64,
    pub incident_type: String,
    pub category: Category,
    pub priority: Priority,
    pub status: IncidentStatus,
    pub location: String,
    pub description: String,
    pub reporter_id: String,
    pub responder_id: Option<String>,
    pub facts: IncidentFacts,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A new incident as submitted by a reporter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IncidentReport {
    pub incident_type: String,
    pub location: String,
    pub description: String,
    pub reporter_id: String,
    #[serde(default)]
    pub facts: IncidentFacts,
}

pub fn validate_report(report: &IncidentReport) -> Result<(), String> {
    if report.incident_type.trim().is_empty() {
        return Err("incident_type is required".into());
    }
    if report.location.trim().is_empty() {
        return Err("location is required".into());
    }
    if report.description.trim().is_empty() {
        return Err("description is required".into());
    }
    if report.reporter_id.trim().is_empty() {
        return Err("reporter_id is required".into());
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponderStatus {
    Available,
    Busy,
}

impl ResponderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponderStatus::Available => "available",
            ResponderStatus::Busy => "busy",
        }
    }
}

impl fmt::Display for ResponderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Responder {
    pub id: String,
    pub name: String,
    pub category: Category,
    pub status: ResponderStatus,
    pub active_incidents: u32,
}

impl Responder {
    pub fn new(id: impl Into<String>, name: impl Into<String>, category: Category) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category,
            status: ResponderStatus::Available,
            active_incidents: 0,
        }
    }
}

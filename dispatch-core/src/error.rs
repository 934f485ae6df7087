use crate::incident::IncidentStatus;
use dispatch_catalog::Category;

pub type Result<T> = std::result::Result<T, DispatchError>;

/// Errors surfaced by the dispatch core.
///
/// Validation and transition errors never mutate state. Resource shortfall
/// is advisory: auto-deployment logs it and carries on, only direct ledger
/// callers see it. Nothing here is fatal to the process.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid transition: incident {incident} is {from}, cannot {attempted}")]
    InvalidTransition {
        incident: i64,
        from: IncidentStatus,
        attempted: &'static str,
    },

    #[error("no eligible responder for category '{0}'")]
    NoEligibleResponder(Category),

    #[error("resource '{resource}' unavailable: requested {requested}, available {available}")]
    ResourceUnavailable {
        resource: String,
        requested: u32,
        available: u32,
    },

    #[error("unknown resource type '{0}'")]
    UnknownResource(String),

    #[error("unknown incident {0}")]
    UnknownIncident(i64),

    #[error("unknown responder '{0}'")]
    UnknownResponder(String),

    #[error("storage error: {0}")]
    Storage(String),
}

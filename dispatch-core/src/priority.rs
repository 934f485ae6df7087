use crate::incident::IncidentFacts;
use dispatch_catalog::{Category, Priority, ReferenceCatalog};

/// Derive an incident's operational priority from its type, category, and
/// reported facts. Table lookup with per-category and global fallbacks; the
/// injury fact escalates exactly one step toward Critical. Never rejects.
pub fn classify(
    catalog: &ReferenceCatalog,
    incident_type: &str,
    category: Category,
    facts: &IncidentFacts,
) -> Priority {
    let base = catalog.base_priority(category, incident_type);
    if facts.anyone_injured {
        base.escalate()
    } else {
        base
    }
}

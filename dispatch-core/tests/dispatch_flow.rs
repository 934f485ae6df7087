use std::collections::BTreeMap;
use std::sync::Arc;

use dispatch_catalog::{Category, Priority, ReferenceCatalog};
use dispatch_core::dispatch_log::DispatchLog;
use dispatch_core::dispatcher::Dispatcher;
use dispatch_core::error::DispatchError;
use dispatch_core::incident::{IncidentFacts, IncidentReport, IncidentStatus, Responder, ResponderStatus};
use dispatch_core::store::MemoryStore;

fn db_path(name: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("time")
        .as_nanos();
    format!("/tmp/dispatch-core-tests/flow-{name}-{nanos}.db")
}

fn dispatcher(name: &str) -> Dispatcher {
    let log = DispatchLog::open(&db_path(name)).expect("open log");
    Dispatcher::new(ReferenceCatalog::builtin(), Arc::new(MemoryStore::new()), log)
}

fn report(incident_type: &str) -> IncidentReport {
    IncidentReport {
        incident_type: incident_type.into(),
        location: "river road".into(),
        description: "caller on scene".into(),
        reporter_id: "rep-1".into(),
        facts: IncidentFacts::default(),
    }
}

fn assert_conservation(dispatcher: &Dispatcher) {
    let catalog = ReferenceCatalog::builtin();
    let snapshot = dispatcher.resource_status();
    let mut outstanding: BTreeMap<String, u32> = BTreeMap::new();
    for per_incident in snapshot.deployed.values() {
        for (resource, quantity) in per_incident {
            *outstanding.entry(resource.clone()).or_insert(0) += quantity;
        }
    }
    for (resource, total) in catalog.inventory() {
        let out = outstanding.get(resource).copied().unwrap_or(0);
        assert_eq!(
            snapshot.available[resource] + out,
            *total,
            "conservation violated for {resource}"
        );
    }
}

// Scenario: full life of a fire incident with two outstanding deployments.
#[test]
fn full_lifecycle_returns_everything() {
    let d = dispatcher("lifecycle");
    d.register_responder(Responder::new("resp-f", "Avery", Category::Fire))
        .expect("register");

    let id = d.report_incident(report("structure_fire")).expect("report");
    assert_conservation(&d);

    d.assign_responder(id, "resp-f").expect("assign");
    let snapshot = d.resource_status();
    assert_eq!(snapshot.deployed[&id]["fire_trucks"], 1);
    assert_eq!(snapshot.deployed[&id]["ambulances"], 1);
    assert_conservation(&d);

    d.resolve_incident(id).expect("resolve");
    let snapshot = d.resource_status();
    assert_eq!(snapshot.available["fire_trucks"], 3);
    assert_eq!(snapshot.available["ambulances"], 5);
    assert!(snapshot.deployed.is_empty());
    assert_conservation(&d);

    let incident = d.incident(id).expect("incident");
    assert_eq!(incident.status, IncidentStatus::Solved);
    // solved incidents keep their responder stamp
    assert_eq!(incident.responder_id.as_deref(), Some("resp-f"));
}

// Invariant: responder is busy exactly while it has active incidents, and
// incident has a responder exactly while it is not pending.
#[test]
fn responder_and_incident_invariants_hold_throughout() {
    let d = dispatcher("invariants");
    d.register_responder(Responder::new("resp-p", "Blake", Category::Police))
        .expect("register");

    let id = d.report_incident(report("robbery")).expect("report");
    let pending = d.incident(id).expect("incident");
    assert_eq!(pending.status, IncidentStatus::Pending);
    assert!(pending.responder_id.is_none());

    d.assign_responder(id, "resp-p").expect("assign");
    let ongoing = d.incident(id).expect("incident");
    assert!(ongoing.responder_id.is_some());

    let busy = d
        .responders()
        .into_iter()
        .find(|r| r.id == "resp-p")
        .expect("responder");
    assert_eq!(busy.status, ResponderStatus::Busy);
    assert!(busy.active_incidents > 0);

    d.resolve_incident(id).expect("resolve");
    let freed = d
        .responders()
        .into_iter()
        .find(|r| r.id == "resp-p")
        .expect("responder");
    assert_eq!(freed.status, ResponderStatus::Available);
    assert_eq!(freed.active_incidents, 0);
}

// Scenario A: cardiac_arrest is Critical; the injury fact cannot escalate
// past the ceiling.
#[test]
fn cardiac_arrest_priority_ceiling() {
    let d = dispatcher("scenario-a");
    let plain = d.report_incident(report("cardiac_arrest")).expect("report");
    assert_eq!(
        d.incident(plain).expect("incident").priority,
        Priority::Critical
    );

    let mut with_injury = report("cardiac_arrest");
    with_injury.facts.anyone_injured = true;
    let id = d.report_incident(with_injury).expect("report");
    assert_eq!(d.incident(id).expect("incident").priority, Priority::Critical);
}

// Scenario C: assignment makes the responder busy and removes it from the
// eligible pool.
#[test]
fn assignment_excludes_responder_from_pool() {
    let d = dispatcher("scenario-c");
    d.register_responder(Responder::new("resp-f", "Avery", Category::Fire))
        .expect("register");
    let id = d.report_incident(report("vehicle_fire")).expect("report");

    assert_eq!(d.find_eligible(Category::Fire).len(), 1);
    d.assign_responder(id, "resp-f").expect("assign");

    assert_eq!(d.incident(id).expect("incident").status, IncidentStatus::Ongoing);
    assert!(d.find_eligible(Category::Fire).is_empty());
}

// Scenario E: resolving a pending incident is rejected and nothing moves.
#[test]
fn resolving_pending_is_invalid() {
    let d = dispatcher("scenario-e");
    let id = d.report_incident(report("assault")).expect("report");

    let err = d.resolve_incident(id).expect_err("must reject");
    assert!(matches!(err, DispatchError::InvalidTransition { .. }));
    assert_eq!(d.incident(id).expect("incident").status, IncidentStatus::Pending);
    assert_conservation(&d);
}

// No eligible responder leaves the incident pending.
#[test]
fn empty_pool_rejects_assignment() {
    let d = dispatcher("empty-pool");
    let id = d.report_incident(report("flood")).expect("report");

    assert!(matches!(
        d.auto_assign(id),
        Err(DispatchError::NoEligibleResponder(Category::NaturalDisaster))
    ));
    assert_eq!(d.incident(id).expect("incident").status, IncidentStatus::Pending);
}

// Scarcity never blocks dispatch; conservation holds under exhaustion.
#[test]
fn exhausted_inventory_still_dispatches() {
    let d = dispatcher("exhaustion");
    for n in 0..5 {
        d.register_responder(Responder::new(
            format!("resp-{n}"),
            format!("Crew {n}"),
            Category::Traffic,
        ))
        .expect("register");
    }

    // Two tow trucks in inventory; the third dispatch runs dry.
    for _ in 0..3 {
        let id = d
            .report_incident(report("multi_vehicle_collision"))
            .expect("report");
        let responder = d.auto_assign(id).expect("assign");
        assert!(!responder.is_empty());
        assert_eq!(d.incident(id).expect("incident").status, IncidentStatus::Ongoing);
        assert_conservation(&d);
    }
    assert_eq!(d.resource_status().available["tow_trucks"], 0);
}

// The dispatch trail records the whole story in order.
#[test]
fn dispatch_trail_is_complete() {
    let d = dispatcher("trail");
    d.register_responder(Responder::new("resp-m", "Casey", Category::Medical))
        .expect("register");

    let id = d.report_incident(report("stroke")).expect("report");
    d.assign_responder(id, "resp-m").expect("assign");
    d.resolve_incident(id).expect("resolve");

    let kinds: Vec<String> = d
        .actions_for(id)
        .expect("actions")
        .into_iter()
        .map(|a| format!("{:?}", a.kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            "IncidentReported",
            "ResponderAssigned",
            "ResourceDeployed",
            "ResourceReturned",
            "IncidentResolved",
        ]
    );
}

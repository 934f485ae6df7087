use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use dispatch_catalog::Category;
use dispatch_core::dispatcher::Dispatcher;
use dispatch_core::error::DispatchError;
use dispatch_core::incident::{IncidentFacts, IncidentReport, Responder};

pub fn dispatch_router(dispatcher: Dispatcher) -> Router {
    Router::new()
        .route("/incidents", post(report_incident).get(list_incidents))
        .route("/incidents/:id/assign", post(assign_responder))
        .route("/incidents/:id/resolve", post(resolve_incident))
        .route("/incidents/:id/facts", post(amend_facts))
        .route("/incidents/:id/actions", get(incident_actions))
        .route("/responders", post(register_responder).get(list_responders))
        .route("/categories/:category/roles", get(recommended_roles))
        .route("/resources", get(resource_status))
        .route("/stats", get(stats))
        .with_state(dispatcher)
}

#[derive(Deserialize)]
struct AssignRequest {
    responder_id: Option<String>,
}

#[derive(Deserialize)]
struct RegisterRequest {
    id: String,
    name: String,
    category: Category,
}

async fn report_incident(
    State(dispatcher): State<Dispatcher>,
    Json(report): Json<IncidentReport>,
) -> (StatusCode, Json<serde_json::Value>) {
    match dispatcher.report_incident(report) {
        Ok(id) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "incident_id": id })),
        ),
        Err(err) => error_response(err),
    }
}

async fn list_incidents(
    State(dispatcher): State<Dispatcher>,
) -> (StatusCode, Json<serde_json::Value>) {
    match serde_json::to_value(dispatcher.incidents()) {
        Ok(incidents) => (StatusCode::OK, Json(incidents)),
        Err(err) => error_response(DispatchError::Storage(err.to_string())),
    }
}

async fn assign_responder(
    State(dispatcher): State<Dispatcher>,
    Path(id): Path<i64>,
    Json(request): Json<AssignRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    let assigned = match request.responder_id {
        Some(responder_id) => dispatcher
            .assign_responder(id, &responder_id)
            .map(|()| responder_id),
        None => dispatcher.auto_assign(id),
    };
    match assigned {
        Ok(responder_id) => (
            StatusCode::OK,
            Json(serde_json::json!({ "responder_id": responder_id })),
        ),
        Err(err) => error_response(err),
    }
}

async fn resolve_incident(
    State(dispatcher): State<Dispatcher>,
    Path(id): Path<i64>,
) -> (StatusCode, Json<serde_json::Value>) {
    match dispatcher.resolve_incident(id) {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "solved" })),
        ),
        Err(err) => error_response(err),
    }
}

async fn amend_facts(
    State(dispatcher): State<Dispatcher>,
    Path(id): Path<i64>,
    Json(facts): Json<IncidentFacts>,
) -> (StatusCode, Json<serde_json::Value>) {
    match dispatcher.amend_facts(id, facts) {
        Ok(priority) => (
            StatusCode::OK,
            Json(serde_json::json!({ "priority": priority.code() })),
        ),
        Err(err) => error_response(err),
    }
}

async fn recommended_roles(
    State(dispatcher): State<Dispatcher>,
    Path(category): Path<Category>,
) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "category": category.as_str(),
            "roles": dispatcher.catalog().recommended_roles(category),
        })),
    )
}

async fn incident_actions(
    State(dispatcher): State<Dispatcher>,
    Path(id): Path<i64>,
) -> (StatusCode, Json<serde_json::Value>) {
    match dispatcher
        .actions_for(id)
        .and_then(|actions| {
            serde_json::to_value(actions).map_err(|e| DispatchError::Storage(e.to_string()))
        }) {
        Ok(actions) => (StatusCode::OK, Json(actions)),
        Err(err) => error_response(err),
    }
}

async fn register_responder(
    State(dispatcher): State<Dispatcher>,
    Json(request): Json<RegisterRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    let responder = Responder::new(request.id.clone(), request.name, request.category);
    match dispatcher.register_responder(responder) {
        Ok(()) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "responder_id": request.id })),
        ),
        Err(err) => error_response(err),
    }
}

async fn list_responders(
    State(dispatcher): State<Dispatcher>,
) -> (StatusCode, Json<serde_json::Value>) {
    match serde_json::to_value(dispatcher.responders()) {
        Ok(responders) => (StatusCode::OK, Json(responders)),
        Err(err) => error_response(DispatchError::Storage(err.to_string())),
    }
}

async fn resource_status(
    State(dispatcher): State<Dispatcher>,
) -> (StatusCode, Json<serde_json::Value>) {
    match serde_json::to_value(dispatcher.resource_status()) {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)),
        Err(err) => error_response(DispatchError::Storage(err.to_string())),
    }
}

async fn stats(State(dispatcher): State<Dispatcher>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "by_status": dispatcher.stats_by_status(),
            "by_category": dispatcher.stats_by_category(),
        })),
    )
}

fn error_response(err: DispatchError) -> (StatusCode, Json<serde_json::Value>) {
    let status = match &err {
        DispatchError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        DispatchError::InvalidTransition { .. }
        | DispatchError::NoEligibleResponder(_)
        | DispatchError::ResourceUnavailable { .. } => StatusCode::CONFLICT,
        DispatchError::UnknownIncident(_)
        | DispatchError::UnknownResponder(_)
        | DispatchError::UnknownResource(_) => StatusCode::NOT_FOUND,
        DispatchError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "error": err.to_string() })))
}

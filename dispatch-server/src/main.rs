use std::sync::Arc;

use dispatch_catalog::ReferenceCatalog;
use dispatch_core::dispatch_log::DispatchLog;
use dispatch_core::dispatcher::Dispatcher;
use dispatch_core::sqlite_store::SqliteStore;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let catalog = load_catalog_from_env();
    let state_db = std::env::var("DISPATCH_DB").unwrap_or_else(|_| "dispatch.db".into());
    let log_db = std::env::var("DISPATCH_LOG_DB").unwrap_or_else(|_| "dispatch_log.db".into());

    let store = SqliteStore::open(&state_db).expect("open state store");
    let log = DispatchLog::open(&log_db).expect("open dispatch log");
    let dispatcher = Dispatcher::new(catalog, Arc::new(store), log);

    let addr = std::env::var("DISPATCH_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into());
    let app = dispatch_server::api::dispatch_router(dispatcher);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("bind listen address");

    tracing::info!("dispatch-server listening on {addr}");
    axum::serve(listener, app).await.expect("serve");
}

fn load_catalog_from_env() -> ReferenceCatalog {
    match std::env::var("DISPATCH_CATALOG") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path).expect("read catalog file");
            ReferenceCatalog::from_json(&raw).expect("parse catalog file")
        }
        Err(_) => ReferenceCatalog::builtin(),
    }
}

use std::sync::Arc;

use axum::{
    http::Method,
    response::Json,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::{
    api,
    config::Config,
    database::DbPool,
    error::Result,
    jobs::JobProcessor,
    progress::StatusLogStore,
    services::AgentServiceClient,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub services: Arc<AgentServiceClient>,
    pub jobs: Arc<JobProcessor>,
    pub status_logs: Arc<StatusLogStore>,
}

pub async fn run_server(config: Config) -> Result<()> {
    let db = crate::database::create_pool(&config.database_url()).await?;

    let services = Arc::new(AgentServiceClient::new(&config));
    let status_logs = Arc::new(StatusLogStore::new());
    let jobs = JobProcessor::new(
        db.clone(),
        Arc::clone(&services),
        Arc::clone(&status_logs),
        config.worker_count,
    );

    let state = AppState {
        config: config.clone(),
        db,
        services,
        jobs,
        status_logs,
    };

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::ACCEPT,
            axum::http::header::CACHE_CONTROL,
        ])
        .allow_origin(axum::http::header::HeaderValue::from_static("*"));

    let app = Router::new()
        .route("/", get(root))
        .nest("/api", api::create_api_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let address = config.server_address();
    info!("Server listening on {}", address);

    let listener = tokio::net::TcpListener::bind(&address).await?;

    match axum::serve(listener, app).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => error!("Server error: {}", e),
    }

    Ok(())
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "Flowforge API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

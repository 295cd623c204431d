mod seed_data;
mod service_impl;
mod storage;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use webvitals_protocol::*;

pub use crate::seed_data::{generate_seed_events, load_seed_data};
pub use crate::service_impl::VitalsServiceImpl;
pub use crate::storage::SampleStore;

/// Any query service, shared across request handlers
pub type SharedService = Arc<dyn VitalsQueryService>;

/// Settings for [`run_server`]
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// How long ingested events are kept
    pub ttl: Duration,
    /// Width of a timeseries bucket
    pub bucket_interval: Duration,
    /// Load seed data on startup
    pub seed: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 1990,
            ttl: Duration::from_secs(24 * 3600),
            bucket_interval: Duration::from_secs(3600),
            seed: false,
        }
    }
}

pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    tracing::info!("📈 Web Vitals server starting");

    let store = SampleStore::new(config.ttl, config.bucket_interval);
    if config.seed {
        let count = load_seed_data(&store);
        tracing::info!("🌱 Loaded {} seed events", count);
    }
    let service: SharedService = Arc::new(VitalsServiceImpl::new(store));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🌐 Query server listening on http://{}", addr);
    tracing::info!("  - GET  {} → p75 per vital", routes::PERCENTILES);
    tracing::info!("  - GET  {} → p75 per vital over time", routes::TIMESERIES);
    tracing::info!("  - GET  {} → sampled events", routes::SAMPLES);
    tracing::info!("  - POST {} → ingest events", routes::EVENTS);

    axum::serve(listener, router(service)).await?;
    Ok(())
}

/// HTTP routes over a query service
pub fn router(service: SharedService) -> Router {
    Router::new()
        .route(routes::PING, get(ping))
        .route(routes::EVENTS, post(ingest))
        .route(routes::PERCENTILES, get(percentiles))
        .route(routes::TIMESERIES, get(timeseries))
        .route(routes::SAMPLES, get(samples))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

async fn ping(State(service): State<SharedService>) -> Result<String, ApiError> {
    Ok(service.ping().await?)
}

async fn ingest(
    State(service): State<SharedService>,
    Json(events): Json<Vec<TransactionEvent>>,
) -> Result<Json<IngestResponse>, ApiError> {
    let ingested = service.ingest(events).await?;
    Ok(Json(IngestResponse { ingested }))
}

async fn percentiles(
    State(service): State<SharedService>,
    Query(params): Query<TransactionParams>,
) -> Result<Json<ProjectVitalPercentiles>, ApiError> {
    let percentiles = service.project_percentiles(params.into_filter()).await?;
    Ok(Json(percentiles))
}

async fn timeseries(
    State(service): State<SharedService>,
    Query(params): Query<TransactionParams>,
) -> Result<Json<VitalTimeseries>, ApiError> {
    let series = service.vital_timeseries(params.into_filter()).await?;
    Ok(Json(series))
}

async fn samples(
    State(service): State<SharedService>,
    Query(params): Query<SampleParams>,
) -> Result<Json<Vec<TransactionSample>>, ApiError> {
    let query = params.into_query()?;
    tracing::debug!(
        transaction = ?query.transaction,
        filter = %query.query.as_ref().map(ToString::to_string).unwrap_or_default(),
        limit = query.limit,
        "sample query"
    );
    let samples = service.transaction_samples(query).await?;
    Ok(Json(samples))
}

#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error("invalid search query: {0}")]
    InvalidQuery(#[from] SearchQueryError),

    #[error(transparent)]
    Query(#[from] QueryError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidQuery(_) | ApiError::Query(QueryError::InvalidQuery(_)) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Query(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }

        let body = ErrorBody {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

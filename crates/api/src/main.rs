use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use peerscope_core::config::Settings;
use peerscope_core::domain::peer::PeerComparison;
use peerscope_core::peers::{PeerDiscoveryError, ScreenerPeerClient};
use peerscope_core::pipeline::{PeerResolver, PipelineError};
use peerscope_core::reference::ReferenceTable;
use peerscope_core::storage::PgFundamentalsStore;
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::Instrument;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let reference = ReferenceTable::load(settings.reference_table_path())?;

    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
        {
            Ok(pool) => match peerscope_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let state = AppState {
        pool,
        reference: Arc::new(reference),
        settings: Arc::new(settings),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/peers/:ticker/:date", get(get_peer_comparison))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Clone)]
struct AppState {
    pool: Option<PgPool>,
    reference: Arc<ReferenceTable>,
    settings: Arc<Settings>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn unavailable() -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: "fundamentals store is unavailable".to_string(),
        }
    }

    fn internal(err: anyhow::Error) -> Self {
        sentry_anyhow::capture_anyhow(&err);
        tracing::error!(error = %err, "request failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "internal error".to_string(),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        let status = status_for(&err);
        let message = err.to_string();
        if status.is_server_error() {
            let err = anyhow::Error::new(err);
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %err, %status, "peer comparison failed");
        } else {
            tracing::info!(error = %message, %status, "peer comparison halted");
        }
        Self { status, message }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

fn status_for(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::InvalidDate { .. } => StatusCode::BAD_REQUEST,
        PipelineError::BaseSnapshotNotFound { .. }
        | PipelineError::ReportNotFound { .. }
        | PipelineError::NoRatiosAvailable { .. }
        | PipelineError::MissingCompanyId { .. } => StatusCode::NOT_FOUND,
        PipelineError::MissingNameColumn
        | PipelineError::Discovery(
            PeerDiscoveryError::NoTableFound
            | PeerDiscoveryError::RaggedRow { .. }
            | PeerDiscoveryError::Fetch(_),
        ) => StatusCode::BAD_GATEWAY,
        PipelineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn get_peer_comparison(
    State(state): State<AppState>,
    Path((ticker, date)): Path<(String, String)>,
) -> Result<Json<PeerComparison>, ApiError> {
    let Some(pool) = &state.pool else {
        return Err(ApiError::unavailable());
    };

    let ticker = ticker.trim().to_string();
    let run_id = Uuid::new_v4();
    let span = tracing::info_span!("peer_comparison", %run_id, %ticker, %date);

    // Peer lookups stay inside the base ticker's collection.
    let store = PgFundamentalsStore::new(pool.clone(), ticker.as_str());
    let discovery = ScreenerPeerClient::from_settings(&state.settings).map_err(ApiError::internal)?;

    let comparison = PeerResolver::new(&state.reference, &store, &discovery)
        .resolve_peers(&ticker, &date)
        .instrument(span)
        .await?;

    Ok(Json(comparison))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

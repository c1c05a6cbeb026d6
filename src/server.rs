//! # Server Configuration
//!
//! Application state, router wiring and startup for the Unitrack API.
//! The storage adapter is chosen here, once, from configuration; every
//! component downstream sees only the [`Store`] trait.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    routing::{delete, get, patch, post},
};
use sea_orm::DatabaseConnection;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::allowlist::HostAllowlist;
use crate::canvas::CanvasClient;
use crate::config::{AppConfig, StorageBackend};
use crate::crypto::{CryptoKey, TokenCipher};
use crate::handlers;
use crate::storage::{DatabaseStore, MemoryStore, Store};
use crate::sync::SyncService;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub sync: Arc<SyncService>,
    pub cipher: TokenCipher,
    pub client: CanvasClient,
    pub allowlist: HostAllowlist,
    /// Present only with the database backend; used by the health check.
    pub db: Option<DatabaseConnection>,
}

impl AppState {
    /// Builds the full state from validated configuration. The crypto key
    /// has already been length-checked by [`AppConfig::validate`].
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let key_bytes = config
            .crypto_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("crypto key missing after validation"))?;
        let key = CryptoKey::new(key_bytes)
            .map_err(|e| anyhow::anyhow!("invalid crypto key: {}", e))?;
        let cipher = TokenCipher::new(key);

        let allowlist = HostAllowlist::builtin();
        let client = CanvasClient::new(
            allowlist.clone(),
            Duration::from_secs(config.canvas_timeout_secs),
        )?;

        let (store, db): (Arc<dyn Store>, Option<DatabaseConnection>) =
            match config.storage_backend {
                StorageBackend::Database => {
                    let db = crate::db::init_pool(&config).await?;
                    crate::db::run_migrations(&db).await?;
                    (Arc::new(DatabaseStore::new(db.clone())), Some(db))
                }
                StorageBackend::Memory => (Arc::new(MemoryStore::new()), None),
            };

        let sync = Arc::new(SyncService::new(
            Arc::clone(&store),
            client.clone(),
            cipher.clone(),
        ));

        Ok(Self {
            config: Arc::new(config),
            store,
            sync,
            cipher,
            client,
            allowlist,
            db,
        })
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/lms/connections",
            get(handlers::connections::list_connections)
                .post(handlers::connections::create_connection),
        )
        .route(
            "/lms/connections/{id}",
            delete(handlers::connections::delete_connection),
        )
        .route(
            "/lms/connections/{id}/sync",
            post(handlers::connections::sync_connection),
        )
        .route(
            "/units",
            get(handlers::units::list_units).post(handlers::units::create_unit),
        )
        .route(
            "/units/{id}",
            get(handlers::units::get_unit)
                .patch(handlers::units::update_unit)
                .delete(handlers::units::delete_unit),
        )
        .route(
            "/assignments",
            get(handlers::planner::list_assignments).post(handlers::planner::create_assignment),
        )
        .route(
            "/assignments/{id}",
            patch(handlers::planner::update_assignment)
                .delete(handlers::planner::delete_assignment),
        )
        .route(
            "/exams",
            get(handlers::planner::list_exams).post(handlers::planner::create_exam),
        )
        .route(
            "/exams/{id}",
            patch(handlers::planner::update_exam).delete(handlers::planner::delete_exam),
        )
        .route(
            "/events",
            get(handlers::planner::list_events).post(handlers::planner::create_event),
        )
        .route(
            "/events/{id}",
            patch(handlers::planner::update_event).delete(handlers::planner::delete_event),
        )
        .route(
            "/grades",
            get(handlers::planner::list_grades).post(handlers::planner::create_grade),
        )
        .route(
            "/grades/{id}",
            patch(handlers::planner::update_grade).delete(handlers::planner::delete_grade),
        )
        .route("/data/export", get(handlers::data::export_data))
        .route("/data/import", post(handlers::data::import_data))
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state.config),
            crate::auth::auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route(
            "/lms/institutions",
            get(handlers::connections::list_institutions),
        )
        .merge(protected)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(axum::middleware::from_fn(crate::telemetry::trace_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Starts the server with the given configuration
pub async fn run_server(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;

    let state = AppState::from_config(config).await?;
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::connections::list_institutions,
        crate::handlers::connections::list_connections,
        crate::handlers::connections::create_connection,
        crate::handlers::connections::delete_connection,
        crate::handlers::connections::sync_connection,
        crate::handlers::units::list_units,
        crate::handlers::units::get_unit,
        crate::handlers::units::create_unit,
        crate::handlers::units::update_unit,
        crate::handlers::units::delete_unit,
        crate::handlers::planner::list_assignments,
        crate::handlers::planner::create_assignment,
        crate::handlers::planner::update_assignment,
        crate::handlers::planner::delete_assignment,
        crate::handlers::planner::list_exams,
        crate::handlers::planner::create_exam,
        crate::handlers::planner::update_exam,
        crate::handlers::planner::delete_exam,
        crate::handlers::planner::list_events,
        crate::handlers::planner::create_event,
        crate::handlers::planner::update_event,
        crate::handlers::planner::delete_event,
        crate::handlers::planner::list_grades,
        crate::handlers::planner::create_grade,
        crate::handlers::planner::update_grade,
        crate::handlers::planner::delete_grade,
        crate::handlers::data::export_data,
        crate::handlers::data::import_data,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::handlers::connections::InstitutionInfo,
            crate::handlers::connections::ConnectRequest,
            crate::handlers::connections::ConnectionInfo,
            crate::handlers::connections::SyncResponse,
            crate::handlers::data::ImportResponse,
            crate::sync::SyncSummary,
            crate::storage::NewUnit,
            crate::storage::NewAssignment,
            crate::storage::NewExam,
            crate::storage::NewEvent,
            crate::storage::NewGrade,
        )
    ),
    info(
        title = "Unitrack API",
        description = "University tracker backend with Canvas LMS sync",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;

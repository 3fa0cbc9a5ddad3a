use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, middleware, routing::get};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use openlims_db_memory::InMemoryStorage;
use openlims_storage::DynStorage;

use crate::{config::AppConfig, handlers, middleware as app_middleware};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub storage: DynStorage,
    pub config: Arc<AppConfig>,
}

pub fn build_app(storage: DynStorage, config: AppConfig) -> Router {
    let body_limit = config.server.body_limit_bytes;
    let state = AppState {
        storage,
        config: Arc::new(config),
    };

    let api = Router::new()
        // Patients
        .route(
            "/patients",
            get(handlers::patients::index).post(handlers::patients::store),
        )
        .route("/patients/search", get(handlers::patients::search))
        .route(
            "/patients/{id}",
            get(handlers::patients::show)
                .put(handlers::patients::update)
                .delete(handlers::patients::destroy),
        )
        .route("/patients/{id}/samples", get(handlers::patients::samples))
        // Samples and their work items
        .route(
            "/samples",
            get(handlers::samples::index).post(handlers::samples::store),
        )
        .route(
            "/samples/accession/{accession_number}",
            get(handlers::samples::show_by_accession),
        )
        .route(
            "/samples/{id}",
            get(handlers::samples::show)
                .put(handlers::samples::update)
                .delete(handlers::samples::destroy),
        )
        .route(
            "/samples/{id}/tests",
            get(handlers::samples::tests)
                .post(handlers::samples::add_tests)
                .put(handlers::samples::sync_tests),
        )
        .route(
            "/samples/{id}/tests/{test_id}",
            axum::routing::put(handlers::samples::update_test)
                .delete(handlers::samples::detach_test),
        )
        // Test catalog
        .route(
            "/tests",
            get(handlers::catalog::index).post(handlers::catalog::store),
        )
        .route(
            "/tests/{id}",
            get(handlers::catalog::show)
                .put(handlers::catalog::update)
                .delete(handlers::catalog::destroy),
        )
        // Results
        .route(
            "/sample-results",
            get(handlers::results::index).post(handlers::results::store),
        )
        .route(
            "/sample-results-by-sample",
            get(handlers::results::by_sample),
        )
        .route(
            "/sample-results/{sample_id}",
            axum::routing::put(handlers::results::update),
        )
        .route(
            "/sample-results/{sample_id}/{test_id}",
            get(handlers::results::show),
        )
        // Lab settings
        .route(
            "/lab-settings",
            get(handlers::settings::show).post(handlers::settings::update),
        )
        // Reports
        .route("/reports/{accession_number}", get(handlers::reports::show))
        .route(
            "/reports/{accession_number}/html",
            get(handlers::reports::html),
        )
        .route(
            "/reports/{accession_number}/pdf",
            get(handlers::reports::pdf),
        );

    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::system::root))
        .route("/healthz", get(handlers::system::healthz))
        .route("/readyz", get(handlers::system::readyz))
        .nest("/api", api)
        .with_state(state)
        // Middleware stack: request id is outermost so the trace span can
        // read the extension it inserts.
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    let req_id = req
                        .extensions()
                        .get::<axum::http::HeaderValue>()
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %method,
                        http.target = %uri,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(middleware::from_fn(app_middleware::request_id))
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    storage: Option<DynStorage>,
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            storage: None,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub fn with_storage(mut self, storage: DynStorage) -> Self {
        self.storage = Some(storage);
        self
    }

    pub async fn build(self) -> anyhow::Result<OpenlimsServer> {
        let storage: DynStorage = match self.storage {
            Some(storage) => storage,
            None => Arc::new(InMemoryStorage::new()),
        };

        // Seed branding from config the first time around.
        if let Some(lab) = &self.config.lab {
            if storage.get_settings().await?.is_none() {
                storage.put_settings(lab.clone()).await?;
                tracing::info!(lab = %lab.name, "Lab branding initialized from config");
            }
        }

        tracing::info!(backend = storage.backend_name(), "Storage initialized");
        let app = build_app(storage, self.config);

        Ok(OpenlimsServer {
            addr: self.addr,
            app,
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct OpenlimsServer {
    addr: SocketAddr,
    app: Router,
}

impl OpenlimsServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

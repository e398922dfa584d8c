//! Application startup and lifecycle management.

use crate::assembler::MerchantContext;
use crate::client::{InvoicingApi, SuperFakturaClient};
use crate::config::Config;
use crate::handlers;
use crate::orchestrator::Orchestrator;
use crate::overrides::Overrides;
use crate::scheduler::JobWorker;
use crate::services::{Database, MemoryBackend, Stores};
use crate::triggers::EventDispatcher;
use crate::vies::ViesClient;
use axum::middleware::from_fn;
use axum::{
    routing::{get, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub orchestrator: Orchestrator,
    pub dispatcher: EventDispatcher,
    pub vies: ViesClient,
    /// Present when running on PostgreSQL; drives the readiness probe.
    pub db: Option<Database>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .route("/events", post(handlers::events::receive_event))
        .route("/callbacks/payment", get(handlers::callbacks::payment_callback))
        .route("/admin/notices", get(handlers::admin::notices))
        .route("/admin/api-check", get(handlers::admin::api_check))
        .route("/admin/orders/:order_id", get(handlers::admin::view_order))
        .route(
            "/admin/orders/:order_id/documents/:document_type",
            get(handlers::admin::create_document),
        )
        .route(
            "/admin/orders/:order_id/regenerate",
            post(handlers::admin::regenerate),
        )
        .route(
            "/orders/:order_id/documents",
            get(handlers::storefront::document_links),
        )
        .route(
            "/checkout/company-fields",
            post(handlers::storefront::validate_company_fields),
        )
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    listener: TcpListener,
    state: AppState,
    worker: Option<JobWorker>,
    shutdown: CancellationToken,
}

impl Application {
    /// Build the application with the given configuration.
    ///
    /// Without a database URL every store lives in memory.
    pub async fn build(config: Config) -> Result<Self, AppError> {
        let (stores, db) = match &config.database.url {
            Some(url) => {
                let db = Database::new(
                    url.expose_secret(),
                    config.database.max_connections,
                    config.database.min_connections,
                )
                .await
                .map_err(|e| {
                    tracing::error!("Failed to connect to PostgreSQL: {}", e);
                    e
                })?;
                db.run_migrations().await?;
                (Stores::postgres(db.clone()), Some(db))
            }
            None => {
                tracing::warn!("No database configured, using in-memory storage");
                (Stores::memory(Arc::new(MemoryBackend::new())), None)
            }
        };

        let client = SuperFakturaClient::new(config.api.clone()).map_err(|e| {
            tracing::error!("Failed to build invoicing API client: {}", e);
            AppError::ConfigError(e)
        })?;
        if client.is_configured() {
            tracing::info!(base_url = %client.base_url(), "Invoicing API client initialized");
        } else {
            tracing::warn!("Invoicing API credentials not configured - document generation will fail");
        }

        Self::build_with(config, stores, db, Arc::new(client), Overrides::new()).await
    }

    /// Build from already constructed parts.
    pub async fn build_with(
        config: Config,
        stores: Stores,
        db: Option<Database>,
        api: Arc<dyn InvoicingApi>,
        overrides: Overrides,
    ) -> Result<Self, AppError> {
        let merchant = MerchantContext {
            base_country: config.merchant.base_country.clone(),
            site_url: config.merchant.site_url.clone(),
            callback_secret: config
                .merchant
                .callback_secret
                .as_ref()
                .map(|s| s.expose_secret().clone()),
        };

        let orchestrator = Orchestrator::new(
            api,
            stores,
            overrides,
            merchant,
            config.merchant.lock_dir.clone(),
            config.api.base_url(),
        );
        let dispatcher = EventDispatcher::new(orchestrator.clone());
        let vies = ViesClient::new(&config.vies, orchestrator.audit().clone()).map_err(|e| {
            tracing::error!("Failed to build VIES client: {}", e);
            AppError::ConfigError(e)
        })?;

        let worker = if config.worker.enabled {
            Some(JobWorker::new(orchestrator.clone(), &config.worker))
        } else {
            tracing::info!("Job worker disabled by configuration");
            None
        };

        // Port 0 binds a random port for testing
        let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let http_port = listener.local_addr()?.port();
        tracing::info!("Invoice sync service: HTTP on port {}", http_port);

        Ok(Self {
            http_port,
            listener,
            state: AppState {
                config,
                orchestrator,
                dispatcher,
                vies,
                db,
            },
            worker,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Cancelling this token stops the HTTP server and the job worker.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        if let Some(worker) = self.worker {
            let token = self.shutdown.clone();
            tokio::spawn(worker.run(token));
        }

        let shutdown = self.shutdown.clone();
        axum::serve(self.listener, router(self.state))
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
    }
}

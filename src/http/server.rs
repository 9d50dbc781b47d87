//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Attach the admission guards per endpoint
//! - Wire up middleware (tracing, request ID, timeout, security headers)
//! - Bind server to listener and run background tasks

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::StatusCode,
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::clock::{SharedClock, SystemClock};
use crate::config::validation::validate_config;
use crate::config::{ConfigError, ServiceConfig};
use crate::http::handlers;
use crate::http::middleware::{admission_middleware, track_metrics, GuardState};
use crate::lifecycle::{shutdown_signal, ShutdownSignal};
use crate::notes::{MemoryNoteStore, NoteStore};
use crate::security::headers::security_headers;
use crate::security::rate_limit::run_sweeper;
use crate::security::validation::NOTE_FIELDS;
use crate::security::{
    AdmissionPipeline, EndpointPolicy, MemoryWindowStore, RateLimiter, TokenService, WindowStore,
};

/// What `/login` puts in the tokens it hands out.
#[derive(Debug, Clone)]
pub struct LoginSettings {
    pub subject: String,
    pub role: String,
    pub ttl: Duration,
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub instance: Arc<str>,
    pub notes: Arc<dyn NoteStore>,
    pub tokens: TokenService,
    pub login: Arc<LoginSettings>,
    pub clock: SharedClock,
}

/// HTTP server for the notes service.
pub struct HttpServer {
    router: Router,
    config: ServiceConfig,
    limiter: Option<RateLimiter>,
}

impl HttpServer {
    /// Create a server with the system clock and in-memory stores.
    pub fn new(config: ServiceConfig) -> Result<Self, ConfigError> {
        Self::with_stores(
            config,
            Arc::new(SystemClock),
            Arc::new(MemoryNoteStore::new()),
            Arc::new(MemoryWindowStore::new()),
        )
    }

    /// Create a server over explicit clock and stores.
    pub fn with_stores(
        config: ServiceConfig,
        clock: SharedClock,
        notes: Arc<dyn NoteStore>,
        windows: Arc<dyn WindowStore>,
    ) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let tokens = TokenService::new(&config.auth.secret, clock.clone());
        let limiter = config
            .rate_limit
            .enabled
            .then(|| RateLimiter::from_config(&config.rate_limit, windows, clock.clone()));

        let guard = GuardState {
            pipeline: Arc::new(AdmissionPipeline::new(limiter.clone(), tokens.clone())),
            trust_forwarded: config.security.trust_forwarded_header,
            max_body_size: config.security.max_body_size,
        };

        let state = AppState {
            instance: Arc::from(config.instance.id.as_str()),
            notes,
            tokens,
            login: Arc::new(LoginSettings {
                subject: config.auth.demo_subject.clone(),
                role: config.auth.demo_role.clone(),
                ttl: Duration::from_secs(config.auth.token_ttl_secs),
            }),
            clock,
        };

        let router = Self::build_router(&config, state, guard);
        Ok(Self {
            router,
            config,
            limiter,
        })
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Body size is enforced by the admission middleware on write routes, after
    /// the rate limiter has counted the request.
    fn build_router(config: &ServiceConfig, state: AppState, guard: GuardState) -> Router {
        let throttled = (guard.clone(), EndpointPolicy::THROTTLED);
        let authenticated = (guard.clone(), EndpointPolicy::AUTHENTICATED);
        let write = (guard, EndpointPolicy::write(NOTE_FIELDS));

        let mut router = Router::new()
            .route("/health", get(handlers::health))
            .route(
                "/login",
                post(handlers::login)
                    .layer(middleware::from_fn_with_state(throttled.clone(), admission_middleware)),
            )
            .route(
                "/whoami",
                get(handlers::whoami)
                    .layer(middleware::from_fn_with_state(throttled, admission_middleware)),
            )
            .route(
                "/notes",
                get(handlers::list_notes)
                    .layer(middleware::from_fn_with_state(authenticated, admission_middleware))
                    .merge(
                        post(handlers::create_note)
                            .layer(middleware::from_fn_with_state(write, admission_middleware)),
                    ),
            )
            .route_layer(middleware::from_fn(track_metrics))
            .with_state(state)
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                Duration::from_secs(config.timeouts.request_secs),
            ));

        if config.security.enable_headers {
            for (name, value) in security_headers() {
                router = router.layer(SetResponseHeaderLayer::if_not_present(name, value));
            }
        }

        router.layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
    }

    /// Run the server until Ctrl+C or `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: ShutdownSignal,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            instance = %self.config.instance.id,
            "HTTP server starting"
        );

        if let Some(limiter) = self.limiter.clone() {
            let interval = Duration::from_secs(self.config.rate_limit.sweep_interval_secs);
            tokio::spawn(run_sweeper(limiter, interval, shutdown.clone()));
        }

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// The fully layered router, without connection info.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}

// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Server implementation module
//!
//! This module provides the main server struct for the lookup service: wiring
//! of the session pool, fallback resolver and router, pool bootstrap at start,
//! and coordinated graceful shutdown using `CancellationToken`. The session
//! pool is closed once the listener has drained.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{Router, http::HeaderName};
use hyper::Request;
use registry_lookup::{ChannelPool, FallbackResolver, LookupService};
use tokio::{net::TcpListener, time::timeout};
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info, info_span, warn};

use crate::{
    config::ServerConfig,
    error::{ServerError, ServerResult},
    middleware::{AdminAuth, RateLimiter},
    routes::create_routes,
    state::{Lookup, ServerState},
};

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");
const DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_FORCE_SHUTDOWN_TIMEOUT_SECONDS: u64 = 5;

/// Configuration for server shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Maximum time to wait for in-flight requests after shutdown starts
    pub graceful_timeout: Duration,
    /// Maximum time to wait for the session pool to close
    pub force_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            graceful_timeout: Duration::from_secs(DEFAULT_GRACEFUL_SHUTDOWN_TIMEOUT_SECONDS),
            force_timeout: Duration::from_secs(DEFAULT_FORCE_SHUTDOWN_TIMEOUT_SECONDS),
        }
    }
}

/// Main server struct
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    router: Router,
    state: ServerState,
    cancellation_token: CancellationToken,
    graceful_shutdown_config: ShutdownConfig,
}

impl Server {
    /// Create new server instance
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Dependency` if the registry HTTP client cannot be built.
    pub fn new(config: ServerConfig, shutdown_config: ShutdownConfig) -> ServerResult<Self> {
        let lookup = Self::create_lookup_service(&config)?;
        Self::with_lookup_service(config, shutdown_config, Arc::new(lookup))
    }

    fn create_lookup_service(config: &ServerConfig) -> ServerResult<Lookup> {
        let authenticator = config.credentials.authenticator();
        if !authenticator.is_configured() {
            warn!("no portal credentials configured, lookups will use the public registries only");
        }

        let pool = Arc::new(ChannelPool::new(
            authenticator,
            config.pool.to_pool_config(),
        ));
        let fallback = FallbackResolver::new(config.fallback.to_fallback_config()).map_err(|e| {
            ServerError::Dependency {
                message: format!("failed to create fallback resolver: {e}"),
            }
        })?;

        Ok(LookupService::new(
            pool,
            fallback,
            config.lookup.to_lookup_config(),
        ))
    }

    /// Create server around an existing lookup service
    ///
    /// # Errors
    ///
    /// Currently infallible; kept fallible for parity with [`Server::new`].
    pub fn with_lookup_service(
        config: ServerConfig,
        graceful_shutdown_config: ShutdownConfig,
        lookup: Arc<Lookup>,
    ) -> ServerResult<Self> {
        let cancellation_token = CancellationToken::new();
        let state = ServerState::new(config.clone(), lookup, cancellation_token.child_token());
        let router = Self::create_router(state.clone());

        Ok(Self {
            config,
            router,
            state,
            cancellation_token,
            graceful_shutdown_config,
        })
    }

    /// Create application router with middleware
    fn create_router(state: ServerState) -> Router {
        let timeout_duration = state.config().timeout_seconds.value();
        let rate_limiter = RateLimiter::new(state.config().rate_limiting.clone());
        let admin = AdminAuth::new(&state.config().admin);

        let middleware = ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid))
            .layer(
                TraceLayer::new_for_http().make_span_with(|req: &Request<_>| {
                    if let Some(request_id) = req.headers().get(REQUEST_ID_HEADER) {
                        info_span!("http_request", ?request_id, method = %req.method(), uri = %req.uri())
                    } else {
                        error!("failed to extract id from request");
                        info_span!("http_request", request_id = "unknown")
                    }
                }),
            )
            .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER))
            .layer(CorsLayer::permissive())
            .layer(TimeoutLayer::new(timeout_duration));

        create_routes(rate_limiter, admin)
            .layer(middleware)
            .with_state(state)
    }

    /// Authenticate the configured number of portal sessions
    async fn bootstrap_pool(config: &ServerConfig, lookup: &Lookup) {
        if config.credentials.cookies().is_empty() || config.pool.max_sessions == 0 {
            info!("session pool left empty");
            return;
        }

        lookup.pool().bootstrap(config.pool.max_sessions).await;
    }

    async fn bind(&self) -> ServerResult<(TcpListener, SocketAddr)> {
        let addr = self.config.socket_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                address: addr,
                source,
            })?;

        let actual_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Startup { source })?;

        Ok((listener, actual_addr))
    }

    /// Run the server with coordinated graceful shutdown
    ///
    /// The pool is bootstrapped in the background; lookups arriving before it
    /// is ready are served by the public registries.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if unable to bind to the configured address,
    /// or `ServerError::Shutdown` if the server fails while serving.
    pub async fn run(self) -> ServerResult<()> {
        let (listener, actual_addr) = self.bind().await?;

        info!(
            address = %actual_addr,
            environment = %self.config.environment,
            "registry lookup server starting",
        );

        let lookup = Arc::clone(self.state.lookup());
        let bootstrap_config = self.config.clone();
        tokio::spawn(async move {
            Self::bootstrap_pool(&bootstrap_config, &lookup).await;
        });

        let cancellation_token = self.cancellation_token.clone();
        let shutdown_token = cancellation_token.clone();
        tokio::spawn(async move {
            info!("spawning the graceful shutdown task");
            Self::shutdown_signal_handler(shutdown_token).await;
        });

        let drain_token = cancellation_token.clone();
        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();
        let mut server_task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { drain_token.cancelled().await })
                .await
        });

        let serve_result = tokio::select! {
            joined = &mut server_task => joined,
            () = cancellation_token.cancelled() => {
                match timeout(self.graceful_shutdown_config.graceful_timeout, &mut server_task).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        warn!(
                            timeout_seconds = self.graceful_shutdown_config.graceful_timeout.as_secs(),
                            "in-flight requests did not drain in time, aborting"
                        );
                        server_task.abort();
                        Ok(Ok(()))
                    }
                }
            }
        };

        Self::close_pool(self.state.lookup(), self.graceful_shutdown_config.force_timeout).await;

        match serve_result {
            Ok(Ok(())) => {
                info!("registry lookup server shut down gracefully");
                Ok(())
            }
            Ok(Err(source)) => {
                error!(error = ?source, "server error during shutdown");
                Err(ServerError::Shutdown { source })
            }
            Err(join_error) => Err(ServerError::Runtime {
                message: format!("server task failed: {join_error}"),
            }),
        }
    }

    async fn close_pool(lookup: &Lookup, limit: Duration) {
        if timeout(limit, lookup.pool().close_all()).await.is_err() {
            warn!(
                timeout_seconds = limit.as_secs(),
                "session pool did not close in time"
            );
        } else {
            info!("session pool closed");
        }
    }

    /// Handle shutdown signals and trigger coordinated cancellation
    ///
    /// This function listens for SIGINT (Ctrl+C) and SIGTERM signals,
    /// and cancels the provided cancellation token when received.
    async fn shutdown_signal_handler(cancellation_token: CancellationToken) {
        let signal_received = async {
            #[cfg(unix)]
            #[allow(clippy::expect_used)]
            {
                use tokio::signal::unix::{SignalKind, signal};

                let mut sigterm =
                    signal(SignalKind::terminate()).expect("Failed to register SIGTERM handler");
                let mut sigint =
                    signal(SignalKind::interrupt()).expect("Failed to register SIGINT handler");

                tokio::select! {
                    _ = sigterm.recv() => "SIGTERM",
                    _ = sigint.recv() => "SIGINT",
                }
            }

            #[cfg(not(unix))]
            #[allow(clippy::expect_used)]
            {
                tokio::signal::ctrl_c()
                    .await
                    .expect("Failed to install CTRL+C signal handler");
                "CTRL+C"
            }
        };

        tokio::select! {
            signal_name = signal_received => {
                warn!(signal = signal_name, "shutdown signal received, cancelling all operations");
                cancellation_token.cancel();
            },
            () = cancellation_token.cancelled() => {
                info!("cancellation token already cancelled, shutdown signal handler exiting");
            }
        }
    }

    /// Returns a clone of the cancellation token for coordinated shutdown
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Initiates graceful shutdown by cancelling the server's cancellation token
    pub fn shutdown(&self) {
        info!("programmatic shutdown requested");
        self.cancellation_token.cancel();
    }

    /// Run server for testing, returns the bound address
    ///
    /// Unlike [`Server::run`] the pool bootstrap completes before this returns,
    /// and cancelling the returned token closes the pool after the listener stops.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if unable to bind to the configured address.
    pub async fn run_for_testing(self) -> ServerResult<(SocketAddr, CancellationToken)> {
        let (listener, actual_addr) = self.bind().await?;

        Self::bootstrap_pool(&self.config, self.state.lookup()).await;

        let token = self.cancellation_token.child_token();
        let task = token.child_token();
        let lookup = Arc::clone(self.state.lookup());
        let force_timeout = self.graceful_shutdown_config.force_timeout;
        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move { task.cancelled().await })
                .await;
            Self::close_pool(&lookup, force_timeout).await;
        });

        Ok((actual_addr, token))
    }

    /// Get server configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get server state for testing
    pub fn state(&self) -> &ServerState {
        &self.state
    }
}

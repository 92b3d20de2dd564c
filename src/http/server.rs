//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the gateway filter chain
//! - Wire up middleware (tracing, timeouts, request ID)
//! - Serve the gateway and, when enabled, the admin API
//! - Swap the route table when a new config arrives
//! - Close every WebSocket session with 1001 on shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::{middleware, Router};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::admin::{setup_admin_router, AdminState};
use crate::config::ProxyConfig;
use crate::http::{forward, websocket};
use crate::routing::{resolve, ProxyRouter, SharedRouter};
use crate::security::headers::HeaderFilterChain;
use crate::websocket::{CloseEvent, ProxySettings, SessionRegistry, WebSocketProxy};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub routes: SharedRouter,
    pub websocket: Arc<WebSocketProxy>,
    pub client: Client<HttpConnector, Body>,
    pub http_filters: Arc<HeaderFilterChain>,
}

/// HTTP gateway for the proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    state: AppState,
    started_at: Instant,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Self {
        let routes: SharedRouter = Arc::new(ArcSwap::from_pointee(ProxyRouter::from_config(
            config.routes.clone(),
        )));
        let registry = Arc::new(SessionRegistry::new());
        let websocket = Arc::new(WebSocketProxy::new(
            registry,
            ProxySettings::from_config(&config),
        ));

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        let state = AppState {
            routes,
            websocket,
            client,
            http_filters: Arc::new(HeaderFilterChain::http_default()),
        };

        let router = Self::build_router(&config, state.clone());
        Self {
            router,
            config,
            state,
            started_at: Instant::now(),
        }
    }

    /// Build the gateway router.
    ///
    /// Layers run outermost first: route resolution, then the WebSocket proxy,
    /// then the forwarder as the fallback handler. The `.layer` calls below are
    /// listed innermost first and must stay in the order given by
    /// `resolve::ORDER < WebSocketProxy::ORDER < forward::ORDER`.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .fallback(forward::forward)
            .with_state(state.clone())
            .layer(middleware::from_fn_with_state(
                state.websocket.clone(),
                websocket::websocket_routing,
            ))
            .layer(middleware::from_fn_with_state(
                state.routes.clone(),
                resolve::route_to_request_url,
            ))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Session registry shared with the admin API.
    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.state.websocket.registry().clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Returns once `shutdown` fires and every session was sent a going-away close.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let routes = self.state.routes.clone();
        let reload = tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                let router = ProxyRouter::from_config(config.routes);
                tracing::info!(routes = router.len(), "Route table swapped");
                routes.store(Arc::new(router));
            }
        });

        if self.config.admin.enabled {
            let admin_listener = TcpListener::bind(&self.config.admin.bind_address).await?;
            let admin_state = AdminState::new(
                self.registry(),
                &self.config.admin.api_key,
                self.started_at,
            );
            let mut admin_shutdown = shutdown.resubscribe();
            tokio::spawn(async move {
                let app = setup_admin_router(admin_state);
                tracing::info!(address = ?admin_listener.local_addr().ok(), "Admin API listening");
                let served = axum::serve(admin_listener, app)
                    .with_graceful_shutdown(async move {
                        let _ = admin_shutdown.recv().await;
                    })
                    .await;
                if let Err(e) = served {
                    tracing::error!(error = %e, "Admin API stopped");
                }
            });
        }

        let registry = self.registry();
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!(sessions = registry.len(), "Shutdown signal received");
                registry.close_all(CloseEvent::going_away()).await;
            })
            .await?;

        reload.abort();
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

pub mod error;
pub mod handlers;
pub mod models;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use utoipa::OpenApi;

use rdgate_proto::MAX_INSTRUCTION_SIZE;
use rdgate_tunnel::HttpTunnelTransport;

pub use error::{ApiError, TUNNEL_STATUS_HEADER};

/// Application state shared across handlers
pub struct AppState {
    pub transport: Arc<HttpTunnelTransport>,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Gateway Tunnel API",
        version = "0.1.0",
        description = "HTTP tunnel endpoints bridging browser clients to remote desktop backends"
    ),
    paths(
        handlers::create_tunnel,
        handlers::list_tunnels,
        handlers::read_tunnel,
        handlers::write_tunnel,
        handlers::delete_tunnel,
        handlers::health_check,
    ),
    components(
        schemas(
            models::CreateTunnelRequest,
            models::CreateTunnelResponse,
            models::TunnelStatus,
            models::TunnelInfo,
            models::TunnelList,
            models::HealthResponse,
            models::ErrorResponse,
        )
    ),
    tags(
        (name = "tunnels", description = "Tunnel connect, read, write and close"),
        (name = "system", description = "System health and info endpoints")
    )
)]
pub struct ApiDoc;

/// API server configuration
pub struct ApiServerConfig {
    /// Address to bind the API server
    pub bind_addr: SocketAddr,
    /// Enable CORS (for browser clients served from another origin)
    pub enable_cors: bool,
    /// Allowed CORS origins (if None, allows all)
    pub cors_origins: Option<Vec<String>>,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            enable_cors: false,
            cors_origins: None,
        }
    }
}

/// API Server
pub struct ApiServer {
    config: ApiServerConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, transport: Arc<HttpTunnelTransport>) -> Self {
        Self {
            config,
            state: Arc::new(AppState { transport }),
        }
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let router = Router::new()
            .route("/api/health", get(handlers::health_check))
            .route("/api/openapi.json", get(handlers::openapi_spec))
            .route(
                "/api/tunnels",
                get(handlers::list_tunnels).post(handlers::create_tunnel),
            )
            .route(
                "/api/tunnels/{id}",
                get(handlers::read_tunnel)
                    .post(handlers::write_tunnel)
                    .delete(handlers::delete_tunnel),
            )
            .layer(DefaultBodyLimit::max(MAX_INSTRUCTION_SIZE))
            .with_state(self.state.clone());

        let mut router = router.layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            router = router.layer(self.cors_layer());
        }

        router
    }

    fn cors_layer(&self) -> CorsLayer {
        let layer = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE])
            .expose_headers([TUNNEL_STATUS_HEADER]);

        match &self.config.cors_origins {
            Some(origins) => {
                let origins: Vec<HeaderValue> = origins
                    .iter()
                    .filter_map(|origin| match HeaderValue::from_str(origin) {
                        Ok(value) => Some(value),
                        Err(_) => {
                            warn!("Ignoring invalid CORS origin: {}", origin);
                            None
                        }
                    })
                    .collect();
                layer.allow_origin(AllowOrigin::list(origins))
            }
            None => layer.allow_origin(Any),
        }
    }

    /// Start the API server
    pub async fn start(self) -> Result<(), anyhow::Error> {
        let router = self.build_router();

        info!("Starting API server on {}", self.config.bind_addr);
        info!(
            "OpenAPI spec: http://{}/api/openapi.json",
            self.config.bind_addr
        );

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        axum::serve(listener, router)
            .await
            .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

        Ok(())
    }
}

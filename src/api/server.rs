//! HTTP API server

use super::{handlers, state::AppState};
use crate::config::ServerConfig;
use crate::error::TengenError;
use crate::utils::string::sanitize_filename;
use axum::{
    extract::{DefaultBodyLimit, Path, Request, State},
    http::{header, HeaderName, HeaderValue},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::time::Instant;
use tokio::net::TcpListener;
use tower::ServiceExt;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeFile,
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::{debug, info, info_span, warn};

/// Largest accepted request body (uploads)
pub const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Number of ports tried after the configured one
const ALT_PORT_ATTEMPTS: u16 = 10;

/// Seconds spent producing the response head
pub const RESPONSE_TIME_HEADER: HeaderName = HeaderName::from_static("x-response-time");

const REQUEST_ID_HEADER: &str = "x-request-id";

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Server address
    pub addr: SocketAddr,
    /// CORS origins; empty allows any origin
    pub allowed_origins: Vec<String>,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for ApiServerConfig {
    fn from(server: &ServerConfig) -> Self {
        let ip = server
            .host
            .parse()
            .unwrap_or_else(|_| std::net::IpAddr::from([127, 0, 0, 1]));
        Self {
            addr: SocketAddr::new(ip, server.port),
            allowed_origins: server.allowed_origins.clone(),
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if parsed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(parsed)
    }
}

async fn response_time(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let mut response = next.run(request).await;
    let elapsed = format!("{:.6}", start.elapsed().as_secs_f64());
    if let Ok(value) = HeaderValue::from_str(&elapsed) {
        response.headers_mut().insert(RESPONSE_TIME_HEADER, value);
    }
    response
}

fn request_span(request: &Request) -> tracing::Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-");
    info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = %request_id,
    )
}

/// Build router
///
/// Every response carries `x-request-id` (taken from the request or a fresh
/// UUID), `x-response-time` and the standard hardening headers.
pub fn build_router(state: AppState, config: &ApiServerConfig) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        // Health
        .route("/health", get(handlers::health))
        .route("/health/detailed", get(handlers::health_detailed))
        .route("/health/live", get(handlers::health_live))
        .route("/health/ready", get(handlers::health_ready))
        .route("/model/info", get(handlers::model_info))
        // Streaming endpoints
        .route("/chat", post(handlers::chat))
        .route("/code-assist", post(handlers::code_assist))
        // JSON endpoints
        .route("/research", post(handlers::research))
        .route("/code/generate", post(handlers::code_generate))
        .route("/code/debug", post(handlers::code_debug))
        .route("/rag/query", post(handlers::rag_query))
        // Files
        .route("/files/upload", post(handlers::upload))
        .route("/files/:name", get(serve_file))
        .with_state(state)
        // Middleware
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn(response_time))
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(cors_layer(&config.allowed_origins))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_XSS_PROTECTION,
            HeaderValue::from_static("1; mode=block"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// Serve a previously uploaded document from the data directory
async fn serve_file(
    State(state): State<AppState>,
    Path(name): Path<String>,
    request: Request,
) -> Response {
    let path = state.assistant.rag().data_dir().join(sanitize_filename(&name));
    if !path.is_file() {
        return TengenError::NotFound(format!("File {}", name)).into_response();
    }

    match ServeFile::new(path).oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// API server
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: ApiServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Get instance ID
    pub fn instance_id(&self) -> &str {
        &self.state.instance_id
    }

    /// Bind the configured address, or one of the next ten ports if it is taken
    pub async fn bind(&self) -> anyhow::Result<TcpListener> {
        match TcpListener::bind(self.config.addr).await {
            Ok(listener) => return Ok(listener),
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                debug!(
                    "Port {} in use, trying alternative ports...",
                    self.config.addr.port()
                );
            }
            Err(e) => return Err(e.into()),
        }

        let base_port = self.config.addr.port();
        for offset in 1..=ALT_PORT_ATTEMPTS {
            let alt_addr = SocketAddr::new(self.config.addr.ip(), base_port.saturating_add(offset));
            match TcpListener::bind(alt_addr).await {
                Ok(listener) => return Ok(listener),
                Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(anyhow::anyhow!(
            "All ports ({}-{}) are in use. API server unavailable for instance {}.",
            base_port,
            base_port.saturating_add(ALT_PORT_ATTEMPTS),
            self.state.instance_id
        ))
    }

    /// Serve until Ctrl-C
    pub async fn serve(self) -> anyhow::Result<()> {
        let listener = self.bind().await?;
        self.serve_on(listener).await
    }

    /// Serve on an already-bound listener until Ctrl-C
    pub async fn serve_on(self, listener: TcpListener) -> anyhow::Result<()> {
        let addr = listener.local_addr()?;
        info!(
            "API server [{}] listening on http://{}",
            self.state.instance_id, addr
        );

        let router = build_router(self.state, &self.config);
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        info!("API server stopped");
        Ok(())
    }
}

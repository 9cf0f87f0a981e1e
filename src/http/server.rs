//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all proxy handler
//! - Wire up middleware (tracing, timeout, request ID, concurrency limit)
//! - Match routes and tag requests for per-route authorization
//! - Run the authorization state machine before anything goes upstream
//! - Forward authorized requests; answer denied ones directly
//!
//! # Design Decisions
//! - The transaction is retargeted at the upstream before authorization, so
//!   a `head` check asks the origin the request is actually forwarded to
//! - No cache sits in front of the upstream; `--force-cacheability` is passed
//!   on to downstream shared caches as `Cache-Control: public`

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{
        header,
        uri::{Authority, InvalidUriParts, PathAndQuery, Scheme},
        HeaderMap, HeaderValue, Request, StatusCode, Uri,
    },
    response::{IntoResponse, Response},
    Router,
};
use bytes::Bytes;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::limit::ConcurrencyLimitLayer;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::auth::AuthProxy;
use crate::config::{ConfigError, ProxyConfig};
use crate::http::{RequestHead, ResponseHead};
use crate::observability::metrics;
use crate::routing::Router as ProxyRouter;
use crate::runtime::{authorize, AuthTimeouts, ProxyTransaction, Verdict};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid upstream address '{0}'")]
    Upstream(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<ProxyRouter>,
    /// `None` when authorization is off.
    pub auth: Option<AuthProxy>,
    pub client: Client<HttpConnector, Body>,
    pub upstream: Authority,
    pub timeouts: AuthTimeouts,
}

/// HTTP server for the authorizing proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let proxy_router = Arc::new(ProxyRouter::from_config(
            &config.routes,
            &config.upstream.address,
        )?);
        let auth = config.auth_proxy()?;
        let upstream = Authority::from_str(&config.upstream.address)
            .map_err(|_| ServerError::Upstream(config.upstream.address.clone()))?;

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        let state = AppState {
            router: proxy_router,
            auth,
            client,
            upstream,
            timeouts: AuthTimeouts {
                connect: Duration::from_secs(config.timeouts.connect_secs),
                io: Duration::from_secs(config.timeouts.auth_secs),
            },
        };

        tracing::info!(
            mode = ?config.auth.mode,
            routes = state.router.len(),
            upstream = %state.upstream,
            "Authorization configured"
        );

        let router = Self::build_router(&config, state);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        let middleware = ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(ConcurrencyLimitLayer::new(config.listener.max_connections))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.timeouts.request_secs,
            )));

        // A single fallback endpoint, so per-endpoint layers such as the
        // concurrency limit exist once.
        Router::new()
            .fallback(proxy_handler)
            .with_state(state)
            .layer(middleware)
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

/// Main proxy handler.
/// Matches a route, authorizes, then forwards or denies.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let (parts, body) = request.into_parts();
    let head = RequestHead::from_parts(&parts);

    tracing::debug!(
        request_id = %request_id,
        peer = %peer,
        method = %head.method,
        uri = %head.uri,
        "Proxying request"
    );

    // 1. Match Route
    let Some(route) = state.router.match_request(&head) else {
        tracing::warn!(request_id = %request_id, path = %head.uri.path(), "No route matched");
        return finish(StatusCode::NOT_FOUND, "No matching route found").into_response();
    };

    let target = match upstream_uri(&parts.uri, &state.upstream) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Failed to rewrite request URI");
            return finish(StatusCode::BAD_REQUEST, "Invalid request target").into_response();
        }
    };

    // 2. Authorize
    let verdict = match &state.auth {
        None => Verdict::Allow {
            ignore_authentication: false,
        },
        Some(proxy) => {
            let mut head = head;
            head.uri = target.clone();
            let mut txn = ProxyTransaction::new(head);
            if let Some(instance) = &route.auth {
                instance.do_remap(&mut txn);
            }
            authorize(proxy, txn, state.timeouts).await
        }
    };

    // 3. Forward or deny
    match verdict {
        Verdict::Allow {
            ignore_authentication,
        } => {
            tracing::debug!(
                request_id = %request_id,
                route = %route.name,
                ignore_authentication,
                "Request authorized"
            );
            let mut parts = parts;
            parts.uri = target;
            let mut response = forward(&state, parts, body, &request_id).await;
            if ignore_authentication {
                mark_shared_cacheable(response.headers_mut());
            }
            response
        }
        Verdict::Deny { head, body } => {
            tracing::info!(
                request_id = %request_id,
                route = %route.name,
                status = head.status.as_u16(),
                "Request denied"
            );
            deny(head, body)
        }
    }
}

/// Point `uri` at the upstream origin, keeping path and query.
fn upstream_uri(uri: &Uri, upstream: &Authority) -> Result<Uri, InvalidUriParts> {
    let mut parts = uri.clone().into_parts();
    parts.scheme = Some(Scheme::HTTP);
    parts.authority = Some(upstream.clone());
    if parts.path_and_query.is_none() {
        parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    Uri::from_parts(parts)
}

/// Forward an authorized request to the upstream origin.
async fn forward(
    state: &AppState,
    parts: axum::http::request::Parts,
    body: Body,
    request_id: &str,
) -> Response {
    match state.client.request(Request::from_parts(parts, body)).await {
        Ok(response) => {
            metrics::record_request(response.status().as_u16());
            let (parts, body) = response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Upstream error");
            finish(StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
        }
    }
}

/// Let shared caches store a response to a request that carried
/// credentials. Responses the upstream marked private or no-store are left
/// alone.
fn mark_shared_cacheable(headers: &mut HeaderMap) {
    let directives: Vec<String> = headers
        .get_all(header::CACHE_CONTROL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|d| d.trim().to_ascii_lowercase())
        .filter(|d| !d.is_empty())
        .collect();

    let settled = directives
        .iter()
        .any(|d| d == "public" || d == "private" || d.starts_with("private=") || d == "no-store");
    if settled {
        return;
    }

    let value = if directives.is_empty() {
        "public".to_string()
    } else {
        format!("{}, public", directives.join(", "))
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(header::CACHE_CONTROL, value);
    }
}

/// Answer the client with a denial from the state machine.
fn deny(head: ResponseHead, body: Bytes) -> Response {
    metrics::record_request(head.status.as_u16());
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = head.status;
    *response.headers_mut() = head.headers;
    response
}

fn finish(status: StatusCode, message: &'static str) -> (StatusCode, &'static str) {
    metrics::record_request(status.as_u16());
    (status, message)
}

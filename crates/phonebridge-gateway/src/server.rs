//! Axum-based HTTP and media-stream WebSocket server.

use std::sync::Arc;

use axum::{
    Form, Json, Router,
    extract::{State, WebSocketUpgrade},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use phonebridge_core::config::Config;

use crate::connection::handle_ws_connection;
use crate::markup::{build_error_markup, build_stream_markup_with};
use crate::state::GatewayState;

const STREAM_UNAVAILABLE: &str =
    "Désolé, le service est momentanément indisponible. Veuillez rappeler plus tard.";

/// Build the gateway router.
pub fn router(state: Arc<GatewayState>) -> Router {
    let stream_path = state.config.stream_path();

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/voice", post(voice_handler))
        .route("/stream-info", get(stream_info_handler))
        .route(&stream_path, get(ws_handler));

    #[cfg(feature = "metrics")]
    let app = app.route("/metrics", get(metrics_handler));

    app.with_state(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}

/// Start the gateway server and serve until Ctrl+C.
pub async fn start_gateway(state: Arc<GatewayState>, port: u16) -> anyhow::Result<()> {
    let bind_addr = state.config.bind_addr();
    let stream_path = state.config.stream_path();
    let app = router(state);

    let addr = format!("{bind_addr}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Gateway listening on {addr} (media stream at {stream_path})");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(state, socket))
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "active_calls": state.registry.len(),
        "connections": state.connection_count(),
    }))
}

/// Voice webhook form fields. All optional; only used for logging.
#[derive(Debug, Default, Deserialize)]
pub struct VoiceWebhook {
    #[serde(rename = "CallSid")]
    pub call_sid: Option<String>,
    #[serde(rename = "From")]
    pub from: Option<String>,
    #[serde(rename = "To")]
    pub to: Option<String>,
}

async fn voice_handler(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Form(webhook): Form<VoiceWebhook>,
) -> impl IntoResponse {
    info!(call_sid = ?webhook.call_sid, from = ?webhook.from, to = ?webhook.to, "Incoming call");

    let markup = match stream_url(&state.config, &headers) {
        Some(url) => {
            let greeting = state.config.assistant().markup_greeting;
            build_stream_markup_with(&url, greeting.as_deref(), &state.say)
        }
        None => {
            warn!("Cannot derive media stream URL: no public_url and no Host header");
            build_error_markup(STREAM_UNAVAILABLE, &state.say)
        }
    };

    ([(header::CONTENT_TYPE, "text/xml")], markup)
}

async fn stream_info_handler(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    match stream_url(&state.config, &headers) {
        Some(url) => (
            StatusCode::OK,
            Json(json!({
                "status": "success",
                "message": "Media stream endpoint ready",
                "ws_url": url,
            })),
        ),
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "status": "error",
                "message": "Cannot derive media stream URL",
            })),
        ),
    }
}

#[cfg(feature = "metrics")]
async fn metrics_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    match &state.metrics_handle {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed".to_string()),
    }
}

/// The WebSocket URL the platform should stream call audio to.
///
/// `gateway.public_url` wins; otherwise the URL is derived from the request's
/// `Host` and `X-Forwarded-Proto` headers.
pub fn stream_url(config: &Config, headers: &HeaderMap) -> Option<String> {
    let path = config.stream_path();

    if let Some(public) = config.gateway.as_ref().and_then(|g| g.public_url.as_deref()) {
        let base = public.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        return Some(format!("{base}{path}"));
    }

    let host = headers.get(header::HOST)?.to_str().ok()?;
    let secure = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|proto| proto.eq_ignore_ascii_case("https"));
    let scheme = if secure { "wss" } else { "ws" };
    Some(format!("{scheme}://{host}{path}"))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(%e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use phonebridge_core::config::GatewayConfig;

    fn with_public_url(url: &str) -> Config {
        Config {
            gateway: Some(GatewayConfig {
                port: 10000,
                bind: None,
                public_url: Some(url.into()),
                stream_path: "/media-stream".into(),
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_stream_url_from_public_url() {
        let headers = HeaderMap::new();
        assert_eq!(
            stream_url(&with_public_url("https://calls.example.com/"), &headers).as_deref(),
            Some("wss://calls.example.com/media-stream")
        );
        assert_eq!(
            stream_url(&with_public_url("wss://calls.example.com"), &headers).as_deref(),
            Some("wss://calls.example.com/media-stream")
        );
    }

    #[test]
    fn test_stream_url_from_host_header() {
        let config = Config::default();
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("abc.ngrok.io"));
        assert_eq!(
            stream_url(&config, &headers).as_deref(),
            Some("ws://abc.ngrok.io/media-stream")
        );

        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        assert_eq!(
            stream_url(&config, &headers).as_deref(),
            Some("wss://abc.ngrok.io/media-stream")
        );
    }

    #[test]
    fn test_stream_url_without_host() {
        assert!(stream_url(&Config::default(), &HeaderMap::new()).is_none());
    }
}

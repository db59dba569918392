//! Lilly Gateway: the thin backend the console talks to.
//!
//! Three routes: POST /api/chat (persona-shaped OpenAI proxy), GET
//! /api/weather (Open-Meteo proxy with quiet failure), GET /health. The
//! gateway keeps no chat state; everything durable lives client-side.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, Query, State},
    http::{Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lilly_core::bridge::CompletionBridge;
use lilly_core::persona::{system_prompt, Persona, PersonaWire};
use lilly_core::prefs::DEFAULT_SESSION;

mod config;
mod ratelimit;
mod weather;

use config::GatewayConfig;
use ratelimit::RateLimiter;

#[derive(Clone)]
struct AppState {
    config: Arc<GatewayConfig>,
    bridge: Option<Arc<CompletionBridge>>,
    limiter: Arc<RateLimiter>,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    persona: Option<PersonaWire>,
    #[serde(default)]
    session: Option<String>,
}

#[derive(Deserialize)]
struct WeatherQuery {
    #[serde(default)]
    city: Option<String>,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(GatewayConfig::from_env());
    let bridge = match config.api_key.clone() {
        Some(key) => Some(Arc::new(
            CompletionBridge::new(key).with_model(&config.model),
        )),
        None => {
            tracing::warn!(
                target: "lilly::gateway",
                "OPENAI_API_KEY is not set; /api/chat will answer 500 until it is"
            );
            None
        }
    };

    let port = config.port;
    let state = AppState {
        limiter: Arc::new(RateLimiter::new(
            config.rate_limit,
            Duration::from_secs(config.rate_window_secs),
        )),
        http: reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new()),
        config,
        bridge,
    };

    let app = build_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(err) => {
            tracing::error!(target: "lilly::gateway", %addr, error = %err, "failed to bind");
            std::process::exit(1);
        }
    };
    tracing::info!(target: "lilly::gateway", "Lilly gateway listening on http://localhost:{}", port);

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    );
    tokio::select! {
        result = server => {
            if let Err(err) = result {
                tracing::error!(target: "lilly::gateway", error = %err, "server error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(target: "lilly::gateway", "shutdown signal received");
        }
    }
}

fn build_app(state: AppState) -> Router {
    let allowed = state.config.allowed_origins.clone();
    // An empty origin list means open CORS, matching a hosted deployment
    // that fronts the gateway itself.
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &axum::http::HeaderValue, _| {
            if allowed.is_empty() {
                return true;
            }
            let s = origin.to_str().unwrap_or("");
            allowed.iter().any(|o| o == s)
        }))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    let mut app = Router::new()
        .route("/api/chat", post(chat))
        .route("/api/weather", get(weather_proxy))
        .route("/health", get(health));

    // Optional static web UI, served beside the API.
    if let Some(dir) = state.config.frontend_dir.clone() {
        app = app
            .route_service("/", ServeFile::new(dir.join("index.html")))
            .nest_service("/ui", ServeDir::new(dir));
    }

    app.fallback(not_found)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(cors)
        .with_state(state)
}

/// Per-IP fixed-window limiter ahead of every route. Requests without a peer
/// address (oneshot tests, some proxies) count against loopback.
async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip())
        .unwrap_or(IpAddr::from([127, 0, 0, 1]));

    if !state.limiter.check(ip) {
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "تم تجاوز حد الطلبات. أعيدي المحاولة بعد قليل." })),
        )
            .into_response();
    }
    next.run(request).await
}

/// POST /api/chat: one completion turn. The request carries everything the
/// reply depends on; nothing is stored here.
async fn chat(State(state): State<AppState>, Json(body): Json<ChatRequest>) -> Response {
    let message = body.message.as_deref().map(str::trim).unwrap_or("");
    if message.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "رسالة المستخدم مطلوبة." })),
        )
            .into_response();
    }

    let Some(bridge) = state.bridge.as_ref() else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "مفتاح OpenAI غير مضبوط في الخادم." })),
        )
            .into_response();
    };

    let persona = Persona::from_wire(&body.persona.unwrap_or_default());
    let session = body
        .session
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SESSION);
    tracing::info!(
        target: "lilly::gateway",
        session,
        model = bridge.model(),
        "chat turn"
    );

    match bridge.complete(&system_prompt(&persona), message).await {
        Ok(reply) => Json(json!({ "reply": reply })).into_response(),
        Err(err) => {
            tracing::error!(target: "lilly::gateway", error = %err, "chat turn failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": err.user_message() })),
            )
                .into_response()
        }
    }
}

/// GET /api/weather?city=Riyadh. Always HTTP 200; failures collapse to
/// `{"text": "—"}` so the client header degrades quietly.
async fn weather_proxy(
    State(state): State<AppState>,
    Query(query): Query<WeatherQuery>,
) -> Response {
    let city = query
        .city
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(weather::DEFAULT_CITY);
    Json(weather::current_conditions(&state.http, city).await).into_response()
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "ok": true,
        "model": state.config.model,
        "env": state.config.env,
        "time": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "المسار غير موجود." })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::util::ServiceExt;

    fn test_state(api_key: Option<&str>, rate_limit: u32) -> AppState {
        let config = GatewayConfig {
            port: 0,
            api_key: api_key.map(|k| k.to_string()),
            model: "gpt-4o".to_string(),
            allowed_origins: Vec::new(),
            env: "development".to_string(),
            frontend_dir: None,
            rate_limit,
            rate_window_secs: 60,
        };
        AppState {
            bridge: config
                .api_key
                .clone()
                .map(|key| Arc::new(CompletionBridge::new(key).with_model(&config.model))),
            limiter: Arc::new(RateLimiter::new(
                config.rate_limit,
                Duration::from_secs(config.rate_window_secs),
            )),
            http: reqwest::Client::new(),
            config: Arc::new(config),
        }
    }

    async fn body_json(res: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_model_and_env() {
        let app = build_app(test_state(None, 60));
        let req = Request::builder()
            .method("GET")
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let json = body_json(res).await;
        assert_eq!(json["ok"], true);
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["env"], "development");
        assert!(json["time"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_chat_rejects_blank_message() {
        let app = build_app(test_state(Some("sk-test"), 60));
        for payload in [json!({}), json!({ "message": "   " })] {
            let req = Request::builder()
                .method("POST")
                .uri("/api/chat")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap();
            let res = app.clone().oneshot(req).await.unwrap();
            assert_eq!(res.status(), StatusCode::BAD_REQUEST);
            let json = body_json(res).await;
            assert_eq!(json["error"], "رسالة المستخدم مطلوبة.");
        }
    }

    #[tokio::test]
    async fn test_chat_without_key_is_500_with_arabic_error() {
        let app = build_app(test_state(None, 60));
        let req = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(json!({ "message": "مرحبا" }).to_string()))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(res).await;
        assert_eq!(json["error"], "مفتاح OpenAI غير مضبوط في الخادم.");
    }

    #[tokio::test]
    async fn test_unknown_route_is_json_404() {
        let app = build_app(test_state(None, 60));
        let req = Request::builder()
            .method("GET")
            .uri("/api/nope")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let json = body_json(res).await;
        assert_eq!(json["error"], "المسار غير موجود.");
    }

    #[tokio::test]
    async fn test_rate_limit_answers_429() {
        let app = build_app(test_state(None, 2));
        for _ in 0..2 {
            let req = Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap();
            let res = app.clone().oneshot(req).await.unwrap();
            assert_eq!(res.status(), StatusCode::OK);
        }
        let req = Request::builder()
            .method("GET")
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        let json = body_json(res).await;
        assert_eq!(json["error"], "تم تجاوز حد الطلبات. أعيدي المحاولة بعد قليل.");
    }
}

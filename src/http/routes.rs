//! HTTP route definitions

use axum::{
    extract::State,
    http::{header, HeaderValue, Method},
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::app::AppState;
use crate::config::Config;
use crate::util::time::{unix_millis, uptime_secs};
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors_config = state.config.clone();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &axum::http::request::Parts| {
                origin
                    .to_str()
                    .map(|o| origin_allowed(o, &cors_config))
                    .unwrap_or(false)
            },
        ))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Origin policy: anything goes in development; production allows the
/// configured origins plus Vercel preview deployments. Requests without an
/// Origin header are not subject to CORS and never reach this check.
fn origin_allowed(origin: &str, config: &Config) -> bool {
    if config.is_development() {
        return true;
    }
    if config.allowed_origins.iter().any(|allowed| allowed == origin) {
        return true;
    }
    origin
        .strip_prefix("https://")
        .map(|host| host.ends_with(".vercel.app"))
        .unwrap_or(false)
}

#[derive(Serialize)]
struct RootResponse {
    message: &'static str,
}

async fn root_handler() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Game Server Running",
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    env: String,
    uptime: u64,
    timestamp: u64,
    rooms: usize,
    players: usize,
    tick_rate: u32,
    allowed_origins: Vec<String>,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        env: state.config.env.clone(),
        uptime: uptime_secs(),
        timestamp: unix_millis(),
        rooms: state.rooms.room_count(),
        players: state.rooms.total_players(),
        tick_rate: state.config.tick_rate,
        allowed_origins: state.config.allowed_origins.clone(),
    })
}

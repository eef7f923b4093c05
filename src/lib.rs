pub mod access_log;
pub mod api;
pub mod app_state;
pub mod config;
pub mod content_type;
pub mod entitlement;
pub mod grant;
pub mod signed_url;
pub mod storage;
pub mod stream_token;

use axum::Router;
use axum::extract::Extension;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::cors::Any;
use tower_http::cors::CorsLayer;
use tracing::info;

//
// Re-export
//
pub use access_log::{AccessDecision, AccessLogEntry, AccessLogger};
pub use api::{create_grant, create_stream_grant, healthz, log_request_errors, serve_media};
pub use app_state::AppState;
pub use config::Config;
pub use content_type::content_type_for_key;
pub use entitlement::{AllowAll, EntitlementCheck, HttpEntitlement};
pub use grant::{
    CreateGrantRequest, CreateGrantResponse, CreateStreamGrantRequest, CreateStreamGrantResponse,
    GrantClaims, GrantError, GrantManager, GrantSigner, GrantState, IssuedGrant, USER_ID_HEADER,
    clamp_expiry, media_auth_middleware,
};
pub use signed_url::{SignedMediaUrl, SignedUrlService};
pub use storage::{StorageBackend, StorageConfig, StorageManager};
pub use stream_token::{SignedStreamToken, StreamTokenIssuer};

/// Expiration bounds for every credential this service mints, in seconds.
/// Requested lifetimes outside [MIN, MAX] are clamped, never rejected.
pub const MIN_URL_EXPIRATION: u64 = 60;
pub const DEFAULT_URL_EXPIRATION: u64 = 3_600;
pub const MAX_URL_EXPIRATION: u64 = 86_400;

pub async fn run(config: Config) {
    // Ensure we're in a proper async context by yielding once
    tokio::task::yield_now().await;

    let listen_on_port = config.listen_on_port;
    let internal_port = config.internal_port;

    let state = AppState::new(&config)
        .await
        .expect("Failed to create app state");

    // CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Verifier state for the media middleware
    let grant_state = GrantState {
        grant_manager: state.grant_manager.clone(),
        signed_urls: state.signed_urls.clone(),
        access_log: state.access_log.clone(),
    };

    // External routes (credential-gated media delivery)
    let external_app = Router::new()
        .route("/media/{content_id}/{*storage_key}", get(serve_media))
        .route_layer(axum::middleware::from_fn_with_state(
            grant_state,
            media_auth_middleware,
        ))
        .layer(axum::middleware::from_fn(log_request_errors))
        .layer(cors.clone())
        .layer(Extension(state.clone()));

    // Internal routes (grant minting, trusted network only)
    let internal_app = Router::new()
        .route("/grants", post(create_grant))
        .route("/grants/stream", post(create_stream_grant))
        .route("/healthz", get(healthz))
        .layer(axum::middleware::from_fn(log_request_errors))
        .layer(cors)
        .layer(Extension(state));

    // Start external API server
    let external_addr = format!("0.0.0.0:{listen_on_port}");
    info!("External media API listening on {external_addr}");
    let external_listener = TcpListener::bind(&external_addr)
        .await
        .expect("Failed to bind external API");

    // Start internal API server
    let internal_addr = format!("0.0.0.0:{internal_port}");
    info!("Internal grant API listening on {internal_addr}");
    let internal_listener = TcpListener::bind(&internal_addr)
        .await
        .expect("Failed to bind internal API");

    // Run both servers concurrently
    tokio::select! {
        result = axum::serve(external_listener, external_app) => {
            result.expect("External API server error");
        }
        result = axum::serve(internal_listener, internal_app) => {
            result.expect("Internal API server error");
        }
    }
}

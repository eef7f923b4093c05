pub mod middleware;
pub mod routes;

pub use middleware::log_request_errors;
pub use routes::{create_grant, create_stream_grant, healthz, serve_media};

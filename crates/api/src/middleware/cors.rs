use axum::http::Method;
use tower_http::cors::{Any, CorsLayer};

/// The service only serves reads, so only GET is allowed cross-origin.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any)
}

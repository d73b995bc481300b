use axum::http::{header, Method};
use tower_http::cors::{Any, CorsLayer};

/// Candidate test pages are served from other origins; the admin API is
/// guarded by bearer tokens, not cookies.
pub fn permissive_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(Any)
}

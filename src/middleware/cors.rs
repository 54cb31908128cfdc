//! CORS policy for the calculator front-ends.
//!
//! Note:
//! - CORS is enforced by browsers. Native apps and server-to-server calls are not
//!   restricted by it.
//! - Applied at the Router level (not inside handlers).
//!
//! Policy (defaults, see `config.rs`):
//! - Allow-Origin: exact match against the configured list, echoed back.
//! - Credentials: allowed.
//! - Methods: GET, POST, OPTIONS.
//! - Headers: any. With credentials this is served by mirroring the requested headers,
//!   since browsers reject `Access-Control-Allow-Headers: *` on credentialed requests.

use axum::Router;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};

use crate::config::{AllowList, CorsConfig};

/// Build the `CorsLayer` for a policy.
///
/// IMPORTANT:
/// - tower-http panics when `allow_credentials(true)` meets a literal `*`.
///   `Config` rejects a wildcard origin with credentials, and wildcard methods/headers
///   are switched to mirroring here.
pub fn layer(cors: &CorsConfig) -> CorsLayer {
    let allow_origin = match &cors.allowed_origins {
        AllowList::Any => AllowOrigin::from(Any),
        AllowList::Only(origins) => AllowOrigin::list(origins.iter().cloned()),
    };

    let allow_methods = match &cors.allowed_methods {
        AllowList::Any if cors.allow_credentials => AllowMethods::mirror_request(),
        AllowList::Any => AllowMethods::from(Any),
        AllowList::Only(methods) => AllowMethods::list(methods.iter().cloned()),
    };

    let allow_headers = match &cors.allowed_headers {
        AllowList::Any if cors.allow_credentials => AllowHeaders::mirror_request(),
        AllowList::Any => AllowHeaders::from(Any),
        AllowList::Only(headers) => AllowHeaders::list(headers.iter().cloned()),
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(allow_methods)
        .allow_headers(allow_headers)
        .allow_credentials(cors.allow_credentials)
        .max_age(cors.max_age)
}

/// Apply the CORS policy to the given Router.
pub fn apply(router: Router, cors: &CorsConfig) -> Router {
    router.layer(layer(cors))
}

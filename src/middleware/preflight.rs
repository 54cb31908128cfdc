//! Strict preflight handling.
//!
//! `CorsLayer` answers every preflight with 200 and leaves enforcement to the browser.
//! This guard sits in front of it and turns a preflight the policy cannot satisfy into
//! `400 Bad Request`, naming what failed (origin, method, headers).
//!
//! Only real preflights are inspected: `OPTIONS` carrying both `Origin` and
//! `Access-Control-Request-Method`. Everything else is handed to the inner layers
//! unchanged. `CorsLayer` still answers any other `OPTIONS` itself (200, no
//! allow-origin for unlisted origins) rather than routing it to a handler.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Request, State},
    http::{
        HeaderMap, HeaderName, Method,
        header::{self, ACCESS_CONTROL_REQUEST_HEADERS, ACCESS_CONTROL_REQUEST_METHOD, ORIGIN},
    },
    middleware::{self, Next},
    response::{IntoResponse, Response},
};

use crate::config::CorsConfig;
use crate::error::AppError;

/// CORS-safelisted request headers, accepted regardless of the configured list.
const SAFELISTED_HEADERS: [HeaderName; 4] = [
    header::ACCEPT,
    header::ACCEPT_LANGUAGE,
    header::CONTENT_LANGUAGE,
    header::CONTENT_TYPE,
];

pub fn is_preflight(method: &Method, headers: &HeaderMap) -> bool {
    method == Method::OPTIONS
        && headers.contains_key(ORIGIN)
        && headers.contains_key(ACCESS_CONTROL_REQUEST_METHOD)
}

/// Check a preflight's headers against the policy.
pub fn check(cors: &CorsConfig, headers: &HeaderMap) -> Result<(), AppError> {
    let mut failures = Vec::new();

    let origin_allowed = headers
        .get(ORIGIN)
        .is_some_and(|origin| cors.allowed_origins.allows(origin));
    if !origin_allowed {
        failures.push("origin");
    }

    let method_allowed = headers
        .get(ACCESS_CONTROL_REQUEST_METHOD)
        .and_then(|v| Method::from_bytes(v.as_bytes()).ok())
        .is_some_and(|method| cors.allowed_methods.allows(&method));
    if !method_allowed {
        failures.push("method");
    }

    if let Some(requested) = headers.get(ACCESS_CONTROL_REQUEST_HEADERS)
        && !cors.allowed_headers.is_any()
        && !requested_headers_allowed(cors, requested.as_bytes())
    {
        failures.push("headers");
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(AppError::preflight_rejected(failures))
    }
}

fn requested_headers_allowed(cors: &CorsConfig, requested: &[u8]) -> bool {
    requested
        .split(|b| *b == b',')
        .map(|name| name.trim_ascii())
        .filter(|name| !name.is_empty())
        .all(|name| {
            HeaderName::from_bytes(name).is_ok_and(|name| {
                SAFELISTED_HEADERS.contains(&name) || cors.allowed_headers.allows(&name)
            })
        })
}

async fn guard(State(cors): State<Arc<CorsConfig>>, req: Request, next: Next) -> Response {
    if is_preflight(req.method(), req.headers())
        && let Err(err) = check(&cors, req.headers())
    {
        tracing::debug!(
            origin = ?req.headers().get(ORIGIN),
            requested_method = ?req.headers().get(ACCESS_CONTROL_REQUEST_METHOD),
            error = %err,
            "preflight rejected"
        );
        return err.into_response();
    }

    next.run(req).await
}

/// Put the preflight guard in front of the given Router.
///
/// Must be layered after (outside) `cors::apply` so it sees preflights first.
pub fn apply(router: Router, cors: Arc<CorsConfig>) -> Router {
    router.layer(middleware::from_fn_with_state(cors, guard))
}

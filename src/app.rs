/*
 * Responsibility
 * - tracing / panic hook の初期化
 * - Config読み込み → Router 組み立て
 * - Middleware の適用 (http / preflight / CORS)
 * - axum::serve() で起動
 */
use std::{panic, process, sync::Arc};

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    api,
    config::{Config, CorsConfig},
    middleware,
    state::AppState,
};

fn init_tracing() {
    // RUST_LOG=info,fwv_api=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        tracing::error!(?info, "panic");

        // Development: crash the whole process so it gets noticed.
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env().context("failed to load configuration")?;

    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting API in {:?} mode on {}",
        config.app_env,
        config.addr
    );
    log_cors_policy(&config.cors);

    let state = AppState::new(config.app_env);
    let app = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("failed to bind {}", config.addr))?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

fn log_cors_policy(cors: &CorsConfig) {
    tracing::info!(
        origins = ?cors.allowed_origins,
        credentials = cors.allow_credentials,
        methods = ?cors.allowed_methods,
        headers = ?cors.allowed_headers,
        max_age_secs = cors.max_age.as_secs(),
        "CORS policy"
    );
}

pub fn build_router(state: AppState, config: &Config) -> Router {
    async fn health() -> &'static str {
        "ok"
    }

    let router = Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api::v1::routes())
        .with_state(state);

    // Each `apply` wraps the previous one, so the last applied runs first.
    let router = middleware::cors::apply(router, &config.cors);
    let router = middleware::preflight::apply(router, Arc::new(config.cors.clone()));
    middleware::http::apply(router, &config.http)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode, header},
        response::Response,
    };
    use tower::ServiceExt;

    use super::*;
    use crate::config::DEFAULT_ALLOWED_ORIGINS;

    fn default_app() -> Router {
        let config = Config::from_lookup(|_| None).unwrap();
        build_router(AppState::new(config.app_env), &config)
    }

    async fn send(req: Request<Body>) -> Response {
        default_app().oneshot(req).await.unwrap()
    }

    fn preflight(origin: &str, method: &str) -> Request<Body> {
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/v1/health")
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, method)
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn health_endpoints_respond() {
        let res = send(Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(res.status(), StatusCode::OK);

        let res = send(Request::get("/api/v1/health").body(Body::empty()).unwrap()).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().contains_key("x-request-id"));

        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["env"], "development");
    }

    #[tokio::test]
    async fn listed_origins_are_allowed_with_credentials() {
        for origin in DEFAULT_ALLOWED_ORIGINS {
            let res = send(
                Request::get("/api/v1/health")
                    .header(header::ORIGIN, origin)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;

            assert_eq!(res.status(), StatusCode::OK);
            assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], origin);
            assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        }
    }

    #[tokio::test]
    async fn unlisted_origin_is_not_allowed() {
        let res = send(
            Request::get("/api/v1/health")
                .header(header::ORIGIN, "https://evil.example")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert!(res.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }

    #[tokio::test]
    async fn preflight_for_allowed_method_succeeds() {
        for origin in DEFAULT_ALLOWED_ORIGINS {
            let res = send(preflight(origin, "POST")).await;

            assert!(res.status().is_success(), "{origin}: {}", res.status());
            assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], origin);
            assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");

            let methods = res.headers()[header::ACCESS_CONTROL_ALLOW_METHODS]
                .to_str()
                .unwrap();
            assert!(methods.contains("POST"));
            assert!(!methods.contains("DELETE"));
        }
    }

    #[tokio::test]
    async fn preflight_for_delete_is_rejected() {
        let res = send(preflight("http://localhost:3000", "DELETE")).await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(res.headers().get(header::ACCESS_CONTROL_ALLOW_METHODS).is_none());
    }

    #[tokio::test]
    async fn preflight_from_unlisted_origin_is_rejected() {
        let res = send(preflight("https://evil.example", "GET")).await;

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert!(res.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());

        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "CORS_PREFLIGHT_REJECTED");
        assert_eq!(body["error"]["message"], "disallowed CORS origin");
    }

    #[tokio::test]
    async fn any_requested_header_is_accepted() {
        let mut req = preflight("https://fwv-calculators.vercel.app", "POST");
        req.headers_mut().insert(
            header::ACCESS_CONTROL_REQUEST_HEADERS,
            header::HeaderValue::from_static("authorization,x-calculator-id"),
        );

        let res = send(req).await;

        assert!(res.status().is_success());
        assert_eq!(
            res.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS],
            "authorization,x-calculator-id"
        );
    }

    #[tokio::test]
    async fn wildcard_methods_from_env_mirror_the_requested_method() {
        let config = Config::from_lookup(|key| match key {
            "CORS_ALLOWED_METHODS" => Some("*".to_string()),
            "CORS_ALLOW_CREDENTIALS" => Some("true".to_string()),
            _ => None,
        })
        .unwrap();
        let app = build_router(AppState::new(config.app_env), &config);

        let res = app
            .oneshot(preflight("http://localhost:3000", "PATCH"))
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_METHODS], "PATCH");
        assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    }
}

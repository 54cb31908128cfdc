/*
 * Responsibility
 * - 環境変数 / .env からの設定読み込み (PORT, APP_ENV, CORS, HTTP limits)
 * - 設定値のバリデーション (不正なら起動失敗)
 */
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use axum::http::{HeaderName, HeaderValue, Method};
use thiserror::Error;
use url::Url;

/// Origins allowed when `CORS_ALLOWED_ORIGINS` is not set.
pub const DEFAULT_ALLOWED_ORIGINS: [&str; 4] = [
    "http://localhost:3000",
    "https://fwv-calculators.vercel.app",
    "https://fosterwealthventures.store",
    "https://www.fosterwealthventures.store",
];

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_MAX_AGE_SECONDS: u64 = 600;
const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_BODY_LIMIT_BYTES: usize = 1024 * 1024;

const KNOWN_METHODS: [Method; 9] = [
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::CONNECT,
    Method::OPTIONS,
    Method::TRACE,
    Method::PATCH,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn parse(value: Option<&str>) -> Self {
        match value.unwrap_or("development").to_ascii_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid configuration: {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// `*` or an explicit, de-duplicated list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowList<T> {
    Any,
    Only(Vec<T>),
}

impl<T: PartialEq> AllowList<T> {
    pub fn allows(&self, item: &T) -> bool {
        match self {
            Self::Any => true,
            Self::Only(items) => items.contains(item),
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: AllowList<HeaderValue>,
    pub allow_credentials: bool,
    pub allowed_methods: AllowList<Method>,
    pub allowed_headers: AllowList<HeaderName>,
    pub max_age: Duration,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: AllowList::Only(
                DEFAULT_ALLOWED_ORIGINS
                    .into_iter()
                    .map(HeaderValue::from_static)
                    .collect(),
            ),
            allow_credentials: true,
            allowed_methods: AllowList::Only(vec![Method::GET, Method::POST, Method::OPTIONS]),
            allowed_headers: AllowList::Any,
            max_age: Duration::from_secs(DEFAULT_MAX_AGE_SECONDS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub request_timeout: Duration,
    pub body_limit_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECONDS),
            body_limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,
    pub cors: CorsConfig,
    pub http: HttpConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match var("PORT") {
            Some(raw) => parse_number::<u16>("PORT", &raw)?,
            None => DEFAULT_PORT,
        };
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));

        let app_env = AppEnv::parse(var("APP_ENV").as_deref());

        let defaults = CorsConfig::default();

        let allowed_origins = match var("CORS_ALLOWED_ORIGINS") {
            Some(raw) => parse_list("CORS_ALLOWED_ORIGINS", &raw, parse_origin)?,
            None => defaults.allowed_origins,
        };
        if matches!(&allowed_origins, AllowList::Only(origins) if origins.is_empty()) {
            return Err(ConfigError::invalid(
                "CORS_ALLOWED_ORIGINS",
                "at least one origin is required",
            ));
        }

        let allow_credentials = match var("CORS_ALLOW_CREDENTIALS") {
            Some(raw) => parse_bool("CORS_ALLOW_CREDENTIALS", &raw)?,
            None => defaults.allow_credentials,
        };
        if allow_credentials && allowed_origins.is_any() {
            return Err(ConfigError::invalid(
                "CORS_ALLOWED_ORIGINS",
                "`*` cannot be combined with CORS_ALLOW_CREDENTIALS=true",
            ));
        }

        let allowed_methods = match var("CORS_ALLOWED_METHODS") {
            Some(raw) => parse_list("CORS_ALLOWED_METHODS", &raw, parse_method)?,
            None => defaults.allowed_methods,
        };
        if matches!(&allowed_methods, AllowList::Only(methods) if methods.is_empty()) {
            return Err(ConfigError::invalid(
                "CORS_ALLOWED_METHODS",
                "at least one method is required",
            ));
        }

        let allowed_headers = match var("CORS_ALLOWED_HEADERS") {
            Some(raw) => parse_list("CORS_ALLOWED_HEADERS", &raw, parse_header)?,
            None => defaults.allowed_headers,
        };

        let max_age = match var("CORS_MAX_AGE_SECONDS") {
            Some(raw) => Duration::from_secs(parse_number("CORS_MAX_AGE_SECONDS", &raw)?),
            None => defaults.max_age,
        };

        let http_defaults = HttpConfig::default();

        let request_timeout = match var("REQUEST_TIMEOUT_SECONDS") {
            Some(raw) => match parse_number::<u64>("REQUEST_TIMEOUT_SECONDS", &raw)? {
                0 => {
                    return Err(ConfigError::invalid(
                        "REQUEST_TIMEOUT_SECONDS",
                        "must be greater than zero",
                    ));
                }
                secs => Duration::from_secs(secs),
            },
            None => http_defaults.request_timeout,
        };

        let body_limit_bytes = match var("BODY_LIMIT_BYTES") {
            Some(raw) => parse_number("BODY_LIMIT_BYTES", &raw)?,
            None => http_defaults.body_limit_bytes,
        };

        Ok(Self {
            addr,
            app_env,
            cors: CorsConfig {
                allowed_origins,
                allow_credentials,
                allowed_methods,
                allowed_headers,
                max_age,
            },
            http: HttpConfig {
                request_timeout,
                body_limit_bytes,
            },
        })
    }
}

fn parse_list<T, P>(
    key: &'static str,
    raw: &str,
    parse_item: P,
) -> Result<AllowList<T>, ConfigError>
where
    T: PartialEq,
    P: Fn(&str) -> Result<T, String>,
{
    let entries: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if entries.contains(&"*") {
        return Ok(AllowList::Any);
    }

    let mut items = Vec::with_capacity(entries.len());
    for entry in entries {
        let item = parse_item(entry).map_err(|reason| ConfigError::invalid(key, reason))?;
        if items.contains(&item) {
            tracing::warn!(key, entry, "duplicate entry ignored");
            continue;
        }
        items.push(item);
    }

    Ok(AllowList::Only(items))
}

/// Normalizes to the serialized form browsers send in `Origin`
/// (lowercase host, default port dropped, no trailing slash).
fn parse_origin(raw: &str) -> Result<HeaderValue, String> {
    let url = Url::parse(raw).map_err(|e| format!("`{raw}` is not a valid origin: {e}"))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("`{raw}` must use http or https"));
    }
    if url.host_str().is_none() {
        return Err(format!("`{raw}` has no host"));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(format!("`{raw}` must not contain credentials"));
    }
    if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
        return Err(format!("`{raw}` must not contain a path, query, or fragment"));
    }

    HeaderValue::from_str(&url.origin().ascii_serialization())
        .map_err(|_| format!("`{raw}` is not a valid header value"))
}

fn parse_method(raw: &str) -> Result<Method, String> {
    let upper = raw.to_ascii_uppercase();
    KNOWN_METHODS
        .iter()
        .find(|m| m.as_str() == upper)
        .cloned()
        .ok_or_else(|| format!("unknown method `{raw}`"))
}

fn parse_header(raw: &str) -> Result<HeaderName, String> {
    HeaderName::from_bytes(raw.as_bytes()).map_err(|_| format!("invalid header name `{raw}`"))
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(key, format!("`{raw}` is not a boolean"))),
    }
}

fn parse_number<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::invalid(key, format!("`{raw}` is not a valid number")))
}

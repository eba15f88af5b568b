//! L1 response cache middleware.
//!
//! Caches GET requests to public routes and serves cached responses.
//! Requests carrying a preview session always reach the handler, and responses
//! that set cookies or opt out with `no-store` are never stored.

use std::{sync::Arc, time::Instant};

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderValue, Method, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use metrics::counter;
use tracing::{debug, instrument};

use super::{CacheConfig, L1Store, keys::L1Key, store::CachedResponse};

const METRIC_L1_HIT: &str = "vetrina_cache_l1_hit_total";
const METRIC_L1_MISS: &str = "vetrina_cache_l1_miss_total";
const MAX_CACHED_BODY_BYTES: usize = 1024 * 1024;

/// Shared cache state for middleware.
#[derive(Clone)]
pub struct CacheState {
    pub config: CacheConfig,
    pub l1: Arc<L1Store>,
    /// Cookie whose presence marks a request as personalised.
    pub bypass_cookie: &'static str,
}

impl CacheState {
    pub fn new(config: CacheConfig, bypass_cookie: &'static str) -> Self {
        let l1 = Arc::new(L1Store::new(&config));
        Self {
            config,
            l1,
            bypass_cookie,
        }
    }
}

/// Middleware for L1 response caching.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(cache): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !cache.config.enable_l1_cache || request.method() != Method::GET {
        return next.run(request).await;
    }

    // Skip datastar streaming requests (SSE)
    if request.headers().contains_key("datastar-request") {
        return next.run(request).await;
    }

    if has_cookie(request.headers(), cache.bypass_cookie) {
        debug!(
            target = "vetrina::cache",
            cache = "l1",
            outcome = "bypass",
            "preview session present, skipping cache"
        );
        return next.run(request).await;
    }

    let key = L1Key::new(
        request.uri().path(),
        request.uri().query().unwrap_or_default(),
    );

    if let Some(cached) = cache.l1.get(&key) {
        counter!(METRIC_L1_HIT).increment(1);
        debug!(
            target = "vetrina::cache",
            cache = "l1",
            outcome = "hit",
            "serving cached response"
        );
        return build_response(cached);
    }

    counter!(METRIC_L1_MISS).increment(1);
    debug!(
        target = "vetrina::cache",
        cache = "l1",
        outcome = "miss",
        "cache miss, executing handler"
    );

    let response = next.run(request).await;
    if !is_storable(&response) {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_CACHED_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };

    let cached = CachedResponse {
        status: parts.status.as_u16(),
        headers: parts
            .headers
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect(),
        body: bytes.clone(),
        stored_at: Instant::now(),
    };
    cache.l1.set(key, cached);

    Response::from_parts(parts, Body::from(bytes))
}

fn has_cookie(headers: &HeaderMap, name: &str) -> bool {
    CookieJar::from_headers(headers).get(name).is_some()
}

/// Only plain 200 responses that neither set cookies nor forbid storage.
fn is_storable(response: &Response) -> bool {
    if response.status() != StatusCode::OK {
        return false;
    }
    let headers = response.headers();
    if headers.contains_key(header::SET_COOKIE) {
        return false;
    }
    !headers
        .get_all(header::CACHE_CONTROL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| {
            value
                .split(',')
                .any(|directive| matches!(directive.trim(), "no-store" | "private"))
        })
}

/// Build a response from cached data.
fn build_response(cached: CachedResponse) -> Response {
    let mut builder = Response::builder().status(cached.status);

    for (name, value) in cached.headers {
        if let Ok(header_value) = HeaderValue::from_str(&value) {
            builder = builder.header(name, header_value);
        }
    }

    builder
        .body(Body::from(cached.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

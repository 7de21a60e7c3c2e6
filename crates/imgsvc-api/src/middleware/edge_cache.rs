//! # Edge Cache
//!
//! A response cache in front of the variant read route. It knows nothing
//! about the Variant Index: the downstream handler is an opaque origin.
//!
//! - The cache key is the request path plus the raw query string, verbatim.
//!   `?w=50&h=50` and `?h=50&w=50` are different keys here even though the
//!   origin maps both to one variant.
//! - Only `GET` responses with status 200 or 201 are stored. Replays carry
//!   the stored body and `content-type` with status 200.
//! - Entries live for the configured TTL. At capacity, expired entries are
//!   purged first, then the oldest entry is evicted.
//! - Every `GET` response gets an `x-cache: HIT | MISS` header.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::time::Instant;

/// Response header reporting the cache outcome.
pub const X_CACHE: &str = "x-cache";

#[derive(Debug, Clone)]
struct CachedResponse {
    body: Bytes,
    content_type: Option<HeaderValue>,
    stored_at: Instant,
}

/// Shared, bounded, TTL-based response cache.
#[derive(Debug, Clone)]
pub struct EdgeCache {
    entries: Arc<Mutex<HashMap<String, CachedResponse>>>,
    ttl: Duration,
    max_entries: usize,
}

impl EdgeCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    fn lookup(&self, key: &str) -> Option<CachedResponse> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(hit) if hit.stored_at.elapsed() < self.ttl => Some(hit.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Store a response, making room first when at capacity.
    ///
    /// Making room scans the whole map (purge, then oldest), so an insert at
    /// capacity is O(`max_entries`) under the lock. Fine for the default of
    /// 1024 entries; a much larger cache wants an ordered expiry structure.
    fn insert(&self, key: String, body: Bytes, content_type: Option<HeaderValue>) {
        let mut entries = self.entries.lock();
        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            let ttl = self.ttl;
            entries.retain(|_, e| e.stored_at.elapsed() < ttl);
            if entries.len() >= self.max_entries {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, e)| e.stored_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }
        entries.insert(
            key,
            CachedResponse {
                body,
                content_type,
                stored_at: Instant::now(),
            },
        );
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

fn cache_key(request: &Request) -> String {
    let uri = request.uri();
    match uri.query() {
        Some(query) => format!("{}?{}", uri.path(), query),
        None => uri.path().to_string(),
    }
}

fn record(result: &'static str) {
    ::metrics::counter!("imgsvc_edge_cache_total", "result" => result).increment(1);
}

/// Serve cached `GET` responses, and store cacheable ones from the origin.
pub async fn edge_cache_middleware(
    State(cache): State<EdgeCache>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }

    let key = cache_key(&request);
    if let Some(hit) = cache.lookup(&key) {
        record("hit");
        tracing::debug!(key = %key, "edge cache hit");
        let mut response = Response::new(Body::from(hit.body));
        if let Some(ct) = hit.content_type {
            response.headers_mut().insert(CONTENT_TYPE, ct);
        }
        response
            .headers_mut()
            .insert(X_CACHE, HeaderValue::from_static("HIT"));
        return response;
    }

    record("miss");
    let response = next.run(request).await;
    let status = response.status();
    let (mut parts, body) = response.into_parts();
    parts
        .headers
        .insert(X_CACHE, HeaderValue::from_static("MISS"));

    if status != StatusCode::OK && status != StatusCode::CREATED {
        return Response::from_parts(parts, body);
    }

    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(key = %key, error = %e, "failed to buffer origin response");
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };
    cache.insert(key, bytes.clone(), parts.headers.get(CONTENT_TYPE).cloned());
    Response::from_parts(parts, Body::from(bytes))
}

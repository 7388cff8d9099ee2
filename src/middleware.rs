//! Cross-cutting request filtering applied around every route.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::Request,
    http::{header, HeaderValue, Method, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::{json, Map, Value};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    limit::RequestBodyLimitLayer,
    set_header::SetResponseHeaderLayer,
};
use tracing::{debug, warn};

use crate::config::SecurityConfig;

/// Per-IP request budget for the API subtree, keyed on the socket peer
/// address. Forwarding headers are client-controlled and never consulted.
pub fn with_rate_limit<S>(router: Router<S>, config: &SecurityConfig) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    if !config.rate_limit_enabled {
        return router;
    }
    let governor = GovernorConfigBuilder::default()
        .period(config.replenish_period())
        .burst_size(config.rate_limit_max.max(1))
        .finish();
    match governor {
        Some(governor) => router.layer(GovernorLayer {
            config: Arc::new(governor),
        }),
        None => {
            warn!("invalid rate limit configuration; rate limiting disabled");
            router
        }
    }
}

/// Body limit and payload sanitization.
pub fn with_request_filters<S>(router: Router<S>, config: &SecurityConfig) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let limit = config.body_limit_bytes;
    router
        .layer(middleware::from_fn(move |req: Request, next: Next| {
            sanitize(limit, req, next)
        }))
        .layer(RequestBodyLimitLayer::new(limit))
}

/// Security headers, compression and CORS.
pub fn with_response_layers<S>(router: Router<S>, config: &SecurityConfig) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let mut router = router.layer(CompressionLayer::new());

    if config.security_headers_enabled {
        router = router
            .layer(SetResponseHeaderLayer::overriding(
                header::STRICT_TRANSPORT_SECURITY,
                HeaderValue::from_static("max-age=15552000; includeSubDomains"),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::X_FRAME_OPTIONS,
                HeaderValue::from_static("SAMEORIGIN"),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::CONTENT_SECURITY_POLICY,
                HeaderValue::from_static("default-src 'self'; frame-ancestors 'self'"),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::REFERRER_POLICY,
                HeaderValue::from_static("no-referrer"),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::X_XSS_PROTECTION,
                HeaderValue::from_static("0"),
            ));
    }

    router.layer(build_cors_layer(config))
}

fn build_cors_layer(config: &SecurityConfig) -> CorsLayer {
    if config.cors_origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|s| HeaderValue::from_str(s).ok())
        .collect();
    CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .allow_origin(origins)
        .allow_credentials(true)
}

/// Rewrites the query string and JSON body before routing: duplicate query
/// parameters collapse to their last value, operator-like keys are dropped
/// and markup is neutralised.
pub async fn sanitize(limit: usize, req: Request, next: Next) -> Response {
    let (mut parts, body) = req.into_parts();

    if let Some(query) = parts.uri.query() {
        let deduped = dedupe_query(query);
        if deduped != query {
            match rebuild_uri(&parts.uri, &deduped) {
                Some(uri) => parts.uri = uri,
                None => debug!("query rewrite produced an invalid uri; left as is"),
            }
        }
    }

    let is_json = parts
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(is_json_content_type);

    if !is_json {
        return next.run(Request::from_parts(parts, body)).await;
    }

    let bytes = match to_bytes(body, limit).await {
        Ok(b) => b,
        Err(e) => {
            warn!(error = %e, "request body rejected");
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(json!({ "status": "fail", "message": "Request body too large" })),
            )
                .into_response();
        }
    };

    let body = match serde_json::from_slice::<Value>(&bytes) {
        Ok(value) => {
            let cleaned = sanitize_value(value);
            match serde_json::to_vec(&cleaned) {
                Ok(v) => {
                    parts.headers.remove(header::CONTENT_LENGTH);
                    Body::from(v)
                }
                Err(_) => Body::from(bytes),
            }
        }
        Err(_) => Body::from(bytes),
    };

    next.run(Request::from_parts(parts, body)).await
}

/// Same acceptance rule as axum's `Json` extractor: `application/json` or any
/// `application/*+json`, case-insensitive, parameters ignored.
fn is_json_content_type(value: &str) -> bool {
    let essence = value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.split_once('/') {
        Some(("application", subtype)) => subtype == "json" || subtype.ends_with("+json"),
        _ => false,
    }
}

/// Drops object keys that could be read as query operators (`$gt`,
/// `a.b`) and escapes angle brackets in every string.
pub fn sanitize_value(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(k, _)| !k.starts_with('$') && !k.contains('.'))
                .map(|(k, v)| (k, sanitize_value(v)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_value).collect()),
        Value::String(s) => Value::String(clean_string(&s)),
        other => other,
    }
}

fn clean_string(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\0' => {}
            _ => out.push(c),
        }
    }
    out
}

/// Collapses repeated query keys to their last value, keeping the position
/// of the first occurrence.
pub fn dedupe_query(query: &str) -> String {
    let mut pairs: Vec<(&str, &str)> = Vec::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        match pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(existing) => existing.1 = value,
            None => pairs.push((key, value)),
        }
    }
    pairs
        .iter()
        .map(|(k, v)| {
            if v.is_empty() {
                k.to_string()
            } else {
                format!("{k}={v}")
            }
        })
        .collect::<Vec<_>>()
        .join("&")
}

fn rebuild_uri(uri: &Uri, query: &str) -> Option<Uri> {
    let path_and_query = if query.is_empty() {
        uri.path().to_string()
    } else {
        format!("{}?{}", uri.path(), query)
    };
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(path_and_query.parse().ok()?);
    Uri::from_parts(parts).ok()
}

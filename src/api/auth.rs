//! Optional API-key guard for `/api` routes.

use super::AppState;
use crate::error::ApiError;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const API_KEY_QUERY: &str = "api_key";

/// Key from the `X-API-Key` header, else from the `api_key` query parameter.
fn provided_key(request: &Request) -> Option<String> {
    if let Some(value) = request.headers().get(API_KEY_HEADER) {
        if let Ok(key) = value.to_str() {
            return Some(key.to_string());
        }
    }

    request.uri().query().and_then(|query| {
        query.split('&').find_map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            if name != API_KEY_QUERY {
                return None;
            }
            urlencoding::decode(value).ok().map(|v| v.into_owned())
        })
    })
}

fn keys_match(provided: &str, expected: &str) -> bool {
    provided.as_bytes().ct_eq(expected.as_bytes()).into()
}

fn reject(reason: &str) -> Response {
    let mut response = ApiError::unauthorized(reason).into_response();
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("ApiKey"));
    response
}

/// Pass requests through unless a key is configured and the caller's key differs.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.api_key.as_deref() else {
        return next.run(request).await;
    };

    match provided_key(&request) {
        None => reject(
            "API key required. Provide via X-API-Key header or api_key query parameter.",
        ),
        Some(key) if !keys_match(&key, expected) => {
            tracing::debug!(path = %request.uri().path(), "rejected request with invalid API key");
            reject("Invalid API key")
        }
        Some(_) => next.run(request).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(uri: &str, header: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri(uri);
        if let Some(key) = header {
            builder = builder.header("X-API-Key", key);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn header_takes_precedence_over_query() {
        let req = request("/api/todos?api_key=from-query", Some("from-header"));
        assert_eq!(provided_key(&req).as_deref(), Some("from-header"));
    }

    #[test]
    fn query_key_is_decoded() {
        let req = request("/api/todos?limit=5&api_key=a%2Bb", None);
        assert_eq!(provided_key(&req).as_deref(), Some("a+b"));

        let req = request("/api/todos?limit=5", None);
        assert_eq!(provided_key(&req), None);
    }

    #[test]
    fn comparison_requires_exact_match() {
        assert!(keys_match("secret", "secret"));
        assert!(!keys_match("secret ", "secret"));
        assert!(!keys_match("", "secret"));
    }
}

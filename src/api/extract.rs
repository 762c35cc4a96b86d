//! Request extractors that reject with [`ApiError`] instead of plain text.

use crate::error::{ApiError, ErrorCode};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;

/// JSON body; malformed or mistyped input becomes `INVALID_JSON`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            ApiError::invalid_json("Expected request with `Content-Type: application/json`")
        }
        other => ApiError::invalid_json(other.body_text()),
    }
}

/// Query string.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(ApiQuery(value)),
            Err(rejection) => Err(query_rejection(rejection)),
        }
    }
}

/// Covers the query string as a whole, so no single field is blamed.
fn query_rejection(rejection: QueryRejection) -> ApiError {
    ApiError::new(ErrorCode::InvalidFieldValue, rejection.body_text())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Search {
        q: Option<String>,
    }

    async fn query(uri: &str) -> Result<ApiQuery<Search>, ApiError> {
        let (mut parts, _) = Request::builder().uri(uri).body(Body::empty()).unwrap().into_parts();
        ApiQuery::<Search>::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn malformed_query_has_no_field() {
        let err = query("/todos?q=milk&q=eggs").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidFieldValue);
        assert!(err.field.is_none());
        assert!(err.message.contains("duplicate field"));
    }

    #[tokio::test]
    async fn well_formed_query_passes_through() {
        let ApiQuery(search) = query("/todos?q=milk").await.unwrap();
        assert_eq!(search.q.as_deref(), Some("milk"));
    }
}

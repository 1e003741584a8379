//! Request extractors whose rejections use the service error body.
//!
//! axum's own `Json` / `Query` reject with a plain-text 400/415/422. These
//! wrappers turn every rejection into [`ServiceError::Validation`], so a
//! malformed request gets `{"error": "...", "code": "VALIDATION_FAILED"}`.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;

use crate::error::ServiceError;

/// JSON body extractor. Use in place of `axum::Json` in handlers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidJson<T>(pub T);

/// Query string extractor. Use in place of `axum::extract::Query`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidQuery<T>(pub T);

impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        ServiceError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ServiceError {
    fn from(rejection: QueryRejection) -> Self {
        ServiceError::Validation(rejection.body_text())
    }
}

impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

impl<T, S> FromRequestParts<S> for ValidQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Router;
    use serde::Deserialize;
    use tower::ServiceExt;

    use super::*;

    #[derive(Deserialize)]
    struct Counter {
        count: u32,
    }

    #[derive(Deserialize)]
    struct Params {
        #[serde(default)]
        all: bool,
    }

    fn app() -> Router {
        Router::new().route(
            "/echo",
            post(|ValidQuery(p): ValidQuery<Params>, ValidJson(b): ValidJson<Counter>| async move {
                format!("{} {}", b.count, p.all)
            }),
        )
    }

    async fn send(uri: &str, content_type: Option<&str>, body: &str) -> (StatusCode, serde_json::Value) {
        let mut req = axum::http::Request::builder().method("POST").uri(uri);
        if let Some(ct) = content_type {
            req = req.header("content-type", ct);
        }
        let resp = app()
            .oneshot(req.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 64 * 1024).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn well_formed_request_passes_through() {
        let resp = app()
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/echo?all=true")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"count":3}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        assert_eq!(&bytes[..], b"3 true");
    }

    #[tokio::test]
    async fn bad_body_is_a_json_validation_error() {
        let (status, body) = send("/echo", Some("application/json"), r#"{"count":"three"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_FAILED");
        assert!(body["error"].as_str().unwrap().contains("count"));

        let (status, body) = send("/echo", None, r#"{"count":3}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_FAILED");

        let (status, body) = send("/echo", Some("application/json"), "{").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_FAILED");
    }

    #[tokio::test]
    async fn bad_query_is_a_json_validation_error() {
        let (status, body) = send("/echo?all=maybe", Some("application/json"), r#"{"count":3}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_FAILED");
    }
}

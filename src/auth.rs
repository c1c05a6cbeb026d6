//! # Authentication and Authorization
//!
//! Bearer authentication plus owner scoping for protected endpoints. The
//! bearer token is compared in constant time against the configured token
//! list; the `X-User-Id` header names the owner whose data the request
//! operates on. Every storage call downstream is filtered by this owner
//! id, so cross-owner access is structurally impossible rather than
//! checked opportunistically.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::{ApiError, unauthorized, unauthorized_with_trace_id, validation_error};
use crate::server::AppState;
use crate::telemetry::TraceContext;

/// Owner ID wrapper for type safety
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnerId(pub Uuid);

/// Marker type for authenticated requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiAuth;

/// Extractor for the owner id from request extensions
#[derive(Debug, Clone)]
pub struct OwnerExtension(pub OwnerId);

impl FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.config)
    }
}

/// Authentication middleware that validates bearer tokens and the owner header
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let headers = request.headers().clone();

    let trace_id = request
        .extensions()
        .get::<TraceContext>()
        .map(|ctx| ctx.trace_id.clone());

    let token = extract_bearer_token(&headers, trace_id)?;
    validate_token(&config, token)?;

    let owner = extract_owner_id(&headers)?;
    tracing::debug!(owner_id = %owner.0, "authenticated request");

    let mut request = request;
    request.extensions_mut().insert(OwnerExtension(owner));
    request.extensions_mut().insert(ApiAuth);

    Ok(next.run(request).await)
}

fn extract_bearer_token<'h>(
    headers: &'h HeaderMap,
    trace_id: Option<String>,
) -> Result<&'h str, ApiError> {
    let reject = |message: &str| match trace_id.clone() {
        Some(trace_id) => unauthorized_with_trace_id(Some(message), trace_id),
        None => unauthorized(Some(message)),
    };

    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| reject("Missing Authorization header"))?
        .to_str()
        .map_err(|_| reject("Invalid Authorization header"))?;

    header
        .strip_prefix("Bearer ")
        .ok_or_else(|| reject("Authorization header must use Bearer scheme"))
}

fn validate_token(config: &AppConfig, token: &str) -> Result<(), ApiError> {
    let is_valid = config
        .api_tokens
        .iter()
        .any(|configured| ConstantTimeEq::ct_eq(token.as_bytes(), configured.as_bytes()).into());

    if is_valid {
        Ok(())
    } else {
        Err(unauthorized(Some("Invalid bearer token")))
    }
}

fn extract_owner_id(headers: &HeaderMap) -> Result<OwnerId, ApiError> {
    let header_value = headers
        .get("X-User-Id")
        .ok_or_else(|| {
            validation_error(
                "Missing required header",
                serde_json::json!({ "X-User-Id": "Required header is missing" }),
            )
        })?
        .to_str()
        .map_err(|_| {
            validation_error(
                "Invalid owner header",
                serde_json::json!({ "X-User-Id": "Header must be valid UTF-8" }),
            )
        })?;

    header_value.parse::<Uuid>().map(OwnerId).map_err(|_| {
        validation_error(
            "Invalid owner ID",
            serde_json::json!({ "X-User-Id": "Must be a valid UUID" }),
        )
    })
}

/// OpenAPI header parameter for X-User-Id
#[derive(Debug, Serialize, Deserialize, IntoParams, utoipa::ToSchema)]
#[into_params(parameter_in = Header)]
pub struct OwnerHeader {
    /// Owner identifier (UUID) that scopes the request to one user's data
    #[serde(rename = "X-User-Id")]
    #[param(rename = "X-User-Id", value_type = String)]
    pub user_id: String,
}

impl<S> FromRequestParts<S> for OwnerExtension
where
    Arc<AppConfig>: FromRef<S>,
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<OwnerExtension>()
            .cloned()
            .ok_or_else(|| {
                validation_error(
                    "Owner context missing",
                    serde_json::json!({ "X-User-Id": "Owner context not present" }),
                )
            })
    }
}

impl<S> FromRequestParts<S> for ApiAuth
where
    Arc<AppConfig>: FromRef<S>,
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ApiAuth>()
            .copied()
            .ok_or_else(|| unauthorized(Some("Authentication required")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
        routing::get,
    };
    use tower::ServiceExt;

    fn create_test_config() -> Arc<AppConfig> {
        Arc::new(AppConfig {
            api_tokens: vec!["test-token-123".to_string()],
            crypto_key: Some(vec![0u8; 32]),
            ..Default::default()
        })
    }

    async fn run_middleware(config: Arc<AppConfig>, request: Request<Body>) -> Response {
        async fn handler() -> &'static str {
            "OK"
        }

        Router::new()
            .route("/test", get(handler))
            .layer(axum::middleware::from_fn_with_state(
                Arc::clone(&config),
                auth_middleware,
            ))
            .oneshot(request)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn missing_auth_header_returns_401() {
        let config = create_test_config();
        let request = Request::builder()
            .uri("/test")
            .header("X-User-Id", Uuid::new_v4().to_string())
            .body(Body::empty())
            .unwrap();

        let response = run_middleware(config, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn invalid_auth_scheme_returns_401() {
        let config = create_test_config();
        let request = Request::builder()
            .uri("/test")
            .header("Authorization", "Basic dGVzdDoxMjM=")
            .header("X-User-Id", Uuid::new_v4().to_string())
            .body(Body::empty())
            .unwrap();

        let response = run_middleware(config, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn invalid_token_returns_401() {
        let config = create_test_config();
        let request = Request::builder()
            .uri("/test")
            .header("Authorization", "Bearer wrong-token")
            .header("X-User-Id", Uuid::new_v4().to_string())
            .body(Body::empty())
            .unwrap();

        let response = run_middleware(config, request).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn missing_owner_header_returns_400() {
        let config = create_test_config();
        let request = Request::builder()
            .uri("/test")
            .header("Authorization", "Bearer test-token-123")
            .body(Body::empty())
            .unwrap();

        let response = run_middleware(config, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn invalid_owner_uuid_returns_400() {
        let config = create_test_config();
        let request = Request::builder()
            .uri("/test")
            .header("Authorization", "Bearer test-token-123")
            .header("X-User-Id", "not-a-uuid")
            .body(Body::empty())
            .unwrap();

        let response = run_middleware(config, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn valid_request_passes_through() {
        let config = create_test_config();
        let request = Request::builder()
            .uri("/test")
            .header("Authorization", "Bearer test-token-123")
            .header("X-User-Id", Uuid::new_v4().to_string())
            .body(Body::empty())
            .unwrap();

        let response = run_middleware(config, request).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn multiple_tokens_supported() {
        let config = Arc::new(AppConfig {
            api_tokens: vec![
                "token-one".to_string(),
                "token-two".to_string(),
                "token-three".to_string(),
            ],
            crypto_key: Some(vec![0u8; 32]),
            ..Default::default()
        });

        for candidate in ["token-one", "token-two", "token-three"] {
            let request = Request::builder()
                .uri("/test")
                .header("Authorization", format!("Bearer {}", candidate))
                .header("X-User-Id", Uuid::new_v4().to_string())
                .body(Body::empty())
                .unwrap();

            let response = run_middleware(Arc::clone(&config), request).await;
            assert_eq!(response.status(), StatusCode::OK);
        }
    }
}

//! Request extractors shared by the public and admin routes.
//!
//! ```ignore
//! async fn submit(correlation_id: CorrelationId, Json(form): Json<RegistrationForm>) { .. }
//! async fn dashboard(token: BearerToken) { .. }
//! async fn live(token: Option<BearerToken>, Query(params): Query<LiveParams>) { .. }
//! ```

use crate::error::AppError;
use crate::middleware::header_correlation_id;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use uuid::Uuid;

/// The request's correlation id.
///
/// Prefers the id the correlation-id layer stored in the extensions, so the
/// handler, its span and the response header agree. Without the layer it
/// falls back to the `X-Correlation-ID` header, then to a fresh v4 id.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = match parts.extensions.get::<Uuid>() {
            Some(stored) => *stored,
            None => header_correlation_id(&parts.headers).unwrap_or_else(Uuid::new_v4),
        };
        Ok(Self(id))
    }
}

/// Session token from `Authorization: Bearer <token>`.
///
/// Rejects with 401 when the header is missing, uses another scheme, or
/// carries an empty token. Wrap it in `Option` to fall back to another
/// token source.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

impl BearerToken {
    fn parse(value: Option<&str>) -> Result<Self, AppError> {
        let value = value.ok_or_else(|| AppError::unauthorized("Missing authorization header"))?;
        let token = value
            .strip_prefix("Bearer ")
            .map(str::trim)
            .ok_or_else(|| AppError::unauthorized("Expected 'Bearer <token>' authorization"))?;

        if token.is_empty() {
            return Err(AppError::unauthorized("Empty bearer token"));
        }
        Ok(Self(token.to_owned()))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());
        Self::parse(value)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)] // Test code can use expect
mod tests {
    use super::*;
    use crate::middleware::CORRELATION_ID_HEADER;
    use axum::http::{Request, StatusCode};

    async fn correlation_id(request: Request<()>) -> Uuid {
        let (mut parts, ()) = request.into_parts();
        CorrelationId::from_request_parts(&mut parts, &())
            .await
            .expect("Infallible")
            .0
    }

    #[tokio::test]
    async fn test_correlation_id_from_header() {
        let id = Uuid::new_v4();
        let request = Request::builder()
            .header(CORRELATION_ID_HEADER, id.to_string())
            .body(())
            .expect("Valid request");

        assert_eq!(correlation_id(request).await, id);
    }

    #[tokio::test]
    async fn test_correlation_id_generated_when_absent_or_garbled() {
        let bare = Request::builder().body(()).expect("Valid request");
        assert_ne!(correlation_id(bare).await, Uuid::nil());

        let garbled = Request::builder()
            .header(CORRELATION_ID_HEADER, "신청-123")
            .body(())
            .expect("Valid request");
        assert_ne!(correlation_id(garbled).await, Uuid::nil());
    }

    #[tokio::test]
    async fn test_correlation_id_prefers_layer_extension() {
        let stored = Uuid::new_v4();
        let mut request = Request::builder()
            .header(CORRELATION_ID_HEADER, Uuid::new_v4().to_string())
            .body(())
            .expect("Valid request");
        request.extensions_mut().insert(stored);

        assert_eq!(correlation_id(request).await, stored);
    }

    #[tokio::test]
    async fn test_bearer_token() {
        let (mut parts, ()) = Request::builder()
            .header(header::AUTHORIZATION, "Bearer  session-abc ")
            .body(())
            .expect("Valid request")
            .into_parts();

        let token = BearerToken::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");
        assert_eq!(token.0, "session-abc");
    }

    #[tokio::test]
    async fn test_bearer_token_rejections() {
        for value in [None, Some("Basic dXNlcjpwYXNz"), Some("Bearer   ")] {
            let mut builder = Request::builder();
            if let Some(value) = value {
                builder = builder.header(header::AUTHORIZATION, value);
            }
            let (mut parts, ()) = builder.body(()).expect("Valid request").into_parts();

            let rejection = BearerToken::from_request_parts(&mut parts, &())
                .await
                .expect_err("Should reject");
            assert_eq!(rejection.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn test_optional_bearer_token_is_none_without_header() {
        let (mut parts, ()) = Request::builder()
            .body(())
            .expect("Valid request")
            .into_parts();

        let token = Option::<BearerToken>::from_request_parts(&mut parts, &())
            .await
            .expect("Option never rejects");
        assert!(token.is_none());
    }
}

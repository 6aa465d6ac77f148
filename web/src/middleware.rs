//! Correlation-id middleware.
//!
//! [`correlation_id_layer`] reads `X-Correlation-ID` (or mints a v4 id),
//! stores the id in the request extensions for [`CorrelationId`], runs the
//! request inside an `http_request` span, records status and latency, and
//! echoes the id on the response.
//!
//! [`CorrelationId`]: crate::extractors::CorrelationId
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/api/applications", post(submit))
//!     .layer(correlation_id_layer());
//! ```

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    response::Response,
};
use futures::future::BoxFuture;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::Instrument;
use uuid::Uuid;

/// Header carrying the correlation id in both directions.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Correlation id sent by the client, if it is a valid UUID.
pub(crate) fn header_correlation_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
}

/// Layer that tags every request with a correlation id.
#[must_use]
pub fn correlation_id_layer() -> CorrelationIdLayer {
    CorrelationIdLayer
}

/// See [`correlation_id_layer`].
#[derive(Clone, Copy, Debug)]
pub struct CorrelationIdLayer;

impl<S> Layer<S> for CorrelationIdLayer {
    type Service = CorrelationIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CorrelationIdService { inner }
    }
}

/// Service produced by [`CorrelationIdLayer`].
#[derive(Clone, Debug)]
pub struct CorrelationIdService<S> {
    inner: S,
}

impl<S> Service<Request> for CorrelationIdService<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request) -> Self::Future {
        let id = header_correlation_id(request.headers()).unwrap_or_else(Uuid::new_v4);
        request.extensions_mut().insert(id);

        let method = request.method().as_str().to_owned();
        let span = tracing::info_span!(
            "http_request",
            correlation_id = %id,
            method = %method,
            path = %request.uri().path(),
        );
        let started = Instant::now();
        let response = self.inner.call(request).instrument(span.clone());

        Box::pin(async move {
            let mut response = response.await?;
            let status = response.status().as_u16();
            let elapsed = started.elapsed();

            span.in_scope(|| {
                tracing::debug!(
                    status,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "Request completed"
                );
            });
            metrics::counter!("http.requests.total", "method" => method, "status" => status.to_string())
                .increment(1);
            metrics::histogram!("http.request.duration_seconds").record(elapsed.as_secs_f64());

            if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
                response.headers_mut().insert(CORRELATION_ID_HEADER, value);
            }
            Ok(response)
        })
    }
}

use axum::{
    extract::{MatchedPath, Request},
    response::Response,
};
use std::{future::Future, pin::Pin};
use tower::{Layer, Service};
use tracing::{info_span, Instrument};
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// A [`Layer`] that wraps every page request in a span, continuing any trace
/// context carried in the request headers and recording the response status.
#[derive(Debug, Clone, Copy)]
pub struct RequestSpanLayer;

/// The service produced by [`RequestSpanLayer`].
#[derive(Debug, Clone)]
pub struct RequestSpanner<S> {
    inner: S,
}

impl<S> Layer<S> for RequestSpanLayer {
    type Service = RequestSpanner<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestSpanner { inner }
    }
}

impl<S> Service<Request> for RequestSpanner<S>
where
    S: Service<Request, Response = Response>,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let parent_context = opentelemetry::global::get_text_map_propagator(|propagator| {
            propagator.extract(&opentelemetry_http::HeaderExtractor(req.headers()))
        });

        let method = req.method().to_string();
        let path = req.uri().path().to_owned();
        let route = req
            .extensions()
            .get::<MatchedPath>()
            .map(|r| r.as_str().to_owned())
            .unwrap_or_else(|| path.clone());
        let name = format!("{method} {route}");

        let span = info_span!(
            "page request",
            "otel.name" = name.as_str(),
            "otel.kind" = "server",
            "http.request.method" = method,
            "url.path" = path,
            "http.route" = route,
            "http.response.status_code" = tracing::field::Empty,
        );
        span.set_parent(parent_context);

        let fut = self.inner.call(req);
        Box::pin(async move {
            let res = fut.instrument(span.clone()).await;
            if let Ok(response) = &res {
                span.record("http.response.status_code", response.status().as_u16());
            }
            res
        })
    }
}

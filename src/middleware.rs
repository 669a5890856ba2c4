use std::{
    future::{ready, Ready},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Instant,
};

use actix_web::{
    body::{BodySize, BoxBody, MessageBody},
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    web::Bytes,
    Error,
};
use futures::future::LocalBoxFuture;

use crate::benchmarks::Benchmarks;

/// Times every request passing through it and records the duration once the
/// response body has been fully sent, errors included.
///
/// ```ignore
/// let benchmarks = Arc::new(Benchmarks::default());
/// App::new().wrap(BenchmarksMiddleware::new(benchmarks.clone()))
/// ```
#[derive(Debug, Clone)]
pub struct BenchmarksMiddleware {
    benchmarks: Arc<Benchmarks>,
}

impl BenchmarksMiddleware {
    pub fn new(benchmarks: Arc<Benchmarks>) -> Self {
        Self { benchmarks }
    }
}

impl<S, B> Transform<S, ServiceRequest> for BenchmarksMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<TimedBody>;
    type Error = Error;
    type Transform = BenchmarksService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(BenchmarksService {
            service,
            benchmarks: self.benchmarks.clone(),
        }))
    }
}

pub struct BenchmarksService<S> {
    service: S,
    benchmarks: Arc<Benchmarks>,
}

impl<S, B> Service<ServiceRequest> for BenchmarksService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: MessageBody + 'static,
{
    type Response = ServiceResponse<TimedBody>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let timer = RequestTimer {
            started: Instant::now(),
            benchmarks: self.benchmarks.clone(),
        };
        let response = self.service.call(req);

        // If this future is dropped (client went away) or the service fails,
        // the timer records on drop. Otherwise it rides along with the body.
        Box::pin(async move {
            let response = response.await?;
            Ok(response.map_body(move |_, body| TimedBody {
                body: body.boxed(),
                timer: Some(timer),
            }))
        })
    }
}

/// Records the elapsed time into the benchmarks exactly once, when dropped.
struct RequestTimer {
    started: Instant,
    benchmarks: Arc<Benchmarks>,
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        self.benchmarks.update(self.started.elapsed());
    }
}

/// Response body that stops the request timer when the last chunk has been
/// produced, or when the body is dropped early.
pub struct TimedBody {
    body: BoxBody,
    timer: Option<RequestTimer>,
}

impl MessageBody for TimedBody {
    type Error = Box<dyn std::error::Error>;

    fn size(&self) -> BodySize {
        self.body.size()
    }

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Bytes, Self::Error>>> {
        let next = Pin::new(&mut self.body).poll_next(cx);
        if matches!(next, Poll::Ready(None) | Poll::Ready(Some(Err(_)))) {
            self.timer.take();
        }
        next
    }
}

//! Middleware around health queries.
//!
//! Middleware has the same shape as interceptors, but wraps the query served by a [`Handler`][crate::Handler] instead
//! of a single check invocation. The innermost function runs [`Checker::check`][crate::Checker::check], and the first
//! registered middleware is the outermost one.

use std::sync::Arc;

use futures::{future::BoxFuture, FutureExt as _};
use http::Request;
use tokio::time::Instant;
use tracing::debug;

use crate::checker::CheckerResult;

/// A single step of serving a health query: given the request, produces the aggregate result.
pub type MiddlewareFn = Arc<dyn Fn(Request<()>) -> BoxFuture<'static, CheckerResult> + Send + Sync>;

/// Wraps a [`MiddlewareFn`], returning the function that should be called in its place.
pub type Middleware = Arc<dyn Fn(MiddlewareFn) -> MiddlewareFn + Send + Sync>;

/// Creates a middleware from a closure.
pub fn middleware<F>(f: F) -> Middleware
where
    F: Fn(MiddlewareFn) -> MiddlewareFn + Send + Sync + 'static,
{
    Arc::new(f)
}

pub(crate) fn compose(base: MiddlewareFn, middlewares: &[Middleware]) -> MiddlewareFn {
    middlewares.iter().rev().fold(base, |next, middleware| middleware(next))
}

/// A middleware that logs every health query along with its outcome.
pub fn basic_logger() -> Middleware {
    middleware(|next: MiddlewareFn| -> MiddlewareFn {
        Arc::new(move |request: Request<()>| {
            let next = Arc::clone(&next);
            let method = request.method().clone();
            let uri = request.uri().clone();
            async move {
                let started = Instant::now();
                let result = next(request).await;
                debug!(%method, %uri, status = %result.status, elapsed = ?started.elapsed(), "Served health query.");
                result
            }
            .boxed()
        })
    })
}

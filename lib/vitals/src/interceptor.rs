//! Interceptors around check execution.
//!
//! An interceptor receives the next function in the chain and returns a replacement with the same shape, which lets it
//! observe or alter the context and state going in, as well as the state coming out. Interceptors are composed once,
//! when the checker is built, with the first registered interceptor being the outermost one.

use std::sync::Arc;

use futures::{future::BoxFuture, FutureExt as _};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::{check::CheckContext, state::CheckState};

/// A single step of check execution: given the context, the check name, and the current state, produces the new state.
pub type InterceptorFn = Arc<dyn Fn(CheckContext, Arc<str>, CheckState) -> BoxFuture<'static, CheckState> + Send + Sync>;

/// Wraps an [`InterceptorFn`], returning the function that should be called in its place.
pub type Interceptor = Arc<dyn Fn(InterceptorFn) -> InterceptorFn + Send + Sync>;

/// Creates an interceptor from a closure.
pub fn interceptor<F>(f: F) -> Interceptor
where
    F: Fn(InterceptorFn) -> InterceptorFn + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Composes the given interceptors around `base`.
///
/// The first interceptor sees the call first and the result last.
pub fn compose<'a, I>(base: InterceptorFn, interceptors: I) -> InterceptorFn
where
    I: IntoIterator<Item = &'a Interceptor>,
    I::IntoIter: DoubleEndedIterator,
{
    interceptors
        .into_iter()
        .rev()
        .fold(base, |next, interceptor| interceptor(next))
}

/// An interceptor that logs the start and outcome of every check invocation.
pub fn basic_logger() -> Interceptor {
    interceptor(|next: InterceptorFn| -> InterceptorFn {
        Arc::new(move |ctx: CheckContext, name: Arc<str>, state: CheckState| {
            let next = Arc::clone(&next);
            async move {
                let started = Instant::now();
                debug!(check_name = %name, "Starting health check.");

                let result = next(ctx, Arc::clone(&name), state).await;
                let elapsed = started.elapsed();
                match &result.error {
                    Some(error) => warn!(check_name = %name, status = %result.status, ?elapsed, error = %error, "Health check failed."),
                    None => debug!(check_name = %name, status = %result.status, ?elapsed, "Health check completed."),
                }

                result
            }
            .boxed()
        })
    })
}

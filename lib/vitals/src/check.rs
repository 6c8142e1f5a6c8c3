use std::{fmt, future::Future, sync::Arc, time::Duration};

use futures::{future::BoxFuture, FutureExt as _};
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    error::GenericError,
    interceptor::Interceptor,
    state::CheckState,
    status::AvailabilityStatus,
};

/// The future returned by a probe.
pub type ProbeFuture = BoxFuture<'static, Result<ProbeReport, GenericError>>;

/// A type-erased probe function.
pub type Probe = Arc<dyn Fn(CheckContext) -> ProbeFuture + Send + Sync>;

/// A listener invoked when the status of a single check changes.
pub type CheckStatusListener = Arc<dyn Fn(&str, &CheckState) + Send + Sync>;

/// Context given to a probe for a single invocation.
///
/// Probes are expected to respect the deadline: once it passes, the invocation is abandoned and the cancellation token
/// is cancelled. Any result produced afterwards is discarded.
#[derive(Clone, Debug)]
pub struct CheckContext {
    check_name: Arc<str>,
    deadline: Instant,
    cancel: CancellationToken,
}

impl CheckContext {
    pub(crate) fn new(check_name: Arc<str>, timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            check_name,
            deadline: Instant::now() + timeout,
            cancel,
        }
    }

    /// Returns the name of the check being run.
    pub fn check_name(&self) -> &str {
        &self.check_name
    }

    /// Returns the instant after which this invocation is abandoned.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Returns `true` if the invocation has been abandoned.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Waits until the invocation has been abandoned.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub(crate) fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// The outcome of a successful probe invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct ProbeReport {
    status: AvailabilityStatus,
    details: Option<Value>,
}

impl ProbeReport {
    /// Creates a report with a status of `Up`.
    pub fn up() -> Self {
        Self::with_status(AvailabilityStatus::Up)
    }

    /// Creates a report with the given status.
    ///
    /// A status of `Down` marks the invocation as failed, just like returning an error would.
    pub fn with_status(status: AvailabilityStatus) -> Self {
        Self { status, details: None }
    }

    /// Attaches an arbitrary detail payload to the report.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Returns the reported status.
    pub fn status(&self) -> &AvailabilityStatus {
        &self.status
    }

    pub(crate) fn into_parts(self) -> (AvailabilityStatus, Option<Value>) {
        (self.status, self.details)
    }
}

/// A named health check.
///
/// A check pairs a probe with the parameters that control how, and how often, it is executed. Checks are registered
/// with a [`CheckerBuilder`][crate::CheckerBuilder], either as foreground checks, which run whenever the aggregate
/// result is computed, or as periodic checks, which run in the background on a fixed interval.
#[derive(Clone)]
pub struct Check {
    pub(crate) name: Arc<str>,
    pub(crate) probe: Probe,
    pub(crate) update_interval: Duration,
    pub(crate) initial_delay: Duration,
    pub(crate) timeout: Option<Duration>,
    pub(crate) max_contiguous_fails: u32,
    pub(crate) max_time_in_error: Duration,
    pub(crate) status_listener: Option<CheckStatusListener>,
    pub(crate) interceptors: Vec<Interceptor>,
}

impl Check {
    /// Creates a new check with the given name and asynchronous probe.
    pub fn new<N, F, Fut>(name: N, probe: F) -> Self
    where
        N: Into<Arc<str>>,
        F: Fn(CheckContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ProbeReport, GenericError>> + Send + 'static,
    {
        Self::from_probe(name, Arc::new(move |ctx: CheckContext| -> ProbeFuture { probe(ctx).boxed() }))
    }

    /// Creates a new check with the given name and synchronous probe.
    ///
    /// The probe is run on the blocking thread pool, so it may perform blocking I/O. If it outlives its timeout, it is
    /// left to finish in the background and its result is discarded.
    pub fn blocking<N, F>(name: N, probe: F) -> Self
    where
        N: Into<Arc<str>>,
        F: Fn(&CheckContext) -> Result<ProbeReport, GenericError> + Send + Sync + 'static,
    {
        let probe = Arc::new(probe);
        Self::from_probe(
            name,
            Arc::new(move |ctx: CheckContext| -> ProbeFuture {
                let probe = Arc::clone(&probe);
                async move {
                    match tokio::task::spawn_blocking(move || probe(&ctx)).await {
                        Ok(result) => result,
                        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                        Err(e) => Err(GenericError::new(e)),
                    }
                }
                .boxed()
            }),
        )
    }

    fn from_probe<N: Into<Arc<str>>>(name: N, probe: Probe) -> Self {
        Self {
            name: name.into(),
            probe,
            update_interval: Duration::ZERO,
            initial_delay: Duration::ZERO,
            timeout: None,
            max_contiguous_fails: 0,
            max_time_in_error: Duration::ZERO,
            status_listener: None,
            interceptors: Vec::new(),
        }
    }

    /// Returns the name of the check.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` if the check runs periodically in the background.
    pub fn is_periodic(&self) -> bool {
        !self.update_interval.is_zero()
    }

    /// Sets the maximum duration of a single invocation of this check.
    ///
    /// Defaults to the timeout configured on the checker.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the number of contiguous failures at which the check is reported as `Down`.
    ///
    /// Until then, failures are recorded but the check stays `Up`. Defaults to zero, so the check is reported as `Down`
    /// on its first failure.
    pub fn with_max_contiguous_fails(mut self, max_contiguous_fails: u32) -> Self {
        self.max_contiguous_fails = max_contiguous_fails;
        self
    }

    /// Sets how long the check may stay in error before it is reported as `Down`.
    ///
    /// Time in error is measured from the later of the first invocation and the last successful invocation. Both this
    /// threshold and the contiguous failure threshold must be crossed for the check to be reported as `Down`.
    ///
    /// Defaults to zero.
    pub fn with_max_time_in_error(mut self, max_time_in_error: Duration) -> Self {
        self.max_time_in_error = max_time_in_error;
        self
    }

    /// Sets a listener that is invoked whenever the status of this check changes.
    pub fn with_status_listener<F>(mut self, listener: F) -> Self
    where
        F: Fn(&str, &CheckState) + Send + Sync + 'static,
    {
        self.status_listener = Some(Arc::new(listener));
        self
    }

    /// Adds an interceptor that only wraps invocations of this check.
    ///
    /// Check-specific interceptors run inside any interceptors configured on the checker.
    pub fn with_interceptor(mut self, interceptor: Interceptor) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub(crate) fn schedule(mut self, update_interval: Duration, initial_delay: Duration) -> Self {
        self.update_interval = update_interval;
        self.initial_delay = initial_delay;
        self
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Check")
            .field("name", &self.name)
            .field("update_interval", &self.update_interval)
            .field("initial_delay", &self.initial_delay)
            .field("timeout", &self.timeout)
            .field("max_contiguous_fails", &self.max_contiguous_fails)
            .field("max_time_in_error", &self.max_time_in_error)
            .field("interceptors", &self.interceptors.len())
            .finish()
    }
}

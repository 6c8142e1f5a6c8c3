use std::{any::Any, panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures::FutureExt as _;
use tokio::{select, sync::Mutex, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::{
    check::{Check, CheckContext, Probe, ProbeReport},
    error::GenericError,
    generic_error,
    interceptor::{compose, Interceptor, InterceptorFn},
    state::CheckState,
    telemetry::CheckTelemetry,
};

/// A registered check, along with everything needed to execute it.
///
/// The interceptor pipeline is composed once, here, and reused for every invocation.
pub(crate) struct CheckRunner {
    check: Check,
    timeout: Duration,
    pipeline: InterceptorFn,
    telemetry: CheckTelemetry,
}

impl CheckRunner {
    pub fn new(check: Check, default_timeout: Duration, interceptors: &[Interceptor]) -> Self {
        let timeout = check.timeout.unwrap_or(default_timeout);
        let invoker = probe_invoker(&check, timeout);
        let pipeline = compose(invoker, interceptors.iter().chain(check.interceptors.iter()));
        let telemetry = CheckTelemetry::new(&check.name);

        Self {
            check,
            timeout,
            pipeline,
            telemetry,
        }
    }

    pub fn name(&self) -> &str {
        &self.check.name
    }

    pub fn is_periodic(&self) -> bool {
        self.check.is_periodic()
    }

    pub fn update_interval(&self) -> Duration {
        self.check.update_interval
    }

    pub fn initial_delay(&self) -> Duration {
        self.check.initial_delay
    }

    /// Runs the check once, starting from `previous`, and returns the resulting state.
    ///
    /// Panics anywhere in the interceptor pipeline are caught here and recorded as a failed invocation. `cancel` is the
    /// parent of the token handed to the probe.
    pub async fn execute(&self, previous: CheckState, cancel: &CancellationToken) -> CheckState {
        let started = Instant::now();
        let ctx = CheckContext::new(Arc::clone(&self.check.name), self.timeout, cancel.child_token());
        let pipeline = Arc::clone(&self.pipeline);
        let name = Arc::clone(&self.check.name);
        let fallback = previous.clone();

        let state = match AssertUnwindSafe(async move { pipeline(ctx, name, previous).await })
            .catch_unwind()
            .await
        {
            Ok(state) => state,
            Err(panic) => {
                let message = panic_message(&*panic);
                error!(check_name = %self.check.name, panic = message, "Health check pipeline panicked.");

                let mut state = fallback;
                state.begin_run(started);
                state.record_failure(
                    Some(format!("check panicked: {}", message)),
                    None,
                    self.check.max_contiguous_fails,
                    self.check.max_time_in_error,
                );
                state
            }
        };

        self.telemetry.record(&state, started.elapsed());
        state
    }

    /// Notifies the check's status listener, if any, of a status change.
    pub fn notify_status_change(&self, state: &CheckState) {
        if let Some(listener) = &self.check.status_listener {
            if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| listener(&self.check.name, state))) {
                error!(check_name = %self.check.name, panic = panic_message(&*panic), "Check status listener panicked.");
            }
        }
    }
}

/// Builds the innermost step of the pipeline: invoking the probe and folding its outcome into the check state.
fn probe_invoker(check: &Check, timeout: Duration) -> InterceptorFn {
    let probe = Arc::clone(&check.probe);
    let max_contiguous_fails = check.max_contiguous_fails;
    let max_time_in_error = check.max_time_in_error;

    // Guards the probe body itself, so that at most one invocation of it is ever running, including one that was
    // abandoned after timing out but has not finished yet.
    let gate = Arc::new(Mutex::new(()));

    Arc::new(move |ctx: CheckContext, _: Arc<str>, mut state: CheckState| {
        let probe = Arc::clone(&probe);
        let gate = Arc::clone(&gate);
        async move {
            state.begin_run(Instant::now());
            match invoke_probe(probe, gate, ctx, timeout).await {
                Ok(report) => {
                    let (status, details) = report.into_parts();
                    if status.is_down() {
                        state.record_failure(None, details, max_contiguous_fails, max_time_in_error);
                    } else {
                        state.record_success(status, details);
                    }
                }
                Err(e) => {
                    state.record_failure(Some(format!("{:#}", e)), None, max_contiguous_fails, max_time_in_error)
                }
            }
            state
        }
        .boxed()
    })
}

async fn invoke_probe(
    probe: Probe, gate: Arc<Mutex<()>>, ctx: CheckContext, timeout: Duration,
) -> Result<ProbeReport, GenericError> {
    let deadline = ctx.deadline();
    let cancel = ctx.cancellation_token().clone();
    let check_name = ctx.check_name().to_string();

    let handle = tokio::spawn(async move {
        let _permit = select! {
            permit = gate.lock_owned() => permit,
            _ = ctx.cancelled() => return Err(generic_error!("invocation abandoned before the probe could start")),
        };

        probe(ctx).await
    });

    match tokio::time::timeout_at(deadline, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) if e.is_panic() => Err(generic_error!("probe panicked: {}", panic_message(&*e.into_panic()))),
        Ok(Err(e)) => Err(generic_error!("probe task failed: {}", e)),
        Err(_) => {
            // Dropping the handle detaches the probe task: whatever it eventually returns is discarded, so the
            // timeout recorded for this invocation always wins.
            cancel.cancel();
            debug!(check_name = %check_name, ?timeout, "Health check probe timed out.");
            Err(generic_error!("timed out after {:?}", timeout))
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

use std::{
    collections::BTreeMap,
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicU64, Ordering::Release},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tokio::{runtime::Handle, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, Instrument as _};

use crate::{
    cache::{Lookup, ResultCache},
    error::ConfigurationError,
    runner::{panic_message, CheckRunner},
    scheduler,
    state::{CheckState, StateStore},
    status::{self, AvailabilityStatus},
    telemetry::AggregateTelemetry,
};

/// A listener invoked whenever the aggregate status changes.
///
/// The listener always receives the full result, including per-check details, even when details are disabled for
/// query results.
pub type StatusListener = Arc<dyn Fn(&CheckerResult) + Send + Sync>;

/// The aggregate result of all registered checks.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CheckerResult {
    /// Overall status.
    pub status: AvailabilityStatus,

    /// When this result was computed.
    pub timestamp: DateTime<Utc>,

    /// State of each check, keyed by check name.
    ///
    /// Empty when details are disabled.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, CheckState>,

    /// Static information attached to every result.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub info: BTreeMap<String, Value>,
}

impl CheckerResult {
    pub(crate) fn unavailable() -> Self {
        Self {
            status: AvailabilityStatus::Down,
            timestamp: Utc::now(),
            details: BTreeMap::new(),
            info: BTreeMap::new(),
        }
    }
}

pub(crate) struct Settings {
    pub cache_ttl: Duration,
    pub details_disabled: bool,
    pub info: BTreeMap<String, Value>,
}

struct Running {
    shutdown: CancellationToken,
    tasks: JoinSet<()>,
}

pub(crate) struct Shared {
    settings: Settings,
    checks: Vec<Arc<CheckRunner>>,
    store: StateStore,
    cache: ResultCache,
    state_generation: AtomicU64,
    listener: Option<StatusListener>,
    last_published: Mutex<AvailabilityStatus>,
    notify_order: Mutex<()>,
    running: Mutex<Option<Running>>,
    telemetry: AggregateTelemetry,
}

impl Shared {
    /// Writes the new state of a check, notifying the check's listener if its status changed.
    ///
    /// Returns `true` if the status changed.
    fn record(&self, check: &CheckRunner, state: CheckState) -> bool {
        let previous = self.store.update(check.name(), state.clone()).unwrap_or_default();
        if previous.status == state.status {
            return false;
        }

        debug!(check_name = check.name(), from = %previous.status, to = %state.status, "Health check status changed.");
        check.notify_status_change(&state);
        true
    }

    /// Records the outcome of a background run, and republishes the aggregate status if the check's status changed.
    pub(crate) fn record_background(&self, check: &CheckRunner, state: CheckState) {
        if self.record(check, state) {
            self.state_generation.fetch_add(1, Release);
            self.publish();
        }
    }

    pub(crate) fn previous_state(&self, check: &CheckRunner) -> CheckState {
        self.store.get(check.name()).unwrap_or_default()
    }

    async fn evaluate(&self, previous_timestamp: Option<DateTime<Utc>>) -> CheckerResult {
        let foreground = self.checks.iter().filter(|check| !check.is_periodic()).map(|check| async move {
            let previous = self.previous_state(check);
            let state = check.execute(previous, &CancellationToken::new()).await;
            self.record(check, state);
        });
        join_all(foreground).await;

        self.aggregate(previous_timestamp)
    }

    fn aggregate(&self, previous_timestamp: Option<DateTime<Utc>>) -> CheckerResult {
        let details = self.store.snapshot();
        let status = status::aggregate(details.values().map(|state| &state.status));

        let now = Utc::now();
        let timestamp = previous_timestamp.map_or(now, |previous| previous.max(now));

        CheckerResult {
            status,
            timestamp,
            details,
            info: self.settings.info.clone(),
        }
    }

    /// Invokes the status listener if the current aggregate status differs from the last published one.
    ///
    /// The aggregate is snapshotted and compared under the publication lock, so the published status never goes back to
    /// a stale value. Listeners are invoked after that lock is released, in publication order. Must not be called while
    /// holding the cache slot, as the listener is free to query the checker.
    fn publish(&self) {
        let (_notify_turn, previous, result) = {
            let mut last_published = self.last_published.lock().unwrap_or_else(PoisonError::into_inner);
            let result = self.aggregate(None);
            self.telemetry.record(&result.status);
            if *last_published == result.status {
                return;
            }

            let notify_turn = self.notify_order.lock().unwrap_or_else(PoisonError::into_inner);
            let previous = std::mem::replace(&mut *last_published, result.status.clone());
            (notify_turn, previous, result)
        };

        info!(from = %previous, to = %result.status, "Aggregate health status changed.");
        if let Some(listener) = &self.listener {
            if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| listener(&result))) {
                error!(panic = panic_message(&*panic), "Health status listener panicked.");
            }
        }
    }

    fn public_view(&self, result: CheckerResult) -> CheckerResult {
        if !self.settings.details_disabled {
            return result;
        }

        CheckerResult {
            details: BTreeMap::new(),
            ..result
        }
    }
}

/// A health checker.
///
/// `Checker` runs the registered checks, tracks their latest state, and reduces them to a single aggregate result.
/// Foreground checks run whenever a fresh result has to be computed, while periodic checks run in the background once
/// the checker has been started, and their latest state is folded into every result.
///
/// Results are cached for the configured duration: queries within that window get the same result back, without
/// running any checks. Concurrent queries that miss the cache share a single recomputation.
///
/// `Checker` is cheaply cloneable. Background checks stop when [`stop`][Checker::stop] is called, or when the last
/// handle is dropped.
#[derive(Clone)]
pub struct Checker {
    shared: Arc<Shared>,
}

impl Checker {
    pub(crate) fn from_parts(
        settings: Settings, checks: Vec<CheckRunner>, listener: Option<StatusListener>,
    ) -> Self {
        let checks = checks.into_iter().map(Arc::new).collect::<Vec<_>>();
        let names = checks.iter().map(|check| Arc::from(check.name())).collect::<Vec<Arc<str>>>();

        Self {
            shared: Arc::new(Shared {
                store: StateStore::new(&names),
                cache: ResultCache::new(settings.cache_ttl),
                settings,
                checks,
                state_generation: AtomicU64::new(0),
                listener,
                last_published: Mutex::new(AvailabilityStatus::Unknown),
                notify_order: Mutex::new(()),
                running: Mutex::new(None),
                telemetry: AggregateTelemetry::new(),
            }),
        }
    }

    /// Returns the aggregate health result.
    ///
    /// If the cached result is stale, all foreground checks are run and the result is recomputed. Failing checks are
    /// reflected in the status of the result, never as an error.
    pub async fn check(&self) -> CheckerResult {
        let shared = &self.shared;
        let lookup = shared
            .cache
            .get_or_compute(&shared.state_generation, move |previous| shared.evaluate(previous))
            .await;

        match lookup {
            Lookup::Cached(result) => shared.public_view(result),
            Lookup::Computed(result) => {
                shared.publish();
                shared.public_view(result)
            }
        }
    }

    /// Returns a copy of the current state of every check, without running any of them.
    pub fn check_states(&self) -> BTreeMap<String, CheckState> {
        self.shared.store.snapshot()
    }

    /// Starts running periodic checks in the background.
    ///
    /// Calling this method on a checker that is already started has no effect.
    ///
    /// # Errors
    ///
    /// If there are periodic checks to spawn, and this method is not called from within a Tokio runtime, an error is
    /// returned.
    pub fn start(&self) -> Result<(), ConfigurationError> {
        let mut running = self.shared.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            return Ok(());
        }

        let periodic = self
            .shared
            .checks
            .iter()
            .filter(|check| check.is_periodic())
            .collect::<Vec<_>>();

        let shutdown = CancellationToken::new();
        let mut tasks = JoinSet::new();
        if !periodic.is_empty() {
            let handle = Handle::try_current().map_err(|_| ConfigurationError::MissingRuntime)?;
            for check in periodic {
                let span = info_span!("health_check", check_name = check.name());
                let task = scheduler::run_periodic(Arc::downgrade(&self.shared), Arc::clone(check), shutdown.clone());
                tasks.spawn_on(task.instrument(span), &handle);
            }
        }

        info!(periodic_checks = tasks.len(), "Health checker started.");
        *running = Some(Running { shutdown, tasks });

        Ok(())
    }

    /// Stops all periodic checks, waiting for their background tasks to exit.
    ///
    /// The state recorded before stopping is kept, and is picked up again if the checker is restarted.
    pub async fn stop(&self) {
        let running = self.shared.running.lock().unwrap_or_else(PoisonError::into_inner).take();
        let Some(Running { shutdown, mut tasks }) = running else {
            return;
        };

        shutdown.cancel();
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                if e.is_panic() {
                    error!(panic = panic_message(&*e.into_panic()), "Periodic health check task panicked.");
                }
            }
        }

        info!("Health checker stopped.");
    }

    /// Returns `true` if the checker has been started and not stopped since.
    pub fn is_started(&self) -> bool {
        self.shared
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        OnceLock,
    };

    use serde_json::json;

    use super::*;
    use crate::{generic_error, Check, CheckerBuilder, ProbeReport};

    fn static_check(name: &'static str, status: AvailabilityStatus) -> Check {
        Check::new(name, move |_| {
            let status = status.clone();
            async move { Ok(ProbeReport::with_status(status)) }
        })
    }

    fn counting_check(name: &'static str, invocations: Arc<AtomicUsize>) -> Check {
        Check::new(name, move |_| {
            invocations.fetch_add(1, Ordering::SeqCst);
            async { Ok(ProbeReport::up()) }
        })
    }

    #[tokio::test]
    async fn aggregates_foreground_checks() {
        let checker = CheckerBuilder::new()
            .with_check(static_check("db", AvailabilityStatus::Up))
            .with_check(static_check("cache", AvailabilityStatus::Down))
            .with_disabled_cache()
            .build()
            .unwrap();

        let result = checker.check().await;
        assert_eq!(result.status, AvailabilityStatus::Down);
        assert_eq!(result.details.len(), 2);
        assert_eq!(result.details["db"].status, AvailabilityStatus::Up);
        assert_eq!(result.details["cache"].status, AvailabilityStatus::Down);
    }

    #[tokio::test]
    async fn no_checks_is_up() {
        let checker = CheckerBuilder::new().build().unwrap();

        let result = checker.check().await;
        assert_eq!(result.status, AvailabilityStatus::Up);
        assert!(result.details.is_empty());
    }

    #[tokio::test]
    async fn disabled_details_are_omitted() {
        let checker = CheckerBuilder::new()
            .with_check(static_check("db", AvailabilityStatus::Up))
            .with_check(static_check("cache", AvailabilityStatus::Down))
            .with_disabled_details()
            .with_info("version", "1.2.3")
            .build()
            .unwrap();

        let result = checker.check().await;
        assert_eq!(result.status, AvailabilityStatus::Down);
        assert!(result.details.is_empty());
        assert_eq!(result.info["version"], json!("1.2.3"));

        let rendered = serde_json::to_value(&result).unwrap();
        assert!(rendered.get("details").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cached_results_are_reused_within_ttl() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let checker = CheckerBuilder::new()
            .with_check(counting_check("db", Arc::clone(&invocations)))
            .with_cache_duration(Duration::from_secs(5))
            .build()
            .unwrap();

        let first = checker.check().await;
        tokio::time::advance(Duration::from_secs(2)).await;
        let second = checker.check().await;
        assert_eq!(first, second);
        assert_eq!(invocations.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(4)).await;
        let third = checker.check().await;
        assert!(third.timestamp >= second.timestamp);
        assert_eq!(invocations.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn disabled_cache_runs_checks_on_every_query() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let checker = CheckerBuilder::new()
            .with_check(counting_check("db", Arc::clone(&invocations)))
            .with_disabled_cache()
            .build()
            .unwrap();

        for _ in 0..3 {
            checker.check().await;
        }

        assert_eq!(invocations.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_queries_share_one_evaluation() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let probe_invocations = Arc::clone(&invocations);
        let checker = CheckerBuilder::new()
            .with_check(Check::new("slow", move |_| {
                probe_invocations.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok(ProbeReport::up())
                }
            }))
            .build()
            .unwrap();

        let (first, second) = tokio::join!(checker.check(), checker.check());
        assert_eq!(first, second);
        assert_eq!(invocations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn listener_fires_once_per_transition() {
        let healthy = Arc::new(AtomicBool::new(true));
        let transitions = Arc::new(Mutex::new(Vec::new()));

        let probe_healthy = Arc::clone(&healthy);
        let listener_transitions = Arc::clone(&transitions);
        let checker = CheckerBuilder::new()
            .with_check(Check::new("db", move |_| {
                let healthy = probe_healthy.load(Ordering::SeqCst);
                async move {
                    if healthy {
                        Ok(ProbeReport::up())
                    } else {
                        Err(generic_error!("connection refused"))
                    }
                }
            }))
            .with_disabled_cache()
            .with_status_listener(move |result| listener_transitions.lock().unwrap().push(result.status.clone()))
            .build()
            .unwrap();

        checker.check().await;
        checker.check().await;
        healthy.store(false, Ordering::SeqCst);
        checker.check().await;
        checker.check().await;
        healthy.store(true, Ordering::SeqCst);
        checker.check().await;

        assert_eq!(
            *transitions.lock().unwrap(),
            vec![AvailabilityStatus::Up, AvailabilityStatus::Down, AvailabilityStatus::Up]
        );
    }

    #[tokio::test]
    async fn listener_may_query_the_checker() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let checker_slot: Arc<OnceLock<Checker>> = Arc::default();

        let listener_slot = Arc::clone(&checker_slot);
        let checker = CheckerBuilder::new()
            .with_check(static_check("db", AvailabilityStatus::Up))
            .with_status_listener(move |_| {
                if let Some(checker) = listener_slot.get().cloned() {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let _ = tx.send(checker.check().await.status);
                    });
                }
            })
            .build()
            .unwrap();
        let _ = checker_slot.set(checker.clone());

        assert_eq!(checker.check().await.status, AvailabilityStatus::Up);

        let nested = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert_eq!(nested, Some(AvailabilityStatus::Up));
    }

    #[tokio::test]
    async fn check_listener_sees_status_changes() {
        let changes = Arc::new(Mutex::new(Vec::new()));
        let listener_changes = Arc::clone(&changes);
        let checker = CheckerBuilder::new()
            .with_check(
                static_check("db", AvailabilityStatus::Down).with_status_listener(move |name, state| {
                    listener_changes
                        .lock()
                        .unwrap()
                        .push((name.to_string(), state.status.clone()))
                }),
            )
            .with_disabled_cache()
            .build()
            .unwrap();

        checker.check().await;
        checker.check().await;

        assert_eq!(
            *changes.lock().unwrap(),
            vec![("db".to_string(), AvailabilityStatus::Down)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_checks_run_on_schedule() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let checker = CheckerBuilder::new()
            .with_periodic_check(
                Duration::from_secs(10),
                Duration::from_secs(5),
                counting_check("db", Arc::clone(&invocations)),
            )
            .build()
            .unwrap();
        assert!(checker.is_started());

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(invocations.load(Ordering::SeqCst), 0);
        assert_eq!(checker.check_states()["db"].status, AvailabilityStatus::Unknown);

        // Runs at 5s, 15s, 25s and 35s.
        tokio::time::sleep(Duration::from_secs(32)).await;
        assert_eq!(invocations.load(Ordering::SeqCst), 4);
        assert_eq!(checker.check_states()["db"].status, AvailabilityStatus::Up);

        // Queries never run periodic checks themselves.
        checker.check().await;
        assert_eq!(invocations.load(Ordering::SeqCst), 4);

        checker.stop().await;
        assert!(!checker.is_started());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(invocations.load(Ordering::SeqCst), 4);
        assert_eq!(checker.check_states()["db"].status, AvailabilityStatus::Up);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_transition_invalidates_cache_and_notifies() {
        let healthy = Arc::new(AtomicBool::new(true));
        let transitions = Arc::new(Mutex::new(Vec::new()));

        let probe_healthy = Arc::clone(&healthy);
        let listener_transitions = Arc::clone(&transitions);
        let checker = CheckerBuilder::new()
            .with_periodic_check(
                Duration::from_secs(1),
                Duration::ZERO,
                Check::new("db", move |_| {
                    let healthy = probe_healthy.load(Ordering::SeqCst);
                    async move {
                        if healthy {
                            Ok(ProbeReport::up())
                        } else {
                            Err(generic_error!("connection refused"))
                        }
                    }
                }),
            )
            .with_cache_duration(Duration::from_secs(3600))
            .with_status_listener(move |result| listener_transitions.lock().unwrap().push(result.status.clone()))
            .build()
            .unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(checker.check().await.status, AvailabilityStatus::Up);

        healthy.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(checker.check().await.status, AvailabilityStatus::Down);

        assert_eq!(
            *transitions.lock().unwrap(),
            vec![AvailabilityStatus::Up, AvailabilityStatus::Down]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_periodic_probe_keeps_running() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let probe_invocations = Arc::clone(&invocations);
        let checker = CheckerBuilder::new()
            .with_periodic_check(
                Duration::from_secs(1),
                Duration::ZERO,
                Check::new("flaky", move |_| {
                    probe_invocations.fetch_add(1, Ordering::SeqCst);
                    async {
                        if true {
                            panic!("probe exploded");
                        }
                        Ok(ProbeReport::up())
                    }
                }),
            )
            .build()
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(invocations.load(Ordering::SeqCst), 3);

        let state = &checker.check_states()["flaky"];
        assert_eq!(state.status, AvailabilityStatus::Down);
        assert!(state.error.as_deref().unwrap().contains("probe exploded"));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_in_flight_probes() {
        let started = Arc::new(AtomicBool::new(false));
        let cancelled = Arc::new(AtomicBool::new(false));
        let (probe_started, probe_cancelled) = (Arc::clone(&started), Arc::clone(&cancelled));
        let checker = CheckerBuilder::new()
            .with_periodic_check(
                Duration::from_secs(60),
                Duration::ZERO,
                Check::new("db", move |ctx: crate::CheckContext| {
                    let (started, cancelled) = (Arc::clone(&probe_started), Arc::clone(&probe_cancelled));
                    async move {
                        started.store(true, Ordering::SeqCst);
                        ctx.cancelled().await;
                        cancelled.store(true, Ordering::SeqCst);
                        Ok(ProbeReport::up())
                    }
                })
                .with_timeout(Duration::from_secs(3600)),
            )
            .build()
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(started.load(Ordering::SeqCst));
        assert!(!cancelled.load(Ordering::SeqCst));

        checker.stop().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(cancelled.load(Ordering::SeqCst));

        // The interrupted run is never recorded.
        assert_eq!(checker.check_states()["db"].status, AvailabilityStatus::Unknown);
    }

    #[tokio::test(start_paused = true)]
    async fn late_result_never_overwrites_recorded_timeout() {
        let completed = Arc::new(AtomicBool::new(false));
        let probe_completed = Arc::clone(&completed);
        let checker = CheckerBuilder::new()
            .with_check(
                Check::new("slow", move |_| {
                    let completed = Arc::clone(&probe_completed);
                    async move {
                        tokio::time::sleep(Duration::from_secs(5)).await;
                        completed.store(true, Ordering::SeqCst);
                        Ok(ProbeReport::up())
                    }
                })
                .with_timeout(Duration::from_secs(1)),
            )
            .with_disabled_cache()
            .build()
            .unwrap();

        assert_eq!(checker.check().await.status, AvailabilityStatus::Down);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(completed.load(Ordering::SeqCst));

        let state = &checker.check_states()["slow"];
        assert_eq!(state.status, AvailabilityStatus::Down);
        assert!(state.error.as_deref().unwrap().contains("timed out"));
        assert!(state.last_success_at.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_publications_never_leave_a_stale_status() {
        let flipping = |name: &'static str, start_healthy: bool| {
            let healthy = Arc::new(AtomicBool::new(start_healthy));
            Check::new(name, move |_| {
                let was_healthy = healthy.fetch_xor(true, Ordering::SeqCst);
                async move {
                    if was_healthy {
                        Ok(ProbeReport::up())
                    } else {
                        Err(generic_error!("flapping"))
                    }
                }
            })
        };

        let notified = Arc::new(Mutex::new(Vec::new()));
        let listener_notified = Arc::clone(&notified);
        let checker = CheckerBuilder::new()
            .with_periodic_check(Duration::from_millis(1), Duration::ZERO, flipping("a", true))
            .with_periodic_check(Duration::from_millis(1), Duration::ZERO, flipping("b", true))
            .with_disabled_cache()
            .with_status_listener(move |result| listener_notified.lock().unwrap().push(result.status.clone()))
            .build()
            .unwrap();

        for _ in 0..50 {
            checker.check().await;
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        checker.stop().await;

        let states = checker.check_states();
        let current = status::aggregate(states.values().map(|state| &state.status));
        let notified = notified.lock().unwrap();
        assert_eq!(notified.last(), Some(&current));
        assert!(notified.windows(2).all(|pair| pair[0] != pair[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn restart_resumes_from_recorded_state() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let checker = CheckerBuilder::new()
            .with_periodic_check(
                Duration::from_secs(1),
                Duration::ZERO,
                counting_check("db", Arc::clone(&invocations)),
            )
            .with_disabled_autostart()
            .build()
            .unwrap();
        assert!(!checker.is_started());

        checker.start().unwrap();
        checker.start().unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(invocations.load(Ordering::SeqCst), 2);

        checker.stop().await;
        let stopped = checker.check_states();

        checker.start().unwrap();
        assert_eq!(checker.check_states(), stopped);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(invocations.load(Ordering::SeqCst), 3);
    }
}

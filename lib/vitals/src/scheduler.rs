use std::sync::{Arc, Weak};

use tokio::{
    select,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{checker::Shared, runner::CheckRunner};

/// Runs a periodic check until `shutdown` is triggered or the checker is dropped.
///
/// The first run happens after the check's initial delay, and every following run on the check's update interval. If
/// `shutdown` is triggered while a run is in flight, the run is abandoned and its result is never recorded.
pub(crate) async fn run_periodic(shared: Weak<Shared>, check: Arc<CheckRunner>, shutdown: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + check.initial_delay(), check.update_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(
        update_interval = ?check.update_interval(),
        initial_delay = ?check.initial_delay(),
        "Scheduled periodic health check."
    );

    loop {
        select! {
            biased;

            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {},
        }

        // The checker holds the only strong references, so failing to upgrade means it's gone.
        let Some(shared) = shared.upgrade() else {
            break;
        };

        let previous = shared.previous_state(&check);
        let state = select! {
            biased;

            _ = shutdown.cancelled() => break,
            state = check.execute(previous, &shutdown) => state,
        };

        shared.record_background(&check, state);
    }

    debug!("Periodic health check stopped.");
}

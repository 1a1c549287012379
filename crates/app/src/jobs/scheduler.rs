use std::future::Future;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{debug, warn};

use crate::jobs::JobError;

/// Runs `job` every `period`, starting immediately. A failed run is logged
/// and followed by an extra `retry_after` pause; ticks missed while a run is
/// in progress are not replayed.
pub async fn run_interval<F, Fut>(
    name: &'static str,
    period: Duration,
    retry_after: Duration,
    mut job: F,
) -> Result<(), JobError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), JobError>>,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        debug!(job = name, "job tick");
        match job().await {
            Ok(()) => {}
            Err(JobError::Busy) => {
                debug!(job = name, "previous run still in progress; tick skipped");
            }
            Err(err) => {
                warn!(error = %err, job = name, "job execution failed");
                sleep(retry_after).await;
            }
        }
    }
}

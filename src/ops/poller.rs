//! Generic polling loop for operations waiting on a cluster condition

use slog::debug;
use tokio::time::{Duration, Instant};

use crate::error::OpError;
use crate::ops::{ClusterOp, ExecContext};

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 3;
/// Default deadline for node-startup style waits.
pub const STARTUP_POLLING_TIMEOUT_SECS: u64 = 300;

/// An operation that re-dispatches its prepared request until a predicate
/// holds or a deadline elapses.
pub trait PollingOp: ClusterOp {
    fn polling_timeout_secs(&self) -> u64 {
        STARTUP_POLLING_TIMEOUT_SECS
    }

    fn poll_interval_secs(&self) -> u64 {
        DEFAULT_POLL_INTERVAL_SECS
    }

    /// Inspect the freshly dispatched result collection.
    /// `Ok(true)` stops with success, `Err` stops with that error,
    /// `Ok(false)` sleeps one interval and retries.
    fn should_stop_polling(&mut self, ctx: &mut ExecContext) -> Result<bool, OpError>;
}

/// Drive `op` until its predicate is satisfied or the deadline expires.
///
/// The same prepared cluster request is re-dispatched each round; the
/// deadline is absolute but the round in flight is allowed to finish.
pub async fn poll_state<O>(op: &mut O, ctx: &mut ExecContext) -> Result<(), OpError>
where
    O: PollingOp + ?Sized,
{
    let started = Instant::now();
    let timeout = Duration::from_secs(op.polling_timeout_secs());
    let interval = Duration::from_secs(op.poll_interval_secs());

    loop {
        op.run_execute(ctx).await?;

        if op.should_stop_polling(ctx)? {
            return Ok(());
        }

        let elapsed = started.elapsed();
        if elapsed >= timeout {
            return Err(OpError::Timeout {
                op: op.name().to_string(),
                elapsed_secs: elapsed.as_secs(),
            });
        }

        debug!(op.base().logger, "condition not met, retrying";
            "interval_secs" => interval.as_secs(),
            "elapsed_secs" => elapsed.as_secs()
        );
        tokio::time::sleep(interval).await;
    }
}

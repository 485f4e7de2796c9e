//! Evaluation loop: ticks on `evaluation_interval`, cancellable, self-pausing
//! after repeated same-kind failures (spec §4.6).

use crate::scheduler::Scheduler;
use tokio_util::sync::CancellationToken;

/// Runs until `token` is cancelled. Mirrors the teacher's
/// `tokio::select!`-gated reconnect loop: every sleep boundary also watches
/// the cancellation token so `stop()` drains promptly rather than waiting
/// out the full interval.
pub(crate) async fn run_loop(scheduler: Scheduler, token: CancellationToken) {
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                tracing::debug!("evaluation loop cancelled");
                return;
            }
            _ = tokio::time::sleep(scheduler.config().evaluation_interval) => {}
        }

        if !scheduler.state().should_tick() {
            continue;
        }

        scheduler.evaluation_tick().await;

        let streak = scheduler
            .evaluation_failures()
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .current_streak();

        if streak >= scheduler.config().consecutive_failure_pause_threshold {
            tracing::warn!(streak, "evaluation loop pausing itself after repeated failures");
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(scheduler.config().consecutive_failure_pause) => {}
            }
        }
    }
}

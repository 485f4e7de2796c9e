//! Exit loop: ticks on `exit_check_interval`, checking every open position
//! for `should_exit`/profit-taking (spec §4.6). Structurally identical to
//! the evaluation loop, kept as a separate task so a slow evaluation tick
//! never delays exit checks.

use crate::scheduler::Scheduler;
use tokio_util::sync::CancellationToken;

pub(crate) async fn run_loop(scheduler: Scheduler, token: CancellationToken) {
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                tracing::debug!("exit loop cancelled");
                return;
            }
            _ = tokio::time::sleep(scheduler.config().exit_check_interval) => {}
        }

        if !scheduler.state().should_tick() {
            continue;
        }

        scheduler.exit_tick().await;

        let streak = scheduler
            .exit_failures()
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .current_streak();

        if streak >= scheduler.config().consecutive_failure_pause_threshold {
            tracing::warn!(streak, "exit loop pausing itself after repeated failures");
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(scheduler.config().consecutive_failure_pause) => {}
            }
        }
    }
}

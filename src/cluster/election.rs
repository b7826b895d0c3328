//! Periodic election task.
//!
//! [`ElectionLoop::spawn`] drives one [`ReplicaState`] on a fixed tick until
//! its cancellation token fires. Nothing in the default node ever cancels it
//! before process exit; the handle exists so shutdown and tests are
//! deterministic.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::replica::ReplicaState;
use crate::config::NodeConfig;

/// Tick period and follower heartbeat timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElectionTiming {
    pub tick_interval: Duration,
    pub heartbeat_timeout: Duration,
}

impl Default for ElectionTiming {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(150),
            heartbeat_timeout: Duration::from_millis(500),
        }
    }
}

impl From<&NodeConfig> for ElectionTiming {
    fn from(config: &NodeConfig) -> Self {
        Self {
            // tokio's interval panics on a zero period.
            tick_interval: Duration::from_millis(config.tick_interval_ms.max(1)),
            heartbeat_timeout: Duration::from_millis(config.heartbeat_timeout_ms),
        }
    }
}

/// Handle to a running election task.
pub struct ElectionHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl ElectionHandle {
    /// Cancel the task and wait for it to exit.
    pub async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.join.await {
            error!("Election task ended abnormally: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

pub struct ElectionLoop;

impl ElectionLoop {
    /// Spawn the tick task for `replica`. The first tick fires one
    /// `tick_interval` after spawning.
    pub fn spawn(
        replica: Arc<ReplicaState>,
        timing: ElectionTiming,
        token: CancellationToken,
    ) -> ElectionHandle {
        let task_token = token.clone();
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(timing.tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval() completes its first tick immediately.
            ticker.tick().await;

            info!(
                "Election loop started for {} (tick={:?}, timeout={:?})",
                replica.id(),
                timing.tick_interval,
                timing.heartbeat_timeout
            );

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = ticker.tick() => {
                        replica.tick(timing.heartbeat_timeout).await;
                    }
                }
            }

            info!("Election loop for {} stopped", replica.id());
        });

        ElectionHandle { token, join }
    }
}

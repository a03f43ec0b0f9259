//! # Background Task Handles
//!
//! Every periodic service runs as a tokio task controlled through a
//! [`TaskHandle`].
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  let handle = service.spawn(interval);                                  │
//! │                                                                         │
//! │  handle.shutdown().await   → task exits after its current tick         │
//! │  drop(every clone)         → shutdown channel closes, task exits       │
//! │  task reaches its end      → handle.is_running() == false              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};

/// What a loop body tells the runner after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickControl {
    Continue,
    Stop,
}

/// Handle for a spawned background task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    name: &'static str,
    shutdown_tx: mpsc::Sender<()>,
}

impl TaskHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Asks the task to stop.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelError(format!("{} already stopped", self.name)))
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown_tx.is_closed()
    }

    /// Waits until the task has exited.
    pub async fn stopped(&self) {
        self.shutdown_tx.closed().await
    }
}

/// Spawns `tick` on a fixed interval until it returns [`TickControl::Stop`],
/// shutdown is requested, or every handle is dropped.
///
/// The first tick fires immediately.
pub(crate) fn spawn_periodic<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> TaskHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = TickControl> + Send,
{
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        info!(task = name, period_ms = period.as_millis() as u64, "Task starting");

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if tick().await == TickControl::Stop {
                        debug!(task = name, "Task finished its work");
                        break;
                    }
                }

                // Also fires when every handle has been dropped.
                _ = shutdown_rx.recv() => {
                    info!(task = name, "Task shutting down");
                    break;
                }
            }
        }

        info!(task = name, "Task stopped");
    });

    TaskHandle { name, shutdown_tx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_task_stops_itself() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();

        let handle = spawn_periodic("counter", Duration::from_secs(1), move || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                    TickControl::Stop
                } else {
                    TickControl::Continue
                }
            }
        });

        handle.stopped().await;
        assert!(!handle.is_running());
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_task() {
        let handle = spawn_periodic("idle", Duration::from_secs(1), || async {
            TickControl::Continue
        });
        assert!(handle.is_running());

        handle.shutdown().await.unwrap();
        handle.stopped().await;
        assert!(!handle.is_running());
    }
}

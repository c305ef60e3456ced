//! Periodic background work with out-of-band wakeups
//!
//! A [`PeriodicExecutor`] runs its callback once per period. The callback
//! receives a [`PeriodicHandle`] and may call
//! [`schedule_out_of_band`](PeriodicHandle::schedule_out_of_band) to request
//! an immediate extra run; the regular schedule is unaffected.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Cloneable trigger for an extra run
#[derive(Clone, Debug, Default)]
pub struct PeriodicHandle {
    wakeup: Arc<Notify>,
}

impl PeriodicHandle {
    /// Run the callback again as soon as the current run finishes
    pub fn schedule_out_of_band(&self) {
        self.wakeup.notify_one();
    }
}

pub struct PeriodicExecutor {
    name: &'static str,
    period: Duration,
    handle: PeriodicHandle,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl PeriodicExecutor {
    pub fn new(name: &'static str, period: Duration) -> Self {
        Self {
            name,
            period,
            handle: PeriodicHandle::default(),
            shutdown_tx: None,
            task: None,
        }
    }

    /// Spawn the loop; the first regular run happens one period from now
    ///
    /// Calling `start` on a running executor does nothing.
    pub fn start<F, Fut>(&mut self, callback: F)
    where
        F: Fn(PeriodicHandle) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.task.is_some() {
            return;
        }

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let handle = self.handle.clone();
        let name = self.name;
        let period = self.period;

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            info!(
                executor = name,
                period_ms = period.as_millis() as u64,
                "Periodic executor started"
            );

            loop {
                tokio::select! {
                    biased;

                    _ = &mut shutdown_rx => break,
                    _ = handle.wakeup.notified() => {
                        debug!(executor = name, "Out-of-band run");
                    }
                    _ = ticker.tick() => {}
                }

                callback(handle.clone()).await;
            }

            info!(executor = name, "Periodic executor stopped");
        });

        self.shutdown_tx = Some(shutdown_tx);
        self.task = Some(task);
    }

    /// Stop the loop and wait for an in-flight run to finish
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    pub fn schedule_out_of_band(&self) {
        self.handle.schedule_out_of_band();
    }

    pub fn handle(&self) -> PeriodicHandle {
        self.handle.clone()
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

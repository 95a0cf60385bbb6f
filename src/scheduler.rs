//! # Periodic Task Scheduler
//!
//! The source expresses "run this coroutine every N seconds" with a
//! `@periodic_task(interval=N)` decorator (`RDQueue/common/decorator.py`)
//! wrapping an infinite `while True: await f(); await sleep(interval)`
//! loop. This is the explicit equivalent: a plain function spawned onto a
//! Tokio task, owned by a handle that aborts the task on drop so a broker
//! directory entry's prober dies with the entry instead of leaking.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Handle to a spawned periodic task. Aborts the task when dropped.
pub struct PeriodicTask {
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawns `f` to run immediately and then every `interval`, until the
    /// returned handle is dropped or [`PeriodicTask::stop`] is called.
    pub fn spawn<F, Fut>(interval: Duration, mut f: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                f().await;
            }
        });

        Self { handle }
    }

    /// Aborts the task immediately.
    pub fn stop(self) {
        self.handle.abort();
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

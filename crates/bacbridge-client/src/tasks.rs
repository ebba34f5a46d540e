//! Owned background tasks with cooperative cancellation.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Set of background tasks sharing one cancellation token.
///
/// Every task races the token, so [`TaskPool::shutdown`] stops loops at
/// their next await point. Panics inside a task are logged when the task is
/// reaped.
#[derive(Debug, Default)]
pub struct TaskPool {
    token: CancellationToken,
    tasks: Mutex<JoinSet<()>>,
}

impl TaskPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `future` unless the pool is shut down. Returns whether the
    /// task was started.
    pub fn spawn<F>(&self, label: &'static str, future: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.token.is_cancelled() {
            log::debug!("task pool closed, not starting {label}");
            return false;
        }
        let token = self.token.clone();
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while let Some(finished) = tasks.try_join_next() {
            if let Err(err) = finished {
                if err.is_panic() {
                    log::error!("background task panicked: {err}");
                }
            }
        }
        tasks.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => log::trace!("{label} cancelled"),
                _ = future => log::trace!("{label} finished"),
            }
        });
        true
    }

    /// Token cancelled together with the pool, for loops that need to
    /// observe shutdown themselves.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    pub fn is_shut_down(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn len(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancels every task and waits until all of them are gone.
    pub async fn shutdown(&self) {
        self.token.cancel();
        let mut tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        tasks.abort_all();
        while let Some(finished) = tasks.join_next().await {
            if let Err(err) = finished {
                if err.is_panic() {
                    log::error!("background task panicked: {err}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TaskPool;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_running_loops() {
        let pool = TaskPool::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        assert!(pool.spawn("ticker", async move {
            loop {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        pool.shutdown().await;
        let seen = ticks.load(Ordering::SeqCst);
        assert!(seen >= 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
        assert!(pool.is_empty());
        assert!(pool.child_token().is_cancelled());
    }

    #[tokio::test]
    async fn refuses_tasks_after_shutdown() {
        let pool = TaskPool::new();
        pool.shutdown().await;
        assert!(pool.is_shut_down());
        assert!(!pool.spawn("late", async {}));
    }
}

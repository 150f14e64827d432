//! Bounded worker pool that executes send tasks immediately or after a delay.
//!
//! Concurrency is bounded by a semaphore rather than a fixed set of idle
//! worker loops: a task spawned onto the scheduler sleeps out its delay,
//! then waits for a permit before running. This keeps the pool size
//! adjustable without restarting any worker tasks.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;

/// A scheduler that has been shut down refuses further submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("scheduler has been shut down")]
pub struct SchedulerShutDown;

/// A bounded pool of concurrent task slots, with delayed submission.
pub struct DelayedScheduler {
    permits: Arc<Semaphore>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    shutting_down: Arc<AtomicBool>,
}

impl DelayedScheduler {
    /// `capacity` bounds the number of tasks running concurrently; queued
    /// (delayed or waiting for a permit) tasks don't count against it.
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(capacity.max(1))),
            handles: Mutex::new(Vec::new()),
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Submits `task` to run after `delay` (zero for immediate execution),
    /// once a worker slot is free. Returns an error if the scheduler has
    /// already been told to shut down.
    pub async fn schedule<F>(&self, delay: Duration, task: F) -> Result<(), SchedulerShutDown>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(SchedulerShutDown);
        }
        let permits = self.permits.clone();
        let handle = tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let Ok(permit) = permits.acquire_owned().await else {
                return;
            };
            task.await;
            drop(permit);
        });
        let mut handles = self.handles.lock().await;
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
        Ok(())
    }

    /// Marks the scheduler closed to new submissions and waits for every
    /// in-flight task (including ones still sleeping out a delay) to finish.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let handles = std::mem::take(&mut *self.handles.lock().await);
        for handle in handles {
            let _ = handle.await;
        }
    }

    pub fn capacity(&self) -> usize {
        self.permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn delayed_task_does_not_run_before_its_delay_elapses() {
        let scheduler = DelayedScheduler::new(4);
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = ran.clone();
        scheduler
            .schedule(Duration::from_millis(100), async move {
                ran_clone.store(true, Ordering::SeqCst);
            })
            .await
            .unwrap();

        tokio::time::advance(Duration::from_millis(50)).await;
        tokio::task::yield_now().await;
        assert!(!ran.load(Ordering::SeqCst));

        tokio::time::advance(Duration::from_millis(60)).await;
        tokio::task::yield_now().await;
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn concurrency_is_bounded_by_capacity() {
        let scheduler = DelayedScheduler::new(2);
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_concurrent = Arc::new(AtomicUsize::new(0));

        for _ in 0..6 {
            let concurrent = concurrent.clone();
            let max_concurrent = max_concurrent.clone();
            scheduler
                .schedule(Duration::ZERO, async move {
                    let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                    max_concurrent.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    concurrent.fetch_sub(1, Ordering::SeqCst);
                })
                .await
                .unwrap();
        }
        scheduler.shutdown().await;
        assert!(max_concurrent.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn submissions_after_shutdown_are_rejected() {
        let scheduler = DelayedScheduler::new(1);
        scheduler.shutdown().await;
        let result = scheduler.schedule(Duration::ZERO, async {}).await;
        assert!(result.is_err());
    }
}

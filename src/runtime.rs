//! Runtime abstraction layer for async operations
//!
//! Thin handles over tokio tasks so callers can fire off work, poll whether it
//! finished, cancel it, or await its output.

use crate::prelude::{Duration, Future};
use tokio::task::JoinHandle;

/// Handle to a spawned async task
pub trait AsyncHandle: Send + Sync {
    /// Check if the task is finished
    fn is_finished(&self) -> bool;

    /// Cancel the task
    fn cancel(&self);
}

/// Handle to a task spawned with [`spawn`]
#[derive(Debug)]
pub struct TaskHandle<T>(JoinHandle<T>);

impl<T> TaskHandle<T> {
    /// Wait for the task; `None` if it was cancelled or panicked
    pub async fn join(self) -> Option<T> {
        match self.0.await {
            Ok(output) => Some(output),
            Err(e) => {
                if e.is_panic() {
                    log::error!("spawned task panicked: {}", e);
                }
                None
            }
        }
    }
}

impl<T: Send> AsyncHandle for TaskHandle<T> {
    fn is_finished(&self) -> bool {
        self.0.is_finished()
    }

    fn cancel(&self) {
        self.0.abort();
    }
}

/// Spawn a future on the ambient tokio runtime.
///
/// Panics when called outside a tokio runtime.
pub fn spawn<F>(future: F) -> TaskHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    TaskHandle(tokio::spawn(future))
}

/// Async delay, paused-clock aware in tests
pub async fn async_delay(duration: Duration) {
    if duration.is_zero() {
        return;
    }
    tokio::time::sleep(duration).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_spawned_task_output() {
        let handle = spawn(async { 21 * 2 });
        assert_eq!(handle.join().await, Some(42));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_task() {
        let handle = spawn(async {
            async_delay(Duration::from_secs(60)).await;
        });

        assert!(!handle.is_finished());
        handle.cancel();
        assert_eq!(handle.join().await, None);
    }
}

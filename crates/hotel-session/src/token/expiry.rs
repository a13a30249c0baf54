//! Self-clearing expiry timer.

use std::time::Duration;

use tokio::task::AbortHandle;

/// Background task that fires once after a delay.
///
/// Dropping the timer aborts the task, so replacing the stored timer is
/// enough to cancel the previous one.
#[derive(Debug)]
pub struct ExpiryTimer {
    handle: AbortHandle,
}

impl ExpiryTimer {
    /// Run `on_expire` after `after` on the current tokio runtime.
    ///
    /// Returns `None` outside a runtime; expiry is then enforced only by the
    /// getters comparing against the clock.
    pub fn spawn<F>(after: Duration, on_expire: F) -> Option<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("no tokio runtime, expiry timer not armed");
            return None;
        };

        let task = runtime.spawn(async move {
            tokio::time::sleep(after).await;
            on_expire();
        });

        Some(Self { handle: task.abort_handle() })
    }

}

impl Drop for ExpiryTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

//! Login navigation, the one user-visible effect of a lost session.

use tokio::sync::broadcast;

/// Sends the user to the login surface.
pub trait LoginNavigator: Send + Sync {
    /// Navigate to `login_url`. Must not fail.
    fn navigate_to_login(&self, login_url: &str);
}

impl<F> LoginNavigator for F
where
    F: Fn(&str) + Send + Sync,
{
    fn navigate_to_login(&self, login_url: &str) {
        self(login_url);
    }
}

/// Default navigator for headless use: records the redirect in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNavigator;

impl LoginNavigator for LogNavigator {
    fn navigate_to_login(&self, login_url: &str) {
        tracing::warn!(login_url, "session lost, login required");
    }
}

/// Publishes login redirects to any number of subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastNavigator {
    tx: broadcast::Sender<String>,
}

impl BroadcastNavigator {
    /// Create a navigator and its first subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<String>) {
        let (tx, rx) = broadcast::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Subscribe to redirects.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

impl LoginNavigator for BroadcastNavigator {
    fn navigate_to_login(&self, login_url: &str) {
        if self.tx.send(login_url.to_string()).is_err() {
            tracing::debug!(login_url, "no navigation subscribers");
        }
    }
}

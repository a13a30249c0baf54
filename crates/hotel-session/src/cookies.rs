//! Refresh-cookie clearing.
//!
//! The refresh token lives in an HTTP-only cookie the server invalidates on
//! its side; locally we only drop our copy so no further refresh is attempted
//! with it.

use std::sync::Arc;

use reqwest::cookie::Jar;
use url::Url;

/// Signals that the refresh cookie should be forgotten.
pub trait RefreshCookieClearer: Send + Sync {
    /// Forget the refresh cookie. Must not fail.
    fn clear_refresh_cookie(&self);
}

/// Expires the refresh cookie inside the shared cookie jar.
#[derive(Debug, Clone)]
pub struct JarCookieClearer {
    jar: Arc<Jar>,
    url: Url,
    cookie_name: String,
}

impl JarCookieClearer {
    /// Clear `cookie_name` as scoped to `url` (the refresh endpoint).
    #[must_use]
    pub fn new(jar: Arc<Jar>, url: Url, cookie_name: impl Into<String>) -> Self {
        Self { jar, url, cookie_name: cookie_name.into() }
    }
}

impl RefreshCookieClearer for JarCookieClearer {
    fn clear_refresh_cookie(&self) {
        // A cookie is keyed by (domain, path, name); expire every path prefix
        // of the refresh endpoint since we don't know which one the server used.
        let mut prefix = String::new();
        let mut paths = vec!["/".to_string()];
        for segment in self.url.path().split('/').filter(|s| !s.is_empty()) {
            prefix.push('/');
            prefix.push_str(segment);
            paths.push(prefix.clone());
        }

        for path in &paths {
            let expired = format!("{}=; Max-Age=0; Path={}", self.cookie_name, path);
            self.jar.add_cookie_str(&expired, &self.url);
        }

        tracing::debug!(cookie = %self.cookie_name, "refresh cookie cleared");
    }
}

/// Does nothing; for stores that never talk to a cookie-based backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCookieClearer;

impl RefreshCookieClearer for NoopCookieClearer {
    fn clear_refresh_cookie(&self) {}
}

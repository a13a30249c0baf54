//! Refresh endpoint round-trip.

use std::time::Duration;

use serde::Deserialize;

use crate::client::response::error_message;
use crate::error::{RefreshError, RefreshResult};

/// Token payload returned by the refresh and login endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
    /// New access token.
    #[serde(default, alias = "access_token")]
    pub access_token: Option<String>,

    /// Lifetime in seconds.
    #[serde(default, alias = "expires_in")]
    pub expires_in: Option<i64>,
}

impl TokenGrant {
    /// Token value and lifetime, applying `default_expires_in` when absent.
    pub fn into_parts(self, default_expires_in: i64) -> RefreshResult<(String, i64)> {
        let token = self
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(RefreshError::MissingToken)?;
        Ok((token, self.expires_in.unwrap_or(default_expires_in)))
    }
}

/// POST to the refresh endpoint.
///
/// The refresh cookie rides along through the client's cookie jar.
pub(crate) async fn request_grant(
    http: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> RefreshResult<TokenGrant> {
    let response = http
        .post(url)
        .header(reqwest::header::ACCEPT, "application/json")
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| RefreshError::from_reqwest(&e, timeout))?;

    let status = response.status();
    let body = response.text().await.map_err(|e| RefreshError::from_reqwest(&e, timeout))?;

    if !status.is_success() {
        return Err(RefreshError::Status {
            status: status.as_u16(),
            message: error_message(status, &body),
        });
    }

    serde_json::from_str(&body).map_err(|e| RefreshError::InvalidBody(e.to_string()))
}

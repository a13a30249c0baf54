//! Login and logout against the API's auth endpoints.

use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::client::{ApiClient, RequestOptions};
use crate::config::Config;
use crate::error::{ClientError, ClientResult};
use crate::token::TokenGrant;

/// Body of a successful login.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    /// Access token and lifetime.
    #[serde(flatten)]
    pub grant: TokenGrant,

    /// Profile of the logged-in staff member, if the server sends one.
    #[serde(default)]
    pub user: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

/// Login/logout service feeding the token store.
#[derive(Debug, Clone)]
pub struct AuthService {
    api: ApiClient,
    login_path: String,
    logout_path: String,
}

impl AuthService {
    /// Create a service that talks through `api`.
    #[must_use]
    pub fn new(config: &Config, api: ApiClient) -> Self {
        Self {
            api,
            login_path: config.login_path.clone(),
            logout_path: config.logout_path.clone(),
        }
    }

    /// Log in and install the returned access token.
    ///
    /// The server also sets the refresh cookie, which lands in the shared jar.
    ///
    /// # Errors
    ///
    /// [`ClientError::Status`] for rejected credentials,
    /// [`ClientError::AuthenticationFailed`] if no token came back.
    pub async fn login(&self, email: &str, password: &str) -> ClientResult<LoginResponse> {
        let options = RequestOptions::new(Method::POST)
            .json_body(&Credentials { email, password })?
            .skip_auth();

        let response: LoginResponse = self.api.request(&self.login_path, options).await?.json()?;

        let tokens = self.api.tokens();
        let (token, expires_in) = response
            .grant
            .clone()
            .into_parts(tokens.default_expires_in())
            .map_err(|_| ClientError::auth_failed("login response did not contain an access token"))?;

        tokens.set_access_token(&token, expires_in);
        tracing::info!(expires_in, "logged in");

        Ok(response)
    }

    /// Tell the server to end the session, then clear all local tokens.
    ///
    /// The server call is best-effort; local state is always cleared.
    pub async fn logout(&self) {
        let options = RequestOptions::new(Method::POST).no_auth_retry();
        if let Err(err) = self.api.request(&self.logout_path, options).await {
            tracing::warn!(error = %err, "logout request failed");
        }

        self.api.tokens().clear_all_tokens();
        tracing::info!("logged out");
    }

    /// Whether a valid access token is available.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.api.tokens().is_authenticated()
    }
}

//! Authenticated API client.
//!
//! Every request goes through [`ApiClient::request`]:
//! - attaches `Authorization: Bearer <token>` from the [`TokenStore`]
//! - on 401, forces one refresh and replays the request once
//! - if that is impossible, clears the session and navigates to login
//!
//! Requests to any origin other than the API's go out bare: no token, no
//! refresh, no retry.
//!
//! All requests share the cookie jar holding the refresh cookie.

pub mod middleware;
pub mod response;

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use reqwest_middleware::ClientWithMiddleware;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::Config;
use crate::error::{ClientError, ClientResult};
use crate::navigator::LoginNavigator;
use crate::token::{TokenStore, bearer};

pub use self::response::ResponseBody;

/// Per-request options.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// HTTP method.
    pub method: Method,

    /// Extra headers.
    pub headers: HeaderMap,

    /// Raw request body.
    pub body: Option<Vec<u8>>,

    /// Send without any auth handling at all.
    pub skip_auth: bool,

    /// Refresh and replay once on 401.
    pub retry_on_auth_failure: bool,
}

impl RequestOptions {
    /// Options for `method` with auth handling enabled.
    #[must_use]
    pub fn new(method: Method) -> Self {
        Self {
            method,
            headers: HeaderMap::new(),
            body: None,
            skip_auth: false,
            retry_on_auth_failure: true,
        }
    }

    /// Add a header.
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Serialize `body` as JSON and set the content type.
    pub fn json_body<B: Serialize + ?Sized>(mut self, body: &B) -> ClientResult<Self> {
        self.body = Some(serde_json::to_vec(body)?);
        self.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(self)
    }

    /// Bypass auth: no header, no refresh, no retry.
    #[must_use]
    pub fn skip_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }

    /// Pass 401 responses straight through.
    #[must_use]
    pub fn no_auth_retry(mut self) -> Self {
        self.retry_on_auth_failure = false;
        self
    }
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::new(Method::GET)
    }
}

/// Hotel API client with transparent authentication.
#[derive(Clone)]
pub struct ApiClient {
    /// HTTP client with middleware.
    http: ClientWithMiddleware,

    /// Session tokens.
    tokens: TokenStore,

    /// Where to send the user when the session is lost.
    navigator: Arc<dyn LoginNavigator>,

    /// Endpoint resolution and login page.
    config: Arc<Config>,
}

impl ApiClient {
    /// Create a client on top of `http`, which must share its cookie jar with
    /// the token store's refresh client.
    #[must_use]
    pub fn new(
        config: &Config,
        http: reqwest::Client,
        tokens: TokenStore,
        navigator: Arc<dyn LoginNavigator>,
    ) -> Self {
        Self {
            http: middleware::build_stack(http, config.max_transient_retries),
            tokens,
            navigator,
            config: Arc::new(config.clone()),
        }
    }

    /// Token store backing this client.
    #[must_use]
    pub const fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Perform one request with transparent authentication.
    ///
    /// # Errors
    ///
    /// [`ClientError::AuthenticationFailed`] when the session cannot be
    /// recovered (tokens are cleared and the navigator is invoked first),
    /// [`ClientError::Status`] for other non-2xx responses.
    pub async fn request(&self, endpoint: &str, options: RequestOptions) -> ClientResult<ResponseBody> {
        let url = Url::parse(&self.config.endpoint_url(endpoint))?;

        if options.skip_auth || !self.config.is_api_origin(&url) {
            if !options.skip_auth {
                tracing::debug!(url = %url, "foreign origin, sending without credentials");
            }
            let response = self.send(&url, &options, None).await?;
            return response::decode(response).await;
        }

        let auth = self.tokens.get_auth_header().await;
        let response = self.send(&url, &options, auth.as_deref()).await?;

        if response.status() != StatusCode::UNAUTHORIZED || !options.retry_on_auth_failure {
            return response::decode(response).await;
        }

        tracing::debug!(method = %options.method, url = %url, "unauthorized, refreshing token");

        let token = match self.tokens.refresh_access_token().await {
            Ok(token) => token,
            Err(err) => return Err(self.terminate(format!("token refresh failed: {err}"))),
        };

        let retried = self.send(&url, &options, Some(&bearer(&token))).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            return Err(self.terminate("request rejected after token refresh".to_string()));
        }

        response::decode(retried).await
    }

    /// GET `endpoint`.
    pub async fn get(&self, endpoint: &str) -> ClientResult<ResponseBody> {
        self.request(endpoint, RequestOptions::new(Method::GET)).await
    }

    /// GET `endpoint` and deserialize the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> ClientResult<T> {
        self.get(endpoint).await?.json()
    }

    /// POST `body` as JSON to `endpoint`.
    pub async fn post<B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> ClientResult<ResponseBody> {
        self.request(endpoint, RequestOptions::new(Method::POST).json_body(body)?).await
    }

    /// PUT `body` as JSON to `endpoint`.
    pub async fn put<B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> ClientResult<ResponseBody> {
        self.request(endpoint, RequestOptions::new(Method::PUT).json_body(body)?).await
    }

    /// PATCH `body` as JSON to `endpoint`.
    pub async fn patch<B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> ClientResult<ResponseBody> {
        self.request(endpoint, RequestOptions::new(Method::PATCH).json_body(body)?).await
    }

    /// DELETE `endpoint`.
    pub async fn delete(&self, endpoint: &str) -> ClientResult<ResponseBody> {
        self.request(endpoint, RequestOptions::new(Method::DELETE)).await
    }

    async fn send(
        &self,
        url: &Url,
        options: &RequestOptions,
        auth: Option<&str>,
    ) -> ClientResult<reqwest::Response> {
        let mut builder =
            self.http.request(options.method.clone(), url.clone()).headers(options.headers.clone());

        if let Some(auth) = auth {
            builder = builder.header(AUTHORIZATION, auth);
        }
        if let Some(body) = &options.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| map_send_error(e, self.config.request_timeout))?;

        tracing::debug!(
            method = %options.method,
            url = %url,
            status = response.status().as_u16(),
            authenticated = auth.is_some(),
            "request completed"
        );

        Ok(response)
    }

    /// Hard teardown: clear everything and send the user to login.
    fn terminate(&self, reason: String) -> ClientError {
        tracing::warn!(reason = %reason, "session terminated");
        self.tokens.clear_all_tokens();
        self.navigator.navigate_to_login(&self.config.login_page);
        ClientError::auth_failed(reason)
    }
}

fn map_send_error(err: reqwest_middleware::Error, timeout: Duration) -> ClientError {
    match err {
        reqwest_middleware::Error::Reqwest(e) if e.is_timeout() => ClientError::Timeout(timeout),
        reqwest_middleware::Error::Reqwest(e) => ClientError::Http(e),
        other => ClientError::Middleware(other),
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.config.api_base_url)
            .field("tokens", &self.tokens)
            .finish()
    }
}

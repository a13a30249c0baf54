//! Response decoding shared by the dispatcher and the refresh call.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::error::{ClientError, ClientResult};

/// Decoded body of a successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// `application/json` body.
    Json(serde_json::Value),
    /// Any other (or empty) body.
    Text(String),
}

impl ResponseBody {
    /// Deserialize a JSON body into `T`.
    ///
    /// Text bodies are parsed as JSON too, so an endpoint that forgets its
    /// content type still works.
    pub fn json<T: DeserializeOwned>(self) -> ClientResult<T> {
        match self {
            Self::Json(value) => serde_json::from_value(value).map_err(ClientError::from),
            Self::Text(text) => serde_json::from_str(&text).map_err(ClientError::from),
        }
    }

    /// Borrow the JSON value, if any.
    #[must_use]
    pub const fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    /// Borrow the text, if any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Json(_) => None,
        }
    }
}

impl std::fmt::Display for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(value) => write!(f, "{value}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// Human-readable message for a failed response.
///
/// Prefers the server's `message` (then `error`) field, else `HTTP <status>`.
pub(crate) fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["message", "error"]
                .iter()
                .find_map(|field| value.get(field).and_then(|m| m.as_str()).map(str::to_owned))
        })
        .filter(|message| !message.is_empty())
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}

/// Turn a raw response into a body or a status error.
pub(crate) async fn decode(response: reqwest::Response) -> ClientResult<ResponseBody> {
    let status = response.status();
    let is_json = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"));

    let text = response.text().await?;

    if !status.is_success() {
        return Err(ClientError::status(status.as_u16(), error_message(status, &text)));
    }

    if is_json && !text.trim().is_empty() {
        return Ok(ResponseBody::Json(serde_json::from_str(&text)?));
    }

    Ok(ResponseBody::Text(text))
}

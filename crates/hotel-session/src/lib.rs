//! Hotel Session Client
//!
//! Session and token management for clients of the hotel management REST API.
//! Keeps a short-lived access token, refreshes it silently through the
//! refresh-cookie endpoint, and retries rejected requests once after a refresh.
//!
//! # Features
//!
//! - **Single-flight refresh**: concurrent callers share one refresh round-trip
//! - **Self-expiring tokens**: a background timer drops the token at expiry
//! - **Optional persistence**: tokens can be mirrored to a durable file
//! - **Retry-once dispatch**: 401 → refresh → replay, or clear and go to login
//!
//! # Example
//!
//! ```no_run
//! use hotel_session::{Config, Session};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let session = Session::new(Config::from_env()?)?;
//!     session.auth().login("manager@hotel.test", "secret").await?;
//!
//!     let rooms = session.api().get("/rooms").await?;
//!     println!("{rooms}");
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod clock;
pub mod config;
pub mod cookies;
pub mod error;
pub mod navigator;
pub mod session;
pub mod storage;
pub mod token;

pub use auth::{AuthService, LoginResponse};
pub use client::{ApiClient, RequestOptions, ResponseBody};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, PersistenceMode};
pub use cookies::{JarCookieClearer, NoopCookieClearer, RefreshCookieClearer};
pub use error::{ClientError, RefreshError, StorageError};
pub use navigator::{BroadcastNavigator, LogNavigator, LoginNavigator};
pub use session::{Session, SessionBuilder};
pub use storage::{DisabledKeyValueStore, FileKeyValueStore, KeyValueStore, MemoryKeyValueStore};
pub use token::{TokenStore, TokenStoreBuilder};

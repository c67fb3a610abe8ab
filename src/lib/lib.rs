//! Client library for a remote authentication API.
//!
//! [`session`] holds the bearer token, [`http`] executes requests against the
//! configured base URL, and [`auth`] exposes the typed operations built on
//! top of both.
pub mod auth;
pub mod config;
pub mod http;
pub mod session;

pub use auth::AuthApi;
pub use http::{ApiClient, ApiError, ApiRequest, Method};
pub use session::{FileTokenStore, MemoryTokenStore, Session, SessionError, TokenStore};

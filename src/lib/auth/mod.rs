//! Module containing everything pertaining to authentication against the
//! remote API.
use tracing::{debug, info, instrument};

use crate::{
    http::{ApiClient, ApiError, ApiRequest},
    session::SessionError,
};

pub mod request;
pub mod response;

use request::{LoginRequest, RegisterRequest};
use response::{AuthResponse, PingResponse, UserResponse};

pub const REGISTER_PATH: &str = "/auth/register";
pub const LOGIN_PATH: &str = "/auth/login";
pub const ME_PATH: &str = "/users/me";
pub const ADMIN_PING_PATH: &str = "/admin/ping";

/// The operations the client offers, each a single call to the API.
#[derive(Debug, Clone)]
pub struct AuthApi {
    client: ApiClient,
}

impl AuthApi {
    /// Creates a new [`AuthApi`] on top of the given client.
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Creates an account. Any token in the response is not kept.
    #[instrument(skip(self, payload), fields(username = %payload.username))]
    pub async fn register(&self, payload: &RegisterRequest) -> Result<AuthResponse, ApiError> {
        debug!("registering user");

        let request = ApiRequest::post(REGISTER_PATH).json(payload)?;

        self.client.request(&request).await
    }

    /// Logs in and stores the returned token in the session.
    #[instrument(skip(self, payload), fields(username = %payload.username))]
    pub async fn login(&self, payload: &LoginRequest) -> Result<AuthResponse, ApiError> {
        debug!("authenticating user");

        let request = ApiRequest::post(LOGIN_PATH).json(payload)?;
        let res: AuthResponse = self.client.request(&request).await?;

        match res.token.as_deref() {
            Some(token) if !token.is_empty() => {
                self.client.session().set_token(token)?;
                info!("stored token from login");
            }
            _ => debug!("login response carried no token"),
        }

        Ok(res)
    }

    /// Fetches the profile of the user the token belongs to.
    #[instrument(skip(self))]
    pub async fn me(&self) -> Result<UserResponse, ApiError> {
        self.client
            .request(&ApiRequest::get(ME_PATH).authenticated())
            .await
    }

    /// Calls the admin probe.
    #[instrument(skip(self))]
    pub async fn admin_ping(&self) -> Result<PingResponse, ApiError> {
        self.client
            .request(&ApiRequest::get(ADMIN_PING_PATH).authenticated())
            .await
    }

    /// Forgets the stored token.
    #[instrument(skip(self))]
    pub fn logout(&self) -> Result<(), SessionError> {
        self.client.session().clear_token()?;
        info!("cleared stored token");

        Ok(())
    }

    /// Whether a token is currently stored.
    pub fn status(&self) -> Result<bool, SessionError> {
        self.client.session().is_authenticated()
    }
}

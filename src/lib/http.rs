//! The request executor used for every call to the authentication API.
use std::time::Duration;

use reqwest::{header, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::session::{Session, SessionError};

/// An error type for everything that can go wrong during a request.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The server answered with a non-success status.
    #[error("{message}")]
    Http { status: StatusCode, message: String },
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("invalid JSON in response body: {0}")]
    Parse(serde_json::Error),
    #[error("unexpected response shape: {0}")]
    Decode(serde_json::Error),
    #[error("failed to encode request body: {0}")]
    Encode(serde_json::Error),
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl ApiError {
    /// Builds the error for a non-success response, preferring the body's
    /// `message` field over the bare status line.
    pub fn from_response(status: StatusCode, body: Option<&Value>) -> Self {
        let message = match body.and_then(|body| body.get("message")) {
            Some(Value::String(message)) => message.clone(),
            Some(Value::Null) | None => format!("HTTP {}", status.as_u16()),
            Some(other) => other.to_string(),
        };

        Self::Http { status, message }
    }

    /// The HTTP status, when the server produced one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Transport(err) => err.status(),
            _ => None,
        }
    }
}

/// The two verbs the API uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        }
    }
}

/// Describes a single call: where, how, with what, and whether the bearer
/// token goes along.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub path: String,
    pub method: Method,
    pub body: Option<Value>,
    pub auth: bool,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: Method::Get,
            body: None,
            auth: false,
        }
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: Method::Post,
            body: None,
            auth: false,
        }
    }

    /// Attaches a JSON body.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        self.body = Some(serde_json::to_value(body).map_err(ApiError::Encode)?);
        Ok(self)
    }

    /// Marks the request as needing the bearer token.
    pub fn authenticated(mut self) -> Self {
        self.auth = true;
        self
    }
}

/// Parses a response body. Empty text is treated as no body at all.
pub fn parse_body(text: &str) -> Result<Option<Value>, serde_json::Error> {
    if text.is_empty() {
        Ok(None)
    } else {
        serde_json::from_str(text).map(Some)
    }
}

/// Client for the authentication API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    session: Session,
}

impl ApiClient {
    /// Creates a client for `base_url` that reads tokens from `session`.
    pub fn new(base_url: impl Into<String>, session: Session) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, session, None)
    }

    /// Like [`ApiClient::new`], with an overall per-request timeout.
    pub fn with_timeout(
        base_url: impl Into<String>,
        session: Session,
        timeout: Option<Duration>,
    ) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder();

        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self::with_client(builder.build()?, base_url, session))
    }

    /// Wraps an already configured [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        session: Session,
    ) -> Self {
        let base_url = base_url.into();
        let base_url = base_url.strip_suffix('/').unwrap_or(&base_url).to_owned();

        Self {
            client,
            base_url,
            session,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Joins the base URL and a path by plain concatenation.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends the request and returns the parsed body, or `None` when the
    /// server sent back an empty body.
    #[instrument(skip(self, request), fields(method = ?request.method, path = %request.path))]
    pub async fn send(&self, request: &ApiRequest) -> Result<Option<Value>, ApiError> {
        let mut builder = self
            .client
            .request(request.method.into(), self.url(&request.path))
            .header(header::CONTENT_TYPE, "application/json");

        if request.auth {
            match self.session.token()? {
                Some(token) if !token.is_empty() => {
                    builder = builder.bearer_auth(token);
                }
                _ => debug!("no token held, sending request without credentials"),
            }
        }

        if let Some(body) = &request.body {
            let body = serde_json::to_vec(body).map_err(ApiError::Encode)?;
            builder = builder.body(body);
        }

        let res = builder.send().await?;
        let status = res.status();
        let text = res.text().await?;

        debug!("received {} with {} byte body", status, text.len());

        if status.is_success() {
            parse_body(&text).map_err(ApiError::Parse)
        } else {
            // Unlike a success body, an error body that is not JSON is not a
            // parse failure; it just has no message, so the status is used.
            let body = parse_body(&text).ok().flatten();
            let err = ApiError::from_response(status, body.as_ref());

            warn!("request failed: {}", err);

            Err(err)
        }
    }

    /// Sends the request and decodes the body into `T`. An empty body is
    /// decoded as JSON `null`, so `T` may be an `Option` or `()`.
    pub async fn request<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ApiError> {
        let body = self.send(request).await?.unwrap_or(Value::Null);

        serde_json::from_value(body).map_err(ApiError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_field_becomes_the_error_text() {
        let body = json!({ "message": "bad credentials", "token": null });
        let err = ApiError::from_response(StatusCode::UNAUTHORIZED, Some(&body));

        assert_eq!(err.to_string(), "bad credentials");
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn missing_message_falls_back_to_status() {
        let body = json!({ "error": "nope" });

        let err = ApiError::from_response(StatusCode::FORBIDDEN, Some(&body));
        assert_eq!(err.to_string(), "HTTP 403");

        let err = ApiError::from_response(StatusCode::INTERNAL_SERVER_ERROR, None);
        assert_eq!(err.to_string(), "HTTP 500");

        let body = json!({ "message": null });
        let err = ApiError::from_response(StatusCode::BAD_REQUEST, Some(&body));
        assert_eq!(err.to_string(), "HTTP 400");
    }

    #[test]
    fn non_string_message_is_rendered_as_json() {
        let body = json!({ "message": 42 });
        let err = ApiError::from_response(StatusCode::BAD_REQUEST, Some(&body));

        assert_eq!(err.to_string(), "42");
    }

    #[test]
    fn empty_body_parses_to_none() {
        assert_eq!(parse_body("").unwrap(), None);
        assert_eq!(parse_body("{\"a\":1}").unwrap(), Some(json!({ "a": 1 })));
        assert!(parse_body("not json").is_err());
    }

    #[test]
    fn trailing_slash_is_stripped_once() {
        let client = ApiClient::new("http://localhost:8080/", Session::in_memory()).unwrap();

        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(client.url("/users/me"), "http://localhost:8080/users/me");
    }

    #[test]
    fn request_builders_set_fields() {
        let request = ApiRequest::post("/auth/login")
            .json(&json!({ "username": "a", "password": "b" }))
            .unwrap();

        assert_eq!(request.method, Method::Post);
        assert!(!request.auth);
        assert_eq!(request.body, Some(json!({ "username": "a", "password": "b" })));

        let request = ApiRequest::get("/users/me").authenticated();
        assert_eq!(request.method, Method::Get);
        assert!(request.auth);
        assert_eq!(request.body, None);
    }
}

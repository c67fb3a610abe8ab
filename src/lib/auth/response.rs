//! This module declares all types that may be used as response payloads.
use serde::{Deserialize, Serialize};

/// Returned by both registration and login. The token is `null` when the
/// server declines to issue one.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AuthResponse {
    pub message: String,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PingResponse {
    pub message: String,
}

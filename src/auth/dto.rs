use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::auth::errors::AuthError;

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub language: String,
    pub handle: String,
}

/// Request body for a profile update; every field is overwritten.
#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub user_id: i64,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub language: String,
    pub handle: String,
}

/// Request body for login and dry login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub type DryLoginRequest = LoginRequest;

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub user_id: i64,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub token: String,
}

#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegisterResponse {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateResponse {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoginResponse {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DryLoginResponse {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogoutResponse {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidateResponse {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// Shared constructors: a bare status, or a failure carrying the error text.
macro_rules! status_reply {
    ($($ty:ident),* $(,)?) => {$(
        impl $ty {
            pub fn with_status(status: StatusCode) -> Self {
                Self { status: status.as_u16(), ..Default::default() }
            }
        }

        impl From<AuthError> for $ty {
            fn from(err: AuthError) -> Self {
                Self {
                    status: err.status().as_u16(),
                    error: Some(err.to_string()),
                    ..Default::default()
                }
            }
        }
    )*};
}

status_reply!(
    RegisterResponse,
    UpdateResponse,
    LoginResponse,
    DryLoginResponse,
    LogoutResponse,
    ValidateResponse,
);

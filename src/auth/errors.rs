use axum::http::StatusCode;

use crate::auth::{
    jwt::TokenError,
    repo::{StoreError, UniqueField},
};

/// Outcome of an auth operation that did not succeed.
///
/// Every variant except `Infrastructure` is an expected business result and is
/// reported inside the response body. `Infrastructure` is the only one that
/// escapes as a transport error.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("E-Mail already exists")]
    EmailTaken,
    #[error("Username already exists")]
    HandleTaken,
    #[error("User not found")]
    UserNotFound,
    #[error("Wrong password")]
    WrongPassword,
    #[error("Invalid email")]
    InvalidEmail,
    #[error(transparent)]
    InvalidToken(#[from] TokenError),
    #[error("Internal error")]
    Internal,
    #[error(transparent)]
    Infrastructure(#[from] anyhow::Error),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::EmailTaken | AuthError::HandleTaken => StatusCode::CONFLICT,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::WrongPassword => StatusCode::UNAUTHORIZED,
            AuthError::InvalidEmail | AuthError::InvalidToken(_) => StatusCode::BAD_REQUEST,
            AuthError::Internal | AuthError::Infrastructure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(UniqueField::Email) => AuthError::EmailTaken,
            StoreError::Conflict(UniqueField::Handle) => AuthError::HandleTaken,
            StoreError::Missing(_) => AuthError::UserNotFound,
            StoreError::Database(e) => AuthError::Infrastructure(e.into()),
        }
    }
}

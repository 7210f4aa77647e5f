use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{error, instrument};

use crate::{
    auth::{
        dto::{
            DryLoginRequest, DryLoginResponse, LoginRequest, LoginResponse, LogoutRequest,
            LogoutResponse, RegisterRequest, RegisterResponse, UpdateRequest, UpdateResponse,
            ValidateRequest, ValidateResponse,
        },
        errors::AuthError,
        extractors::BearerToken,
        services::AuthService,
    },
    state::AppState,
};

type Reply<T> = Result<Json<T>, (StatusCode, String)>;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/update", post(update))
        .route("/auth/login", post(login))
        .route("/auth/dry-login", post(dry_login))
        .route("/auth/logout", post(logout))
        .route("/auth/validate", post(validate))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/auth/me", get(get_me))
}

/// Business outcomes are answered in the body; only infrastructure faults
/// become a transport-level 500.
fn reply<T: From<AuthError>>(result: Result<T, AuthError>) -> Reply<T> {
    match result {
        Ok(body) => Ok(Json(body)),
        Err(AuthError::Infrastructure(e)) => {
            error!(error = %e, "request failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
        Err(e) => Ok(Json(T::from(e))),
    }
}

#[instrument(skip(auth, payload))]
pub async fn register(
    State(auth): State<AuthService>,
    Json(payload): Json<RegisterRequest>,
) -> Reply<RegisterResponse> {
    reply(auth.register(payload).await)
}

#[instrument(skip(auth, payload))]
pub async fn update(
    State(auth): State<AuthService>,
    Json(payload): Json<UpdateRequest>,
) -> Reply<UpdateResponse> {
    reply(auth.update(payload).await)
}

#[instrument(skip(auth, payload))]
pub async fn login(
    State(auth): State<AuthService>,
    Json(payload): Json<LoginRequest>,
) -> Reply<LoginResponse> {
    reply(auth.login(payload).await)
}

#[instrument(skip(auth, payload))]
pub async fn dry_login(
    State(auth): State<AuthService>,
    Json(payload): Json<DryLoginRequest>,
) -> Reply<DryLoginResponse> {
    reply(auth.dry_login(payload).await)
}

#[instrument(skip(auth, payload))]
pub async fn logout(
    State(auth): State<AuthService>,
    Json(payload): Json<LogoutRequest>,
) -> Reply<LogoutResponse> {
    reply(auth.logout(payload).await)
}

#[instrument(skip(auth, payload))]
pub async fn validate(
    State(auth): State<AuthService>,
    Json(payload): Json<ValidateRequest>,
) -> Reply<ValidateResponse> {
    reply(auth.validate(payload).await)
}

#[instrument(skip(auth, token))]
pub async fn get_me(
    State(auth): State<AuthService>,
    BearerToken(token): BearerToken,
) -> Reply<ValidateResponse> {
    reply(auth.validate(ValidateRequest { token }).await)
}

use std::sync::Arc;

use axum::{extract::FromRef, http::StatusCode};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            DryLoginRequest, DryLoginResponse, LoginRequest, LoginResponse, LogoutRequest,
            LogoutResponse, RegisterRequest, RegisterResponse, UpdateRequest, UpdateResponse,
            ValidateRequest, ValidateResponse,
        },
        errors::AuthError,
        jwt::JwtKeys,
        password::{hash_password, verify_password},
        repo::UserStore,
        repo_types::{Lookup, NewUser, User},
    },
    state::AppState,
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn canonical_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn checked_email(raw: &str) -> Result<String, AuthError> {
    let email = canonical_email(raw);
    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err(AuthError::InvalidEmail);
    }
    Ok(email)
}

/// Register, login and session lifecycle over a [`UserStore`].
///
/// Holds no mutable state of its own; everything shared lives in the store.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn UserStore>,
    keys: JwtKeys,
}

impl FromRef<AppState> for AuthService {
    fn from_ref(state: &AppState) -> Self {
        Self::new(state.store.clone(), state.keys.clone())
    }
}

impl AuthService {
    pub fn new(store: Arc<dyn UserStore>, keys: JwtKeys) -> Self {
        Self { store, keys }
    }

    #[instrument(skip_all, fields(handle = %req.handle))]
    pub async fn register(&self, req: RegisterRequest) -> Result<RegisterResponse, AuthError> {
        let email = checked_email(&req.email)?;

        if self.store.find_one(Lookup::Email(&email)).await?.is_some() {
            warn!(%email, "email already registered");
            return Err(AuthError::EmailTaken);
        }
        if self.store.find_one(Lookup::Handle(&req.handle)).await?.is_some() {
            warn!("handle already registered");
            return Err(AuthError::HandleTaken);
        }

        let password_hash = hash_password(&req.password)?;
        // A concurrent registration can still pass both checks; the store's
        // unique constraints turn that into the same Conflict.
        let user = self
            .store
            .create(NewUser {
                email,
                password_hash,
                language: req.language,
                handle: req.handle,
            })
            .await?;

        info!(user_id = user.id, email = %user.email, "user registered");
        Ok(RegisterResponse::with_status(StatusCode::CREATED))
    }

    #[instrument(skip_all, fields(user_id = req.user_id))]
    pub async fn update(&self, req: UpdateRequest) -> Result<UpdateResponse, AuthError> {
        let email = checked_email(&req.email)?;

        if let Some(other) = self.store.find_one(Lookup::Email(&email)).await? {
            if other.id != req.user_id {
                warn!(%email, other_id = other.id, "email belongs to another user");
                return Err(AuthError::EmailTaken);
            }
        }
        if let Some(other) = self.store.find_one(Lookup::Handle(&req.handle)).await? {
            if other.id != req.user_id {
                warn!(handle = %req.handle, other_id = other.id, "handle belongs to another user");
                return Err(AuthError::HandleTaken);
            }
        }

        let mut user = match self.store.find_one(Lookup::Id(req.user_id)).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!("update of unknown user");
                return Err(AuthError::UserNotFound);
            }
            Err(e) => {
                error!(error = %e, "load user for update failed");
                return Err(AuthError::Internal);
            }
        };

        user.email = email;
        user.password_hash = hash_password(&req.password)?;
        user.language = req.language;
        user.handle = req.handle;
        self.store.save(&user).await?;

        info!(email = %user.email, "user updated");
        Ok(UpdateResponse::with_status(StatusCode::OK))
    }

    async fn check_credentials(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = canonical_email(email);
        let Some(user) = self.store.find_one(Lookup::Email(&email)).await? else {
            warn!(%email, "login unknown email");
            return Err(AuthError::UserNotFound);
        };

        if !verify_password(password, &user.password_hash)? {
            warn!(%email, user_id = user.id, "login invalid password");
            return Err(AuthError::WrongPassword);
        }
        Ok(user)
    }

    /// Last login wins: the new token replaces whatever session was stored.
    #[instrument(skip_all)]
    pub async fn login(&self, req: LoginRequest) -> Result<LoginResponse, AuthError> {
        let user = self.check_credentials(&req.email, &req.password).await?;

        let token = self.keys.sign(&user).map_err(|e| {
            error!(error = %e, user_id = user.id, "jwt sign failed");
            AuthError::Internal
        })?;
        self.store.set_token(user.id, &token).await?;

        info!(user_id = user.id, email = %user.email, "user logged in");
        Ok(LoginResponse {
            status: StatusCode::OK.as_u16(),
            user_id: Some(user.id),
            handle: Some(user.handle),
            token: Some(token),
            error: None,
        })
    }

    /// Same credential check as [`login`](Self::login), without touching the session.
    #[instrument(skip_all)]
    pub async fn dry_login(&self, req: DryLoginRequest) -> Result<DryLoginResponse, AuthError> {
        let user = self.check_credentials(&req.email, &req.password).await?;
        info!(user_id = user.id, "credentials confirmed");
        Ok(DryLoginResponse::with_status(StatusCode::OK))
    }

    #[instrument(skip_all, fields(user_id = req.user_id))]
    pub async fn logout(&self, req: LogoutRequest) -> Result<LogoutResponse, AuthError> {
        let Some(user) = self
            .store
            .find_one(Lookup::IdAndToken(req.user_id, &req.token))
            .await?
        else {
            warn!("logout without matching session");
            return Err(AuthError::UserNotFound);
        };

        self.store.set_token(user.id, "").await?;

        info!("user logged out");
        Ok(LogoutResponse::with_status(StatusCode::OK))
    }

    /// A token is live only if it verifies AND the store still holds it
    /// verbatim, so logout and a newer login both revoke it.
    #[instrument(skip_all)]
    pub async fn validate(&self, req: ValidateRequest) -> Result<ValidateResponse, AuthError> {
        let claims = self.keys.verify(&req.token).map_err(|e| {
            warn!(error = %e, "token rejected");
            AuthError::from(e)
        })?;

        let mut user = self
            .store
            .find_one(Lookup::EmailAndToken(&claims.email, &req.token))
            .await?;
        // The email claim is stale once the user changed it; the subject still
        // pins the record, and the stored token must match either way.
        if user.is_none() {
            if let Ok(id) = claims.sub.parse::<i64>() {
                user = self
                    .store
                    .find_one(Lookup::IdAndToken(id, &req.token))
                    .await?;
            }
        }
        let Some(user) = user else {
            warn!(sub = %claims.sub, "token not bound to a live session");
            return Err(AuthError::UserNotFound);
        };

        Ok(ValidateResponse {
            status: StatusCode::OK.as_u16(),
            user_id: Some(user.id),
            handle: Some(user.handle),
            email: Some(user.email),
            language: Some(user.language),
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::{memory_repo::MemoryUserStore, repo::UnavailableStore},
        config::JwtConfig,
    };

    fn keys(ttl_hours: i64) -> JwtKeys {
        JwtKeys::new(&JwtConfig {
            secret: "test-secret".into(),
            issuer: "test-issuer".into(),
            ttl_hours,
        })
    }

    fn service() -> (AuthService, Arc<MemoryUserStore>) {
        let store = Arc::new(MemoryUserStore::new());
        (AuthService::new(store.clone(), keys(24 * 365)), store)
    }

    fn register_req(email: &str, handle: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.into(),
            password: password.into(),
            language: "en".into(),
            handle: handle.into(),
        }
    }

    fn login_req(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.into(),
            password: password.into(),
        }
    }

    async fn registered_and_logged_in(svc: &AuthService) -> LoginResponse {
        svc.register(register_req("neo@matrix.io", "neo", "red-pill"))
            .await
            .expect("register");
        svc.login(login_req("neo@matrix.io", "red-pill"))
            .await
            .expect("login")
    }

    async fn stored(store: &MemoryUserStore, email: &str) -> User {
        store
            .find_one(Lookup::Email(email))
            .await
            .unwrap()
            .expect("user stored")
    }

    #[tokio::test]
    async fn register_then_login_issues_token() {
        let (svc, store) = service();
        let created = svc
            .register(register_req("neo@matrix.io", "neo", "red-pill"))
            .await
            .unwrap();
        assert_eq!(created.status, 201);

        let login = svc.login(login_req("neo@matrix.io", "red-pill")).await.unwrap();
        assert_eq!(login.status, 200);
        assert_eq!(login.handle.as_deref(), Some("neo"));
        let token = login.token.expect("token");
        assert!(!token.is_empty());

        let user = stored(&store, "neo@matrix.io").await;
        assert_eq!(Some(user.id), login.user_id);
        assert_eq!(user.token, token);
        assert_ne!(user.password_hash, "red-pill");
        assert!(!user.active);
    }

    #[tokio::test]
    async fn register_normalises_email() {
        let (svc, store) = service();
        svc.register(register_req("  Neo@Matrix.IO ", "neo", "pw"))
            .await
            .unwrap();
        assert!(store.find_one(Lookup::Email("neo@matrix.io")).await.unwrap().is_some());
        assert!(svc.login(login_req("NEO@matrix.io", "pw")).await.is_ok());
    }

    #[tokio::test]
    async fn register_rejects_invalid_email() {
        let (svc, store) = service();
        let err = svc
            .register(register_req("not-an-email", "neo", "pw"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidEmail));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn register_duplicate_email_conflicts_without_new_record() {
        let (svc, store) = service();
        svc.register(register_req("neo@matrix.io", "neo", "pw")).await.unwrap();
        let before = store.len();

        let err = svc
            .register(register_req("neo@matrix.io", "other", "pw"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmailTaken));
        assert_eq!(RegisterResponse::from(err).error.as_deref(), Some("E-Mail already exists"));
        assert_eq!(store.len(), before);
    }

    #[tokio::test]
    async fn register_duplicate_handle_conflicts() {
        let (svc, store) = service();
        svc.register(register_req("neo@matrix.io", "neo", "pw")).await.unwrap();
        let err = svc
            .register(register_req("thomas@matrix.io", "neo", "pw"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::HandleTaken));
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn joined_duplicate_registrations_leave_one_record() {
        let (svc, store) = service();
        let (a, b) = tokio::join!(
            svc.register(register_req("neo@matrix.io", "neo", "pw")),
            svc.register(register_req("neo@matrix.io", "neo", "pw")),
        );
        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn login_unknown_email_is_not_found() {
        let (svc, _) = service();
        let err = svc.login(login_req("ghost@matrix.io", "pw")).await.unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
        assert_eq!(err.to_string(), "User not found");
    }

    #[tokio::test]
    async fn wrong_password_fails_login_and_dry_login_alike() {
        let (svc, store) = service();
        svc.register(register_req("neo@matrix.io", "neo", "red-pill")).await.unwrap();

        let login = svc.login(login_req("neo@matrix.io", "blue-pill")).await.unwrap_err();
        let dry = svc.dry_login(login_req("neo@matrix.io", "blue-pill")).await.unwrap_err();
        assert!(matches!(login, AuthError::WrongPassword));
        assert!(matches!(dry, AuthError::WrongPassword));
        assert_eq!(login.status(), StatusCode::UNAUTHORIZED);
        assert!(stored(&store, "neo@matrix.io").await.token.is_empty());
    }

    #[tokio::test]
    async fn dry_login_never_touches_the_session() {
        let (svc, store) = service();
        let login = registered_and_logged_in(&svc).await;
        let before = stored(&store, "neo@matrix.io").await.token;

        let ok = svc.dry_login(login_req("neo@matrix.io", "red-pill")).await.unwrap();
        assert_eq!(ok, DryLoginResponse::with_status(StatusCode::OK));

        let after = stored(&store, "neo@matrix.io").await.token;
        assert_eq!(before.as_bytes(), after.as_bytes());
        assert_eq!(Some(after), login.token);
    }

    #[tokio::test]
    async fn validate_resolves_live_token() {
        let (svc, _) = service();
        let login = registered_and_logged_in(&svc).await;

        let resp = svc
            .validate(ValidateRequest { token: login.token.unwrap() })
            .await
            .unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.user_id, login.user_id);
        assert_eq!(resp.handle.as_deref(), Some("neo"));
        assert_eq!(resp.email.as_deref(), Some("neo@matrix.io"));
        assert_eq!(resp.language.as_deref(), Some("en"));
    }

    #[tokio::test]
    async fn validate_rejects_malformed_token_as_bad_request() {
        let (svc, _) = service();
        let err = svc
            .validate(ValidateRequest { token: "garbage".into() })
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ValidateResponse::from(err).error.as_deref(), Some("token is malformed"));
    }

    #[tokio::test]
    async fn logout_revokes_a_still_valid_token() {
        let (svc, store) = service();
        let login = registered_and_logged_in(&svc).await;
        let token = login.token.unwrap();

        let out = svc
            .logout(LogoutRequest { user_id: login.user_id.unwrap(), token: token.clone() })
            .await
            .unwrap();
        assert_eq!(out.status, 200);
        assert!(stored(&store, "neo@matrix.io").await.token.is_empty());

        // still cryptographically fine, but no longer the stored session
        assert!(svc.keys.verify(&token).is_ok());
        let err = svc.validate(ValidateRequest { token }).await.unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
    }

    #[tokio::test]
    async fn logout_requires_matching_token() {
        let (svc, _) = service();
        let login = registered_and_logged_in(&svc).await;
        let user_id = login.user_id.unwrap();

        for token in ["someone-elses-token", ""] {
            let err = svc
                .logout(LogoutRequest { user_id, token: token.into() })
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::UserNotFound));
        }
        let err = svc
            .logout(LogoutRequest { user_id: user_id + 1, token: login.token.unwrap() })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
    }

    #[tokio::test]
    async fn second_login_overwrites_first_token() {
        let (svc, _) = service();
        let first = registered_and_logged_in(&svc).await.token.unwrap();
        let second = svc
            .login(login_req("neo@matrix.io", "red-pill"))
            .await
            .unwrap()
            .token
            .unwrap();
        assert_ne!(first, second);

        let old = svc.validate(ValidateRequest { token: first }).await.unwrap_err();
        assert!(matches!(old, AuthError::UserNotFound));
        let new = svc.validate(ValidateRequest { token: second }).await.unwrap();
        assert_eq!(new.status, 200);
    }

    #[tokio::test]
    async fn update_rewrites_profile_and_keeps_session() {
        let (svc, store) = service();
        let login = registered_and_logged_in(&svc).await;
        let user_id = login.user_id.unwrap();
        let token = login.token.unwrap();

        let resp = svc
            .update(UpdateRequest {
                user_id,
                email: "the.one@matrix.io".into(),
                password: "new-pill".into(),
                language: "de".into(),
                handle: "the-one".into(),
            })
            .await
            .unwrap();
        assert_eq!(resp.status, 200);

        let user = stored(&store, "the.one@matrix.io").await;
        assert_eq!(user.id, user_id);
        assert_eq!(user.token, token);
        assert!(verify_password("new-pill", &user.password_hash).unwrap());

        let seen = svc.validate(ValidateRequest { token }).await.unwrap();
        assert_eq!(seen.user_id, Some(user_id));
        assert_eq!(seen.email.as_deref(), Some("the.one@matrix.io"));
        assert_eq!(seen.handle.as_deref(), Some("the-one"));
        assert_eq!(seen.language.as_deref(), Some("de"));

        assert!(svc.login(login_req("the.one@matrix.io", "red-pill")).await.is_err());
        assert!(svc.login(login_req("the.one@matrix.io", "new-pill")).await.is_ok());
    }

    #[tokio::test]
    async fn update_may_keep_own_email() {
        let (svc, _) = service();
        let login = registered_and_logged_in(&svc).await;
        let resp = svc
            .update(UpdateRequest {
                user_id: login.user_id.unwrap(),
                email: "neo@matrix.io".into(),
                password: "red-pill".into(),
                language: "fr".into(),
                handle: "neo".into(),
            })
            .await
            .unwrap();
        assert_eq!(resp.status, 200);
    }

    #[tokio::test]
    async fn update_conflicts_with_other_users() {
        let (svc, _) = service();
        let login = registered_and_logged_in(&svc).await;
        svc.register(register_req("trinity@matrix.io", "trinity", "pw")).await.unwrap();
        let user_id = login.user_id.unwrap();

        let err = svc
            .update(UpdateRequest {
                user_id,
                email: "trinity@matrix.io".into(),
                password: "pw".into(),
                language: "en".into(),
                handle: "neo".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::EmailTaken));

        let err = svc
            .update(UpdateRequest {
                user_id,
                email: "neo@matrix.io".into(),
                password: "pw".into(),
                language: "en".into(),
                handle: "trinity".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::HandleTaken));
    }

    #[tokio::test]
    async fn update_unknown_user_is_not_found() {
        let (svc, _) = service();
        let err = svc
            .update(UpdateRequest {
                user_id: 404,
                email: "ghost@matrix.io".into(),
                password: "pw".into(),
                language: "en".into(),
                handle: "ghost".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UserNotFound));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn failed_signing_is_internal_and_keeps_session() {
        let store = Arc::new(MemoryUserStore::new());
        let good = AuthService::new(store.clone(), keys(24 * 365));
        let login = registered_and_logged_in(&good).await;

        let broken = AuthService::new(store.clone(), keys(100_000_000));
        let err = broken
            .login(login_req("neo@matrix.io", "red-pill"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Internal));
        let resp = LoginResponse::from(err);
        assert_eq!(resp.status, 500);
        assert_eq!(resp.error.as_deref(), Some("Internal error"));

        assert_eq!(Some(stored(&store, "neo@matrix.io").await.token), login.token);
    }

    #[tokio::test]
    async fn update_store_failure_on_id_lookup_is_internal() {
        let svc = AuthService::new(Arc::new(UnavailableStore), keys(24 * 365));
        let err = svc
            .update(UpdateRequest {
                user_id: 1,
                email: "neo@matrix.io".into(),
                password: "pw".into(),
                language: "en".into(),
                handle: "neo".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Internal));

        let resp = UpdateResponse::from(err);
        assert_eq!(resp.status, 500);
        assert_eq!(resp.error.as_deref(), Some("Internal error"));
    }

    #[tokio::test]
    async fn register_store_failure_is_infrastructure() {
        let svc = AuthService::new(Arc::new(UnavailableStore), keys(24 * 365));
        let err = svc
            .register(register_req("neo@matrix.io", "neo", "red-pill"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::Infrastructure(_)));
    }

    #[tokio::test]
    async fn relogin_after_update_keeps_new_password() {
        let (svc, store) = service();
        let first = registered_and_logged_in(&svc).await;
        svc.update(UpdateRequest {
            user_id: first.user_id.unwrap(),
            email: "neo@matrix.io".into(),
            password: "blue-pill".into(),
            language: "en".into(),
            handle: "neo".into(),
        })
        .await
        .unwrap();

        let second = svc.login(login_req("neo@matrix.io", "blue-pill")).await.unwrap();
        let err = svc
            .login(login_req("neo@matrix.io", "red-pill"))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::WrongPassword));
        assert_eq!(Some(stored(&store, "neo@matrix.io").await.token), second.token);
    }

    #[test]
    fn email_pattern() {
        assert!(is_valid_email("neo@matrix.io"));
        assert!(!is_valid_email("neo@matrix"));
        assert!(!is_valid_email("neo matrix@io.io"));
        assert!(!is_valid_email(""));
    }
}

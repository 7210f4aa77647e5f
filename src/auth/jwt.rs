use jsonwebtoken::{
    decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation,
};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use crate::{
    auth::{claims::Claims, repo_types::User},
    config::JwtConfig,
};

/// Why a token was refused. The message is returned verbatim to callers of
/// Validate.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token is malformed")]
    Malformed,
    #[error("token is expired")]
    Expired,
    #[error("token signature is invalid")]
    BadSignature,
    #[error("token issuer is invalid")]
    InvalidIssuer,
    #[error("token is invalid: {0}")]
    Invalid(String),
    #[error("token signing failed: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
    #[error("token lifetime of {0} hours is out of range")]
    Lifetime(i64),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature => TokenError::BadSignature,
            ErrorKind::InvalidIssuer => TokenError::InvalidIssuer,
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_)
            | ErrorKind::MissingRequiredClaim(_) => TokenError::Malformed,
            other => TokenError::Invalid(format!("{other:?}")),
        }
    }
}

/// Stateless signer/verifier for session tokens.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    ttl_hours: i64,
}

impl JwtKeys {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            ttl_hours: config.ttl_hours,
        }
    }

    pub fn sign(&self, user: &User) -> Result<String, TokenError> {
        let now = OffsetDateTime::now_utc();
        let exp = self.expiry_from(now)?;
        let claims = Claims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            jti: Uuid::new_v4(),
        };
        let token =
            encode(&Header::default(), &claims, &self.encoding).map_err(TokenError::Signing)?;
        debug!(user_id = user.id, jti = %claims.jti, "jwt signed");
        Ok(token)
    }

    fn expiry_from(&self, now: OffsetDateTime) -> Result<OffsetDateTime, TokenError> {
        let lifetime = self
            .ttl_hours
            .checked_mul(3600)
            .filter(|secs| *secs > 0)
            .map(TimeDuration::seconds)
            .ok_or(TokenError::Lifetime(self.ttl_hours))?;
        now.checked_add(lifetime)
            .filter(|exp| exp.unix_timestamp() >= 0)
            .ok_or(TokenError::Lifetime(self.ttl_hours))
    }

    /// Checks signature, issuer and expiry. Says nothing about whether the
    /// session is still live; that is decided by the stored token.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::default();
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(user_id = %data.claims.sub, jti = %data.claims.jti, "jwt verified");
        Ok(data.claims)
    }
}

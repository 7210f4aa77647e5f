use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use crate::auth::repo_types::{Lookup, NewUser, User};

const USER_COLUMNS: &str = "id, email, password, language, handle, token, active, created_at";

/// Column guarded by a unique constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Email,
    Handle,
}

impl std::fmt::Display for UniqueField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UniqueField::Email => f.write_str("email"),
            UniqueField::Handle => f.write_str("handle"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} already taken")]
    Conflict(UniqueField),
    #[error("user {0} does not exist")]
    Missing(i64),
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                match db_err.constraint() {
                    Some("users_email_key") => return StoreError::Conflict(UniqueField::Email),
                    Some("users_handle_key") => return StoreError::Conflict(UniqueField::Handle),
                    _ => {}
                }
            }
        }
        StoreError::Database(err)
    }
}

/// Persistence contract for user records.
///
/// Implementations must reject a write that would duplicate an email or a
/// handle with [`StoreError::Conflict`], atomically with the write itself.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// First record matching `lookup`, if any.
    async fn find_one(&self, lookup: Lookup<'_>) -> Result<Option<User>, StoreError>;
    /// Insert a new record; the store assigns `id`, `created_at`, an empty
    /// `token` and `active = false`.
    async fn create(&self, user: NewUser) -> Result<User, StoreError>;
    /// Overwrite the profile fields (email, password, language, handle) of the
    /// record with `user.id`. The session token is left as stored.
    async fn save(&self, user: &User) -> Result<(), StoreError>;
    /// Replace only the session token of record `id`; empty clears it.
    async fn set_token(&self, id: i64, token: &str) -> Result<(), StoreError>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn predicate(lookup: &Lookup<'_>) -> &'static str {
    match lookup {
        Lookup::Email(_) => "email = $1",
        Lookup::Handle(_) => "handle = $1",
        Lookup::Id(_) => "id = $1",
        Lookup::IdAndToken(..) => "id = $1 AND token = $2 AND token <> ''",
        Lookup::EmailAndToken(..) => "email = $1 AND token = $2 AND token <> ''",
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_one(&self, lookup: Lookup<'_>) -> Result<Option<User>, StoreError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {} LIMIT 1",
            predicate(&lookup)
        );
        let query = sqlx::query_as::<_, User>(&sql);
        let query = match lookup {
            Lookup::Email(email) => query.bind(email),
            Lookup::Handle(handle) => query.bind(handle),
            Lookup::Id(id) => query.bind(id),
            Lookup::IdAndToken(id, token) => query.bind(id).bind(token),
            Lookup::EmailAndToken(email, token) => query.bind(email).bind(token),
        };
        let user = query.fetch_optional(&self.db).await?;
        debug!(predicate = predicate(&lookup), found = user.is_some(), "user lookup");
        Ok(user)
    }

    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO users (email, password, language, handle)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        );
        let created = sqlx::query_as::<_, User>(&sql)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.language)
            .bind(&user.handle)
            .fetch_one(&self.db)
            .await?;
        Ok(created)
    }

    async fn save(&self, user: &User) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
               SET email = $2, password = $3, language = $4, handle = $5
             WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.language)
        .bind(&user.handle)
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(user.id));
        }
        Ok(())
    }

    async fn set_token(&self, id: i64, token: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET token = $2 WHERE id = $1")
            .bind(id)
            .bind(token)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(id));
        }
        debug!(user_id = id, cleared = token.is_empty(), "session token stored");
        Ok(())
    }
}

/// Store whose lookups by id and whose writes all fail, as when the database
/// goes away mid-request. Email and handle lookups find nothing.
#[cfg(test)]
pub(crate) struct UnavailableStore;

#[cfg(test)]
#[async_trait]
impl UserStore for UnavailableStore {
    async fn find_one(&self, lookup: Lookup<'_>) -> Result<Option<User>, StoreError> {
        match lookup {
            Lookup::Email(_) | Lookup::Handle(_) => Ok(None),
            _ => Err(StoreError::Database(sqlx::Error::PoolTimedOut)),
        }
    }

    async fn create(&self, _user: NewUser) -> Result<User, StoreError> {
        Err(StoreError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn save(&self, _user: &User) -> Result<(), StoreError> {
        Err(StoreError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn set_token(&self, _id: i64, _token: &str) -> Result<(), StoreError> {
        Err(StoreError::Database(sqlx::Error::PoolTimedOut))
    }
}

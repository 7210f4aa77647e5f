use sqlx::FromRow;
use time::OffsetDateTime;

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[sqlx(rename = "password")]
    pub password_hash: String, // Argon2 hash
    pub language: String,
    pub handle: String,
    pub token: String, // empty when no session is active
    pub active: bool,
    pub created_at: OffsetDateTime,
}

impl User {
    pub fn has_session(&self) -> bool {
        !self.token.is_empty()
    }
}

/// Fields supplied on registration; the store assigns the rest.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub language: String,
    pub handle: String,
}

/// The predicates a user can be looked up by.
///
/// Token predicates never match a record without an active session.
#[derive(Debug, Clone, Copy)]
pub enum Lookup<'a> {
    Email(&'a str),
    Handle(&'a str),
    Id(i64),
    IdAndToken(i64, &'a str),
    EmailAndToken(&'a str, &'a str),
}

impl Lookup<'_> {
    pub fn matches(&self, user: &User) -> bool {
        match *self {
            Lookup::Email(email) => user.email == email,
            Lookup::Handle(handle) => user.handle == handle,
            Lookup::Id(id) => user.id == id,
            Lookup::IdAndToken(id, token) => {
                user.id == id && user.has_session() && user.token == token
            }
            Lookup::EmailAndToken(email, token) => {
                user.email == email && user.has_session() && user.token == token
            }
        }
    }
}

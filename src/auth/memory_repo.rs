use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::auth::{
    repo::{StoreError, UniqueField, UserStore},
    repo_types::{Lookup, NewUser, User},
};

/// In-process user store for tests and database-less local runs.
///
/// Uniqueness is checked and the write applied under one lock, so it gives the
/// same guarantee as the database constraints.
#[derive(Default)]
pub struct MemoryUserStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    users: Vec<User>,
}

impl Inner {
    fn taken(&self, email: &str, handle: &str, except: Option<i64>) -> Option<UniqueField> {
        let others = self.users.iter().filter(|u| Some(u.id) != except);
        for user in others {
            if user.email == email {
                return Some(UniqueField::Email);
            }
            if user.handle == handle {
                return Some(UniqueField::Handle);
            }
        }
        None
    }
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_one(&self, lookup: Lookup<'_>) -> Result<Option<User>, StoreError> {
        Ok(self.lock().users.iter().find(|u| lookup.matches(u)).cloned())
    }

    async fn create(&self, user: NewUser) -> Result<User, StoreError> {
        let mut inner = self.lock();
        if let Some(field) = inner.taken(&user.email, &user.handle, None) {
            return Err(StoreError::Conflict(field));
        }
        inner.next_id += 1;
        let created = User {
            id: inner.next_id,
            email: user.email,
            password_hash: user.password_hash,
            language: user.language,
            handle: user.handle,
            token: String::new(),
            active: false,
            created_at: OffsetDateTime::now_utc(),
        };
        inner.users.push(created.clone());
        Ok(created)
    }

    async fn save(&self, user: &User) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(field) = inner.taken(&user.email, &user.handle, Some(user.id)) {
            return Err(StoreError::Conflict(field));
        }
        let stored = inner
            .users
            .iter_mut()
            .find(|u| u.id == user.id)
            .ok_or(StoreError::Missing(user.id))?;
        stored.email = user.email.clone();
        stored.password_hash = user.password_hash.clone();
        stored.language = user.language.clone();
        stored.handle = user.handle.clone();
        Ok(())
    }

    async fn set_token(&self, id: i64, token: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let stored = inner
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(StoreError::Missing(id))?;
        stored.token = token.to_string();
        Ok(())
    }
}

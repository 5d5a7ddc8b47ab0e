// src/accounts/store.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    /// Always lowercase.
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

/// Document store holding user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Conflict` when the email is already registered.
    async fn insert(&self, user: NewUser) -> AppResult<User>;
    async fn find_by_id(&self, id: &str) -> AppResult<Option<User>>;
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;
    /// Fails with `Conflict` when another user already owns `email`.
    async fn update_profile(&self, id: &str, name: &str, email: &str) -> AppResult<User>;
    /// Returns whether a record was removed.
    async fn delete(&self, id: &str) -> AppResult<bool>;
}

/// Process-local store for development and tests.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<String, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn email_taken(users: &HashMap<String, User>, email: &str, except_id: Option<&str>) -> bool {
    users
        .values()
        .any(|u| u.email == email && Some(u.id.as_str()) != except_id)
}

fn poisoned() -> AppError {
    AppError::Internal(anyhow::anyhow!("user store lock poisoned"))
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, user: NewUser) -> AppResult<User> {
        let mut g = self.users.write().map_err(|_| poisoned())?;
        if email_taken(&g, &user.email, None) {
            return Err(AppError::Conflict("User with this email already exists".into()));
        }
        let record = User {
            id: uuid::Uuid::new_v4().to_string(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            created_at: Utc::now(),
        };
        g.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: &str) -> AppResult<Option<User>> {
        let g = self.users.read().map_err(|_| poisoned())?;
        Ok(g.get(id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let g = self.users.read().map_err(|_| poisoned())?;
        Ok(g.values().find(|u| u.email == email).cloned())
    }

    async fn update_profile(&self, id: &str, name: &str, email: &str) -> AppResult<User> {
        let mut g = self.users.write().map_err(|_| poisoned())?;
        if email_taken(&g, email, Some(id)) {
            return Err(AppError::Conflict("Email already in use".into()));
        }
        let user = g.get_mut(id).ok_or(AppError::NotFound("User"))?;
        user.name = name.to_string();
        user.email = email.to_string();
        Ok(user.clone())
    }

    async fn delete(&self, id: &str) -> AppResult<bool> {
        let mut g = self.users.write().map_err(|_| poisoned())?;
        Ok(g.remove(id).is_some())
    }
}

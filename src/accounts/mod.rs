// src/accounts/mod.rs
//! User accounts: validation, password hashing, session tokens and storage.

pub mod password;
pub mod session;
pub mod store;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{AppError, AppResult};

pub use session::{Claims, SessionKeys, SESSION_COOKIE};
pub use store::{MemoryUserStore, NewUser, User, UserStore};

pub const MIN_PASSWORD_LEN: usize = 6;

static RE_EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\S+@\S+\.\S+").expect("email regex"));

/// Loose email shape check: something@something.something
pub fn is_valid_email(email: &str) -> bool {
    RE_EMAIL.is_match(email)
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validate signup input. Returns the trimmed name and normalized email.
pub fn validate_signup(name: &str, email: &str, password: &str) -> AppResult<(String, String)> {
    let name = name.trim();
    if name.is_empty() || email.trim().is_empty() || password.is_empty() {
        return Err(AppError::BadRequest(
            "Name, email and password are required".into(),
        ));
    }
    validate_email(email)?;
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok((name.to_string(), normalize_email(email)))
}

/// Validate a profile update. Returns the trimmed name and normalized email.
pub fn validate_profile(name: &str, email: &str) -> AppResult<(String, String)> {
    let name = name.trim();
    if name.is_empty() || email.trim().is_empty() {
        return Err(AppError::BadRequest("Name and email are required".into()));
    }
    validate_email(email)?;
    Ok((name.to_string(), normalize_email(email)))
}

fn validate_email(email: &str) -> AppResult<()> {
    if is_valid_email(email) {
        Ok(())
    } else {
        Err(AppError::BadRequest("Invalid email format".into()))
    }
}

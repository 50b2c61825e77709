//! In-memory credential store.
//!
//! Credential comparison is plaintext by design of the current protocol
//! and is reachable only through [`UserStore::authenticate`], so swapping
//! in salted hashing later touches exactly one function.

use std::collections::HashMap;
use std::time::SystemTime;

use thiserror::Error;
use tracing::{info, warn};

use common::is_valid_username;

/// A registered account. Accounts are never deleted; `active` gates login.
#[derive(Debug, Clone)]
pub struct User {
    pub username: String,
    pub password: String,
    pub user_id: u64,
    pub registered_at: SystemTime,
    pub active: bool,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("user already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid username: {0}")]
    InvalidUsername(String),
}

/// Username-keyed account map with a monotonic id counter starting at
/// 1000. Ids are never reused.
#[derive(Debug)]
pub struct UserStore {
    users: HashMap<String, User>,
    next_user_id: u64,
}

impl UserStore {
    pub fn new() -> UserStore {
        UserStore {
            users: HashMap::new(),
            next_user_id: 1000,
        }
    }

    pub fn find_by_username(&self, username: &str) -> Option<&User> {
        self.users.get(username)
    }

    pub fn find_by_id(&self, user_id: u64) -> Option<&User> {
        self.users.values().find(|u| u.user_id == user_id)
    }

    /// Register a new account. Fails on a duplicate or an invalid
    /// username; the id counter only advances on success.
    pub fn add(&mut self, username: &str, password: &str) -> Result<u64, StoreError> {
        if !is_valid_username(username) {
            return Err(StoreError::InvalidUsername(username.to_string()));
        }
        if self.users.contains_key(username) {
            warn!(username, "user already exists");
            return Err(StoreError::AlreadyExists(username.to_string()));
        }

        let user_id = self.next_user_id;
        self.next_user_id += 1;
        self.users.insert(
            username.to_string(),
            User {
                username: username.to_string(),
                password: password.to_string(),
                user_id,
                registered_at: SystemTime::now(),
                active: true,
            },
        );
        info!(username, user_id, "user added");
        Ok(user_id)
    }

    /// True iff the user exists, is active, and the credential matches
    /// byte for byte.
    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        let Some(user) = self.users.get(username) else {
            warn!(username, "user not found");
            return false;
        };
        if !user.active {
            warn!(username, "user account is inactive");
            return false;
        }
        user.password.as_bytes() == password.as_bytes()
    }

    /// Toggle the account's active flag. False when the user is unknown.
    pub fn set_active(&mut self, username: &str, active: bool) -> bool {
        match self.users.get_mut(username) {
            Some(user) => {
                user.active = active;
                true
            }
            None => false,
        }
    }

    pub fn count(&self) -> usize {
        self.users.len()
    }

    /// Seed the demo accounts.
    pub fn init_defaults(&mut self) {
        let _ = self.add("admin", "admin123");
        let _ = self.add("alice", "alice123");
        let _ = self.add("bob", "bob123");
        let _ = self.add("charlie", "charlie123");
        info!("initialized default users");
    }
}

impl Default for UserStore {
    fn default() -> UserStore {
        UserStore::new()
    }
}

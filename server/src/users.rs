//! User directory: durable and temporary identities
//!
//! The directory holds every identity the server knows about. Durable users
//! are loaded from the user store at startup and written back on save.
//! Three kinds of identities are never written back:
//! - anonymous users, minted when credential checks are disabled
//! - doppelgangers, clones of an already logged-in user under multi-login
//! - AI users, registered so a synthetic opponent has a display name
//!
//! Those are removed again by [`UserDirectory::cleanup_stale`] once they no
//! longer appear in any session.

use crate::error::StoreError;
use crate::observer::{AdminObserver, LogObserver};
use log::{info, warn};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use shared::Message;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

pub const LOGIN_SUCCESSFUL: &str = "Login successful.";
pub const LOGIN_INCORRECT: &str = "Login failed: username or password incorrect.";
pub const LOGIN_DUPLICATE: &str = "Login failed: user is already logged in.";

const GENERATED_PASSWORD_LEN: usize = 16;

/// Base name for anonymous logins that give neither a display nor a login name.
pub const ANONYMOUS_BASE: &str = "guest";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: u32,
    /// Display name, unique within the directory
    pub username: String,
    pub login_name: String,
    pub password: String,
    pub logged_in: bool,
    pub anonymous: bool,
    pub doppelganger: bool,
    pub ai: bool,
    /// Serial of the most recent login, 0 if never logged in
    pub login_serial: u64,
}

impl User {
    fn new(id: u32, username: &str, login_name: &str, password: &str) -> Self {
        Self {
            id,
            username: username.to_string(),
            login_name: login_name.to_string(),
            password: password.to_string(),
            logged_in: false,
            anonymous: false,
            doppelganger: false,
            ai: false,
            login_serial: 0,
        }
    }

    pub fn is_non_persistent(&self) -> bool {
        self.anonymous || self.doppelganger || self.ai
    }
}

/// One entry of the durable user store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredUser {
    pub id: u32,
    pub username: String,
    pub credential: String,
    pub login_name: String,
}

/// Proof of one particular login.
///
/// Names are reused once a temporary identity is cleaned up, and a durable
/// user may log in again after being logged off, so a connection holds on to
/// the ticket rather than the name alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoginTicket {
    pub user_id: u32,
    pub serial: u64,
}

/// Result of a login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub success: bool,
    pub reason: String,
    /// Name the user is known by for this connection
    pub username: Option<String>,
    pub ticket: Option<LoginTicket>,
}

impl LoginOutcome {
    fn success(username: &str, ticket: LoginTicket) -> Self {
        Self {
            success: true,
            reason: LOGIN_SUCCESSFUL.to_string(),
            username: Some(username.to_string()),
            ticket: Some(ticket),
        }
    }

    fn failure(reason: &str) -> Self {
        Self {
            success: false,
            reason: reason.to_string(),
            username: None,
            ticket: None,
        }
    }

    pub fn into_message(self) -> Message {
        Message::IdentifyResponse {
            success: self.success,
            reason: self.reason,
            username: self.username,
        }
    }
}

pub struct UserDirectory {
    users: Vec<User>,
    next_id: u32,
    next_login_serial: u64,
    anonymous_login: bool,
    multi_login: bool,
    observer: Arc<dyn AdminObserver>,
}

impl UserDirectory {
    pub fn new(anonymous_login: bool, multi_login: bool) -> Self {
        Self {
            users: Vec::new(),
            next_id: 1,
            next_login_serial: 1,
            anonymous_login,
            multi_login,
            observer: Arc::new(LogObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn AdminObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn find(&self, username: &str) -> Option<&User> {
        self.users.iter().find(|u| u.username == username)
    }

    pub fn find_by_id(&self, id: u32) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    /// True while `ticket` is the live login of the user named `username`.
    pub fn is_current(&self, ticket: &LoginTicket, username: &str) -> bool {
        self.find_by_id(ticket.user_id).is_some_and(|u| {
            u.username == username && u.logged_in && u.login_serial == ticket.serial
        })
    }

    fn contains(&self, username: &str) -> bool {
        self.find(username).is_some()
    }

    fn insert(&mut self, mut user: User) -> usize {
        user.id = self.next_id;
        self.next_id += 1;
        self.observer.user_added(&user.username);
        self.users.push(user);
        self.users.len() - 1
    }

    /// Marks the user at `index` logged in under a fresh serial.
    fn stamp_login(&mut self, index: usize) -> LoginTicket {
        let serial = self.next_login_serial;
        self.next_login_serial += 1;
        let user = &mut self.users[index];
        user.logged_in = true;
        user.login_serial = serial;
        LoginTicket {
            user_id: user.id,
            serial,
        }
    }

    /// Adds a durable user. Returns false if the username is taken.
    pub fn add_user(&mut self, username: &str, login_name: &str, password: &str) -> bool {
        if self.contains(username) {
            return false;
        }
        self.insert(User::new(0, username, login_name, password));
        true
    }

    /// Removes any user by display name.
    pub fn remove_user(&mut self, username: &str) -> bool {
        let before = self.users.len();
        self.users.retain(|u| u.username != username);
        let removed = self.users.len() != before;
        if removed {
            self.observer.user_removed(username);
        }
        removed
    }

    /// Logs a connection in.
    ///
    /// With anonymous login enabled no credentials are checked: a fresh
    /// temporary identity is minted under an unused variant of the display
    /// name and the attempt always succeeds. `multi_login` is what the
    /// client asked for; it only takes effect if the server allows it.
    pub fn identify(
        &mut self,
        login_name: &str,
        password: &str,
        display_name: &str,
        multi_login: bool,
    ) -> LoginOutcome {
        if !self.anonymous_login {
            return self.check_credentials(login_name, password, multi_login);
        }

        let base = [display_name.trim(), login_name.trim()]
            .into_iter()
            .find(|name| !name.is_empty())
            .unwrap_or(ANONYMOUS_BASE);
        let username = self.unused_name(base);
        let generated: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(GENERATED_PASSWORD_LEN)
            .map(char::from)
            .collect();

        let mut user = User::new(0, &username, login_name, &generated);
        user.anonymous = true;
        let index = self.insert(user);
        let ticket = self.stamp_login(index);
        info!("Anonymous login as {}", username);
        LoginOutcome::success(&username, ticket)
    }

    pub fn check_credentials(
        &mut self,
        login_name: &str,
        password: &str,
        multi_login: bool,
    ) -> LoginOutcome {
        let allowed = self.multi_login && multi_login;
        let Some(index) = self.users.iter().position(|u| {
            !u.is_non_persistent() && u.login_name == login_name && u.password == password
        }) else {
            warn!("Rejected login for {}: bad credentials", login_name);
            return LoginOutcome::failure(LOGIN_INCORRECT);
        };

        if !self.users[index].logged_in {
            let ticket = self.stamp_login(index);
            info!("{} logged in", self.users[index].username);
            return LoginOutcome::success(&self.users[index].username, ticket);
        }

        if !allowed {
            warn!("Rejected login for {}: already logged in", login_name);
            return LoginOutcome::failure(LOGIN_DUPLICATE);
        }

        let original = self.users[index].clone();
        let name = self.next_doppelganger_name(&original.username);
        let mut clone = User::new(0, &name, &original.login_name, &original.password);
        clone.doppelganger = true;
        let index = self.insert(clone);
        let ticket = self.stamp_login(index);
        info!("{} logged in again as {}", original.username, name);
        LoginOutcome::success(&name, ticket)
    }

    /// Next free name of the form `<base><n>`, above every existing suffix.
    fn next_doppelganger_name(&self, base: &str) -> String {
        let highest = self
            .users
            .iter()
            .filter_map(|u| u.username.strip_prefix(base))
            .filter(|suffix| !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()))
            .filter_map(|suffix| suffix.parse::<u64>().ok())
            .max();

        let mut n = highest.and_then(|n| n.checked_add(1)).unwrap_or(1);
        while self.contains(&format!("{}{}", base, n)) {
            n += 1;
        }
        format!("{}{}", base, n)
    }

    /// `base` if unused, otherwise `base` with the smallest free counter.
    fn unused_name(&self, base: &str) -> String {
        if !self.contains(base) {
            return base.to_string();
        }
        let mut n = 1;
        while self.contains(&format!("{}{}", base, n)) {
            n += 1;
        }
        format!("{}{}", base, n)
    }

    /// Registers a synthetic opponent identity and returns its name.
    pub fn register_ai(&mut self, base: &str) -> String {
        let name = self.unused_name(base);
        let mut user = User::new(0, &name, &name, "");
        user.ai = true;
        let index = self.insert(user);
        self.stamp_login(index);
        name
    }

    pub fn log_off(&mut self, username: &str) {
        for user in self.users.iter_mut().filter(|u| u.username == username) {
            if user.logged_in {
                info!("{} logged off", user.username);
            }
            user.logged_in = false;
        }
    }

    /// Removes temporary identities that take part in none of the sessions
    /// whose rosters are given in `active`. Returns the removed names.
    pub fn cleanup_stale(&mut self, active: &HashSet<String>) -> Vec<String> {
        let (stale, kept): (Vec<User>, Vec<User>) = std::mem::take(&mut self.users)
            .into_iter()
            .partition(|u| u.is_non_persistent() && !active.contains(&u.username));
        self.users = kept;

        let removed: Vec<String> = stale.into_iter().map(|u| u.username).collect();
        for name in &removed {
            self.observer.user_removed(name);
        }
        removed
    }

    pub fn to_stored(&self) -> Vec<StoredUser> {
        self.users
            .iter()
            .filter(|u| !u.is_non_persistent())
            .map(|u| StoredUser {
                id: u.id,
                username: u.username.clone(),
                credential: u.password.clone(),
                login_name: u.login_name.clone(),
            })
            .collect()
    }

    /// Replaces the directory contents with stored users, all logged out.
    pub fn restore(&mut self, stored: Vec<StoredUser>) {
        self.users = stored
            .into_iter()
            .map(|s| User::new(s.id, &s.username, &s.login_name, &s.credential))
            .collect();
        self.next_id = self.users.iter().map(|u| u.id).max().unwrap_or(0) + 1;
    }

    /// Loads durable users from `path`. A missing file is an empty store.
    pub fn load(&mut self, path: &Path) -> Result<usize, StoreError> {
        if !path.exists() {
            warn!("User store {} does not exist, starting empty", path.display());
            self.restore(Vec::new());
            return Ok(0);
        }

        let text =
            std::fs::read_to_string(path).map_err(|e| StoreError::Read(path.to_path_buf(), e))?;
        let stored: Vec<StoredUser> =
            serde_json::from_str(&text).map_err(|e| StoreError::Parse(path.to_path_buf(), e))?;
        let count = stored.len();
        self.restore(stored);
        info!("Loaded {} users from {}", count, path.display());
        Ok(count)
    }

    /// Writes durable users to `path`.
    pub fn save(&self, path: &Path) -> Result<usize, StoreError> {
        write_store(path, &self.to_stored())
    }
}

/// Writes a snapshot taken with [`UserDirectory::to_stored`] to `path`.
pub fn write_store(path: &Path, stored: &[StoredUser]) -> Result<usize, StoreError> {
    let text = serde_json::to_string_pretty(stored).map_err(StoreError::Serialize)?;
    std::fs::write(path, text).map_err(|e| StoreError::Write(path.to_path_buf(), e))?;
    info!("Saved {} users to {}", stored.len(), path.display());
    Ok(stored.len())
}

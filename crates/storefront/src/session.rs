// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory session state: current user and access token.
//!
//! One [`SessionStore`] per running client. It is a `watch` channel so the
//! host application can observe transitions; every mutation is synchronous
//! and replaces the whole state (no partial updates).
//!
//! A session generation counter separates one login from the next. Login
//! and logout start a new generation; a token refresh started in an older
//! generation must not touch the session or the cache.

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::api::UserProfile;

/// Snapshot of the session.
///
/// `access_token.is_some()` iff `user.is_some()`, except while `is_loading`
/// is true during bootstrap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub user: Option<UserProfile>,
    pub access_token: Option<String>,
    pub is_loading: bool,
}

impl SessionState {
    /// Canonical logged-out triple `(None, None, false)`.
    pub fn logged_out() -> Self {
        Self::default()
    }

    fn loading() -> Self {
        Self { user: None, access_token: None, is_loading: true }
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some() && self.user.is_some()
    }
}

/// Notifications for the host application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A login or registration produced a new session.
    LoggedIn { user_id: String },
    /// The access token was rotated by a refresh.
    Refreshed,
    /// The user logged out explicitly.
    LoggedOut,
    /// The session could not be recovered; navigate to the login entry point.
    LoginRequired { reason: String },
}

/// Process-wide observable session state.
pub struct SessionStore {
    tx: watch::Sender<SessionState>,
    generation: Mutex<u64>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Create a store in the bootstrap loading state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::loading());
        Self { tx, generation: Mutex::new(0) }
    }

    pub fn generation(&self) -> u64 {
        *self.generation.lock()
    }

    /// Start a new generation with `user` signed in (login, register).
    pub fn begin(&self, user: UserProfile, access_token: String) -> u64 {
        let mut generation = self.generation.lock();
        *generation += 1;
        self.set_auth(user, access_token);
        *generation
    }

    /// End the current generation and clear the session (logout).
    pub fn end(&self) -> u64 {
        let mut generation = self.generation.lock();
        *generation += 1;
        self.clear_auth();
        *generation
    }

    /// Run `f` only if the session is still in `generation`.
    ///
    /// The generation cannot advance while `f` runs, so `f` may update the
    /// session and the token cache together. `f` must not call
    /// [`begin`](Self::begin) or [`end`](Self::end).
    pub fn if_generation<R>(&self, generation: u64, f: impl FnOnce() -> R) -> Option<R> {
        let current = self.generation.lock();
        if *current != generation {
            return None;
        }
        Some(f())
    }

    /// Install a user and access token. Always leaves loading complete.
    pub fn set_auth(&self, user: UserProfile, access_token: String) {
        self.tx.send_replace(SessionState {
            user: Some(user),
            access_token: Some(access_token),
            is_loading: false,
        });
    }

    pub fn clear_auth(&self) {
        self.tx.send_replace(SessionState::logged_out());
    }

    pub fn set_loading(&self, loading: bool) {
        self.tx.send_if_modified(|state| {
            let changed = state.is_loading != loading;
            state.is_loading = loading;
            changed
        });
    }

    pub fn snapshot(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.tx.borrow().access_token.clone()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.tx.borrow().user.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.tx.borrow().is_loading
    }

    pub fn is_authenticated(&self) -> bool {
        self.tx.borrow().is_authenticated()
    }

    /// Watch every state transition.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight access token refresh.
//!
//! At most one `/auth/refresh` call is outstanding per coordinator. Callers
//! that hit a 401 while it runs join a FIFO of oneshot waiters and receive
//! the same outcome when it settles.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, warn};

use crate::api::{AuthApi, AuthResponse};
use crate::error::AuthError;
use crate::session::{SessionEvent, SessionStore};
use crate::token_cache::{clear_refresh_token, load_refresh_token, store_refresh_token, TokenCache};

type RefreshOutcome = Result<String, AuthError>;

/// The request waiting on a refresh.
#[derive(Debug, Clone)]
pub struct RequestLine {
    pub method: reqwest::Method,
    pub url: String,
    /// Bearer token the failed attempt was sent with.
    pub sent_with: Option<String>,
}

struct PendingEntry {
    request: RequestLine,
    waiter: oneshot::Sender<RefreshOutcome>,
}

struct Inner {
    api: AuthApi,
    session: Arc<SessionStore>,
    cache: Arc<dyn TokenCache>,
    events: broadcast::Sender<SessionEvent>,
    /// `Some` strictly while a refresh is in flight. Flag and queue live in
    /// one slot so they always change together.
    in_flight: Mutex<Option<Vec<PendingEntry>>>,
    refresh_calls: AtomicU64,
}

/// Coordinates token refresh across concurrent requests.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        api: AuthApi,
        session: Arc<SessionStore>,
        cache: Arc<dyn TokenCache>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                session,
                cache,
                events,
                in_flight: Mutex::new(None),
                refresh_calls: AtomicU64::new(0),
            }),
        }
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.in_flight.lock().is_some()
    }

    /// Number of callers waiting on the in-flight refresh.
    pub fn pending(&self) -> usize {
        self.inner.in_flight.lock().as_ref().map_or(0, Vec::len)
    }

    /// Refresh calls issued by this coordinator so far.
    pub fn refresh_calls(&self) -> u64 {
        self.inner.refresh_calls.load(Ordering::Relaxed)
    }

    /// Return an access token that supersedes the one `request` was sent with.
    ///
    /// Starts a refresh if none is running, otherwise joins the running one.
    /// If the session already holds a newer token (a refresh settled between
    /// the request being sent and its 401 arriving), that token is returned
    /// without a network call.
    pub async fn get_valid_token(&self, request: RequestLine) -> RefreshOutcome {
        let (tx, rx) = oneshot::channel();

        // Check-and-set in one critical section, never across an await.
        let leader = {
            let mut slot = self.inner.in_flight.lock();
            match slot.as_mut() {
                Some(queue) => {
                    debug!(
                        method = %request.method,
                        url = %request.url,
                        waiting = queue.len() + 1,
                        "joining in-flight refresh"
                    );
                    queue.push(PendingEntry { request, waiter: tx });
                    false
                }
                None => {
                    if let Some(current) = self.inner.session.access_token() {
                        if request.sent_with.as_deref() != Some(current.as_str()) {
                            debug!(url = %request.url, "session already holds a newer token");
                            return Ok(current);
                        }
                    }
                    *slot = Some(vec![PendingEntry { request, waiter: tx }]);
                    true
                }
            }
        };

        if leader {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                inner.run().await;
            });
        }

        match rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(AuthError::RefreshRejected("refresh ended without a result".to_owned())),
        }
    }
}

impl Inner {
    async fn run(&self) {
        let generation = self.session.generation();
        let refresh_token = load_refresh_token(self.cache.as_ref());
        // A late 401 arriving after the session was already torn down has
        // nothing left to end and must not redirect a second time.
        let had_session = refresh_token.is_some() || self.session.access_token().is_some();

        let fetched = match refresh_token {
            Some(token) => self.exchange(&token).await,
            None => Err(AuthError::RefreshRejected("no refresh token stored".to_owned())),
        };

        // A login or logout while the call was out owns the session now.
        let applied = self.session.if_generation(generation, || self.apply(&fetched, had_session));
        let outcome = match applied {
            Some(outcome) => outcome,
            None => {
                info!("session changed during refresh, result discarded");
                self.session.access_token().ok_or_else(|| {
                    AuthError::RefreshRejected("session ended during refresh".to_owned())
                })
            }
        };

        let waiters = self.in_flight.lock().take().unwrap_or_default();
        let count = waiters.len();
        for entry in waiters {
            if entry.waiter.send(outcome.clone()).is_err() {
                debug!(url = %entry.request.url, "refresh waiter dropped");
            }
        }

        match &outcome {
            Ok(_) => info!(waiters = count, "access token refreshed"),
            Err(e) => warn!(waiters = count, err = %e, "token refresh failed"),
        }
    }

    async fn exchange(&self, refresh_token: &str) -> Result<AuthResponse, AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::Relaxed);
        self.api
            .refresh(refresh_token)
            .await
            .map_err(|e| AuthError::RefreshRejected(e.to_string()))
    }

    /// Install a refresh result. Runs with the session generation held.
    fn apply(
        &self,
        fetched: &Result<AuthResponse, AuthError>,
        had_session: bool,
    ) -> RefreshOutcome {
        match fetched {
            Ok(resp) => {
                self.session.set_auth(resp.user.clone(), resp.access_token.clone());
                store_refresh_token(self.cache.as_ref(), &resp.refresh_token);
                let _ = self.events.send(SessionEvent::Refreshed);
                Ok(resp.access_token.clone())
            }
            Err(e) => {
                self.session.clear_auth();
                clear_refresh_token(self.cache.as_ref());
                if had_session {
                    let _ = self.events.send(SessionEvent::LoginRequired { reason: e.to_string() });
                }
                Err(e.clone())
            }
        }
    }
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;

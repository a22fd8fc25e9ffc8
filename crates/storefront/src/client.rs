// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client facade: one per application, built at startup.
//!
//! Owns the session store, token cache, event channel and dispatcher, and
//! exposes the account operations (login, register, logout, current user).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::api::{error_message, AuthApi, AuthResponse, UserProfile, ME_PATH};
use crate::bootstrap::{bootstrap, BootstrapOutcome};
use crate::dispatcher::{ApiRequest, Dispatcher};
use crate::error::AuthError;
use crate::session::{SessionEvent, SessionStore};
use crate::token_cache::{clear_refresh_token, load_refresh_token, store_refresh_token, TokenCache};

/// Fields for `POST /auth/register`.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

pub struct StorefrontClient {
    api: AuthApi,
    session: Arc<SessionStore>,
    cache: Arc<dyn TokenCache>,
    events: broadcast::Sender<SessionEvent>,
    dispatcher: Dispatcher,
    bootstrapped: AtomicBool,
}

impl StorefrontClient {
    pub fn new(http: reqwest::Client, base_url: &str, cache: Arc<dyn TokenCache>) -> Self {
        let api = AuthApi::new(http, base_url);
        let session = Arc::new(SessionStore::new());
        let (events, _rx) = broadcast::channel(64);
        let dispatcher =
            Dispatcher::new(api.clone(), Arc::clone(&session), Arc::clone(&cache), events.clone());
        Self { api, session, cache, events, dispatcher, bootstrapped: AtomicBool::new(false) }
    }

    /// Build with a `reqwest` client whose requests time out after `timeout`.
    pub fn with_timeout(
        base_url: &str,
        timeout: Duration,
        cache: Arc<dyn TokenCache>,
    ) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::new(http, base_url, cache))
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn base_url(&self) -> &str {
        self.api.base_url()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Validate any cached session. Only the first call does anything.
    pub async fn bootstrap(&self) -> BootstrapOutcome {
        if self.bootstrapped.swap(true, Ordering::SeqCst) {
            return BootstrapOutcome::AlreadyRan;
        }
        bootstrap(&self.api, &self.session, self.cache.as_ref()).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, AuthError> {
        let resp = self.api.login(email, password).await?;
        Ok(self.establish(resp))
    }

    pub async fn register(&self, account: &NewAccount) -> Result<UserProfile, AuthError> {
        let resp = self
            .api
            .register(&account.email, &account.password, &account.first_name, &account.last_name)
            .await?;
        Ok(self.establish(resp))
    }

    /// End the session locally. The server call is best-effort and its
    /// outcome never changes the local result.
    pub async fn logout(&self) {
        let access = self.session.access_token();
        let refresh = load_refresh_token(self.cache.as_ref());

        if access.is_some() || refresh.is_some() {
            if let Err(e) = self.api.logout(access.as_deref(), refresh.as_deref()).await {
                debug!(err = %e, "server logout failed, clearing local session anyway");
            }
        }

        self.session.end();
        clear_refresh_token(self.cache.as_ref());
        let _ = self.events.send(SessionEvent::LoggedOut);
        info!("logged out");
    }

    /// `GET /auth/me` through the dispatcher.
    pub async fn current_user(&self) -> Result<UserProfile, AuthError> {
        self.get_json(ME_PATH).await
    }

    pub async fn send(&self, request: &ApiRequest) -> Result<reqwest::Response, AuthError> {
        self.dispatcher.send(request).await
    }

    /// Send and decode a JSON response. Non-success statuses become
    /// [`AuthError::Status`].
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> Result<T, AuthError> {
        let resp = self.dispatcher.send(request).await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AuthError::Status { status: status.as_u16(), body: error_message(&text) });
        }
        Ok(resp.json().await?)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, AuthError> {
        self.send_json(&ApiRequest::get(path)).await
    }

    pub async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, AuthError> {
        self.send_json(&ApiRequest::post(path).json(body)?).await
    }

    fn establish(&self, resp: AuthResponse) -> UserProfile {
        let user = resp.user;
        self.session.begin(user.clone(), resp.access_token);
        store_refresh_token(self.cache.as_ref(), &resp.refresh_token);
        let _ = self.events.send(SessionEvent::LoggedIn { user_id: user.id.clone() });
        info!(user = %user.id, "logged in");
        user
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound request interception.
//!
//! Attaches the session's bearer token, recovers from 401 through the
//! [`RefreshCoordinator`], and replays the request once with the new token.
//! Any status other than 401 is returned untouched.

use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Response, StatusCode};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::api::AuthApi;
use crate::error::AuthError;
use crate::refresh::{RefreshCoordinator, RequestLine};
use crate::session::{SessionEvent, SessionStore};
use crate::token_cache::{clear_refresh_token, TokenCache};

/// Owned, replayable request description.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API base URL, or an absolute URL.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), headers: HeaderMap::new(), body: None }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serialize `body` as JSON and set the content type.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, AuthError> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| AuthError::Decode(format!("failed to encode request body: {e}")))?;
        self.headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(Bytes::from(bytes));
        Ok(self)
    }
}

/// Sends requests on behalf of callers that know nothing about auth.
pub struct Dispatcher {
    api: AuthApi,
    session: Arc<SessionStore>,
    cache: Arc<dyn TokenCache>,
    events: broadcast::Sender<SessionEvent>,
    coordinator: RefreshCoordinator,
}

impl Dispatcher {
    pub fn new(
        api: AuthApi,
        session: Arc<SessionStore>,
        cache: Arc<dyn TokenCache>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        let coordinator = RefreshCoordinator::new(
            api.clone(),
            Arc::clone(&session),
            Arc::clone(&cache),
            events.clone(),
        );
        Self { api, session, cache, events, coordinator }
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Send `request`, refreshing and replaying once on 401.
    pub async fn send(&self, request: &ApiRequest) -> Result<Response, AuthError> {
        let url = self.api.url(&request.path);
        let token = self.session.access_token();

        let resp = self.execute(request, &url, token.as_deref()).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }

        if AuthApi::is_refresh_url(&url) {
            warn!(%url, "refresh endpoint returned 401, ending session");
            self.end_session("refresh token rejected");
            return Err(AuthError::RefreshRejected("refresh endpoint returned 401".to_owned()));
        }

        debug!(method = %request.method, %url, "401 received, waiting for a fresh token");
        let line =
            RequestLine { method: request.method.clone(), url: url.clone(), sent_with: token };
        // On failure the coordinator has already cleared the session.
        let fresh = self.coordinator.get_valid_token(line).await?;

        let replay = self.execute(request, &url, Some(&fresh)).await?;
        if replay.status() == StatusCode::UNAUTHORIZED {
            warn!(method = %request.method, %url, "replayed request still unauthorized");
            return Err(AuthError::ReplayUnauthorized);
        }
        Ok(replay)
    }

    async fn execute(
        &self,
        request: &ApiRequest,
        url: &str,
        token: Option<&str>,
    ) -> Result<Response, AuthError> {
        let mut headers = request.headers.clone();
        if token.is_some() {
            headers.remove(AUTHORIZATION);
        }

        let mut builder = self.api.http().request(request.method.clone(), url).headers(headers);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }
        Ok(builder.send().await?)
    }

    fn end_session(&self, reason: &str) {
        self.session.end();
        clear_refresh_token(self.cache.as_ref());
        let _ = self.events.send(SessionEvent::LoginRequired { reason: reason.to_owned() });
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire types and raw `/auth/*` calls.
//!
//! These calls go straight to the HTTP client and never through the
//! [`Dispatcher`](crate::dispatcher::Dispatcher), so a 401 from login or
//! refresh cannot re-enter the refresh path.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::error::AuthError;

pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const REFRESH_PATH: &str = "/auth/refresh";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const ME_PATH: &str = "/auth/me";

/// User identity as returned by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Accept numeric or string ids.
fn id_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!("invalid user id: {other}"))),
    }
}

/// Body of a successful login, register, or refresh.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: UserProfile,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest<'a> {
    email: &'a str,
    password: &'a str,
    first_name: &'a str,
    last_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LogoutRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<&'a str>,
}

/// Error envelope some endpoints return (`{"message": ...}` or `{"error": ...}`).
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Extract a human-readable message from an error body.
pub(crate) fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope { message: Some(m), .. }) | Ok(ErrorEnvelope { error: Some(m), .. }) => m,
        _ => body.to_owned(),
    }
}

/// Raw client for the `/auth/*` endpoints.
#[derive(Debug, Clone)]
pub struct AuthApi {
    http: reqwest::Client,
    base: String,
}

impl AuthApi {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self { http, base: base_url.trim_end_matches('/').to_owned() }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// Resolve a path against the base URL. Absolute URLs pass through.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_owned()
        } else if path.starts_with('/') {
            format!("{}{path}", self.base)
        } else {
            format!("{}/{path}", self.base)
        }
    }

    /// Whether `url` targets the refresh endpoint.
    pub fn is_refresh_url(url: &str) -> bool {
        let path = match reqwest::Url::parse(url) {
            Ok(parsed) => parsed.path().to_owned(),
            Err(_) => url.split('?').next().unwrap_or(url).to_owned(),
        };
        path.trim_end_matches('/').ends_with(REFRESH_PATH)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, AuthError> {
        self.exchange(LOGIN_PATH, &LoginRequest { email, password }).await
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        first_name: &str,
        last_name: &str,
    ) -> Result<AuthResponse, AuthError> {
        self.exchange(REGISTER_PATH, &RegisterRequest { email, password, first_name, last_name })
            .await
    }

    /// Exchange a refresh token for a rotated access/refresh pair.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, AuthError> {
        self.exchange(REFRESH_PATH, &RefreshRequest { refresh_token }).await
    }

    /// Best-effort server-side logout.
    pub async fn logout(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> Result<(), AuthError> {
        let mut req = self.http.post(self.url(LOGOUT_PATH)).json(&LogoutRequest { refresh_token });
        if let Some(token) = access_token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AuthError::Status { status: status.as_u16(), body: text });
        }
        Ok(())
    }

    async fn exchange<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<AuthResponse, AuthError> {
        let url = self.url(path);
        let resp = self.http.post(&url).json(body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            debug!(%url, status = status.as_u16(), "auth exchange rejected");
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        let parsed: AuthResponse = resp.json().await?;
        Ok(parsed)
    }
}

#[cfg(test)]
#[path = "api_tests.rs"]
mod tests;

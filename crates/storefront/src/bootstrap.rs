// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One-time startup validation of a cached session.

use tracing::{debug, info, warn};

use crate::api::AuthApi;
use crate::session::SessionStore;
use crate::token_cache::{clear_refresh_token, load_refresh_token, store_refresh_token, TokenCache};

/// What bootstrap decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// The session already held an access token; nothing was validated.
    AlreadyAuthenticated,
    /// No stored refresh token; the session is anonymous.
    Anonymous,
    /// The stored refresh token was exchanged for a fresh session.
    Restored,
    /// The stored refresh token was rejected and has been discarded.
    Invalidated,
    /// A login or logout happened while the stored token was being checked;
    /// that newer state was kept.
    Superseded,
    /// Bootstrap had already run for this client.
    AlreadyRan,
}

/// Seed the session from the token cache.
///
/// Calls the refresh endpoint directly rather than through the coordinator.
/// A login or logout that lands while the call is out wins over its result.
/// Always leaves the session with `is_loading == false`.
pub async fn bootstrap(
    api: &AuthApi,
    session: &SessionStore,
    cache: &dyn TokenCache,
) -> BootstrapOutcome {
    if session.access_token().is_some() {
        session.set_loading(false);
        debug!("session already authenticated, skipping bootstrap refresh");
        return BootstrapOutcome::AlreadyAuthenticated;
    }

    let Some(refresh_token) = load_refresh_token(cache) else {
        session.set_loading(false);
        debug!("no stored refresh token, starting anonymous");
        return BootstrapOutcome::Anonymous;
    };

    let generation = session.generation();
    session.set_loading(true);
    let fetched = api.refresh(&refresh_token).await;
    let applied = session.if_generation(generation, || match fetched {
        Ok(resp) => {
            info!(user = %resp.user.id, "session restored from stored refresh token");
            session.set_auth(resp.user, resp.access_token);
            store_refresh_token(cache, &resp.refresh_token);
            BootstrapOutcome::Restored
        }
        Err(e) => {
            warn!(err = %e, "stored refresh token rejected, starting anonymous");
            clear_refresh_token(cache);
            session.clear_auth();
            BootstrapOutcome::Invalidated
        }
    });
    let outcome = applied.unwrap_or_else(|| {
        debug!("session changed while bootstrapping, keeping it");
        BootstrapOutcome::Superseded
    });
    session.set_loading(false);
    outcome
}

#[cfg(test)]
#[path = "bootstrap_tests.rs"]
mod tests;

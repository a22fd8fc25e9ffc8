// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Storefront API client: authenticated request pipeline.
//!
//! Every call goes through the [`Dispatcher`](dispatcher::Dispatcher), which
//! attaches the session's access token, coordinates a single refresh when
//! tokens expire, and replays the affected requests.

pub mod api;
pub mod bootstrap;
pub mod client;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod refresh;
pub mod session;
pub mod token_cache;


use std::sync::Arc;

use tracing::{debug, info};

use crate::client::StorefrontClient;
use crate::config::Config;
use crate::error::AuthError;
use crate::session::SessionEvent;
use crate::token_cache::FileTokenCache;

/// Bootstrap a client from `config` and run its subcommand.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let cache = Arc::new(FileTokenCache::new(config.token_path()));
    let client = StorefrontClient::with_timeout(&config.api_url, config.timeout(), cache.clone())?;

    let mut events = client.subscribe_events();
    let outcome = client.bootstrap().await;
    info!(
        api = %client.base_url(),
        token_file = %cache.path().display(),
        ?outcome,
        "session bootstrapped"
    );

    let result = command::run(&client, config.command).await;

    let mut prompted = false;
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::LoginRequired { reason } => {
                eprintln!("session expired ({reason}); run `storefront login` to sign in again");
                prompted = true;
            }
            other => debug!(?other, "session event"),
        }
    }

    if let Some(err) = result.as_ref().err().and_then(|e| e.downcast_ref::<AuthError>()) {
        debug!(code = err.as_str(), status = ?err.http_status(), "command failed");
        if err.is_session_fatal() && !prompted {
            eprintln!("not signed in; run `storefront login` first");
        }
    }

    result
}

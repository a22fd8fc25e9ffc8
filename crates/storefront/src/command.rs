// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI subcommands.

use std::io::Write;

use clap::Subcommand;
use serde_json::Value;

use crate::client::{NewAccount, StorefrontClient};
use crate::dispatcher::ApiRequest;

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Log in and cache the refresh token.
    Login {
        #[arg(long, env = "STOREFRONT_EMAIL")]
        email: String,
        #[arg(long, env = "STOREFRONT_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and log in.
    Register {
        #[arg(long)]
        email: String,
        #[arg(long, env = "STOREFRONT_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        first_name: String,
        #[arg(long)]
        last_name: String,
    },
    /// Log out and forget the cached refresh token.
    Logout,
    /// Print the current user (`GET /auth/me`).
    Whoami,
    /// Print the local session state.
    Status,
    /// Send an authenticated request and print the response body.
    Request {
        /// HTTP method (GET, POST, PUT, PATCH, DELETE).
        method: String,
        /// Path relative to the API URL.
        path: String,
        /// JSON request body.
        #[arg(long)]
        data: Option<String>,
    },
}

/// Run `command` against an already bootstrapped client.
pub async fn run(client: &StorefrontClient, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Login { email, password } => {
            let user = client.login(&email, &password).await?;
            print_json(&serde_json::to_value(user)?)
        }
        Command::Register { email, password, first_name, last_name } => {
            let account = NewAccount { email, password, first_name, last_name };
            let user = client.register(&account).await?;
            print_json(&serde_json::to_value(user)?)
        }
        Command::Logout => {
            client.logout().await;
            Ok(())
        }
        Command::Whoami => {
            let user = client.current_user().await?;
            print_json(&serde_json::to_value(user)?)
        }
        Command::Status => {
            let state = client.session().snapshot();
            print_json(&serde_json::json!({
                "authenticated": state.is_authenticated(),
                "loading": state.is_loading,
                "user": state.user,
            }))
        }
        Command::Request { method, path, data } => {
            let request = build_request(&method, &path, data.as_deref())?;
            let resp = client.send(&request).await?;
            let status = resp.status();
            let text = resp.text().await?;
            if !text.is_empty() {
                match serde_json::from_str::<Value>(&text) {
                    Ok(json) => print_json(&json)?,
                    Err(_) => println!("{text}"),
                }
            }
            if !status.is_success() {
                anyhow::bail!("request failed with status {status}");
            }
            Ok(())
        }
    }
}

pub(crate) fn build_request(
    method: &str,
    path: &str,
    data: Option<&str>,
) -> anyhow::Result<ApiRequest> {
    let method = reqwest::Method::from_bytes(method.to_uppercase().as_bytes())
        .map_err(|_| anyhow::anyhow!("invalid method: {method}"))?;
    let request = ApiRequest::new(method, path);
    match data {
        Some(raw) => {
            let body: Value = serde_json::from_str(raw)
                .map_err(|e| anyhow::anyhow!("--data is not valid JSON: {e}"))?;
            Ok(request.json(&body)?)
        }
        None => Ok(request),
    }
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;

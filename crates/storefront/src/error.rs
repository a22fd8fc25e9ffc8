// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

/// Errors surfaced by the authenticated request pipeline.
///
/// `Clone` so a single refresh outcome can be handed to every waiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No response was received (connect, timeout, body read).
    Transport(String),
    /// The refresh call failed or was rejected. The session has been cleared.
    RefreshRejected(String),
    /// The request was replayed with a fresh token and still got 401.
    ReplayUnauthorized,
    /// Login or registration was rejected by the server.
    Rejected { status: u16, message: String },
    /// Non-success status returned to a typed JSON helper.
    Status { status: u16, body: String },
    /// Response body did not match the expected shape.
    Decode(String),
}

impl AuthError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transport(_) => "TRANSPORT",
            Self::RefreshRejected(_) => "REFRESH_REJECTED",
            Self::ReplayUnauthorized => "REPLAY_UNAUTHORIZED",
            Self::Rejected { .. } => "REJECTED",
            Self::Status { .. } => "STATUS",
            Self::Decode(_) => "DECODE",
        }
    }

    /// HTTP status carried by this error, if any.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::ReplayUnauthorized => Some(401),
            Self::Rejected { status, .. } | Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the session was torn down as part of producing this error.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::RefreshRejected(_))
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "{}: {msg}", self.as_str()),
            Self::RefreshRejected(msg) => write!(f, "{}: {msg}", self.as_str()),
            Self::ReplayUnauthorized => {
                write!(f, "{}: request still unauthorized after token refresh", self.as_str())
            }
            Self::Rejected { status, message } => {
                write!(f, "{} ({status}): {message}", self.as_str())
            }
            Self::Status { status, body } => write!(f, "{} ({status}): {body}", self.as_str()),
            Self::Decode(msg) => write!(f, "{}: {msg}", self.as_str()),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

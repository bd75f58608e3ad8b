//! Per-item failure classification
//!
//! Every item that does not produce content ends in exactly one of these.
//! Transient kinds are retried by the scheduler; terminal kinds never are.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a single item failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "status", rename_all = "snake_case")]
pub enum ErrorKind {
    // ===== Transient =====
    /// The request did not complete within the configured timeout
    Timeout,

    /// The server answered with a 5xx status
    ServerError(u16),

    /// Connection refused, DNS failure, reset, or a body read that broke off
    Connection,

    // ===== Terminal =====
    /// The server answered with a 4xx (or other non-success) status
    ClientError(u16),

    /// The page has no main content region
    NoContent,

    /// The cleaned text is shorter than the configured minimum
    TooShort,

    /// The payload could not be decoded
    ParseError,
}

impl ErrorKind {
    /// Returns true if a retry may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout | Self::ServerError(_) | Self::Connection)
    }

    /// Returns true if the failure is a property of the item itself
    pub fn is_terminal(&self) -> bool {
        !self.is_transient()
    }

    /// Classifies a non-success HTTP status
    pub fn from_status(status: u16) -> Self {
        if (500..600).contains(&status) {
            Self::ServerError(status)
        } else {
            Self::ClientError(status)
        }
    }

    /// Stable label used in logs and the output table
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::ServerError(_) => "server_error",
            Self::Connection => "connection",
            Self::ClientError(_) => "client_error",
            Self::NoContent => "no_content",
            Self::TooShort => "too_short",
            Self::ParseError => "parse_error",
        }
    }

    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ServerError(status) | Self::ClientError(status) => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status() {
            Some(status) => write!(f, "{} (HTTP {})", self.as_str(), status),
            None => write!(f, "{}", self.as_str()),
        }
    }
}

// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Costplane plugin engine.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// Status code a plugin attaches to an error reply.
///
/// Codes travel as `SCREAMING_SNAKE_CASE` strings on the wire. A code this
/// build does not know parses to [`StatusCode::Unknown`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    InvalidArgument,
    NotFound,
    Unimplemented,
    Unavailable,
    Internal,
    DeadlineExceeded,
    ResourceExhausted,
    FailedPrecondition,
    PermissionDenied,
    Unauthenticated,
    Aborted,
    Unknown,
}

impl StatusCode {
    /// Parse a wire code, mapping anything unrecognised to `Unknown`.
    pub fn from_wire(code: &str) -> Self {
        code.parse().unwrap_or(StatusCode::Unknown)
    }
}

/// What went wrong with the transport while a call was in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ProtocolErrorKind {
    /// The per-call deadline expired before a reply arrived.
    DeadlineExceeded,
    /// The connection closed (plugin exited, pipe reset).
    ConnectionClosed,
    /// The peer sent something that is not a valid envelope.
    Malformed,
}

/// The primary error type used across the engine.
#[derive(Debug, Error)]
pub enum CostplaneError {
    /// Configuration errors (unknown plugin reference, invalid pattern syntax).
    /// Raised at load/validate time only.
    #[error("configuration error: {0}")]
    Config(String),

    /// A plugin name was referenced that no catalog entry provides.
    #[error("plugin not found: {name}")]
    PluginNotFound { name: String },

    /// Spawn failure, address-bind failure or readiness-probe timeout.
    #[error("connection to plugin {plugin} failed: {message}")]
    Connection {
        plugin: String,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Mid-call transport failure: timeout, reset, crash.
    #[error("protocol error talking to {plugin} ({kind}): {message}")]
    Protocol {
        plugin: String,
        kind: ProtocolErrorKind,
        message: String,
    },

    /// The plugin answered with an explicit error status.
    #[error("plugin {plugin} returned {code}: {message}")]
    Plugin {
        plugin: String,
        code: StatusCode,
        message: String,
    },

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CostplaneError {
    /// Shorthand for a [`CostplaneError::Connection`] without a source.
    pub fn connection(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        CostplaneError::Connection {
            plugin: plugin.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a [`CostplaneError::Protocol`].
    pub fn protocol(
        plugin: impl Into<String>,
        kind: ProtocolErrorKind,
        message: impl Into<String>,
    ) -> Self {
        CostplaneError::Protocol {
            plugin: plugin.into(),
            kind,
            message: message.into(),
        }
    }

    /// The plugin status code carried by this error, if it is a plugin reply.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            CostplaneError::Plugin { code, .. } => Some(*code),
            _ => None,
        }
    }
}

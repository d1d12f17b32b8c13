// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outcome classification of plugin call results.

use std::collections::HashMap;
use std::str::FromStr;

use costplane_config::model::ClassificationConfig;
use costplane_core::{CostplaneError, StatusCode};
use serde::Serialize;
use strum::Display;
use tracing::warn;

/// What a call result means for the candidate walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OutcomeClass {
    /// The plugin answered, possibly with zero or empty data.
    Success,
    /// Transient failure; the next tier may be tried if the candidate allows it.
    Retryable,
    /// The query itself was rejected; no other plugin is tried.
    Terminal,
    /// The caller cancelled.
    Aborted,
}

/// Maps plugin status codes to outcome classes.
///
/// `INVALID_ARGUMENT` is terminal; every other code, including codes this
/// build does not recognise, is retryable unless configured otherwise.
#[derive(Debug, Clone)]
pub struct ClassificationTable {
    overrides: HashMap<StatusCode, OutcomeClass>,
}

impl Default for ClassificationTable {
    fn default() -> Self {
        Self {
            overrides: HashMap::from([(StatusCode::InvalidArgument, OutcomeClass::Terminal)]),
        }
    }
}

impl ClassificationTable {
    /// Built-in defaults with the configured overrides applied.
    pub fn from_config(config: &ClassificationConfig) -> Self {
        let mut table = Self::default();
        for (codes, class) in [
            (&config.retryable, OutcomeClass::Retryable),
            (&config.terminal, OutcomeClass::Terminal),
        ] {
            for code in codes {
                match StatusCode::from_str(code) {
                    Ok(code) => table.set(code, class),
                    Err(_) => warn!(%code, "ignoring unknown status code in classification"),
                }
            }
        }
        table
    }

    pub fn set(&mut self, code: StatusCode, class: OutcomeClass) {
        self.overrides.insert(code, class);
    }

    pub fn classify_status(&self, code: StatusCode) -> OutcomeClass {
        self.overrides
            .get(&code)
            .copied()
            .unwrap_or(OutcomeClass::Retryable)
    }

    /// Classify a failed call.
    ///
    /// Transport, launch and probe failures are retryable; caller
    /// cancellation aborts; plugin statuses go through the table.
    pub fn classify_error(&self, error: &CostplaneError) -> OutcomeClass {
        match error {
            CostplaneError::Cancelled => OutcomeClass::Aborted,
            CostplaneError::Plugin { code, .. } => self.classify_status(*code),
            CostplaneError::Connection { .. }
            | CostplaneError::Protocol { .. }
            | CostplaneError::PluginNotFound { .. }
            | CostplaneError::Internal(_) => OutcomeClass::Retryable,
            CostplaneError::Config(_) => OutcomeClass::Terminal,
        }
    }
}

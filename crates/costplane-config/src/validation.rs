// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as positive timeouts, known log levels and well-formed status codes.
//! Checks that need the plugin catalog (unknown plugin references, pattern
//! syntax) live in the routing validator.

use std::collections::HashSet;

use costplane_core::StatusCode;

use crate::diagnostic::ConfigError;
use crate::model::CostplaneConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &CostplaneConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.engine.max_workers == 0 {
        errors.push(ConfigError::Validation {
            message: "engine.max_workers must be at least 1".to_string(),
        });
    }

    for (key, value) in [
        ("engine.call_timeout_ms", config.engine.call_timeout_ms),
        ("engine.probe_timeout_ms", config.engine.probe_timeout_ms),
    ] {
        if value == 0 {
            errors.push(ConfigError::Validation {
                message: format!("{key} must be greater than zero"),
            });
        }
    }

    if config.engine.plugin_dir.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "engine.plugin_dir must not be empty".to_string(),
        });
    }

    if !LOG_LEVELS.contains(&config.logging.level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "logging.level `{}` is not one of {}",
                config.logging.level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    for (i, entry) in config.routing.plugins.iter().enumerate() {
        if entry.name.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: format!("routing.plugins[{i}].name must not be empty"),
            });
        }
        for (j, pattern) in entry.patterns.iter().enumerate() {
            if pattern.pattern.is_empty() {
                errors.push(ConfigError::Validation {
                    message: format!("routing.plugins[{i}].patterns[{j}].pattern must not be empty"),
                });
            }
        }
    }

    let mut retryable = HashSet::new();
    for code in &config.classification.retryable {
        match code.parse::<StatusCode>() {
            Ok(parsed) => {
                retryable.insert(parsed);
            }
            Err(_) => errors.push(unknown_code("classification.retryable", code)),
        }
    }
    for code in &config.classification.terminal {
        match code.parse::<StatusCode>() {
            Ok(parsed) if retryable.contains(&parsed) => {
                errors.push(ConfigError::Validation {
                    message: format!(
                        "status code `{code}` is listed as both retryable and terminal"
                    ),
                });
            }
            Ok(_) => {}
            Err(_) => errors.push(unknown_code("classification.terminal", code)),
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn unknown_code(key: &str, code: &str) -> ConfigError {
    ConfigError::Validation {
        message: format!("{key} contains unknown status code `{code}`"),
    }
}

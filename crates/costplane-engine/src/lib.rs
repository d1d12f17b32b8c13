// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query execution for Costplane.
//!
//! The [`Engine`] routes each query to a ranked candidate list, calls the
//! candidates tier by tier through the plugin host, classifies failures to
//! decide whether to fall back, and merges the answers into a
//! [`MergedResult`] that says which plugin produced every value.

pub mod classify;
pub mod executor;
pub mod merge;

pub use classify::{ClassificationTable, OutcomeClass};
pub use executor::Engine;
pub use merge::{AttributedValue, ExecutionAttempt, MergedResult, MetricConflict, MetricValue, Outcome};

// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Routing for the Costplane plugin engine.
//!
//! This crate provides:
//! - [`MatcherSet`]: compiled resource-type patterns (glob and regex)
//! - [`RoutingEngine`]: pure routing decisions producing tiered [`CandidateList`]s
//! - [`validate`]: a static report of plugins, derivable rules, errors and warnings
//!
//! Routing never does I/O. The engine and matcher set are built once from
//! configuration and shared read-only between concurrent queries.

pub mod matcher;
pub mod router;
pub mod rules;
pub mod validate;

pub use matcher::{CompiledRule, MatcherSet, PatternError, PatternErrors};
pub use router::{Candidate, CandidateList, RouteDecision, RouteSource, RoutingEngine, Tier};
pub use rules::{RoutingRule, rules_from_config};
pub use validate::{PluginSummary, RuleSummary, ValidationReport, validate};

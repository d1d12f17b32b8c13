// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Execution controller: walks a candidate list tier by tier.
//!
//! Tiers run one after another; candidates inside a tier run concurrently.
//! The walk stops at the first tier that produces any answer, at a terminal
//! failure, or on cancellation.

use std::sync::Arc;
use std::time::Duration;

use costplane_config::CostplaneConfig;
use costplane_core::{CostplaneError, PluginAnswer, ProtocolErrorKind, ResourceQuery};
use costplane_host::{Method, PluginHost};
use costplane_router::{Candidate, RouteDecision, RoutingEngine, Tier};
use futures::StreamExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classify::{ClassificationTable, OutcomeClass};
use crate::merge::{MergedResult, Merger, Outcome};

/// Result of one candidate call.
struct AttemptResult<'a> {
    candidate: &'a Candidate,
    latency: Duration,
    result: Result<PluginAnswer, CostplaneError>,
}

/// Routes queries, calls plugins and merges their answers.
pub struct Engine {
    router: Arc<RoutingEngine>,
    host: Arc<PluginHost>,
    classification: Arc<ClassificationTable>,
    max_workers: usize,
    call_timeout: Duration,
}

impl Engine {
    pub fn new(router: Arc<RoutingEngine>, host: Arc<PluginHost>) -> Self {
        Self {
            router,
            host,
            classification: Arc::new(ClassificationTable::default()),
            max_workers: 8,
            call_timeout: Duration::from_secs(30),
        }
    }

    /// Engine tuned by the `[engine]` and `[classification]` sections.
    pub fn from_config(config: &CostplaneConfig, router: Arc<RoutingEngine>, host: Arc<PluginHost>) -> Self {
        Self::new(router, host)
            .with_max_workers(config.engine.max_workers)
            .with_call_timeout(Duration::from_millis(config.engine.call_timeout_ms))
            .with_classification(ClassificationTable::from_config(&config.classification))
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn with_classification(mut self, table: ClassificationTable) -> Self {
        self.classification = Arc::new(table);
        self
    }

    pub fn router(&self) -> &Arc<RoutingEngine> {
        &self.router
    }

    pub fn host(&self) -> &Arc<PluginHost> {
        &self.host
    }

    /// Answer one query within `deadline`.
    ///
    /// Never fails: every outcome, including no candidate, exhaustion and
    /// cancellation, is described by the returned [`MergedResult`].
    pub async fn execute(
        &self,
        query: &ResourceQuery,
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> MergedResult {
        let list = match self.router.route(query) {
            RouteDecision::Candidates(list) => list,
            RouteDecision::NoCandidate { .. } => {
                info!(resource_type = %query.resource_type, "no plugin can answer this resource");
                return MergedResult::no_candidate(query);
            }
        };

        let until = Instant::now() + deadline;
        let mut merger = Merger::new(query, list.source);

        for (index, tier) in list.tiers.iter().enumerate() {
            if cancel.is_cancelled() {
                return self.finish(query, merger, Outcome::Cancelled);
            }

            if until.saturating_duration_since(Instant::now()).is_zero() {
                for candidate in &tier.candidates {
                    merger.failure(
                        &candidate.plugin,
                        index,
                        OutcomeClass::Retryable,
                        Duration::ZERO,
                        None,
                        "query deadline passed before this candidate was tried".to_string(),
                    );
                }
                continue;
            }

            let attempts = self.run_tier(tier, query, until, cancel).await;
            let mut aborted = false;
            let mut halted = false;
            for attempt in attempts {
                let plugin = attempt.candidate.plugin.as_str();
                match attempt.result {
                    Ok(answer) => {
                        debug!(
                            plugin,
                            tier = index,
                            latency_ms = attempt.latency.as_millis() as u64,
                            empty = answer.is_empty(),
                            "plugin answered"
                        );
                        merger.success(plugin, tier.priority, answer, attempt.latency);
                    }
                    Err(error) => {
                        let class = self.classification.classify_error(&error);
                        match class {
                            OutcomeClass::Aborted => aborted = true,
                            OutcomeClass::Terminal => halted = true,
                            _ if !attempt.candidate.fallback => halted = true,
                            _ => {}
                        }
                        warn!(
                            plugin,
                            tier = index,
                            %class,
                            fallback = attempt.candidate.fallback,
                            error = %error,
                            "plugin call failed"
                        );
                        merger.failure(
                            plugin,
                            index,
                            class,
                            attempt.latency,
                            error.status_code(),
                            error.to_string(),
                        );
                    }
                }
            }

            if aborted {
                return self.finish(query, merger, Outcome::Cancelled);
            }
            if merger.has_values() {
                return self.finish(query, merger, Outcome::Answered);
            }
            if halted {
                return self.finish(query, merger, Outcome::Halted);
            }
        }

        self.finish(query, merger, Outcome::Exhausted)
    }

    /// Answer many queries with at most `max_workers` in flight.
    ///
    /// Results come back in input order. Each query gets its own `deadline`.
    pub async fn execute_batch(
        &self,
        queries: &[ResourceQuery],
        deadline: Duration,
        cancel: &CancellationToken,
    ) -> Vec<MergedResult> {
        futures::stream::iter(queries)
            .map(|query| self.execute(query, deadline, cancel))
            .buffered(self.max_workers)
            .collect()
            .await
    }

    async fn run_tier<'a>(
        &self,
        tier: &'a Tier,
        query: &ResourceQuery,
        until: Instant,
        cancel: &CancellationToken,
    ) -> Vec<AttemptResult<'a>> {
        let calls = tier.candidates.iter().map(|candidate| async move {
            let started = Instant::now();
            let result = self.attempt(candidate, query, until, cancel).await;
            AttemptResult {
                candidate,
                latency: started.elapsed(),
                result,
            }
        });
        futures::future::join_all(calls).await
    }

    async fn attempt(
        &self,
        candidate: &Candidate,
        query: &ResourceQuery,
        until: Instant,
        cancel: &CancellationToken,
    ) -> Result<PluginAnswer, CostplaneError> {
        let descriptor = self
            .router
            .catalog()
            .get(&candidate.plugin)
            .ok_or_else(|| CostplaneError::PluginNotFound {
                name: candidate.plugin.clone(),
            })?;

        let conn = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CostplaneError::Cancelled),
            conn = tokio::time::timeout_at(until, self.host.checkout(descriptor)) => {
                conn.map_err(|_| CostplaneError::protocol(
                    &candidate.plugin,
                    ProtocolErrorKind::DeadlineExceeded,
                    "query deadline passed while starting plugin",
                ))??
            }
        };

        let method = Method::for_feature(query.effective_feature());
        let params = serde_json::to_value(query).map_err(|e| CostplaneError::Internal(e.to_string()))?;
        // Checkout spent part of the budget; the call gets what is left.
        let remaining = until.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(CostplaneError::protocol(
                &candidate.plugin,
                ProtocolErrorKind::DeadlineExceeded,
                "query deadline passed before the call was sent",
            ));
        }
        let per_call = self.call_timeout.min(remaining);
        let value = conn.call(method, params, per_call, cancel).await?;

        method.decode_answer(value).map_err(|e| {
            CostplaneError::protocol(
                &candidate.plugin,
                ProtocolErrorKind::Malformed,
                format!("unexpected {method} reply: {e}"),
            )
        })
    }

    fn finish(&self, query: &ResourceQuery, merger: Merger, outcome: Outcome) -> MergedResult {
        let result = merger.finish(outcome);
        debug!(
            resource_type = %query.resource_type,
            %outcome,
            values = result.values.len(),
            conflicts = result.conflicts.len(),
            errors = result.errors.len(),
            "query finished"
        );
        result
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("max_workers", &self.max_workers)
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

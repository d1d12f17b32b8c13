// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Merging per-candidate results into one attributed answer.
//!
//! Every value keeps the plugin it came from. Values from the same tier
//! that disagree are all kept and the disagreement is reported as a
//! [`MetricConflict`]; nothing is averaged or picked silently.

use std::time::Duration;

use costplane_core::{CostValue, PluginAnswer, Recommendation, ResourceQuery, StatusCode};
use costplane_router::RouteSource;
use serde::Serialize;
use strum::Display;

use crate::classify::OutcomeClass;

/// Final state of one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// At least one candidate answered.
    Answered,
    /// Routing found no plugin for the resource.
    NoCandidate,
    /// Every tier was tried and none answered.
    Exhausted,
    /// A terminal failure stopped the walk.
    Halted,
    /// The caller cancelled the query.
    Cancelled,
}

/// A successful answer and where it came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributedValue {
    pub plugin: String,
    pub tier_priority: u32,
    pub answer: PluginAnswer,
    pub latency_ms: u64,
}

/// Disagreeing values for one metric within the deciding tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricConflict {
    pub metric: String,
    /// `(plugin, value)` pairs, ordered by plugin name.
    pub values: Vec<(String, MetricValue)>,
}

/// One plugin's side of a [`MetricConflict`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Amount(f64),
    Currency(String),
    /// Recommendation ids, sorted.
    Recommendations(Vec<String>),
    /// Answer kind, when plugins answered with different kinds.
    Kind(String),
}

/// One call against one candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionAttempt {
    pub plugin: String,
    /// Index of the tier the candidate belonged to.
    pub tier: usize,
    pub class: OutcomeClass,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<StatusCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The answer for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedResult {
    pub resource_type: String,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<RouteSource>,
    pub values: Vec<AttributedValue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<MetricConflict>,
    /// Every failed attempt from every tier, in execution order.
    pub errors: Vec<ExecutionAttempt>,
}

impl MergedResult {
    pub fn no_candidate(query: &ResourceQuery) -> Self {
        Self {
            resource_type: query.resource_type.clone(),
            outcome: Outcome::NoCandidate,
            source: None,
            values: Vec::new(),
            conflicts: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// The single value, when the result is unambiguous.
    ///
    /// Several values that agree count as unambiguous and the first (by
    /// plugin name) is returned.
    pub fn primary(&self) -> Option<&AttributedValue> {
        if self.conflicts.is_empty() {
            self.values.first()
        } else {
            None
        }
    }

    pub fn is_answered(&self) -> bool {
        self.outcome == Outcome::Answered
    }
}

/// Accumulates attempts for one query.
#[derive(Debug)]
pub(crate) struct Merger {
    resource_type: String,
    source: Option<RouteSource>,
    values: Vec<AttributedValue>,
    errors: Vec<ExecutionAttempt>,
}

impl Merger {
    pub(crate) fn new(query: &ResourceQuery, source: RouteSource) -> Self {
        Self {
            resource_type: query.resource_type.clone(),
            source: Some(source),
            values: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub(crate) fn success(&mut self, plugin: &str, tier_priority: u32, answer: PluginAnswer, latency: Duration) {
        self.values.push(AttributedValue {
            plugin: plugin.to_string(),
            tier_priority,
            answer,
            latency_ms: millis(latency),
        });
    }

    pub(crate) fn failure(
        &mut self,
        plugin: &str,
        tier: usize,
        class: OutcomeClass,
        latency: Duration,
        code: Option<StatusCode>,
        error: String,
    ) {
        self.errors.push(ExecutionAttempt {
            plugin: plugin.to_string(),
            tier,
            class,
            latency_ms: millis(latency),
            code,
            error: Some(error),
        });
    }

    pub(crate) fn has_values(&self) -> bool {
        !self.values.is_empty()
    }

    pub(crate) fn finish(mut self, outcome: Outcome) -> MergedResult {
        self.values.sort_by(|a, b| a.plugin.cmp(&b.plugin));
        let conflicts = find_conflicts(&self.values);
        MergedResult {
            resource_type: self.resource_type,
            outcome,
            source: self.source,
            values: self.values,
            conflicts,
            errors: self.errors,
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

const EPSILON: f64 = 1e-9;

fn find_conflicts(values: &[AttributedValue]) -> Vec<MetricConflict> {
    if values.len() < 2 {
        return Vec::new();
    }

    let mut costs: Vec<(&str, &CostValue)> = Vec::new();
    let mut recommendations: Vec<(&str, &[Recommendation])> = Vec::new();
    for v in values {
        match &v.answer {
            PluginAnswer::Cost(cost) => costs.push((v.plugin.as_str(), cost)),
            PluginAnswer::Recommendations { items } => recommendations.push((v.plugin.as_str(), items)),
        }
    }

    if !costs.is_empty() && !recommendations.is_empty() {
        return vec![conflict(values, "kind", |v| {
            MetricValue::Kind(match v.answer {
                PluginAnswer::Cost(_) => "cost".to_string(),
                PluginAnswer::Recommendations { .. } => "recommendations".to_string(),
            })
        })];
    }

    let mut conflicts = Vec::new();
    if let Some((_, first)) = costs.first() {
        if costs.iter().any(|(_, c)| c.currency != first.currency) {
            conflicts.push(MetricConflict {
                metric: "currency".to_string(),
                values: costs
                    .iter()
                    .map(|(p, c)| (p.to_string(), MetricValue::Currency(c.currency.clone())))
                    .collect(),
            });
        }
        let metrics: [(&str, fn(&CostValue) -> f64); 2] = [("monthly", |c| c.monthly), ("hourly", |c| c.hourly)];
        for (metric, get) in metrics {
            let base = get(first);
            if costs.iter().any(|(_, c)| (get(c) - base).abs() > EPSILON) {
                conflicts.push(MetricConflict {
                    metric: metric.to_string(),
                    values: costs
                        .iter()
                        .map(|(p, c)| (p.to_string(), MetricValue::Amount(get(c))))
                        .collect(),
                });
            }
        }
    }

    if let Some((_, first)) = recommendations.first()
        && recommendations.iter().any(|(_, items)| !same_recommendations(items, first))
    {
        conflicts.push(MetricConflict {
            metric: "recommendations".to_string(),
            values: recommendations
                .iter()
                .map(|(p, items)| (p.to_string(), MetricValue::Recommendations(sorted_ids(items))))
                .collect(),
        });
    }
    conflicts
}

fn conflict(values: &[AttributedValue], metric: &str, get: impl Fn(&AttributedValue) -> MetricValue) -> MetricConflict {
    MetricConflict {
        metric: metric.to_string(),
        values: values.iter().map(|v| (v.plugin.clone(), get(v))).collect(),
    }
}

/// Same ids with the same savings, in any order.
fn same_recommendations(a: &[Recommendation], b: &[Recommendation]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut a: Vec<&Recommendation> = a.iter().collect();
    let mut b: Vec<&Recommendation> = b.iter().collect();
    a.sort_by(|x, y| x.id.cmp(&y.id));
    b.sort_by(|x, y| x.id.cmp(&y.id));
    a.iter().zip(&b).all(|(x, y)| {
        x.id == y.id && x.currency == y.currency && (x.estimated_savings - y.estimated_savings).abs() <= EPSILON
    })
}

fn sorted_ids(items: &[Recommendation]) -> Vec<String> {
    let mut ids: Vec<String> = items.iter().map(|r| r.id.clone()).collect();
    ids.sort();
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recommendation(id: &str, savings: f64) -> Recommendation {
        Recommendation {
            id: id.to_string(),
            description: format!("{id} saves money"),
            estimated_savings: savings,
            currency: "USD".to_string(),
        }
    }

    fn merger() -> Merger {
        Merger::new(&ResourceQuery::new("aws", "aws:ec2:Instance"), RouteSource::Provider)
    }

    #[test]
    fn single_value_is_primary() {
        let mut m = merger();
        m.success("aws-public", 10, PluginAnswer::Cost(CostValue::monthly("USD", 7.3)), Duration::from_millis(4));
        let r = m.finish(Outcome::Answered);
        assert_eq!(r.primary().unwrap().plugin, "aws-public");
        assert!(r.conflicts.is_empty());
    }

    #[test]
    fn agreeing_values_have_a_primary() {
        let mut m = merger();
        m.success("b", 10, PluginAnswer::Cost(CostValue::monthly("USD", 5.0)), Duration::ZERO);
        m.success("a", 10, PluginAnswer::Cost(CostValue::monthly("USD", 5.0)), Duration::ZERO);
        let r = m.finish(Outcome::Answered);
        assert_eq!(r.values.len(), 2);
        assert_eq!(r.primary().unwrap().plugin, "a");
    }

    #[test]
    fn disagreeing_values_are_kept_and_flagged() {
        let mut m = merger();
        m.success("kubecost", 10, PluginAnswer::Cost(CostValue::monthly("USD", 12.0)), Duration::ZERO);
        m.success("aws-ce", 10, PluginAnswer::Cost(CostValue::monthly("USD", 9.5)), Duration::ZERO);
        let r = m.finish(Outcome::Answered);
        assert_eq!(r.values.len(), 2);
        assert!(r.primary().is_none());
        let monthly = r.conflicts.iter().find(|c| c.metric == "monthly").unwrap();
        assert_eq!(
            monthly.values,
            vec![
                ("aws-ce".to_string(), MetricValue::Amount(9.5)),
                ("kubecost".to_string(), MetricValue::Amount(12.0)),
            ]
        );
    }

    #[test]
    fn same_amount_in_different_currencies_conflicts() {
        let mut m = merger();
        m.success("a", 10, PluginAnswer::Cost(CostValue::monthly("USD", 5.0)), Duration::ZERO);
        m.success("b", 10, PluginAnswer::Cost(CostValue::monthly("EUR", 5.0)), Duration::ZERO);
        let r = m.finish(Outcome::Answered);
        assert!(r.primary().is_none());
        assert_eq!(r.conflicts.len(), 1);
        assert_eq!(r.conflicts[0].metric, "currency");
        assert_eq!(
            r.conflicts[0].values,
            vec![
                ("a".to_string(), MetricValue::Currency("USD".into())),
                ("b".to_string(), MetricValue::Currency("EUR".into())),
            ]
        );
    }

    #[test]
    fn differing_recommendations_conflict() {
        let mut m = merger();
        m.success(
            "a",
            10,
            PluginAnswer::Recommendations {
                items: vec![recommendation("rightsize", 12.0)],
            },
            Duration::ZERO,
        );
        m.success(
            "b",
            10,
            PluginAnswer::Recommendations {
                items: vec![recommendation("reserved", 30.0)],
            },
            Duration::ZERO,
        );
        let r = m.finish(Outcome::Answered);
        assert!(r.primary().is_none());
        assert_eq!(r.conflicts[0].metric, "recommendations");
        assert_eq!(
            r.conflicts[0].values[1],
            ("b".to_string(), MetricValue::Recommendations(vec!["reserved".into()]))
        );
    }

    #[test]
    fn recommendations_in_another_order_agree() {
        let items = vec![recommendation("rightsize", 12.0), recommendation("reserved", 30.0)];
        let mut reversed = items.clone();
        reversed.reverse();

        let mut m = merger();
        m.success("a", 10, PluginAnswer::Recommendations { items }, Duration::ZERO);
        m.success("b", 10, PluginAnswer::Recommendations { items: reversed }, Duration::ZERO);
        let r = m.finish(Outcome::Answered);
        assert!(r.conflicts.is_empty());
        assert_eq!(r.primary().unwrap().plugin, "a");
    }

    #[test]
    fn failures_are_kept_alongside_success() {
        let mut m = merger();
        m.failure(
            "primary",
            0,
            OutcomeClass::Retryable,
            Duration::from_millis(30_000),
            None,
            "deadline exceeded".into(),
        );
        m.success("secondary", 5, PluginAnswer::Cost(CostValue::monthly("USD", 1.0)), Duration::ZERO);
        let r = m.finish(Outcome::Answered);
        assert!(r.is_answered());
        assert_eq!(r.errors.len(), 1);
        assert_eq!(r.errors[0].plugin, "primary");
        assert_eq!(r.errors[0].latency_ms, 30_000);
    }

    #[test]
    fn serializes_outcome_in_snake_case() {
        let r = MergedResult::no_candidate(&ResourceQuery::new("gcp", "gcp:x:Y"));
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["outcome"], "no_candidate");
        assert!(v.get("conflicts").is_none());
    }
}

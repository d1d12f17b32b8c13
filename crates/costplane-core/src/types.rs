// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the catalog, router, host and engine.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Provider marker meaning "this plugin answers for every provider".
pub const WILDCARD_PROVIDER: &str = "*";

/// A capability a plugin can declare and a query can request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, Serialize,
    Deserialize,
)]
pub enum Feature {
    ProjectedCosts,
    ActualCosts,
    Recommendations,
    Carbon,
    DryRun,
    Budgets,
}

impl Feature {
    /// Every feature, in declaration order.
    pub const ALL: [Feature; 6] = [
        Feature::ProjectedCosts,
        Feature::ActualCosts,
        Feature::Recommendations,
        Feature::Carbon,
        Feature::DryRun,
        Feature::Budgets,
    ];

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Set of features stored as a bitset.
///
/// An empty set means the plugin declared no restriction, i.e. it serves
/// every feature. Use [`FeatureSet::permits`] rather than
/// [`FeatureSet::contains`] when making routing decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Vec<Feature>", into = "Vec<Feature>")]
pub struct FeatureSet {
    bits: u8,
}

impl FeatureSet {
    /// The unrestricted (empty) set.
    pub const fn unrestricted() -> Self {
        Self { bits: 0 }
    }

    pub fn insert(&mut self, feature: Feature) {
        self.bits |= feature.bit();
    }

    /// Strict membership test. An empty set contains nothing.
    pub fn contains(&self, feature: Feature) -> bool {
        self.bits & feature.bit() != 0
    }

    /// Whether a plugin with this declared set may serve `feature`.
    pub fn permits(&self, feature: Feature) -> bool {
        self.is_unrestricted() || self.contains(feature)
    }

    pub fn is_unrestricted(&self) -> bool {
        self.bits == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Feature> + '_ {
        Feature::ALL.into_iter().filter(|f| self.contains(*f))
    }
}

impl FromIterator<Feature> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        let mut set = FeatureSet::unrestricted();
        for feature in iter {
            set.insert(feature);
        }
        set
    }
}

impl From<Vec<Feature>> for FeatureSet {
    fn from(features: Vec<Feature>) -> Self {
        features.into_iter().collect()
    }
}

impl From<FeatureSet> for Vec<Feature> {
    fn from(set: FeatureSet) -> Self {
        set.iter().collect()
    }
}

impl fmt::Display for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unrestricted() {
            return write!(f, "all");
        }
        let names: Vec<String> = self.iter().map(|feat| feat.to_string()).collect();
        write!(f, "{}", names.join(","))
    }
}

/// Time window for actual (historical) cost lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// One cost request for one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceQuery {
    /// Provider as reported by the plan, e.g. `aws`.
    pub provider: String,
    /// Fully qualified resource type, e.g. `aws:ec2/instance:Instance`.
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Feature the caller wants answered. `None` routes without a feature
    /// filter and executes as a projected-cost lookup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<Feature>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window: Option<CostWindow>,
}

impl ResourceQuery {
    pub fn new(provider: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            resource_type: resource_type.into(),
            region: None,
            feature: None,
            properties: BTreeMap::new(),
            window: None,
        }
    }

    pub fn with_feature(mut self, feature: Feature) -> Self {
        self.feature = Some(feature);
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn with_window(mut self, window: CostWindow) -> Self {
        self.window = Some(window);
        self
    }

    /// Provider derived from the first `:`-delimited segment of the resource
    /// type. Falls back to the declared provider when the type carries no
    /// segment separator.
    pub fn derived_provider(&self) -> &str {
        match self.resource_type.split_once(':') {
            Some((head, _)) if !head.is_empty() => head,
            _ => self.provider.as_str(),
        }
    }

    /// Feature used to pick the remote operation.
    pub fn effective_feature(&self) -> Feature {
        self.feature.unwrap_or(Feature::ProjectedCosts)
    }
}

/// A cost figure returned by a plugin.
///
/// Zero is a valid answer: a free-tier resource costs nothing, and that is
/// still information the caller needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostValue {
    pub currency: String,
    #[serde(default)]
    pub monthly: f64,
    #[serde(default)]
    pub hourly: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub breakdown: BTreeMap<String, f64>,
}

impl CostValue {
    pub fn monthly(currency: impl Into<String>, monthly: f64) -> Self {
        Self {
            currency: currency.into(),
            monthly,
            hourly: monthly / 730.0,
            notes: None,
            breakdown: BTreeMap::new(),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.monthly == 0.0 && self.hourly == 0.0
    }
}

/// A cost-saving recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub estimated_savings: f64,
    pub currency: String,
}

/// Payload of a successful plugin reply, normalised per operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PluginAnswer {
    Cost(CostValue),
    Recommendations { items: Vec<Recommendation> },
}

impl PluginAnswer {
    /// Whether the answer carries no data. Empty answers are still successes.
    pub fn is_empty(&self) -> bool {
        match self {
            PluginAnswer::Cost(value) => value.is_zero(),
            PluginAnswer::Recommendations { items } => items.is_empty(),
        }
    }
}

/// Reply to the capability-introspection operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub providers: Vec<String>,
    #[serde(default)]
    pub features: FeatureSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
}

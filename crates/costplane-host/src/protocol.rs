// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin wire protocol.
//!
//! One JSON object per line in each direction:
//!
//! ```text
//! -> {"id":1,"method":"GetProjectedCost","params":{...}}
//! <- {"id":1,"result":{...}}
//! <- {"id":2,"error":{"code":"INVALID_ARGUMENT","message":"..."}}
//! ```
//!
//! Replies may arrive in any order; the `id` ties each reply to its request.

use costplane_core::{CostValue, Feature, PluginAnswer, Recommendation};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Environment variable telling a plugin which transport to serve.
pub const ENV_PLUGIN_MODE: &str = "COSTPLANE_PLUGIN_MODE";
/// Environment variable carrying the TCP port in `tcp` mode.
pub const ENV_PLUGIN_PORT: &str = "COSTPLANE_PLUGIN_PORT";

/// Remote operations a plugin serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
pub enum Method {
    /// Identity; also the readiness probe.
    Name,
    GetProjectedCost,
    GetActualCost,
    GetRecommendations,
    EstimateCost,
    /// Capability introspection.
    GetPluginInfo,
}

impl Method {
    /// Operation that answers a query for `feature`.
    pub fn for_feature(feature: Feature) -> Self {
        match feature {
            Feature::ProjectedCosts | Feature::Carbon => Method::GetProjectedCost,
            Feature::ActualCosts | Feature::Budgets => Method::GetActualCost,
            Feature::Recommendations => Method::GetRecommendations,
            Feature::DryRun => Method::EstimateCost,
        }
    }

    /// Normalise a successful reply into a [`PluginAnswer`].
    ///
    /// A `null` cost result decodes as an empty answer so that a plugin
    /// reporting "no cost" is still a success.
    pub fn decode_answer(self, result: serde_json::Value) -> Result<PluginAnswer, serde_json::Error> {
        match self {
            Method::GetRecommendations => {
                let items: Vec<Recommendation> = match result {
                    serde_json::Value::Null => Vec::new(),
                    serde_json::Value::Array(_) => serde_json::from_value(result)?,
                    other => serde_json::from_value::<RecommendationsReply>(other)?.items,
                };
                Ok(PluginAnswer::Recommendations { items })
            }
            _ => {
                if result.is_null() {
                    return Ok(PluginAnswer::Cost(CostValue::monthly("USD", 0.0)));
                }
                Ok(PluginAnswer::Cost(serde_json::from_value(result)?))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RecommendationsReply {
    #[serde(default)]
    items: Vec<Recommendation>,
}

/// Host-to-plugin request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: u64,
    pub method: Method,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Error body of a reply. `code` is a status-code wire name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Plugin-to-host reply envelope. Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

impl Response {
    pub fn ok(id: u64, result: serde_json::Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: u64, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(WireError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// Reply to [`Method::Name`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameReply {
    pub name: String,
}

/// Serialize one envelope as a newline-terminated line.
pub fn encode_line<T: Serialize>(envelope: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut line = serde_json::to_vec(envelope)?;
    line.push(b'\n');
    Ok(line)
}

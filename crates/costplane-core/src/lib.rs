// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Costplane plugin engine.
//!
//! This crate provides the error taxonomy and the domain types shared by the
//! capability catalog, the router, the plugin host and the execution engine.

pub mod error;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::{CostplaneError, ProtocolErrorKind, StatusCode};
pub use types::{
    CostValue, CostWindow, Feature, FeatureSet, PluginAnswer, PluginInfo, Recommendation,
    ResourceQuery, WILDCARD_PROVIDER,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn feature_display_and_from_str_round_trip() {
        for feature in Feature::ALL {
            let s = feature.to_string();
            let parsed = Feature::from_str(&s).expect("should parse back");
            assert_eq!(feature, parsed);
        }
        assert!(Feature::from_str("Teleport").is_err());
    }

    #[test]
    fn empty_feature_set_permits_everything() {
        let set = FeatureSet::unrestricted();
        assert!(set.is_unrestricted());
        for feature in Feature::ALL {
            assert!(set.permits(feature));
            assert!(!set.contains(feature));
        }
        assert_eq!(set.to_string(), "all");
    }

    #[test]
    fn restricted_feature_set_checks_membership() {
        let set: FeatureSet = [Feature::ProjectedCosts, Feature::Carbon].into_iter().collect();
        assert!(set.permits(Feature::ProjectedCosts));
        assert!(set.permits(Feature::Carbon));
        assert!(!set.permits(Feature::ActualCosts));
        assert_eq!(set.to_string(), "ProjectedCosts,Carbon");
    }

    #[test]
    fn feature_set_serializes_as_list() {
        let set: FeatureSet = [Feature::Recommendations].into_iter().collect();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["Recommendations"]"#);
        let back: FeatureSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn derived_provider_uses_first_segment() {
        let q = ResourceQuery::new("ignored", "aws:eks/cluster:Cluster");
        assert_eq!(q.derived_provider(), "aws");

        let q = ResourceQuery::new("gcp", "ComputeInstance");
        assert_eq!(q.derived_provider(), "gcp");

        let q = ResourceQuery::new("azure", ":weird");
        assert_eq!(q.derived_provider(), "azure");
    }

    #[test]
    fn effective_feature_defaults_to_projected() {
        let q = ResourceQuery::new("aws", "aws:s3:Bucket");
        assert_eq!(q.effective_feature(), Feature::ProjectedCosts);
        let q = q.with_feature(Feature::ActualCosts);
        assert_eq!(q.effective_feature(), Feature::ActualCosts);
    }

    #[test]
    fn zero_cost_is_empty_but_well_formed() {
        let answer = PluginAnswer::Cost(CostValue::monthly("USD", 0.0));
        assert!(answer.is_empty());
        let answer = PluginAnswer::Cost(CostValue::monthly("USD", 7.3));
        assert!(!answer.is_empty());
    }

    #[test]
    fn status_code_wire_parsing() {
        assert_eq!(StatusCode::from_wire("INVALID_ARGUMENT"), StatusCode::InvalidArgument);
        assert_eq!(StatusCode::from_wire("UNAVAILABLE"), StatusCode::Unavailable);
        assert_eq!(StatusCode::from_wire("SOMETHING_NEW"), StatusCode::Unknown);
        assert_eq!(StatusCode::DeadlineExceeded.to_string(), "DEADLINE_EXCEEDED");
    }

    #[test]
    fn costplane_error_variants_render() {
        let err = CostplaneError::connection("aws-public", "probe timed out");
        assert!(err.to_string().contains("aws-public"));

        let err = CostplaneError::protocol(
            "aws-public",
            ProtocolErrorKind::DeadlineExceeded,
            "no reply within 5s",
        );
        assert!(err.to_string().contains("deadline_exceeded"));

        let err = CostplaneError::Plugin {
            plugin: "eks-costs".into(),
            code: StatusCode::InvalidArgument,
            message: "missing region".into(),
        };
        assert_eq!(err.status_code(), Some(StatusCode::InvalidArgument));
        assert_eq!(CostplaneError::Cancelled.status_code(), None);
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn feature_set_round_trips_through_vec(mask in 0u8..64) {
                let features: Vec<Feature> = Feature::ALL
                    .into_iter()
                    .enumerate()
                    .filter(|(i, _)| mask & (1 << i) != 0)
                    .map(|(_, f)| f)
                    .collect();
                let set: FeatureSet = features.clone().into();
                let back: Vec<Feature> = set.into();
                prop_assert_eq!(back, features);
            }
        }
    }
}

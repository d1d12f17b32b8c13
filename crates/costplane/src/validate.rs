// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `costplane validate` command implementation.
//!
//! Checks `[[routing.plugins]]` against the installed plugins without
//! launching anything. Exits non-zero when the report has errors.

use costplane_config::model::CostplaneConfig;
use costplane_core::CostplaneError;
use costplane_router::{PluginSummary, RuleSummary, ValidationReport};
use serde::Serialize;

use crate::setup;

/// JSON form of a [`ValidationReport`].
#[derive(Debug, Serialize)]
struct ReportJson<'a> {
    ok: bool,
    plugins: &'a [PluginSummary],
    rules: &'a [RuleSummary],
    errors: Vec<String>,
    warnings: &'a [String],
}

impl<'a> From<&'a ValidationReport> for ReportJson<'a> {
    fn from(report: &'a ValidationReport) -> Self {
        Self {
            ok: report.is_ok(),
            plugins: &report.plugins,
            rules: &report.rules,
            errors: report.errors.iter().map(ToString::to_string).collect(),
            warnings: &report.warnings,
        }
    }
}

/// Run the `costplane validate` command. Returns the process exit code.
pub fn run_validate(config: &CostplaneConfig, json: bool) -> Result<i32, CostplaneError> {
    let catalog = setup::discover_catalog(config)?;
    let report = costplane_router::validate(&config.routing, &catalog);

    if json {
        let body = serde_json::to_string_pretty(&ReportJson::from(&report))
            .map_err(|e| CostplaneError::Internal(format!("failed to encode report: {e}")))?;
        println!("{body}");
    } else {
        print!("{report}");
        if !report.errors.is_empty() {
            costplane_config::render_errors(&report.errors);
        }
    }

    Ok(if report.is_ok() { 0 } else { 1 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use costplane_plugin::{CapabilityCatalog, PluginDescriptor};

    #[test]
    fn json_report_flattens_errors() {
        let config = costplane_config::load_and_validate_str(
            r#"
            [[routing.plugins]]
            name = "aws-publik"
            "#,
        )
        .unwrap();
        let catalog: CapabilityCatalog =
            [PluginDescriptor::new("aws-public", semver::Version::new(1, 0, 0)).with_providers(["aws"])]
                .into_iter()
                .collect();
        let report = costplane_router::validate(&config.routing, &catalog);
        let json = serde_json::to_value(ReportJson::from(&report)).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["plugins"][0]["name"], "aws-public");
        assert!(json["errors"][0].as_str().unwrap().contains("aws-publik"));
    }
}

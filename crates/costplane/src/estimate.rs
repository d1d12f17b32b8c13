// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `costplane estimate` command implementation.
//!
//! Builds queries from the command line or from a file, runs them through
//! the engine with bounded concurrency and prints one JSON result per line.
//! Plugin processes are stopped before the command returns, including after
//! Ctrl+C.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use costplane_config::model::CostplaneConfig;
use costplane_core::{CostplaneError, Feature, ResourceQuery};
use costplane_engine::{MergedResult, Outcome};
use tracing::info;

use crate::{setup, shutdown};

#[derive(Args, Debug)]
pub struct EstimateArgs {
    /// Resource type, e.g. `aws:ec2/instance:Instance`.
    pub resource_type: Option<String>,

    /// Provider name. Defaults to the resource type's first segment.
    #[arg(long)]
    pub provider: Option<String>,

    /// Feature to answer.
    #[arg(long)]
    pub feature: Option<Feature>,

    #[arg(long)]
    pub region: Option<String>,

    /// Resource property as KEY=VALUE. VALUE is parsed as JSON when it can be.
    #[arg(long = "property", value_parser = parse_property)]
    pub properties: Vec<(String, serde_json::Value)>,

    /// File of queries: a JSON array or one JSON object per line. `-` reads stdin.
    #[arg(long, conflicts_with = "resource_type")]
    pub input: Option<PathBuf>,

    /// Deadline for each query, across all of its fallback attempts.
    #[arg(long, default_value_t = 60_000)]
    pub deadline_ms: u64,
}

/// Run the `costplane estimate` command. Returns the process exit code.
pub async fn run_estimate(config: &CostplaneConfig, args: EstimateArgs) -> Result<i32, CostplaneError> {
    let deadline = Duration::from_millis(args.deadline_ms);
    let queries = match &args.input {
        Some(path) => read_queries(path)?,
        None => vec![query_from_args(args)?],
    };

    let catalog = setup::discover_catalog(config)?;
    let (engine, host) = setup::build_engine(config, catalog);
    let cancel = shutdown::install_signal_handler();

    info!(queries = queries.len(), "estimating");
    let results = engine.execute_batch(&queries, deadline, &cancel).await;

    host.shutdown(Duration::from_millis(config.engine.shutdown_grace_ms))
        .await;
    let interrupted = cancel.is_cancelled();
    cancel.cancel();

    for result in &results {
        let line = serde_json::to_string(result)
            .map_err(|e| CostplaneError::Internal(format!("failed to encode result: {e}")))?;
        println!("{line}");
    }

    Ok(exit_code(&results, interrupted))
}

/// 0 when every query was answered or had no plugin, 130 on interrupt,
/// 1 otherwise.
fn exit_code(results: &[MergedResult], interrupted: bool) -> i32 {
    if interrupted {
        return 130;
    }
    let all_settled = results
        .iter()
        .all(|r| matches!(r.outcome, Outcome::Answered | Outcome::NoCandidate));
    if all_settled { 0 } else { 1 }
}

fn query_from_args(args: EstimateArgs) -> Result<ResourceQuery, CostplaneError> {
    let resource_type = args
        .resource_type
        .ok_or_else(|| CostplaneError::Config("a resource type or --input is required".to_string()))?;
    let provider = match args.provider {
        Some(provider) => provider,
        None => match resource_type.split_once(':') {
            Some((head, _)) if !head.is_empty() => head.to_string(),
            _ => {
                return Err(CostplaneError::Config(format!(
                    "cannot derive a provider from `{resource_type}`; pass --provider"
                )));
            }
        },
    };

    let mut query = ResourceQuery::new(provider, resource_type);
    query.feature = args.feature;
    query.region = args.region;
    for (key, value) in args.properties {
        query = query.with_property(key, value);
    }
    Ok(query)
}

fn read_queries(path: &Path) -> Result<Vec<ResourceQuery>, CostplaneError> {
    let mut text = String::new();
    let read = if path == Path::new("-") {
        std::io::stdin().read_to_string(&mut text).map(|_| ())
    } else {
        std::fs::read_to_string(path).map(|t| text = t)
    };
    read.map_err(|e| CostplaneError::Config(format!("cannot read {}: {e}", path.display())))?;
    parse_queries(&text)
}

fn parse_queries(text: &str) -> Result<Vec<ResourceQuery>, CostplaneError> {
    if text.trim_start().starts_with('[') {
        return serde_json::from_str(text)
            .map_err(|e| CostplaneError::Config(format!("invalid query array: {e}")));
    }
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str(line)
                .map_err(|e| CostplaneError::Config(format!("invalid query on line {}: {e}", n + 1)))
        })
        .collect()
}

fn parse_property(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))?;
    if key.is_empty() {
        return Err(format!("empty property name in `{raw}`"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

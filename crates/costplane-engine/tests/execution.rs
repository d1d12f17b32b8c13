// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end execution tests against in-process mock plugins.

use std::time::Duration;

use costplane_config::model::PatternConfig;
use costplane_core::{CostValue, PluginAnswer, ResourceQuery, StatusCode};
use costplane_engine::{MetricValue, OutcomeClass, Outcome};
use costplane_host::ProcessState;
use costplane_router::{RouteSource, RoutingRule};
use costplane_test_utils::{MockBehavior, TestHarness, descriptor};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn ec2() -> ResourceQuery {
    ResourceQuery::new("aws", "aws:ec2/instance:Instance")
}

fn cost(answer: &PluginAnswer) -> f64 {
    match answer {
        PluginAnswer::Cost(value) => value.monthly,
        other => panic!("expected a cost, got {other:?}"),
    }
}

#[tokio::test]
async fn timed_out_primary_falls_back_to_secondary() {
    let h = TestHarness::builder()
        .with_plugin(descriptor("primary", &["aws"], 20), MockBehavior::Hang)
        .with_plugin(descriptor("secondary", &["aws"], 10), MockBehavior::Cost(42.0))
        .with_call_timeout(Duration::from_millis(200))
        .build()
        .unwrap();

    let r = h.estimate(&ec2()).await;
    assert_eq!(r.outcome, Outcome::Answered);
    assert_eq!(r.source, Some(RouteSource::Provider));
    let value = r.primary().unwrap();
    assert_eq!(value.plugin, "secondary");
    assert_eq!(value.tier_priority, 10);
    assert_eq!(cost(&value.answer), 42.0);

    assert_eq!(r.errors.len(), 1);
    assert_eq!(r.errors[0].plugin, "primary");
    assert_eq!(r.errors[0].tier, 0);
    assert_eq!(r.errors[0].class, OutcomeClass::Retryable);
    assert!(r.errors[0].latency_ms >= 200);
}

#[tokio::test]
async fn invalid_argument_stops_the_walk() {
    let h = TestHarness::builder()
        .with_plugin(
            descriptor("primary", &["aws"], 20),
            MockBehavior::Fail(StatusCode::InvalidArgument),
        )
        .with_plugin(descriptor("secondary", &["aws"], 10), MockBehavior::Cost(1.0))
        .build()
        .unwrap();

    let r = h.estimate(&ec2()).await;
    assert_eq!(r.outcome, Outcome::Halted);
    assert!(r.values.is_empty());
    assert_eq!(r.errors[0].class, OutcomeClass::Terminal);
    assert_eq!(r.errors[0].code, Some(StatusCode::InvalidArgument));
    assert_eq!(h.calls("secondary"), 0);
    assert_eq!(h.launches("secondary"), 0);
}

#[tokio::test]
async fn zero_cost_is_an_answer() {
    let h = TestHarness::builder()
        .with_plugin(descriptor("free-tier", &["aws"], 20), MockBehavior::Zero)
        .with_plugin(descriptor("secondary", &["aws"], 10), MockBehavior::Cost(3.0))
        .build()
        .unwrap();

    let r = h.estimate(&ec2()).await;
    assert_eq!(r.outcome, Outcome::Answered);
    let value = r.primary().unwrap();
    assert_eq!(value.plugin, "free-tier");
    assert_eq!(value.answer, PluginAnswer::Cost(CostValue::monthly("USD", 0.0)));
    assert!(r.errors.is_empty());
    assert_eq!(h.calls("secondary"), 0);
}

#[tokio::test]
async fn every_tier_failing_is_exhausted() {
    let h = TestHarness::builder()
        .with_plugin(
            descriptor("a", &["aws"], 20),
            MockBehavior::Fail(StatusCode::Unavailable),
        )
        .with_plugin(
            descriptor("b", &["aws"], 10),
            MockBehavior::Fail(StatusCode::Internal),
        )
        .build()
        .unwrap();

    let r = h.estimate(&ec2()).await;
    assert_eq!(r.outcome, Outcome::Exhausted);
    assert!(r.values.is_empty());
    let failed: Vec<&str> = r.errors.iter().map(|e| e.plugin.as_str()).collect();
    assert_eq!(failed, vec!["a", "b"]);
}

#[tokio::test]
async fn unknown_provider_has_no_candidate_and_launches_nothing() {
    let h = TestHarness::builder()
        .with_plugin(descriptor("aws-public", &["aws"], 10), MockBehavior::Cost(1.0))
        .build()
        .unwrap();

    let r = h.estimate(&ResourceQuery::new("azure", "azure:compute:VirtualMachine")).await;
    assert_eq!(r.outcome, Outcome::NoCandidate);
    assert!(r.values.is_empty() && r.errors.is_empty());
    assert_eq!(h.launcher.total_launches(), 0);
}

#[tokio::test]
async fn plugin_process_is_reused_across_queries() {
    let h = TestHarness::builder()
        .with_plugin(descriptor("aws-public", &["aws"], 10), MockBehavior::Cost(7.3))
        .build()
        .unwrap();

    for _ in 0..3 {
        assert!(h.estimate(&ec2()).await.is_answered());
    }
    assert_eq!(h.launches("aws-public"), 1);
    assert_eq!(h.calls("aws-public"), 3);
    assert_eq!(h.host.len().await, 1);
}

#[tokio::test]
async fn equal_priority_plugins_fan_out_and_conflicts_are_kept() {
    let h = TestHarness::builder()
        .with_plugin(descriptor("kubecost", &["aws"], 10), MockBehavior::Cost(12.0))
        .with_plugin(descriptor("aws-ce", &["aws"], 10), MockBehavior::Cost(9.5))
        .build()
        .unwrap();

    let r = h.estimate(&ec2()).await;
    assert_eq!(r.outcome, Outcome::Answered);
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

#[tokio::test]
async fn candidate_without_fallback_halts_on_retryable_failure() {
    let h = TestHarness::builder()
        .with_plugin(
            descriptor("primary", &["aws"], 20),
            MockBehavior::Fail(StatusCode::Unavailable),
        )
        .with_plugin(descriptor("secondary", &["aws"], 10), MockBehavior::Cost(1.0))
        .with_rule(RoutingRule::provider("primary").with_fallback(false))
        .build()
        .unwrap();

    let r = h.estimate(&ec2()).await;
    assert_eq!(r.outcome, Outcome::Halted);
    assert_eq!(r.errors[0].class, OutcomeClass::Retryable);
    assert_eq!(h.calls("secondary"), 0);
}

#[tokio::test]
async fn cancellation_aborts_without_fallback() {
    let h = TestHarness::builder()
        .with_plugin(descriptor("primary", &["aws"], 20), MockBehavior::Hang)
        .with_plugin(descriptor("secondary", &["aws"], 10), MockBehavior::Cost(1.0))
        .build()
        .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let r = h.engine.execute(&ec2(), Duration::from_secs(10), &cancel).await;
    assert_eq!(r.outcome, Outcome::Cancelled);
    assert_eq!(r.errors.len(), 1);
    assert_eq!(r.errors[0].class, OutcomeClass::Aborted);
    assert_eq!(h.calls("secondary"), 0);

    // The cancelled call leaves the process running for the next query.
    let key = descriptor("primary", &["aws"], 20).key();
    assert_eq!(h.host.process_state(&key).await, Some(ProcessState::Ready));
    assert_eq!(h.host.len().await, 1);
}

#[tokio::test]
async fn query_deadline_skips_remaining_tiers() {
    let h = TestHarness::builder()
        .with_plugin(descriptor("primary", &["aws"], 20), MockBehavior::Hang)
        .with_plugin(descriptor("secondary", &["aws"], 10), MockBehavior::Cost(1.0))
        .with_deadline(Duration::from_millis(150))
        .build()
        .unwrap();

    let r = h.estimate(&ec2()).await;
    assert_eq!(r.outcome, Outcome::Exhausted);
    let failed: Vec<&str> = r.errors.iter().map(|e| e.plugin.as_str()).collect();
    assert_eq!(failed, vec!["primary", "secondary"]);
    assert_eq!(h.calls("secondary"), 0);
}

#[tokio::test(start_paused = true)]
async fn checkout_time_counts_against_the_query_deadline() {
    let h = TestHarness::builder()
        .with_plugin(descriptor("primary", &["aws"], 20), MockBehavior::Hang)
        .with_launch_delay(Duration::from_millis(150))
        .with_call_timeout(Duration::from_secs(5))
        .with_deadline(Duration::from_millis(200))
        .build()
        .unwrap();

    let started = Instant::now();
    let r = h.estimate(&ec2()).await;
    let elapsed = started.elapsed();

    assert_eq!(r.outcome, Outcome::Exhausted);
    assert!(elapsed <= Duration::from_millis(210), "took {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn slow_start_cut_short_by_deadline_serves_the_next_query() {
    let h = TestHarness::builder()
        .with_plugin(descriptor("aws-public", &["aws"], 10), MockBehavior::Cost(5.0))
        .with_launch_delay(Duration::from_millis(300))
        .build()
        .unwrap();
    let cancel = CancellationToken::new();

    let first = h.engine.execute(&ec2(), Duration::from_millis(100), &cancel).await;
    assert_eq!(first.outcome, Outcome::Exhausted);

    let second = h.engine.execute(&ec2(), Duration::from_secs(5), &cancel).await;
    assert_eq!(second.outcome, Outcome::Answered, "{:?}", second.errors);
    assert_eq!(cost(&second.primary().unwrap().answer), 5.0);
    assert_eq!(h.launches("aws-public"), 1);
}

#[tokio::test]
async fn pattern_rule_takes_the_resource_exclusively() {
    let h = TestHarness::builder()
        .with_plugin(descriptor("aws-public", &["aws"], 50), MockBehavior::Cost(1.0))
        .with_plugin(descriptor("kubecost", &["kubernetes"], 10), MockBehavior::Cost(88.0))
        .with_rule(RoutingRule::pattern("kubecost", PatternConfig::glob("aws:eks*")))
        .build()
        .unwrap();

    let r = h.estimate(&ResourceQuery::new("aws", "aws:eks/cluster:Cluster")).await;
    assert_eq!(r.source, Some(RouteSource::Pattern));
    assert_eq!(r.primary().unwrap().plugin, "kubecost");
    assert_eq!(h.calls("aws-public"), 0);

    let r = h.estimate(&ec2()).await;
    assert_eq!(r.primary().unwrap().plugin, "aws-public");
}

#[tokio::test]
async fn launch_and_probe_failures_fall_back() {
    let h = TestHarness::builder()
        .with_unlaunchable(descriptor("broken", &["aws"], 30))
        .with_plugin(descriptor("mute", &["aws"], 20), MockBehavior::Silent)
        .with_plugin(descriptor("backup", &["aws"], 10), MockBehavior::Cost(2.0))
        .with_probe_timeout(Duration::from_millis(100))
        .build()
        .unwrap();

    let r = h.estimate(&ec2()).await;
    assert_eq!(r.outcome, Outcome::Answered);
    assert_eq!(r.primary().unwrap().plugin, "backup");
    let failed: Vec<&str> = r.errors.iter().map(|e| e.plugin.as_str()).collect();
    assert_eq!(failed, vec!["broken", "mute"]);
    assert!(r.errors[1].error.as_deref().unwrap().contains("readiness probe failed"));
}

#[tokio::test]
async fn crashed_plugin_is_relaunched_for_the_next_query() {
    let h = TestHarness::builder()
        .with_plugin(descriptor("flaky", &["aws"], 20), MockBehavior::Crash)
        .with_plugin(descriptor("steady", &["aws"], 10), MockBehavior::Cost(4.0))
        .build()
        .unwrap();

    let first = h.estimate(&ec2()).await;
    assert_eq!(first.primary().unwrap().plugin, "steady");
    let second = h.estimate(&ec2()).await;
    assert_eq!(second.primary().unwrap().plugin, "steady");

    assert_eq!(h.launches("flaky"), 2);
    assert_eq!(h.launches("steady"), 1);
}

#[tokio::test]
async fn batch_keeps_input_order_and_isolates_failures() {
    let h = TestHarness::builder()
        .with_plugin(descriptor("aws-public", &["aws"], 10), MockBehavior::Cost(5.0))
        .with_plugin(
            descriptor("gcp-public", &["gcp"], 10),
            MockBehavior::Fail(StatusCode::Unavailable),
        )
        .with_max_workers(2)
        .build()
        .unwrap();

    let queries = vec![
        ec2(),
        ResourceQuery::new("gcp", "gcp:compute:Instance"),
        ResourceQuery::new("azure", "azure:compute:VirtualMachine"),
        ResourceQuery::new("aws", "aws:rds/instance:Instance"),
    ];
    let results = h.estimate_batch(&queries).await;
    let outcomes: Vec<Outcome> = results.iter().map(|r| r.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            Outcome::Answered,
            Outcome::Exhausted,
            Outcome::NoCandidate,
            Outcome::Answered
        ]
    );
    assert_eq!(results[3].resource_type, "aws:rds/instance:Instance");
}

#[tokio::test]
async fn recommendations_use_their_own_operation() {
    let h = TestHarness::builder()
        .with_plugin(descriptor("advisor", &["aws"], 10), MockBehavior::Cost(15.0))
        .build()
        .unwrap();

    let r = h
        .estimate(&ec2().with_feature(costplane_core::Feature::Recommendations))
        .await;
    match &r.primary().unwrap().answer {
        PluginAnswer::Recommendations { items } => {
            assert_eq!(items.len(), 1);
            assert_eq!(items[0].estimated_savings, 15.0);
        }
        other => panic!("expected recommendations, got {other:?}"),
    }
}

#[tokio::test]
async fn shutdown_stops_launched_plugins() {
    let h = TestHarness::builder()
        .with_plugin(descriptor("aws-public", &["aws"], 10), MockBehavior::Cost(1.0))
        .build()
        .unwrap();
    h.estimate(&ec2()).await;
    assert_eq!(h.host.len().await, 1);
    h.shutdown().await;
    assert!(h.host.is_empty().await);
}

//! Collector output through the buffers into bulk requests.

mod common;

use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use fleet_agent_core::error::CollectorError;
use fleet_agent_core::network::Method;
use fleet_agent_core::storage::{AgentHealth, StateStore};
use fleet_agent_core::testing::fixtures;
use fleet_agent_core::{
    AgentError, CollectorKind, RunOutcome, RunTrigger, TaskKind, TaskReport, UploadOutcome,
};
use serde_json::{json, Map, Value};

fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn bulk_url() -> String {
    format!(
        "{}/logs-{}-default/_bulk",
        fixtures::ES_HOST,
        fixtures::DATASET
    )
}

#[test]
fn test_ingest_requires_enabled_collector() {
    let t = common::enrolled(Some(fixtures::policy(1)));

    let err = t
        .agent
        .ingest(CollectorKind::SecurityLogs, fields(json!({"event.code": 210001})))
        .unwrap_err();
    assert!(matches!(
        err,
        AgentError::Collector(CollectorError::Disabled(CollectorKind::SecurityLogs))
    ));

    let seq = t
        .agent
        .ingest(CollectorKind::Location, fields(json!({"geo.location": "52.1,4.3"})))
        .unwrap();
    assert!(seq > 0);
    let stats = t.store.load_statistics().unwrap().unwrap();
    assert_eq!(stats.combined_buffer_size, 1);
}

#[test]
fn test_ingest_before_enrollment_fails() {
    let t = common::fresh();
    let err = t
        .agent
        .ingest(CollectorKind::Location, fields(json!({"geo.location": "0,0"})))
        .unwrap_err();
    assert!(matches!(err, AgentError::NotEnrolled));

    // Enrolled but policy not yet delivered.
    let t = common::enrolled(None);
    let err = t
        .agent
        .ingest(CollectorKind::Location, fields(json!({"geo.location": "0,0"})))
        .unwrap_err();
    assert!(matches!(err, AgentError::NotEnrolled));
}

#[test]
fn test_upload_ships_buffered_documents() {
    let t = common::enrolled(Some(fixtures::policy(1)));
    for i in 0..3 {
        t.agent
            .ingest_at(
                CollectorKind::Location,
                fields(json!({"geo.location": format!("52.{},4.3", i)})),
                fixtures::received_at(),
            )
            .unwrap();
    }
    t.agent
        .ingest_at(
            CollectorKind::SelfLog,
            fields(json!({"message": "started", "log.level": "info"})),
            fixtures::received_at(),
        )
        .unwrap();
    assert_eq!(t.agent.status().unwrap().total_buffered(), 4);

    t.transport
        .respond(Method::Put, "/_bulk", Ok(fixtures::bulk_response(false)));

    let report = t.agent.run_upload(RunTrigger::default());

    assert_eq!(report.outcome, RunOutcome::Succeeded);
    assert_eq!(
        report.detail,
        Some(UploadOutcome::Shipped {
            count: 4,
            index: format!("logs-{}-default", fixtures::DATASET),
            rejected_items: 0,
        })
    );
    assert_eq!(report.next_run, Some(Duration::from_secs(30)));

    let sent = t.transport.requests_to("/_bulk");
    assert_eq!(sent.len(), 1);
    let request = &sent[0];
    assert_eq!(request.method, Method::Put);
    assert_eq!(request.url, bulk_url());
    let expected_auth = format!("ApiKey {}", STANDARD.encode(fixtures::OUTPUT_API_KEY));
    assert_eq!(request.header_value("Authorization"), Some(expected_auth.as_str()));

    let body = request.body.as_deref().unwrap();
    assert_eq!(body.lines().count(), 8);
    assert!(body.ends_with('\n'));
    assert!(body.contains("\"@timestamp\":\"2024-03-19T21:25:27.000Z\""));
    assert!(body.contains(fixtures::AGENT_ID));

    let status = t.agent.status().unwrap();
    assert_eq!(status.total_buffered(), 0);
    let stats = status.statistics.unwrap();
    assert_eq!(stats.combined_buffer_size, 0);
    assert_eq!(stats.last_shipped_count, 4);
    assert!(stats.last_shipped_at.is_some());
}

#[test]
fn test_empty_buffers_back_off_when_enabled() {
    let mut policy = fixtures::policy(1);
    policy.backoff_on_empty_buffer = true;
    let t = common::enrolled(Some(policy));

    let first = t.agent.run_upload(RunTrigger::default());
    let second = t.agent.run_upload(RunTrigger::default());

    assert_eq!(first.outcome, RunOutcome::Idle);
    assert_eq!(first.detail, Some(UploadOutcome::Empty));
    assert_eq!(first.next_run, Some(Duration::from_secs(60)));
    assert_eq!(second.next_run, Some(Duration::from_secs(120)));
    assert!(t.transport.requests().is_empty());

    let stats = t.store.load_statistics().unwrap().unwrap();
    assert_eq!(stats.total_failures, 0);
    // Backed off without failing still counts against health.
    assert_eq!(stats.agent_health, AgentHealth::Unhealthy);
}

#[test]
fn test_empty_buffers_keep_interval_by_default() {
    let t = common::enrolled(Some(fixtures::policy(1)));

    let report = t.agent.run_upload(RunTrigger::default());

    assert_eq!(report.outcome, RunOutcome::Idle);
    assert_eq!(report.next_run, Some(Duration::from_secs(30)));
}

#[test]
fn test_failed_upload_drops_claimed_documents() {
    let t = common::enrolled(Some(fixtures::policy(1)));
    t.agent
        .ingest(CollectorKind::Location, fields(json!({"geo.location": "1,1"})))
        .unwrap();
    t.transport.respond(
        Method::Put,
        "/_bulk",
        Ok(fixtures::error_response(503, "Service Unavailable", "cluster busy")),
    );

    let report = t.agent.run_upload(RunTrigger::default());

    assert_eq!(report.outcome, RunOutcome::Failed);
    assert_eq!(report.next_run, Some(Duration::from_secs(60)));
    assert_eq!(t.agent.status().unwrap().total_buffered(), 0);
    let stats = t.store.load_statistics().unwrap().unwrap();
    assert_eq!(stats.total_failures, 1);
    assert_eq!(stats.agent_health, AgentHealth::Unhealthy);
}

#[test]
fn test_run_job_dispatches_by_job_id() {
    let t = common::enrolled(Some(fixtures::policy(1)));

    match t.agent.run_job("bulk-upload", RunTrigger::default()) {
        Some(TaskReport::Upload(report)) => {
            assert_eq!(report.task, TaskKind::Upload);
            assert_eq!(report.outcome, RunOutcome::Idle);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(t.agent.run_job("sync-contacts", RunTrigger::default()).is_none());
}

#[test]
fn test_low_battery_holds_upload_back() {
    let mut policy = fixtures::policy(1);
    policy.disable_if_battery_low = true;
    let t = common::enrolled(Some(policy));
    t.agent
        .ingest(CollectorKind::Location, fields(json!({"geo.location": "1,1"})))
        .unwrap();

    let report = t.agent.run_upload(RunTrigger::battery_low());

    assert_eq!(report.outcome, RunOutcome::Skipped);
    assert_eq!(report.detail, None);
    assert_eq!(report.next_run, Some(Duration::from_secs(30)));
    assert!(t.transport.requests().is_empty());
    assert_eq!(t.agent.status().unwrap().total_buffered(), 1);
    let constraints = t.scheduler.constraints(TaskKind::Upload).unwrap();
    assert!(constraints.battery_not_low);
    assert!(constraints.requires_network);
}

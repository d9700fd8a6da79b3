//! Check-in engine.
//!
//! One heartbeat exchange with the fleet server:
//! 1. Send `{status, ack_token, local_metadata, message}`
//! 2. A long-poll timeout counts as a quiet success
//! 3. Dispatch on the first returned action
//! 4. For a policy change: parse, acknowledge, apply the revision rule and
//!    re-arm both schedules when the revision moved forward
//!
//! Failures are returned to `run_cycle`, which turns them into backoff.

use chrono::Utc;
use serde_json::Value;

use super::context::CycleContext;
use super::teardown;
use super::{scheduled_cycle, Collaborators, CycleReport};
use crate::error::CheckinError;
use crate::logging::LogContext;
use crate::network::fleet::FleetClient;
use crate::network::metadata::LocalMetadata;
use crate::network::transport::HttpResponse;
use crate::network::wire::{
    AckEvent, AckRequest, AckResponse, CheckinRequest, CheckinResponse,
    ACTION_POLICY_CHANGE, ACTION_REQUEST_DIAGNOSTICS, ACTION_UNENROLL,
};
use crate::policy::fields::{str_at, string_at};
use crate::policy::{decide, parse_policy_action, RevisionDecision};
use crate::schedule::{RunOutcome, RunTrigger, TaskKind};
use crate::storage::models::AgentIdentity;

pub const ONLINE_STATUS: &str = "online";
pub const ACK_MESSAGE: &str = "Policy update success.";
/// Always requested ahead of collector permissions.
pub const NOTIFICATION_PERMISSION: &str = "android.permission.POST_NOTIFICATIONS";
pub const UNREADABLE_ERROR: &str = "(error message could not be read)";

/// What a completed check-in did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckinOutcome {
    /// No action delivered, or the long-poll timed out.
    NoChange { timed_out: bool },
    DiagnosticsRequested { action_id: Option<String> },
    /// Equal or older revision. Only the refresh time and action id moved.
    PolicyRefreshed { revision: u64, action_id: String },
    PolicyInstalled {
        revision: u64,
        previous: Option<u64>,
        /// Platform permissions the new policy's collectors need.
        required_permissions: Vec<String>,
    },
    Unenrolled,
}

impl CheckinOutcome {
    /// A timed-out long-poll keeps the working interval; everything else
    /// resets it.
    pub fn run_outcome(&self) -> RunOutcome {
        match self {
            CheckinOutcome::NoChange { timed_out: true } => RunOutcome::Quiet,
            _ => RunOutcome::Succeeded,
        }
    }
}

/// Server messages that mean the credentials themselves were refused.
pub fn is_auth_rejection(message: &str) -> bool {
    message == "BadRequest" || message == "unauthorized"
}

/// Run one check-in exchange.
pub fn run(c: &Collaborators<'_>, ctx: &CycleContext) -> Result<CheckinOutcome, CheckinError> {
    let identity = c.store.load_identity()?.ok_or(CheckinError::NotEnrolled)?;
    let log_ctx = ctx.log_context().with_agent(&identity.agent_id);
    let client = FleetClient::for_identity(c.transport, c.config, &identity);

    let payload = CheckinRequest {
        status: ONLINE_STATUS.to_string(),
        ack_token: c.store.load_ack_token()?,
        local_metadata: LocalMetadata::collect(
            &identity.agent_id,
            &identity.hostname,
            c.device,
            c.config,
        ),
        message: c.config.checkin_message.clone(),
    };
    c.store.increment_checkins()?;
    log::debug!(
        "{} CHECKIN_SENT has_ack_token={}",
        log_ctx,
        payload.ack_token.is_some()
    );

    let response = match client.checkin(&identity.agent_id, &identity.access_api_key, &payload) {
        Ok(response) => response,
        Err(e) if e.is_timeout() => {
            c.store.refresh_policy(Utc::now(), None)?;
            log::info!("{} CHECKIN_TIMEOUT treated_as=quiet", log_ctx);
            return Ok(CheckinOutcome::NoChange { timed_out: true });
        }
        Err(e) => {
            log::warn!("{} CHECKIN_FAILED error={}", log_ctx, e);
            return Err(CheckinError::Transport(e));
        }
    };

    if !response.is_success() {
        return Err(rejection(&response, &log_ctx));
    }

    let body: CheckinResponse = response
        .json()
        .map_err(|e| CheckinError::MalformedResponse(e.to_string()))?;

    let outcome = match body.actions.first() {
        Some(action) => dispatch(c, &identity, &client, action, &log_ctx)?,
        None => {
            c.store.refresh_policy(Utc::now(), None)?;
            log::debug!("{} CHECKIN_NO_ACTIONS", log_ctx);
            CheckinOutcome::NoChange { timed_out: false }
        }
    };

    // The store is gone after an unenroll.
    if outcome != CheckinOutcome::Unenrolled {
        if let Some(token) = body.ack_token.as_deref() {
            c.store.save_ack_token(Some(token))?;
        }
    }
    Ok(outcome)
}

/// Run a scheduled check-in: honor the battery gate, run, re-arm.
pub fn run_cycle(c: &Collaborators<'_>, trigger: RunTrigger) -> CycleReport<CheckinOutcome> {
    scheduled_cycle(
        c,
        TaskKind::Checkin,
        trigger,
        |ctx| run(c, ctx),
        CheckinOutcome::run_outcome,
    )
}

fn dispatch(
    c: &Collaborators<'_>,
    identity: &AgentIdentity,
    client: &FleetClient<'_>,
    action: &Value,
    ctx: &LogContext,
) -> Result<CheckinOutcome, CheckinError> {
    let action_type = str_at(action, &["type"]).unwrap_or("");
    let action_id = string_at(action, &["id"]);
    log::info!(
        "{} ACTION_RECEIVED type={} action_id={}",
        ctx,
        action_type,
        action_id.as_deref().unwrap_or("-")
    );

    match action_type {
        ACTION_REQUEST_DIAGNOSTICS => Ok(CheckinOutcome::DiagnosticsRequested { action_id }),
        ACTION_UNENROLL => {
            teardown::unenroll(c, ctx)?;
            Ok(CheckinOutcome::Unenrolled)
        }
        ACTION_POLICY_CHANGE => apply_policy_change(c, identity, client, action, ctx),
        other => Err(CheckinError::UnknownAction(other.to_string())),
    }
}

fn apply_policy_change(
    c: &Collaborators<'_>,
    identity: &AgentIdentity,
    client: &FleetClient<'_>,
    action: &Value,
    ctx: &LogContext,
) -> Result<CheckinOutcome, CheckinError> {
    let incoming = parse_policy_action(action, Utc::now(), &c.config.default_namespace)
        .map_err(|e| {
            log::warn!("{} POLICY_PARSE_FAILED error={}", ctx, e);
            e
        })?;

    acknowledge(client, identity, &incoming.action_id, ctx);

    let current = c.store.load_policy()?;
    match decide(current.as_ref(), &incoming) {
        RevisionDecision::Stale { stored } => {
            c.store
                .refresh_policy(incoming.last_updated, Some(&incoming.action_id))?;
            log::info!(
                "{} POLICY_STALE stored_revision={} received_revision={}",
                ctx,
                stored,
                incoming.revision
            );
            Ok(CheckinOutcome::PolicyRefreshed {
                revision: stored,
                action_id: incoming.action_id,
            })
        }
        decision => {
            c.store.save_policy(&incoming)?;
            log::info!(
                "{} POLICY_APPLIED decision={} revision={} checkin_secs={} upload_secs={}",
                ctx,
                decision.as_str(),
                incoming.revision,
                incoming.checkin_interval,
                incoming.put_interval
            );

            let mut required_permissions = vec![NOTIFICATION_PERMISSION.to_string()];
            required_permissions.extend(
                c.required_permissions(identity, &incoming, ctx)
                    .into_iter()
                    .filter(|p| p != NOTIFICATION_PERMISSION),
            );
            c.controller().arm_nominal(&incoming, ctx);

            let previous = match decision {
                RevisionDecision::Replace { previous } => Some(previous),
                _ => None,
            };
            Ok(CheckinOutcome::PolicyInstalled {
                revision: incoming.revision,
                previous,
                required_permissions,
            })
        }
    }
}

/// Acknowledge a policy action. The outcome is only logged.
fn acknowledge(
    client: &FleetClient<'_>,
    identity: &AgentIdentity,
    action_id: &str,
    ctx: &LogContext,
) {
    let payload = AckRequest {
        events: vec![AckEvent::acknowledged(
            &identity.agent_id,
            action_id,
            ACK_MESSAGE.to_string(),
        )],
    };

    match client.ack(&identity.agent_id, &identity.access_api_key, &payload) {
        Ok(response) if response.is_success() => match response.json::<AckResponse>() {
            Ok(ack) => match ack.items.first() {
                Some(item) if item.status == 200 => {
                    log::info!("{} ACK_CONFIRMED action_id={}", ctx, action_id);
                }
                Some(item) => log::warn!(
                    "{} ACK_NOT_CONFIRMED action_id={} item_status={} message={}",
                    ctx,
                    action_id,
                    item.status,
                    item.message.as_deref().unwrap_or("-")
                ),
                None => log::warn!("{} ACK_NOT_CONFIRMED action_id={} items=0", ctx, action_id),
            },
            Err(e) => log::warn!("{} ACK_UNREADABLE action_id={} error={}", ctx, action_id, e),
        },
        Ok(response) => log::warn!(
            "{} ACK_REJECTED action_id={} status={} message={}",
            ctx,
            action_id,
            response.status,
            response
                .error_message()
                .unwrap_or_else(|| UNREADABLE_ERROR.to_string())
        ),
        Err(e) => log::warn!("{} ACK_FAILED action_id={} error={}", ctx, action_id, e),
    }
}

fn rejection(response: &HttpResponse, ctx: &LogContext) -> CheckinError {
    let message = response
        .error_message()
        .unwrap_or_else(|| UNREADABLE_ERROR.to_string());
    log::warn!(
        "{} CHECKIN_REJECTED status={} message={}",
        ctx,
        response.status,
        message
    );
    if is_auth_rejection(&message) {
        CheckinError::TokenOrAuthRejected
    } else {
        CheckinError::CheckinRejected {
            code: response.status,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::CollectorRegistry;
    use crate::config::AgentConfig;
    use crate::error::TransportError;
    use crate::network::transport::Method;
    use crate::storage::{AgentStore, MemoryStore, StateStore};
    use crate::testing::{fixtures, RecordingScheduler, ScriptedTransport};
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::time::Duration;

    struct Harness {
        store: Arc<dyn AgentStore>,
        transport: ScriptedTransport,
        scheduler: RecordingScheduler,
        registry: CollectorRegistry,
        config: AgentConfig,
        device: crate::network::DeviceInfo,
    }

    impl Harness {
        fn enrolled() -> Self {
            let store = MemoryStore::new();
            store.save_identity(&fixtures::identity()).unwrap();
            store.init_statistics().unwrap();
            Self {
                store: Arc::new(store),
                transport: ScriptedTransport::new(),
                scheduler: RecordingScheduler::new(),
                registry: CollectorRegistry::with_defaults(),
                config: AgentConfig::default(),
                device: fixtures::device(),
            }
        }

        fn collaborators(&self) -> Collaborators<'_> {
            Collaborators {
                store: &self.store,
                transport: &self.transport,
                scheduler: &self.scheduler,
                registry: &self.registry,
                config: &self.config,
                device: &self.device,
            }
        }

        fn run(&self) -> Result<CheckinOutcome, CheckinError> {
            run(&self.collaborators(), &CycleContext::new("test"))
        }

        fn deliver(&self, action_id: &str, revision: u64) {
            self.transport.respond(
                Method::Post,
                "/checkin",
                Ok(fixtures::checkin_response(
                    None,
                    vec![fixtures::policy_change_action(action_id, revision, "2m", "45s")],
                )),
            );
            self.transport
                .respond(Method::Post, "/acks", Ok(fixtures::ack_response(200)));
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_stale_delivery_only_moves_stamp_and_action(
            stored_rev in 1u64..1000,
            delta in 0u64..1000,
            backoff in 60u64..7200,
        ) {
            let h = Harness::enrolled();
            let mut stored = fixtures::policy(stored_rev);
            stored.set_backoff_interval(TaskKind::Upload, backoff);
            h.store.save_policy(&stored).unwrap();
            h.deliver("action-stale", stored_rev.saturating_sub(delta));

            let outcome = h.run().unwrap();

            prop_assert_eq!(
                outcome,
                CheckinOutcome::PolicyRefreshed {
                    revision: stored_rev,
                    action_id: "action-stale".to_string(),
                }
            );
            let after = h.store.load_policy().unwrap().unwrap();
            prop_assert!(after.last_updated >= stored.last_updated);
            let mut expected = stored;
            expected.action_id = "action-stale".to_string();
            expected.last_updated = after.last_updated;
            prop_assert_eq!(after, expected);
            prop_assert!(h.scheduler.is_empty());
        }

        #[test]
        fn prop_higher_revision_replaces_and_rearms(
            stored_rev in 0u64..1000,
            bump in 1u64..1000,
            backoff in 60u64..7200,
        ) {
            let h = Harness::enrolled();
            let mut stored = fixtures::policy(stored_rev);
            stored.set_backoff_interval(TaskKind::Checkin, backoff);
            h.store.save_policy(&stored).unwrap();
            h.deliver("action-new", stored_rev + bump);

            let outcome = h.run().unwrap();

            let is_replace = matches!(
                outcome,
                CheckinOutcome::PolicyInstalled { revision, previous: Some(p), .. }
                    if revision == stored_rev + bump && p == stored_rev
            );
            prop_assert!(is_replace);
            let after = h.store.load_policy().unwrap().unwrap();
            prop_assert_eq!(after.revision, stored_rev + bump);
            prop_assert_eq!(after.action_id.as_str(), "action-new");
            prop_assert_eq!(after.checkin_interval, 120);
            prop_assert!(after.is_nominal(TaskKind::Checkin));
            prop_assert!(after.is_nominal(TaskKind::Upload));
            prop_assert_eq!(h.scheduler.pending(TaskKind::Checkin), Some(Duration::from_secs(120)));
            prop_assert_eq!(h.scheduler.pending(TaskKind::Upload), Some(Duration::from_secs(45)));
        }
    }

    #[test]
    fn test_timeout_is_quiet() {
        let h = Harness::enrolled();
        h.transport
            .respond(Method::Post, "/checkin", Err(TransportError::Timeout));

        let outcome = h.run().unwrap();

        assert_eq!(outcome, CheckinOutcome::NoChange { timed_out: true });
        assert_eq!(outcome.run_outcome(), RunOutcome::Quiet);
        assert_eq!(
            CheckinOutcome::NoChange { timed_out: false }.run_outcome(),
            RunOutcome::Succeeded
        );
    }

    #[test]
    fn test_not_enrolled() {
        let h = Harness::enrolled();
        h.store.purge_all().unwrap();
        assert!(matches!(h.run(), Err(CheckinError::NotEnrolled)));
        assert!(h.transport.requests().is_empty());
    }

    #[test]
    fn test_policy_install_acks_and_arms_both_tasks() {
        let h = Harness::enrolled();
        h.transport.respond(
            Method::Post,
            "/checkin",
            Ok(fixtures::checkin_response(
                Some("token-1"),
                vec![fixtures::policy_change_action("action-1", 3, "2m", "45s")],
            )),
        );
        h.transport
            .respond(Method::Post, "/acks", Ok(fixtures::ack_response(200)));

        let outcome = h.run().unwrap();
        match outcome {
            CheckinOutcome::PolicyInstalled {
                revision,
                previous,
                required_permissions,
            } => {
                assert_eq!(revision, 3);
                assert_eq!(previous, None);
                assert_eq!(required_permissions[0], NOTIFICATION_PERMISSION);
                assert!(required_permissions
                    .contains(&"android.permission.ACCESS_FINE_LOCATION".to_string()));
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let policy = h.store.load_policy().unwrap().unwrap();
        assert_eq!(policy.action_id, "action-1");
        assert_eq!(h.scheduler.pending(TaskKind::Checkin), Some(Duration::from_secs(120)));
        assert_eq!(h.scheduler.pending(TaskKind::Upload), Some(Duration::from_secs(45)));
        assert_eq!(h.store.load_ack_token().unwrap().as_deref(), Some("token-1"));

        let acks = h.transport.requests_to("/acks");
        assert_eq!(acks.len(), 1);
        let body = acks[0].body.as_deref().unwrap();
        assert!(body.contains("\"type\":\"ACTION_RESULT\""));
        assert!(body.contains("\"action_id\":\"action-1\""));

        let checkin = &h.transport.requests_to("/checkin")[0];
        assert!(!checkin.body.as_deref().unwrap().contains("ack_token"));
    }

    #[test]
    fn test_ack_failure_does_not_fail_cycle() {
        let h = Harness::enrolled();
        h.transport.respond(
            Method::Post,
            "/checkin",
            Ok(fixtures::checkin_response(
                None,
                vec![fixtures::policy_change_action("action-1", 1, "1m", "1m")],
            )),
        );
        h.transport.respond(
            Method::Post,
            "/acks",
            Err(TransportError::Connect("reset".to_string())),
        );
        assert!(matches!(
            h.run(),
            Ok(CheckinOutcome::PolicyInstalled { revision: 1, .. })
        ));
    }

    #[test]
    fn test_malformed_policy_mutates_nothing() {
        let h = Harness::enrolled();
        h.store.save_policy(&fixtures::policy(2)).unwrap();
        let mut action = fixtures::policy_change_action("action-9", 9, "1m", "1m");
        action["data"]["policy"]["outputs"] = serde_json::json!({});
        h.transport.respond(
            Method::Post,
            "/checkin",
            Ok(fixtures::checkin_response(Some("t"), vec![action])),
        );

        assert!(matches!(h.run(), Err(CheckinError::Policy(_))));
        assert_eq!(h.store.load_policy().unwrap(), Some(fixtures::policy(2)));
        assert!(h.transport.requests_to("/acks").is_empty());
        assert_eq!(h.store.load_ack_token().unwrap(), None);
        assert!(h.scheduler.is_empty());
    }

    #[test]
    fn test_diagnostics_and_unknown_actions() {
        let h = Harness::enrolled();
        h.transport.respond(
            Method::Post,
            "/checkin",
            Ok(fixtures::checkin_response(
                None,
                vec![fixtures::diagnostics_action("diag-1")],
            )),
        );
        h.transport.respond(
            Method::Post,
            "/checkin",
            Ok(fixtures::checkin_response(
                None,
                vec![serde_json::json!({"id": "x", "type": "UPGRADE"})],
            )),
        );

        assert_eq!(
            h.run().unwrap(),
            CheckinOutcome::DiagnosticsRequested {
                action_id: Some("diag-1".to_string())
            }
        );
        match h.run() {
            Err(CheckinError::UnknownAction(kind)) => assert_eq!(kind, "UPGRADE"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_rejections_are_classified() {
        let h = Harness::enrolled();
        h.transport.respond(
            Method::Post,
            "/checkin",
            Ok(fixtures::error_response(401, "Unauthorized", "unauthorized")),
        );
        h.transport.respond(
            Method::Post,
            "/checkin",
            Ok(fixtures::error_response(503, "Service Unavailable", "server overloaded")),
        );
        h.transport
            .respond(Method::Post, "/checkin", Ok(HttpResponse::new(500, "<html>")));

        assert!(matches!(h.run(), Err(CheckinError::TokenOrAuthRejected)));
        match h.run() {
            Err(CheckinError::CheckinRejected { code, message }) => {
                assert_eq!(code, 503);
                assert_eq!(message, "server overloaded");
            }
            other => panic!("unexpected {:?}", other),
        }
        match h.run() {
            Err(CheckinError::CheckinRejected { message, .. }) => {
                assert_eq!(message, UNREADABLE_ERROR)
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_empty_success_body_is_malformed() {
        let h = Harness::enrolled();
        h.transport
            .respond(Method::Post, "/checkin", Ok(HttpResponse::new(200, "")));
        assert!(matches!(h.run(), Err(CheckinError::MalformedResponse(_))));
    }

    #[test]
    fn test_cycle_skips_on_low_battery_when_policy_asks() {
        let h = Harness::enrolled();
        let mut policy = fixtures::policy(1);
        policy.disable_if_battery_low = true;
        h.store.save_policy(&policy).unwrap();

        let report = run_cycle(&h.collaborators(), RunTrigger::battery_low());
        assert_eq!(report.outcome, RunOutcome::Skipped);
        assert!(h.transport.requests().is_empty());
        assert_eq!(report.next_run, Some(Duration::from_secs(60)));
        let stats = h.store.load_statistics().unwrap().unwrap();
        assert_eq!(stats.total_checkins, 0);
        assert_eq!(stats.total_failures, 0);
    }

    #[test]
    fn test_cycle_failure_reports_class() {
        let h = Harness::enrolled();
        h.store.save_policy(&fixtures::policy(1)).unwrap();
        h.transport.respond(
            Method::Post,
            "/checkin",
            Err(TransportError::Connect("unreachable".to_string())),
        );

        let report = run_cycle(&h.collaborators(), RunTrigger::default());
        assert_eq!(report.outcome, RunOutcome::Failed);
        assert_eq!(
            report.failure.map(|f| f.class),
            Some(crate::error::ErrorClass::Transport)
        );
        assert_eq!(report.next_run, Some(Duration::from_secs(120)));
        let stats = h.store.load_statistics().unwrap().unwrap();
        assert_eq!(stats.total_checkins, 1);
        assert_eq!(stats.total_failures, 1);
    }
}

//! In-memory collaborators for tests and host-side simulations.
//!
//! `ScriptedTransport` replays canned responses, `RecordingScheduler` keeps
//! the last armed delay per task, and `fixtures` builds the identity, policy
//! and server payloads used across the test suites.

use std::collections::BTreeMap;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::TransportError;
use crate::network::transport::{HttpRequest, HttpResponse, HttpTransport, Method};
use crate::schedule::jobs::{JobConstraints, JobScheduler, TaskKind};

struct Route {
    method: Method,
    url_fragment: String,
    response: Result<HttpResponse, TransportError>,
}

/// Transport answering from a queue of scripted responses.
///
/// Each request consumes the first queued response whose method matches and
/// whose fragment occurs in the URL. Unmatched requests fail to connect.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    sent: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(
        &self,
        method: Method,
        url_fragment: &str,
        response: Result<HttpResponse, TransportError>,
    ) {
        self.routes.lock().push(Route {
            method,
            url_fragment: url_fragment.to_string(),
            response,
        });
    }

    /// Every request sent so far, oldest first.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.sent.lock().clone()
    }

    pub fn requests_to(&self, url_fragment: &str) -> Vec<HttpRequest> {
        self.sent
            .lock()
            .iter()
            .filter(|r| r.url.contains(url_fragment))
            .cloned()
            .collect()
    }

    /// Scripted responses nobody asked for.
    pub fn unused(&self) -> usize {
        self.routes.lock().len()
    }
}

impl HttpTransport for ScriptedTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.sent.lock().push(request.clone());
        let mut routes = self.routes.lock();
        let position = routes
            .iter()
            .position(|r| r.method == request.method && request.url.contains(&r.url_fragment));
        match position {
            Some(i) => routes.remove(i).response,
            None => Err(TransportError::Connect(format!(
                "no scripted response for {} {}",
                request.method.as_str(),
                request.url
            ))),
        }
    }
}

/// Scheduler that records what would have been armed.
#[derive(Default)]
pub struct RecordingScheduler {
    pending: Mutex<BTreeMap<TaskKind, (Duration, JobConstraints)>>,
    history: Mutex<Vec<(TaskKind, Duration)>>,
    cancels: Mutex<usize>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self, task: TaskKind) -> Option<Duration> {
        self.pending.lock().get(&task).map(|(delay, _)| *delay)
    }

    pub fn constraints(&self, task: TaskKind) -> Option<JobConstraints> {
        self.pending.lock().get(&task).map(|(_, c)| *c)
    }

    /// Every delay ever armed, in order.
    pub fn history(&self) -> Vec<(TaskKind, Duration)> {
        self.history.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    pub fn cancel_count(&self) -> usize {
        *self.cancels.lock()
    }
}

impl JobScheduler for RecordingScheduler {
    fn schedule_once(&self, task: TaskKind, delay: Duration, constraints: JobConstraints) {
        self.pending.lock().insert(task, (delay, constraints));
        self.history.lock().push((task, delay));
    }

    fn cancel_all(&self) {
        self.pending.lock().clear();
        *self.cancels.lock() += 1;
    }
}

pub mod fixtures {
    //! Canned records and server payloads.

    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::{json, Value};

    use crate::network::metadata::DeviceInfo;
    use crate::network::transport::HttpResponse;
    use crate::storage::models::{AgentIdentity, DataStream, OutputConfig, Policy};

    pub const AGENT_ID: &str = "4f1c2b9e-7d3a-4c55-9a0e-2b8f6d1e0c47";
    pub const FLEET_URL: &str = "https://fleet.example:8220";
    pub const ACCESS_API_KEY: &str = "ZmxlZXQtYWNjZXNzLWtleQ==";
    pub const ENROLLMENT_TOKEN: &str = "ZW5yb2xsbWVudC10b2tlbg==";
    pub const OUTPUT_API_KEY: &str = "es-key-id:es-key-secret";
    pub const ES_HOST: &str = "https://es.example:9200";
    pub const FINGERPRINT: &str =
        "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";
    pub const HOSTNAME: &str = "pixel-7";
    pub const DATASET: &str = "fleet_agent.android";
    pub const LOCATION_PATH: &str = "android://location?minTimeMs=1000&minDistanceMeters=10";
    pub const SELF_LOG_PATH: &str = "android://self-log";

    /// Fixed reception time for records built here.
    pub fn received_at() -> DateTime<Utc> {
        Utc.timestamp_opt(1_710_883_527, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    pub fn identity() -> AgentIdentity {
        AgentIdentity {
            agent_id: AGENT_ID.to_string(),
            access_api_key: ACCESS_API_KEY.to_string(),
            access_api_key_id: Some("fleet-access-key-id".to_string()),
            fleet_url: FLEET_URL.to_string(),
            hostname: HOSTNAME.to_string(),
            verify_cert: true,
            fleet_certificate: None,
            enrolled_at: Some("2024-03-19T21:25:27.000Z".to_string()),
            policy_id: Some("android-policy".to_string()),
            status: Some("online".to_string()),
            active: true,
        }
    }

    pub fn device() -> DeviceInfo {
        DeviceInfo {
            architecture: "aarch64".to_string(),
            host_id: "b6d8a7c1e2f34a5b".to_string(),
            ips: vec!["10.0.0.7".to_string(), "fe80::1c2d:3eff:fe4f:5a6b".to_string()],
            macs: vec!["02:00:00:00:00:00".to_string()],
            os_family: "android".to_string(),
            os_kernel: "5.10.157-android13".to_string(),
            os_platform: "android".to_string(),
            os_version: "14".to_string(),
            os_name: "Android".to_string(),
            os_full: "Android 14 (API 34)".to_string(),
            os_build: "UQ1A.240205.004".to_string(),
        }
    }

    pub fn output() -> OutputConfig {
        OutputConfig {
            name: "default".to_string(),
            api_key: OUTPUT_API_KEY.to_string(),
            hosts: vec![ES_HOST.to_string()],
            ca_trusted_fingerprint: FINGERPRINT.to_string(),
            ca_certificate: None,
            output_type: Some("elasticsearch".to_string()),
        }
    }

    /// Installed policy at `revision` with check-in 60 s, upload 30 s and a
    /// one hour backoff ceiling. Backoff intervals start at nominal.
    pub fn policy(revision: u64) -> Policy {
        Policy {
            policy_id: Some("android-policy".to_string()),
            revision,
            action_id: format!("policy:android-policy:{}:1", revision),
            created_at: Some("2024-03-19T21:25:27.000Z".to_string()),
            protection_enabled: true,
            uninstall_token_hash: Some("c2VjcmV0LWhhc2g=".to_string()),
            input_name: Some("android-1".to_string()),
            allow_user_unenroll: true,
            collector_paths: vec![SELF_LOG_PATH.to_string(), LOCATION_PATH.to_string()],
            output: output(),
            data_stream: DataStream {
                dataset: DATASET.to_string(),
                namespace: "default".to_string(),
            },
            ignore_older: Some("72h".to_string()),
            checkin_interval: 60,
            put_interval: 30,
            backoff_checkin_interval: 60,
            backoff_put_interval: 30,
            max_backoff_interval: 3600,
            use_backoff: true,
            backoff_on_empty_buffer: false,
            disable_if_battery_low: false,
            max_documents_per_request: 100,
            last_updated: received_at(),
        }
    }

    /// A `POLICY_CHANGE` action as Fleet sends it.
    pub fn policy_change_action(
        action_id: &str,
        revision: u64,
        checkin_interval: &str,
        put_interval: &str,
    ) -> Value {
        json!({
            "id": action_id,
            "type": "POLICY_CHANGE",
            "created_at": "2024-03-19T21:25:27.000Z",
            "agent_id": AGENT_ID,
            "data": {
                "policy": {
                    "id": "android-policy",
                    "revision": revision,
                    "agent": {
                        "protection": {
                            "enabled": true,
                            "uninstall_token_hash": "c2VjcmV0LWhhc2g=",
                            "signing_key": "MFkwEwYHKoZIzj0CAQYIKoZIzj0DAQcDQgAE"
                        }
                    },
                    "inputs": [{
                        "id": "android-1",
                        "name": "android-1",
                        "type": "android",
                        "streams": [{
                            "id": "android-1-stream",
                            "paths": [SELF_LOG_PATH, LOCATION_PATH],
                            "checkin_interval": checkin_interval,
                            "es_request_interval": put_interval,
                            "max_backoff_interval": "1h",
                            "use_backoff": true,
                            "backoff_on_empty_buffer": false,
                            "disable_if_battery_low": false,
                            "allow_user_unenroll": true,
                            "max_documents_per_request": 100,
                            "ignore_older": "72h",
                            "data_stream": {
                                "dataset": DATASET,
                                "namespace": "default"
                            }
                        }]
                    }],
                    "outputs": {
                        "default": {
                            "type": "elasticsearch",
                            "api_key": OUTPUT_API_KEY,
                            "hosts": [ES_HOST],
                            "ssl.ca_trusted_fingerprint": FINGERPRINT
                        }
                    }
                }
            }
        })
    }

    pub fn unenroll_action(action_id: &str) -> Value {
        json!({ "id": action_id, "type": "UNENROLL", "agent_id": AGENT_ID })
    }

    pub fn diagnostics_action(action_id: &str) -> Value {
        json!({ "id": action_id, "type": "REQUEST_DIAGNOSTICS", "agent_id": AGENT_ID })
    }

    pub fn status_response(status: &str) -> HttpResponse {
        HttpResponse::new(
            200,
            json!({ "name": "kibana", "status": status }).to_string(),
        )
    }

    pub fn enroll_response() -> HttpResponse {
        HttpResponse::new(
            200,
            json!({
                "action": "created",
                "item": {
                    "id": AGENT_ID,
                    "active": true,
                    "policy_id": "android-policy",
                    "type": "PERMANENT",
                    "enrolled_at": "2024-03-19T21:25:27.000Z",
                    "access_api_key": ACCESS_API_KEY,
                    "access_api_key_id": "fleet-access-key-id",
                    "status": "online",
                    "tags": []
                }
            })
            .to_string(),
        )
    }

    pub fn checkin_response(ack_token: Option<&str>, actions: Vec<Value>) -> HttpResponse {
        HttpResponse::new(
            200,
            json!({ "ack_token": ack_token, "action": "checkin", "actions": actions }).to_string(),
        )
    }

    pub fn ack_response(status: u16) -> HttpResponse {
        HttpResponse::new(
            200,
            json!({ "action": "acks", "items": [{ "status": status, "message": "OK" }] })
                .to_string(),
        )
    }

    pub fn error_response(status: u16, error: &str, message: &str) -> HttpResponse {
        HttpResponse::new(
            status,
            json!({ "statusCode": status, "error": error, "message": message }).to_string(),
        )
    }

    pub fn bulk_response(errors: bool) -> HttpResponse {
        HttpResponse::new(
            200,
            json!({
                "took": 7,
                "errors": errors,
                "items": [{ "create": { "status": if errors { 400 } else { 201 } } }]
            })
            .to_string(),
        )
    }
}

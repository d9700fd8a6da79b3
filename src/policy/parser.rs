//! Policy parser.
//!
//! Validates a raw `POLICY_CHANGE` action and flattens it into a [`Policy`].
//! Only the first input and its first stream are read; that stream carries
//! the agent's settings alongside the collector paths.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::fields::{self, present, str_at, string_list_at};
use super::interval::parse_optional_interval;
use crate::error::ParseError;
use crate::storage::models::{DataStream, OutputConfig, Policy};

pub const DEFAULT_MAX_DOCUMENTS_PER_REQUEST: usize = 50;

/// Dataset used when the stream names none.
pub const DEFAULT_DATASET: &str = "generic";

/// Output preferred when a policy defines more than one.
pub const DEFAULT_OUTPUT_NAME: &str = "default";

/// Parse a raw action into a policy.
///
/// Pure: the same action and `received_at` always give the same policy.
/// Nothing is persisted here. Working backoff intervals start at their
/// nominal values.
pub fn parse_policy_action(
    action: &Value,
    received_at: DateTime<Utc>,
    default_namespace: &str,
) -> Result<Policy, ParseError> {
    let data = present(action, &["data"]).ok_or(ParseError::MissingActionData)?;
    let policy = present(data, &["policy"]).ok_or(ParseError::MissingPolicy)?;
    let revision = fields::u64_at(policy, &["revision"]).ok_or(ParseError::MissingRevision)?;

    let protection =
        present(policy, &["agent", "protection"]).ok_or(ParseError::MissingProtection)?;
    let protection_enabled = optional_bool(protection, "enabled", "agent.protection.enabled")?
        .unwrap_or(false);
    let uninstall_token_hash = fields::string_at(protection, &["uninstall_token_hash"]);

    let input = match present(policy, &["inputs"]) {
        Some(Value::Array(inputs)) => inputs.first().ok_or(ParseError::MissingInputs)?,
        _ => return Err(ParseError::MissingInputs),
    };
    let stream = match present(input, &["streams"]) {
        Some(Value::Array(streams)) => streams.first().ok_or(ParseError::MissingStreams)?,
        _ => return Err(ParseError::MissingStreams),
    };

    let collector_paths = dedup_paths(string_list_at(stream, &["paths"]).unwrap_or_default());
    if collector_paths.is_empty() {
        return Err(ParseError::MissingPaths);
    }

    let output = parse_output(policy)?;

    let action_id = str_at(action, &["id"])
        .filter(|id| !id.is_empty())
        .ok_or(ParseError::MissingActionId)?
        .to_string();

    let checkin_interval = parse_optional_interval(str_at(stream, &["checkin_interval"]));
    let put_interval = parse_optional_interval(str_at(stream, &["es_request_interval"]));
    let max_backoff_interval = parse_optional_interval(str_at(stream, &["max_backoff_interval"]));

    let max_documents_per_request = match present(stream, &["max_documents_per_request"]) {
        None => DEFAULT_MAX_DOCUMENTS_PER_REQUEST,
        Some(v) => fields::value_to_u64(v)
            .filter(|n| *n > 0)
            .map(|n| n as usize)
            .ok_or(ParseError::InvalidField {
                field: "max_documents_per_request",
                expected: "a positive integer",
            })?,
    };

    let namespace = str_at(stream, &["data_stream", "namespace"])
        .or_else(|| str_at(input, &["data_stream", "namespace"]))
        .unwrap_or(default_namespace)
        .to_string();
    let dataset = str_at(stream, &["data_stream", "dataset"])
        .unwrap_or(DEFAULT_DATASET)
        .to_string();

    Ok(Policy {
        policy_id: fields::string_at(policy, &["id"]),
        revision,
        action_id,
        created_at: fields::string_at(action, &["created_at"]),
        protection_enabled,
        uninstall_token_hash,
        input_name: fields::string_at(input, &["name"]),
        allow_user_unenroll: optional_bool(stream, "allow_user_unenroll", "allow_user_unenroll")?
            .unwrap_or(false),
        collector_paths,
        output,
        data_stream: DataStream { dataset, namespace },
        ignore_older: fields::string_at(stream, &["ignore_older"]),
        checkin_interval,
        put_interval,
        backoff_checkin_interval: checkin_interval,
        backoff_put_interval: put_interval,
        max_backoff_interval,
        use_backoff: optional_bool(stream, "use_backoff", "use_backoff")?.unwrap_or(false),
        backoff_on_empty_buffer: optional_bool(
            stream,
            "backoff_on_empty_buffer",
            "backoff_on_empty_buffer",
        )?
        .unwrap_or(false),
        disable_if_battery_low: optional_bool(
            stream,
            "disable_if_battery_low",
            "disable_if_battery_low",
        )?
        .unwrap_or(false),
        max_documents_per_request,
        last_updated: received_at,
    })
}

fn parse_output(policy: &Value) -> Result<OutputConfig, ParseError> {
    let outputs: &Map<String, Value> = match present(policy, &["outputs"]) {
        Some(Value::Object(map)) if !map.is_empty() => map,
        _ => return Err(ParseError::MissingOutputs),
    };
    let (name, output) = match outputs.get(DEFAULT_OUTPUT_NAME) {
        Some(output) => (DEFAULT_OUTPUT_NAME, output),
        None => outputs
            .iter()
            .next()
            .map(|(k, v)| (k.as_str(), v))
            .ok_or(ParseError::MissingOutputs)?,
    };

    let incomplete = |field: &'static str| ParseError::IncompleteOutput {
        output: name.to_string(),
        field,
    };

    let api_key = str_at(output, &["api_key"]).ok_or_else(|| incomplete("api_key"))?;
    let hosts = string_list_at(output, &["hosts"])
        .filter(|h| !h.is_empty())
        .ok_or_else(|| incomplete("hosts"))?;
    let fingerprint = str_at(output, &["ssl.ca_trusted_fingerprint"])
        .or_else(|| str_at(output, &["ssl", "ca_trusted_fingerprint"]))
        .ok_or_else(|| incomplete("ssl.ca_trusted_fingerprint"))?;
    let ca_certificate = string_list_at(output, &["ssl.certificate_authorities"])
        .or_else(|| string_list_at(output, &["ssl", "certificate_authorities"]))
        .and_then(|cas| cas.into_iter().next());

    Ok(OutputConfig {
        name: name.to_string(),
        api_key: api_key.to_string(),
        hosts,
        ca_trusted_fingerprint: fingerprint.to_string(),
        ca_certificate,
        output_type: fields::string_at(output, &["type"]),
    })
}

fn optional_bool(
    data: &Value,
    key: &str,
    field: &'static str,
) -> Result<Option<bool>, ParseError> {
    match present(data, &[key]) {
        None => Ok(None),
        Some(v) => fields::value_to_bool(v)
            .map(Some)
            .ok_or(ParseError::InvalidField {
                field,
                expected: "a boolean",
            }),
    }
}

fn dedup_paths(paths: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.trim().to_string();
        if !path.is_empty() && !out.contains(&path) {
            out.push(path);
        }
    }
    out
}

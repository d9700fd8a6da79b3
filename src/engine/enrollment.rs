//! Enrollment engine.
//!
//! Enrollment runs once, interactively:
//! 1. Probe the fleet server status
//! 2. Exchange the enrollment token for an agent id and access key
//! 3. Run the first check-in to obtain a policy
//!
//! It only succeeds when both an identity and a policy are stored. If the
//! first check-in brings no policy the identity stays behind and the caller
//! must unenroll or retry.

use serde_json::Map;
use uuid::Uuid;

use super::checkin::{self, is_auth_rejection, CheckinOutcome, UNREADABLE_ERROR};
use super::context::CycleContext;
use super::Collaborators;
use crate::error::EnrollError;
use crate::logging::LogContext;
use crate::network::fleet::{tls_for, FleetClient};
use crate::network::metadata::{EnrollMetadata, LocalMetadata};
use crate::network::transport::HttpResponse;
use crate::network::wire::{
    EnrollRequest, EnrollResponse, StatusResponse, ENROLL_TYPE_PERMANENT, HEALTHY_STATUS,
};
use crate::storage::models::{AgentIdentity, Policy};

/// Operator input for enrollment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentRequest {
    pub server_url: String,
    pub enrollment_token: String,
    pub hostname: String,
    /// PEM certificate to trust for the fleet server.
    pub certificate: Option<String>,
    pub verify_cert: bool,
}

impl EnrollmentRequest {
    pub fn validate(&self) -> Result<(), EnrollError> {
        let url = self.server_url.trim();
        if url.is_empty() {
            return Err(EnrollError::Validation("server URL is empty".to_string()));
        }
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(EnrollError::Validation(format!(
                "server URL `{}` must start with http:// or https://",
                url
            )));
        }
        if self.enrollment_token.trim().is_empty() {
            return Err(EnrollError::Validation("enrollment token is empty".to_string()));
        }
        if self.hostname.trim().is_empty() {
            return Err(EnrollError::Validation("hostname is empty".to_string()));
        }
        Ok(())
    }
}

/// A completed enrollment.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrollment {
    pub identity: AgentIdentity,
    pub policy: Policy,
    pub required_permissions: Vec<String>,
}

pub fn enroll(c: &Collaborators<'_>, request: &EnrollmentRequest) -> Result<Enrollment, EnrollError> {
    request.validate()?;
    if c.store.load_identity()?.is_some() {
        return Err(EnrollError::AlreadyEnrolled);
    }

    let ctx = CycleContext::new("enroll");
    let log_ctx = ctx.log_context();
    let server_url = request.server_url.trim().trim_end_matches('/');
    let client = FleetClient::new(
        c.transport,
        c.config,
        server_url,
        tls_for(request.verify_cert, request.certificate.clone()),
    );
    log::info!(
        "{} ENROLL_START server={} hostname={} verify_cert={}",
        log_ctx,
        server_url,
        request.hostname,
        request.verify_cert
    );

    check_server_status(&client, &log_ctx)?;

    let enrollment_id = Uuid::new_v4().to_string();
    let payload = EnrollRequest {
        enroll_type: ENROLL_TYPE_PERMANENT.to_string(),
        shared_id: enrollment_id.clone(),
        enrollment_id,
        metadata: EnrollMetadata {
            local: LocalMetadata::collect("", &request.hostname, c.device, c.config),
            user_provided: Map::new(),
            tags: Vec::new(),
        },
    };

    let response = client
        .enroll(&request.enrollment_token, &payload)
        .map_err(|e| {
            log::warn!("{} ENROLL_FAILED error={}", log_ctx, e);
            EnrollError::EnrollmentUnreachable(e)
        })?;
    if !response.is_success() {
        return Err(enroll_rejection(&response, &log_ctx));
    }

    let identity = identity_from(&response, request, server_url)?;
    c.store.save_identity(&identity)?;
    c.store.init_statistics()?;
    log::info!("{} ENROLLED agent_id={}", log_ctx, identity.agent_id);

    let checkin_ctx = ctx.with_agent(&identity.agent_id);
    let outcome = checkin::run(c, &checkin_ctx).map_err(EnrollError::InitialCheckin)?;

    let policy = c.store.load_policy()?.ok_or_else(|| {
        log::warn!(
            "{} ENROLL_INCOMPLETE reason=no_policy agent_id={}",
            log_ctx,
            identity.agent_id
        );
        EnrollError::PolicyMissing
    })?;

    let required_permissions = match outcome {
        CheckinOutcome::PolicyInstalled {
            required_permissions,
            ..
        } => required_permissions,
        _ => Vec::new(),
    };

    log::info!(
        "{} ENROLL_COMPLETE agent_id={} policy_revision={}",
        checkin_ctx.log_context(),
        identity.agent_id,
        policy.revision
    );
    Ok(Enrollment {
        identity,
        policy,
        required_permissions,
    })
}

fn check_server_status(client: &FleetClient<'_>, ctx: &LogContext) -> Result<(), EnrollError> {
    let response = client.status().map_err(|e| {
        log::warn!("{} FLEET_STATUS_FAILED error={}", ctx, e);
        EnrollError::ServerUnreachable(e)
    })?;
    if !response.is_success() {
        return Err(EnrollError::StatusRequestFailed(response.status));
    }
    let status: StatusResponse = response
        .json()
        .map_err(|e| EnrollError::InvalidResponse(format!("status body: {}", e)))?;
    log::info!(
        "{} FLEET_STATUS name={} status={}",
        ctx,
        status.name.as_deref().unwrap_or("-"),
        status.status
    );
    if status.status != HEALTHY_STATUS {
        return Err(EnrollError::ServerUnhealthy(status.status));
    }
    Ok(())
}

fn enroll_rejection(response: &HttpResponse, ctx: &LogContext) -> EnrollError {
    let message = response
        .error_message()
        .unwrap_or_else(|| UNREADABLE_ERROR.to_string());
    log::warn!(
        "{} ENROLL_REJECTED status={} message={}",
        ctx,
        response.status,
        message
    );
    if is_auth_rejection(&message) {
        EnrollError::TokenRejected
    } else {
        EnrollError::EnrollmentRejected {
            code: response.status,
            message,
        }
    }
}

fn identity_from(
    response: &HttpResponse,
    request: &EnrollmentRequest,
    server_url: &str,
) -> Result<AgentIdentity, EnrollError> {
    let body: EnrollResponse = response
        .json()
        .map_err(|e| EnrollError::InvalidResponse(e.to_string()))?;
    let item = body
        .item
        .ok_or_else(|| EnrollError::InvalidResponse("missing item".to_string()))?;
    let agent_id = item
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| EnrollError::InvalidResponse("missing agent id".to_string()))?;
    let access_api_key = item
        .access_api_key
        .filter(|key| !key.is_empty())
        .ok_or_else(|| EnrollError::InvalidResponse("missing access api key".to_string()))?;

    Ok(AgentIdentity {
        agent_id,
        access_api_key,
        access_api_key_id: item.access_api_key_id,
        fleet_url: server_url.to_string(),
        hostname: request.hostname.trim().to_string(),
        verify_cert: request.verify_cert,
        fleet_certificate: request.certificate.clone(),
        enrolled_at: item.enrolled_at,
        policy_id: item.policy_id,
        status: item.status,
        active: item.active,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> EnrollmentRequest {
        EnrollmentRequest {
            server_url: "https://fleet.example:8220".to_string(),
            enrollment_token: "token".to_string(),
            hostname: "pixel".to_string(),
            certificate: None,
            verify_cert: true,
        }
    }

    #[test]
    fn test_request_validation() {
        assert!(request().validate().is_ok());

        let mut bad = request();
        bad.server_url = "fleet.example".to_string();
        assert!(matches!(bad.validate(), Err(EnrollError::Validation(_))));

        let mut bad = request();
        bad.enrollment_token = "  ".to_string();
        assert!(matches!(bad.validate(), Err(EnrollError::Validation(_))));

        let mut bad = request();
        bad.hostname = String::new();
        assert!(matches!(bad.validate(), Err(EnrollError::Validation(_))));
    }

    #[test]
    fn test_identity_requires_id_and_key() {
        let response = HttpResponse::new(200, r#"{"action":"created","item":{"id":"a1"}}"#);
        assert!(matches!(
            identity_from(&response, &request(), "https://fleet.example:8220"),
            Err(EnrollError::InvalidResponse(_))
        ));

        let response = HttpResponse::new(
            200,
            r#"{"item":{"id":"a1","access_api_key":"k","active":true,"policy_id":"p"}}"#,
        );
        let identity = identity_from(&response, &request(), "https://fleet.example:8220").unwrap();
        assert_eq!(identity.agent_id, "a1");
        assert_eq!(identity.policy_id.as_deref(), Some("p"));
        assert!(identity.verify_cert);
    }
}

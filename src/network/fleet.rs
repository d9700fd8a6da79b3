//! Fleet server client.
//!
//! Builds the four Fleet requests and hands them to the transport. Response
//! interpretation is left to the engines, which own the error taxonomy.

use super::tls::TlsPolicy;
use super::transport::{join_url, HttpRequest, HttpResponse, HttpTransport, Method};
use super::wire::{AckRequest, CheckinRequest, EnrollRequest};
use crate::config::AgentConfig;
use crate::error::TransportError;
use crate::storage::models::AgentIdentity;

pub const STATUS_PATH: &str = "/api/status";
pub const ENROLL_PATH: &str = "/api/fleet/agents/enroll";

pub fn checkin_path(agent_id: &str) -> String {
    format!("/api/fleet/agents/{}/checkin", agent_id)
}

pub fn acks_path(agent_id: &str) -> String {
    format!("/api/fleet/agents/{}/acks", agent_id)
}

pub struct FleetClient<'a> {
    transport: &'a dyn HttpTransport,
    config: &'a AgentConfig,
    base_url: String,
    tls: TlsPolicy,
}

impl<'a> FleetClient<'a> {
    pub fn new(
        transport: &'a dyn HttpTransport,
        config: &'a AgentConfig,
        base_url: &str,
        tls: TlsPolicy,
    ) -> Self {
        Self {
            transport,
            config,
            base_url: base_url.to_string(),
            tls,
        }
    }

    /// Client for an enrolled agent, trusting what enrollment trusted.
    pub fn for_identity(
        transport: &'a dyn HttpTransport,
        config: &'a AgentConfig,
        identity: &AgentIdentity,
    ) -> Self {
        Self::new(
            transport,
            config,
            &identity.fleet_url,
            tls_for(identity.verify_cert, identity.fleet_certificate.clone()),
        )
    }

    fn request(&self, method: Method, path: &str) -> HttpRequest {
        HttpRequest::new(method, join_url(&self.base_url, path))
            .header("User-Agent", self.config.user_agent.clone())
            .header("kbn-xsrf", "true")
            .tls(self.tls.clone())
    }

    pub fn status(&self) -> Result<HttpResponse, TransportError> {
        let request = self
            .request(Method::Get, STATUS_PATH)
            .timeout(self.config.status_timeout());
        self.transport.send(&request)
    }

    pub fn enroll(
        &self,
        enrollment_token: &str,
        payload: &EnrollRequest,
    ) -> Result<HttpResponse, TransportError> {
        let request = self
            .request(Method::Post, ENROLL_PATH)
            .header("Authorization", format!("ApiKey {}", enrollment_token))
            .timeout(self.config.enroll_timeout())
            .json(payload)?;
        self.transport.send(&request)
    }

    pub fn checkin(
        &self,
        agent_id: &str,
        access_api_key: &str,
        payload: &CheckinRequest,
    ) -> Result<HttpResponse, TransportError> {
        let request = self
            .request(Method::Post, &checkin_path(agent_id))
            .header("Authorization", format!("ApiKey {}", access_api_key))
            .timeout(self.config.checkin_timeout())
            .json(payload)?;
        self.transport.send(&request)
    }

    pub fn ack(
        &self,
        agent_id: &str,
        access_api_key: &str,
        payload: &AckRequest,
    ) -> Result<HttpResponse, TransportError> {
        let request = self
            .request(Method::Post, &acks_path(agent_id))
            .header("Authorization", format!("ApiKey {}", access_api_key))
            .timeout(self.config.ack_timeout())
            .json(payload)?;
        self.transport.send(&request)
    }
}

/// Verify against the supplied certificate, or trust everything.
pub fn tls_for(verify_cert: bool, certificate: Option<String>) -> TlsPolicy {
    if verify_cert {
        TlsPolicy::verify_with(certificate)
    } else {
        TlsPolicy::trust_all()
    }
}

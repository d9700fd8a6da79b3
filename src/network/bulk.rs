//! Bulk upload client.
//!
//! Documents are sent as NDJSON `create` operations against the policy's
//! data stream, authenticated with the output's API key.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::tls::TlsPolicy;
use super::transport::{join_url, HttpRequest, HttpResponse, HttpTransport, Method};
use crate::config::AgentConfig;
use crate::error::TransportError;
use crate::storage::models::{BufferedDocument, OutputConfig};

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

const CREATE_LINE: &str = "{\"create\":{}}";

/// Encode documents as a bulk body: one action line and one source line per
/// document, each newline terminated.
pub fn encode_bulk_body(docs: &[BufferedDocument]) -> Result<String, serde_json::Error> {
    let mut body = String::with_capacity(docs.len() * 256);
    for doc in docs {
        body.push_str(CREATE_LINE);
        body.push('\n');
        body.push_str(&serde_json::to_string(&doc.body)?);
        body.push('\n');
    }
    Ok(body)
}

/// `Authorization` value for an output API key (`id:key`).
pub fn api_key_header(api_key: &str) -> String {
    format!("ApiKey {}", STANDARD.encode(api_key.as_bytes()))
}

pub struct BulkClient<'a> {
    transport: &'a dyn HttpTransport,
    config: &'a AgentConfig,
}

impl<'a> BulkClient<'a> {
    pub fn new(transport: &'a dyn HttpTransport, config: &'a AgentConfig) -> Self {
        Self { transport, config }
    }

    /// PUT the body to `{host}/{index}/_bulk`.
    ///
    /// Hosts are tried in order; only a transport failure moves on to the
    /// next one. Any HTTP response, including an error status, is final.
    pub fn put_bulk(
        &self,
        output: &OutputConfig,
        index: &str,
        body: &str,
    ) -> Result<HttpResponse, TransportError> {
        let tls = TlsPolicy::pinned(&output.ca_trusted_fingerprint, output.ca_certificate.clone());
        let mut last_error = TransportError::Other(format!("output {} lists no hosts", output.name));

        for host in &output.hosts {
            let request = HttpRequest::new(Method::Put, join_url(host, &format!("{}/_bulk", index)))
                .header("Authorization", api_key_header(&output.api_key))
                .header("User-Agent", self.config.user_agent.clone())
                .timeout(self.config.upload_timeout())
                .tls(tls.clone())
                .body(NDJSON_CONTENT_TYPE, body.to_string());

            match self.transport.send(&request) {
                Ok(response) => return Ok(response),
                Err(e) => {
                    log::warn!("BULK_HOST_FAILED host={} error={}", host, e);
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

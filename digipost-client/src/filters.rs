//! Ordered request and response filter chains
//!
//! Outgoing requests pass through a list of small header transformers before
//! hitting the wire; inbound responses pass through the verifying
//! counterparts. The ordering is load-bearing: the body digest must be in
//! place before the signature is computed, and the date header is part of
//! the signed canonical string. The order is fixed in
//! [`default_request_filters`] rather than left to construction order.

use crate::error::{Error, Result};
use crate::security::{canonical_string, encode_base64, verify_signature, Signer};
use crate::{USER_AGENT, X_CONTENT_SHA256, X_DIGIPOST_SIGNATURE};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rsa::RsaPublicKey;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// An outbound request before it is handed to the transport.
///
/// The body is fully buffered; the digest and signature filters require the
/// complete byte body.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub method: String,
    pub path_and_query: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl OutgoingRequest {
    pub fn new(method: impl Into<String>, path_and_query: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: method.into(),
            path_and_query: path_and_query.into(),
            headers: Vec::new(),
            body,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
    }
}

/// An inbound response after the transport has drained it
#[derive(Debug, Clone)]
pub struct ReceivedResponse {
    pub status: u16,
    pub path_and_query: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ReceivedResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A small transformer applied to every outgoing request
pub trait RequestFilter: Send + Sync {
    fn apply(&self, request: &mut OutgoingRequest) -> Result<()>;
}

/// Stamps the fixed client identifier
pub struct RequestUserAgentFilter;

impl RequestFilter for RequestUserAgentFilter {
    fn apply(&self, request: &mut OutgoingRequest) -> Result<()> {
        request.set_header("User-Agent", USER_AGENT);
        Ok(())
    }
}

/// Stamps an RFC 1123 timestamp
pub struct RequestDateFilter;

impl RequestFilter for RequestDateFilter {
    fn apply(&self, request: &mut OutgoingRequest) -> Result<()> {
        request.set_header("Date", rfc1123(Utc::now()));
        Ok(())
    }
}

/// Computes base64(SHA-256(body)) into the digest header.
///
/// Must run before the signature filter; the digest header is part of the
/// canonical string.
pub struct RequestDigestFilter;

impl RequestFilter for RequestDigestFilter {
    fn apply(&self, request: &mut OutgoingRequest) -> Result<()> {
        let digest = sha256_base64(&request.body);
        request.set_header(X_CONTENT_SHA256, digest);
        Ok(())
    }
}

/// Signs the canonical request string into the signature header
pub struct RequestSignatureFilter {
    signer: Arc<dyn Signer>,
}

impl RequestSignatureFilter {
    pub fn new(signer: Arc<dyn Signer>) -> Self {
        Self { signer }
    }
}

impl RequestFilter for RequestSignatureFilter {
    fn apply(&self, request: &mut OutgoingRequest) -> Result<()> {
        let canonical = canonical_string(&request.method, &request.path_and_query, &request.headers);
        let signature = self.signer.sign(canonical.as_bytes())?;
        request.set_header(X_DIGIPOST_SIGNATURE, encode_base64(&signature));
        debug!(path = %request.path_and_query, "signed request");
        Ok(())
    }
}

/// The filter chain in its mandatory order: user-agent, date, digest,
/// signature.
pub fn default_request_filters(signer: Arc<dyn Signer>) -> Vec<Box<dyn RequestFilter>> {
    vec![
        Box::new(RequestUserAgentFilter),
        Box::new(RequestDateFilter),
        Box::new(RequestDigestFilter),
        Box::new(RequestSignatureFilter::new(signer)),
    ]
}

/// Apply a filter chain in order
pub fn apply_request_filters(filters: &[Box<dyn RequestFilter>], request: &mut OutgoingRequest) -> Result<()> {
    for filter in filters {
        filter.apply(request)?;
    }
    Ok(())
}

/// Shared inputs for response verification
pub struct VerificationContext<'a> {
    /// Server public key for signature verification; `None` while
    /// bootstrapping the entry point and certificate
    pub server_key: Option<&'a RsaPublicKey>,
    pub skew_tolerance: Duration,
}

/// A verifying counterpart applied to every inbound response
pub trait ResponseFilter: Send + Sync {
    fn verify(&self, response: &ReceivedResponse, context: &VerificationContext<'_>) -> Result<()>;
}

/// Re-computes the body digest and compares with the advertised header
pub struct ResponseDigestFilter;

impl ResponseFilter for ResponseDigestFilter {
    fn verify(&self, response: &ReceivedResponse, _context: &VerificationContext<'_>) -> Result<()> {
        let Some(advertised) = response.header(X_CONTENT_SHA256) else {
            return Ok(());
        };
        let actual = sha256_base64(&response.body);
        if advertised != actual {
            return Err(Error::DigestMismatch(format!(
                "advertised {} but body digests to {}",
                advertised, actual
            )));
        }
        Ok(())
    }
}

/// Checks the response timestamp against the accepted skew window
pub struct ResponseDateFilter;

impl ResponseFilter for ResponseDateFilter {
    fn verify(&self, response: &ReceivedResponse, context: &VerificationContext<'_>) -> Result<()> {
        let Some(date) = response.header("Date") else {
            return Err(Error::ClockSkew("response carries no Date header".to_string()));
        };
        let timestamp = DateTime::parse_from_rfc2822(date)
            .map_err(|e| Error::ClockSkew(format!("unparseable response Date '{}': {}", date, e)))?;
        let skew = Utc::now().signed_duration_since(timestamp.with_timezone(&Utc));
        let tolerance = ChronoDuration::from_std(context.skew_tolerance)
            .unwrap_or_else(|_| ChronoDuration::seconds(crate::DEFAULT_SKEW_TOLERANCE_SECS as i64));
        if skew > tolerance || skew < -tolerance {
            return Err(Error::ClockSkew(format!(
                "response Date '{}' is {}s away from local time",
                date,
                skew.num_seconds()
            )));
        }
        Ok(())
    }
}

/// Verifies the response signature against the mirrored canonical string
pub struct ResponseSignatureFilter;

impl ResponseFilter for ResponseSignatureFilter {
    fn verify(&self, response: &ReceivedResponse, context: &VerificationContext<'_>) -> Result<()> {
        let Some(server_key) = context.server_key else {
            debug!(path = %response.path_and_query, "no server certificate yet, skipping signature verification");
            return Ok(());
        };
        let Some(signature) = response.header(X_DIGIPOST_SIGNATURE) else {
            return Err(Error::SignatureMismatch(
                "response carries no signature header".to_string(),
            ));
        };
        let canonical = canonical_string(
            &response.status.to_string(),
            &response.path_and_query,
            &response.headers,
        );
        verify_signature(server_key, canonical.as_bytes(), signature)
    }
}

/// The response checks in their mandatory order
pub fn default_response_filters() -> Vec<Box<dyn ResponseFilter>> {
    vec![
        Box::new(ResponseDigestFilter),
        Box::new(ResponseDateFilter),
        Box::new(ResponseSignatureFilter),
    ]
}

pub(crate) fn sha256_base64(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    encode_base64(&hasher.finalize())
}

pub(crate) fn rfc1123(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

// SPDX-License-Identifier: Apache-2.0
//
// Digipost API client for Rust
//
// https://github.com/digipost/digipost-client-rs

//! Single HTTP methods wrapping each server operation
//!
//! [`ApiService`] exclusively owns the HTTP transport and the entry-point
//! cache. Every outbound request passes through the ordered request filter
//! chain; every inbound response passes through the verifying counterparts.
//! Operations return the raw [`ReceivedResponse`] for the orchestrator to
//! interpret; [`ApiService::parse`] handles the common
//! check-status-then-deserialize path.

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::filters::{
    apply_request_filters, default_request_filters, default_response_filters, OutgoingRequest, ReceivedResponse,
    RequestFilter, ResponseFilter, VerificationContext,
};
use crate::multipart::MultipartBody;
use crate::representations::{
    EntryPoint, ErrorMessage, Identification, Link, Linked, Message, Relation,
};
use crate::security::{parse_public_key_pem, Signer};
use crate::{DIGIPOST_MEDIA_TYPE, X_DIGIPOST_USER_ID};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use reqwest::{Client, ClientBuilder, Method};
use rsa::RsaPublicKey;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

const ENTRY_POINT_PATH: &str = "/";

/// HTTP access to the Digipost REST API.
///
/// Safe for parallel invocation from many tasks. The entry-point cache is
/// lazily initialised and never invalidated for the lifetime of the
/// instance; callers needing a refresh construct a new instance.
pub struct ApiService {
    client: Client,
    base_url: Url,
    sender_account_id: i64,
    request_filters: Vec<Box<dyn RequestFilter>>,
    response_filters: Vec<Box<dyn ResponseFilter>>,
    fail_on_verification_error: bool,
    skew_tolerance: Duration,
    entry_point: RwLock<Option<EntryPoint>>,
    server_key: RwLock<Option<RsaPublicKey>>,
}

impl ApiService {
    /// Create a new service with the configured transport and filter chain
    pub fn new(config: &ClientConfig, signer: Arc<dyn Signer>) -> Result<Self> {
        let base_url = config.base_url()?;
        let client = ClientBuilder::new()
            .timeout(config.timeout())
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .use_rustls_tls()
            .https_only(base_url.scheme() == "https")
            .build()
            .map_err(Error::Transport)?;

        Ok(Self {
            client,
            base_url,
            sender_account_id: config.sender_account_id,
            request_filters: default_request_filters(signer),
            response_filters: default_response_filters(),
            fail_on_verification_error: config.fail_on_response_validation_error,
            skew_tolerance: config.skew_tolerance(),
            entry_point: RwLock::new(None),
            server_key: RwLock::new(None),
        })
    }

    pub fn sender_account_id(&self) -> i64 {
        self.sender_account_id
    }

    /// The cached entry point, fetched on first use.
    ///
    /// Concurrent first-callers may each issue a fetch; later readers
    /// observe a consistent, fully populated value. The lock is released
    /// before any network call.
    pub async fn entry_point(&self) -> Result<EntryPoint> {
        if let Some(entry_point) = self.entry_point.read().clone() {
            return Ok(entry_point);
        }

        let response = self.get_entry_point().await?;
        if response.status != 200 {
            return Err(server_error(&response));
        }
        let entry_point: EntryPoint = serde_json::from_slice(&response.body)?;
        *self.entry_point.write() = Some(entry_point.clone());
        debug!("cached entry point");

        self.bootstrap_server_certificate(&entry_point).await;
        Ok(entry_point)
    }

    /// Fetch the server's signing certificate so subsequent responses can be
    /// signature-verified. The bootstrap responses themselves are digest-
    /// and date-verified only.
    async fn bootstrap_server_certificate(&self, entry_point: &EntryPoint) {
        if self.server_key.read().is_some() {
            return;
        }
        let Ok(certificate_uri) = entry_point.certificate_uri() else {
            warn!("entry point publishes no certificate link, response signatures will not be verified");
            return;
        };
        let result = async {
            let request = self.get_request(&certificate_uri, Vec::new());
            let response = self.execute(certificate_uri.clone(), request).await?;
            if response.status != 200 {
                return Err(server_error(&response));
            }
            let pem = String::from_utf8_lossy(&response.body);
            parse_public_key_pem(&pem)
        }
        .await;
        match result {
            Ok(key) => {
                *self.server_key.write() = Some(key);
                debug!("cached server certificate");
            }
            Err(e) => warn!("failed to fetch server certificate: {}", e),
        }
    }

    /// `GET /` with sender identity header, unparsed
    pub async fn get_entry_point(&self) -> Result<ReceivedResponse> {
        let url = self.base_url.join(ENTRY_POINT_PATH).map_err(bad_uri)?;
        let request = self.get_request(&url, Vec::new());
        self.execute(url, request).await
    }

    /// POST the message to the create-message resource
    pub async fn create_message(&self, message: &Message) -> Result<ReceivedResponse> {
        let url = self.entry_point().await?.create_message_uri()?;
        let body = serde_json::to_vec(message)?;
        let mut request = self.post_request(&url, body);
        request.set_header("Content-Type", DIGIPOST_MEDIA_TYPE);
        self.execute(url, request).await
    }

    /// GET an already created message resource by its absolute URI
    pub async fn fetch_existing_message(&self, location: &Url) -> Result<ReceivedResponse> {
        let request = self.get_request(location, Vec::new());
        self.execute(location.clone(), request).await
    }

    /// POST document content to an add-content link
    pub async fn add_content(&self, add_content_link: &Link, content: Vec<u8>) -> Result<ReceivedResponse> {
        let url = add_content_link.uri.clone();
        let mut request = self.post_request(&url, content);
        request.set_header("Content-Type", "application/octet-stream");
        self.execute(url, request).await
    }

    /// POST to a send link, finalizing the delivery
    pub async fn send(&self, send_link: &Link) -> Result<ReceivedResponse> {
        let url = send_link.uri.clone();
        let request = self.post_request(&url, Vec::new());
        self.execute(url, request).await
    }

    /// POST an assembled multipart message to the create-message resource
    pub async fn multipart_message(&self, multipart: MultipartBody) -> Result<ReceivedResponse> {
        let url = self.entry_point().await?.create_message_uri()?;
        let mut request = self.post_request(&url, multipart.body);
        request.set_header("Content-Type", multipart.content_type);
        self.execute(url, request).await
    }

    /// POST an identification query
    pub async fn identify_recipient(&self, identification: &Identification) -> Result<ReceivedResponse> {
        let url = self.entry_point().await?.required_link(Relation::Identify)?.uri.clone();
        self.post_json(url, identification).await
    }

    /// POST an identification query that also returns the recipient's
    /// encryption key when the recipient is digital
    pub async fn identify_and_get_encryption_key(
        &self,
        identification: &Identification,
    ) -> Result<ReceivedResponse> {
        let url = self
            .entry_point()
            .await?
            .required_link(Relation::IdentifyAndGetEncryptionKey)?
            .uri
            .clone();
        self.post_json(url, identification).await
    }

    /// GET an encryption key by the URI of a document's key link
    pub async fn get_encryption_key(&self, uri: &Url) -> Result<ReceivedResponse> {
        let request = self.get_request(uri, Vec::new());
        self.execute(uri.clone(), request).await
    }

    /// GET the shared print encryption key
    pub async fn get_encryption_key_for_print(&self) -> Result<ReceivedResponse> {
        let url = self.entry_point().await?.print_encryption_key_uri()?;
        let request = self.get_request(&url, Vec::new());
        self.execute(url, request).await
    }

    /// GET recipient search results for a term
    pub async fn search(&self, term: &str) -> Result<ReceivedResponse> {
        let url = self.entry_point().await?.required_link(Relation::Search)?.uri.clone();
        let url = push_path_segment(url, term)?;
        let request = self.get_request(&url, Vec::new());
        self.execute(url, request).await
    }

    /// GET autocomplete suggestions for a partial term
    pub async fn autocomplete(&self, term: &str) -> Result<ReceivedResponse> {
        let url = self.entry_point().await?.required_link(Relation::Autocomplete)?.uri.clone();
        let url = push_path_segment(url, term)?;
        let request = self.get_request(&url, Vec::new());
        self.execute(url, request).await
    }

    /// GET document events in a time window
    pub async fn get_document_events(
        &self,
        organisation: Option<(&str, Option<&str>)>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        offset: u32,
        max_results: u32,
    ) -> Result<ReceivedResponse> {
        let mut url = self
            .entry_point()
            .await?
            .required_link(Relation::DocumentEvents)?
            .uri
            .clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("from", &from.to_rfc3339())
                .append_pair("to", &to.to_rfc3339())
                .append_pair("offset", &offset.to_string())
                .append_pair("maxResults", &max_results.to_string());
            if let Some((org, part)) = organisation {
                query.append_pair("org", org);
                if let Some(part) = part {
                    query.append_pair("part", part);
                }
            }
        }
        let request = self.get_request(&url, Vec::new());
        self.execute(url, request).await
    }

    /// GET the status resource a document links to
    pub async fn get_document_status(&self, status_link: &Link) -> Result<ReceivedResponse> {
        let url = status_link.uri.clone();
        let request = self.get_request(&url, Vec::new());
        self.execute(url, request).await
    }

    /// GET information about a sender account by its id
    pub async fn get_sender_information_by_id(&self, sender_id: i64) -> Result<ReceivedResponse> {
        let url = self
            .entry_point()
            .await?
            .required_link(Relation::SenderInformation)?
            .uri
            .clone();
        let url = push_path_segment(url, &sender_id.to_string())?;
        let request = self.get_request(&url, Vec::new());
        self.execute(url, request).await
    }

    /// GET information about a sender account by organisation number and
    /// optional part id
    pub async fn get_sender_information_by_organisation(
        &self,
        organisation_number: &str,
        part_id: Option<&str>,
    ) -> Result<ReceivedResponse> {
        let mut url = self
            .entry_point()
            .await?
            .required_link(Relation::SenderInformation)?
            .uri
            .clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("org_id", organisation_number);
            if let Some(part) = part_id {
                query.append_pair("part_id", part);
            }
        }
        let request = self.get_request(&url, Vec::new());
        self.execute(url, request).await
    }

    /// GET arbitrary content by a path below the API root
    pub async fn get_content(&self, path: &str) -> Result<ReceivedResponse> {
        let url = self.base_url.join(path).map_err(bad_uri)?;
        let request = self.get_request(&url, Vec::new());
        self.execute(url, request).await
    }

    /// GET the inbox listing
    pub async fn get_inbox(&self, offset: u32, limit: u32) -> Result<ReceivedResponse> {
        let mut url = self.entry_point().await?.required_link(Relation::Inbox)?.uri.clone();
        url.query_pairs_mut()
            .append_pair("offset", &offset.to_string())
            .append_pair("limit", &limit.to_string());
        let request = self.get_request(&url, Vec::new());
        self.execute(url, request).await
    }

    /// GET the content of an inbox letter via its letter-content link
    pub async fn get_inbox_letter_content(&self, content_link: &Link) -> Result<ReceivedResponse> {
        let url = content_link.uri.clone();
        let request = self.get_request(&url, Vec::new());
        self.execute(url, request).await
    }

    /// DELETE an inbox letter via its delete-letter link
    pub async fn delete_inbox_letter(&self, delete_link: &Link) -> Result<ReceivedResponse> {
        let url = delete_link.uri.clone();
        let mut request = OutgoingRequest::new("DELETE", path_and_query(&url), Vec::new());
        self.decorate(&mut request);
        self.execute(url, request).await
    }

    /// Check the status and deserialize the body of a raw response
    pub fn parse<T: DeserializeOwned>(&self, response: &ReceivedResponse) -> Result<T> {
        check_response(response)?;
        Ok(serde_json::from_slice(&response.body)?)
    }

    fn get_request(&self, url: &Url, body: Vec<u8>) -> OutgoingRequest {
        let mut request = OutgoingRequest::new("GET", path_and_query(url), body);
        self.decorate(&mut request);
        request
    }

    fn post_request(&self, url: &Url, body: Vec<u8>) -> OutgoingRequest {
        let mut request = OutgoingRequest::new("POST", path_and_query(url), body);
        self.decorate(&mut request);
        request
    }

    fn decorate(&self, request: &mut OutgoingRequest) {
        request.set_header(X_DIGIPOST_USER_ID, self.sender_account_id.to_string());
        request.set_header("Accept", DIGIPOST_MEDIA_TYPE);
    }

    async fn post_json<T: serde::Serialize>(&self, url: Url, body: &T) -> Result<ReceivedResponse> {
        let mut request = self.post_request(&url, serde_json::to_vec(body)?);
        request.set_header("Content-Type", DIGIPOST_MEDIA_TYPE);
        self.execute(url, request).await
    }

    /// Run the filter chain, perform the exchange, and verify the response
    #[instrument(skip_all, fields(method = %request.method, path = %request.path_and_query))]
    async fn execute(&self, url: Url, mut request: OutgoingRequest) -> Result<ReceivedResponse> {
        apply_request_filters(&self.request_filters, &mut request)?;

        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| Error::ProblemWithRequest(format!("invalid method: {}", e)))?;
        let mut builder = self.client.request(method, url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body);
        }

        let response = builder.send().await.map_err(Error::Transport)?;
        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();
        let body = response.bytes().await.map_err(Error::Transport)?.to_vec();

        let received = ReceivedResponse {
            status,
            path_and_query: request.path_and_query,
            headers,
            body,
        };
        self.verify_response(&received)?;
        debug!(status = received.status, "exchange complete");
        Ok(received)
    }

    /// Apply the response checks in order. Verification failures are
    /// downgraded to warnings in soft mode; both modes run every check.
    fn verify_response(&self, response: &ReceivedResponse) -> Result<()> {
        let key_guard = self.server_key.read();
        let context = VerificationContext {
            server_key: key_guard.as_ref(),
            skew_tolerance: self.skew_tolerance,
        };
        for filter in &self.response_filters {
            if let Err(e) = filter.verify(response, &context) {
                if e.is_verification_failure() && !self.fail_on_verification_error {
                    warn!(path = %response.path_and_query, "response verification failed: {}", e);
                } else {
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}

/// Map a non-2xx response to a server error, carrying the server's error
/// message when parseable
pub fn server_error(response: &ReceivedResponse) -> Error {
    let message = serde_json::from_slice::<ErrorMessage>(&response.body)
        .map(|e| e.error_message)
        .unwrap_or_else(|_| String::from_utf8_lossy(&response.body).into_owned());
    Error::Server {
        status: response.status,
        message,
    }
}

/// Fail unless the response is 2xx
pub fn check_response(response: &ReceivedResponse) -> Result<()> {
    if (200..300).contains(&response.status) {
        Ok(())
    } else {
        Err(server_error(response))
    }
}

fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

fn push_path_segment(mut url: Url, segment: &str) -> Result<Url> {
    url.path_segments_mut()
        .map_err(|_| Error::ProblemWithRequest("URI cannot take a path segment".to_string()))?
        .pop_if_empty()
        .push(segment);
    Ok(url)
}

fn bad_uri(e: url::ParseError) -> Error {
    Error::ProblemWithRequest(format!("invalid URI: {}", e))
}

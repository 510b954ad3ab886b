//! The delivery orchestrator
//!
//! Turns a logical [`Message`] into one or more HTTP resources: create (or
//! fetch the existing duplicate), upload content per document, send. The
//! atomic variant collapses all of it into a single multipart POST. Owns the
//! print encryption key cache.

use crate::api::{check_response, ApiService};
use crate::client::EventLogger;
use crate::config::ClientConfig;
use crate::encrypt::ContentEncrypter;
use crate::error::{Error, Result};
use crate::multipart::{build_multipart_mixed, MultipartPart};
use crate::prepare::DocumentsPreparer;
use crate::representations::{
    Document, EncryptionKey, Identification, IdentificationResultCode, IdentificationResultWithEncryptionKey,
    Message, MessageDelivery, MessageStatus,
};
use crate::security::ServerPublicKey;
use crate::DIGIPOST_MEDIA_TYPE;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

#[derive(Clone)]
struct CachedPrintKey {
    key: ServerPublicKey,
    fetched_at: Instant,
}

pub struct MessageSender {
    api: Arc<ApiService>,
    event_logger: Arc<dyn EventLogger>,
    encrypter: Arc<dyn ContentEncrypter>,
    preparer: DocumentsPreparer,
    print_key_cache: Mutex<Option<CachedPrintKey>>,
    print_key_ttl: Duration,
    print_key_cache_disabled: bool,
}

impl MessageSender {
    pub fn new(
        api: Arc<ApiService>,
        config: &ClientConfig,
        encrypter: Arc<dyn ContentEncrypter>,
        event_logger: Arc<dyn EventLogger>,
    ) -> Self {
        Self {
            api,
            event_logger,
            encrypter,
            preparer: DocumentsPreparer::new(config.pdf_validation.clone()),
            print_key_cache: Mutex::new(None),
            print_key_ttl: config.print_key_ttl(),
            print_key_cache_disabled: config.disable_print_key_cache,
        }
    }

    /// Create the message resource, or fetch the existing one when the
    /// server reports a duplicate.
    ///
    /// On 409 Conflict the `Location` header is followed with a GET and the
    /// fetched delivery is compared structurally to the submitted message:
    /// any mismatch fails, as does a duplicate that already reached a final
    /// state.
    pub async fn create_or_fetch_message(&self, message: &Message) -> Result<MessageDelivery> {
        message.validate()?;
        let response = self.api.create_message(message).await?;

        if response.status == 409 {
            let location = response
                .header("Location")
                .ok_or_else(|| Error::ProblemWithRequest("409 response carries no Location header".to_string()))?;
            let location = Url::parse(location)
                .map_err(|e| Error::ProblemWithRequest(format!("unparseable Location '{}': {}", location, e)))?;

            let existing_response = self.api.fetch_existing_message(&location).await?;
            check_response(&existing_response)?;
            let existing: MessageDelivery = serde_json::from_slice(&existing_response.body)?;

            let differences = existing.differences_from(message);
            if !differences.is_empty() {
                return Err(Error::DuplicateDiffers(differences.join("; ")));
            }
            self.check_not_already_delivered(&existing)?;

            self.log(&format!(
                "identical message '{}' already exists, using the existing resource",
                message.message_id
            ));
            return Ok(existing);
        }

        check_response(&response)?;
        self.log(&format!("created message '{}'", message.message_id));
        Ok(serde_json::from_slice(&response.body)?)
    }

    /// Upload content for one document of a created delivery.
    ///
    /// When the delivery resolved to print the caller-supplied print copy is
    /// uploaded instead and the document's file type is rewritten to "pdf";
    /// the print copy must itself be PDF bytes. Pre-encrypt documents fetch
    /// their key and pass through the encrypter before upload.
    pub async fn add_content(
        &self,
        delivery: &MessageDelivery,
        document: &Document,
        content: Vec<u8>,
        print_content: Option<Vec<u8>>,
    ) -> Result<MessageDelivery> {
        self.verify_correct_status(delivery, MessageStatus::NotComplete)?;

        let (upload_document, bytes, for_print) = if delivery.will_be_delivered_in_digipost() {
            (document.clone(), content, false)
        } else {
            let print_bytes = print_content.ok_or_else(|| {
                Error::ProblemWithRequest(format!(
                    "delivery of '{}' resolves to print but no print copy was supplied for document {}",
                    delivery.message_id, document.uuid
                ))
            })?;
            (document.with_pdf_file_type(), print_bytes, true)
        };

        // The server's copy of the document carries the relation links
        let server_document = delivery.document_by_uuid(document.uuid).ok_or_else(|| {
            Error::ProblemWithRequest(format!(
                "document {} is not part of delivery '{}'",
                document.uuid, delivery.message_id
            ))
        })?;
        let add_content_link = server_document
            .add_content_link()
            .ok_or_else(|| {
                Error::ProblemWithRequest(format!(
                    "document {} has no add-content link",
                    document.uuid
                ))
            })?
            .clone();

        let key = if document.pre_encrypt {
            self.log(&format!("fetching encryption key for document {}", document.uuid));
            let key_link = server_document.encryption_key_link().ok_or_else(|| {
                Error::CannotPreencrypt(format!("document {} has no encryption-key link", document.uuid))
            })?;
            let key_uri = key_link.uri.clone();
            Some(self.fetch_encryption_key(&key_uri).await?)
        } else {
            None
        };

        let prepared = self
            .preparer
            .prepare(&upload_document, bytes, for_print, key.as_ref(), self.encrypter.as_ref())?;

        let response = self.api.add_content(&add_content_link, prepared).await?;
        check_response(&response)?;
        debug!(document = %document.uuid, "content uploaded");
        Ok(serde_json::from_slice(&response.body)?)
    }

    /// Finalize a delivery by following its SEND link.
    ///
    /// Already-delivered digital messages and deliveries without a SEND link
    /// (incomplete) are no-ops, logged explicitly.
    pub async fn send_message(&self, delivery: &MessageDelivery) -> Result<MessageDelivery> {
        if delivery.is_already_delivered_to_digipost() {
            self.log(&format!("message '{}' is already delivered, nothing to send", delivery.message_id));
            return Ok(delivery.clone());
        }
        let Some(send_link) = delivery.send_link() else {
            self.log(&format!("message '{}' is not complete, cannot send", delivery.message_id));
            return Ok(delivery.clone());
        };

        let response = self.api.send(send_link).await?;
        check_response(&response)?;
        let delivered: MessageDelivery = serde_json::from_slice(&response.body)?;
        self.log(&format!("message '{}' was sent", delivered.message_id));
        Ok(delivered)
    }

    /// Atomic delivery: one multipart POST carrying the message and every
    /// document's content, in caller order.
    ///
    /// All validation, key resolution and encryption happen before anything
    /// touches the network; a pre-encrypt document without a reachable key
    /// never produces an HTTP body.
    pub async fn send_multipart_message(
        &self,
        message: &Message,
        contents: &[(Uuid, Vec<u8>)],
    ) -> Result<MessageDelivery> {
        message.validate()?;
        let key = self.fetch_encryption_key_for_recipient_if_necessary(message).await?;

        let mut parts = vec![MultipartPart::new(
            "message",
            DIGIPOST_MEDIA_TYPE,
            serde_json::to_vec(message)?,
        )];
        for (uuid, content) in contents {
            let document = message.document_by_uuid(*uuid).ok_or_else(|| {
                Error::ProblemWithRequest(format!("content supplied for unknown document {}", uuid))
            })?;
            let document_key = if document.pre_encrypt { key.as_ref() } else { None };
            if document.pre_encrypt {
                self.log(&format!("encrypting content for document {}", uuid));
            }
            let prepared = self.preparer.prepare(
                document,
                content.clone(),
                message.is_direct_print(),
                document_key,
                self.encrypter.as_ref(),
            )?;
            let content_type = format!("application/{}", document.file_type.as_str());
            parts.push(MultipartPart::new(uuid.to_string(), content_type, prepared));
        }

        let multipart = build_multipart_mixed(&parts);
        let response = self.api.multipart_message(multipart).await?;

        if response.status == 409 {
            let location = response
                .header("Location")
                .ok_or_else(|| Error::ProblemWithRequest("409 response carries no Location header".to_string()))?;
            let location = Url::parse(location)
                .map_err(|e| Error::ProblemWithRequest(format!("unparseable Location '{}': {}", location, e)))?;
            let existing_response = self.api.fetch_existing_message(&location).await?;
            check_response(&existing_response)?;
            let existing: MessageDelivery = serde_json::from_slice(&existing_response.body)?;
            let differences = existing.differences_from(message);
            if !differences.is_empty() {
                return Err(Error::DuplicateDiffers(differences.join("; ")));
            }
            self.check_not_already_delivered(&existing)?;
            return Ok(existing);
        }

        check_response(&response)?;
        let delivery: MessageDelivery = serde_json::from_slice(&response.body)?;
        self.log(&format!("message '{}' was sent", delivery.message_id));
        Ok(delivery)
    }

    /// Identify a recipient and obtain their encryption key in one call
    pub async fn identify_and_get_encryption_key(
        &self,
        identification: &Identification,
    ) -> Result<IdentificationResultWithEncryptionKey> {
        let response = self.api.identify_and_get_encryption_key(identification).await?;
        check_response(&response)?;
        let result: IdentificationResultWithEncryptionKey = serde_json::from_slice(&response.body)?;
        if result.result.result == IdentificationResultCode::Digipost {
            if result.encryption_key.is_none() {
                return Err(Error::Server {
                    status: response.status,
                    message: "server identified recipient as a Digipost user but sent no encryption key"
                        .to_string(),
                });
            }
            self.log("recipient is a Digipost user, obtained their encryption key");
        } else {
            self.log("recipient is not a Digipost user");
        }
        Ok(result)
    }

    /// The shared print encryption key, cached for the configured TTL.
    ///
    /// The lock is released before the network fetch; under race the last
    /// writer's value and timestamp become visible atomically. Duplicate
    /// fetches are tolerated.
    pub async fn encryption_key_for_print(&self) -> Result<ServerPublicKey> {
        if !self.print_key_cache_disabled {
            let cached = self.print_key_cache.lock().clone();
            if let Some(cached) = cached {
                if cached.fetched_at.elapsed() <= self.print_key_ttl {
                    debug!("using cached print encryption key");
                    return Ok(cached.key);
                }
            }
        }

        let response = self.api.get_encryption_key_for_print().await?;
        check_response(&response)?;
        let encryption_key: EncryptionKey = serde_json::from_slice(&response.body)?;
        let key = ServerPublicKey::from_encryption_key(&encryption_key)?;

        if !self.print_key_cache_disabled {
            *self.print_key_cache.lock() = Some(CachedPrintKey {
                key: key.clone(),
                fetched_at: Instant::now(),
            });
        }
        Ok(key)
    }

    /// Fetch a document's encryption key by the URI of its key link
    pub async fn fetch_encryption_key(&self, uri: &Url) -> Result<ServerPublicKey> {
        let response = self.api.get_encryption_key(uri).await?;
        if response.status == 404 {
            return Err(Error::EncryptionKeyNotFound(format!("no encryption key at {}", uri)));
        }
        check_response(&response)?;
        let encryption_key: EncryptionKey = serde_json::from_slice(&response.body)?;
        ServerPublicKey::from_encryption_key(&encryption_key)
    }

    /// Resolve which key an atomic send must encrypt under:
    /// direct print uses the print key; a digital recipient uses their own
    /// key; a non-digital recipient with print fallback uses the print key;
    /// a non-digital recipient without fallback is an error. Without any
    /// pre-encrypt document no key is fetched at all.
    async fn fetch_encryption_key_for_recipient_if_necessary(
        &self,
        message: &Message,
    ) -> Result<Option<ServerPublicKey>> {
        if !message.has_any_document_requiring_pre_encryption() {
            return Ok(None);
        }
        if message.is_direct_print() {
            self.log("direct print, using the print encryption key");
            return Ok(Some(self.encryption_key_for_print().await?));
        }

        let identification = message.recipient.to_identification()?;
        let result = self.identify_and_get_encryption_key(&identification).await?;
        if result.result.result == IdentificationResultCode::Digipost {
            let encryption_key = result.encryption_key.ok_or_else(|| {
                Error::EncryptionKeyNotFound("identification result carries no encryption key".to_string())
            })?;
            return Ok(Some(ServerPublicKey::from_encryption_key(&encryption_key)?));
        }
        if message.recipient.has_print_details() {
            self.log("recipient is not a Digipost user, using the print encryption key");
            return Ok(Some(self.encryption_key_for_print().await?));
        }
        Err(Error::UnknownRecipient(
            "recipient is not a Digipost user and the message has no print fallback".to_string(),
        ))
    }

    fn check_not_already_delivered(&self, existing: &MessageDelivery) -> Result<()> {
        match existing.status {
            MessageStatus::Delivered => {
                let text = format!(
                    "a message with id '{}' was already delivered to the recipient at {:?}; \
                     this usually indicates duplicate calls",
                    existing.message_id, existing.delivered_date
                );
                warn!("{}", text);
                Err(Error::AlreadyDeliveredDigital(text))
            }
            MessageStatus::DeliveredToPrint => {
                let text = format!(
                    "a message with id '{}' was already delivered to print at {:?}; \
                     this usually indicates duplicate calls",
                    existing.message_id, existing.delivered_date
                );
                warn!("{}", text);
                Err(Error::AlreadyDeliveredPrint(text))
            }
            _ => Ok(()),
        }
    }

    fn verify_correct_status(&self, delivery: &MessageDelivery, expected: MessageStatus) -> Result<()> {
        if delivery.status != expected {
            return Err(Error::InvalidTransaction(format!(
                "operation requires delivery status {:?} but '{}' is {:?}",
                expected, delivery.message_id, delivery.status
            )));
        }
        Ok(())
    }

    fn log(&self, event: &str) {
        info!("{}", event);
        self.event_logger.log(event);
    }
}

//! The public facade
//!
//! [`DigipostClient`] wires the transport, the filter chain, the
//! orchestrator and the read-side queries together. One client instance
//! owns one `ApiService` and is safe to share across tasks.

use crate::api::{check_response, ApiService};
use crate::config::ClientConfig;
use crate::delivery::{AtomicDelivery, MessageDeliverer, OngoingDelivery};
use crate::encrypt::{CmsEncrypter, ContentEncrypter};
use crate::error::Result;
use crate::inbox::{
    DocumentEvents, DocumentStatus, Inbox, InboxCommunicator, InboxDocument, SenderInformation,
};
use crate::representations::{
    Autocomplete, Identification, IdentificationResult, Link, Message, Recipients,
};
use crate::security::Signer;
use crate::sender::MessageSender;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// Callback-style event log surfaced to the embedding application.
///
/// Implementations must be cheap; they are invoked inline on the delivery
/// path.
pub trait EventLogger: Send + Sync {
    fn log(&self, event: &str);
}

/// Discards all events
pub struct NoopEventLogger;

impl EventLogger for NoopEventLogger {
    fn log(&self, _event: &str) {}
}

/// Sentinel no-op logger
pub const NOOP_EVENT_LOGGER: NoopEventLogger = NoopEventLogger;

/// A client for sending letters through Digipost
pub struct DigipostClient {
    api: Arc<ApiService>,
    deliverer: MessageDeliverer,
    inbox: InboxCommunicator,
}

impl DigipostClient {
    /// Create a client with the default CMS encrypter and no event logger
    pub fn new(config: ClientConfig, signer: Arc<dyn Signer>) -> Result<Self> {
        Self::with_components(config, signer, Arc::new(CmsEncrypter), Arc::new(NoopEventLogger))
    }

    pub fn with_event_logger(
        config: ClientConfig,
        signer: Arc<dyn Signer>,
        event_logger: Arc<dyn EventLogger>,
    ) -> Result<Self> {
        Self::with_components(config, signer, Arc::new(CmsEncrypter), event_logger)
    }

    /// Create a client with replaceable capability providers
    pub fn with_components(
        config: ClientConfig,
        signer: Arc<dyn Signer>,
        encrypter: Arc<dyn ContentEncrypter>,
        event_logger: Arc<dyn EventLogger>,
    ) -> Result<Self> {
        config.validate()?;
        let api = Arc::new(ApiService::new(&config, signer)?);
        let sender = Arc::new(MessageSender::new(api.clone(), &config, encrypter, event_logger));
        let deliverer = MessageDeliverer::new(config.delivery_flavour, sender);
        let inbox = InboxCommunicator::new(api.clone());
        debug!(base_url = %config.base_url, "initialized Digipost client");
        Ok(Self { api, deliverer, inbox })
    }

    /// Begin a delivery through Digipost, with print fallback when the
    /// recipient carries print details. The configured flavour decides
    /// whether this is stepwise or atomic.
    pub async fn create_message(&self, message: Message) -> Result<OngoingDelivery> {
        self.deliverer.create_message(message).await
    }

    /// Begin a delivery going directly to print and ordinary mail
    pub fn create_print_only_message(&self, message: Message) -> Result<AtomicDelivery> {
        self.deliverer.create_print_only_message(message)
    }

    /// Check whether a recipient can receive digital mail
    pub async fn identify_recipient(&self, identification: &Identification) -> Result<IdentificationResult> {
        let response = self.api.identify_recipient(identification).await?;
        self.api.parse(&response)
    }

    pub async fn search(&self, term: &str) -> Result<Recipients> {
        let response = self.api.search(term).await?;
        self.api.parse(&response)
    }

    pub async fn autocomplete(&self, term: &str) -> Result<Autocomplete> {
        let response = self.api.autocomplete(term).await?;
        self.api.parse(&response)
    }

    pub async fn get_document_events(
        &self,
        organisation: Option<(&str, Option<&str>)>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        offset: u32,
        max_results: u32,
    ) -> Result<DocumentEvents> {
        self.inbox
            .get_document_events(organisation, from, to, offset, max_results)
            .await
    }

    pub async fn get_document_status(&self, status_link: &Link) -> Result<DocumentStatus> {
        self.inbox.get_document_status(status_link).await
    }

    /// Information about a sender account, by id
    pub async fn get_sender_information(&self, sender_id: i64) -> Result<SenderInformation> {
        self.inbox.get_sender_information(sender_id).await
    }

    /// Information about a sender account, by organisation number and
    /// optional part id
    pub async fn get_sender_information_by_organisation(
        &self,
        organisation_number: &str,
        part_id: Option<&str>,
    ) -> Result<SenderInformation> {
        self.inbox
            .get_sender_information_by_organisation(organisation_number, part_id)
            .await
    }

    /// Raw content bytes from a path below the API root
    pub async fn get_content(&self, path: &str) -> Result<Vec<u8>> {
        let response = self.api.get_content(path).await?;
        check_response(&response)?;
        Ok(response.body)
    }

    pub async fn get_inbox(&self, offset: u32, limit: u32) -> Result<Inbox> {
        self.inbox.get_inbox(offset, limit).await
    }

    pub async fn get_inbox_letter_content(&self, letter: &InboxDocument) -> Result<Vec<u8>> {
        self.inbox.get_letter_content(letter).await
    }

    pub async fn delete_inbox_letter(&self, letter: &InboxDocument) -> Result<()> {
        self.inbox.delete_letter(letter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::RsaKeySigner;

    #[test]
    fn noop_logger_is_a_zero_sized_constant() {
        NOOP_EVENT_LOGGER.log("dropped");
        assert_eq!(std::mem::size_of::<NoopEventLogger>(), 0);
    }

    #[test]
    fn client_construction_validates_the_config() {
        let mut rng = rand::thread_rng();
        let private_key = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let signer: Arc<dyn Signer> = Arc::new(RsaKeySigner::new(private_key));

        let config = ClientConfig::new("https://api.digipost.no", 497013).unwrap();
        assert!(DigipostClient::new(config, signer).is_ok());
    }
}

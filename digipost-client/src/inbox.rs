//! Read-side queries: inbox, document events, document status, sender
//! information
//!
//! Thin parameter-validated GETs over the same transport. No retries, no
//! caching; `delete_letter` follows the letter's delete relation.

use crate::api::{check_response, ApiService};
use crate::error::{Error, Result};
use crate::representations::{deserialize_links, Link, Linked, Relation};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

/// A letter in the authenticated sender's inbox
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InboxDocument {
    pub id: i64,
    #[serde(default)]
    pub subject: Option<String>,
    pub sender: String,
    pub delivery_time: DateTime<Utc>,
    #[serde(default)]
    pub first_accessed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(rename = "link", default, deserialize_with = "deserialize_links")]
    links: Vec<Link>,
}

impl Linked for InboxDocument {
    fn links(&self) -> &[Link] {
        &self.links
    }
}

impl InboxDocument {
    pub fn content_link(&self) -> Option<&Link> {
        self.link(Relation::LetterContent)
    }

    pub fn delete_link(&self) -> Option<&Link> {
        self.link(Relation::DeleteLetter)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Inbox {
    #[serde(rename = "document", default)]
    pub documents: Vec<InboxDocument>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentEventType {
    Opened,
    OpeningReceipt,
    EmailNotificationFailed,
    SmsNotificationFailed,
    PrintFailed,
    #[serde(other)]
    Unknown,
}

/// An event recorded for one of the sender's documents
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentEvent {
    pub document: Uuid,
    #[serde(rename = "type")]
    pub event_type: DocumentEventType,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentEvents {
    #[serde(rename = "event", default)]
    pub events: Vec<DocumentEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentDeliveryStatus {
    NotDelivered,
    Delivered,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DocumentStatus {
    pub uuid: Uuid,
    pub status: DocumentDeliveryStatus,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_read: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SenderStatus {
    ValidSender,
    NoInfoAvailable,
}

/// What the service knows about a sender account.
///
/// A missing account and an inaccessible account are indistinguishable.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SenderInformation {
    #[serde(default)]
    pub sender_id: Option<i64>,
    pub status: SenderStatus,
    #[serde(rename = "supported-feature", default)]
    pub supported_features: Vec<String>,
}

/// Read-side operations over the shared transport
pub struct InboxCommunicator {
    api: Arc<ApiService>,
}

impl InboxCommunicator {
    pub fn new(api: Arc<ApiService>) -> Self {
        Self { api }
    }

    pub async fn get_inbox(&self, offset: u32, limit: u32) -> Result<Inbox> {
        if limit == 0 {
            return Err(Error::ProblemWithRequest("inbox limit must be > 0".to_string()));
        }
        let response = self.api.get_inbox(offset, limit).await?;
        self.api.parse(&response)
    }

    /// Raw bytes of a letter's content
    pub async fn get_letter_content(&self, letter: &InboxDocument) -> Result<Vec<u8>> {
        let content_link = letter
            .content_link()
            .ok_or_else(|| Error::ProblemWithRequest(format!("letter {} has no content link", letter.id)))?;
        let response = self.api.get_inbox_letter_content(content_link).await?;
        check_response(&response)?;
        Ok(response.body)
    }

    pub async fn delete_letter(&self, letter: &InboxDocument) -> Result<()> {
        let delete_link = letter
            .delete_link()
            .ok_or_else(|| Error::ProblemWithRequest(format!("letter {} has no delete link", letter.id)))?;
        let response = self.api.delete_inbox_letter(delete_link).await?;
        check_response(&response)
    }

    pub async fn get_document_events(
        &self,
        organisation: Option<(&str, Option<&str>)>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        offset: u32,
        max_results: u32,
    ) -> Result<DocumentEvents> {
        if from > to {
            return Err(Error::ProblemWithRequest(
                "document events window start must not be after its end".to_string(),
            ));
        }
        if max_results == 0 {
            return Err(Error::ProblemWithRequest("maxResults must be > 0".to_string()));
        }
        let response = self
            .api
            .get_document_events(organisation, from, to, offset, max_results)
            .await?;
        self.api.parse(&response)
    }

    pub async fn get_document_status(&self, status_link: &Link) -> Result<DocumentStatus> {
        let response = self.api.get_document_status(status_link).await?;
        self.api.parse(&response)
    }

    pub async fn get_sender_information(&self, sender_id: i64) -> Result<SenderInformation> {
        let response = self.api.get_sender_information_by_id(sender_id).await?;
        self.api.parse(&response)
    }

    pub async fn get_sender_information_by_organisation(
        &self,
        organisation_number: &str,
        part_id: Option<&str>,
    ) -> Result<SenderInformation> {
        if organisation_number.trim().is_empty() {
            return Err(Error::ProblemWithRequest("organisation number is required".to_string()));
        }
        let response = self
            .api
            .get_sender_information_by_organisation(organisation_number, part_id)
            .await?;
        self.api.parse(&response)
    }
}

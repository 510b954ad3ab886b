// SPDX-License-Identifier: Apache-2.0
//
// Digipost API client for Rust
//
// https://github.com/digipost/digipost-client-rs

//! Wire model for the Digipost REST API
//!
//! Messages and documents are owned by the caller up to submission. From the
//! server response onward the returned [`MessageDelivery`] owns the state,
//! including the relation links used to drive the rest of the delivery.
//! All bodies use the service's versioned media type, JSON rendition, with
//! kebab-case member names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use url::Url;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Closed set of relation names used by the client.
///
/// Unknown relations received from the server are dropped at parse time,
/// never treated as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    SelfLink,
    CreateMessage,
    AddContent,
    Send,
    GetEncryptionKey,
    GetEncryptionKeyForPrint,
    Identify,
    IdentifyAndGetEncryptionKey,
    Search,
    Autocomplete,
    DocumentEvents,
    SenderInformation,
    Inbox,
    LetterContent,
    DeleteLetter,
    Certificate,
}

impl Relation {
    /// Wire name of the relation (last path segment of the rel URI)
    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::SelfLink => "self",
            Relation::CreateMessage => "create-message",
            Relation::AddContent => "add-content",
            Relation::Send => "send",
            Relation::GetEncryptionKey => "get-encryption-key",
            Relation::GetEncryptionKeyForPrint => "get-encryption-key-for-print",
            Relation::Identify => "identify",
            Relation::IdentifyAndGetEncryptionKey => "identify-and-get-encryption-key",
            Relation::Search => "search",
            Relation::Autocomplete => "autocomplete",
            Relation::DocumentEvents => "document-events",
            Relation::SenderInformation => "sender-information",
            Relation::Inbox => "inbox",
            Relation::LetterContent => "letter-content",
            Relation::DeleteLetter => "delete-letter",
            Relation::Certificate => "certificate",
        }
    }

    /// Parse a relation from a rel value.
    ///
    /// The server publishes rel either as a bare name or as a URI whose last
    /// segment is the name. Returns `None` for relations outside the closed
    /// set.
    pub fn parse(rel: &str) -> Option<Self> {
        let name = rel.rsplit('/').next().unwrap_or(rel);
        match name.to_lowercase().as_str() {
            "self" => Some(Relation::SelfLink),
            "create-message" => Some(Relation::CreateMessage),
            "add-content" => Some(Relation::AddContent),
            "send" => Some(Relation::Send),
            "get-encryption-key" => Some(Relation::GetEncryptionKey),
            "get-encryption-key-for-print" => Some(Relation::GetEncryptionKeyForPrint),
            "identify" => Some(Relation::Identify),
            "identify-and-get-encryption-key" => Some(Relation::IdentifyAndGetEncryptionKey),
            "search" => Some(Relation::Search),
            "autocomplete" => Some(Relation::Autocomplete),
            "document-events" => Some(Relation::DocumentEvents),
            "sender-information" => Some(Relation::SenderInformation),
            "inbox" => Some(Relation::Inbox),
            "letter-content" => Some(Relation::LetterContent),
            "delete-letter" => Some(Relation::DeleteLetter),
            "certificate" => Some(Relation::Certificate),
            _ => None,
        }
    }
}

/// A named hyperlink on a server resource
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    pub rel: Relation,
    pub uri: Url,
    pub media_type: Option<String>,
}

impl Link {
    pub fn new(rel: Relation, uri: Url) -> Self {
        Self {
            rel,
            uri,
            media_type: None,
        }
    }
}

impl Serialize for Link {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("link", 3)?;
        s.serialize_field("rel", self.rel.as_str())?;
        s.serialize_field("uri", self.uri.as_str())?;
        s.serialize_field("media-type", &self.media_type)?;
        s.end()
    }
}

#[derive(Deserialize)]
struct RawLink {
    rel: String,
    uri: String,
    #[serde(rename = "media-type", default)]
    media_type: Option<String>,
}

/// Deserialize a link list, silently dropping unknown relations and
/// unparseable URIs.
pub(crate) fn deserialize_links<'de, D>(deserializer: D) -> std::result::Result<Vec<Link>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Vec<RawLink> = Vec::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|r| {
            let rel = Relation::parse(&r.rel)?;
            let uri = Url::parse(&r.uri).ok()?;
            Some(Link {
                rel,
                uri,
                media_type: r.media_type,
            })
        })
        .collect())
}

/// Shared link lookup over server representations.
///
/// Resolving a relation name yields at most one link.
pub trait Linked {
    fn links(&self) -> &[Link];

    fn link(&self, rel: Relation) -> Option<&Link> {
        self.links().iter().find(|l| l.rel == rel)
    }

    /// Resolve a relation that must be present
    fn required_link(&self, rel: Relation) -> Result<&Link> {
        self.link(rel)
            .ok_or_else(|| Error::ProblemWithRequest(format!("missing required link '{}'", rel.as_str())))
    }
}

/// Root document from `GET /`, mapping relation names to URIs.
///
/// Cached per [`crate::api::ApiService`] instance after the first successful
/// fetch; never invalidated for the lifetime of the instance.
#[derive(Debug, Clone, Deserialize)]
pub struct EntryPoint {
    #[serde(rename = "link", default, deserialize_with = "deserialize_links")]
    links: Vec<Link>,
}

impl Linked for EntryPoint {
    fn links(&self) -> &[Link] {
        &self.links
    }
}

impl EntryPoint {
    pub fn create_message_uri(&self) -> Result<Url> {
        Ok(self.required_link(Relation::CreateMessage)?.uri.clone())
    }

    pub fn print_encryption_key_uri(&self) -> Result<Url> {
        Ok(self.required_link(Relation::GetEncryptionKeyForPrint)?.uri.clone())
    }

    pub fn certificate_uri(&self) -> Result<Url> {
        Ok(self.required_link(Relation::Certificate)?.uri.clone())
    }
}

/// File type token of a document ("pdf", "html", ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileType(String);

impl FileType {
    pub fn new(token: impl AsRef<str>) -> Self {
        Self(token.as_ref().trim().to_lowercase())
    }

    pub fn pdf() -> Self {
        Self("pdf".to_string())
    }

    pub fn html() -> Self {
        Self("html".to_string())
    }

    pub fn is_pdf(&self) -> bool {
        self.0 == "pdf"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FileType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Minimum authentication level required to open a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthenticationLevel {
    Password,
    TwoFactor,
}

/// Sensitivity of a document's metadata before authentication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SensitivityLevel {
    Normal,
    Sensitive,
}

/// SMS notification schedule for a document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SmsNotification {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after_hours: Vec<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub at: Vec<ListedTime>,
}

/// Email notification for a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EmailNotification {
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// A point in time in a notification schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListedTime {
    pub time: DateTime<Utc>,
}

/// A document within a message.
///
/// Constructed by the caller. The file type may be rewritten to "pdf" during
/// print-fallback preparation; once embedded in a [`MessageDelivery`]
/// returned from the server the document is considered immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Document {
    pub uuid: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub file_type: FileType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opened: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opening_receipt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sms_notification: Option<SmsNotification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_notification: Option<EmailNotification>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication_level: Option<AuthenticationLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensitivity_level: Option<SensitivityLevel>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pre_encrypt: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_type: Option<String>,
    #[serde(rename = "link", default, skip_serializing_if = "Vec::is_empty", deserialize_with = "deserialize_links")]
    pub(crate) links: Vec<Link>,
}

impl Linked for Document {
    fn links(&self) -> &[Link] {
        &self.links
    }
}

impl Document {
    /// Create a PDF document with a fresh uuid
    pub fn new(subject: impl Into<String>) -> Self {
        Self::with_uuid(Uuid::new_v4(), Some(subject.into()), FileType::pdf())
    }

    /// Create a document with the given uuid, subject and file type.
    ///
    /// The uuid type guarantees the canonical lower-case format on the wire.
    pub fn with_uuid(uuid: Uuid, subject: Option<String>, file_type: FileType) -> Self {
        Self {
            uuid,
            subject,
            file_type,
            opened: None,
            opening_receipt: None,
            sms_notification: None,
            email_notification: None,
            authentication_level: None,
            sensitivity_level: None,
            pre_encrypt: false,
            technical_type: None,
            links: Vec::new(),
        }
    }

    /// Create a technical attachment: no subject, machine-readable types
    pub fn technical_attachment(file_type: FileType, types: &[&str]) -> Self {
        let mut doc = Self::with_uuid(Uuid::new_v4(), None, file_type);
        doc.technical_type = join_technical_types(types);
        doc
    }

    pub fn file_type(mut self, file_type: FileType) -> Self {
        self.file_type = file_type;
        self
    }

    /// Request client-side envelope encryption before upload
    pub fn pre_encrypt(mut self) -> Self {
        self.pre_encrypt = true;
        self
    }

    pub fn opening_receipt(mut self, receipt: impl Into<String>) -> Self {
        self.opening_receipt = Some(receipt.into());
        self
    }

    pub fn opened(mut self) -> Self {
        self.opened = Some(true);
        self
    }

    pub fn authentication_level(mut self, level: AuthenticationLevel) -> Self {
        self.authentication_level = Some(level);
        self
    }

    pub fn sensitivity_level(mut self, level: SensitivityLevel) -> Self {
        self.sensitivity_level = Some(level);
        self
    }

    pub fn sms_notification(mut self, notification: SmsNotification) -> Self {
        self.sms_notification = Some(notification);
        self
    }

    pub fn email_notification(mut self, notification: EmailNotification) -> Self {
        self.email_notification = Some(notification);
        self
    }

    pub fn technical_types(mut self, types: &[&str]) -> Self {
        self.technical_type = join_technical_types(types);
        self
    }

    /// Copy of this document with the file type rewritten to "pdf".
    ///
    /// Used when a delivery falls back to print and the caller-supplied
    /// print copy is uploaded instead of the original.
    pub fn with_pdf_file_type(&self) -> Self {
        let mut copy = self.clone();
        copy.file_type = FileType::pdf();
        copy
    }

    pub fn add_content_link(&self) -> Option<&Link> {
        self.link(Relation::AddContent)
    }

    pub fn encryption_key_link(&self) -> Option<&Link> {
        self.link(Relation::GetEncryptionKey)
    }

    /// Check caller-supplied invariants
    pub fn validate(&self) -> Result<()> {
        if self.opening_receipt.is_some() && self.opened == Some(true) {
            return Err(Error::ProblemWithRequest(format!(
                "document {}: both opening-receipt and opened are set",
                self.uuid
            )));
        }
        Ok(())
    }
}

fn join_technical_types(types: &[&str]) -> Option<String> {
    let cleaned: BTreeSet<&str> = types
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.into_iter().collect::<Vec<_>>().join(","))
    }
}

/// Physical mail service level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostType {
    A,
    B,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrintColors {
    Monochrome,
    Colors,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NondeliverableHandling {
    ReturnToSender,
    Shred,
}

/// Postal address of a print recipient or return address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PrintRecipient {
    pub name: String,
    pub address_line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    pub zip_code: String,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

/// Details required to produce a postal copy of a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PrintDetails {
    pub recipient: PrintRecipient,
    pub return_address: PrintRecipient,
    pub post_type: PostType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<PrintColors>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nondeliverable_handling: Option<NondeliverableHandling>,
}

impl PrintDetails {
    pub fn new(recipient: PrintRecipient, return_address: PrintRecipient, post_type: PostType) -> Self {
        Self {
            recipient,
            return_address,
            post_type,
            color: None,
            nondeliverable_handling: None,
        }
    }
}

/// Addressing of a message.
///
/// A recipient with only print details makes the message print-only; one
/// with both a digital identifier and print details gets print as fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct MessageRecipient {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digipost_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personal_identification_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub print_details: Option<PrintDetails>,
}

impl MessageRecipient {
    pub fn digipost_address(address: impl Into<String>) -> Self {
        Self {
            digipost_address: Some(address.into()),
            ..Self::default()
        }
    }

    pub fn national_identity_number(number: impl Into<String>) -> Self {
        Self {
            personal_identification_number: Some(number.into()),
            ..Self::default()
        }
    }

    pub fn print_only(details: PrintDetails) -> Self {
        Self {
            print_details: Some(details),
            ..Self::default()
        }
    }

    pub fn with_print_fallback(mut self, details: PrintDetails) -> Self {
        self.print_details = Some(details);
        self
    }

    pub fn has_digital_identifier(&self) -> bool {
        self.digipost_address.is_some() || self.personal_identification_number.is_some()
    }

    pub fn has_print_details(&self) -> bool {
        self.print_details.is_some()
    }

    /// True when the message can only go to print
    pub fn is_direct_print(&self) -> bool {
        !self.has_digital_identifier() && self.has_print_details()
    }

    pub fn to_identification(&self) -> Result<Identification> {
        if !self.has_digital_identifier() {
            return Err(Error::ProblemWithRequest(
                "recipient has no digital identifier to identify by".to_string(),
            ));
        }
        Ok(Identification {
            digipost_address: self.digipost_address.clone(),
            personal_identification_number: self.personal_identification_number.clone(),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if !self.has_digital_identifier() && !self.has_print_details() {
            return Err(Error::ProblemWithRequest(
                "recipient needs a digital identifier, print details, or both".to_string(),
            ));
        }
        Ok(())
    }
}

/// Organisation a message is sent on behalf of
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SenderOrganization {
    pub organization_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub part_id: Option<String>,
}

/// A logical submission, identified by the caller-chosen message id.
///
/// The message id is the sole idempotency key: the server deduplicates
/// submissions on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Message {
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_organization: Option<SenderOrganization>,
    pub recipient: MessageRecipient,
    pub primary_document: Document,
    #[serde(rename = "attachment", default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Document>,
    /// Earliest delivery time, if deferred
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_time: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(message_id: impl Into<String>, recipient: MessageRecipient, primary_document: Document) -> Self {
        Self {
            message_id: message_id.into(),
            sender_id: None,
            sender_organization: None,
            recipient,
            primary_document,
            attachments: Vec::new(),
            delivery_time: None,
        }
    }

    pub fn attachments(mut self, attachments: Vec<Document>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn delivery_time(mut self, time: DateTime<Utc>) -> Self {
        self.delivery_time = Some(time);
        self
    }

    pub fn sender_id(mut self, id: i64) -> Self {
        self.sender_id = Some(id);
        self
    }

    pub fn sender_organization(mut self, organization: SenderOrganization) -> Self {
        self.sender_organization = Some(organization);
        self
    }

    pub fn is_direct_print(&self) -> bool {
        self.recipient.is_direct_print()
    }

    pub fn all_documents(&self) -> impl Iterator<Item = &Document> {
        std::iter::once(&self.primary_document).chain(self.attachments.iter())
    }

    pub fn has_any_document_requiring_pre_encryption(&self) -> bool {
        self.all_documents().any(|d| d.pre_encrypt)
    }

    pub fn document_by_uuid(&self, uuid: Uuid) -> Option<&Document> {
        self.all_documents().find(|d| d.uuid == uuid)
    }

    pub fn validate(&self) -> Result<()> {
        if self.message_id.trim().is_empty() {
            return Err(Error::ProblemWithRequest("message-id must not be empty".to_string()));
        }
        self.recipient.validate()?;
        let mut seen = BTreeSet::new();
        for document in self.all_documents() {
            document.validate()?;
            if !seen.insert(document.uuid) {
                return Err(Error::ProblemWithRequest(format!(
                    "duplicate document uuid {} in message",
                    document.uuid
                )));
            }
        }
        Ok(())
    }
}

/// Channel a delivery resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryMethod {
    Digipost,
    Print,
}

/// Server-side lifecycle state of a delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    NotComplete,
    Complete,
    Delivered,
    DeliveredToPrint,
}

/// Server-returned envelope for a created or fetched message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MessageDelivery {
    pub message_id: String,
    pub delivery_method: DeliveryMethod,
    pub status: MessageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_document: Option<Document>,
    #[serde(rename = "attachment", default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Document>,
    #[serde(rename = "link", default, skip_serializing_if = "Vec::is_empty", deserialize_with = "deserialize_links")]
    pub(crate) links: Vec<Link>,
}

impl Linked for MessageDelivery {
    fn links(&self) -> &[Link] {
        &self.links
    }
}

impl MessageDelivery {
    pub fn send_link(&self) -> Option<&Link> {
        self.link(Relation::Send)
    }

    pub fn self_link(&self) -> Option<&Link> {
        self.link(Relation::SelfLink)
    }

    pub fn will_be_delivered_in_digipost(&self) -> bool {
        self.delivery_method == DeliveryMethod::Digipost
    }

    /// Delivered to the digital channel: channel is DIGIPOST and a delivered
    /// date is present.
    pub fn is_already_delivered_to_digipost(&self) -> bool {
        self.delivery_method == DeliveryMethod::Digipost && self.delivered_date.is_some()
    }

    pub fn all_documents(&self) -> impl Iterator<Item = &Document> {
        self.primary_document.iter().chain(self.attachments.iter())
    }

    pub fn document_by_uuid(&self, uuid: Uuid) -> Option<&Document> {
        self.all_documents().find(|d| d.uuid == uuid)
    }

    /// Strict structural comparison against the message the caller tried to
    /// create. Returns the list of differences; empty means same message.
    ///
    /// Server-owned fields (status, links, delivered date) are excluded, and
    /// file types are only compared for digital deliveries since print
    /// fallback rewrites them to "pdf".
    pub fn differences_from(&self, message: &Message) -> Vec<String> {
        let mut differences = Vec::new();
        if self.message_id != message.message_id {
            differences.push(format!(
                "message-id: existing '{}' vs submitted '{}'",
                self.message_id, message.message_id
            ));
        }
        let compare_file_types = self.delivery_method == DeliveryMethod::Digipost;
        let existing: Vec<&Document> = self.all_documents().collect();
        let submitted: Vec<&Document> = message.all_documents().collect();
        if existing.len() != submitted.len() {
            differences.push(format!(
                "document count: existing {} vs submitted {}",
                existing.len(),
                submitted.len()
            ));
            return differences;
        }
        for (theirs, ours) in existing.iter().zip(submitted.iter()) {
            if theirs.uuid != ours.uuid {
                differences.push(format!("document uuid: existing {} vs submitted {}", theirs.uuid, ours.uuid));
            }
            if theirs.subject != ours.subject {
                differences.push(format!("document {} subject differs", ours.uuid));
            }
            if compare_file_types && theirs.file_type != ours.file_type {
                differences.push(format!("document {} file-type differs", ours.uuid));
            }
        }
        differences
    }
}

/// Opaque PEM-encoded public key material issued by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EncryptionKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    pub value: String,
}

/// Request body for recipient identification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Identification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digipost_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personal_identification_number: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentificationResultCode {
    Digipost,
    Identified,
    Unidentified,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IdentificationResult {
    pub result: IdentificationResultCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digipost_address: Option<String>,
}

/// Identification response that additionally carries the recipient's
/// encryption key when the recipient is a Digipost user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IdentificationResultWithEncryptionKey {
    pub result: IdentificationResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<EncryptionKey>,
}

/// Error body the server returns alongside non-2xx statuses
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ErrorMessage {
    #[serde(default)]
    pub error_code: Option<String>,
    pub error_message: String,
}

/// A match from recipient search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RecipientMatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firstname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lastname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digipost_address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Recipients {
    #[serde(rename = "recipient", default)]
    pub recipients: Vec<RecipientMatch>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Suggestion {
    pub search_string: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Autocomplete {
    #[serde(rename = "suggestion", default)]
    pub suggestions: Vec<Suggestion>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn print_details() -> PrintDetails {
        let address = PrintRecipient {
            name: "Ola Nordmann".to_string(),
            address_line1: "Storgata 1".to_string(),
            address_line2: None,
            zip_code: "0155".to_string(),
            city: "Oslo".to_string(),
            country: None,
        };
        PrintDetails::new(address.clone(), address, PostType::B)
    }

    #[test]
    fn relation_parses_bare_names_and_uris() {
        assert_eq!(Relation::parse("add-content"), Some(Relation::AddContent));
        assert_eq!(
            Relation::parse("https://api.digipost.no/relations/add-content"),
            Some(Relation::AddContent)
        );
        assert_eq!(Relation::parse("https://api.digipost.no/relations/new-hotness"), None);
    }

    #[test]
    fn unknown_relations_are_dropped_on_parse() {
        let json = r#"{
            "message-id": "m1",
            "delivery-method": "DIGIPOST",
            "status": "NOT_COMPLETE",
            "link": [
                {"rel": "https://api.digipost.no/relations/send", "uri": "https://api.digipost.no/m1/send"},
                {"rel": "https://api.digipost.no/relations/experimental", "uri": "https://api.digipost.no/x"}
            ]
        }"#;
        let delivery: MessageDelivery = serde_json::from_str(json).unwrap();
        assert_eq!(delivery.links().len(), 1);
        assert!(delivery.send_link().is_some());
    }

    #[test]
    fn resolving_a_relation_yields_at_most_one_link() {
        let json = r#"{
            "message-id": "m1",
            "delivery-method": "DIGIPOST",
            "status": "NOT_COMPLETE",
            "link": [
                {"rel": "send", "uri": "https://api.digipost.no/m1/send-a"},
                {"rel": "send", "uri": "https://api.digipost.no/m1/send-b"}
            ]
        }"#;
        let delivery: MessageDelivery = serde_json::from_str(json).unwrap();
        assert_eq!(
            delivery.send_link().unwrap().uri.as_str(),
            "https://api.digipost.no/m1/send-a"
        );
    }

    #[test]
    fn document_rejects_opening_receipt_together_with_opened() {
        let doc = Document::new("Subject").opening_receipt("receipt").opened();
        assert!(doc.validate().is_err());
        let doc = Document::new("Subject").opening_receipt("receipt");
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn technical_types_are_cleaned_and_joined() {
        let doc = Document::technical_attachment(FileType::new("xml"), &[" b ", "", "a", "b"]);
        assert_eq!(doc.technical_type.as_deref(), Some("a,b"));
        assert!(doc.subject.is_none());
    }

    #[test]
    fn file_type_is_canonicalized() {
        assert_eq!(FileType::new(" PDF ").as_str(), "pdf");
        assert!(FileType::new("Pdf").is_pdf());
    }

    #[test]
    fn recipient_classification() {
        let direct_print = MessageRecipient::print_only(print_details());
        assert!(direct_print.is_direct_print());
        assert!(direct_print.to_identification().is_err());

        let fallback = MessageRecipient::digipost_address("ola#1234").with_print_fallback(print_details());
        assert!(!fallback.is_direct_print());
        assert!(fallback.has_print_details());

        assert!(MessageRecipient::default().validate().is_err());
    }

    #[test]
    fn message_rejects_duplicate_document_uuids() {
        let doc = Document::new("Subject");
        let message = Message::new("m1", MessageRecipient::digipost_address("ola#1234"), doc.clone())
            .attachments(vec![doc]);
        assert!(message.validate().is_err());
    }

    #[test]
    fn delivered_predicate_requires_digipost_and_date() {
        let json = r#"{
            "message-id": "m1",
            "delivery-method": "DIGIPOST",
            "status": "DELIVERED",
            "delivered-date": "2026-05-04T12:00:00Z"
        }"#;
        let delivery: MessageDelivery = serde_json::from_str(json).unwrap();
        assert!(delivery.is_already_delivered_to_digipost());

        let json_print = json.replace("DIGIPOST", "PRINT");
        let delivery: MessageDelivery = serde_json::from_str(&json_print).unwrap();
        assert!(!delivery.is_already_delivered_to_digipost());
    }

    #[test]
    fn structural_comparison_flags_differences() {
        let doc = Document::new("Subject");
        let message = Message::new("m1", MessageRecipient::digipost_address("ola#1234"), doc.clone());
        let delivery: MessageDelivery = serde_json::from_value(serde_json::json!({
            "message-id": "m1",
            "delivery-method": "DIGIPOST",
            "status": "NOT_COMPLETE",
            "primary-document": serde_json::to_value(&doc).unwrap(),
        }))
        .unwrap();
        assert!(delivery.differences_from(&message).is_empty());

        let other = Message::new("m1", MessageRecipient::digipost_address("ola#1234"), Document::new("Other"));
        assert!(!delivery.differences_from(&other).is_empty());
    }

    #[test]
    fn print_fallback_file_type_is_not_compared() {
        let doc = Document::new("Subject").file_type(FileType::html());
        let message = Message::new("m1", MessageRecipient::digipost_address("ola#1234"), doc.clone());
        let delivery: MessageDelivery = serde_json::from_value(serde_json::json!({
            "message-id": "m1",
            "delivery-method": "PRINT",
            "status": "NOT_COMPLETE",
            "primary-document": serde_json::to_value(&doc.with_pdf_file_type()).unwrap(),
        }))
        .unwrap();
        assert!(delivery.differences_from(&message).is_empty());
    }

    #[test]
    fn message_serializes_with_kebab_case_members() {
        let message = Message::new(
            "m1",
            MessageRecipient::digipost_address("ola#1234"),
            Document::new("Subject"),
        );
        let value = serde_json::to_value(&message).unwrap();
        assert!(value.get("message-id").is_some());
        assert!(value.get("primary-document").is_some());
        assert!(value["primary-document"].get("file-type").is_some());
    }
}

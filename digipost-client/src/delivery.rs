//! Stepwise and atomic delivery builders
//!
//! A stepwise delivery walks Started → WithContent → Sendable → Sent against
//! the server, one request per step. An atomic delivery accumulates content
//! locally and performs a single multipart POST on send. Which flavour
//! `create_message` exposes is fixed at construction.

use crate::config::DeliveryFlavour;
use crate::error::{Error, Result};
use crate::representations::{Document, Message, MessageDelivery};
use crate::sender::MessageSender;
use std::sync::Arc;
use uuid::Uuid;

/// Stepwise builder state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuilderState {
    /// Server resource exists, no content uploaded yet
    Started,
    /// Some content uploaded, the delivery is not yet sendable
    WithContent,
    /// The delivery carries a SEND link
    Sendable,
    /// Terminal
    Sent,
}

/// Multi-request delivery: create, upload per document, send
pub struct StepwiseDelivery {
    sender: Arc<MessageSender>,
    delivery: MessageDelivery,
    state: BuilderState,
}

impl StepwiseDelivery {
    pub(crate) async fn start(sender: Arc<MessageSender>, message: Message) -> Result<Self> {
        let delivery = sender.create_or_fetch_message(&message).await?;
        let state = if delivery.send_link().is_some() {
            BuilderState::Sendable
        } else {
            BuilderState::Started
        };
        Ok(Self {
            sender,
            delivery,
            state,
        })
    }

    /// Upload content for one document. `print_content` is the PDF print
    /// copy, required when the delivery resolved to print.
    pub async fn add_content(
        &mut self,
        document: &Document,
        content: Vec<u8>,
        print_content: Option<Vec<u8>>,
    ) -> Result<&mut Self> {
        if self.state == BuilderState::Sent {
            return Err(Error::InvalidTransaction(
                "content cannot be added to a sent delivery".to_string(),
            ));
        }
        self.delivery = self
            .sender
            .add_content(&self.delivery, document, content, print_content)
            .await?;
        self.state = if self.delivery.send_link().is_some() {
            BuilderState::Sendable
        } else {
            BuilderState::WithContent
        };
        Ok(self)
    }

    /// Finalize the delivery. Only legal once the delivery is sendable.
    pub async fn send(mut self) -> Result<MessageDelivery> {
        if self.state != BuilderState::Sendable {
            return Err(Error::InvalidTransaction(format!(
                "delivery '{}' is not sendable yet",
                self.delivery.message_id
            )));
        }
        let delivered = self.sender.send_message(&self.delivery).await?;
        self.state = BuilderState::Sent;
        Ok(delivered)
    }

    /// The server's current view of the delivery
    pub fn delivery(&self) -> &MessageDelivery {
        &self.delivery
    }
}

/// Single-request delivery: content is collected locally, `send` performs
/// one multipart POST
pub struct AtomicDelivery {
    sender: Arc<MessageSender>,
    message: Message,
    contents: Vec<(Uuid, Vec<u8>)>,
}

impl AtomicDelivery {
    pub(crate) fn new(sender: Arc<MessageSender>, message: Message) -> Self {
        Self {
            sender,
            message,
            contents: Vec::new(),
        }
    }

    /// Stage content for one of the message's documents. For direct-print
    /// messages the print copy takes precedence when supplied.
    pub fn add_content(
        &mut self,
        document: &Document,
        content: Vec<u8>,
        print_content: Option<Vec<u8>>,
    ) -> Result<&mut Self> {
        if self.message.document_by_uuid(document.uuid).is_none() {
            return Err(Error::ProblemWithRequest(format!(
                "document {} is not part of message '{}'",
                document.uuid, self.message.message_id
            )));
        }
        if self.contents.iter().any(|(uuid, _)| *uuid == document.uuid) {
            return Err(Error::InvalidTransaction(format!(
                "content for document {} was already added",
                document.uuid
            )));
        }
        let bytes = match print_content {
            Some(print_bytes) if self.message.is_direct_print() => print_bytes,
            _ => content,
        };
        self.contents.push((document.uuid, bytes));
        Ok(self)
    }

    /// Perform the single multipart POST
    pub async fn send(self) -> Result<MessageDelivery> {
        if self.contents.is_empty() {
            return Err(Error::InvalidTransaction(format!(
                "message '{}' has no content to send",
                self.message.message_id
            )));
        }
        self.sender.send_multipart_message(&self.message, &self.contents).await
    }

    pub fn message(&self) -> &Message {
        &self.message
    }
}

/// An in-flight delivery of either flavour
pub enum OngoingDelivery {
    Stepwise(StepwiseDelivery),
    Atomic(AtomicDelivery),
}

impl OngoingDelivery {
    pub async fn add_content(
        &mut self,
        document: &Document,
        content: Vec<u8>,
        print_content: Option<Vec<u8>>,
    ) -> Result<&mut Self> {
        match self {
            OngoingDelivery::Stepwise(stepwise) => {
                stepwise.add_content(document, content, print_content).await?;
            }
            OngoingDelivery::Atomic(atomic) => {
                atomic.add_content(document, content, print_content)?;
            }
        }
        Ok(self)
    }

    pub async fn send(self) -> Result<MessageDelivery> {
        match self {
            OngoingDelivery::Stepwise(stepwise) => stepwise.send().await,
            OngoingDelivery::Atomic(atomic) => atomic.send().await,
        }
    }
}

/// Chooses which flavour `create_message` hands out
pub struct MessageDeliverer {
    flavour: DeliveryFlavour,
    sender: Arc<MessageSender>,
}

impl MessageDeliverer {
    pub fn new(flavour: DeliveryFlavour, sender: Arc<MessageSender>) -> Self {
        Self { flavour, sender }
    }

    /// Begin a delivery with optional print fallback, in the configured
    /// flavour. The stepwise flavour creates the server resource here.
    pub async fn create_message(&self, message: Message) -> Result<OngoingDelivery> {
        message.validate()?;
        match self.flavour {
            DeliveryFlavour::Stepwise => Ok(OngoingDelivery::Stepwise(
                StepwiseDelivery::start(self.sender.clone(), message).await?,
            )),
            DeliveryFlavour::Atomic => Ok(OngoingDelivery::Atomic(AtomicDelivery::new(
                self.sender.clone(),
                message,
            ))),
        }
    }

    /// Begin a print-only delivery; always atomic
    pub fn create_print_only_message(&self, message: Message) -> Result<AtomicDelivery> {
        message.validate()?;
        if !message.is_direct_print() {
            return Err(Error::ProblemWithRequest(
                "a print-only message requires a recipient with print details and no digital identifier"
                    .to_string(),
            ));
        }
        Ok(AtomicDelivery::new(self.sender.clone(), message))
    }
}

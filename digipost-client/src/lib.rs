// SPDX-License-Identifier: Apache-2.0
//
// Digipost API client for Rust
//
// https://github.com/digipost/digipost-client-rs

//! Digipost Client Library
//!
//! This crate implements a client for submitting letters (with optional
//! print fallback) to the Digipost REST API on behalf of an authenticated
//! sender. Outbound requests carry a SHA-256 body digest, an RFC 1123 date
//! and an RSA-SHA256 signature over a canonical request string; inbound
//! responses are verified against the same construction.
//!
//! # Architecture
//!
//! The library is organized into modules representing core concerns:
//! - `representations`: wire model (messages, documents, deliveries, links)
//! - `security`: request signing and response signature verification
//! - `filters`: ordered request/response header pipeline (digest, date, signature)
//! - `encrypt`: CMS envelope encryption under server-issued public keys
//! - `pdf`: structural PDF validation against configurable rule sets
//! - `api`: one HTTP method per server operation, entry-point resolution
//! - `sender`: the delivery orchestrator (create-or-fetch, add-content, send)
//! - `prepare`: per-document content preparation
//! - `delivery`: stepwise and atomic delivery builders
//! - `inbox`: read-side queries (inbox, document events, sender information)
//! - `client`: the public facade
//! - `config`: configuration management with validation
//! - `error`: unified error types
//!
//! # Sending a letter
//!
//! ```no_run
//! # async fn example() -> digipost_client::Result<()> {
//! use digipost_client::config::ClientConfig;
//! use digipost_client::client::DigipostClient;
//! use digipost_client::representations::{Document, Message, MessageRecipient};
//! use digipost_client::security::RsaKeySigner;
//! use std::sync::Arc;
//!
//! let config = ClientConfig::new("https://api.digipost.no", 497013)?;
//! let key_pem = std::fs::read_to_string("sender-key.pem")?;
//! let signer = Arc::new(RsaKeySigner::from_pem(&key_pem)?);
//! let client = DigipostClient::new(config, signer)?;
//!
//! let document = Document::new("A letter");
//! let message = Message::new(
//!     "client-chosen-idempotency-key",
//!     MessageRecipient::digipost_address("ola.nordmann#1234"),
//!     document.clone(),
//! );
//!
//! let mut delivery = client.create_message(message).await?;
//! delivery.add_content(&document, std::fs::read("letter.pdf")?, None).await?;
//! delivery.send().await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod delivery;
pub mod encrypt;
pub mod error;
pub mod filters;
pub mod inbox;
pub mod multipart;
pub mod pdf;
pub mod prepare;
pub mod representations;
pub mod security;
pub mod sender;

pub use client::DigipostClient;
pub use error::{Error, Result};

/// Library version, also reported in the User-Agent header
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Versioned media type for all request and response bodies
pub const DIGIPOST_MEDIA_TYPE: &str = "application/vnd.digipost-v8+json";

/// Fixed client identifier sent with every request
pub const USER_AGENT: &str = concat!("digipost-client-rs/", env!("CARGO_PKG_VERSION"));

/// Header carrying the numeric sender account id
pub const X_DIGIPOST_USER_ID: &str = "X-Digipost-UserId";

/// Header carrying the base64 SHA-256 digest of the body
pub const X_CONTENT_SHA256: &str = "X-Content-SHA256";

/// Header carrying the base64 RSA-SHA256 signature of the canonical string
pub const X_DIGIPOST_SIGNATURE: &str = "X-Digipost-Signature";

/// Optional header naming the resource a signed request addresses
pub const X_DIGIPOST_ID_URI: &str = "X-Digipost-Id-Uri";

/// Default print encryption key cache TTL in seconds
pub const DEFAULT_PRINT_KEY_TTL_SECS: u64 = 5 * 60;

/// Default accepted clock skew between server and client in seconds
pub const DEFAULT_SKEW_TOLERANCE_SECS: u64 = 10;

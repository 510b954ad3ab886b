//! Configuration management for the Digipost client

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Delivery flavour exposed by `create_message`
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryFlavour {
    /// Multi-request flow: create, upload content per document, send
    Stepwise,
    /// Single multipart POST carrying message and all contents
    Atomic,
}

impl Default for DeliveryFlavour {
    fn default() -> Self {
        Self::Stepwise
    }
}

/// Rule set bounds for client-side PDF validation.
///
/// The print rule set derived from these settings is strictly stricter than
/// the digital one.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PdfValidationSettings {
    /// PDF header versions accepted ("1.0" through "1.7" by default)
    #[serde(default = "default_allowed_pdf_versions")]
    pub allowed_pdf_versions: Vec<String>,

    /// Page cap applied when validating for print
    #[serde(default = "default_max_pages_for_print")]
    pub max_pages_for_print: u32,

    /// Optional page cap for digital delivery (unbounded by default)
    #[serde(default)]
    pub max_pages_digital: Option<u32>,

    /// Minimum left margin in millimetres, enforced for print
    #[serde(default = "default_min_margin_left_mm")]
    pub min_margin_left_mm: f64,

    /// Reject documents carrying an /Encrypt dictionary
    #[serde(default = "default_true")]
    pub reject_encrypted: bool,

    /// Accepted base font names; empty means all fonts pass
    #[serde(default)]
    pub font_whitelist: Vec<String>,
}

impl Default for PdfValidationSettings {
    fn default() -> Self {
        Self {
            allowed_pdf_versions: default_allowed_pdf_versions(),
            max_pages_for_print: default_max_pages_for_print(),
            max_pages_digital: None,
            min_margin_left_mm: default_min_margin_left_mm(),
            reject_encrypted: true,
            font_whitelist: Vec::new(),
        }
    }
}

/// Digipost client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Base URL of the Digipost API
    pub base_url: String,

    /// Numeric sender account id, sent with every request
    pub sender_account_id: i64,

    /// Which flavour `create_message` exposes
    #[serde(default)]
    pub delivery_flavour: DeliveryFlavour,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Accepted clock skew for response timestamps in seconds
    #[serde(default = "default_skew_tolerance_secs")]
    pub skew_tolerance_secs: u64,

    /// Print encryption key cache TTL in seconds
    #[serde(default = "default_print_key_ttl_secs")]
    pub print_key_cache_ttl_secs: u64,

    /// Disable the print key cache entirely (every read refetches)
    #[serde(default)]
    pub disable_print_key_cache: bool,

    /// Surface response verification failures as errors; when false they
    /// are logged as warnings and swallowed
    #[serde(default = "default_true")]
    pub fail_on_response_validation_error: bool,

    /// Client-side PDF validation bounds
    #[serde(default)]
    pub pdf_validation: PdfValidationSettings,
}

impl ClientConfig {
    /// Create a configuration with defaults for everything but the required
    /// fields, and validate it.
    pub fn new(base_url: impl Into<String>, sender_account_id: i64) -> Result<Self> {
        let config = Self {
            base_url: base_url.into(),
            sender_account_id,
            delivery_flavour: DeliveryFlavour::default(),
            timeout_ms: default_timeout_ms(),
            skew_tolerance_secs: default_skew_tolerance_secs(),
            print_key_cache_ttl_secs: default_print_key_ttl_secs(),
            disable_print_key_cache: false,
            fail_on_response_validation_error: true,
            pdf_validation: PdfValidationSettings::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `DIGIPOST_`-prefixed environment variables
    pub fn from_env() -> Result<Self> {
        let config: Self = envy::prefixed("DIGIPOST_")
            .from_env()
            .map_err(|e| Error::Config(format!("Failed to parse environment variables: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("Invalid base_url '{}': {}", self.base_url, e)))?;
        if url.cannot_be_a_base() {
            return Err(Error::Config(format!("base_url '{}' cannot be a base", self.base_url)));
        }

        if self.sender_account_id <= 0 {
            return Err(Error::Config("sender_account_id must be positive".to_string()));
        }

        if self.timeout_ms == 0 {
            return Err(Error::Config("timeout_ms must be > 0".to_string()));
        }

        if self.pdf_validation.allowed_pdf_versions.is_empty() {
            return Err(Error::Config(
                "pdf_validation.allowed_pdf_versions must not be empty".to_string(),
            ));
        }

        if self.pdf_validation.max_pages_for_print == 0 {
            return Err(Error::Config(
                "pdf_validation.max_pages_for_print must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.base_url).map_err(|e| Error::Config(format!("Invalid base_url: {}", e)))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn skew_tolerance(&self) -> Duration {
        Duration::from_secs(self.skew_tolerance_secs)
    }

    pub fn print_key_ttl(&self) -> Duration {
        Duration::from_secs(self.print_key_cache_ttl_secs)
    }
}

// Default value functions
fn default_timeout_ms() -> u64 {
    30_000
}

fn default_skew_tolerance_secs() -> u64 {
    crate::DEFAULT_SKEW_TOLERANCE_SECS
}

fn default_print_key_ttl_secs() -> u64 {
    crate::DEFAULT_PRINT_KEY_TTL_SECS
}

fn default_allowed_pdf_versions() -> Vec<String> {
    (0..=7).map(|minor| format!("1.{}", minor)).collect()
}

fn default_max_pages_for_print() -> u32 {
    12
}

fn default_min_margin_left_mm() -> f64 {
    15.0
}

fn default_true() -> bool {
    true
}

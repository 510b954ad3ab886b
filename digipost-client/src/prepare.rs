//! Per-document content preparation
//!
//! Routes each (document, content) pair through validation and optional
//! envelope encryption before upload. The client never transcodes: when
//! print-ready bytes are required the caller must supply PDF, anything else
//! is rejected rather than silently mislabelled.

use crate::config::PdfValidationSettings;
use crate::encrypt::ContentEncrypter;
use crate::error::{Error, Result};
use crate::pdf::{looks_like_pdf, PdfRules, PdfValidator};
use crate::representations::Document;
use crate::security::ServerPublicKey;

pub struct DocumentsPreparer {
    validator: PdfValidator,
    settings: PdfValidationSettings,
}

impl DocumentsPreparer {
    pub fn new(settings: PdfValidationSettings) -> Self {
        Self {
            validator: PdfValidator::new(),
            settings,
        }
    }

    /// Produce the final byte buffer for a document.
    ///
    /// `for_print` selects the stricter print rule set and requires the
    /// content to be PDF bytes. A pre-encrypt document without a key fails
    /// before anything touches the network.
    pub fn prepare(
        &self,
        document: &Document,
        content: Vec<u8>,
        for_print: bool,
        key: Option<&ServerPublicKey>,
        encrypter: &dyn ContentEncrypter,
    ) -> Result<Vec<u8>> {
        if for_print {
            if !looks_like_pdf(&content) {
                return Err(Error::CannotConvert(format!(
                    "document {}: print copy must be PDF bytes",
                    document.uuid
                )));
            }
            self.validator.validate(&content, &PdfRules::print(&self.settings))?;
        } else if document.file_type.is_pdf() {
            self.validator.validate(&content, &PdfRules::digital(&self.settings))?;
        }

        if document.pre_encrypt {
            let key = key.ok_or_else(|| {
                Error::EncryptionKeyNotFound(format!(
                    "document {} is flagged pre-encrypt but no encryption key is available",
                    document.uuid
                ))
            })?;
            return encrypter.encrypt(&content, key);
        }
        Ok(content)
    }
}

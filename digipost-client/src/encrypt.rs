//! CMS envelope encryption of document content
//!
//! Pre-encrypted documents are wrapped client-side in a CMS enveloped-data
//! structure with AES-256-CBC content encryption and RSA key transport under
//! a server-issued public key.

use crate::error::{Error, Result};
use crate::security::ServerPublicKey;
use cms::builder::{
    ContentEncryptionAlgorithm, EnvelopedDataBuilder, KeyEncryptionInfo, KeyTransRecipientInfoBuilder,
};
use cms::content_info::ContentInfo;
use cms::enveloped_data::RecipientIdentifier;
use const_oid::db::rfc5911::ID_ENVELOPED_DATA;
use der::asn1::OctetString;
use der::{Any, Encode};
use x509_cert::ext::pkix::SubjectKeyIdentifier;

/// Capability provider turning plaintext content into an encrypted envelope.
///
/// Content is consumed once and produced once; callers hand over the full
/// buffer and receive the DER-encoded envelope.
pub trait ContentEncrypter: Send + Sync {
    fn encrypt(&self, content: &[u8], key: &ServerPublicKey) -> Result<Vec<u8>>;
}

/// CMS enveloped-data encrypter (AES-256-CBC + RSA key transport)
pub struct CmsEncrypter;

impl ContentEncrypter for CmsEncrypter {
    fn encrypt(&self, content: &[u8], key: &ServerPublicKey) -> Result<Vec<u8>> {
        let recipient_id = recipient_identifier(key)?;
        let mut recipient_rng = rand::thread_rng();
        let recipient = KeyTransRecipientInfoBuilder::new(
            recipient_id,
            KeyEncryptionInfo::Rsa(key.key.clone()),
            &mut recipient_rng,
        )
        .map_err(|e| Error::Encryption(format!("recipient info: {}", e)))?;

        let mut builder = EnvelopedDataBuilder::new(None, content, ContentEncryptionAlgorithm::Aes256Cbc, None)
            .map_err(|e| Error::Encryption(format!("envelope: {}", e)))?;
        builder
            .add_recipient_info(recipient)
            .map_err(|e| Error::Encryption(format!("recipient info: {}", e)))?;

        let mut rng = rand::thread_rng();
        let enveloped = builder
            .build_with_rng(&mut rng)
            .map_err(|e| Error::Encryption(format!("envelope: {}", e)))?;

        let content = Any::encode_from(&enveloped).map_err(|e| Error::Encryption(format!("DER: {}", e)))?;
        let content_info = ContentInfo {
            content_type: ID_ENVELOPED_DATA,
            content,
        };
        content_info
            .to_der()
            .map_err(|e| Error::Encryption(format!("DER: {}", e)))
    }
}

/// The server locates its private key by the key id it issued; when no key
/// id accompanies the key material an empty identifier is sent.
fn recipient_identifier(key: &ServerPublicKey) -> Result<RecipientIdentifier> {
    let raw = key.key_id.as_deref().unwrap_or("").as_bytes();
    let octets = OctetString::new(raw).map_err(|e| Error::Encryption(format!("key id: {}", e)))?;
    Ok(RecipientIdentifier::SubjectKeyIdentifier(SubjectKeyIdentifier(octets)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use der::Decode;
    use rsa::{RsaPrivateKey, RsaPublicKey};

    fn server_key() -> ServerPublicKey {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        ServerPublicKey {
            key_id: Some("key-4242".to_string()),
            key: RsaPublicKey::from(&private_key),
        }
    }

    #[test]
    fn produces_a_parseable_enveloped_data_structure() {
        let key = server_key();
        let plaintext = b"dear recipient";
        let envelope = CmsEncrypter.encrypt(plaintext, &key).unwrap();

        assert!(!envelope.is_empty());
        let content_info = ContentInfo::from_der(&envelope).unwrap();
        assert_eq!(content_info.content_type, ID_ENVELOPED_DATA);
    }

    #[test]
    fn ciphertext_differs_from_plaintext() {
        let key = server_key();
        let plaintext = b"dear recipient, this letter is confidential".to_vec();
        let envelope = CmsEncrypter.encrypt(&plaintext, &key).unwrap();
        assert_ne!(envelope, plaintext);
        // The plaintext must not appear verbatim inside the envelope
        assert!(!envelope.windows(plaintext.len()).any(|w| w == plaintext.as_slice()));
    }

    #[test]
    fn missing_key_id_still_encrypts() {
        let mut key = server_key();
        key.key_id = None;
        assert!(CmsEncrypter.encrypt(b"content", &key).is_ok());
    }
}

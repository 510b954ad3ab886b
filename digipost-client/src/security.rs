//! Request signing and response signature verification
//!
//! Every authenticated request is signed with RSA-SHA256 over a canonical
//! request string; responses mirror the construction and are verified
//! against the server's published certificate.

use crate::error::{Error, Result};
use crate::representations::EncryptionKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::sha2::Sha256;
use rsa::signature::{SignatureEncoding, Signer as _, Verifier as _};
use rsa::{RsaPrivateKey, RsaPublicKey};
use x509_cert::der::{DecodePem, Encode};
use x509_cert::Certificate;

/// Header names participating in the canonical signing string
const CANONICAL_HEADERS: [&str; 4] = [
    "date",
    "x-content-sha256",
    "x-digipost-id-uri",
    "x-digipost-userid",
];

/// Build the canonical string for signing and verification.
///
/// Format: `METHOD\npath-with-query\n` followed by the canonical headers as
/// `name: value\n`, names lower-cased and sorted ascending. Headers outside
/// the canonical set never contribute.
pub fn canonical_string(method: &str, path_and_query: &str, headers: &[(String, String)]) -> String {
    let mut canonical: Vec<(String, &str)> = headers
        .iter()
        .map(|(name, value)| (name.to_lowercase(), value.as_str()))
        .filter(|(name, _)| CANONICAL_HEADERS.contains(&name.as_str()))
        .collect();
    canonical.sort();

    let mut out = format!("{}\n{}\n", method.to_uppercase(), path_and_query);
    for (name, value) in canonical {
        out.push_str(&name);
        out.push_str(": ");
        out.push_str(value);
        out.push('\n');
    }
    out
}

/// Capability provider producing signatures over canonical request strings.
///
/// Replaceable so embedders can delegate to an HSM or external keystore.
pub trait Signer: Send + Sync {
    /// Sign the canonical string bytes, returning the raw signature
    fn sign(&self, canonical: &[u8]) -> Result<Vec<u8>>;
}

/// Signer backed by an in-memory RSA private key
pub struct RsaKeySigner {
    signing_key: SigningKey<Sha256>,
}

impl RsaKeySigner {
    pub fn new(private_key: RsaPrivateKey) -> Self {
        Self {
            signing_key: SigningKey::new(private_key),
        }
    }

    /// Load a PKCS#8 or PKCS#1 PEM-encoded private key
    pub fn from_pem(pem: &str) -> Result<Self> {
        let private_key = if pem.contains("BEGIN RSA PRIVATE KEY") {
            RsaPrivateKey::from_pkcs1_pem(pem)
                .map_err(|e| Error::Config(format!("Invalid PKCS#1 private key: {}", e)))?
        } else {
            RsaPrivateKey::from_pkcs8_pem(pem)
                .map_err(|e| Error::Config(format!("Invalid PKCS#8 private key: {}", e)))?
        };
        Ok(Self::new(private_key))
    }
}

impl Signer for RsaKeySigner {
    fn sign(&self, canonical: &[u8]) -> Result<Vec<u8>> {
        let signature = self
            .signing_key
            .try_sign(canonical)
            .map_err(|e| Error::General(format!("RSA signing failed: {}", e)))?;
        Ok(signature.to_vec())
    }
}

/// Verify a base64 response signature against the canonical string
pub fn verify_signature(key: &RsaPublicKey, canonical: &[u8], signature_base64: &str) -> Result<()> {
    let raw = decode_base64(signature_base64)
        .map_err(|e| Error::SignatureMismatch(format!("signature header is not base64: {}", e)))?;
    let signature = Signature::try_from(raw.as_slice())
        .map_err(|e| Error::SignatureMismatch(format!("malformed signature: {}", e)))?;
    VerifyingKey::<Sha256>::new(key.clone())
        .verify(canonical, &signature)
        .map_err(|_| Error::SignatureMismatch("server signature does not match canonical string".to_string()))
}

/// Public key material issued by the server, with its server-side key id
#[derive(Debug, Clone, PartialEq)]
pub struct ServerPublicKey {
    pub key_id: Option<String>,
    pub key: RsaPublicKey,
}

impl ServerPublicKey {
    /// Parse the opaque PEM value of a fetched encryption key
    pub fn from_encryption_key(encryption_key: &EncryptionKey) -> Result<Self> {
        Ok(Self {
            key_id: encryption_key.key_id.clone(),
            key: parse_public_key_pem(&encryption_key.value)?,
        })
    }
}

/// Parse PEM public key material: an X.509 certificate, an SPKI public key,
/// or a PKCS#1 RSA public key.
pub fn parse_public_key_pem(pem: &str) -> Result<RsaPublicKey> {
    if pem.contains("BEGIN CERTIFICATE") {
        let certificate = Certificate::from_pem(pem.as_bytes())
            .map_err(|e| Error::General(format!("Invalid server certificate: {}", e)))?;
        let spki_der = certificate
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| Error::General(format!("Invalid certificate key info: {}", e)))?;
        RsaPublicKey::from_public_key_der(&spki_der)
            .map_err(|e| Error::General(format!("Certificate does not carry an RSA key: {}", e)))
    } else if pem.contains("BEGIN RSA PUBLIC KEY") {
        RsaPublicKey::from_pkcs1_pem(pem).map_err(|e| Error::General(format!("Invalid PKCS#1 public key: {}", e)))
    } else {
        RsaPublicKey::from_public_key_pem(pem)
            .map_err(|e| Error::General(format!("Invalid SPKI public key: {}", e)))
    }
}

/// Encode bytes to base64 string
pub fn encode_base64(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// Decode base64 string to bytes
pub fn decode_base64(s: &str) -> Result<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(|e| Error::General(format!("Invalid base64: {}", e)))
}

//! Secured bags
//!
//! A portable bundle of one certificate and its password-sealed private
//! key, used to move an identity between key chains.

use super::certificate::IdentityCertificate;
use super::CertificateError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Certificate plus sealed private key bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecuredBag {
    certificate: IdentityCertificate,
    /// Format is owned by the key custodian that sealed it
    sealed_key: Vec<u8>,
}

impl SecuredBag {
    pub fn new(certificate: IdentityCertificate, sealed_key: Vec<u8>) -> Self {
        Self {
            certificate,
            sealed_key,
        }
    }

    pub fn certificate(&self) -> &IdentityCertificate {
        &self.certificate
    }

    pub fn sealed_key(&self) -> &[u8] {
        &self.sealed_key
    }

    pub fn into_parts(self) -> (IdentityCertificate, Vec<u8>) {
        (self.certificate, self.sealed_key)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CertificateError> {
        bincode::serialize(self).map_err(|e| CertificateError::Encoding(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CertificateError> {
        bincode::deserialize(bytes).map_err(|e| CertificateError::Encoding(e.to_string()))
    }

    /// Base64 text form, for files and terminals
    pub fn to_base64(&self) -> Result<String, CertificateError> {
        Ok(STANDARD.encode(self.to_bytes()?))
    }

    pub fn from_base64(text: &str) -> Result<Self, CertificateError> {
        let compact: String = text.split_whitespace().collect();
        let bytes = STANDARD
            .decode(compact)
            .map_err(|e| CertificateError::Encoding(e.to_string()))?;
        Self::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_cert::PublicKey;
    use crate::core_name::Name;
    use std::time::SystemTime;

    fn bag() -> SecuredBag {
        let now = SystemTime::now();
        let cert = IdentityCertificate::new(
            Name::from_uri("/alice/KEY/ksk-1/ID-CERT/%FD%01").unwrap(),
            PublicKey::from_der(vec![3, 1, 4]),
            now,
            now,
        );
        SecuredBag::new(cert, vec![0xAA; 48])
    }

    #[test]
    fn test_base64_text_tolerates_line_breaks() {
        let original = bag();
        let text = original.to_base64().unwrap();
        let wrapped: String = text
            .as_bytes()
            .chunks(16)
            .map(|c| format!("{}\n", String::from_utf8_lossy(c)))
            .collect();
        assert_eq!(SecuredBag::from_base64(&wrapped).unwrap(), original);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(SecuredBag::from_bytes(&[1, 2, 3]).is_err());
        assert!(SecuredBag::from_base64("not base64!").is_err());
    }
}

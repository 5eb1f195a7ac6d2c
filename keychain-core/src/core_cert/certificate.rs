//! Identity certificates
//!
//! A certificate binds a public key to a subject name for a validity window.
//! Its name has the shape `<prefix>/KEY/<suffix>/ID-CERT/<version>`, from
//! which the key name `<prefix>/<suffix>` is recovered.

use super::key::PublicKey;
use super::CertificateError;
use crate::core_name::{Name, NameError};
use crate::core_signing::{Data, Signature};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Component separating the certificate prefix from the key suffix
pub const KEY_MARKER: &[u8] = b"KEY";

/// Component following the key suffix
pub const ID_CERT_MARKER: &[u8] = b"ID-CERT";

/// OID of the "name" subject attribute
pub const ATTRIBUTE_NAME_OID: &str = "2.5.4.41";

/// One attribute/value pair describing the certificate subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectDescription {
    pub oid: String,
    pub value: String,
}

impl SubjectDescription {
    pub fn new(oid: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            oid: oid.into(),
            value: value.into(),
        }
    }

    /// The "name" attribute
    pub fn name(value: impl Into<String>) -> Self {
        Self::new(ATTRIBUTE_NAME_OID, value)
    }
}

/// Fields covered by the certificate signature besides its name
#[derive(Serialize)]
struct CertificateBody<'a> {
    not_before: &'a SystemTime,
    not_after: &'a SystemTime,
    subject_descriptions: &'a [SubjectDescription],
    public_key: &'a PublicKey,
}

/// An identity certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityCertificate {
    name: Name,
    not_before: SystemTime,
    not_after: SystemTime,
    subject_descriptions: Vec<SubjectDescription>,
    public_key: PublicKey,
    signature: Option<Signature>,
}

impl IdentityCertificate {
    /// An unsigned certificate with no subject descriptions
    pub fn new(
        name: Name,
        public_key: PublicKey,
        not_before: SystemTime,
        not_after: SystemTime,
    ) -> Self {
        Self {
            name,
            not_before,
            not_after,
            subject_descriptions: Vec::new(),
            public_key,
            signature: None,
        }
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn not_before(&self) -> SystemTime {
        self.not_before
    }

    pub fn not_after(&self) -> SystemTime {
        self.not_after
    }

    pub fn subject_descriptions(&self) -> &[SubjectDescription] {
        &self.subject_descriptions
    }

    pub fn add_subject_description(&mut self, description: SubjectDescription) {
        self.subject_descriptions.push(description);
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    pub fn set_signature(&mut self, signature: Signature) {
        self.signature = Some(signature);
    }

    /// Whether `time` falls inside the validity window
    pub fn is_valid_at(&self, time: SystemTime) -> bool {
        self.not_before <= time && time <= self.not_after
    }

    /// Name of the key this certificate is for
    pub fn public_key_name(&self) -> Result<Name, NameError> {
        certificate_name_to_public_key_name(&self.name)
    }

    /// Key locator carried by signatures made with this certificate:
    /// the certificate name up to, but excluding, `ID-CERT`
    pub fn key_locator_name(&self) -> Result<Name, NameError> {
        let id_cert = self.name.rposition(ID_CERT_MARKER).ok_or_else(|| {
            NameError::InvalidCertificateName(self.name.to_uri())
        })?;
        Ok(self.name.prefix(id_cert as isize))
    }

    /// Data packet form; its signed portion is what the signature covers
    pub fn to_data(&self) -> Result<Data, CertificateError> {
        let body = CertificateBody {
            not_before: &self.not_before,
            not_after: &self.not_after,
            subject_descriptions: &self.subject_descriptions,
            public_key: &self.public_key,
        };
        let content =
            bincode::serialize(&body).map_err(|e| CertificateError::Encoding(e.to_string()))?;

        let mut data = Data::new(self.name.clone()).with_content(content);
        if let Some(signature) = &self.signature {
            data.set_signature(signature.clone());
        }
        Ok(data)
    }

    /// Storage encoding
    pub fn to_bytes(&self) -> Result<Vec<u8>, CertificateError> {
        bincode::serialize(self).map_err(|e| CertificateError::Encoding(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CertificateError> {
        bincode::deserialize(bytes).map_err(|e| CertificateError::Encoding(e.to_string()))
    }
}

/// Recover the key name from a certificate name.
///
/// The last `ID-CERT` component ends the key part; the first `KEY`
/// component before it splits identity prefix from key suffix.
pub fn certificate_name_to_public_key_name(cert_name: &Name) -> Result<Name, NameError> {
    let id_cert = cert_name
        .rposition(ID_CERT_MARKER)
        .ok_or_else(|| NameError::InvalidCertificateName(cert_name.to_uri()))?;
    let head = cert_name.prefix(id_cert as isize);

    let key = head
        .position(KEY_MARKER)
        .ok_or_else(|| NameError::InvalidCertificateName(cert_name.to_uri()))?;

    Ok(head.prefix(key as isize).append_name(&head.sub_name(key + 1, None)))
}

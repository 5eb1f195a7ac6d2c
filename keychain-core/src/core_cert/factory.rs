//! Certificate factory
//!
//! Derives a certificate name from a key name and fills in an unsigned
//! certificate. Two naming policies exist: with no prefix hint the prefix is
//! inferred from the signing identity, otherwise the hint is used as given.

use super::certificate::{IdentityCertificate, SubjectDescription, ID_CERT_MARKER, KEY_MARKER};
use super::key::PublicKey;
use crate::core_name::{Component, Name, NameError};
use std::time::SystemTime;

/// First-component prefix of a key-signing key name
pub const KSK_PREFIX: &[u8] = b"ksk-";

/// First-component prefix of a data-signing key name
pub const DSK_PREFIX: &[u8] = b"dsk-";

/// Whether the last component of `key_name` marks it as a ksk or dsk key
pub fn is_key_name(key_name: &Name) -> bool {
    key_name
        .last()
        .map(|c| c.starts_with(KSK_PREFIX) || c.starts_with(DSK_PREFIX))
        .unwrap_or(false)
}

/// Build an unsigned identity certificate for `key_name`.
///
/// The certificate is named `<prefix>/KEY/<suffix>/ID-CERT/<version>` where
/// the version is the current time in milliseconds. With no subject
/// descriptions a single "name" attribute holding the identity is added.
#[allow(clippy::too_many_arguments)]
pub fn build_certificate(
    key_name: &Name,
    public_key: PublicKey,
    signing_identity: &Name,
    not_before: SystemTime,
    not_after: SystemTime,
    subject_descriptions: Vec<SubjectDescription>,
    cert_prefix: Option<&Name>,
) -> Result<IdentityCertificate, NameError> {
    if !is_key_name(key_name) {
        return Err(NameError::InvalidKeyName(key_name.to_uri()));
    }

    let (prefix, suffix) = match cert_prefix {
        None if signing_identity.is_prefix_of(key_name) => (
            signing_identity.clone(),
            key_name.sub_name(signing_identity.len(), None),
        ),
        None => (key_name.prefix(-1), key_name.sub_name(key_name.len() - 1, None)),
        Some(hint) if hint.len() < key_name.len() && hint.is_prefix_of(key_name) => {
            (hint.clone(), key_name.sub_name(hint.len(), None))
        }
        Some(hint) => {
            return Err(NameError::InvalidCertificateName(format!(
                "prefix {} is not a strict prefix of key {}",
                hint, key_name
            )))
        }
    };

    let cert_name = prefix
        .append(Component::from_bytes(KEY_MARKER))
        .append_name(&suffix)
        .append(Component::from_bytes(ID_CERT_MARKER))
        .append_version(None);

    let mut certificate = IdentityCertificate::new(cert_name, public_key, not_before, not_after);
    if subject_descriptions.is_empty() {
        certificate.add_subject_description(SubjectDescription::name(key_name.prefix(-1).to_uri()));
    } else {
        for description in subject_descriptions {
            certificate.add_subject_description(description);
        }
    }

    Ok(certificate)
}

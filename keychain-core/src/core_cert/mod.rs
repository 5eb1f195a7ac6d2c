//! Certificates
//!
//! Public key info, identity certificates, the factory that names them, and
//! the secured bag used for identity export.

mod certificate;
mod factory;
mod key;
mod secured_bag;

pub use certificate::{
    certificate_name_to_public_key_name, IdentityCertificate, SubjectDescription,
    ATTRIBUTE_NAME_OID, ID_CERT_MARKER, KEY_MARKER,
};
pub use factory::{build_certificate, is_key_name, DSK_PREFIX, KSK_PREFIX};
pub use key::{KeyType, PublicKey};
pub use secured_bag::SecuredBag;

use thiserror::Error;

/// Certificate encoding errors
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("Certificate encoding failed: {0}")]
    Encoding(String),

    #[error(transparent)]
    Name(#[from] crate::core_name::NameError),
}

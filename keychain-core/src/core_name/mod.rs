//! Names and their TLV encoding
//!
//! Everything the key chain addresses (identities, keys, certificates,
//! signed requests) is a `Name`. This module owns the URI form and the
//! minimal TLV encoding needed to produce signable bytes.

mod name;
pub mod tlv;

pub use name::{next_version, now_millis, Component, Name, VERSION_MARKER};
pub use tlv::TlvError;

use thiserror::Error;

/// Name errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NameError {
    #[error("Invalid name URI: {0}")]
    InvalidUri(String),

    #[error("Invalid number component: {0}")]
    InvalidNumber(String),

    #[error("Invalid certificate name: {0}")]
    InvalidCertificateName(String),

    #[error("Invalid key name: {0}")]
    InvalidKeyName(String),

    #[error("TLV error: {0}")]
    Tlv(#[from] TlvError),
}

//! Signing
//!
//! Signature values, the signing engine (including the signed-request
//! suffix), the packets it signs, and self-verification.

mod engine;
mod packet;
mod signature;
pub mod verify;

pub use engine::{SignedRequest, SigningEngine, SIGNED_REQUEST_SUFFIX_LEN};
pub use packet::{Data, Interest};
pub use signature::{
    determine_signature, DigestAlgorithm, Signature, SignatureInfo, SignatureType,
};

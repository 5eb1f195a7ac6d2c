//! Self-verification
//!
//! Checks a signature against a public key the caller already trusts. No
//! certificate chain is walked here.

use super::engine::SignedRequest;
use super::packet::{Data, Interest};
use super::signature::{Signature, SignatureType};
use crate::core_cert::{KeyType, PublicKey};
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature as EcdsaSignature, VerifyingKey as EcdsaVerifyingKey};
use pkcs8::DecodePublicKey;
use rsa::pkcs1v15::{Signature as RsaSignature, VerifyingKey as RsaVerifyingKey};
use rsa::RsaPublicKey;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Verify `signature` over `bytes`.
///
/// Digest signatures ignore `key`; keyed signatures fail without one.
pub fn verify_buffer(bytes: &[u8], signature: &Signature, key: Option<&PublicKey>) -> bool {
    match signature.signature_type() {
        SignatureType::DigestSha256 => Sha256::digest(bytes).as_slice() == signature.value,
        SignatureType::Sha256WithRsa => match key {
            Some(key) if key.key_type() == KeyType::Rsa => {
                verify_rsa(bytes, &signature.value, key.as_der())
            }
            _ => false,
        },
        SignatureType::Sha256WithEcdsa => match key {
            Some(key) if key.key_type() == KeyType::Ecdsa => {
                verify_ecdsa(bytes, &signature.value, key.as_der())
            }
            _ => false,
        },
    }
}

fn verify_rsa(bytes: &[u8], value: &[u8], der: &[u8]) -> bool {
    let Ok(public_key) = RsaPublicKey::from_public_key_der(der) else {
        debug!("RSA public key did not parse");
        return false;
    };
    let Ok(signature) = RsaSignature::try_from(value) else {
        return false;
    };
    RsaVerifyingKey::<Sha256>::new(public_key)
        .verify(bytes, &signature)
        .is_ok()
}

fn verify_ecdsa(bytes: &[u8], value: &[u8], der: &[u8]) -> bool {
    let Ok(verifying_key) = EcdsaVerifyingKey::from_public_key_der(der) else {
        debug!("ECDSA public key did not parse");
        return false;
    };
    let Ok(signature) = EcdsaSignature::from_der(value) else {
        return false;
    };
    verifying_key.verify(bytes, &signature).is_ok()
}

/// Verify a signed Data packet
pub fn verify_data(data: &Data, key: Option<&PublicKey>) -> bool {
    match data.signature() {
        Some(signature) => verify_buffer(&data.signed_portion(), signature, key),
        None => false,
    }
}

/// Verify a signed request (Interest)
pub fn verify_interest(interest: &Interest, key: Option<&PublicKey>) -> bool {
    let Some(request) = SignedRequest::parse(interest.name()) else {
        return false;
    };
    let signature = Signature {
        info: request.info,
        value: request.signature_value,
    };
    verify_buffer(&request.signed_bytes, &signature, key)
}

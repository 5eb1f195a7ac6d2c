//! Signing engine
//!
//! Drives raw signing through a key custodian and builds the anti-replay
//! suffix of signed requests:
//!
//! ```text
//! <request name>/<timestamp>/<nonce>/<SignatureInfo>/<SignatureValue>
//! ```
//!
//! The timestamp is wall-clock milliseconds, bumped past the last issued
//! value so that two requests from one engine never share a timestamp.

use super::signature::{DigestAlgorithm, Signature, SignatureInfo};
use crate::core_name::tlv::{self, types, TlvReader};
use crate::core_name::{now_millis, Component, Name};
use crate::core_tpm::{Tpm, TpmError};
use std::sync::Mutex;

/// Number of components appended to a signed request name
pub const SIGNED_REQUEST_SUFFIX_LEN: usize = 4;

/// Per-keychain signing state
#[derive(Debug)]
pub struct SigningEngine {
    last_timestamp: Mutex<u64>,
}

impl SigningEngine {
    pub fn new() -> Self {
        Self {
            last_timestamp: Mutex::new(now_millis()),
        }
    }

    /// Next request timestamp; strictly greater than every earlier one
    pub fn next_timestamp(&self) -> u64 {
        // a poisoned counter is still a valid u64
        let mut last = self
            .last_timestamp
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let now = now_millis();
        let timestamp = if now <= *last { *last + 1 } else { now };
        *last = timestamp;
        timestamp
    }

    /// Last timestamp handed out
    pub fn last_timestamp(&self) -> u64 {
        *self
            .last_timestamp
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append timestamp, nonce and signature info to `name`, sign the
    /// encoded components with `signer`, then append the signature value.
    pub fn sign_request_name<E>(
        &self,
        name: &Name,
        info: &SignatureInfo,
        signer: impl FnOnce(&[u8]) -> Result<Vec<u8>, E>,
    ) -> Result<Name, E> {
        let timestamp = self.next_timestamp();
        let nonce: u64 = rand::random();

        let unsigned = name
            .clone()
            .append_number(timestamp)
            .append_number(nonce)
            .append(Component::from_bytes(info.wire_encode()));

        let value = signer(&unsigned.encode_components())?;
        Ok(unsigned.append(Component::from_bytes(tlv::encode_tlv(
            types::SIGNATURE_VALUE,
            &value,
        ))))
    }

    /// Fill in `signature`'s value by having `tpm` sign `bytes` with `key_name`
    pub fn sign_buffer(
        &self,
        tpm: &dyn Tpm,
        bytes: &[u8],
        key_name: &Name,
        mut signature: Signature,
        digest: DigestAlgorithm,
    ) -> Result<Signature, TpmError> {
        let value = tpm.sign(bytes, key_name, digest)?;
        signature.set_value(value);
        Ok(signature)
    }
}

impl Default for SigningEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// The pieces of a signed request name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    /// The request name without the four suffix components
    pub request: Name,
    pub timestamp: u64,
    pub nonce: u64,
    pub info: SignatureInfo,
    pub signature_value: Vec<u8>,
    /// Bytes the signature covers
    pub signed_bytes: Vec<u8>,
}

impl SignedRequest {
    /// Split a signed request name into its parts; `None` if the suffix is
    /// missing or malformed.
    pub fn parse(name: &Name) -> Option<Self> {
        if name.len() < SIGNED_REQUEST_SUFFIX_LEN {
            return None;
        }
        let timestamp = name.get(-4)?.to_number().ok()?;
        let nonce = name.get(-3)?.to_number().ok()?;
        let info = SignatureInfo::wire_decode(name.get(-2)?.as_bytes()).ok()?;
        let signature_value = TlvReader::new(name.get(-1)?.as_bytes())
            .expect(types::SIGNATURE_VALUE)
            .ok()?
            .to_vec();

        Some(Self {
            request: name.prefix(-(SIGNED_REQUEST_SUFFIX_LEN as isize)),
            timestamp,
            nonce,
            info,
            signature_value,
            signed_bytes: name.prefix(-1).encode_components(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_signing::SignatureType;
    use std::convert::Infallible;

    #[test]
    fn test_timestamps_strictly_increase() {
        let engine = SigningEngine::new();
        let mut previous = engine.last_timestamp();
        for _ in 0..1000 {
            let ts = engine.next_timestamp();
            assert!(ts > previous);
            previous = ts;
        }
    }

    #[test]
    fn test_future_last_timestamp_is_bumped() {
        let engine = SigningEngine::new();
        let far_future = now_millis() + 1_000_000;
        *engine.last_timestamp.lock().unwrap() = far_future;
        assert_eq!(engine.next_timestamp(), far_future + 1);
        assert_eq!(engine.last_timestamp(), far_future + 1);
    }

    #[test]
    fn test_request_suffix_layout() {
        let engine = SigningEngine::new();
        let name = Name::from_uri("/localhost/cmd").unwrap();
        let info = SignatureInfo::new(SignatureType::DigestSha256, None);

        let mut seen = Vec::new();
        let signed = engine
            .sign_request_name(&name, &info, |bytes| {
                seen = bytes.to_vec();
                Ok::<_, Infallible>(vec![0xAB; 4])
            })
            .unwrap();

        assert_eq!(signed.len(), name.len() + SIGNED_REQUEST_SUFFIX_LEN);

        let parsed = SignedRequest::parse(&signed).unwrap();
        assert_eq!(parsed.request, name);
        assert_eq!(parsed.timestamp, engine.last_timestamp());
        assert_eq!(parsed.info, info);
        assert_eq!(parsed.signature_value, vec![0xAB; 4]);
        assert_eq!(parsed.signed_bytes, seen);
    }

    #[test]
    fn test_signer_error_propagates() {
        let engine = SigningEngine::new();
        let info = SignatureInfo::new(SignatureType::DigestSha256, None);
        let result = engine.sign_request_name(&Name::new(), &info, |_| Err("boom"));
        assert_eq!(result, Err("boom"));
    }

    #[test]
    fn test_parse_rejects_short_names() {
        assert!(SignedRequest::parse(&Name::from_uri("/a/b/c").unwrap()).is_none());
        assert!(SignedRequest::parse(&Name::from_uri("/a/b/c/d").unwrap()).is_none());
    }

    #[test]
    fn test_sign_buffer_fills_value_from_tpm() {
        use crate::core_signing::verify::verify_buffer;
        use crate::core_tpm::{KeyParams, MemoryTpm};

        let tpm = MemoryTpm::new();
        let key_name = Name::from_uri("/alice/ksk-1").unwrap();
        tpm.generate_key_pair(&key_name, &KeyParams::ecdsa()).unwrap();
        let locator = Name::from_uri("/alice/KEY/ksk-1").unwrap();

        let engine = SigningEngine::new();
        let signature = engine
            .sign_buffer(
                &tpm,
                b"payload",
                &key_name,
                Signature::unsigned(SignatureType::Sha256WithEcdsa, Some(locator.clone())),
                DigestAlgorithm::Sha256,
            )
            .unwrap();

        assert_eq!(signature.key_locator(), Some(&locator));
        assert!(!signature.value.is_empty());
        let public = tpm.public_key(&key_name).unwrap();
        assert!(verify_buffer(b"payload", &signature, Some(&public)));
    }

    #[test]
    fn test_sign_buffer_unknown_key() {
        use crate::core_tpm::MemoryTpm;

        let engine = SigningEngine::new();
        let result = engine.sign_buffer(
            &MemoryTpm::new(),
            b"payload",
            &Name::from_uri("/nobody/ksk-1").unwrap(),
            Signature::unsigned(SignatureType::Sha256WithEcdsa, None),
            DigestAlgorithm::Sha256,
        );
        assert!(matches!(result, Err(TpmError::KeyNotFound(_))));
    }
}

//! Signature info and values

use crate::core_cert::KeyType;
use crate::core_name::tlv::{self, types, TlvError, TlvReader};
use crate::core_name::Name;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Digest algorithms a caller may ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DigestAlgorithm {
    Sha256,
    Sha512,
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DigestAlgorithm::Sha256 => write!(f, "SHA-256"),
            DigestAlgorithm::Sha512 => write!(f, "SHA-512"),
        }
    }
}

/// Signature type codes carried in SignatureInfo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureType {
    DigestSha256,
    Sha256WithRsa,
    Sha256WithEcdsa,
}

impl SignatureType {
    pub fn code(&self) -> u64 {
        match self {
            SignatureType::DigestSha256 => 0,
            SignatureType::Sha256WithRsa => 1,
            SignatureType::Sha256WithEcdsa => 3,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(SignatureType::DigestSha256),
            1 => Some(SignatureType::Sha256WithRsa),
            3 => Some(SignatureType::Sha256WithEcdsa),
            _ => None,
        }
    }
}

/// Signature type plus optional key locator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureInfo {
    pub signature_type: SignatureType,
    pub key_locator: Option<Name>,
}

impl SignatureInfo {
    pub fn new(signature_type: SignatureType, key_locator: Option<Name>) -> Self {
        Self {
            signature_type,
            key_locator,
        }
    }

    /// SignatureInfo TLV
    pub fn wire_encode(&self) -> Vec<u8> {
        let mut value = Vec::new();
        tlv::write_tlv(
            &mut value,
            types::SIGNATURE_TYPE,
            &tlv::encode_nonneg_integer(self.signature_type.code()),
        );
        if let Some(locator) = &self.key_locator {
            tlv::write_tlv(&mut value, types::KEY_LOCATOR, &locator.wire_encode());
        }
        tlv::encode_tlv(types::SIGNATURE_INFO, &value)
    }

    /// Decode a SignatureInfo TLV
    pub fn wire_decode(wire: &[u8]) -> Result<Self, TlvError> {
        let value = TlvReader::new(wire).expect(types::SIGNATURE_INFO)?;
        let mut reader = TlvReader::new(value);

        let type_bytes = reader.expect(types::SIGNATURE_TYPE)?;
        let code = tlv::decode_nonneg_integer(type_bytes)?;
        let signature_type = SignatureType::from_code(code).ok_or(TlvError::UnexpectedType {
            expected: types::SIGNATURE_TYPE,
            found: code,
        })?;

        let key_locator = match reader.next() {
            Some(Ok((types::KEY_LOCATOR, locator))) => Some(Name::wire_decode(locator)?),
            Some(Ok((found, _))) => {
                return Err(TlvError::UnexpectedType {
                    expected: types::KEY_LOCATOR,
                    found,
                })
            }
            Some(Err(e)) => return Err(e),
            None => None,
        };

        Ok(Self {
            signature_type,
            key_locator,
        })
    }
}

/// A signature: info plus (possibly still empty) value bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub info: SignatureInfo,
    pub value: Vec<u8>,
}

impl Signature {
    /// An unsigned signature of the given type
    pub fn unsigned(signature_type: SignatureType, key_locator: Option<Name>) -> Self {
        Self {
            info: SignatureInfo::new(signature_type, key_locator),
            value: Vec::new(),
        }
    }

    pub fn signature_type(&self) -> SignatureType {
        self.info.signature_type
    }

    pub fn key_locator(&self) -> Option<&Name> {
        self.info.key_locator.as_ref()
    }

    pub fn set_value(&mut self, value: Vec<u8>) {
        self.value = value;
    }

    /// SignatureValue TLV
    pub fn encode_value(&self) -> Vec<u8> {
        tlv::encode_tlv(types::SIGNATURE_VALUE, &self.value)
    }
}

/// Pick the signature variant for a key type and digest algorithm.
///
/// Only SHA-256 is implemented; every other digest, and every key type
/// other than RSA and ECDSA, yields `None`.
pub fn determine_signature(
    key_locator: Name,
    key_type: KeyType,
    digest: DigestAlgorithm,
) -> Option<Signature> {
    if digest != DigestAlgorithm::Sha256 {
        return None;
    }
    match key_type {
        KeyType::Rsa => Some(Signature::unsigned(
            SignatureType::Sha256WithRsa,
            Some(key_locator),
        )),
        KeyType::Ecdsa => Some(Signature::unsigned(
            SignatureType::Sha256WithEcdsa,
            Some(key_locator),
        )),
        KeyType::Null => None,
    }
}

//! Public key info
//!
//! Public keys travel as SPKI DER. The key type is read from the SPKI
//! algorithm identifier; anything other than RSA or EC is `KeyType::Null`.

use pkcs8::spki::SubjectPublicKeyInfoRef;
use pkcs8::ObjectIdentifier;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");
const ID_EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");

/// Key type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    /// RSA
    Rsa,
    /// ECDSA over NIST P-256
    Ecdsa,
    /// Unrecognised key material
    Null,
}

impl KeyType {
    /// Stable numeric code used by the SQL store
    pub fn code(&self) -> i64 {
        match self {
            KeyType::Rsa => 0,
            KeyType::Ecdsa => 1,
            KeyType::Null => 255,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            0 => KeyType::Rsa,
            1 => KeyType::Ecdsa,
            _ => KeyType::Null,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Rsa => "RSA",
            KeyType::Ecdsa => "ECDSA",
            KeyType::Null => "NULL",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Public key bytes plus their detected type
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    key_type: KeyType,
    der: Vec<u8>,
}

impl PublicKey {
    /// Wrap SPKI DER bytes, detecting the key type
    pub fn from_der(der: impl Into<Vec<u8>>) -> Self {
        let der = der.into();
        let key_type = match SubjectPublicKeyInfoRef::try_from(der.as_slice()) {
            Ok(spki) if spki.algorithm.oid == RSA_ENCRYPTION => KeyType::Rsa,
            Ok(spki) if spki.algorithm.oid == ID_EC_PUBLIC_KEY => KeyType::Ecdsa,
            _ => KeyType::Null,
        };
        PublicKey { key_type, der }
    }

    pub fn key_type(&self) -> KeyType {
        self.key_type
    }

    /// SPKI DER bytes
    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    /// SHA-256 over the DER bytes
    pub fn fingerprint(&self) -> [u8; 32] {
        Sha256::digest(&self.der).into()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("key_type", &self.key_type)
            .field("fingerprint", &hex::encode(&self.fingerprint()[..8]))
            .finish()
    }
}

//! Key generation parameters

use super::TpmError;
use crate::core_cert::KeyType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Key type plus size; immutable input to key generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyParams {
    Rsa { size: u32 },
    Ecdsa { size: u32 },
}

impl KeyParams {
    pub const DEFAULT_RSA_KEY_SIZE: u32 = 2048;
    pub const DEFAULT_ECDSA_KEY_SIZE: u32 = 256;

    /// RSA modulus sizes this build can generate
    pub const RSA_KEY_SIZES: [u32; 4] = [1024, 2048, 3072, 4096];

    pub fn rsa() -> Self {
        KeyParams::Rsa {
            size: Self::DEFAULT_RSA_KEY_SIZE,
        }
    }

    pub fn ecdsa() -> Self {
        KeyParams::Ecdsa {
            size: Self::DEFAULT_ECDSA_KEY_SIZE,
        }
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            KeyParams::Rsa { .. } => KeyType::Rsa,
            KeyParams::Ecdsa { .. } => KeyType::Ecdsa,
        }
    }

    pub fn key_size(&self) -> u32 {
        match self {
            KeyParams::Rsa { size } | KeyParams::Ecdsa { size } => *size,
        }
    }

    /// Check the size is one this build can generate
    pub fn validate(&self) -> Result<(), TpmError> {
        match self {
            KeyParams::Rsa { size } if Self::RSA_KEY_SIZES.contains(size) => Ok(()),
            KeyParams::Ecdsa { size } if *size == Self::DEFAULT_ECDSA_KEY_SIZE => Ok(()),
            _ => Err(TpmError::UnsupportedKey(self.to_string())),
        }
    }
}

impl Default for KeyParams {
    fn default() -> Self {
        Self::rsa()
    }
}

impl fmt::Display for KeyParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.key_type(), self.key_size())
    }
}

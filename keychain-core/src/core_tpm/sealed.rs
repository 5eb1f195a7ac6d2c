//! Password-sealed private keys
//!
//! Format:
//! ```text
//! [Magic: 8 bytes "KCSK0001"]
//! [Version: 1 byte]
//! [Salt: 16 bytes]
//! [Nonce: 12 bytes]
//! [Ciphertext + AEAD tag: variable]
//! ```
//!
//! The key is derived from the password with Argon2id and the PKCS#8 DER
//! is encrypted with AES-256-GCM.

use super::TpmError;
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use argon2::{Argon2, Params};
use rand::RngCore;
use zeroize::Zeroizing;

const MAGIC_HEADER: &[u8; 8] = b"KCSK0001";

const FORMAT_VERSION: u8 = 1;

const SALT_LEN: usize = 16;

const NONCE_LEN: usize = 12;

/// magic(8) + version(1) + salt(16) + nonce(12)
const HEADER_SIZE: usize = 8 + 1 + SALT_LEN + NONCE_LEN;

/// AES-GCM tag
const TAG_LEN: usize = 16;

/// Encrypt `plaintext` under `password`
pub fn seal(plaintext: &[u8], password: &str) -> Result<Vec<u8>, TpmError> {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    let key = derive_key(password, &salt)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(key.as_slice())
        .map_err(|e| TpmError::Sealed(format!("Invalid key: {}", e)))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| TpmError::Sealed(format!("Encryption failed: {}", e)))?;

    let mut out = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
    out.extend_from_slice(MAGIC_HEADER);
    out.push(FORMAT_VERSION);
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a blob produced by [`seal`]
///
/// A tag mismatch is reported as `InvalidPassword`; it also covers a
/// tampered blob.
pub fn unseal(sealed: &[u8], password: &str) -> Result<Zeroizing<Vec<u8>>, TpmError> {
    if sealed.len() < HEADER_SIZE + TAG_LEN {
        return Err(TpmError::Sealed("Truncated sealed key".to_string()));
    }
    if &sealed[0..8] != MAGIC_HEADER {
        return Err(TpmError::Sealed("Invalid magic header".to_string()));
    }
    let version = sealed[8];
    if version != FORMAT_VERSION {
        return Err(TpmError::Sealed(format!("Unsupported version: {}", version)));
    }

    let salt = &sealed[9..9 + SALT_LEN];
    let nonce = Nonce::from_slice(&sealed[9 + SALT_LEN..HEADER_SIZE]);
    let key = derive_key(password, salt)?;

    let cipher = Aes256Gcm::new_from_slice(key.as_slice())
        .map_err(|e| TpmError::Sealed(format!("Invalid key: {}", e)))?;
    let plaintext = cipher
        .decrypt(nonce, &sealed[HEADER_SIZE..])
        .map_err(|_| TpmError::InvalidPassword)?;
    Ok(Zeroizing::new(plaintext))
}

/// 256-bit key from Argon2id
fn derive_key(password: &str, salt: &[u8]) -> Result<Zeroizing<[u8; 32]>, TpmError> {
    let params = Params::new(
        19 * 1024, // 19 MiB
        2,
        1,
        Some(32),
    )
    .map_err(|e| TpmError::Sealed(format!("Invalid Argon2 params: {}", e)))?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut *key)
        .map_err(|e| TpmError::Sealed(format!("Key derivation failed: {}", e)))?;
    Ok(key)
}

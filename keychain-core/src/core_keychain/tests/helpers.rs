//! Test helpers and fixtures

use crate::config::Config;
use crate::core_keychain::KeyChain;
use crate::core_name::Name;
use crate::core_tpm::KeyParams;

/// Configuration whose defaults are the in-memory backends
pub fn memory_config() -> Config {
    Config {
        pib: Some("pib-memory:".to_string()),
        tpm: Some("tpm-memory:".to_string()),
        ..Config::default()
    }
}

/// A key chain over fresh in-memory backends
pub fn memory_keychain() -> KeyChain {
    KeyChain::new(&memory_config()).unwrap()
}

pub fn name(uri: &str) -> Name {
    Name::from_uri(uri).unwrap()
}

/// Cheapest key to generate
pub fn fast_params() -> KeyParams {
    KeyParams::ecdsa()
}

/// Smallest RSA key this build accepts
pub fn small_rsa_params() -> KeyParams {
    KeyParams::Rsa { size: 1024 }
}

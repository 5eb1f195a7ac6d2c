//! Named-data key chain
//!
//! Manages signing identities: a public info base (PIB) records identity,
//! key and certificate names with their defaults, a key custodian (TPM)
//! holds private keys, and [`KeyChain`] drives both to create identities,
//! issue self-signed certificates, sign packets, and move identities
//! between machines as password-sealed bags.

pub mod config;
pub mod core_cert;
pub mod core_keychain;
pub mod core_name;
pub mod core_pib;
pub mod core_signing;
pub mod core_tpm;
pub mod logging;
pub mod metrics;

pub use config::Config;
pub use core_keychain::{KeyChain, KeyChainError};
pub use core_name::Name;
pub use core_tpm::KeyParams;
pub use logging::{init_logging, LogLevel};

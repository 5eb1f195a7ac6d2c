//! Key chain
//!
//! Locator resolution, the closed error set, and the [`KeyChain`]
//! orchestrator that ties the PIB and TPM together.

mod error;
mod keychain;
mod locator;

pub use error::{KeyChainError, Result};
pub use keychain::{KeyChain, SELF_SIGNED_VALIDITY, TMP_IDENTITY};
pub use locator::{
    BackendRegistry, Locator, LocatorResolver, PibFactory, ResolvedBackends, TpmFactory,
    OSX_KEYCHAIN_SCHEME,
};

#[cfg(test)]
mod tests;

//! Backend locators and their resolution
//!
//! A locator is `scheme:location`. The scheme picks a backend from a
//! [`BackendRegistry`]; the location is handed to that backend's factory.
//! [`LocatorResolver`] turns the caller's (possibly empty) locators plus the
//! configured defaults into a constructed PIB/TPM pair.

use super::error::{KeyChainError, Result};
use crate::config::Config;
use crate::core_pib::{MemoryPib, Pib, PibError, SqlPib};
use crate::core_tpm::{FileTpm, MemoryTpm, Tpm, TpmError};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

/// Scheme of the macOS keychain custodian; never registered on this build
pub const OSX_KEYCHAIN_SCHEME: &str = "tpm-osxkeychain";

/// TPM schemes that only exist on particular platforms
const PLATFORM_TPM_SCHEMES: &[&str] = &[OSX_KEYCHAIN_SCHEME];

const PIB_ALIASES: &[(&str, &str)] = &[("sqlite3", SqlPib::SCHEME), ("memory", MemoryPib::SCHEME)];

const TPM_ALIASES: &[(&str, &str)] = &[
    ("file", FileTpm::SCHEME),
    ("memory", MemoryTpm::SCHEME),
    ("osx-keychain", OSX_KEYCHAIN_SCHEME),
];

/// A parsed `scheme:location` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator {
    scheme: String,
    location: String,
}

impl Locator {
    pub fn new(scheme: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            location: location.into(),
        }
    }

    /// Split at the first `:`; a string without one is all scheme
    pub fn parse(text: &str) -> Self {
        match text.split_once(':') {
            Some((scheme, location)) => Self::new(scheme, location),
            None => Self::new(text, ""),
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    fn with_alias(self, aliases: &[(&str, &str)]) -> Self {
        match aliases.iter().find(|(alias, _)| *alias == self.scheme) {
            Some((_, scheme)) => Self::new(*scheme, self.location),
            None => self,
        }
    }

    /// Parse a PIB locator, expanding short names such as `sqlite3`
    pub fn pib(text: &str) -> Self {
        Self::parse(text).with_alias(PIB_ALIASES)
    }

    /// Parse a TPM locator, expanding short names such as `file`
    pub fn tpm(text: &str) -> Self {
        Self::parse(text).with_alias(TPM_ALIASES)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scheme, self.location)
    }
}

/// Builds a PIB instance from a location
pub type PibFactory = fn(&str) -> std::result::Result<Box<dyn Pib>, PibError>;

/// Builds a TPM instance from a location
pub type TpmFactory = fn(&str) -> std::result::Result<Box<dyn Tpm>, TpmError>;

/// Scheme → factory tables
#[derive(Clone, Default)]
pub struct BackendRegistry {
    pibs: HashMap<String, PibFactory>,
    tpms: HashMap<String, TpmFactory>,
}

impl BackendRegistry {
    /// A registry with nothing registered
    pub fn empty() -> Self {
        Self::default()
    }

    /// SQLite and in-memory PIBs; file and in-memory TPMs
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register_pib(SqlPib::SCHEME, open_sql_pib);
        registry.register_pib(MemoryPib::SCHEME, open_memory_pib);
        registry.register_tpm(FileTpm::SCHEME, open_file_tpm);
        registry.register_tpm(MemoryTpm::SCHEME, open_memory_tpm);
        registry
    }

    /// Register (or replace) the PIB factory for `scheme`
    pub fn register_pib(&mut self, scheme: impl Into<String>, factory: PibFactory) {
        self.pibs.insert(scheme.into(), factory);
    }

    /// Register (or replace) the TPM factory for `scheme`
    pub fn register_tpm(&mut self, scheme: impl Into<String>, factory: TpmFactory) {
        self.tpms.insert(scheme.into(), factory);
    }

    pub fn has_pib(&self, scheme: &str) -> bool {
        self.pibs.contains_key(scheme)
    }

    pub fn has_tpm(&self, scheme: &str) -> bool {
        self.tpms.contains_key(scheme)
    }

    pub fn create_pib(&self, locator: &Locator) -> Result<Box<dyn Pib>> {
        let factory = self.pibs.get(locator.scheme()).ok_or_else(|| {
            KeyChainError::UnsupportedBackend(format!("PIB scheme {:?}", locator.scheme()))
        })?;
        debug!(locator = %locator, "Opening PIB");
        Ok(factory(locator.location())?)
    }

    pub fn create_tpm(&self, locator: &Locator) -> Result<Box<dyn Tpm>> {
        let factory = self.tpms.get(locator.scheme()).ok_or_else(|| {
            KeyChainError::UnsupportedBackend(format!("TPM scheme {:?}", locator.scheme()))
        })?;
        debug!(locator = %locator, "Opening TPM");
        Ok(factory(locator.location())?)
    }
}

fn open_sql_pib(location: &str) -> std::result::Result<Box<dyn Pib>, PibError> {
    Ok(Box::new(SqlPib::from_location(location)?))
}

fn open_memory_pib(location: &str) -> std::result::Result<Box<dyn Pib>, PibError> {
    Ok(Box::new(MemoryPib::with_location(location)))
}

fn open_file_tpm(location: &str) -> std::result::Result<Box<dyn Tpm>, TpmError> {
    Ok(Box::new(FileTpm::from_location(location)?))
}

fn open_memory_tpm(location: &str) -> std::result::Result<Box<dyn Tpm>, TpmError> {
    Ok(Box::new(MemoryTpm::with_location(location)))
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut pibs: Vec<_> = self.pibs.keys().collect();
        let mut tpms: Vec<_> = self.tpms.keys().collect();
        pibs.sort();
        tpms.sort();
        f.debug_struct("BackendRegistry")
            .field("pibs", &pibs)
            .field("tpms", &tpms)
            .finish()
    }
}

/// Backends produced by [`LocatorResolver::resolve`]
pub struct ResolvedBackends {
    pub pib: Box<dyn Pib>,
    pub tpm: Box<dyn Tpm>,
    pub pib_locator: Locator,
    pub tpm_locator: Locator,
}

/// Resolves requested locators against configured defaults
#[derive(Debug)]
pub struct LocatorResolver<'a> {
    registry: &'a BackendRegistry,
    default_pib: Locator,
    default_tpm: Locator,
}

impl<'a> LocatorResolver<'a> {
    /// Read the configured defaults. A default TPM naming a platform
    /// scheme this build does not provide fails here.
    pub fn new(registry: &'a BackendRegistry, config: &Config) -> Result<Self> {
        let default_tpm = match config.get("tpm").filter(|s| !s.is_empty()) {
            Some(tpm) => Locator::tpm(tpm),
            None => Locator::new(FileTpm::SCHEME, ""),
        };
        if PLATFORM_TPM_SCHEMES.contains(&default_tpm.scheme())
            && !registry.has_tpm(default_tpm.scheme())
        {
            return Err(KeyChainError::UnsupportedBackend(format!(
                "TPM locator {} is not supported on this platform",
                default_tpm
            )));
        }

        let default_pib = match config.get("pib").filter(|s| !s.is_empty()) {
            Some(pib) => Locator::pib(pib),
            None => Locator::new(SqlPib::SCHEME, ""),
        };

        Ok(Self {
            registry,
            default_pib,
            default_tpm,
        })
    }

    pub fn default_pib(&self) -> &Locator {
        &self.default_pib
    }

    pub fn default_tpm(&self) -> &Locator {
        &self.default_tpm
    }

    /// Construct the backend pair for the requested locators.
    ///
    /// An empty `pib` means the default PIB, and the default PIB is always
    /// paired with the default TPM. A TPM locator recorded by an earlier
    /// session wins over the requested one only when `allow_reset` is set;
    /// otherwise a disagreement is [`KeyChainError::LocatorMismatch`].
    pub fn resolve(&self, pib: &str, tpm: &str, allow_reset: bool) -> Result<ResolvedBackends> {
        let pib_locator = if pib.is_empty() {
            self.default_pib.clone()
        } else {
            Locator::pib(pib)
        };

        let mut tpm_locator = if pib_locator == self.default_pib || tpm.is_empty() {
            self.default_tpm.clone()
        } else {
            Locator::tpm(tpm)
        };

        let pib = self.registry.create_pib(&pib_locator)?;

        if let Some(recorded) = pib.tpm_locator()? {
            let recorded = Locator::tpm(&recorded);
            if recorded != tpm_locator {
                if !allow_reset {
                    return Err(KeyChainError::LocatorMismatch {
                        recorded: recorded.to_string(),
                        requested: tpm_locator.to_string(),
                    });
                }
                warn!(
                    recorded = %recorded,
                    requested = %tpm_locator,
                    "TPM locator differs from the one recorded in the PIB, keeping the recorded one"
                );
                tpm_locator = recorded;
            }
        }

        let tpm = self.registry.create_tpm(&tpm_locator)?;
        pib.set_tpm_locator(&tpm_locator.to_string())?;

        info!(pib = %pib_locator, tpm = %tpm_locator, "Key chain backends ready");
        Ok(ResolvedBackends {
            pib,
            tpm,
            pib_locator,
            tpm_locator,
        })
    }
}

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use clap::{Args, Parser, Subcommand, ValueEnum};
use keychain_core::config::Config;
use keychain_core::core_cert::{IdentityCertificate, SecuredBag, SubjectDescription};
use keychain_core::logging::{init_logging_with_config, LogConfig};
use keychain_core::metrics::init_metrics;
use keychain_core::{KeyChain, KeyParams, Name};
use serde::Serialize;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "keychain")]
#[command(author, version, about = "Manage signing identities, keys and certificates", long_about = None)]
struct Cli {
    /// PIB locator, e.g. pib-sqlite3:/path (default from configuration)
    #[arg(long, global = true, default_value = "")]
    pib: String,

    /// TPM locator, e.g. tpm-file:/path (default from configuration)
    #[arg(long, global = true, default_value = "")]
    tpm: String,

    /// Adopt the TPM locator recorded in the PIB when it differs from --tpm
    #[arg(long, global = true)]
    allow_reset: bool,

    /// Configuration file (default: $KEYCHAIN_CONFIG or ~/.ndn/client.conf)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an identity, or certify its default key if it has none
    CreateIdentity {
        identity: String,

        #[command(flatten)]
        key: KeyArgs,

        /// Also make it the system default identity
        #[arg(long)]
        default: bool,
    },

    /// Generate a key pair for an identity
    KeyGen {
        identity: String,

        /// Generate a data-signing key instead of a key-signing key
        #[arg(long)]
        dsk: bool,

        #[command(flatten)]
        key: KeyArgs,

        /// Make the new key the identity's default
        #[arg(long)]
        default: bool,
    },

    /// List identities, optionally with keys and certificates
    List {
        #[arg(short, long)]
        keys: bool,

        /// Implies --keys
        #[arg(short, long)]
        certs: bool,
    },

    /// Print a certificate as JSON
    CertDump {
        /// Certificate name, or identity/key name with --identity/--key
        name: String,

        #[arg(short, long)]
        identity: bool,

        #[arg(short, long, conflicts_with = "identity")]
        key: bool,
    },

    /// Sign a file (or stdin) with an identity's default certificate
    Sign {
        identity: String,

        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Write an identity and its sealed private key as base64
    Export {
        identity: String,

        #[arg(short, long, env = "KEYCHAIN_PASSWORD", hide_env_values = true)]
        password: String,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Install an identity written by `export`
    Import {
        input: PathBuf,

        #[arg(short, long, env = "KEYCHAIN_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Delete an identity (default), a key, or a certificate
    Delete {
        name: String,

        #[arg(short, long)]
        key: bool,

        #[arg(short, long, conflicts_with = "key")]
        cert: bool,
    },

    /// Make an identity (default), key or certificate the default
    SetDefault {
        name: String,

        #[arg(short, long)]
        key: bool,

        #[arg(short, long, conflicts_with = "key")]
        cert: bool,
    },
}

#[derive(Args, Debug)]
struct KeyArgs {
    #[arg(long, value_enum, default_value_t = KeyTypeArg::Rsa)]
    key_type: KeyTypeArg,

    /// Key size in bits (RSA: 1024-4096, ECDSA: 256)
    #[arg(long)]
    key_size: Option<u32>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum KeyTypeArg {
    Rsa,
    Ecdsa,
}

impl KeyArgs {
    fn params(&self) -> KeyParams {
        match self.key_type {
            KeyTypeArg::Rsa => KeyParams::Rsa {
                size: self.key_size.unwrap_or(KeyParams::DEFAULT_RSA_KEY_SIZE),
            },
            KeyTypeArg::Ecdsa => KeyParams::Ecdsa {
                size: self.key_size.unwrap_or(KeyParams::DEFAULT_ECDSA_KEY_SIZE),
            },
        }
    }
}

#[derive(Serialize)]
struct CertificateView<'a> {
    name: String,
    key_name: String,
    key_locator: String,
    key_type: String,
    public_key_sha256: String,
    not_before: u64,
    not_after: u64,
    subjects: &'a [SubjectDescription],
    signature_type: Option<String>,
}

#[derive(Serialize)]
struct SignatureView {
    signature_type: String,
    key_locator: Option<String>,
    value: String,
}

fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn certificate_view(certificate: &IdentityCertificate) -> Result<CertificateView<'_>> {
    Ok(CertificateView {
        name: certificate.name().to_uri(),
        key_name: certificate.public_key_name()?.to_uri(),
        key_locator: certificate.key_locator_name()?.to_uri(),
        key_type: certificate.public_key().key_type().to_string(),
        public_key_sha256: hex::encode(certificate.public_key().fingerprint()),
        not_before: unix_seconds(certificate.not_before()),
        not_after: unix_seconds(certificate.not_after()),
        subjects: certificate.subject_descriptions(),
        signature_type: certificate
            .signature()
            .map(|s| format!("{:?}", s.signature_type())),
    })
}

fn parse_name(uri: &str) -> Result<Name> {
    Name::from_uri(uri).with_context(|| format!("invalid name {:?}", uri))
}

fn load_config(cli: &Cli) -> Result<Config> {
    let config = match &cli.config {
        Some(path) => {
            let mut config = Config::from_file(path)?;
            config.apply_env(|key| std::env::var(key).ok())?;
            config.validate()?;
            config
        }
        None => Config::load()?,
    };
    Ok(config)
}

fn list(keychain: &KeyChain, keys: bool, certs: bool, out: &mut dyn Write) -> Result<()> {
    let pib = keychain.pib();
    let mark = |is_default: bool| if is_default { "*" } else { " " };

    for (is_default, identity) in flagged(pib.identities(true)?, pib.identities(false)?) {
        writeln!(out, "{} {}", mark(is_default), identity)?;
        if !(keys || certs) {
            continue;
        }
        let key_names = flagged(
            pib.key_names_of_identity(&identity, true)?,
            pib.key_names_of_identity(&identity, false)?,
        );
        for (is_default, key_name) in key_names {
            writeln!(out, "  +->{} {}", mark(is_default), key_name)?;
            if !certs {
                continue;
            }
            let cert_names = flagged(
                pib.certificate_names_of_key(&key_name, true)?,
                pib.certificate_names_of_key(&key_name, false)?,
            );
            for (is_default, cert_name) in cert_names {
                writeln!(out, "       +->{} {}", mark(is_default), cert_name)?;
            }
        }
    }
    Ok(())
}

/// Defaults first, each tagged with its default flag
fn flagged(defaults: Vec<Name>, others: Vec<Name>) -> Vec<(bool, Name)> {
    defaults
        .into_iter()
        .map(|name| (true, name))
        .chain(others.into_iter().map(|name| (false, name)))
        .collect()
}

fn run(cli: &Cli, config: &Config, out: &mut dyn Write) -> Result<()> {
    let keychain = KeyChain::with_locators(&cli.pib, &cli.tpm, cli.allow_reset, config)?;
    debug!(keychain = ?keychain, "Opened key chain");

    match &cli.command {
        Command::CreateIdentity {
            identity,
            key,
            default,
        } => {
            let identity = parse_name(identity)?;
            let cert_name = keychain.create_identity(&identity, &key.params())?;
            if *default {
                keychain.set_default_identity(&identity)?;
            }
            writeln!(out, "{}", cert_name)?;
        }

        Command::KeyGen {
            identity,
            dsk,
            key,
            default,
        } => {
            let identity = parse_name(identity)?;
            let key_name = keychain.generate_key_pair(&identity, !dsk, &key.params())?;
            if *default {
                keychain.set_default_key_for_identity(&key_name)?;
            }
            writeln!(out, "{}", key_name)?;
        }

        Command::List { keys, certs } => list(&keychain, *keys, *certs, out)?,

        Command::CertDump {
            name,
            identity,
            key,
        } => {
            let name = parse_name(name)?;
            let cert_name = if *identity {
                keychain.pib().default_certificate_name_for_identity(&name)?
            } else if *key {
                keychain.pib().default_certificate_name_for_key(&name)?
            } else {
                name
            };
            let certificate = keychain.pib().certificate(&cert_name)?;
            serde_json::to_writer_pretty(&mut *out, &certificate_view(&certificate)?)?;
            writeln!(out)?;
        }

        Command::Sign { identity, file } => {
            let identity = parse_name(identity)?;
            let buffer = match file {
                Some(path) => std::fs::read(path)
                    .with_context(|| format!("cannot read {}", path.display()))?,
                None => {
                    let mut buffer = Vec::new();
                    io::stdin().read_to_end(&mut buffer)?;
                    buffer
                }
            };
            let signature = keychain.sign_by_identity(&buffer, &identity)?;
            let view = SignatureView {
                signature_type: format!("{:?}", signature.signature_type()),
                key_locator: signature.key_locator().map(|name| name.to_uri()),
                value: STANDARD.encode(&signature.value),
            };
            serde_json::to_writer_pretty(&mut *out, &view)?;
            writeln!(out)?;
        }

        Command::Export {
            identity,
            password,
            output,
        } => {
            let identity = parse_name(identity)?;
            let text = keychain.export_identity(&identity, password)?.to_base64()?;
            match output {
                Some(path) => {
                    std::fs::write(path, format!("{}\n", text))
                        .with_context(|| format!("cannot write {}", path.display()))?;
                    info!(identity = %identity, path = %path.display(), "Wrote secured bag");
                }
                None => writeln!(out, "{}", text)?,
            }
        }

        Command::Import { input, password } => {
            let text = std::fs::read_to_string(input)
                .with_context(|| format!("cannot read {}", input.display()))?;
            let bag = SecuredBag::from_base64(&text)?;
            let key_name = keychain.import_identity(&bag, password)?;
            writeln!(out, "{}", key_name)?;
        }

        Command::Delete { name, key, cert } => {
            let name = parse_name(name)?;
            match (*key, *cert) {
                (true, _) => keychain.delete_key(&name)?,
                (_, true) => keychain.delete_certificate(&name)?,
                _ => keychain.delete_identity(&name)?,
            }
        }

        Command::SetDefault { name, key, cert } => {
            let name = parse_name(name)?;
            match (*key, *cert) {
                (true, true) => bail!("--key and --cert are exclusive"),
                (true, false) => keychain.set_default_key_for_identity(&name)?,
                (false, true) => keychain.set_default_certificate_for_key(&name)?,
                (false, false) => keychain.set_default_identity(&name)?,
            }
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let mut log_config = LogConfig::try_from(&config.logging)?;
    if let Some(level) = &cli.log_level {
        log_config.level = level.parse()?;
    }
    if cli.json_logs {
        log_config = log_config.json_format(true);
    }
    init_logging_with_config(log_config)?;
    init_metrics();

    let stdout = io::stdout();
    run(&cli, &config, &mut stdout.lock())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Workspace {
        dir: TempDir,
    }

    impl Workspace {
        fn new() -> Self {
            Self {
                dir: TempDir::new().unwrap(),
            }
        }

        fn run(&self, args: &[&str]) -> Result<String> {
            let pib = format!("pib-sqlite3:{}", self.dir.path().join("pib").display());
            let tpm = format!("tpm-file:{}", self.dir.path().join("tpm").display());
            let mut argv = vec!["keychain", "--pib", pib.as_str(), "--tpm", tpm.as_str()];
            argv.extend_from_slice(args);

            let cli = Cli::try_parse_from(argv)?;
            let mut out = Vec::new();
            run(&cli, &Config::default(), &mut out)?;
            Ok(String::from_utf8(out)?)
        }
    }

    #[test]
    fn test_parse_key_args() {
        let cli = Cli::try_parse_from([
            "keychain",
            "key-gen",
            "/alice",
            "--dsk",
            "--key-type",
            "ecdsa",
        ])
        .unwrap();
        match cli.command {
            Command::KeyGen { dsk, key, .. } => {
                assert!(dsk);
                assert_eq!(key.params(), KeyParams::ecdsa());
            }
            other => panic!("parsed {:?}", other),
        }
    }

    #[test]
    fn test_conflicting_flags_rejected() {
        assert!(Cli::try_parse_from(["keychain", "delete", "/a", "--key", "--cert"]).is_err());
        assert!(Cli::try_parse_from(["keychain", "cert-dump", "/a", "-i", "-k"]).is_err());
    }

    #[test]
    fn test_create_list_and_dump() {
        let ws = Workspace::new();
        let cert_name = ws
            .run(&["create-identity", "/alice", "--key-type", "ecdsa", "--default"])
            .unwrap();
        let cert_name = cert_name.trim();
        assert!(cert_name.starts_with("/alice/KEY/ksk-"));

        let listing = ws.run(&["list", "--certs"]).unwrap();
        assert!(listing.contains("* /alice"));
        assert!(listing.contains(cert_name));

        let dump = ws.run(&["cert-dump", "/alice", "--identity"]).unwrap();
        let json: serde_json::Value = serde_json::from_str(&dump).unwrap();
        assert_eq!(json["name"], cert_name);
        assert_eq!(json["key_type"], "ECDSA");
        assert_eq!(json["subjects"][0]["value"], "/alice");
    }

    #[test]
    fn test_sign_file() {
        let ws = Workspace::new();
        ws.run(&["create-identity", "/alice", "--key-type", "ecdsa"])
            .unwrap();
        let path = ws.dir.path().join("message.txt");
        std::fs::write(&path, b"sign me").unwrap();

        let output = ws
            .run(&["sign", "/alice", "--file", path.to_str().unwrap()])
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(json["signature_type"], "Sha256WithEcdsa");
        assert!(json["key_locator"]
            .as_str()
            .unwrap()
            .starts_with("/alice/KEY/ksk-"));
    }

    #[test]
    fn test_export_import_between_workspaces() {
        let source = Workspace::new();
        source
            .run(&["create-identity", "/alice", "--key-type", "ecdsa"])
            .unwrap();
        let bag = source.dir.path().join("alice.bag");
        source
            .run(&[
                "export",
                "/alice",
                "--password",
                "pw",
                "--output",
                bag.to_str().unwrap(),
            ])
            .unwrap();

        let target = Workspace::new();
        let key_name = target
            .run(&["import", bag.to_str().unwrap(), "--password", "pw"])
            .unwrap();
        assert!(key_name.trim().starts_with("/alice/ksk-"));

        target.run(&["delete", "/alice"]).unwrap();
        assert!(!target.run(&["list"]).unwrap().contains("/alice"));
    }
}

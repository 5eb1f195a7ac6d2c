/*
    keychain_integration.rs - Persistent backend integration tests

    These tests run the key chain against the SQLite PIB and the file TPM
    in temporary directories, reopening them between steps the way
    separate processes would.
*/

use keychain_core::core_cert::{certificate_name_to_public_key_name, KeyType, SecuredBag};
use keychain_core::core_keychain::{KeyChain, KeyChainError};
use keychain_core::core_name::{Component, Name};
use keychain_core::core_signing::verify::verify_buffer;
use keychain_core::core_signing::{determine_signature, DigestAlgorithm, SignatureType};
use keychain_core::core_tpm::{KeyClass, KeyParams};
use keychain_core::Config;
use std::collections::HashSet;
use tempfile::{tempdir, TempDir};

struct Backends {
    _dir: TempDir,
    pib: String,
    tpm: String,
}

impl Backends {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        let pib = format!("pib-sqlite3:{}", dir.path().join("pib").display());
        let tpm = format!("tpm-file:{}", dir.path().join("tpm").display());
        Self { _dir: dir, pib, tpm }
    }

    fn open(&self) -> KeyChain {
        KeyChain::with_locators(&self.pib, &self.tpm, false, &Config::default()).unwrap()
    }
}

fn name(uri: &str) -> Name {
    Name::from_uri(uri).unwrap()
}

/// Scenario: /alice with RSA-2048 gets /alice/KEY/ksk-<id>/ID-CERT/<version>
/// and signs with key locator /alice/KEY/ksk-<id>
#[test]
fn test_alice_rsa_scenario() {
    let backends = Backends::new();
    let keychain = backends.open();
    let alice = name("/alice");

    let cert_name = keychain.create_identity(&alice, &KeyParams::rsa()).unwrap();

    assert_eq!(cert_name.len(), 5);
    assert_eq!(cert_name.get(0).unwrap(), &Component::from("alice"));
    assert_eq!(cert_name.get(1).unwrap(), &Component::from("KEY"));
    assert!(cert_name.get(2).unwrap().starts_with(b"ksk-"));
    assert_eq!(cert_name.get(3).unwrap(), &Component::from("ID-CERT"));
    assert!(cert_name.get(4).unwrap().is_version());

    let signature = keychain.sign(b"buffer", &cert_name).unwrap();
    assert_eq!(signature.signature_type(), SignatureType::Sha256WithRsa);
    assert_eq!(signature.key_locator(), Some(&cert_name.prefix(3)));

    let key_name = certificate_name_to_public_key_name(&cert_name).unwrap();
    let public_key = keychain.pib().public_key(&key_name).unwrap();
    assert_eq!(public_key.key_type(), KeyType::Rsa);
    assert!(verify_buffer(b"buffer", &signature, Some(&public_key)));
}

#[test]
fn test_state_survives_reopen() {
    let backends = Backends::new();
    let alice = name("/alice");

    let cert_name = {
        let keychain = backends.open();
        let cert_name = keychain.create_identity(&alice, &KeyParams::ecdsa()).unwrap();
        keychain.set_default_identity(&alice).unwrap();
        cert_name
    };

    let keychain = backends.open();
    assert_eq!(keychain.create_identity(&alice, &KeyParams::ecdsa()).unwrap(), cert_name);
    assert_eq!(keychain.default_certificate_name().unwrap(), cert_name);
    assert_eq!(keychain.tpm_locator().to_string(), backends.tpm);

    let signature = keychain.sign(b"again", &cert_name).unwrap();
    let certificate = keychain.pib().certificate(&cert_name).unwrap();
    assert!(verify_buffer(b"again", &signature, Some(certificate.public_key())));
}

#[test]
fn test_key_names_unique_per_class() {
    let backends = Backends::new();
    let keychain = backends.open();
    let alice = name("/alice");
    let mut issued = HashSet::new();

    for _ in 0..5 {
        for is_ksk in [true, false] {
            let key_name = keychain
                .generate_ecdsa_key_pair(&alice, is_ksk, KeyParams::DEFAULT_ECDSA_KEY_SIZE)
                .unwrap();
            assert!(issued.insert(key_name));
        }
    }
    assert_eq!(keychain.pib().all_key_names_of_identity(&alice).unwrap().len(), 10);
}

#[test]
fn test_export_import_across_stores() {
    let source = Backends::new();
    let target = Backends::new();
    let alice = name("/alice");

    let (bag, key_name, public_der) = {
        let keychain = source.open();
        keychain.create_identity(&alice, &KeyParams::ecdsa()).unwrap();
        let key_name = keychain.pib().default_key_name_for_identity(&alice).unwrap();
        let public_der = keychain.pib().public_key(&key_name).unwrap().as_der().to_vec();
        let bag = keychain.export_identity(&alice, "hunter2").unwrap();
        (bag.to_bytes().unwrap(), key_name, public_der)
    };

    let bag = SecuredBag::from_bytes(&bag).unwrap();
    target.open().import_identity(&bag, "hunter2").unwrap();

    let keychain = target.open();
    assert_eq!(keychain.pib().default_key_name_for_identity(&alice).unwrap(), key_name);
    assert_eq!(keychain.pib().public_key(&key_name).unwrap().as_der(), &public_der[..]);
    assert!(keychain.tpm().does_key_exist(&key_name, KeyClass::Private));
}

#[test]
fn test_delete_identity_clears_both_stores() {
    let backends = Backends::new();
    let alice = name("/alice");

    let keys = {
        let keychain = backends.open();
        keychain.create_identity(&alice, &KeyParams::ecdsa()).unwrap();
        keychain.generate_ecdsa_key_pair(&alice, false, 256).unwrap();
        keychain.generate_ecdsa_key_pair(&alice, true, 256).unwrap();
        let keys = keychain.pib().all_key_names_of_identity(&alice).unwrap();
        keychain.delete_identity(&alice).unwrap();
        keys
    };
    assert_eq!(keys.len(), 3);

    let keychain = backends.open();
    assert!(!keychain.pib().does_identity_exist(&alice).unwrap());
    for key_name in &keys {
        assert!(!keychain.pib().does_key_exist(key_name).unwrap());
        assert!(!keychain.tpm().does_key_exist(key_name, KeyClass::Private));
        assert!(!keychain.tpm().does_key_exist(key_name, KeyClass::Public));
    }
}

#[test]
fn test_tpm_locator_mismatch() {
    let backends = Backends::new();
    backends.open();

    let other = tempdir().unwrap();
    let other_tpm = format!("tpm-file:{}", other.path().display());

    let err = KeyChain::with_locators(&backends.pib, &other_tpm, false, &Config::default())
        .unwrap_err();
    match err {
        KeyChainError::LocatorMismatch {
            recorded,
            requested,
        } => {
            assert_eq!(recorded, backends.tpm);
            assert_eq!(requested, other_tpm);
        }
        other => panic!("unexpected error: {}", other),
    }

    let keychain =
        KeyChain::with_locators(&backends.pib, &other_tpm, true, &Config::default()).unwrap();
    assert_eq!(keychain.tpm_locator().to_string(), backends.tpm);
}

#[test]
fn test_unknown_scheme() {
    let err = KeyChain::with_locators("pib-mysql:db", "tpm-memory:", false, &Config::default())
        .unwrap_err();
    assert!(matches!(err, KeyChainError::UnsupportedBackend(_)));
}

#[test]
fn test_only_sha256_signatures() {
    let locator = name("/alice/KEY/ksk-1");
    for key_type in [KeyType::Rsa, KeyType::Ecdsa, KeyType::Null] {
        assert!(determine_signature(locator.clone(), key_type, DigestAlgorithm::Sha512).is_none());
    }
}

#[test]
fn test_invalid_config_is_a_configuration_error() {
    let config = Config {
        pib: Some("  ".to_string()),
        ..Config::default()
    };
    let err = KeyChain::with_locators("pib-memory:", "tpm-memory:", false, &config).unwrap_err();
    assert!(matches!(err, KeyChainError::Configuration(_)));
}

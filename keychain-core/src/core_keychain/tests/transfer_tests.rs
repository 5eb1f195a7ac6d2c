//! Export and import of identities

use super::helpers::*;
use crate::core_cert::SecuredBag;
use crate::core_keychain::KeyChainError;
use crate::core_tpm::{KeyClass, TpmError};

#[test]
fn test_export_import_roundtrip() {
    let source = memory_keychain();
    let alice = name("/alice");
    let cert_name = source.create_identity(&alice, &fast_params()).unwrap();
    let key_name = source.pib().default_key_name_for_identity(&alice).unwrap();

    let bag = source.export_identity(&alice, "correct horse").unwrap();
    assert_eq!(bag.certificate().name(), &cert_name);

    let target = memory_keychain();
    let imported = target.import_identity(&bag, "correct horse").unwrap();

    assert_eq!(imported, key_name);
    assert_eq!(target.pib().default_key_name_for_identity(&alice).unwrap(), key_name);
    assert_eq!(
        target.pib().public_key(&key_name).unwrap().as_der(),
        source.pib().public_key(&key_name).unwrap().as_der()
    );
    assert_eq!(
        target.pib().default_certificate_name_for_identity(&alice).unwrap(),
        cert_name
    );
    assert!(target.tpm().does_key_exist(&key_name, KeyClass::Private));

    // the imported key signs under the same certificate
    let signature = target.sign(b"after move", &cert_name).unwrap();
    let public_key = source.pib().public_key(&key_name).unwrap();
    assert!(crate::core_signing::verify::verify_buffer(
        b"after move",
        &signature,
        Some(&public_key)
    ));
}

#[test]
fn test_bag_survives_text_encoding() {
    let source = memory_keychain();
    let alice = name("/alice");
    source.create_identity(&alice, &fast_params()).unwrap();

    let text = source.export_identity(&alice, "pw").unwrap().to_base64().unwrap();
    let bag = SecuredBag::from_base64(&text).unwrap();

    let target = memory_keychain();
    target.import_identity(&bag, "pw").unwrap();
    assert!(target.pib().does_identity_exist(&alice).unwrap());
}

#[test]
fn test_export_unknown_identity() {
    let keychain = memory_keychain();
    let err = keychain.export_identity(&name("/nobody"), "pw").unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_export_self_signs_missing_certificate() {
    let keychain = memory_keychain();
    let bob = name("/bob");
    let key_name = keychain.generate_ecdsa_key_pair_as_default(&bob, true, 256).unwrap();
    assert!(keychain.pib().default_certificate_name_for_key(&key_name).is_err());

    let bag = keychain.export_identity(&bob, "pw").unwrap();

    assert_eq!(bag.certificate().public_key_name().unwrap(), key_name);
    assert_eq!(
        keychain.pib().default_certificate_name_for_key(&key_name).unwrap(),
        *bag.certificate().name()
    );
}

#[test]
fn test_import_with_wrong_password() {
    let source = memory_keychain();
    let alice = name("/alice");
    source.create_identity(&alice, &fast_params()).unwrap();
    let bag = source.export_identity(&alice, "right").unwrap();

    let target = memory_keychain();
    let err = target.import_identity(&bag, "wrong").unwrap_err();
    assert!(matches!(err, KeyChainError::Tpm(TpmError::InvalidPassword)));
}

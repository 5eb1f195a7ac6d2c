//! Behaviour shared by every PIB backend

use super::*;
use std::time::SystemTime;

fn name(uri: &str) -> Name {
    Name::from_uri(uri).unwrap()
}

fn backends() -> Vec<(&'static str, Box<dyn Pib>)> {
    vec![
        ("memory", Box::new(MemoryPib::new())),
        ("sqlite", Box::new(SqlPib::memory().unwrap())),
    ]
}

fn cert(uri: &str) -> IdentityCertificate {
    let now = SystemTime::now();
    IdentityCertificate::new(name(uri), PublicKey::from_der(vec![1, 2, 3]), now, now)
}

// ===== Identities and keys =====

#[test]
fn test_add_key_registers_identity() {
    for (backend, pib) in backends() {
        let key = name("/alice/ksk-1");
        pib.add_key(&key, &PublicKey::from_der(vec![9])).unwrap();

        assert!(pib.does_identity_exist(&name("/alice")).unwrap(), "{}", backend);
        assert!(pib.does_key_exist(&key).unwrap(), "{}", backend);
        assert_eq!(pib.public_key(&key).unwrap().as_der(), &[9], "{}", backend);
    }
}

#[test]
fn test_add_identity_is_idempotent() {
    for (backend, pib) in backends() {
        pib.add_identity(&name("/alice")).unwrap();
        pib.add_identity(&name("/alice")).unwrap();
        assert_eq!(pib.all_identities().unwrap(), vec![name("/alice")], "{}", backend);
    }
}

#[test]
fn test_add_key_replaces_public_key() {
    for (backend, pib) in backends() {
        let key = name("/alice/dsk-1");
        pib.add_key(&key, &PublicKey::from_der(vec![1])).unwrap();
        pib.add_certificate(&cert("/alice/KEY/dsk-1/ID-CERT/%FD%01")).unwrap();
        pib.add_key(&key, &PublicKey::from_der(vec![2])).unwrap();

        assert_eq!(pib.public_key(&key).unwrap().as_der(), &[2], "{}", backend);
        assert_eq!(pib.all_certificate_names_of_key(&key).unwrap().len(), 1, "{}", backend);
    }
}

#[test]
fn test_missing_lookups_are_not_found() {
    for (backend, pib) in backends() {
        assert!(matches!(pib.public_key(&name("/x/ksk-1")), Err(PibError::NotFound(_))), "{}", backend);
        assert!(matches!(
            pib.certificate(&name("/x/KEY/ksk-1/ID-CERT/%FD%01")),
            Err(PibError::NotFound(_))
        ));
        assert!(matches!(pib.default_identity(), Err(PibError::NotFound(_))));
        assert!(matches!(
            pib.default_key_name_for_identity(&name("/x")),
            Err(PibError::NotFound(_))
        ));
        assert!(matches!(
            pib.set_default_identity(&name("/x")),
            Err(PibError::NotFound(_))
        ));
    }
}

// ===== Certificates and defaults =====

#[test]
fn test_add_certificate_registers_key() {
    for (backend, pib) in backends() {
        let certificate = cert("/alice/KEY/ksk-1/ID-CERT/%FD%01");
        pib.add_certificate(&certificate).unwrap();

        assert!(pib.does_key_exist(&name("/alice/ksk-1")).unwrap(), "{}", backend);
        assert_eq!(pib.certificate(certificate.name()).unwrap(), certificate, "{}", backend);
    }
}

#[test]
fn test_system_default_chain() {
    for (backend, pib) in backends() {
        let certificate = cert("/alice/KEY/ksk-1/ID-CERT/%FD%01");
        pib.add_certificate_as_system_default(&certificate).unwrap();

        assert_eq!(pib.default_identity().unwrap(), name("/alice"), "{}", backend);
        assert_eq!(
            pib.default_key_name_for_identity(&name("/alice")).unwrap(),
            name("/alice/ksk-1")
        );
        assert_eq!(
            pib.default_certificate_name_for_identity(&name("/alice")).unwrap(),
            certificate.name().clone()
        );
        assert_eq!(pib.default_certificate().unwrap(), certificate, "{}", backend);
    }
}

#[test]
fn test_default_flags_partition_listings() {
    for (backend, pib) in backends() {
        pib.add_certificate_as_identity_default(&cert("/alice/KEY/ksk-1/ID-CERT/%FD%01"))
            .unwrap();
        pib.add_certificate(&cert("/alice/KEY/ksk-1/ID-CERT/%FD%02")).unwrap();
        pib.add_key(&name("/alice/dsk-2"), &PublicKey::from_der(vec![5])).unwrap();

        let alice = name("/alice");
        assert_eq!(pib.key_names_of_identity(&alice, true).unwrap(), vec![name("/alice/ksk-1")]);
        assert_eq!(pib.key_names_of_identity(&alice, false).unwrap(), vec![name("/alice/dsk-2")]);
        assert_eq!(pib.all_key_names_of_identity(&alice).unwrap().len(), 2, "{}", backend);

        let key = name("/alice/ksk-1");
        assert_eq!(
            pib.certificate_names_of_key(&key, true).unwrap(),
            vec![name("/alice/KEY/ksk-1/ID-CERT/%FD%01")]
        );
        assert_eq!(
            pib.certificate_names_of_key(&key, false).unwrap(),
            vec![name("/alice/KEY/ksk-1/ID-CERT/%FD%02")]
        );
    }
}

#[test]
fn test_switching_default_key() {
    for (backend, pib) in backends() {
        pib.add_key(&name("/a/ksk-1"), &PublicKey::from_der(vec![1])).unwrap();
        pib.add_key(&name("/a/ksk-2"), &PublicKey::from_der(vec![2])).unwrap();
        pib.set_default_key_name_for_identity(&name("/a/ksk-1")).unwrap();
        pib.set_default_key_name_for_identity(&name("/a/ksk-2")).unwrap();

        assert_eq!(
            pib.key_names_of_identity(&name("/a"), true).unwrap(),
            vec![name("/a/ksk-2")],
            "{}",
            backend
        );
    }
}

#[test]
fn test_default_certificate_must_exist() {
    for (backend, pib) in backends() {
        pib.add_key(&name("/a/ksk-1"), &PublicKey::from_der(vec![1])).unwrap();
        assert!(
            matches!(
                pib.set_default_certificate_name_for_key(&name("/a/KEY/ksk-1/ID-CERT/%FD%01")),
                Err(PibError::NotFound(_))
            ),
            "{}",
            backend
        );
    }
}

// ===== Deletion cascades =====

#[test]
fn test_delete_identity_cascades() {
    for (backend, pib) in backends() {
        pib.add_certificate_as_system_default(&cert("/alice/KEY/ksk-1/ID-CERT/%FD%01"))
            .unwrap();
        pib.add_certificate(&cert("/alice/KEY/dsk-2/ID-CERT/%FD%01")).unwrap();
        pib.add_key(&name("/bob/ksk-3"), &PublicKey::from_der(vec![3])).unwrap();

        pib.delete_identity(&name("/alice")).unwrap();

        assert!(!pib.does_identity_exist(&name("/alice")).unwrap(), "{}", backend);
        assert!(!pib.does_key_exist(&name("/alice/ksk-1")).unwrap());
        assert!(!pib.does_key_exist(&name("/alice/dsk-2")).unwrap());
        assert!(!pib
            .does_certificate_exist(&name("/alice/KEY/dsk-2/ID-CERT/%FD%01"))
            .unwrap());
        assert!(pib.does_key_exist(&name("/bob/ksk-3")).unwrap(), "{}", backend);
        assert!(pib.default_identity().is_err(), "{}", backend);
    }
}

#[test]
fn test_delete_key_cascades_to_certificates() {
    for (backend, pib) in backends() {
        pib.add_certificate_as_identity_default(&cert("/a/KEY/ksk-1/ID-CERT/%FD%01"))
            .unwrap();
        pib.delete_key(&name("/a/ksk-1")).unwrap();

        assert!(!pib.does_certificate_exist(&name("/a/KEY/ksk-1/ID-CERT/%FD%01")).unwrap());
        assert!(pib.does_identity_exist(&name("/a")).unwrap(), "{}", backend);
        assert!(pib.default_key_name_for_identity(&name("/a")).is_err(), "{}", backend);
    }
}

#[test]
fn test_delete_default_certificate_clears_pointer() {
    for (backend, pib) in backends() {
        let certificate = cert("/a/KEY/ksk-1/ID-CERT/%FD%01");
        pib.add_certificate_as_key_default(&certificate).unwrap();
        pib.delete_certificate(certificate.name()).unwrap();

        assert!(
            pib.default_certificate_name_for_key(&name("/a/ksk-1")).is_err(),
            "{}",
            backend
        );
    }
}

// ===== Key names and locators =====

#[test]
fn test_new_key_names_are_unique() {
    for (backend, pib) in backends() {
        let identity = name("/alice");
        let mut issued = Vec::new();
        for _ in 0..5 {
            let key_name = pib.new_key_name(&identity, true).unwrap();
            assert!(!issued.contains(&key_name), "{}", backend);
            pib.add_key(&key_name, &PublicKey::from_der(vec![0])).unwrap();
            issued.push(key_name);
        }
        assert!(issued.iter().all(|k| k.last().unwrap().starts_with(b"ksk-")));

        let dsk = pib.new_key_name(&identity, false).unwrap();
        assert!(dsk.last().unwrap().starts_with(b"dsk-"), "{}", backend);
        assert_eq!(dsk.prefix(-1), identity);
    }
}

#[test]
fn test_tpm_locator_roundtrip() {
    for (backend, pib) in backends() {
        assert_eq!(pib.tpm_locator().unwrap(), None, "{}", backend);
        pib.set_tpm_locator("tpm-file:/a").unwrap();
        pib.set_tpm_locator("tpm-file:/b").unwrap();
        assert_eq!(pib.tpm_locator().unwrap().as_deref(), Some("tpm-file:/b"), "{}", backend);
    }
}

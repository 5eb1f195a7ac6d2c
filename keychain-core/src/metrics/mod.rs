//! Key chain metrics
//!
//! Counters and histograms are emitted through the `metrics` facade; without
//! an installed recorder they are no-ops. Binaries that want them install an
//! exporter of their choice before calling [`init_metrics`].

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

pub const IDENTITIES_CREATED: &str = "keychain.identities.created";
pub const IDENTITIES_DELETED: &str = "keychain.identities.deleted";
pub const IDENTITIES_IMPORTED: &str = "keychain.identities.imported";
pub const IDENTITIES_EXPORTED: &str = "keychain.identities.exported";
pub const KEYS_GENERATED: &str = "keychain.keys.generated";
pub const KEYS_DELETED: &str = "keychain.keys.deleted";
pub const CERTIFICATES_ISSUED: &str = "keychain.certificates.issued";
pub const SIGNATURES_CREATED: &str = "keychain.signatures.created";
pub const DIGEST_SIGNATURES_CREATED: &str = "keychain.signatures.digest";
pub const SIGN_DURATION_MS: &str = "keychain.sign.duration_ms";
pub const KEYGEN_DURATION_MS: &str = "keychain.keygen.duration_ms";

/// Register metric descriptions
pub fn init_metrics() {
    describe_counter!(IDENTITIES_CREATED, "Identities registered by create_identity");
    describe_counter!(IDENTITIES_DELETED, "Identities deleted");
    describe_counter!(IDENTITIES_IMPORTED, "Identities imported from secured bags");
    describe_counter!(IDENTITIES_EXPORTED, "Identities exported to secured bags");
    describe_counter!(KEYS_GENERATED, "Key pairs generated");
    describe_counter!(KEYS_DELETED, "Key pairs deleted");
    describe_counter!(CERTIFICATES_ISSUED, "Self-signed certificates issued");
    describe_counter!(SIGNATURES_CREATED, "Keyed signatures produced");
    describe_counter!(DIGEST_SIGNATURES_CREATED, "DigestSha256 signatures produced");
    describe_histogram!(SIGN_DURATION_MS, "Keyed signing duration in milliseconds");
    describe_histogram!(KEYGEN_DURATION_MS, "Key pair generation duration in milliseconds");
}

pub fn record_counter(name: &'static str, value: u64) {
    counter!(name).increment(value);
}

/// Records elapsed milliseconds into a histogram when stopped
pub struct Timer {
    name: &'static str,
    start: Instant,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            start: Instant::now(),
        }
    }

    pub fn stop(self) {
        histogram!(self.name).record(self.start.elapsed().as_secs_f64() * 1000.0);
    }
}

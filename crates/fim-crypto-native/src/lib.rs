//! Native [`CryptoCollaborator`] adapter: streaming CRC32/MD5/SHA-1
//! content hashing plus Ed25519 signing for the archive envelope
//! (spec.md §1, §4.5, §4.11).
//!
//! HAVAL is the fourth hash spec.md names; no maintained Rust crate
//! implements it, so [`NativeHasher`] reports it unsupported rather
//! than fabricating an implementation -- see DESIGN.md.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use md5::{Digest, Md5};
use rand::rngs::OsRng;
use sha1::Sha1;

use fim_types::{ContentHashResults, ContentHashSet, ContentHasher, CryptoCollaborator};

/// Accumulates CRC32/MD5/SHA-1 state across one streaming content pass.
struct NativeHasher {
    requested: ContentHashSet,
    crc32: crc32fast::Hasher,
    md5: Md5,
    sha1: Sha1,
}

impl ContentHasher for NativeHasher {
    fn update(&mut self, data: &[u8]) {
        if self.requested.contains(ContentHashSet::CRC32) {
            self.crc32.update(data);
        }
        if self.requested.contains(ContentHashSet::MD5) {
            Digest::update(&mut self.md5, data);
        }
        if self.requested.contains(ContentHashSet::SHA1) {
            Digest::update(&mut self.sha1, data);
        }
    }

    fn finish(self: Box<Self>) -> ContentHashResults {
        let NativeHasher { requested, crc32, md5, sha1 } = *self;
        ContentHashResults {
            crc32: requested.contains(ContentHashSet::CRC32).then(|| crc32.finalize().to_be_bytes()),
            md5: requested.contains(ContentHashSet::MD5).then(|| md5.finalize().into()),
            sha1: requested.contains(ContentHashSet::SHA1).then(|| sha1.finalize().into()),
            haval: None,
        }
    }
}

/// Native crypto collaborator: real hashing plus an Ed25519 keypair
/// used for both signing and self-verification (spec.md §4.11's
/// archive signature).
pub struct NativeCrypto {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl NativeCrypto {
    /// Generate a fresh signing keypair.
    #[must_use]
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();
        Self { signing_key, verifying_key }
    }

    /// Load a collaborator from raw Ed25519 key bytes (e.g. recovered
    /// from an envelope's stored key material).
    #[must_use]
    pub fn from_signing_key_bytes(bytes: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(bytes);
        let verifying_key = signing_key.verifying_key();
        Self { signing_key, verifying_key }
    }

    #[must_use]
    pub fn verifying_key_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }
}

impl CryptoCollaborator for NativeCrypto {
    fn hash_stream(&self, requested: ContentHashSet) -> Box<dyn ContentHasher> {
        Box::new(NativeHasher {
            requested,
            crc32: crc32fast::Hasher::new(),
            md5: Md5::new(),
            sha1: Sha1::new(),
        })
    }

    fn sign(&self, body: &[u8]) -> Vec<u8> {
        tracing::debug!(bytes = body.len(), "signing archive body");
        self.signing_key.sign(body).to_bytes().to_vec()
    }

    fn verify(&self, body: &[u8], signature: &[u8]) -> bool {
        let Ok(bytes) = <[u8; 64]>::try_from(signature) else {
            tracing::warn!(len = signature.len(), "signature has the wrong length");
            return false;
        };
        let ok = self.verifying_key.verify(body, &Signature::from_bytes(&bytes)).is_ok();
        if !ok {
            tracing::warn!("archive signature verification failed");
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let crypto = NativeCrypto::generate();
        let sig = crypto.sign(b"hello world");
        assert!(crypto.verify(b"hello world", &sig));
        assert!(!crypto.verify(b"tampered", &sig));
    }

    #[test]
    fn hasher_reports_only_requested_algorithms() {
        let crypto = NativeCrypto::generate();
        let mut hasher = crypto.hash_stream(ContentHashSet::MD5);
        hasher.update(b"0123456789");
        let results = hasher.finish();

        assert!(results.md5.is_some());
        assert!(results.crc32.is_none());
        assert!(results.sha1.is_none());
        assert!(results.haval.is_none());
    }

    #[test]
    fn crc32_matches_a_known_vector() {
        let crypto = NativeCrypto::generate();
        let mut hasher = crypto.hash_stream(ContentHashSet::CRC32);
        hasher.update(b"123456789");
        let results = hasher.finish();
        assert_eq!(results.crc32, Some(0xCBF4_3926_u32.to_be_bytes()));
    }

    #[test]
    fn from_signing_key_bytes_reproduces_the_same_verifying_key() {
        let a = NativeCrypto::generate();
        let bytes = a.signing_key.to_bytes();
        let b = NativeCrypto::from_signing_key_bytes(&bytes);
        assert_eq!(a.verifying_key_bytes(), b.verifying_key_bytes());
    }
}

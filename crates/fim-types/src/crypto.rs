//! The narrow crypto collaborator interface (spec.md §1, §6).
//!
//! The core never inspects key material directly; it calls through
//! [`CryptoCollaborator`] for signing, signature verification, and the
//! four streaming content hashers. Real implementations live in the
//! `fim-crypto-native` adapter crate; the core and its tests only see
//! this trait.

use bitflags::bitflags;

bitflags! {
    /// Which content hashes a calculator pass should compute.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ContentHashSet: u8 {
        const CRC32 = 0b0001;
        const MD5   = 0b0010;
        const SHA1  = 0b0100;
        const HAVAL = 0b1000;
    }
}

/// Digest outputs from one streaming pass, one field per requested hash.
#[derive(Debug, Clone, Default)]
pub struct ContentHashResults {
    pub crc32: Option<[u8; 4]>,
    pub md5: Option<[u8; 16]>,
    pub sha1: Option<[u8; 20]>,
    /// `None` if the collaborator does not implement HAVAL (spec.md
    /// §1 scopes the hash primitive itself out of the core; HAVAL has
    /// no maintained Rust crate, so `fim-crypto-native` reports it
    /// unsupported rather than fabricating an implementation -- see
    /// DESIGN.md).
    pub haval: Option<Vec<u8>>,
}

/// A single streaming pass over an object's content that updates every
/// requested hash in parallel (spec.md §4.5 step 5).
pub trait ContentHasher {
    fn update(&mut self, data: &[u8]);
    fn finish(self: Box<Self>) -> ContentHashResults;
}

/// Opaque handle to a private signing key. The core never inspects its
/// bytes; it is only ever passed back to the collaborator.
pub trait PrivateKeyHandle {}

/// The crypto collaborator: hashing plus asymmetric signing for the
/// archive envelope (spec.md §4.11).
pub trait CryptoCollaborator {
    fn hash_stream(&self, requested: ContentHashSet) -> Box<dyn ContentHasher>;

    /// Sign `body` with the collaborator's private key.
    fn sign(&self, body: &[u8]) -> Vec<u8>;

    /// Verify `signature` over `body` against the collaborator's public key.
    fn verify(&self, body: &[u8], signature: &[u8]) -> bool;
}

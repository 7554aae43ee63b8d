//! Public facade: wires the native filesystem and crypto adapters to
//! the baseline/check/policy-update entry points behind one [`Engine`]
//! type (spec.md §1, §2).
//!
//! Configuration parsing, CLI argument handling, and report rendering
//! stay out of scope (spec.md §1's "Explicitly OUT OF SCOPE"); this
//! crate only assembles already-parsed [`SpecList`]s, a [`Genre`], and
//! the two native collaborators into a working pipeline.

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use fim_db::{Database, DatabaseIterator};
use fim_envelope::{Envelope, HeaderId};
use fim_error::{ErrorBucket, Result};
use fim_policy_ast::SpecList;
use fim_types::{CryptoCollaborator, Genre, Verbosity};

use fim_calculator::PropertyCalculator;
use fim_crypto_native::NativeCrypto;
use fim_datasource::{FilesystemIterator, IterFlags};
use fim_fs_native::NativeFs;
use fim_pipeline::{IntegrityCheckFlags, PolicyUpdateFlags, Report};

/// The on-disk format version for a serialized database envelope.
/// Bumped whenever [`Database::serialize`]'s framing changes.
pub const DATABASE_FORMAT_VERSION: u32 = 1;

/// The outcome of [`Engine::generate_baseline`]: the freshly populated
/// database plus any non-fatal errors encountered along the way.
pub struct BaselineOutcome {
    pub database: Rc<RefCell<Database>>,
    pub errors: ErrorBucket,
    pub objects_scanned: usize,
}

/// Ties the native filesystem and crypto collaborators to the L4
/// pipeline entry points. Holds no mutable state of its own -- every
/// call is independently parameterized by the spec list and database
/// it operates on, matching the teacher's "engine wraps stateless
/// collaborators" facade shape.
pub struct Engine {
    fs: NativeFs,
    crypto: NativeCrypto,
    verbosity: Verbosity,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(NativeFs::new(), NativeCrypto::generate())
    }
}

impl Engine {
    #[must_use]
    pub fn new(fs: NativeFs, crypto: NativeCrypto) -> Self {
        Self { fs, crypto, verbosity: Verbosity::default() }
    }

    /// Set the verbosity governing how many informational (non-error)
    /// notices the engine emits through `tracing` (spec.md §7).
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Build an engine whose signing key is recovered from raw bytes,
    /// so a previously persisted database can be re-opened and
    /// re-verified across process restarts.
    #[must_use]
    pub fn with_signing_key(signing_key_bytes: &[u8; 32]) -> Self {
        Self::new(NativeFs::new(), NativeCrypto::from_signing_key_bytes(signing_key_bytes))
    }

    #[must_use]
    pub fn verifying_key_bytes(&self) -> [u8; 32] {
        self.crypto.verifying_key_bytes()
    }

    /// Walk every rule's start-point on the live filesystem and store
    /// a fresh database (spec.md §4.9).
    #[tracing::instrument(skip_all, fields(genre = genre.name()))]
    #[must_use]
    pub fn generate_baseline(&self, spec: &SpecList, genre: Genre) -> BaselineOutcome {
        if self.verbosity == Verbosity::Verbose {
            tracing::debug!(rules = spec.rules().len(), "starting baseline generation");
        }
        let calc = PropertyCalculator::new(&self.fs, &self.crypto);
        let database = Rc::new(RefCell::new(Database::new(genre, DATABASE_FORMAT_VERSION)));
        let mut db_iter = DatabaseIterator::new(Rc::clone(&database), genre);
        let mut fs_iter = FilesystemIterator::new(&self.fs, genre, IterFlags::empty());
        let mut errors = ErrorBucket::new();

        let objects_scanned =
            fim_pipeline::generate_baseline(spec, &mut fs_iter, &mut db_iter, &calc, &mut errors);
        if self.verbosity >= Verbosity::Normal {
            tracing::info!(objects_scanned, errors = errors.len(), "baseline generated");
        }

        BaselineOutcome { database, errors, objects_scanned }
    }

    /// Compare `database` against the live filesystem for every rule in
    /// `spec`, producing an added/removed/changed report (spec.md §4.9).
    #[tracing::instrument(skip_all, fields(genre = genre.name()))]
    #[must_use]
    pub fn check_integrity(
        &self,
        spec: &SpecList,
        genre: Genre,
        database: &Rc<RefCell<Database>>,
        flags: IntegrityCheckFlags,
    ) -> Report {
        if self.verbosity == Verbosity::Verbose {
            tracing::debug!(rules = spec.rules().len(), "starting integrity check");
        }
        let calc = PropertyCalculator::new(&self.fs, &self.crypto);
        let mut db_iter = DatabaseIterator::new(Rc::clone(database), genre);
        let mut fs_iter = FilesystemIterator::new(&self.fs, genre, IterFlags::empty());
        let mut report = Report::new();

        fim_pipeline::check_integrity(spec, genre, &mut db_iter, &mut fs_iter, &calc, flags, &mut report);
        if self.verbosity >= Verbosity::Normal {
            tracing::info!(
                added = report.added.len(),
                removed = report.removed.len(),
                changed = report.changed.len(),
                "integrity check complete"
            );
        }
        report
    }

    /// Reconcile `database` (baselined under `old_spec`) against
    /// `new_spec`: classify every added/removed/changed FCO, refresh
    /// covered nodes, and prune nodes no rule covers any more (spec.md
    /// §4.9, §4.7).
    #[tracing::instrument(skip_all, fields(genre = genre.name()))]
    #[must_use]
    pub fn update_policy(
        &self,
        old_spec: &SpecList,
        new_spec: &SpecList,
        genre: Genre,
        database: &Rc<RefCell<Database>>,
        flags: PolicyUpdateFlags,
    ) -> Report {
        if self.verbosity == Verbosity::Verbose {
            tracing::debug!(rules = new_spec.rules().len(), "starting policy update");
        }
        let calc = PropertyCalculator::new(&self.fs, &self.crypto);
        let mut db_iter = DatabaseIterator::new(Rc::clone(database), genre);
        let mut fs_iter = FilesystemIterator::new(&self.fs, genre, IterFlags::empty());
        let mut report = Report::new();

        fim_pipeline::update_policy(old_spec, new_spec, genre, &mut db_iter, &mut fs_iter, &calc, flags, &mut report);
        if self.verbosity >= Verbosity::Normal {
            tracing::info!(
                added = report.added.len(),
                removed = report.removed.len(),
                changed = report.changed.len(),
                errors = report.errors.len(),
                "policy update complete"
            );
        }
        report
    }

    /// Serialize and sign `database`, writing it to `path` wrapped in
    /// the archive envelope (spec.md §4.10-4.11).
    pub fn save_database(&self, database: &Database, path: &Path) -> Result<()> {
        let envelope = Envelope::new(HeaderId::Database, DATABASE_FORMAT_VERSION, Vec::new(), database.serialize());
        std::fs::write(path, envelope.write_signed(&self.crypto))?;
        Ok(())
    }

    /// Read back a database previously written by [`Self::save_database`],
    /// verifying its signature before trusting the bytes.
    pub fn load_database(&self, genre: Genre, path: &Path) -> Result<Database> {
        let bytes = std::fs::read(path)?;
        let envelope = Envelope::read(&bytes, DATABASE_FORMAT_VERSION, &self.crypto)?;
        Database::deserialize(genre, &envelope.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fim_policy_ast::{Rule, StopPolicy};
    use fim_fco::PropertyVector;
    use fim_name::Name;

    fn unbounded() -> StopPolicy {
        StopPolicy::StopPoints { stop_points: Vec::new(), max_depth: None }
    }

    fn spec_covering_root() -> SpecList {
        let rule = Rule::new(Name::root(Genre::Fs), unbounded(), PropertyVector::new());
        SpecList::new(vec![rule]).unwrap()
    }

    #[test]
    fn baseline_then_check_on_an_untouched_tree_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();

        let engine = Engine::default();
        let rule = Rule::new(
            Name::from_raw(Genre::Fs, dir.path().to_str().unwrap().as_bytes()),
            unbounded(),
            PropertyVector::new(),
        );
        let spec = SpecList::new(vec![rule]).unwrap();

        let baseline = engine.generate_baseline(&spec, Genre::Fs);
        assert!(baseline.errors.is_empty());

        let report = engine.check_integrity(&spec, Genre::Fs, &baseline.database, IntegrityCheckFlags::empty());
        assert!(report.is_clean());
    }

    #[test]
    fn save_and_load_database_round_trips_and_verifies_signature() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::default();
        let spec = spec_covering_root();
        let baseline = engine.generate_baseline(&spec, Genre::Fs);

        let path = dir.path().join("db.fim");
        engine.save_database(&baseline.database.borrow(), &path).unwrap();

        let loaded = engine.load_database(Genre::Fs, &path).unwrap();
        assert_eq!(loaded.serialize(), baseline.database.borrow().serialize());
    }

    #[test]
    fn load_database_rejects_a_tampered_file() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::default();
        let spec = spec_covering_root();
        let baseline = engine.generate_baseline(&spec, Genre::Fs);

        let path = dir.path().join("db.fim");
        engine.save_database(&baseline.database.borrow(), &path).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();

        assert!(engine.load_database(Genre::Fs, &path).is_err());
    }
}

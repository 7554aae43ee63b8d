//! The property calculator: a visitor keyed by a request vector that
//! populates a subset of an FCO's properties, consulting the narrow
//! filesystem and crypto collaborators (spec.md §4.5).

use bitflags::bitflags;

use fim_datasource::{ContentReader, FsCollaborator, StatInfo};
use fim_error::{CalculatorError, ErrorBucket, FimError, Result};
use fim_fco::{fs_prop, Fco, FileType, PropertyValue, PropertyVector};
use fim_name::to_api;
use fim_types::{ContentHashSet, CryptoCollaborator};

/// How the calculator treats a property that is already valid on the
/// target FCO (spec.md §4.5 step 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollidePolicy {
    /// Recompute and replace the existing value.
    Overwrite,
    /// Narrow the effective request to properties not already valid.
    Leave,
}

impl Default for CollidePolicy {
    fn default() -> Self {
        CollidePolicy::Leave
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CalcFlags: u32 {
        /// Bypass the OS page cache when reading content.
        const DIRECT_IO = 0b0001;
        /// Forbid observable side effects (access-time preservation).
        const DO_NOT_MODIFY_PROPERTIES = 0b0010;
    }
}

fn stat_backed_mask() -> PropertyVector {
    use fs_prop::*;
    [DEV, RDEV, INO, MODE, NLINK, UID, GID, SIZE, ATIME, MTIME, CTIME, BLKSIZE, BLOCKS, FILE_TYPE]
        .into_iter()
        .collect()
}

fn content_backed_mask() -> PropertyVector {
    use fs_prop::*;
    [CRC32, MD5, SHA1, HAVAL].into_iter().collect()
}

/// Content-backed properties are only meaningful for objects whose
/// bytes can be read as a single stream: regular files and symlinks
/// (the resolved target). Directories and special files never measure
/// content properties, regardless of what was requested.
fn measurable_for(file_type: FileType) -> PropertyVector {
    let mut m = stat_backed_mask();
    if matches!(file_type, FileType::RegularFile | FileType::Symlink) {
        m = m.union(&content_backed_mask());
    }
    m
}

fn stat_value(index: usize, stat: &StatInfo) -> PropertyValue {
    use fs_prop::*;
    match index {
        DEV => PropertyValue::Int(stat.dev),
        RDEV => PropertyValue::Int(stat.rdev),
        INO => PropertyValue::Long(stat.ino),
        MODE => PropertyValue::Int(stat.mode),
        NLINK => PropertyValue::Int(stat.nlink),
        UID => PropertyValue::Int(stat.uid),
        GID => PropertyValue::Int(stat.gid),
        SIZE => PropertyValue::Long(stat.size),
        ATIME => PropertyValue::Long(stat.atime),
        MTIME => PropertyValue::Long(stat.mtime),
        CTIME => PropertyValue::Long(stat.ctime),
        BLKSIZE => PropertyValue::Int(stat.blksize),
        BLOCKS => PropertyValue::Int(stat.blocks),
        FILE_TYPE => PropertyValue::FileType(stat.file_type),
        _ => unreachable!("index {index} is not stat-backed"),
    }
}

fn content_hash_bit(index: usize) -> ContentHashSet {
    match index {
        fs_prop::CRC32 => ContentHashSet::CRC32,
        fs_prop::MD5 => ContentHashSet::MD5,
        fs_prop::SHA1 => ContentHashSet::SHA1,
        fs_prop::HAVAL => ContentHashSet::HAVAL,
        _ => ContentHashSet::empty(),
    }
}

/// Visits FCOs, filling in a requested subset of properties per
/// spec.md §4.5's six-step algorithm.
pub struct PropertyCalculator<'a, F, C> {
    fs: &'a F,
    crypto: &'a C,
}

impl<'a, F: FsCollaborator, C: CryptoCollaborator> PropertyCalculator<'a, F, C> {
    #[must_use]
    pub fn new(fs: &'a F, crypto: &'a C) -> Self {
        Self { fs, crypto }
    }

    /// Populate `fco.props` for the properties in `request`, routing
    /// every failure to `errors` rather than returning it (spec.md
    /// §4.5: "all failures are routed to the error bucket, never
    /// thrown past the visitor").
    pub fn calculate(
        &self,
        fco: &mut Fco,
        request: &PropertyVector,
        collide: CollidePolicy,
        flags: CalcFlags,
        errors: &mut ErrorBucket,
    ) {
        let display = fim_name::to_string_display(&fco.name);

        let stat = match self.fs.stat(&to_api(&fco.name)) {
            Ok(s) => s,
            Err(e) => {
                errors.push(
                    CalculatorError::StatFailed(display.clone()).to_string_with(&e),
                    Some(display),
                    false,
                );
                for i in request.iter() {
                    fco.props.set_undefined(i);
                }
                return;
            }
        };

        let mut effective = request.intersection(&measurable_for(stat.file_type));
        if collide == CollidePolicy::Leave {
            effective = effective.difference(fco.props.valid());
        }

        let want_stat = effective.intersection(&stat_backed_mask());
        let want_content = effective.intersection(&content_backed_mask());

        for i in want_stat.iter() {
            fco.props.set(i, stat_value(i, &stat));
        }

        if want_content.is_empty() {
            return;
        }

        if !matches!(stat.file_type, FileType::RegularFile | FileType::Symlink) {
            for i in want_content.iter() {
                fco.props.set_undefined(i);
            }
            return;
        }

        match self.stream_content_hashes(fco, &stat, &want_content, flags) {
            Ok(results) => {
                if want_content.contains(fs_prop::CRC32) {
                    set_hash_result(fco, fs_prop::CRC32, results.crc32.map(|b| b.to_vec()));
                }
                if want_content.contains(fs_prop::MD5) {
                    set_hash_result(fco, fs_prop::MD5, results.md5.map(|b| b.to_vec()));
                }
                if want_content.contains(fs_prop::SHA1) {
                    set_hash_result(fco, fs_prop::SHA1, results.sha1.map(|b| b.to_vec()));
                }
                if want_content.contains(fs_prop::HAVAL) {
                    set_hash_result(fco, fs_prop::HAVAL, results.haval);
                }
            }
            Err(e) => {
                errors.push(e.to_string(), Some(fim_name::to_string_display(&fco.name)), false);
                for i in want_content.iter() {
                    fco.props.set_undefined(i);
                }
            }
        }
    }

    fn stream_content_hashes(
        &self,
        fco: &Fco,
        stat: &StatInfo,
        want_content: &PropertyVector,
        flags: CalcFlags,
    ) -> Result<fim_types::ContentHashResults> {
        let requested: ContentHashSet = want_content
            .iter()
            .fold(ContentHashSet::empty(), |acc, i| acc | content_hash_bit(i));
        let mut hasher = self.crypto.hash_stream(requested);

        if stat.file_type == FileType::Symlink {
            let target = self
                .fs
                .read_symlink(&to_api(&fco.name))
                .map_err(|_| CalculatorError::SymlinkReadFailed(fim_name::to_string_display(&fco.name)))?;
            hasher.update(&target);
            return Ok(hasher.finish());
        }

        let direct_io = flags.contains(CalcFlags::DIRECT_IO);
        let mut reader = self
            .fs
            .open_for_read(&to_api(&fco.name), direct_io)
            .map_err(|_| CalculatorError::OpenFailed(fim_name::to_string_display(&fco.name)))?;

        let mut buf = [0_u8; 64 * 1024];
        loop {
            let n = reader
                .read(&mut buf)
                .map_err(|_| CalculatorError::HashStreamFailed(fim_name::to_string_display(&fco.name)))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        if flags.contains(CalcFlags::DO_NOT_MODIFY_PROPERTIES) {
            let _ = self.fs.restore_atime(&to_api(&fco.name), stat.atime);
        }

        Ok(hasher.finish())
    }
}

fn set_hash_result(fco: &mut Fco, index: usize, value: Option<Vec<u8>>) {
    match value {
        Some(bytes) => fco.props.set(index, PropertyValue::Bytes(bytes)),
        None => fco.props.set_undefined(index),
    }
}

trait ErrorWithContext {
    fn to_string_with(&self, cause: &FimError) -> String;
}

impl ErrorWithContext for CalculatorError {
    fn to_string_with(&self, cause: &FimError) -> String {
        format!("{self}: {cause}")
    }
}

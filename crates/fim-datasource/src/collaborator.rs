//! The narrow filesystem collaborator interface (spec.md §6).
//!
//! The core never calls `stat`/`open`/`read` directly; it goes through
//! this trait, so the pipeline and calculator are testable against a
//! fake without touching the real filesystem.

use fim_error::Result;
use fim_fco::FileType;

/// The fields a single `stat` call yields (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatInfo {
    pub dev: i32,
    pub rdev: i32,
    pub ino: i64,
    pub mode: i32,
    pub nlink: i32,
    pub uid: i32,
    pub gid: i32,
    pub size: i64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub blksize: i32,
    pub blocks: i32,
    pub file_type: FileType,
}

/// Read access to the object's content, already positioned at offset 0.
pub trait ContentReader {
    /// Read up to `buf.len()` bytes; `0` signals EOF.
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
}

/// The external collaborator the core consults for raw filesystem
/// services (spec.md §1, §6). Implemented by `fim-fs-native` for real
/// use and by in-memory fakes in tests.
pub trait FsCollaborator {
    /// `stat`-equivalent metadata for `path` (raw bytes, not resolving
    /// symlinks beyond what the OS's `lstat` semantics provide).
    fn stat(&self, path: &[u8]) -> Result<StatInfo>;

    /// Open `path` for sequential reads. `direct_io` requests bypassing
    /// the OS page cache where supported (spec.md §4.5's `DIRECT_IO`).
    fn open_for_read(&self, path: &[u8], direct_io: bool) -> Result<Box<dyn ContentReader>>;

    /// The raw target bytes of a symlink, without modifying its atime
    /// where the platform allows.
    fn read_symlink(&self, path: &[u8]) -> Result<Vec<u8>>;

    /// Short names of `path`'s children, sorted (spec.md §4.4).
    fn list_dir(&self, path: &[u8]) -> Result<Vec<Vec<u8>>>;

    /// Best-effort reset of `path`'s access time to `atime`, used after
    /// an operation that would otherwise bump it (a content read, a
    /// directory listing) when the caller asked atimes be left alone
    /// (spec.md §4.4's `DO_NOT_MODIFY_OBJECTS`, §4.5's
    /// `DO_NOT_MODIFY_PROPERTIES`). Platforms or collaborators that
    /// cannot restore atime may no-op; callers treat this as advisory
    /// and do not fail the surrounding operation on its error.
    fn restore_atime(&self, _path: &[u8], _atime: i64) -> Result<()> {
        Ok(())
    }
}

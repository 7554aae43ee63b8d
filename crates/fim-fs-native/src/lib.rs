//! Native [`FsCollaborator`]: real `stat`/`open`/`readlink`/`readdir`
//! against the host filesystem (spec.md §1, §6).

use std::fs::{self, File};
use std::io;
use std::path::Path;

use fim_datasource::{ContentReader, FsCollaborator, StatInfo};
use fim_error::{FimError, Result};
use fim_fco::FileType;

fn to_path(raw: &[u8]) -> Result<&Path> {
    std::str::from_utf8(raw)
        .map(Path::new)
        .map_err(|e| FimError::Io(format!("non-UTF-8 path: {e}")))
}

#[cfg(unix)]
fn file_type_of(meta: &fs::Metadata) -> FileType {
    use std::os::unix::fs::FileTypeExt;
    let ft = meta.file_type();
    if ft.is_dir() {
        FileType::Directory
    } else if ft.is_symlink() {
        FileType::Symlink
    } else if ft.is_block_device() {
        FileType::BlockDevice
    } else if ft.is_char_device() {
        FileType::CharDevice
    } else if ft.is_fifo() {
        FileType::Fifo
    } else if ft.is_socket() {
        FileType::Socket
    } else if ft.is_file() {
        FileType::RegularFile
    } else {
        FileType::Unknown
    }
}

#[cfg(not(unix))]
fn file_type_of(meta: &fs::Metadata) -> FileType {
    let ft = meta.file_type();
    if ft.is_dir() {
        FileType::Directory
    } else if ft.is_symlink() {
        FileType::Symlink
    } else if ft.is_file() {
        FileType::RegularFile
    } else {
        FileType::Unknown
    }
}

#[cfg(unix)]
fn stat_info(meta: &fs::Metadata) -> StatInfo {
    use std::os::unix::fs::MetadataExt;
    StatInfo {
        dev: meta.dev() as i32,
        rdev: meta.rdev() as i32,
        ino: meta.ino() as i64,
        mode: meta.mode() as i32,
        nlink: meta.nlink() as i32,
        uid: meta.uid() as i32,
        gid: meta.gid() as i32,
        size: meta.size() as i64,
        atime: meta.atime(),
        mtime: meta.mtime(),
        ctime: meta.ctime(),
        blksize: meta.blksize() as i32,
        blocks: meta.blocks() as i32,
        file_type: file_type_of(meta),
    }
}

#[cfg(not(unix))]
fn stat_info(meta: &fs::Metadata) -> StatInfo {
    StatInfo {
        dev: 0,
        rdev: 0,
        ino: 0,
        mode: 0,
        nlink: 1,
        uid: 0,
        gid: 0,
        size: meta.len() as i64,
        atime: 0,
        mtime: 0,
        ctime: 0,
        blksize: 4096,
        blocks: 0,
        file_type: file_type_of(meta),
    }
}

/// Wraps a [`File`] to satisfy [`ContentReader`].
struct NativeContentReader(File);

impl ContentReader for NativeContentReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        use std::io::Read;
        self.0.read(buf)
    }
}

/// Real filesystem collaborator. Holds no state: every call resolves
/// directly against the OS, so one instance can be shared across
/// concurrent reads.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeFs;

impl NativeFs {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl FsCollaborator for NativeFs {
    fn stat(&self, path: &[u8]) -> Result<StatInfo> {
        let path = to_path(path)?;
        let meta = fs::symlink_metadata(path)
            .map_err(|e| FimError::Io(format!("stat {}: {e}", path.display())))?;
        Ok(stat_info(&meta))
    }

    fn open_for_read(&self, path: &[u8], direct_io: bool) -> Result<Box<dyn ContentReader>> {
        let path = to_path(path)?;
        let file = open_with_flags(path, direct_io)
            .map_err(|e| FimError::Io(format!("open {}: {e}", path.display())))?;
        Ok(Box::new(NativeContentReader(file)))
    }

    fn read_symlink(&self, path: &[u8]) -> Result<Vec<u8>> {
        let path = to_path(path)?;
        let target = fs::read_link(path)
            .map_err(|e| FimError::Io(format!("readlink {}: {e}", path.display())))?;
        Ok(to_path_bytes(&target))
    }

    fn list_dir(&self, path: &[u8]) -> Result<Vec<Vec<u8>>> {
        let path = to_path(path)?;
        let mut names = Vec::new();
        for entry in
            fs::read_dir(path).map_err(|e| FimError::Io(format!("readdir {}: {e}", path.display())))?
        {
            let entry = entry.map_err(|e| FimError::Io(format!("readdir {}: {e}", path.display())))?;
            names.push(to_path_bytes(Path::new(&entry.file_name())));
        }
        Ok(names)
    }

    fn restore_atime(&self, path: &[u8], atime: i64) -> Result<()> {
        let path = to_path(path)?;
        let when = filetime::FileTime::from_unix_time(atime, 0);
        filetime::set_file_atime(path, when)
            .map_err(|e| FimError::Io(format!("restore atime {}: {e}", path.display())))
    }
}

#[cfg(unix)]
fn to_path_bytes(path: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[cfg(not(unix))]
fn to_path_bytes(path: &Path) -> Vec<u8> {
    path.to_string_lossy().into_owned().into_bytes()
}

#[cfg(unix)]
fn open_with_flags(path: &Path, direct_io: bool) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    let mut opts = fs::OpenOptions::new();
    opts.read(true);
    if direct_io {
        // O_DIRECT is Linux-only; other unixes fall through to a
        // regular cached open rather than failing the request.
        #[cfg(target_os = "linux")]
        opts.custom_flags(libc::O_DIRECT);
    }
    opts.open(path).or_else(|e| {
        if direct_io {
            tracing::debug!(error = %e, path = %path.display(), "direct I/O open failed, retrying cached");
            fs::OpenOptions::new().read(true).open(path)
        } else {
            Err(e)
        }
    })
}

#[cfg(not(unix))]
fn open_with_flags(path: &Path, _direct_io: bool) -> io::Result<File> {
    fs::OpenOptions::new().read(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn stat_reports_regular_file_and_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, b"hello").unwrap();

        let fs_collab = NativeFs::new();
        let info = fs_collab.stat(path.to_str().unwrap().as_bytes()).unwrap();
        assert_eq!(info.file_type, FileType::RegularFile);
        assert_eq!(info.size, 5);
    }

    #[test]
    fn stat_reports_directory() {
        let dir = tempfile::tempdir().unwrap();
        let fs_collab = NativeFs::new();
        let info = fs_collab.stat(dir.path().to_str().unwrap().as_bytes()).unwrap();
        assert_eq!(info.file_type, FileType::Directory);
    }

    #[test]
    fn list_dir_lists_children() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b"), b"").unwrap();
        fs::write(dir.path().join("a"), b"").unwrap();

        let fs_collab = NativeFs::new();
        let mut names = fs_collab.list_dir(dir.path().to_str().unwrap().as_bytes()).unwrap();
        names.sort();
        assert_eq!(names, vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn open_for_read_reads_content_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.txt");
        fs::write(&path, b"content").unwrap();

        let fs_collab = NativeFs::new();
        let mut reader = fs_collab.open_for_read(path.to_str().unwrap().as_bytes(), false).unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4];
        loop {
            let n = reader.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        assert_eq!(buf, b"content");
    }

    #[cfg(unix)]
    #[test]
    fn read_symlink_returns_raw_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target.txt");
        fs::write(&target, b"x").unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let fs_collab = NativeFs::new();
        let info = fs_collab.stat(link.to_str().unwrap().as_bytes()).unwrap();
        assert_eq!(info.file_type, FileType::Symlink);

        let resolved = fs_collab.read_symlink(link.to_str().unwrap().as_bytes()).unwrap();
        assert_eq!(resolved, to_path_bytes(&target));
    }

    #[test]
    fn stat_of_missing_path_is_an_error() {
        let fs_collab = NativeFs::new();
        assert!(fs_collab.stat(b"/no/such/path/hopefully").is_err());
    }
}

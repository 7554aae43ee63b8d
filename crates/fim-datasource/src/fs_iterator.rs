//! The live filesystem's [`DataSourceIterator`] implementation.

use std::cmp::Ordering;

use fim_error::{FimError, Result};
use fim_fco::{fs_prop, Capabilities, Fco, FileType, PropertySet, PropertyValue};
use fim_name::{to_api, to_string_display, Name};
use fim_types::Genre;

use crate::collaborator::FsCollaborator;
use crate::iterator::{DataSourceIterator, IterFlags, SharedErrorBucket};

struct Level {
    /// The directory this level lists (the parent of every entry).
    own_name: Name,
    entries: Vec<Name>,
    idx: usize,
}

/// Walks the live filesystem in name-sorted order, case-sensitivity per
/// genre (spec.md §4.4).
pub struct FilesystemIterator<'c, C: FsCollaborator> {
    collab: &'c C,
    genre: Genre,
    flags: IterFlags,
    levels: Vec<Level>,
    error_bucket: Option<SharedErrorBucket>,
}

impl<'c, C: FsCollaborator> FilesystemIterator<'c, C> {
    #[must_use]
    pub fn new(collab: &'c C, genre: Genre, flags: IterFlags) -> Self {
        Self {
            collab,
            genre,
            flags,
            levels: Vec::new(),
            error_bucket: None,
        }
    }

    #[must_use]
    pub fn flags(&self) -> IterFlags {
        self.flags
    }

    fn report_error(&self, message: impl Into<String>, object: Option<&Name>) {
        if let Some(bucket) = &self.error_bucket {
            bucket.borrow_mut().push(
                message,
                object.map(to_string_display),
                false,
            );
        }
    }

    fn stat_current(&self, name: &Name) -> Result<crate::collaborator::StatInfo> {
        self.collab.stat(&to_api(name))
    }
}

impl<'c, C: FsCollaborator> DataSourceIterator for FilesystemIterator<'c, C> {
    fn seek_to(&mut self, name: &Name) {
        self.levels.clear();
        let parent = name.popped().unwrap_or_else(|| Name::root(self.genre));
        let exists = self.collab.stat(&to_api(name)).is_ok();
        let entries = if exists { vec![name.clone()] } else { Vec::new() };
        self.levels.push(Level {
            own_name: parent,
            entries,
            idx: 0,
        });
    }

    fn done(&self) -> bool {
        self.get_name().is_none()
    }

    fn next(&mut self) {
        if let Some(level) = self.levels.last_mut() {
            level.idx += 1;
        }
    }

    fn can_descend(&self) -> bool {
        match self.get_name() {
            Some(name) => matches!(
                self.stat_current(&name).map(|s| s.file_type),
                Ok(FileType::Directory)
            ),
            None => false,
        }
    }

    fn descend(&mut self) {
        let Some(cur) = self.get_name() else {
            self.levels.push(Level {
                own_name: self
                    .levels
                    .last()
                    .map(|l| l.own_name.clone())
                    .unwrap_or_else(|| Name::root(self.genre)),
                entries: Vec::new(),
                idx: 0,
            });
            return;
        };

        let pre_listing_atime = if self.flags.contains(IterFlags::DO_NOT_MODIFY_OBJECTS) {
            self.stat_current(&cur).ok().map(|s| s.atime)
        } else {
            None
        };

        let children = match self.collab.list_dir(&to_api(&cur)) {
            Ok(mut v) => {
                v.sort();
                v
            }
            Err(e) => {
                self.report_error(format!("could not list directory: {e}"), Some(&cur));
                Vec::new()
            }
        };

        if let Some(atime) = pre_listing_atime {
            let _ = self.collab.restore_atime(&to_api(&cur), atime);
        }

        let entries: Vec<Name> = children.iter().map(|c| cur.pushed(c)).collect();
        self.levels.push(Level {
            own_name: cur,
            entries,
            idx: 0,
        });
    }

    fn ascend(&mut self) -> bool {
        if self.levels.len() <= 1 {
            return false;
        }
        self.levels.pop();
        true
    }

    fn at_root(&self) -> bool {
        self.levels.len() <= 1
    }

    fn get_name(&self) -> Option<Name> {
        let level = self.levels.last()?;
        level.entries.get(level.idx).cloned()
    }

    fn get_parent_name(&self) -> Name {
        self.levels
            .last()
            .map(|l| l.own_name.clone())
            .unwrap_or_else(|| Name::root(self.genre))
    }

    fn get_short_name(&self) -> Option<Vec<u8>> {
        self.get_name().and_then(|n| n.short_name().map(<[u8]>::to_vec))
    }

    fn create_fco(&self) -> Result<Fco> {
        let name = self
            .get_name()
            .ok_or_else(|| FimError::Internal("create_fco called while done".into()))?;
        let stat = self.stat_current(&name)?;
        let mut props = PropertySet::new(self.genre);
        props.set(fs_prop::FILE_TYPE, PropertyValue::FileType(stat.file_type));
        let caps = if stat.file_type == FileType::Directory {
            Capabilities::CAN_HAVE_CHILDREN
        } else {
            Capabilities::empty()
        };
        Ok(Fco::new(name, caps, props))
    }

    fn set_error_bucket(&mut self, bucket: SharedErrorBucket) {
        self.error_bucket = Some(bucket);
    }

    fn relationship(&self, other: &Self) -> Ordering {
        match (self.get_name(), other.get_name()) {
            (Some(a), Some(b)) => a.compare_short_name(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborator::{ContentReader, StatInfo};
    use std::collections::BTreeMap;

    struct FakeFs {
        // path (as display string) -> (is_dir, children)
        dirs: BTreeMap<String, Vec<String>>,
    }

    impl FsCollaborator for FakeFs {
        fn stat(&self, path: &[u8]) -> Result<StatInfo> {
            let p = String::from_utf8_lossy(path).to_string();
            if self.dirs.contains_key(&p) || p == "/" {
                Ok(fake_stat(FileType::Directory))
            } else {
                // Treat any path whose parent dir is known and whose
                // basename appears in its child list as a regular file.
                let (parent, base) = p.rsplit_once('/').unwrap_or(("", &p));
                let parent = if parent.is_empty() { "/" } else { parent };
                if self
                    .dirs
                    .get(parent)
                    .is_some_and(|kids| kids.iter().any(|k| k == base))
                {
                    Ok(fake_stat(FileType::RegularFile))
                } else {
                    Err(FimError::Io("not found".into()))
                }
            }
        }

        fn open_for_read(&self, _path: &[u8], _direct_io: bool) -> Result<Box<dyn ContentReader>> {
            Err(FimError::Io("unsupported in fake".into()))
        }

        fn read_symlink(&self, _path: &[u8]) -> Result<Vec<u8>> {
            Err(FimError::Io("unsupported in fake".into()))
        }

        fn list_dir(&self, path: &[u8]) -> Result<Vec<Vec<u8>>> {
            let p = String::from_utf8_lossy(path).to_string();
            Ok(self
                .dirs
                .get(&p)
                .map(|kids| kids.iter().map(|k| k.as_bytes().to_vec()).collect())
                .unwrap_or_default())
        }
    }

    fn fake_stat(file_type: FileType) -> StatInfo {
        StatInfo {
            dev: 0,
            rdev: 0,
            ino: 0,
            mode: 0,
            nlink: 1,
            uid: 0,
            gid: 0,
            size: 0,
            atime: 0,
            mtime: 0,
            ctime: 0,
            blksize: 4096,
            blocks: 0,
            file_type,
        }
    }

    fn n(p: &str) -> Name {
        Name::from_raw(Genre::Fs, p.as_bytes())
    }

    #[test]
    fn descend_and_next_visit_sorted_children() {
        let fs = FakeFs {
            dirs: BTreeMap::from([
                ("/".to_string(), vec!["A".to_string()]),
                ("/A".to_string(), vec!["b".to_string(), "a".to_string()]),
            ]),
        };
        let mut it = FilesystemIterator::new(&fs, Genre::Fs, IterFlags::empty());
        it.seek_to(&n("/A"));
        assert!(!it.done());
        assert!(it.can_descend());
        it.descend();
        assert_eq!(it.get_short_name(), Some(b"a".to_vec()));
        it.next();
        assert_eq!(it.get_short_name(), Some(b"b".to_vec()));
        it.next();
        assert!(it.done());
        assert!(it.ascend());
        assert_eq!(it.get_short_name(), Some(b"A".to_vec()));
        assert!(!it.ascend());
    }

    #[test]
    fn seek_to_missing_name_is_done() {
        let fs = FakeFs {
            dirs: BTreeMap::new(),
        };
        let mut it = FilesystemIterator::new(&fs, Genre::Fs, IterFlags::empty());
        it.seek_to(&n("/missing"));
        assert!(it.done());
    }
}

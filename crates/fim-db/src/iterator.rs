//! The database's [`DataSourceIterator`] implementation, symmetric to
//! [`fim_datasource::FilesystemIterator`] (spec.md §4.4).

use std::cell::RefCell;
use std::cmp::Ordering;
use std::rc::Rc;

use fim_datasource::{DataSourceIterator, SharedErrorBucket};
use fim_error::{FimError, Result};
use fim_fco::{Capabilities, Fco, PropertySet};
use fim_name::Name;
use fim_types::Genre;

use crate::block::{self, BlockIndex};
use crate::database::Database;

#[derive(Clone)]
struct Entry {
    node_idx: BlockIndex,
    name: Name,
}

struct Level {
    own_name: Name,
    own_node: BlockIndex,
    entries: Vec<Entry>,
    idx: usize,
}

/// A cursor into a [`Database`]'s tree, exposing the same surface as
/// [`fim_datasource::FilesystemIterator`] plus the database-only
/// extensions named in spec.md §4.4.
pub struct DatabaseIterator {
    db: Rc<RefCell<Database>>,
    genre: Genre,
    levels: Vec<Level>,
    error_bucket: Option<SharedErrorBucket>,
}

fn components_of(name: &Name) -> Vec<Vec<u8>> {
    name.components().to_vec()
}

impl DatabaseIterator {
    #[must_use]
    pub fn new(db: Rc<RefCell<Database>>, genre: Genre) -> Self {
        Self {
            db,
            genre,
            levels: Vec::new(),
            error_bucket: None,
        }
    }

    fn current_entry(&self) -> Option<&Entry> {
        let level = self.levels.last()?;
        level.entries.get(level.idx)
    }

    fn report_error(&self, message: impl Into<String>, object: Option<&Name>) {
        if let Some(bucket) = &self.error_bucket {
            bucket.borrow_mut().push(
                message,
                object.map(fim_name::to_string_display),
                false,
            );
        }
    }

    /// `create_path` relative to the current position's parent, leaving
    /// the cursor on the terminal component (spec.md §4.4).
    pub fn create_path(&mut self, name: &Name) {
        let idx = self.db.borrow_mut().create_path(block::ROOT, &components_of(name));
        self.seek_to_resolved(name, idx);
    }

    pub fn add_fco(&mut self, name: &Name, props: &PropertySet) {
        let blob = props.serialize();
        let idx = self
            .db
            .borrow_mut()
            .add_fco(block::ROOT, &components_of(name), blob);
        self.seek_to_resolved(name, idx);
    }

    pub fn remove_fco(&mut self, name: &Name) {
        let Some((parent_idx, node_idx)) = self.locate_with_parent(name) else {
            return;
        };
        self.db.borrow_mut().remove_fco(parent_idx, node_idx);
    }

    /// Remove every node not covered by `keep`, recursing bottom-up so an
    /// orphaned subtree collapses in one pass (spec.md §4.9's
    /// policy-update pruning). `keep` is consulted with the full name
    /// reconstructed under this iterator's genre.
    pub fn prune_unless(&mut self, keep: &dyn Fn(&Name) -> bool) {
        let genre = self.genre;
        self.db.borrow_mut().prune_unless(block::ROOT, &|path: &[Vec<u8>]| {
            let name = path.iter().fold(Name::root(genre), |acc, c| acc.pushed(c));
            keep(&name)
        });
    }

    #[must_use]
    pub fn has_fco_data(&self, name: &Name) -> bool {
        self.locate(name).is_some_and(|idx| self.db.borrow().has_fco_data(idx))
    }

    pub fn set_fco_data(&mut self, name: &Name, props: &PropertySet) -> Result<()> {
        let idx = self
            .locate(name)
            .ok_or_else(|| FimError::Internal(format!("no such node: {}", fim_name::to_string_display(name))))?;
        self.db.borrow_mut().set_fco_data(idx, props.serialize())
    }

    pub fn remove_fco_data(&mut self, name: &Name) {
        if let Some(idx) = self.locate(name) {
            self.db.borrow_mut().remove_fco_data(idx);
        }
    }

    pub fn add_child_array(&mut self, name: &Name) {
        if let Some(idx) = self.locate(name) {
            self.db.borrow_mut().add_child_array(idx);
        }
    }

    #[must_use]
    pub fn can_remove_child_array(&self, name: &Name) -> bool {
        self.locate(name)
            .is_some_and(|idx| self.db.borrow().can_remove_child_array(idx))
    }

    pub fn remove_child_array(&mut self, name: &Name) {
        if let Some(idx) = self.locate(name) {
            self.db.borrow_mut().remove_child_array(idx);
        }
    }

    fn locate(&self, name: &Name) -> Option<BlockIndex> {
        self.db.borrow().find_path(block::ROOT, &components_of(name))
    }

    fn locate_with_parent(&self, name: &Name) -> Option<(BlockIndex, BlockIndex)> {
        let comps = components_of(name);
        let (last, prefix) = comps.split_last()?;
        let db = self.db.borrow();
        let parent = db.find_path(block::ROOT, prefix)?;
        let node = db.find_path(parent, std::slice::from_ref(last))?;
        Some((parent, node))
    }

    fn seek_to_resolved(&mut self, name: &Name, node_idx: BlockIndex) {
        self.levels.clear();
        let parent = name.popped().unwrap_or_else(|| Name::root(self.genre));
        let parent_idx = if name.is_root() {
            block::ROOT
        } else {
            self.db
                .borrow()
                .find_path(block::ROOT, &components_of(&parent))
                .unwrap_or(block::ROOT)
        };
        self.levels.push(Level {
            own_name: parent,
            own_node: parent_idx,
            entries: vec![Entry {
                node_idx,
                name: name.clone(),
            }],
            idx: 0,
        });
    }
}

impl DataSourceIterator for DatabaseIterator {
    fn seek_to(&mut self, name: &Name) {
        self.levels.clear();
        let parent = name.popped().unwrap_or_else(|| Name::root(self.genre));
        let parent_idx = if name.is_root() {
            Some(block::ROOT)
        } else {
            self.db.borrow().find_path(block::ROOT, &components_of(&parent))
        };
        let Some(parent_idx) = parent_idx else {
            self.levels.push(Level {
                own_name: parent,
                own_node: block::ROOT,
                entries: Vec::new(),
                idx: 0,
            });
            return;
        };
        let node_idx = self.db.borrow().find_path(block::ROOT, &components_of(name));
        let entries = match node_idx {
            Some(idx) => vec![Entry {
                node_idx: idx,
                name: name.clone(),
            }],
            None => Vec::new(),
        };
        self.levels.push(Level {
            own_name: parent,
            own_node: parent_idx,
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
        match self.current_entry() {
            Some(e) => self.db.borrow().has_children(e.node_idx),
            None => false,
        }
    }

    fn descend(&mut self) {
        let Some(cur) = self.current_entry().cloned() else {
            let own_node = self.levels.last().map_or(block::ROOT, |l| l.own_node);
            let own_name = self
                .levels
                .last()
                .map(|l| l.own_name.clone())
                .unwrap_or_else(|| Name::root(self.genre));
            self.levels.push(Level {
                own_name,
                own_node,
                entries: Vec::new(),
                idx: 0,
            });
            return;
        };

        let children = self.db.borrow().children_of(cur.node_idx);
        let entries = children
            .into_iter()
            .map(|(idx, short_name)| Entry {
                node_idx: idx,
                name: cur.name.pushed(&short_name),
            })
            .collect();
        self.levels.push(Level {
            own_name: cur.name,
            own_node: cur.node_idx,
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
        self.current_entry().map(|e| e.name.clone())
    }

    fn get_parent_name(&self) -> Name {
        self.levels
            .last()
            .map(|l| l.own_name.clone())
            .unwrap_or_else(|| Name::root(self.genre))
    }

    fn get_short_name(&self) -> Option<Vec<u8>> {
        self.current_entry()
            .and_then(|e| e.name.short_name().map(<[u8]>::to_vec))
    }

    fn create_fco(&self) -> Result<Fco> {
        let entry = self
            .current_entry()
            .ok_or_else(|| FimError::Internal("create_fco called while done".into()))?;
        let db = self.db.borrow();
        let caps = if db.has_children(entry.node_idx) {
            Capabilities::CAN_HAVE_CHILDREN
        } else {
            Capabilities::empty()
        };
        let props = match db.fco_data(entry.node_idx) {
            Some(blob) => PropertySet::deserialize(self.genre, blob)
                .ok_or_else(|| FimError::Internal("corrupt property-set blob".into()))?,
            None => PropertySet::new(self.genre),
        };
        Ok(Fco::new(entry.name.clone(), caps, props))
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
    use fim_fco::{fs_prop, PropertyValue};

    fn n(p: &str) -> Name {
        Name::from_raw(Genre::Fs, p.as_bytes())
    }

    fn fresh() -> Rc<RefCell<Database>> {
        Rc::new(RefCell::new(Database::new(Genre::Fs, 5)))
    }

    #[test]
    fn add_fco_then_iterate_children() {
        let db = fresh();
        let mut it = DatabaseIterator::new(Rc::clone(&db), Genre::Fs);
        let mut props = PropertySet::new(Genre::Fs);
        props.set(fs_prop::SIZE, PropertyValue::Long(10));
        it.add_fco(&n("/A/x"), &props);

        let mut walker = DatabaseIterator::new(Rc::clone(&db), Genre::Fs);
        walker.seek_to(&n("/A"));
        assert!(walker.can_descend());
        walker.descend();
        assert_eq!(walker.get_short_name(), Some(b"x".to_vec()));
        let fco = walker.create_fco().unwrap();
        assert_eq!(fco.props.get(fs_prop::SIZE), Some(&PropertyValue::Long(10)));
    }

    #[test]
    fn seek_to_missing_name_is_done() {
        let db = fresh();
        let mut it = DatabaseIterator::new(db, Genre::Fs);
        it.seek_to(&n("/nope"));
        assert!(it.done());
    }

    #[test]
    fn remove_fco_prunes_node() {
        let db = fresh();
        let mut it = DatabaseIterator::new(Rc::clone(&db), Genre::Fs);
        let props = PropertySet::new(Genre::Fs);
        it.add_fco(&n("/A/x"), &props);
        it.remove_fco(&n("/A/x"));
        assert!(!it.has_fco_data(&n("/A/x")));
    }
}

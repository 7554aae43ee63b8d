//! The paged, hierarchical block store (spec.md §4.6).
//!
//! Blocks are addressed by index; deallocated blocks are recycled
//! through a free list. A permanent root node lives at index
//! [`block::ROOT`] and is never freed.

use fim_error::{DatabaseError, FimError, Result};
use fim_types::Genre;

use crate::block::{self, BlockIndex, NodeRec, Slot};

/// A paged database mirroring one genre's name tree.
#[derive(Debug, Clone)]
pub struct Database {
    genre: Genre,
    blocks: Vec<Slot>,
    free_list: Vec<BlockIndex>,
    /// Free-list seed recorded at creation (the resolution of the
    /// ambiguous `Open(path, 5, ...)` parameter -- see DESIGN.md).
    free_list_seed: u32,
}

impl Database {
    /// Create an empty database for `genre`, reserving `free_list_seed`
    /// free blocks up front (an initial free-list capacity hint, not a
    /// page size or version selector -- see DESIGN.md).
    #[must_use]
    pub fn new(genre: Genre, free_list_seed: u32) -> Self {
        let root = Slot::Node(NodeRec {
            short_name: Vec::new(),
            data: None,
            children: None,
        });
        Self {
            genre,
            blocks: vec![root],
            free_list: Vec::new(),
            free_list_seed,
        }
    }

    #[must_use]
    pub fn genre(&self) -> Genre {
        self.genre
    }

    fn alloc(&mut self, slot: Slot) -> BlockIndex {
        if let Some(idx) = self.free_list.pop() {
            self.blocks[idx as usize] = slot;
            idx
        } else {
            self.blocks.push(slot);
            (self.blocks.len() - 1) as BlockIndex
        }
    }

    fn free(&mut self, idx: BlockIndex) {
        if idx == block::ROOT {
            return;
        }
        self.blocks[idx as usize] = Slot::Free;
        self.free_list.push(idx);
    }

    fn node(&self, idx: BlockIndex) -> Option<&NodeRec> {
        match self.blocks.get(idx as usize)? {
            Slot::Node(rec) => Some(rec),
            _ => None,
        }
    }

    fn node_mut(&mut self, idx: BlockIndex) -> Option<&mut NodeRec> {
        match self.blocks.get_mut(idx as usize)? {
            Slot::Node(rec) => Some(rec),
            _ => None,
        }
    }

    fn child_array(&self, idx: BlockIndex) -> &[BlockIndex] {
        match self.blocks.get(idx as usize) {
            Some(Slot::ChildArray(entries)) => entries,
            _ => &[],
        }
    }

    /// Children of `node_idx`, as `(index, short_name)` pairs in sorted order.
    #[must_use]
    pub fn children_of(&self, node_idx: BlockIndex) -> Vec<(BlockIndex, Vec<u8>)> {
        let Some(node) = self.node(node_idx) else {
            return Vec::new();
        };
        let Some(arr_idx) = node.children else {
            return Vec::new();
        };
        self.child_array(arr_idx)
            .iter()
            .filter_map(|&i| self.node(i).map(|n| (i, n.short_name.clone())))
            .collect()
    }

    #[must_use]
    pub fn has_children(&self, node_idx: BlockIndex) -> bool {
        self.node(node_idx).is_some_and(|n| n.children.is_some())
    }

    #[must_use]
    pub fn short_name_of(&self, node_idx: BlockIndex) -> Option<Vec<u8>> {
        self.node(node_idx).map(|n| n.short_name.clone())
    }

    fn find_child(&self, node_idx: BlockIndex, short_name: &[u8]) -> Option<BlockIndex> {
        self.children_of(node_idx)
            .into_iter()
            .find(|(_, name)| name == short_name)
            .map(|(i, _)| i)
    }

    /// Find the node addressed by `components` relative to `from`
    /// (usually [`block::ROOT`]). `None` if any component is missing.
    #[must_use]
    pub fn find_path(&self, from: BlockIndex, components: &[Vec<u8>]) -> Option<BlockIndex> {
        let mut cur = from;
        for c in components {
            cur = self.find_child(cur, c)?;
        }
        Some(cur)
    }

    fn ensure_children_array(&mut self, node_idx: BlockIndex) -> BlockIndex {
        if let Some(existing) = self.node(node_idx).and_then(|n| n.children) {
            return existing;
        }
        let arr_idx = self.alloc(Slot::ChildArray(Vec::new()));
        if let Some(n) = self.node_mut(node_idx) {
            n.children = Some(arr_idx);
        }
        arr_idx
    }

    /// Create any missing intermediate nodes along `components` relative
    /// to `from`, returning the terminal node index (spec.md §4.4's
    /// `create_path`).
    pub fn create_path(&mut self, from: BlockIndex, components: &[Vec<u8>]) -> BlockIndex {
        let mut cur = from;
        for c in components {
            if let Some(existing) = self.find_child(cur, c) {
                cur = existing;
                continue;
            }
            let arr_idx = self.ensure_children_array(cur);
            let siblings = self.child_array(arr_idx).to_vec();
            let pos = siblings
                .binary_search_by(|&e| {
                    self.node(e)
                        .map(|n| n.short_name.as_slice())
                        .unwrap_or(&[])
                        .cmp(c.as_slice())
                })
                .unwrap_or_else(|i| i);

            let new_idx = self.alloc(Slot::Node(NodeRec {
                short_name: c.clone(),
                data: None,
                children: None,
            }));
            if let Slot::ChildArray(entries) = &mut self.blocks[arr_idx as usize] {
                entries.insert(pos, new_idx);
            }
            cur = new_idx;
        }
        cur
    }

    #[must_use]
    pub fn has_fco_data(&self, node_idx: BlockIndex) -> bool {
        self.node(node_idx).is_some_and(|n| n.data.is_some())
    }

    pub fn set_fco_data(&mut self, node_idx: BlockIndex, blob: Vec<u8>) -> Result<()> {
        let node = self
            .node_mut(node_idx)
            .ok_or_else(|| FimError::Database(DatabaseError::CorruptBlock(node_idx)))?;
        node.data = Some(blob);
        Ok(())
    }

    #[must_use]
    pub fn fco_data(&self, node_idx: BlockIndex) -> Option<&[u8]> {
        self.node(node_idx).and_then(|n| n.data.as_deref())
    }

    pub fn remove_fco_data(&mut self, node_idx: BlockIndex) {
        if let Some(n) = self.node_mut(node_idx) {
            n.data = None;
        }
    }

    /// `add_fco` is `create_path` followed by `set_fco_data`; kept as a
    /// distinct entry point to mirror the iterator-surface extension
    /// named in spec.md §4.4.
    pub fn add_fco(&mut self, from: BlockIndex, components: &[Vec<u8>], blob: Vec<u8>) -> BlockIndex {
        let idx = self.create_path(from, components);
        let _ = self.set_fco_data(idx, blob);
        idx
    }

    /// Remove `node_idx` and, if it becomes prunable (no data, no
    /// children) and is not the root, free it and recurse upward,
    /// removing the dangling reference from the parent's child array.
    pub fn remove_fco(&mut self, parent: BlockIndex, node_idx: BlockIndex) {
        self.remove_fco_data(node_idx);
        self.prune_if_empty(parent, node_idx);
    }

    fn prune_if_empty(&mut self, parent: BlockIndex, node_idx: BlockIndex) {
        if node_idx == block::ROOT {
            return;
        }
        let prunable = self.node(node_idx).is_some_and(NodeRec::is_prunable);
        if !prunable {
            return;
        }
        self.detach_child(parent, node_idx);
        self.free(node_idx);
    }

    fn detach_child(&mut self, parent: BlockIndex, node_idx: BlockIndex) {
        let Some(arr_idx) = self.node(parent).and_then(|n| n.children) else {
            return;
        };
        if let Slot::ChildArray(entries) = &mut self.blocks[arr_idx as usize] {
            entries.retain(|&e| e != node_idx);
        }
        if self.can_remove_child_array(parent) {
            self.remove_child_array(parent);
        }
    }

    #[must_use]
    pub fn can_remove_child_array(&self, node_idx: BlockIndex) -> bool {
        self.node(node_idx)
            .and_then(|n| n.children)
            .is_some_and(|arr_idx| self.child_array(arr_idx).is_empty())
    }

    pub fn remove_child_array(&mut self, node_idx: BlockIndex) {
        if let Some(arr_idx) = self.node(node_idx).and_then(|n| n.children) {
            self.free(arr_idx);
        }
        if let Some(n) = self.node_mut(node_idx) {
            n.children = None;
        }
    }

    pub fn add_child_array(&mut self, node_idx: BlockIndex) -> BlockIndex {
        self.ensure_children_array(node_idx)
    }

    /// Remove every node reachable from `from` that is not listed in
    /// `keep` and carries no data of its own once its descendants are
    /// pruned (spec.md §4.9's policy-update database pruning, invariant 9).
    pub fn prune_unless(&mut self, from: BlockIndex, keep: &dyn Fn(&[Vec<u8>]) -> bool) {
        self.prune_recursive(from, &mut Vec::new(), keep);
    }

    fn prune_recursive(
        &mut self,
        node_idx: BlockIndex,
        path: &mut Vec<Vec<u8>>,
        keep: &dyn Fn(&[Vec<u8>]) -> bool,
    ) {
        let children: Vec<(BlockIndex, Vec<u8>)> = self.children_of(node_idx);
        for (child_idx, name) in children {
            path.push(name);
            self.prune_recursive(child_idx, path, keep);
            let keep_this = keep(path.as_slice()) || self.has_children(child_idx) || self.has_fco_data(child_idx);
            if !keep_this {
                self.detach_child(node_idx, child_idx);
                self.free(child_idx);
            }
            path.pop();
        }
        if self.can_remove_child_array(node_idx) {
            self.remove_child_array(node_idx);
        }
    }

    /// Debug-only consistency walk: every block reachable from the root
    /// is well-formed and every child-array entry resolves to a live
    /// node (spec.md §4.6).
    #[cfg(debug_assertions)]
    pub fn assert_all_blocks_valid(&self) {
        let mut seen = vec![false; self.blocks.len()];
        self.walk_assert(block::ROOT, &mut seen);
        for (i, slot) in self.blocks.iter().enumerate() {
            if matches!(slot, Slot::Free) {
                assert!(
                    self.free_list.contains(&(i as BlockIndex)),
                    "free slot {i} missing from free list"
                );
            }
        }
    }

    #[cfg(debug_assertions)]
    fn walk_assert(&self, node_idx: BlockIndex, seen: &mut [bool]) {
        assert!(matches!(self.blocks.get(node_idx as usize), Some(Slot::Node(_))));
        seen[node_idx as usize] = true;
        if let Some(arr_idx) = self.node(node_idx).and_then(|n| n.children) {
            assert!(matches!(self.blocks.get(arr_idx as usize), Some(Slot::ChildArray(_))));
            for &child in self.child_array(arr_idx) {
                self.walk_assert(child, seen);
            }
        }
    }

    /// Serialize the whole block store (spec.md §4.6; wrapped by the
    /// signed envelope at a higher layer, not here).
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.free_list_seed.to_le_bytes());
        out.extend_from_slice(&(self.blocks.len() as u32).to_le_bytes());
        out.extend_from_slice(&(self.free_list.len() as u32).to_le_bytes());
        for &f in &self.free_list {
            out.extend_from_slice(&f.to_le_bytes());
        }
        for slot in &self.blocks {
            block::write_slot(&mut out, slot);
        }
        out
    }

    /// Inverse of [`Self::serialize`].
    pub fn deserialize(genre: Genre, buf: &[u8]) -> Result<Self> {
        let corrupt = || FimError::Database(DatabaseError::CorruptBlock(0));
        let (seed_b, rest) = buf.split_at_checked_compat(4).ok_or_else(corrupt)?;
        let free_list_seed = u32::from_le_bytes(seed_b.try_into().map_err(|_| corrupt())?);
        let (count_b, rest) = rest.split_at_checked_compat(4).ok_or_else(corrupt)?;
        let count = u32::from_le_bytes(count_b.try_into().map_err(|_| corrupt())?) as usize;
        let (flen_b, mut rest) = rest.split_at_checked_compat(4).ok_or_else(corrupt)?;
        let flen = u32::from_le_bytes(flen_b.try_into().map_err(|_| corrupt())?) as usize;

        let mut free_list = Vec::with_capacity(flen);
        for _ in 0..flen {
            let (b, next) = rest.split_at_checked_compat(4).ok_or_else(corrupt)?;
            free_list.push(u32::from_le_bytes(b.try_into().map_err(|_| corrupt())?));
            rest = next;
        }

        let mut blocks = Vec::with_capacity(count);
        for _ in 0..count {
            let (slot, next) = block::read_slot(rest).ok_or_else(corrupt)?;
            blocks.push(slot);
            rest = next;
        }

        Ok(Self {
            genre,
            blocks,
            free_list,
            free_list_seed,
        })
    }
}

trait SplitCompat {
    fn split_at_checked_compat(&self, n: usize) -> Option<(&[u8], &[u8])>;
}

impl SplitCompat for [u8] {
    fn split_at_checked_compat(&self, n: usize) -> Option<(&[u8], &[u8])> {
        if self.len() < n {
            None
        } else {
            Some(self.split_at(n))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comps(path: &[&str]) -> Vec<Vec<u8>> {
        path.iter().map(|c| c.as_bytes().to_vec()).collect()
    }

    #[test]
    fn create_path_builds_intermediate_nodes() {
        let mut db = Database::new(Genre::Fs, 5);
        let x = db.create_path(block::ROOT, &comps(&["A", "x"]));
        assert_eq!(db.short_name_of(x), Some(b"x".to_vec()));
        let a = db.find_path(block::ROOT, &comps(&["A"])).unwrap();
        assert!(db.has_children(a));
    }

    #[test]
    fn add_and_remove_fco_prunes_empty_nodes() {
        let mut db = Database::new(Genre::Fs, 5);
        let a = db.create_path(block::ROOT, &comps(&["A"]));
        let x = db.add_fco(a, &comps(&["x"]), vec![1, 2, 3]);
        assert!(db.has_fco_data(x));

        db.remove_fco(a, x);
        assert!(db.find_path(a, &comps(&["x"])).is_none());
    }

    #[test]
    fn prune_unless_removes_orphaned_subtree() {
        let mut db = Database::new(Genre::Fs, 5);
        db.add_fco(block::ROOT, &comps(&["A", "x"]), vec![1]);
        db.add_fco(block::ROOT, &comps(&["B", "y"]), vec![2]);

        db.prune_unless(block::ROOT, &|path| path.first().map(Vec::as_slice) == Some(b"A"));

        assert!(db.find_path(block::ROOT, &comps(&["A", "x"])).is_some());
        assert!(db.find_path(block::ROOT, &comps(&["B"])).is_none());
    }

    #[test]
    fn serialize_round_trips() {
        let mut db = Database::new(Genre::Fs, 5);
        db.add_fco(block::ROOT, &comps(&["A", "x"]), vec![9, 9, 9]);
        let bytes = db.serialize();
        let back = Database::deserialize(Genre::Fs, &bytes).unwrap();
        let x = back.find_path(block::ROOT, &comps(&["A", "x"])).unwrap();
        assert_eq!(back.fco_data(x), Some(&[9, 9, 9][..]));
    }

    #[test]
    fn assert_all_blocks_valid_passes_on_well_formed_tree() {
        let mut db = Database::new(Genre::Fs, 5);
        db.add_fco(block::ROOT, &comps(&["A", "x"]), vec![1]);
        db.assert_all_blocks_valid();
    }
}

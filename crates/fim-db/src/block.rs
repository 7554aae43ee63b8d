//! The on-disk block framing: one tagged, checksummed payload per slot
//! (spec.md §4.6). Property-set blobs stored in a [`Slot::Node`] are
//! opaque here -- `fim-fco::PropertySet` owns their encoding.

use crc32fast::Hasher;

/// Index of a block within the store. The root node always lives at
/// index `ROOT`.
pub type BlockIndex = u32;

pub const ROOT: BlockIndex = 0;

/// One addressable slot in the block store.
#[derive(Debug, Clone)]
pub enum Slot {
    /// On the free list; available for reuse.
    Free,
    /// A directory entry: short name plus optional data blob and child array.
    Node(NodeRec),
    /// An ordered sequence of node indices.
    ChildArray(Vec<BlockIndex>),
}

#[derive(Debug, Clone)]
pub struct NodeRec {
    pub short_name: Vec<u8>,
    pub data: Option<Vec<u8>>,
    pub children: Option<BlockIndex>,
}

impl NodeRec {
    #[must_use]
    pub fn is_prunable(&self) -> bool {
        self.data.is_none() && self.children.is_none()
    }
}

const TAG_FREE: u8 = 0;
const TAG_NODE: u8 = 1;
const TAG_CHILD_ARRAY: u8 = 2;

fn push_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn push_bytes(out: &mut Vec<u8>, b: &[u8]) {
    push_u32(out, b.len() as u32);
    out.extend_from_slice(b);
}

fn take<'a>(buf: &'a [u8], n: usize) -> Option<(&'a [u8], &'a [u8])> {
    if buf.len() < n {
        None
    } else {
        Some(buf.split_at(n))
    }
}

fn take_u32(buf: &[u8]) -> Option<(u32, &[u8])> {
    let (b, rest) = take(buf, 4)?;
    Some((u32::from_le_bytes(b.try_into().ok()?), rest))
}

fn take_bytes(buf: &[u8]) -> Option<(Vec<u8>, &[u8])> {
    let (len, rest) = take_u32(buf)?;
    let (b, rest) = take(rest, len as usize)?;
    Some((b.to_vec(), rest))
}

fn payload_of(slot: &Slot) -> (u8, Vec<u8>) {
    match slot {
        Slot::Free => (TAG_FREE, Vec::new()),
        Slot::Node(rec) => {
            let mut out = Vec::new();
            push_bytes(&mut out, &rec.short_name);
            match &rec.data {
                Some(d) => {
                    out.push(1);
                    push_bytes(&mut out, d);
                }
                None => out.push(0),
            }
            match rec.children {
                Some(c) => {
                    out.push(1);
                    push_u32(&mut out, c);
                }
                None => out.push(0),
            }
            (TAG_NODE, out)
        }
        Slot::ChildArray(entries) => {
            let mut out = Vec::new();
            push_u32(&mut out, entries.len() as u32);
            for &e in entries {
                push_u32(&mut out, e);
            }
            (TAG_CHILD_ARRAY, out)
        }
    }
}

/// Write one slot as `tag(u8) checksum(u32) len(u32) payload`.
pub fn write_slot(out: &mut Vec<u8>, slot: &Slot) {
    let (tag, payload) = payload_of(slot);
    let mut hasher = Hasher::new();
    hasher.update(&payload);
    out.push(tag);
    push_u32(out, hasher.finalize());
    push_bytes(out, &payload);
}

/// Read one slot, verifying its checksum. Returns `None` on truncation
/// or checksum mismatch (a corrupt block, spec.md §7's `CorruptBlock`).
pub fn read_slot(buf: &[u8]) -> Option<(Slot, &[u8])> {
    let (&tag, rest) = buf.split_first()?;
    let (checksum, rest) = take_u32(rest)?;
    let (payload, rest) = take_bytes(rest)?;

    let mut hasher = Hasher::new();
    hasher.update(&payload);
    if hasher.finalize() != checksum {
        return None;
    }

    let slot = match tag {
        TAG_FREE => Slot::Free,
        TAG_NODE => {
            let (short_name, p) = take_bytes(&payload)?;
            let (has_data, p) = p.split_first()?;
            let (data, p) = if *has_data == 1 {
                let (d, p) = take_bytes(p)?;
                (Some(d), p)
            } else {
                (None, p)
            };
            let (has_children, p) = p.split_first()?;
            let children = if *has_children == 1 {
                Some(take_u32(p)?.0)
            } else {
                None
            };
            Slot::Node(NodeRec {
                short_name,
                data,
                children,
            })
        }
        TAG_CHILD_ARRAY => {
            let (count, mut p) = take_u32(&payload)?;
            let mut entries = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let (v, next) = take_u32(p)?;
                entries.push(v);
                p = next;
            }
            Slot::ChildArray(entries)
        }
        _ => return None,
    };
    Some((slot, rest))
}

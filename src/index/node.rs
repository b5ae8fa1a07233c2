use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::{
    index::{
        errors::Error,
        node_type::{Key, KeyComparator, RecordId},
    },
    storage::page::page_layout::{
        PageBuf, PageId, INTERNAL_ARRAY_OFFSET, INTERNAL_PAGE_TYPE, INVALID_PAGE_ID, KEY_SIZE,
        LEAF_ARRAY_OFFSET, LEAF_PAGE_TYPE, MAX_SIZE_OFFSET, NEXT_PAGE_ID_OFFSET, PAGE_ID_OFFSET,
        PAGE_SIZE, PAGE_TYPE_OFFSET, PARENT_PAGE_ID_OFFSET, SIZE_OFFSET,
    },
};

/// Payload of a decoded node page.
///
/// Internal nodes are an ordered array of (key, child page id) pairs where
/// slot 0's key is a sentinel that is never compared: child `i` covers keys
/// in `[key[i], key[i+1])`. Leaf nodes are an ordered array of (key, record
/// id) pairs chained to the right sibling through `next_page_id`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodePayload {
    Internal { entries: Vec<(Key, PageId)> },
    Leaf { entries: Vec<(Key, RecordId)>, next_page_id: PageId },
}

/// A tree node decoded out of a latched page. Mutations happen on the
/// decoded form and are written back with [`BTreeNode::encode`] through the
/// same latch that produced the image.
#[derive(Clone, Debug)]
pub struct BTreeNode {
    pub page_id: PageId,
    pub parent_page_id: PageId,
    pub max_size: u32,
    pub payload: NodePayload,
}

impl BTreeNode {
    pub fn new_leaf(page_id: PageId, parent_page_id: PageId, max_size: u32) -> Self {
        BTreeNode {
            page_id,
            parent_page_id,
            max_size,
            payload: NodePayload::Leaf {
                entries: Vec::new(),
                next_page_id: INVALID_PAGE_ID,
            },
        }
    }

    pub fn new_internal(page_id: PageId, parent_page_id: PageId, max_size: u32) -> Self {
        BTreeNode {
            page_id,
            parent_page_id,
            max_size,
            payload: NodePayload::Internal { entries: Vec::new() },
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.payload, NodePayload::Leaf { .. })
    }

    pub fn is_root(&self) -> bool {
        self.parent_page_id == INVALID_PAGE_ID
    }

    /// Entry count: leaf pairs, or children including the sentinel slot.
    pub fn size(&self) -> usize {
        match &self.payload {
            NodePayload::Internal { entries } => entries.len(),
            NodePayload::Leaf { entries, .. } => entries.len(),
        }
    }

    /// Occupancy floor for non-root nodes.
    pub fn min_size(&self) -> usize {
        self.max_size as usize / 2
    }

    // ---- internal node primitives ----------------------------------------

    pub fn internal_entries(&self) -> &Vec<(Key, PageId)> {
        match &self.payload {
            NodePayload::Internal { entries } => entries,
            NodePayload::Leaf { .. } => panic!("leaf page treated as internal"),
        }
    }

    pub fn internal_entries_mut(&mut self) -> &mut Vec<(Key, PageId)> {
        match &mut self.payload {
            NodePayload::Internal { entries } => entries,
            NodePayload::Leaf { .. } => panic!("leaf page treated as internal"),
        }
    }

    pub fn key_at(&self, index: usize) -> Key {
        self.internal_entries()[index].0
    }

    pub fn set_key_at(&mut self, index: usize, key: Key) {
        self.internal_entries_mut()[index].0 = key;
    }

    pub fn child_at(&self, index: usize) -> PageId {
        self.internal_entries()[index].1
    }

    /// Index of the entry whose child pointer equals `page_id`.
    pub fn child_index(&self, page_id: PageId) -> Option<usize> {
        self.internal_entries()
            .iter()
            .position(|(_, child)| *child == page_id)
    }

    /// Child pointer covering `key`. The search starts from slot 1; slot 0's
    /// key is never compared.
    pub fn internal_lookup<C: KeyComparator>(&self, key: &Key, comparator: &C) -> PageId {
        let entries = self.internal_entries();
        debug_assert!(entries.len() > 1);
        let idx = entries[1..]
            .partition_point(|(k, _)| comparator.compare(k, key) != std::cmp::Ordering::Greater);
        entries[idx].1
    }

    /// Insert `(key, child)` directly after the entry pointing at
    /// `after_child`. Used when a split hands a new right sibling up.
    pub fn internal_insert_after(&mut self, after_child: PageId, key: Key, child: PageId) {
        let idx = self
            .child_index(after_child)
            .expect("split child missing from its parent");
        self.internal_entries_mut().insert(idx + 1, (key, child));
    }

    /// Drop the entry at `index`, shifting the rest left.
    pub fn internal_remove(&mut self, index: usize) {
        self.internal_entries_mut().remove(index);
    }

    // ---- leaf node primitives ---------------------------------------------

    pub fn leaf_entries(&self) -> &Vec<(Key, RecordId)> {
        match &self.payload {
            NodePayload::Leaf { entries, .. } => entries,
            NodePayload::Internal { .. } => panic!("internal page treated as leaf"),
        }
    }

    pub fn leaf_entries_mut(&mut self) -> &mut Vec<(Key, RecordId)> {
        match &mut self.payload {
            NodePayload::Leaf { entries, .. } => entries,
            NodePayload::Internal { .. } => panic!("internal page treated as leaf"),
        }
    }

    pub fn next_page_id(&self) -> PageId {
        match &self.payload {
            NodePayload::Leaf { next_page_id, .. } => *next_page_id,
            NodePayload::Internal { .. } => panic!("internal page treated as leaf"),
        }
    }

    pub fn set_next_page_id(&mut self, next: PageId) {
        match &mut self.payload {
            NodePayload::Leaf { next_page_id, .. } => *next_page_id = next,
            NodePayload::Internal { .. } => panic!("internal page treated as leaf"),
        }
    }

    pub fn leaf_lookup<C: KeyComparator>(&self, key: &Key, comparator: &C) -> Option<RecordId> {
        let entries = self.leaf_entries();
        entries
            .binary_search_by(|(k, _)| comparator.compare(k, key))
            .ok()
            .map(|idx| entries[idx].1)
    }

    /// First slot whose key is >= `key`; the seek position for iterators.
    pub fn leaf_key_index<C: KeyComparator>(&self, key: &Key, comparator: &C) -> usize {
        self.leaf_entries()
            .partition_point(|(k, _)| comparator.compare(k, key) == std::cmp::Ordering::Less)
    }

    /// Ordered insert. The caller has already rejected duplicates.
    pub fn leaf_insert<C: KeyComparator>(&mut self, key: Key, rid: RecordId, comparator: &C) {
        let idx = self.leaf_key_index(&key, comparator);
        let entries = self.leaf_entries_mut();
        debug_assert!(idx == entries.len() || entries[idx].0 != key);
        entries.insert(idx, (key, rid));
    }

    /// Remove `key` if present; false when the leaf is unchanged.
    pub fn leaf_remove<C: KeyComparator>(&mut self, key: &Key, comparator: &C) -> bool {
        let entries = self.leaf_entries_mut();
        match entries.binary_search_by(|(k, _)| comparator.compare(k, key)) {
            Ok(idx) => {
                entries.remove(idx);
                true
            }
            Err(_) => false,
        }
    }

    // ---- codec ------------------------------------------------------------

    pub fn decode(data: &PageBuf) -> Result<BTreeNode, Error> {
        let mut cursor = Cursor::new(&data[..]);
        cursor.seek(SeekFrom::Start(PAGE_TYPE_OFFSET as u64))?;
        let page_type = cursor.read_u32::<LittleEndian>()?;
        cursor.seek(SeekFrom::Start(SIZE_OFFSET as u64))?;
        let size = cursor.read_u32::<LittleEndian>()? as usize;
        cursor.seek(SeekFrom::Start(MAX_SIZE_OFFSET as u64))?;
        let max_size = cursor.read_u32::<LittleEndian>()?;
        cursor.seek(SeekFrom::Start(PARENT_PAGE_ID_OFFSET as u64))?;
        let parent_page_id = cursor.read_u32::<LittleEndian>()?;
        cursor.seek(SeekFrom::Start(PAGE_ID_OFFSET as u64))?;
        let page_id = cursor.read_u32::<LittleEndian>()?;

        match page_type {
            LEAF_PAGE_TYPE => {
                cursor.seek(SeekFrom::Start(NEXT_PAGE_ID_OFFSET as u64))?;
                let next_page_id = cursor.read_u32::<LittleEndian>()?;

                let mut entries = Vec::with_capacity(size);
                cursor.seek(SeekFrom::Start(LEAF_ARRAY_OFFSET as u64))?;
                for _ in 0..size {
                    let mut key = [0u8; KEY_SIZE];
                    cursor.read_exact(&mut key)?;
                    let rid_page_id = cursor.read_u32::<LittleEndian>()?;
                    let slot = cursor.read_u32::<LittleEndian>()?;
                    entries.push((Key(key), RecordId::new(rid_page_id, slot)));
                }

                Ok(BTreeNode {
                    page_id,
                    parent_page_id,
                    max_size,
                    payload: NodePayload::Leaf { entries, next_page_id },
                })
            }
            INTERNAL_PAGE_TYPE => {
                let mut entries = Vec::with_capacity(size);
                cursor.seek(SeekFrom::Start(INTERNAL_ARRAY_OFFSET as u64))?;
                for _ in 0..size {
                    let mut key = [0u8; KEY_SIZE];
                    cursor.read_exact(&mut key)?;
                    let child = cursor.read_u32::<LittleEndian>()?;
                    entries.push((Key(key), child));
                }

                Ok(BTreeNode {
                    page_id,
                    parent_page_id,
                    max_size,
                    payload: NodePayload::Internal { entries },
                })
            }
            _ => Err(Error::CorruptedPage),
        }
    }

    pub fn encode(&self, data: &mut PageBuf) {
        data.fill(0);
        let mut cursor = Cursor::new(&mut data[..]);

        let page_type = if self.is_leaf() { LEAF_PAGE_TYPE } else { INTERNAL_PAGE_TYPE };
        cursor
            .seek(SeekFrom::Start(PAGE_TYPE_OFFSET as u64))
            .expect("node encode");
        cursor.write_u32::<LittleEndian>(page_type).expect("node encode");
        cursor.seek(SeekFrom::Start(SIZE_OFFSET as u64)).expect("node encode");
        cursor
            .write_u32::<LittleEndian>(self.size() as u32)
            .expect("node encode");
        cursor
            .seek(SeekFrom::Start(MAX_SIZE_OFFSET as u64))
            .expect("node encode");
        cursor.write_u32::<LittleEndian>(self.max_size).expect("node encode");
        cursor
            .seek(SeekFrom::Start(PARENT_PAGE_ID_OFFSET as u64))
            .expect("node encode");
        cursor
            .write_u32::<LittleEndian>(self.parent_page_id)
            .expect("node encode");
        cursor
            .seek(SeekFrom::Start(PAGE_ID_OFFSET as u64))
            .expect("node encode");
        cursor.write_u32::<LittleEndian>(self.page_id).expect("node encode");

        match &self.payload {
            NodePayload::Leaf { entries, next_page_id } => {
                assert!(LEAF_ARRAY_OFFSET + entries.len() * (KEY_SIZE + 8) <= PAGE_SIZE);
                cursor
                    .seek(SeekFrom::Start(NEXT_PAGE_ID_OFFSET as u64))
                    .expect("node encode");
                cursor.write_u32::<LittleEndian>(*next_page_id).expect("node encode");
                for (key, rid) in entries {
                    cursor.write_all(&key.0).expect("node encode");
                    cursor.write_u32::<LittleEndian>(rid.page_id).expect("node encode");
                    cursor.write_u32::<LittleEndian>(rid.slot).expect("node encode");
                }
            }
            NodePayload::Internal { entries } => {
                assert!(INTERNAL_ARRAY_OFFSET + entries.len() * (KEY_SIZE + 4) <= PAGE_SIZE);
                cursor
                    .seek(SeekFrom::Start(INTERNAL_ARRAY_OFFSET as u64))
                    .expect("node encode");
                for (key, child) in entries {
                    cursor.write_all(&key.0).expect("node encode");
                    cursor.write_u32::<LittleEndian>(*child).expect("node encode");
                }
            }
        }
    }

}

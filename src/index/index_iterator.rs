use std::sync::Arc;

use crate::{
    buffer::buffer_pool_manager::BufferPoolManager,
    index::{
        node::BTreeNode,
        node_type::{Key, RecordId},
    },
    storage::page::{page::Page, page_layout::INVALID_PAGE_ID},
};

/// Forward iterator over the leaf chain.
///
/// Holds exactly one pinned leaf at a time: the pin is taken over from the
/// descent that positioned the iterator and traded for the next leaf's pin
/// on advance. Entries are read from a decoded snapshot, so the leaf's read
/// latch is only held for the moment of decoding.
pub struct TreeIterator {
    bpm: Arc<BufferPoolManager>,
    node: Option<BTreeNode>,
    pinned: Option<Arc<Page>>,
    index: usize,
}

impl TreeIterator {
    pub(crate) fn new(
        bpm: Arc<BufferPoolManager>,
        node: BTreeNode,
        page: Arc<Page>,
        index: usize,
    ) -> Self {
        TreeIterator {
            bpm,
            node: Some(node),
            pinned: Some(page),
            index,
        }
    }

    pub(crate) fn exhausted(bpm: Arc<BufferPoolManager>) -> Self {
        TreeIterator {
            bpm,
            node: None,
            pinned: None,
            index: 0,
        }
    }

    fn release_current(&mut self) {
        if let Some(page) = self.pinned.take() {
            let page_id = page.page_id();
            drop(page);
            self.bpm.unpin_page(page_id, false);
        }
    }
}

impl Iterator for TreeIterator {
    type Item = (Key, RecordId);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let node = self.node.as_ref()?;

            if self.index < node.size() {
                let entry = node.leaf_entries()[self.index];
                self.index += 1;
                return Some(entry);
            }

            let next_page_id = node.next_page_id();
            self.release_current();
            if next_page_id == INVALID_PAGE_ID {
                self.node = None;
                return None;
            }

            // A pool with every frame pinned ends the scan early rather
            // than blocking; callers that need a full scan size the pool.
            let Some(page) = self.bpm.fetch_page(next_page_id) else {
                self.node = None;
                return None;
            };
            let decoded = {
                let data = page.read();
                BTreeNode::decode(&data)
            };
            match decoded {
                Ok(node) => {
                    self.node = Some(node);
                    self.pinned = Some(page);
                    self.index = 0;
                }
                Err(_) => {
                    self.bpm.unpin_page(next_page_id, false);
                    self.node = None;
                    return None;
                }
            }
        }
    }
}

impl Drop for TreeIterator {
    fn drop(&mut self) {
        self.release_current();
    }
}

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use parking_lot::{Condvar, Mutex};

use crate::{
    buffer::buffer_pool_manager::BufferPoolManager,
    index::{
        context::{Context, HeldPage},
        errors::Error,
        index_iterator::TreeIterator,
        node::BTreeNode,
        node_type::{Key, KeyComparator, RecordId},
    },
    storage::page::{
        header_page,
        page::Page,
        page_layout::{
            PageId, HEADER_PAGE_ID, INVALID_PAGE_ID, MAX_INTERNAL_SIZE, MAX_LEAF_SIZE,
        },
    },
};

/// What a descent intends to do at the leaf. Drives the latch mode and the
/// crabbing safety rule.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Operation {
    Read,
    Insert,
    Delete,
}

/// Tree-wide lock serialising structure changes that may replace the root.
/// Held non-lexically across a descent, so it is a flag under a mutex with a
/// condvar rather than a guard-based lock.
struct RootLatch {
    locked: Mutex<bool>,
    cond: Condvar,
}

impl RootLatch {
    fn new() -> Self {
        RootLatch {
            locked: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    fn lock(&self) {
        let mut locked = self.locked.lock();
        while *locked {
            self.cond.wait(&mut locked);
        }
        *locked = true;
    }

    fn unlock(&self) {
        let mut locked = self.locked.lock();
        *locked = false;
        self.cond.notify_one();
    }
}

/// Concurrent B+-tree index on fixed-width keys with unique-key semantics.
///
/// Every node access goes through the buffer pool; descents crab latches
/// top-down and record held pages in a per-operation [`Context`] so that
/// split and merge propagation can reach back to retained ancestors. The
/// current root page id is persisted in the header page under the index
/// name whenever it changes.
pub struct BPlusTree<C: KeyComparator> {
    index_name: String,
    bpm: Arc<BufferPoolManager>,
    comparator: C,
    leaf_max_size: u32,
    internal_max_size: u32,
    root_page_id: AtomicU32,
    root_latch: RootLatch,
}

impl<C: KeyComparator> BPlusTree<C> {
    /// Open the index, adopting a root recorded in the header page if this
    /// name has been seen before. The header page must already exist (the
    /// engine context bootstraps it).
    pub fn new(
        index_name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        leaf_max_size: u32,
        internal_max_size: u32,
    ) -> Self {
        assert!(
            leaf_max_size >= 2 && leaf_max_size as usize <= MAX_LEAF_SIZE,
            "leaf fanout out of range"
        );
        assert!(
            internal_max_size >= 3 && internal_max_size as usize <= MAX_INTERNAL_SIZE,
            "internal fanout out of range"
        );

        let index_name = index_name.into();
        let root_page_id = match bpm.fetch_page(HEADER_PAGE_ID) {
            Some(page) => {
                let recorded = {
                    let data = page.read();
                    header_page::get_root_id(&data, &index_name)
                };
                bpm.unpin_page(HEADER_PAGE_ID, false);
                recorded.unwrap_or(INVALID_PAGE_ID)
            }
            None => INVALID_PAGE_ID,
        };

        BPlusTree {
            index_name,
            bpm,
            comparator,
            leaf_max_size,
            internal_max_size,
            root_page_id: AtomicU32::new(root_page_id),
            root_latch: RootLatch::new(),
        }
    }

    pub fn root_page_id(&self) -> PageId {
        self.root_page_id.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.root_page_id() == INVALID_PAGE_ID
    }

    // ---- point lookup ------------------------------------------------------

    pub fn get_value(&self, key: &Key) -> Result<Option<RecordId>, Error> {
        if self.is_empty() {
            return Ok(None);
        }
        let mut ctx = Context::new();
        if self.find_leaf(Some(key), false, Operation::Read, &mut ctx)?.is_none() {
            self.unlock_unpin(Operation::Read, &mut ctx);
            return Ok(None);
        }
        let leaf = self.decode_last(Operation::Read, &mut ctx)?;
        let value = leaf.leaf_lookup(key, &self.comparator);
        self.unlock_unpin(Operation::Read, &mut ctx);
        Ok(value)
    }

    // ---- insertion ---------------------------------------------------------

    /// Insert a key/record pair. Returns false (leaving the tree unchanged)
    /// when the key is already present.
    pub fn insert(&self, key: &Key, rid: RecordId) -> Result<bool, Error> {
        loop {
            if self.is_empty() {
                self.root_latch.lock();
                if self.is_empty() {
                    let result = self.start_new_tree(key, rid);
                    self.root_latch.unlock();
                    return result.map(|_| true);
                }
                // lost the race to plant the root; insert normally
                self.root_latch.unlock();
            }

            let mut ctx = Context::new();
            if self.find_leaf(Some(key), false, Operation::Insert, &mut ctx)?.is_none() {
                // the tree emptied out between the check and the descent
                self.unlock_unpin(Operation::Insert, &mut ctx);
                continue;
            }

            let mut leaf = self.decode_last(Operation::Insert, &mut ctx)?;
            if leaf.leaf_lookup(key, &self.comparator).is_some() {
                self.unlock_unpin(Operation::Insert, &mut ctx);
                return Ok(false);
            }

            if leaf.size() < self.leaf_max_size as usize {
                leaf.leaf_insert(*key, rid, &self.comparator);
                self.write_node(&leaf, &mut ctx);
                self.unlock_unpin(Operation::Insert, &mut ctx);
                return Ok(true);
            }

            let result = self.split_leaf_and_insert(leaf, key, rid, &mut ctx);
            self.unlock_unpin(Operation::Insert, &mut ctx);
            return result.map(|_| true);
        }
    }

    fn start_new_tree(&self, key: &Key, rid: RecordId) -> Result<(), Error> {
        let (page_id, page) = self
            .bpm
            .new_page()
            .ok_or(Error::BufferPoolExhausted)?;
        let mut root = BTreeNode::new_leaf(page_id, INVALID_PAGE_ID, self.leaf_max_size);
        root.leaf_insert(*key, rid, &self.comparator);
        {
            let mut data = page.write();
            root.encode(&mut data);
        }
        self.root_page_id.store(page_id, Ordering::SeqCst);
        let result = self.publish_root();
        self.bpm.unpin_page(page_id, true);
        result
    }

    /// The leaf is full: carve off its upper half into a new right sibling,
    /// insert the record into whichever side covers it, relink the leaf
    /// chain, and push the sibling's first key up to the parent.
    fn split_leaf_and_insert(
        &self,
        mut leaf: BTreeNode,
        key: &Key,
        rid: RecordId,
        ctx: &mut Context,
    ) -> Result<(), Error> {
        let (sibling_id, sibling_page) = self.alloc_page(Operation::Insert, ctx)?;
        let mut sibling = BTreeNode::new_leaf(sibling_id, leaf.parent_page_id, self.leaf_max_size);

        let move_count = leaf.size() / 2;
        let split_at = leaf.size() - move_count;
        *sibling.leaf_entries_mut() = leaf.leaf_entries_mut().split_off(split_at);

        let sibling_low = sibling.leaf_entries()[0].0;
        if self.comparator.compare(key, &sibling_low) == std::cmp::Ordering::Less {
            leaf.leaf_insert(*key, rid, &self.comparator);
        } else {
            sibling.leaf_insert(*key, rid, &self.comparator);
        }

        sibling.set_next_page_id(leaf.next_page_id());
        leaf.set_next_page_id(sibling_id);

        let separator = sibling.leaf_entries()[0].0;
        let result = self.insert_into_parent(&mut leaf, separator, &mut sibling, &sibling_page, ctx);
        self.bpm.unpin_page(sibling_id, true);
        result
    }

    /// Wire a freshly split-off right node into the tree above `left`.
    ///
    /// Encodes `left` and `right` (with final parent pointers) before
    /// returning; `right` lives outside the context on its own pinned page,
    /// `left` and every ancestor it touches are reached through the
    /// context's retained latches.
    fn insert_into_parent(
        &self,
        left: &mut BTreeNode,
        key: Key,
        right: &mut BTreeNode,
        right_page: &Arc<Page>,
        ctx: &mut Context,
    ) -> Result<(), Error> {
        if left.is_root() {
            let (root_id, root_page) = self.alloc_page(Operation::Insert, ctx)?;
            let mut root = BTreeNode::new_internal(root_id, INVALID_PAGE_ID, self.internal_max_size);
            *root.internal_entries_mut() =
                vec![(Key::zeroed(), left.page_id), (key, right.page_id)];
            left.parent_page_id = root_id;
            right.parent_page_id = root_id;

            {
                let mut data = root_page.write();
                root.encode(&mut data);
            }
            self.write_node(left, ctx);
            {
                let mut data = right_page.write();
                right.encode(&mut data);
            }

            self.root_page_id.store(root_id, Ordering::SeqCst);
            let result = self.publish_root();
            self.bpm.unpin_page(root_id, true);
            return result;
        }

        let parent_id = left.parent_page_id;
        let parent_held = ctx
            .find(parent_id)
            .expect("parent of a splitting node is retained by the descent");
        let mut parent = BTreeNode::decode(parent_held.data())?;

        if parent.size() < self.internal_max_size as usize {
            parent.internal_insert_after(left.page_id, key, right.page_id);
            right.parent_page_id = parent_id;
            self.write_node(&parent, ctx);
            self.write_node(left, ctx);
            {
                let mut data = right_page.write();
                right.encode(&mut data);
            }
            return Ok(());
        }

        // The parent is full too. Build the would-be entry list in an
        // oversize scratch buffer, split it in half, and push the right
        // half's first key another level up.
        let mut buffer = parent.internal_entries().clone();
        let insert_at = buffer
            .iter()
            .position(|(_, child)| *child == left.page_id)
            .expect("splitting node missing from its parent")
            + 1;
        buffer.insert(insert_at, (key, right.page_id));

        let right_count = (self.internal_max_size as usize + 1) / 2;
        let split_at = buffer.len() - right_count;

        let (new_internal_id, new_internal_page) = self.alloc_page(Operation::Insert, ctx)?;
        let mut new_internal =
            BTreeNode::new_internal(new_internal_id, parent.parent_page_id, self.internal_max_size);
        *new_internal.internal_entries_mut() = buffer.split_off(split_at);
        *parent.internal_entries_mut() = buffer;

        // The right half's slot-0 key is pushed up and stays behind as the
        // new node's sentinel.
        let separator = new_internal.key_at(0);

        right.parent_page_id = parent_id;
        for i in 0..new_internal.size() {
            let child_id = new_internal.child_at(i);
            if child_id == right.page_id {
                right.parent_page_id = new_internal_id;
            } else if child_id == left.page_id {
                left.parent_page_id = new_internal_id;
            } else {
                self.set_child_parent(child_id, new_internal_id, Operation::Insert, ctx)?;
            }
        }

        self.write_node(left, ctx);
        {
            let mut data = right_page.write();
            right.encode(&mut data);
        }

        let result = self.insert_into_parent(
            &mut parent,
            separator,
            &mut new_internal,
            &new_internal_page,
            ctx,
        );
        self.bpm.unpin_page(new_internal_id, true);
        result
    }

    // ---- deletion ----------------------------------------------------------

    /// Delete a key. Missing keys are a silent no-op.
    pub fn remove(&self, key: &Key) -> Result<(), Error> {
        if self.is_empty() {
            return Ok(());
        }
        let mut ctx = Context::new();
        if self.find_leaf(Some(key), false, Operation::Delete, &mut ctx)?.is_none() {
            self.unlock_unpin(Operation::Delete, &mut ctx);
            return Ok(());
        }

        let mut leaf = self.decode_last(Operation::Delete, &mut ctx)?;
        if !leaf.leaf_remove(key, &self.comparator) {
            self.unlock_unpin(Operation::Delete, &mut ctx);
            return Ok(());
        }
        self.write_node(&leaf, &mut ctx);

        let result = self.coalesce_or_redistribute(&mut leaf, &mut ctx);
        self.unlock_unpin(Operation::Delete, &mut ctx);
        result
    }

    /// Restore the occupancy floor of an underfull node by borrowing from or
    /// merging with a sibling. Recurses up the retained ancestor path; pages
    /// that merge away are queued on the context for deletion.
    fn coalesce_or_redistribute(&self, node: &mut BTreeNode, ctx: &mut Context) -> Result<(), Error> {
        if node.is_root() {
            return self.adjust_root(node, ctx);
        }

        let underfull = if node.is_leaf() {
            node.size() < node.min_size()
        } else {
            node.size() <= node.min_size()
        };
        if !underfull {
            return Ok(());
        }

        let parent_id = node.parent_page_id;
        let parent_held = ctx
            .find(parent_id)
            .expect("parent of an underfull node is retained by the descent");
        let mut parent = BTreeNode::decode(parent_held.data())?;
        let node_index = parent
            .child_index(node.page_id)
            .expect("underfull node missing from its parent");

        // Leftmost nodes borrow from the right neighbor, everyone else from
        // the left.
        let sibling_index = if node_index == 0 { 1 } else { node_index - 1 };
        let sibling_id = parent.child_at(sibling_index);

        let Some(sibling_page) = self.bpm.fetch_page(sibling_id) else {
            self.unlock_unpin(Operation::Delete, ctx);
            return Err(Error::BufferPoolExhausted);
        };
        ctx.push(HeldPage::write(sibling_page));
        let mut sibling = self.decode_last(Operation::Delete, ctx)?;

        if sibling.size() + node.size() > node.max_size as usize {
            return self.redistribute(&mut sibling, node, &mut parent, node_index, ctx);
        }

        if node_index == 0 {
            // right sibling folds into node; the separator at slot 1 goes away
            self.merge_into(node, &mut sibling, &mut parent, 1, ctx)?;
            ctx.mark_deleted(sibling_id);
        } else {
            self.merge_into(&mut sibling, node, &mut parent, node_index, ctx)?;
            ctx.mark_deleted(node.page_id);
        }
        self.coalesce_or_redistribute(&mut parent, ctx)
    }

    /// Move everything from `source` into `recipient` (its left neighbor in
    /// key order is always the recipient) and drop the separator from the
    /// parent. Children of a merged internal node are re-parented.
    fn merge_into(
        &self,
        recipient: &mut BTreeNode,
        source: &mut BTreeNode,
        parent: &mut BTreeNode,
        separator_index: usize,
        ctx: &mut Context,
    ) -> Result<(), Error> {
        if recipient.is_leaf() {
            let next = source.next_page_id();
            let moved = std::mem::take(source.leaf_entries_mut());
            recipient.leaf_entries_mut().extend(moved);
            recipient.set_next_page_id(next);
        } else {
            // the separator comes down onto the source's sentinel slot
            let separator = parent.key_at(separator_index);
            let mut moved = std::mem::take(source.internal_entries_mut());
            moved[0].0 = separator;
            for (_, child_id) in &moved {
                self.set_child_parent(*child_id, recipient.page_id, Operation::Delete, ctx)?;
            }
            recipient.internal_entries_mut().extend(moved);
        }

        parent.internal_remove(separator_index);
        self.write_node(recipient, ctx);
        self.write_node(parent, ctx);
        Ok(())
    }

    /// Shift one entry from the sibling into the underfull node and refresh
    /// the separator between them.
    fn redistribute(
        &self,
        sibling: &mut BTreeNode,
        node: &mut BTreeNode,
        parent: &mut BTreeNode,
        node_index: usize,
        ctx: &mut Context,
    ) -> Result<(), Error> {
        if node_index == 0 {
            // sibling is the right neighbor: its first entry becomes node's tail
            if node.is_leaf() {
                let moved = sibling.leaf_entries_mut().remove(0);
                node.leaf_entries_mut().push(moved);
                let new_separator = sibling.leaf_entries()[0].0;
                parent.set_key_at(1, new_separator);
            } else {
                let old_separator = parent.key_at(1);
                let moved_child = sibling.child_at(0);
                let new_separator = sibling.key_at(1);
                sibling.internal_remove(0);
                node.internal_entries_mut().push((old_separator, moved_child));
                parent.set_key_at(1, new_separator);
                self.set_child_parent(moved_child, node.page_id, Operation::Delete, ctx)?;
            }
        } else {
            // sibling is the left neighbor: its last entry becomes node's head
            if node.is_leaf() {
                let moved = sibling
                    .leaf_entries_mut()
                    .pop()
                    .expect("redistribute from an empty sibling");
                node.leaf_entries_mut().insert(0, moved);
                parent.set_key_at(node_index, moved.0);
            } else {
                let (moved_key, moved_child) = sibling
                    .internal_entries_mut()
                    .pop()
                    .expect("redistribute from an empty sibling");
                let old_separator = parent.key_at(node_index);
                let old_first_child = node.child_at(0);
                {
                    let entries = node.internal_entries_mut();
                    entries[0].1 = moved_child;
                    entries.insert(1, (old_separator, old_first_child));
                }
                parent.set_key_at(node_index, moved_key);
                self.set_child_parent(moved_child, node.page_id, Operation::Delete, ctx)?;
            }
        }

        self.write_node(sibling, ctx);
        self.write_node(node, ctx);
        self.write_node(parent, ctx);
        Ok(())
    }

    /// The root dropped below the normal rules: an empty leaf root empties
    /// the tree, an internal root with a single child hands the root role to
    /// that child.
    fn adjust_root(&self, old_root: &mut BTreeNode, ctx: &mut Context) -> Result<(), Error> {
        if old_root.is_leaf() {
            if old_root.size() == 0 {
                self.root_page_id.store(INVALID_PAGE_ID, Ordering::SeqCst);
                self.publish_root()?;
                ctx.mark_deleted(old_root.page_id);
            }
            return Ok(());
        }

        if old_root.size() == 1 {
            let child_id = old_root.child_at(0);
            self.root_page_id.store(child_id, Ordering::SeqCst);
            self.publish_root()?;
            self.set_child_parent(child_id, INVALID_PAGE_ID, Operation::Delete, ctx)?;
            ctx.mark_deleted(old_root.page_id);
        }
        Ok(())
    }

    // ---- iteration ---------------------------------------------------------

    /// Forward iterator positioned on the first key of the tree.
    pub fn iter(&self) -> Result<TreeIterator, Error> {
        self.make_iterator(None)
    }

    /// Forward iterator positioned on the first key >= `key`.
    pub fn iter_from(&self, key: &Key) -> Result<TreeIterator, Error> {
        self.make_iterator(Some(key))
    }

    fn make_iterator(&self, key: Option<&Key>) -> Result<TreeIterator, Error> {
        if self.is_empty() {
            return Ok(TreeIterator::exhausted(Arc::clone(&self.bpm)));
        }
        let mut ctx = Context::new();
        if self
            .find_leaf(key, key.is_none(), Operation::Read, &mut ctx)?
            .is_none()
        {
            self.unlock_unpin(Operation::Read, &mut ctx);
            return Ok(TreeIterator::exhausted(Arc::clone(&self.bpm)));
        }

        let leaf = self.decode_last(Operation::Read, &mut ctx)?;
        let index = match key {
            Some(key) => leaf.leaf_key_index(key, &self.comparator),
            None => 0,
        };

        // The iterator takes over the leaf's pin; the latch drops here.
        let page = ctx.pop_keeping_pin();
        self.unlock_unpin(Operation::Read, &mut ctx);
        Ok(TreeIterator::new(Arc::clone(&self.bpm), leaf, page, index))
    }

    // ---- descent and release -----------------------------------------------

    /// Safe nodes cannot propagate the operation's structure change upward.
    fn is_safe(node: &BTreeNode, op: Operation) -> bool {
        match op {
            Operation::Read => true,
            Operation::Insert => node.size() < node.max_size as usize,
            Operation::Delete => node.size() > node.min_size() + 1,
        }
    }

    /// Latch-crabbing descent to the leaf covering `key` (or the leftmost
    /// leaf). Latched pages accumulate in the context; on success the leaf
    /// is the most recently held page. Returns `None` for an empty tree.
    /// Errors release everything before propagating.
    pub(crate) fn find_leaf(
        &self,
        key: Option<&Key>,
        leftmost: bool,
        op: Operation,
        ctx: &mut Context,
    ) -> Result<Option<PageId>, Error> {
        if op != Operation::Read {
            self.root_latch.lock();
            ctx.root_locked = true;
        }

        // Latch the root, retrying if a concurrent structure change swapped
        // the root between the id read and the latch acquisition (readers do
        // not serialise on the tree lock).
        loop {
            let root_id = self.root_page_id();
            if root_id == INVALID_PAGE_ID {
                return Ok(None);
            }
            let Some(page) = self.bpm.fetch_page(root_id) else {
                self.unlock_unpin(op, ctx);
                return Err(Error::BufferPoolExhausted);
            };
            ctx.push(Self::latch(page, op));
            if self.root_page_id() == root_id {
                break;
            }
            let held = ctx.held.pop().expect("root just latched");
            let page_id = held.page_id();
            drop(held);
            self.bpm.unpin_page(page_id, false);
        }

        loop {
            let node = self.decode_last(op, ctx)?;
            if node.is_leaf() {
                return Ok(Some(node.page_id));
            }

            let child_id = if leftmost {
                node.child_at(0)
            } else {
                node.internal_lookup(key.expect("keyed descent without a key"), &self.comparator)
            };
            let Some(child_page) = self.bpm.fetch_page(child_id) else {
                self.unlock_unpin(op, ctx);
                return Err(Error::BufferPoolExhausted);
            };
            ctx.push(Self::latch(child_page, op));

            match op {
                Operation::Read => {
                    // readers drop each parent as soon as the child is latched
                    self.release_ancestors(ctx, false);
                }
                Operation::Insert | Operation::Delete => {
                    let child = self.decode_last(op, ctx)?;
                    if Self::is_safe(&child, op) {
                        self.release_ancestors(ctx, true);
                        if ctx.root_locked {
                            self.root_latch.unlock();
                            ctx.root_locked = false;
                        }
                    }
                }
            }
        }
    }

    fn latch(page: Arc<Page>, op: Operation) -> HeldPage {
        match op {
            Operation::Read => HeldPage::read(page),
            Operation::Insert | Operation::Delete => HeldPage::write(page),
        }
    }

    /// Release every held page except the most recent one.
    fn release_ancestors(&self, ctx: &mut Context, dirty: bool) {
        for held in ctx.drain_ancestors() {
            let page_id = held.page_id();
            drop(held);
            self.bpm.unpin_page(page_id, dirty);
        }
    }

    /// Release everything an operation still holds: each latch in its mode,
    /// each pin (dirty iff the operation writes), then any pages queued for
    /// deletion, then the tree lock. Safe to call more than once.
    pub(crate) fn unlock_unpin(&self, op: Operation, ctx: &mut Context) {
        for held in ctx.drain_all() {
            let page_id = held.page_id();
            drop(held);
            self.bpm.unpin_page(page_id, op != Operation::Read);
        }

        let deleted: Vec<PageId> = ctx.deleted.drain().collect();
        for page_id in deleted {
            self.bpm.delete_page(page_id);
        }

        if ctx.root_locked {
            self.root_latch.unlock();
            ctx.root_locked = false;
        }
    }

    // ---- shared helpers ----------------------------------------------------

    fn decode_last(&self, op: Operation, ctx: &mut Context) -> Result<BTreeNode, Error> {
        match BTreeNode::decode(ctx.last().data()) {
            Ok(node) => Ok(node),
            Err(error) => {
                self.unlock_unpin(op, ctx);
                Err(error)
            }
        }
    }

    /// Encode a node back into its latched page.
    fn write_node(&self, node: &BTreeNode, ctx: &mut Context) {
        let held = ctx
            .find_mut(node.page_id)
            .expect("node page is no longer latched");
        node.encode(held.data_mut());
    }

    fn alloc_page(&self, op: Operation, ctx: &mut Context) -> Result<(PageId, Arc<Page>), Error> {
        match self.bpm.new_page() {
            Some(pair) => Ok(pair),
            None => {
                self.unlock_unpin(op, ctx);
                Err(Error::BufferPoolExhausted)
            }
        }
    }

    /// Point a child's parent pointer at a new owner. The child may be a
    /// page this very operation already holds (the descent path or a latched
    /// sibling); re-latching it would self-deadlock, so the context is
    /// consulted first.
    fn set_child_parent(
        &self,
        child_id: PageId,
        parent_id: PageId,
        op: Operation,
        ctx: &mut Context,
    ) -> Result<(), Error> {
        if let Some(held) = ctx.find_mut(child_id) {
            let mut child = BTreeNode::decode(held.data())?;
            child.parent_page_id = parent_id;
            child.encode(held.data_mut());
            return Ok(());
        }

        let Some(page) = self.bpm.fetch_page(child_id) else {
            self.unlock_unpin(op, ctx);
            return Err(Error::BufferPoolExhausted);
        };
        let result = (|| {
            let mut data = page.write();
            let mut child = BTreeNode::decode(&data)?;
            child.parent_page_id = parent_id;
            child.encode(&mut data);
            Ok(())
        })();
        self.bpm.unpin_page(child_id, true);
        result
    }

    /// Record the current root page id in the header page under this
    /// index's name, registering the name on first use.
    fn publish_root(&self) -> Result<(), Error> {
        let root_id = self.root_page_id();
        let page = self
            .bpm
            .fetch_page(HEADER_PAGE_ID)
            .ok_or(Error::BufferPoolExhausted)?;
        {
            let mut data = page.write();
            if !header_page::update_record(&mut data, &self.index_name, root_id) {
                header_page::insert_record(&mut data, &self.index_name, root_id);
            }
        }
        self.bpm.unpin_page(HEADER_PAGE_ID, true);
        Ok(())
    }
}

#[cfg(test)]
impl<C: KeyComparator> BPlusTree<C> {
    /// Walk the leaf chain and return each leaf's entry count, left to
    /// right. Test-only, assumes no concurrent writers.
    pub(crate) fn leaf_occupancy(&self) -> Vec<usize> {
        let mut sizes = Vec::new();
        let mut page_id = match self.leftmost_leaf() {
            Some(page_id) => page_id,
            None => return sizes,
        };
        while page_id != INVALID_PAGE_ID {
            let page = self.bpm.fetch_page(page_id).expect("leaf fetch");
            let node = {
                let data = page.read();
                BTreeNode::decode(&data).expect("leaf decode")
            };
            self.bpm.unpin_page(page_id, false);
            sizes.push(node.size());
            page_id = node.next_page_id();
        }
        sizes
    }

    fn leftmost_leaf(&self) -> Option<PageId> {
        let mut page_id = self.root_page_id();
        if page_id == INVALID_PAGE_ID {
            return None;
        }
        loop {
            let page = self.bpm.fetch_page(page_id).expect("node fetch");
            let node = {
                let data = page.read();
                BTreeNode::decode(&data).expect("node decode")
            };
            self.bpm.unpin_page(page_id, false);
            if node.is_leaf() {
                return Some(page_id);
            }
            page_id = node.child_at(0);
        }
    }

    /// Structural audit: equal leaf depth, parent pointers, occupancy
    /// bounds, in-node ordering and separator windows, and an ascending
    /// leaf chain. Panics on the first violation. Test-only.
    pub(crate) fn verify_integrity(&self) {
        let root_id = self.root_page_id();
        if root_id == INVALID_PAGE_ID {
            return;
        }

        let mut leaf_depths = Vec::new();
        self.verify_node(root_id, INVALID_PAGE_ID, None, None, 0, &mut leaf_depths);
        assert!(
            leaf_depths.windows(2).all(|w| w[0] == w[1]),
            "leaves at unequal depths: {:?}",
            leaf_depths
        );

        // leaf chain must ascend globally
        let mut previous: Option<Key> = None;
        let mut page_id = self.leftmost_leaf().expect("non-empty tree has a leaf");
        while page_id != INVALID_PAGE_ID {
            let page = self.bpm.fetch_page(page_id).expect("leaf fetch");
            let node = {
                let data = page.read();
                BTreeNode::decode(&data).expect("leaf decode")
            };
            self.bpm.unpin_page(page_id, false);
            for (key, _) in node.leaf_entries() {
                if let Some(prev) = previous {
                    assert_eq!(
                        self.comparator.compare(&prev, key),
                        std::cmp::Ordering::Less,
                        "leaf chain out of order"
                    );
                }
                previous = Some(*key);
            }
            page_id = node.next_page_id();
        }
    }

    fn verify_node(
        &self,
        page_id: PageId,
        expected_parent: PageId,
        lower: Option<Key>,
        upper: Option<Key>,
        depth: usize,
        leaf_depths: &mut Vec<usize>,
    ) {
        let page = self.bpm.fetch_page(page_id).expect("node fetch");
        let node = {
            let data = page.read();
            BTreeNode::decode(&data).expect("node decode")
        };
        self.bpm.unpin_page(page_id, false);

        assert_eq!(node.page_id, page_id, "self page id mismatch");
        assert_eq!(node.parent_page_id, expected_parent, "parent pointer mismatch");
        if !node.is_root() {
            assert!(node.size() >= node.min_size(), "underfull node {}", page_id);
        }
        assert!(node.size() <= node.max_size as usize, "overfull node {}", page_id);

        let in_window = |key: &Key| {
            if let Some(low) = &lower {
                if self.comparator.compare(key, low) == std::cmp::Ordering::Less {
                    return false;
                }
            }
            if let Some(high) = &upper {
                if self.comparator.compare(key, high) != std::cmp::Ordering::Less {
                    return false;
                }
            }
            true
        };

        if node.is_leaf() {
            leaf_depths.push(depth);
            let entries = node.leaf_entries();
            for window in entries.windows(2) {
                assert_eq!(
                    self.comparator.compare(&window[0].0, &window[1].0),
                    std::cmp::Ordering::Less,
                    "leaf keys out of order in {}",
                    page_id
                );
            }
            for (key, _) in entries {
                assert!(in_window(key), "leaf key outside separator window in {}", page_id);
            }
            return;
        }

        let entries = node.internal_entries();
        assert!(entries.len() > 1, "internal node with a single child: {}", page_id);
        for window in entries[1..].windows(2) {
            assert_ne!(
                self.comparator.compare(&window[0].0, &window[1].0),
                std::cmp::Ordering::Greater,
                "separators out of order in {}",
                page_id
            );
        }
        for (key, _) in &entries[1..] {
            assert!(in_window(key), "separator outside window in {}", page_id);
        }

        for (i, (_, child)) in entries.iter().enumerate() {
            let child_lower = if i == 0 { lower } else { Some(entries[i].0) };
            let child_upper = if i + 1 < entries.len() {
                Some(entries[i + 1].0)
            } else {
                upper
            };
            self.verify_node(*child, page_id, child_lower, child_upper, depth + 1, leaf_depths);
        }
    }
}

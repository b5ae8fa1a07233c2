use hashlink::LinkedHashMap;
use parking_lot::Mutex;

use crate::storage::page::page::FrameId;

/// Least-recently-used victim picker over *unpinned* resident frames.
///
/// The replacer only tracks eviction eligibility; it knows nothing about page
/// ids, dirtiness or pin counts. The buffer pool tells it when a frame
/// becomes eligible (`unpin`) or stops being eligible (`pin`), and asks it
/// for the coldest frame (`victim`) when no free frame is left.
///
/// Backed by an insertion-ordered hash map: most-recently-unpinned entries
/// at the back, victims popped from the front. All operations are O(1) and
/// serialised under a single mutex.
pub struct LruReplacer {
    inner: Mutex<LruState>,
}

struct LruState {
    frames: LinkedHashMap<FrameId, ()>,
    capacity: usize,
}

impl LruReplacer {
    pub fn new(capacity: usize) -> Self {
        LruReplacer {
            inner: Mutex::new(LruState {
                frames: LinkedHashMap::with_capacity(capacity),
                capacity,
            }),
        }
    }

    /// Mark a frame eligible for eviction. Re-unpinning a tracked frame is a
    /// no-op (it keeps its place in the order). Growing past capacity cannot
    /// happen in correct use; the oldest entry is dropped silently if it does.
    pub fn unpin(&self, frame_id: FrameId) {
        let mut state = self.inner.lock();
        if state.frames.contains_key(&frame_id) {
            return;
        }
        state.frames.insert(frame_id, ());
        if state.frames.len() > state.capacity {
            state.frames.pop_front();
        }
    }

    /// Withdraw a frame from eviction consideration. Absent frames are a
    /// no-op.
    pub fn pin(&self, frame_id: FrameId) {
        self.inner.lock().frames.remove(&frame_id);
    }

    /// Remove and return the least recently unpinned frame.
    pub fn victim(&self) -> Option<FrameId> {
        self.inner.lock().frames.pop_front().map(|(frame_id, _)| frame_id)
    }

    /// Number of frames currently eligible for eviction.
    pub fn size(&self) -> usize {
        self.inner.lock().frames.len()
    }
}

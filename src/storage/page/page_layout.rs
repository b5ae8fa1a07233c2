//! On-disk layout of index node pages and the header page.
//!
//! Every node page starts with the same 24-byte header; leaves add a next-leaf
//! pointer before their pair array, internals start their pair array right
//! after the common header. All integers are little-endian.

/// A single page size. Each page holds one node of the tree.
pub const PAGE_SIZE: usize = 4096;

pub type PageBuf = [u8; PAGE_SIZE];

/// Page id type used across the storage layer. `INVALID_PAGE_ID` serialises
/// as `0xFFFF_FFFF`, the two's-complement image of the original C-style `-1`.
pub type PageId = u32;
pub const INVALID_PAGE_ID: PageId = u32::MAX;

/// The header page holding the index-name -> root-page-id registry always
/// occupies page 0 of the database file.
pub const HEADER_PAGE_ID: PageId = 0;

/// Common node header layout (24 bytes in total).
pub const PAGE_TYPE_OFFSET: usize = 0;
pub const SIZE_OFFSET: usize = 4;
pub const MAX_SIZE_OFFSET: usize = 8;
pub const PARENT_PAGE_ID_OFFSET: usize = 12;
pub const PAGE_ID_OFFSET: usize = 16;
// Bytes 20..24 are reserved. The original kept the page LSN here; this crate
// tracks the LSN in frame metadata and leaves the bytes zeroed.
pub const COMMON_HEADER_SIZE: usize = 24;

/// Page type discriminants stored at `PAGE_TYPE_OFFSET`.
pub const INVALID_PAGE_TYPE: u32 = 0;
pub const LEAF_PAGE_TYPE: u32 = 1;
pub const INTERNAL_PAGE_TYPE: u32 = 2;

/// Leaf header adds the next-leaf pointer; the pair array follows.
pub const NEXT_PAGE_ID_OFFSET: usize = COMMON_HEADER_SIZE;
pub const LEAF_ARRAY_OFFSET: usize = COMMON_HEADER_SIZE + 4;

/// Internal pages put their pair array right after the common header.
/// Slot 0's key bytes are written but never compared.
pub const INTERNAL_ARRAY_OFFSET: usize = COMMON_HEADER_SIZE;

/// Key and value sizes. Keys are fixed-width byte strings; leaf values are
/// record ids (page id + slot), internal values are child page ids.
pub const KEY_SIZE: usize = 8;
pub const RECORD_ID_SIZE: usize = 8;
pub const LEAF_ENTRY_SIZE: usize = KEY_SIZE + RECORD_ID_SIZE;
pub const INTERNAL_ENTRY_SIZE: usize = KEY_SIZE + 4;

/// Hard fanout ceilings implied by the page size.
pub const MAX_LEAF_SIZE: usize = (PAGE_SIZE - LEAF_ARRAY_OFFSET) / LEAF_ENTRY_SIZE;
pub const MAX_INTERNAL_SIZE: usize = (PAGE_SIZE - INTERNAL_ARRAY_OFFSET) / INTERNAL_ENTRY_SIZE;

/// Header page layout: a u32 record count, then fixed-width records of
/// (NUL-padded name, root page id).
pub const HEADER_RECORD_COUNT_OFFSET: usize = 0;
pub const HEADER_RECORDS_OFFSET: usize = 4;
pub const HEADER_NAME_SIZE: usize = 32;
pub const HEADER_RECORD_SIZE: usize = HEADER_NAME_SIZE + 4;
pub const MAX_HEADER_RECORDS: usize = (PAGE_SIZE - HEADER_RECORDS_OFFSET) / HEADER_RECORD_SIZE;

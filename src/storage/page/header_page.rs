//! The header page: a registry mapping index names to root page ids.
//!
//! Lives at `HEADER_PAGE_ID` (page 0). The tree rewrites its record through
//! here every time its root page id changes. Records are fixed width so the
//! page can be scanned without a directory.

use std::io::{Cursor, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::storage::page::page_layout::{
    PageBuf, PageId, HEADER_NAME_SIZE, HEADER_RECORDS_OFFSET, HEADER_RECORD_COUNT_OFFSET,
    HEADER_RECORD_SIZE, MAX_HEADER_RECORDS,
};

fn record_count(data: &PageBuf) -> usize {
    let mut cursor = Cursor::new(&data[..]);
    cursor
        .seek(SeekFrom::Start(HEADER_RECORD_COUNT_OFFSET as u64))
        .expect("header page seek");
    cursor.read_u32::<LittleEndian>().expect("header page read") as usize
}

fn set_record_count(data: &mut PageBuf, count: usize) {
    let mut cursor = Cursor::new(&mut data[..]);
    cursor
        .seek(SeekFrom::Start(HEADER_RECORD_COUNT_OFFSET as u64))
        .expect("header page seek");
    cursor
        .write_u32::<LittleEndian>(count as u32)
        .expect("header page write");
}

fn record_offset(index: usize) -> usize {
    HEADER_RECORDS_OFFSET + index * HEADER_RECORD_SIZE
}

fn name_at(data: &PageBuf, index: usize) -> &[u8] {
    let offset = record_offset(index);
    let raw = &data[offset..offset + HEADER_NAME_SIZE];
    let end = raw.iter().position(|&b| b == 0).unwrap_or(HEADER_NAME_SIZE);
    &raw[..end]
}

fn find_record(data: &PageBuf, name: &str) -> Option<usize> {
    (0..record_count(data)).find(|&i| name_at(data, i) == name.as_bytes())
}

fn write_record(data: &mut PageBuf, index: usize, name: &str, root_page_id: PageId) {
    let offset = record_offset(index);
    let name_bytes = name.as_bytes();
    assert!(name_bytes.len() <= HEADER_NAME_SIZE, "index name too long");

    data[offset..offset + HEADER_NAME_SIZE].fill(0);
    data[offset..offset + name_bytes.len()].copy_from_slice(name_bytes);

    let mut cursor = Cursor::new(&mut data[..]);
    cursor
        .seek(SeekFrom::Start((offset + HEADER_NAME_SIZE) as u64))
        .expect("header page seek");
    cursor
        .write_u32::<LittleEndian>(root_page_id)
        .expect("header page write");
}

/// Zero out a freshly allocated header page.
pub fn init(data: &mut PageBuf) {
    data.fill(0);
}

/// Register a new index. Returns false if the name already has a record or
/// the page is full.
pub fn insert_record(data: &mut PageBuf, name: &str, root_page_id: PageId) -> bool {
    if find_record(data, name).is_some() {
        return false;
    }
    let count = record_count(data);
    if count >= MAX_HEADER_RECORDS {
        return false;
    }
    write_record(data, count, name, root_page_id);
    set_record_count(data, count + 1);
    true
}

/// Rewrite the root page id of an existing record. Returns false if the name
/// is not registered.
pub fn update_record(data: &mut PageBuf, name: &str, root_page_id: PageId) -> bool {
    match find_record(data, name) {
        Some(index) => {
            write_record(data, index, name, root_page_id);
            true
        }
        None => false,
    }
}

/// Look up the root page id recorded for an index name.
pub fn get_root_id(data: &PageBuf, name: &str) -> Option<PageId> {
    let index = find_record(data, name)?;
    let offset = record_offset(index) + HEADER_NAME_SIZE;
    let mut cursor = Cursor::new(&data[..]);
    cursor
        .seek(SeekFrom::Start(offset as u64))
        .expect("header page seek");
    Some(cursor.read_u32::<LittleEndian>().expect("header page read"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::page_layout::PAGE_SIZE;

    #[test]
    fn records_round_trip() {
        let mut data = [0u8; PAGE_SIZE];
        init(&mut data);

        assert!(insert_record(&mut data, "orders_pk", 7));
        assert!(insert_record(&mut data, "users_pk", 12));
        assert!(!insert_record(&mut data, "orders_pk", 9), "duplicate name");

        assert_eq!(get_root_id(&data, "orders_pk"), Some(7));
        assert_eq!(get_root_id(&data, "users_pk"), Some(12));
        assert_eq!(get_root_id(&data, "missing"), None);

        assert!(update_record(&mut data, "orders_pk", 42));
        assert_eq!(get_root_id(&data, "orders_pk"), Some(42));
        assert!(!update_record(&mut data, "missing", 1));
    }
}

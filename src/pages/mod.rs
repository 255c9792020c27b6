pub(crate) mod data_page;
pub(crate) mod file_hdr;

pub use data_page::{DATA_HDR_SIZE, DP_FIXED, MAX_REC_SIZE, SLOT_SIZE};
pub use file_hdr::MAX_NAME_SIZE;

pub const PAGE_SIZE: usize = 8192; // 8 KBs
pub const INVALID_PAGE: PageId = -1;

pub type PageId = i32;

/// Record identifier: the page a record lives on plus its slot on that page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rid {
    pub page_no: PageId,
    pub slot_no: i32,
}

/// "no record" sentinel, used for unpositioned scan cursors
pub const NULL_RID: Rid = Rid {
    page_no: INVALID_PAGE,
    slot_no: -1,
};

/// A fixed-size frame of [`PAGE_SIZE`] bytes, the unit of disk I/O and of
/// buffer pool caching. Structured views (the slotted data page and the heap
/// file header) are layered on top through accessor methods; every multi-byte
/// field is little-endian at a documented offset, so the bytes mean the same
/// thing on disk and in memory.
pub struct Page {
    data: [u8; PAGE_SIZE],
}

impl Default for Page {
    fn default() -> Self {
        Page::new()
    }
}

impl Page {
    pub fn new() -> Self {
        Page {
            data: [0u8; PAGE_SIZE],
        }
    }

    pub fn as_bytes(&self) -> &[u8; PAGE_SIZE] {
        &self.data
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8; PAGE_SIZE] {
        &mut self.data
    }

    fn read_i32(&self, offset: usize) -> i32 {
        i32::from_le_bytes(self.data[offset..offset + 4].try_into().unwrap())
    }

    fn write_i32(&mut self, offset: usize, value: i32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
}

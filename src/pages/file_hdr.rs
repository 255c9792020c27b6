use arrayvec::ArrayString;

use super::{Page, PageId};

// Heap file header layout, occupying the first page of every heap file:
// a NUL-padded file name followed by four i32 fields. The rest of the page
// is reserved.
pub const MAX_NAME_SIZE: usize = 32;

const FIRST_PAGE_OFFSET: usize = MAX_NAME_SIZE;
const LAST_PAGE_OFFSET: usize = MAX_NAME_SIZE + 4;
const PAGE_CNT_OFFSET: usize = MAX_NAME_SIZE + 8;
const REC_CNT_OFFSET: usize = MAX_NAME_SIZE + 12;

/// Typed view over a heap file's header page. The accessors read and write
/// the pinned frame directly, so the bytes handed to the buffer pool are
/// always current.
impl Page {
    /// Reset this frame to a fresh heap file header describing a file with a
    /// single empty data page.
    pub fn init_file_hdr(&mut self, file_name: &str, data_page: PageId) {
        self.data.fill(0);
        self.set_file_name(file_name);
        self.write_i32(FIRST_PAGE_OFFSET, data_page);
        self.write_i32(LAST_PAGE_OFFSET, data_page);
        self.write_i32(PAGE_CNT_OFFSET, 1);
        self.write_i32(REC_CNT_OFFSET, 0);
    }

    pub fn file_name(&self) -> ArrayString<MAX_NAME_SIZE> {
        let bytes = &self.data[..MAX_NAME_SIZE];
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(MAX_NAME_SIZE);
        std::str::from_utf8(&bytes[..end])
            .ok()
            .and_then(|name| ArrayString::from(name).ok())
            .unwrap_or_default()
    }

    fn set_file_name(&mut self, name: &str) {
        // truncate to what fits, always leaving a NUL terminator
        let bytes = name.as_bytes();
        let len = bytes.len().min(MAX_NAME_SIZE - 1);
        self.data[..MAX_NAME_SIZE].fill(0);
        self.data[..len].copy_from_slice(&bytes[..len]);
    }

    pub fn first_page(&self) -> PageId {
        self.read_i32(FIRST_PAGE_OFFSET)
    }

    pub fn last_page(&self) -> PageId {
        self.read_i32(LAST_PAGE_OFFSET)
    }

    pub fn set_last_page(&mut self, page_no: PageId) {
        self.write_i32(LAST_PAGE_OFFSET, page_no);
    }

    pub fn page_cnt(&self) -> i32 {
        self.read_i32(PAGE_CNT_OFFSET)
    }

    pub fn set_page_cnt(&mut self, count: i32) {
        self.write_i32(PAGE_CNT_OFFSET, count);
    }

    pub fn rec_cnt(&self) -> i32 {
        self.read_i32(REC_CNT_OFFSET)
    }

    pub fn set_rec_cnt(&mut self, count: i32) {
        self.write_i32(REC_CNT_OFFSET, count);
    }
}

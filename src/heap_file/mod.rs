pub(crate) mod scan;

pub use scan::{HeapFileScan, InsertFileScan};

use crate::buffer_pool::{ArcBufferPool, FrameId};
use crate::disk_manager::{DbFile, DiskManager};
use crate::errors::Error;
use crate::pages::{PageId, Rid, INVALID_PAGE, NULL_RID};
use crate::printdbg;
use anyhow::{bail, Result};
use std::sync::Arc;

/// An owned copy of a record's bytes, taken while the source page was pinned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    data: Vec<u8>,
}

impl Record {
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<&[u8]> for Record {
    fn from(bytes: &[u8]) -> Self {
        Record {
            data: bytes.to_vec(),
        }
    }
}

/// Create a heap file: a header page followed by one empty data page.
/// Failure paths tear down whatever was already acquired, including the
/// half-created file.
pub fn create_heap_file(disk: &DiskManager, bpm: &ArcBufferPool, name: &str) -> Result<()> {
    if disk.open_file(name).is_ok() {
        bail!(Error::FileExists(name.to_string()));
    }

    disk.create_file(name)?;
    let file = match disk.open_file(name) {
        Ok(file) => file,
        Err(e) => {
            let _ = disk.destroy_file(name);
            return Err(e.into());
        }
    };

    let mut bpm = bpm.lock();
    let (hdr_page_no, hdr_frame) = match bpm.alloc_page(&file) {
        Ok(allocated) => allocated,
        Err(e) => {
            drop(bpm);
            drop(file);
            let _ = disk.destroy_file(name);
            return Err(e.into());
        }
    };
    let (data_page_no, data_frame) = match bpm.alloc_page(&file) {
        Ok(allocated) => allocated,
        Err(e) => {
            // release the header page so the frame can be reclaimed
            let _ = bpm.unpin_page(&file, hdr_page_no, false);
            drop(bpm);
            drop(file);
            let _ = disk.destroy_file(name);
            return Err(e.into());
        }
    };

    bpm.page_mut(data_frame).init();
    bpm.page_mut(hdr_frame).init_file_hdr(name, data_page_no);

    // both pages were modified
    bpm.unpin_page(&file, hdr_page_no, true)?;
    bpm.unpin_page(&file, data_page_no, true)?;

    printdbg!("created heap file {}", name);
    Ok(())
}

pub fn destroy_heap_file(disk: &DiskManager, name: &str) -> Result<()> {
    disk.destroy_file(name)?;
    Ok(())
}

/// An open heap file: the pinned header page plus a cursor that owns at most
/// one pin on a data page at a time. Every cursor move pairs the unpin of the
/// old page with the pin of the new one.
pub struct HeapFile {
    file: Arc<DbFile>,
    bpm: ArcBufferPool,
    hdr_page_no: PageId,
    hdr_frame: FrameId,
    hdr_dirty: bool,
    cur_frame: Option<FrameId>,
    cur_page_no: PageId,
    cur_dirty: bool,
    cur_rec: Rid,
}

impl HeapFile {
    /// Open the underlying file and pin the header page and the first data
    /// page.
    pub fn open(disk: &DiskManager, bpm: ArcBufferPool, name: &str) -> Result<Self> {
        let file = disk.open_file(name)?;
        let hdr_page_no = file.get_first_page()?;

        let mut guard = bpm.lock();
        let hdr_frame = guard.read_page(&file, hdr_page_no)?;

        let first_page = guard.page(hdr_frame).first_page();
        let cur_frame = match guard.read_page(&file, first_page) {
            Ok(frame) => frame,
            Err(e) => {
                let _ = guard.unpin_page(&file, hdr_page_no, false);
                return Err(e.into());
            }
        };
        drop(guard);

        printdbg!("opened heap file {}", name);

        Ok(Self {
            file,
            bpm,
            hdr_page_no,
            hdr_frame,
            hdr_dirty: false,
            cur_frame: Some(cur_frame),
            cur_page_no: first_page,
            cur_dirty: false,
            cur_rec: NULL_RID,
        })
    }

    pub fn rec_cnt(&self) -> i32 {
        self.bpm.lock().page(self.hdr_frame).rec_cnt()
    }

    pub fn page_cnt(&self) -> i32 {
        self.bpm.lock().page(self.hdr_frame).page_cnt()
    }

    /// Fetch a record by id, moving the cursor to its page if it is not
    /// already there.
    pub fn get_record(&mut self, rid: Rid) -> Result<Record> {
        let mut bpm = self.bpm.lock();

        if let Some(frame) = self.cur_frame {
            if self.cur_page_no == rid.page_no {
                let bytes = bpm.page(frame).record(rid)?;
                return Ok(Record::from(bytes));
            }
            bpm.unpin_page(&self.file, self.cur_page_no, self.cur_dirty)?;
            self.cur_frame = None;
            self.cur_page_no = INVALID_PAGE;
            self.cur_dirty = false;
            self.cur_rec = NULL_RID;
        }

        // data pages live between the header page and page_cnt
        if rid.page_no < 1 || rid.page_no > bpm.page(self.hdr_frame).page_cnt() {
            bail!(Error::BadRid);
        }

        let frame = bpm.read_page(&self.file, rid.page_no)?;
        self.cur_frame = Some(frame);
        self.cur_page_no = rid.page_no;
        self.cur_dirty = false;

        match bpm.page(frame).record(rid) {
            Ok(bytes) => Ok(Record::from(bytes)),
            Err(_) => bail!(Error::BadRid),
        }
    }
}

/// Closing releases the cursor and header pins and flushes the file. There
/// is nobody to report failures to, so they are logged and swallowed.
impl Drop for HeapFile {
    fn drop(&mut self) {
        printdbg!("closing heap file {}", self.file.name());
        let mut bpm = self.bpm.lock();

        if self.cur_frame.is_some() {
            if let Err(e) = bpm.unpin_page(&self.file, self.cur_page_no, self.cur_dirty) {
                printdbg!("unpin of data page failed on close: {}", e);
            }
            self.cur_frame = None;
        }
        if let Err(e) = bpm.unpin_page(&self.file, self.hdr_page_no, self.hdr_dirty) {
            printdbg!("unpin of header page failed on close: {}", e);
        }
        if let Err(e) = bpm.flush_file(&self.file) {
            printdbg!("flush failed on close: {}", e);
        }
    }
}

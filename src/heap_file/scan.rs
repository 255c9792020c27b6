use super::{HeapFile, Record};
use crate::buffer_pool::ArcBufferPool;
use crate::disk_manager::DiskManager;
use crate::errors::Error;
use crate::pages::{PageId, Rid, INVALID_PAGE, MAX_REC_SIZE, NULL_RID};
use crate::types::{DataType, Operator};
use anyhow::{bail, Result};
use std::mem::size_of;

struct ScanFilter {
    offset: usize,
    length: usize,
    ty: DataType,
    op: Operator,
    value: Vec<u8>,
}

/// A sequential scan over a heap file, optionally filtered on one attribute.
/// The scan cursor keeps one data page pinned between calls.
pub struct HeapFileScan {
    file: HeapFile,
    filter: Option<ScanFilter>,
    marked_page_no: PageId,
    marked_rec: Rid,
}

impl HeapFileScan {
    pub fn open(disk: &DiskManager, bpm: ArcBufferPool, name: &str) -> Result<Self> {
        let file = HeapFile::open(disk, bpm, name)?;
        let marked_page_no = file.cur_page_no;
        Ok(Self {
            file,
            filter: None,
            marked_page_no,
            marked_rec: NULL_RID,
        })
    }

    pub fn rec_cnt(&self) -> i32 {
        self.file.rec_cnt()
    }

    pub fn heap_file(&mut self) -> &mut HeapFile {
        &mut self.file
    }

    /// Set up the filter. `None` matches every record; otherwise the
    /// parameters must describe a well-formed comparison.
    pub fn start_scan(
        &mut self,
        offset: i32,
        length: i32,
        ty: DataType,
        filter: Option<&[u8]>,
        op: Operator,
    ) -> Result<()> {
        let Some(value) = filter else {
            self.filter = None;
            return Ok(());
        };

        if offset < 0
            || length < 1
            || (ty == DataType::Int && length as usize != size_of::<i32>())
            || (ty == DataType::Float && length as usize != size_of::<f32>())
            || value.len() < length as usize
        {
            bail!(Error::BadScanParm);
        }

        self.filter = Some(ScanFilter {
            offset: offset as usize,
            length: length as usize,
            ty,
            op,
            value: value.to_vec(),
        });
        Ok(())
    }

    /// Advance to the next matching record. `Ok(None)` means the scan hit
    /// the end of the file; once it has, it stays there.
    pub fn scan_next(&mut self) -> Result<Option<Rid>> {
        loop {
            let Some(frame) = self.file.cur_frame else {
                return Ok(None);
            };

            let mut bpm = self.file.bpm.lock();

            let mut candidate = if self.file.cur_rec == NULL_RID {
                bpm.page(frame).first_record(self.file.cur_page_no)
            } else {
                bpm.page(frame).next_record(self.file.cur_rec)
            };

            while let Some(rid) = candidate {
                self.file.cur_rec = rid;
                let page = bpm.page(frame);
                if self.match_rec(page.record(rid)?) {
                    return Ok(Some(rid));
                }
                candidate = page.next_record(rid);
            }

            // page exhausted; grab the link while the page is still pinned
            let next_page_no = bpm.page(frame).next_page();
            bpm.unpin_page(&self.file.file, self.file.cur_page_no, self.file.cur_dirty)?;
            self.file.cur_frame = None;
            self.file.cur_page_no = INVALID_PAGE;
            self.file.cur_dirty = false;
            self.file.cur_rec = NULL_RID;

            if next_page_no == INVALID_PAGE {
                return Ok(None);
            }
            match bpm.read_page(&self.file.file, next_page_no) {
                Ok(next_frame) => {
                    self.file.cur_frame = Some(next_frame);
                    self.file.cur_page_no = next_page_no;
                }
                // a successor that cannot be read ends the scan
                Err(_) => return Ok(None),
            }
        }
    }

    /// The record under the scan cursor.
    pub fn cur_record(&self) -> Result<Record> {
        let Some(frame) = self.file.cur_frame else {
            bail!(Error::BadRid);
        };
        let bpm = self.file.bpm.lock();
        let bytes = bpm.page(frame).record(self.file.cur_rec)?;
        Ok(Record::from(bytes))
    }

    /// Tombstone the record under the cursor and account for it in the
    /// header.
    pub fn delete_record(&mut self) -> Result<()> {
        let Some(frame) = self.file.cur_frame else {
            bail!(Error::BadRid);
        };
        let mut bpm = self.file.bpm.lock();

        bpm.page_mut(frame).delete_record(self.file.cur_rec)?;
        self.file.cur_dirty = true;

        let rec_cnt = bpm.page(self.file.hdr_frame).rec_cnt();
        bpm.page_mut(self.file.hdr_frame).set_rec_cnt(rec_cnt - 1);
        self.file.hdr_dirty = true;
        Ok(())
    }

    pub fn mark_dirty(&mut self) {
        self.file.cur_dirty = true;
    }

    /// Snapshot the scan position.
    pub fn mark_scan(&mut self) {
        self.marked_page_no = self.file.cur_page_no;
        self.marked_rec = self.file.cur_rec;
    }

    /// Return to the marked position, swapping the pinned page if the mark
    /// sits on a different one.
    pub fn reset_scan(&mut self) -> Result<()> {
        if self.marked_page_no == self.file.cur_page_no {
            self.file.cur_rec = self.marked_rec;
            return Ok(());
        }

        let mut bpm = self.file.bpm.lock();
        if self.file.cur_frame.is_some() {
            bpm.unpin_page(&self.file.file, self.file.cur_page_no, self.file.cur_dirty)?;
            self.file.cur_frame = None;
        }
        self.file.cur_page_no = self.marked_page_no;
        self.file.cur_rec = self.marked_rec;
        let frame = bpm.read_page(&self.file.file, self.marked_page_no)?;
        self.file.cur_frame = Some(frame);
        self.file.cur_dirty = false;
        Ok(())
    }

    /// Release the cursor pin. Called on close as well, so ending twice is
    /// fine.
    pub fn end_scan(&mut self) -> Result<()> {
        if self.file.cur_frame.is_some() {
            let mut bpm = self.file.bpm.lock();
            bpm.unpin_page(&self.file.file, self.file.cur_page_no, self.file.cur_dirty)?;
            self.file.cur_frame = None;
            self.file.cur_page_no = INVALID_PAGE;
            self.file.cur_dirty = false;
        }
        Ok(())
    }

    fn match_rec(&self, rec: &[u8]) -> bool {
        let Some(filter) = &self.filter else {
            return true;
        };

        // a comparison reaching past the record never matches
        if filter.offset + filter.length > rec.len() {
            return false;
        }

        let attr = &rec[filter.offset..filter.offset + filter.length];
        let ord = match filter.ty {
            DataType::Int => {
                let attr = i32::from_le_bytes(attr.try_into().unwrap());
                let value = i32::from_le_bytes(filter.value[..4].try_into().unwrap());
                attr.partial_cmp(&value)
            }
            DataType::Float => {
                let attr = f32::from_le_bytes(attr.try_into().unwrap());
                let value = f32::from_le_bytes(filter.value[..4].try_into().unwrap());
                attr.partial_cmp(&value)
            }
            DataType::Str => attr.partial_cmp(&filter.value[..filter.length]),
        };

        match ord {
            Some(ord) => filter.op.matches(ord),
            // NaN on either side: nothing orders, only "not equal" holds
            None => filter.op == Operator::Ne,
        }
    }
}

/// An insertion cursor over a heap file. Records always go to the tail of
/// the page chain, growing it when the tail page fills up.
pub struct InsertFileScan {
    file: HeapFile,
}

impl InsertFileScan {
    pub fn open(disk: &DiskManager, bpm: ArcBufferPool, name: &str) -> Result<Self> {
        Ok(Self {
            file: HeapFile::open(disk, bpm, name)?,
        })
    }

    pub fn rec_cnt(&self) -> i32 {
        self.file.rec_cnt()
    }

    pub fn heap_file(&mut self) -> &mut HeapFile {
        &mut self.file
    }

    pub fn insert_record(&mut self, rec: &[u8]) -> Result<Rid> {
        if rec.len() > MAX_REC_SIZE {
            bail!(Error::InvalidRecLen(rec.len()));
        }

        let mut bpm = self.file.bpm.lock();

        // position the cursor on the tail page of the chain
        let last_page = bpm.page(self.file.hdr_frame).last_page();
        if self.file.cur_frame.is_none() || self.file.cur_page_no != last_page {
            if self.file.cur_frame.is_some() {
                bpm.unpin_page(&self.file.file, self.file.cur_page_no, self.file.cur_dirty)?;
                self.file.cur_frame = None;
            }
            let frame = bpm.read_page(&self.file.file, last_page)?;
            self.file.cur_frame = Some(frame);
            self.file.cur_page_no = last_page;
            self.file.cur_dirty = false;
            self.file.cur_rec = NULL_RID;
        }

        loop {
            let frame = self.file.cur_frame.expect("insert cursor is pinned");
            match bpm.page_mut(frame).insert_record(self.file.cur_page_no, rec) {
                Ok(rid) => {
                    self.file.cur_dirty = true;
                    let rec_cnt = bpm.page(self.file.hdr_frame).rec_cnt();
                    bpm.page_mut(self.file.hdr_frame).set_rec_cnt(rec_cnt + 1);
                    self.file.hdr_dirty = true;
                    return Ok(rid);
                }
                Err(Error::NoSpace) => {
                    // chain a fresh page after the full one and retry there;
                    // the length check above guarantees the retry fits
                    let (new_page_no, new_frame) = bpm.alloc_page(&self.file.file)?;
                    bpm.page_mut(new_frame).init();
                    bpm.page_mut(frame).set_next_page(new_page_no);
                    self.file.cur_dirty = true;
                    bpm.unpin_page(&self.file.file, self.file.cur_page_no, self.file.cur_dirty)?;

                    let page_cnt = bpm.page(self.file.hdr_frame).page_cnt();
                    bpm.page_mut(self.file.hdr_frame).set_page_cnt(page_cnt + 1);
                    bpm.page_mut(self.file.hdr_frame).set_last_page(new_page_no);
                    self.file.hdr_dirty = true;

                    self.file.cur_frame = Some(new_frame);
                    self.file.cur_page_no = new_page_no;
                    self.file.cur_dirty = false;
                    self.file.cur_rec = NULL_RID;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

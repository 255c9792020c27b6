mod hash_table;

use crate::disk_manager::DbFile;
use crate::errors::Error;
use crate::pages::{Page, PageId, INVALID_PAGE};
use crate::printdbg;
use hash_table::BufHashTbl;
use parking_lot::Mutex;
use std::sync::Arc;

pub type FrameId = usize;
pub type ArcBufferPool = Arc<Mutex<BufferPoolManager>>;

pub const DEFAULT_POOL_SIZE: usize = 256;

/// Bookkeeping for one frame of the pool. A valid descriptor always has an
/// owning file and a matching hash table entry; an invalid one is fully
/// cleared.
struct BufDesc {
    file: Option<Arc<DbFile>>,
    page_no: PageId,
    pin_cnt: u32,
    dirty: bool,
    refbit: bool,
    valid: bool,
}

impl BufDesc {
    fn new() -> Self {
        Self {
            file: None,
            page_no: INVALID_PAGE,
            pin_cnt: 0,
            dirty: false,
            refbit: false,
            valid: false,
        }
    }

    fn set(&mut self, file: Arc<DbFile>, page_no: PageId) {
        self.file = Some(file);
        self.page_no = page_no;
        self.pin_cnt = 1;
        self.dirty = false;
        self.refbit = true;
        self.valid = true;
    }

    fn clear(&mut self) {
        self.file = None;
        self.page_no = INVALID_PAGE;
        self.pin_cnt = 0;
        self.dirty = false;
        self.refbit = false;
        self.valid = false;
    }

    fn owned_by(&self, file: &DbFile) -> bool {
        self.file.as_ref().is_some_and(|f| f.id() == file.id())
    }
}

/// A fixed array of page frames cached under clock replacement. Pages are
/// borrowed out of the pool by frame index; a frame index stays valid for
/// exactly as long as the caller holds a pin on it.
pub struct BufferPoolManager {
    pool: Vec<Page>,
    descs: Vec<BufDesc>,
    hash_table: BufHashTbl,
    clock_hand: usize,
}

impl BufferPoolManager {
    pub fn new(num_bufs: usize) -> Self {
        assert!(num_bufs > 0);
        Self {
            pool: (0..num_bufs).map(|_| Page::new()).collect(),
            descs: (0..num_bufs).map(|_| BufDesc::new()).collect(),
            hash_table: BufHashTbl::new(num_bufs),
            clock_hand: num_bufs - 1,
        }
    }

    pub fn num_bufs(&self) -> usize {
        self.descs.len()
    }

    pub fn page(&self, frame: FrameId) -> &Page {
        &self.pool[frame]
    }

    pub fn page_mut(&mut self, frame: FrameId) -> &mut Page {
        &mut self.pool[frame]
    }

    /// Claim a frame with the clock algorithm. Two sweeps suffice: any frame
    /// that survives the first sweep on its refbit has the bit cleared and
    /// becomes claimable on the second.
    fn alloc_buf(&mut self) -> Result<FrameId, Error> {
        let num_bufs = self.descs.len();

        for _ in 0..2 * num_bufs {
            self.clock_hand = (self.clock_hand + 1) % num_bufs;
            let hand = self.clock_hand;

            if !self.descs[hand].valid {
                self.descs[hand].clear();
                return Ok(hand);
            }
            if self.descs[hand].pin_cnt > 0 {
                continue;
            }
            if self.descs[hand].refbit {
                // second chance
                self.descs[hand].refbit = false;
                continue;
            }

            if self.descs[hand].dirty {
                let desc = &self.descs[hand];
                let file = desc.file.as_ref().expect("valid frame without a file");
                printdbg!(
                    "writing page {} back from frame {} before eviction",
                    desc.page_no,
                    hand
                );
                // on failure the frame keeps its dirty bit; the hand has
                // already moved past it, so a retry starts elsewhere
                file.write_page(desc.page_no, &self.pool[hand])?;
                self.descs[hand].dirty = false;
            }

            let file_id = self.descs[hand]
                .file
                .as_ref()
                .expect("valid frame without a file")
                .id();
            self.hash_table.remove(file_id, self.descs[hand].page_no)?;
            self.descs[hand].clear();
            return Ok(hand);
        }

        Err(Error::BufferExceeded)
    }

    /// Pin the page into a frame, reading it from disk unless already cached.
    pub fn read_page(&mut self, file: &Arc<DbFile>, page_no: PageId) -> Result<FrameId, Error> {
        if let Some(frame) = self.hash_table.lookup(file.id(), page_no) {
            self.descs[frame].pin_cnt += 1;
            self.descs[frame].refbit = true;
            return Ok(frame);
        }

        let frame = self.alloc_buf()?;
        // a failed read leaves the descriptor cleared, so the frame is
        // reclaimed by a later sweep
        file.read_page(page_no, &mut self.pool[frame])?;
        self.hash_table.insert(file.id(), page_no, frame)?;
        self.descs[frame].set(file.clone(), page_no);
        Ok(frame)
    }

    pub fn unpin_page(&mut self, file: &DbFile, page_no: PageId, dirty: bool) -> Result<(), Error> {
        let frame = self
            .hash_table
            .lookup(file.id(), page_no)
            .ok_or(Error::HashNotFound)?;

        let desc = &mut self.descs[frame];
        if desc.pin_cnt == 0 {
            return Err(Error::PageNotPinned);
        }
        desc.pin_cnt -= 1;
        desc.dirty |= dirty;
        Ok(())
    }

    /// Allocate a fresh page in the file and pin an empty frame for it. The
    /// frame holds whatever the previous occupant left; the caller inits it.
    pub fn alloc_page(&mut self, file: &Arc<DbFile>) -> Result<(PageId, FrameId), Error> {
        let page_no = file.allocate_page()?;
        let frame = self.alloc_buf()?;
        self.hash_table.insert(file.id(), page_no, frame)?;
        self.descs[frame].set(file.clone(), page_no);
        Ok((page_no, frame))
    }

    /// Drop the page from the pool and return it to the file. A resident
    /// frame is released without checking its pin count.
    pub fn dispose_page(&mut self, file: &DbFile, page_no: PageId) -> Result<(), Error> {
        if let Some(frame) = self.hash_table.lookup(file.id(), page_no) {
            self.descs[frame].clear();
            self.hash_table.remove(file.id(), page_no)?;
        }
        file.dispose_page(page_no)
    }

    /// Write back and release every frame the file owns. Fails without
    /// touching disk if any of them is still pinned.
    pub fn flush_file(&mut self, file: &DbFile) -> Result<(), Error> {
        for frame in 0..self.descs.len() {
            if !self.descs[frame].owned_by(file) {
                continue;
            }
            if !self.descs[frame].valid {
                return Err(Error::BadBuffer);
            }
            if self.descs[frame].pin_cnt > 0 {
                return Err(Error::PagePinned);
            }
            if self.descs[frame].dirty {
                let page_no = self.descs[frame].page_no;
                printdbg!("flushing page {} from frame {}", page_no, frame);
                file.write_page(page_no, &self.pool[frame])?;
                self.descs[frame].dirty = false;
            }
            self.hash_table.remove(file.id(), self.descs[frame].page_no)?;
            self.descs[frame].clear();
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn pin_count(&self, file: &DbFile, page_no: PageId) -> Option<u32> {
        let frame = self.hash_table.lookup(file.id(), page_no)?;
        Some(self.descs[frame].pin_cnt)
    }

    #[cfg(test)]
    pub fn resident(&self, file: &DbFile, page_no: PageId) -> bool {
        self.hash_table.lookup(file.id(), page_no).is_some()
    }

    /// Every valid descriptor maps through the hash table to its own frame,
    /// and nothing else is registered.
    #[cfg(test)]
    pub fn check_consistency(&self) {
        let mut valid = 0;
        for (frame, desc) in self.descs.iter().enumerate() {
            if desc.valid {
                valid += 1;
                let file = desc.file.as_ref().expect("valid frame without a file");
                assert_eq!(self.hash_table.lookup(file.id(), desc.page_no), Some(frame));
            } else {
                assert!(desc.file.is_none());
                assert_eq!(desc.pin_cnt, 0);
            }
        }
        assert_eq!(self.hash_table.len(), valid);
    }
}

/// Write out all unwritten pages. There is nobody to report failures to, so
/// they are logged and swallowed.
impl Drop for BufferPoolManager {
    fn drop(&mut self) {
        for frame in 0..self.descs.len() {
            let desc = &self.descs[frame];
            if desc.valid && desc.dirty {
                let file = desc.file.as_ref().expect("valid frame without a file");
                if let Err(e) = file.write_page(desc.page_no, &self.pool[frame]) {
                    printdbg!("write-back of page {} failed on drop: {}", desc.page_no, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk_manager::{test_dir, DiskManager};
    use anyhow::Result;

    fn test_setup(num_pages: i32) -> Result<(DiskManager, Arc<DbFile>)> {
        let disk = DiskManager::new(test_dir());
        disk.create_file("t")?;
        let file = disk.open_file("t")?;
        for _ in 0..num_pages {
            file.allocate_page()?;
        }
        Ok((disk, file))
    }

    #[test]
    fn test_dont_evict_pinned() -> Result<()> {
        let (_disk, file) = test_setup(3)?;
        let mut bpm = BufferPoolManager::new(2);

        bpm.read_page(&file, 0)?;
        bpm.read_page(&file, 1)?;

        assert!(matches!(
            bpm.read_page(&file, 2),
            Err(Error::BufferExceeded)
        ));

        bpm.unpin_page(&file, 0, false)?;
        bpm.read_page(&file, 2)?;
        assert!(!bpm.resident(&file, 0));

        bpm.unpin_page(&file, 1, false)?;
        bpm.unpin_page(&file, 2, false)?;
        bpm.check_consistency();

        Ok(())
    }

    #[test]
    fn test_pin_counts_aggregate() -> Result<()> {
        let (_disk, file) = test_setup(1)?;
        let mut bpm = BufferPoolManager::new(2);

        let frame = bpm.read_page(&file, 0)?;
        assert_eq!(bpm.read_page(&file, 0)?, frame);
        assert_eq!(bpm.pin_count(&file, 0), Some(2));

        bpm.unpin_page(&file, 0, false)?;
        assert_eq!(bpm.pin_count(&file, 0), Some(1));
        bpm.unpin_page(&file, 0, false)?;

        assert!(matches!(
            bpm.unpin_page(&file, 0, false),
            Err(Error::PageNotPinned)
        ));

        Ok(())
    }

    #[test]
    fn test_unpin_unknown_page() -> Result<()> {
        let (_disk, file) = test_setup(1)?;
        let mut bpm = BufferPoolManager::new(2);

        assert!(matches!(
            bpm.unpin_page(&file, 0, false),
            Err(Error::HashNotFound)
        ));

        Ok(())
    }

    #[test]
    fn test_clean_eviction_replaces_page() -> Result<()> {
        let (_disk, file) = test_setup(4)?;
        let mut bpm = BufferPoolManager::new(3);

        for page_no in 0..3 {
            bpm.read_page(&file, page_no)?;
            bpm.unpin_page(&file, page_no, false)?;
        }

        bpm.read_page(&file, 3)?;
        assert!(bpm.resident(&file, 3));

        let still_cached = (0..3).filter(|&p| bpm.resident(&file, p)).count();
        assert_eq!(still_cached, 2);

        bpm.unpin_page(&file, 3, false)?;
        bpm.check_consistency();

        Ok(())
    }

    #[test]
    fn test_dirty_page_written_back_on_eviction() -> Result<()> {
        let (_disk, file) = test_setup(2)?;
        let mut bpm = BufferPoolManager::new(1);

        let frame = bpm.read_page(&file, 0)?;
        bpm.page_mut(frame).as_bytes_mut()[500] = 0x5a;
        bpm.unpin_page(&file, 0, true)?;

        // the single frame gets reused, forcing the write-back
        bpm.read_page(&file, 1)?;
        assert!(!bpm.resident(&file, 0));

        let mut page = Page::new();
        file.read_page(0, &mut page)?;
        assert_eq!(page.as_bytes()[500], 0x5a);

        bpm.unpin_page(&file, 1, false)?;

        Ok(())
    }

    #[test]
    fn test_flush_file() -> Result<()> {
        let (_disk, file) = test_setup(2)?;
        let mut bpm = BufferPoolManager::new(4);

        let frame = bpm.read_page(&file, 0)?;
        bpm.page_mut(frame).as_bytes_mut()[9] = 7;
        bpm.unpin_page(&file, 0, true)?;

        bpm.read_page(&file, 1)?;
        assert!(matches!(bpm.flush_file(&file), Err(Error::PagePinned)));

        bpm.unpin_page(&file, 1, false)?;
        bpm.flush_file(&file)?;
        assert!(!bpm.resident(&file, 0));
        assert!(!bpm.resident(&file, 1));

        let mut page = Page::new();
        file.read_page(0, &mut page)?;
        assert_eq!(page.as_bytes()[9], 7);

        // nothing left to do, and no way to fail
        bpm.flush_file(&file)?;
        bpm.check_consistency();

        Ok(())
    }

    #[test]
    fn test_alloc_page_starts_pinned() -> Result<()> {
        let (_disk, file) = test_setup(0)?;
        let mut bpm = BufferPoolManager::new(2);

        let (page_no, frame) = bpm.alloc_page(&file)?;
        assert_eq!(bpm.pin_count(&file, page_no), Some(1));

        bpm.page_mut(frame).init();
        bpm.page_mut(frame).insert_record(page_no, b"payload")?;
        bpm.unpin_page(&file, page_no, true)?;
        bpm.flush_file(&file)?;

        let frame = bpm.read_page(&file, page_no)?;
        let rid = bpm.page(frame).first_record(page_no).unwrap();
        assert_eq!(bpm.page(frame).record(rid)?, b"payload");
        bpm.unpin_page(&file, page_no, false)?;

        Ok(())
    }

    #[test]
    fn test_second_chance() -> Result<()> {
        let (_disk, file) = test_setup(3)?;
        let mut bpm = BufferPoolManager::new(2);

        // both frames end up unpinned with their refbits set
        for page_no in 0..2 {
            bpm.read_page(&file, page_no)?;
            bpm.unpin_page(&file, page_no, false)?;
        }

        // the first sweep only clears refbits; the claim needs the second
        bpm.read_page(&file, 2)?;
        bpm.unpin_page(&file, 2, false)?;
        bpm.check_consistency();

        Ok(())
    }

    #[test]
    fn test_dispose_page_releases_frame() -> Result<()> {
        let (_disk, file) = test_setup(2)?;
        let mut bpm = BufferPoolManager::new(2);

        bpm.read_page(&file, 1)?;
        bpm.unpin_page(&file, 1, false)?;
        bpm.dispose_page(&file, 1)?;

        assert!(!bpm.resident(&file, 1));
        // the disposed page number is handed out again
        assert_eq!(file.allocate_page()?, 1);
        bpm.check_consistency();

        Ok(())
    }
}

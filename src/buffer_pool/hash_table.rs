use crate::disk_manager::FileId;
use crate::errors::Error;
use crate::pages::PageId;

use super::FrameId;

struct Entry {
    file: FileId,
    page_no: PageId,
    frame_no: FrameId,
}

/// Fixed-capacity map from `(file, page)` to the frame caching that page.
/// Collisions chain inside the bucket; the bucket count is sized once from
/// the pool size and never grows.
pub(super) struct BufHashTbl {
    buckets: Vec<Vec<Entry>>,
}

impl BufHashTbl {
    pub fn new(num_bufs: usize) -> Self {
        // about 1.2 buckets per frame, forced odd
        let size = (num_bufs * 6 / 5) | 1;
        Self {
            buckets: (0..size).map(|_| Vec::new()).collect(),
        }
    }

    fn bucket(&self, file: FileId, page_no: PageId) -> usize {
        (file as usize)
            .wrapping_mul(31)
            .wrapping_add(page_no as u32 as usize)
            % self.buckets.len()
    }

    pub fn insert(
        &mut self,
        file: FileId,
        page_no: PageId,
        frame_no: FrameId,
    ) -> Result<(), Error> {
        let bucket = self.bucket(file, page_no);
        if self.buckets[bucket]
            .iter()
            .any(|e| e.file == file && e.page_no == page_no)
        {
            return Err(Error::HashAlreadyPresent);
        }
        self.buckets[bucket].push(Entry {
            file,
            page_no,
            frame_no,
        });
        Ok(())
    }

    pub fn lookup(&self, file: FileId, page_no: PageId) -> Option<FrameId> {
        let bucket = self.bucket(file, page_no);
        self.buckets[bucket]
            .iter()
            .find(|e| e.file == file && e.page_no == page_no)
            .map(|e| e.frame_no)
    }

    pub fn remove(&mut self, file: FileId, page_no: PageId) -> Result<(), Error> {
        let bucket = self.bucket(file, page_no);
        let position = self.buckets[bucket]
            .iter()
            .position(|e| e.file == file && e.page_no == page_no)
            .ok_or(Error::HashNotFound)?;
        self.buckets[bucket].swap_remove(position);
        Ok(())
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }
}

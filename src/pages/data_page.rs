use super::{Page, PageId, Rid, INVALID_PAGE, PAGE_SIZE};
use crate::errors::Error;

// Data page layout: a 12-byte header at offset 0, a slot directory growing
// upward from the header, record bytes growing downward from the end of the
// page. The middle is free space. Slots are never reused or compacted; a
// deleted slot keeps its directory entry with length -1.
const NEXT_PAGE_OFFSET: usize = 0;
const NUM_SLOTS_OFFSET: usize = 4;
const FREE_SPACE_OFFSET: usize = 8;

pub const DATA_HDR_SIZE: usize = 12;
pub const SLOT_SIZE: usize = 8;

/// Minimum on-page overhead: the header plus a single slot entry.
pub const DP_FIXED: usize = DATA_HDR_SIZE + SLOT_SIZE;
/// Largest record that can ever be stored on a page.
pub const MAX_REC_SIZE: usize = PAGE_SIZE - DP_FIXED;

const TOMBSTONE: i32 = -1;

impl Page {
    /// Reset this frame to an empty data page: no successor, no slots, the
    /// whole area past the header free.
    pub fn init(&mut self) {
        self.data.fill(0);
        self.write_i32(NEXT_PAGE_OFFSET, INVALID_PAGE);
        self.write_i32(NUM_SLOTS_OFFSET, 0);
        self.write_i32(FREE_SPACE_OFFSET, PAGE_SIZE as i32);
    }

    pub fn next_page(&self) -> PageId {
        self.read_i32(NEXT_PAGE_OFFSET)
    }

    pub fn set_next_page(&mut self, page_no: PageId) {
        self.write_i32(NEXT_PAGE_OFFSET, page_no);
    }

    pub fn num_slots(&self) -> usize {
        self.read_i32(NUM_SLOTS_OFFSET) as usize
    }

    fn free_space_offset(&self) -> usize {
        self.read_i32(FREE_SPACE_OFFSET) as usize
    }

    fn slot(&self, slot_no: usize) -> (i32, i32) {
        let base = DATA_HDR_SIZE + slot_no * SLOT_SIZE;
        (self.read_i32(base), self.read_i32(base + 4))
    }

    fn set_slot(&mut self, slot_no: usize, offset: i32, length: i32) {
        let base = DATA_HDR_SIZE + slot_no * SLOT_SIZE;
        self.write_i32(base, offset);
        self.write_i32(base + 4, length);
    }

    /// Contiguous free bytes between the slot directory and the record area.
    fn free_space(&self) -> usize {
        self.free_space_offset() - (DATA_HDR_SIZE + self.num_slots() * SLOT_SIZE)
    }

    /// The first live record of the page, in ascending slot order.
    pub fn first_record(&self, page_no: PageId) -> Option<Rid> {
        self.live_slot_from(0).map(|slot_no| Rid { page_no, slot_no })
    }

    /// The next live record after `cur`, in ascending slot order.
    pub fn next_record(&self, cur: Rid) -> Option<Rid> {
        self.live_slot_from(cur.slot_no + 1).map(|slot_no| Rid {
            page_no: cur.page_no,
            slot_no,
        })
    }

    fn live_slot_from(&self, start: i32) -> Option<i32> {
        (start.max(0)..self.num_slots() as i32).find(|&i| self.slot(i as usize).1 != TOMBSTONE)
    }

    /// Borrow the bytes of the record in `rid`'s slot. The borrow is only
    /// meaningful while the frame stays pinned.
    pub fn record(&self, rid: Rid) -> Result<&[u8], Error> {
        let (offset, length) = self.checked_slot(rid)?;
        Ok(&self.data[offset..offset + length])
    }

    /// Append a record, claiming a fresh slot. The slot directory stays
    /// dense: deleted slots are never reused.
    pub fn insert_record(&mut self, page_no: PageId, rec: &[u8]) -> Result<Rid, Error> {
        if self.free_space() < rec.len() + SLOT_SIZE {
            return Err(Error::NoSpace);
        }

        let offset = self.free_space_offset() - rec.len();
        self.data[offset..offset + rec.len()].copy_from_slice(rec);

        let slot_no = self.num_slots();
        self.set_slot(slot_no, offset as i32, rec.len() as i32);
        self.write_i32(NUM_SLOTS_OFFSET, (slot_no + 1) as i32);
        self.write_i32(FREE_SPACE_OFFSET, offset as i32);

        Ok(Rid {
            page_no,
            slot_no: slot_no as i32,
        })
    }

    /// Tombstone the slot. The record bytes stay where they are.
    pub fn delete_record(&mut self, rid: Rid) -> Result<(), Error> {
        let (offset, _) = self.checked_slot(rid)?;
        self.set_slot(rid.slot_no as usize, offset as i32, TOMBSTONE);
        Ok(())
    }

    fn checked_slot(&self, rid: Rid) -> Result<(usize, usize), Error> {
        if rid.slot_no < 0 || rid.slot_no as usize >= self.num_slots() {
            return Err(Error::InvalidSlot);
        }
        let (offset, length) = self.slot(rid.slot_no as usize);
        if length == TOMBSTONE {
            return Err(Error::InvalidSlot);
        }
        Ok((offset as usize, length as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn data_page() -> Page {
        let mut page = Page::new();
        page.init();
        page
    }

    fn rid(slot_no: i32) -> Rid {
        Rid { page_no: 7, slot_no }
    }

    #[test]
    fn test_insert_then_read() -> Result<()> {
        let mut page = data_page();

        let r0 = page.insert_record(7, b"hello")?;
        let r1 = page.insert_record(7, b"world!")?;

        assert_eq!(r0, rid(0));
        assert_eq!(r1, rid(1));
        assert_eq!(page.record(r0)?, b"hello");
        assert_eq!(page.record(r1)?, b"world!");
        assert_eq!(page.num_slots(), 2);

        Ok(())
    }

    #[test]
    fn test_iteration_in_slot_order() -> Result<()> {
        let mut page = data_page();

        for payload in [b"a0", b"a1", b"a2"] {
            page.insert_record(3, payload)?;
        }

        let mut cur = page.first_record(3).unwrap();
        assert_eq!(cur, Rid { page_no: 3, slot_no: 0 });

        let mut seen = vec![cur.slot_no];
        while let Some(next) = page.next_record(cur) {
            seen.push(next.slot_no);
            cur = next;
        }
        assert_eq!(seen, vec![0, 1, 2]);

        Ok(())
    }

    #[test]
    fn test_delete_tombstones_slot() -> Result<()> {
        let mut page = data_page();

        let r0 = page.insert_record(1, b"first")?;
        let r1 = page.insert_record(1, b"second")?;
        let r2 = page.insert_record(1, b"third")?;

        page.delete_record(r1)?;

        assert!(matches!(page.record(r1), Err(Error::InvalidSlot)));
        assert!(matches!(page.delete_record(r1), Err(Error::InvalidSlot)));

        // iteration skips the tombstone but keeps the others
        assert_eq!(page.first_record(1), Some(r0));
        assert_eq!(page.next_record(r0), Some(r2));
        assert_eq!(page.next_record(r2), None);

        // deleted slots are not reused
        let r3 = page.insert_record(1, b"fourth")?;
        assert_eq!(r3.slot_no, 3);

        Ok(())
    }

    #[test]
    fn test_invalid_slots() {
        let mut page = data_page();
        page.insert_record(0, b"x").unwrap();

        assert!(matches!(page.record(rid(-1)), Err(Error::InvalidSlot)));
        assert!(matches!(page.record(rid(1)), Err(Error::InvalidSlot)));
        assert!(matches!(page.delete_record(rid(9)), Err(Error::InvalidSlot)));
    }

    #[test]
    fn test_empty_page_has_no_records() {
        let page = data_page();
        assert_eq!(page.first_record(0), None);
    }

    #[test]
    fn test_max_record_exactly_fits() -> Result<()> {
        let mut page = data_page();

        let rec = vec![0xabu8; MAX_REC_SIZE];
        let rid = page.insert_record(0, &rec)?;
        assert_eq!(page.record(rid)?.len(), MAX_REC_SIZE);

        // the page is now completely full
        assert!(matches!(page.insert_record(0, b""), Err(Error::NoSpace)));

        Ok(())
    }

    #[test]
    fn test_fills_up() -> Result<()> {
        let mut page = data_page();

        let rec = [1u8; 1000];
        let per_page = (PAGE_SIZE - DATA_HDR_SIZE) / (rec.len() + SLOT_SIZE);
        for _ in 0..per_page {
            page.insert_record(0, &rec)?;
        }

        assert!(matches!(page.insert_record(0, &rec), Err(Error::NoSpace)));
        assert_eq!(page.num_slots(), per_page);

        Ok(())
    }

    #[test]
    fn test_next_page_link() {
        let mut page = data_page();
        assert_eq!(page.next_page(), INVALID_PAGE);
        page.set_next_page(42);
        assert_eq!(page.next_page(), 42);
    }
}

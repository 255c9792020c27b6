use crate::errors::Error;
use crate::pages::{Page, PageId, INVALID_PAGE, PAGE_SIZE};
use crate::printdbg;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Process-unique identity of an open file, used as half of the buffer pool's
/// hash key.
pub type FileId = u64;

static NEXT_FILE_ID: AtomicU64 = AtomicU64::new(1);

#[cfg(test)]
pub fn test_dir() -> PathBuf {
    use uuid::Uuid;

    std::env::temp_dir().join(format!("heapstore_test_{}", Uuid::new_v4()))
}

/// A database directory. Every relation is one file of [`PAGE_SIZE`] pages:
/// a bookkeeping block at offset 0 followed by user pages numbered from 0.
///
/// Opening the same name twice while the first handle is alive yields the
/// same [`DbFile`]; the buffer pool keys cached frames on file identity, so
/// two handles to one file must agree on it.
pub struct DiskManager {
    path: PathBuf,
    open_files: Mutex<HashMap<String, Weak<DbFile>>>,
}

impl DiskManager {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();

        std::fs::create_dir_all(path).expect("create database directory");

        Self {
            path: path.to_path_buf(),
            open_files: Mutex::new(HashMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    pub fn create_file(&self, name: &str) -> Result<(), Error> {
        let path = self.file_path(name);
        if path.exists() {
            return Err(Error::FileExists(name.to_string()));
        }

        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;

        // the bookkeeping block: no user pages yet, empty free list
        let mut hdr = Page::new();
        hdr.as_bytes_mut()[0..4].copy_from_slice(&0i32.to_le_bytes());
        hdr.as_bytes_mut()[4..8].copy_from_slice(&INVALID_PAGE.to_le_bytes());
        file.write_all(hdr.as_bytes())?;

        printdbg!("created file {}", name);
        Ok(())
    }

    pub fn destroy_file(&self, name: &str) -> Result<(), Error> {
        self.open_files.lock().remove(name);
        std::fs::remove_file(self.file_path(name))?;

        printdbg!("destroyed file {}", name);
        Ok(())
    }

    pub fn open_file(&self, name: &str) -> Result<Arc<DbFile>, Error> {
        let mut open_files = self.open_files.lock();

        if let Some(file) = open_files.get(name).and_then(Weak::upgrade) {
            return Ok(file);
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.file_path(name))?;

        let mut hdr = [0u8; 8];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut hdr)?;

        let db_file = Arc::new(DbFile {
            id: NEXT_FILE_ID.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            inner: Mutex::new(FileInner {
                file,
                num_pages: i32::from_le_bytes(hdr[0..4].try_into().unwrap()),
                first_free: i32::from_le_bytes(hdr[4..8].try_into().unwrap()),
            }),
        });

        open_files.insert(name.to_string(), Arc::downgrade(&db_file));
        Ok(db_file)
    }
}

struct FileInner {
    file: std::fs::File,
    /// number of user pages ever allocated, disposed ones included
    num_pages: i32,
    /// head of the free list threaded through disposed pages
    first_free: PageId,
}

impl FileInner {
    fn page_offset(page_no: PageId) -> u64 {
        // user page N sits one block past the bookkeeping block
        (page_no as u64 + 1) * PAGE_SIZE as u64
    }

    fn check_page_no(&self, page_no: PageId) -> Result<(), Error> {
        if page_no < 0 || page_no >= self.num_pages {
            return Err(Error::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("page {page_no} is out of range"),
            )));
        }
        Ok(())
    }

    fn write_bookkeeping(&mut self) -> Result<(), Error> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&self.num_pages.to_le_bytes())?;
        self.file.write_all(&self.first_free.to_le_bytes())?;
        Ok(())
    }
}

/// A single open database file offering page-granular synchronous I/O.
pub struct DbFile {
    id: FileId,
    name: String,
    inner: Mutex<FileInner>,
}

impl DbFile {
    pub fn id(&self) -> FileId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn read_page(&self, page_no: PageId, page: &mut Page) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        inner.check_page_no(page_no)?;
        inner.file.seek(SeekFrom::Start(FileInner::page_offset(page_no)))?;
        inner.file.read_exact(page.as_bytes_mut())?;
        Ok(())
    }

    pub fn write_page(&self, page_no: PageId, page: &Page) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        inner.check_page_no(page_no)?;
        inner.file.seek(SeekFrom::Start(FileInner::page_offset(page_no)))?;
        inner.file.write_all(page.as_bytes())?;
        Ok(())
    }

    /// Hand out a fresh page identity, reusing a disposed page if one is on
    /// the free list and growing the file otherwise. The page contents are
    /// whatever was there before; the caller is expected to init them.
    pub fn allocate_page(&self) -> Result<PageId, Error> {
        let mut inner = self.inner.lock();

        let page_no = if inner.first_free != INVALID_PAGE {
            let page_no = inner.first_free;
            let mut link = [0u8; 4];
            inner.file.seek(SeekFrom::Start(FileInner::page_offset(page_no)))?;
            inner.file.read_exact(&mut link)?;
            inner.first_free = i32::from_le_bytes(link);
            page_no
        } else {
            let page_no = inner.num_pages;
            inner.num_pages += 1;
            inner.file.seek(SeekFrom::Start(FileInner::page_offset(page_no)))?;
            inner.file.write_all(Page::new().as_bytes())?;
            page_no
        };

        inner.write_bookkeeping()?;
        Ok(page_no)
    }

    /// Return a page to the file's free list. The freed page's first bytes
    /// hold the link to the next free page.
    pub fn dispose_page(&self, page_no: PageId) -> Result<(), Error> {
        let mut inner = self.inner.lock();
        inner.check_page_no(page_no)?;

        let link = inner.first_free.to_le_bytes();
        inner.file.seek(SeekFrom::Start(FileInner::page_offset(page_no)))?;
        inner.file.write_all(&link)?;
        inner.first_free = page_no;
        inner.write_bookkeeping()?;
        Ok(())
    }

    pub fn get_first_page(&self) -> Result<PageId, Error> {
        let inner = self.inner.lock();
        if inner.num_pages == 0 {
            return Err(Error::Io(std::io::Error::new(
                ErrorKind::UnexpectedEof,
                "file has no pages",
            )));
        }
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_create_then_open() -> Result<()> {
        let disk = DiskManager::new(test_dir());

        assert!(disk.open_file("t").is_err());

        disk.create_file("t")?;
        assert!(matches!(
            disk.create_file("t"),
            Err(Error::FileExists(_))
        ));

        let file = disk.open_file("t")?;
        assert!(file.get_first_page().is_err());

        Ok(())
    }

    #[test]
    fn test_open_twice_shares_identity() -> Result<()> {
        let disk = DiskManager::new(test_dir());
        disk.create_file("t")?;

        let a = disk.open_file("t")?;
        let b = disk.open_file("t")?;
        assert_eq!(a.id(), b.id());
        assert!(Arc::ptr_eq(&a, &b));

        Ok(())
    }

    #[test]
    fn test_write_then_read() -> Result<()> {
        let disk = DiskManager::new(test_dir());
        disk.create_file("t")?;
        let file = disk.open_file("t")?;

        let p0 = file.allocate_page()?;
        let p1 = file.allocate_page()?;
        assert_eq!((p0, p1), (0, 1));
        assert_eq!(file.get_first_page()?, 0);

        let mut page = Page::new();
        page.as_bytes_mut()[100] = 0xfe;
        file.write_page(p1, &page)?;

        let mut read = Page::new();
        file.read_page(p1, &mut read)?;
        assert_eq!(read.as_bytes(), page.as_bytes());

        Ok(())
    }

    #[test]
    fn test_dispose_then_reuse() -> Result<()> {
        let disk = DiskManager::new(test_dir());
        disk.create_file("t")?;
        let file = disk.open_file("t")?;

        let p0 = file.allocate_page()?;
        let p1 = file.allocate_page()?;
        let p2 = file.allocate_page()?;
        let _ = p0;

        file.dispose_page(p1)?;
        file.dispose_page(p2)?;

        // most recently disposed first
        assert_eq!(file.allocate_page()?, p2);
        assert_eq!(file.allocate_page()?, p1);
        assert_eq!(file.allocate_page()?, 3);

        Ok(())
    }

    #[test]
    fn test_out_of_range_page() -> Result<()> {
        let disk = DiskManager::new(test_dir());
        disk.create_file("t")?;
        let file = disk.open_file("t")?;
        file.allocate_page()?;

        let mut page = Page::new();
        assert!(file.read_page(5, &mut page).is_err());
        assert!(file.write_page(-1, &page).is_err());

        Ok(())
    }

    #[test]
    fn test_metadata_survives_reopen() -> Result<()> {
        let dir = test_dir();
        let disk = DiskManager::new(&dir);
        disk.create_file("t")?;

        {
            let file = disk.open_file("t")?;
            file.allocate_page()?;
            file.allocate_page()?;
            file.dispose_page(0)?;
        }

        // the handle is gone, so this reopens from disk
        let file = disk.open_file("t")?;
        assert_eq!(file.allocate_page()?, 0);
        assert_eq!(file.allocate_page()?, 2);

        Ok(())
    }
}

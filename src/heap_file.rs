use std::fs::{File, OpenOptions};
use std::hash::{Hash, Hasher};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::debug;

use crate::buffer_pool::BufferPool;
use crate::catalog::Catalog;
use crate::error::{SmallError, SmallResult};
use crate::lock_manager::Permission;
use crate::page::{page_size, HeapPage};
use crate::page_id::HeapPageId;
use crate::transaction_id::TransactionId;
use crate::tuple::{RecordId, Tuple, TupleDesc};

/// A file-backed, fixed-page-size table. The id is a stable hash of the
/// file's absolute path, matching how callers can name a heap file without
/// a central id allocator.
pub struct HeapFile {
    file: Mutex<File>,
    path: PathBuf,
    table_id: i32,
    desc: TupleDesc,
}

fn hash_path(path: &Path) -> i32 {
    use std::collections::hash_map::DefaultHasher;
    let mut hasher = DefaultHasher::new();
    path.hash(&mut hasher);
    hasher.finish() as i32
}

impl HeapFile {
    pub fn new<P: AsRef<Path>>(path: P, desc: TupleDesc) -> Result<HeapFile, SmallError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).create(true).open(&path)?;
        let table_id = hash_path(&path.canonicalize().unwrap_or_else(|_| path.clone()));
        Ok(HeapFile {
            file: Mutex::new(file),
            path,
            table_id,
            desc,
        })
    }

    pub fn get_id(&self) -> i32 {
        self.table_id
    }

    pub fn get_tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of full pages currently on disk. File length must be a
    /// multiple of `page_size`; anything else is treated as corruption
    /// rather than silently rounded up.
    pub fn num_pages(&self) -> Result<i32, SmallError> {
        let file = self.file.lock().unwrap();
        let len = file.metadata()?.len() as usize;
        if len % page_size() != 0 {
            return Err(SmallError::IoError(format!(
                "heap file length {} is not a multiple of page size {}",
                len,
                page_size()
            )));
        }
        Ok((len / page_size()) as i32)
    }

    pub fn read_page(&self, page_id: HeapPageId) -> Result<HeapPage, SmallError> {
        let num_pages = self.num_pages()?;
        if page_id.page_number >= num_pages || page_id.page_number < 0 {
            return Err(SmallError::invalid_argument(&format!(
                "page {} out of range (file has {} pages)",
                page_id.page_number, num_pages
            )));
        }
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(page_id.page_number as u64 * page_size() as u64))?;
        let mut buf = vec![0u8; page_size()];
        file.read_exact(&mut buf)?;
        debug!("read page {} from {:?}", page_id, self.path);
        HeapPage::from_bytes(page_id, self.desc.clone(), &buf)
    }

    pub fn write_page(&self, page: &HeapPage) -> SmallResult {
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(page.page_id.page_number as u64 * page_size() as u64))?;
        let bytes = page.serialize();
        file.write_all(&bytes)?;
        file.sync_all()?;
        debug!("wrote page {} to {:?}", page.page_id, self.path);
        Ok(())
    }

    /// Appends one freshly initialized empty page and returns its id.
    fn allocate_page(&self) -> Result<HeapPageId, SmallError> {
        let num_pages = self.num_pages()?;
        let page_id = HeapPageId::new(self.table_id, num_pages);
        let empty = HeapPage::empty(page_id, self.desc.clone());
        self.write_page(&empty)?;
        Ok(page_id)
    }

    /// Finds the first page with a free slot, allocating a new one if every
    /// existing page is full. Candidate pages are looked up through the
    /// buffer pool (not read straight off disk): under NO-STEAL a page an
    /// uncommitted transaction already filled may still be empty on disk,
    /// so only the cache reflects whether it actually has room. Each
    /// candidate is fetched READ_WRITE, matching the lock the caller is
    /// about to insert under anyway.
    pub fn find_page_for_insert(&self, tid: TransactionId, buffer_pool: &BufferPool, catalog: &Catalog) -> Result<HeapPageId, SmallError> {
        let num_pages = self.num_pages()?;
        for i in 0..num_pages {
            let page_id = HeapPageId::new(self.table_id, i);
            let page = buffer_pool.get_page(tid, page_id, Permission::ReadWrite, catalog)?;
            if !page.is_full() {
                return Ok(page_id);
            }
        }
        self.allocate_page()
    }

    /// Scans every page through the buffer pool under a READ_ONLY lock, so
    /// a transaction sees its own uncommitted writes and never reads past
    /// what it's allowed to without the lock manager knowing about it.
    pub fn iterator(&self, tid: TransactionId, buffer_pool: &BufferPool, catalog: &Catalog) -> Result<Vec<Tuple>, SmallError> {
        let mut out = Vec::new();
        for i in 0..self.num_pages()? {
            let page_id = HeapPageId::new(self.table_id, i);
            let page = buffer_pool.get_page(tid, page_id, Permission::ReadOnly, catalog)?;
            out.extend(page.tuples().cloned());
        }
        Ok(out)
    }
}

pub fn record_id_page(rid: &RecordId) -> HeapPageId {
    rid.page_id
}

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use log::{debug, warn};

use crate::catalog::Catalog;
use crate::error::{SmallError, SmallResult};
use crate::lock_manager::{LockManager, Permission};
use crate::log_manager::LogManager;
use crate::page::HeapPage;
use crate::page_id::HeapPageId;
use crate::transaction_id::TransactionId;
use crate::tuple::{RecordId, Tuple};

/// Bounded page cache. Gatekeeper for every locked page access, router for
/// insert/delete to the owning heap file, and the sole mediator of
/// transaction completion.
///
/// Eviction policy is NO STEAL: only clean pages are ever evicted or
/// written to disk ahead of their transaction completing; if every cached
/// page is dirty, eviction fails rather than stealing one.
pub struct BufferPool {
    capacity: usize,
    cache: Mutex<HashMap<HeapPageId, HeapPage>>,
    order: Mutex<VecDeque<HeapPageId>>,
    lock_manager: LockManager,
}

impl BufferPool {
    pub fn new(capacity: usize, shared_lock_timeout_ms: u64, exclusive_lock_timeout_ms: u64) -> BufferPool {
        BufferPool {
            capacity,
            cache: Mutex::new(HashMap::new()),
            order: Mutex::new(VecDeque::new()),
            lock_manager: LockManager::new(shared_lock_timeout_ms, exclusive_lock_timeout_ms),
        }
    }

    pub fn holds_lock(&self, tid: TransactionId, page_id: HeapPageId) -> bool {
        self.lock_manager.holds_lock(tid, page_id)
    }

    pub fn release_page(&self, tid: TransactionId, page_id: HeapPageId) {
        self.lock_manager.release(tid, page_id);
    }

    pub fn get_page(&self, tid: TransactionId, page_id: HeapPageId, perm: Permission, catalog: &Catalog) -> Result<HeapPage, SmallError> {
        self.lock_manager.acquire(tid, page_id, perm)?;

        {
            let cache = self.cache.lock().unwrap();
            if let Some(page) = cache.get(&page_id) {
                return Ok(page.clone());
            }
        }

        self.ensure_capacity()?;

        let heap_file = catalog.get_file(page_id.table_id)?;
        let page = heap_file.read_page(page_id)?;

        let mut cache = self.cache.lock().unwrap();
        cache.insert(page_id, page.clone());
        self.order.lock().unwrap().push_back(page_id);
        Ok(page)
    }

    fn ensure_capacity(&self) -> SmallResult {
        let cache = self.cache.lock().unwrap();
        if cache.len() < self.capacity {
            return Ok(());
        }
        let order = self.order.lock().unwrap();
        let victim = order.iter().find(|pid| cache.get(pid).map(|p| p.dirty_tid().is_none()).unwrap_or(true)).copied();
        drop(cache);
        drop(order);

        match victim {
            Some(pid) => {
                self.discard_page(pid);
                Ok(())
            }
            None => Err(SmallError::new("All pages are dirty, cannot evict under a NO-STEAL policy")),
        }
    }

    pub fn insert_tuple(&self, tid: TransactionId, table_id: i32, tuple: Tuple, catalog: &Catalog) -> SmallResult {
        let heap_file = catalog.get_file(table_id)?;
        let page_id = heap_file.find_page_for_insert(tid, self, catalog)?;

        let mut page = self.get_page(tid, page_id, Permission::ReadWrite, catalog)?;
        page.insert_tuple(tuple)?;
        page.mark_dirty(Some(tid));
        self.cache.lock().unwrap().insert(page_id, page);
        Ok(())
    }

    pub fn delete_tuple(&self, tid: TransactionId, rid: RecordId, catalog: &Catalog) -> SmallResult {
        let mut page = self.get_page(tid, rid.page_id, Permission::ReadWrite, catalog)?;
        page.delete_tuple(&rid)?;
        page.mark_dirty(Some(tid));
        self.cache.lock().unwrap().insert(rid.page_id, page);
        Ok(())
    }

    /// Writes a dirty page's WAL UPDATE record, forces the log, then writes
    /// the page to its heap file. The WAL invariant requires the log record
    /// to be durable before the page write below it, so the force happens
    /// first.
    pub fn flush_page(&self, page_id: HeapPageId, catalog: &Catalog, log_manager: &LogManager) -> SmallResult {
        let mut cache = self.cache.lock().unwrap();
        let page = match cache.get_mut(&page_id) {
            Some(p) => p,
            None => return Ok(()),
        };
        let tid = match page.dirty_tid() {
            Some(t) => t,
            None => return Ok(()),
        };

        log_manager.log_update(tid, page_id, page.before_image(), &page.serialize())?;
        log_manager.force()?;

        let heap_file = catalog.get_file(page_id.table_id)?;
        heap_file.write_page(page)?;

        page.mark_dirty(None);
        page.set_before_image();
        Ok(())
    }

    pub fn flush_all_pages(&self, catalog: &Catalog, log_manager: &LogManager) -> SmallResult {
        let dirty: Vec<HeapPageId> = self
            .cache
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, p)| p.dirty_tid().is_some())
            .map(|(pid, _)| *pid)
            .collect();
        for pid in dirty {
            self.flush_page(pid, catalog, log_manager)?;
        }
        Ok(())
    }

    pub fn discard_page(&self, page_id: HeapPageId) {
        self.cache.lock().unwrap().remove(&page_id);
        self.order.lock().unwrap().retain(|p| *p != page_id);
    }

    /// Places a page directly into the cache, clean, bypassing the heap
    /// file and the lock manager. Used only by log rollback/recovery to
    /// reinstate before/after images.
    pub fn inject_clean_page(&self, page_id: HeapPageId, mut page: HeapPage) {
        page.mark_dirty(None);
        page.set_before_image();
        let mut cache = self.cache.lock().unwrap();
        if !cache.contains_key(&page_id) {
            self.order.lock().unwrap().push_back(page_id);
        }
        cache.insert(page_id, page);
    }

    /// Flushes or discards every page `tid` dirtied, then releases every
    /// lock it holds. This is the only place a transaction's lifecycle
    /// concludes.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool, catalog: &Catalog, log_manager: &LogManager) -> SmallResult {
        let owned: Vec<HeapPageId> = self
            .cache
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, p)| p.dirty_tid() == Some(tid))
            .map(|(pid, _)| *pid)
            .collect();

        for pid in owned {
            if commit {
                self.flush_page(pid, catalog, log_manager)?;
            } else {
                self.discard_page(pid);
                if let Ok(file) = catalog.get_file(pid.table_id) {
                    match file.read_page(pid) {
                        Ok(page) => {
                            self.cache.lock().unwrap().insert(pid, page);
                            self.order.lock().unwrap().push_back(pid);
                        }
                        Err(_) => {
                            debug!("page {} never reached disk, nothing to reload after abort", pid);
                        }
                    }
                }
            }
        }

        self.lock_manager.release_all(tid);
        Ok(())
    }

    pub fn cached_page_count(&self) -> usize {
        self.cache.lock().unwrap().len()
    }

    pub fn is_dirty(&self, page_id: HeapPageId) -> bool {
        self.cache.lock().unwrap().get(&page_id).map(|p| p.dirty_tid().is_some()).unwrap_or(false)
    }
}

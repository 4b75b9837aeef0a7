use std::sync::{Arc, Mutex, MutexGuard, Once};

use minidb_storage::buffer_pool::BufferPool;
use minidb_storage::catalog::Catalog;
use minidb_storage::heap_file::HeapFile;
use minidb_storage::log_manager::LogManager;
use minidb_storage::page;
use minidb_storage::tuple::TupleDesc;

static INIT: Once = Once::new();

// `page::set_page_size_for_test` is a process-wide override; serialize every
// fixture-based test against it so tests run in parallel by `cargo test`
// don't stomp on each other's page size.
static PAGE_SIZE_LOCK: Mutex<()> = Mutex::new(());

pub fn setup() {
    INIT.call_once(|| {
        minidb_storage::init_log();
    });
}

/// A throwaway on-disk fixture: one heap file plus its own WAL, in a
/// per-test temp directory that is never reused across runs.
pub struct Fixture {
    pub dir: std::path::PathBuf,
    pub catalog: Catalog,
    pub buffer_pool: BufferPool,
    pub log_manager: LogManager,
    pub table_id: i32,
    _page_size_guard: MutexGuard<'static, ()>,
}

impl Fixture {
    pub fn new(name: &str, desc: TupleDesc, capacity: usize) -> Fixture {
        setup();
        let guard = PAGE_SIZE_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        page::set_page_size_for_test(256);

        let mut dir = std::env::temp_dir();
        dir.push(format!("small_db_it_{}_{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        let table_path = dir.join("table.heap");
        let heap_file = HeapFile::new(&table_path, desc).unwrap();
        let table_id = heap_file.get_id();

        let catalog = Catalog::new();
        catalog.add_table(Arc::new(heap_file));

        let buffer_pool = BufferPool::new(capacity, 100, 300);
        let log_manager = LogManager::new(dir.join("wal.log")).unwrap();

        Fixture { dir, catalog, buffer_pool, log_manager, table_id, _page_size_guard: guard }
    }

    /// Re-opens the fixture against the same on-disk files with a fresh,
    /// empty buffer pool and log-manager in-memory state, simulating a
    /// process restart after a crash. Consumes `self` since a real restart
    /// discards the old in-memory state (and the fixture-local guard
    /// transfers rather than double-locking).
    pub fn reopen(self, capacity: usize) -> Fixture {
        let table_path = self.dir.join("table.heap");
        let desc = self.catalog.get_file(self.table_id).unwrap().get_tuple_desc().clone();
        let heap_file = HeapFile::new(&table_path, desc).unwrap();
        let table_id = heap_file.get_id();
        assert_eq!(table_id, self.table_id, "reopening must resolve to the same table id");

        let catalog = Catalog::new();
        catalog.add_table(Arc::new(heap_file));

        let buffer_pool = BufferPool::new(capacity, 100, 300);
        let log_manager = LogManager::new(self.dir.join("wal.log")).unwrap();
        let dir = self.dir.clone();
        let guard = self._page_size_guard;

        Fixture { dir, catalog, buffer_pool, log_manager, table_id, _page_size_guard: guard }
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        page::reset_page_size();
    }
}

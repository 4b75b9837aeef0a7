use std::sync::Arc;

use minidb_storage::buffer_pool::BufferPool;
use minidb_storage::catalog::Catalog;
use minidb_storage::error::SmallError;
use minidb_storage::heap_file::HeapFile;
use minidb_storage::transaction_id::TransactionId;
use minidb_storage::tuple::{simple_int_tuple_desc, Field, Tuple};

/// One catalog with `n` tiny, independent single-slot-per-page tables, so
/// tests can force distinct cached pages deterministically.
fn temp_catalog(name_hint: &str, n: usize) -> (Catalog, Vec<i32>) {
    minidb_storage::init_log();
    minidb_storage::page::set_page_size_for_test(256);
    let catalog = Catalog::new();
    let mut table_ids = Vec::new();
    for i in 0..n {
        let mut path = std::env::temp_dir();
        path.push(format!("small_db_buffer_pool_test_{}_{}_{}.table", name_hint, std::process::id(), i));
        let _ = std::fs::remove_file(&path);
        // a single int column with a 1-byte header forces exactly one
        // slot per page at this page size, so one insert fills a page.
        let desc = simple_int_tuple_desc(60, "c");
        let file = HeapFile::new(&path, desc).unwrap();
        table_ids.push(file.get_id());
        catalog.add_table(Arc::new(file));
    }
    (catalog, table_ids)
}

#[test]
fn insert_marks_page_dirty() {
    let (catalog, tables) = temp_catalog("insert", 1);
    let bp = BufferPool::new(10, 100, 100);
    let tid = TransactionId::new();
    bp.insert_tuple(tid, tables[0], Tuple::new(vec![Field::Int(1); 60]), &catalog).unwrap();
    assert_eq!(bp.cached_page_count(), 1);
    minidb_storage::page::reset_page_size();
}

// boundary scenario 6: with capacity 2, three distinct dirty pages over
// three independent tables must fail the third insert rather than evict
// a dirty page to make room.
#[test]
fn all_dirty_eviction_fails() {
    let (catalog, tables) = temp_catalog("evict", 3);
    let bp = BufferPool::new(2, 100, 100);
    let tid = TransactionId::new();

    bp.insert_tuple(tid, tables[0], Tuple::new(vec![Field::Int(1); 60]), &catalog).unwrap();
    bp.insert_tuple(tid, tables[1], Tuple::new(vec![Field::Int(2); 60]), &catalog).unwrap();
    assert_eq!(bp.cached_page_count(), 2);

    let result = bp.insert_tuple(tid, tables[2], Tuple::new(vec![Field::Int(3); 60]), &catalog);
    assert!(matches!(result, Err(SmallError::DbException(_))));
    minidb_storage::page::reset_page_size();
}

mod common;

use common::Fixture;
use minidb_storage::transaction_id::TransactionId;
use minidb_storage::tuple::{simple_int_tuple_desc, Field, Tuple};

// a single int column with a 1-byte header forces exactly one slot per
// page at this page size, so a second insert must roll onto a new page.
fn one_slot_desc() -> minidb_storage::tuple::TupleDesc {
    simple_int_tuple_desc(60, "c")
}

// Two inserts under the same uncommitted transaction must land on two
// distinct pages. Under NO-STEAL the first page's tuple never reaches
// disk before commit, so routing that reads straight off disk would see
// both pages as empty and hand the second insert back the already-full
// first page.
#[test]
fn second_insert_in_same_transaction_allocates_new_page() {
    let fx = Fixture::new("heap_file_alloc", one_slot_desc(), 10);
    let tid = TransactionId::new();

    fx.buffer_pool.insert_tuple(tid, fx.table_id, Tuple::new(vec![Field::Int(1)]), &fx.catalog).unwrap();
    fx.buffer_pool.insert_tuple(tid, fx.table_id, Tuple::new(vec![Field::Int(2)]), &fx.catalog).unwrap();

    // both pages are cached and dirty; neither tuple has reached disk,
    // which is exactly why probing disk directly would have sent the
    // second insert back to the already-full first page.
    assert_eq!(fx.buffer_pool.cached_page_count(), 2);
    let pid0 = minidb_storage::page_id::HeapPageId::new(fx.table_id, 0);
    let pid1 = minidb_storage::page_id::HeapPageId::new(fx.table_id, 1);
    assert!(fx.buffer_pool.is_dirty(pid0));
    assert!(fx.buffer_pool.is_dirty(pid1));
}

// A transaction's own uncommitted insert must be visible to its own scan
// before commit: the scan reads through the buffer pool, not the heap
// file directly, so it sees the cached, not-yet-flushed page.
#[test]
fn scan_sees_own_uncommitted_insert() {
    let fx = Fixture::new("heap_file_scan", one_slot_desc(), 10);
    let tid = TransactionId::new();

    fx.buffer_pool.insert_tuple(tid, fx.table_id, Tuple::new(vec![Field::Int(7)]), &fx.catalog).unwrap();

    let rows: Vec<i32> = fx
        .catalog
        .get_file(fx.table_id)
        .unwrap()
        .iterator(tid, &fx.buffer_pool, &fx.catalog)
        .unwrap()
        .iter()
        .map(|t| match t.get_field(0) {
            Field::Int(v) => *v,
            _ => unreachable!(),
        })
        .collect();

    assert_eq!(rows, vec![7], "scan within the same transaction must see its own uncommitted write");
}

// find_page_for_insert acquires a READ_WRITE lock on every existing
// candidate it probes (a brand-new table's first page is appended
// directly, with nothing yet to lock).
#[test]
fn find_page_for_insert_locks_each_candidate() {
    let fx = Fixture::new("heap_file_lock", simple_int_tuple_desc(1, "c"), 10);
    let seed = TransactionId::new();
    fx.buffer_pool.insert_tuple(seed, fx.table_id, Tuple::new(vec![Field::Int(0)]), &fx.catalog).unwrap();
    fx.buffer_pool.transaction_complete(seed, true, &fx.catalog, &fx.log_manager).unwrap();

    let tid = TransactionId::new();
    let pid = fx.catalog.get_file(fx.table_id).unwrap().find_page_for_insert(tid, &fx.buffer_pool, &fx.catalog).unwrap();
    assert!(fx.buffer_pool.holds_lock(tid, pid));
    assert_eq!(pid.page_number, 0);
}

#[test]
fn iterator_returns_empty_for_freshly_created_table() {
    let fx = Fixture::new("heap_file_empty", one_slot_desc(), 10);
    let tid = TransactionId::new();
    let rows = fx.catalog.get_file(fx.table_id).unwrap().iterator(tid, &fx.buffer_pool, &fx.catalog).unwrap();
    assert!(rows.is_empty());
}

// a page with room must be reused by the next transaction's probe rather
// than allocating a fresh one, even though it was the first transaction
// that actually created it.
#[test]
fn find_page_for_insert_reuses_page_with_room() {
    let fx = Fixture::new("heap_file_reuse", simple_int_tuple_desc(1, "c"), 10);
    let seed = TransactionId::new();
    fx.buffer_pool.insert_tuple(seed, fx.table_id, Tuple::new(vec![Field::Int(0)]), &fx.catalog).unwrap();
    fx.buffer_pool.transaction_complete(seed, true, &fx.catalog, &fx.log_manager).unwrap();

    let tid = TransactionId::new();
    let pid = fx.catalog.get_file(fx.table_id).unwrap().find_page_for_insert(tid, &fx.buffer_pool, &fx.catalog).unwrap();
    assert_eq!(pid.page_number, 0);
}

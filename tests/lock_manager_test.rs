mod common;

use std::thread;
use std::time::Duration;

use common::Fixture;
use minidb_storage::error::SmallError;
use minidb_storage::lock_manager::Permission;
use minidb_storage::page_id::HeapPageId;
use minidb_storage::transaction_id::TransactionId;

/// Allocates (or finds) a page for the fixture's table, releasing the
/// probe's own lock before handing the id back so tests start with a
/// clean slate to take their own locks against.
fn allocate_page(fx: &Fixture) -> HeapPageId {
    let prober = TransactionId::new();
    let pid = fx.catalog.get_file(fx.table_id).unwrap().find_page_for_insert(prober, &fx.buffer_pool, &fx.catalog).unwrap();
    fx.buffer_pool.release_page(prober, pid);
    pid
}

// boundary scenario 4: a second transaction's exclusive request on a page
// another transaction already holds exclusively must time out rather than
// block forever.
#[test]
fn exclusive_conflict_times_out() {
    let fx = Fixture::new("lock_conflict", minidb_storage::tuple::simple_int_tuple_desc(1, "c"), 10);
    let pid = allocate_page(&fx);

    let holder = TransactionId::new();
    fx.buffer_pool.get_page(holder, pid, Permission::ReadWrite, &fx.catalog).unwrap();

    let waiter = TransactionId::new();
    let start = std::time::Instant::now();
    let result = fx.buffer_pool.get_page(waiter, pid, Permission::ReadWrite, &fx.catalog);
    let elapsed = start.elapsed();

    assert!(matches!(result, Err(SmallError::TransactionAborted(_))));
    assert!(elapsed >= Duration::from_millis(250), "should wait out the exclusive-lock timeout before giving up");
}

// boundary scenario 5: two readers share a page; when one of them is the
// sole shared holder it can upgrade to exclusive in place without
// releasing and reacquiring.
#[test]
fn sole_shared_holder_upgrades_through_buffer_pool() {
    let fx = Fixture::new("lock_upgrade", minidb_storage::tuple::simple_int_tuple_desc(1, "c"), 10);
    let pid = allocate_page(&fx);

    let tid = TransactionId::new();
    fx.buffer_pool.get_page(tid, pid, Permission::ReadOnly, &fx.catalog).unwrap();
    let upgraded = fx.buffer_pool.get_page(tid, pid, Permission::ReadWrite, &fx.catalog);
    assert!(upgraded.is_ok(), "sole shared holder must be able to upgrade to exclusive");
    assert!(fx.buffer_pool.holds_lock(tid, pid));
}

// a real cross-thread race: a second transaction waits on an exclusive lock
// held by the first and must pick it up as soon as it's released, rather
// than deadlocking or timing out despite the release happening well inside
// the timeout window.
#[test]
fn waiter_acquires_lock_once_holder_releases() {
    let fx = Fixture::new("lock_race", minidb_storage::tuple::simple_int_tuple_desc(1, "c"), 10);
    let pid = allocate_page(&fx);

    let first = TransactionId::new();
    fx.buffer_pool.get_page(first, pid, Permission::ReadWrite, &fx.catalog).unwrap();

    thread::scope(|scope| {
        let handle = scope.spawn(|| {
            let second = TransactionId::new();
            let result = fx.buffer_pool.get_page(second, pid, Permission::ReadWrite, &fx.catalog);
            assert!(result.is_ok(), "waiter must acquire the lock once the holder releases it, not deadlock");
            assert!(fx.buffer_pool.holds_lock(second, pid));
        });

        thread::sleep(Duration::from_millis(50));
        fx.buffer_pool.release_page(first, pid);
        handle.join().unwrap();
    });
}

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use slot_pool::{SlotAlloc, SlotPool};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Value type that counts drops, so tests can observe `free` semantics.
#[derive(Debug)]
struct DropCounted {
    value: u32,
    drops: Arc<AtomicUsize>,
}

impl Drop for DropCounted {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

fn counted(value: u32, drops: &Arc<AtomicUsize>) -> DropCounted {
    DropCounted {
        value,
        drops: drops.clone(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn alloc_returns_distinct_slots() {
    let pool: SlotPool<u32, 4> = SlotPool::new();

    let a = pool.alloc(1).unwrap();
    let b = pool.alloc(2).unwrap();
    let c = pool.alloc(3).unwrap();

    assert_ne!(a, b);
    assert_ne!(b, c);
    assert_eq!(unsafe { *a.as_ref() }, 1);
    assert_eq!(unsafe { *b.as_ref() }, 2);
    assert_eq!(unsafe { *c.as_ref() }, 3);
    assert_eq!(pool.capacity(), 4);
    assert_eq!(pool.free_count(), 1);
}

#[test]
fn exhaustion_returns_value() {
    let pool: SlotPool<u32, 2> = SlotPool::new();

    let _a = pool.alloc(1).unwrap();
    let _b = pool.alloc(2).unwrap();

    assert_eq!(pool.alloc(3), Err(3));
    assert_eq!(pool.free_count(), 0);
}

#[test]
fn free_releases_slot_for_reuse() {
    let pool: SlotPool<u32, 1> = SlotPool::new();

    let a = pool.alloc(5).unwrap();
    assert!(pool.alloc(6).is_err());

    unsafe { pool.free(a) };
    assert_eq!(pool.free_count(), 1);

    let b = pool.alloc(7).unwrap();
    assert_eq!(unsafe { *b.as_ref() }, 7);
}

#[test]
fn free_drops_the_value() {
    let drops = Arc::new(AtomicUsize::new(0));
    let pool: SlotPool<DropCounted, 2> = SlotPool::new();

    let a = pool.alloc(counted(1, &drops)).unwrap();
    let b = pool.alloc(counted(2, &drops)).unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    unsafe { pool.free(a) };
    assert_eq!(drops.load(Ordering::SeqCst), 1);
    assert_eq!(unsafe { b.as_ref().value }, 2);

    unsafe { pool.free(b) };
    assert_eq!(drops.load(Ordering::SeqCst), 2);
    assert_eq!(pool.free_count(), 2);
}

#[test]
fn exhaustion_drops_nothing() {
    let drops = Arc::new(AtomicUsize::new(0));
    let pool: SlotPool<DropCounted, 1> = SlotPool::new();

    let _a = pool.alloc(counted(1, &drops)).unwrap();
    let rejected = pool.alloc(counted(2, &drops)).unwrap_err();
    assert_eq!(rejected.value, 2);
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    drop(rejected);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn static_pool_usable_as_dyn() {
    static POOL: SlotPool<u32, 3> = SlotPool::new();

    let pool: &'static dyn SlotAlloc<u32> = &POOL;
    let p = pool.alloc(9).unwrap();
    assert_eq!(pool.free_count(), 2);
    unsafe { pool.free(p) };
    assert_eq!(pool.free_count(), 3);
}

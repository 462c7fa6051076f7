//! Atomically replaceable shared value.
//!
//! Readers take one `Arc` snapshot and use it for the whole unit of work, so a
//! concurrent `swap` is seen either wholly before or wholly after.

use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub struct HotSwap<T: ?Sized> {
    current: RwLock<Arc<T>>,
    generation: AtomicU64,
}

impl<T: ?Sized> HotSwap<T> {
    pub fn new(value: Arc<T>) -> Self {
        Self { current: RwLock::new(value), generation: AtomicU64::new(0) }
    }

    /// Current value. Cheap: one read lock and an `Arc` clone.
    pub fn load(&self) -> Arc<T> {
        self.current.read().clone()
    }

    /// Replace the value, returning the previous one.
    pub fn swap(&self, value: Arc<T>) -> Arc<T> {
        let mut guard = self.current.write();
        self.generation.fetch_add(1, Ordering::Release);
        std::mem::replace(&mut *guard, value)
    }

    /// Number of swaps so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl<T: ?Sized> fmt::Debug for HotSwap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HotSwap").field("generation", &self.generation()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Named: Send + Sync {
        fn name(&self) -> &'static str;
    }
    struct A;
    struct B;
    impl Named for A {
        fn name(&self) -> &'static str {
            "a"
        }
    }
    impl Named for B {
        fn name(&self) -> &'static str {
            "b"
        }
    }

    #[test]
    fn snapshot_survives_swap() {
        let cell: HotSwap<dyn Named> = HotSwap::new(Arc::new(A) as Arc<dyn Named>);
        let before = cell.load();
        let old = cell.swap(Arc::new(B));
        assert_eq!(before.name(), "a");
        assert_eq!(old.name(), "a");
        assert_eq!(cell.load().name(), "b");
        assert_eq!(cell.generation(), 1);
    }

    #[test]
    fn concurrent_readers_see_whole_values() {
        let cell = Arc::new(HotSwap::new(Arc::new((1u64, 1u64))));
        let writer = {
            let cell = cell.clone();
            std::thread::spawn(move || {
                for i in 2..500u64 {
                    cell.swap(Arc::new((i, i)));
                }
            })
        };
        for _ in 0..500 {
            let v = cell.load();
            assert_eq!(v.0, v.1);
        }
        writer.join().unwrap();
        assert_eq!(cell.generation(), 498);
    }
}

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use weft::{RefCounted, RefPtr, ThreadSafeRefCount};

struct Payload {
    refs: ThreadSafeRefCount,
    destroyed: Arc<AtomicUsize>,
}

unsafe impl RefCounted for Payload {
    fn ref_count(&self) -> &ThreadSafeRefCount {
        &self.refs
    }
}

impl Drop for Payload {
    fn drop(&mut self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

fn payload(destroyed: &Arc<AtomicUsize>) -> RefPtr<Payload> {
    RefPtr::new(Payload {
        refs: ThreadSafeRefCount::new(),
        destroyed: Arc::clone(destroyed),
    })
}

#[test]
fn n_references_destroy_once_after_last_release() {
    const N: usize = 64;
    let destroyed = Arc::new(AtomicUsize::new(0));
    let raw = RefPtr::into_raw(payload(&destroyed));

    unsafe {
        for _ in 1..N {
            (*raw).add_ref();
        }
        assert_eq!((*raw).num_refs(), N as i32);

        for released in 1..N {
            weft::refcount::release_raw(raw);
            assert_eq!(destroyed.load(Ordering::SeqCst), 0, "destroyed after {} releases", released);
        }
        weft::refcount::release_raw(raw);
    }
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
}

#[test]
fn clones_dropped_on_many_threads_destroy_once() {
    let destroyed = Arc::new(AtomicUsize::new(0));
    let shared = payload(&destroyed);

    crossbeam::scope(|scope| {
        for _ in 0..8 {
            let batch: Vec<_> = (0..100).map(|_| shared.clone()).collect();
            scope.spawn(move |_| {
                for ptr in batch {
                    assert!(ptr.num_refs() >= 1);
                    drop(ptr);
                }
            });
        }
    })
    .unwrap();

    assert_eq!(shared.num_refs(), 1);
    assert_eq!(destroyed.load(Ordering::SeqCst), 0);
    drop(shared);
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
}

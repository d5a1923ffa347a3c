//! Tests for mutex, condition and reader/writer lock

use super::*;
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[cfg(test)]
mod mutex_tests {
    use super::*;

    #[test]
    fn lock_records_holder() {
        let mutex = Mutex::new(5);
        assert!(!mutex.is_self_locked());

        let guard = mutex.lock();
        assert_eq!(*guard, 5);
        assert!(mutex.is_self_locked());
        assert!(!mutex.is_locked(), "own hold is not reported as locked");

        drop(guard);
        assert!(!mutex.is_self_locked());
        assert!(mutex.holder().is_none());
    }

    #[test]
    fn recursive_lock_counts_depth() {
        let mutex = Mutex::new(());

        let outer = mutex.lock();
        let inner = mutex.lock();
        assert_eq!(mutex.depth(), 2);

        drop(inner);
        assert!(mutex.is_self_locked());
        assert_eq!(mutex.depth(), 1);

        drop(outer);
        assert_eq!(mutex.depth(), 0);
        assert!(!mutex.is_self_locked());
    }

    #[test]
    fn try_lock_reenters_for_holder() {
        let mutex = Mutex::new(());
        let _outer = mutex.lock();
        assert!(mutex.try_lock().is_some());
    }

    #[test]
    fn other_thread_sees_lock_held() {
        let mutex = Arc::new(Mutex::new(()));
        let _guard = mutex.lock();

        let remote = Arc::clone(&mutex);
        let (locked, self_locked, acquired) = thread::spawn(move || {
            (
                remote.is_locked(),
                remote.is_self_locked(),
                remote.try_lock().is_some(),
            )
        })
        .join()
        .unwrap();

        assert!(locked);
        assert!(!self_locked);
        assert!(!acquired);
    }

    #[test]
    fn mutual_exclusion_under_contention() {
        let mutex = Arc::new(Mutex::new(Cell::new(0u64)));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let mutex = Arc::clone(&mutex);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        let guard = mutex.lock();
                        guard.set(guard.get() + 1);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(mutex.lock().get(), 4000);
    }

    #[test]
    fn main_thread_contention_is_counted() {
        let main = MainThread::designate_current();
        let mutex = Arc::new(Mutex::with_policy((), main));
        let held = Arc::new(AtomicBool::new(false));

        let worker = {
            let mutex = Arc::clone(&mutex);
            let held = Arc::clone(&held);
            thread::spawn(move || {
                let _guard = mutex.lock();
                held.store(true, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(50));
            })
        };

        while !held.load(Ordering::SeqCst) {
            thread::yield_now();
        }
        drop(mutex.lock());
        worker.join().unwrap();

        assert_eq!(mutex.stats().main_contentions(), 1);
    }

    #[test]
    fn uncontended_main_lock_takes_fast_path() {
        let main = MainThread::designate_current();
        let mutex = Mutex::with_policy((), main);
        drop(mutex.lock());
        assert_eq!(mutex.stats().main_contentions(), 0);
    }

    #[test]
    fn global_mutex_initializes_on_first_use() {
        static COUNTER: GlobalMutex<Cell<u32>> = GlobalMutex::new(|| Cell::new(7));

        assert!(!COUNTER.is_initialized());
        {
            let guard = COUNTER.lock();
            guard.set(guard.get() + 1);
        }
        assert!(COUNTER.is_initialized());
        assert_eq!(COUNTER.lock().get(), 8);
        assert!(!COUNTER.install(unprivileged()));
    }

    #[test]
    fn global_mutex_install_sets_policy() {
        static LOCK: GlobalMutex<()> = GlobalMutex::new(|| ());

        assert!(LOCK.install(MainThread::designate_current()));
        assert!(LOCK.get().policy().is_main_thread());
    }

    #[test]
    fn into_inner_returns_value() {
        let mutex = Mutex::new(String::from("data"));
        assert_eq!(mutex.into_inner(), "data");
    }

    #[test]
    fn into_inner_releases_policy() {
        let main = MainThread::designate_current();
        let mutex = Mutex::with_policy(vec![1, 2], main.clone() as Arc<dyn LockPolicy>);
        assert_eq!(Arc::strong_count(&main), 2);

        assert_eq!(mutex.into_inner(), vec![1, 2]);
        assert_eq!(Arc::strong_count(&main), 1);
    }

    #[test]
    fn lock_opt_skips_missing_mutex() {
        let mutex = Mutex::new(1);
        assert!(Mutex::<i32>::lock_opt(None).is_none());

        let guard = Mutex::lock_opt(Some(&mutex));
        assert_eq!(guard.as_deref(), Some(&1));
        assert!(mutex.is_self_locked());
    }
}

#[cfg(test)]
mod condition_tests {
    use super::*;

    #[test]
    fn into_inner_and_debug() {
        let sized = Condition::new([7u8, 8]);
        {
            let unsized_view: &Condition<[u8]> = &sized;
            let text = format!("{:?}", unsized_view);
            assert!(text.contains("Condition"), "{}", text);
            assert!(text.contains("[7, 8]"), "{}", text);
        }
        assert_eq!(sized.into_inner(), [7, 8]);
    }

    #[test]
    fn signal_wakes_waiter_with_state_visible() {
        let cond = Arc::new(Condition::new(Cell::new(false)));

        let waiter = {
            let cond = Arc::clone(&cond);
            thread::spawn(move || {
                let mut guard = cond.lock();
                cond.wait_while(&mut guard, |ready| !ready.get());
                guard.get()
            })
        };

        thread::sleep(Duration::from_millis(20));
        {
            let guard = cond.lock();
            guard.set(true);
            cond.signal();
        }

        assert!(waiter.join().unwrap());
    }

    #[test]
    fn broadcast_wakes_all_waiters() {
        let cond = Arc::new(Condition::new(Cell::new(0u32)));
        let woken = Arc::new(AtomicUsize::new(0));

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let cond = Arc::clone(&cond);
                let woken = Arc::clone(&woken);
                thread::spawn(move || {
                    let mut guard = cond.lock();
                    cond.wait_while(&mut guard, |generation| generation.get() == 0);
                    woken.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        {
            let guard = cond.lock();
            guard.set(1);
            cond.broadcast();
        }

        for waiter in waiters {
            waiter.join().unwrap();
        }
        assert_eq!(woken.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn wait_releases_recursive_lock_fully() {
        let cond = Arc::new(Condition::new(Cell::new(false)));

        let waiter = {
            let cond = Arc::clone(&cond);
            thread::spawn(move || {
                let _outer = cond.lock();
                let mut inner = cond.lock();
                cond.wait_while(&mut inner, |ready| !ready.get());
                cond.mutex().depth()
            })
        };

        thread::sleep(Duration::from_millis(20));
        {
            let guard = cond.lock();
            guard.set(true);
            cond.signal();
        }

        assert_eq!(waiter.join().unwrap(), 2);
    }

    #[test]
    fn main_thread_wait_is_recorded() {
        let main = MainThread::designate_current();
        let cond = Arc::new(Condition::with_policy(Cell::new(false), main));

        let signaller = {
            let cond = Arc::clone(&cond);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                let guard = cond.lock();
                guard.set(true);
                cond.signal();
            })
        };

        let mut guard = cond.lock();
        cond.wait_while(&mut guard, |ready| !ready.get());
        drop(guard);
        signaller.join().unwrap();

        assert!(cond.mutex().stats().main_waits() >= 1);
    }

    #[test]
    #[should_panic(expected = "contract violation")]
    fn waiting_with_foreign_guard_is_fatal() {
        let cond = Condition::new(());
        let other = Condition::new(());
        let mut guard = other.lock();
        cond.wait(&mut guard);
    }
}

#[cfg(test)]
mod rwlock_tests {
    use super::*;

    #[test]
    fn readers_share_access() {
        let lock = PriorityRwLock::new(3);
        let a = lock.read();
        let b = lock.read();
        assert_eq!(*a + *b, 6);
        assert!(lock.is_locked());
        drop(a);
        drop(b);
        assert!(!lock.is_locked());
    }

    #[test]
    fn writer_waits_for_readers() {
        let lock = Arc::new(PriorityRwLock::new(0));
        let reader = lock.read();

        let writer = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                *lock.write() = 42;
            })
        };

        thread::sleep(Duration::from_millis(20));
        assert_eq!(*reader, 0);
        drop(reader);

        writer.join().unwrap();
        assert_eq!(*lock.read(), 42);
    }

    #[test]
    fn upgrade_and_downgrade() {
        let lock = PriorityRwLock::new(vec![1]);

        let read = lock.read();
        let mut write = read.upgrade();
        write.push(2);

        let read = write.downgrade();
        assert_eq!(*read, vec![1, 2]);
        drop(read);
        assert!(!lock.is_locked());
    }

    #[test]
    fn high_priority_reader_passes_waiting_writer() {
        let lock = Arc::new(PriorityRwLock::new(0));
        let first = lock.read();

        let writer = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                *lock.write() += 1;
            })
        };

        thread::sleep(Duration::from_millis(20));
        let second = lock.read_high_priority();
        assert_eq!(*second, 0);
        drop(second);
        drop(first);

        writer.join().unwrap();
        assert_eq!(*lock.read(), 1);
    }

    #[test]
    fn concurrent_writers_serialize() {
        let lock = Arc::new(PriorityRwLock::new(0u32));

        crossbeam::scope(|scope| {
            for _ in 0..4 {
                let lock = Arc::clone(&lock);
                scope.spawn(move |_| {
                    for _ in 0..250 {
                        *lock.write() += 1;
                        let _ = *lock.read();
                    }
                });
            }
        })
        .unwrap();

        assert_eq!(*lock.read(), 1000);
    }
}

//! Process-wide per-thread data
//!
//! Each thread that touches a [`ThreadLocalRegistry`] gets one
//! [`ThreadLocalData`] entry, created lazily on first access and removed when
//! the thread exits (or when its [`ThreadLocalGuard`] drops). A thread only
//! ever reaches its own entry; the map is shared so teardown can happen
//! from the exiting thread's destructor.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::id::ThreadToken;
use crate::logging::{log_thread_local_create, log_thread_local_teardown};
use crate::sync::{LockPolicy, MainThread};

/// Initial capacity of the lazily created error scratch buffer
const ERROR_BUFFER_CAPACITY: usize = 256;

/// One thread's entry
pub struct ThreadLocalData {
    name: String,
    members: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
    error_buffer: Option<Vec<u8>>,
}

impl ThreadLocalData {
    fn new(name: String) -> Self {
        Self {
            name,
            members: HashMap::new(),
            error_buffer: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Pooled resource of type `T`, created with `Default` on first use
    pub fn member<T: Any + Send + Sync + Default>(&mut self) -> &mut T {
        let slot = self
            .members
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(T::default()) as Box<dyn Any + Send + Sync>);
        match slot.downcast_mut::<T>() {
            Some(value) => value,
            // Keys are the TypeId of the stored value.
            None => unreachable!("thread-local member stored under a foreign TypeId"),
        }
    }

    pub fn get_member<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.members.get(&TypeId::of::<T>())?.downcast_ref::<T>()
    }

    /// Store a resource, returning the one it replaces
    pub fn insert_member<T: Any + Send + Sync>(&mut self, value: T) -> Option<T> {
        self.members
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    pub fn remove_member<T: Any + Send + Sync>(&mut self) -> Option<T> {
        self.members
            .remove(&TypeId::of::<T>())
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    /// Scratch space for formatting error messages
    pub fn error_buffer(&mut self) -> &mut Vec<u8> {
        self.error_buffer
            .get_or_insert_with(|| Vec::with_capacity(ERROR_BUFFER_CAPACITY))
    }

    pub fn has_error_buffer(&self) -> bool {
        self.error_buffer.is_some()
    }
}

impl fmt::Debug for ThreadLocalData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadLocalData")
            .field("name", &self.name)
            .field("members", &self.members.len())
            .field("error_buffer", &self.error_buffer.as_ref().map(Vec::capacity))
            .finish()
    }
}

struct RegistryInner {
    entries: DashMap<ThreadToken, ThreadLocalData>,
    main: Arc<MainThread>,
}

impl RegistryInner {
    fn remove(&self, token: ThreadToken) {
        if self.entries.remove(&token).is_some() {
            log_thread_local_teardown(token);
        }
    }
}

/// Removes this thread's entries from every live registry it touched
struct ExitHooks {
    token: ThreadToken,
    registries: Vec<Weak<RegistryInner>>,
}

impl Drop for ExitHooks {
    fn drop(&mut self) {
        for registry in self.registries.drain(..) {
            if let Some(inner) = registry.upgrade() {
                inner.remove(self.token);
            }
        }
    }
}

thread_local! {
    static EXIT_HOOKS: RefCell<Option<ExitHooks>> = const { RefCell::new(None) };
}

fn register_exit_hook(token: ThreadToken, inner: &Arc<RegistryInner>) {
    // Fails only while this thread's destructors are already running.
    let _ = EXIT_HOOKS.try_with(|hooks| {
        let mut hooks = hooks.borrow_mut();
        let hooks = hooks.get_or_insert_with(|| ExitHooks {
            token,
            registries: Vec::new(),
        });
        let known = hooks
            .registries
            .iter()
            .any(|weak| std::ptr::eq(weak.as_ptr(), Arc::as_ptr(inner)));
        if !known {
            hooks.registries.push(Arc::downgrade(inner));
        }
    });
}

/// Shared handle to the per-thread data map
#[derive(Clone)]
pub struct ThreadLocalRegistry {
    inner: Arc<RegistryInner>,
}

impl ThreadLocalRegistry {
    /// Registry whose main thread is the calling thread
    pub fn new() -> Self {
        Self::with_main_thread(MainThread::designate_current())
    }

    pub fn with_main_thread(main: Arc<MainThread>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                entries: DashMap::new(),
                main,
            }),
        }
    }

    /// Run `f` on the calling thread's entry, creating it if needed.
    ///
    /// `f` must not call back into this registry.
    pub fn with_current<R>(&self, f: impl FnOnce(&mut ThreadLocalData) -> R) -> R {
        let token = ThreadToken::current();
        let mut entry = match self.inner.entries.entry(token) {
            Entry::Occupied(occupied) => occupied.into_ref(),
            Entry::Vacant(vacant) => {
                let name = std::thread::current()
                    .name()
                    .map(str::to_owned)
                    .unwrap_or_else(|| format!("thread-{}", token.as_u64()));
                log_thread_local_create(token, &name);
                register_exit_hook(token, &self.inner);
                vacant.insert(ThreadLocalData::new(name))
            }
        };
        f(&mut entry)
    }

    /// Create or rename the calling thread's entry and remove it when the
    /// returned guard drops
    pub fn enter(&self, name: &str) -> ThreadLocalGuard {
        self.with_current(|data| data.set_name(name));
        ThreadLocalGuard {
            registry: self.clone(),
            token: ThreadToken::current(),
            _not_send: PhantomData,
        }
    }

    /// Remove the calling thread's entry now
    pub fn remove_current(&self) {
        self.inner.remove(ThreadToken::current());
    }

    pub fn contains_current(&self) -> bool {
        self.inner.entries.contains_key(&ThreadToken::current())
    }

    /// Name recorded for the calling thread, if it has an entry
    pub fn current_name(&self) -> Option<String> {
        self.inner
            .entries
            .get(&ThreadToken::current())
            .map(|data| data.name.clone())
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// True on the designated main thread; callable from any thread
    pub fn is_main_thread(&self) -> bool {
        self.inner.main.is_main_thread()
    }

    #[track_caller]
    pub fn assert_main_thread(&self) {
        self.inner.main.assert_main_thread();
    }

    pub fn main_thread(&self) -> &Arc<MainThread> {
        &self.inner.main
    }
}

impl Default for ThreadLocalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ThreadLocalRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadLocalRegistry")
            .field("entries", &self.inner.entries.len())
            .field("main", &self.inner.main)
            .finish()
    }
}

/// Scoped registration of the calling thread
#[must_use = "the entry is removed as soon as the guard is dropped"]
pub struct ThreadLocalGuard {
    registry: ThreadLocalRegistry,
    token: ThreadToken,
    _not_send: PhantomData<*const ()>,
}

impl ThreadLocalGuard {
    pub fn registry(&self) -> &ThreadLocalRegistry {
        &self.registry
    }
}

impl Drop for ThreadLocalGuard {
    fn drop(&mut self) {
        self.registry.inner.remove(self.token);
    }
}

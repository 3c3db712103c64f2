// Execution context isolation
//
// Each thread tracks which context is active. Entering an inner context
// swaps it in and hands back a guard; dropping the guard swaps the previous
// one back, on every exit path including unwinding panics.

use crate::polyglot::engine::GuestValue;
use parking_lot::{Mutex, MutexGuard};
use rustc_hash::FxHashMap;
use std::any::{Any, TypeId};
use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    /// The host's own context
    pub const HOST: ContextId = ContextId(0);
}

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static ACTIVE_CONTEXT: Cell<ContextId> = const { Cell::new(ContextId::HOST) };
}

/// Context active on the calling thread
pub fn active_context() -> ContextId {
    ACTIVE_CONTEXT.with(|active| active.get())
}

/// Isolated context guest code runs in. Holds the guest globals that
/// outlive a single call: module exports and per-engine state.
pub struct InnerContext {
    id: ContextId,
    exports: Mutex<FxHashMap<String, GuestValue>>,
    publish: Mutex<()>,
    engine_state: Mutex<FxHashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    enters: AtomicUsize,
    leaves: AtomicUsize,
}

impl InnerContext {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed)),
            exports: Mutex::new(FxHashMap::default()),
            publish: Mutex::new(()),
            engine_state: Mutex::new(FxHashMap::default()),
            enters: AtomicUsize::new(0),
            leaves: AtomicUsize::new(0),
        })
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Make this context active on the current thread until the guard drops
    pub fn enter(&self) -> ContextGuard<'_> {
        let previous = ACTIVE_CONTEXT.with(|active| active.replace(self.id));
        self.enters.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(context = self.id.0, previous = previous.0, "enter context");
        ContextGuard {
            context: self,
            previous,
            _not_send: PhantomData,
        }
    }

    pub fn enter_count(&self) -> usize {
        self.enters.load(Ordering::SeqCst)
    }

    pub fn leave_count(&self) -> usize {
        self.leaves.load(Ordering::SeqCst)
    }

    pub fn export(&self, name: impl Into<String>, value: GuestValue) {
        self.exports.lock().insert(name.into(), value);
    }

    pub fn import(&self, name: &str) -> Option<GuestValue> {
        self.exports.lock().get(name).cloned()
    }

    pub fn remove_export(&self, name: &str) -> Option<GuestValue> {
        self.exports.lock().remove(name)
    }

    /// Held while code that exports under a shared name runs and is imported
    pub fn lock_publish(&self) -> MutexGuard<'_, ()> {
        self.publish.lock()
    }

    /// Engine-private state, created on first use
    pub fn engine_state<T>(&self) -> Arc<T>
    where
        T: Any + Default + Send + Sync,
    {
        let mut states = self.engine_state.lock();
        let entry = states
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Arc::new(T::default()));
        match entry.clone().downcast::<T>() {
            Ok(state) => state,
            Err(_) => {
                let state = Arc::new(T::default());
                *entry = state.clone();
                state
            }
        }
    }
}

/// Proof that an inner context is active on this thread. Not `Send`: the
/// leave must happen on the thread that entered.
pub struct ContextGuard<'a> {
    context: &'a InnerContext,
    previous: ContextId,
    _not_send: PhantomData<*const ()>,
}

impl<'a> ContextGuard<'a> {
    pub fn context(&self) -> &'a InnerContext {
        self.context
    }

    /// Context that was active before this one
    pub fn previous(&self) -> ContextId {
        self.previous
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        ACTIVE_CONTEXT.with(|active| active.set(self.previous));
        self.context.leaves.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(
            context = self.context.id.0,
            restored = self.previous.0,
            "leave context"
        );
    }
}

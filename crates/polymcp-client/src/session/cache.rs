//! Capability list caches with staleness tracking.

use parking_lot::Mutex;

/// One cached capability list (tools, resources, or prompts).
///
/// A `list_changed` notification marks the cache stale without discarding
/// the items; `fresh()` then returns `None` until a refetch calls
/// `replace()`. Server order is preserved as stored.
pub(crate) struct CapabilityCache<T> {
    state: Mutex<CacheState<T>>,
}

struct CacheState<T> {
    items: Vec<T>,
    populated: bool,
    stale: bool,
}

impl<T: Clone> CapabilityCache<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(CacheState {
                items: Vec::new(),
                populated: false,
                stale: false,
            }),
        }
    }

    /// The cached items, unless never populated or marked stale.
    pub(crate) fn fresh(&self) -> Option<Vec<T>> {
        let state = self.state.lock();
        (state.populated && !state.stale).then(|| state.items.clone())
    }

    /// Install a freshly fetched list and clear the stale flag.
    pub(crate) fn replace(&self, items: Vec<T>) {
        let mut state = self.state.lock();
        state.items = items;
        state.populated = true;
        state.stale = false;
    }

    /// Mark the cache stale so the next read refetches.
    pub(crate) fn invalidate(&self) {
        self.state.lock().stale = true;
    }
}

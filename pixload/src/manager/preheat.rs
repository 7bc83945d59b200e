//! Background preheating.
//!
//! Preheat requests are ordinary requests at [`Priority::Low`], registered a
//! few at a time so they never crowd out interactive work. Each started
//! request is watched by a small task that frees its slot once the request
//! finishes.

use super::handle::WaiterRef;
use super::{Inner, State};
use crate::executor::Priority;
use crate::request::{cache_key, CacheKey, ImageRequest};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, trace};

/// Preheat bookkeeping, guarded by the manager lock.
#[derive(Default)]
pub(super) struct PreheatState {
    queued: VecDeque<(CacheKey, ImageRequest)>,
    active: HashMap<CacheKey, WaiterRef>,
}

impl PreheatState {
    fn contains(&self, key: &CacheKey) -> bool {
        self.active.contains_key(key) || self.queued.iter().any(|(k, _)| k == key)
    }

    pub(super) fn keys(&self) -> Vec<CacheKey> {
        self.active
            .keys()
            .cloned()
            .chain(self.queued.iter().map(|(k, _)| k.clone()))
            .collect()
    }

    /// Forgets everything without touching the tasks.
    pub(super) fn clear(&mut self) {
        self.queued.clear();
        self.active.clear();
    }
}

impl Inner {
    pub(super) fn start_preheating<I>(self: &Arc<Self>, requests: I)
    where
        I: IntoIterator<Item = ImageRequest>,
    {
        let mut state = self.state.lock();
        let mut added = 0usize;
        for request in requests {
            let request = request.with_priority(Priority::Low);
            let key = cache_key(&request);
            if state.preheat.contains(&key) {
                continue;
            }
            state.preheat.queued.push_back((key, request));
            added += 1;
        }
        debug!(added, queued = state.preheat.queued.len(), "Preheating started");
        self.pump_preheat(&mut state);
    }

    pub(super) fn stop_preheating<I>(self: &Arc<Self>, requests: I)
    where
        I: IntoIterator<Item = ImageRequest>,
    {
        let mut state = self.state.lock();
        for request in requests {
            let key = cache_key(&request);
            state.preheat.queued.retain(|(k, _)| *k != key);
            if let Some(waiter) = state.preheat.active.remove(&key) {
                self.cancel_waiter_locked(&mut state, &waiter);
            }
        }
        self.pump_preheat(&mut state);
    }

    pub(super) fn stop_preheating_all(&self) {
        let mut state = self.state.lock();
        state.preheat.queued.clear();
        let active: Vec<WaiterRef> = state.preheat.active.drain().map(|(_, w)| w).collect();
        for waiter in &active {
            self.cancel_waiter_locked(&mut state, waiter);
        }
        debug!(cancelled = active.len(), "Preheating stopped");
    }

    /// Starts queued preheat requests while slots are free.
    fn pump_preheat(self: &Arc<Self>, state: &mut State) {
        while state.preheat.active.len() < self.max_concurrent_preheating {
            let Some((key, request)) = state.preheat.queued.pop_front() else {
                break;
            };

            let task = self.register(state, request);
            // Resolved at registration (cache hit or invalidated)
            let Some(waiter) = task.waiter().cloned() else {
                trace!(key = %key, "Preheat already satisfied");
                continue;
            };
            state.preheat.active.insert(key.clone(), waiter.clone());

            let manager = Arc::downgrade(self);
            self.runtime.spawn(async move {
                let _ = task.wait().await;
                if let Some(inner) = manager.upgrade() {
                    inner.preheat_finished(&key, &waiter);
                }
            });
        }
    }

    fn preheat_finished(self: &Arc<Self>, key: &CacheKey, waiter: &WaiterRef) {
        let mut state = self.state.lock();
        if state.preheat.active.get(key) == Some(waiter) {
            state.preheat.active.remove(key);
            trace!(key = %key, "Preheat finished");
        }
        self.pump_preheat(&mut state);
    }
}

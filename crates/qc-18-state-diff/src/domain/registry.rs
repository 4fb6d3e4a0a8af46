//! Subscription registry and activity gate.
//!
//! The registry map and the gate flag are only ever mutated together, under
//! the registry lock, so the gate always reflects whether the map is empty.
//! Reads of the gate are lock-free.

use super::{Subscription, SubscriptionId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Concurrent-safe store of live subscriptions.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    subscriptions: Mutex<HashMap<SubscriptionId, Subscription>>,
    /// True while at least one subscription exists
    active: AtomicBool,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the subscription for `id`.
    ///
    /// Returns `true` when an existing entry was replaced.
    pub fn add(&self, id: SubscriptionId, subscription: Subscription) -> bool {
        let mut subs = self.subscriptions.lock();
        let replaced = subs.insert(id, subscription).is_some();
        self.sync_gate(&subs);
        replaced
    }

    /// Remove the subscription for `id`, handing it back if it existed.
    pub fn remove(&self, id: &SubscriptionId) -> Option<Subscription> {
        let mut subs = self.subscriptions.lock();
        let removed = subs.remove(id);
        self.sync_gate(&subs);
        removed
    }

    /// Visit every subscription once, dropping those for which `keep`
    /// returns false. Removal of the visited entry is safe mid-traversal.
    ///
    /// Returns the number of entries removed.
    pub fn retain<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(&SubscriptionId, &Subscription) -> bool,
    {
        let mut subs = self.subscriptions.lock();
        let before = subs.len();
        subs.retain(|id, sub| keep(id, sub));
        let removed = before - subs.len();
        self.sync_gate(&subs);
        removed
    }

    /// Lock-free check used by the dispatch loop's fast path.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn contains(&self, id: &SubscriptionId) -> bool {
        self.subscriptions.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.subscriptions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.lock().is_empty()
    }

    /// Must be called with the registry lock held.
    fn sync_gate(&self, subs: &HashMap<SubscriptionId, Subscription>) {
        let now_active = !subs.is_empty();
        let was_active = self.active.swap(now_active, Ordering::AcqRel);
        match (was_active, now_active) {
            (false, true) => {
                info!("[qc-18] State diffing subscription received; beginning statediff processing")
            }
            (true, false) => info!("[qc-18] No more subscriptions; halting statediff processing"),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Payload, TerminationReason};
    use proptest::prelude::*;
    use tokio::sync::mpsc;

    fn subscription() -> (
        Subscription,
        mpsc::Receiver<Payload>,
        mpsc::Receiver<TerminationReason>,
    ) {
        let (payload_tx, payload_rx) = mpsc::channel(4);
        let (control_tx, control_rx) = mpsc::channel(1);
        (
            Subscription::new(payload_tx, control_tx),
            payload_rx,
            control_rx,
        )
    }

    #[test]
    fn test_new_registry_is_inactive() {
        let registry = SubscriptionRegistry::new();
        assert!(!registry.is_active());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_add_activates_gate() {
        let registry = SubscriptionRegistry::new();
        let (sub, _p, _c) = subscription();

        assert!(!registry.add("0x1".into(), sub));
        assert!(registry.is_active());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_add_same_id_overwrites() {
        let registry = SubscriptionRegistry::new();
        let (first, _p1, _c1) = subscription();
        let (second, _p2, _c2) = subscription();

        registry.add("0x1".into(), first);
        assert!(registry.add("0x1".into(), second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_last_clears_gate() {
        let registry = SubscriptionRegistry::new();
        let (a, _pa, _ca) = subscription();
        let (b, _pb, _cb) = subscription();
        registry.add("0xa".into(), a);
        registry.add("0xb".into(), b);

        assert!(registry.remove(&"0xa".into()).is_some());
        assert!(registry.is_active());

        assert!(registry.remove(&"0xb".into()).is_some());
        assert!(!registry.is_active());
    }

    #[test]
    fn test_remove_unknown_id_leaves_registry_unchanged() {
        let registry = SubscriptionRegistry::new();
        let (sub, _p, _c) = subscription();
        registry.add("0x1".into(), sub);

        assert!(registry.remove(&"0x2".into()).is_none());
        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&"0x1".into()));
        assert!(registry.is_active());
    }

    #[test]
    fn test_retain_removes_during_iteration() {
        let registry = SubscriptionRegistry::new();
        let mut keep = Vec::new();
        for i in 0..6 {
            let (sub, p, c) = subscription();
            keep.push((p, c));
            registry.add(format!("0x{i}").into(), sub);
        }

        let mut visited = 0;
        let removed = registry.retain(|id, _| {
            visited += 1;
            !id.as_str().ends_with(['0', '2', '4'])
        });

        assert_eq!(visited, 6);
        assert_eq!(removed, 3);
        assert_eq!(registry.len(), 3);
        assert!(registry.contains(&"0x1".into()));
        assert!(!registry.contains(&"0x2".into()));
        assert!(registry.is_active());
    }

    #[test]
    fn test_retain_to_empty_clears_gate() {
        let registry = SubscriptionRegistry::new();
        let (sub, _p, _c) = subscription();
        registry.add("0x1".into(), sub);

        assert_eq!(registry.retain(|_, _| false), 1);
        assert!(!registry.is_active());
    }

    #[test]
    fn test_concurrent_add_remove_keeps_gate_consistent() {
        let registry = std::sync::Arc::new(SubscriptionRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let id: SubscriptionId = format!("0x{t}-{i}").into();
                        let (sub, _p, _c) = subscription();
                        registry.add(id.clone(), sub);
                        registry.remove(&id);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(registry.is_empty());
        assert!(!registry.is_active());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(u8),
        Remove(u8),
        DropAll,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..8).prop_map(Op::Add),
            (0u8..8).prop_map(Op::Remove),
            Just(Op::DropAll),
        ]
    }

    proptest! {
        #[test]
        fn prop_gate_tracks_emptiness(ops in proptest::collection::vec(op(), 0..64)) {
            let registry = SubscriptionRegistry::new();
            let mut receivers = Vec::new();
            for op in ops {
                match op {
                    Op::Add(n) => {
                        let (sub, p, c) = subscription();
                        receivers.push((p, c));
                        registry.add(format!("0x{n}").into(), sub);
                    }
                    Op::Remove(n) => {
                        registry.remove(&format!("0x{n}").into());
                    }
                    Op::DropAll => {
                        registry.retain(|_, _| false);
                    }
                }
                prop_assert_eq!(registry.is_active(), !registry.is_empty());
            }
        }
    }
}

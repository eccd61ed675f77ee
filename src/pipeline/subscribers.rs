use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, Weak},
};

use crate::color::Rgb;

pub type ColorCallback = Arc<dyn Fn(Rgb) -> anyhow::Result<()> + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: HashMap<u64, ColorCallback>,
}

/// Set of callbacks that receive every newly observed color.
///
/// Registering the same callback (same `Arc`) twice keeps a single live entry.
/// Publishing walks a snapshot, so callbacks may subscribe or unsubscribe
/// from inside a publish without deadlocking. A callback removed part way
/// through a publish is skipped; one added part way through waits for the
/// next publish. Iteration order is unspecified.
#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    inner: Arc<Mutex<Registry>>,
}

/// Handle returned by [`SubscriberRegistry::subscribe`].
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).entries.remove(&self.id);
        }
    }
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, callback: ColorCallback) -> Subscription {
        let mut registry = lock(&self.inner);

        let existing = registry
            .entries
            .iter()
            .find(|(_, current)| same_callback(current, &callback))
            .map(|(id, _)| *id);

        let id = match existing {
            Some(id) => id,
            None => {
                let id = registry.next_id;
                registry.next_id += 1;
                registry.entries.insert(id, callback);
                id
            }
        };

        Subscription {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every registered callback once. A failing callback is logged
    /// and the rest still run. Returns how many callbacks succeeded.
    pub fn publish(&self, rgb: Rgb) -> usize {
        let snapshot: Vec<(u64, ColorCallback)> = lock(&self.inner)
            .entries
            .iter()
            .map(|(id, callback)| (*id, callback.clone()))
            .collect();

        let mut delivered = 0;
        for (id, callback) in snapshot {
            if !lock(&self.inner).entries.contains_key(&id) {
                continue;
            }
            match callback(rgb) {
                Ok(()) => delivered += 1,
                Err(err) => log::error!("Color subscriber {id} failed: {err:#}"),
            }
        }
        delivered
    }
}

fn same_callback(a: &ColorCallback, b: &ColorCallback) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    registry
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting() -> (ColorCallback, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let callback: ColorCallback = Arc::new(move |_rgb| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        (callback, hits)
    }

    #[test]
    fn same_callback_registers_once() {
        let registry = SubscriberRegistry::new();
        let (callback, hits) = counting();

        let _first = registry.subscribe(callback.clone());
        let _second = registry.subscribe(callback);
        assert_eq!(registry.len(), 1);

        registry.publish(Rgb::new(1, 2, 3));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unsubscribed_callback_is_not_invoked() {
        let registry = SubscriberRegistry::new();
        let (callback, hits) = counting();

        registry.subscribe(callback).unsubscribe();
        assert!(registry.is_empty());

        registry.publish(Rgb::new(1, 2, 3));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failing_callback_does_not_stop_fan_out() {
        let registry = SubscriberRegistry::new();
        let (first, first_hits) = counting();
        let (second, second_hits) = counting();
        let failing: ColorCallback = Arc::new(|_rgb| anyhow::bail!("listener gone"));

        let _a = registry.subscribe(first);
        let _b = registry.subscribe(failing);
        let _c = registry.subscribe(second);

        assert_eq!(registry.publish(Rgb::new(0, 0, 0)), 2);
        assert_eq!(first_hits.load(Ordering::SeqCst), 1);
        assert_eq!(second_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_may_unsubscribe_itself_during_publish() {
        let registry = SubscriberRegistry::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let hits = Arc::new(AtomicUsize::new(0));

        let callback: ColorCallback = {
            let slot = slot.clone();
            let hits = hits.clone();
            Arc::new(move |_rgb| {
                hits.fetch_add(1, Ordering::SeqCst);
                if let Some(subscription) = slot.lock().unwrap().take() {
                    subscription.unsubscribe();
                }
                Ok(())
            })
        };
        *slot.lock().unwrap() = Some(registry.subscribe(callback));

        registry.publish(Rgb::new(9, 9, 9));
        registry.publish(Rgb::new(9, 9, 9));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn callback_removed_mid_publish_is_skipped() {
        let registry = SubscriberRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let first_slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let second_slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        // Each callback removes the other; whichever runs first wins.
        let removes = |other: Arc<Mutex<Option<Subscription>>>| -> ColorCallback {
            let hits = hits.clone();
            Arc::new(move |_rgb| {
                hits.fetch_add(1, Ordering::SeqCst);
                if let Some(subscription) = other.lock().unwrap().take() {
                    subscription.unsubscribe();
                }
                Ok(())
            })
        };

        *first_slot.lock().unwrap() = Some(registry.subscribe(removes(second_slot.clone())));
        *second_slot.lock().unwrap() = Some(registry.subscribe(removes(first_slot.clone())));

        assert_eq!(registry.publish(Rgb::new(4, 5, 6)), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
    }
}

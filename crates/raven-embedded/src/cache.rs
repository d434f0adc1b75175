//! Single-flight memoization keyed by name.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::OnceCell;

type Slot<V, E> = Arc<OnceCell<Result<Arc<V>, Arc<E>>>>;

/// Map from key to a cell computed at most once.
///
/// The map lock only guards slot lookup. Construction runs on the slot, so a
/// slow build for one key never blocks callers of another, and concurrent
/// callers for the same key wait for the first build and share its result.
/// A failed build is cached like a success until the key is removed. A
/// built value that the caller reports as stale is replaced on the next
/// request.
pub(crate) struct SingleFlight<V, E> {
    slots: Mutex<HashMap<String, Slot<V, E>>>,
}

impl<V, E> SingleFlight<V, E> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the value for `key`, building it with `build` on first use or
    /// when `is_stale` rejects the value built earlier.
    pub(crate) fn get_or_build<S, F>(
        &self,
        key: &str,
        is_stale: S,
        build: F,
    ) -> Result<Arc<V>, Arc<E>>
    where
        S: Fn(&V) -> bool,
        F: FnOnce() -> Result<V, E>,
    {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            let stale = slots
                .get(key)
                .and_then(resolved_value)
                .is_some_and(|value| is_stale(&value));
            if stale {
                slots.remove(key);
            }
            Arc::clone(slots.entry(key.to_owned()).or_default())
        };
        slot.get_or_init(|| build().map(Arc::new).map_err(Arc::new)).clone()
    }

    /// Returns whether `value` is the one currently cached under `key`.
    pub(crate) fn holds(&self, key: &str, value: &Arc<V>) -> bool {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .and_then(resolved_value)
            .is_some_and(|cached| Arc::ptr_eq(&cached, value))
    }

    /// Forgets `key`, returning its value if one was built.
    pub(crate) fn remove(&self, key: &str) -> Option<Arc<V>> {
        let slot = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)?;
        resolved_value(&slot)
    }

    /// Forgets every key, returning the values that were built.
    pub(crate) fn drain(&self) -> Vec<Arc<V>> {
        let slots: Vec<Slot<V, E>> = self
            .slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, slot)| slot)
            .collect();
        slots.iter().filter_map(resolved_value).collect()
    }
}

fn resolved_value<V, E>(slot: &Slot<V, E>) -> Option<Arc<V>> {
    slot.get().and_then(|result| result.as_ref().ok()).cloned()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    use super::*;

    fn never_stale(_: &String) -> bool {
        false
    }

    #[test]
    fn concurrent_callers_share_one_build() {
        let cache: Arc<SingleFlight<String, String>> = Arc::new(SingleFlight::new());
        let builds = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let shared_cache = Arc::clone(&cache);
                let build_count = Arc::clone(&builds);
                let start = Arc::clone(&barrier);
                thread::spawn(move || {
                    start.wait();
                    shared_cache.get_or_build("orders", never_stale, || {
                        build_count.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(50));
                        Ok("store".to_owned())
                    })
                })
            })
            .collect();
        let values: Vec<Arc<String>> = handles
            .into_iter()
            .map(|handle| handle.join().expect("join").expect("value"))
            .collect();

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        let first = values.first().expect("at least one value");
        assert!(values.iter().all(|value| Arc::ptr_eq(value, first)));
    }

    #[test]
    fn failures_are_cached_until_removed() {
        let cache: SingleFlight<String, String> = SingleFlight::new();
        let builds = AtomicUsize::new(0);
        let failing = || {
            builds.fetch_add(1, Ordering::SeqCst);
            Err("refused".to_owned())
        };

        let first = cache.get_or_build("orders", never_stale, failing);
        let second = cache.get_or_build("orders", never_stale, || Ok("store".to_owned()));
        assert_eq!(first.expect_err("first build fails").as_str(), "refused");
        assert_eq!(second.expect_err("failure is shared").as_str(), "refused");
        assert_eq!(builds.load(Ordering::SeqCst), 1);

        assert!(cache.remove("orders").is_none());
        let rebuilt = cache.get_or_build("orders", never_stale, || Ok("store".to_owned()));
        assert_eq!(rebuilt.expect("rebuilt").as_str(), "store");
    }

    #[test]
    fn keys_are_case_sensitive() {
        let cache: SingleFlight<String, String> = SingleFlight::new();

        let lower = cache.get_or_build("orders", never_stale, || Ok("lower".to_owned()));
        let upper = cache.get_or_build("Orders", never_stale, || Ok("upper".to_owned()));

        assert_eq!(lower.expect("lower").as_str(), "lower");
        assert_eq!(upper.expect("upper").as_str(), "upper");
    }

    #[test]
    fn drain_returns_only_built_values() {
        let cache: SingleFlight<String, String> = SingleFlight::new();
        let built = cache.get_or_build("orders", never_stale, || Ok("store".to_owned()));
        let failed = cache.get_or_build("invoices", never_stale, || Err("refused".to_owned()));
        assert!(built.is_ok());
        assert!(failed.is_err());

        let drained = cache.drain();

        assert_eq!(drained.len(), 1);
        assert!(cache.drain().is_empty());
    }

    #[test]
    fn stale_values_are_rebuilt() {
        let cache: SingleFlight<String, String> = SingleFlight::new();
        let first = cache
            .get_or_build("orders", never_stale, || Ok("closed".to_owned()))
            .expect("first");

        let second = cache
            .get_or_build("orders", |value| value == "closed", || Ok("open".to_owned()))
            .expect("second");

        assert_eq!(second.as_str(), "open");
        assert!(!cache.holds("orders", &first));
        assert!(cache.holds("orders", &second));
    }

    #[test]
    fn removed_slot_no_longer_holds_its_value() {
        let cache: SingleFlight<String, String> = SingleFlight::new();
        let value = cache
            .get_or_build("orders", never_stale, || Ok("store".to_owned()))
            .expect("value");

        assert!(cache.holds("orders", &value));
        assert!(cache.remove("orders").is_some());
        assert!(!cache.holds("orders", &value));
    }
}

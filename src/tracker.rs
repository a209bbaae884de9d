use crate::catalog::normalize_table_name;
use crate::error::{QbError, ResourceType};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Receives a callback after a committed write touched one of the tables the
/// observer registered for. May be invoked from any thread.
pub trait InvalidationObserver: Send + Sync {
    fn on_invalidated(&self, tables: &BTreeSet<String>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

enum ObserverRef {
    Strong(Arc<dyn InvalidationObserver>),
    Weak(Weak<dyn InvalidationObserver>),
}

impl ObserverRef {
    fn upgrade(&self) -> Option<Arc<dyn InvalidationObserver>> {
        match self {
            ObserverRef::Strong(observer) => Some(Arc::clone(observer)),
            ObserverRef::Weak(observer) => observer.upgrade(),
        }
    }
}

struct Registration {
    tables: BTreeSet<String>,
    target: ObserverRef,
}

#[derive(Default)]
struct TrackerState {
    observers: HashMap<ObserverId, Registration>,
    by_table: HashMap<String, BTreeSet<ObserverId>>,
}

impl TrackerState {
    fn remove(&mut self, id: ObserverId) -> bool {
        let Some(registration) = self.observers.remove(&id) else {
            return false;
        };
        for table in &registration.tables {
            if let Some(ids) = self.by_table.get_mut(table) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.by_table.remove(table);
                }
            }
        }
        true
    }
}

/// Table-name to observer registry shared by every live query of a database.
///
/// Registration, removal and notification may run concurrently from any
/// number of threads. Observers are invoked after the registry lock is
/// released, so a callback may register or remove observers itself.
#[derive(Default)]
pub struct InvalidationTracker {
    next_id: AtomicU64,
    state: RwLock<TrackerState>,
}

impl InvalidationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer the tracker keeps alive until
    /// [`InvalidationTracker::remove_observer`].
    pub fn add_observer<I, S>(
        &self,
        tables: I,
        observer: Arc<dyn InvalidationObserver>,
    ) -> Result<ObserverId, QbError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.register(tables, ObserverRef::Strong(observer))
    }

    /// Registers a non-owning reference. Once the observer is dropped the entry
    /// is removed on the next notification that reaches it.
    pub fn add_weak_observer<I, S>(
        &self,
        tables: I,
        observer: &Arc<dyn InvalidationObserver>,
    ) -> Result<ObserverId, QbError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.register(tables, ObserverRef::Weak(Arc::downgrade(observer)))
    }

    pub fn remove_observer(&self, id: ObserverId) -> Result<(), QbError> {
        if self.state.write().remove(id) {
            Ok(())
        } else {
            Err(QbError::NotFound {
                resource_type: ResourceType::Observer,
                resource_id: id.0.to_string(),
            })
        }
    }

    pub fn observer_count(&self) -> usize {
        self.state.read().observers.len()
    }

    pub fn observed_tables(&self) -> BTreeSet<String> {
        self.state.read().by_table.keys().cloned().collect()
    }

    /// Invokes every live observer registered for at least one of `tables`,
    /// once, with the subset of its tables that changed. Returns how many
    /// observers were invoked.
    pub fn notify_tables<I, S>(&self, tables: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let changed: BTreeSet<String> = tables
            .into_iter()
            .map(|t| normalize_table_name(t.as_ref()))
            .collect();
        if changed.is_empty() {
            return 0;
        }

        let mut targets = Vec::new();
        let mut dead = Vec::new();
        {
            let state = self.state.read();
            let mut ids = BTreeSet::new();
            for table in &changed {
                if let Some(observers) = state.by_table.get(table) {
                    ids.extend(observers.iter().copied());
                }
            }
            for id in ids {
                let Some(registration) = state.observers.get(&id) else {
                    continue;
                };
                match registration.target.upgrade() {
                    Some(observer) => {
                        let matched: BTreeSet<String> = registration
                            .tables
                            .intersection(&changed)
                            .cloned()
                            .collect();
                        targets.push((observer, matched));
                    }
                    None => dead.push(id),
                }
            }
        }

        if !dead.is_empty() {
            let mut state = self.state.write();
            for id in &dead {
                state.remove(*id);
            }
            debug!(pruned = dead.len(), "dropped observers whose target is gone");
        }

        debug!(
            tables = ?changed,
            observers = targets.len(),
            "notifying invalidation observers"
        );
        for (observer, matched) in &targets {
            observer.on_invalidated(matched);
        }
        targets.len()
    }

    fn register<I, S>(&self, tables: I, target: ObserverRef) -> Result<ObserverId, QbError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tables: BTreeSet<String> = tables
            .into_iter()
            .map(|t| normalize_table_name(t.as_ref()))
            .filter(|t| !t.is_empty())
            .collect();
        if tables.is_empty() {
            return Err(QbError::Validation(
                "an invalidation observer must name at least one table".into(),
            ));
        }

        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut state = self.state.write();
        for table in &tables {
            state.by_table.entry(table.clone()).or_default().insert(id);
        }
        state.observers.insert(id, Registration { tables, target });
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::{InvalidationObserver, InvalidationTracker};
    use parking_lot::Mutex;
    use std::collections::BTreeSet;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Recorder {
        calls: AtomicUsize,
        seen: Mutex<Vec<BTreeSet<String>>>,
    }

    impl InvalidationObserver for Recorder {
        fn on_invalidated(&self, tables: &BTreeSet<String>) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().push(tables.clone());
        }
    }

    #[test]
    fn observer_fires_once_per_notification_with_matched_tables() {
        let tracker = InvalidationTracker::new();
        let recorder = Arc::new(Recorder::default());
        tracker
            .add_observer(["user", "pet"], recorder.clone())
            .expect("register");

        let invoked = tracker.notify_tables(["USER", "pet", "toy"]);
        assert_eq!(invoked, 1);
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 1);
        let seen = recorder.seen.lock();
        assert_eq!(
            seen[0].iter().cloned().collect::<Vec<_>>(),
            vec!["pet".to_string(), "user".to_string()]
        );
    }

    #[test]
    fn unrelated_tables_do_not_fire() {
        let tracker = InvalidationTracker::new();
        let recorder = Arc::new(Recorder::default());
        tracker
            .add_observer(["user"], recorder.clone())
            .expect("register");
        assert_eq!(tracker.notify_tables(["pet"]), 0);
        assert_eq!(recorder.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn weak_observer_is_pruned_after_drop() {
        let tracker = InvalidationTracker::new();
        let recorder: Arc<dyn InvalidationObserver> = Arc::new(Recorder::default());
        tracker
            .add_weak_observer(["user"], &recorder)
            .expect("register");
        assert_eq!(tracker.notify_tables(["user"]), 1);

        drop(recorder);
        assert_eq!(tracker.notify_tables(["user"]), 0);
        assert_eq!(tracker.observer_count(), 0);
        assert!(tracker.observed_tables().is_empty());
    }

    #[test]
    fn removal_is_explicit_and_reported() {
        let tracker = InvalidationTracker::new();
        let recorder = Arc::new(Recorder::default());
        let id = tracker
            .add_observer(["user"], recorder.clone())
            .expect("register");
        tracker.remove_observer(id).expect("remove");
        assert_eq!(tracker.notify_tables(["user"]), 0);
        let err = tracker.remove_observer(id).expect_err("already removed");
        assert_eq!(err.code_str(), "observer_not_found");
    }

    #[test]
    fn empty_table_list_is_rejected() {
        let tracker = InvalidationTracker::new();
        let recorder = Arc::new(Recorder::default());
        assert!(tracker
            .add_observer(Vec::<String>::new(), recorder)
            .is_err());
    }

    #[test]
    fn concurrent_registration_keeps_every_observer() {
        let tracker = Arc::new(InvalidationTracker::new());
        let recorder = Arc::new(Recorder::default());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let tracker = Arc::clone(&tracker);
                let recorder = Arc::clone(&recorder);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        tracker
                            .add_observer([format!("t{}", i % 2)], recorder.clone())
                            .expect("register");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("join");
        }
        assert_eq!(tracker.observer_count(), 400);
        assert_eq!(tracker.notify_tables(["t0"]), 200);
    }
}

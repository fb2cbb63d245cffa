//! Indexed local caches fed by watch events.
//!
//! A cache is split into a single [`CacheWriter`], owned by the stream's
//! synchronizer task, and any number of cloneable [`WatchCache`] readers.

use crate::observability::metrics;
use crate::watch::filter::{FieldFilter, FilterTarget};
use kube::runtime::reflector::{store::Writer, ObjectRef, Store};
use kube::runtime::watcher::Event;
use kube::Resource;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::debug;

/// Capacity of the change notification channel; slow subscribers observe `Lagged`
const CHANGE_BUFFER: usize = 256;

/// Change observed by a cache
#[derive(Debug, Clone)]
pub enum WatchChange<K> {
    Applied(Arc<K>),
    Deleted(Arc<K>),
    /// A full relist finished and the cache now mirrors the server
    Resynced,
}

/// Bounds shared by every cached kind
pub trait Cached: FilterTarget<DynamicType = ()> + Clone + fmt::Debug + Send + Sync + 'static {}

impl<K> Cached for K where K: FilterTarget<DynamicType = ()> + Clone + fmt::Debug + Send + Sync + 'static {}

/// Create a connected reader/writer pair for one stream
pub fn cache_pair<K: Cached>(stream: &'static str, filter: FieldFilter) -> (WatchCache<K>, CacheWriter<K>) {
    let writer = Writer::default();
    let store = writer.as_reader();
    let (changes, _) = broadcast::channel(CHANGE_BUFFER);
    let (ready, _) = watch::channel(false);
    let ready = Arc::new(ready);

    let cache = WatchCache {
        stream,
        store: store.clone(),
        changes: changes.clone(),
        ready: Arc::clone(&ready),
    };
    let writer = CacheWriter {
        stream,
        filter,
        writer,
        store,
        changes,
        ready,
    };
    (cache, writer)
}

/// Read side of a stream's cache
pub struct WatchCache<K: Cached> {
    stream: &'static str,
    store: Store<K>,
    changes: broadcast::Sender<WatchChange<K>>,
    ready: Arc<watch::Sender<bool>>,
}

impl<K: Cached> WatchCache<K> {
    /// Name of the stream feeding this cache
    pub fn stream(&self) -> &'static str {
        self.stream
    }

    /// Point lookup; pass `None` as namespace for cluster-scoped kinds
    pub fn get(&self, namespace: Option<&str>, name: &str) -> Option<Arc<K>> {
        let mut key = ObjectRef::new(name);
        if let Some(namespace) = namespace {
            key = key.within(namespace);
        }
        self.store.get(&key)
    }

    /// Every cached object in one namespace
    pub fn list_namespace(&self, namespace: &str) -> Vec<Arc<K>> {
        self.store
            .state()
            .into_iter()
            .filter(|object| object.meta().namespace.as_deref() == Some(namespace))
            .collect()
    }

    /// Every cached object
    pub fn snapshot(&self) -> Vec<Arc<K>> {
        self.store.state()
    }

    pub fn len(&self) -> usize {
        self.store.state().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the initial list has been applied
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Wait for the initial list to be applied
    ///
    /// Returns `false` if the writer went away before that happened.
    pub async fn wait_until_ready(&self) -> bool {
        let mut ready = self.ready.subscribe();
        let synced = ready.wait_for(|ready| *ready).await.is_ok();
        synced
    }

    /// Subscribe to changes applied after this call
    pub fn subscribe(&self) -> broadcast::Receiver<WatchChange<K>> {
        self.changes.subscribe()
    }
}

impl<K: Cached> Clone for WatchCache<K> {
    fn clone(&self) -> Self {
        Self {
            stream: self.stream,
            store: self.store.clone(),
            changes: self.changes.clone(),
            ready: Arc::clone(&self.ready),
        }
    }
}

impl<K: Cached> fmt::Debug for WatchCache<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchCache")
            .field("stream", &self.stream)
            .field("ready", &*self.ready.borrow())
            .finish_non_exhaustive()
    }
}

/// Write side of a stream's cache
pub struct CacheWriter<K: Cached> {
    stream: &'static str,
    filter: FieldFilter,
    writer: Writer<K>,
    store: Store<K>,
    changes: broadcast::Sender<WatchChange<K>>,
    ready: Arc<watch::Sender<bool>>,
}

impl<K: Cached> CacheWriter<K> {
    /// Apply one watch event
    ///
    /// Objects failing the filter are never stored: an update that moves an
    /// object out of scope evicts it, and initial-list entries are dropped.
    /// Returns whether the event reached the store.
    pub fn apply(&mut self, event: Event<K>) -> bool {
        let event = match event {
            Event::Apply(object) if !self.filter.matches(&object) => {
                if self.store.get(&ObjectRef::from_obj(&object)).is_none() {
                    debug!(stream = self.stream, filter = %self.filter, "Ignoring object outside watch scope");
                    return false;
                }
                debug!(stream = self.stream, filter = %self.filter, "Evicting object that left watch scope");
                Event::Delete(object)
            }
            Event::InitApply(object) if !self.filter.matches(&object) => {
                debug!(stream = self.stream, filter = %self.filter, "Ignoring object outside watch scope");
                return false;
            }
            other => other,
        };

        self.writer.apply_watcher_event(&event);
        metrics::increment_watch_events(self.stream);

        let change = match event {
            Event::Apply(object) => Some(WatchChange::Applied(Arc::new(object))),
            Event::Delete(object) => Some(WatchChange::Deleted(Arc::new(object))),
            Event::InitDone => {
                self.ready.send_replace(true);
                Some(WatchChange::Resynced)
            }
            Event::Init | Event::InitApply(_) => None,
        };

        if change.is_some() {
            metrics::set_cache_objects(self.stream, self.store.state().len());
        }
        if let Some(change) = change {
            // No subscribers is not an error
            let _ = self.changes.send(change);
        }
        true
    }
}

impl<K: Cached> fmt::Debug for CacheWriter<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheWriter")
            .field("stream", &self.stream)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

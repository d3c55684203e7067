//! Storage backends: where the authoritative copy of a collection lives.
//!
//! A backend is picked once, at startup. [`LocalBackend`] means "there is no remote store", and the
//! collection manager falls back to its local cache. [`MemoryBackend`] is an in-process realtime store
//! that any number of clients can connect to. The Firebase Realtime Database backend lives in
//! [`crate::firebase`] behind the `firebase` feature.

use std::{cell::RefCell, rc::Rc};

use futures::future::{self, FutureExt as _, LocalBoxFuture};
use serde_json::Value;
use slotmap::SlotMap;

use crate::tree;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("remote store is not configured")]
    NotConfigured,
    #[error("remote store unreachable: {0}")]
    Unreachable(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("remote store rejected the request with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("subscription cancelled by the remote store: {0}")]
    Cancelled(String),
    #[error("could not decode remote data: {0}")]
    Decode(String),
}

/// Called with the whole subtree at the subscribed path, or `None` if nothing is stored there.
pub type SnapshotCallback = Box<dyn FnMut(Option<Value>)>;
pub type ErrorCallback = Box<dyn FnMut(RemoteError)>;

pub trait StorageBackend {
    /// `false` means there is no remote store, and nothing should be written to it.
    fn is_available(&self) -> bool;

    /// Watches the subtree at `path`. `on_snapshot` runs once with the current value and again
    /// after every change; `on_error` runs at most once, after which no more snapshots arrive.
    fn subscribe(
        &self,
        path: &str,
        on_snapshot: SnapshotCallback,
        on_error: ErrorCallback,
    ) -> Subscription;

    /// Replaces the whole subtree at `path`. `None` deletes it.
    fn write(
        &self,
        path: &str,
        value: Option<Value>,
    ) -> LocalBoxFuture<'static, Result<(), RemoteError>>;
}

/// A live subscription. Dropping it (or calling [`Subscription::unsubscribe`]) stops further callbacks.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to cancel.
    pub fn inert() -> Self {
        Self { cancel: None }
    }

    pub fn unsubscribe(mut self) {
        self.cancel();
    }

    fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// No remote store. Collections using it run in local-only mode.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalBackend;

impl StorageBackend for LocalBackend {
    fn is_available(&self) -> bool {
        false
    }

    fn subscribe(
        &self,
        _path: &str,
        _on_snapshot: SnapshotCallback,
        _on_error: ErrorCallback,
    ) -> Subscription {
        Subscription::inert()
    }

    fn write(
        &self,
        _path: &str,
        _value: Option<Value>,
    ) -> LocalBoxFuture<'static, Result<(), RemoteError>> {
        future::ready(Err(RemoteError::NotConfigured)).boxed_local()
    }
}

slotmap::new_key_type! {
    struct SubscriberKey;
}

struct Subscriber {
    path: Vec<String>,
    on_snapshot: Rc<RefCell<SnapshotCallback>>,
}

#[derive(Default)]
struct StoreInner {
    tree: Value,
    subscribers: SlotMap<SubscriberKey, Subscriber>,
}

/// An in-process realtime JSON tree. Clones share the same tree.
///
/// Every committed write is fanned out to every subscriber whose path overlaps the written path,
/// including the client that wrote it.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Rc<RefCell<StoreInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new client connection to this store.
    pub fn connect(&self) -> MemoryBackend {
        MemoryBackend {
            store: self.clone(),
            link: Rc::new(RefCell::new(Link::default())),
        }
    }

    pub fn get(&self, path: &str) -> Option<Value> {
        tree::get_at(&self.inner.borrow().tree, &tree::segments(path)).cloned()
    }

    /// Commits a write directly, as if some other client had made it.
    pub fn set(&self, path: &str, value: Option<Value>) {
        self.commit(&tree::segments(path), value.unwrap_or(Value::Null));
    }

    pub fn num_subscribers(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    fn commit(&self, path: &[String], value: Value) {
        // collect deliveries first: subscriber callbacks may call back into the store
        let deliveries = {
            let mut inner = self.inner.borrow_mut();
            tree::set_at(&mut inner.tree, path, value);
            let inner = &*inner;
            inner
                .subscribers
                .values()
                .filter(|subscriber| tree::overlaps(&subscriber.path, path))
                .map(|subscriber| {
                    (
                        Rc::clone(&subscriber.on_snapshot),
                        tree::get_at(&inner.tree, &subscriber.path).cloned(),
                    )
                })
                .collect::<Vec<_>>()
        };

        for (on_snapshot, snapshot) in deliveries {
            deliver(&on_snapshot, snapshot);
        }
    }

    fn register(&self, path: Vec<String>, on_snapshot: SnapshotCallback) -> SubscriberKey {
        let on_snapshot = Rc::new(RefCell::new(on_snapshot));
        let (key, snapshot) = {
            let mut inner = self.inner.borrow_mut();
            let snapshot = tree::get_at(&inner.tree, &path).cloned();
            let key = inner.subscribers.insert(Subscriber {
                path,
                on_snapshot: Rc::clone(&on_snapshot),
            });
            (key, snapshot)
        };
        deliver(&on_snapshot, snapshot);
        key
    }

    fn unregister(&self, key: SubscriberKey) {
        self.inner.borrow_mut().subscribers.remove(key);
    }
}

fn deliver(on_snapshot: &RefCell<SnapshotCallback>, snapshot: Option<Value>) {
    match on_snapshot.try_borrow_mut() {
        Ok(mut on_snapshot) => on_snapshot(snapshot),
        Err(_) => log::warn!("Skipping re-entrant snapshot delivery"),
    }
}

#[derive(Default)]
struct Link {
    offline: bool,
    failing_writes: usize,
    refuse_subscriptions: bool,
}

/// One client's connection to a [`MemoryStore`].
///
/// The connection can be taken offline, or told to fail writes or subscriptions, to exercise the
/// fallback and rollback paths of a collection.
#[derive(Clone)]
pub struct MemoryBackend {
    store: MemoryStore,
    link: Rc<RefCell<Link>>,
}

impl MemoryBackend {
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// While offline, writes fail with [`RemoteError::Unreachable`] and new subscriptions error out.
    pub fn set_offline(&self, offline: bool) {
        self.link.borrow_mut().offline = offline;
    }

    /// The next `count` writes fail with [`RemoteError::Unreachable`].
    pub fn fail_next_writes(&self, count: usize) {
        self.link.borrow_mut().failing_writes = count;
    }

    /// New subscriptions fail with [`RemoteError::PermissionDenied`].
    pub fn refuse_subscriptions(&self, refuse: bool) {
        self.link.borrow_mut().refuse_subscriptions = refuse;
    }
}

impl StorageBackend for MemoryBackend {
    fn is_available(&self) -> bool {
        true
    }

    fn subscribe(
        &self,
        path: &str,
        on_snapshot: SnapshotCallback,
        mut on_error: ErrorCallback,
    ) -> Subscription {
        let refusal = {
            let link = self.link.borrow();
            if link.offline {
                Some(RemoteError::Unreachable("client is offline".to_string()))
            } else if link.refuse_subscriptions {
                Some(RemoteError::PermissionDenied(format!("read of /{path}")))
            } else {
                None
            }
        };
        if let Some(error) = refusal {
            on_error(error);
            return Subscription::inert();
        }

        let key = self.store.register(tree::segments(path), on_snapshot);
        let store = self.store.clone();
        Subscription::new(move || store.unregister(key))
    }

    fn write(
        &self,
        path: &str,
        value: Option<Value>,
    ) -> LocalBoxFuture<'static, Result<(), RemoteError>> {
        let store = self.store.clone();
        let link = Rc::clone(&self.link);
        let path = tree::segments(path);

        async move {
            {
                let mut link = link.borrow_mut();
                if link.offline {
                    return Err(RemoteError::Unreachable("client is offline".to_string()));
                }
                if link.failing_writes > 0 {
                    link.failing_writes -= 1;
                    return Err(RemoteError::Unreachable("simulated write failure".to_string()));
                }
            }
            store.commit(&path, value.unwrap_or(Value::Null));
            Ok(())
        }
        .boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use serde_json::json;

    fn recorder() -> (Rc<RefCell<Vec<Option<Value>>>>, SnapshotCallback) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        (seen, Box::new(move |snapshot| sink.borrow_mut().push(snapshot)))
    }

    #[test]
    fn subscribe_delivers_current_value_then_changes() {
        let store = MemoryStore::new();
        store.set("activities", Some(json!({"d1-100": {"completed": true}})));

        let client = store.connect();
        let (seen, on_snapshot) = recorder();
        let _subscription = client.subscribe("activities", on_snapshot, Box::new(|_| {}));

        block_on(client.write("activities/d1-200", Some(json!({"completed": true})))).unwrap();
        // unrelated subtree
        block_on(client.write("itinerary", Some(json!({"version": 3})))).unwrap();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], Some(json!({"d1-100": {"completed": true}})));
        assert_eq!(
            seen[1],
            Some(json!({"d1-100": {"completed": true}, "d1-200": {"completed": true}}))
        );
    }

    #[test]
    fn writes_fan_out_to_other_clients_and_deletes_arrive_as_none() {
        let store = MemoryStore::new();
        let alex = store.connect();
        let sam = store.connect();

        let (seen, on_snapshot) = recorder();
        let _subscription = sam.subscribe("itinerary", on_snapshot, Box::new(|_| {}));

        block_on(alex.write("itinerary", Some(json!({"version": 3, "payload": []})))).unwrap();
        block_on(alex.write("itinerary", None)).unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![None, Some(json!({"version": 3, "payload": []})), None]
        );
        assert_eq!(store.get("itinerary"), None);
    }

    #[test]
    fn unsubscribe_stops_deliveries() {
        let store = MemoryStore::new();
        let client = store.connect();
        let (seen, on_snapshot) = recorder();

        let subscription = client.subscribe("a", on_snapshot, Box::new(|_| {}));
        assert_eq!(store.num_subscribers(), 1);
        subscription.unsubscribe();
        assert_eq!(store.num_subscribers(), 0);

        store.set("a", Some(json!(1)));
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn offline_client_fails_writes_and_subscriptions() {
        let store = MemoryStore::new();
        let client = store.connect();
        client.set_offline(true);

        let result = block_on(client.write("a", Some(json!(1))));
        assert!(matches!(result, Err(RemoteError::Unreachable(_))));
        assert_eq!(store.get("a"), None);

        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&errors);
        let _subscription = client.subscribe(
            "a",
            Box::new(|_| panic!("no snapshot expected")),
            Box::new(move |e| sink.borrow_mut().push(e)),
        );
        assert_eq!(errors.borrow().len(), 1);
    }

    #[test]
    fn injected_write_failures_are_one_shot() {
        let store = MemoryStore::new();
        let client = store.connect();
        client.fail_next_writes(1);

        assert!(block_on(client.write("a", Some(json!(1)))).is_err());
        assert!(block_on(client.write("a", Some(json!(2)))).is_ok());
        assert_eq!(store.get("a"), Some(json!(2)));
    }

    #[test]
    fn local_backend_is_unavailable() {
        let backend = LocalBackend;
        assert!(!backend.is_available());
        assert_eq!(
            block_on(backend.write("a", None)),
            Err(RemoteError::NotConfigured)
        );
    }
}

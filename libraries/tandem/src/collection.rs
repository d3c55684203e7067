//! # SyncedCollection
//! One instance per shared collection. It owns the in-memory value, decides which backend is
//! authoritative, applies mutations optimistically, and reconciles whatever the remote store sends back.
//!
//! Loading:
//! 1. No remote store: read the local cache. If the cached value has the current schema version, use it;
//!    otherwise keep the default. Done loading.
//! 2. Remote store: subscribe. Every snapshot with the current schema version replaces the value;
//!    stale or absent snapshots are ignored. The first callback, of either kind, finishes loading.
//! 3. Subscription error: record the error, read the local cache as in (1), and stay local-only for
//!    the rest of the session. There is no retry.
//!
//! Mutating:
//! 1. Compute the new value from the current one. Nothing is mutated in place.
//! 2. Publish it to listeners, synchronously.
//! 3. Write it to the local cache, always.
//! 4. Queue a write of the whole value to the remote store. Writes go out one at a time, in the order they were made.
//!    If a write fails, the collection's [`RemoteFailurePolicy`] decides whether to roll back. A rollback
//!    undoes only the entries that mutation changed, on top of whatever the value is by then.

use std::{cell::RefCell, rc::Rc};

use chrono::Utc;
use futures::{
    StreamExt as _,
    channel::{mpsc, oneshot},
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    Spawner,
    backend::{RemoteError, StorageBackend, Subscription},
    cache::LocalCache,
    listeners::{ListenerKey, Listeners, Notification},
    mutation::{Confirmation, MutationId, MutationOutcome, MutationState, PendingMutation, Undo},
    tree,
    version::{SchemaGate, Versioned},
};

/// What a collection does when a remote write fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoteFailurePolicy {
    /// Log the failure and keep presenting the optimistic value until the next snapshot arrives.
    KeepOptimistic,
    /// Put back the exact value from before the failed mutation.
    RollBack,
}

/// Where a collection is stored, and how.
#[derive(Clone, Debug)]
pub struct CollectionDescriptor {
    /// Subtree path in the remote store, e.g. `itinerary`.
    pub remote_path: String,
    /// Local cache key of the payload.
    pub cache_key: String,
    /// Local cache key of the payload's schema version tag.
    pub version_key: String,
    pub gate: SchemaGate,
    pub on_remote_failure: RemoteFailurePolicy,
}

impl CollectionDescriptor {
    /// The version tag is kept next to the payload, under `{cache_key}-version`.
    pub fn new(
        remote_path: impl Into<String>,
        cache_key: impl Into<String>,
        gate: SchemaGate,
    ) -> Self {
        let cache_key = cache_key.into();
        Self {
            remote_path: remote_path.into(),
            version_key: format!("{cache_key}-version"),
            cache_key,
            gate,
            on_remote_failure: RemoteFailurePolicy::KeepOptimistic,
        }
    }

    pub fn rolling_back_on_failure(mut self) -> Self {
        self.on_remote_failure = RemoteFailurePolicy::RollBack;
        self
    }
}

/// Anything that can be kept in a [`SyncedCollection`].
///
/// `Default` is the compiled-in value used when nothing valid is stored anywhere. It's also what an
/// absent payload decodes to, since realtime stores drop empty objects.
pub trait CollectionValue: Clone + PartialEq + Default + Serialize + DeserializeOwned + 'static {}

impl<T> CollectionValue for T where T: Clone + PartialEq + Default + Serialize + DeserializeOwned + 'static {}

pub struct SyncedCollection<T: CollectionValue> {
    shared: Rc<Shared<T>>,
}

impl<T: CollectionValue> Clone for SyncedCollection<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

struct Shared<T> {
    descriptor: CollectionDescriptor,
    cache: Rc<dyn LocalCache>,
    backend: Rc<dyn StorageBackend>,
    state: RefCell<State<T>>,
    // `None` once the collection is local-only
    writes: RefCell<Option<mpsc::UnboundedSender<WriteJob<T>>>>,
}

struct State<T> {
    value: Rc<T>,
    loading: bool,
    error: Option<RemoteError>,
    listeners: Listeners<T>,
    subscription: Option<Subscription>,
    degraded: bool,
    shut_down: bool,
    next_mutation_id: u64,
    last_mutation: Option<PendingMutation<T>>,
}

struct WriteJob<T> {
    undo: Option<Undo<T>>,
    value: Option<Value>,
    reply: oneshot::Sender<MutationOutcome>,
}

impl<T: CollectionValue> SyncedCollection<T> {
    /// Creates the collection and starts loading it.
    ///
    /// With a remote backend, the subscription is made here and the remote writer task is handed to `spawner`.
    pub fn open(
        descriptor: CollectionDescriptor,
        cache: Rc<dyn LocalCache>,
        backend: Rc<dyn StorageBackend>,
        spawner: &Spawner,
    ) -> Self {
        let remote = backend.is_available();
        let shared = Rc::new(Shared {
            descriptor,
            cache,
            backend,
            state: RefCell::new(State {
                value: Rc::new(T::default()),
                loading: true,
                error: None,
                listeners: Listeners::new(),
                subscription: None,
                degraded: !remote,
                shut_down: false,
                next_mutation_id: 0,
                last_mutation: None,
            }),
            writes: RefCell::new(None),
        });

        if remote {
            Shared::start_writer(&shared, spawner);
            Shared::subscribe(&shared);
        } else {
            log::info!(
                "{}: no remote store configured, using the local cache",
                shared.descriptor.remote_path
            );
            shared.load_from_cache();
        }

        Self { shared }
    }

    /// The current value. It is replaced wholesale on every change, so `Rc::ptr_eq` tells whether it changed.
    pub fn value(&self) -> Rc<T> {
        Rc::clone(&self.shared.state.borrow().value)
    }

    /// `true` until the first remote snapshot or error arrives (or, without a remote store, until the cache was read).
    pub fn loading(&self) -> bool {
        self.shared.state.borrow().loading
    }

    /// The subscription error that put this collection into local-only mode, if any.
    pub fn error(&self) -> Option<RemoteError> {
        self.shared.state.borrow().error.clone()
    }

    /// Whether mutations only reach the local cache.
    pub fn is_local_only(&self) -> bool {
        self.shared.state.borrow().degraded
    }

    pub fn last_mutation(&self) -> Option<(MutationId, MutationState)> {
        self.shared
            .state
            .borrow()
            .last_mutation
            .as_ref()
            .map(|pending| (pending.id(), pending.state()))
    }

    pub fn descriptor(&self) -> &CollectionDescriptor {
        &self.shared.descriptor
    }

    /// Calls `listener` with every new value, until unsubscribed.
    pub fn subscribe(&self, listener: impl Fn(&Rc<T>) + 'static) -> ListenerKey {
        self.shared.state.borrow_mut().listeners.register(listener)
    }

    pub fn unsubscribe(&self, key: ListenerKey) {
        self.shared.state.borrow_mut().listeners.unregister(key);
    }

    pub fn num_listeners(&self) -> usize {
        self.shared.state.borrow().listeners.len()
    }

    /// Applies `change` to the current value. `change` returns `None` when the request doesn't apply
    /// (say, an index that's out of range), in which case nothing happens.
    ///
    /// By the time this returns, the new value has been published and cached.
    pub fn mutate(&self, change: impl FnOnce(&T) -> Option<T>) -> Confirmation {
        let prior = self.value();
        let Some(next) = change(&prior) else {
            return Confirmation::ready(MutationOutcome::Unchanged);
        };
        if next == *prior {
            return Confirmation::ready(MutationOutcome::Unchanged);
        }
        let next = Rc::new(next);

        let (id, notification) = {
            let mut state = self.shared.state.borrow_mut();
            if state.shut_down {
                log::warn!(
                    "{}: ignoring mutation after shutdown",
                    self.shared.descriptor.remote_path
                );
                return Confirmation::ready(MutationOutcome::Abandoned);
            }
            state.next_mutation_id += 1;
            let id = MutationId(state.next_mutation_id);
            state.value = Rc::clone(&next);
            state.last_mutation = Some(PendingMutation::applied(id, Rc::clone(&next)));
            (id, Notification::new(&state.listeners, Rc::clone(&next)))
        };

        notification.send();
        self.shared.persist(&next);

        let envelope = Versioned::new(self.shared.descriptor.gate.current(), &*next, Utc::now());
        match serde_json::to_value(envelope) {
            Ok(envelope) => {
                let undo = Undo {
                    id,
                    prior,
                    optimistic: next,
                };
                self.shared.enqueue(Some(undo), Some(envelope))
            }
            Err(e) => {
                log::error!(
                    "{}: failed to encode value for the remote store: {e}",
                    self.shared.descriptor.remote_path
                );
                Confirmation::ready(MutationOutcome::KeptOptimistic)
            }
        }
    }

    /// Goes back to the compiled-in default: publishes it, clears both cache keys, and deletes the remote subtree.
    pub fn reset_to_default(&self) -> Confirmation {
        let notification = {
            let mut state = self.shared.state.borrow_mut();
            if state.shut_down {
                return Confirmation::ready(MutationOutcome::Abandoned);
            }
            state.value = Rc::new(T::default());
            state.last_mutation = None;
            Notification::new(&state.listeners, Rc::clone(&state.value))
        };
        notification.send();

        let descriptor = &self.shared.descriptor;
        for key in [&descriptor.cache_key, &descriptor.version_key] {
            if let Err(e) = self.shared.cache.remove(key) {
                log::error!("{}: failed to clear cached {key}: {e}", descriptor.remote_path);
            }
        }

        self.shared.enqueue(None, None)
    }

    /// Stops everything: no more snapshots, listener calls, or remote writes (queued ones still go out).
    pub fn shutdown(&self) {
        let subscription = {
            let mut state = self.shared.state.borrow_mut();
            state.shut_down = true;
            state.listeners.clear();
            state.subscription.take()
        };
        self.shared.writes.borrow_mut().take();
        drop(subscription);
    }
}

impl<T: CollectionValue> Shared<T> {
    fn start_writer(shared: &Rc<Self>, spawner: &Spawner) {
        let (sender, mut receiver) = mpsc::unbounded::<WriteJob<T>>();
        *shared.writes.borrow_mut() = Some(sender);

        let weak = Rc::downgrade(shared);
        let backend = Rc::clone(&shared.backend);
        let path = shared.descriptor.remote_path.clone();

        spawner(Box::pin(async move {
            while let Some(job) = receiver.next().await {
                let result = backend.write(&path, job.value).await;
                let outcome = match weak.upgrade() {
                    Some(shared) => shared.finish_write(job.undo, result),
                    None => MutationOutcome::Abandoned,
                };
                // nobody may be waiting for it
                let _ = job.reply.send(outcome);
            }
            log::debug!("{path}: remote writer stopped");
        }));
    }

    fn subscribe(shared: &Rc<Self>) {
        let on_snapshot = {
            let weak = Rc::downgrade(shared);
            Box::new(move |snapshot: Option<Value>| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_snapshot(snapshot);
                }
            })
        };
        let on_error = {
            let weak = Rc::downgrade(shared);
            Box::new(move |error: RemoteError| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_remote_error(error);
                }
            })
        };

        // no borrow may be held here: backends can call back before `subscribe` returns
        let subscription =
            shared
                .backend
                .subscribe(&shared.descriptor.remote_path, on_snapshot, on_error);

        let mut state = shared.state.borrow_mut();
        if state.degraded || state.shut_down {
            drop(state);
            drop(subscription);
        } else {
            state.subscription = Some(subscription);
        }
    }

    fn on_snapshot(&self, snapshot: Option<Value>) {
        let incoming = self
            .descriptor
            .gate
            .open_envelope(snapshot)
            .and_then(|payload| self.decode(payload));

        let notification = {
            let mut state = self.state.borrow_mut();
            if state.shut_down || state.degraded {
                return;
            }
            let was_loading = std::mem::replace(&mut state.loading, false);

            match incoming {
                Some(incoming) => {
                    if let Some(pending) = state.last_mutation.as_mut()
                        && pending.is_echoed_by(&incoming)
                        && pending.confirm()
                    {
                        log::debug!(
                            "{}: mutation {:?} confirmed by snapshot",
                            self.descriptor.remote_path,
                            pending.id()
                        );
                    }

                    // remote wins; equal content keeps its identity so consumers don't see a spurious change
                    if *state.value != incoming {
                        state.value = Rc::new(incoming);
                        Some(Notification::new(&state.listeners, Rc::clone(&state.value)))
                    } else {
                        was_loading
                            .then(|| Notification::new(&state.listeners, Rc::clone(&state.value)))
                    }
                }
                None => {
                    log::info!(
                        "{}: ignoring absent or stale remote snapshot, keeping the current value",
                        self.descriptor.remote_path
                    );
                    was_loading
                        .then(|| Notification::new(&state.listeners, Rc::clone(&state.value)))
                }
            }
        };

        if let Some(notification) = notification {
            notification.send();
        }
    }

    fn on_remote_error(&self, error: RemoteError) {
        log::error!(
            "{}: remote subscription failed, falling back to the local cache: {error}",
            self.descriptor.remote_path
        );

        let cached = self.read_cache();
        let (notification, subscription) = {
            let mut state = self.state.borrow_mut();
            if state.shut_down {
                return;
            }
            state.error = Some(error);
            state.loading = false;
            state.degraded = true;
            if let Some(cached) = cached {
                state.value = Rc::new(cached);
            }
            (
                Notification::new(&state.listeners, Rc::clone(&state.value)),
                state.subscription.take(),
            )
        };
        self.writes.borrow_mut().take();
        drop(subscription);

        notification.send();
    }

    fn load_from_cache(&self) {
        let cached = self.read_cache();
        let notification = {
            let mut state = self.state.borrow_mut();
            state.loading = false;
            if let Some(cached) = cached {
                state.value = Rc::new(cached);
            }
            Notification::new(&state.listeners, Rc::clone(&state.value))
        };
        notification.send();
    }

    fn read_cache(&self) -> Option<T> {
        let tag = SchemaGate::parse_tag(self.cache.get(&self.descriptor.version_key).as_deref());
        let raw = self.cache.get(&self.descriptor.cache_key)?;
        let payload: Value = serde_json::from_str(&raw)
            .inspect_err(|e| {
                log::error!(
                    "{}: error parsing cached value, ignoring it: {e}",
                    self.descriptor.remote_path
                )
            })
            .ok()?;
        let payload = self.descriptor.gate.admit(tag, payload)?;
        self.decode(payload)
    }

    fn decode(&self, payload: Value) -> Option<T> {
        if payload.is_null() {
            return Some(T::default());
        }
        serde_json::from_value(payload)
            .inspect_err(|e| {
                log::error!(
                    "{}: stored payload doesn't match the current schema: {e}",
                    self.descriptor.remote_path
                )
            })
            .ok()
    }

    fn persist(&self, value: &T) {
        let descriptor = &self.descriptor;
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                log::error!("{}: failed to encode value for the cache: {e}", descriptor.remote_path);
                return;
            }
        };
        if let Err(e) = self.cache.set(&descriptor.cache_key, &json) {
            log::error!("{}: failed to write the local cache: {e}", descriptor.remote_path);
            return;
        }
        if let Err(e) = self
            .cache
            .set(&descriptor.version_key, &descriptor.gate.current().to_string())
        {
            log::error!("{}: failed to write the version tag: {e}", descriptor.remote_path);
        }
    }

    fn enqueue(&self, undo: Option<Undo<T>>, value: Option<Value>) -> Confirmation {
        let Some(sender) = self.writes.borrow().clone() else {
            return Confirmation::ready(MutationOutcome::LocalOnly);
        };

        let (reply, receiver) = oneshot::channel();
        let job = WriteJob {
            undo,
            value,
            reply,
        };
        if sender.unbounded_send(job).is_err() {
            return Confirmation::ready(MutationOutcome::Abandoned);
        }
        Confirmation::pending(receiver)
    }

    fn finish_write(&self, undo: Option<Undo<T>>, result: Result<(), RemoteError>) -> MutationOutcome {
        let path = &self.descriptor.remote_path;

        let error = match result {
            Ok(()) => {
                let mut state = self.state.borrow_mut();
                if let Some(pending) = state.last_mutation.as_mut()
                    && Some(pending.id()) == undo.as_ref().map(|undo| undo.id)
                {
                    pending.confirm();
                }
                return MutationOutcome::Confirmed;
            }
            Err(error) => error,
        };

        log::error!("{path}: error syncing to the remote store: {error}");

        let Some(undo) = undo else {
            return MutationOutcome::KeptOptimistic;
        };
        if self.descriptor.on_remote_failure == RemoteFailurePolicy::KeepOptimistic {
            return MutationOutcome::KeptOptimistic;
        }

        let (notification, restored) = {
            let mut state = self.state.borrow_mut();
            if state.shut_down {
                return MutationOutcome::Abandoned;
            }
            if let Some(pending) = state.last_mutation.as_mut()
                && pending.id() == undo.id
                && !pending.roll_back()
            {
                log::warn!("{path}: mutation {:?} was already confirmed, keeping it", undo.id);
                return MutationOutcome::KeptOptimistic;
            }

            let Some(reverted) = self.revert(&state.value, &undo) else {
                return MutationOutcome::KeptOptimistic;
            };
            if reverted == *state.value {
                (None, Rc::clone(&state.value))
            } else {
                state.value = if reverted == *undo.prior {
                    Rc::clone(&undo.prior)
                } else {
                    Rc::new(reverted)
                };
                let notification = Notification::new(&state.listeners, Rc::clone(&state.value));
                (Some(notification), Rc::clone(&state.value))
            }
        };

        log::warn!("{path}: rolled back mutation {:?}", undo.id);
        if let Some(notification) = notification {
            notification.send();
        }
        // the cache may still hold the failed change even when the value already moved past it
        self.persist(&restored);
        MutationOutcome::RolledBack
    }

    /// Undoes `undo`'s change on `current`, leaving every entry it didn't write, or that changed since, alone.
    fn revert(&self, current: &T, undo: &Undo<T>) -> Option<T> {
        let encode = |value: &T| {
            serde_json::to_value(value)
                .inspect_err(|e| {
                    log::error!(
                        "{}: failed to encode value for rollback: {e}",
                        self.descriptor.remote_path
                    )
                })
                .ok()
        };
        let current = encode(current)?;
        let prior = encode(&undo.prior)?;
        let optimistic = encode(&undo.optimistic)?;

        let reverted = tree::revert(Some(&current), Some(&prior), Some(&optimistic));
        self.decode(reverted.unwrap_or(Value::Null))
    }
}

impl<T: CollectionValue + std::fmt::Debug> std::fmt::Debug for SyncedCollection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.borrow();
        f.debug_struct("SyncedCollection")
            .field("path", &self.shared.descriptor.remote_path)
            .field("value", &state.value)
            .field("loading", &state.loading)
            .field("degraded", &state.degraded)
            .finish()
    }
}

//! This is a library for keeping a handful of small shared collections in sync across clients.
//! It was created for a group trip planner, so it doesn't include much that was not needed for that project.
//!
//! Syncing strategy:
//! 1. Each collection (say, an itinerary, or a map of checkmarks) lives in its own subtree of a remote realtime store.
//!    The subtree root holds `{version, payload, lastUpdated}`.
//! 2. Each client keeps the whole collection in memory. Mutations are applied to the in-memory value first and published
//!    to listeners straight away, then written to a local cache, then written (whole) to the remote store.
//! 3. The remote store fans every committed write back out to every subscribed client, including the one that wrote it.
//!    Whatever snapshot arrives last wins; there is no merging.
//! 4. If the remote store isn't configured, or the subscription fails, the local cache is the only backend for the rest of the session.
//!
//! Every stored payload carries a schema version. Payloads with a version that doesn't match are thrown away.

pub mod backend;
pub mod cache;
pub mod collection;
pub mod mutation;
pub mod version;

#[cfg(feature = "firebase")]
pub mod firebase;

mod listeners;
mod tree;

pub use backend::{LocalBackend, MemoryBackend, MemoryStore, RemoteError, StorageBackend, Subscription};
pub use cache::{CacheError, FileCache, LocalCache, MemoryCache};
pub use collection::{CollectionDescriptor, CollectionValue, RemoteFailurePolicy, SyncedCollection};
pub use listeners::ListenerKey;
pub use mutation::{Confirmation, MutationId, MutationOutcome, MutationState};
pub use version::{SchemaGate, Versioned};

use futures::future::LocalBoxFuture;
use std::rc::Rc;

/// Runs a future to completion on whatever single-threaded executor the application uses.
///
/// For example `tokio::task::spawn_local`, `wasm_bindgen_futures::spawn_local`, or a
/// `futures::executor::LocalPool` spawner (see [`local_pool_spawner`]).
pub type Spawner = Rc<dyn Fn(LocalBoxFuture<'static, ()>)>;

/// Adapts a `futures` [`LocalSpawner`](futures::executor::LocalSpawner) into a [`Spawner`].
pub fn local_pool_spawner(spawner: futures::executor::LocalSpawner) -> Spawner {
    use futures::task::LocalSpawnExt as _;

    Rc::new(move |future| {
        if let Err(e) = spawner.spawn_local(future) {
            log::error!("Failed to spawn task, executor is shut down: {e:?}");
        }
    })
}

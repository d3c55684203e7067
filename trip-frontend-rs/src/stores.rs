//! One typed store per shared collection, each a thin layer over a [`SyncedCollection`] that knows
//! where the collection lives and which edits it supports.
//!
//! Reads (`value`, `loading`, `error`, `subscribe`, ...) go straight through to the collection.

use std::{ops::Deref, rc::Rc};

use chrono::Utc;
use tandem::{
    CollectionDescriptor, Confirmation, LocalCache, SchemaGate, Spawner, StorageBackend,
    SyncedCollection,
};

use crate::{
    completion::CompletionLedger,
    itinerary::{Activity, ActivityId, ActivityPatch, Itinerary},
    packing::PackingChecklist,
    users::UserName,
};

pub const ITINERARY_SCHEMA_VERSION: u32 = 3;
pub const COMPLETIONS_SCHEMA_VERSION: u32 = 1;
pub const PACKING_SCHEMA_VERSION: u32 = 1;

/// Structural edits keep their optimistic value if the remote write fails.
pub fn itinerary_descriptor() -> CollectionDescriptor {
    CollectionDescriptor::new(
        "itinerary",
        "keywest-itinerary",
        SchemaGate::new(ITINERARY_SCHEMA_VERSION),
    )
}

pub fn completions_descriptor() -> CollectionDescriptor {
    CollectionDescriptor::new(
        "activities",
        "keywest-activities",
        SchemaGate::new(COMPLETIONS_SCHEMA_VERSION),
    )
    .rolling_back_on_failure()
}

pub fn packing_descriptor() -> CollectionDescriptor {
    CollectionDescriptor::new(
        "packingChecklist",
        "keywest-packing-checklist",
        SchemaGate::new(PACKING_SCHEMA_VERSION),
    )
    .rolling_back_on_failure()
}

pub struct ItineraryStore {
    collection: SyncedCollection<Itinerary>,
}

impl ItineraryStore {
    pub fn open(cache: Rc<dyn LocalCache>, backend: Rc<dyn StorageBackend>, spawner: &Spawner) -> Self {
        Self {
            collection: SyncedCollection::open(itinerary_descriptor(), cache, backend, spawner),
        }
    }

    pub fn update_activity(
        &self,
        day_index: usize,
        id: &ActivityId,
        patch: &ActivityPatch,
    ) -> Confirmation {
        self.collection
            .mutate(|itinerary| itinerary.update_activity(day_index, id, patch))
    }

    pub fn add_activity(&self, day_index: usize, activity: Activity) -> Confirmation {
        self.collection
            .mutate(|itinerary| itinerary.add_activity(day_index, activity))
    }

    pub fn remove_activity(&self, day_index: usize, id: &ActivityId) -> Confirmation {
        self.collection
            .mutate(|itinerary| itinerary.remove_activity(day_index, id))
    }

    pub fn reorder_activities(
        &self,
        day_index: usize,
        source: usize,
        destination: usize,
    ) -> Confirmation {
        self.collection
            .mutate(|itinerary| itinerary.reorder_activities(day_index, source, destination))
    }
}

impl Deref for ItineraryStore {
    type Target = SyncedCollection<Itinerary>;

    fn deref(&self) -> &Self::Target {
        &self.collection
    }
}

pub struct CompletionStore {
    collection: SyncedCollection<CompletionLedger>,
}

impl CompletionStore {
    pub fn open(cache: Rc<dyn LocalCache>, backend: Rc<dyn StorageBackend>, spawner: &Spawner) -> Self {
        Self {
            collection: SyncedCollection::open(completions_descriptor(), cache, backend, spawner),
        }
    }

    pub fn toggle(&self, id: &ActivityId, user: &UserName) -> Confirmation {
        let now = Utc::now();
        self.collection
            .mutate(|ledger| Some(ledger.toggle(id, user, now)))
    }
}

impl Deref for CompletionStore {
    type Target = SyncedCollection<CompletionLedger>;

    fn deref(&self) -> &Self::Target {
        &self.collection
    }
}

pub struct PackingStore {
    collection: SyncedCollection<PackingChecklist>,
}

impl PackingStore {
    pub fn open(cache: Rc<dyn LocalCache>, backend: Rc<dyn StorageBackend>, spawner: &Spawner) -> Self {
        Self {
            collection: SyncedCollection::open(packing_descriptor(), cache, backend, spawner),
        }
    }

    /// Flips `user`'s own column. Whether this device may touch that column is up to the caller.
    pub fn toggle(&self, item_id: &str, user: &UserName) -> Confirmation {
        let now = Utc::now();
        self.collection
            .mutate(|checklist| Some(checklist.toggle(item_id, user, now)))
    }
}

impl Deref for PackingStore {
    type Target = SyncedCollection<PackingChecklist>;

    fn deref(&self) -> &Self::Target {
        &self.collection
    }
}

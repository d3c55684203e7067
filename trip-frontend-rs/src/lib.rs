//! A shared trip planner: the itinerary, who has done which activity, and who has packed what,
//! kept in sync between everyone on the trip.
//!
//! [`Trip`] is the entry point. It picks a storage backend from [`TripConfig`], opens one store
//! per shared collection, and remembers which roster member is using this device.

pub mod clock;
pub mod completion;
pub mod config;
pub mod defaults;
pub mod itinerary;
pub mod packing;
pub mod stores;
pub mod users;

#[cfg(target_arch = "wasm32")]
pub mod browser;

use std::rc::Rc;

use tandem::{CacheError, Confirmation, LocalBackend, LocalCache, Spawner, StorageBackend};

pub use clock::ClockTime;
pub use completion::{ActivityCompletion, CompletionLedger, TripProgress};
pub use config::{BackendConfig, ConfigError, TripConfig};
pub use itinerary::{Activity, ActivityCategory, ActivityId, ActivityPatch, Day, Itinerary, Location};
pub use packing::{CheckMark, PackingChecklist, PackingProgress};
pub use stores::{CompletionStore, ItineraryStore, PackingStore};
pub use users::{CurrentUser, Roster, UserName};

#[derive(Debug, thiserror::Error)]
pub enum TripError {
    #[error("pick a name first")]
    NoCurrentUser,
    #[error("{0:?} is not on the roster")]
    UnknownUser(String),
    #[error("{current} can't change {requested}'s packing list")]
    NotYourColumn { current: UserName, requested: UserName },
    #[error("there is no packing item {0:?}")]
    UnknownPackingItem(String),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub struct Trip {
    pub itinerary: ItineraryStore,
    pub completions: CompletionStore,
    pub packing: PackingStore,
    user: CurrentUser,
}

impl Trip {
    /// Opens the cache and backend described by `config`, then every store.
    ///
    /// `spawner` runs the background remote work (writes, and with Firebase, the event streams).
    pub fn open(config: &TripConfig, spawner: Spawner) -> Result<Self, TripError> {
        let cache = open_cache(config).inspect_err(|e| {
            log::error!("Error opening the local cache: {e}");
        })?;
        let backend = open_backend(&config.backend, &spawner);
        Ok(Self::with_backends(config.roster.clone(), cache, backend, &spawner))
    }

    pub fn with_backends(
        roster: Roster,
        cache: Rc<dyn LocalCache>,
        backend: Rc<dyn StorageBackend>,
        spawner: &Spawner,
    ) -> Self {
        Self {
            itinerary: ItineraryStore::open(Rc::clone(&cache), Rc::clone(&backend), spawner),
            completions: CompletionStore::open(Rc::clone(&cache), Rc::clone(&backend), spawner),
            packing: PackingStore::open(Rc::clone(&cache), backend, spawner),
            user: CurrentUser::restore(cache, roster),
        }
    }

    pub fn roster(&self) -> &Roster {
        self.user.roster()
    }

    pub fn current_user(&self) -> Option<UserName> {
        self.user.get()
    }

    pub fn select_user(&self, name: &str) -> Result<UserName, TripError> {
        self.user.select(name)
    }

    pub fn forget_user(&self) {
        self.user.clear();
    }

    /// `true` until every store has heard from its backend.
    pub fn loading(&self) -> bool {
        self.itinerary.loading() || self.completions.loading() || self.packing.loading()
    }

    /// Marks the activity done by the current user, or not done.
    pub fn toggle_activity(&self, id: &ActivityId) -> Result<Confirmation, TripError> {
        let user = self.current_user().ok_or(TripError::NoCurrentUser)?;
        Ok(self.completions.toggle(id, &user))
    }

    /// Ticks or unticks `column`'s mark on an item. Only the current user's own column can be changed.
    pub fn toggle_packing_item(
        &self,
        item_id: &str,
        column: &UserName,
    ) -> Result<Confirmation, TripError> {
        let user = self.current_user().ok_or(TripError::NoCurrentUser)?;
        if user != *column {
            return Err(TripError::NotYourColumn {
                current: user,
                requested: column.clone(),
            });
        }
        if packing::find_item(item_id).is_none() {
            return Err(TripError::UnknownPackingItem(item_id.to_string()));
        }
        Ok(self.packing.toggle(item_id, &user))
    }

    /// Adds an activity at the end of a day, with a fresh id.
    pub fn add_activity(
        &self,
        day_index: usize,
        title: &str,
        time: ClockTime,
        category: ActivityCategory,
    ) -> Option<(ActivityId, Confirmation)> {
        let day = self.itinerary.value().day(day_index)?.day;
        let id = ActivityId::generate(day, chrono::Utc::now());
        let activity = Activity::new(id.clone(), title, time, category);
        Some((id, self.itinerary.add_activity(day_index, activity)))
    }

    pub fn progress(&self) -> TripProgress {
        self.completions.value().progress(&self.itinerary.value())
    }

    /// Puts the itinerary back to the compiled-in one, here and in the remote store.
    pub fn reset_itinerary(&self) -> Confirmation {
        log::info!("Resetting the itinerary to the default");
        self.itinerary.reset_to_default()
    }

    pub fn shutdown(&self) {
        self.itinerary.shutdown();
        self.completions.shutdown();
        self.packing.shutdown();
    }
}

fn open_cache(config: &TripConfig) -> Result<Rc<dyn LocalCache>, TripError> {
    if let Some(path) = &config.cache_path {
        return Ok(Rc::new(tandem::FileCache::open(path)?));
    }

    #[cfg(target_arch = "wasm32")]
    {
        Ok(Rc::new(tandem::cache::BrowserStorage::new()?))
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        log::info!("No TRIP_CACHE_PATH set, keeping the local cache in memory");
        Ok(Rc::new(tandem::MemoryCache::new()))
    }
}

fn open_backend(config: &BackendConfig, spawner: &Spawner) -> Rc<dyn StorageBackend> {
    match config {
        BackendConfig::LocalOnly => {
            log::warn!("No remote store configured, changes stay on this device");
            Rc::new(LocalBackend)
        }
        #[cfg(feature = "firebase")]
        BackendConfig::Firebase {
            database_url,
            auth_token,
        } => Rc::new(tandem::firebase::FirebaseBackend::new(
            tandem::firebase::FirebaseConfig {
                database_url: database_url.clone(),
                auth_token: auth_token.clone(),
            },
            Rc::clone(spawner),
        )),
        #[cfg(not(feature = "firebase"))]
        BackendConfig::Firebase { database_url, .. } => {
            let _ = spawner;
            log::warn!(
                "Built without the firebase feature, ignoring {database_url} and keeping changes on this device"
            );
            Rc::new(LocalBackend)
        }
    }
}

//! Running in a browser tab: `localStorage` for the cache, the page's event loop for background work,
//! and a [`TripPlanner`] handle for the page's JavaScript.

use std::{cell::RefCell, collections::BTreeMap, rc::Rc, sync::LazyLock};

use futures::future::LocalBoxFuture;
use js_sys::Promise;
use serde::Serialize;
use tandem::{Confirmation, ListenerKey, Spawner};
use wasm_bindgen::prelude::*;

use crate::{ActivityCategory, ActivityId, ClockTime, Trip, TripConfig, TripError, UserName};

// putting this inside LOGGER prevents us from accidentally initializing the logger more than once
#[allow(clippy::declare_interior_mutable_const)]
const LOGGER: LazyLock<()> = LazyLock::new(|| {
    #[cfg(feature = "console_error_panic_hook")]
    console_error_panic_hook::set_once();

    wasm_logger::init(wasm_logger::Config::default());
    log::info!("Logging initialized");
});

pub fn spawner() -> Spawner {
    Rc::new(|future: LocalBoxFuture<'static, ()>| {
        wasm_bindgen_futures::spawn_local(future)
    })
}

impl Trip {
    /// Opens the trip from a page. There's no environment to read, so the caller supplies the config.
    pub fn open_in_browser(config: &TripConfig) -> Result<Self, TripError> {
        #[allow(clippy::borrow_interior_mutable_const)]
        *LOGGER;

        Trip::open(config, spawner())
    }
}

fn to_js_error(e: impl std::fmt::Debug) -> JsValue {
    JsValue::from_str(&format!("{e:?}"))
}

fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    serde_wasm_bindgen::to_value(value).map_err(to_js_error)
}

/// Resolves with the outcome's name, e.g. `"Confirmed"` or `"RolledBack"`.
fn outcome_promise(confirmation: Confirmation) -> Promise {
    wasm_bindgen_futures::future_to_promise(async move {
        let outcome = confirmation.await;
        Ok(JsValue::from_str(&format!("{outcome:?}")))
    })
}

#[wasm_bindgen]
pub struct TripPlanner {
    trip: Trip,
    // one entry per JS callback: its listener on each collection
    subscriptions: RefCell<BTreeMap<u32, [ListenerKey; 3]>>,
    next_subscription: RefCell<u32>,
}

#[wasm_bindgen]
impl TripPlanner {
    /// Without a database URL, everything stays in this browser's `localStorage`.
    #[wasm_bindgen(constructor)]
    pub fn new(
        database_url: Option<String>,
        auth_token: Option<String>,
        roster: Option<String>,
    ) -> Result<TripPlanner, JsValue> {
        let config = TripConfig::from_vars(|name| match name {
            "FIREBASE_DATABASE_URL" => database_url.clone(),
            "FIREBASE_AUTH_TOKEN" => auth_token.clone(),
            "TRIP_ROSTER" => roster.clone(),
            _ => None,
        })
        .map_err(to_js_error)?;

        let trip = Trip::open_in_browser(&config).inspect_err(|e| {
            log::error!("Error opening the trip: {e:?}");
        })?;

        Ok(Self {
            trip,
            subscriptions: RefCell::new(BTreeMap::new()),
            next_subscription: RefCell::new(0),
        })
    }

    #[wasm_bindgen(getter)]
    pub fn loading(&self) -> bool {
        self.trip.loading()
    }

    pub fn roster(&self) -> Vec<String> {
        self.trip
            .roster()
            .iter()
            .map(|user| user.as_str().to_string())
            .collect()
    }

    #[wasm_bindgen(getter)]
    pub fn current_user(&self) -> Option<String> {
        self.trip
            .current_user()
            .map(|user| user.as_str().to_string())
    }

    pub fn select_user(&self, name: String) -> Result<(), JsValue> {
        self.trip.select_user(&name)?;
        Ok(())
    }

    pub fn forget_user(&self) {
        self.trip.forget_user();
    }

    /// Calls `callback` whenever any collection changes. Returns an id for [`Self::unsubscribe`].
    pub fn subscribe(&self, callback: js_sys::Function) -> u32 {
        let notify = move || {
            let this = JsValue::null();
            let _ = callback.call0(&this);
        };
        let notify = Rc::new(notify);

        let keys = [
            self.trip.itinerary.subscribe({
                let notify = Rc::clone(&notify);
                move |_| notify()
            }),
            self.trip.completions.subscribe({
                let notify = Rc::clone(&notify);
                move |_| notify()
            }),
            self.trip.packing.subscribe(move |_| notify()),
        ];

        let mut next = self.next_subscription.borrow_mut();
        let id = *next;
        *next += 1;
        self.subscriptions.borrow_mut().insert(id, keys);
        id
    }

    pub fn unsubscribe(&self, id: u32) {
        let Some([itinerary, completions, packing]) = self.subscriptions.borrow_mut().remove(&id)
        else {
            return;
        };
        self.trip.itinerary.unsubscribe(itinerary);
        self.trip.completions.unsubscribe(completions);
        self.trip.packing.unsubscribe(packing);
    }

    pub fn itinerary(&self) -> Result<JsValue, JsValue> {
        to_js(&*self.trip.itinerary.value())
    }

    pub fn completions(&self) -> Result<JsValue, JsValue> {
        to_js(&*self.trip.completions.value())
    }

    pub fn packing_checklist(&self) -> Result<JsValue, JsValue> {
        to_js(&*self.trip.packing.value())
    }

    pub fn progress_percent(&self) -> u8 {
        self.trip.progress().percent
    }

    /// The subscription error that left the itinerary, completions or packing list local-only.
    pub fn sync_error(&self) -> Option<String> {
        self.trip
            .itinerary
            .error()
            .or_else(|| self.trip.completions.error())
            .or_else(|| self.trip.packing.error())
            .map(|e| e.to_string())
    }

    pub fn toggle_activity(&self, id: String) -> Result<Promise, JsValue> {
        let confirmation = self.trip.toggle_activity(&ActivityId::new(id))?;
        Ok(outcome_promise(confirmation))
    }

    pub fn toggle_packing_item(&self, item_id: String, column: String) -> Result<Promise, JsValue> {
        let confirmation = self
            .trip
            .toggle_packing_item(&item_id, &UserName::new(column))?;
        Ok(outcome_promise(confirmation))
    }

    /// `time` is `HH:MM`; an unrecognized `category` becomes a plain activity.
    pub fn add_activity(
        &self,
        day_index: usize,
        title: String,
        time: String,
        category: String,
    ) -> Result<Promise, JsValue> {
        let time: ClockTime = time.parse().map_err(to_js_error)?;
        let category: ActivityCategory =
            serde_json::from_value(serde_json::Value::String(category)).map_err(to_js_error)?;
        let (_, confirmation) = self
            .trip
            .add_activity(day_index, &title, time, category)
            .ok_or_else(|| JsValue::from_str(&format!("there is no day {day_index}")))?;
        Ok(outcome_promise(confirmation))
    }

    pub fn remove_activity(&self, day_index: usize, id: String) -> Promise {
        outcome_promise(
            self.trip
                .itinerary
                .remove_activity(day_index, &ActivityId::new(id)),
        )
    }

    pub fn reorder_activities(&self, day_index: usize, source: usize, destination: usize) -> Promise {
        outcome_promise(
            self.trip
                .itinerary
                .reorder_activities(day_index, source, destination),
        )
    }

    pub fn reset_itinerary(&self) -> Promise {
        outcome_promise(self.trip.reset_itinerary())
    }
}

impl From<TripError> for JsValue {
    fn from(e: TripError) -> Self {
        JsValue::from_str(&e.to_string())
    }
}

//! The itinerary: an ordered list of days, each with an ordered list of activities.
//!
//! Every edit is a pure function from one [`Itinerary`] to the next. An edit that doesn't apply
//! (an unknown day, an unknown activity id, positions that are out of range) returns `None`, which
//! the store treats as "nothing to do". Those requests are usually drag-and-drop events that
//! refer to a version of the itinerary that has since changed.

use chrono::{DateTime, NaiveDate, Utc};
use im::Vector;
use serde::{Deserialize, Serialize};

use crate::clock::ClockTime;

/// Unique across the whole itinerary. New ids are `d{day}-{unix millis}`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityId(String);

impl ActivityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Nothing checks that the result is unused. Two activities created on the same day in the
    /// same millisecond would collide.
    pub fn generate(day_number: u32, now: DateTime<Utc>) -> Self {
        Self(format!("d{day_number}-{}", now.timestamp_millis()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ActivityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActivityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityCategory {
    Travel,
    Food,
    Adventure,
    Nightlife,
    // unrecognized categories display as a plain activity
    #[default]
    #[serde(other)]
    Activity,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub lat: f64,
    pub lng: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: ActivityId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub time: ClockTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<ClockTime>,
    #[serde(rename = "type", default)]
    pub category: ActivityCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub highlight: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dress_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vibe: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bike_time: Option<String>,
}

impl Activity {
    /// An activity with only the required fields set.
    pub fn new(
        id: ActivityId,
        title: impl Into<String>,
        time: ClockTime,
        category: ActivityCategory,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            description: String::new(),
            time,
            end_time: None,
            category,
            location: None,
            highlight: false,
            dress_code: None,
            vibe: None,
            bike_time: None,
        }
    }

    /// `2:30 PM - 4:00 PM`
    pub fn time_range(&self) -> String {
        ClockTime::format_range(self.time, self.end_time)
    }
}

/// Field-by-field edits to an [`Activity`]. `None` leaves a field alone; for optional fields,
/// `Some(None)` clears it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ActivityPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub time: Option<ClockTime>,
    pub end_time: Option<Option<ClockTime>>,
    pub category: Option<ActivityCategory>,
    pub location: Option<Option<Location>>,
    pub highlight: Option<bool>,
    pub dress_code: Option<Option<String>>,
    pub vibe: Option<Option<String>>,
    pub bike_time: Option<Option<String>>,
}

impl ActivityPatch {
    pub fn apply(&self, activity: &mut Activity) {
        let Self {
            title,
            description,
            time,
            end_time,
            category,
            location,
            highlight,
            dress_code,
            vibe,
            bike_time,
        } = self.clone();

        if let Some(title) = title {
            activity.title = title;
        }
        if let Some(description) = description {
            activity.description = description;
        }
        if let Some(time) = time {
            activity.time = time;
        }
        if let Some(end_time) = end_time {
            activity.end_time = end_time;
        }
        if let Some(category) = category {
            activity.category = category;
        }
        if let Some(location) = location {
            activity.location = location;
        }
        if let Some(highlight) = highlight {
            activity.highlight = highlight;
        }
        if let Some(dress_code) = dress_code {
            activity.dress_code = dress_code;
        }
        if let Some(vibe) = vibe {
            activity.vibe = vibe;
        }
        if let Some(bike_time) = bike_time {
            activity.bike_time = bike_time;
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Day {
    /// 1-based.
    pub day: u32,
    pub date: NaiveDate,
    pub title: String,
    pub emoji: String,
    // a day without activities disappears from the realtime store
    #[serde(default)]
    pub activities: Vector<Activity>,
}

/// Stored as a plain list of days.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Itinerary {
    days: Vector<Day>,
}

impl Default for Itinerary {
    fn default() -> Self {
        crate::defaults::key_west_itinerary()
    }
}

impl Itinerary {
    pub fn new(days: impl IntoIterator<Item = Day>) -> Self {
        Self {
            days: days.into_iter().collect(),
        }
    }

    pub fn days(&self) -> &Vector<Day> {
        &self.days
    }

    pub fn day(&self, day_index: usize) -> Option<&Day> {
        self.days.get(day_index)
    }

    pub fn activities(&self) -> impl Iterator<Item = &Activity> {
        self.days.iter().flat_map(|day| day.activities.iter())
    }

    pub fn activity_count(&self) -> usize {
        self.days.iter().map(|day| day.activities.len()).sum()
    }

    /// The day index and the activity.
    pub fn find_activity(&self, id: &ActivityId) -> Option<(usize, &Activity)> {
        self.days.iter().enumerate().find_map(|(day_index, day)| {
            day.activities
                .iter()
                .find(|activity| activity.id == *id)
                .map(|activity| (day_index, activity))
        })
    }

    pub fn update_activity(
        &self,
        day_index: usize,
        id: &ActivityId,
        patch: &ActivityPatch,
    ) -> Option<Self> {
        self.edit_day(day_index, |activities| {
            let position = activities.iter().position(|activity| activity.id == *id)?;
            let activity = activities.get_mut(position)?;
            patch.apply(activity);
            Some(())
        })
    }

    /// Appends to the end of the day. Ids aren't checked for uniqueness here.
    pub fn add_activity(&self, day_index: usize, activity: Activity) -> Option<Self> {
        self.edit_day(day_index, |activities| {
            activities.push_back(activity);
            Some(())
        })
    }

    pub fn remove_activity(&self, day_index: usize, id: &ActivityId) -> Option<Self> {
        self.edit_day(day_index, |activities| {
            let position = activities.iter().position(|activity| activity.id == *id)?;
            activities.remove(position);
            Some(())
        })
    }

    /// Moves the activity at `source` so that it ends up at `destination`. Both positions must
    /// be in range for the day as it is now.
    pub fn reorder_activities(
        &self,
        day_index: usize,
        source: usize,
        destination: usize,
    ) -> Option<Self> {
        self.edit_day(day_index, |activities| {
            let len = activities.len();
            if source >= len || destination >= len {
                return None;
            }
            let activity = activities.remove(source);
            activities.insert(destination, activity);
            Some(())
        })
    }

    fn edit_day(
        &self,
        day_index: usize,
        edit: impl FnOnce(&mut Vector<Activity>) -> Option<()>,
    ) -> Option<Self> {
        let mut days = self.days.clone();
        let day = days.get_mut(day_index)?;
        edit(&mut day.activities)?;
        Some(Self { days })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn t(s: &str) -> ClockTime {
        s.parse().unwrap()
    }

    fn ids(itinerary: &Itinerary, day_index: usize) -> Vec<String> {
        itinerary.days()[day_index]
            .activities
            .iter()
            .map(|activity| activity.id.to_string())
            .collect()
    }

    fn three_activity_day() -> Itinerary {
        let activities = ["a", "b", "c"]
            .into_iter()
            .map(|id| Activity::new(id.into(), id.to_uppercase(), t("09:00"), ActivityCategory::Activity));
        Itinerary::new([Day {
            day: 1,
            date: NaiveDate::from_ymd_opt(2026, 3, 12).unwrap(),
            title: "Arrival".to_string(),
            emoji: "✈️".to_string(),
            activities: activities.collect(),
        }])
    }

    #[test]
    fn reorder_moves_within_the_day() {
        let itinerary = three_activity_day();
        let moved = itinerary.reorder_activities(0, 0, 2).unwrap();
        assert_eq!(ids(&moved, 0), ["b", "c", "a"]);
        let moved = itinerary.reorder_activities(0, 2, 0).unwrap();
        assert_eq!(ids(&moved, 0), ["c", "a", "b"]);
    }

    #[test]
    fn reorder_out_of_range_is_a_no_op() {
        let itinerary = three_activity_day();
        assert_eq!(itinerary.reorder_activities(0, 5, 1), None);
        assert_eq!(itinerary.reorder_activities(0, 1, 3), None);
        assert_eq!(itinerary.reorder_activities(4, 0, 1), None);
        assert_eq!(ids(&itinerary, 0), ["a", "b", "c"]);
    }

    #[test]
    fn add_then_remove_restores_the_day() {
        let itinerary = three_activity_day();
        let id = ActivityId::generate(1, Utc::now());
        let added = itinerary
            .add_activity(0, Activity::new(id.clone(), "Sunset", t("19:30"), ActivityCategory::Adventure))
            .unwrap();
        assert_eq!(ids(&added, 0).last(), Some(&id.to_string()));

        let removed = added.remove_activity(0, &id).unwrap();
        assert_eq!(removed, itinerary);
    }

    #[test]
    fn removing_an_unknown_id_is_a_no_op() {
        let itinerary = three_activity_day();
        assert_eq!(itinerary.remove_activity(0, &"zzz".into()), None);
    }

    #[test]
    fn patches_set_and_clear_fields() {
        let itinerary = three_activity_day();
        let patch = ActivityPatch {
            title: Some("Brunch".to_string()),
            end_time: Some(Some(t("10:30"))),
            dress_code: Some(Some("Beach casual".to_string())),
            ..Default::default()
        };
        let updated = itinerary.update_activity(0, &"b".into(), &patch).unwrap();
        let (_, activity) = updated.find_activity(&"b".into()).unwrap();
        assert_eq!(activity.title, "Brunch");
        assert_eq!(activity.time_range(), "9:00 AM - 10:30 AM");
        assert_eq!(activity.dress_code.as_deref(), Some("Beach casual"));

        let clear = ActivityPatch {
            end_time: Some(None),
            ..Default::default()
        };
        let cleared = updated.update_activity(0, &"b".into(), &clear).unwrap();
        assert_eq!(cleared.find_activity(&"b".into()).unwrap().1.end_time, None);

        assert_eq!(itinerary.update_activity(0, &"nope".into(), &patch), None);
    }

    #[test]
    fn generated_ids_carry_the_day_number() {
        let at = DateTime::from_timestamp_millis(1_718_000_000_000).unwrap();
        assert_eq!(ActivityId::generate(2, at).as_str(), "d2-1718000000000");
    }

    #[test]
    fn wire_format_uses_camel_case_and_type() {
        let json = json!([{
            "day": 1,
            "date": "2026-03-12",
            "title": "Arrival",
            "emoji": "✈️",
            "activities": [{
                "id": "d1-1",
                "title": "Flight",
                "time": "08:00",
                "endTime": "11:15",
                "type": "travel",
                "location": {"name": "EYW", "lat": 24.556, "lng": -81.759},
                "bikeTime": "10 min"
            }, {
                "id": "d1-2",
                "title": "Something new",
                "time": "12:00",
                "type": "karaoke"
            }]
        }, {
            "day": 2,
            "date": "2026-03-13",
            "title": "Empty",
            "emoji": "🌴"
        }]);

        let itinerary: Itinerary = serde_json::from_value(json).unwrap();
        let (_, flight) = itinerary.find_activity(&"d1-1".into()).unwrap();
        assert_eq!(flight.category, ActivityCategory::Travel);
        assert_eq!(flight.end_time, Some(t("11:15")));
        assert_eq!(flight.bike_time.as_deref(), Some("10 min"));
        let (_, other) = itinerary.find_activity(&"d1-2".into()).unwrap();
        assert_eq!(other.category, ActivityCategory::Activity);
        assert!(itinerary.days()[1].activities.is_empty());

        let back = serde_json::to_value(&itinerary).unwrap();
        assert_eq!(back[0]["activities"][0]["endTime"], json!("11:15"));
        assert_eq!(back[0]["activities"][0]["bikeTime"], json!("10 min"));
        assert!(back[0]["activities"][1].get("highlight").is_none());
    }
}

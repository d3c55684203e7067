//! The compiled-in trip, used whenever nothing valid is stored anywhere.

use chrono::NaiveDate;

use crate::{
    clock::ClockTime,
    itinerary::{Activity, ActivityCategory, ActivityId, Day, Itinerary, Location},
};

pub const DEFAULT_ROSTER: [&str; 5] = ["Alex", "Sam", "Jordan", "Taylor", "Casey"];

/// Evaluated at compile time, so a typo in a time fails the build.
macro_rules! at {
    ($hour:literal : $minute:literal) => {
        const { ClockTime::from_hm($hour, $minute) }
    };
}

pub fn key_west_itinerary() -> Itinerary {
    Itinerary::new([
        day(1, (2026, 3, 12), "Arrival & Duval Street", "✈️", vec![
            activity("d1-1", at!(8:00), Some(at!(11:15)), ActivityCategory::Travel, "Flight to Key West")
                .at("Key West International Airport", 24.5561, -81.7596)
                .describing("Carry-on only. Backpacks under the seat."),
            activity("d1-2", at!(12:00), Some(at!(13:00)), ActivityCategory::Travel, "Check in & drop bags")
                .at("The Guest House", 24.5551, -81.8002)
                .bike("5 min"),
            activity("d1-3", at!(13:30), Some(at!(14:30)), ActivityCategory::Food, "Lunch at Blue Heaven")
                .at("Blue Heaven", 24.5526, -81.8006)
                .describing("Roosters wander between the tables.")
                .bike("5 min"),
            activity("d1-4", at!(19:00), Some(at!(20:30)), ActivityCategory::Food, "Dinner at Louie's Backyard")
                .at("Louie's Backyard", 24.5483, -81.7925)
                .dressed("Smart casual")
                .highlighted(),
            activity("d1-5", at!(21:00), None, ActivityCategory::Nightlife, "Duval Crawl")
                .at("Duval Street", 24.5580, -81.8044)
                .vibe("Start at Sloppy Joe's, end wherever."),
        ]),
        day(2, (2026, 3, 13), "Reef Day", "🐠", vec![
            activity("d2-1", at!(8:30), Some(at!(9:15)), ActivityCategory::Food, "Breakfast at Cuban Coffee Queen")
                .at("Cuban Coffee Queen", 24.5610, -81.8077)
                .bike("8 min"),
            activity("d2-2", at!(10:00), Some(at!(14:00)), ActivityCategory::Adventure, "Snorkel trip to the reef")
                .at("Key West Bight", 24.5614, -81.8003)
                .describing("Reef-safe sunscreen only. Boat provides masks and fins.")
                .highlighted(),
            activity("d2-3", at!(15:00), Some(at!(17:00)), ActivityCategory::Activity, "Fort Zachary Taylor beach")
                .at("Fort Zachary Taylor Historic State Park", 24.5465, -81.8106)
                .bike("12 min"),
            activity("d2-4", at!(18:30), Some(at!(19:30)), ActivityCategory::Activity, "Mallory Square sunset")
                .at("Mallory Square", 24.5597, -81.8068)
                .vibe("Street performers, cats on tightropes, applause for the sun."),
        ]),
        day(3, (2026, 3, 14), "Island Time", "🌴", vec![
            activity("d3-1", at!(10:00), Some(at!(11:30)), ActivityCategory::Activity, "Hemingway Home")
                .at("Ernest Hemingway Home and Museum", 24.5512, -81.8006)
                .describing("Count the six-toed cats."),
            activity("d3-2", at!(12:00), Some(at!(12:30)), ActivityCategory::Activity, "Southernmost Point photo")
                .at("Southernmost Point Buoy", 24.5465, -81.7975)
                .describing("90 miles to Cuba. The line moves fast."),
            activity("d3-3", at!(16:00), Some(at!(18:30)), ActivityCategory::Adventure, "Sunset sail")
                .at("Schooner Wharf", 24.5617, -81.8010)
                .dressed("Bring a layer")
                .highlighted(),
            activity("d3-4", at!(20:00), Some(at!(21:30)), ActivityCategory::Food, "Dinner at Latitudes")
                .at("Sunset Key", 24.5625, -81.8160)
                .dressed("Resort casual, no flip-flops")
                .describing("Ferry leaves from the Westin pier."),
        ]),
        day(4, (2026, 3, 15), "Departure", "🧳", vec![
            activity("d4-1", at!(9:00), Some(at!(10:00)), ActivityCategory::Food, "Last key lime pie")
                .at("Kermit's Key West Key Lime Shoppe", 24.5600, -81.8037),
            activity("d4-2", at!(12:30), Some(at!(16:00)), ActivityCategory::Travel, "Flight home")
                .at("Key West International Airport", 24.5561, -81.7596),
        ]),
    ])
}

fn day(
    number: u32,
    (year, month, date): (i32, u32, u32),
    title: &str,
    emoji: &str,
    activities: Vec<Activity>,
) -> Day {
    Day {
        day: number,
        date: NaiveDate::from_ymd_opt(year, month, date).unwrap_or_default(),
        title: title.to_string(),
        emoji: emoji.to_string(),
        activities: activities.into_iter().collect(),
    }
}

fn activity(
    id: &str,
    time: ClockTime,
    end_time: Option<ClockTime>,
    category: ActivityCategory,
    title: &str,
) -> Activity {
    let mut activity = Activity::new(ActivityId::new(id), title, time, category);
    activity.end_time = end_time;
    activity
}

trait ActivityExt {
    fn at(self, name: &str, lat: f64, lng: f64) -> Self;
    fn describing(self, description: &str) -> Self;
    fn dressed(self, dress_code: &str) -> Self;
    fn vibe(self, vibe: &str) -> Self;
    fn bike(self, bike_time: &str) -> Self;
    fn highlighted(self) -> Self;
}

impl ActivityExt for Activity {
    fn at(mut self, name: &str, lat: f64, lng: f64) -> Self {
        self.location = Some(Location {
            name: name.to_string(),
            lat,
            lng,
        });
        self
    }

    fn describing(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    fn dressed(mut self, dress_code: &str) -> Self {
        self.dress_code = Some(dress_code.to_string());
        self
    }

    fn vibe(mut self, vibe: &str) -> Self {
        self.vibe = Some(vibe.to_string());
        self
    }

    fn bike(mut self, bike_time: &str) -> Self {
        self.bike_time = Some(bike_time.to_string());
        self
    }

    fn highlighted(mut self) -> Self {
        self.highlight = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn default_itinerary_ids_are_unique_and_prefixed_by_day() {
        let itinerary = key_west_itinerary();
        let ids: BTreeSet<_> = itinerary.activities().map(|a| a.id.clone()).collect();
        assert_eq!(ids.len(), itinerary.activity_count());

        for day in itinerary.days() {
            for activity in &day.activities {
                assert!(activity.id.as_str().starts_with(&format!("d{}-", day.day)));
            }
        }
    }

    #[test]
    fn default_roster_is_valid() {
        let validated = crate::users::Roster::new(DEFAULT_ROSTER).unwrap();
        assert_eq!(validated, crate::users::Roster::default());
    }
}

use chrono::{DateTime, Utc};
use im::OrdMap;
use serde::{Deserialize, Serialize};

use crate::{
    itinerary::{ActivityId, Itinerary},
    users::UserName,
};

/// Whether an activity has been done, and if so by whom and when.
///
/// Only a completed activity has a `completed_by` and `completed_at`. Incoming records that say
/// otherwise are normalized when they are read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CompletionRecord", into = "CompletionRecord")]
pub struct ActivityCompletion {
    done: Option<(UserName, DateTime<Utc>)>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompletionRecord {
    completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    completed_by: Option<UserName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,
}

impl From<CompletionRecord> for ActivityCompletion {
    fn from(record: CompletionRecord) -> Self {
        let done = match record {
            CompletionRecord {
                completed: true,
                completed_by: Some(by),
                completed_at: Some(at),
            } => Some((by, at)),
            CompletionRecord { completed: true, .. } => {
                log::warn!("Treating completion record without an actor or timestamp as not completed");
                None
            }
            CompletionRecord { completed: false, .. } => None,
        };
        Self { done }
    }
}

impl From<ActivityCompletion> for CompletionRecord {
    fn from(completion: ActivityCompletion) -> Self {
        match completion.done {
            Some((by, at)) => Self {
                completed: true,
                completed_by: Some(by),
                completed_at: Some(at),
            },
            None => Self {
                completed: false,
                completed_by: None,
                completed_at: None,
            },
        }
    }
}

impl ActivityCompletion {
    pub fn completed(by: UserName, at: DateTime<Utc>) -> Self {
        Self {
            done: Some((by, at)),
        }
    }

    pub fn not_completed() -> Self {
        Self { done: None }
    }

    pub fn is_completed(&self) -> bool {
        self.done.is_some()
    }

    pub fn completed_by(&self) -> Option<&UserName> {
        self.done.as_ref().map(|(by, _)| by)
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.done.as_ref().map(|(_, at)| *at)
    }
}

/// Completion state of every activity that has ever been toggled, keyed by activity id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompletionLedger {
    entries: OrdMap<ActivityId, ActivityCompletion>,
}

impl CompletionLedger {
    pub fn get(&self, id: &ActivityId) -> Option<&ActivityCompletion> {
        self.entries.get(id)
    }

    pub fn is_completed(&self, id: &ActivityId) -> bool {
        self.get(id).is_some_and(ActivityCompletion::is_completed)
    }

    pub fn completed_count(&self) -> usize {
        self.entries
            .values()
            .filter(|completion| completion.is_completed())
            .count()
    }

    /// Flips the activity. Completing records `user` and `now`; un-completing clears both.
    pub fn toggle(&self, id: &ActivityId, user: &UserName, now: DateTime<Utc>) -> Self {
        let next = if self.is_completed(id) {
            ActivityCompletion::not_completed()
        } else {
            ActivityCompletion::completed(user.clone(), now)
        };
        Self {
            entries: self.entries.update(id.clone(), next),
        }
    }

    /// Only counts activities that are still in `itinerary`.
    pub fn progress(&self, itinerary: &Itinerary) -> TripProgress {
        let total = itinerary.activity_count();
        let completed = itinerary
            .activities()
            .filter(|activity| self.is_completed(&activity.id))
            .count();
        TripProgress::new(completed, total)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TripProgress {
    pub completed: usize,
    pub total: usize,
    /// Rounded to the nearest whole percent. 0 when there is nothing to do.
    pub percent: u8,
}

impl TripProgress {
    pub fn new(completed: usize, total: usize) -> Self {
        let percent = if total == 0 {
            0
        } else {
            ((completed * 100 + total / 2) / total).min(100) as u8
        };
        Self {
            completed,
            total,
            percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn alex() -> UserName {
        UserName::new("Alex")
    }

    #[test]
    fn toggle_twice_clears_actor_and_timestamp() {
        let id = ActivityId::new("d1-100");
        let ledger = CompletionLedger::default();

        let done = ledger.toggle(&id, &alex(), Utc::now());
        let completion = done.get(&id).unwrap();
        assert!(completion.is_completed());
        assert_eq!(completion.completed_by(), Some(&alex()));

        let undone = done.toggle(&id, &alex(), Utc::now());
        assert_eq!(undone.get(&id), Some(&ActivityCompletion::not_completed()));
        assert_eq!(
            serde_json::to_value(&undone).unwrap(),
            json!({"d1-100": {"completed": false}})
        );
    }

    #[test]
    fn toggle_is_a_pure_flip_regardless_of_user() {
        let id = ActivityId::new("d2-5");
        let done = CompletionLedger::default().toggle(&id, &alex(), Utc::now());
        // someone else un-completes it
        let undone = done.toggle(&id, &UserName::new("Sam"), Utc::now());
        assert!(!undone.is_completed(&id));
    }

    #[test]
    fn inconsistent_records_are_normalized() {
        let ledger: CompletionLedger = serde_json::from_value(json!({
            "a": {"completed": false, "completedBy": "Alex", "completedAt": "2026-03-12T10:00:00Z"},
            "b": {"completed": true},
            "c": {"completed": true, "completedBy": "Sam", "completedAt": "2026-03-12T10:00:00Z"},
        }))
        .unwrap();

        assert_eq!(ledger.get(&"a".into()), Some(&ActivityCompletion::not_completed()));
        assert!(!ledger.is_completed(&"b".into()));
        assert_eq!(
            ledger.get(&"c".into()).and_then(ActivityCompletion::completed_by),
            Some(&UserName::new("Sam"))
        );
        assert_eq!(ledger.completed_count(), 1);
    }

    #[test]
    fn progress_rounds_and_handles_empty() {
        assert_eq!(TripProgress::new(1, 3).percent, 33);
        assert_eq!(TripProgress::new(2, 3).percent, 67);
        assert_eq!(TripProgress::new(0, 0).percent, 0);
        assert_eq!(TripProgress::new(4, 4).percent, 100);
    }

    #[test]
    fn progress_ignores_activities_no_longer_in_the_itinerary() {
        let itinerary = Itinerary::default();
        let first = itinerary.activities().next().unwrap().id.clone();

        let ledger = CompletionLedger::default()
            .toggle(&first, &alex(), Utc::now())
            .toggle(&"d9-deleted".into(), &alex(), Utc::now());

        let progress = ledger.progress(&itinerary);
        assert_eq!(progress.completed, 1);
        assert_eq!(progress.total, itinerary.activity_count());
    }
}

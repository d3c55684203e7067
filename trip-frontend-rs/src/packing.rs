//! The packing list: a fixed catalog of things to bring, and a shared ledger of who has packed what.
//!
//! Everyone ticks off their own column. Sam packing sunscreen says nothing about whether Alex has.

use chrono::{DateTime, Utc};
use im::OrdMap;
use serde::{Deserialize, Serialize};

use crate::users::{Roster, UserName};

#[derive(Debug, PartialEq, Eq)]
pub struct PackingCategory {
    pub id: &'static str,
    pub name: &'static str,
    pub emoji: &'static str,
    pub items: &'static [PackingItem],
}

#[derive(Debug, PartialEq, Eq)]
pub struct PackingItem {
    pub id: &'static str,
    pub name: &'static str,
    pub quantity: u32,
}

const fn item(id: &'static str, name: &'static str, quantity: u32) -> PackingItem {
    PackingItem { id, name, quantity }
}

pub static CATALOG: &[PackingCategory] = &[
    PackingCategory {
        id: "backpack",
        name: "In Your 20L Backpack (personal item)",
        emoji: "🎒",
        items: &[
            item("switch", "Nintendo Switch + charger", 1),
            item("phone-charger", "Phone charger", 1),
            item("power-bank", "Portable power bank", 1),
            item("sunglasses", "Sunglasses", 1),
            item("sunscreen-travel", "Sunscreen travel-size", 1),
            item("medications", "Medications (5 days worth)", 1),
            item("wallet", "Wallet with ID, credit cards, $100-150 cash", 1),
            item("headphones", "Headphones", 1),
            item("water-bottle", "Reusable water bottle (empty for TSA)", 1),
            item("phone-case", "Waterproof phone case", 1),
            item("toiletry-bag", "Small toiletry bag with essentials", 1),
            item("change-clothes", "1 change of clothes (backup)", 1),
        ],
    },
    PackingCategory {
        id: "shoes",
        name: "Shoes (wear one, pack two)",
        emoji: "👟",
        items: &[
            item("sneakers", "Sneakers (wear on plane)", 1),
            item("birkenstocks", "Birkenstocks", 1),
            item("dress-shoes", "Dress shoes", 1),
        ],
    },
    PackingCategory {
        id: "clothing",
        name: "Clothing",
        emoji: "👕",
        items: &[
            item("tshirts", "T-shirts/casual shirts", 3),
            item("tank-tops", "Tank tops", 2),
            item("shorts", "Regular shorts", 2),
            item("swim-trunks", "Swim trunks", 2),
            item("nice-pants", "Nice pants/chinos for dinner", 1),
            item("nice-shirt", "Nice button-up or polo shirt", 1),
            item("long-sleeve", "Lightweight long sleeve shirt", 1),
            item("underwear", "Underwear", 4),
            item("socks", "Socks (if needed for sneakers)", 4),
            item("sleepwear", "Sleepwear (or sleep in shorts)", 3),
            item("hat", "Hat", 1),
        ],
    },
    PackingCategory {
        id: "beach",
        name: "Beach & Water",
        emoji: "🏖️",
        items: &[
            item("towel", "Quick-dry microfiber towel", 1),
            item("snorkel", "Snorkel mask (if compact)", 1),
        ],
    },
    PackingCategory {
        id: "toiletries",
        name: "Toiletries (travel-size, 3.4oz or less)",
        emoji: "🧴",
        items: &[
            item("toothbrush", "Toothbrush + toothpaste", 1),
            item("deodorant", "Deodorant", 1),
            item("shampoo", "Shampoo/body wash", 1),
            item("razor", "Razor", 1),
            item("sunscreen-large", "Sunscreen (larger bottle)", 1),
            item("aloe", "Aloe vera travel-size", 1),
            item("insect-repellent", "Insect repellent travel-size", 1),
        ],
    },
];

pub fn all_items() -> impl Iterator<Item = &'static PackingItem> {
    CATALOG.iter().flat_map(|category| category.items.iter())
}

pub fn total_item_count() -> usize {
    CATALOG.iter().map(|category| category.items.len()).sum()
}

pub fn find_item(item_id: &str) -> Option<&'static PackingItem> {
    all_items().find(|item| item.id == item_id)
}

pub fn find_category(category_id: &str) -> Option<&'static PackingCategory> {
    CATALOG.iter().find(|category| category.id == category_id)
}

/// One person's tick next to one item. Only a checked mark has a `checked_at`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "CheckRecord", into = "CheckRecord")]
pub struct CheckMark {
    checked: bool,
    checked_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckRecord {
    checked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checked_at: Option<DateTime<Utc>>,
}

impl From<CheckRecord> for CheckMark {
    fn from(record: CheckRecord) -> Self {
        Self {
            checked: record.checked,
            checked_at: record.checked_at.filter(|_| record.checked),
        }
    }
}

impl From<CheckMark> for CheckRecord {
    fn from(mark: CheckMark) -> Self {
        Self {
            checked: mark.checked,
            checked_at: mark.checked_at,
        }
    }
}

impl CheckMark {
    pub fn checked(at: DateTime<Utc>) -> Self {
        Self {
            checked: true,
            checked_at: Some(at),
        }
    }

    pub fn unchecked() -> Self {
        Self {
            checked: false,
            checked_at: None,
        }
    }

    pub fn is_checked(&self) -> bool {
        self.checked
    }

    pub fn checked_at(&self) -> Option<DateTime<Utc>> {
        self.checked_at
    }
}

/// Item id → person → their check mark.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackingChecklist {
    items: OrdMap<String, OrdMap<UserName, CheckMark>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PackingProgress {
    pub packed: usize,
    pub total: usize,
}

impl PackingChecklist {
    pub fn mark(&self, item_id: &str, user: &UserName) -> Option<&CheckMark> {
        self.items.get(item_id)?.get(user)
    }

    pub fn is_checked_by(&self, item_id: &str, user: &UserName) -> bool {
        self.mark(item_id, user).is_some_and(CheckMark::is_checked)
    }

    /// Flips `user`'s mark on the item. Nobody else's marks are touched.
    pub fn toggle(&self, item_id: &str, user: &UserName, now: DateTime<Utc>) -> Self {
        let next = if self.is_checked_by(item_id, user) {
            CheckMark::unchecked()
        } else {
            CheckMark::checked(now)
        };
        let marks = self
            .items
            .get(item_id)
            .cloned()
            .unwrap_or_default()
            .update(user.clone(), next);
        Self {
            items: self.items.update(item_id.to_string(), marks),
        }
    }

    /// Everyone who has packed the item, in roster order.
    pub fn users_who_packed<'a>(&self, item_id: &str, roster: &'a Roster) -> Vec<&'a UserName> {
        roster
            .iter()
            .filter(|user| self.is_checked_by(item_id, user))
            .collect()
    }

    /// How much of the whole catalog `user` has packed.
    pub fn user_progress(&self, user: &UserName) -> PackingProgress {
        Self::progress_over(self, all_items(), user)
    }

    pub fn category_progress(&self, category: &PackingCategory, user: &UserName) -> PackingProgress {
        Self::progress_over(self, category.items.iter(), user)
    }

    fn progress_over<'a>(
        &self,
        items: impl Iterator<Item = &'a PackingItem>,
        user: &UserName,
    ) -> PackingProgress {
        let (packed, total) = items.fold((0, 0), |(packed, total), item| {
            let packed = packed + usize::from(self.is_checked_by(item.id, user));
            (packed, total + 1)
        });
        PackingProgress { packed, total }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn alex() -> UserName {
        UserName::new("Alex")
    }

    fn sam() -> UserName {
        UserName::new("Sam")
    }

    #[test]
    fn catalog_ids_are_unique() {
        let mut ids: Vec<_> = all_items().map(|item| item.id).collect();
        let count = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), count);
        assert_eq!(total_item_count(), 35);
        assert_eq!(find_item("tshirts").map(|item| item.quantity), Some(3));
        assert!(find_category("beach").is_some());
    }

    #[test]
    fn columns_are_independent() {
        let checklist = PackingChecklist::default()
            .toggle("sunglasses", &alex(), Utc::now())
            .toggle("sunglasses", &sam(), Utc::now())
            .toggle("sunglasses", &alex(), Utc::now());

        assert!(!checklist.is_checked_by("sunglasses", &alex()));
        assert!(checklist.is_checked_by("sunglasses", &sam()));
        assert_eq!(checklist.mark("sunglasses", &alex()), Some(&CheckMark::unchecked()));
    }

    #[test]
    fn queries_follow_roster_order() {
        let roster = Roster::parse("Alex, Sam, Jordan").unwrap();
        let checklist = PackingChecklist::default()
            .toggle("towel", &UserName::new("Jordan"), Utc::now())
            .toggle("towel", &alex(), Utc::now())
            .toggle("snorkel", &alex(), Utc::now());

        let packed: Vec<_> = checklist
            .users_who_packed("towel", &roster)
            .into_iter()
            .map(UserName::as_str)
            .collect();
        assert_eq!(packed, ["Alex", "Jordan"]);

        assert_eq!(
            checklist.user_progress(&alex()),
            PackingProgress {
                packed: 2,
                total: total_item_count()
            }
        );
        let beach = find_category("beach").unwrap();
        assert_eq!(
            checklist.category_progress(beach, &alex()),
            PackingProgress { packed: 2, total: 2 }
        );
        assert_eq!(checklist.category_progress(beach, &sam()).packed, 0);
    }

    #[test]
    fn wire_format_matches_nested_ledger() {
        let checklist: PackingChecklist = serde_json::from_value(json!({
            "hat": {
                "Alex": {"checked": true, "checkedAt": "2026-03-10T18:00:00Z"},
                "Sam": {"checked": false, "checkedAt": "2026-03-10T18:00:00Z"}
            }
        }))
        .unwrap();

        assert!(checklist.is_checked_by("hat", &alex()));
        assert_eq!(checklist.mark("hat", &sam()), Some(&CheckMark::unchecked()));
        assert_eq!(
            serde_json::to_value(&checklist).unwrap()["hat"]["Sam"],
            json!({"checked": false})
        );
    }
}

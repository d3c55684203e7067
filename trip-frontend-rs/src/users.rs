//! Who's on the trip, and who is using this device.
//!
//! There is no authentication. A person "logs in" by picking their name from the roster, and the
//! choice is remembered on this device only.

use std::{cell::RefCell, rc::Rc};

use serde::{Deserialize, Serialize};
use tandem::LocalCache;

use crate::{TripError, config::ConfigError, defaults::DEFAULT_ROSTER};

const CURRENT_USER_KEY: &str = "keywest-user";

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserName(String);

impl UserName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The closed set of people on the trip, in display order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Roster {
    names: Vec<UserName>,
}

impl Roster {
    /// Names become keys in the remote store, so they can't contain `. $ # [ ] /`.
    pub fn new<S: AsRef<str>>(names: impl IntoIterator<Item = S>) -> Result<Self, ConfigError> {
        let mut roster = Vec::new();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                return Err(ConfigError::EmptyRosterName);
            }
            if name.contains(['.', '$', '#', '[', ']', '/']) {
                return Err(ConfigError::InvalidRosterName(name.to_string()));
            }
            let name = UserName::new(name);
            if roster.contains(&name) {
                return Err(ConfigError::DuplicateRosterName(name.to_string()));
            }
            roster.push(name);
        }

        if roster.is_empty() {
            return Err(ConfigError::EmptyRoster);
        }
        Ok(Self { names: roster })
    }

    /// Parses a comma-separated list, e.g. `Alex, Sam, Jordan`.
    pub fn parse(list: &str) -> Result<Self, ConfigError> {
        Self::new(list.split(','))
    }

    pub fn get(&self, name: &str) -> Option<&UserName> {
        self.names.iter().find(|user| user.as_str() == name)
    }

    pub fn contains(&self, name: &UserName) -> bool {
        self.names.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UserName> {
        self.names.iter()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for Roster {
    fn default() -> Self {
        Self {
            names: DEFAULT_ROSTER.into_iter().map(UserName::new).collect(),
        }
    }
}

/// The roster member using this device, if one has been picked.
pub struct CurrentUser {
    cache: Rc<dyn LocalCache>,
    roster: Roster,
    selected: RefCell<Option<UserName>>,
}

impl CurrentUser {
    /// Restores the last selection, unless that person is no longer on the roster.
    pub fn restore(cache: Rc<dyn LocalCache>, roster: Roster) -> Self {
        let selected = cache
            .get(CURRENT_USER_KEY)
            .and_then(|saved| match roster.get(&saved) {
                Some(user) => Some(user.clone()),
                None => {
                    log::info!("Forgetting saved user {saved:?}, who is not on the roster");
                    None
                }
            });

        Self {
            cache,
            roster,
            selected: RefCell::new(selected),
        }
    }

    pub fn get(&self) -> Option<UserName> {
        self.selected.borrow().clone()
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn select(&self, name: &str) -> Result<UserName, TripError> {
        let user = self
            .roster
            .get(name)
            .cloned()
            .ok_or_else(|| TripError::UnknownUser(name.to_string()))?;

        // the selection still holds for this session if it can't be saved
        if let Err(e) = self.cache.set(CURRENT_USER_KEY, user.as_str()) {
            log::error!("Failed to remember the selected user: {e}");
        }
        *self.selected.borrow_mut() = Some(user.clone());
        Ok(user)
    }

    pub fn clear(&self) {
        if let Err(e) = self.cache.remove(CURRENT_USER_KEY) {
            log::error!("Failed to forget the selected user: {e}");
        }
        self.selected.borrow_mut().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem::MemoryCache;

    #[test]
    fn roster_rejects_bad_names() {
        assert!(Roster::parse("Alex, Sam").is_ok());
        assert_eq!(Roster::parse("Alex,,Sam"), Err(ConfigError::EmptyRosterName));
        assert_eq!(
            Roster::parse("Alex,Al.ex"),
            Err(ConfigError::InvalidRosterName("Al.ex".to_string()))
        );
        assert_eq!(
            Roster::parse("Alex, Alex"),
            Err(ConfigError::DuplicateRosterName("Alex".to_string()))
        );
        assert_eq!(Roster::new(Vec::<String>::new()), Err(ConfigError::EmptyRoster));
    }

    #[test]
    fn selection_survives_a_restart() {
        let cache: Rc<dyn LocalCache> = Rc::new(MemoryCache::new());
        let roster = Roster::parse("Alex, Sam").unwrap();

        let current = CurrentUser::restore(Rc::clone(&cache), roster.clone());
        assert_eq!(current.get(), None);
        assert!(matches!(current.select("Jordan"), Err(TripError::UnknownUser(_))));
        assert_eq!(current.select("Sam").unwrap(), UserName::new("Sam"));

        let restored = CurrentUser::restore(Rc::clone(&cache), roster);
        assert_eq!(restored.get(), Some(UserName::new("Sam")));

        // Sam left the trip
        let restored = CurrentUser::restore(cache, Roster::parse("Alex").unwrap());
        assert_eq!(restored.get(), None);
    }
}

use std::path::PathBuf;

use crate::users::Roster;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("the roster is empty")]
    EmptyRoster,
    #[error("the roster contains an empty name")]
    EmptyRosterName,
    #[error("roster name {0:?} contains one of . $ # [ ] /")]
    InvalidRosterName(String),
    #[error("{0:?} appears in the roster more than once")]
    DuplicateRosterName(String),
    #[error("FIREBASE_DATABASE_URL must be an http(s) URL, got {0:?}")]
    InvalidDatabaseUrl(String),
}

/// Which remote store, if any, holds the shared copy of the trip. Decided once, at startup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BackendConfig {
    #[default]
    LocalOnly,
    Firebase {
        database_url: String,
        auth_token: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TripConfig {
    pub backend: BackendConfig,
    /// Where to keep the local cache. `None` keeps it in memory (or in `localStorage` in a browser).
    pub cache_path: Option<PathBuf>,
    pub roster: Roster,
}

impl TripConfig {
    /// Reads the process environment, after loading `.env` if there is one.
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => log::info!("Loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => log::warn!("Ignoring unreadable .env file: {e}"),
        }
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Builds a config from any variable source. Empty values count as unset.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| var(name).filter(|value| !value.trim().is_empty());

        let backend = match var("FIREBASE_DATABASE_URL") {
            Some(url) => {
                let url = url.trim().to_string();
                let valid = reqwest::Url::parse(&url).is_ok_and(|parsed| {
                    matches!(parsed.scheme(), "https" | "http") && parsed.host_str().is_some()
                });
                if !valid {
                    return Err(ConfigError::InvalidDatabaseUrl(url));
                }
                BackendConfig::Firebase {
                    database_url: url,
                    auth_token: var("FIREBASE_AUTH_TOKEN"),
                }
            }
            None => BackendConfig::LocalOnly,
        };

        let roster = match var("TRIP_ROSTER") {
            Some(list) => Roster::parse(&list)?,
            None => Roster::default(),
        };

        Ok(Self {
            backend,
            cache_path: var("TRIP_CACHE_PATH").map(PathBuf::from),
            roster,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<TripConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        TripConfig::from_vars(|name| vars.get(name).cloned())
    }

    #[test]
    fn nothing_set_means_local_only() {
        let config = config(&[]).unwrap();
        assert_eq!(config, TripConfig::default());
        assert_eq!(config.backend, BackendConfig::LocalOnly);
    }

    #[test]
    fn database_url_selects_firebase() {
        let config = config(&[
            ("FIREBASE_DATABASE_URL", "https://trip-default-rtdb.firebaseio.com"),
            ("FIREBASE_AUTH_TOKEN", "token"),
            ("TRIP_CACHE_PATH", "/tmp/trip.json"),
            ("TRIP_ROSTER", "Alex,Sam"),
        ])
        .unwrap();

        assert_eq!(
            config.backend,
            BackendConfig::Firebase {
                database_url: "https://trip-default-rtdb.firebaseio.com".to_string(),
                auth_token: Some("token".to_string()),
            }
        );
        assert_eq!(config.cache_path, Some(PathBuf::from("/tmp/trip.json")));
        assert_eq!(config.roster.len(), 2);
    }

    #[test]
    fn blank_values_are_unset_and_bad_values_are_errors() {
        assert_eq!(
            config(&[("FIREBASE_DATABASE_URL", "  ")]).unwrap().backend,
            BackendConfig::LocalOnly
        );
        assert!(matches!(
            config(&[("FIREBASE_DATABASE_URL", "trip.firebaseio.com")]),
            Err(ConfigError::InvalidDatabaseUrl(_))
        ));
        assert_eq!(
            config(&[("TRIP_ROSTER", "Alex,Alex")]),
            Err(ConfigError::DuplicateRosterName("Alex".to_string()))
        );
    }

    #[test]
    fn database_url_must_parse_with_a_host() {
        for url in [
            "https://",
            "https://trip default.firebaseio.com",
            "https://[trip.firebaseio.com",
            "ftp://trip.firebaseio.com",
            "https//trip.firebaseio.com",
        ] {
            assert_eq!(
                config(&[("FIREBASE_DATABASE_URL", url)]),
                Err(ConfigError::InvalidDatabaseUrl(url.to_string())),
                "{url}"
            );
        }

        assert_eq!(
            config(&[("FIREBASE_DATABASE_URL", " http://localhost:9000 ")])
                .unwrap()
                .backend,
            BackendConfig::Firebase {
                database_url: "http://localhost:9000".to_string(),
                auth_token: None,
            }
        );
    }
}

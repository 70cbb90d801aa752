//! Datastore configuration.

use tracing::warn;

/// Hard cap applied to every dynamic order search.
pub const DEFAULT_MAX_SEARCH_RESULTS: usize = 1000;

/// Maximum number of keys sent in one batched in-list lookup.
pub const DEFAULT_BATCH_FETCH_SIZE: usize = 100;

/// Tunables for the order datastore and its fetch strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreConfig {
    /// Upper bound on rows returned by a search, paginated or not.
    pub max_search_results: usize,
    /// Chunk size for batched child/item lookups.
    pub batch_fetch_size: usize,
    /// Reject commits that would leave two members with the same name.
    pub unique_member_names: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_search_results: DEFAULT_MAX_SEARCH_RESULTS,
            batch_fetch_size: DEFAULT_BATCH_FETCH_SIZE,
            unique_member_names: false,
        }
    }
}

impl StoreConfig {
    /// Read overrides from the environment.
    ///
    /// - `ORDERDESK_MAX_RESULTS`
    /// - `ORDERDESK_BATCH_SIZE`
    /// - `ORDERDESK_UNIQUE_MEMBER_NAMES` (`true`/`false`, `1`/`0`)
    ///
    /// Unparseable or zero values fall back to the default with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`StoreConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            max_search_results: positive(
                "ORDERDESK_MAX_RESULTS",
                lookup("ORDERDESK_MAX_RESULTS"),
                defaults.max_search_results,
            ),
            batch_fetch_size: positive(
                "ORDERDESK_BATCH_SIZE",
                lookup("ORDERDESK_BATCH_SIZE"),
                defaults.batch_fetch_size,
            ),
            unique_member_names: flag(
                "ORDERDESK_UNIQUE_MEMBER_NAMES",
                lookup("ORDERDESK_UNIQUE_MEMBER_NAMES"),
                defaults.unique_member_names,
            ),
        }
    }

    pub fn with_max_search_results(mut self, max: usize) -> Self {
        self.max_search_results = max.max(1);
        self
    }

    pub fn with_batch_fetch_size(mut self, size: usize) -> Self {
        self.batch_fetch_size = size.max(1);
        self
    }

    pub fn with_unique_member_names(mut self, unique: bool) -> Self {
        self.unique_member_names = unique;
        self
    }
}

fn positive(key: &str, raw: Option<String>, default: usize) -> usize {
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => value,
        _ => {
            warn!(key, value = %raw, default, "ignoring invalid configuration value");
            default
        }
    }
}

fn flag(key: &str, raw: Option<String>, default: bool) -> bool {
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => true,
        "0" | "false" | "no" => false,
        _ => {
            warn!(key, value = %raw, default, "ignoring invalid configuration value");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_overrides() {
        let config = StoreConfig::from_lookup(lookup(&[]));
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.max_search_results, 1000);
        assert_eq!(config.batch_fetch_size, 100);
        assert!(!config.unique_member_names);
    }

    #[test]
    fn reads_overrides() {
        let config = StoreConfig::from_lookup(lookup(&[
            ("ORDERDESK_MAX_RESULTS", "50"),
            ("ORDERDESK_BATCH_SIZE", " 10 "),
            ("ORDERDESK_UNIQUE_MEMBER_NAMES", "TRUE"),
        ]));
        assert_eq!(config.max_search_results, 50);
        assert_eq!(config.batch_fetch_size, 10);
        assert!(config.unique_member_names);
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = StoreConfig::from_lookup(lookup(&[
            ("ORDERDESK_MAX_RESULTS", "lots"),
            ("ORDERDESK_BATCH_SIZE", "0"),
            ("ORDERDESK_UNIQUE_MEMBER_NAMES", "maybe"),
        ]));
        assert_eq!(config, StoreConfig::default());
    }
}

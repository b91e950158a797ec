//! Job configuration.
//!
//! Defaults reproduce the production warehouse setup; every field can be
//! overridden from JSON and a handful from `BINSYNC_*` environment variables.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use binsync_core::{ItemId, LocationId, ProgramId};
use binsync_inventory::EligibilityFilter;

use crate::jobs::RetryPolicy;

/// Largest page the item query will be asked for.
pub const MAX_PAGE_SIZE: usize = 1000;

/// Upper bound on reduce worker threads.
pub const MAX_WORKERS: usize = 64;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which items may become candidates, beyond the fixed structural clauses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EligibilitySettings {
    /// Bin labels starting with any of these are never reconciled.
    pub excluded_bin_prefixes: Vec<String>,
    /// Item names starting with any of these are never reconciled.
    pub excluded_item_prefixes: Vec<String>,
    /// Programs whose items are never reconciled.
    pub excluded_programs: Vec<ProgramId>,
    /// Restrict the batch to these items; `None` means no restriction.
    pub item_allowlist: Option<Vec<ItemId>>,
}

impl Default for EligibilitySettings {
    fn default() -> Self {
        Self {
            excluded_bin_prefixes: vec!["Retail".into(), "MF".into(), "Mezz".into()],
            excluded_item_prefixes: vec!["PRT".into()],
            excluded_programs: [102, 11, 103, 89].into_iter().map(ProgramId::new).collect(),
            item_allowlist: None,
        }
    }
}

/// Configuration for one reconciliation job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Warehouse whose bins are reconciled; written onto every rule.
    pub location_id: LocationId,
    pub eligibility: EligibilitySettings,
    /// Rows requested per item-query page.
    pub page_size: usize,
    /// Reduce worker threads in the local harness.
    pub workers: usize,
    pub retry: RetryPolicy,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            location_id: LocationId::new(7),
            eligibility: EligibilitySettings::default(),
            page_size: MAX_PAGE_SIZE,
            workers: 4,
            retry: RetryPolicy::default(),
        }
    }
}

impl ReconcileConfig {
    /// Parse and validate a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `BINSYNC_*` overrides read through `lookup`, then validate.
    ///
    /// - `BINSYNC_LOCATION_ID`
    /// - `BINSYNC_PAGE_SIZE`
    /// - `BINSYNC_WORKERS`
    /// - `BINSYNC_MAX_RETRIES`
    /// - `BINSYNC_ITEM_ALLOWLIST` (comma separated; empty or `*` clears it)
    /// - `BINSYNC_EXCLUDED_PROGRAMS` (comma separated)
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("BINSYNC_LOCATION_ID") {
            self.location_id = parse_value("BINSYNC_LOCATION_ID", &v)?;
        }
        if let Some(v) = lookup("BINSYNC_PAGE_SIZE") {
            self.page_size = parse_value("BINSYNC_PAGE_SIZE", &v)?;
        }
        if let Some(v) = lookup("BINSYNC_WORKERS") {
            self.workers = parse_value("BINSYNC_WORKERS", &v)?;
        }
        if let Some(v) = lookup("BINSYNC_MAX_RETRIES") {
            self.retry.max_retries = parse_value("BINSYNC_MAX_RETRIES", &v)?;
        }
        if let Some(v) = lookup("BINSYNC_ITEM_ALLOWLIST") {
            let v = v.trim();
            self.eligibility.item_allowlist = if v.is_empty() || v == "*" {
                None
            } else {
                Some(parse_list("BINSYNC_ITEM_ALLOWLIST", v)?)
            };
        }
        if let Some(v) = lookup("BINSYNC_EXCLUDED_PROGRAMS") {
            self.eligibility.excluded_programs = parse_list("BINSYNC_EXCLUDED_PROGRAMS", &v)?;
        }

        self.validate()?;
        debug!(config = ?self, "configuration resolved");
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE} (got {})",
                self.page_size
            )));
        }
        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(ConfigError::Invalid(format!(
                "workers must be between 1 and {MAX_WORKERS} (got {})",
                self.workers
            )));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Invalid(
                "retry.base_delay_ms cannot exceed retry.max_delay_ms".to_string(),
            ));
        }
        let blank = |prefixes: &[String]| prefixes.iter().any(|p| p.is_empty());
        if blank(self.eligibility.excluded_bin_prefixes.as_slice())
            || blank(self.eligibility.excluded_item_prefixes.as_slice())
        {
            // An empty prefix would exclude everything.
            return Err(ConfigError::Invalid(
                "exclusion prefixes cannot be empty strings".to_string(),
            ));
        }
        if matches!(&self.eligibility.item_allowlist, Some(list) if list.is_empty()) {
            return Err(ConfigError::Invalid(
                "item_allowlist is empty; omit it to disable the restriction".to_string(),
            ));
        }
        Ok(())
    }

    /// The eligibility predicate handed to the item query.
    pub fn eligibility_filter(&self) -> EligibilityFilter {
        let e = &self.eligibility;
        EligibilityFilter {
            location_id: self.location_id,
            excluded_bin_prefixes: e.excluded_bin_prefixes.clone(),
            excluded_item_prefixes: e.excluded_item_prefixes.clone(),
            excluded_programs: e.excluded_programs.iter().copied().collect(),
            item_allowlist: e
                .item_allowlist
                .as_ref()
                .map(|ids| ids.iter().copied().collect::<BTreeSet<_>>()),
        }
    }
}

fn parse_value<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn parse_list<T>(key: &'static str, raw: &str) -> Result<Vec<T>, ConfigError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_value(key, s))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_production_warehouse() {
        let config = ReconcileConfig::default();
        config.validate().unwrap();
        let filter = config.eligibility_filter();

        assert_eq!(filter.location_id, LocationId::new(7));
        assert_eq!(filter.excluded_bin_prefixes, vec!["Retail", "MF", "Mezz"]);
        assert!(filter.excluded_programs.contains(&ProgramId::new(89)));
        assert!(filter.item_allowlist.is_none());
    }

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let config = ReconcileConfig::from_json_str(
            r#"{"eligibility": {"item_allowlist": [386791]}, "workers": 2}"#,
        )
        .unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.page_size, MAX_PAGE_SIZE);
        assert_eq!(config.eligibility.excluded_item_prefixes, vec!["PRT"]);
        assert_eq!(
            config.eligibility.item_allowlist,
            Some(vec![ItemId::new(386791)])
        );
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(
            ReconcileConfig::from_json_str("{"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn env_overrides_apply_and_validate() {
        let config = ReconcileConfig::default()
            .with_env_overrides(env(&[
                ("BINSYNC_LOCATION_ID", "12"),
                ("BINSYNC_WORKERS", "8"),
                ("BINSYNC_ITEM_ALLOWLIST", "386791, 42"),
                ("BINSYNC_EXCLUDED_PROGRAMS", "1,2"),
            ]))
            .unwrap();

        assert_eq!(config.location_id, LocationId::new(12));
        assert_eq!(config.workers, 8);
        assert_eq!(
            config.eligibility.item_allowlist,
            Some(vec![ItemId::new(386791), ItemId::new(42)])
        );
        assert_eq!(
            config.eligibility.excluded_programs,
            vec![ProgramId::new(1), ProgramId::new(2)]
        );
    }

    #[test]
    fn wildcard_allowlist_clears_restriction() {
        let mut base = ReconcileConfig::default();
        base.eligibility.item_allowlist = Some(vec![ItemId::new(1)]);
        let config = base
            .with_env_overrides(env(&[("BINSYNC_ITEM_ALLOWLIST", "*")]))
            .unwrap();
        assert!(config.eligibility.item_allowlist.is_none());
    }

    #[test]
    fn bad_env_values_are_rejected() {
        let err = ReconcileConfig::default()
            .with_env_overrides(env(&[("BINSYNC_WORKERS", "many")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "BINSYNC_WORKERS", .. }));

        let err = ReconcileConfig::default()
            .with_env_overrides(env(&[("BINSYNC_PAGE_SIZE", "5000")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn empty_prefix_and_empty_allowlist_are_invalid() {
        let mut config = ReconcileConfig::default();
        config.eligibility.excluded_bin_prefixes.push(String::new());
        assert!(config.validate().is_err());

        let mut config = ReconcileConfig::default();
        config.eligibility.item_allowlist = Some(vec![]);
        assert!(config.validate().is_err());
    }
}

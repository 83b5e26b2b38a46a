use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use hemo_eligibility::EligibilityPolicy;
use hemo_types::ComponentType;

use crate::error::EngineError;

/// Whether a unit may go straight into storage at collection time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoragePolicy {
    /// Completing a donation collects and stores the unit in one step.
    /// Screening panels are only recorded on COLLECTED units, so under
    /// this policy no panel is filled in on the ledger.
    #[default]
    ImmediateStorage,
    /// A unit stays COLLECTED until its screening panel passes; only then
    /// may it be stored.
    RequireNegativeScreening,
}

/// Shelf lives in days from collection, per component.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShelfLifePolicy {
    /// Overrides of the component defaults (RBC 42, plasma 365,
    /// platelets 5, whole blood 35).
    pub shelf_life_days: BTreeMap<ComponentType, u32>,
}

impl ShelfLifePolicy {
    pub fn days_for(&self, component: ComponentType) -> u32 {
        self.shelf_life_days
            .get(&component)
            .copied()
            .unwrap_or_else(|| component.default_shelf_life_days())
    }
}

/// Tunable behavior of the donation and request workflows.
///
/// All fields have production defaults; a TOML file may override any
/// subset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub storage_policy: StoragePolicy,
    pub shelf_life: ShelfLifePolicy,
    pub eligibility: EligibilityPolicy,
    /// Upper bound on optimistic-append retries when the ledger tail
    /// moves under a stock reservation.
    pub max_append_attempts: u32,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            storage_policy: StoragePolicy::default(),
            shelf_life: ShelfLifePolicy::default(),
            eligibility: EligibilityPolicy::default(),
            max_append_attempts: 5,
        }
    }
}

impl WorkflowConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, EngineError> {
        Ok(toml::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_production_values() {
        let config = WorkflowConfig::default();
        assert_eq!(config.storage_policy, StoragePolicy::ImmediateStorage);
        assert_eq!(config.max_append_attempts, 5);
        assert_eq!(config.shelf_life.days_for(ComponentType::WholeBlood), 35);
        assert_eq!(config.eligibility.default_interval_days, 90);
    }

    #[test]
    fn toml_overrides_subset_of_fields() {
        let config = WorkflowConfig::from_toml_str(
            r#"
            storage_policy = "require_negative_screening"
            max_append_attempts = 8

            [shelf_life.shelf_life_days]
            Platelets = 7

            [eligibility]
            default_interval_days = 56
            "#,
        )
        .unwrap();

        assert_eq!(config.storage_policy, StoragePolicy::RequireNegativeScreening);
        assert_eq!(config.max_append_attempts, 8);
        assert_eq!(config.shelf_life.days_for(ComponentType::Platelets), 7);
        assert_eq!(config.shelf_life.days_for(ComponentType::Rbc), 42);
        assert_eq!(config.eligibility.default_interval_days, 56);
    }

    #[test]
    fn empty_toml_is_all_defaults() {
        let config = WorkflowConfig::from_toml_str("").unwrap();
        assert_eq!(config, WorkflowConfig::default());
    }
}

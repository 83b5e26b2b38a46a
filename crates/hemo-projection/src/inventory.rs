use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use hemo_types::{BloodGroup, ComponentType, StockLevel, UnitStatus};

use crate::projector::Projection;

/// Stock figures for one (blood group, component) combination.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockCount {
    /// Units in storage and not yet past expiry.
    pub stored: u32,
    /// Stored units held back for approved requests.
    pub reserved: u32,
    /// Stored minus reserved: what a new request could draw on.
    pub available: u32,
}

impl StockCount {
    pub fn level(&self) -> StockLevel {
        StockLevel::classify(self.available)
    }
}

/// Point-in-time stock aggregates, recomputed from a [`Projection`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventorySnapshot {
    pub as_of: NaiveDate,
    counts: BTreeMap<(BloodGroup, ComponentType), StockCount>,
}

impl InventorySnapshot {
    /// Walk every unit once, applying expiry lazily via `status_as_of`.
    pub fn compute(projection: &Projection, as_of: NaiveDate) -> Self {
        let reserved = projection.reserved_units();
        let mut counts: BTreeMap<(BloodGroup, ComponentType), StockCount> = BTreeMap::new();

        for unit in projection.units() {
            if unit.status_as_of(as_of) != UnitStatus::Stored {
                continue;
            }
            let count = counts
                .entry((unit.blood_group, unit.component))
                .or_default();
            count.stored += 1;
            if reserved.contains(&unit.id) {
                count.reserved += 1;
            } else {
                count.available += 1;
            }
        }

        Self { as_of, counts }
    }

    /// Count for one combination; zero when no such units exist.
    pub fn count(&self, group: BloodGroup, component: ComponentType) -> StockCount {
        self.counts
            .get(&(group, component))
            .copied()
            .unwrap_or_default()
    }

    pub fn counts(&self) -> impl Iterator<Item = (&(BloodGroup, ComponentType), &StockCount)> {
        self.counts.iter()
    }

    /// Totals per blood group across all components.
    pub fn by_group(&self) -> BTreeMap<BloodGroup, StockCount> {
        let mut out: BTreeMap<BloodGroup, StockCount> = BTreeMap::new();
        for (&(group, _), count) in &self.counts {
            merge(out.entry(group).or_default(), count);
        }
        out
    }

    /// Totals per component across all blood groups.
    pub fn by_component(&self) -> BTreeMap<ComponentType, StockCount> {
        let mut out: BTreeMap<ComponentType, StockCount> = BTreeMap::new();
        for (&(_, component), count) in &self.counts {
            merge(out.entry(component).or_default(), count);
        }
        out
    }

    /// Combinations currently below the safe threshold.
    pub fn shortages(&self) -> Vec<((BloodGroup, ComponentType), StockCount)> {
        self.counts
            .iter()
            .filter(|(_, c)| c.level() != StockLevel::Safe)
            .map(|(&key, &count)| (key, count))
            .collect()
    }
}

fn merge(into: &mut StockCount, from: &StockCount) {
    into.stored += from.stored;
    into.reserved += from.reserved;
    into.available += from.available;
}

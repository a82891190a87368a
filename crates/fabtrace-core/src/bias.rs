//! Bias mitigation: usage counters and selection weights.
//!
//! Every accepted draw bumps counters for the toolset, both equipment, the
//! touched utilities, and the category. Toolsets and equipment drop out of
//! the candidate set once they hit their attempt ceilings; utilities and
//! categories instead down-weight the toolsets that touch them. When the
//! ceilings exclude everything, the counters clear and the full candidate set
//! becomes eligible again, so the tracker can never permanently starve the
//! sampler.

use std::collections::HashMap;

use fabtrace_catalog::{CatalogSnapshot, Toolset};
use serde::{Deserialize, Serialize};

/// Floor for diversity down-weighting: no candidate reaches zero probability.
const MIN_WEIGHT: f64 = 0.1;

/// Tunables for the bias mitigation scheme.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiasConfig {
    /// A toolset is excluded once it has anchored this many attempts.
    pub max_attempts_per_toolset: u32,
    /// An equipment is excluded once it has served as an endpoint this often.
    pub max_attempts_per_equipment: u32,
    /// Per-use down-weight applied for each utility a toolset touches.
    pub utility_diversity_weight: f64,
    /// Per-use down-weight applied for the toolset's category.
    pub category_diversity_weight: f64,
}

impl Default for BiasConfig {
    fn default() -> Self {
        Self {
            max_attempts_per_toolset: 5,
            max_attempts_per_equipment: 3,
            utility_diversity_weight: 0.3,
            category_diversity_weight: 0.2,
        }
    }
}

/// Per-run usage counters. Scoped to one [`BiasTracker`] instance; nothing
/// survives between runs.
#[derive(Debug, Default)]
pub struct BiasTracker {
    config: BiasConfig,
    toolset_attempts: HashMap<String, u32>,
    equipment_attempts: HashMap<String, u32>,
    utility_usage: HashMap<String, u32>,
    category_usage: HashMap<String, u32>,
    /// Set when the ceilings excluded every toolset and the counters were
    /// cleared; cleared again once a draw lands after the reset.
    exhausted_cycle: bool,
}

impl BiasTracker {
    pub fn new(config: BiasConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &BiasConfig {
        &self.config
    }

    /// Whether a toolset is still under its attempt ceiling.
    pub fn toolset_allowed(&self, code: &str) -> bool {
        self.toolset_attempts.get(code).copied().unwrap_or(0)
            < self.config.max_attempts_per_toolset
    }

    /// Whether an equipment (by guid) is still under its attempt ceiling.
    pub fn equipment_allowed(&self, guid: &str) -> bool {
        self.equipment_attempts.get(guid).copied().unwrap_or(0)
            < self.config.max_attempts_per_equipment
    }

    /// Selection weight for a non-excluded toolset.
    ///
    /// Starts at 1.0 and decays multiplicatively for every diversity
    /// dimension the toolset touches, floored at 0.1 per factor.
    pub fn weight(&self, toolset: &Toolset) -> f64 {
        let mut weight = 1.0;

        for utility in toolset.utilities() {
            let used = self.utility_usage.get(&utility).copied().unwrap_or(0);
            let factor = 1.0 - f64::from(used) * self.config.utility_diversity_weight / 100.0;
            weight *= factor.max(MIN_WEIGHT);
        }

        if let Some(category) = toolset.category() {
            let used = self.category_usage.get(category).copied().unwrap_or(0);
            let factor = 1.0 - f64::from(used) * self.config.category_diversity_weight / 100.0;
            weight *= factor.max(MIN_WEIGHT);
        }

        weight
    }

    /// Record one accepted draw.
    pub fn record(
        &mut self,
        toolset_code: &str,
        equipment_guids: [&str; 2],
        utilities: &[String],
        category: Option<&str>,
    ) {
        *self.toolset_attempts.entry(toolset_code.to_owned()).or_insert(0) += 1;
        for guid in equipment_guids {
            *self.equipment_attempts.entry(guid.to_owned()).or_insert(0) += 1;
        }
        for utility in utilities {
            *self.utility_usage.entry(utility.clone()).or_insert(0) += 1;
        }
        if let Some(category) = category {
            *self.category_usage.entry(category.to_owned()).or_insert(0) += 1;
        }
        self.exhausted_cycle = false;
    }

    /// Reset the equipment counters for one toolset. Used when the ceilings
    /// leave fewer than two endpoints to pair.
    pub fn reset_equipment(&mut self, toolset: &Toolset) {
        for eq in toolset.active_equipment() {
            self.equipment_attempts.remove(&eq.guid);
        }
    }

    /// True once every usable toolset in the catalog has hit its ceiling in
    /// the current cycle, or a full reset cycle has already happened without
    /// an intervening accepted draw.
    pub fn is_exhausted(&self, catalog: &CatalogSnapshot) -> bool {
        if self.exhausted_cycle {
            return true;
        }
        let mut any = false;
        for ts in catalog.usable_toolsets() {
            any = true;
            if self.toolset_allowed(&ts.code) {
                return false;
            }
        }
        any
    }

    /// Clear every counter, restoring full eligibility.
    pub fn reset(&mut self) {
        tracing::debug!("bias counters exhausted; resetting");
        self.toolset_attempts.clear();
        self.equipment_attempts.clear();
        self.utility_usage.clear();
        self.category_usage.clear();
        self.exhausted_cycle = true;
    }
}

//! Candidate pair selection.
//!
//! One call to [`Sampler::sample`] produces at most one candidate
//! (start, end) node pair: toolset draw (bias-weighted), equipment pair draw,
//! PoC draw per equipment, then duplicate suppression against the session's
//! used-pair set. Every failure mode is an explicit outcome variant; none of
//! them abort the run.

use std::collections::HashSet;

use fabtrace_catalog::{CatalogSnapshot, Equipment, EquipmentPoc, NodeId, Toolset, ALL_TOOLSETS};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::bias::{BiasConfig, BiasTracker};

/// One endpoint of a candidate pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub equipment_guid: String,
    pub equipment_name: String,
    pub poc_code: String,
    pub node_id: NodeId,
    pub utility: Option<String>,
}

/// A successfully drawn candidate pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selection {
    pub toolset_code: String,
    pub category: Option<String>,
    /// Utility tags touched by the two selected PoCs.
    pub utilities: Vec<String>,
    pub start: Endpoint,
    pub end: Endpoint,
}

impl Selection {
    /// Canonical unordered pair key: traversal order never creates two
    /// distinct entries.
    pub fn pair_key(&self) -> (NodeId, NodeId) {
        canonical_pair(self.start.node_id, self.end.node_id)
    }
}

/// Outcome of one sampling attempt.
#[derive(Debug, Clone)]
pub enum SampleOutcome {
    Selected(Selection),
    /// No toolset is eligible, even after a counter reset.
    NoToolsetAvailable,
    /// The drawn toolset owns fewer than two active equipment.
    InsufficientEquipment,
    /// A selected equipment has no active PoC to anchor an endpoint.
    NoUsablePoc,
    /// The canonical node pair was already attempted this session.
    DuplicatePair,
}

pub fn canonical_pair(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
    (a.min(b), a.max(b))
}

/// Draws candidate pairs from a catalog snapshot, one per call.
pub struct Sampler<'a> {
    catalog: &'a CatalogSnapshot,
    bias: BiasTracker,
    used_pairs: HashSet<(NodeId, NodeId)>,
    rng: StdRng,
}

impl<'a> Sampler<'a> {
    pub fn new(catalog: &'a CatalogSnapshot, config: BiasConfig, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            catalog,
            bias: BiasTracker::new(config),
            used_pairs: HashSet::new(),
            rng,
        }
    }

    /// Produce one candidate pair, or the reason none could be drawn.
    pub fn sample(&mut self, requested_toolset: Option<&str>) -> SampleOutcome {
        let Some(toolset) = self.select_toolset(requested_toolset) else {
            return SampleOutcome::NoToolsetAvailable;
        };

        let active: Vec<&Equipment> = toolset.active_equipment().collect();
        if active.len() < 2 {
            return SampleOutcome::InsufficientEquipment;
        }

        let Some((eq_a, eq_b)) = self.select_equipment_pair(toolset, &active) else {
            return SampleOutcome::InsufficientEquipment;
        };

        let Some(poc_a) = self.select_poc(eq_a) else {
            return SampleOutcome::NoUsablePoc;
        };
        let Some(poc_b) = self.select_poc(eq_b) else {
            return SampleOutcome::NoUsablePoc;
        };

        let pair = canonical_pair(poc_a.node_id, poc_b.node_id);
        if self.used_pairs.contains(&pair) {
            tracing::trace!(?pair, "node pair already attempted");
            return SampleOutcome::DuplicatePair;
        }

        let mut utilities: Vec<String> = Vec::new();
        for poc in [poc_a, poc_b] {
            if let Some(u) = &poc.utility {
                if !utilities.iter().any(|seen| seen == u) {
                    utilities.push(u.clone());
                }
            }
        }

        let selection = Selection {
            toolset_code: toolset.code.clone(),
            category: toolset.category().map(str::to_owned),
            utilities: utilities.clone(),
            start: endpoint(eq_a, poc_a),
            end: endpoint(eq_b, poc_b),
        };

        self.used_pairs.insert(pair);
        self.bias.record(
            &toolset.code,
            [eq_a.guid.as_str(), eq_b.guid.as_str()],
            &utilities,
            toolset.category(),
        );

        SampleOutcome::Selected(selection)
    }

    /// Whether the bias tracker has run the candidate set dry this cycle.
    pub fn is_exhausted(&self) -> bool {
        self.bias.is_exhausted(self.catalog)
    }

    pub fn pairs_attempted(&self) -> usize {
        self.used_pairs.len()
    }

    fn select_toolset(&mut self, requested: Option<&str>) -> Option<&'a Toolset> {
        // A concrete (non-wildcard) request short-circuits the weighted draw
        // when the toolset exists; an unknown code falls through to it.
        if let Some(code) = requested.filter(|code| *code != ALL_TOOLSETS) {
            if let Some(ts) = self.catalog.toolset(code).filter(|ts| ts.is_active) {
                return Some(ts);
            }
        }

        let mut candidates: Vec<&'a Toolset> = self
            .catalog
            .usable_toolsets()
            .filter(|ts| self.bias.toolset_allowed(&ts.code))
            .collect();

        if candidates.is_empty() {
            // Liveness: exhausting every ceiling re-opens the full set.
            self.bias.reset();
            candidates = self.catalog.usable_toolsets().collect();
        }
        if candidates.is_empty() {
            return None;
        }

        let weights: Vec<f64> = candidates.iter().map(|ts| self.bias.weight(ts)).collect();
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            let idx = self.rng.gen_range(0..candidates.len());
            return Some(candidates[idx]);
        }

        let mut roll = self.rng.gen_range(0.0..total);
        for (ts, w) in candidates.iter().zip(&weights) {
            if roll < *w {
                return Some(ts);
            }
            roll -= w;
        }
        candidates.last().copied()
    }

    /// `None` when no second endpoint with a distinct id remains after the
    /// first draw.
    fn select_equipment_pair(
        &mut self,
        toolset: &'a Toolset,
        active: &[&'a Equipment],
    ) -> Option<(&'a Equipment, &'a Equipment)> {
        let mut eligible: Vec<&'a Equipment> = active
            .iter()
            .copied()
            .filter(|eq| self.bias.equipment_allowed(&eq.guid))
            .collect();

        if eligible.len() < 2 {
            self.bias.reset_equipment(toolset);
            eligible = active.to_vec();
        }

        let first = eligible[self.rng.gen_range(0..eligible.len())];
        let rest: Vec<&'a Equipment> = eligible
            .iter()
            .copied()
            .filter(|eq| eq.id != first.id)
            .collect();
        if rest.is_empty() {
            return None;
        }
        let second = rest[self.rng.gen_range(0..rest.len())];
        Some((first, second))
    }

    /// Prefer active-and-unused PoCs over used ones; any active PoC is usable.
    fn select_poc(&mut self, equipment: &'a Equipment) -> Option<&'a EquipmentPoc> {
        let active: Vec<&'a EquipmentPoc> = equipment.active_pocs().collect();
        if active.is_empty() {
            return None;
        }
        let unused: Vec<&'a EquipmentPoc> =
            active.iter().copied().filter(|p| !p.is_used).collect();
        let pool = if unused.is_empty() { &active } else { &unused };
        Some(pool[self.rng.gen_range(0..pool.len())])
    }
}

fn endpoint(equipment: &Equipment, poc: &EquipmentPoc) -> Endpoint {
    Endpoint {
        equipment_guid: equipment.guid.clone(),
        equipment_name: equipment.name.clone(),
        poc_code: poc.code.clone(),
        node_id: poc.node_id,
        utility: poc.utility.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabtrace_catalog::{Equipment, EquipmentPoc, Toolset};

    fn poc(id: u32, equipment_id: u32, node_id: NodeId) -> EquipmentPoc {
        EquipmentPoc {
            id,
            equipment_id,
            code: format!("P{id}"),
            node_id,
            utility: Some("N2".to_owned()),
            flow: None,
            is_used: false,
            is_active: true,
        }
    }

    fn equipment(id: u32, toolset: &str, node_id: NodeId) -> Equipment {
        Equipment {
            id,
            toolset_code: toolset.to_owned(),
            name: format!("EQ{id}"),
            guid: format!("g{id}"),
            node_id,
            kind: Some("PRODUCTION".to_owned()),
            is_active: true,
            pocs: vec![poc(id * 10, id, node_id)],
        }
    }

    fn two_equipment_catalog() -> CatalogSnapshot {
        let ts = Toolset {
            code: "TS1".to_owned(),
            fab: "M16".to_owned(),
            phase: None,
            name: "TS1".to_owned(),
            description: None,
            is_active: true,
            equipment: vec![equipment(1, "TS1", 10), equipment(2, "TS1", 20)],
        };
        CatalogSnapshot::build("M16", vec![ts]).unwrap()
    }

    #[test]
    fn canonical_pair_is_symmetric() {
        assert_eq!(canonical_pair(7, 3), canonical_pair(3, 7));
        assert_eq!(canonical_pair(5, 5), (5, 5));
    }

    #[test]
    fn two_equipment_toolset_yields_then_duplicates() {
        let catalog = two_equipment_catalog();
        let mut sampler = Sampler::new(&catalog, BiasConfig::default(), Some(42));

        // Only one unordered pair exists; the first draw selects it and every
        // later draw is suppressed as a duplicate, regardless of direction.
        match sampler.sample(None) {
            SampleOutcome::Selected(sel) => assert_eq!(sel.pair_key(), (10, 20)),
            other => panic!("expected Selected, got {other:?}"),
        }
        for _ in 0..20 {
            assert!(matches!(sampler.sample(None), SampleOutcome::DuplicatePair));
        }
        assert_eq!(sampler.pairs_attempted(), 1);
    }

    #[test]
    fn requested_toolset_is_honored() {
        let ts1 = Toolset {
            code: "TS1".to_owned(),
            fab: "M16".to_owned(),
            phase: None,
            name: "TS1".to_owned(),
            description: None,
            is_active: true,
            equipment: vec![equipment(1, "TS1", 10), equipment(2, "TS1", 20)],
        };
        let ts2 = Toolset {
            code: "TS2".to_owned(),
            fab: "M16".to_owned(),
            phase: None,
            name: "TS2".to_owned(),
            description: None,
            is_active: true,
            equipment: vec![equipment(3, "TS2", 30), equipment(4, "TS2", 40)],
        };
        let catalog = CatalogSnapshot::build("M16", vec![ts1, ts2]).unwrap();
        let mut sampler = Sampler::new(&catalog, BiasConfig::default(), Some(7));

        match sampler.sample(Some("TS2")) {
            SampleOutcome::Selected(sel) => assert_eq!(sel.toolset_code, "TS2"),
            other => panic!("expected Selected, got {other:?}"),
        }
    }

    #[test]
    fn wildcard_request_falls_through_to_weighted_draw() {
        let catalog = two_equipment_catalog();
        let mut sampler = Sampler::new(&catalog, BiasConfig::default(), Some(1));
        assert!(matches!(
            sampler.sample(Some(ALL_TOOLSETS)),
            SampleOutcome::Selected(_)
        ));
    }

    #[test]
    fn single_equipment_toolset_reports_insufficient() {
        let ts = Toolset {
            code: "TS1".to_owned(),
            fab: "M16".to_owned(),
            phase: None,
            name: "TS1".to_owned(),
            description: None,
            is_active: true,
            equipment: vec![equipment(1, "TS1", 10)],
        };
        let catalog = CatalogSnapshot::build("M16", vec![ts]).unwrap();
        let mut sampler = Sampler::new(&catalog, BiasConfig::default(), Some(3));

        // The toolset is only reachable by explicit request; the weighted
        // draw skips it as unusable.
        assert!(matches!(
            sampler.sample(Some("TS1")),
            SampleOutcome::InsufficientEquipment
        ));
        assert!(matches!(
            sampler.sample(None),
            SampleOutcome::NoToolsetAvailable
        ));
    }

    #[test]
    fn equipment_without_pocs_reports_no_usable_poc() {
        let mut eq_a = equipment(1, "TS1", 10);
        eq_a.pocs.clear();
        let ts = Toolset {
            code: "TS1".to_owned(),
            fab: "M16".to_owned(),
            phase: None,
            name: "TS1".to_owned(),
            description: None,
            is_active: true,
            equipment: vec![eq_a, equipment(2, "TS1", 20)],
        };
        let catalog = CatalogSnapshot::build("M16", vec![ts]).unwrap();
        let mut sampler = Sampler::new(&catalog, BiasConfig::default(), Some(9));

        assert!(matches!(sampler.sample(None), SampleOutcome::NoUsablePoc));
    }

    #[test]
    fn used_pocs_are_fallback_only() {
        let mut eq_a = equipment(1, "TS1", 10);
        eq_a.pocs = vec![
            {
                let mut p = poc(11, 1, 11);
                p.is_used = true;
                p
            },
            poc(12, 1, 12),
        ];
        let ts = Toolset {
            code: "TS1".to_owned(),
            fab: "M16".to_owned(),
            phase: None,
            name: "TS1".to_owned(),
            description: None,
            is_active: true,
            equipment: vec![eq_a, equipment(2, "TS1", 20)],
        };
        let catalog = CatalogSnapshot::build("M16", vec![ts]).unwrap();

        // Across many seeded draws, the unused PoC (node 12) is always the
        // one selected for equipment 1.
        for seed in 0..16 {
            let mut sampler = Sampler::new(&catalog, BiasConfig::default(), Some(seed));
            if let SampleOutcome::Selected(sel) = sampler.sample(None) {
                let nodes = [sel.start.node_id, sel.end.node_id];
                assert!(!nodes.contains(&11), "used PoC drawn despite unused sibling");
            }
        }
    }
}

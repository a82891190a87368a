//! Catalog snapshot: toolsets, equipment, and points of contact for one fab.
//!
//! The snapshot is loaded once at run start and read-only afterwards. All
//! ownership links (equipment → toolset, PoC → equipment) are verified when
//! the snapshot is built, so downstream code never re-derives relationships
//! from identifier strings.

#[cfg(test)]
mod tests;

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Graph node identifier.
pub type NodeId = u32;
/// Graph link identifier.
pub type LinkId = u32;

/// Wildcard toolset filter: "run over every toolset".
pub const ALL_TOOLSETS: &str = "ALL";

// ============================================================================
// Catalog Records
// ============================================================================

/// A point of contact on a piece of equipment.
///
/// The PoC's `node_id`, not the equipment's own node, is the unit of path
/// start/end selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquipmentPoc {
    pub id: u32,
    pub equipment_id: u32,
    pub code: String,
    pub node_id: NodeId,
    #[serde(default)]
    pub utility: Option<String>,
    /// Flow direction tag (e.g. SUPPLY/RETURN), when modeled.
    #[serde(default)]
    pub flow: Option<String>,
    #[serde(default)]
    pub is_used: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// A physical unit in the utility network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Equipment {
    pub id: u32,
    pub toolset_code: String,
    pub name: String,
    pub guid: String,
    pub node_id: NodeId,
    /// Category/kind tag (e.g. PRODUCTION, SUPPORT).
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub pocs: Vec<EquipmentPoc>,
}

impl Equipment {
    /// Active PoCs, i.e. those eligible for selection at all.
    pub fn active_pocs(&self) -> impl Iterator<Item = &EquipmentPoc> {
        self.pocs.iter().filter(|p| p.is_active)
    }

    pub fn has_usable_poc(&self) -> bool {
        self.active_pocs().next().is_some()
    }
}

/// A named group of equipment sharing a fab/phase context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Toolset {
    pub code: String,
    pub fab: String,
    #[serde(default)]
    pub phase: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub equipment: Vec<Equipment>,
}

impl Toolset {
    pub fn active_equipment(&self) -> impl Iterator<Item = &Equipment> {
        self.equipment.iter().filter(|e| e.is_active)
    }

    /// A toolset can anchor a sampling attempt only with two distinct
    /// endpoints available.
    pub fn is_usable(&self) -> bool {
        self.active_equipment().count() >= 2
    }

    /// Distinct utility tags across this toolset's PoCs, sorted for
    /// deterministic iteration.
    pub fn utilities(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for eq in self.active_equipment() {
            for poc in eq.active_pocs() {
                if let Some(u) = &poc.utility {
                    if !out.iter().any(|seen| seen == u) {
                        out.push(u.clone());
                    }
                }
            }
        }
        out.sort();
        out
    }

    /// Category proxy: the first active equipment's kind, as in the source
    /// data model where toolsets carry no category of their own.
    pub fn category(&self) -> Option<&str> {
        self.active_equipment().find_map(|e| e.kind.as_deref())
    }
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Snapshot
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("toolset {toolset}: equipment {equipment} claims owner {claimed}")]
    ForeignKeyMismatch {
        toolset: String,
        equipment: String,
        claimed: String,
    },
    #[error("equipment {equipment}: PoC {poc} claims owner {claimed}")]
    PocOwnerMismatch {
        equipment: u32,
        poc: u32,
        claimed: u32,
    },
    #[error("duplicate toolset code {0}")]
    DuplicateToolset(String),
    #[error("duplicate equipment id {0}")]
    DuplicateEquipmentId(u32),
    #[error("duplicate equipment guid {0}")]
    DuplicateEquipmentGuid(String),
    #[error("toolset {toolset} belongs to fab {actual}, snapshot is for {expected}")]
    WrongFab {
        toolset: String,
        actual: String,
        expected: String,
    },
    #[error("failed to read catalog snapshot: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed catalog snapshot: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Immutable, once-loaded view of every toolset in one fab.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    fab: String,
    toolsets: Vec<Toolset>,
    #[serde(skip)]
    by_code: HashMap<String, usize>,
}

impl CatalogSnapshot {
    /// Build a snapshot, verifying every ownership link once up front.
    pub fn build(fab: impl Into<String>, toolsets: Vec<Toolset>) -> Result<Self, CatalogError> {
        let fab = fab.into();
        let mut by_code = HashMap::with_capacity(toolsets.len());
        let mut equipment_ids: HashSet<u32> = HashSet::new();
        let mut equipment_guids: HashSet<&str> = HashSet::new();

        for (idx, ts) in toolsets.iter().enumerate() {
            if ts.fab != fab {
                return Err(CatalogError::WrongFab {
                    toolset: ts.code.clone(),
                    actual: ts.fab.clone(),
                    expected: fab.clone(),
                });
            }
            if by_code.insert(ts.code.clone(), idx).is_some() {
                return Err(CatalogError::DuplicateToolset(ts.code.clone()));
            }
            for eq in &ts.equipment {
                // Equipment identity is fab-wide: the sampler keys pair draws
                // by id and bias counters by guid, so collisions anywhere in
                // the snapshot are rejected up front.
                if !equipment_ids.insert(eq.id) {
                    return Err(CatalogError::DuplicateEquipmentId(eq.id));
                }
                if !equipment_guids.insert(&eq.guid) {
                    return Err(CatalogError::DuplicateEquipmentGuid(eq.guid.clone()));
                }
                if eq.toolset_code != ts.code {
                    return Err(CatalogError::ForeignKeyMismatch {
                        toolset: ts.code.clone(),
                        equipment: eq.guid.clone(),
                        claimed: eq.toolset_code.clone(),
                    });
                }
                for poc in &eq.pocs {
                    if poc.equipment_id != eq.id {
                        return Err(CatalogError::PocOwnerMismatch {
                            equipment: eq.id,
                            poc: poc.id,
                            claimed: poc.equipment_id,
                        });
                    }
                }
            }
        }

        tracing::debug!(fab = %fab, toolsets = toolsets.len(), "catalog snapshot built");
        Ok(Self {
            fab,
            toolsets,
            by_code,
        })
    }

    /// Load a snapshot from a JSON file produced by the data-sync layer.
    pub fn from_json_file(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let parsed: CatalogSnapshot = serde_json::from_str(raw)?;
        // Re-run `build` so deserialized snapshots get the same validation
        // and index as programmatically constructed ones.
        Self::build(parsed.fab, parsed.toolsets)
    }

    pub fn fab(&self) -> &str {
        &self.fab
    }

    pub fn toolsets(&self) -> &[Toolset] {
        &self.toolsets
    }

    pub fn toolset(&self, code: &str) -> Option<&Toolset> {
        self.by_code.get(code).map(|&idx| &self.toolsets[idx])
    }

    /// Active toolsets that can anchor a sampling attempt.
    pub fn usable_toolsets(&self) -> impl Iterator<Item = &Toolset> {
        self.toolsets
            .iter()
            .filter(|ts| ts.is_active && ts.is_usable())
    }

    pub fn has_usable_toolset(&self) -> bool {
        self.usable_toolsets().next().is_some()
    }
}

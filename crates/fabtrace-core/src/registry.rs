//! Content-addressed path definitions.
//!
//! A discovered path canonicalizes to a SHA-256 over its ordered node-id and
//! link-id sequences. Two attempts that surface the identical traversal
//! resolve to the same definition; registration is idempotent and definitions
//! never mutate after creation. The hash is order-sensitive on purpose:
//! traversal direction is meaningful to the downstream flow checks, so a
//! reversed traversal is a distinct definition. Coverage accounting stays
//! order-independent in the ledger.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::oracle::PathFound;

/// Canonical, immutable record of one discovered traversal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathDefinition {
    /// Hex SHA-256 over the ordered node then link sequence.
    pub hash: String,
    pub node_count: u32,
    pub link_count: u32,
    pub total_length_mm: f64,
    /// Fraction of the total graph newly covered when this definition was
    /// first registered.
    pub coverage: f64,
    /// Utility tags touched by the endpoints that discovered the path.
    pub utilities: Vec<String>,
    pub nodes: Vec<u32>,
    pub links: Vec<u32>,
}

/// Hash the ordered node/link sequence of a path.
pub fn path_hash(path: &PathFound) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"nodes");
    for node in &path.nodes {
        hasher.update(node.to_le_bytes());
    }
    hasher.update(b"links");
    for link in &path.links {
        hasher.update(link.to_le_bytes());
    }

    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// In-run store of path definitions, deduplicated by content hash.
#[derive(Debug, Default)]
pub struct PathRegistry {
    by_hash: HashMap<String, Arc<PathDefinition>>,
    /// Creation order, for stable persistence.
    order: Vec<String>,
}

impl PathRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a path, returning its definition and whether it was newly
    /// created. An existing definition is returned unchanged: the coverage
    /// and utilities recorded at first sight stick.
    pub fn register(
        &mut self,
        path: &PathFound,
        coverage: f64,
        utilities: Vec<String>,
    ) -> (Arc<PathDefinition>, bool) {
        let hash = path_hash(path);
        if let Some(existing) = self.by_hash.get(&hash) {
            tracing::trace!(%hash, "path definition already registered");
            return (Arc::clone(existing), false);
        }

        let definition = Arc::new(PathDefinition {
            hash: hash.clone(),
            node_count: path.nodes.len() as u32,
            link_count: path.links.len() as u32,
            total_length_mm: path.length_mm,
            coverage,
            utilities,
            nodes: path.nodes.clone(),
            links: path.links.clone(),
        });
        self.by_hash.insert(hash.clone(), Arc::clone(&definition));
        self.order.push(hash);
        (definition, true)
    }

    pub fn get(&self, hash: &str) -> Option<&Arc<PathDefinition>> {
        self.by_hash.get(hash)
    }

    pub fn len(&self) -> usize {
        self.by_hash.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hash.is_empty()
    }

    /// Definitions in creation order.
    pub fn definitions(&self) -> Vec<Arc<PathDefinition>> {
        self.order
            .iter()
            .filter_map(|hash| self.by_hash.get(hash).cloned())
            .collect()
    }
}

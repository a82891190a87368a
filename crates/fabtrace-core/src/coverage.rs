//! Coverage accounting over the fab's network graph.
//!
//! Two roaring bitmaps track the node and link ids touched by at least one
//! accepted path. Totals are fixed when the ledger is built and never change
//! during a run; the covered sets only ever grow.

use fabtrace_catalog::{LinkId, NodeId};
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use crate::oracle::PathFound;

/// Point-in-time coverage snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageStats {
    pub nodes_covered: u64,
    pub links_covered: u64,
    pub total_nodes: u64,
    pub total_links: u64,
    /// `(nodes_covered + links_covered) / (total_nodes + total_links)`,
    /// `0.0` when the totals are degenerate.
    pub percentage: f64,
}

impl CoverageStats {
    fn derive(nodes_covered: u64, links_covered: u64, total_nodes: u64, total_links: u64) -> Self {
        let total = total_nodes + total_links;
        let percentage = if total == 0 {
            0.0
        } else {
            (nodes_covered + links_covered) as f64 / total as f64
        };
        Self {
            nodes_covered,
            links_covered,
            total_nodes,
            total_links,
            percentage,
        }
    }

    pub fn node_coverage(&self) -> f64 {
        if self.total_nodes == 0 {
            0.0
        } else {
            self.nodes_covered as f64 / self.total_nodes as f64
        }
    }

    pub fn link_coverage(&self) -> f64 {
        if self.total_links == 0 {
            0.0
        } else {
            self.links_covered as f64 / self.total_links as f64
        }
    }
}

/// Monotonic covered-id sets plus the fab's static totals.
#[derive(Debug, Clone)]
pub struct CoverageLedger {
    covered_nodes: RoaringBitmap,
    covered_links: RoaringBitmap,
    total_nodes: u64,
    total_links: u64,
}

impl CoverageLedger {
    pub fn new(total_nodes: u64, total_links: u64) -> Self {
        Self {
            covered_nodes: RoaringBitmap::new(),
            covered_links: RoaringBitmap::new(),
            total_nodes,
            total_links,
        }
    }

    /// Fraction of the total graph this path would newly cover. Ids repeated
    /// within the path count once, matching the set semantics of [`commit`].
    /// Pure: the covered sets are not touched.
    ///
    /// [`commit`]: CoverageLedger::commit
    pub fn contribution(&self, path: &PathFound) -> f64 {
        let total = self.total_nodes + self.total_links;
        if total == 0 {
            return 0.0;
        }

        let mut fresh_nodes = RoaringBitmap::new();
        for &node in &path.nodes {
            if !self.covered_nodes.contains(node) {
                fresh_nodes.insert(node);
            }
        }
        let mut fresh_links = RoaringBitmap::new();
        for &link in &path.links {
            if !self.covered_links.contains(link) {
                fresh_links.insert(link);
            }
        }
        (fresh_nodes.len() + fresh_links.len()) as f64 / total as f64
    }

    /// Fold a path into the covered sets and return the new cumulative
    /// stats. Idempotent: re-committing already-covered ids changes nothing.
    pub fn commit(&mut self, path: &PathFound) -> CoverageStats {
        for &node in &path.nodes {
            self.covered_nodes.insert(node);
        }
        for &link in &path.links {
            self.covered_links.insert(link);
        }
        self.stats()
    }

    pub fn stats(&self) -> CoverageStats {
        CoverageStats::derive(
            self.covered_nodes.len(),
            self.covered_links.len(),
            self.total_nodes,
            self.total_links,
        )
    }

    pub fn is_node_covered(&self, node: NodeId) -> bool {
        self.covered_nodes.contains(node)
    }

    pub fn is_link_covered(&self, link: LinkId) -> bool {
        self.covered_links.contains(link)
    }
}

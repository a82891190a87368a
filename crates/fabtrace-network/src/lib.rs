//! Reference path oracle over an in-memory utility-network graph.
//!
//! The graph is a flat node/link snapshot (JSON, produced by the data-sync
//! layer). `NetworkPathFinder` answers shortest-path queries with Dijkstra
//! over link length and reconstructs the ordered node and link sequences the
//! sampler core expects. Disconnected pairs answer `NotFound`; only unknown
//! endpoints and malformed snapshots are errors.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::path::Path;

use fabtrace_catalog::{LinkId, NodeId};
use fabtrace_core::{OracleError, PathFound, PathLookup, PathOracle};
use serde::{Deserialize, Serialize};

// ============================================================================
// Snapshot Records
// ============================================================================

/// A node in the utility network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkNode {
    pub node_id: NodeId,
    #[serde(default)]
    pub utility: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
}

/// A physical link between two nodes. `length_mm` doubles as the traversal
/// cost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkLink {
    pub link_id: LinkId,
    pub start_node_id: NodeId,
    pub end_node_id: NodeId,
    #[serde(default = "default_bidirected")]
    pub is_bidirected: bool,
    pub length_mm: f64,
}

fn default_bidirected() -> bool {
    true
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("link {link} references unknown node {node}")]
    DanglingLink { link: LinkId, node: NodeId },
    #[error("duplicate node id {0}")]
    DuplicateNode(NodeId),
    #[error("duplicate link id {0}")]
    DuplicateLink(LinkId),
    #[error("link {0} has non-finite or negative length")]
    BadLength(LinkId),
    #[error("failed to read network snapshot: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed network snapshot: {0}")]
    Parse(#[from] serde_json::Error),
}

// ============================================================================
// Graph
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NetworkSnapshot {
    nodes: Vec<NetworkNode>,
    links: Vec<NetworkLink>,
}

/// Adjacency-indexed network graph, immutable after construction.
#[derive(Debug, Clone)]
pub struct NetworkGraph {
    nodes: HashMap<NodeId, NetworkNode>,
    links: HashMap<LinkId, NetworkLink>,
    /// node -> [(neighbor, link, cost)]
    adjacency: HashMap<NodeId, Vec<(NodeId, LinkId, f64)>>,
}

impl NetworkGraph {
    pub fn build(
        nodes: Vec<NetworkNode>,
        links: Vec<NetworkLink>,
    ) -> Result<Self, NetworkError> {
        let mut node_map = HashMap::with_capacity(nodes.len());
        for node in nodes {
            if node_map.insert(node.node_id, node.clone()).is_some() {
                return Err(NetworkError::DuplicateNode(node.node_id));
            }
        }

        let mut link_map = HashMap::with_capacity(links.len());
        let mut adjacency: HashMap<NodeId, Vec<(NodeId, LinkId, f64)>> = HashMap::new();
        for link in links {
            if !link.length_mm.is_finite() || link.length_mm < 0.0 {
                return Err(NetworkError::BadLength(link.link_id));
            }
            for node in [link.start_node_id, link.end_node_id] {
                if !node_map.contains_key(&node) {
                    return Err(NetworkError::DanglingLink {
                        link: link.link_id,
                        node,
                    });
                }
            }
            adjacency
                .entry(link.start_node_id)
                .or_default()
                .push((link.end_node_id, link.link_id, link.length_mm));
            if link.is_bidirected {
                adjacency
                    .entry(link.end_node_id)
                    .or_default()
                    .push((link.start_node_id, link.link_id, link.length_mm));
            }
            if link_map.insert(link.link_id, link.clone()).is_some() {
                return Err(NetworkError::DuplicateLink(link.link_id));
            }
        }

        tracing::debug!(
            nodes = node_map.len(),
            links = link_map.len(),
            "network graph built"
        );
        Ok(Self {
            nodes: node_map,
            links: link_map,
            adjacency,
        })
    }

    pub fn from_json_file(path: &Path) -> Result<Self, NetworkError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, NetworkError> {
        let snapshot: NetworkSnapshot = serde_json::from_str(raw)?;
        Self::build(snapshot.nodes, snapshot.links)
    }

    pub fn total_nodes(&self) -> u64 {
        self.nodes.len() as u64
    }

    pub fn total_links(&self) -> u64 {
        self.links.len() as u64
    }

    pub fn contains_node(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    /// Dijkstra shortest path by cumulative link length. Returns the ordered
    /// node and link sequences from `start` to `end`, or `None` when the
    /// nodes are disconnected.
    fn shortest_path(&self, start: NodeId, end: NodeId) -> Option<PathFound> {
        if start == end {
            return Some(PathFound {
                nodes: vec![start],
                links: vec![],
                length_mm: 0.0,
            });
        }

        let mut dist: HashMap<NodeId, f64> = HashMap::new();
        let mut prev: HashMap<NodeId, (NodeId, LinkId)> = HashMap::new();
        let mut heap = BinaryHeap::new();

        dist.insert(start, 0.0);
        heap.push(HeapEntry {
            cost: 0.0,
            node: start,
        });

        while let Some(HeapEntry { cost, node }) = heap.pop() {
            if node == end {
                break;
            }
            if cost > dist.get(&node).copied().unwrap_or(f64::INFINITY) {
                continue; // stale entry
            }
            let Some(neighbors) = self.adjacency.get(&node) else {
                continue;
            };
            for &(next, link, link_cost) in neighbors {
                let candidate = cost + link_cost;
                if candidate < dist.get(&next).copied().unwrap_or(f64::INFINITY) {
                    dist.insert(next, candidate);
                    prev.insert(next, (node, link));
                    heap.push(HeapEntry {
                        cost: candidate,
                        node: next,
                    });
                }
            }
        }

        let total = *dist.get(&end)?;

        // Walk predecessors back from the target.
        let mut nodes = vec![end];
        let mut links = Vec::new();
        let mut cursor = end;
        while cursor != start {
            let &(parent, link) = prev.get(&cursor)?;
            nodes.push(parent);
            links.push(link);
            cursor = parent;
        }
        nodes.reverse();
        links.reverse();

        Some(PathFound {
            nodes,
            links,
            length_mm: total,
        })
    }
}

/// Min-heap entry; `BinaryHeap` is a max-heap, so ordering is reversed.
#[derive(Debug, Clone, Copy)]
struct HeapEntry {
    cost: f64,
    node: NodeId,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost && self.node == other.node
    }
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ============================================================================
// Oracle
// ============================================================================

/// [`PathOracle`] implementation backed by a [`NetworkGraph`].
pub struct NetworkPathFinder {
    graph: NetworkGraph,
}

impl NetworkPathFinder {
    pub fn new(graph: NetworkGraph) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &NetworkGraph {
        &self.graph
    }
}

impl PathOracle for NetworkPathFinder {
    fn find_path(&mut self, start: NodeId, end: NodeId) -> Result<PathLookup, OracleError> {
        for node in [start, end] {
            if !self.graph.contains_node(node) {
                return Err(OracleError::UnknownNode(node));
            }
        }
        match self.graph.shortest_path(start, end) {
            Some(path) => Ok(PathLookup::Found(path)),
            None => Ok(PathLookup::NotFound),
        }
    }
}

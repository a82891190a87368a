//! External shortest-path service boundary.
//!
//! The core treats path computation as a blocking round trip with no retry
//! logic of its own. "No path between these nodes" is an ordinary answer and
//! travels as [`PathLookup::NotFound`]; only transport or data failures reach
//! the error channel, and those abort the run.

use fabtrace_catalog::{LinkId, NodeId};
use serde::{Deserialize, Serialize};

/// An ordered path through the network, as returned by the oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathFound {
    pub nodes: Vec<NodeId>,
    pub links: Vec<LinkId>,
    /// Total physical length of the traversed links.
    pub length_mm: f64,
}

/// Outcome of one oracle query.
#[derive(Debug, Clone, PartialEq)]
pub enum PathLookup {
    Found(PathFound),
    NotFound,
}

/// Fatal oracle failures. `NotFound` is deliberately not represented here.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("oracle transport failure: {0}")]
    Transport(String),
    #[error("malformed oracle response: {0}")]
    Malformed(String),
    #[error("node {0} unknown to the network graph")]
    UnknownNode(NodeId),
}

/// Shortest-path computation between two network nodes.
pub trait PathOracle {
    fn find_path(&mut self, start: NodeId, end: NodeId) -> Result<PathLookup, OracleError>;
}

impl<T: PathOracle + ?Sized> PathOracle for &mut T {
    fn find_path(&mut self, start: NodeId, end: NodeId) -> Result<PathLookup, OracleError> {
        (**self).find_path(start, end)
    }
}

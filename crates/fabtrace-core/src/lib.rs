//! Fabtrace core: coverage-guided, bias-mitigated random path sampling.
//!
//! The run loop repeatedly asks the [`Sampler`] for a structurally diverse
//! pair of PoC nodes, hands the pair to an external [`PathOracle`], folds any
//! discovered path into the [`CoverageLedger`] and [`PathRegistry`], and
//! terminates once the coverage target is met, the iteration budget runs out,
//! or sampling is provably exhausted.
//!
//! ## Module Organization
//!
//! - `bias`: per-toolset/equipment/utility/category usage counters and weights
//! - `sampler`: candidate pair selection with duplicate suppression
//! - `oracle`: the external shortest-path service boundary
//! - `coverage`: monotonic node/link coverage accounting
//! - `registry`: content-addressed path definitions
//! - `run`: the run loop state machine and its report

pub mod bias;
pub mod coverage;
pub mod oracle;
pub mod registry;
pub mod run;
pub mod sampler;

pub use bias::{BiasConfig, BiasTracker};
pub use coverage::{CoverageLedger, CoverageStats};
pub use oracle::{OracleError, PathFound, PathLookup, PathOracle};
pub use registry::{PathDefinition, PathRegistry};
pub use run::{
    AttemptOutcome, AttemptRecord, ReviewFlag, RunConfig, RunLoop, RunReport, RunStatus,
    SelectionErrorKind,
};
pub use sampler::{SampleOutcome, Sampler, Selection};

pub use fabtrace_catalog::{CatalogSnapshot, LinkId, NodeId};

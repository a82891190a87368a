//! Run loop: drives sampling attempts until the coverage target is reached,
//! the iteration budget is exhausted, or sampling is provably exhausted.
//!
//! State machine: `Initialized → Running → {Completed, Partial, Failed}`.
//! Every terminal report carries the attempts made, paths found, review
//! flags, and coverage achieved so far, whatever the terminal status.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fabtrace_catalog::{CatalogSnapshot, NodeId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bias::BiasConfig;
use crate::coverage::{CoverageLedger, CoverageStats};
use crate::oracle::{PathLookup, PathOracle};
use crate::registry::{PathDefinition, PathRegistry};
use crate::sampler::{SampleOutcome, Sampler, Selection};

/// Terminal and transient run states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Initialized,
    Running,
    /// Coverage target met.
    Completed,
    /// Budget or exhaustion stopped the run before the target.
    Partial,
    /// Unusable catalog or a fatal oracle failure.
    Failed,
}

/// Recoverable selection failures, logged and retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionErrorKind {
    NoToolsetAvailable,
    InsufficientEquipment,
    NoUsablePoc,
}

/// Outcome tag on one attempt log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttemptOutcome {
    Found { path_hash: String },
    NotFound,
    Duplicate,
    SelectionError(SelectionErrorKind),
}

/// One row of the per-run attempt log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub seq: u32,
    pub toolset: Option<String>,
    pub start_node: Option<NodeId>,
    pub end_node: Option<NodeId>,
    pub outcome: AttemptOutcome,
    pub picked_at: DateTime<Utc>,
    pub notes: Option<String>,
}

/// A pair the oracle could not connect, queued for manual review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewFlag {
    pub toolset: String,
    pub start_node: NodeId,
    pub end_node: NodeId,
    pub utility: Option<String>,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Configuration for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub run_id: Uuid,
    pub fab: String,
    /// Restrict sampling to one toolset code; `None` or `"ALL"` samples all.
    pub toolset: Option<String>,
    pub tag: String,
    pub coverage_target: f64,
    /// Hard cap on loop iterations, duplicate draws included.
    pub max_iterations: u32,
    /// Consecutive no-progress iterations tolerated once the bias tracker is
    /// exhausted.
    pub no_progress_limit: u32,
    /// Fixed RNG seed for reproducible draws.
    pub seed: Option<u64>,
    pub bias: BiasConfig,
}

impl RunConfig {
    pub fn new(fab: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            fab: fab.into(),
            toolset: None,
            tag: "default".to_owned(),
            coverage_target: 0.2,
            max_iterations: 10_000,
            no_progress_limit: 50,
            seed: None,
            bias: BiasConfig::default(),
        }
    }
}

/// Aggregated result of one run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub fab: String,
    pub tag: String,
    pub status: RunStatus,
    pub reason: String,
    pub iterations: u32,
    /// Attempts that reached the oracle.
    pub paths_attempted: u32,
    pub paths_found: u32,
    pub attempts: Vec<AttemptRecord>,
    pub review_flags: Vec<ReviewFlag>,
    /// Distinct path definitions, in creation order.
    pub paths: Vec<Arc<PathDefinition>>,
    pub coverage: CoverageStats,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl RunReport {
    pub fn unique_paths(&self) -> u32 {
        self.paths.len() as u32
    }

    pub fn duration_secs(&self) -> f64 {
        (self.ended_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

/// Sequential sampling loop over one catalog snapshot.
pub struct RunLoop<'a, O: PathOracle> {
    config: RunConfig,
    catalog: &'a CatalogSnapshot,
    oracle: O,
    ledger: CoverageLedger,
}

impl<'a, O: PathOracle> RunLoop<'a, O> {
    pub fn new(
        config: RunConfig,
        catalog: &'a CatalogSnapshot,
        oracle: O,
        ledger: CoverageLedger,
    ) -> Self {
        Self {
            config,
            catalog,
            oracle,
            ledger,
        }
    }

    /// Drive the run to a terminal state. Never panics, never loops forever:
    /// every iteration either makes progress, burns duplicate budget under
    /// the hard cap, or advances the exhaustion counter.
    pub fn execute(mut self) -> RunReport {
        let started_at = Utc::now();
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut review_flags: Vec<ReviewFlag> = Vec::new();
        let mut registry = PathRegistry::new();
        let mut paths_attempted: u32 = 0;
        let mut paths_found: u32 = 0;
        let mut iterations: u32 = 0;
        let mut no_progress: u32 = 0;

        tracing::info!(
            run_id = %self.config.run_id,
            fab = %self.config.fab,
            target = self.config.coverage_target,
            "run initialized"
        );

        if !self.catalog.has_usable_toolset() {
            tracing::warn!(fab = %self.config.fab, "no toolset with two active equipment");
            return self.finish(
                RunStatus::Failed,
                "insufficient equipment: no toolset owns two active equipment",
                started_at,
                iterations,
                paths_attempted,
                paths_found,
                attempts,
                review_flags,
                registry,
            );
        }

        let mut sampler = Sampler::new(self.catalog, self.config.bias.clone(), self.config.seed);
        let requested = self.config.toolset.clone();

        let (status, reason) = loop {
            if self.ledger.stats().percentage >= self.config.coverage_target {
                break (RunStatus::Completed, "coverage target reached".to_owned());
            }
            if iterations >= self.config.max_iterations {
                break (
                    RunStatus::Partial,
                    format!("iteration cap ({}) reached", self.config.max_iterations),
                );
            }
            iterations += 1;

            match sampler.sample(requested.as_deref()) {
                SampleOutcome::Selected(selection) => {
                    match self.oracle.find_path(selection.start.node_id, selection.end.node_id)
                    {
                        Ok(PathLookup::Found(path)) => {
                            paths_attempted += 1;
                            paths_found += 1;
                            let contribution = self.ledger.contribution(&path);
                            let (definition, _) = registry.register(
                                &path,
                                contribution,
                                selection.utilities.clone(),
                            );
                            let stats = self.ledger.commit(&path);
                            tracing::debug!(
                                hash = %definition.hash,
                                contribution,
                                coverage = stats.percentage,
                                "path committed"
                            );
                            attempts.push(attempt_row(
                                iterations,
                                &selection,
                                AttemptOutcome::Found {
                                    path_hash: definition.hash.clone(),
                                },
                                Some(format!(
                                    "path found with {} nodes, {} links",
                                    definition.node_count, definition.link_count
                                )),
                            ));
                            if contribution > 0.0 {
                                no_progress = 0;
                            } else {
                                no_progress += 1;
                            }
                        }
                        Ok(PathLookup::NotFound) => {
                            paths_attempted += 1;
                            no_progress += 1;
                            review_flags.push(ReviewFlag {
                                toolset: selection.toolset_code.clone(),
                                start_node: selection.start.node_id,
                                end_node: selection.end.node_id,
                                utility: selection.start.utility.clone(),
                                reason: "no path found between selected nodes".to_owned(),
                                created_at: Utc::now(),
                            });
                            attempts.push(attempt_row(
                                iterations,
                                &selection,
                                AttemptOutcome::NotFound,
                                Some(format!(
                                    "{} -> {}",
                                    selection.start.equipment_name, selection.end.equipment_name
                                )),
                            ));
                        }
                        Err(err) => {
                            tracing::error!(error = %err, "fatal oracle failure");
                            break (RunStatus::Failed, format!("oracle failure: {err}"));
                        }
                    }
                }
                SampleOutcome::DuplicatePair => {
                    // Bounded by the hard iteration cap; deliberately outside
                    // the no-progress exhaustion counter.
                    attempts.push(AttemptRecord {
                        seq: iterations,
                        toolset: None,
                        start_node: None,
                        end_node: None,
                        outcome: AttemptOutcome::Duplicate,
                        picked_at: Utc::now(),
                        notes: None,
                    });
                }
                other => {
                    let kind = selection_error_kind(&other);
                    tracing::debug!(?kind, "selection error, retrying");
                    no_progress += 1;
                    attempts.push(AttemptRecord {
                        seq: iterations,
                        toolset: requested.clone(),
                        start_node: None,
                        end_node: None,
                        outcome: AttemptOutcome::SelectionError(kind),
                        picked_at: Utc::now(),
                        notes: None,
                    });
                    if sampler.is_exhausted() && no_progress >= self.config.no_progress_limit {
                        break (
                            RunStatus::Partial,
                            "sampling exhausted with no remaining progress".to_owned(),
                        );
                    }
                }
            }
        };

        self.finish(
            status,
            &reason,
            started_at,
            iterations,
            paths_attempted,
            paths_found,
            attempts,
            review_flags,
            registry,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        self,
        status: RunStatus,
        reason: &str,
        started_at: DateTime<Utc>,
        iterations: u32,
        paths_attempted: u32,
        paths_found: u32,
        attempts: Vec<AttemptRecord>,
        review_flags: Vec<ReviewFlag>,
        registry: PathRegistry,
    ) -> RunReport {
        let coverage = self.ledger.stats();
        tracing::info!(
            run_id = %self.config.run_id,
            ?status,
            reason,
            iterations,
            paths_found,
            coverage = coverage.percentage,
            "run finished"
        );
        RunReport {
            run_id: self.config.run_id,
            fab: self.config.fab.clone(),
            tag: self.config.tag.clone(),
            status,
            reason: reason.to_owned(),
            iterations,
            paths_attempted,
            paths_found,
            attempts,
            review_flags,
            paths: registry.definitions(),
            coverage,
            started_at,
            ended_at: Utc::now(),
        }
    }
}

fn attempt_row(
    seq: u32,
    selection: &Selection,
    outcome: AttemptOutcome,
    notes: Option<String>,
) -> AttemptRecord {
    AttemptRecord {
        seq,
        toolset: Some(selection.toolset_code.clone()),
        start_node: Some(selection.start.node_id),
        end_node: Some(selection.end.node_id),
        outcome,
        picked_at: Utc::now(),
        notes,
    }
}

fn selection_error_kind(outcome: &SampleOutcome) -> SelectionErrorKind {
    match outcome {
        SampleOutcome::NoToolsetAvailable => SelectionErrorKind::NoToolsetAvailable,
        SampleOutcome::InsufficientEquipment => SelectionErrorKind::InsufficientEquipment,
        SampleOutcome::NoUsablePoc => SelectionErrorKind::NoUsablePoc,
        SampleOutcome::Selected(_) | SampleOutcome::DuplicatePair => {
            unreachable!("handled by the caller's match arms")
        }
    }
}

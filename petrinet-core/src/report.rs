//! Analysis facade: one report per net.

use crate::analysis::{
    check_invariant_in, is_deadlock_free_in, terminal_states_in, InvariantWeights,
};
use crate::definition::PetriNet;
use crate::dot::to_dot;
use crate::error::CoreError;
use crate::explorer::{ExplorerConfig, StateSpaceExplorer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What to include in an [`AnalysisReport`].
#[derive(Debug, Clone, Default)]
pub struct AnalyseOptions {
    /// Render the net under its initial marking as DOT.
    pub dot: bool,
    /// Weightings to check as linear invariants.
    pub invariants: Vec<InvariantWeights>,
    /// Exploration settings.
    pub explorer: ExplorerConfig,
}

impl AnalyseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dot(mut self) -> Self {
        self.dot = true;
        self
    }

    pub fn with_invariant(mut self, weights: InvariantWeights) -> Self {
        self.invariants.push(weights);
        self
    }

    pub fn with_explorer(mut self, explorer: ExplorerConfig) -> Self {
        self.explorer = explorer;
        self
    }
}

/// Outcome of one invariant check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvariantResult {
    pub weights: InvariantWeights,
    pub holds: bool,
}

/// Analysis results for a net.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub reachable_state_count: usize,
    pub terminal_states: Vec<BTreeMap<String, u64>>,
    pub is_deadlock_free: bool,
    pub invariants: Vec<InvariantResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dot: Option<String>,
}

/// Explores `net` once and derives every requested result from that single
/// reachable set. Any error aborts the whole report.
pub fn analyse(net: &PetriNet, options: &AnalyseOptions) -> Result<AnalysisReport, CoreError> {
    let set = StateSpaceExplorer::new(net)
        .with_config(options.explorer)
        .explore()?;

    let terminal = terminal_states_in(net, &set);
    let deadlock_free = is_deadlock_free_in(net, &set);

    let invariants = options
        .invariants
        .iter()
        .map(|weights| {
            Ok(InvariantResult {
                weights: weights.clone(),
                holds: check_invariant_in(net, &set, weights)?,
            })
        })
        .collect::<Result<Vec<_>, CoreError>>()?;

    Ok(AnalysisReport {
        reachable_state_count: set.len(),
        terminal_states: terminal.iter().map(|m| net.marking_to_map(m)).collect(),
        is_deadlock_free: deadlock_free,
        invariants,
        dot: options.dot.then(|| to_dot(net, None)),
    })
}

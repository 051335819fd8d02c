//! # petrinet-core
//!
//! Petri net engine for petrinet.
//!
//! This crate provides:
//! - Net definition parsing, validation and place interning
//! - The firing rule over immutable markings
//! - Breadth-first state-space exploration
//! - Terminal-state, deadlock and linear invariant analyses
//! - DOT export of a net under a marking
//! - Per-instance dispatch over a pluggable persistence adapter

pub mod analysis;
pub mod definition;
pub mod dispatch;
pub mod dot;
pub mod error;
pub mod explorer;
pub mod firing;
pub mod marking;
pub mod report;

pub use analysis::{
    check_invariant, enabled_transitions, is_deadlock_free, terminal_states, InvariantWeights,
};
pub use definition::{NetDefinitionRaw, PetriNet, PetriNetBuilder, PlaceId, Transition};
pub use dispatch::{Dispatcher, InstanceState, MemoryAdapter, PersistenceAdapter};
pub use dot::to_dot;
pub use error::CoreError;
pub use explorer::{reachable_states, ExplorerConfig, ReachableSet, StateSpaceExplorer};
pub use firing::{can_fire, fire};
pub use marking::Marking;
pub use report::{analyse, AnalyseOptions, AnalysisReport, InvariantResult};

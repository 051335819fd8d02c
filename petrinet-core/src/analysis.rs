//! Analyses over the reachable state space.
//!
//! The `*_in` variants work on an already explored [`ReachableSet`], so a
//! caller asking several questions about one net only explores it once.

use crate::definition::{PetriNet, PlaceId, Transition};
use crate::error::CoreError;
use crate::explorer::{reachable_states, ReachableSet};
use crate::firing::can_fire;
use crate::marking::Marking;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Returns the transitions enabled in `marking`, in declaration order.
pub fn enabled_transitions<'n>(net: &'n PetriNet, marking: &Marking) -> Vec<&'n Transition> {
    net.transitions()
        .iter()
        .filter(|t| can_fire(marking, t))
        .collect()
}

/// Returns true if no transition of `net` is enabled in `marking`.
pub fn is_terminal(net: &PetriNet, marking: &Marking) -> bool {
    !net.transitions().iter().any(|t| can_fire(marking, t))
}

/// Returns the reachable markings in which no transition is enabled.
pub fn terminal_states(net: &PetriNet) -> Result<Vec<Marking>, CoreError> {
    let set = reachable_states(net)?;
    Ok(terminal_states_in(net, &set))
}

pub fn terminal_states_in(net: &PetriNet, set: &ReachableSet) -> Vec<Marking> {
    set.iter()
        .filter(|m| is_terminal(net, m))
        .cloned()
        .collect()
}

/// Returns true iff no reachable marking is terminal.
///
/// Intended end states count as terminal too: a net that reaches a
/// "done" marking is reported as not deadlock-free.
pub fn is_deadlock_free(net: &PetriNet) -> Result<bool, CoreError> {
    let set = reachable_states(net)?;
    Ok(is_deadlock_free_in(net, &set))
}

pub fn is_deadlock_free_in(net: &PetriNet, set: &ReachableSet) -> bool {
    !set.iter().any(|m| is_terminal(net, m))
}

/// A partial weighting of places. Places without a weight count as 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvariantWeights(BTreeMap<String, i64>);

impl InvariantWeights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, place: impl Into<String>, weight: i64) -> Self {
        self.0.insert(place.into(), weight);
        self
    }

    pub fn weights(&self) -> &BTreeMap<String, i64> {
        &self.0
    }

    /// Resolves place names against `net`.
    fn resolve(&self, net: &PetriNet) -> Result<Vec<(PlaceId, i64)>, CoreError> {
        self.0
            .iter()
            .map(|(place, &weight)| {
                net.place_id(place)
                    .map(|id| (id, weight))
                    .ok_or_else(|| CoreError::UnknownPlace {
                        place: place.clone(),
                    })
            })
            .collect()
    }
}

impl<K: Into<String>> FromIterator<(K, i64)> for InvariantWeights {
    fn from_iter<I: IntoIterator<Item = (K, i64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, w)| (k.into(), w)).collect())
    }
}

/// Computes the weighted token sum exactly. Each term fits in `i128`; the
/// running total may not, which fails with [`CoreError::InvariantOverflow`].
fn weighted_sum(
    net: &PetriNet,
    weights: &[(PlaceId, i64)],
    marking: &Marking,
) -> Result<i128, CoreError> {
    weights.iter().try_fold(0i128, |sum, &(place, weight)| {
        (weight as i128)
            .checked_mul(marking.tokens(place) as i128)
            .and_then(|term| sum.checked_add(term))
            .ok_or_else(|| CoreError::InvariantOverflow {
                place: net.place_name(place).unwrap_or_default().to_string(),
            })
    })
}

/// Checks that the weighted token sum is identical in every reachable
/// marking.
pub fn check_invariant(net: &PetriNet, weights: &InvariantWeights) -> Result<bool, CoreError> {
    let set = reachable_states(net)?;
    check_invariant_in(net, &set, weights)
}

pub fn check_invariant_in(
    net: &PetriNet,
    set: &ReachableSet,
    weights: &InvariantWeights,
) -> Result<bool, CoreError> {
    let resolved = weights.resolve(net)?;
    let initial = set.initial().ok_or(CoreError::EmptyStateSpace)?;

    let expected = weighted_sum(net, &resolved, initial)?;
    for marking in set {
        if weighted_sum(net, &resolved, marking)? != expected {
            return Ok(false);
        }
    }
    Ok(true)
}

//! The firing rule.

use crate::definition::{PetriNet, Transition};
use crate::error::CoreError;
use crate::marking::Marking;

/// Returns true if every input place holds at least as many tokens as it
/// occurs in the transition's input list.
pub fn can_fire(marking: &Marking, transition: &Transition) -> bool {
    marking.len() >= transition.span()
        && transition
            .consume()
            .iter()
            .all(|arc| marking.tokens(arc.place) >= arc.weight)
}

/// Fires `transition` against `marking`, returning the successor marking.
///
/// The argument is left untouched. Fails with [`CoreError::Unfireable`] when
/// the transition is not enabled.
pub fn fire(marking: &Marking, transition: &Transition) -> Result<Marking, CoreError> {
    if marking.len() < transition.span() {
        return Err(CoreError::MarkingMismatch {
            expected: transition.span(),
            actual: marking.len(),
        });
    }
    if !can_fire(marking, transition) {
        return Err(CoreError::Unfireable {
            transition: transition.name().to_string(),
        });
    }

    let mut counts = marking.counts().to_vec();
    for arc in transition.consume() {
        counts[arc.place.index()] -= arc.weight;
    }
    for arc in transition.produce() {
        let slot = &mut counts[arc.place.index()];
        *slot = slot
            .checked_add(arc.weight)
            .ok_or_else(|| CoreError::TokenOverflow {
                place: arc.place_name.clone(),
            })?;
    }

    Ok(Marking::from_counts(counts))
}

impl PetriNet {
    /// Like [`can_fire`], but false for a marking of a different net size.
    pub fn can_fire(&self, marking: &Marking, transition: &Transition) -> bool {
        marking.len() == self.place_count() && can_fire(marking, transition)
    }

    /// Like [`fire`], but rejects a marking that does not cover exactly this
    /// net's places.
    pub fn fire(&self, marking: &Marking, transition: &Transition) -> Result<Marking, CoreError> {
        if marking.len() != self.place_count() {
            return Err(CoreError::MarkingMismatch {
                expected: self.place_count(),
                actual: marking.len(),
            });
        }
        fire(marking, transition)
    }
}

//! Breadth-first state-space exploration.
//!
//! Starting from the initial marking, every enabled transition is fired on
//! every newly discovered marking until no new marking appears. Markings are
//! deduplicated structurally when they are enqueued, so the frontier never
//! holds two equal markings.
//!
//! Exploration only terminates when the reachable set is finite. An opt-in
//! cap ([`ExplorerConfig::max_states`]) turns an unbounded net into a
//! [`CoreError::StateSpaceTooLarge`] instead of unbounded memory growth.

use crate::definition::PetriNet;
use crate::error::CoreError;
use crate::firing::{can_fire, fire};
use crate::marking::Marking;
use std::collections::{HashMap, VecDeque};

/// Exploration configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExplorerConfig {
    /// Maximum number of distinct markings to materialize (None = unbounded).
    pub max_states: Option<usize>,
}

impl ExplorerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the state cap. Zero means unbounded.
    pub fn with_max_states(mut self, max_states: usize) -> Self {
        self.max_states = (max_states > 0).then_some(max_states);
        self
    }
}

/// How a marking was first discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Discovery {
    parent: usize,
    transition: usize,
}

/// The complete set of markings reachable from a net's initial marking.
///
/// Iteration yields markings in breadth-first discovery order, initial
/// marking first. Callers should treat the contents as a set.
#[derive(Debug, Clone, Default)]
pub struct ReachableSet {
    markings: Vec<Marking>,
    discovered_by: Vec<Option<Discovery>>,
    index: HashMap<Marking, usize>,
    edge_count: usize,
}

impl ReachableSet {
    /// Returns the number of distinct reachable markings.
    pub fn len(&self) -> usize {
        self.markings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markings.is_empty()
    }

    /// Returns the initial marking, if the set is non-empty.
    pub fn initial(&self) -> Option<&Marking> {
        self.markings.first()
    }

    pub fn markings(&self) -> &[Marking] {
        &self.markings
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Marking> {
        self.markings.iter()
    }

    pub fn contains(&self, marking: &Marking) -> bool {
        self.index.contains_key(marking)
    }

    /// Number of firings evaluated during exploration (edges of the
    /// reachability graph, including those leading to known markings).
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Returns the transition indices of a shortest firing sequence from the
    /// initial marking to `marking`, or None if it is not in the set.
    pub fn trace(&self, marking: &Marking) -> Option<Vec<usize>> {
        let mut current = *self.index.get(marking)?;
        let mut steps = Vec::new();
        while let Some(step) = self.discovered_by[current] {
            steps.push(step.transition);
            current = step.parent;
        }
        steps.reverse();
        Some(steps)
    }

    /// Like [`ReachableSet::trace`], resolving transition names on `net`.
    pub fn trace_names<'n>(&self, net: &'n PetriNet, marking: &Marking) -> Option<Vec<&'n str>> {
        self.trace(marking).map(|steps| {
            steps
                .into_iter()
                .map(|i| net.transitions()[i].name())
                .collect()
        })
    }
}

impl<'a> IntoIterator for &'a ReachableSet {
    type Item = &'a Marking;
    type IntoIter = std::slice::Iter<'a, Marking>;

    fn into_iter(self) -> Self::IntoIter {
        self.markings.iter()
    }
}

/// Explicit-state breadth-first explorer over one net.
pub struct StateSpaceExplorer<'a> {
    net: &'a PetriNet,
    config: ExplorerConfig,
}

impl<'a> StateSpaceExplorer<'a> {
    pub fn new(net: &'a PetriNet) -> Self {
        Self {
            net,
            config: ExplorerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ExplorerConfig) -> Self {
        self.config = config;
        self
    }

    /// Enumerates every marking reachable from the initial marking.
    pub fn explore(&self) -> Result<ReachableSet, CoreError> {
        let net = self.net;
        let initial = net.initial_marking().clone();

        tracing::debug!(
            "Exploring state space: {} places, {} transitions, cap {:?}",
            net.place_count(),
            net.transitions().len(),
            self.config.max_states
        );

        if self.config.max_states == Some(0) {
            return Err(CoreError::StateSpaceTooLarge { limit: 0 });
        }

        let mut set = ReachableSet::default();
        set.index.insert(initial.clone(), 0);
        set.markings.push(initial);
        set.discovered_by.push(None);

        let mut emitted = vec![false];
        let mut frontier = VecDeque::from([0usize]);

        while let Some(id) = frontier.pop_front() {
            if emitted[id] {
                continue;
            }
            emitted[id] = true;

            let current = set.markings[id].clone();

            for (t_idx, transition) in net.transitions().iter().enumerate() {
                if !can_fire(&current, transition) {
                    continue;
                }

                let next = fire(&current, transition)?;
                set.edge_count += 1;

                if set.index.contains_key(&next) {
                    continue;
                }

                if let Some(limit) = self.config.max_states {
                    if set.markings.len() >= limit {
                        tracing::debug!("Exploration aborted at {} states", limit);
                        return Err(CoreError::StateSpaceTooLarge { limit });
                    }
                }

                let next_id = set.markings.len();
                tracing::trace!(
                    "Discovered state {} via {}: {:?}",
                    next_id,
                    transition.name(),
                    next
                );
                set.index.insert(next.clone(), next_id);
                set.markings.push(next);
                set.discovered_by.push(Some(Discovery {
                    parent: id,
                    transition: t_idx,
                }));
                emitted.push(false);
                frontier.push_back(next_id);
            }
        }

        tracing::debug!(
            "Exploration complete: {} states, {} edges",
            set.len(),
            set.edge_count
        );

        Ok(set)
    }
}

/// Explores `net` with the default (unbounded) configuration.
pub fn reachable_states(net: &PetriNet) -> Result<ReachableSet, CoreError> {
    StateSpaceExplorer::new(net).explore()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn coffee_net() -> PetriNet {
        PetriNet::builder()
            .place("waterCold", 1)
            .place("waterHot", 0)
            .place("beansWhole", 1)
            .place("beansGround", 0)
            .place("cupEmpty", 1)
            .place("coffeeReady", 0)
            .transition("heatWater", ["waterCold"], ["waterHot"])
            .transition("grindBeans", ["beansWhole"], ["beansGround"])
            .transition(
                "pourOver",
                ["waterHot", "beansGround", "cupEmpty"],
                ["coffeeReady"],
            )
            .build()
            .unwrap()
    }

    fn unbounded_net() -> PetriNet {
        PetriNet::builder()
            .place("source", 1)
            .place("sink", 0)
            .transition("produce", ["source"], ["source", "sink"])
            .build()
            .unwrap()
    }

    #[test]
    fn test_coffee_reachable_count() {
        let set = reachable_states(&coffee_net()).unwrap();
        assert_eq!(set.len(), 5);
    }

    #[test]
    fn test_includes_initial_marking() {
        let net = coffee_net();
        let set = reachable_states(&net).unwrap();
        assert!(set.contains(net.initial_marking()));
        assert_eq!(set.initial(), Some(net.initial_marking()));
    }

    #[test]
    fn test_no_duplicates() {
        let set = reachable_states(&coffee_net()).unwrap();
        let unique: HashSet<_> = set.iter().collect();
        assert_eq!(unique.len(), set.len());
    }

    #[test]
    fn test_idempotent() {
        let net = coffee_net();
        let first = reachable_states(&net).unwrap();
        let second = reachable_states(&net).unwrap();

        assert_eq!(first.len(), second.len());
        for m in &first {
            assert!(second.contains(m));
        }
    }

    #[test]
    fn test_net_without_transitions() {
        let net = PetriNet::builder().place("idle", 3).build().unwrap();
        let set = reachable_states(&net).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.edge_count(), 0);
    }

    #[test]
    fn test_cyclic_net_terminates() {
        let net = PetriNet::builder()
            .place("a", 1)
            .place("b", 0)
            .transition("forward", ["a"], ["b"])
            .transition("back", ["b"], ["a"])
            .build()
            .unwrap();

        let set = reachable_states(&net).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.edge_count(), 2);
    }

    #[test]
    fn test_state_cap() {
        let net = coffee_net();

        let capped = StateSpaceExplorer::new(&net)
            .with_config(ExplorerConfig::new().with_max_states(4))
            .explore();
        assert!(matches!(
            capped,
            Err(CoreError::StateSpaceTooLarge { limit: 4 })
        ));

        let exact = StateSpaceExplorer::new(&net)
            .with_config(ExplorerConfig::new().with_max_states(5))
            .explore()
            .unwrap();
        assert_eq!(exact.len(), 5);
    }

    #[test]
    fn test_state_cap_stops_unbounded_net() {
        let net = unbounded_net();
        let result = StateSpaceExplorer::new(&net)
            .with_config(ExplorerConfig::new().with_max_states(100))
            .explore();
        assert!(matches!(
            result,
            Err(CoreError::StateSpaceTooLarge { limit: 100 })
        ));
    }

    #[test]
    fn test_zero_cap_means_unbounded() {
        assert_eq!(ExplorerConfig::new().with_max_states(0).max_states, None);
    }

    #[test]
    fn test_trace_reaches_marking() {
        let net = coffee_net();
        let set = reachable_states(&net).unwrap();

        assert_eq!(set.trace(net.initial_marking()), Some(vec![]));

        for m in &set {
            let steps = set.trace(m).unwrap();
            let mut current = net.initial_marking().clone();
            for step in steps {
                current = fire(&current, &net.transitions()[step]).unwrap();
            }
            assert_eq!(&current, m);
        }

        let done = set
            .iter()
            .find(|m| m.tokens(net.place_id("coffeeReady").unwrap()) == 1)
            .unwrap();
        assert_eq!(
            set.trace_names(&net, done).unwrap(),
            vec!["heatWater", "grindBeans", "pourOver"]
        );
    }

    #[test]
    fn test_trace_unknown_marking() {
        let net = coffee_net();
        let set = reachable_states(&net).unwrap();
        assert!(set.trace(&Marking::from_counts(vec![9; 6])).is_none());
    }

    /// Independent bounded forward simulation: every marking reachable
    /// within `depth` firings.
    fn forward_closure(net: &PetriNet, depth: usize) -> HashSet<Marking> {
        let mut seen = HashSet::from([net.initial_marking().clone()]);
        let mut layer = vec![net.initial_marking().clone()];
        for _ in 0..depth {
            let mut next_layer = Vec::new();
            for m in &layer {
                for t in net.transitions() {
                    if let Ok(next) = fire(m, t) {
                        if seen.insert(next.clone()) {
                            next_layer.push(next);
                        }
                    }
                }
            }
            layer = next_layer;
        }
        seen
    }

    proptest! {
        #[test]
        fn prop_reachable_set_matches_forward_simulation(
            ring in 2usize..5,
            tokens in 1u64..4,
        ) {
            // Token ring: place i hands one token to place i+1
            let mut builder = PetriNet::builder();
            for i in 0..ring {
                builder = builder.place(format!("p{}", i), if i == 0 { tokens } else { 0 });
            }
            for i in 0..ring {
                builder = builder.transition(
                    format!("move{}", i),
                    [format!("p{}", i)],
                    [format!("p{}", (i + 1) % ring)],
                );
            }
            let net = builder.build().unwrap();

            let set = reachable_states(&net).unwrap();
            // Depth bound: no marking needs more firings than this to reach
            let closure = forward_closure(&net, ring * tokens as usize * ring);

            prop_assert_eq!(set.len(), closure.len());
            for m in &set {
                prop_assert!(closure.contains(m));
            }
        }
    }
}

//! Per-instance dispatch.
//!
//! A [`Dispatcher`] keeps one marking per named instance of a net and
//! advances it one transition at a time. Markings live behind a
//! [`PersistenceAdapter`]; every advance is an atomic load, check, fire and
//! save for its instance id.

use crate::definition::PetriNet;
use crate::error::CoreError;
use crate::marking::Marking;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Persisted state of one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceState {
    /// Current marking by place name.
    pub marking: BTreeMap<String, u64>,

    /// Caller-supplied version tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Checksum of the net the instance was created against.
    #[serde(default)]
    pub net_checksum: String,

    /// Number of transitions fired since creation.
    #[serde(default)]
    pub transitions_fired: u64,

    /// Creation timestamp (Unix millis).
    #[serde(default)]
    pub created_at: i64,

    /// Last update timestamp (Unix millis).
    #[serde(default)]
    pub updated_at: i64,
}

impl InstanceState {
    /// Creates a fresh state at `net`'s initial marking.
    pub fn new(net: &PetriNet, version: Option<String>) -> Self {
        let now = now_millis();
        Self {
            marking: net.marking_to_map(net.initial_marking()),
            version,
            net_checksum: net.checksum().to_string(),
            transitions_fired: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Records a fired transition.
    fn advance(&mut self, marking: BTreeMap<String, u64>) {
        self.marking = marking;
        self.transitions_fired += 1;
        self.updated_at = now_millis();
    }
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Storage backend for instance states.
///
/// Implementations serialize [`PersistenceAdapter::update`] per instance id
/// across every handle to the same store, so that concurrent advances of
/// one instance never overwrite each other.
pub trait PersistenceAdapter: Send + Sync {
    /// Loads an instance. Fails with [`CoreError::InstanceNotFound`] if absent.
    fn load(&self, instance_id: &str) -> Result<InstanceState, CoreError>;

    /// Stores an instance, overwriting any previous state.
    fn save(&self, instance_id: &str, state: &InstanceState) -> Result<(), CoreError>;

    /// Atomically loads an instance, applies `apply` to it and stores the
    /// result, returning the stored state. Nothing is written when `apply`
    /// fails. Fails with [`CoreError::InstanceNotFound`] if absent.
    fn update(
        &self,
        instance_id: &str,
        apply: &mut dyn FnMut(&mut InstanceState) -> Result<(), CoreError>,
    ) -> Result<InstanceState, CoreError>;
}

impl<T: PersistenceAdapter + ?Sized> PersistenceAdapter for Arc<T> {
    fn load(&self, instance_id: &str) -> Result<InstanceState, CoreError> {
        (**self).load(instance_id)
    }

    fn save(&self, instance_id: &str, state: &InstanceState) -> Result<(), CoreError> {
        (**self).save(instance_id, state)
    }

    fn update(
        &self,
        instance_id: &str,
        apply: &mut dyn FnMut(&mut InstanceState) -> Result<(), CoreError>,
    ) -> Result<InstanceState, CoreError> {
        (**self).update(instance_id, apply)
    }
}

impl<T: PersistenceAdapter + ?Sized> PersistenceAdapter for Box<T> {
    fn load(&self, instance_id: &str) -> Result<InstanceState, CoreError> {
        (**self).load(instance_id)
    }

    fn save(&self, instance_id: &str, state: &InstanceState) -> Result<(), CoreError> {
        (**self).save(instance_id, state)
    }

    fn update(
        &self,
        instance_id: &str,
        apply: &mut dyn FnMut(&mut InstanceState) -> Result<(), CoreError>,
    ) -> Result<InstanceState, CoreError> {
        (**self).update(instance_id, apply)
    }
}

/// In-memory adapter. Each adapter owns its own store.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    store: DashMap<String, InstanceState>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored instances.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Returns all stored instance ids, sorted.
    pub fn instance_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.store.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

impl PersistenceAdapter for MemoryAdapter {
    fn load(&self, instance_id: &str) -> Result<InstanceState, CoreError> {
        self.store
            .get(instance_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CoreError::InstanceNotFound {
                instance_id: instance_id.to_string(),
            })
    }

    fn save(&self, instance_id: &str, state: &InstanceState) -> Result<(), CoreError> {
        self.store.insert(instance_id.to_string(), state.clone());
        Ok(())
    }

    fn update(
        &self,
        instance_id: &str,
        apply: &mut dyn FnMut(&mut InstanceState) -> Result<(), CoreError>,
    ) -> Result<InstanceState, CoreError> {
        // The shard write lock is held until the entry guard drops
        let mut entry =
            self.store
                .get_mut(instance_id)
                .ok_or_else(|| CoreError::InstanceNotFound {
                    instance_id: instance_id.to_string(),
                })?;

        let mut next = entry.value().clone();
        apply(&mut next)?;
        *entry.value_mut() = next.clone();
        Ok(next)
    }
}

/// Advances named instances of one net.
///
/// A dispatcher holds no per-instance state of its own; any number of
/// dispatchers may share one adapter.
pub struct Dispatcher<A> {
    net: Arc<PetriNet>,
    adapter: A,
}

impl<A: PersistenceAdapter> Dispatcher<A> {
    pub fn new(net: impl Into<Arc<PetriNet>>, adapter: A) -> Self {
        Self {
            net: net.into(),
            adapter,
        }
    }

    pub fn net(&self) -> &PetriNet {
        &self.net
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Creates (or resets) an instance at the net's initial marking.
    pub fn create(&self, instance_id: &str, version: Option<&str>) -> Result<Marking, CoreError> {
        let state = InstanceState::new(&self.net, version.map(str::to_string));
        self.adapter.save(instance_id, &state)?;

        tracing::debug!(
            "Created instance {} (version: {:?}, net: {})",
            instance_id,
            version,
            self.net.checksum()
        );

        Ok(self.net.initial_marking().clone())
    }

    /// Fires the named transition on an instance and persists the result.
    pub fn dispatch(&self, instance_id: &str, transition_name: &str) -> Result<Marking, CoreError> {
        let net = &self.net;
        let state = self.adapter.update(instance_id, &mut |state: &mut InstanceState| {
            let transition =
                net.transition(transition_name)
                    .ok_or_else(|| CoreError::UnknownTransition {
                        transition: transition_name.to_string(),
                    })?;

            let current = self.marking_of(instance_id, state)?;
            if !net.can_fire(&current, transition) {
                return Err(CoreError::Unfireable {
                    transition: transition_name.to_string(),
                });
            }

            let next = net.fire(&current, transition)?;
            state.advance(net.marking_to_map(&next));
            Ok(())
        })?;

        tracing::debug!(
            "Instance {} fired {} ({} total)",
            instance_id,
            transition_name,
            state.transitions_fired
        );

        net.marking_from_map(&state.marking)
    }

    /// Returns the persisted state of an instance.
    pub fn inspect(&self, instance_id: &str) -> Result<InstanceState, CoreError> {
        self.adapter.load(instance_id)
    }

    /// Returns the current marking of an instance.
    pub fn marking(&self, instance_id: &str) -> Result<Marking, CoreError> {
        let state = self.adapter.load(instance_id)?;
        self.marking_of(instance_id, &state)
    }

    /// Returns the names of transitions enabled for an instance, in
    /// declaration order.
    pub fn enabled(&self, instance_id: &str) -> Result<Vec<String>, CoreError> {
        let current = self.marking(instance_id)?;
        Ok(self
            .net
            .transitions()
            .iter()
            .filter(|t| self.net.can_fire(&current, t))
            .map(|t| t.name().to_string())
            .collect())
    }

    fn marking_of(&self, instance_id: &str, state: &InstanceState) -> Result<Marking, CoreError> {
        if !state.net_checksum.is_empty() && state.net_checksum != self.net.checksum() {
            tracing::warn!(
                "Instance {} was created against net {}, dispatching against {}",
                instance_id,
                state.net_checksum,
                self.net.checksum()
            );
        }
        self.net.marking_from_map(&state.marking)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    fn job_net() -> PetriNet {
        PetriNet::builder()
            .place("idle", 1)
            .place("running", 0)
            .place("done", 0)
            .transition("start", ["idle"], ["running"])
            .transition("finish", ["running"], ["done"])
            .build()
            .unwrap()
    }

    fn pool_net() -> PetriNet {
        PetriNet::builder()
            .place("pool", 2)
            .place("taken", 0)
            .transition("take", ["pool"], ["taken"])
            .build()
            .unwrap()
    }

    fn dispatcher() -> Dispatcher<MemoryAdapter> {
        Dispatcher::new(job_net(), MemoryAdapter::new())
    }

    fn counts(net: &PetriNet, marking: &Marking) -> (u64, u64, u64) {
        let map = net.marking_to_map(marking);
        (map["idle"], map["running"], map["done"])
    }

    #[test]
    fn test_create_instance() {
        let d = dispatcher();
        let marking = d.create("inst-1", None).unwrap();
        assert_eq!(counts(d.net(), &marking), (1, 0, 0));
        assert_eq!(d.adapter().len(), 1);
    }

    #[test]
    fn test_dispatch_transition() {
        let d = dispatcher();
        d.create("inst-1", None).unwrap();

        let marking = d.dispatch("inst-1", "start").unwrap();
        assert_eq!(counts(d.net(), &marking), (0, 1, 0));
    }

    #[test]
    fn test_chained_dispatches() {
        let d = dispatcher();
        d.create("inst-1", None).unwrap();
        d.dispatch("inst-1", "start").unwrap();

        let marking = d.dispatch("inst-1", "finish").unwrap();
        assert_eq!(counts(d.net(), &marking), (0, 0, 1));
        assert_eq!(d.inspect("inst-1").unwrap().transitions_fired, 2);
    }

    #[test]
    fn test_inspect_returns_state() {
        let d = dispatcher();
        d.create("inst-1", Some("v1")).unwrap();
        d.dispatch("inst-1", "start").unwrap();

        let state = d.inspect("inst-1").unwrap();
        assert_eq!(state.marking["idle"], 0);
        assert_eq!(state.marking["running"], 1);
        assert_eq!(state.version.as_deref(), Some("v1"));
        assert_eq!(state.net_checksum, d.net().checksum());
    }

    #[test]
    fn test_unknown_transition() {
        let d = dispatcher();
        d.create("inst-1", None).unwrap();

        let err = d.dispatch("inst-1", "nope").unwrap_err();
        assert!(matches!(err, CoreError::UnknownTransition { .. }));
        assert_eq!(err.to_string(), "unknown transition: nope");
    }

    #[test]
    fn test_disabled_transition() {
        let d = dispatcher();
        d.create("inst-1", None).unwrap();

        let err = d.dispatch("inst-1", "finish").unwrap_err();
        assert!(matches!(err, CoreError::Unfireable { .. }));
        assert_eq!(err.to_string(), "cannot fire transition: finish");

        // Rejected dispatch leaves the instance untouched
        assert_eq!(d.inspect("inst-1").unwrap().transitions_fired, 0);
    }

    #[test]
    fn test_unknown_instance() {
        let d = dispatcher();
        assert!(matches!(
            d.inspect("ghost"),
            Err(CoreError::InstanceNotFound { .. })
        ));
        assert!(matches!(
            d.dispatch("ghost", "start"),
            Err(CoreError::InstanceNotFound { .. })
        ));
    }

    #[test]
    fn test_missed_dispatch_leaves_no_trace() {
        let d = dispatcher();
        for i in 0..100 {
            let id = format!("ghost-{}", i);
            assert!(d.dispatch(&id, "start").is_err());
            assert!(d.dispatch(&id, "nope").is_err());
        }
        assert!(d.adapter().is_empty());
    }

    #[test]
    fn test_failed_update_writes_nothing() {
        let adapter = MemoryAdapter::new();
        let state = InstanceState::new(&job_net(), None);
        adapter.save("inst-1", &state).unwrap();

        let err = adapter
            .update("inst-1", &mut |s: &mut InstanceState| {
                s.transitions_fired = 99;
                Err(CoreError::Unfireable {
                    transition: "start".to_string(),
                })
            })
            .unwrap_err();

        assert!(matches!(err, CoreError::Unfireable { .. }));
        assert_eq!(adapter.load("inst-1").unwrap(), state);
    }

    #[test]
    fn test_enabled_transitions() {
        let d = dispatcher();
        d.create("inst-1", None).unwrap();
        assert_eq!(d.enabled("inst-1").unwrap(), vec!["start"]);

        d.dispatch("inst-1", "start").unwrap();
        assert_eq!(d.enabled("inst-1").unwrap(), vec!["finish"]);

        d.dispatch("inst-1", "finish").unwrap();
        assert!(d.enabled("inst-1").unwrap().is_empty());
    }

    #[test]
    fn test_adapters_are_isolated() {
        let a = dispatcher();
        let b = dispatcher();
        a.create("inst-1", None).unwrap();

        assert!(a.inspect("inst-1").is_ok());
        assert!(matches!(
            b.inspect("inst-1"),
            Err(CoreError::InstanceNotFound { .. })
        ));
    }

    #[test]
    fn test_concurrent_dispatch_single_winner() {
        let d = Arc::new(dispatcher());
        d.create("inst-1", None).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let d = d.clone();
                thread::spawn(move || d.dispatch("inst-1", "start").is_ok())
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count();

        assert_eq!(wins, 1);
        let state = d.inspect("inst-1").unwrap();
        assert_eq!(state.marking["running"], 1);
        assert_eq!(state.transitions_fired, 1);
    }

    #[test]
    fn test_shared_adapter() {
        let adapter = Arc::new(MemoryAdapter::new());
        let d1 = Dispatcher::new(job_net(), adapter.clone());
        let d2 = Dispatcher::new(job_net(), adapter.clone());

        d1.create("inst-1", None).unwrap();
        d2.dispatch("inst-1", "start").unwrap();

        assert_eq!(d1.inspect("inst-1").unwrap().marking["running"], 1);
        assert_eq!(adapter.instance_ids(), vec!["inst-1"]);
    }

    #[test]
    fn test_dispatchers_sharing_adapter_serialize() {
        // Two dispatchers, one store: both take from a pool of two
        for _ in 0..200 {
            let adapter = Arc::new(MemoryAdapter::new());
            let d1 = Arc::new(Dispatcher::new(pool_net(), adapter.clone()));
            let d2 = Arc::new(Dispatcher::new(pool_net(), adapter.clone()));
            d1.create("inst-1", None).unwrap();

            let barrier = Arc::new(Barrier::new(2));
            let handles: Vec<_> = [d1, d2]
                .into_iter()
                .map(|d| {
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        d.dispatch("inst-1", "take").is_ok()
                    })
                })
                .collect();

            for h in handles {
                assert!(h.join().unwrap());
            }

            let state = adapter.load("inst-1").unwrap();
            assert_eq!(state.marking["pool"], 0);
            assert_eq!(state.marking["taken"], 2);
            assert_eq!(state.transitions_fired, 2);
        }
    }

    #[test]
    fn test_dispatchers_sharing_adapter_single_winner() {
        let adapter = Arc::new(MemoryAdapter::new());
        let dispatchers: Vec<_> = (0..8)
            .map(|_| Arc::new(Dispatcher::new(job_net(), adapter.clone())))
            .collect();
        dispatchers[0].create("inst-1", None).unwrap();

        let barrier = Arc::new(Barrier::new(dispatchers.len()));
        let handles: Vec<_> = dispatchers
            .into_iter()
            .map(|d| {
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    d.dispatch("inst-1", "start").is_ok()
                })
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&won| won)
            .count();

        assert_eq!(wins, 1);
        assert_eq!(adapter.load("inst-1").unwrap().transitions_fired, 1);
    }

    #[test]
    fn test_state_serde_roundtrip() {
        let state = InstanceState::new(&job_net(), Some("v2".to_string()));
        let json = serde_json::to_string(&state).unwrap();
        let parsed: InstanceState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, state);
    }
}

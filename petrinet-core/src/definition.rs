//! Petri net definition types.
//!
//! Nets use a JSON (or YAML) DSL:
//!
//! ```json
//! {
//!   "transitions": [
//!     {"name": "heatWater", "inputs": ["waterCold"], "outputs": ["waterHot"]},
//!     {"name": "grindBeans", "inputs": "beansWhole", "outputs": "beansGround"},
//!     {"name": "pourOver", "inputs": ["waterHot", "beansGround", "cupEmpty"], "outputs": ["coffeeReady"]}
//!   ],
//!   "initial_marking": {
//!     "waterCold": 1, "waterHot": 0, "beansWhole": 1,
//!     "beansGround": 0, "cupEmpty": 1, "coffeeReady": 0
//!   }
//! }
//! ```
//!
//! The keys of `initial_marking` are the net's complete place alphabet. A
//! place listed twice in `inputs` (or `outputs`) is a weighted arc.

use crate::error::CoreError;
use crate::marking::Marking;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Dense index of a place within one net.
///
/// Ids follow the sorted order of place names, so two nets with the same
/// alphabet agree on every id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlaceId(usize);

impl PlaceId {
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for PlaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// A transition as stored/transmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRaw {
    /// Name, unique within the net.
    pub name: String,

    /// Input places. Can be a single place or a list.
    #[serde(default, deserialize_with = "deserialize_places")]
    pub inputs: Vec<String>,

    /// Output places. Can be a single place or a list.
    #[serde(default, deserialize_with = "deserialize_places")]
    pub outputs: Vec<String>,
}

fn deserialize_places<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct PlacesVisitor;

    impl<'de> Visitor<'de> for PlacesVisitor {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a place name or array of place names")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(vec![v.to_string()])
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: de::SeqAccess<'de>,
        {
            let mut places = Vec::new();
            while let Some(p) = seq.next_element::<String>()? {
                places.push(p);
            }
            Ok(places)
        }
    }

    deserializer.deserialize_any(PlacesVisitor)
}

/// Raw net definition as stored/transmitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetDefinitionRaw {
    /// Transitions in declaration order.
    pub transitions: Vec<TransitionRaw>,

    /// Initial marking. Its keys define the place alphabet.
    #[serde(alias = "initialMarking")]
    pub initial_marking: BTreeMap<String, u64>,
}

/// One arc group of a transition: a place and how many times it occurs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightedArc {
    pub place: PlaceId,
    pub place_name: String,
    pub weight: u64,
}

/// A validated transition with its arcs resolved to place ids.
#[derive(Debug, Clone)]
pub struct Transition {
    name: String,
    inputs: Vec<PlaceId>,
    outputs: Vec<PlaceId>,
    consume: Vec<WeightedArc>,
    produce: Vec<WeightedArc>,
    span: usize,
}

impl Transition {
    fn resolve(raw: &TransitionRaw, places: &HashMap<String, PlaceId>) -> Result<Self, CoreError> {
        let lookup = |place: &String, role: &str| {
            places
                .get(place)
                .copied()
                .ok_or_else(|| CoreError::InvalidDefinition {
                    reason: format!(
                        "transition '{}' {} place '{}' not in initial marking",
                        raw.name, role, place
                    ),
                })
        };

        let inputs = raw
            .inputs
            .iter()
            .map(|p| lookup(p, "input"))
            .collect::<Result<Vec<_>, _>>()?;
        let outputs = raw
            .outputs
            .iter()
            .map(|p| lookup(p, "output"))
            .collect::<Result<Vec<_>, _>>()?;

        let span = inputs
            .iter()
            .chain(outputs.iter())
            .map(|p| p.index() + 1)
            .max()
            .unwrap_or(0);

        Ok(Self {
            name: raw.name.clone(),
            consume: group_arcs(&inputs, &raw.inputs),
            produce: group_arcs(&outputs, &raw.outputs),
            inputs,
            outputs,
            span,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Input places in declaration order, duplicates included.
    pub fn inputs(&self) -> &[PlaceId] {
        &self.inputs
    }

    /// Output places in declaration order, duplicates included.
    pub fn outputs(&self) -> &[PlaceId] {
        &self.outputs
    }

    /// Input arcs with occurrence counts, ordered by place id.
    pub fn consume(&self) -> &[WeightedArc] {
        &self.consume
    }

    /// Output arcs with occurrence counts, ordered by place id.
    pub fn produce(&self) -> &[WeightedArc] {
        &self.produce
    }

    /// Minimum marking length this transition can be applied to.
    pub fn span(&self) -> usize {
        self.span
    }
}

fn group_arcs(ids: &[PlaceId], names: &[String]) -> Vec<WeightedArc> {
    let mut grouped: BTreeMap<PlaceId, WeightedArc> = BTreeMap::new();
    for (id, name) in ids.iter().zip(names) {
        grouped
            .entry(*id)
            .or_insert_with(|| WeightedArc {
                place: *id,
                place_name: name.clone(),
                weight: 0,
            })
            .weight += 1;
    }
    grouped.into_values().collect()
}

/// Validated and indexed Petri net.
#[derive(Debug, Clone)]
pub struct PetriNet {
    /// Place names indexed by place id.
    places: Vec<String>,

    place_index: HashMap<String, PlaceId>,

    /// Transitions in declaration order.
    transitions: Vec<Transition>,

    transition_index: HashMap<String, usize>,

    initial: Marking,

    /// Original raw definition for storage.
    raw: NetDefinitionRaw,

    /// Hash of the definition for integrity checks.
    checksum: String,
}

impl PetriNet {
    /// Starts a programmatic net definition.
    pub fn builder() -> PetriNetBuilder {
        PetriNetBuilder::default()
    }

    /// Parses and validates a net definition from a JSON value.
    pub fn from_json(json: &serde_json::Value) -> Result<Self, CoreError> {
        let raw: NetDefinitionRaw = serde_json::from_value(json.clone())?;
        Self::from_raw(raw)
    }

    /// Parses and validates a net definition from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, CoreError> {
        let raw: NetDefinitionRaw = serde_json::from_str(text)?;
        Self::from_raw(raw)
    }

    /// Parses and validates a net definition from YAML text.
    pub fn from_yaml_str(text: &str) -> Result<Self, CoreError> {
        let raw: NetDefinitionRaw = serde_yaml::from_str(text)?;
        Self::from_raw(raw)
    }

    /// Creates a net from raw parts.
    pub fn from_raw(raw: NetDefinitionRaw) -> Result<Self, CoreError> {
        // Intern places in name order
        let mut places = Vec::with_capacity(raw.initial_marking.len());
        let mut place_index = HashMap::with_capacity(raw.initial_marking.len());
        let mut counts = Vec::with_capacity(raw.initial_marking.len());
        for (name, &tokens) in &raw.initial_marking {
            if name.is_empty() {
                return Err(CoreError::InvalidDefinition {
                    reason: "place name must not be empty".to_string(),
                });
            }
            place_index.insert(name.clone(), PlaceId(places.len()));
            places.push(name.clone());
            counts.push(tokens);
        }

        // Build and validate transitions
        let mut transitions = Vec::with_capacity(raw.transitions.len());
        let mut transition_index = HashMap::with_capacity(raw.transitions.len());
        for t in &raw.transitions {
            if t.name.is_empty() {
                return Err(CoreError::InvalidDefinition {
                    reason: "transition name must not be empty".to_string(),
                });
            }
            if transition_index.contains_key(&t.name) {
                return Err(CoreError::InvalidDefinition {
                    reason: format!("duplicate transition '{}'", t.name),
                });
            }
            transition_index.insert(t.name.clone(), transitions.len());
            transitions.push(Transition::resolve(t, &place_index)?);
        }

        // Compute checksum
        let json_bytes = serde_json::to_vec(&raw)?;
        let checksum = format!("{:08x}", crc32c::crc32c(&json_bytes));

        Ok(Self {
            places,
            place_index,
            transitions,
            transition_index,
            initial: Marking::from_counts(counts),
            raw,
            checksum,
        })
    }

    /// Place names in place-id order.
    pub fn places(&self) -> &[String] {
        &self.places
    }

    pub fn place_count(&self) -> usize {
        self.places.len()
    }

    pub fn place_id(&self, name: &str) -> Option<PlaceId> {
        self.place_index.get(name).copied()
    }

    pub fn place_name(&self, id: PlaceId) -> Option<&str> {
        self.places.get(id.index()).map(String::as_str)
    }

    /// Transitions in declaration order.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Looks up a transition by name.
    pub fn transition(&self, name: &str) -> Option<&Transition> {
        self.transition_index(name).map(|i| &self.transitions[i])
    }

    /// Returns the declaration index of a transition.
    pub fn transition_index(&self, name: &str) -> Option<usize> {
        self.transition_index.get(name).copied()
    }

    pub fn initial_marking(&self) -> &Marking {
        &self.initial
    }

    /// Definition checksum (CRC32C of the canonical JSON form).
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// Returns the raw definition this net was built from.
    pub fn to_raw(&self) -> &NetDefinitionRaw {
        &self.raw
    }

    /// Returns the raw definition as JSON.
    pub fn to_json(&self) -> Result<serde_json::Value, CoreError> {
        Ok(serde_json::to_value(&self.raw)?)
    }

    /// Builds a marking from a place-name map covering every place.
    pub fn marking_from_map(&self, map: &BTreeMap<String, u64>) -> Result<Marking, CoreError> {
        if let Some(unknown) = map.keys().find(|p| !self.place_index.contains_key(*p)) {
            return Err(CoreError::UnknownPlace {
                place: unknown.clone(),
            });
        }

        let counts = self
            .places
            .iter()
            .map(|p| {
                map.get(p)
                    .copied()
                    .ok_or_else(|| CoreError::IncompleteMarking { place: p.clone() })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Marking::from_counts(counts))
    }

    /// Renders a marking as a place-name map.
    pub fn marking_to_map(&self, marking: &Marking) -> BTreeMap<String, u64> {
        self.places
            .iter()
            .enumerate()
            .map(|(i, p)| (p.clone(), marking.tokens(PlaceId(i))))
            .collect()
    }
}

/// Programmatic builder for [`PetriNet`].
#[derive(Debug, Clone, Default)]
pub struct PetriNetBuilder {
    raw: NetDefinitionRaw,
}

impl PetriNetBuilder {
    /// Declares a place with its initial token count.
    pub fn place(mut self, name: impl Into<String>, tokens: u64) -> Self {
        self.raw.initial_marking.insert(name.into(), tokens);
        self
    }

    /// Declares a transition.
    pub fn transition<I, O>(mut self, name: impl Into<String>, inputs: I, outputs: O) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        O: IntoIterator,
        O::Item: Into<String>,
    {
        self.raw.transitions.push(TransitionRaw {
            name: name.into(),
            inputs: inputs.into_iter().map(Into::into).collect(),
            outputs: outputs.into_iter().map(Into::into).collect(),
        });
        self
    }

    pub fn build(self) -> Result<PetriNet, CoreError> {
        PetriNet::from_raw(self.raw)
    }
}

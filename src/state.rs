//! State kept by the application between runs.
//!
//! Every [`App`][crate::App] owns a [`State`], a free-form mapping the hooks can read and write.
//! It survives from one [`run`][crate::App::run] to the next one. To survive the process too, it
//! can be saved as a [`Snapshot`] and the application rebuilt from it later by
//! [`Builder::restore`][crate::Builder::restore].

use std::collections::btree_map::{BTreeMap, Iter};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Error as JsonError, Value as JsonValue};

use crate::identity::Identity;

const PRIVATE_PREFIX: &str = "__";

/// The run-scoped state of an application.
///
/// The values are stored as JSON values, so anything serializable fits in.
///
/// ```rust
/// use ceremony::State;
///
/// let mut state = State::new();
/// assert_eq!(None, state.get_as::<f64>("exec_time").unwrap());
/// state.set("exec_time", 1.5).unwrap();
/// assert_eq!(Some(1.5), state.get_as::<f64>("exec_time").unwrap());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct State(BTreeMap<String, JsonValue>);

impl State {
    /// Creates an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// The raw value under a key.
    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.0.get(key)
    }

    /// The value under a key, converted to the given type.
    ///
    /// Missing values (and JSON nulls) are `Ok(None)`. A value of different type is an error.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, JsonError> {
        match self.0.get(key) {
            None | Some(JsonValue::Null) => Ok(None),
            Some(value) => T::deserialize(value).map(Some),
        }
    }

    /// Stores a value, returning the previous one.
    pub fn set<K, T>(&mut self, key: K, value: T) -> Result<Option<JsonValue>, JsonError>
    where
        K: Into<String>,
        T: Serialize,
    {
        let value = serde_json::to_value(value)?;
        Ok(self.0.insert(key.into(), value))
    }

    pub fn remove(&mut self, key: &str) -> Option<JsonValue> {
        self.0.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> Iter<'_, String, JsonValue> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn public(&self) -> Self {
        let public = self
            .0
            .iter()
            .filter(|(key, _)| !key.starts_with(PRIVATE_PREFIX))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        State(public)
    }
}

/// A persistable image of an application.
///
/// Holds the identity and the public part of the state (keys starting with `__` are left out).
/// Everything else is rebuilt when the application is restored.
///
/// Serialized, the identity lives in the `__name__`, `__organization__`, `__version__`,
/// `__description__`, `__epilogue__` and `__credits__` fields, with the state keys next to
/// them.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Snapshot {
    #[serde(rename = "__name__")]
    pub name: String,
    #[serde(rename = "__organization__", default)]
    pub organization: String,
    #[serde(rename = "__version__")]
    pub version: String,
    #[serde(rename = "__description__", default)]
    pub description: String,
    #[serde(rename = "__epilogue__", default)]
    pub epilogue: String,
    #[serde(rename = "__credits__", default)]
    pub credits: Option<String>,
    /// The state.
    #[serde(flatten)]
    pub state: State,
}

impl Snapshot {
    /// Takes a snapshot of the identity and state.
    pub fn capture(identity: &Identity, state: &State) -> Self {
        Self {
            name: identity.name.clone(),
            organization: identity.organization.clone(),
            version: identity.version.clone(),
            description: identity.description.clone(),
            epilogue: identity.epilogue.clone(),
            credits: identity.credits.clone(),
            state: state.public(),
        }
    }

    /// The identity stored in the snapshot.
    pub fn identity(&self) -> Identity {
        Identity {
            name: self.name.clone(),
            version: self.version.clone(),
            description: self.description.clone(),
            epilogue: self.epilogue.clone(),
            organization: self.organization.clone(),
            credits: self.credits.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, JsonError> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, JsonError> {
        serde_json::from_str(json)
    }
}

//! Build definition sets
//!
//! A definition set is the option-name to value mapping passed to one build stage.
//! Sets are assembled from ordered layers where later layers win, and the pinned
//! layer of a stage is always applied last.

use std::collections::BTreeMap;
use std::fmt;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

/// Separator native build systems expect between entries of a path list
pub const PATH_LIST_SEPARATOR: &str = ";";

/// Value of a single build option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefinitionValue {
    /// Feature switch
    Bool(bool),
    /// Free-form string value
    Text(String),
    /// Ordered list of paths, kept in input order including duplicates
    Paths(Vec<Utf8PathBuf>),
}

impl DefinitionValue {
    /// Render the value the way it is written on a cmake command line
    pub fn render(&self) -> String {
        match self {
            DefinitionValue::Bool(true) => "ON".to_string(),
            DefinitionValue::Bool(false) => "OFF".to_string(),
            DefinitionValue::Text(text) => text.clone(),
            DefinitionValue::Paths(paths) => paths
                .iter()
                .map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join(PATH_LIST_SEPARATOR),
        }
    }

    /// Render as a `-D` cache entry argument
    pub fn to_cmake_arg(&self, name: &str) -> String {
        match self {
            DefinitionValue::Bool(_) => format!("-D{}:BOOL={}", name, self.render()),
            _ => format!("-D{}={}", name, self.render()),
        }
    }
}

impl fmt::Display for DefinitionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<bool> for DefinitionValue {
    fn from(value: bool) -> Self {
        DefinitionValue::Bool(value)
    }
}

impl From<&str> for DefinitionValue {
    fn from(value: &str) -> Self {
        DefinitionValue::Text(value.to_string())
    }
}

impl From<Vec<Utf8PathBuf>> for DefinitionValue {
    fn from(value: Vec<Utf8PathBuf>) -> Self {
        DefinitionValue::Paths(value)
    }
}

/// Option-name to value mapping for one build stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildDefinitions(BTreeMap<String, DefinitionValue>);

impl BuildDefinitions {
    /// Create an empty definition set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a definition
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<DefinitionValue>) {
        self.0.insert(name.into(), value.into());
    }

    /// Builder-style `set`
    pub fn with(mut self, name: impl Into<String>, value: impl Into<DefinitionValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&DefinitionValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate definitions in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DefinitionValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Render every definition as a `-D` argument
    pub fn to_cmake_args(&self) -> Vec<String> {
        self.iter()
            .map(|(name, value)| value.to_cmake_arg(name))
            .collect()
    }

    /// Overlay `other` on top of this set; entries of `other` win
    fn overlay(&mut self, other: &BuildDefinitions) {
        for (name, value) in &other.0 {
            self.0.insert(name.clone(), value.clone());
        }
    }
}

impl<K, V> FromIterator<(K, V)> for BuildDefinitions
where
    K: Into<String>,
    V: Into<DefinitionValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Ordered override layers for one stage
///
/// Layers are applied in insertion order, last wins. The pinned layer is held apart
/// and always applied after every regular layer.
#[derive(Debug, Clone, Default)]
pub struct DefinitionLayers {
    layers: Vec<BuildDefinitions>,
    pinned: BuildDefinitions,
}

impl DefinitionLayers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a regular layer
    pub fn layer(mut self, definitions: BuildDefinitions) -> Self {
        self.layers.push(definitions);
        self
    }

    /// Set the pinned layer
    pub fn pinned(mut self, definitions: BuildDefinitions) -> Self {
        self.pinned = definitions;
        self
    }

    /// Flatten all layers into the definition set handed to the driver
    pub fn resolve(&self) -> BuildDefinitions {
        let mut resolved = BuildDefinitions::new();
        for layer in &self.layers {
            resolved.overlay(layer);
        }
        for (name, value) in self.pinned.iter() {
            if let Some(previous) = resolved.get(name).filter(|prev| *prev != value) {
                tracing::warn!(
                    option = name,
                    requested = %previous,
                    pinned = %value,
                    "Ignoring override of pinned build option"
                );
            }
        }
        resolved.overlay(&self.pinned);
        resolved
    }
}

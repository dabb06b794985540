//! Package metadata and component graph
//!
//! A package exposes named components. Each component lists the libraries it
//! produces and the components it requires, either inside this package or in an
//! upstream package (`package::component`). The graph is validated when the
//! descriptor is built, so a broken reference fails before anything is built
//! instead of surfacing as a link error in a consumer.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use camino::Utf8Path;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};

use crate::locator::DependencyRef;
use crate::{Error, Result};

/// File name of the JSON descriptor written into the staging layout
pub const DESCRIPTOR_FILE: &str = "stagepack-package.json";

/// Requirement edge of a component
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ComponentRef {
    /// Component of the same package
    Local(String),
    /// Component of an upstream package
    External { package: String, component: String },
}

impl ComponentRef {
    pub fn local(name: impl Into<String>) -> Self {
        ComponentRef::Local(name.into())
    }

    pub fn external(package: impl Into<String>, component: impl Into<String>) -> Self {
        ComponentRef::External {
            package: package.into(),
            component: component.into(),
        }
    }
}

impl FromStr for ComponentRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            Error::package(
                format!("Invalid component reference: '{}'", s),
                "Use 'component' for this package or 'package::component' for an upstream one",
            )
        };

        match s.split_once("::") {
            Some((package, component)) => {
                if package.is_empty() || component.is_empty() || component.contains("::") {
                    return Err(invalid());
                }
                Ok(Self::external(package, component))
            }
            None if !s.is_empty() => Ok(Self::local(s)),
            None => Err(invalid()),
        }
    }
}

impl TryFrom<String> for ComponentRef {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ComponentRef> for String {
    fn from(value: ComponentRef) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentRef::Local(name) => write!(f, "{}", name),
            ComponentRef::External { package, component } => {
                write!(f, "{}::{}", package, component)
            }
        }
    }
}

/// Named, independently linkable unit of the package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub requires: Vec<ComponentRef>,
    pub libs: Vec<String>,
}

/// Descriptive package metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    pub version: String,
    pub license: String,
    pub author: String,
    pub url: String,
    pub description: String,
    pub topics: Vec<String>,
    /// Upstream packages consumers must provide
    pub requires: Vec<DependencyRef>,
}

/// Validated package declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageDescriptor {
    #[serde(flatten)]
    metadata: PackageMetadata,
    components: Vec<Component>,
}

impl PackageDescriptor {
    pub fn builder(metadata: PackageMetadata) -> PackageDescriptorBuilder {
        PackageDescriptorBuilder {
            metadata,
            components: Vec::new(),
            invalid_reference: None,
        }
    }

    pub fn metadata(&self) -> &PackageMetadata {
        &self.metadata
    }

    /// Components in declaration order
    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name == name)
    }

    pub fn component_names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.name.as_str()).collect()
    }

    /// Components ordered so that every component follows the ones it requires
    pub fn link_order(&self) -> Vec<&Component> {
        // Validated acyclic at construction
        let order = component_order(&self.components).unwrap_or_default();
        order
            .into_iter()
            .filter_map(|name| self.component(&name))
            .collect()
    }

    /// Pretty JSON rendering of the descriptor
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the JSON descriptor into `dir`
    pub fn write_json(&self, dir: &Utf8Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(DESCRIPTOR_FILE);
        std::fs::write(&path, self.to_json()? + "\n")?;
        tracing::debug!("Wrote {}", path);
        Ok(())
    }
}

/// Collects component declarations and validates them in [`build`](Self::build)
#[derive(Debug)]
pub struct PackageDescriptorBuilder {
    metadata: PackageMetadata,
    components: Vec<Component>,
    /// First requirement that failed to parse
    invalid_reference: Option<Error>,
}

impl PackageDescriptorBuilder {
    /// Declare a component
    ///
    /// Requirements are parsed from their string form; parse failures are
    /// reported by `build`.
    pub fn component<R, L>(mut self, name: &str, requires: R, libs: L) -> Self
    where
        R: IntoIterator,
        R::Item: AsRef<str>,
        L: IntoIterator,
        L::Item: Into<String>,
    {
        let mut parsed = Vec::new();
        for raw in requires {
            match raw.as_ref().parse::<ComponentRef>() {
                Ok(requirement) => parsed.push(requirement),
                Err(e) => {
                    self.invalid_reference.get_or_insert(e);
                }
            }
        }
        let requires = parsed;

        self.components.push(Component {
            name: name.to_string(),
            requires,
            libs: libs.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Declare a prebuilt component value
    pub fn push(mut self, component: Component) -> Self {
        self.components.push(component);
        self
    }

    /// Validate the declaration and produce the descriptor
    pub fn build(self) -> Result<PackageDescriptor> {
        if let Some(e) = self.invalid_reference {
            return Err(e);
        }
        validate(&self.metadata, &self.components)?;
        Ok(PackageDescriptor {
            metadata: self.metadata,
            components: self.components,
        })
    }
}

fn validate(metadata: &PackageMetadata, components: &[Component]) -> Result<()> {
    let upstream: HashSet<&str> = metadata.requires.iter().map(|d| d.name.as_str()).collect();
    let mut names = HashSet::new();

    for component in components {
        if component.name.is_empty() || component.name.contains("::") {
            return Err(Error::package(
                format!("Invalid component name: '{}'", component.name),
                "Component names must be non-empty and must not contain '::'",
            ));
        }
        if !names.insert(component.name.as_str()) {
            return Err(Error::package(
                format!("Duplicate component name: {}", component.name),
                "Each component of a package must have a unique name",
            ));
        }
    }

    for component in components {
        for requirement in &component.requires {
            match requirement {
                ComponentRef::Local(name) if *name == component.name => {
                    return Err(Error::package(
                        format!("Component '{}' requires itself", component.name),
                        "Remove the self reference from its requires list",
                    ));
                }
                ComponentRef::Local(name) if name.is_empty() || !names.contains(name.as_str()) => {
                    return Err(Error::package(
                        format!(
                            "Component '{}' requires unknown component '{}'",
                            component.name, name
                        ),
                        format!("Declared components: {}", sorted(&names).join(", ")),
                    ));
                }
                ComponentRef::External { package, .. } if !upstream.contains(package.as_str()) => {
                    return Err(Error::package(
                        format!(
                            "Component '{}' requires '{}' but package '{}' is not an upstream requirement",
                            component.name, requirement, package
                        ),
                        format!("Add {}/<version> to the package requirements", package),
                    ));
                }
                _ => {}
            }
        }
    }

    component_order(components).map(|_| ())
}

fn sorted<'a>(names: &HashSet<&'a str>) -> Vec<&'a str> {
    let mut names: Vec<_> = names.iter().copied().collect();
    names.sort_unstable();
    names
}

/// Topological order of local components, requirements first
fn component_order(components: &[Component]) -> Result<Vec<String>> {
    let mut graph = DiGraph::<&str, ()>::new();
    let mut node_indices: HashMap<&str, _> = HashMap::new();

    for component in components {
        let idx = graph.add_node(component.name.as_str());
        node_indices.insert(component.name.as_str(), idx);
    }

    for component in components {
        let dependent_idx = node_indices[component.name.as_str()];
        for requirement in &component.requires {
            if let ComponentRef::Local(name) = requirement {
                if let Some(&dependency_idx) = node_indices.get(name.as_str()) {
                    // Edge: requirement -> dependent (requirement links first)
                    graph.add_edge(dependency_idx, dependent_idx, ());
                }
            }
        }
    }

    match toposort(&graph, None) {
        Ok(sorted_indices) => Ok(sorted_indices
            .into_iter()
            .map(|idx| graph[idx].to_string())
            .collect()),
        Err(cycle) => {
            let cycle_component = graph[cycle.node_id()].to_string();
            Err(Error::circular_dependency(vec![cycle_component]))
        }
    }
}

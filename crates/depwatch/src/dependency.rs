//! Dependency declarations and the name-indexed dependency graph.
//!
//! Dependencies are declared with [`DependencyConfig`], which names its
//! children instead of owning them. [`DependencyGraph::build`] resolves those
//! names into an index table, so a child may point back at an ancestor
//! without any self-referential ownership. [`Dependency`] is the cheap handle
//! into a built graph that the resolver and the manager operate on.

use crate::resolvers::Resolver;
use common::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

/// Declaration of a single health-checkable dependency.
#[derive(Clone)]
pub struct DependencyConfig {
    /// Identifier, unique within a graph
    pub name: String,

    /// Reports this dependency's own health
    pub resolver: Arc<dyn Resolver>,

    /// How often the manager re-checks this dependency; zero disables rechecks
    pub interval: Duration,

    /// Names of the dependencies this one depends on, in evaluation order
    pub dependencies: Vec<String>,
}

impl DependencyConfig {
    /// Declare a dependency checked once at registration.
    pub fn new(name: impl Into<String>, resolver: impl Resolver + 'static) -> Self {
        Self::with_resolver(name, Arc::new(resolver))
    }

    /// Declare a dependency around an already shared resolver.
    pub fn with_resolver(name: impl Into<String>, resolver: Arc<dyn Resolver>) -> Self {
        Self {
            name: name.into(),
            resolver,
            interval: Duration::ZERO,
            dependencies: Vec::new(),
        }
    }

    /// Set the recheck interval.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Append child dependencies by name.
    pub fn depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(names.into_iter().map(Into::into));
        self
    }
}

impl fmt::Debug for DependencyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DependencyConfig")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

struct Node {
    name: String,
    resolver: Arc<dyn Resolver>,
    interval: Duration,
    children: Vec<usize>,
}

struct GraphInner {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
}

/// A validated set of dependency declarations addressed by name.
#[derive(Clone)]
pub struct DependencyGraph {
    inner: Arc<GraphInner>,
}

impl DependencyGraph {
    /// Build a graph, checking that names are unique and every child exists.
    ///
    /// Children may reference any declared dependency, including ancestors,
    /// so cycles are accepted.
    pub fn build(configs: impl IntoIterator<Item = DependencyConfig>) -> Result<Self> {
        let configs: Vec<DependencyConfig> = configs.into_iter().collect();

        let mut index = HashMap::with_capacity(configs.len());
        for (i, config) in configs.iter().enumerate() {
            if index.insert(config.name.clone(), i).is_some() {
                return Err(Error::DuplicateDependency(config.name.clone()));
            }
        }

        let mut nodes = Vec::with_capacity(configs.len());
        for config in configs {
            let children = config
                .dependencies
                .iter()
                .map(|child| {
                    index
                        .get(child)
                        .copied()
                        .ok_or_else(|| Error::UnknownDependency {
                            parent: config.name.clone(),
                            child: child.clone(),
                        })
                })
                .collect::<Result<Vec<_>>>()?;

            nodes.push(Node {
                name: config.name,
                resolver: config.resolver,
                interval: config.interval,
                children,
            });
        }

        Ok(Self {
            inner: Arc::new(GraphInner { nodes, index }),
        })
    }

    /// Look up a dependency by name.
    pub fn get(&self, name: &str) -> Option<Dependency> {
        self.inner.index.get(name).map(|&index| Dependency {
            graph: self.inner.clone(),
            index,
        })
    }

    /// Look up several dependencies, failing on the first unknown name.
    pub fn select<I, S>(&self, names: I) -> Result<Vec<Dependency>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .map(|name| {
                let name = name.as_ref();
                self.get(name).ok_or_else(|| Error::UnknownDependency {
                    parent: crate::graph::ROOT.to_string(),
                    child: name.to_string(),
                })
            })
            .collect()
    }

    /// All dependencies in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = Dependency> + '_ {
        (0..self.inner.nodes.len()).map(|index| Dependency {
            graph: self.inner.clone(),
            index,
        })
    }

    pub fn len(&self) -> usize {
        self.inner.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.nodes.is_empty()
    }
}

impl fmt::Debug for DependencyGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// Handle to one dependency inside a built [`DependencyGraph`].
///
/// Equality and hashing follow identity: two handles are equal only when
/// they refer to the same declaration of the same graph.
#[derive(Clone)]
pub struct Dependency {
    graph: Arc<GraphInner>,
    index: usize,
}

impl Dependency {
    /// Build a single dependency without children.
    pub fn leaf(
        name: impl Into<String>,
        resolver: impl Resolver + 'static,
        interval: Duration,
    ) -> Self {
        let name = name.into();
        let node = Node {
            name: name.clone(),
            resolver: Arc::new(resolver),
            interval,
            children: Vec::new(),
        };
        Self {
            graph: Arc::new(GraphInner {
                nodes: vec![node],
                index: HashMap::from([(name, 0)]),
            }),
            index: 0,
        }
    }

    fn node(&self) -> &Node {
        &self.graph.nodes[self.index]
    }

    pub fn name(&self) -> &str {
        &self.node().name
    }

    pub fn resolver(&self) -> &Arc<dyn Resolver> {
        &self.node().resolver
    }

    pub fn interval(&self) -> Duration {
        self.node().interval
    }

    /// Direct children, in declaration order.
    pub fn dependencies(&self) -> impl Iterator<Item = Dependency> + Send + '_ {
        self.node().children.iter().map(move |&index| Dependency {
            graph: self.graph.clone(),
            index,
        })
    }

    pub fn has_dependencies(&self) -> bool {
        !self.node().children.is_empty()
    }

    /// Run this dependency's own resolver, ignoring its children.
    pub async fn resolve(&self) -> bool {
        self.resolver().resolve().await
    }

    /// Whether both handles refer to the same declaration.
    pub fn ptr_eq(&self, other: &Dependency) -> bool {
        Arc::ptr_eq(&self.graph, &other.graph) && self.index == other.index
    }
}

impl PartialEq for Dependency {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Dependency {}

impl Hash for Dependency {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.graph).hash(state);
        self.index.hash(state);
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let children: Vec<&str> = self
            .node()
            .children
            .iter()
            .map(|&i| self.graph.nodes[i].name.as_str())
            .collect();
        f.debug_struct("Dependency")
            .field("name", &self.name())
            .field("interval", &self.interval())
            .field("dependencies", &children)
            .finish()
    }
}

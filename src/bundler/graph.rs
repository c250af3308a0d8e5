//! Dependency closure and the frozen bundle plan.
//!
//! The closure is computed in waves. Each wave scans its artifacts and
//! resolves their dependencies in parallel blocking tasks; a serial reduction
//! then merges the results, deduplicates libraries by content identity and
//! queues newly discovered libraries for the next wave. The loop ends at the
//! fixpoint. Errors found within a wave are collected and reported together,
//! and no further wave starts after one that produced errors.

use crate::bundler::{
    error::{Error, Result},
    platform::{Artifact, ContentId},
    scanner::{LibraryScanner, Resolution, lookup_name},
    settings::Settings,
};
use petgraph::{
    algo::tarjan_scc,
    graph::{DiGraph, NodeIndex},
    visit::EdgeRef,
};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{sync::Semaphore, task::JoinSet};

/// Role of a planned file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    /// A binary already in the package; rewritten in place.
    Artifact,
    /// A shared library copied into the package's library directory.
    Library,
}

/// One file of the plan.
#[derive(Clone, Debug)]
pub struct PlanEntry {
    artifact: Arc<Artifact>,
    kind: EntryKind,
    destination: PathBuf,
    aliases: Vec<PathBuf>,
}

impl PlanEntry {
    /// The scanned source file.
    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    /// Package-relative destination.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn identity(&self) -> &ContentId {
        self.artifact.identity()
    }

    /// Every source path whose content collapsed into this entry, the
    /// scanned one first.
    pub fn sources(&self) -> &[PathBuf] {
        &self.aliases
    }
}

/// Classification of one declared dependency.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EdgeTarget {
    /// Resolved to a planned entry.
    Bundled(NodeIndex),
    /// Matched the given exclusion pattern.
    Excluded(String),
    /// Provided by the system at the given location.
    System(PathBuf),
}

/// A declared dependency and what it resolved to.
#[derive(Clone, Debug)]
pub struct DependencyEdge {
    pub from: NodeIndex,
    pub specifier: String,
    pub target: EdgeTarget,
}

/// The finalized set of files to bundle.
///
/// Frozen: no method mutates it. Libraries are unique by content identity;
/// artifacts already in the package are kept per location.
#[derive(Debug)]
pub struct BundlePlan {
    graph: DiGraph<PlanEntry, (usize, String)>,
    edges: Vec<DependencyEdge>,
}

impl BundlePlan {
    pub fn entry(&self, node: NodeIndex) -> &PlanEntry {
        &self.graph[node]
    }

    /// Every entry in discovery order.
    pub fn entries(&self) -> impl Iterator<Item = (NodeIndex, &PlanEntry)> + '_ {
        self.graph.node_indices().map(move |n| (n, &self.graph[n]))
    }

    pub fn artifacts(&self) -> impl Iterator<Item = (NodeIndex, &PlanEntry)> + '_ {
        self.entries().filter(|(_, e)| e.kind == EntryKind::Artifact)
    }

    pub fn libraries(&self) -> impl Iterator<Item = (NodeIndex, &PlanEntry)> + '_ {
        self.entries().filter(|(_, e)| e.kind == EntryKind::Library)
    }

    /// Bundled dependencies of `node` in declaration order.
    pub fn bundled_dependencies(&self, node: NodeIndex) -> Vec<(&str, NodeIndex)> {
        let mut deps: Vec<(usize, &str, NodeIndex)> = self
            .graph
            .edges(node)
            .map(|e| (e.weight().0, e.weight().1.as_str(), e.target()))
            .collect();
        deps.sort_by_key(|(position, _, _)| *position);
        deps.into_iter().map(|(_, s, n)| (s, n)).collect()
    }

    /// Every entry with its bundled dependencies ahead of it.
    ///
    /// Members of a dependency cycle come out together, in discovery order.
    pub fn dependency_order(&self) -> Vec<NodeIndex> {
        tarjan_scc(&self.graph)
            .into_iter()
            .flat_map(|mut component| {
                component.sort();
                component
            })
            .collect()
    }

    /// Every classified dependency edge, bundled or not.
    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}

enum Classified {
    Excluded(String),
    Resolved(Resolution),
}

struct Scanned {
    artifact: Arc<Artifact>,
    dependencies: Vec<(String, Classified)>,
}

/// Runs in a blocking task: scans one artifact and resolves its
/// dependencies. Exclusion rules are applied before any lookup.
fn scan_one(scanner: &LibraryScanner, settings: &Settings, path: &Path) -> Result<Scanned> {
    let artifact = scanner.artifact(path)?;
    let mut dependencies = Vec::with_capacity(artifact.dependencies().len());
    for specifier in artifact.dependencies() {
        let classified = match settings.excluded_by(specifier) {
            Some(rule) => Classified::Excluded(rule.pattern().to_string()),
            None => Classified::Resolved(scanner.resolve(specifier, &artifact)?),
        };
        dependencies.push((specifier.clone(), classified));
    }
    Ok(Scanned {
        artifact,
        dependencies,
    })
}

/// Item of a wave: a package artifact not yet scanned, or a planned library.
enum Pending {
    Initial(PathBuf),
    Library(NodeIndex),
}

/// Computes the dependency closure of a set of artifacts.
pub struct DependencyGraphBuilder {
    settings: Arc<Settings>,
    scanner: Arc<LibraryScanner>,
    graph: DiGraph<PlanEntry, (usize, String)>,
    edges: Vec<DependencyEdge>,
    by_identity: HashMap<ContentId, NodeIndex>,
    by_destination: HashMap<PathBuf, NodeIndex>,
}

impl DependencyGraphBuilder {
    pub fn new(settings: Arc<Settings>, scanner: Arc<LibraryScanner>) -> Self {
        Self {
            settings,
            scanner,
            graph: DiGraph::new(),
            edges: Vec::new(),
            by_identity: HashMap::new(),
            by_destination: HashMap::new(),
        }
    }

    /// Builds the plan for `artifacts`, absolute paths inside the package.
    ///
    /// # Errors
    ///
    /// Every `MissingDependency` and `AmbiguousDependency` of the failing
    /// wave, batched into one error.
    pub async fn build(mut self, artifacts: Vec<PathBuf>) -> Result<BundlePlan> {
        let mut wave: Vec<Pending> = artifacts.into_iter().map(Pending::Initial).collect();
        let mut round = 0;

        while !wave.is_empty() {
            round += 1;
            log::debug!("Scan wave {round}: {} file(s)", wave.len());

            let results = self.scan_wave(&wave).await?;
            let mut errors = Vec::new();
            let mut next = Vec::new();

            // package artifacts are registered before any dependency is
            // reduced, so a library the package already ships is never
            // planned a second time
            let mut scanned = Vec::with_capacity(results.len());
            for (pending, result) in wave.into_iter().zip(results) {
                let item = result.and_then(|item| {
                    let node = match pending {
                        Pending::Library(node) => node,
                        Pending::Initial(path) => self.add_initial(&path, &item.artifact)?,
                    };
                    Ok((node, item))
                });
                match item {
                    Ok(item) => scanned.push(item),
                    Err(e) => errors.push(e),
                }
            }
            for (node, item) in scanned {
                self.reduce(node, item, &mut next, &mut errors);
            }
            if !errors.is_empty() {
                return Err(Error::batch(errors));
            }
            wave = next;
        }

        log::info!(
            "Dependency closure complete: {} file(s), {} edge(s) after {round} wave(s)",
            self.graph.node_count(),
            self.edges.len()
        );

        Ok(BundlePlan {
            graph: self.graph,
            edges: self.edges,
        })
    }

    /// Scans every item of a wave in parallel, bounded by `jobs`. Results
    /// come back in wave order.
    async fn scan_wave(&self, wave: &[Pending]) -> Result<Vec<Result<Scanned>>> {
        let semaphore = Arc::new(Semaphore::new(self.settings.jobs()));
        let mut tasks = JoinSet::new();

        for (slot, pending) in wave.iter().enumerate() {
            let path = match pending {
                Pending::Initial(path) => path.clone(),
                Pending::Library(node) => self.graph[*node].artifact.path().to_path_buf(),
            };
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| Error::GenericError(format!("scan scheduling failed: {e}")))?;
            let scanner = Arc::clone(&self.scanner);
            let settings = Arc::clone(&self.settings);
            tasks.spawn_blocking(move || {
                let _permit = permit;
                (slot, scan_one(&scanner, &settings, &path))
            });
        }

        let mut results: Vec<Option<Result<Scanned>>> = wave.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            let (slot, result) =
                joined.map_err(|e| Error::GenericError(format!("scan task failed: {e}")))?;
            results[slot] = Some(result);
        }
        Ok(results
            .into_iter()
            .map(|r| r.unwrap_or_else(|| Err(Error::GenericError("scan task lost".into()))))
            .collect())
    }

    fn reduce(
        &mut self,
        node: NodeIndex,
        scanned: Scanned,
        next: &mut Vec<Pending>,
        errors: &mut Vec<Error>,
    ) {
        let requester = scanned.artifact.path().to_path_buf();

        for (position, (specifier, classified)) in scanned.dependencies.into_iter().enumerate() {
            let target = match classified {
                Classified::Excluded(pattern) => {
                    log::debug!("{}: {specifier} excluded by '{pattern}'", requester.display());
                    EdgeTarget::Excluded(pattern)
                }
                Classified::Resolved(Resolution::System(lib))
                    if !self.settings.bundle_system_libraries() =>
                {
                    log::debug!(
                        "{}: {specifier} provided by the system at {}",
                        requester.display(),
                        lib.path().display()
                    );
                    EdgeTarget::System(lib.path().to_path_buf())
                }
                Classified::Resolved(Resolution::Found(lib) | Resolution::System(lib)) => {
                    match self.add_library(&requester, &specifier, lib, next) {
                        Ok(target) => {
                            self.graph.add_edge(node, target, (position, specifier.clone()));
                            EdgeTarget::Bundled(target)
                        }
                        Err(e) => {
                            errors.push(e);
                            continue;
                        }
                    }
                }
                Classified::Resolved(Resolution::Unresolved { searched }) => {
                    errors.push(Error::MissingDependency {
                        artifact: requester.clone(),
                        specifier,
                        searched,
                    });
                    continue;
                }
                Classified::Resolved(Resolution::Ambiguous { candidates }) => {
                    errors.push(Error::AmbiguousDependency {
                        artifact: requester.clone(),
                        specifier,
                        candidates,
                    });
                    continue;
                }
            };
            self.edges.push(DependencyEdge {
                from: node,
                specifier,
                target,
            });
        }
    }

    fn add_initial(&mut self, path: &Path, artifact: &Arc<Artifact>) -> Result<NodeIndex> {
        let target = self.settings.target();
        if artifact.format() != target.format() {
            return Err(Error::ConfigurationError(format!(
                "{} is a {} binary but the target platform is {target}",
                path.display(),
                artifact.format()
            )));
        }
        let destination = path
            .strip_prefix(self.settings.package_dir())
            .map_err(|_| {
                Error::ConfigurationError(format!(
                    "artifact {} is outside the package directory",
                    path.display()
                ))
            })?
            .to_path_buf();

        let node = self.graph.add_node(PlanEntry {
            artifact: Arc::clone(artifact),
            kind: EntryKind::Artifact,
            destination: destination.clone(),
            aliases: vec![path.to_path_buf()],
        });
        self.by_identity
            .entry(artifact.identity().clone())
            .or_insert(node);
        self.by_destination.insert(destination, node);
        Ok(node)
    }

    /// Returns the node for `lib`, planning it if its content is new.
    fn add_library(
        &mut self,
        requester: &Path,
        specifier: &str,
        lib: Arc<Artifact>,
        next: &mut Vec<Pending>,
    ) -> Result<NodeIndex> {
        if let Some(&node) = self.by_identity.get(lib.identity()) {
            let entry = &mut self.graph[node];
            if !entry.aliases.iter().any(|p| p == lib.path()) {
                log::debug!(
                    "{} has the same content as {}, sharing one copy",
                    lib.path().display(),
                    entry.artifact.path().display()
                );
                entry.aliases.push(lib.path().to_path_buf());
            }
            return Ok(node);
        }

        let destination = self.settings.lib_dir().join(destination_name(specifier, &lib));
        if let Some(&other) = self.by_destination.get(&destination) {
            return Err(Error::AmbiguousDependency {
                artifact: requester.to_path_buf(),
                specifier: specifier.to_string(),
                candidates: vec![
                    self.graph[other].artifact.path().to_path_buf(),
                    lib.path().to_path_buf(),
                ],
            });
        }

        log::debug!(
            "Planning {} -> {}",
            lib.path().display(),
            destination.display()
        );
        let node = self.graph.add_node(PlanEntry {
            aliases: vec![lib.path().to_path_buf()],
            artifact: Arc::clone(&lib),
            kind: EntryKind::Library,
            destination: destination.clone(),
        });
        self.by_identity.insert(lib.identity().clone(), node);
        self.by_destination.insert(destination, node);
        next.push(Pending::Library(node));
        Ok(node)
    }
}

/// Package-relative name under the library directory. Single file names
/// take the spelling found on disk, which matters for case-insensitive
/// lookups.
fn destination_name(specifier: &str, lib: &Artifact) -> PathBuf {
    let name = lookup_name(specifier);
    if name.contains('/') {
        return PathBuf::from(name);
    }
    lib.path()
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(name))
}

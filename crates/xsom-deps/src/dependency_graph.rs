//! Dependency graph between target namespaces

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Anti-dependency index plus file-contribution index
///
/// An edge is stored from the namespace that was consulted to the namespace
/// whose compilation consulted it, so the entry for `B` lists everything that
/// has to be recompiled when `B` changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraph {
    /// namespace -> namespaces that depend on it
    dependents: BTreeMap<String, BTreeSet<String>>,
    /// namespace -> files that declare components into it, in registration order
    contributions: BTreeMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `base` without anything the `updated` namespaces registered.
    ///
    /// Edges consulted by or pointing at an updated namespace are dropped, as
    /// are the contribution lists of updated namespaces. The caller replays
    /// fresh registrations for those namespaces while recompiling them.
    pub fn derive_from<I, S>(base: &DependencyGraph, updated: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let updated: HashSet<String> = updated
            .into_iter()
            .map(|ns| ns.as_ref().to_string())
            .collect();

        let dependents = base
            .dependents
            .iter()
            .filter(|(target, _)| !updated.contains(*target))
            .filter_map(|(target, sources)| {
                let kept: BTreeSet<String> = sources
                    .iter()
                    .filter(|source| !updated.contains(*source))
                    .cloned()
                    .collect();
                (!kept.is_empty()).then(|| (target.clone(), kept))
            })
            .collect();

        let contributions = base
            .contributions
            .iter()
            .filter(|(ns, _)| !updated.contains(*ns))
            .map(|(ns, files)| (ns.clone(), files.clone()))
            .collect();

        debug!(
            "Derived dependency graph: evicted {} namespace(s)",
            updated.len()
        );
        Self {
            dependents,
            contributions,
        }
    }

    /// Record that compiling `source` consulted `target`.
    ///
    /// A namespace never depends on itself; such edges are ignored.
    pub fn register_dependency(&mut self, source: &str, target: &str) {
        if source == target {
            return;
        }
        let inserted = self
            .dependents
            .entry(target.to_string())
            .or_default()
            .insert(source.to_string());
        if inserted {
            trace!("Namespace {:?} depends on {:?}", source, target);
        }
    }

    /// Record that `file` declares components into `namespace`.
    ///
    /// Registering the same pair twice keeps a single entry.
    pub fn register_contribution(&mut self, namespace: &str, file: &str) {
        let files = self.contributions.entry(namespace.to_string()).or_default();
        if !files.iter().any(|f| f == file) {
            trace!("File {} contributes to namespace {:?}", file, namespace);
            files.push(file.to_string());
        }
    }

    /// Every namespace reachable from the seeds through dependents, seeds
    /// included
    pub fn compute_transitive_closure<I, S>(&self, seeds: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut result: BTreeSet<String> = BTreeSet::new();
        let mut work = VecDeque::new();
        for seed in seeds {
            let seed = seed.as_ref();
            if result.insert(seed.to_string()) {
                work.push_back(seed.to_string());
            }
        }

        while let Some(ns) = work.pop_front() {
            let Some(dependents) = self.dependents.get(&ns) else {
                continue;
            };
            for dependent in dependents {
                if result.insert(dependent.clone()) {
                    work.push_back(dependent.clone());
                }
            }
        }

        result
    }

    /// Every namespace the seeds consulted, directly or through the
    /// namespaces they consulted, seeds included
    pub fn compute_dependency_closure<I, S>(&self, seeds: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut result: BTreeSet<String> = BTreeSet::new();
        let mut work = VecDeque::new();
        for seed in seeds {
            let seed = seed.as_ref();
            if result.insert(seed.to_string()) {
                work.push_back(seed.to_string());
            }
        }

        while let Some(ns) = work.pop_front() {
            let consulted: Vec<String> = self.dependencies_of(&ns).map(str::to_string).collect();
            for target in consulted {
                if result.insert(target.clone()) {
                    work.push_back(target);
                }
            }
        }

        result
    }

    /// Union of the files contributing to any of `namespaces`
    pub fn files_touched<I, S>(&self, namespaces: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        namespaces
            .into_iter()
            .flat_map(|ns| self.contributions_of(ns.as_ref()).iter().cloned())
            .collect()
    }

    /// Every namespace to which one of `files` contributes
    pub fn namespaces_touched<I, S>(&self, files: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let files: HashSet<String> = files.into_iter().map(|f| f.as_ref().to_string()).collect();
        self.contributions
            .iter()
            .filter(|(_, contributed)| contributed.iter().any(|f| files.contains(f)))
            .map(|(ns, _)| ns.clone())
            .collect()
    }

    pub fn is_file_represented(&self, file: &str) -> bool {
        self.contributions
            .values()
            .any(|files| files.iter().any(|f| f == file))
    }

    /// Direct dependents of `namespace`
    pub fn dependents_of(&self, namespace: &str) -> impl Iterator<Item = &str> {
        self.dependents
            .get(namespace)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }

    /// Namespaces `namespace` consulted while it was compiled
    pub fn dependencies_of<'a>(&'a self, namespace: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.dependents
            .iter()
            .filter(move |(_, sources)| sources.contains(namespace))
            .map(|(target, _)| target.as_str())
    }

    /// Files contributing to `namespace`; empty when it has none
    pub fn contributions_of(&self, namespace: &str) -> &[String] {
        self.contributions
            .get(namespace)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every namespace mentioned by an edge or a contribution
    pub fn namespaces(&self) -> BTreeSet<&str> {
        self.dependents
            .iter()
            .flat_map(|(target, sources)| {
                std::iter::once(target.as_str()).chain(sources.iter().map(String::as_str))
            })
            .chain(self.contributions.keys().map(String::as_str))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.dependents.is_empty() && self.contributions.is_empty()
    }

    /// Groups of namespaces that depend on each other, each group sorted.
    ///
    /// Mutually dependent namespaces are legal in XML Schema; this is a
    /// diagnostic, not an error.
    pub fn namespace_cycles(&self) -> Vec<Vec<String>> {
        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let mut indices: HashMap<&str, NodeIndex> = HashMap::new();
        for ns in self.namespaces() {
            indices.insert(ns, graph.add_node(ns));
        }

        for (target, sources) in &self.dependents {
            let to = indices[target.as_str()];
            for source in sources {
                graph.add_edge(indices[source.as_str()], to, ());
            }
        }

        let mut cycles: Vec<Vec<String>> = petgraph::algo::kosaraju_scc(&graph)
            .into_iter()
            .filter(|component| component.len() > 1)
            .map(|component| {
                let mut names: Vec<String> =
                    component.into_iter().map(|idx| graph[idx].to_string()).collect();
                names.sort();
                names
            })
            .collect();
        cycles.sort();
        cycles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_closure_follows_dependents() {
        let mut graph = DependencyGraph::new();
        // A depends on B, B depends on C
        graph.register_dependency("A", "B");
        graph.register_dependency("B", "C");

        assert_eq!(graph.compute_transitive_closure(["C"]), set(&["A", "B", "C"]));
        assert_eq!(graph.compute_transitive_closure(["B"]), set(&["A", "B"]));
        assert_eq!(graph.compute_transitive_closure(["A"]), set(&["A"]));
    }

    #[test]
    fn test_closure_terminates_on_cycles() {
        let mut graph = DependencyGraph::new();
        graph.register_dependency("A", "B");
        graph.register_dependency("B", "A");
        graph.register_dependency("C", "A");

        assert_eq!(graph.compute_transitive_closure(["A"]), set(&["A", "B", "C"]));
        assert_eq!(graph.namespace_cycles(), vec![vec!["A".to_string(), "B".to_string()]]);
    }

    #[test]
    fn test_dependency_closure_follows_consulted_namespaces() {
        let mut graph = DependencyGraph::new();
        graph.register_dependency("urn:a", "urn:b");
        graph.register_dependency("urn:b", "urn:c");
        graph.register_dependency("urn:b", "urn:d");
        graph.register_dependency("urn:c", "urn:a");
        graph.register_dependency("urn:x", "urn:a");

        assert_eq!(graph.dependencies_of("urn:b").collect::<Vec<_>>(), vec!["urn:c", "urn:d"]);
        assert_eq!(graph.dependencies_of("urn:d").count(), 0);
        assert_eq!(
            graph.compute_dependency_closure(["urn:b"]),
            set(&["urn:a", "urn:b", "urn:c", "urn:d"])
        );
        assert_eq!(graph.compute_dependency_closure(["urn:d"]), set(&["urn:d"]));
    }

    #[test]
    fn test_files_touched_is_set_union() {
        let mut graph = DependencyGraph::new();
        graph.register_contribution("A", "a.xsd");
        graph.register_contribution("B", "b.xsd");
        graph.register_contribution("B", "common.xsd");
        graph.register_contribution("A", "common.xsd");

        assert_eq!(
            graph.files_touched(["A", "B"]),
            set(&["a.xsd", "b.xsd", "common.xsd"])
        );
        // unknown namespaces contribute nothing
        assert_eq!(graph.files_touched(["Z"]), BTreeSet::new());
    }

    #[test]
    fn test_namespaces_touched_and_representation() {
        let mut graph = DependencyGraph::new();
        graph.register_contribution("A", "a.xsd");
        graph.register_contribution("B", "shared.xsd");
        graph.register_contribution("C", "shared.xsd");

        assert_eq!(graph.namespaces_touched(["shared.xsd"]), set(&["B", "C"]));
        assert_eq!(graph.namespaces_touched(["new.xsd"]), BTreeSet::new());
        assert!(graph.is_file_represented("a.xsd"));
        assert!(!graph.is_file_represented("new.xsd"));
    }

    #[test]
    fn test_duplicate_registrations_collapse() {
        let mut graph = DependencyGraph::new();
        graph.register_contribution("A", "a.xsd");
        graph.register_contribution("A", "a.xsd");
        graph.register_dependency("A", "B");
        graph.register_dependency("A", "B");
        graph.register_dependency("A", "A");

        assert_eq!(graph.contributions_of("A"), ["a.xsd".to_string()]);
        assert_eq!(graph.dependents_of("B").collect::<Vec<_>>(), vec!["A"]);
        assert_eq!(graph.dependents_of("A").count(), 0);
    }

    #[test]
    fn test_derive_from_evicts_updated_namespaces() {
        let mut base = DependencyGraph::new();
        base.register_dependency("A", "B");
        base.register_dependency("C", "B");
        base.register_dependency("B", "D");
        base.register_contribution("A", "a.xsd");
        base.register_contribution("B", "b.xsd");
        base.register_contribution("C", "c.xsd");

        let derived = DependencyGraph::derive_from(&base, ["A"]);

        // edges from A are gone, the rest survive
        assert_eq!(derived.dependents_of("B").collect::<Vec<_>>(), vec!["C"]);
        assert_eq!(derived.dependents_of("D").collect::<Vec<_>>(), vec!["B"]);
        assert!(derived.contributions_of("A").is_empty());
        assert_eq!(derived.contributions_of("B"), ["b.xsd".to_string()]);

        // the base generation is untouched
        assert_eq!(base.contributions_of("A"), ["a.xsd".to_string()]);

        let derived = DependencyGraph::derive_from(&base, ["B"]);
        assert_eq!(derived.dependents_of("B").count(), 0);
        assert_eq!(derived.dependents_of("D").count(), 0);
    }

    #[test]
    fn test_namespaces_lists_every_mention() {
        let mut graph = DependencyGraph::new();
        graph.register_dependency("A", "B");
        graph.register_contribution("C", "c.xsd");

        assert_eq!(
            graph.namespaces().into_iter().collect::<Vec<_>>(),
            vec!["A", "B", "C"]
        );
        assert!(!graph.is_empty());
    }

    #[test]
    fn test_serde_roundtrip_keeps_queries() {
        let mut graph = DependencyGraph::new();
        graph.register_dependency("urn:a", "urn:b");
        graph.register_contribution("urn:b", "b.xsd");

        let json = serde_json::to_string(&graph).unwrap();
        let restored: DependencyGraph = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, graph);
    }
}

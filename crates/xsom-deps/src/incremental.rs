//! Rebuild planning from a set of modified files

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dependency_graph::DependencyGraph;

/// What an incremental build has to recompile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildPlan {
    /// Namespaces the modified files contributed to
    pub seed_namespaces: BTreeSet<String>,
    /// Seeds plus everything that transitively depends on them
    pub namespaces: BTreeSet<String>,
    /// Namespaces outside `namespaces` that they consult, transitively.
    /// They are recompiled too, so references into them resolve.
    #[serde(default)]
    pub support_namespaces: BTreeSet<String>,
    /// Files to recompile: every contributor to `namespaces` and
    /// `support_namespaces`, plus new files
    pub files: BTreeSet<String>,
    /// Modified files the graph has never seen
    pub new_files: BTreeSet<String>,
}

impl RebuildPlan {
    pub fn compute<I, S>(graph: &DependencyGraph, modified_files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let modified: BTreeSet<String> = modified_files
            .into_iter()
            .map(|f| f.as_ref().to_string())
            .collect();

        let mut plan = Self {
            seed_namespaces: graph.namespaces_touched(&modified),
            new_files: modified
                .into_iter()
                .filter(|f| !graph.is_file_represented(f))
                .collect(),
            ..Self::default()
        };
        plan.expand(graph);
        plan
    }

    /// Add seeds and consulted namespaces found while compiling, then
    /// recompute everything that follows from them.
    ///
    /// New files only reveal their namespaces once translated, and a
    /// recompiled namespace may start consulting one it did not before.
    pub fn widen(
        &mut self,
        graph: &DependencyGraph,
        seeds: &BTreeSet<String>,
        consulted: &BTreeSet<String>,
    ) {
        self.seed_namespaces.extend(seeds.iter().cloned());
        self.support_namespaces.extend(consulted.iter().cloned());
        self.expand(graph);
    }

    fn expand(&mut self, graph: &DependencyGraph) {
        self.namespaces = graph.compute_transitive_closure(&self.seed_namespaces);
        let consulted = graph
            .compute_dependency_closure(self.namespaces.iter().chain(&self.support_namespaces));
        self.support_namespaces = consulted
            .into_iter()
            .filter(|ns| !self.namespaces.contains(ns))
            .collect();
        self.files = graph.files_touched(self.recompiled_namespaces());
        self.files.extend(self.new_files.iter().cloned());

        debug!(
            "Rebuild plan: {} seed namespace(s), {} affected, {} consulted, {} file(s) ({} new)",
            self.seed_namespaces.len(),
            self.namespaces.len(),
            self.support_namespaces.len(),
            self.files.len(),
            self.new_files.len()
        );
    }

    /// Affected and consulted namespaces together
    pub fn recompiled_namespaces(&self) -> impl Iterator<Item = &str> {
        self.namespaces
            .iter()
            .chain(&self.support_namespaces)
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// The base graph with the recompiled namespaces evicted, ready for the
    /// recompile to replay their registrations
    pub fn next_generation(&self, base: &DependencyGraph) -> DependencyGraph {
        DependencyGraph::derive_from(base, self.recompiled_namespaces())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    /// po.xsd (urn:po) imports addr.xsd (urn:addr); misc.xsd stands alone
    fn graph() -> DependencyGraph {
        let mut graph = DependencyGraph::new();
        graph.register_contribution("urn:po", "po.xsd");
        graph.register_contribution("urn:addr", "addr.xsd");
        graph.register_contribution("urn:misc", "misc.xsd");
        graph.register_dependency("urn:po", "urn:addr");
        graph
    }

    #[test]
    fn test_change_to_import_recompiles_importer() {
        let plan = RebuildPlan::compute(&graph(), ["addr.xsd"]);

        assert_eq!(plan.seed_namespaces, set(&["urn:addr"]));
        assert_eq!(plan.namespaces, set(&["urn:addr", "urn:po"]));
        assert_eq!(plan.files, set(&["addr.xsd", "po.xsd"]));
        assert!(plan.new_files.is_empty());
    }

    #[test]
    fn test_change_to_importer_recompiles_what_it_consults() {
        let plan = RebuildPlan::compute(&graph(), ["po.xsd"]);

        assert_eq!(plan.namespaces, set(&["urn:po"]));
        assert_eq!(plan.support_namespaces, set(&["urn:addr"]));
        assert_eq!(plan.files, set(&["addr.xsd", "po.xsd"]));
    }

    #[test]
    fn test_leaf_change_stays_local() {
        let plan = RebuildPlan::compute(&graph(), ["misc.xsd"]);
        assert!(plan.support_namespaces.is_empty());
        assert_eq!(plan.files, set(&["misc.xsd"]));
    }

    #[test]
    fn test_widen_with_namespace_of_new_file() {
        let base = graph();
        let mut plan = RebuildPlan::compute(&base, ["addr2.xsd"]);
        assert_eq!(plan.files, set(&["addr2.xsd"]));

        // addr2.xsd turned out to contribute to urn:addr
        plan.widen(&base, &set(&["urn:addr"]), &BTreeSet::new());
        assert_eq!(plan.seed_namespaces, set(&["urn:addr"]));
        assert_eq!(plan.namespaces, set(&["urn:addr", "urn:po"]));
        assert_eq!(plan.files, set(&["addr.xsd", "addr2.xsd", "po.xsd"]));
    }

    #[test]
    fn test_widen_with_newly_consulted_namespace() {
        let base = graph();
        let mut plan = RebuildPlan::compute(&base, ["misc.xsd"]);

        plan.widen(&base, &BTreeSet::new(), &set(&["urn:po"]));
        assert_eq!(plan.namespaces, set(&["urn:misc"]));
        assert_eq!(plan.support_namespaces, set(&["urn:addr", "urn:po"]));
        assert_eq!(plan.files, set(&["addr.xsd", "misc.xsd", "po.xsd"]));

        let next = plan.next_generation(&base);
        assert!(next.is_empty());
    }

    #[test]
    fn test_new_file_is_compiled() {
        let plan = RebuildPlan::compute(&graph(), ["extra.xsd"]);
        assert!(plan.namespaces.is_empty());
        assert_eq!(plan.new_files, set(&["extra.xsd"]));
        assert_eq!(plan.files, set(&["extra.xsd"]));
        assert!(!plan.is_empty());
    }

    #[test]
    fn test_next_generation_keeps_untouched_namespaces() {
        let base = graph();
        let plan = RebuildPlan::compute(&base, ["addr.xsd"]);
        let next = plan.next_generation(&base);

        assert_eq!(next.contributions_of("urn:misc"), ["misc.xsd".to_string()]);
        assert!(next.contributions_of("urn:po").is_empty());
        assert!(next.contributions_of("urn:addr").is_empty());
        assert_eq!(next.dependents_of("urn:addr").count(), 0);
    }

    #[test]
    fn test_nothing_modified() {
        let plan = RebuildPlan::compute(&graph(), std::iter::empty::<&str>());
        assert!(plan.is_empty());
        assert_eq!(plan, RebuildPlan::default());
    }
}

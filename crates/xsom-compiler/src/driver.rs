//! Full and incremental builds over a resource loader
//!
//! A full build translates every schema document. An incremental build
//! compares fingerprints with the previous build, plans which namespaces
//! have to be recompiled from the previous dependency graph, and translates
//! only the files contributing to them. The graph of the new build starts
//! from the previous one with the recompiled namespaces evicted.
//!
//! A compile pass can discover what the previous graph could not tell: the
//! namespaces new files contribute to, and namespaces a recompiled one
//! consults for the first time. The plan is then widened and the pass runs
//! again, so the outcome matches a full build.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::{debug, info, instrument};
use xsom_deps::{DependencyGraph, RebuildPlan};
use xsom_loader::ResourceLoader;

use crate::config::{CompilerConfig, IncrementalConfig};
use crate::error::Result;
use crate::fingerprint::{read_json, write_json, FileFingerprints};
use crate::state::CompilationState;
use crate::type_system::TypeSystem;

/// Translates schema documents into components
pub trait SchemaFrontend {
    /// Whether a resource is a schema document this frontend compiles
    fn accepts(&self, name: &str) -> bool {
        name.ends_with(".xsd")
    }

    /// Translate one document. Implementations register the namespaces the
    /// document contributes to and look up referenced components through
    /// `state`, which records the dependencies.
    fn translate(&mut self, name: &str, content: &[u8], state: &mut CompilationState) -> Result<()>;

    /// Second pass, once every document of the build has been translated
    fn resolve(&mut self, state: &mut CompilationState) -> Result<()> {
        let _ = state;
        Ok(())
    }
}

/// What one build leaves behind for the next
#[derive(Debug, Clone)]
pub struct BuildRecord {
    pub fingerprints: FileFingerprints,
    pub dependencies: DependencyGraph,
}

impl BuildRecord {
    pub fn save(&self, config: &IncrementalConfig, root: &Path) -> Result<()> {
        self.fingerprints.save_to_file(&root.join(&config.fingerprint_file))?;
        write_json(&root.join(&config.graph_file), &self.dependencies)?;
        debug!("Saved build record {}", self.fingerprints.short_hash());
        Ok(())
    }

    /// `None` unless both the fingerprints and the graph were saved
    pub fn load(config: &IncrementalConfig, root: &Path) -> Result<Option<Self>> {
        let fingerprints = FileFingerprints::load_from_file(&root.join(&config.fingerprint_file))?;
        let dependencies = read_json(&root.join(&config.graph_file))?;
        Ok(fingerprints
            .zip(dependencies)
            .map(|(fingerprints, dependencies)| Self {
                fingerprints,
                dependencies,
            }))
    }
}

pub struct BuildOutput {
    pub type_system: TypeSystem,
    pub record: BuildRecord,
    /// Absent for full builds
    pub plan: Option<RebuildPlan>,
    pub compiled_files: BTreeSet<String>,
}

impl BuildOutput {
    pub fn is_incremental(&self) -> bool {
        self.plan.is_some()
    }
}

pub struct IncrementalCompiler<F> {
    config: CompilerConfig,
    frontend: F,
}

impl<F: SchemaFrontend> IncrementalCompiler<F> {
    pub fn new(config: CompilerConfig, frontend: F) -> Self {
        Self { config, frontend }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn frontend(&self) -> &F {
        &self.frontend
    }

    #[instrument(skip_all, level = "info")]
    pub fn full_build(&mut self, loader: &dyn ResourceLoader) -> Result<BuildOutput> {
        let fingerprints = self.capture(loader)?;
        let files: BTreeSet<String> = fingerprints.files.keys().cloned().collect();
        info!("Full build of {} file(s)", files.len());

        let state = CompilationState::new(self.config.clone())?;
        let state = self.compile_pass(loader, state, &files)?;
        self.finish(state, fingerprints, files, None)
    }

    /// Rebuild what changed since `previous`.
    ///
    /// The returned type system holds the recompiled namespaces and the ones
    /// they consult; the rest stay valid in the previous build.
    #[instrument(skip_all, level = "info")]
    pub fn incremental_build(
        &mut self,
        loader: &dyn ResourceLoader,
        previous: &BuildRecord,
    ) -> Result<BuildOutput> {
        let fingerprints = self.capture(loader)?;
        let changes = fingerprints.changes_since(&previous.fingerprints);
        if changes.version_changed {
            info!(
                "Previous build was recorded by xsom {}, rebuilding everything",
                previous.fingerprints.xsom_version
            );
            return self.full_build(loader);
        }

        let mut plan = RebuildPlan::compute(&previous.dependencies, changes.changed_files());
        loop {
            // removed files are in the plan but have nothing left to translate
            let files: BTreeSet<String> = plan
                .files
                .iter()
                .filter(|file| fingerprints.files.contains_key(*file))
                .cloned()
                .collect();
            let dependencies = plan.next_generation(&previous.dependencies);
            let state = CompilationState::with_dependencies(self.config.clone(), dependencies)?;
            let state = self.compile_pass(loader, state, &files)?;

            let (seeds, consulted) = unplanned_namespaces(&plan, &state, &previous.dependencies);
            if seeds.is_empty() && consulted.is_empty() {
                info!(
                    "Incremental build: {} modified, {} added, {} removed; \
                     recompiled {} namespace(s) from {} file(s)",
                    changes.modified.len(),
                    changes.added.len(),
                    changes.removed.len(),
                    plan.recompiled_namespaces().count(),
                    files.len()
                );
                return self.finish(state, fingerprints, files, Some(plan));
            }

            debug!(
                "Widening rebuild plan by {} seed(s) and {} consulted namespace(s)",
                seeds.len(),
                consulted.len()
            );
            plan.widen(&previous.dependencies, &seeds, &consulted);
        }
    }

    fn capture(&self, loader: &dyn ResourceLoader) -> Result<FileFingerprints> {
        FileFingerprints::capture(loader, |name| self.frontend.accepts(name))
    }

    /// Translate `files`, run the frontend's second pass and resolve keyrefs
    fn compile_pass(
        &mut self,
        loader: &dyn ResourceLoader,
        mut state: CompilationState,
        files: &BTreeSet<String>,
    ) -> Result<CompilationState> {
        for name in files {
            let Some(content) = loader.read(name)? else {
                debug!("{} vanished after fingerprinting", name);
                continue;
            };
            debug!("Translating {}", name);
            self.frontend.translate(name, &content, &mut state)?;
        }
        self.frontend.resolve(&mut state)?;
        state.resolve_keyrefs()?;
        Ok(state)
    }

    fn finish(
        &self,
        state: CompilationState,
        fingerprints: FileFingerprints,
        files: BTreeSet<String>,
        plan: Option<RebuildPlan>,
    ) -> Result<BuildOutput> {
        let type_system = state.finish()?;
        for cycle in type_system.dependencies().namespace_cycles() {
            debug!("Mutually dependent namespaces: {}", cycle.join(", "));
        }
        let record = BuildRecord {
            fingerprints,
            dependencies: type_system.dependencies().clone(),
        };
        Ok(BuildOutput {
            type_system,
            record,
            plan,
            compiled_files: files,
        })
    }
}

/// Namespaces a compile pass reached that its plan left out.
///
/// The first set holds namespaces new files contributed to that the previous
/// build already knew, unless they are affected already; their dependents
/// need a recompile as well. The second holds namespaces the pass consulted
/// without compiling them.
fn unplanned_namespaces(
    plan: &RebuildPlan,
    state: &CompilationState,
    previous: &DependencyGraph,
) -> (BTreeSet<String>, BTreeSet<String>) {
    let planned: BTreeSet<&str> = plan.recompiled_namespaces().collect();
    let known = previous.namespaces();
    let graph = state.dependencies();

    let seeds: BTreeSet<String> = graph
        .namespaces_touched(&plan.new_files)
        .into_iter()
        .filter(|ns| !plan.namespaces.contains(ns.as_str()) && known.contains(ns.as_str()))
        .collect();
    let consulted = state
        .namespaces()
        .iter()
        .flat_map(|ns| graph.dependencies_of(ns))
        .filter(|ns| !planned.contains(ns) && !seeds.contains(*ns))
        .map(str::to_string)
        .collect();
    (seeds, consulted)
}

//! Mutable state of one compilation
//!
//! Holds the component arena, the global symbol tables and the namespace
//! dependency graph being recorded. Every lookup made on behalf of a
//! namespace records that namespace as a dependent of the namespace it
//! looked into, whether or not the lookup succeeded.

use std::collections::hash_map::Entry as HashEntry;
use std::collections::btree_map::Entry as BTreeEntry;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};
use xsom_core::{
    Annotation, AttributeDecl, AttributeGroup, AttributeScope, Component, ComponentArena,
    ComponentRef, ConstraintCategory, ElementDecl, Identity, IdentityConstraint, ModelGroup,
    NamespaceContext, Payload, QName, Ref, SchemaError, SimpleType,
};
use xsom_deps::DependencyGraph;

use crate::config::{CompilerConfig, DuplicatePolicy};
use crate::error::{CompileError, Result};
use crate::type_system::TypeSystem;
use crate::validation::check_path_syntax;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub source_file: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>, source_file: Option<&str>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            source_file: source_file.map(str::to_string),
        }
    }

    pub fn warning(message: impl Into<String>, source_file: Option<&str>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            source_file: source_file.map(str::to_string),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(file) = &self.source_file {
            write!(f, "{}: ", file)?;
        }
        match self.severity {
            Severity::Error => write!(f, "error: {}", self.message),
            Severity::Warning => write!(f, "warning: {}", self.message),
        }
    }
}

/// Global components of one kind, by name, plus redefinitions keyed by the
/// component they redefine
pub(crate) struct SymbolTable<T> {
    by_name: BTreeMap<QName, Ref<T>>,
    redefinitions: HashMap<Ref<T>, Ref<T>>,
}

impl<T> Default for SymbolTable<T> {
    fn default() -> Self {
        Self {
            by_name: BTreeMap::new(),
            redefinitions: HashMap::new(),
        }
    }
}

impl<T> SymbolTable<T> {
    pub(crate) fn get(&self, name: &QName) -> Option<Ref<T>> {
        self.by_name.get(name).copied()
    }

    pub(crate) fn redefinition_of(&self, redefined: Ref<T>) -> Option<Ref<T>> {
        self.redefinitions.get(&redefined).copied()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&QName, Ref<T>)> {
        self.by_name.iter().map(|(name, &handle)| (name, handle))
    }

    pub(crate) fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Register a component, returning the one already holding its slot
    fn insert(
        &mut self,
        name: QName,
        component: Ref<T>,
        redefined: Option<Ref<T>>,
    ) -> Option<Ref<T>> {
        match redefined {
            Some(redefined) => match self.redefinitions.entry(redefined) {
                HashEntry::Occupied(existing) => Some(*existing.get()),
                HashEntry::Vacant(slot) => {
                    slot.insert(component);
                    None
                }
            },
            None => match self.by_name.entry(name) {
                BTreeEntry::Occupied(existing) => Some(*existing.get()),
                BTreeEntry::Vacant(slot) => {
                    slot.insert(component);
                    None
                }
            },
        }
    }
}

/// Where a definition was read from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentScope {
    pub target_namespace: String,
    /// The document had no target namespace and was included into one
    pub chameleon: bool,
    pub source_file: Option<String>,
}

impl DocumentScope {
    pub fn new(target_namespace: impl Into<String>) -> Self {
        Self {
            target_namespace: target_namespace.into(),
            ..Self::default()
        }
    }

    pub fn chameleon(mut self, chameleon: bool) -> Self {
        self.chameleon = chameleon;
        self
    }

    pub fn source_file(mut self, file: impl Into<String>) -> Self {
        self.source_file = Some(file.into());
        self
    }

    /// Namespace that unqualified references adopt
    pub fn chameleon_namespace(&self) -> Option<&str> {
        self.chameleon.then_some(self.target_namespace.as_str())
    }

    fn identity(&self, name: QName) -> Identity {
        let identity = Identity::named(name).chameleon(self.chameleon);
        match &self.source_file {
            Some(file) => identity.source_file(file.clone()),
            None => identity,
        }
    }
}

/// A key, unique or keyref definition as read from a schema document
#[derive(Debug, Clone)]
pub struct IdentityConstraintDef {
    pub name: String,
    pub category: ConstraintCategory,
    pub selector: String,
    pub fields: Vec<String>,
    pub prefixes: NamespaceContext,
    /// Key referenced by a keyref, already resolved against `prefixes`
    pub refer: Option<QName>,
    pub annotation: Option<Annotation>,
}

impl IdentityConstraintDef {
    pub fn new<F, S>(
        category: ConstraintCategory,
        name: impl Into<String>,
        selector: impl Into<String>,
        fields: F,
    ) -> Self
    where
        F: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            category,
            selector: selector.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            prefixes: NamespaceContext::new(),
            refer: None,
            annotation: None,
        }
    }

    pub fn with_prefixes(mut self, prefixes: NamespaceContext) -> Self {
        self.prefixes = prefixes;
        self
    }

    pub fn refers_to(mut self, key: QName) -> Self {
        self.refer = Some(key);
        self
    }
}

struct PendingKeyref {
    keyref: Ref<IdentityConstraint>,
    refer: QName,
    scope: DocumentScope,
}

fn category_rank(category: ConstraintCategory) -> u8 {
    match category {
        ConstraintCategory::Key => 0,
        ConstraintCategory::Unique => 1,
        ConstraintCategory::Keyref => 2,
    }
}

pub struct CompilationState {
    config: CompilerConfig,
    compat: BTreeMap<QName, QName>,
    arena: ComponentArena,
    attribute_groups: SymbolTable<AttributeGroup>,
    model_groups: SymbolTable<ModelGroup>,
    attributes: SymbolTable<AttributeDecl>,
    simple_types: SymbolTable<SimpleType>,
    identity_constraints: SymbolTable<IdentityConstraint>,
    pending_keyrefs: Vec<PendingKeyref>,
    namespaces: BTreeSet<String>,
    dependencies: DependencyGraph,
    diagnostics: Vec<Diagnostic>,
}

impl CompilationState {
    pub fn new(config: CompilerConfig) -> Result<Self> {
        Self::with_dependencies(config, DependencyGraph::new())
    }

    /// Continue recording into a graph derived from a previous build
    pub fn with_dependencies(
        config: CompilerConfig,
        dependencies: DependencyGraph,
    ) -> Result<Self> {
        let compat = config.names.compat_map()?;
        Ok(Self {
            config,
            compat,
            arena: ComponentArena::new(),
            attribute_groups: SymbolTable::default(),
            model_groups: SymbolTable::default(),
            attributes: SymbolTable::default(),
            simple_types: SymbolTable::default(),
            identity_constraints: SymbolTable::default(),
            pending_keyrefs: Vec::new(),
            namespaces: BTreeSet::new(),
            dependencies,
            diagnostics: Vec::new(),
        })
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn arena(&self) -> &ComponentArena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut ComponentArena {
        &mut self.arena
    }

    pub fn dependencies(&self) -> &DependencyGraph {
        &self.dependencies
    }

    pub fn namespaces(&self) -> &BTreeSet<String> {
        &self.namespaces
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn error(&mut self, message: impl Into<String>, source_file: Option<&str>) {
        let diagnostic = Diagnostic::error(message, source_file);
        debug!("{}", diagnostic);
        self.diagnostics.push(diagnostic);
    }

    pub fn warning(&mut self, message: impl Into<String>, source_file: Option<&str>) {
        let diagnostic = Diagnostic::warning(message, source_file);
        warn!("{}", diagnostic);
        self.diagnostics.push(diagnostic);
    }

    pub fn add_namespace(&mut self, namespace: &str) {
        if !self.namespaces.contains(namespace) {
            self.namespaces.insert(namespace.to_string());
        }
    }

    pub fn register_dependency(&mut self, source: &str, target: &str) {
        self.dependencies.register_dependency(source, target);
    }

    /// Record that `file` defines components in `namespace`
    pub fn register_contribution(&mut self, namespace: &str, file: &str) {
        self.add_namespace(namespace);
        self.dependencies.register_contribution(namespace, file);
    }

    /// Apply chameleon adoption, then the configured name substitutions
    pub fn compat_name(&self, name: &QName, chameleon_namespace: Option<&str>) -> QName {
        let name = match chameleon_namespace {
            Some(ns) if name.is_unqualified() && !ns.is_empty() => name.with_namespace(ns),
            _ => name.clone(),
        };
        match self.compat.get(&name) {
            Some(substitute) => substitute.clone(),
            None => name,
        }
    }

    fn lookup_name(
        &mut self,
        name: &QName,
        chameleon_namespace: Option<&str>,
        source_namespace: Option<&str>,
    ) -> QName {
        let name = self.compat_name(name, chameleon_namespace);
        if let Some(source) = source_namespace {
            self.dependencies.register_dependency(source, name.namespace());
        }
        name
    }

    pub fn find_attribute_group(
        &mut self,
        name: &QName,
        chameleon_namespace: Option<&str>,
        source_namespace: Option<&str>,
    ) -> Option<Ref<AttributeGroup>> {
        let name = self.lookup_name(name, chameleon_namespace, source_namespace);
        self.attribute_groups.get(&name)
    }

    pub fn find_model_group(
        &mut self,
        name: &QName,
        chameleon_namespace: Option<&str>,
        source_namespace: Option<&str>,
    ) -> Option<Ref<ModelGroup>> {
        let name = self.lookup_name(name, chameleon_namespace, source_namespace);
        self.model_groups.get(&name)
    }

    pub fn find_global_attribute(
        &mut self,
        name: &QName,
        chameleon_namespace: Option<&str>,
        source_namespace: Option<&str>,
    ) -> Option<Ref<AttributeDecl>> {
        let name = self.lookup_name(name, chameleon_namespace, source_namespace);
        self.attributes.get(&name)
    }

    pub fn find_simple_type(
        &mut self,
        name: &QName,
        chameleon_namespace: Option<&str>,
        source_namespace: Option<&str>,
    ) -> Option<Ref<SimpleType>> {
        let name = self.lookup_name(name, chameleon_namespace, source_namespace);
        self.simple_types.get(&name)
    }

    pub fn find_identity_constraint(
        &mut self,
        name: &QName,
        chameleon_namespace: Option<&str>,
        source_namespace: Option<&str>,
    ) -> Option<Ref<IdentityConstraint>> {
        let name = self.lookup_name(name, chameleon_namespace, source_namespace);
        self.identity_constraints.get(&name)
    }

    /// Inside a redefinition, a reference to the redefined name means the
    /// original component
    pub fn find_redefined_model_group(
        &self,
        name: &QName,
        chameleon_namespace: Option<&str>,
        redefined_by: Ref<ModelGroup>,
    ) -> Option<Ref<ModelGroup>> {
        let name = self.compat_name(name, chameleon_namespace);
        if self.arena.get(redefined_by).name() == Some(&name) {
            return self.model_groups.redefinitions.iter().find_map(|(&original, &redefining)| {
                (redefining == redefined_by).then_some(original)
            });
        }
        self.model_groups.get(&name)
    }

    pub fn find_redefined_attribute_group(
        &self,
        name: &QName,
        chameleon_namespace: Option<&str>,
        redefined_by: Ref<AttributeGroup>,
    ) -> Option<Ref<AttributeGroup>> {
        let name = self.compat_name(name, chameleon_namespace);
        if self.arena.get(redefined_by).name() == Some(&name) {
            return self.attribute_groups.redefinitions.iter().find_map(|(&original, &redefining)| {
                (redefining == redefined_by).then_some(original)
            });
        }
        self.attribute_groups.get(&name)
    }

    /// Register a global attribute group, or a redefinition of `redefined`
    pub fn add_attribute_group(
        &mut self,
        group: Ref<AttributeGroup>,
        redefined: Option<Ref<AttributeGroup>>,
    ) -> Result<()> {
        let name = self.global_name(group)?;
        let existing = self.attribute_groups.insert(name.clone(), group, redefined);
        let policy = self.config.definitions.duplicate_policy();
        let existing = existing.map(Ref::erase);
        self.report_duplicate("attribute group", &name, existing, group.erase(), policy);
        Ok(())
    }

    /// Register a global model group, or a redefinition of `redefined`
    pub fn add_model_group(
        &mut self,
        group: Ref<ModelGroup>,
        redefined: Option<Ref<ModelGroup>>,
    ) -> Result<()> {
        let name = self.global_name(group)?;
        let existing = self.model_groups.insert(name.clone(), group, redefined);
        let policy = self.config.definitions.duplicate_policy();
        let existing = existing.map(Ref::erase);
        self.report_duplicate("model group", &name, existing, group.erase(), policy);
        Ok(())
    }

    pub fn add_global_attribute(&mut self, attribute: Ref<AttributeDecl>) -> Result<()> {
        if self.arena.payload(attribute)?.scope() != AttributeScope::Global {
            return Err(SchemaError::KindMismatch {
                component: attribute.erase(),
                expected: "global attribute",
                found: self.arena.get(attribute).kind(),
            }
            .into());
        }
        let name = self.global_name(attribute)?;
        let existing = self.attributes.insert(name.clone(), attribute, None);
        let policy = self.config.definitions.duplicate_policy();
        let existing = existing.map(Ref::erase);
        self.report_duplicate("attribute", &name, existing, attribute.erase(), policy);
        Ok(())
    }

    pub fn add_simple_type(&mut self, ty: Ref<SimpleType>) -> Result<()> {
        let name = self.global_name(ty)?;
        let existing = self.simple_types.insert(name.clone(), ty, None);
        let policy = self.config.definitions.duplicate_policy();
        self.report_duplicate("simple type", &name, existing.map(Ref::erase), ty.erase(), policy);
        Ok(())
    }

    /// Duplicate identity constraints are only ever warned about
    pub fn add_identity_constraint(&mut self, constraint: Ref<IdentityConstraint>) -> Result<()> {
        let name = self.global_name(constraint)?;
        let existing = self.identity_constraints.insert(name.clone(), constraint, None);
        let existing = existing.map(Ref::erase);
        let duplicate = constraint.erase();
        let policy = DuplicatePolicy::Warn;
        self.report_duplicate("identity constraint", &name, existing, duplicate, policy);
        Ok(())
    }

    fn global_name<T: Payload>(&self, handle: Ref<T>) -> Result<QName> {
        let component = self.arena.get(handle);
        component.name().cloned().ok_or_else(|| {
            SchemaError::Unpopulated {
                component: handle.erase(),
                kind: component.kind(),
                reason: "global component has no name",
            }
            .into()
        })
    }

    fn report_duplicate(
        &mut self,
        kind: &str,
        name: &QName,
        existing: Option<ComponentRef>,
        duplicate: ComponentRef,
        policy: DuplicatePolicy,
    ) {
        let Some(existing) = existing else {
            trace!("Registered {} {}", kind, name);
            return;
        };
        if self.config.definitions.ignores_duplicates_in(name.namespace()) {
            trace!("Ignoring duplicate {} {}", kind, name);
            return;
        }

        let message = format!(
            "Duplicate global {} {}, also defined in {}",
            kind,
            name,
            self.arena.get(existing).source_file().unwrap_or("<unknown>")
        );
        let file = self.arena.get(duplicate).source_file().map(str::to_string);
        match policy {
            DuplicatePolicy::Error => self.error(message, file.as_deref()),
            DuplicatePolicy::Warn => self.warning(message, file.as_deref()),
        }
    }

    /// Check, allocate and compile one identity constraint.
    ///
    /// Malformed definitions are reported as diagnostics and yield `None`;
    /// nothing is allocated for them. Keyrefs are queued until
    /// [`resolve_keyrefs`](Self::resolve_keyrefs).
    pub fn translate_identity_constraint(
        &mut self,
        def: IdentityConstraintDef,
        scope: &DocumentScope,
    ) -> Result<Option<Ref<IdentityConstraint>>> {
        let name = QName::new(scope.target_namespace.clone(), def.name);
        let file = scope.source_file.as_deref();

        if self.config.paths.validate_syntax {
            let invalid = std::iter::once(("selector", &def.selector))
                .chain(def.fields.iter().map(|field| ("field", field)))
                .find_map(|(what, path)| check_path_syntax(path).err().map(|e| (what, e)));
            if let Some((what, e)) = invalid {
                self.error(format!("Invalid {} in {}: {}", what, name, e), file);
                return Ok(None);
            }
        }

        let refer = match (def.category, def.refer) {
            (ConstraintCategory::Keyref, None) => {
                self.error(format!("Keyref {} does not name the key it refers to", name), file);
                return Ok(None);
            }
            (ConstraintCategory::Keyref, Some(refer)) => Some(refer),
            _ => None,
        };

        let constraint = IdentityConstraint::new(def.selector, def.fields, def.prefixes);
        if let Err(e) = constraint.compiled_paths() {
            self.error(format!("Identity constraint {}: {}", name, e), file);
            return Ok(None);
        }

        let handle = self.arena.alloc(constraint)?;
        let component = self.arena.component_mut(handle)?;
        component.init(scope.identity(name))?;
        if let Some(annotation) = def.annotation {
            component.set_annotation(annotation);
        }
        self.arena.payload_mut(handle)?.set_category(def.category)?;

        if let Some(refer) = refer {
            self.pending_keyrefs.push(PendingKeyref {
                keyref: handle,
                refer,
                scope: scope.clone(),
            });
        }
        self.add_identity_constraint(handle)?;
        Ok(Some(handle))
    }

    /// Translate the constraints declared on an element, keys first, then
    /// uniques, then keyrefs.
    ///
    /// The element only gets its constraints when every one of them
    /// translated; returns whether that happened.
    pub fn translate_element_constraints<I>(
        &mut self,
        element: Ref<ElementDecl>,
        defs: I,
        scope: &DocumentScope,
    ) -> Result<bool>
    where
        I: IntoIterator<Item = IdentityConstraintDef>,
    {
        let mut defs: Vec<_> = defs.into_iter().collect();
        defs.sort_by_key(|def| category_rank(def.category));

        let mut constraints = Vec::with_capacity(defs.len());
        let mut complete = true;
        for def in defs {
            match self.translate_identity_constraint(def, scope)? {
                Some(handle) => constraints.push(handle),
                None => complete = false,
            }
        }

        if complete {
            self.arena.payload_mut(element)?.set_identity_constraints(constraints);
        }
        Ok(complete)
    }

    /// Attach every queued keyref to the key or unique constraint it names
    pub fn resolve_keyrefs(&mut self) -> Result<()> {
        for pending in std::mem::take(&mut self.pending_keyrefs) {
            let label = label(self.arena.get(pending.keyref));
            let file = pending.scope.source_file.as_deref();
            let key = self.find_identity_constraint(
                &pending.refer,
                pending.scope.chameleon_namespace(),
                Some(&pending.scope.target_namespace),
            );

            match key {
                None => self.error(
                    format!("Key {} referenced by keyref {} not found", pending.refer, label),
                    file,
                ),
                Some(key) => match self.arena.payload(key).map(IdentityConstraint::category)? {
                    Some(ConstraintCategory::Key | ConstraintCategory::Unique) => {
                        self.arena.payload_mut(pending.keyref)?.set_referenced_key(key)?;
                        trace!("Resolved keyref {} to {}", label, pending.refer);
                    }
                    _ => self.error(
                        format!(
                            "Keyref {} refers to {}, which is not a key or unique constraint",
                            label, pending.refer
                        ),
                        file,
                    ),
                },
            }
        }
        Ok(())
    }

    /// Resolve outstanding keyrefs and publish the type system.
    ///
    /// Fails with every collected diagnostic if any of them is an error.
    pub fn finish(mut self) -> Result<TypeSystem> {
        self.resolve_keyrefs()?;
        if self.has_errors() {
            return Err(CompileError::Diagnostics(self.diagnostics));
        }

        self.arena.publish()?;
        debug!(
            "Finished compilation of {} namespace(s) with {} warning(s)",
            self.namespaces.len(),
            self.diagnostics.len()
        );
        Ok(TypeSystem {
            arena: self.arena,
            attribute_groups: self.attribute_groups,
            model_groups: self.model_groups,
            attributes: self.attributes,
            simple_types: self.simple_types,
            identity_constraints: self.identity_constraints,
            namespaces: self.namespaces,
            dependencies: self.dependencies,
            warnings: self.diagnostics,
        })
    }
}

fn label(component: &Component) -> String {
    match component.name() {
        Some(name) => name.to_string(),
        None => component.self_ref().to_string(),
    }
}

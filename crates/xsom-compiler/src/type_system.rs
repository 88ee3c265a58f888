//! The published result of a compilation

use std::collections::BTreeSet;

use xsom_core::{
    AttributeDecl, AttributeGroup, ComponentArena, IdentityConstraint, ModelGroup, QName, Ref,
    SimpleType,
};
use xsom_deps::DependencyGraph;

use crate::state::{Diagnostic, SymbolTable};

/// Frozen components and symbol tables of one compilation, together with
/// the dependency graph it recorded
pub struct TypeSystem {
    pub(crate) arena: ComponentArena,
    pub(crate) attribute_groups: SymbolTable<AttributeGroup>,
    pub(crate) model_groups: SymbolTable<ModelGroup>,
    pub(crate) attributes: SymbolTable<AttributeDecl>,
    pub(crate) simple_types: SymbolTable<SimpleType>,
    pub(crate) identity_constraints: SymbolTable<IdentityConstraint>,
    pub(crate) namespaces: BTreeSet<String>,
    pub(crate) dependencies: DependencyGraph,
    pub(crate) warnings: Vec<Diagnostic>,
}

impl TypeSystem {
    pub fn arena(&self) -> &ComponentArena {
        &self.arena
    }

    pub fn attribute_group(&self, name: &QName) -> Option<Ref<AttributeGroup>> {
        self.attribute_groups.get(name)
    }

    pub fn model_group(&self, name: &QName) -> Option<Ref<ModelGroup>> {
        self.model_groups.get(name)
    }

    /// The group that redefines `original`, if any
    pub fn redefined_model_group(&self, original: Ref<ModelGroup>) -> Option<Ref<ModelGroup>> {
        self.model_groups.redefinition_of(original)
    }

    pub fn redefined_attribute_group(
        &self,
        original: Ref<AttributeGroup>,
    ) -> Option<Ref<AttributeGroup>> {
        self.attribute_groups.redefinition_of(original)
    }

    pub fn global_attribute(&self, name: &QName) -> Option<Ref<AttributeDecl>> {
        self.attributes.get(name)
    }

    pub fn simple_type(&self, name: &QName) -> Option<Ref<SimpleType>> {
        self.simple_types.get(name)
    }

    pub fn identity_constraint(&self, name: &QName) -> Option<Ref<IdentityConstraint>> {
        self.identity_constraints.get(name)
    }

    pub fn model_groups(&self) -> impl Iterator<Item = (&QName, Ref<ModelGroup>)> {
        self.model_groups.iter()
    }

    pub fn identity_constraints(&self) -> impl Iterator<Item = (&QName, Ref<IdentityConstraint>)> {
        self.identity_constraints.iter()
    }

    /// Number of named global components across all symbol tables
    pub fn global_count(&self) -> usize {
        self.attribute_groups.len()
            + self.model_groups.len()
            + self.attributes.len()
            + self.simple_types.len()
            + self.identity_constraints.len()
    }

    /// Namespaces compiled into this type system
    pub fn namespaces(&self) -> &BTreeSet<String> {
        &self.namespaces
    }

    pub fn dependencies(&self) -> &DependencyGraph {
        &self.dependencies
    }

    pub fn into_dependencies(self) -> DependencyGraph {
        self.dependencies
    }

    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }
}

//! Component records
//!
//! All component kinds share one [`Component`] record: identity and
//! provenance, annotation, user data and the canonical self-handle. The
//! kind-specific part lives in the [`ComponentData`] payload.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::arena::{ComponentArena, ComponentRef, Ref};
use crate::error::SchemaError;
use crate::identity::{ConstraintCategory, IdentityConstraint};
use crate::qname::QName;
use crate::value::LazyValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentKind {
    AttributeGroup,
    ModelGroup,
    IdentityConstraint,
    LocalAttribute,
    GlobalAttribute,
    LocalElement,
    SimpleType,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AttributeGroup => "attribute group",
            Self::ModelGroup => "model group",
            Self::IdentityConstraint => "identity constraint",
            Self::LocalAttribute => "local attribute",
            Self::GlobalAttribute => "global attribute",
            Self::LocalElement => "local element",
            Self::SimpleType => "simple type",
        };
        f.write_str(name)
    }
}

/// Name and provenance of a component, assigned once by `Component::init`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    /// Absent for anonymous and some local components
    pub name: Option<QName>,
    /// Target namespace of the declaring document
    pub target_namespace: String,
    /// Declared without a namespace and adopted one through an include
    pub chameleon: bool,
    pub redefinition: bool,
    pub source_file: Option<String>,
}

impl Identity {
    /// A named component; the target namespace is the name's namespace
    pub fn named(name: QName) -> Self {
        Self {
            target_namespace: name.namespace().to_string(),
            name: Some(name),
            ..Self::default()
        }
    }

    pub fn anonymous(target_namespace: impl Into<String>) -> Self {
        Self {
            target_namespace: target_namespace.into(),
            ..Self::default()
        }
    }

    pub fn chameleon(mut self, chameleon: bool) -> Self {
        self.chameleon = chameleon;
        self
    }

    pub fn redefinition(mut self, redefinition: bool) -> Self {
        self.redefinition = redefinition;
        self
    }

    pub fn source_file(mut self, file: impl Into<String>) -> Self {
        self.source_file = Some(file.into());
        self
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{}", name)?,
            None => write!(f, "<anonymous in {:?}>", self.target_namespace)?,
        }
        if self.chameleon {
            f.write_str(" (chameleon)")?;
        }
        if self.redefinition {
            f.write_str(" (redefinition)")?;
        }
        if let Some(file) = &self.source_file {
            write!(f, " from {}", file)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Annotation {
    pub app_info: Vec<String>,
    pub documentation: Vec<String>,
}

/// Opaque data a caller attaches to a component
pub type UserData = Arc<dyn Any + Send + Sync>;

pub struct Component {
    self_ref: ComponentRef,
    identity: Option<Identity>,
    annotation: Option<Annotation>,
    user_data: Option<UserData>,
    data: ComponentData,
}

impl Component {
    pub(crate) fn new(self_ref: ComponentRef, data: ComponentData) -> Self {
        Self {
            self_ref,
            identity: None,
            annotation: None,
            user_data: None,
            data,
        }
    }

    /// The canonical handle assigned at allocation
    pub fn self_ref(&self) -> ComponentRef {
        self.self_ref
    }

    pub fn kind(&self) -> ComponentKind {
        self.data.kind()
    }

    /// Assign identity and provenance.
    ///
    /// Re-asserting an identical identity is accepted so a component visited
    /// twice by the resolver does not fail; anything else is an error.
    pub fn init(&mut self, identity: Identity) -> Result<(), SchemaError> {
        match &self.identity {
            None => {
                self.identity = Some(identity);
                Ok(())
            }
            Some(existing) if *existing == identity => {
                trace!("Re-initialized {} {} with identical identity", self.kind(), self.self_ref);
                Ok(())
            }
            Some(existing) => Err(SchemaError::Initialization {
                what: format!("{} {}", self.kind(), self.self_ref),
                existing: existing.to_string(),
                requested: identity.to_string(),
            }),
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn is_populated(&self) -> bool {
        self.identity.is_some()
    }

    pub fn name(&self) -> Option<&QName> {
        self.identity.as_ref().and_then(|id| id.name.as_ref())
    }

    pub fn target_namespace(&self) -> Option<&str> {
        self.identity.as_ref().map(|id| id.target_namespace.as_str())
    }

    pub fn is_chameleon(&self) -> bool {
        self.identity.as_ref().is_some_and(|id| id.chameleon)
    }

    pub fn is_redefinition(&self) -> bool {
        self.identity.as_ref().is_some_and(|id| id.redefinition)
    }

    pub fn source_file(&self) -> Option<&str> {
        self.identity.as_ref().and_then(|id| id.source_file.as_deref())
    }

    pub fn annotation(&self) -> Option<&Annotation> {
        self.annotation.as_ref()
    }

    pub fn set_annotation(&mut self, annotation: Annotation) {
        self.annotation = Some(annotation);
    }

    pub fn user_data(&self) -> Option<&UserData> {
        self.user_data.as_ref()
    }

    pub fn set_user_data(&mut self, data: UserData) {
        self.user_data = Some(data);
    }

    pub fn data(&self) -> &ComponentData {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut ComponentData {
        &mut self.data
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("self_ref", &self.self_ref)
            .field("identity", &self.identity)
            .field("annotation", &self.annotation)
            .field("user_data", &self.user_data.as_ref().map(|_| ".."))
            .field("data", &self.data)
            .finish()
    }
}

#[derive(Debug)]
pub enum ComponentData {
    AttributeGroup(AttributeGroup),
    ModelGroup(ModelGroup),
    IdentityConstraint(IdentityConstraint),
    Attribute(AttributeDecl),
    LocalElement(ElementDecl),
    SimpleType(SimpleType),
}

impl ComponentData {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Self::AttributeGroup(_) => ComponentKind::AttributeGroup,
            Self::ModelGroup(_) => ComponentKind::ModelGroup,
            Self::IdentityConstraint(_) => ComponentKind::IdentityConstraint,
            Self::Attribute(decl) => match decl.scope() {
                AttributeScope::Local => ComponentKind::LocalAttribute,
                AttributeScope::Global => ComponentKind::GlobalAttribute,
            },
            Self::LocalElement(_) => ComponentKind::LocalElement,
            Self::SimpleType(_) => ComponentKind::SimpleType,
        }
    }
}

/// Named group of attribute uses, possibly referencing other groups
#[derive(Debug, Default)]
pub struct AttributeGroup {
    attributes: Vec<Ref<AttributeDecl>>,
    groups: Vec<Ref<AttributeGroup>>,
    any_attribute: bool,
}

impl AttributeGroup {
    pub fn add_attribute(&mut self, attribute: Ref<AttributeDecl>) {
        self.attributes.push(attribute);
    }

    pub fn add_group(&mut self, group: Ref<AttributeGroup>) {
        self.groups.push(group);
    }

    pub fn set_any_attribute(&mut self, any: bool) {
        self.any_attribute = any;
    }

    pub fn attributes(&self) -> &[Ref<AttributeDecl>] {
        &self.attributes
    }

    pub fn groups(&self) -> &[Ref<AttributeGroup>] {
        &self.groups
    }

    pub fn has_any_attribute(&self) -> bool {
        self.any_attribute
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compositor {
    #[default]
    Sequence,
    Choice,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Term {
    Element(Ref<ElementDecl>),
    Group(Ref<ModelGroup>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Particle {
    pub term: Term,
    pub min_occurs: u32,
    /// `None` is unbounded
    pub max_occurs: Option<u32>,
}

impl Particle {
    pub fn once(term: Term) -> Self {
        Self {
            term,
            min_occurs: 1,
            max_occurs: Some(1),
        }
    }
}

#[derive(Debug, Default)]
pub struct ModelGroup {
    compositor: Compositor,
    particles: Vec<Particle>,
}

impl ModelGroup {
    pub fn new(compositor: Compositor) -> Self {
        Self {
            compositor,
            particles: Vec::new(),
        }
    }

    pub fn compositor(&self) -> Compositor {
        self.compositor
    }

    pub fn set_compositor(&mut self, compositor: Compositor) {
        self.compositor = compositor;
    }

    pub fn push_particle(&mut self, particle: Particle) {
        self.particles.push(particle);
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeScope {
    Local,
    Global,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeUse {
    #[default]
    Optional,
    Required,
    Prohibited,
}

/// A default or fixed value, realized on first use
#[derive(Debug)]
pub enum ValueConstraint {
    Default(LazyValue),
    Fixed(LazyValue),
}

impl ValueConstraint {
    pub fn value(&self) -> &LazyValue {
        match self {
            Self::Default(v) | Self::Fixed(v) => v,
        }
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self, Self::Fixed(_))
    }
}

#[derive(Debug)]
pub struct AttributeDecl {
    scope: AttributeScope,
    type_ref: Option<Ref<SimpleType>>,
    attribute_use: AttributeUse,
    value_constraint: Option<ValueConstraint>,
}

impl AttributeDecl {
    pub fn local() -> Self {
        Self::with_scope(AttributeScope::Local)
    }

    pub fn global() -> Self {
        Self::with_scope(AttributeScope::Global)
    }

    fn with_scope(scope: AttributeScope) -> Self {
        Self {
            scope,
            type_ref: None,
            attribute_use: AttributeUse::default(),
            value_constraint: None,
        }
    }

    pub fn scope(&self) -> AttributeScope {
        self.scope
    }

    pub fn type_ref(&self) -> Option<Ref<SimpleType>> {
        self.type_ref
    }

    pub fn set_type(&mut self, ty: Ref<SimpleType>) {
        self.type_ref = Some(ty);
    }

    pub fn attribute_use(&self) -> AttributeUse {
        self.attribute_use
    }

    pub fn set_use(&mut self, attribute_use: AttributeUse) {
        self.attribute_use = attribute_use;
    }

    pub fn value_constraint(&self) -> Option<&ValueConstraint> {
        self.value_constraint.as_ref()
    }

    pub fn set_value_constraint(&mut self, constraint: ValueConstraint) {
        self.value_constraint = Some(constraint);
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSet {
    pub extension: bool,
    pub restriction: bool,
    pub substitution: bool,
}

/// Identity constraints of an element, split by category
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstraintScope {
    pub keys: Vec<Ref<IdentityConstraint>>,
    pub uniques: Vec<Ref<IdentityConstraint>>,
    pub keyrefs: Vec<Ref<IdentityConstraint>>,
}

impl ConstraintScope {
    pub fn has_keyrefs(&self) -> bool {
        !self.keyrefs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len() + self.uniques.len() + self.keyrefs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
pub struct ElementDecl {
    type_ref: Option<ComponentRef>,
    min_occurs: u32,
    max_occurs: Option<u32>,
    nillable: bool,
    block: BlockSet,
    identity_constraints: Vec<Ref<IdentityConstraint>>,
    value_constraint: Option<ValueConstraint>,
    scope: OnceLock<ConstraintScope>,
}

impl Default for ElementDecl {
    fn default() -> Self {
        Self {
            type_ref: None,
            min_occurs: 1,
            max_occurs: Some(1),
            nillable: false,
            block: BlockSet::default(),
            identity_constraints: Vec::new(),
            value_constraint: None,
            scope: OnceLock::new(),
        }
    }
}

impl ElementDecl {
    pub fn type_ref(&self) -> Option<ComponentRef> {
        self.type_ref
    }

    pub fn set_type(&mut self, ty: impl Into<ComponentRef>) {
        self.type_ref = Some(ty.into());
    }

    pub fn occurs(&self) -> (u32, Option<u32>) {
        (self.min_occurs, self.max_occurs)
    }

    pub fn set_occurs(&mut self, min: u32, max: Option<u32>) {
        self.min_occurs = min;
        self.max_occurs = max;
    }

    pub fn is_nillable(&self) -> bool {
        self.nillable
    }

    pub fn set_nillable(&mut self, nillable: bool) {
        self.nillable = nillable;
    }

    pub fn block(&self) -> BlockSet {
        self.block
    }

    pub fn set_block(&mut self, extension: bool, restriction: bool, substitution: bool) {
        self.block = BlockSet {
            extension,
            restriction,
            substitution,
        };
    }

    pub fn identity_constraints(&self) -> &[Ref<IdentityConstraint>] {
        &self.identity_constraints
    }

    pub fn set_identity_constraints(&mut self, constraints: Vec<Ref<IdentityConstraint>>) {
        self.identity_constraints = constraints;
        self.scope.take();
    }

    pub fn attach_identity_constraint(&mut self, constraint: Ref<IdentityConstraint>) {
        self.identity_constraints.push(constraint);
        self.scope.take();
    }

    pub fn value_constraint(&self) -> Option<&ValueConstraint> {
        self.value_constraint.as_ref()
    }

    pub fn set_value_constraint(&mut self, constraint: ValueConstraint) {
        self.value_constraint = Some(constraint);
    }

    /// The attached constraints split by category, computed once until the
    /// constraint list changes
    pub fn constraint_scope(
        &self,
        arena: &ComponentArena,
    ) -> Result<&ConstraintScope, SchemaError> {
        if let Some(scope) = self.scope.get() {
            return Ok(scope);
        }

        let mut scope = ConstraintScope::default();
        for &constraint in &self.identity_constraints {
            match arena.payload(constraint)?.category() {
                Some(ConstraintCategory::Key) => scope.keys.push(constraint),
                Some(ConstraintCategory::Unique) => scope.uniques.push(constraint),
                Some(ConstraintCategory::Keyref) => scope.keyrefs.push(constraint),
                None => {
                    return Err(SchemaError::Unpopulated {
                        component: constraint.erase(),
                        kind: ComponentKind::IdentityConstraint,
                        reason: "constraint category was never set",
                    })
                }
            }
        }

        Ok(self.scope.get_or_init(|| scope))
    }
}

/// Builtin primitive types understood by the lexical layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Primitive {
    String,
    Boolean,
    Decimal,
    Integer,
    Double,
    AnyUri,
    QName,
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "xs:string",
            Self::Boolean => "xs:boolean",
            Self::Decimal => "xs:decimal",
            Self::Integer => "xs:integer",
            Self::Double => "xs:double",
            Self::AnyUri => "xs:anyURI",
            Self::QName => "xs:QName",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Variety {
    Atomic(Primitive),
    List(Ref<SimpleType>),
    Union(Vec<Ref<SimpleType>>),
}

impl Variety {
    pub fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleType {
    variety: Variety,
}

impl SimpleType {
    pub fn atomic(primitive: Primitive) -> Self {
        Self {
            variety: Variety::Atomic(primitive),
        }
    }

    pub fn list(item: Ref<SimpleType>) -> Self {
        Self {
            variety: Variety::List(item),
        }
    }

    pub fn union(members: Vec<Ref<SimpleType>>) -> Self {
        Self {
            variety: Variety::Union(members),
        }
    }

    pub fn variety(&self) -> &Variety {
        &self.variety
    }
}

//! Core component model for the xsom XML Schema compiler
//!
//! Components live in a [`ComponentArena`] and refer to each other through
//! copyable [`Ref`] handles, so a component can point at another one before
//! the referent has been populated. Lazily realized default/fixed values and
//! lazily compiled identity-constraint paths ride on top of that model.

pub mod arena;
pub mod component;
pub mod error;
pub mod identity;
pub mod qname;
pub mod value;
pub mod xpath;

pub use arena::{ComponentArena, ComponentRef, Payload, Ref};
pub use component::{
    Annotation, AttributeDecl, AttributeGroup, AttributeScope, AttributeUse, BlockSet,
    Component, ComponentData, ComponentKind, Compositor, ConstraintScope, ElementDecl, Identity,
    ModelGroup, Particle, Primitive, SimpleType, Term, ValueConstraint, Variety,
};
pub use error::SchemaError;
pub use identity::{CompiledPaths, ConstraintCategory, IdentityConstraint};
pub use qname::{is_ncname, NamespaceContext, QName, QNameError};
pub use value::{LazyValue, SimpleTypeResolver, XmlValue};
pub use xpath::{compile_path, CompiledPath, PathCompileError};

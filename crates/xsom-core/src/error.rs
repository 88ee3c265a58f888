use thiserror::Error;

use crate::arena::ComponentRef;
use crate::component::{ComponentKind, Primitive};
use crate::identity::ConstraintCategory;
use crate::qname::QNameError;
use crate::xpath::PathCompileError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("{what} already initialized as {existing}, refusing {requested}")]
    Initialization {
        what: String,
        existing: String,
        requested: String,
    },

    #[error("Cannot mutate {component}: the type system has been published")]
    State { component: String },

    #[error("Expected {expected} at {component}, found {found}")]
    KindMismatch {
        component: ComponentRef,
        expected: &'static str,
        found: ComponentKind,
    },

    #[error("Referenced key can only be attached to a keyref, constraint category is {0:?}")]
    NotKeyref(Option<ConstraintCategory>),

    #[error("{kind} {component} was never populated: {reason}")]
    Unpopulated {
        component: ComponentRef,
        kind: ComponentKind,
        reason: &'static str,
    },

    #[error("Invalid {primitive} literal {text:?}: {reason}")]
    InvalidLexical {
        primitive: Primitive,
        text: String,
        reason: String,
    },

    #[error("Initializer does not match the variety of {0}: {1}")]
    InitializerMismatch(ComponentRef, &'static str),

    #[error(transparent)]
    PathCompile(#[from] PathCompileError),

    #[error(transparent)]
    QName(#[from] QNameError),
}

impl SchemaError {
    /// True for violations of the component contracts (double init,
    /// post-publish mutation, wrong kind), as opposed to bad input values.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::Initialization { .. }
                | Self::State { .. }
                | Self::KindMismatch { .. }
                | Self::NotKeyref(_)
                | Self::Unpopulated { .. }
                | Self::PathCompile(_)
        )
    }
}

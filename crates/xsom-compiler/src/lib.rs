//! Compilation state and incremental build driver for xsom
//!
//! [`CompilationState`] owns the components of one compilation together with
//! its global symbol tables and records namespace dependencies as documents
//! look each other up. [`IncrementalCompiler`] drives a [`SchemaFrontend`]
//! over a resource loader, either from scratch or by recompiling only what a
//! set of changed files affects.

pub mod config;
pub mod driver;
pub mod error;
pub mod fingerprint;
pub mod state;
pub mod type_system;
pub mod validation;

pub use config::{CompilerConfig, DuplicatePolicy};
pub use driver::{BuildOutput, BuildRecord, IncrementalCompiler, SchemaFrontend};
pub use error::{CompileError, Result};
pub use fingerprint::{ChangeSet, FileFingerprint, FileFingerprints};
pub use state::{CompilationState, Diagnostic, DocumentScope, IdentityConstraintDef, Severity};
pub use type_system::TypeSystem;
pub use validation::{check_path_syntax, PathSyntaxError};

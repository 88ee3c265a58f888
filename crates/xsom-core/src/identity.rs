//! Identity constraints (key, unique, keyref)
//!
//! The selector and field paths are stored as text and compiled together on
//! first access. The compiled result is published through a `OnceLock`:
//! concurrent first callers may each compile, but exactly one result is
//! stored and every caller observes that one. Compilation is a pure function
//! of the stored text and prefix map, so the losing compilations are equal
//! to the winner and are simply dropped. Failures are never cached.

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::arena::Ref;
use crate::error::SchemaError;
use crate::qname::NamespaceContext;
use crate::xpath::{compile_path, CompiledPath, PathCompileError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstraintCategory {
    Key,
    Unique,
    Keyref,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPaths {
    pub selector: CompiledPath,
    pub fields: Vec<CompiledPath>,
}

#[derive(Debug, Default)]
pub struct IdentityConstraint {
    category: Option<ConstraintCategory>,
    selector: String,
    fields: Vec<String>,
    prefixes: NamespaceContext,
    referenced_key: Option<Ref<IdentityConstraint>>,
    compiled: OnceLock<CompiledPaths>,
}

impl IdentityConstraint {
    /// The default namespace binding is dropped from `prefixes`; path
    /// expressions never use it.
    pub fn new<F, S>(selector: impl Into<String>, fields: F, prefixes: NamespaceContext) -> Self
    where
        F: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            category: None,
            selector: selector.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            prefixes: prefixes.without_default(),
            referenced_key: None,
            compiled: OnceLock::new(),
        }
    }

    pub fn category(&self) -> Option<ConstraintCategory> {
        self.category
    }

    /// Single-assignment, with the same contract as `Component::init`
    pub fn set_category(&mut self, category: ConstraintCategory) -> Result<(), SchemaError> {
        match self.category {
            None => {
                self.category = Some(category);
                Ok(())
            }
            Some(existing) if existing == category => Ok(()),
            Some(existing) => Err(SchemaError::Initialization {
                what: "identity constraint category".to_string(),
                existing: format!("{:?}", existing),
                requested: format!("{:?}", category),
            }),
        }
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn prefixes(&self) -> &NamespaceContext {
        &self.prefixes
    }

    pub fn set_selector(&mut self, selector: impl Into<String>) {
        self.selector = selector.into();
        self.compiled.take();
    }

    pub fn set_fields<F, S>(&mut self, fields: F)
    where
        F: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self.compiled.take();
    }

    pub fn set_prefixes(&mut self, prefixes: NamespaceContext) {
        self.prefixes = prefixes.without_default();
        self.compiled.take();
    }

    pub fn compiled_selector(&self) -> Result<&CompiledPath, PathCompileError> {
        Ok(&self.compiled_paths()?.selector)
    }

    pub fn compiled_fields(&self) -> Result<&[CompiledPath], PathCompileError> {
        Ok(&self.compiled_paths()?.fields)
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled.get().is_some()
    }

    /// Compile selector and every field together, once.
    pub fn compiled_paths(&self) -> Result<&CompiledPaths, PathCompileError> {
        if let Some(paths) = self.compiled.get() {
            return Ok(paths);
        }

        let selector = compile_path(&self.selector, &self.prefixes)?;
        let fields = self
            .fields
            .iter()
            .map(|field| compile_path(field, &self.prefixes))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(
            "Compiled identity constraint paths: {} with {} field(s)",
            self.selector,
            fields.len()
        );

        Ok(self.compiled.get_or_init(|| CompiledPaths { selector, fields }))
    }

    /// Keys and uniques are always resolved; a keyref once its key is attached
    pub fn is_resolved(&self) -> bool {
        match self.category {
            Some(ConstraintCategory::Key | ConstraintCategory::Unique) => true,
            Some(ConstraintCategory::Keyref) => self.referenced_key.is_some(),
            None => false,
        }
    }

    pub fn referenced_key(&self) -> Option<Ref<IdentityConstraint>> {
        self.referenced_key
    }

    pub fn set_referenced_key(&mut self, key: Ref<IdentityConstraint>) -> Result<(), SchemaError> {
        if self.category != Some(ConstraintCategory::Keyref) {
            return Err(SchemaError::NotKeyref(self.category));
        }
        self.referenced_key = Some(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::ComponentArena;
    use crate::qname::QName;
    use crate::xpath::{NameTest, Step};
    use std::sync::Arc;
    use std::thread;

    fn orders() -> NamespaceContext {
        let mut ctx = NamespaceContext::new();
        ctx.bind("po", "urn:orders").bind("", "urn:default");
        ctx
    }

    #[test]
    fn test_paths_compiled_once_and_cached() {
        let ic = IdentityConstraint::new(".//po:item", ["@id", "po:sku"], orders());
        assert!(!ic.is_compiled());

        let selector: *const CompiledPath = ic.compiled_selector().unwrap();
        assert!(ic.is_compiled());
        assert!(std::ptr::eq(selector, ic.compiled_selector().unwrap()));

        let fields = ic.compiled_fields().unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(
            fields[1].alternatives()[0].steps,
            vec![Step::Child(NameTest::Name(QName::new("urn:orders", "sku")))]
        );
    }

    #[test]
    fn test_default_namespace_is_not_used_by_paths() {
        let ic = IdentityConstraint::new("item", ["@id"], orders());
        let selector = ic.compiled_selector().unwrap();
        assert_eq!(
            selector.alternatives()[0].steps,
            vec![Step::Child(NameTest::Name(QName::unqualified("item")))]
        );
    }

    #[test]
    fn test_compile_failure_surfaces_and_is_not_cached() {
        let mut ic = IdentityConstraint::new("po:item", ["zz:id"], orders());
        let err = ic.compiled_fields().unwrap_err();
        assert_eq!(err.expression, "zz:id");
        assert!(!ic.is_compiled());

        ic.set_fields(["po:id"]);
        assert!(ic.compiled_fields().is_ok());
    }

    #[test]
    fn test_mutators_invalidate_cache() {
        let mut ic = IdentityConstraint::new("po:item", ["@id"], orders());
        ic.compiled_selector().unwrap();
        assert!(ic.is_compiled());

        ic.set_selector("po:order");
        assert!(!ic.is_compiled());
        assert_eq!(
            ic.compiled_selector().unwrap().expression(),
            "po:order"
        );

        ic.set_prefixes([("po", "urn:other")].into_iter().collect());
        assert!(!ic.is_compiled());
        assert_eq!(
            ic.compiled_selector().unwrap().alternatives()[0].steps,
            vec![Step::Child(NameTest::Name(QName::new("urn:other", "order")))]
        );
    }

    #[test]
    fn test_concurrent_first_access_publishes_one_result() {
        let ic = Arc::new(IdentityConstraint::new(".//po:item", ["@id"], orders()));

        let addresses: Vec<usize> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let ic = Arc::clone(&ic);
                    s.spawn(move || ic.compiled_selector().unwrap() as *const CompiledPath as usize)
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(addresses.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_resolution_by_category() {
        let mut arena = ComponentArena::new();
        let key = arena
            .alloc(IdentityConstraint::new("po:item", ["@id"], orders()))
            .unwrap();
        let unique = arena
            .alloc(IdentityConstraint::new("po:item", ["@sku"], orders()))
            .unwrap();
        let keyref = arena
            .alloc(IdentityConstraint::new("po:line", ["@item"], orders()))
            .unwrap();

        arena.payload_mut(key).unwrap().set_category(ConstraintCategory::Key).unwrap();
        arena.payload_mut(unique).unwrap().set_category(ConstraintCategory::Unique).unwrap();
        arena.payload_mut(keyref).unwrap().set_category(ConstraintCategory::Keyref).unwrap();

        assert!(arena.payload(key).unwrap().is_resolved());
        assert!(arena.payload(unique).unwrap().is_resolved());
        assert!(!arena.payload(keyref).unwrap().is_resolved());
        assert_eq!(arena.payload(keyref).unwrap().referenced_key(), None);

        arena.payload_mut(keyref).unwrap().set_referenced_key(key).unwrap();
        assert!(arena.payload(keyref).unwrap().is_resolved());
        assert_eq!(arena.payload(keyref).unwrap().referenced_key(), Some(key));
    }

    #[test]
    fn test_referenced_key_only_on_keyref() {
        let mut arena = ComponentArena::new();
        let key = arena
            .alloc(IdentityConstraint::new("po:item", ["@id"], orders()))
            .unwrap();
        arena.payload_mut(key).unwrap().set_category(ConstraintCategory::Key).unwrap();

        let err = arena.payload_mut(key).unwrap().set_referenced_key(key).unwrap_err();
        assert_eq!(err, SchemaError::NotKeyref(Some(ConstraintCategory::Key)));
    }

    #[test]
    fn test_category_is_single_assignment() {
        let mut ic = IdentityConstraint::new("po:item", ["@id"], orders());
        ic.set_category(ConstraintCategory::Unique).unwrap();
        ic.set_category(ConstraintCategory::Unique).unwrap();
        assert!(matches!(
            ic.set_category(ConstraintCategory::Key),
            Err(SchemaError::Initialization { .. })
        ));
    }
}

//! Component arena and handles
//!
//! Every component is allocated up front, possibly long before the compiler
//! knows its contents, and is addressed through a [`Ref`]: a copyable index
//! into the arena. Components can therefore point at each other cyclically
//! or ahead of time without owning each other.
//!
//! The arena has two phases. While building, any component can be populated
//! and mutated through [`ComponentArena::component_mut`] and
//! [`ComponentArena::payload_mut`]. After [`ComponentArena::publish`] the
//! arena is frozen and every mutator returns [`SchemaError::State`].

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use tracing::{debug, trace};

use crate::component::{
    AttributeDecl, AttributeGroup, Component, ComponentData, ComponentKind, ElementDecl,
    ModelGroup, SimpleType, Variety,
};
use crate::error::SchemaError;
use crate::identity::IdentityConstraint;
use crate::qname::NamespaceContext;
use crate::value::{lexical, realize_text, SimpleTypeResolver, XmlValue};

/// Kind-erased handle, used where a list mixes component kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentRef(u32);

impl ComponentRef {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Typed handle to a component whose payload is a `T`
pub struct Ref<T> {
    index: u32,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Ref<T> {
    fn new(index: u32) -> Self {
        Self {
            index,
            _payload: PhantomData,
        }
    }

    pub fn erase(self) -> ComponentRef {
        ComponentRef(self.index)
    }

    pub fn index(self) -> usize {
        self.index as usize
    }
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Ref<T> {}

impl<T> PartialEq for Ref<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Ref<T> {}

impl<T> Hash for Ref<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ref(#{})", self.index)
    }
}

impl<T> From<Ref<T>> for ComponentRef {
    fn from(r: Ref<T>) -> Self {
        r.erase()
    }
}

/// Payload types that can be stored in the arena
pub trait Payload: Sized + Send + Sync + 'static {
    /// Human-readable kind used in mismatch errors
    const NAME: &'static str;

    fn into_data(self) -> ComponentData;
    fn project(data: &ComponentData) -> Option<&Self>;
    fn project_mut(data: &mut ComponentData) -> Option<&mut Self>;
}

macro_rules! impl_payload {
    ($ty:ty, $variant:ident, $name:literal) => {
        impl Payload for $ty {
            const NAME: &'static str = $name;

            fn into_data(self) -> ComponentData {
                ComponentData::$variant(self)
            }

            fn project(data: &ComponentData) -> Option<&Self> {
                match data {
                    ComponentData::$variant(payload) => Some(payload),
                    _ => None,
                }
            }

            fn project_mut(data: &mut ComponentData) -> Option<&mut Self> {
                match data {
                    ComponentData::$variant(payload) => Some(payload),
                    _ => None,
                }
            }
        }
    };
}

impl_payload!(AttributeGroup, AttributeGroup, "attribute group");
impl_payload!(ModelGroup, ModelGroup, "model group");
impl_payload!(IdentityConstraint, IdentityConstraint, "identity constraint");
impl_payload!(AttributeDecl, Attribute, "attribute");
impl_payload!(ElementDecl, LocalElement, "local element");
impl_payload!(SimpleType, SimpleType, "simple type");

/// Owner of every component of one compilation
#[derive(Debug, Default)]
pub struct ComponentArena {
    // Boxed so a component keeps its address while the arena grows
    components: Vec<Box<Component>>,
    published: bool,
}

impl ComponentArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an unpopulated component and return its canonical handle
    pub fn alloc<T: Payload>(&mut self, payload: T) -> Result<Ref<T>, SchemaError> {
        if self.published {
            return Err(SchemaError::State {
                component: format!("new {}", T::NAME),
            });
        }

        let index = u32::try_from(self.components.len()).map_err(|_| SchemaError::State {
            component: "arena (handle space exhausted)".to_string(),
        })?;
        let handle = Ref::new(index);
        self.components
            .push(Box::new(Component::new(handle.erase(), payload.into_data())));
        trace!("Allocated {} {}", T::NAME, handle.erase());
        Ok(handle)
    }

    /// Look up the component behind a handle.
    ///
    /// Always returns the same instance for the same handle, populated or not.
    ///
    /// # Panics
    ///
    /// Panics if the handle was issued by a different arena and is out of range.
    pub fn get(&self, handle: impl Into<ComponentRef>) -> &Component {
        &*self.components[handle.into().index()]
    }

    pub fn try_get(&self, handle: impl Into<ComponentRef>) -> Option<&Component> {
        self.components.get(handle.into().index()).map(|c| &**c)
    }

    pub fn payload<T: Payload>(&self, handle: Ref<T>) -> Result<&T, SchemaError> {
        let component = self.get(handle);
        T::project(component.data()).ok_or(SchemaError::KindMismatch {
            component: handle.erase(),
            expected: T::NAME,
            found: component.kind(),
        })
    }

    /// Recover a typed handle from an erased one, if the kinds agree
    pub fn downcast<T: Payload>(&self, handle: ComponentRef) -> Option<Ref<T>> {
        let component = self.try_get(handle)?;
        T::project(component.data()).map(|_| Ref::new(handle.0))
    }

    pub fn component_mut(
        &mut self,
        handle: impl Into<ComponentRef>,
    ) -> Result<&mut Component, SchemaError> {
        let handle = handle.into();
        if self.published {
            return Err(SchemaError::State {
                component: handle.to_string(),
            });
        }
        Ok(&mut *self.components[handle.index()])
    }

    pub fn payload_mut<T: Payload>(&mut self, handle: Ref<T>) -> Result<&mut T, SchemaError> {
        let component = self.component_mut(handle)?;
        let found = component.kind();
        T::project_mut(component.data_mut()).ok_or(SchemaError::KindMismatch {
            component: handle.erase(),
            expected: T::NAME,
            found,
        })
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Component> {
        self.components.iter().map(|c| &**c)
    }

    pub fn refs_of_kind(&self, kind: ComponentKind) -> impl Iterator<Item = ComponentRef> + '_ {
        self.iter()
            .filter(move |c| c.kind() == kind)
            .map(Component::self_ref)
    }

    pub fn is_published(&self) -> bool {
        self.published
    }

    /// Freeze the arena once every component has been populated.
    ///
    /// Publishing twice is a no-op.
    pub fn publish(&mut self) -> Result<(), SchemaError> {
        if self.published {
            return Ok(());
        }

        for component in self.iter() {
            let unpopulated = |reason| SchemaError::Unpopulated {
                component: component.self_ref(),
                kind: component.kind(),
                reason,
            };

            if component.identity().is_none() {
                return Err(unpopulated("identity was never initialized"));
            }
            if let ComponentData::IdentityConstraint(ic) = component.data() {
                if ic.category().is_none() {
                    return Err(unpopulated("constraint category was never set"));
                }
                if !ic.is_resolved() {
                    return Err(unpopulated("keyref has no referenced key"));
                }
            }
        }

        self.published = true;
        debug!("Published type system with {} components", self.len());
        Ok(())
    }
}

impl SimpleTypeResolver for ComponentArena {
    fn variety(&self, ty: Ref<SimpleType>) -> Result<Variety, SchemaError> {
        Ok(self.payload(ty)?.variety().clone())
    }

    fn parse_text(
        &self,
        ty: Ref<SimpleType>,
        text: &str,
        ns: Option<&NamespaceContext>,
    ) -> Result<XmlValue, SchemaError> {
        match self.payload(ty)?.variety() {
            Variety::Atomic(primitive) => lexical::parse(*primitive, text, ns),
            Variety::List(_) => Err(SchemaError::InitializerMismatch(
                ty.erase(),
                "list types are realized item by item",
            )),
            Variety::Union(members) => {
                let mut last_error = SchemaError::InitializerMismatch(ty.erase(), "empty union");
                for member in members {
                    match realize_text(self, *member, text, ns) {
                        Ok(value) => return Ok(value),
                        Err(e) => last_error = e,
                    }
                }
                Err(last_error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Identity, Primitive};
    use crate::identity::ConstraintCategory;
    use crate::qname::QName;

    fn named(local: &str) -> Identity {
        Identity::named(QName::new("urn:test", local))
    }

    #[test]
    fn test_get_returns_same_instance_before_and_after_population() {
        let mut arena = ComponentArena::new();
        let group = arena.alloc(ModelGroup::default()).unwrap();

        let before: *const Component = arena.get(group);
        assert!(std::ptr::eq(before, arena.get(group)));
        assert!(arena.get(group).identity().is_none());

        // grow the arena so the backing vector reallocates
        for _ in 0..64 {
            arena.alloc(AttributeGroup::default()).unwrap();
        }
        arena.component_mut(group).unwrap().init(named("g")).unwrap();

        let after: *const Component = arena.get(group);
        assert!(std::ptr::eq(before, after));
        assert_eq!(arena.get(group).self_ref(), group.erase());
        assert_eq!(arena.get(group).name(), Some(&QName::new("urn:test", "g")));
    }

    #[test]
    fn test_payload_kind_mismatch_through_downcast() {
        let mut arena = ComponentArena::new();
        let attr_group = arena.alloc(AttributeGroup::default()).unwrap();

        assert!(arena.downcast::<ModelGroup>(attr_group.erase()).is_none());
        assert_eq!(
            arena.downcast::<AttributeGroup>(attr_group.erase()),
            Some(attr_group)
        );
    }

    #[test]
    fn test_publish_rejects_unpopulated_components() {
        let mut arena = ComponentArena::new();
        let group = arena.alloc(AttributeGroup::default()).unwrap();

        let err = arena.publish().unwrap_err();
        assert!(matches!(
            err,
            SchemaError::Unpopulated { component, .. } if component == group.erase()
        ));
        assert!(!arena.is_published());
    }

    #[test]
    fn test_mutation_after_publish_is_state_error() {
        let mut arena = ComponentArena::new();
        let ty = arena
            .alloc(SimpleType::atomic(Primitive::Integer))
            .unwrap();
        arena.component_mut(ty).unwrap().init(named("int")).unwrap();
        arena.publish().unwrap();

        assert!(matches!(
            arena.component_mut(ty),
            Err(SchemaError::State { .. })
        ));
        assert!(matches!(
            arena.alloc(ModelGroup::default()),
            Err(SchemaError::State { .. })
        ));
        // reads still work
        assert_eq!(arena.get(ty).kind(), ComponentKind::SimpleType);
    }

    #[test]
    fn test_publish_requires_resolved_keyrefs() {
        let mut arena = ComponentArena::new();
        let key = arena
            .alloc(IdentityConstraint::new("po:item", ["@id"], Default::default()))
            .unwrap();
        let keyref = arena
            .alloc(IdentityConstraint::new("po:ref", ["@to"], Default::default()))
            .unwrap();

        arena.component_mut(key).unwrap().init(named("k")).unwrap();
        arena.payload_mut(key).unwrap().set_category(ConstraintCategory::Key).unwrap();
        arena.component_mut(keyref).unwrap().init(named("kr")).unwrap();
        arena.payload_mut(keyref).unwrap().set_category(ConstraintCategory::Keyref).unwrap();

        assert!(matches!(arena.publish(), Err(SchemaError::Unpopulated { .. })));

        arena.payload_mut(keyref).unwrap().set_referenced_key(key).unwrap();
        arena.publish().unwrap();
    }
}

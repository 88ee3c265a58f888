//! Realized simple-type values and their lazy descriptors
//!
//! A [`LazyValue`] holds either a realized [`XmlValue`] or the type plus raw
//! initializer needed to realize it. Realization happens on the first
//! [`LazyValue::get`] and is cached for the life of the value.

pub mod lexical;

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::arena::Ref;
use crate::component::{SimpleType, Variety};
use crate::error::SchemaError;
use crate::qname::{NamespaceContext, QName};

#[derive(Debug, Clone, PartialEq)]
pub enum XmlValue {
    String(String),
    Boolean(bool),
    Integer(i64),
    /// Canonical lexical form
    Decimal(String),
    Double(f64),
    AnyUri(String),
    QName(QName),
    /// Items are shared with the lazy values that realized them
    List(Vec<Arc<XmlValue>>),
}

impl XmlValue {
    pub fn list(items: impl IntoIterator<Item = XmlValue>) -> Self {
        Self::List(items.into_iter().map(Arc::new).collect())
    }
}

impl Drop for XmlValue {
    // nested lists are unlinked one level at a time
    fn drop(&mut self) {
        let Self::List(items) = self else {
            return;
        };
        let mut pending = std::mem::take(items);
        while let Some(item) = pending.pop() {
            if let Some(mut value) = Arc::into_inner(item) {
                if let Self::List(children) = &mut value {
                    pending.append(children);
                }
            }
        }
    }
}

impl fmt::Display for XmlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) | Self::Decimal(s) | Self::AnyUri(s) => f.write_str(s),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Double(d) if d.is_infinite() => {
                f.write_str(if *d > 0.0 { "INF" } else { "-INF" })
            }
            Self::Double(d) if d.is_nan() => f.write_str("NaN"),
            Self::Double(d) => write!(f, "{}", d),
            Self::QName(q) => write!(f, "{}", q),
            Self::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}", item)?;
                }
                Ok(())
            }
        }
    }
}

/// Access to simple-type definitions, needed to realize a value
pub trait SimpleTypeResolver {
    fn variety(&self, ty: Ref<SimpleType>) -> Result<Variety, SchemaError>;

    /// Parse one literal of a non-list type
    fn parse_text(
        &self,
        ty: Ref<SimpleType>,
        text: &str,
        ns: Option<&NamespaceContext>,
    ) -> Result<XmlValue, SchemaError>;
}

/// Realize literal text against any variety.
///
/// List types split the text on whitespace and parse each token as the item
/// type.
pub fn realize_text<R: SimpleTypeResolver + ?Sized>(
    resolver: &R,
    ty: Ref<SimpleType>,
    text: &str,
    ns: Option<&NamespaceContext>,
) -> Result<XmlValue, SchemaError> {
    let Variety::List(item) = resolver.variety(ty)? else {
        return resolver.parse_text(ty, text, ns);
    };

    if resolver.variety(item)?.is_list() {
        return Err(SchemaError::InitializerMismatch(
            item.erase(),
            "list item type is itself a list",
        ));
    }
    let items = text
        .split_ascii_whitespace()
        .map(|token| resolver.parse_text(item, token, ns).map(Arc::new))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(XmlValue::List(items))
}

#[derive(Debug)]
enum Initializer {
    Text {
        text: String,
        ns: Option<NamespaceContext>,
    },
    List(Vec<Arc<LazyValue>>),
}

#[derive(Debug)]
enum LazyState {
    Realized(Arc<XmlValue>),
    Unresolved {
        ty: Ref<SimpleType>,
        init: Initializer,
    },
}

/// A value computed at most once, on first access.
///
/// The lock is held for the whole realization, so a second caller arriving
/// meanwhile waits and then reads the cached result.
#[derive(Debug)]
pub struct LazyValue {
    state: Mutex<LazyState>,
}

/// Outcome of inspecting one list item
enum ItemStep {
    Ready(Arc<XmlValue>),
    Descend {
        item_type: Ref<SimpleType>,
        items: Vec<Arc<LazyValue>>,
    },
}

/// One list being assembled on the explicit resolution stack
struct Frame {
    owner: Option<Arc<LazyValue>>,
    item_type: Ref<SimpleType>,
    items: Vec<Arc<LazyValue>>,
    next: usize,
    done: Vec<Arc<XmlValue>>,
}

impl Frame {
    fn new(
        owner: Option<Arc<LazyValue>>,
        item_type: Ref<SimpleType>,
        items: Vec<Arc<LazyValue>>,
    ) -> Self {
        let done = Vec::with_capacity(items.len());
        Self {
            owner,
            item_type,
            items,
            next: 0,
            done,
        }
    }
}

impl LazyValue {
    pub fn realized(value: XmlValue) -> Self {
        Self::with_state(LazyState::Realized(Arc::new(value)))
    }

    /// Literal text, with the prefix bindings in scope where it was written
    pub fn text(
        ty: Ref<SimpleType>,
        text: impl Into<String>,
        ns: Option<NamespaceContext>,
    ) -> Self {
        Self::with_state(LazyState::Unresolved {
            ty,
            init: Initializer::Text {
                text: text.into(),
                ns,
            },
        })
    }

    /// An ordered sequence of item values for a list type
    pub fn list(ty: Ref<SimpleType>, items: impl IntoIterator<Item = LazyValue>) -> Self {
        Self::shared_list(ty, items.into_iter().map(Arc::new))
    }

    /// Like [`LazyValue::list`], for items shared with other values
    pub fn shared_list(
        ty: Ref<SimpleType>,
        items: impl IntoIterator<Item = Arc<LazyValue>>,
    ) -> Self {
        Self::with_state(LazyState::Unresolved {
            ty,
            init: Initializer::List(items.into_iter().collect()),
        })
    }

    fn with_state(state: LazyState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn is_realized(&self) -> bool {
        matches!(*self.state.lock(), LazyState::Realized(_))
    }

    /// The realized value, if some caller already computed it
    pub fn peek(&self) -> Option<Arc<XmlValue>> {
        match &*self.state.lock() {
            LazyState::Realized(value) => Some(Arc::clone(value)),
            LazyState::Unresolved { .. } => None,
        }
    }

    /// Realize the value on first call and return the cached one afterwards.
    ///
    /// A failed realization is not cached; the next call retries.
    pub fn get<R: SimpleTypeResolver + ?Sized>(
        &self,
        resolver: &R,
    ) -> Result<Arc<XmlValue>, SchemaError> {
        let mut state = self.state.lock();
        let value = match &*state {
            LazyState::Realized(value) => return Ok(Arc::clone(value)),
            LazyState::Unresolved {
                ty,
                init: Initializer::Text { text, ns },
            } => Arc::new(realize_text(resolver, *ty, text, ns.as_ref())?),
            LazyState::Unresolved {
                ty,
                init: Initializer::List(items),
            } => {
                let item_type = list_item_type(resolver, *ty)?;
                resolve_items(resolver, item_type, items.clone())?
            }
        };

        *state = LazyState::Realized(Arc::clone(&value));
        Ok(value)
    }

    /// Inspect this value as an item of a list over `item_type`, realizing
    /// it in place when it is text. The lock is released before returning.
    fn step<R: SimpleTypeResolver + ?Sized>(
        &self,
        resolver: &R,
        item_type: Ref<SimpleType>,
    ) -> Result<ItemStep, SchemaError> {
        let mut state = self.state.lock();
        let value = match &*state {
            LazyState::Realized(value) => return Ok(ItemStep::Ready(Arc::clone(value))),
            LazyState::Unresolved { ty, .. } if *ty != item_type => {
                return Err(SchemaError::InitializerMismatch(
                    ty.erase(),
                    "list item is not of the list's item type",
                ));
            }
            LazyState::Unresolved {
                ty,
                init: Initializer::Text { text, ns },
            } => Arc::new(realize_text(resolver, *ty, text, ns.as_ref())?),
            LazyState::Unresolved {
                ty,
                init: Initializer::List(items),
            } => {
                return Ok(ItemStep::Descend {
                    item_type: list_item_type(resolver, *ty)?,
                    items: items.clone(),
                });
            }
        };

        *state = LazyState::Realized(Arc::clone(&value));
        Ok(ItemStep::Ready(value))
    }

    /// Store a value computed outside the lock. If another caller got there
    /// first, its result wins and is returned.
    fn publish(&self, value: Arc<XmlValue>) -> Arc<XmlValue> {
        let mut state = self.state.lock();
        match &*state {
            LazyState::Realized(existing) => Arc::clone(existing),
            LazyState::Unresolved { .. } => {
                *state = LazyState::Realized(Arc::clone(&value));
                value
            }
        }
    }
}

impl Drop for LazyValue {
    // unresolved item sequences are unlinked iteratively, like nested lists
    fn drop(&mut self) {
        let mut pending = Vec::new();
        take_items(self.state.get_mut(), &mut pending);
        while let Some(item) = pending.pop() {
            if let Some(mut item) = Arc::into_inner(item) {
                take_items(item.state.get_mut(), &mut pending);
            }
        }
    }
}

fn take_items(state: &mut LazyState, pending: &mut Vec<Arc<LazyValue>>) {
    if let LazyState::Unresolved {
        init: Initializer::List(items),
        ..
    } = state
    {
        pending.append(items);
    }
}

fn list_item_type<R: SimpleTypeResolver + ?Sized>(
    resolver: &R,
    ty: Ref<SimpleType>,
) -> Result<Ref<SimpleType>, SchemaError> {
    match resolver.variety(ty)? {
        Variety::List(item) => Ok(item),
        _ => Err(SchemaError::InitializerMismatch(
            ty.erase(),
            "item sequence given for a type that is not a list",
        )),
    }
}

/// Resolve a list initializer with an explicit stack instead of recursion,
/// so deeply nested item sequences cannot overflow the call stack. Realized
/// items are shared, never copied.
fn resolve_items<R: SimpleTypeResolver + ?Sized>(
    resolver: &R,
    item_type: Ref<SimpleType>,
    items: Vec<Arc<LazyValue>>,
) -> Result<Arc<XmlValue>, SchemaError> {
    let mut stack = vec![Frame::new(None, item_type, items)];

    loop {
        // the root frame returns before the stack can drain
        let Some(frame) = stack.last_mut() else {
            return Ok(Arc::new(XmlValue::List(Vec::new())));
        };

        if frame.next == frame.items.len() {
            let Some(finished) = stack.pop() else {
                continue;
            };
            let list = Arc::new(XmlValue::List(finished.done));
            match (finished.owner, stack.last_mut()) {
                (Some(owner), Some(parent)) => parent.done.push(owner.publish(list)),
                _ => {
                    trace!("Resolved lazy list with {} nested frame(s) remaining", stack.len());
                    return Ok(list);
                }
            }
            continue;
        }

        let item = Arc::clone(&frame.items[frame.next]);
        frame.next += 1;
        match item.step(resolver, frame.item_type)? {
            ItemStep::Ready(value) => frame.done.push(value),
            ItemStep::Descend { item_type, items } => {
                stack.push(Frame::new(Some(item), item_type, items))
            }
        }
    }
}

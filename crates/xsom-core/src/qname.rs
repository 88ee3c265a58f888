//! Qualified names and prefix resolution
//!
//! Names are kept in Clark notation when rendered (`{urn:example}local`), which
//! is also what [`QName::parse`] accepts. A [`NamespaceContext`] carries the
//! prefix bindings in scope at a parse location and turns lexical `p:local`
//! names into [`QName`]s.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// A namespace URI plus local name. The empty namespace means "no namespace".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QName {
    namespace: String,
    local: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QNameError {
    #[error("Empty qualified name")]
    Empty,

    #[error("Invalid Clark notation: {0}")]
    InvalidFormat(String),

    #[error("Not a valid NCName: {0:?}")]
    InvalidNcName(String),

    #[error("Prefix {0:?} is not bound")]
    UnboundPrefix(String),
}

impl QName {
    pub fn new(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local: local.into(),
        }
    }

    /// A name in no namespace
    pub fn unqualified(local: impl Into<String>) -> Self {
        Self::new(String::new(), local)
    }

    /// Parse Clark notation: `{uri}local` or a bare `local`
    pub fn parse(text: &str) -> Result<Self, QNameError> {
        if text.is_empty() {
            return Err(QNameError::Empty);
        }

        let (namespace, local) = match text.strip_prefix('{') {
            Some(rest) => {
                let close = rest
                    .find('}')
                    .ok_or_else(|| QNameError::InvalidFormat(text.to_string()))?;
                (&rest[..close], &rest[close + 1..])
            }
            None => ("", text),
        };

        if !is_ncname(local) {
            return Err(QNameError::InvalidNcName(local.to_string()));
        }

        Ok(Self::new(namespace, local))
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn local_name(&self) -> &str {
        &self.local
    }

    pub fn is_unqualified(&self) -> bool {
        self.namespace.is_empty()
    }

    /// Same local name, different namespace
    pub fn with_namespace(&self, namespace: impl Into<String>) -> Self {
        Self::new(namespace, self.local.clone())
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.local)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local)
        }
    }
}

/// Prefix bindings in scope at a parse location
///
/// The empty prefix is the default namespace. `xml` is always bound.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceContext {
    bindings: BTreeMap<String, String>,
}

impl NamespaceContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, prefix: impl Into<String>, uri: impl Into<String>) -> &mut Self {
        self.bindings.insert(prefix.into(), uri.into());
        self
    }

    pub fn resolve_prefix(&self, prefix: &str) -> Option<&str> {
        match self.bindings.get(prefix) {
            Some(uri) => Some(uri.as_str()),
            None if prefix == "xml" => Some(XML_NAMESPACE),
            None => None,
        }
    }

    /// Resolve a lexical `prefix:local` (or unprefixed `local`) name
    pub fn resolve_qname(&self, lexical: &str) -> Result<QName, QNameError> {
        let lexical = lexical.trim();
        if lexical.is_empty() {
            return Err(QNameError::Empty);
        }

        let (prefix, local) = lexical.split_once(':').unwrap_or(("", lexical));
        if !is_ncname(local) || (!prefix.is_empty() && !is_ncname(prefix)) {
            return Err(QNameError::InvalidNcName(lexical.to_string()));
        }

        match self.resolve_prefix(prefix) {
            Some(uri) => Ok(QName::new(uri, local)),
            None if prefix.is_empty() => Ok(QName::unqualified(local)),
            None => Err(QNameError::UnboundPrefix(prefix.to_string())),
        }
    }

    /// The same bindings minus the default namespace, which path expressions
    /// never consult
    pub fn without_default(&self) -> Self {
        let mut bindings = self.bindings.clone();
        bindings.remove("");
        Self { bindings }
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings.iter().map(|(p, u)| (p.as_str(), u.as_str()))
    }
}

impl<P: Into<String>, U: Into<String>> FromIterator<(P, U)> for NamespaceContext {
    fn from_iter<I: IntoIterator<Item = (P, U)>>(iter: I) -> Self {
        Self {
            bindings: iter
                .into_iter()
                .map(|(p, u)| (p.into(), u.into()))
                .collect(),
        }
    }
}

pub(crate) fn is_ncname_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

pub(crate) fn is_ncname_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '\u{B7}')
}

/// Whether `s` is a non-colonized XML name
pub fn is_ncname(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if is_ncname_start(c) => chars.all(is_ncname_char),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clark_notation_roundtrip() {
        let name = QName::parse("{urn:orders}purchaseOrder").unwrap();
        assert_eq!(name.namespace(), "urn:orders");
        assert_eq!(name.local_name(), "purchaseOrder");
        assert_eq!(name.to_string(), "{urn:orders}purchaseOrder");

        let bare = QName::parse("item").unwrap();
        assert!(bare.is_unqualified());
        assert_eq!(bare.to_string(), "item");
    }

    #[test]
    fn test_parse_rejects_malformed_names() {
        assert_eq!(QName::parse(""), Err(QNameError::Empty));
        assert!(matches!(
            QName::parse("{urn:x"),
            Err(QNameError::InvalidFormat(_))
        ));
        assert!(matches!(
            QName::parse("{urn:x}1abc"),
            Err(QNameError::InvalidNcName(_))
        ));
    }

    #[test]
    fn test_resolve_qname_uses_bindings() {
        let mut ctx = NamespaceContext::new();
        ctx.bind("po", "urn:orders").bind("", "urn:default");

        assert_eq!(
            ctx.resolve_qname("po:item").unwrap(),
            QName::new("urn:orders", "item")
        );
        assert_eq!(
            ctx.resolve_qname("item").unwrap(),
            QName::new("urn:default", "item")
        );
        assert_eq!(
            ctx.resolve_qname("xml:lang").unwrap(),
            QName::new(XML_NAMESPACE, "lang")
        );
        assert_eq!(
            ctx.resolve_qname("zz:item"),
            Err(QNameError::UnboundPrefix("zz".to_string()))
        );
    }

    #[test]
    fn test_without_default_drops_empty_prefix() {
        let ctx: NamespaceContext = [("", "urn:default"), ("a", "urn:a")].into_iter().collect();
        let stripped = ctx.without_default();
        assert_eq!(stripped.resolve_prefix(""), None);
        assert_eq!(stripped.resolve_prefix("a"), Some("urn:a"));
        assert_eq!(
            stripped.resolve_qname("item").unwrap(),
            QName::unqualified("item")
        );
    }
}

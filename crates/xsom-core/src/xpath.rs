//! Compiler for the restricted XPath used by identity-constraint selectors
//! and fields
//!
//! Grammar, with whitespace allowed between tokens:
//!
//! ```text
//! path      := alternative ('|' alternative)*
//! alternative := ('.//')? step ('/' step)*
//! step      := '.' | ('child::')? name-test | ('@' | 'attribute::') name-test
//! name-test := '*' | prefix ':' '*' | (prefix ':')? local
//! ```
//!
//! An attribute step may only appear last. Prefixes resolve through the
//! constraint's prefix map, then through the builtin `xml`, `xs` and `xsi`
//! bindings. Unprefixed names are in no namespace.

use std::fmt;

use crate::qname::{
    is_ncname_char, is_ncname_start, NamespaceContext, QName, XML_NAMESPACE, XSD_NAMESPACE,
    XSI_NAMESPACE,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Cannot compile path {expression:?} at column {column}: {message}")]
pub struct PathCompileError {
    pub expression: String,
    /// 1-based character column
    pub column: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameTest {
    Any,
    AnyInNamespace(String),
    Name(QName),
}

impl NameTest {
    pub fn matches(&self, name: &QName) -> bool {
        match self {
            Self::Any => true,
            Self::AnyInNamespace(ns) => name.namespace() == ns,
            Self::Name(n) => n == name,
        }
    }
}

impl fmt::Display for NameTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::AnyInNamespace(ns) => write!(f, "{{{}}}*", ns),
            Self::Name(n) => write!(f, "{}", n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    SelfNode,
    Child(NameTest),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathAlternative {
    /// Started with `.//`
    pub deep: bool,
    pub steps: Vec<Step>,
    pub attribute: Option<NameTest>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPath {
    expression: String,
    alternatives: Vec<PathAlternative>,
}

impl CompiledPath {
    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn alternatives(&self) -> &[PathAlternative] {
        &self.alternatives
    }

    /// Whether any alternative starts with `.//`
    pub fn is_deep(&self) -> bool {
        self.alternatives.iter().any(|a| a.deep)
    }

    /// Whether any alternative ends on an attribute
    pub fn selects_attribute(&self) -> bool {
        self.alternatives.iter().any(|a| a.attribute.is_some())
    }
}

pub fn compile_path(
    expression: &str,
    prefixes: &NamespaceContext,
) -> Result<CompiledPath, PathCompileError> {
    let mut parser = PathParser {
        expression,
        chars: expression.chars().collect(),
        pos: 0,
        prefixes,
    };

    let mut alternatives = vec![parser.alternative()?];
    loop {
        parser.skip_ws();
        if parser.at_end() {
            break;
        }
        if !parser.eat('|') {
            return Err(parser.error("expected '|' or end of expression"));
        }
        alternatives.push(parser.alternative()?);
    }

    Ok(CompiledPath {
        expression: expression.to_string(),
        alternatives,
    })
}

struct PathParser<'a> {
    expression: &'a str,
    chars: Vec<char>,
    pos: usize,
    prefixes: &'a NamespaceContext,
}

impl PathParser<'_> {
    fn alternative(&mut self) -> Result<PathAlternative, PathCompileError> {
        let deep = self.eat_deep_prefix();
        let mut steps = Vec::new();
        let mut attribute = None;

        loop {
            self.skip_ws();
            if self.eat('@') || self.eat_str("attribute::") {
                attribute = Some(self.name_test()?);
                break;
            }

            if self.eat_str("child::") {
                steps.push(Step::Child(self.name_test()?));
            } else if self.peek() == Some('.') {
                self.pos += 1;
                steps.push(Step::SelfNode);
            } else {
                steps.push(Step::Child(self.name_test()?));
            }

            self.skip_ws();
            if !self.eat('/') {
                break;
            }
        }

        Ok(PathAlternative {
            deep,
            steps,
            attribute,
        })
    }

    /// `.//` with optional whitespace between the tokens
    fn eat_deep_prefix(&mut self) -> bool {
        let start = self.pos;
        self.skip_ws();
        if self.eat('.') {
            self.skip_ws();
            if self.eat('/') {
                self.skip_ws();
                if self.eat('/') {
                    return true;
                }
            }
        }
        self.pos = start;
        false
    }

    fn name_test(&mut self) -> Result<NameTest, PathCompileError> {
        self.skip_ws();
        if self.eat('*') {
            return Ok(NameTest::Any);
        }

        let first = self.ncname()?;
        if self.peek() != Some(':') {
            return Ok(NameTest::Name(QName::unqualified(first)));
        }

        let colon = self.pos;
        self.pos += 1;
        let namespace = self.lookup_prefix(&first, colon)?;
        if self.eat('*') {
            return Ok(NameTest::AnyInNamespace(namespace));
        }
        let local = self.ncname()?;
        Ok(NameTest::Name(QName::new(namespace, local)))
    }

    fn ncname(&mut self) -> Result<String, PathCompileError> {
        match self.peek() {
            Some(c) if is_ncname_start(c) => {}
            Some(c) => return Err(self.error(&format!("expected a name test, found {:?}", c))),
            None => return Err(self.error("expected a name test, found end of expression")),
        }

        let start = self.pos;
        while self.peek().is_some_and(is_ncname_char) {
            self.pos += 1;
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn lookup_prefix(&self, prefix: &str, at: usize) -> Result<String, PathCompileError> {
        if let Some(uri) = self.prefixes.resolve_prefix(prefix) {
            return Ok(uri.to_string());
        }

        let builtin = match prefix {
            "xml" => XML_NAMESPACE,
            "xs" => XSD_NAMESPACE,
            "xsi" => XSI_NAMESPACE,
            _ => {
                return Err(PathCompileError {
                    expression: self.expression.to_string(),
                    column: at + 1,
                    message: format!("prefix {:?} is not bound", prefix),
                })
            }
        };
        Ok(builtin.to_string())
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(|c| matches!(c, ' ' | '\t' | '\r' | '\n')) {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, s: &str) -> bool {
        let len = s.chars().count();
        let matches = self.pos + len <= self.chars.len()
            && self.chars[self.pos..self.pos + len].iter().copied().eq(s.chars());
        if matches {
            self.pos += len;
        }
        matches
    }

    fn error(&self, message: &str) -> PathCompileError {
        PathCompileError {
            expression: self.expression.to_string(),
            column: self.pos + 1,
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn prefixes() -> NamespaceContext {
        [("po", "urn:orders")].into_iter().collect()
    }

    #[test]
    fn test_simple_selector() {
        let path = compile_path("po:order/po:item", &prefixes()).unwrap();
        assert_eq!(path.alternatives().len(), 1);

        let alt = &path.alternatives()[0];
        assert!(!alt.deep);
        assert_eq!(
            alt.steps,
            vec![
                Step::Child(NameTest::Name(QName::new("urn:orders", "order"))),
                Step::Child(NameTest::Name(QName::new("urn:orders", "item"))),
            ]
        );
        assert_eq!(alt.attribute, None);
    }

    #[test]
    fn test_deep_alternatives_with_whitespace() {
        let path = compile_path(" . // po:item | child::note ", &prefixes()).unwrap();
        assert!(path.is_deep());
        assert_eq!(path.alternatives().len(), 2);
        assert!(!path.alternatives()[1].deep);
        assert_eq!(
            path.alternatives()[1].steps,
            vec![Step::Child(NameTest::Name(QName::unqualified("note")))]
        );
    }

    #[test]
    fn test_field_with_attribute_and_wildcards() {
        let path = compile_path("./po:*/@xml:lang", &prefixes()).unwrap();
        let alt = &path.alternatives()[0];
        assert_eq!(
            alt.steps,
            vec![
                Step::SelfNode,
                Step::Child(NameTest::AnyInNamespace("urn:orders".to_string())),
            ]
        );
        assert_eq!(
            alt.attribute,
            Some(NameTest::Name(QName::new(XML_NAMESPACE, "lang")))
        );
        assert!(path.selects_attribute());

        let attr_only = compile_path("attribute::*", &prefixes()).unwrap();
        assert_eq!(attr_only.alternatives()[0].attribute, Some(NameTest::Any));
        assert!(attr_only.alternatives()[0].steps.is_empty());
    }

    #[test]
    fn test_unbound_prefix_reports_column() {
        let err = compile_path("po:order/zz:item", &prefixes()).unwrap_err();
        assert_eq!(err.column, 12);
        assert!(err.message.contains("zz"));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(compile_path("", &prefixes()).is_err());
        assert!(compile_path("a|", &prefixes()).is_err());
        assert!(compile_path("a//b", &prefixes()).is_err());
        assert!(compile_path("@a/b", &prefixes()).is_err());
        assert!(compile_path("a[1]", &prefixes()).is_err());
    }

    #[test]
    fn test_name_test_matching() {
        let name = QName::new("urn:orders", "item");
        assert!(NameTest::Any.matches(&name));
        assert!(NameTest::AnyInNamespace("urn:orders".into()).matches(&name));
        assert!(!NameTest::Name(QName::unqualified("item")).matches(&name));
    }
}

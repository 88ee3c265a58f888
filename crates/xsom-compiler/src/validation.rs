//! Upstream syntax check for identity-constraint paths
//!
//! Runs before a constraint is allocated, so that path compilation inside
//! the component model only sees well-formed expressions.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;
use xsom_core::is_ncname;

/// Shape of a name token; the characters are checked by [`is_ncname`]
const NAME: &str = r"[^\s/|@:*.()\[\]][^\s/|@:*()\[\]]*";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathSyntaxError {
    #[error("Invalid identity constraint path {0:?}")]
    Invalid(String),

    #[error("Path syntax pattern failed to build: {0}")]
    Pattern(String),
}

fn path_pattern() -> Result<&'static Regex, PathSyntaxError> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            let name_test = format!(r"(?:(?:{NAME}:)?(?:{NAME}|\*))");
            let step = format!(r"(?:(?:child::)?{name_test}|\.)");
            let attribute = format!(r"(?:(?:attribute::|@){name_test})");
            let alternative = format!(r"(?:\.//)?(?:{step}/)*(?:{step}|{attribute})");
            Regex::new(&format!(r"^{alternative}(?:\|{alternative})*$"))
        })
        .as_ref()
        .map_err(|e| PathSyntaxError::Pattern(e.to_string()))
}

/// Check a selector or field expression, ignoring whitespace
pub fn check_path_syntax(expression: &str) -> Result<(), PathSyntaxError> {
    let stripped: String = expression.chars().filter(|c| !c.is_whitespace()).collect();
    let names_valid = stripped
        .split(['/', '|', '@', ':', '*'])
        .filter(|token| !token.is_empty() && *token != ".")
        .all(is_ncname);
    if names_valid && path_pattern()?.is_match(&stripped) {
        Ok(())
    } else {
        Err(PathSyntaxError::Invalid(expression.to_string()))
    }
}

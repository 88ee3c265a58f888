//! Compiler configuration, read from TOML
//!
//! ```toml
//! [definitions]
//! duplicates = "warn"
//! ignore_namespaces = ["urn:legacy", "##local"]
//!
//! [names.compat]
//! "{urn:old}price" = "{urn:new}price"
//!
//! [paths]
//! validate_syntax = true
//!
//! [incremental]
//! fingerprint_file = ".xsom/fingerprints.json"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use xsom_core::QName;

use crate::error::{CompileError, Result};

/// Namespace that SOAP conversation WSDLs are known to declare redundantly
pub const SOAP_CONVERSATION_NAMESPACE: &str = "http://www.openuri.org/2002/04/soap/conversation/";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub definitions: DefinitionsConfig,
    pub names: NamesConfig,
    pub paths: PathsConfig,
    pub incremental: IncrementalConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    #[default]
    Error,
    Warn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefinitionsConfig {
    pub duplicates: DuplicatePolicy,
    /// Namespaces whose duplicate definitions are silently ignored.
    /// `##local` stands for no namespace, `##any` turns every duplicate
    /// into a warning.
    pub ignore_namespaces: Vec<String>,
}

impl Default for DefinitionsConfig {
    fn default() -> Self {
        Self {
            duplicates: DuplicatePolicy::Error,
            ignore_namespaces: vec![SOAP_CONVERSATION_NAMESPACE.to_string()],
        }
    }
}

impl DefinitionsConfig {
    pub fn ignores_duplicates_in(&self, namespace: &str) -> bool {
        self.ignore_namespaces.iter().any(|ns| match ns.as_str() {
            "##local" => namespace.is_empty(),
            "##any" => false,
            other => other == namespace,
        })
    }

    pub fn duplicate_policy(&self) -> DuplicatePolicy {
        if self.ignore_namespaces.iter().any(|ns| ns == "##any") {
            DuplicatePolicy::Warn
        } else {
            self.duplicates
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamesConfig {
    /// Name substitutions applied to every reference, in Clark notation
    pub compat: BTreeMap<String, String>,
}

impl NamesConfig {
    pub fn compat_map(&self) -> Result<BTreeMap<QName, QName>> {
        self.compat
            .iter()
            .map(|(from, to)| Ok::<_, CompileError>((QName::parse(from)?, QName::parse(to)?)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Check selector and field syntax before compiling identity constraints
    pub validate_syntax: bool,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            validate_syntax: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IncrementalConfig {
    pub fingerprint_file: PathBuf,
    pub graph_file: PathBuf,
}

impl Default for IncrementalConfig {
    fn default() -> Self {
        Self {
            fingerprint_file: PathBuf::from(".xsom/fingerprints.json"),
            graph_file: PathBuf::from(".xsom/dependencies.json"),
        }
    }
}

impl CompilerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            CompileError::Config(format!(
                "Failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        // surface malformed compat names at load time
        config.names.compat_map()?;
        Ok(config)
    }
}

impl FromStr for CompilerConfig {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = CompilerConfig::parse("").unwrap();
        assert_eq!(config, CompilerConfig::default());
        assert_eq!(config.definitions.duplicate_policy(), DuplicatePolicy::Error);
        assert!(config.definitions.ignores_duplicates_in(SOAP_CONVERSATION_NAMESPACE));
        assert!(config.paths.validate_syntax);
    }

    #[test]
    fn test_full_document() {
        let config: CompilerConfig = r###"
            [definitions]
            duplicates = "warn"
            ignore_namespaces = ["urn:legacy", "##local"]

            [names.compat]
            "{urn:old}price" = "{urn:new}price"

            [paths]
            validate_syntax = false

            [incremental]
            fingerprint_file = "build/fp.json"
        "###
        .parse()
        .unwrap();

        assert_eq!(config.definitions.duplicate_policy(), DuplicatePolicy::Warn);
        assert!(config.definitions.ignores_duplicates_in("urn:legacy"));
        assert!(config.definitions.ignores_duplicates_in(""));
        assert!(!config.definitions.ignores_duplicates_in("urn:other"));
        assert!(!config.paths.validate_syntax);
        assert_eq!(config.incremental.fingerprint_file, PathBuf::from("build/fp.json"));
        assert_eq!(
            config.incremental.graph_file,
            IncrementalConfig::default().graph_file
        );

        let compat = config.names.compat_map().unwrap();
        assert_eq!(
            compat.get(&QName::new("urn:old", "price")),
            Some(&QName::new("urn:new", "price"))
        );
    }

    #[test]
    fn test_any_turns_duplicates_into_warnings() {
        let config =
            CompilerConfig::parse("[definitions]\nignore_namespaces = [\"##any\"]").unwrap();
        assert_eq!(config.definitions.duplicate_policy(), DuplicatePolicy::Warn);
        assert!(!config.definitions.ignores_duplicates_in("urn:x"));
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!(
            CompilerConfig::parse("[definitions]\nduplicates = \"sometimes\""),
            Err(CompileError::Config(_))
        ));
        assert!(matches!(
            CompilerConfig::parse("[names.compat]\n\"{urn:x\" = \"y\""),
            Err(CompileError::Schema(_))
        ));
    }
}

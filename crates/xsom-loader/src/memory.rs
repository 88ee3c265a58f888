use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{LoaderError, Result};
use crate::{normalize_name, ResourceLoader};

/// Resources held in memory, for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryLoader {
    resources: BTreeMap<String, Vec<u8>>,
    closed: AtomicBool,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, bytes: impl Into<Vec<u8>>) -> Result<()> {
        self.resources.insert(normalize_name(name)?, bytes.into());
        Ok(())
    }

    pub fn with(mut self, name: &str, bytes: impl Into<Vec<u8>>) -> Result<Self> {
        self.insert(name, bytes)?;
        Ok(self)
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<u8>> {
        let name = normalize_name(name).ok()?;
        self.resources.remove(&name)
    }
}

impl ResourceLoader for MemoryLoader {
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(LoaderError::Closed);
        }
        Ok(self.resources.get(&normalize_name(name)?).cloned())
    }

    fn resource_names(&self) -> Result<Vec<String>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(LoaderError::Closed);
        }
        Ok(self.resources.keys().cloned().collect())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_loader() {
        let mut loader = MemoryLoader::new()
            .with("b.xsd", "<b/>")
            .unwrap()
            .with("a.xsd", "<a/>")
            .unwrap();

        assert_eq!(loader.resource_names().unwrap(), vec!["a.xsd", "b.xsd"]);
        assert_eq!(loader.read("./a.xsd").unwrap(), Some(b"<a/>".to_vec()));
        assert_eq!(loader.remove("a.xsd"), Some(b"<a/>".to_vec()));
        assert_eq!(loader.read("a.xsd").unwrap(), None);

        loader.close();
        assert!(matches!(loader.read("b.xsd"), Err(LoaderError::Closed)));
    }
}

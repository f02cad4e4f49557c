//! In-process source registry.

use crate::model::item::CandidateItem;
use crate::repo::state_repo::SourceState;
use crate::source::adapter::{ItemSource, SourceResult};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Cell that receives synthetic error items.
pub const INQUISITOR_SOURCE_ID: &str = "inquisitor";

/// Source registration/lookup errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    InvalidSourceId(String),
    DuplicateSourceId(String),
    SourceNotFound(String),
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSourceId(value) => write!(f, "source id is invalid: {value}"),
            Self::DuplicateSourceId(value) => write!(f, "source id already registered: {value}"),
            Self::SourceNotFound(value) => write!(f, "source not found: {value}"),
        }
    }
}

impl Error for RegistryError {}

/// Stand-in for the error cell: never fetches anything, so updating it
/// clears deactivated error items.
#[derive(Debug, Default)]
pub struct InquisitorSource;

impl ItemSource for InquisitorSource {
    fn source_id(&self) -> &str {
        INQUISITOR_SOURCE_ID
    }

    fn fetch_new(&self, _state: &mut SourceState) -> SourceResult<Vec<CandidateItem>> {
        Ok(Vec::new())
    }
}

/// Name-indexed table of statically linked sources.
pub struct SourceRegistry {
    sources: BTreeMap<String, Arc<dyn ItemSource>>,
    inquisitor: Arc<dyn ItemSource>,
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self {
            sources: BTreeMap::new(),
            inquisitor: Arc::new(InquisitorSource),
        }
    }
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one source adapter.
    pub fn register(&mut self, source: Arc<dyn ItemSource>) -> Result<(), RegistryError> {
        let source_id = source.source_id().trim().to_string();
        if !is_valid_source_id(&source_id) {
            return Err(RegistryError::InvalidSourceId(source_id));
        }
        if source_id == INQUISITOR_SOURCE_ID || self.sources.contains_key(source_id.as_str()) {
            return Err(RegistryError::DuplicateSourceId(source_id));
        }

        self.sources.insert(source_id, source);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Returns sorted ids of registered sources.
    pub fn source_ids(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }

    /// Returns one registered source by id.
    pub fn get(&self, source_id: &str) -> Option<Arc<dyn ItemSource>> {
        self.sources.get(source_id.trim()).cloned()
    }

    /// Resolves a source for an update or callback.
    ///
    /// The reserved `inquisitor` id always resolves to [`InquisitorSource`].
    pub fn resolve(&self, source_id: &str) -> Result<Arc<dyn ItemSource>, RegistryError> {
        let normalized = source_id.trim();
        if normalized == INQUISITOR_SOURCE_ID {
            return Ok(Arc::clone(&self.inquisitor));
        }
        self.get(normalized)
            .ok_or_else(|| RegistryError::SourceNotFound(normalized.to_string()))
    }
}

fn is_valid_source_id(value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::{RegistryError, SourceRegistry, INQUISITOR_SOURCE_ID};
    use crate::model::item::CandidateItem;
    use crate::repo::state_repo::SourceState;
    use crate::source::adapter::{ItemSource, SourceResult};
    use std::sync::Arc;

    struct MockSource {
        source_id: String,
    }

    impl MockSource {
        fn new(source_id: &str) -> Self {
            Self {
                source_id: source_id.to_string(),
            }
        }
    }

    impl ItemSource for MockSource {
        fn source_id(&self) -> &str {
            &self.source_id
        }

        fn fetch_new(&self, _state: &mut SourceState) -> SourceResult<Vec<CandidateItem>> {
            Ok(vec![])
        }
    }

    #[test]
    fn registers_and_resolves_source() {
        let mut registry = SourceRegistry::new();
        registry
            .register(Arc::new(MockSource::new("hacker_news")))
            .expect("source should register");
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.source_ids(), vec!["hacker_news".to_string()]);

        let source = registry
            .resolve("  hacker_news ")
            .expect("trimmed id should resolve");
        assert_eq!(source.source_id(), "hacker_news");
    }

    #[test]
    fn rejects_invalid_or_duplicate_source_id() {
        let mut registry = SourceRegistry::new();
        let invalid = registry.register(Arc::new(MockSource::new("Hacker News")));
        assert!(matches!(invalid, Err(RegistryError::InvalidSourceId(_))));
        let blank = registry.register(Arc::new(MockSource::new("   ")));
        assert!(matches!(blank, Err(RegistryError::InvalidSourceId(_))));

        registry
            .register(Arc::new(MockSource::new("rss")))
            .expect("first source should register");
        let duplicate = registry.register(Arc::new(MockSource::new("rss")));
        assert!(matches!(
            duplicate,
            Err(RegistryError::DuplicateSourceId(_))
        ));
    }

    #[test]
    fn inquisitor_id_is_reserved_and_always_resolves() {
        let mut registry = SourceRegistry::new();
        assert!(registry.is_empty());
        let source = registry
            .resolve(INQUISITOR_SOURCE_ID)
            .expect("error cell source is built in");
        assert_eq!(source.source_id(), INQUISITOR_SOURCE_ID);

        let shadow = registry.register(Arc::new(MockSource::new(INQUISITOR_SOURCE_ID)));
        assert!(matches!(shadow, Err(RegistryError::DuplicateSourceId(_))));
    }

    #[test]
    fn unknown_source_is_not_found() {
        let registry = SourceRegistry::new();
        let err = registry.resolve("missing").err().expect("lookup should fail");
        assert_eq!(err, RegistryError::SourceNotFound("missing".to_string()));
    }
}

//! Process-scoped field descriptor cache
//!
//! Entries are keyed by (descriptor kind, scope, path). Lookups take the read
//! lock; a miss takes the write lock, re-checks, and populates. Entries are
//! never evicted. Failed resolutions are not cached.

use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::QueryError;

/// Anything that can resolve a dotted path to a reusable descriptor
pub trait FieldSource {
    type Descriptor: Send + Sync + 'static;

    /// Record type or table this source describes
    fn scope(&self) -> Cow<'_, str>;

    /// Resolve `path` without caching
    fn locate(&self, path: &str) -> Result<Self::Descriptor, QueryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    kind: TypeId,
    scope: String,
    path: String,
}

type Entry = Arc<dyn Any + Send + Sync>;

/// Shared resolver cache, injected into both backends
#[derive(Default)]
pub struct SchemaCache {
    entries: RwLock<HashMap<CacheKey, Entry>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `path` against `source`, populating the cache on first use
    pub fn resolve<S: FieldSource>(
        &self,
        source: &S,
        path: &str,
    ) -> Result<Arc<S::Descriptor>, QueryError> {
        let key = CacheKey {
            kind: TypeId::of::<S::Descriptor>(),
            scope: source.scope().into_owned(),
            path: path.to_string(),
        };

        if let Some(hit) = Self::downcast::<S::Descriptor>(self.entries.read().get(&key)) {
            return Ok(hit);
        }

        let mut entries = self.entries.write();
        if let Some(hit) = Self::downcast::<S::Descriptor>(entries.get(&key)) {
            return Ok(hit);
        }
        let descriptor = Arc::new(source.locate(path)?);
        tracing::trace!(scope = %key.scope, path = %key.path, "Cached field descriptor");
        entries.insert(key, descriptor.clone());
        Ok(descriptor)
    }

    /// Number of cached descriptors
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn downcast<D: Send + Sync + 'static>(entry: Option<&Entry>) -> Option<Arc<D>> {
        entry.and_then(|e| e.clone().downcast::<D>().ok())
    }
}

impl std::fmt::Debug for SchemaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaCache")
            .field("entries", &self.len())
            .finish()
    }
}

//! Storage contract for knowledge bases.
//!
//! Durable storage (files, databases) lives outside this crate; the registry
//! only needs whole-KB load and save. [`InMemoryKbStore`] backs the server and
//! the tests.

use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::kb::KnowledgeBase;
use crate::types::KbName;

/// Whole-knowledge-base persistence used by [`super::KbRegistry`].
pub trait KbStore: Send + Sync {
    /// Names of all stored knowledge bases, in any order.
    fn list(&self) -> Result<Vec<KbName>, StoreError>;

    /// Load a knowledge base, `None` when absent.
    fn load(&self, name: &KbName) -> Result<Option<Arc<KnowledgeBase>>, StoreError>;

    /// Insert or replace a knowledge base.
    fn save(&self, kb: KnowledgeBase) -> Result<Arc<KnowledgeBase>, StoreError>;

    /// Remove a knowledge base, returning whether it existed.
    fn delete(&self, name: &KbName) -> Result<bool, StoreError>;
}

/// Failure reported by a [`KbStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend could not complete the operation.
    #[error(
        "Knowledge base store failed during {operation} of '{kb}'\n  Suggestion: Inspect the storage backend"
    )]
    Backend {
        /// `load`, `save`, `delete` or `list`.
        operation: &'static str,
        /// Knowledge base involved (`*` for listings).
        kb: String,
        /// Underlying failure.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// Process-local store; contents vanish with the process.
#[derive(Debug, Default)]
pub struct InMemoryKbStore {
    kbs: DashMap<KbName, Arc<KnowledgeBase>>,
}

impl InMemoryKbStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KbStore for InMemoryKbStore {
    fn list(&self) -> Result<Vec<KbName>, StoreError> {
        Ok(self.kbs.iter().map(|entry| entry.key().clone()).collect())
    }

    fn load(&self, name: &KbName) -> Result<Option<Arc<KnowledgeBase>>, StoreError> {
        Ok(self.kbs.get(name).map(|entry| Arc::clone(entry.value())))
    }

    fn save(&self, kb: KnowledgeBase) -> Result<Arc<KnowledgeBase>, StoreError> {
        let kb = Arc::new(kb);
        self.kbs.insert(kb.name().clone(), Arc::clone(&kb));
        Ok(kb)
    }

    fn delete(&self, name: &KbName) -> Result<bool, StoreError> {
        Ok(self.kbs.remove(name).is_some())
    }
}

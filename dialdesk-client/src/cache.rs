//! Shared extension → agent name memo.

use dashmap::DashMap;
use dialdesk_core::ResolvedAgent;
use std::sync::Arc;

/// Process-wide resolution cache handle.
///
/// Clones share storage. Entries are written once per extension and never
/// expire; concurrent writes of the same key are idempotent.
#[derive(Debug, Clone, Default)]
pub struct ResolutionCache {
    entries: Arc<DashMap<i64, ResolvedAgent>>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, extension: i64) -> Option<ResolvedAgent> {
        self.entries.get(&extension).map(|entry| entry.value().clone())
    }

    pub fn insert(&self, extension: i64, name: impl Into<String>) {
        self.entries.insert(extension, ResolvedAgent { name: name.into() });
    }

    pub fn contains(&self, extension: i64) -> bool {
        self.entries.contains_key(&extension)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry. Nothing in the engine calls this on its own.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_entries() {
        let cache = ResolutionCache::new();
        let other = cache.clone();
        cache.insert(1201, "Ana Ruiz");
        assert_eq!(other.get(1201).map(|agent| agent.name).as_deref(), Some("Ana Ruiz"));
        assert!(other.contains(1201));
        assert_eq!(other.len(), 1);
    }

    #[test]
    fn independent_caches_do_not_leak() {
        let a = ResolutionCache::new();
        let b = ResolutionCache::new();
        a.insert(5, "x");
        assert!(b.is_empty());
        a.clear();
        assert!(a.get(5).is_none());
    }
}

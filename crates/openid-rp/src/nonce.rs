//! Nonce persistence used by the replay check.
//!
//! The verifier calls [`NonceStore::exists`] and then [`NonceStore::save`] as
//! two separate operations and takes no lock around them. Two verifications of
//! the same callback racing between those calls can both pass. Stores used in
//! production must close that window themselves, for example by backing
//! `exists`/`save` with an atomic insert-if-absent.

#[cfg(feature = "memory-store")]
use dashmap::DashSet;

/// Storage for `openid.response_nonce` values already accepted.
pub trait NonceStore: Send + Sync {
    /// Remember `nonce`. Returns `true` if it was persisted.
    fn save(&self, nonce: &str) -> bool;

    /// True if `nonce` was saved before.
    fn exists(&self, nonce: &str) -> bool;
}

/// Default store: saves nothing and never reports a nonce as seen.
///
/// This disables replay protection. It exists for demos and tests; inject a
/// real store for anything else.
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveNonceStore;

impl NonceStore for PermissiveNonceStore {
    fn save(&self, _nonce: &str) -> bool {
        true
    }

    fn exists(&self, _nonce: &str) -> bool {
        false
    }
}

/// Process-local store for demos and single-process use.
///
/// Nonces are never expired, so the set grows with every accepted assertion
/// and is lost on restart.
#[cfg(feature = "memory-store")]
#[derive(Debug, Default)]
pub struct InMemoryNonceStore {
    seen: DashSet<String>,
}

#[cfg(feature = "memory-store")]
impl InMemoryNonceStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically record `nonce`. Returns `false` if it was already present.
    pub fn insert_if_absent(&self, nonce: &str) -> bool {
        self.seen.insert(nonce.to_string())
    }

    /// Number of remembered nonces.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// True if nothing has been saved.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(feature = "memory-store")]
impl NonceStore for InMemoryNonceStore {
    fn save(&self, nonce: &str) -> bool {
        self.seen.insert(nonce.to_string());
        true
    }

    fn exists(&self, nonce: &str) -> bool {
        self.seen.contains(nonce)
    }
}

/// Adapts a pair of closures (`save`, `exists`) to [`NonceStore`].
pub struct FnNonceStore<S, E> {
    save: S,
    exists: E,
}

impl<S, E> FnNonceStore<S, E>
where
    S: Fn(&str) -> bool + Send + Sync,
    E: Fn(&str) -> bool + Send + Sync,
{
    /// Wrap existing persistence functions.
    pub fn new(save: S, exists: E) -> Self {
        Self { save, exists }
    }
}

impl<S, E> NonceStore for FnNonceStore<S, E>
where
    S: Fn(&str) -> bool + Send + Sync,
    E: Fn(&str) -> bool + Send + Sync,
{
    fn save(&self, nonce: &str) -> bool {
        (self.save)(nonce)
    }

    fn exists(&self, nonce: &str) -> bool {
        (self.exists)(nonce)
    }
}

impl<S, E> std::fmt::Debug for FnNonceStore<S, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnNonceStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissive_store_accepts_everything() {
        let store = PermissiveNonceStore;
        assert!(store.save("anything"));
        assert!(!store.exists("anything"));
    }

    #[cfg(feature = "memory-store")]
    #[test]
    fn in_memory_store_remembers() {
        let store = InMemoryNonceStore::new();
        assert!(!store.exists("n1"));
        assert!(store.save("n1"));
        assert!(store.exists("n1"));
        assert!(!store.exists("n2"));
        assert_eq!(store.len(), 1);
    }

    #[cfg(feature = "memory-store")]
    #[test]
    fn insert_if_absent_is_single_use() {
        let store = InMemoryNonceStore::new();
        assert!(store.insert_if_absent("n1"));
        assert!(!store.insert_if_absent("n1"));
    }

    #[test]
    fn closures_are_forwarded() {
        let store = FnNonceStore::new(|n: &str| n == "ok", |n: &str| n.starts_with("seen"));
        assert!(store.save("ok"));
        assert!(!store.save("other"));
        assert!(store.exists("seen-1"));
        assert!(!store.exists("fresh"));
    }
}

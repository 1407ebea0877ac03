use std::collections::BTreeSet;
use std::sync::{PoisonError, RwLock};

/// Flat set of known peer base URLs
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: RwLock<BTreeSet<String>>,
}

impl PeerRegistry {
    pub fn new<I: IntoIterator<Item = String>>(peers: I) -> Self {
        let registry = Self::default();
        for peer in peers {
            registry.register(&peer);
        }
        registry
    }

    /// Adds `peer`, ignoring blanks and trailing slashes.
    ///
    /// Returns false if the peer was empty or already known.
    pub fn register(&self, peer: &str) -> bool {
        let peer = peer.trim().trim_end_matches('/');
        if peer.is_empty() {
            return false;
        }
        self.peers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(peer.to_string())
    }

    pub fn list(&self) -> Vec<String> {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_normalises() {
        let registry = PeerRegistry::default();

        assert!(registry.register("http://localhost:5001/"));
        assert!(!registry.register("http://localhost:5001"));
        assert!(!registry.register("   "));
        assert_eq!(registry.list(), vec!["http://localhost:5001".to_string()]);
    }

    #[test]
    fn test_new_from_config() {
        let registry = PeerRegistry::new(vec![
            "http://b:5000".to_string(),
            "http://a:5000".to_string(),
        ]);
        assert_eq!(registry.list(), vec!["http://a:5000", "http://b:5000"]);
    }
}

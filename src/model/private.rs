//! Opaque private metadata attached to IEDs, logical devices and logical nodes

use indexmap::IndexMap;

/// Private payloads keyed by their `type` attribute
pub type Privates = IndexMap<String, Vec<u8>>;

/// Per-node sidecar of private metadata
pub trait PrivateStore {
    /// Backing map
    fn privates(&self) -> &Privates;

    /// Mutable backing map
    fn privates_mut(&mut self) -> &mut Privates;

    /// Payload stored under `key`
    fn private(&self, key: &str) -> Option<&[u8]> {
        self.privates().get(key).map(Vec::as_slice)
    }

    /// Store or replace the payload under `key`
    fn set_private(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.privates_mut().insert(key.into(), value.into());
    }

    /// Whether a payload is stored under `key`
    fn has_private(&self, key: &str) -> bool {
        self.privates().contains_key(key)
    }
}

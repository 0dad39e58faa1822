//! Ownership registry
//!
//! Records which client uploaded which file. Membership is the only thing
//! that grants delete rights. The registry lives for the lifetime of the
//! server and is never persisted.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

/// Client identity -> paths that client uploaded.
#[derive(Debug, Default)]
pub struct OwnershipRegistry {
    owners: Mutex<HashMap<String, HashSet<PathBuf>>>,
}

impl OwnershipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `path` as uploaded by `client`.
    ///
    /// A path has at most one owner; a previous owner loses it.
    pub fn record(&self, client: &str, path: &Path) {
        let mut owners = self.owners.lock();
        for (other, paths) in owners.iter_mut() {
            if other != client && paths.remove(path) {
                debug!("{} takes ownership of {} from {}", client, path.display(), other);
            }
        }
        owners
            .entry(client.to_string())
            .or_default()
            .insert(path.to_path_buf());
    }

    pub fn owns(&self, client: &str, path: &Path) -> bool {
        self.owners
            .lock()
            .get(client)
            .is_some_and(|paths| paths.contains(path))
    }

    /// Drop `path` from `client`'s set. Returns whether it was present.
    pub fn release(&self, client: &str, path: &Path) -> bool {
        let mut owners = self.owners.lock();
        let Some(paths) = owners.get_mut(client) else {
            return false;
        };
        let removed = paths.remove(path);
        if paths.is_empty() {
            owners.remove(client);
        }
        removed
    }

    /// Copy of everything `client` owns, for building listings.
    pub fn owned_by(&self, client: &str) -> HashSet<PathBuf> {
        self.owners.lock().get(client).cloned().unwrap_or_default()
    }

    #[cfg(test)]
    fn client_count(&self) -> usize {
        self.owners.lock().len()
    }
}

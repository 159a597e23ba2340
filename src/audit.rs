//! Append-only audit chain (§4 "Audit Chain", §6.3, I7).
//!
//! Grounded on `original_source/backend/internal/audit/veritas.go`: every
//! domain event is hashed and appended; the Merkle root folds the digest
//! sequence pairwise, promoting an odd trailing digest unchanged.

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

/// Append-only hash log. Cheap to clone-share via `Arc` at the call site;
/// the lock is held only for the duration of a push or fold, matching the
/// locking discipline of §5 ("owns a single mutex protecting its private
/// state").
pub struct AuditChain {
    entries: Mutex<Vec<String>>,
}

impl AuditChain {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Hash `event_data` with SHA-256, append the hex digest, return it.
    pub fn append_event(&self, event_data: &str) -> String {
        let digest = hex::encode(Sha256::digest(event_data.as_bytes()));
        self.entries.lock().push(digest.clone());
        tracing::debug!(digest = %digest, "audit event appended");
        digest
    }

    /// Number of entries currently in the chain.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fold the current digest sequence into a single root: at each level,
    /// pair adjacent digests by concatenating their hex strings and hashing
    /// the UTF-8 bytes; an odd trailing digest is promoted unchanged. Empty
    /// chain yields the empty string.
    pub fn merkle_root(&self) -> String {
        let mut level = self.entries.lock().clone();
        if level.is_empty() {
            return String::new();
        }

        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            let mut i = 0;
            while i < level.len() {
                if i + 1 < level.len() {
                    let combined = format!("{}{}", level[i], level[i + 1]);
                    next.push(hex::encode(Sha256::digest(combined.as_bytes())));
                } else {
                    next.push(level[i].clone());
                }
                i += 2;
            }
            level = next;
        }

        level.into_iter().next().unwrap_or_default()
    }
}

impl Default for AuditChain {
    fn default() -> Self {
        Self::new()
    }
}

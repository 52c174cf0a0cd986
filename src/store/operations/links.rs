//! Bidirectional link tables.
//!
//! Every link is stored twice as a key-only entry: `{left}:{right}` in the
//! forward tree and `{right}:{left}` in the reverse tree, so either side can be
//! listed with a prefix scan.

use sled::transaction::{ConflictableTransactionError, TransactionalTree};

use crate::store::keys;
use crate::store::{abort, Store, StoreError};

/// Insert a link pair. Returns `true` when the link did not exist before.
pub(crate) fn tx_link(
    forward: &TransactionalTree,
    reverse: &TransactionalTree,
    left_id: &str,
    right_id: &str,
) -> Result<bool, ConflictableTransactionError<StoreError>> {
    let forward_key = keys::link_key(left_id, right_id).map_err(abort)?;
    let reverse_key = keys::link_key(right_id, left_id).map_err(abort)?;
    let previous = forward.insert(forward_key.as_bytes(), Vec::<u8>::new())?;
    reverse.insert(reverse_key.as_bytes(), Vec::<u8>::new())?;
    Ok(previous.is_none())
}

/// Remove a link pair. Removing an absent link is a no-op returning `false`.
pub(crate) fn tx_unlink(
    forward: &TransactionalTree,
    reverse: &TransactionalTree,
    left_id: &str,
    right_id: &str,
) -> Result<bool, ConflictableTransactionError<StoreError>> {
    let forward_key = keys::link_key(left_id, right_id).map_err(abort)?;
    let reverse_key = keys::link_key(right_id, left_id).map_err(abort)?;
    let removed = forward.remove(forward_key.as_bytes())?;
    reverse.remove(reverse_key.as_bytes())?;
    Ok(removed.is_some())
}

impl Store {
    /// Ids linked to `left_id` in `tree`, in key order.
    pub fn linked_ids(&self, tree: &sled::Tree, left_id: &str) -> Result<Vec<String>, StoreError> {
        let prefix = keys::link_prefix(left_id)?;
        let mut ids = Vec::new();
        for item in tree.scan_prefix(prefix.as_bytes()) {
            let (key, _) = item?;
            let Some(right) = key.get(prefix.len()..) else {
                continue;
            };
            match std::str::from_utf8(right) {
                Ok(id) => ids.push(id.to_string()),
                Err(e) => tracing::warn!(error = %e, "Invalid UTF-8 in link key"),
            }
        }
        Ok(ids)
    }

    pub fn count_links(&self, tree: &sled::Tree, left_id: &str) -> Result<u64, StoreError> {
        let prefix = keys::link_prefix(left_id)?;
        let mut count = 0u64;
        for item in tree.scan_prefix(prefix.as_bytes()) {
            let _ = item?;
            count += 1;
        }
        Ok(count)
    }

    pub fn has_link(
        &self,
        tree: &sled::Tree,
        left_id: &str,
        right_id: &str,
    ) -> Result<bool, StoreError> {
        let key = keys::link_key(left_id, right_id)?;
        Ok(tree.contains_key(key.as_bytes())?)
    }
}

#[cfg(test)]
mod tests {
    use sled::Transactional;
    use tempfile::tempdir;

    use super::*;
    use crate::store::map_tx_error;

    #[test]
    fn link_pair_is_visible_from_both_sides_and_idempotent() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("links-db").to_str().unwrap()).unwrap();

        let first = (&store.set_units, &store.unit_sets)
            .transaction(|(fwd, rev)| tx_link(fwd, rev, "s1", "u1"))
            .map_err(map_tx_error)
            .unwrap();
        let second = (&store.set_units, &store.unit_sets)
            .transaction(|(fwd, rev)| tx_link(fwd, rev, "s1", "u1"))
            .map_err(map_tx_error)
            .unwrap();

        assert!(first);
        assert!(!second);
        assert_eq!(store.linked_ids(&store.set_units, "s1").unwrap(), vec!["u1"]);
        assert_eq!(store.linked_ids(&store.unit_sets, "u1").unwrap(), vec!["s1"]);
        assert_eq!(store.count_links(&store.set_units, "s1").unwrap(), 1);
    }

    #[test]
    fn unlink_missing_is_noop() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("links-db-2").to_str().unwrap()).unwrap();

        let removed = (&store.set_units, &store.unit_sets)
            .transaction(|(fwd, rev)| tx_unlink(fwd, rev, "s1", "missing"))
            .map_err(map_tx_error)
            .unwrap();

        assert!(!removed);
        assert!(!store.has_link(&store.set_units, "s1", "missing").unwrap());
    }

    #[test]
    fn prefix_scan_does_not_leak_into_longer_ids() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("links-db-3").to_str().unwrap()).unwrap();

        (&store.set_units, &store.unit_sets)
            .transaction(|(fwd, rev)| {
                tx_link(fwd, rev, "s1", "u1")?;
                tx_link(fwd, rev, "s10", "u2")?;
                Ok(())
            })
            .map_err(map_tx_error)
            .unwrap();

        assert_eq!(store.linked_ids(&store.set_units, "s1").unwrap(), vec!["u1"]);
    }
}

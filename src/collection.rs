// 📦 Collection - one owner's in-memory snapshot, keyed by entry id
//
// Loaded from the store before a batch, mutated by the reconciliation
// engine, then flushed back. The snapshot is exclusively owned by the batch
// that is running against it.

use crate::deduplication;
use crate::entities::CardEntry;
use crate::error::AmbiguousStateError;
use anyhow::{bail, Result};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct Collection {
    owner_id: String,
    entries: BTreeMap<String, CardEntry>,
    /// ids that existed in the store when the snapshot was taken
    persisted_ids: HashSet<String>,
}

impl Collection {
    /// Empty collection for an owner with nothing stored yet
    pub fn new(owner_id: impl Into<String>) -> Self {
        Collection {
            owner_id: owner_id.into(),
            entries: BTreeMap::new(),
            persisted_ids: HashSet::new(),
        }
    }

    /// Snapshot of entries that already live in the store
    pub fn from_persisted(owner_id: impl Into<String>, entries: Vec<CardEntry>) -> Result<Self> {
        let mut collection = Collection::new(owner_id);

        for entry in entries {
            if !entry.has_id() {
                bail!("persisted entry for {} has no id", entry.catalog_ref);
            }
            if entry.owner_id != collection.owner_id {
                bail!(
                    "entry {} belongs to owner {}, not {}",
                    entry.id,
                    entry.owner_id,
                    collection.owner_id
                );
            }
            if collection.entries.contains_key(&entry.id) {
                bail!("entry id {} loaded twice", entry.id);
            }
            collection.persisted_ids.insert(entry.id.clone());
            collection.entries.insert(entry.id.clone(), entry);
        }

        Ok(collection)
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&CardEntry> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut CardEntry> {
        self.entries.get_mut(id)
    }

    /// Entries in id order
    pub fn entries(&self) -> impl Iterator<Item = &CardEntry> {
        self.entries.values()
    }

    pub fn into_entries(self) -> Vec<CardEntry> {
        self.entries.into_values().collect()
    }

    /// True if the id was already stored before this snapshot was taken
    pub fn was_persisted(&self, id: &str) -> bool {
        self.persisted_ids.contains(id)
    }

    /// Add an entry that has an id and belongs to this owner
    pub fn insert(&mut self, entry: CardEntry) -> Result<()> {
        if !entry.has_id() {
            bail!("cannot add an entry without an id");
        }
        if entry.owner_id != self.owner_id {
            bail!(
                "entry belongs to owner {}, not {}",
                entry.owner_id,
                self.owner_id
            );
        }
        if self.entries.contains_key(&entry.id) {
            bail!("entry id {} already exists in collection", entry.id);
        }
        self.entries.insert(entry.id.clone(), entry);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Option<CardEntry> {
        self.entries.remove(id)
    }

    /// Existing entry sharing `wanted`'s identity, excluding `wanted` itself
    pub fn find_by_identity(
        &self,
        wanted: &CardEntry,
    ) -> Result<Option<&CardEntry>, AmbiguousStateError> {
        deduplication::find_by_identity(self.entries(), wanted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, owner: &str, catalog_ref: &str) -> CardEntry {
        let mut card = CardEntry::new(owner, catalog_ref);
        card.id = id.to_string();
        card
    }

    #[test]
    fn test_from_persisted_tracks_ids() {
        let collection =
            Collection::from_persisted("owner", vec![entry("1", "owner", "X")]).unwrap();

        assert_eq!(collection.len(), 1);
        assert!(collection.contains("1"));
        assert!(collection.was_persisted("1"));
        assert!(!collection.was_persisted("2"));
    }

    #[test]
    fn test_from_persisted_rejects_bad_rows() {
        assert!(Collection::from_persisted("owner", vec![entry("", "owner", "X")]).is_err());
        assert!(Collection::from_persisted("owner", vec![entry("1", "other", "X")]).is_err());
        assert!(Collection::from_persisted(
            "owner",
            vec![entry("1", "owner", "X"), entry("1", "owner", "Y")]
        )
        .is_err());
    }

    #[test]
    fn test_insert_validates() {
        let mut collection = Collection::new("owner");

        assert!(collection.insert(entry("", "owner", "X")).is_err());
        assert!(collection.insert(entry("1", "other", "X")).is_err());
        collection.insert(entry("1", "owner", "X")).unwrap();
        assert!(collection.insert(entry("1", "owner", "Y")).is_err());

        assert!(!collection.was_persisted("1"));
    }

    #[test]
    fn test_remove() {
        let mut collection = Collection::new("owner");
        collection.insert(entry("1", "owner", "X")).unwrap();

        assert!(collection.remove("1").is_some());
        assert!(collection.remove("1").is_none());
        assert!(collection.is_empty());
    }

    #[test]
    fn test_find_by_identity_excludes_self() {
        let mut collection = Collection::new("owner");
        collection.insert(entry("1", "owner", "X")).unwrap();

        let member = collection.get("1").unwrap().clone();
        assert!(collection.find_by_identity(&member).unwrap().is_none());

        let wanted = CardEntry::new("owner", "X");
        let found = collection.find_by_identity(&wanted).unwrap().unwrap();
        assert_eq!(found.id, "1");
    }
}

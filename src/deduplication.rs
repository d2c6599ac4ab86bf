// 🔍 Identity Matcher - Detect duplicate card entries
// Two entries are duplicates when their identity tuples are equal.
// Exact match only: no fuzzy matching, no tie-breaking.

use crate::entities::{CardEntry, IdentityKey};
use crate::error::AmbiguousStateError;
use serde::Serialize;
use std::collections::HashMap;

// ============================================================================
// SINGLE-ENTRY LOOKUP
// ============================================================================

/// Find the entry sharing `wanted`'s identity.
///
/// `wanted` itself is skipped when it carries an id (it may already be a
/// member of `entries`). Only entries of the same owner are considered.
///
/// More than one match means the stored collection already violates the
/// uniqueness invariant; that is returned as a fatal `AmbiguousStateError`
/// instead of picking one.
pub fn find_by_identity<'a, I>(
    entries: I,
    wanted: &CardEntry,
) -> Result<Option<&'a CardEntry>, AmbiguousStateError>
where
    I: IntoIterator<Item = &'a CardEntry>,
{
    let mut matches = entries
        .into_iter()
        .filter(|candidate| !(wanted.has_id() && candidate.id == wanted.id))
        .filter(|candidate| candidate.same_identity(wanted));

    let first = match matches.next() {
        Some(entry) => entry,
        None => return Ok(None),
    };

    let rest: Vec<&CardEntry> = matches.collect();
    if rest.is_empty() {
        return Ok(Some(first));
    }

    let mut entry_ids = vec![first.id.clone()];
    entry_ids.extend(rest.iter().map(|e| e.id.clone()));

    Err(AmbiguousStateError {
        owner_id: wanted.owner_id.clone(),
        fingerprint: wanted.fingerprint(),
        entry_ids,
    })
}

// ============================================================================
// WHOLE-COLLECTION AUDIT
// ============================================================================

/// A set of entries sharing one identity tuple
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    pub fingerprint: String,
    pub identity: IdentityKey,

    /// ids in the order the entries were given
    pub entry_ids: Vec<String>,

    /// Sum of amounts, i.e. the amount a merge would produce
    pub total_amount: i64,

    /// Human-readable reason
    pub reason: String,
}

/// Group every identity tuple that appears more than once.
///
/// Report only: nothing is merged or removed here.
pub fn find_duplicates(entries: &[CardEntry]) -> Vec<DuplicateGroup> {
    let mut by_identity: HashMap<IdentityKey, Vec<&CardEntry>> = HashMap::new();
    let mut order: Vec<IdentityKey> = Vec::new();

    for entry in entries {
        let key = entry.identity();
        let bucket = by_identity.entry(key.clone()).or_default();
        if bucket.is_empty() {
            order.push(key);
        }
        bucket.push(entry);
    }

    order
        .into_iter()
        .filter_map(|key| {
            let bucket = by_identity.remove(&key)?;
            if bucket.len() < 2 {
                return None;
            }
            let total_amount = bucket
                .iter()
                .fold(0i64, |acc, e| acc.saturating_add(e.amount));
            Some(DuplicateGroup {
                fingerprint: key.fingerprint(),
                reason: format!(
                    "{} entries for {} ({} | foil={} signed={} altered={} misprint={})",
                    bucket.len(),
                    key.catalog_ref,
                    key.condition,
                    key.foil,
                    key.signed,
                    key.altered,
                    key.misprint
                ),
                entry_ids: bucket.iter().map(|e| e.id.clone()).collect(),
                identity: key,
                total_amount,
            })
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Condition;

    fn create_test_entry(id: &str, catalog_ref: &str, amount: i64, foil: bool) -> CardEntry {
        let mut card = CardEntry::new("owner", catalog_ref);
        card.id = id.to_string();
        card.amount = amount;
        card.foil = foil;
        card
    }

    #[test]
    fn test_exact_match() {
        let entries = vec![
            create_test_entry("1", "X", 3, false),
            create_test_entry("2", "X", 1, true),
        ];

        let wanted = CardEntry::new("owner", "X");
        let found = find_by_identity(&entries, &wanted).unwrap();

        assert_eq!(found.map(|e| e.id.as_str()), Some("1"));
    }

    #[test]
    fn test_no_match() {
        let entries = vec![create_test_entry("1", "X", 3, false)];

        let mut wanted = CardEntry::new("owner", "X");
        wanted.condition = Condition::Damaged;

        assert!(find_by_identity(&entries, &wanted).unwrap().is_none());
    }

    #[test]
    fn test_other_owner_never_matches() {
        let entries = vec![create_test_entry("1", "X", 3, false)];
        let wanted = CardEntry::new("someone-else", "X");

        assert!(find_by_identity(&entries, &wanted).unwrap().is_none());
    }

    #[test]
    fn test_wanted_entry_excluded_by_id() {
        let entries = vec![
            create_test_entry("1", "X", 3, false),
            create_test_entry("2", "X", 1, true),
        ];

        // entry 2 flipped to non-foil collides with entry 1 only
        let mut wanted = entries[1].clone();
        wanted.foil = false;

        let found = find_by_identity(&entries, &wanted).unwrap().unwrap();
        assert_eq!(found.id, "1");

        // entry 1 probing itself finds nothing
        assert!(find_by_identity(&entries, &entries[0]).unwrap().is_none());
    }

    #[test]
    fn test_double_match_is_fatal() {
        let entries = vec![
            create_test_entry("1", "X", 3, false),
            create_test_entry("2", "X", 1, false),
        ];

        let wanted = CardEntry::new("owner", "X");
        let err = find_by_identity(&entries, &wanted).unwrap_err();

        assert_eq!(err.entry_ids, vec!["1".to_string(), "2".to_string()]);
        assert_eq!(err.owner_id, "owner");
        assert_eq!(err.fingerprint, wanted.fingerprint());
    }

    #[test]
    fn test_find_duplicates_groups() {
        let entries = vec![
            create_test_entry("1", "X", 3, false),
            create_test_entry("2", "Y", 1, false),
            create_test_entry("3", "X", 2, false),
            create_test_entry("4", "X", 5, true),
        ];

        let groups = find_duplicates(&entries);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].entry_ids, vec!["1".to_string(), "3".to_string()]);
        assert_eq!(groups[0].total_amount, 5);
        assert_eq!(groups[0].identity.catalog_ref, "X");
        assert!(groups[0].reason.contains("2 entries"));
    }

    #[test]
    fn test_find_duplicates_saturates_total() {
        let entries = vec![
            create_test_entry("1", "X", i64::MAX, false),
            create_test_entry("2", "X", 5, false),
        ];

        let groups = find_duplicates(&entries);
        assert_eq!(groups[0].total_amount, i64::MAX);
    }

    #[test]
    fn test_find_duplicates_clean_collection() {
        let entries = vec![
            create_test_entry("1", "X", 3, false),
            create_test_entry("2", "X", 1, true),
        ];

        assert!(find_duplicates(&entries).is_empty());
    }
}

// 🎴 Card Entry - one inventory line of an owner's collection
//
// "id is IDENTITY of the row, the identity tuple is IDENTITY of the card"
//
// - id: opaque key, empty until the entry is first persisted
// - identity tuple: every field except id, amount and created_at
// - two rows with the same identity tuple are duplicates and must be merged

use crate::amount::AmountDelta;
use crate::entities::condition::Condition;
use crate::error::RequestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

// ============================================================================
// IDENTITY TUPLE
// ============================================================================

/// The attributes that decide whether two entries are the same card.
///
/// Tags are a `BTreeSet`, so comparison is order-independent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct IdentityKey {
    pub owner_id: String,
    pub catalog_ref: String,
    pub tags: BTreeSet<String>,
    pub foil: bool,
    pub condition: Condition,
    pub signed: bool,
    pub altered: bool,
    pub misprint: bool,
}

impl IdentityKey {
    /// Stable SHA-256 fingerprint of the identity tuple (hex encoded)
    ///
    /// Used as the indexed lookup column in the store.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [self.owner_id.as_str(), self.catalog_ref.as_str()] {
            hasher.update(part.as_bytes());
            hasher.update([0x1f]);
        }
        for tag in &self.tags {
            hasher.update(tag.as_bytes());
            hasher.update([0x1e]);
        }
        hasher.update([0x1f]);
        hasher.update([
            self.foil as u8,
            self.condition.ordinal(),
            self.signed as u8,
            self.altered as u8,
            self.misprint as u8,
        ]);
        format!("{:x}", hasher.finalize())
    }
}

// ============================================================================
// FIELD PATCH
// ============================================================================

/// Partial update: `Some` fields are applied, `None` fields are left alone
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<AmountDelta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foil: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altered: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub misprint: Option<bool>,
}

impl CardPatch {
    pub fn is_empty(&self) -> bool {
        *self == CardPatch::default()
    }

    /// True if any identity attribute is set
    pub fn has_identity_fields(&self) -> bool {
        self.catalog_ref.is_some()
            || self.tags.is_some()
            || self.foil.is_some()
            || self.condition.is_some()
            || self.signed.is_some()
            || self.altered.is_some()
            || self.misprint.is_some()
    }
}

// ============================================================================
// ENTRY STATE
// ============================================================================

/// What the caller has to do with an entry after `update`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Active,
    /// Amount reached zero or below; the caller must remove the entry
    PendingDelete,
}

// ============================================================================
// CARD ENTRY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardEntry {
    /// Opaque unique key, empty until first persisted
    #[serde(default)]
    pub id: String,

    /// Owning account; never changed by `update`
    pub owner_id: String,

    /// Reference into the external card catalog (not unique by itself)
    pub catalog_ref: String,

    /// Positive while persisted; zero or below means pending delete
    pub amount: i64,

    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub foil: bool,
    #[serde(default)]
    pub condition: Condition,
    #[serde(default)]
    pub signed: bool,
    #[serde(default)]
    pub altered: bool,
    #[serde(default)]
    pub misprint: bool,

    /// Set once at creation
    pub created_at: DateTime<Utc>,
}

impl CardEntry {
    /// New entry with default attributes and an amount of 1
    pub fn new(owner_id: impl Into<String>, catalog_ref: impl Into<String>) -> Self {
        CardEntry {
            id: String::new(),
            owner_id: owner_id.into(),
            catalog_ref: catalog_ref.into(),
            amount: 1,
            tags: BTreeSet::new(),
            foil: false,
            condition: Condition::default(),
            signed: false,
            altered: false,
            misprint: false,
            created_at: Utc::now(),
        }
    }

    pub fn has_id(&self) -> bool {
        !self.id.is_empty()
    }

    pub fn identity(&self) -> IdentityKey {
        IdentityKey {
            owner_id: self.owner_id.clone(),
            catalog_ref: self.catalog_ref.clone(),
            tags: self.tags.clone(),
            foil: self.foil,
            condition: self.condition,
            signed: self.signed,
            altered: self.altered,
            misprint: self.misprint,
        }
    }

    pub fn fingerprint(&self) -> String {
        self.identity().fingerprint()
    }

    /// Duplicate check: ignores id, amount and created_at
    pub fn same_identity(&self, other: &CardEntry) -> bool {
        self.owner_id == other.owner_id
            && self.catalog_ref == other.catalog_ref
            && self.tags == other.tags
            && self.foil == other.foil
            && self.condition == other.condition
            && self.signed == other.signed
            && self.altered == other.altered
            && self.misprint == other.misprint
    }

    pub fn is_pending_delete(&self) -> bool {
        self.amount <= 0
    }

    /// Assign a fresh id. Only valid for an entry that has none yet.
    pub fn generate_id(&mut self) -> Result<&str, RequestError> {
        if self.has_id() {
            return Err(RequestError::validation(format!(
                "entry already has id {}",
                self.id
            )));
        }
        self.id = uuid::Uuid::new_v4().to_string();
        Ok(&self.id)
    }

    /// Apply a patch in place.
    ///
    /// Non-amount fields are overwritten when present. The amount delta is
    /// resolved against the current amount; a result of zero or below is not
    /// clamped, it turns the entry into `PendingDelete`.
    pub fn update(&mut self, patch: &CardPatch) -> EntryState {
        if let Some(catalog_ref) = &patch.catalog_ref {
            self.catalog_ref = catalog_ref.clone();
        }
        if let Some(tags) = &patch.tags {
            self.tags = tags.clone();
        }
        if let Some(foil) = patch.foil {
            self.foil = foil;
        }
        if let Some(condition) = patch.condition {
            self.condition = condition;
        }
        if let Some(signed) = patch.signed {
            self.signed = signed;
        }
        if let Some(altered) = patch.altered {
            self.altered = altered;
        }
        if let Some(misprint) = patch.misprint {
            self.misprint = misprint;
        }
        if let Some(delta) = patch.amount {
            self.amount = delta.apply_to(self.amount);
        }

        if self.is_pending_delete() {
            EntryState::PendingDelete
        } else {
            EntryState::Active
        }
    }

    /// Absorb an entry that now shares this entry's identity.
    ///
    /// Amounts are summed. The identity attributes come from `updated`, the
    /// entry whose update caused the collision. id and created_at stay.
    pub fn absorb(&mut self, updated: &CardEntry) {
        self.amount = self.amount.saturating_add(updated.amount);
        self.catalog_ref = updated.catalog_ref.clone();
        self.tags = updated.tags.clone();
        self.foil = updated.foil;
        self.condition = updated.condition;
        self.signed = updated.signed;
        self.altered = updated.altered;
        self.misprint = updated.misprint;
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_new_entry_defaults() {
        let card = CardEntry::new("owner", "X");

        assert!(!card.has_id());
        assert_eq!(card.amount, 1);
        assert!(card.tags.is_empty());
        assert_eq!(card.condition, Condition::NearMint);
        assert!(!card.foil && !card.signed && !card.altered && !card.misprint);
    }

    #[test]
    fn test_identity_ignores_id_and_amount() {
        let mut a = CardEntry::new("owner", "X");
        a.id = "1".to_string();
        a.amount = 3;

        let mut b = CardEntry::new("owner", "X");
        b.id = "2".to_string();
        b.amount = 7;

        assert!(a.same_identity(&b));
        assert_eq!(a.identity(), b.identity());
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_identity_tags_order_independent() {
        let mut a = CardEntry::new("owner", "X");
        a.tags = tags(&["edh", "turtles"]);
        let mut b = CardEntry::new("owner", "X");
        b.tags = ["turtles", "edh"].iter().map(|s| s.to_string()).collect();

        assert!(a.same_identity(&b));
    }

    #[test]
    fn test_identity_distinguishes_attributes() {
        let base = CardEntry::new("owner", "X");

        let mut foil = base.clone();
        foil.foil = true;
        assert!(!base.same_identity(&foil));
        assert_ne!(base.fingerprint(), foil.fingerprint());

        let mut other_owner = base.clone();
        other_owner.owner_id = "someone-else".to_string();
        assert!(!base.same_identity(&other_owner));

        let mut played = base.clone();
        played.condition = Condition::LightlyPlayed;
        assert_ne!(base.identity(), played.identity());
    }

    #[test]
    fn test_fingerprint_does_not_collide_on_concatenation() {
        let mut a = CardEntry::new("owner", "X");
        a.tags = tags(&["ab"]);
        let mut b = CardEntry::new("owner", "X");
        b.tags = tags(&["a", "b"]);

        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_update_relative_amount() {
        let mut card = CardEntry::new("owner", "X");
        card.amount = 3;

        let state = card.update(&CardPatch {
            amount: Some(AmountDelta::relative(2)),
            ..Default::default()
        });

        assert_eq!(state, EntryState::Active);
        assert_eq!(card.amount, 5);
    }

    #[test]
    fn test_update_absolute_amount_and_fields() {
        let mut card = CardEntry::new("owner", "X");
        card.amount = 3;

        card.update(&CardPatch {
            amount: Some(AmountDelta::absolute(10)),
            foil: Some(true),
            condition: Some(Condition::HeavilyPlayed),
            tags: Some(tags(&["binder"])),
            ..Default::default()
        });

        assert_eq!(card.amount, 10);
        assert!(card.foil);
        assert_eq!(card.condition, Condition::HeavilyPlayed);
        assert_eq!(card.tags, tags(&["binder"]));
        assert!(!card.signed);
    }

    #[test]
    fn test_update_to_zero_is_pending_delete_not_clamped() {
        let mut card = CardEntry::new("owner", "X");
        card.amount = 1;

        let state = card.update(&CardPatch {
            amount: Some(AmountDelta::relative(-3)),
            ..Default::default()
        });

        assert_eq!(state, EntryState::PendingDelete);
        assert_eq!(card.amount, -2);
    }

    #[test]
    fn test_update_never_touches_owner_or_created_at() {
        let mut card = CardEntry::new("owner", "X");
        let created_at = card.created_at;

        card.update(&CardPatch {
            catalog_ref: Some("Y".to_string()),
            ..Default::default()
        });

        assert_eq!(card.owner_id, "owner");
        assert_eq!(card.created_at, created_at);
        assert_eq!(card.catalog_ref, "Y");
    }

    #[test]
    fn test_generate_id_only_once() {
        let mut card = CardEntry::new("owner", "X");
        let id = card.generate_id().unwrap().to_string();

        assert!(!id.is_empty());
        assert!(card.generate_id().is_err());
        assert_eq!(card.id, id);
    }

    #[test]
    fn test_absorb_sums_amounts_and_keeps_id() {
        let mut survivor = CardEntry::new("owner", "X");
        survivor.id = "1".to_string();
        survivor.amount = 2;

        let mut updated = CardEntry::new("owner", "X");
        updated.id = "2".to_string();
        updated.amount = 1;
        updated.tags = tags(&["trade"]);

        survivor.absorb(&updated);

        assert_eq!(survivor.id, "1");
        assert_eq!(survivor.amount, 3);
        assert_eq!(survivor.tags, tags(&["trade"]));
    }

    #[test]
    fn test_patch_helpers() {
        assert!(CardPatch::default().is_empty());

        let amount_only = CardPatch {
            amount: Some(AmountDelta::relative(1)),
            ..Default::default()
        };
        assert!(!amount_only.is_empty());
        assert!(!amount_only.has_identity_fields());

        let foil = CardPatch {
            foil: Some(false),
            ..Default::default()
        };
        assert!(foil.has_identity_fields());
    }
}

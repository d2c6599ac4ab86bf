// 📨 Change Requests - what an owner asks the engine to do
//
// Two forms:
// - RawChangeRequest: loose wire form (strings, ints, bools, aliases)
// - ChangeRequest:    typed form the engine consumes
//
// Every parse failure is scoped to its own request; a bad item never
// fails the rest of the batch.

use crate::amount::AmountDelta;
use crate::entities::{CardEntry, CardPatch, Condition};
use crate::error::RequestError;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Result of parsing one request of a batch
pub type ParsedRequest = Result<ChangeRequest, RequestError>;

// ============================================================================
// TYPED REQUEST
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRequest {
    /// Target a specific existing entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Field values to apply (identity fields also drive matching when no id)
    #[serde(flatten)]
    pub patch: CardPatch,

    /// Remove the resolved entry outright
    #[serde(default)]
    pub delete: bool,
}

impl ChangeRequest {
    pub fn by_id(id: impl Into<String>) -> Self {
        ChangeRequest {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn by_catalog_ref(catalog_ref: impl Into<String>) -> Self {
        ChangeRequest {
            patch: CardPatch {
                catalog_ref: Some(catalog_ref.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn with_amount(mut self, amount: AmountDelta) -> Self {
        self.patch.amount = Some(amount);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.patch.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_foil(mut self, foil: bool) -> Self {
        self.patch.foil = Some(foil);
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.patch.condition = Some(condition);
        self
    }

    pub fn with_signed(mut self, signed: bool) -> Self {
        self.patch.signed = Some(signed);
        self
    }

    pub fn with_altered(mut self, altered: bool) -> Self {
        self.patch.altered = Some(altered);
        self
    }

    pub fn with_misprint(mut self, misprint: bool) -> Self {
        self.patch.misprint = Some(misprint);
        self
    }

    pub fn deleting(mut self) -> Self {
        self.delete = true;
        self
    }

    /// Candidate entry built from the identity fields, defaults for the rest.
    ///
    /// Without an id the catalog reference is the minimum needed to name a
    /// card; anything less is rejected rather than guessed.
    pub fn identity_template(&self, owner_id: &str) -> Result<CardEntry, RequestError> {
        let catalog_ref = match &self.patch.catalog_ref {
            Some(catalog_ref) => catalog_ref,
            None => {
                return Err(RequestError::validation(
                    "request needs an id or a catalog_ref to resolve a target",
                ))
            }
        };

        let mut wanted = CardEntry::new(owner_id, catalog_ref.as_str());
        if let Some(tags) = &self.patch.tags {
            wanted.tags = tags.clone();
        }
        wanted.foil = self.patch.foil.unwrap_or(false);
        wanted.condition = self.patch.condition.unwrap_or_default();
        wanted.signed = self.patch.signed.unwrap_or(false);
        wanted.altered = self.patch.altered.unwrap_or(false);
        wanted.misprint = self.patch.misprint.unwrap_or(false);
        Ok(wanted)
    }
}

// ============================================================================
// RAW (WIRE) REQUEST
// ============================================================================

/// A scalar as it may arrive from JSON, CSV or query strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

/// Tags as a list or as one comma-separated string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTags {
    List(Vec<String>),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawChangeRequest {
    #[serde(default, alias = "_id")]
    pub id: Option<String>,
    #[serde(default, alias = "scryfall_id", alias = "card_id")]
    pub catalog_ref: Option<String>,
    #[serde(default)]
    pub amount: Option<RawValue>,
    #[serde(default, alias = "tag")]
    pub tags: Option<RawTags>,
    #[serde(default)]
    pub foil: Option<RawValue>,
    #[serde(default)]
    pub condition: Option<RawValue>,
    #[serde(default)]
    pub signed: Option<RawValue>,
    #[serde(default)]
    pub altered: Option<RawValue>,
    #[serde(default)]
    pub misprint: Option<RawValue>,
    #[serde(default)]
    pub delete: Option<RawValue>,
}

fn parse_bool(field: &str, raw: &RawValue) -> Result<bool, RequestError> {
    match raw {
        RawValue::Bool(b) => Ok(*b),
        RawValue::Text(text) => match text.trim().to_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(RequestError::parse(
                field,
                format!("`{text}` cannot be parsed as boolean"),
            )),
        },
        RawValue::Int(n) => Err(RequestError::parse(
            field,
            format!("`{n}` cannot be parsed as boolean"),
        )),
    }
}

fn parse_amount(raw: &RawValue) -> Result<AmountDelta, RequestError> {
    match raw {
        RawValue::Int(n) => Ok(AmountDelta::from_int(*n)),
        RawValue::Text(text) => Ok(AmountDelta::parse(text)?),
        RawValue::Bool(b) => Err(RequestError::parse(
            "amount",
            format!("`{b}` is not an amount"),
        )),
    }
}

fn parse_condition(raw: &RawValue) -> Result<Condition, RequestError> {
    match raw {
        RawValue::Int(n) => Ok(Condition::from_ordinal(*n)?),
        RawValue::Text(text) => Ok(Condition::parse(text)?),
        RawValue::Bool(b) => Err(RequestError::parse(
            "condition",
            format!("`{b}` is not a condition"),
        )),
    }
}

fn parse_tags(raw: &RawTags) -> BTreeSet<String> {
    let items: Vec<&str> = match raw {
        RawTags::List(list) => list.iter().map(String::as_str).collect(),
        RawTags::Text(text) => text.split(',').collect(),
    };
    items
        .into_iter()
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn optional<T>(
    raw: &Option<RawValue>,
    parse: impl Fn(&RawValue) -> Result<T, RequestError>,
) -> Result<Option<T>, RequestError> {
    raw.as_ref().map(parse).transpose()
}

impl TryFrom<RawChangeRequest> for ChangeRequest {
    type Error = RequestError;

    fn try_from(raw: RawChangeRequest) -> Result<Self, Self::Error> {
        let catalog_ref = match &raw.catalog_ref {
            Some(value) if value.trim().is_empty() => {
                return Err(RequestError::parse("catalog_ref", "must not be empty"))
            }
            Some(value) => Some(value.trim().to_string()),
            None => None,
        };

        Ok(ChangeRequest {
            id: non_blank(&raw.id),
            patch: CardPatch {
                catalog_ref,
                amount: optional(&raw.amount, parse_amount)?,
                tags: raw.tags.as_ref().map(parse_tags),
                foil: optional(&raw.foil, |v| parse_bool("foil", v))?,
                condition: optional(&raw.condition, parse_condition)?,
                signed: optional(&raw.signed, |v| parse_bool("signed", v))?,
                altered: optional(&raw.altered, |v| parse_bool("altered", v))?,
                misprint: optional(&raw.misprint, |v| parse_bool("misprint", v))?,
            },
            delete: optional(&raw.delete, |v| parse_bool("delete", v))?.unwrap_or(false),
        })
    }
}

/// Parse one JSON item, keeping any failure inside its slot
pub fn parse_json_item(item: serde_json::Value) -> ParsedRequest {
    let raw: RawChangeRequest = serde_json::from_value(item)
        .map_err(|e| RequestError::parse("request", e.to_string()))?;
    ChangeRequest::try_from(raw)
}

/// Parse a JSON batch: either an array of requests or `{"cards": [...]}`.
///
/// Only a malformed envelope fails the whole call.
pub fn parse_json_batch(json: &str) -> Result<Vec<ParsedRequest>> {
    let value: serde_json::Value =
        serde_json::from_str(json).context("Failed to parse request batch JSON")?;

    let items = match value {
        serde_json::Value::Array(items) => items,
        serde_json::Value::Object(mut map) => match map.remove("cards") {
            Some(serde_json::Value::Array(items)) => items,
            _ => bail!("expected a JSON array or an object with a `cards` array"),
        },
        _ => bail!("expected a JSON array or an object with a `cards` array"),
    };

    Ok(items.into_iter().map(parse_json_item).collect())
}

// ============================================================================
// TESTS
// ============================================================================

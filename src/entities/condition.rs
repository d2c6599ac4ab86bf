// 🃏 Card Condition - ordered grading scale
//
// NM < LP < MP < HP < DAMAGED
//
// Inputs arrive in many loose forms ("Near Mint", "near-mint", "nm", 0).
// They all go through one explicit table and fail closed on anything else.

use crate::error::ConditionParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "RawCondition")]
pub enum Condition {
    #[default]
    #[serde(rename = "NM")]
    NearMint,
    #[serde(rename = "LP")]
    LightlyPlayed,
    #[serde(rename = "MP")]
    ModeratelyPlayed,
    #[serde(rename = "HP")]
    HeavilyPlayed,
    #[serde(rename = "DAMAGED")]
    Damaged,
}

impl Condition {
    pub const ALL: [Condition; 5] = [
        Condition::NearMint,
        Condition::LightlyPlayed,
        Condition::ModeratelyPlayed,
        Condition::HeavilyPlayed,
        Condition::Damaged,
    ];

    /// Short name used for storage and on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::NearMint => "NM",
            Condition::LightlyPlayed => "LP",
            Condition::ModeratelyPlayed => "MP",
            Condition::HeavilyPlayed => "HP",
            Condition::Damaged => "DAMAGED",
        }
    }

    pub fn ordinal(&self) -> u8 {
        match self {
            Condition::NearMint => 0,
            Condition::LightlyPlayed => 1,
            Condition::ModeratelyPlayed => 2,
            Condition::HeavilyPlayed => 3,
            Condition::Damaged => 4,
        }
    }

    pub fn from_ordinal(ordinal: i64) -> Result<Self, ConditionParseError> {
        match ordinal {
            0 => Ok(Condition::NearMint),
            1 => Ok(Condition::LightlyPlayed),
            2 => Ok(Condition::ModeratelyPlayed),
            3 => Ok(Condition::HeavilyPlayed),
            4 => Ok(Condition::Damaged),
            _ => Err(ConditionParseError(ordinal.to_string())),
        }
    }

    /// Parse any accepted spelling.
    ///
    /// Case-insensitive; spaces and hyphens count as underscores.
    pub fn parse(raw: &str) -> Result<Self, ConditionParseError> {
        let normalized = raw.trim().to_uppercase().replace([' ', '-'], "_");

        match normalized.as_str() {
            "0" | "NM" | "NEAR_MINT" => Ok(Condition::NearMint),
            "1" | "LP" | "LIGHTLY_PLAYED" => Ok(Condition::LightlyPlayed),
            "2" | "MP" | "MODERATELY_PLAYED" => Ok(Condition::ModeratelyPlayed),
            "3" | "HP" | "HEAVILY_PLAYED" => Ok(Condition::HeavilyPlayed),
            "4" | "DAMAGED" => Ok(Condition::Damaged),
            _ => Err(ConditionParseError(raw.to_string())),
        }
    }
}

impl FromStr for Condition {
    type Err = ConditionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Condition::parse(s)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCondition {
    Ordinal(i64),
    Text(String),
}

impl TryFrom<RawCondition> for Condition {
    type Error = ConditionParseError;

    fn try_from(raw: RawCondition) -> Result<Self, Self::Error> {
        match raw {
            RawCondition::Ordinal(n) => Condition::from_ordinal(n),
            RawCondition::Text(text) => Condition::parse(&text),
        }
    }
}

// ➕ Amount Delta - absolute quantities vs. signed relative deltas
//
// "+2" / "-1" / -3  → relative (applied onto the current amount)
// "4"  / 4          → absolute (replaces the current amount)

use crate::error::AmountParseError;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::ops::Add;
use std::str::FromStr;

/// An amount carried by a change request.
///
/// A value is relative if its textual form had an explicit sign or if the
/// number itself is negative. Everything else is absolute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "RawAmount")]
pub struct AmountDelta {
    value: i64,
    is_relative: bool,
}

impl AmountDelta {
    pub fn absolute(value: i64) -> Self {
        AmountDelta {
            value,
            is_relative: false,
        }
    }

    pub fn relative(value: i64) -> Self {
        AmountDelta {
            value,
            is_relative: true,
        }
    }

    /// Integer input: negative numbers are relative, the rest absolute
    pub fn from_int(value: i64) -> Self {
        AmountDelta {
            value,
            is_relative: value < 0,
        }
    }

    /// Parse the textual form `^[+-]?[0-9]+$`.
    ///
    /// Surrounding whitespace is ignored; anything else fails.
    pub fn parse(raw: &str) -> Result<Self, AmountParseError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AmountParseError::new(raw, "empty amount"));
        }

        let (signed, digits) = match trimmed.as_bytes()[0] {
            b'+' | b'-' => (true, &trimmed[1..]),
            _ => (false, trimmed),
        };

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AmountParseError::new(raw, "expected [+-]digits"));
        }

        let value: i64 = trimmed
            .parse()
            .map_err(|_| AmountParseError::new(raw, "amount out of range"))?;

        Ok(AmountDelta {
            value,
            is_relative: signed || value < 0,
        })
    }

    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn is_relative(&self) -> bool {
        self.is_relative
    }

    pub fn is_absolute(&self) -> bool {
        !self.is_relative
    }

    /// Combine two deltas.
    ///
    /// relative + relative stays relative; any absolute operand makes the
    /// result absolute (the relative side is added onto the baseline).
    pub fn combine(self, other: AmountDelta) -> AmountDelta {
        AmountDelta {
            value: self.value.saturating_add(other.value),
            is_relative: self.is_relative && other.is_relative,
        }
    }

    /// Resolve against the current amount
    pub fn apply_to(&self, baseline: i64) -> i64 {
        if self.is_relative {
            baseline.saturating_add(self.value)
        } else {
            self.value
        }
    }
}

impl Add for AmountDelta {
    type Output = AmountDelta;

    fn add(self, rhs: AmountDelta) -> AmountDelta {
        self.combine(rhs)
    }
}

impl FromStr for AmountDelta {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AmountDelta::parse(s)
    }
}

impl fmt::Display for AmountDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_relative && self.value >= 0 {
            write!(f, "+{}", self.value)
        } else {
            write!(f, "{}", self.value)
        }
    }
}

// Relative amounts keep their sign on the wire, absolute ones are plain numbers
impl Serialize for AmountDelta {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_relative {
            serializer.serialize_str(&self.to_string())
        } else {
            serializer.serialize_i64(self.value)
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Int(i64),
    Text(String),
}

impl TryFrom<RawAmount> for AmountDelta {
    type Error = AmountParseError;

    fn try_from(raw: RawAmount) -> Result<Self, Self::Error> {
        match raw {
            RawAmount::Int(value) => Ok(AmountDelta::from_int(value)),
            RawAmount::Text(text) => AmountDelta::parse(&text),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

// Entity Models
//
// Each card entry has:
// - Row identity (id) assigned once, on first persist
// - Card identity (identity tuple) used to detect duplicates
// - Mutable values applied through an explicit field patch

pub mod card;
pub mod condition;

pub use card::{CardEntry, CardPatch, EntryState, IdentityKey};
pub use condition::Condition;

// Card Collection - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod amount;         // Absolute / relative amount deltas
pub mod catalog;        // Catalog lookup collaborator
pub mod collection;     // One owner's in-memory snapshot
pub mod config;         // TOML configuration
pub mod deduplication;  // Identity matcher + duplicate audit
pub mod entities;       // Card entry, identity tuple, condition
pub mod error;          // Error taxonomy
pub mod import;         // CSV / JSON batch loading
pub mod reconciliation; // Reconciliation engine
pub mod request;        // Change requests (typed + wire form)
pub mod store;          // SQLite persistence + audit trail

// Re-export commonly used types
pub use amount::AmountDelta;
pub use catalog::{CatalogLookup, StaticCatalog};
pub use collection::Collection;
pub use config::{Config, ServerConfig};
pub use deduplication::{find_by_identity, find_duplicates, DuplicateGroup};
pub use entities::{CardEntry, CardPatch, Condition, EntryState, IdentityKey};
pub use error::{AmbiguousStateError, AmountParseError, ConditionParseError, RequestError};
pub use import::{load_batch, parse_csv_batch};
pub use reconciliation::{
    Operation, ReconciliationEngine, ReconciliationReport, ReconciliationResult, RequestOutcome,
};
pub use request::{
    parse_json_batch, parse_json_item, ChangeRequest, ParsedRequest, RawChangeRequest,
};
pub use store::{
    apply_batch, get_events_for_entity, insert_event, setup_database, CardFilter, CardStore,
    Event, FlushPlan, FlushSummary, SqliteCardStore,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ⚖️ Reconciliation Engine - apply a batch of change requests to a collection
//
// For each request, in order:
//   1. resolve the target (by id, or by identity tuple)
//   2. create / update / delete it
//   3. merge it into any entry it now duplicates
//
// Later requests see the effects of earlier ones. Per-request failures stay
// in that request's slot; a double identity match aborts the whole batch.
//
// The engine is pure computation over an in-memory Collection. Loading and
// flushing happen in the store, before and after.

use crate::catalog::CatalogLookup;
use crate::collection::Collection;
use crate::amount::AmountDelta;
use crate::entities::{CardEntry, CardPatch, EntryState};
use crate::error::{AmbiguousStateError, RequestError};
use crate::request::{ChangeRequest, ParsedRequest};
use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;

// ============================================================================
// OPERATION + RESULT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Created,
    Updated,
    Deleted,
    Noop,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Created => "created",
            Operation::Updated => "updated",
            Operation::Deleted => "deleted",
            Operation::Noop => "noop",
        }
    }
}

/// Net effect on one entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationResult {
    pub operation: Operation,

    /// Resulting entry, or the entry that was removed
    pub entry: CardEntry,
}

impl ReconciliationResult {
    fn new(operation: Operation, entry: CardEntry) -> Self {
        ReconciliationResult { operation, entry }
    }
}

/// What happened to one request: its results (a merge yields two), or the
/// error that stopped just this request
pub type RequestOutcome = Result<Vec<ReconciliationResult>, RequestError>;

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub owner_id: String,

    /// One slot per input request, in input order
    #[serde(serialize_with = "serialize_outcomes")]
    pub outcomes: Vec<RequestOutcome>,

    pub reconciled_at: DateTime<Utc>,
}

impl ReconciliationReport {
    /// All results, flattened in request order
    pub fn results(&self) -> impl Iterator<Item = &ReconciliationResult> {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.as_ref().ok())
            .flatten()
    }

    /// Rejected requests as (request index, error)
    pub fn errors(&self) -> Vec<(usize, &RequestError)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(index, outcome)| outcome.as_ref().err().map(|err| (index, err)))
            .collect()
    }

    pub fn has_errors(&self) -> bool {
        self.outcomes.iter().any(Result::is_err)
    }

    pub fn created(&self) -> Vec<&CardEntry> {
        self.entries_with(Operation::Created)
    }

    pub fn updated(&self) -> Vec<&CardEntry> {
        self.entries_with(Operation::Updated)
    }

    pub fn deleted(&self) -> Vec<&CardEntry> {
        self.entries_with(Operation::Deleted)
    }

    pub fn count(&self, operation: Operation) -> usize {
        self.results().filter(|r| r.operation == operation).count()
    }

    /// Entries for one operation, one per id, latest state wins
    fn entries_with(&self, operation: Operation) -> Vec<&CardEntry> {
        let mut position: HashMap<&str, usize> = HashMap::new();
        let mut entries: Vec<&CardEntry> = Vec::new();

        for result in self.results().filter(|r| r.operation == operation) {
            match position.get(result.entry.id.as_str()) {
                Some(&index) => entries[index] = &result.entry,
                None => {
                    position.insert(result.entry.id.as_str(), entries.len());
                    entries.push(&result.entry);
                }
            }
        }

        entries
    }

    pub fn summary(&self) -> String {
        format!(
            "Reconciliation for {}: {} requests, {} created, {} updated, {} deleted, {} no-op, {} rejected",
            self.owner_id,
            self.outcomes.len(),
            self.count(Operation::Created),
            self.count(Operation::Updated),
            self.count(Operation::Deleted),
            self.count(Operation::Noop),
            self.errors().len()
        )
    }
}

fn serialize_outcomes<S: Serializer>(
    outcomes: &[RequestOutcome],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    struct Slot<'a>(usize, &'a RequestOutcome);

    impl Serialize for Slot<'_> {
        fn serialize<T: Serializer>(&self, serializer: T) -> Result<T::Ok, T::Error> {
            let mut state = serializer.serialize_struct("RequestOutcome", 3)?;
            state.serialize_field("index", &self.0)?;
            match self.1 {
                Ok(results) => {
                    state.serialize_field("status", "applied")?;
                    state.serialize_field("results", results)?;
                }
                Err(error) => {
                    state.serialize_field("status", "rejected")?;
                    state.serialize_field("error", error)?;
                }
            }
            state.end()
        }
    }

    serializer.collect_seq(outcomes.iter().enumerate().map(|(i, o)| Slot(i, o)))
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

/// Per-request failure vs. batch-aborting failure
enum Failure {
    Request(RequestError),
    Fatal(AmbiguousStateError),
}

impl From<RequestError> for Failure {
    fn from(err: RequestError) -> Self {
        Failure::Request(err)
    }
}

impl From<AmbiguousStateError> for Failure {
    fn from(err: AmbiguousStateError) -> Self {
        Failure::Fatal(err)
    }
}

#[derive(Default)]
pub struct ReconciliationEngine<'a> {
    /// Checked on creation only; `None` accepts any catalog reference
    catalog: Option<&'a dyn CatalogLookup>,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new() -> Self {
        ReconciliationEngine { catalog: None }
    }

    pub fn with_catalog(catalog: &'a dyn CatalogLookup) -> Self {
        ReconciliationEngine {
            catalog: Some(catalog),
        }
    }

    /// Reconcile typed requests against `collection`, mutating it in place.
    ///
    /// On `Err` the collection may be partially updated and must be
    /// discarded, not flushed.
    pub fn reconcile(
        &self,
        collection: &mut Collection,
        requests: &[ChangeRequest],
    ) -> Result<ReconciliationReport, AmbiguousStateError> {
        self.reconcile_batch(collection, requests.iter().cloned().map(Ok).collect())
    }

    /// Same as `reconcile`, for batches whose items may have failed parsing.
    ///
    /// A parse failure occupies its slot in the report; the rest of the
    /// batch still runs.
    pub fn reconcile_batch(
        &self,
        collection: &mut Collection,
        requests: Vec<ParsedRequest>,
    ) -> Result<ReconciliationReport, AmbiguousStateError> {
        let mut outcomes = Vec::with_capacity(requests.len());

        for (index, parsed) in requests.into_iter().enumerate() {
            let outcome = match parsed {
                Ok(request) => match self.process(collection, &request) {
                    Ok(results) => Ok(results),
                    Err(Failure::Request(err)) => Err(err),
                    Err(Failure::Fatal(err)) => {
                        tracing::error!(
                            owner_id = collection.owner_id(),
                            request = index,
                            fingerprint = %err.fingerprint,
                            entries = ?err.entry_ids,
                            "duplicate identity in stored collection, aborting batch"
                        );
                        return Err(err);
                    }
                },
                Err(err) => Err(err),
            };

            match &outcome {
                Ok(results) => {
                    for result in results {
                        tracing::debug!(
                            request = index,
                            operation = result.operation.as_str(),
                            entry_id = %result.entry.id,
                            amount = result.entry.amount,
                            "request applied"
                        );
                    }
                }
                Err(err) => tracing::warn!(request = index, error = %err, "request rejected"),
            }

            outcomes.push(outcome);
        }

        let report = ReconciliationReport {
            owner_id: collection.owner_id().to_string(),
            outcomes,
            reconciled_at: Utc::now(),
        };
        tracing::info!("{}", report.summary());
        Ok(report)
    }

    fn process(
        &self,
        collection: &mut Collection,
        request: &ChangeRequest,
    ) -> Result<Vec<ReconciliationResult>, Failure> {
        // 1. Resolve target
        if let Some(id) = &request.id {
            if !collection.contains(id) {
                // ids are never assignable by the caller
                return Err(RequestError::not_found(id).into());
            }
            return if request.delete {
                Ok(self.delete(collection, id))
            } else {
                self.update(collection, id, &request.patch)
            };
        }

        let wanted = request.identity_template(collection.owner_id())?;
        let target_id = collection.find_by_identity(&wanted)?.map(|e| e.id.clone());

        // Naming a card without an amount adds one copy of it
        let mut patch = request.patch.clone();
        if patch.amount.is_none() {
            patch.amount = Some(AmountDelta::relative(1));
        }

        // 2. Apply
        match (target_id, request.delete) {
            (Some(id), true) => Ok(self.delete(collection, &id)),
            (Some(id), false) => self.update(collection, &id, &patch),
            (None, true) => Ok(vec![ReconciliationResult::new(Operation::Noop, wanted)]),
            (None, false) => self.create(collection, &patch, wanted),
        }
    }

    fn create(
        &self,
        collection: &mut Collection,
        patch: &CardPatch,
        mut entry: CardEntry,
    ) -> Result<Vec<ReconciliationResult>, Failure> {
        entry.amount = match patch.amount {
            None => 1,
            Some(delta) if delta.is_absolute() && delta.value() == 0 => 1,
            Some(delta) => delta.apply_to(0),
        };

        if entry.is_pending_delete() {
            return Ok(vec![ReconciliationResult::new(Operation::Noop, entry)]);
        }

        if let Some(catalog) = self.catalog {
            if !catalog.exists(&entry.catalog_ref) {
                return Err(RequestError::validation(format!(
                    "catalog_ref {} does not exist in the catalog",
                    entry.catalog_ref
                ))
                .into());
            }
        }

        entry.generate_id()?;
        collection
            .insert(entry.clone())
            .map_err(|e| RequestError::validation(e.to_string()))?;

        Ok(vec![ReconciliationResult::new(Operation::Created, entry)])
    }

    fn update(
        &self,
        collection: &mut Collection,
        id: &str,
        patch: &CardPatch,
    ) -> Result<Vec<ReconciliationResult>, Failure> {
        let target = collection
            .get_mut(id)
            .ok_or_else(|| RequestError::not_found(id))?;
        let before = target.clone();

        let state = target.update(patch);
        if *target == before {
            return Ok(vec![ReconciliationResult::new(Operation::Noop, before)]);
        }

        let updated = target.clone();

        // 3. Merge into an entry the update now duplicates
        let duplicate_id = collection.find_by_identity(&updated)?.map(|e| e.id.clone());
        let Some(duplicate_id) = duplicate_id else {
            return Ok(match state {
                EntryState::PendingDelete => self.delete(collection, id),
                EntryState::Active => {
                    vec![ReconciliationResult::new(Operation::Updated, updated)]
                }
            });
        };

        collection.remove(id);
        let survivor = collection
            .get_mut(&duplicate_id)
            .ok_or_else(|| RequestError::not_found(&duplicate_id))?;
        survivor.absorb(&updated);

        tracing::debug!(
            survivor = %duplicate_id,
            merged = %id,
            amount = survivor.amount,
            "merged duplicate entries"
        );

        // the summed amount can still leave nothing
        let survivor_result = if survivor.is_pending_delete() {
            self.delete(collection, &duplicate_id)
        } else {
            vec![ReconciliationResult::new(Operation::Updated, survivor.clone())]
        };

        let mut results = survivor_result;
        results.push(ReconciliationResult::new(Operation::Deleted, updated));
        Ok(results)
    }

    fn delete(&self, collection: &mut Collection, id: &str) -> Vec<ReconciliationResult> {
        collection
            .remove(id)
            .map(|entry| ReconciliationResult::new(Operation::Deleted, entry))
            .into_iter()
            .collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================

//! Incremental change events from the upstream query feed.

use serde::{Deserialize, Serialize};

/// A single query result record: a flat map of field name to JSON value.
pub type ResultRow = serde_json::Map<String, serde_json::Value>;

/// The before/after pair for an updated result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedResult {
    /// The record as it was before the update, when the feed provides it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<ResultRow>,
    /// The record after the update. This is the version written to the sink.
    pub after: ResultRow,
}

impl UpdatedResult {
    /// Creates an update pair from before and after records.
    pub fn new(before: ResultRow, after: ResultRow) -> Self {
        Self {
            before: Some(before),
            after,
        }
    }

    /// Creates an update pair with only the after record.
    pub fn after_only(after: ResultRow) -> Self {
        Self {
            before: None,
            after,
        }
    }
}

/// One incremental batch of changes to a query result set.
///
/// Change events are emitted by the upstream feed in non-decreasing sequence
/// order per query. An event is immutable once received; the engine only
/// decides whether to apply it or skip it as stale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// Identifier of the query this event belongs to.
    pub query_id: String,
    /// Sequence number of this batch within the query's feed.
    pub sequence: u64,
    /// Records that entered the result set.
    #[serde(default)]
    pub added_results: Vec<ResultRow>,
    /// Records that changed within the result set.
    #[serde(default)]
    pub updated_results: Vec<UpdatedResult>,
    /// Records that left the result set.
    #[serde(default)]
    pub deleted_results: Vec<ResultRow>,
}

impl ChangeEvent {
    /// Creates an empty change event for a query at a sequence.
    pub fn new(query_id: impl Into<String>, sequence: u64) -> Self {
        Self {
            query_id: query_id.into(),
            sequence,
            added_results: Vec::new(),
            updated_results: Vec::new(),
            deleted_results: Vec::new(),
        }
    }

    /// Adds a record to the added results.
    pub fn with_added(mut self, row: ResultRow) -> Self {
        self.added_results.push(row);
        self
    }

    /// Adds a before/after pair to the updated results.
    pub fn with_updated(mut self, update: UpdatedResult) -> Self {
        self.updated_results.push(update);
        self
    }

    /// Adds a record to the deleted results.
    pub fn with_deleted(mut self, row: ResultRow) -> Self {
        self.deleted_results.push(row);
        self
    }

    /// Returns the rows destined for upsert: added rows followed by the
    /// `after` side of each update.
    pub fn upsert_rows(&self) -> impl Iterator<Item = &ResultRow> {
        self.added_results
            .iter()
            .chain(self.updated_results.iter().map(|u| &u.after))
    }

    /// Total number of records carried by this event.
    pub fn record_count(&self) -> usize {
        self.added_results.len() + self.updated_results.len() + self.deleted_results.len()
    }

    /// Returns true if the event carries no records.
    pub fn is_empty(&self) -> bool {
        self.record_count() == 0
    }
}

//! Snapshot stream elements.

use crate::change_event::ResultRow;
use serde::{Deserialize, Serialize};

/// The header element of a snapshot stream.
///
/// The header carries the feed sequence number the snapshot was taken at.
/// A snapshot without a header cannot be trusted as a baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewHeader {
    /// Feed sequence number at the time the snapshot was produced.
    pub sequence: u64,
}

/// One element of a snapshot stream.
///
/// A well-formed stream is exactly one `Header` followed by zero or more
/// `Row` elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ViewItem {
    /// The stream header. Must be the first element.
    #[serde(rename = "header")]
    Header(ViewHeader),
    /// A single result record.
    #[serde(rename = "data")]
    Row(ResultRow),
}

impl ViewItem {
    /// Creates a header item.
    pub fn header(sequence: u64) -> Self {
        ViewItem::Header(ViewHeader { sequence })
    }

    /// Creates a row item.
    pub fn row(row: ResultRow) -> Self {
        ViewItem::Row(row)
    }

    /// Returns the header sequence if this item is a header.
    pub fn as_header(&self) -> Option<&ViewHeader> {
        match self {
            ViewItem::Header(h) => Some(h),
            ViewItem::Row(_) => None,
        }
    }

    /// Returns the record if this item is a row.
    pub fn as_row(&self) -> Option<&ResultRow> {
        match self {
            ViewItem::Header(_) => None,
            ViewItem::Row(row) => Some(row),
        }
    }
}

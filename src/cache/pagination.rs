//! Forward-only cursor pagination.

use serde::Serialize;

/// Rows that expose the monotonic key they are ordered by.
pub trait CursorKey {
    fn cursor_key(&self) -> String;
}

/// One page of rows.
///
/// `next_cursor` is the key of the last returned row, `None` when the page
/// is empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<R> {
    pub data: Vec<R>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

impl<R: CursorKey> Page<R> {
    /// Build a page from up to `limit + 1` fetched rows
    pub fn from_overfetch(mut rows: Vec<R>, limit: usize) -> Self {
        let has_more = rows.len() > limit;
        rows.truncate(limit);
        let next_cursor = rows.last().map(CursorKey::cursor_key);
        Self {
            data: rows,
            next_cursor,
            has_more,
        }
    }
}

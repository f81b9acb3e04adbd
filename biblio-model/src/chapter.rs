use crate::ids::{ChapterId, FileId};

/// Belongs to exactly one `File`. Never reconciled on rescan once created —
/// chapters are user-owned.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    pub id: ChapterId,
    pub file_id: FileId,
    pub parent_id: Option<ChapterId>,
    pub title: String,
    pub sort_order: i32,
    pub start_page: Option<i32>,
    pub start_timestamp_ms: Option<i64>,
    pub href: Option<String>,
}

/// The tree shape chapters are parsed/persisted as before being flattened
/// into rows with `parent_id` pointers. `sort_order` is dense 0..n-1 within
/// a sibling group.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChapterNode {
    pub title: String,
    pub start_page: Option<i32>,
    pub start_timestamp_ms: Option<i64>,
    pub href: Option<String>,
    pub children: Vec<ChapterNode>,
}

impl ChapterNode {
    /// Invariant check used by parsers and tests: within one sibling slice,
    /// `start_page`/`start_timestamp_ms` must be monotonically non-decreasing.
    pub fn is_monotonic(nodes: &[ChapterNode]) -> bool {
        let mut last_page = None;
        let mut last_ts = None;
        for node in nodes {
            if let (Some(last), Some(cur)) = (last_page, node.start_page) {
                if cur < last {
                    return false;
                }
            }
            if let (Some(last), Some(cur)) = (last_ts, node.start_timestamp_ms) {
                if cur < last {
                    return false;
                }
            }
            if node.start_page.is_some() {
                last_page = node.start_page;
            }
            if node.start_timestamp_ms.is_some() {
                last_ts = node.start_timestamp_ms;
            }
            if !Self::is_monotonic(&node.children) {
                return false;
            }
        }
        true
    }
}

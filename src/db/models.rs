// Row types for the seen-set tables.

use crate::model::ReplyState;

/// What the store remembers about a previously-processed review.
///
/// Created when a review is first classified as new, and its snapshot is
/// rewritten when a reply later appears. The display columns in the table
/// are not part of this type — the detector only needs the snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SeenRecord {
    pub id: String,
    pub reply_state_snapshot: ReplyState,
    pub processed_at: String,
}

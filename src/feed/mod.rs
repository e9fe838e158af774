//! Bulk feeds loaded outside the reconciliation path.
//!
//! A feed is a lazy, finite, single-pass sequence of items. Feed items are
//! only ever upserted.

mod download;
mod tsv;

pub use download::download_feed;
pub use tsv::TsvFeed;

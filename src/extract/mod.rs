//! The resumable extraction-and-merge engine.

pub mod checkpoint;
pub mod field_resolver;
pub mod item_type;
pub mod merge_store;
pub mod range_walker;
pub mod rate_limit;

pub use checkpoint::CheckpointWriter;
pub use item_type::ItemType;
pub use merge_store::{ExtractedRecord, MergeStore, OutputDocument};
pub use range_walker::{RangeSpec, RangeWalker, WalkStats, WalkerState};
pub use rate_limit::{RateLimitGuard, RateLimitInfo};

//! Staleness policy
//!
//! Pure decision logic over item metadata: when a stored record becomes
//! eligible for refetch, and whether a key should be fetched right now.
//!
//! # Components
//!
//! - `StalenessPolicy`: computes `next_eligible_at` and answers `should_fetch`
//! - `ItemState`: where an item sits in the Unseen -> Fresh -> Stale cycle

mod item_state;
mod staleness;

pub use item_state::ItemState;
pub use staleness::StalenessPolicy;

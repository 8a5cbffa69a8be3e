//! Core data models for the match tracker.

mod cache_state;
mod ids;
mod match_record;

pub use cache_state::*;
pub use ids::*;
pub use match_record::*;

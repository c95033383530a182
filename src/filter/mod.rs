pub mod rules;
pub mod score;
pub mod thresholds;

pub use rules::{accepts, pre_filter, validate_listing, FilterStats, RejectReason};
pub use score::quality_score;
pub use thresholds::FilterThresholds;

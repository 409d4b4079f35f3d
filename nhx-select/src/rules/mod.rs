//! Table-driven selection rules
//!
//! Pure functions over labels and names; no filesystem access.

pub mod classifier;
pub mod ranker;
pub mod session_key;

pub use classifier::{Classification, Pattern, PatternClassifier};
pub use ranker::PriorityRanker;
pub use session_key::derive_session_key;

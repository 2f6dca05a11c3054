pub mod backoff;
pub mod failures;

pub use backoff::BackoffController;
pub use failures::{FailureRecord, FailureTracker};

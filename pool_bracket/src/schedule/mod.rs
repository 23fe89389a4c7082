//! Pool-play schedule generation.

pub mod round_robin;

pub use round_robin::{PoolScheduleBuilder, validate_assignment};

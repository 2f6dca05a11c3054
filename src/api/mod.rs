pub mod health;
pub mod latency;
pub mod routes;
pub mod sweeper;

pub use health::HealthState;
pub use latency::LatencyStats;
pub use routes::{router, ApiState};
pub use sweeper::ProxySweeper;

pub mod graceful_shutdown;
pub mod health;

pub use graceful_shutdown::{GracefulShutdown, ShutdownReason};
pub use health::HealthState;

pub mod health;
pub mod invoke;
pub mod jobs;
pub mod metrics;

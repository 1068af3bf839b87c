//! Domain building blocks shared by every heirloom crate.
//!
//! This crate has zero internal dependencies: job status rules, batch
//! aggregation, prompt framing, webhook signatures and the rate limiter are
//! all pure (or nearly pure) and unit-tested here.

pub mod batch;
pub mod error;
pub mod job_status;
pub mod prompt;
pub mod rate_limit;
pub mod restoration;
pub mod signature;
pub mod text;
pub mod types;

//! Affiliget - rate-limited affiliate product acquisition.
//!
//! A safety layer in front of affiliate-marketing APIs (Coupang Partners,
//! AliExpress affiliate platform): sliding-window quota tracking, a two-tier
//! TTL cache, a backoff policy for provider rate limits, and a bounded error
//! log for post-hoc inspection.

pub mod api;
pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod errorlog;
pub mod models;
pub mod providers;
pub mod quota;
pub mod sign;
pub mod store;

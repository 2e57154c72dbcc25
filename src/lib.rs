//! Quotaguard - Usage Quotas and Request Throttling
//!
//! This crate gates chat and API usage per user or per client IP across
//! fixed time windows. IP throttles run on a shared Redis counter and fall
//! back to process-local counters when Redis is unreachable. Per-user chat
//! quotas are kept on durable user records and chosen by subscription tier.

pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod ratelimit;
pub mod store;

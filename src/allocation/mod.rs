//! Device allocation scheduling
//!
//! This module arbitrates concurrent demand for the device pool through a
//! priority queue and a deterministic multi-factor scoring function.
//!
//! # Overview
//!
//! Callers submit [`AllocationRequest`]s and suspend until the scheduler
//! grants a device, rejects the request, or its wait bound elapses. A
//! scheduling pass runs on every submission, every release, and on a bounded
//! polling tick, so the queue never busy-spins.
//!
//! # Selection
//!
//! For each request, available devices supporting the requested platform and
//! activity (and any explicit constraints) are scored:
//!
//! | Factor | Weight |
//! |--------|--------|
//! | battery level | 0.20 |
//! | thermal headroom | 0.15 |
//! | success rate | 0.25 |
//! | time since last use | 0.20 |
//! | account assigned for platform | 0.10 |
//! | cpu+memory headroom | 0.10 |
//!
//! The highest score wins; ties break to the lowest device id. If no device
//! qualifies, the wait estimate (shortest remaining session on a covering
//! busy device) decides between queueing and rejecting: estimates over
//! 30 minutes reject immediately.

pub mod error;
pub mod request;
pub mod scheduler;
pub mod scoring;

// Re-export main types
pub use error::{AllocationError, AllocationResult};
pub use request::{AllocationRequest, Grant, RequestPriority};
pub use scheduler::{AllocationScheduler, SchedulerConfig};
pub use scoring::{pick_best, score_device, shortest_wait_mins, MAX_WAIT_MINS};

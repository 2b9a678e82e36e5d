//! Integration tests for relation resolution, eager loading and pivot management
//!
//! Every test runs against `MemoryStore`, which logs each issued statement so
//! query counts can be asserted exactly.

mod common;
mod eager_loading;
mod existence_and_counts;
mod persistence;
mod pivot_membership;

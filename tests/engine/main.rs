//! Delegate Engine Integration Tests
//!
//! Tests for courier-engine: ordering, failure handling, shutdown, HTTP.

#[path = "../common/mod.rs"]
mod common;

mod failures;
mod ordering;
mod shutdown;

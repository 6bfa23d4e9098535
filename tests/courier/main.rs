//! Courier Facade Integration Tests
//!
//! Tests for the root crate: configuration files, builder, end-to-end use.

#[path = "../common/mod.rs"]
mod common;

mod config;
mod facade;

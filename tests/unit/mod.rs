// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Unit tests for the GitLab charm
//!
//! This module contains unit tests for:
//! - Unit store backends
//! - Relation adapters
//! - Configuration rendering and reconciliation
//! - The staged upgrade loop
//! - MySQL to PostgreSQL migration
//! - Hook and action dispatch

#[path = "../common/mod.rs"]
mod common;

mod migration;
mod relations;
mod store;
mod upgrade;

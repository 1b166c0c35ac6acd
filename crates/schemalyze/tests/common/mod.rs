//! Shared test utilities for schemalyze integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring a scheduler to an in-memory store and event channel
//! - Fake stages with controllable outcomes and stage-set builders

#![allow(dead_code)]

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;

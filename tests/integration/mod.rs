//! Integration test suite for detsched.
//!
//! These tests build whole systems, run them under every schedule and
//! compare the recorded histories.
//!
//! # Test Categories
//!
//! - `scenario`: The six-task demonstration system under all schedules
//! - `determinism`: Construction checks and transform properties
//! - `ordering`: Engine event order and failure handling

mod fixtures;

mod ordering;
mod scenario;

//! Integration tests for statewire
//!
//! These tests pause a live heap into a document and resume it in a fresh container.

#[path = "../common/mod.rs"]
pub mod common;

pub mod cli;
pub mod errors;
pub mod properties;
pub mod reactivity;
pub mod roundtrip;

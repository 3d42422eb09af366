//! Shared test utilities for statewire
//!
//! - Pause/resume fixtures
//! - Small heap builders for components and closures

//! Unified output module for caller results
//!
//! This module provides:
//! - `UnifiedOutput`: the single structure holding a run's results
//! - `OutputCollector`: a builder for assembling and writing it
//! - flat-file serializers for the SVP/BED/BEDPE/annotation/track surfaces

pub mod collector;
pub mod schema;
pub mod types;
pub mod writers;

pub use collector::OutputCollector;
pub use types::{RunStats, SvCall, UnifiedOutput};

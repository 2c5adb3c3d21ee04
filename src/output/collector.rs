//! Output collector for assembling caller results
//!
//! The `OutputCollector` provides a builder pattern for collecting the
//! results of a run into a unified output structure.

use std::fs::File;

use crate::config::InsertProfile;

use super::types::{RunStats, SvCall, UnifiedOutput};

/// Builder for collecting caller outputs into a unified structure
pub struct OutputCollector {
    output: UnifiedOutput,
}

impl OutputCollector {
    /// Create a new output collector with version and source file
    pub fn new(source: &str) -> Self {
        Self {
            output: UnifiedOutput {
                version: env!("CARGO_PKG_VERSION").to_string(),
                source: source.to_string(),
                ..Default::default()
            },
        }
    }

    /// Set the insert windows used for the run
    pub fn with_library(mut self, profile: InsertProfile) -> Self {
        self.output.library = Some(profile);
        self
    }

    /// Set the emitted calls
    pub fn with_calls(mut self, calls: Vec<SvCall>) -> Self {
        self.output.calls = Some(calls);
        self
    }

    /// Set run counters
    pub fn with_stats(mut self, stats: RunStats) -> Self {
        self.output.stats = Some(stats);
        self
    }

    /// Build and return the final unified output
    pub fn build(self) -> UnifiedOutput {
        self.output
    }

    /// Get a reference to the current output (for inspection)
    pub fn output(&self) -> &UnifiedOutput {
        &self.output
    }

    /// Write unified JSON to the specified path.
    ///
    /// The output is checked against the schema and the call wire
    /// invariants first — always in debug builds, opt-in via
    /// `MPSVAR_VALIDATE_OUTPUT=1` in release builds. A violation is fatal
    /// in debug builds and a warning otherwise.
    pub fn write_json(&self, path: &str) -> std::io::Result<()> {
        let validate = cfg!(debug_assertions)
            || std::env::var("MPSVAR_VALIDATE_OUTPUT").is_ok_and(|v| v == "1");
        if validate && let Err(msg) = super::schema::check_output(&self.output) {
            log::warn!("Output check failed for {}: {}", path, msg);
            if cfg!(debug_assertions) {
                return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, msg));
            }
        }
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, &self.output).map_err(std::io::Error::other)
    }

    /// Write unified JSON using the output prefix, as `{prefix}.result.json`
    pub fn write_to_prefix(&self, prefix: &str) -> std::io::Result<()> {
        let path = format!("{}.result.json", prefix);
        self.write_json(&path)
    }
}

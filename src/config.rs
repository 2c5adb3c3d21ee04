//! Configuration for the mpsvar caller.
//!
//! Two layers:
//! - `CallerConfig`: thresholds and switches for filtering, clustering, and QC
//! - `Constants`: the fixed tuning record (window, span, k-means parameters)
//!   passed to every component; there is no process-wide mutable state.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;

use crate::error::{SvError, SvResult};

/// The two insert-size windows of a mate-pair library.
///
/// `inward` bounds the FR (paired-end-like) population, `outward` the RF
/// (mate-pair) population. In the lite profile these come from configuration;
/// in the auto profile they are inferred from the fragment-size histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct InsertProfile {
    pub inward_min: u32,
    pub inward_max: u32,
    pub outward_min: u32,
    pub outward_max: u32,
}

impl InsertProfile {
    /// Check that the two windows are ordered and disjoint.
    pub fn validate(&self) -> SvResult<()> {
        if self.inward_min > self.inward_max || self.outward_min > self.outward_max {
            return Err(SvError::Config(format!(
                "insert windows are inverted: inward [{}, {}], outward [{}, {}]",
                self.inward_min, self.inward_max, self.outward_min, self.outward_max
            )));
        }
        if self.inward_max >= self.outward_min {
            return Err(SvError::Config(format!(
                "inward window [{}, {}] is not below the outward window [{}, {}]",
                self.inward_min, self.inward_max, self.outward_min, self.outward_max
            )));
        }
        Ok(())
    }
}

/// Fixed tuning constants.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Constants {
    /// Minimum INS/DEL size (and annotation half-width), in bp
    #[serde(default = "default_window")]
    pub window: u32,
    /// Tolerance multiplier for fused-cluster spatial extent
    #[serde(default = "default_span")]
    pub span: f64,
    /// Number of k-means clusters for the histogram noise floor
    #[serde(default = "default_kmeans_k")]
    pub kmeans_k: usize,
    /// Convergence threshold between successive k-means centroid shifts
    #[serde(default = "default_kmeans_delta")]
    pub kmeans_delta: f64,
    /// Fragment-size histogram bin width, in bp
    #[serde(default = "default_hist_bin")]
    pub hist_bin: u32,
    /// Maximum noise-cutoff sigma before declaring the library poor
    #[serde(default = "default_max_sigma")]
    pub max_sigma: u32,
}

fn default_window() -> u32 { 100 }
fn default_span() -> f64 { 2.5 }
fn default_kmeans_k() -> usize { 3 }
fn default_kmeans_delta() -> f64 { 0.001 }
fn default_hist_bin() -> u32 { 100 }
fn default_max_sigma() -> u32 { 3 }

impl Default for Constants {
    fn default() -> Self {
        Self {
            window: default_window(),
            span: default_span(),
            kmeans_k: default_kmeans_k(),
            kmeans_delta: default_kmeans_delta(),
            hist_bin: default_hist_bin(),
            max_sigma: default_max_sigma(),
        }
    }
}

/// Main caller configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CallerConfig {
    /// Minimum pairs per cluster for a call
    #[serde(default = "default_min_cluster_count")]
    pub min_cluster_count: u32,
    /// Minimum mapping quality per record
    #[serde(default)]
    pub min_mapping_quality: u8,
    /// Require the XT:A:U unique-mapping tag on every record
    #[serde(default)]
    pub unique_mapping: bool,
    /// Annotation prefix for emitted call names
    #[serde(default = "default_sv_name")]
    pub sv_name: String,
    /// Enable the QC de-duplication sweep
    #[serde(default)]
    pub qc_filter: bool,
    /// Insert windows (required in the lite profile, inferred otherwise)
    #[serde(default)]
    pub insert: Option<InsertProfile>,
    /// Tuning constants
    #[serde(default)]
    pub constants: Constants,
}

fn default_min_cluster_count() -> u32 { 2 }
fn default_sv_name() -> String { "SV".to_string() }

impl Default for CallerConfig {
    fn default() -> Self {
        Self {
            min_cluster_count: default_min_cluster_count(),
            min_mapping_quality: 0,
            unique_mapping: false,
            sv_name: default_sv_name(),
            qc_filter: false,
            insert: None,
            constants: Constants::default(),
        }
    }
}

impl CallerConfig {
    /// Load caller configuration from a JSON file.
    pub fn load(path: &str) -> SvResult<Self> {
        let file = File::open(path)
            .map_err(|e| SvError::Config(format!("cannot open config {}: {}", path, e)))?;
        let reader = BufReader::new(file);
        let config: CallerConfig = serde_json::from_reader(reader)
            .map_err(|e| SvError::Config(format!("malformed config {}: {}", path, e)))?;
        if let Some(profile) = &config.insert {
            profile.validate()?;
        }
        Ok(config)
    }

    /// The insert windows of the lite profile, or an error if absent.
    pub fn require_insert(&self) -> SvResult<InsertProfile> {
        self.insert.ok_or_else(|| {
            SvError::Config(
                "lite profile requires inward_min/inward_max/outward_min/outward_max".to_string(),
            )
        })
    }

    /// Maximum spatial extent of a single-evidence cluster, in bp.
    ///
    /// Clusters at or below this extent carry inward-pair evidence only and
    /// are never emitted on their own.
    pub fn inward_extent(&self, profile: &InsertProfile) -> f64 {
        profile.inward_max as f64 * self.constants.span
    }

    /// Maximum combined extent of a fused inward/outward cluster, in bp.
    pub fn fused_extent(&self, profile: &InsertProfile) -> f64 {
        profile.outward_max as f64 * self.constants.span
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CallerConfig::default();
        assert_eq!(config.min_cluster_count, 2);
        assert_eq!(config.sv_name, "SV");
        assert!(!config.qc_filter);
        assert_eq!(config.constants.window, 100);
        assert_eq!(config.constants.span, 2.5);
        assert_eq!(config.constants.kmeans_k, 3);
    }

    #[test]
    fn test_profile_validation() {
        let good = InsertProfile {
            inward_min: 0,
            inward_max: 500,
            outward_min: 2000,
            outward_max: 5000,
        };
        assert!(good.validate().is_ok());

        let overlapping = InsertProfile {
            inward_min: 0,
            inward_max: 2500,
            outward_min: 2000,
            outward_max: 5000,
        };
        assert!(overlapping.validate().is_err());

        let inverted = InsertProfile {
            inward_min: 500,
            inward_max: 0,
            outward_min: 2000,
            outward_max: 5000,
        };
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_extent_thresholds() {
        let config = CallerConfig::default();
        let profile = InsertProfile {
            inward_min: 0,
            inward_max: 500,
            outward_min: 2000,
            outward_max: 5000,
        };
        assert_eq!(config.inward_extent(&profile), 1250.0);
        assert_eq!(config.fused_extent(&profile), 12500.0);
    }
}

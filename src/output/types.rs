//! Output data structures for the unified caller output.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::config::InsertProfile;
use crate::sv::SvType;

/// Top-level unified output structure for one run
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct UnifiedOutput {
    /// Caller version
    pub version: String,

    /// Source alignment file
    pub source: String,

    /// Insert windows used for the run (configured or inferred)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library: Option<InsertProfile>,

    /// Emitted breakpoint calls
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calls: Option<Vec<SvCall>>,

    /// Run counters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<RunStats>,
}

/// One emitted breakpoint call. CTX events produce two cross-referenced
/// records, one per chromosome.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SvCall {
    /// Call name: the configured prefix plus a running index
    pub name: String,

    /// Dominant SV type of the cluster (TY)
    pub sv_type: SvType,

    pub chrom1: String,
    pub start1: u32,
    pub end1: u32,
    /// Reported side-1 orientation, inward-pair convention (O1)
    pub strand1: char,

    pub chrom2: String,
    pub start2: u32,
    pub end2: u32,
    /// Reported side-2 orientation, inward-pair convention (O2)
    pub strand2: char,

    /// Breakpoint anchors
    pub anchor1: u32,
    pub anchor2: u32,

    /// Annotation size of the event in bp
    pub size: u64,

    /// Supporting pair count (NR)
    pub count: u32,

    /// Inward and outward evidence were fused into this call (MG)
    pub merged: bool,

    /// Mate coordinates, present on CTX records only (CTX)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ctx_mate: Option<String>,
}

impl SvCall {
    pub fn is_intra(&self) -> bool {
        self.chrom1 == self.chrom2
    }
}

/// Counters accumulated over a run, reported for QC
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RunStats {
    /// Records read from the aligner input
    pub records_read: u64,

    /// Records surviving the flag gate and the pair filter
    pub records_clustered: u64,

    /// Malformed records skipped
    pub malformed: u64,

    /// Clusters held at the end of the streaming pass
    pub clusters: u64,

    /// Calls emitted
    pub calls_emitted: u64,
}

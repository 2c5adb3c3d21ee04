//! Pipeline orchestration.
//!
//! The auto profile makes two passes over the alignment stream: one to
//! build the fragment-size histogram and infer the insert windows, one to
//! filter and cluster. The lite profile takes the windows from
//! configuration and makes the clustering pass only. No records are
//! retained between passes.

use log::info;

use crate::config::{CallerConfig, InsertProfile};
use crate::error::{SvError, SvResult};
use crate::input::{AlignmentInput, PairRecord};
use crate::output::types::{RunStats, SvCall};
use crate::sv::cluster::ClusterIndex;
use crate::sv::filter::PairFilter;
use crate::sv::fragsize::{self, FragmentHistogram};
use crate::sv::{classify, postpass};
use crate::utils::bed::Mask;

/// Online accumulator: the filter and clusterer, fed one record at a time.
pub struct SvAccumulator {
    filter: PairFilter,
    index: ClusterIndex,
    histogram: FragmentHistogram,
    records: u64,
}

impl SvAccumulator {
    pub fn new(mask: Mask, config: &CallerConfig, profile: InsertProfile) -> Self {
        Self {
            filter: PairFilter::new(mask, config, profile),
            index: ClusterIndex::new(profile),
            histogram: FragmentHistogram::new(config.constants.hist_bin),
            records: 0,
        }
    }

    /// Feed one record through the filter into the clusterer.
    pub fn process(&mut self, record: &PairRecord) {
        self.records += 1;
        self.histogram.observe(record.tlen);
        if self.filter.accept(record) {
            self.index.insert(record);
        }
    }

    pub fn records_seen(&self) -> u64 {
        self.records
    }

    /// Run the post-pass sweeps and emit the call set.
    pub fn finalize(mut self, config: &CallerConfig) -> (Vec<SvCall>, RunStats, FragmentHistogram) {
        self.filter.log_summary();
        info!("Clustering held {} clusters", self.index.cluster_count());

        postpass::run(&mut self.index, config);
        let clusters = self.index.cluster_count() as u64;
        let calls = classify::emit_events(&mut self.index, config);

        let stats = RunStats {
            records_read: self.records,
            records_clustered: self.filter.counters.passed,
            malformed: 0,
            clusters,
            calls_emitted: calls.len() as u64,
        };
        (calls, stats, self.histogram)
    }
}

/// Result of a full pipeline run.
pub struct PipelineResult {
    pub calls: Vec<SvCall>,
    pub stats: RunStats,
    pub profile: InsertProfile,
    pub histogram: FragmentHistogram,
}

/// Two-phase runner over an alignment file.
pub struct PipelineRunner<'a> {
    bam_path: String,
    config: &'a CallerConfig,
    mask: Mask,
}

impl<'a> PipelineRunner<'a> {
    pub fn new(bam_path: &str, config: &'a CallerConfig) -> Self {
        Self {
            bam_path: bam_path.to_string(),
            config,
            mask: Mask::default(),
        }
    }

    pub fn with_mask(mut self, mask: Mask) -> Self {
        self.mask = mask;
        self
    }

    pub fn run(self) -> SvResult<PipelineResult> {
        let mut input = AlignmentInput::open(&self.bam_path)
            .map_err(|e| SvError::AlignerIo(e.to_string()))?;

        let profile = match self.config.insert {
            Some(profile) => {
                info!("Lite profile: insert windows from configuration");
                profile
            }
            None => {
                info!("Pass 1: fragment-size inference...");
                let mut hist = FragmentHistogram::new(self.config.constants.hist_bin);
                let mut seen = 0u64;
                while let Some(record) = input
                    .read_pair_record()
                    .map_err(|e| SvError::AlignerIo(e.to_string()))?
                {
                    hist.observe(record.tlen);
                    seen += 1;
                    if seen % 1_000_000 == 0 {
                        info!("  {} records scanned", seen);
                    }
                }
                if seen == 0 {
                    return Err(SvError::AlignerIo(format!(
                        "{} produced no usable records",
                        self.bam_path
                    )));
                }
                let profile = fragsize::infer_insert_profile(&hist, &self.config.constants)?;
                input
                    .seek_start()
                    .map_err(|e| SvError::AlignerIo(e.to_string()))?;
                profile
            }
        };
        profile.validate()?;

        info!("Pass 2: clustering...");
        let mut accumulator = SvAccumulator::new(self.mask, self.config, profile);
        while let Some(record) = input
            .read_pair_record()
            .map_err(|e| SvError::AlignerIo(e.to_string()))?
        {
            accumulator.process(&record);
            if accumulator.records_seen() % 1_000_000 == 0 {
                info!("  {} records clustered", accumulator.records_seen());
            }
        }
        if accumulator.records_seen() == 0 {
            return Err(SvError::AlignerIo(format!(
                "{} produced no usable records",
                self.bam_path
            )));
        }

        let malformed = input.malformed;
        if malformed > 0 {
            info!("Skipped {} malformed records", malformed);
        }
        let (calls, mut stats, histogram) = accumulator.finalize(self.config);
        stats.malformed = malformed;

        Ok(PipelineResult {
            calls,
            stats,
            profile,
            histogram,
        })
    }
}

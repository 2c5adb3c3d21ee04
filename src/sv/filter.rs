//! Pair-level filtering ahead of the clusterer.
//!
//! A record survives only if it clears the mapping-quality and unique-tag
//! gates, neither mate falls in the genomic mask, and the pair is not
//! concordant with either expected insert window. The two mates of a pair
//! are judged together: once one half is rejected, the sibling is dropped
//! on sight.

use std::collections::HashSet;

use log::info;

use crate::config::{CallerConfig, InsertProfile};
use crate::input::PairRecord;
use crate::utils::bed::Mask;

/// Per-reason rejection counters, reported at the end of the run.
#[derive(Debug, Default, Clone)]
pub struct FilterCounters {
    pub low_mapq: u64,
    pub not_unique: u64,
    pub masked: u64,
    pub concordant: u64,
    pub rejected_sibling: u64,
    pub passed: u64,
}

pub struct PairFilter {
    mask: Mask,
    min_mapq: u8,
    unique_mapping: bool,
    profile: InsertProfile,
    rejected: HashSet<String>,
    pub counters: FilterCounters,
}

impl PairFilter {
    pub fn new(mask: Mask, config: &CallerConfig, profile: InsertProfile) -> Self {
        Self {
            mask,
            min_mapq: config.min_mapping_quality,
            unique_mapping: config.unique_mapping,
            profile,
            rejected: HashSet::new(),
            counters: FilterCounters::default(),
        }
    }

    /// Judge one pair half. Rejection is remembered by read name so the
    /// sibling half is dropped when encountered.
    pub fn accept(&mut self, record: &PairRecord) -> bool {
        if self.rejected.contains(&record.name) {
            self.counters.rejected_sibling += 1;
            return false;
        }

        if record.mapq < self.min_mapq {
            self.counters.low_mapq += 1;
            return self.reject(record);
        }
        if self.unique_mapping && !record.unique {
            self.counters.not_unique += 1;
            return self.reject(record);
        }
        if self.mask.contains(&record.chrom1, record.pos1)
            || self.mask.contains(&record.chrom2, record.pos2)
        {
            self.counters.masked += 1;
            return self.reject(record);
        }
        if self.is_concordant(record) {
            self.counters.concordant += 1;
            return self.reject(record);
        }

        self.counters.passed += 1;
        true
    }

    fn reject(&mut self, record: &PairRecord) -> bool {
        self.rejected.insert(record.name.clone());
        false
    }

    /// A pair is concordant when it sits inside the expected window for its
    /// orientation: FR within the inward window, RF within the outward one.
    fn is_concordant(&self, record: &PairRecord) -> bool {
        if record.is_inter_chromosomal() {
            return false;
        }
        (record.tlen <= self.profile.inward_max && record.is_fr())
            || (record.tlen >= self.profile.outward_min
                && record.tlen <= self.profile.outward_max
                && record.is_rf())
    }

    pub fn log_summary(&self) {
        let c = &self.counters;
        info!(
            "Filter: {} passed, {} concordant, {} masked, {} low-mapq, {} non-unique, {} rejected siblings",
            c.passed, c.concordant, c.masked, c.low_mapq, c.not_unique, c.rejected_sibling
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::Strand;
    use std::io::Cursor;

    fn profile() -> InsertProfile {
        InsertProfile {
            inward_min: 0,
            inward_max: 500,
            outward_min: 2000,
            outward_max: 5000,
        }
    }

    fn record(name: &str, tlen: u32, s1: Strand, s2: Strand) -> PairRecord {
        PairRecord {
            name: name.to_string(),
            chrom1: "chr1".to_string(),
            pos1: 10_000,
            strand1: s1,
            chrom2: "chr1".to_string(),
            pos2: 10_000 + tlen,
            strand2: s2,
            tlen,
            mapq: 37,
            unique: true,
            seq_len: 100,
        }
    }

    fn filter(config: &CallerConfig) -> PairFilter {
        PairFilter::new(Mask::default(), config, profile())
    }

    #[test]
    fn test_concordant_inward_dropped() {
        let mut f = filter(&CallerConfig::default());
        // FR within the inward window
        assert!(!f.accept(&record("r1", 300, Strand::Forward, Strand::Reverse)));
        // FR beyond it survives
        assert!(f.accept(&record("r2", 800, Strand::Forward, Strand::Reverse)));
        assert_eq!(f.counters.concordant, 1);
        assert_eq!(f.counters.passed, 1);
    }

    #[test]
    fn test_concordant_outward_dropped() {
        let mut f = filter(&CallerConfig::default());
        // RF within the outward window, including both edges
        assert!(!f.accept(&record("r1", 3000, Strand::Reverse, Strand::Forward)));
        assert!(!f.accept(&record("r2", 2000, Strand::Reverse, Strand::Forward)));
        assert!(!f.accept(&record("r3", 5000, Strand::Reverse, Strand::Forward)));
        // RF outside it survives
        assert!(f.accept(&record("r4", 1500, Strand::Reverse, Strand::Forward)));
        assert!(f.accept(&record("r5", 10_000, Strand::Reverse, Strand::Forward)));
        assert_eq!(f.counters.concordant, 3);
    }

    #[test]
    fn test_same_strand_never_concordant() {
        let mut f = filter(&CallerConfig::default());
        assert!(f.accept(&record("r1", 300, Strand::Forward, Strand::Forward)));
    }

    #[test]
    fn test_mapq_gate_and_sibling_memory() {
        let config = CallerConfig {
            min_mapping_quality: 20,
            ..Default::default()
        };
        let mut f = filter(&config);
        let mut low = record("r1", 10_000, Strand::Reverse, Strand::Forward);
        low.mapq = 5;
        assert!(!f.accept(&low));
        // the sibling half would pass on its own, but the pair is already out
        let sibling = record("r1", 10_000, Strand::Forward, Strand::Reverse);
        assert!(!f.accept(&sibling));
        assert_eq!(f.counters.low_mapq, 1);
        assert_eq!(f.counters.rejected_sibling, 1);
    }

    #[test]
    fn test_unique_tag_gate() {
        let config = CallerConfig {
            unique_mapping: true,
            ..Default::default()
        };
        let mut f = filter(&config);
        let mut rec = record("r1", 10_000, Strand::Reverse, Strand::Forward);
        rec.unique = false;
        assert!(!f.accept(&rec));
        rec.name = "r2".to_string();
        rec.unique = true;
        assert!(f.accept(&rec));
    }

    #[test]
    fn test_mask_rejects_either_mate() {
        let mask = Mask::from_reader(Cursor::new("chr1\t9000\t11000\n")).unwrap();
        let mut f = PairFilter::new(mask, &CallerConfig::default(), profile());
        // primary half inside the mask
        assert!(!f.accept(&record("r1", 10_000, Strand::Reverse, Strand::Forward)));
        // mate half inside the mask
        let mut rec = record("r2", 10_000, Strand::Reverse, Strand::Forward);
        rec.pos1 = 20_000;
        rec.pos2 = 10_500;
        assert!(!f.accept(&rec));
        // both clear of it
        let mut rec = record("r3", 10_000, Strand::Reverse, Strand::Forward);
        rec.pos1 = 20_000;
        rec.pos2 = 30_000;
        assert!(f.accept(&rec));
        assert_eq!(f.counters.masked, 2);
    }

    #[test]
    fn test_inter_chromosomal_passes() {
        let mut f = filter(&CallerConfig::default());
        let mut rec = record("r1", 0, Strand::Forward, Strand::Reverse);
        rec.chrom2 = "chr7".to_string();
        assert!(f.accept(&rec));
    }
}

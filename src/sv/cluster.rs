//! Streaming discordant-pair clusterer.
//!
//! Pairs are partitioned by canonical chromosome pair and orientation
//! parity; within a bucket each incoming record merges into the first
//! cluster whose midpoints agree within the outward window, or opens a new
//! cluster. Buckets are insertion-ordered arenas of `Option<Cluster>` —
//! index-stable, so inversion back-references and post-pass removals use
//! plain indices.

use std::collections::HashSet;

use indexmap::IndexMap;

use super::SvType;
use crate::config::{CallerConfig, InsertProfile};
use crate::input::{PairRecord, Strand};

/// Orientation parity of a pair: both halves on the same strand or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parity {
    Same,
    Diff,
}

impl Parity {
    pub fn of(s1: Strand, s2: Strand) -> Self {
        if s1 == s2 { Parity::Same } else { Parity::Diff }
    }
}

/// Canonical chromosome-pair key: `min(c1,c2)-max(c1,c2)`.
pub fn chrom_key(c1: &str, c2: &str) -> String {
    if c1 <= c2 {
        format!("{}-{}", c1, c2)
    } else {
        format!("{}-{}", c2, c1)
    }
}

/// An incoming record's coordinates assigned to a cluster's two sides.
#[derive(Debug, Clone, Copy)]
pub struct SideAssignment {
    pub pos1: u32,
    pub strand1: Strand,
    pub pos2: u32,
    pub strand2: Strand,
}

/// A breakpoint candidate: the aggregate of the discordant pairs fused into it.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub chrom1: String,
    pub chrom2: String,
    pub p1_min: u32,
    pub p1_max: u32,
    pub p2_min: u32,
    pub p2_max: u32,
    pub strand1: Strand,
    pub strand2: Strand,
    /// Contributing read names; the two mates of a pair share one
    pub read_names: HashSet<String>,
    /// Contributing absolute template lengths
    pub fragments: Vec<u32>,
    /// Size contributions of INS/DEL-voting members
    pub indels: Vec<u32>,
    /// Number of pairs fused in
    pub count: u32,
    /// Votes per SV type, indexed by `SvType::index`
    pub type_tally: [u32; 6],
    /// An inward/outward fusion has occurred
    pub merged: bool,
    /// Arena index of the paired inversion cluster in the same bucket
    pub inv_partner: Option<usize>,
    /// Cleared when the QC sweep suppresses this cluster
    pub qc_pass: bool,
    /// Longest member read length, for the spatial-support rule
    pub seq_len: u32,
}

impl Cluster {
    pub fn from_record(record: &PairRecord, profile: &InsertProfile) -> Self {
        let mut cluster = Cluster {
            chrom1: record.chrom1.clone(),
            chrom2: record.chrom2.clone(),
            p1_min: record.pos1,
            p1_max: record.pos1,
            p2_min: record.pos2,
            p2_max: record.pos2,
            strand1: record.strand1,
            strand2: record.strand2,
            read_names: HashSet::new(),
            fragments: Vec::new(),
            indels: Vec::new(),
            count: 0,
            type_tally: [0; 6],
            merged: false,
            inv_partner: None,
            qc_pass: true,
            seq_len: 0,
        };
        cluster.fuse_in(record, profile);
        cluster
    }

    /// Spatial extent: the sum of the two side ranges. Used for QC
    /// tie-breaks, fusion size classes, and the fused-extent merge gate.
    pub fn size(&self) -> u64 {
        (self.p1_max - self.p1_min) as u64 + (self.p2_max - self.p2_min) as u64
    }

    pub fn mid1(&self) -> f64 {
        (self.p1_min as f64 + self.p1_max as f64) / 2.0
    }

    pub fn mid2(&self) -> f64 {
        (self.p2_min as f64 + self.p2_max as f64) / 2.0
    }

    pub fn is_intra(&self) -> bool {
        self.chrom1 == self.chrom2
    }

    /// Distance between the two side midpoints (same-chromosome clusters).
    pub fn joint_gap(&self) -> f64 {
        (self.mid2() - self.mid1()).abs()
    }

    pub fn dominant_type(&self) -> SvType {
        // argmax over the tally; ties resolve in fixed enum order
        let mut best = SvType::Unk;
        let mut best_votes = 0;
        for ty in SvType::ALL {
            let votes = self.type_tally[ty.index()];
            if votes > best_votes {
                best = ty;
                best_votes = votes;
            }
        }
        best
    }

    /// Liveness: a cluster is a call candidate only when it passed QC,
    /// carries enough pairs, spans a joint wider than the inward footprint,
    /// and each side is supported over more than read-stacking width.
    pub fn is_live(&self, config: &CallerConfig, profile: &InsertProfile) -> bool {
        if !self.qc_pass || self.count < config.min_cluster_count {
            return false;
        }
        if self.is_intra() && self.joint_gap() <= config.inward_extent(profile) {
            return false;
        }
        let support = (self.seq_len * config.min_cluster_count) as u64;
        (self.p1_max - self.p1_min) as u64 >= support
            && (self.p2_max - self.p2_min) as u64 >= support
    }

    /// The record's coordinates assigned to this cluster's sides, or `None`
    /// if the chromosomes cannot match. Same-chromosome records take the
    /// assignment minimizing summed midpoint distance.
    pub fn side_assignment(&self, record: &PairRecord) -> Option<SideAssignment> {
        let direct = SideAssignment {
            pos1: record.pos1,
            strand1: record.strand1,
            pos2: record.pos2,
            strand2: record.strand2,
        };
        let swapped = SideAssignment {
            pos1: record.pos2,
            strand1: record.strand2,
            pos2: record.pos1,
            strand2: record.strand1,
        };

        if self.is_intra() {
            if record.chrom1 != self.chrom1 || record.chrom2 != self.chrom1 {
                return None;
            }
            let d_direct = (self.mid1() - record.pos1 as f64).abs()
                + (self.mid2() - record.pos2 as f64).abs();
            let d_swapped = (self.mid1() - record.pos2 as f64).abs()
                + (self.mid2() - record.pos1 as f64).abs();
            Some(if d_direct <= d_swapped { direct } else { swapped })
        } else if record.chrom1 == self.chrom1 && record.chrom2 == self.chrom2 {
            Some(direct)
        } else if record.chrom1 == self.chrom2 && record.chrom2 == self.chrom1 {
            Some(swapped)
        } else {
            None
        }
    }

    /// Midpoint-window and strand agreement under the given assignment.
    pub fn matches(&self, assign: &SideAssignment, profile: &InsertProfile) -> bool {
        assign.strand1 == self.strand1
            && assign.strand2 == self.strand2
            && (self.mid1() - assign.pos1 as f64).abs() <= profile.outward_max as f64
            && (self.mid2() - assign.pos2 as f64).abs() <= profile.outward_max as f64
    }

    /// Fuse the record in under the given assignment. Fails (without
    /// mutating) if either side range would grow beyond the outward window.
    pub fn absorb(
        &mut self,
        record: &PairRecord,
        assign: &SideAssignment,
        profile: &InsertProfile,
    ) -> bool {
        let p1_min = self.p1_min.min(assign.pos1);
        let p1_max = self.p1_max.max(assign.pos1);
        let p2_min = self.p2_min.min(assign.pos2);
        let p2_max = self.p2_max.max(assign.pos2);
        if (p1_max - p1_min) > profile.outward_max || (p2_max - p2_min) > profile.outward_max {
            return false;
        }
        self.p1_min = p1_min;
        self.p1_max = p1_max;
        self.p2_min = p2_min;
        self.p2_max = p2_max;
        self.fuse_in(record, profile);
        true
    }

    fn fuse_in(&mut self, record: &PairRecord, profile: &InsertProfile) {
        self.read_names.insert(record.name.clone());
        self.fragments.push(record.tlen);
        self.seq_len = self.seq_len.max(record.seq_len);
        self.count += 1;
        let (vote, indel) = vote(record, profile);
        self.type_tally[vote.index()] += 1;
        if let Some(size) = indel {
            self.indels.push(size);
        }
    }
}

/// The per-pair SV-type vote.
///
/// Same chromosome: equal strands vote INV; outward-facing pairs vote INS
/// below the outward window (contributing `outward_min − |tlen|`), DEL above
/// it (`|tlen| − outward_max`), UNK at or inside the bounds; inward-facing
/// pairs vote ITX. Different chromosomes vote CTX.
pub fn vote(record: &PairRecord, profile: &InsertProfile) -> (SvType, Option<u32>) {
    if record.is_inter_chromosomal() {
        return (SvType::Ctx, None);
    }
    if record.strand1 == record.strand2 {
        return (SvType::Inv, None);
    }
    if record.is_rf() {
        if record.tlen < profile.outward_min {
            return (SvType::Ins, Some(profile.outward_min - record.tlen));
        }
        if record.tlen > profile.outward_max {
            return (SvType::Del, Some(record.tlen - profile.outward_max));
        }
        return (SvType::Unk, None);
    }
    if record.is_fr() {
        return (SvType::Itx, None);
    }
    (SvType::Unk, None)
}

/// One bucket: two insertion-ordered arenas, one per orientation parity.
#[derive(Debug, Default)]
pub struct Bucket {
    pub same: Vec<Option<Cluster>>,
    pub diff: Vec<Option<Cluster>>,
}

impl Bucket {
    pub fn arena(&self, parity: Parity) -> &Vec<Option<Cluster>> {
        match parity {
            Parity::Same => &self.same,
            Parity::Diff => &self.diff,
        }
    }

    pub fn arena_mut(&mut self, parity: Parity) -> &mut Vec<Option<Cluster>> {
        match parity {
            Parity::Same => &mut self.same,
            Parity::Diff => &mut self.diff,
        }
    }
}

/// The bucketed cluster index, mutated online by `insert` and in batch by
/// the post-pass sweeps.
pub struct ClusterIndex {
    pub buckets: IndexMap<String, Bucket>,
    profile: InsertProfile,
}

impl ClusterIndex {
    pub fn new(profile: InsertProfile) -> Self {
        Self {
            buckets: IndexMap::new(),
            profile,
        }
    }

    pub fn profile(&self) -> &InsertProfile {
        &self.profile
    }

    /// Merge the record into the first matching cluster of its bucket, or
    /// open a new one. Greedy in insertion order; a record whose read name
    /// is already present in a cluster counts as merged.
    pub fn insert(&mut self, record: &PairRecord) {
        let key = chrom_key(&record.chrom1, &record.chrom2);
        let parity = Parity::of(record.strand1, record.strand2);
        let arena = self.buckets.entry(key).or_default().arena_mut(parity);

        for slot in arena.iter_mut() {
            let Some(cluster) = slot else { continue };
            if cluster.read_names.contains(&record.name) {
                return;
            }
            if let Some(assign) = cluster.side_assignment(record)
                && cluster.matches(&assign, &self.profile)
                && cluster.absorb(record, &assign, &self.profile)
            {
                return;
            }
        }
        arena.push(Some(Cluster::from_record(record, &self.profile)));
    }

    /// Total clusters currently held (excluding consumed slots).
    pub fn cluster_count(&self) -> usize {
        self.buckets
            .values()
            .map(|b| {
                b.same.iter().filter(|c| c.is_some()).count()
                    + b.diff.iter().filter(|c| c.is_some()).count()
            })
            .sum()
    }
}

//! Batch cluster post-pass: QC de-duplication, inward/outward fusion, and
//! inversion pairing. All three sweeps stay within one bucket.

use log::info;

use super::SvType;
use super::cluster::{Cluster, ClusterIndex, Parity};
use crate::config::{CallerConfig, InsertProfile};

/// Run the post-pass sweeps in order. QC de-duplication only runs when
/// enabled in the configuration.
pub fn run(index: &mut ClusterIndex, config: &CallerConfig) {
    if config.qc_filter {
        let suppressed = qc_dedup(index);
        info!("QC de-duplication suppressed {} clusters", suppressed);
    }
    let fused = fuse_inward_outward(index, config);
    info!("Inward/outward fusion merged {} cluster pairs", fused);
    let paired = pair_inversions(index, config);
    info!("Inversion pairing matched {} cluster pairs", paired);
}

/// Inclusive interval overlap with a symmetric margin.
fn overlaps(a: (u32, u32), b: (u32, u32), margin: u32) -> bool {
    a.0 <= b.1.saturating_add(margin) && b.0 <= a.1.saturating_add(margin)
}

/// Two clusters describe the same joint: both side ranges overlap, with
/// orientations matching directly or (same-chromosome) under swapped sides.
fn clusters_intersect(a: &Cluster, b: &Cluster) -> bool {
    let direct = a.strand1 == b.strand1
        && a.strand2 == b.strand2
        && overlaps((a.p1_min, a.p1_max), (b.p1_min, b.p1_max), 0)
        && overlaps((a.p2_min, a.p2_max), (b.p2_min, b.p2_max), 0);
    if direct {
        return true;
    }
    a.is_intra()
        && a.strand1 == b.strand2
        && a.strand2 == b.strand1
        && overlaps((a.p1_min, a.p1_max), (b.p2_min, b.p2_max), 0)
        && overlaps((a.p2_min, a.p2_max), (b.p1_min, b.p1_max), 0)
}

/// Sweep (a): suppress the weaker of two clusters describing the same
/// joint. Larger `count` wins, then larger `size`; a double tie suppresses
/// both. Suppression only clears `qc_pass`.
fn qc_dedup(index: &mut ClusterIndex) -> usize {
    let mut suppressed = 0;
    for bucket in index.buckets.values_mut() {
        for parity in [Parity::Same, Parity::Diff] {
            let arena = bucket.arena_mut(parity);
            for i in 0..arena.len() {
                for j in (i + 1)..arena.len() {
                    let (Some(a), Some(b)) = (&arena[i], &arena[j]) else {
                        continue;
                    };
                    if !a.qc_pass || !b.qc_pass || !clusters_intersect(a, b) {
                        continue;
                    }
                    let verdict = a
                        .count
                        .cmp(&b.count)
                        .then_with(|| a.size().cmp(&b.size()));
                    match verdict {
                        std::cmp::Ordering::Greater => {
                            arena[j].as_mut().unwrap().qc_pass = false;
                            suppressed += 1;
                        }
                        std::cmp::Ordering::Less => {
                            arena[i].as_mut().unwrap().qc_pass = false;
                            suppressed += 1;
                        }
                        std::cmp::Ordering::Equal => {
                            arena[i].as_mut().unwrap().qc_pass = false;
                            arena[j].as_mut().unwrap().qc_pass = false;
                            suppressed += 2;
                        }
                    }
                }
            }
        }
    }
    suppressed
}

/// The cluster-to-cluster side assignment minimizing summed midpoint
/// distance. Swapping sides is only meaningful within one chromosome.
fn fusion_assignment(outward: &Cluster, inward: &Cluster) -> bool {
    if !outward.is_intra() {
        return false; // cross-chromosome buckets only match directly
    }
    let d_direct = (outward.mid1() - inward.mid1()).abs() + (outward.mid2() - inward.mid2()).abs();
    let d_swapped = (outward.mid1() - inward.mid2()).abs() + (outward.mid2() - inward.mid1()).abs();
    d_swapped < d_direct
}

/// Sweep (b): fuse each outward-evidence cluster with a co-located
/// inward-evidence cluster describing the same joint. The inward cluster
/// survives and absorbs the partner; the larger-`size` partner's
/// orientation and type tally win out.
fn fuse_inward_outward(index: &mut ClusterIndex, config: &CallerConfig) -> usize {
    let profile = *index.profile();
    let inward_extent = config.inward_extent(&profile);
    let fused_extent = config.fused_extent(&profile);
    let mut fused = 0;

    for bucket in index.buckets.values_mut() {
        for parity in [Parity::Same, Parity::Diff] {
            let arena = bucket.arena_mut(parity);

            // Size classes from the pre-sweep state
            let mut outward_idx = Vec::new();
            let mut inward_idx = Vec::new();
            for (i, slot) in arena.iter().enumerate() {
                let Some(c) = slot else { continue };
                if !c.qc_pass {
                    continue;
                }
                if (c.size() as f64) > inward_extent {
                    outward_idx.push(i);
                } else if (c.size() as f64) < inward_extent {
                    inward_idx.push(i);
                }
            }

            for &o in &outward_idx {
                for &i in &inward_idx {
                    if arena[o].is_none() || arena[i].is_none() {
                        continue;
                    }
                    let (ocl, icl) = (arena[o].as_ref().unwrap(), arena[i].as_ref().unwrap());
                    if !fusible(ocl, icl, config, &profile, fused_extent) {
                        continue;
                    }
                    let partner = arena[o].take().unwrap();
                    absorb_partner(arena[i].as_mut().unwrap(), partner);
                    fused += 1;
                    break; // one fusion per outward cluster
                }
            }
        }
    }
    fused
}

/// Eligibility and joint-identity test for inward/outward fusion.
fn fusible(
    outward: &Cluster,
    inward: &Cluster,
    config: &CallerConfig,
    profile: &InsertProfile,
    fused_extent: f64,
) -> bool {
    // both clusters need spatial support on each side
    let support = |c: &Cluster| {
        let min_span = (c.seq_len * config.min_cluster_count) as u64;
        (c.p1_max - c.p1_min) as u64 >= min_span && (c.p2_max - c.p2_min) as u64 >= min_span
    };
    if !support(outward) || !support(inward) {
        return false;
    }

    let swapped = fusion_assignment(outward, inward);
    let (im1, im2, is1, is2) = if swapped {
        (inward.mid2(), inward.mid1(), inward.strand2, inward.strand1)
    } else {
        (inward.mid1(), inward.mid2(), inward.strand1, inward.strand2)
    };

    // the two evidence streams point in opposite directions at the joint
    if outward.strand1 == is1 || outward.strand2 == is2 {
        return false;
    }
    if (outward.mid1() - im1).abs() > profile.outward_max as f64
        || (outward.mid2() - im2).abs() > profile.outward_max as f64
    {
        return false;
    }

    // fused extent stays within the span-relaxed bound
    let (i1, i2) = if swapped {
        ((inward.p2_min, inward.p2_max), (inward.p1_min, inward.p1_max))
    } else {
        ((inward.p1_min, inward.p1_max), (inward.p2_min, inward.p2_max))
    };
    let r1 = outward.p1_max.max(i1.1) - outward.p1_min.min(i1.0);
    let r2 = outward.p2_max.max(i2.1) - outward.p2_min.min(i2.0);
    (r1 as f64 + r2 as f64) <= fused_extent
}

/// Fold the outward partner into the surviving inward cluster.
fn absorb_partner(survivor: &mut Cluster, partner: Cluster) {
    let swapped = fusion_assignment(&partner, survivor);
    if swapped {
        // realign the survivor to the partner's side order
        std::mem::swap(&mut survivor.p1_min, &mut survivor.p2_min);
        std::mem::swap(&mut survivor.p1_max, &mut survivor.p2_max);
        std::mem::swap(&mut survivor.strand1, &mut survivor.strand2);
    }
    let partner_larger = partner.size() > survivor.size();

    survivor.p1_min = survivor.p1_min.min(partner.p1_min);
    survivor.p1_max = survivor.p1_max.max(partner.p1_max);
    survivor.p2_min = survivor.p2_min.min(partner.p2_min);
    survivor.p2_max = survivor.p2_max.max(partner.p2_max);
    survivor.read_names.extend(partner.read_names);
    survivor.fragments.extend(partner.fragments);
    survivor.indels.extend(partner.indels);
    survivor.count += partner.count;
    survivor.seq_len = survivor.seq_len.max(partner.seq_len);
    survivor.merged = true;
    if partner_larger {
        survivor.strand1 = partner.strand1;
        survivor.strand2 = partner.strand2;
        survivor.type_tally = partner.type_tally;
    }
}

/// Sweep (c): pair opposite-orientation inversion clusters into balanced
/// events. Back-references only; no position mutation, one pairing each.
fn pair_inversions(index: &mut ClusterIndex, config: &CallerConfig) -> usize {
    let profile = *index.profile();
    let tolerance = profile.outward_max;
    let mut paired = 0;

    for bucket in index.buckets.values_mut() {
        let arena = bucket.arena_mut(Parity::Same);

        let candidates: Vec<usize> = arena
            .iter()
            .enumerate()
            .filter(|(_, slot)| {
                slot.as_ref().is_some_and(|c| {
                    c.is_intra()
                        && c.is_live(config, &profile)
                        && c.dominant_type() == SvType::Inv
                })
            })
            .map(|(i, _)| i)
            .collect();

        for (ci, &i) in candidates.iter().enumerate() {
            for &j in &candidates[ci + 1..] {
                let (Some(a), Some(b)) = (&arena[i], &arena[j]) else {
                    continue;
                };
                if a.inv_partner.is_some() || b.inv_partner.is_some() {
                    continue;
                }
                // one ++ cluster and one -- cluster
                if a.strand1 != a.strand2 || b.strand1 != b.strand2 || a.strand1 == b.strand1 {
                    continue;
                }
                let windows_agree = (overlaps((a.p1_min, a.p1_max), (b.p1_min, b.p1_max), tolerance)
                    && overlaps((a.p2_min, a.p2_max), (b.p2_min, b.p2_max), tolerance))
                    || (overlaps((a.p1_min, a.p1_max), (b.p2_min, b.p2_max), tolerance)
                        && overlaps((a.p2_min, a.p2_max), (b.p1_min, b.p1_max), tolerance));
                if !windows_agree {
                    continue;
                }
                arena[i].as_mut().unwrap().inv_partner = Some(j);
                arena[j].as_mut().unwrap().inv_partner = Some(i);
                paired += 1;
                break;
            }
        }
    }
    paired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{PairRecord, Strand};

    fn profile() -> InsertProfile {
        InsertProfile {
            inward_min: 0,
            inward_max: 500,
            outward_min: 2000,
            outward_max: 5000,
        }
    }

    fn record(
        name: &str,
        pos1: u32,
        s1: Strand,
        pos2: u32,
        s2: Strand,
        tlen: u32,
    ) -> PairRecord {
        PairRecord {
            name: name.to_string(),
            chrom1: "chr1".to_string(),
            pos1,
            strand1: s1,
            chrom2: "chr1".to_string(),
            pos2,
            strand2: s2,
            tlen,
            mapq: 37,
            unique: true,
            seq_len: 50,
        }
    }

    /// Ten outward (RF) pairs spread across the outward window plus five
    /// tight inward (FR) pairs at the same joint (near 100_000 / 100_101).
    fn joint_evidence(index: &mut ClusterIndex) {
        for i in 0..10u32 {
            index.insert(&record(
                &format!("out{}", i),
                97_000 + i * 300,
                Strand::Reverse,
                103_100 - i * 300,
                Strand::Forward,
                12_000,
            ));
        }
        for i in 0..5u32 {
            index.insert(&record(
                &format!("in{}", i),
                99_850 + i * 30,
                Strand::Forward,
                100_110 + i * 30,
                Strand::Reverse,
                10_600,
            ));
        }
    }

    #[test]
    fn test_fusion_merges_joint_evidence() {
        let config = CallerConfig::default();
        let mut index = ClusterIndex::new(profile());
        joint_evidence(&mut index);

        let arena = &index.buckets.get("chr1-chr1").unwrap().diff;
        assert_eq!(arena.iter().flatten().count(), 2);

        run(&mut index, &config);

        let arena = &index.buckets.get("chr1-chr1").unwrap().diff;
        let survivors: Vec<&Cluster> = arena.iter().flatten().collect();
        assert_eq!(survivors.len(), 1);
        let fused = survivors[0];
        assert!(fused.merged);
        assert_eq!(fused.count, 15);
        assert_eq!(fused.read_names.len(), 15);
        // the outward partner was larger: its orientation survives
        assert_eq!(fused.strand1, Strand::Reverse);
        assert_eq!(fused.strand2, Strand::Forward);
        assert_eq!(fused.type_tally[SvType::Del.index()], 10);
        // fused ranges union both evidence streams
        assert_eq!(fused.p1_min, 97_000);
        assert_eq!(fused.p2_max, 103_100);
    }

    #[test]
    fn test_fusion_requires_opposite_strands() {
        let config = CallerConfig::default();
        let mut index = ClusterIndex::new(profile());
        // outward evidence: side 1 spans 97_000..99_700
        for i in 0..10u32 {
            index.insert(&record(
                &format!("out{}", i),
                97_000 + i * 300,
                Strand::Reverse,
                103_100 - i * 300,
                Strand::Forward,
                12_000,
            ));
        }
        // a tight cluster with the SAME strands as the outward one. It sits
        // past the side-1 growth gate (absorbing 102_100 would stretch side 1
        // to 5_100 bp), so it stays separate online; fusion must then refuse
        // it because the strands do not disagree.
        for i in 0..5u32 {
            index.insert(&record(
                &format!("in{}", i),
                102_100 + i * 30,
                Strand::Reverse,
                103_200 + i * 30,
                Strand::Forward,
                12_000,
            ));
        }
        let arena = &index.buckets.get("chr1-chr1").unwrap().diff;
        assert_eq!(arena.iter().flatten().count(), 2);

        run(&mut index, &config);
        let arena = &index.buckets.get("chr1-chr1").unwrap().diff;
        assert_eq!(arena.iter().flatten().count(), 2);
        assert!(arena.iter().flatten().all(|c| !c.merged));
    }

    fn raw_cluster(p1: (u32, u32), p2: (u32, u32), count: u32) -> Cluster {
        let mut cluster = Cluster::from_record(
            &record("seed", p1.0, Strand::Reverse, p2.0, Strand::Forward, 12_000),
            &profile(),
        );
        cluster.p1_max = p1.1;
        cluster.p2_max = p2.1;
        cluster.count = count;
        cluster
    }

    #[test]
    fn test_qc_dedup_prefers_count_then_size() {
        let mut index = ClusterIndex::new(profile());
        let bucket = index.buckets.entry("chr1-chr1".to_string()).or_default();
        bucket.diff.push(Some(raw_cluster((100_000, 100_200), (110_000, 110_200), 6)));
        bucket.diff.push(Some(raw_cluster((100_050, 100_150), (110_050, 110_150), 2)));

        let suppressed = qc_dedup(&mut index);
        assert_eq!(suppressed, 1);
        let arena = &index.buckets.get("chr1-chr1").unwrap().diff;
        assert!(arena[0].as_ref().unwrap().qc_pass);
        assert!(!arena[1].as_ref().unwrap().qc_pass);
    }

    #[test]
    fn test_qc_dedup_breaks_count_tie_by_size() {
        let mut index = ClusterIndex::new(profile());
        let bucket = index.buckets.entry("chr1-chr1".to_string()).or_default();
        bucket.diff.push(Some(raw_cluster((100_000, 100_100), (110_000, 110_100), 3)));
        bucket.diff.push(Some(raw_cluster((100_050, 100_450), (110_050, 110_450), 3)));

        let suppressed = qc_dedup(&mut index);
        assert_eq!(suppressed, 1);
        let arena = &index.buckets.get("chr1-chr1").unwrap().diff;
        // equal counts: the wider cluster wins
        assert!(!arena[0].as_ref().unwrap().qc_pass);
        assert!(arena[1].as_ref().unwrap().qc_pass);
    }

    #[test]
    fn test_qc_double_tie_suppresses_both() {
        let mut index = ClusterIndex::new(profile());
        let bucket = index.buckets.entry("chr1-chr1".to_string()).or_default();
        bucket.diff.push(Some(raw_cluster((100_000, 100_200), (110_000, 110_200), 3)));
        bucket.diff.push(Some(raw_cluster((100_100, 100_300), (110_100, 110_300), 3)));

        let suppressed = qc_dedup(&mut index);
        assert_eq!(suppressed, 2);
        let arena = &index.buckets.get("chr1-chr1").unwrap().diff;
        assert!(arena.iter().flatten().all(|c| !c.qc_pass));
    }

    #[test]
    fn test_qc_dedup_ignores_disjoint_clusters() {
        let mut index = ClusterIndex::new(profile());
        let bucket = index.buckets.entry("chr1-chr1".to_string()).or_default();
        bucket.diff.push(Some(raw_cluster((100_000, 100_200), (110_000, 110_200), 3)));
        bucket.diff.push(Some(raw_cluster((200_000, 200_200), (210_000, 210_200), 3)));

        assert_eq!(qc_dedup(&mut index), 0);
    }

    #[test]
    fn test_inversion_pairing() {
        let config = CallerConfig::default();
        let mut index = ClusterIndex::new(profile());
        // ++ cluster
        for i in 0..5u32 {
            index.insert(&record(
                &format!("f{}", i),
                999_800 + i * 100,
                Strand::Forward,
                1_049_800 + i * 100,
                Strand::Forward,
                50_000,
            ));
        }
        // -- cluster
        for i in 0..5u32 {
            index.insert(&record(
                &format!("r{}", i),
                999_850 + i * 100,
                Strand::Reverse,
                1_049_850 + i * 100,
                Strand::Reverse,
                50_000,
            ));
        }
        run(&mut index, &config);

        let arena = &index.buckets.get("chr1-chr1").unwrap().same;
        assert_eq!(arena.iter().flatten().count(), 2);
        assert_eq!(arena[0].as_ref().unwrap().inv_partner, Some(1));
        assert_eq!(arena[1].as_ref().unwrap().inv_partner, Some(0));
        // positions untouched by pairing
        assert_eq!(arena[0].as_ref().unwrap().p1_min, 999_800);
    }

    #[test]
    fn test_inversion_pairing_needs_opposite_orientation() {
        let config = CallerConfig::default();
        let mut index = ClusterIndex::new(profile());
        for i in 0..5u32 {
            index.insert(&record(
                &format!("f{}", i),
                999_800 + i * 100,
                Strand::Forward,
                1_049_800 + i * 100,
                Strand::Forward,
                50_000,
            ));
        }
        // a second ++ cluster far enough not to merge online
        for i in 0..5u32 {
            index.insert(&record(
                &format!("g{}", i),
                1_020_000 + i * 100,
                Strand::Forward,
                1_070_000 + i * 100,
                Strand::Forward,
                50_000,
            ));
        }
        run(&mut index, &config);
        let arena = &index.buckets.get("chr1-chr1").unwrap().same;
        assert!(arena.iter().flatten().all(|c| c.inv_partner.is_none()));
    }
}

//! Event classification and emission.
//!
//! Each live cluster's dominant type selects an emission branch; the
//! emitted coordinates are reoriented to the inward-pair convention (the
//! reported orientation is the complement of the stored strand — the wire
//! contract for downstream paired-end consumers).

use log::info;

use super::SvType;
use super::cluster::{Cluster, ClusterIndex, Parity};
use crate::config::CallerConfig;
use crate::input::Strand;
use crate::output::types::SvCall;

/// One cluster side, ordered for emission.
#[derive(Debug, Clone, Copy)]
struct Side {
    p_min: u32,
    p_max: u32,
    strand: Strand,
}

impl Side {
    fn mid(&self) -> f64 {
        (self.p_min as f64 + self.p_max as f64) / 2.0
    }

    /// Breakpoint anchor: forward evidence anchors at the range start,
    /// reverse at the range end.
    fn anchor(&self) -> u32 {
        match self.strand {
            Strand::Forward => self.p_min,
            Strand::Reverse => self.p_max,
        }
    }
}

fn sides(cluster: &Cluster) -> (Side, Side) {
    (
        Side {
            p_min: cluster.p1_min,
            p_max: cluster.p1_max,
            strand: cluster.strand1,
        },
        Side {
            p_min: cluster.p2_min,
            p_max: cluster.p2_max,
            strand: cluster.strand2,
        },
    )
}

/// Sides ordered so the smaller midpoint comes first.
fn ordered_sides(cluster: &Cluster) -> (Side, Side) {
    let (s1, s2) = sides(cluster);
    if s1.mid() <= s2.mid() { (s1, s2) } else { (s2, s1) }
}

/// Classify every live cluster and emit the call set. Paired inversion
/// partners are consumed (their arena slot nulled) as composites are
/// emitted.
pub fn emit_events(index: &mut ClusterIndex, config: &CallerConfig) -> Vec<SvCall> {
    let profile = *index.profile();
    let mut calls: Vec<SvCall> = Vec::new();
    let mut counter = 0u32;

    for bucket in index.buckets.values_mut() {
        for parity in [Parity::Same, Parity::Diff] {
            let arena = bucket.arena_mut(parity);
            for idx in 0..arena.len() {
                let Some(cluster) = arena[idx].clone() else {
                    continue;
                };
                if !cluster.is_live(config, &profile) {
                    continue;
                }
                match cluster.dominant_type() {
                    SvType::Unk => {}
                    ty @ (SvType::Ins | SvType::Del) => {
                        if let Some(call) = indel_call(&cluster, ty, config, &mut counter) {
                            calls.push(call);
                        }
                    }
                    SvType::Itx => {
                        if let Some(call) = itx_call(&cluster, config, &mut counter) {
                            calls.push(call);
                        }
                    }
                    SvType::Ctx => {
                        let (a, b) = ctx_calls(&cluster, config, &mut counter);
                        calls.push(a);
                        calls.push(b);
                    }
                    SvType::Inv => {
                        let partner = cluster.inv_partner.and_then(|p| arena[p].clone());
                        if let (Some(pidx), Some(partner)) = (cluster.inv_partner, partner) {
                            if let Some(call) =
                                balanced_inversion_call(&cluster, &partner, config, &mut counter)
                            {
                                calls.push(call);
                                arena[pidx] = None;
                            } else {
                                // anchors do not alternate: both halves fall
                                // back to single emission on their own turns
                                calls.push(inversion_call(&cluster, config, &mut counter));
                            }
                        } else {
                            calls.push(inversion_call(&cluster, config, &mut counter));
                        }
                    }
                }
            }
        }
    }

    info!("Emitted {} calls", calls.len());
    calls
}

fn next_name(config: &CallerConfig, counter: &mut u32) -> String {
    *counter += 1;
    format!("{}_{}", config.sv_name, counter)
}

/// INS/DEL: the mean of the indel contributions is the SV size; the joint
/// must be a positive gap wider than the minimum window.
fn indel_call(
    cluster: &Cluster,
    ty: SvType,
    config: &CallerConfig,
    counter: &mut u32,
) -> Option<SvCall> {
    if cluster.indels.is_empty() {
        return None;
    }
    let sv_size = cluster.indels.iter().map(|&v| v as f64).sum::<f64>() / cluster.indels.len() as f64;
    if sv_size <= config.constants.window as f64 {
        return None;
    }
    let (low, high) = ordered_sides(cluster);
    if high.p_min <= low.p_max {
        return None;
    }
    Some(SvCall {
        name: next_name(config, counter),
        sv_type: ty,
        chrom1: cluster.chrom1.clone(),
        start1: low.p_min,
        end1: low.p_max,
        strand1: low.strand.complement().symbol(),
        chrom2: cluster.chrom2.clone(),
        start2: high.p_min,
        end2: high.p_max,
        strand2: high.strand.complement().symbol(),
        anchor1: low.p_max,
        anchor2: high.p_min,
        size: sv_size.round() as u64,
        count: cluster.count,
        merged: cluster.merged,
        ctx_mate: None,
    })
}

/// ITX: sized by the gap between the outer bounds of the two sides.
fn itx_call(cluster: &Cluster, config: &CallerConfig, counter: &mut u32) -> Option<SvCall> {
    let (low, high) = ordered_sides(cluster);
    if high.p_min <= low.p_max {
        return None;
    }
    Some(SvCall {
        name: next_name(config, counter),
        sv_type: SvType::Itx,
        chrom1: cluster.chrom1.clone(),
        start1: low.p_min,
        end1: low.p_max,
        strand1: low.strand.complement().symbol(),
        chrom2: cluster.chrom2.clone(),
        start2: high.p_min,
        end2: high.p_max,
        strand2: high.strand.complement().symbol(),
        anchor1: low.p_max,
        anchor2: high.p_min,
        size: (high.p_min - low.p_max) as u64,
        count: cluster.count,
        merged: cluster.merged,
        ctx_mate: None,
    })
}

/// CTX: two cross-referenced records, one per chromosome, each carrying
/// the mate coordinates in the CTX annotation tag.
fn ctx_calls(cluster: &Cluster, config: &CallerConfig, counter: &mut u32) -> (SvCall, SvCall) {
    let (s1, s2) = sides(cluster);
    let base = next_name(config, counter);
    let first = SvCall {
        name: format!("{}_1", base),
        sv_type: SvType::Ctx,
        chrom1: cluster.chrom1.clone(),
        start1: s1.p_min,
        end1: s1.p_max,
        strand1: s1.strand.complement().symbol(),
        chrom2: cluster.chrom2.clone(),
        start2: s2.p_min,
        end2: s2.p_max,
        strand2: s2.strand.complement().symbol(),
        anchor1: s1.mid() as u32,
        anchor2: s2.mid() as u32,
        size: 0,
        count: cluster.count,
        merged: cluster.merged,
        ctx_mate: Some(format!("{}:{}-{}", cluster.chrom2, s2.p_min, s2.p_max)),
    };
    let second = SvCall {
        name: format!("{}_2", base),
        sv_type: SvType::Ctx,
        chrom1: cluster.chrom2.clone(),
        start1: s2.p_min,
        end1: s2.p_max,
        strand1: s2.strand.complement().symbol(),
        chrom2: cluster.chrom1.clone(),
        start2: s1.p_min,
        end2: s1.p_max,
        strand2: s1.strand.complement().symbol(),
        anchor1: s2.mid() as u32,
        anchor2: s1.mid() as u32,
        size: 0,
        count: cluster.count,
        merged: cluster.merged,
        ctx_mate: Some(format!("{}:{}-{}", cluster.chrom1, s1.p_min, s1.p_max)),
    };
    (first, second)
}

/// Unpaired inversion: anchored per side by the stored strand.
fn inversion_call(cluster: &Cluster, config: &CallerConfig, counter: &mut u32) -> SvCall {
    let (low, high) = ordered_sides(cluster);
    let (a1, a2) = (low.anchor(), high.anchor());
    SvCall {
        name: next_name(config, counter),
        sv_type: SvType::Inv,
        chrom1: cluster.chrom1.clone(),
        start1: low.p_min,
        end1: low.p_max,
        strand1: low.strand.complement().symbol(),
        chrom2: cluster.chrom2.clone(),
        start2: high.p_min,
        end2: high.p_max,
        strand2: high.strand.complement().symbol(),
        anchor1: a1.min(a2),
        anchor2: a1.max(a2),
        size: a1.abs_diff(a2) as u64,
        count: cluster.count,
        merged: cluster.merged,
        ctx_mate: None,
    }
}

/// Paired inversion: the four endpoint anchors of the two clusters must
/// alternate in source and orientation when sorted; the composite spans
/// the outermost pair.
fn balanced_inversion_call(
    cluster: &Cluster,
    partner: &Cluster,
    config: &CallerConfig,
    counter: &mut u32,
) -> Option<SvCall> {
    let mut anchors: Vec<(u32, usize, Strand)> = Vec::with_capacity(4);
    for (src, c) in [(0usize, cluster), (1usize, partner)] {
        let (s1, s2) = sides(c);
        anchors.push((s1.anchor(), src, s1.strand));
        anchors.push((s2.anchor(), src, s2.strand));
    }
    anchors.sort_unstable_by_key(|a| a.0);

    // a balanced inversion alternates both source cluster and orientation
    let alternates = anchors
        .windows(2)
        .all(|w| w[0].1 != w[1].1 && w[0].2 != w[1].2);
    if !alternates {
        return None;
    }

    Some(SvCall {
        name: next_name(config, counter),
        sv_type: SvType::Inv,
        chrom1: cluster.chrom1.clone(),
        start1: anchors[0].0,
        end1: anchors[1].0,
        strand1: anchors[0].2.complement().symbol(),
        chrom2: cluster.chrom2.clone(),
        start2: anchors[2].0,
        end2: anchors[3].0,
        strand2: anchors[3].2.complement().symbol(),
        anchor1: anchors[0].0,
        anchor2: anchors[3].0,
        size: (anchors[3].0 - anchors[0].0) as u64,
        count: cluster.count + partner.count,
        merged: cluster.merged || partner.merged,
        ctx_mate: None,
    })
}

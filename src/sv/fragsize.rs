//! Library fragment-size inference.
//!
//! A mate-pair / Nextera-style library carries two insert-size populations:
//! the dominant outward-facing (RF) fragments and the shorter inward-facing
//! (FR) ones. This module builds a coarse histogram of absolute template
//! lengths and deconvolves the two populations: k-means over the distinct
//! bin counts locates the background-noise floor, and the two widest
//! contiguous above-noise runs around the top peaks become the outward and
//! inward windows.

use std::collections::HashMap;
use std::io::Write;

use log::info;

use crate::config::{Constants, InsertProfile};
use crate::error::{SvError, SvResult};

/// Coarse histogram of absolute template lengths.
#[derive(Debug, Clone)]
pub struct FragmentHistogram {
    bins: HashMap<u32, u64>,
    bin_width: u32,
    total: u64,
}

impl FragmentHistogram {
    pub fn new(bin_width: u32) -> Self {
        Self {
            bins: HashMap::new(),
            bin_width,
            total: 0,
        }
    }

    /// Record one template length. Zero lengths (inter-chromosomal pairs)
    /// are ignored.
    pub fn observe(&mut self, tlen: u32) {
        if tlen == 0 {
            return;
        }
        *self.bins.entry(tlen / self.bin_width).or_insert(0) += 1;
        self.total += 1;
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    /// Bins in ascending order as `(bin_start_bp, count)`.
    pub fn sorted_bins(&self) -> Vec<(u32, u64)> {
        let mut bins: Vec<(u32, u64)> = self
            .bins
            .iter()
            .map(|(&bin, &count)| (bin * self.bin_width, count))
            .collect();
        bins.sort_unstable();
        bins
    }

    /// Dump `bin_start_bp<TAB>count` lines for library-QC inspection.
    pub fn write_dump<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        for (start, count) in self.sorted_bins() {
            writeln!(writer, "{}\t{}", start, count)?;
        }
        Ok(())
    }

    fn count(&self, bin: u32) -> u64 {
        self.bins.get(&bin).copied().unwrap_or(0)
    }

    fn argmax(&self, exclude: Option<(u32, u32)>) -> Option<(u32, u64)> {
        self.bins
            .iter()
            .filter(|&(&bin, _)| match exclude {
                Some((lo, hi)) => bin < lo || bin > hi,
                None => true,
            })
            .map(|(&bin, &count)| (bin, count))
            // ties go to the lower bin so inference is input-order independent
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
    }

    /// Widest contiguous run of bins >= cutoff around `peak`, in bin units.
    fn walk_interval(&self, peak: u32, cutoff: f64) -> (u32, u32) {
        let mut lo = peak;
        while lo > 0 && self.count(lo - 1) as f64 >= cutoff {
            lo -= 1;
        }
        let mut hi = peak;
        while self.count(hi + 1) as f64 >= cutoff {
            hi += 1;
        }
        (lo, hi)
    }
}

/// Infer the inward and outward insert windows from the histogram.
///
/// Fails with `PoorLibrary` when no peak clears the noise cutoff at any
/// sigma, or when only one population is present; fails with
/// `NonDeconvolvable` when the two inferred windows are not discrete.
pub fn infer_insert_profile(
    hist: &FragmentHistogram,
    constants: &Constants,
) -> SvResult<InsertProfile> {
    if hist.is_empty() {
        return Err(SvError::PoorLibrary { sigma: 0 });
    }

    // Background-noise floor: k-means over the distinct bin counts, the
    // smallest-mean cluster approximates noise.
    let mut distinct: Vec<f64> = {
        let set: std::collections::HashSet<u64> = hist.bins.values().copied().collect();
        set.into_iter().map(|c| c as f64).collect()
    };
    distinct.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap());
    let clusters = kmeans(&distinct, constants.kmeans_k, constants.kmeans_delta);
    let noise = clusters
        .iter()
        .min_by(|a, b| mean(a).partial_cmp(&mean(b)).unwrap())
        .expect("k-means returns at least one cluster");
    let noise_mean = mean(noise);
    let noise_sd = stddev(noise, noise_mean);

    // Raise sigma until the global peak clears the cutoff
    let (peak1, peak1_count) = hist.argmax(None).expect("non-empty histogram has a peak");
    let mut sigma = 0;
    let cutoff = loop {
        let cutoff = noise_mean + sigma as f64 * noise_sd;
        if (peak1_count as f64) >= cutoff {
            break cutoff;
        }
        sigma += 1;
        if sigma > constants.max_sigma {
            return Err(SvError::PoorLibrary {
                sigma: constants.max_sigma,
            });
        }
    };
    info!(
        "Fragment-size noise floor: mean {:.2}, sd {:.2}, cutoff {:.2} (sigma {})",
        noise_mean, noise_sd, cutoff, sigma
    );

    let first = hist.walk_interval(peak1, cutoff);

    // Second population from the remainder of the histogram
    let (peak2, peak2_count) = match hist.argmax(Some(first)) {
        Some(p) => p,
        None => return Err(SvError::PoorLibrary { sigma }),
    };
    if (peak2_count as f64) < cutoff {
        return Err(SvError::PoorLibrary { sigma });
    }
    let second = hist.walk_interval(peak2, cutoff);

    // The dominant peak is expected to be the outward population; swap if
    // the smaller-mean interval came out on top.
    let (mut inward, mut outward) = (second, first);
    if inward.1 > outward.1 {
        std::mem::swap(&mut inward, &mut outward);
    }

    // Expand each bound by one bin and scale to base pairs
    let w = constants.hist_bin;
    let profile = InsertProfile {
        inward_min: inward.0.saturating_sub(1) * w,
        inward_max: (inward.1 + 1) * w,
        outward_min: outward.0.saturating_sub(1) * w,
        outward_max: (outward.1 + 1) * w,
    };

    if profile.inward_max >= profile.outward_min {
        return Err(SvError::NonDeconvolvable {
            inward: (profile.inward_min, profile.inward_max),
            outward: (profile.outward_min, profile.outward_max),
        });
    }

    info!(
        "Inferred insert windows: inward [{}, {}], outward [{}, {}] ({} fragments)",
        profile.inward_min, profile.inward_max, profile.outward_min, profile.outward_max,
        hist.total()
    );
    Ok(profile)
}

/// One-dimensional k-means, returning the member values of each cluster.
fn kmeans(values: &[f64], k: usize, delta: f64) -> Vec<Vec<f64>> {
    if values.len() <= k {
        return values.iter().map(|&v| vec![v]).collect();
    }

    // Seed centroids at evenly spaced quantiles of the sorted input
    let n = values.len();
    let mut centroids: Vec<f64> = (0..k).map(|i| values[i * (n - 1) / (k - 1).max(1)]).collect();

    let mut assignment = vec![0usize; n];
    loop {
        for (i, &v) in values.iter().enumerate() {
            assignment[i] = centroids
                .iter()
                .enumerate()
                .min_by(|a, b| (v - a.1).abs().partial_cmp(&(v - b.1).abs()).unwrap())
                .map(|(idx, _)| idx)
                .unwrap_or(0);
        }

        let mut shift = 0.0;
        for (c, centroid) in centroids.iter_mut().enumerate() {
            let members: Vec<f64> = values
                .iter()
                .zip(&assignment)
                .filter(|&(_, &a)| a == c)
                .map(|(&v, _)| v)
                .collect();
            if !members.is_empty() {
                let new = mean(&members);
                shift += (new - *centroid).abs();
                *centroid = new;
            }
        }
        if shift < delta {
            break;
        }
    }

    let mut clusters = vec![Vec::new(); k];
    for (&v, &a) in values.iter().zip(&assignment) {
        clusters[a].push(v);
    }
    clusters.retain(|c| !c.is_empty());
    clusters
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn stddev(values: &[f64], mean: f64) -> f64 {
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

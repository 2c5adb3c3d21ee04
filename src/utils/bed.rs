//! Genomic mask loading: BED-style interval sets keyed by chromosome.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};

use crate::error::{SvError, SvResult};

/// A set of excluded genomic intervals, inclusive on both ends.
#[derive(Debug, Clone, Default)]
pub struct Mask {
    intervals: HashMap<String, Vec<(u32, u32)>>,
}

impl Mask {
    /// Load a mask from a tab-separated `chrom start end` file.
    pub fn load(path: &str) -> SvResult<Self> {
        let file = File::open(path)
            .map_err(|e| SvError::MaskLoad(format!("cannot open mask {}: {}", path, e)))?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: BufRead>(reader: R) -> SvResult<Self> {
        let mut intervals: HashMap<String, Vec<(u32, u32)>> = HashMap::new();

        for (i, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| SvError::MaskLoad(e.to_string()))?;
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }

            let parts: Vec<&str> = line.split('\t').collect();
            if parts.len() < 3 {
                return Err(SvError::MaskLoad(format!(
                    "malformed mask line {} (expected 3 columns, got {}): {}",
                    i + 1,
                    parts.len(),
                    line
                )));
            }

            let start: u32 = parts[1]
                .parse()
                .map_err(|e| SvError::MaskLoad(format!("invalid start at line {}: {}", i + 1, e)))?;
            let end: u32 = parts[2]
                .parse()
                .map_err(|e| SvError::MaskLoad(format!("invalid end at line {}: {}", i + 1, e)))?;
            if end < start {
                return Err(SvError::MaskLoad(format!(
                    "inverted interval at line {}: {}-{}",
                    i + 1,
                    start,
                    end
                )));
            }

            intervals.entry(parts[0].to_string()).or_default().push((start, end));
        }

        // Sort and coalesce overlapping intervals so lookup can bisect
        for list in intervals.values_mut() {
            list.sort_unstable();
            let mut merged: Vec<(u32, u32)> = Vec::with_capacity(list.len());
            for &(s, e) in list.iter() {
                match merged.last_mut() {
                    Some(last) if s <= last.1.saturating_add(1) => {
                        last.1 = last.1.max(e);
                    }
                    _ => merged.push((s, e)),
                }
            }
            *list = merged;
        }

        Ok(Mask { intervals })
    }

    /// True if `pos` falls inside any masked interval on `chrom`.
    pub fn contains(&self, chrom: &str, pos: u32) -> bool {
        let Some(list) = self.intervals.get(chrom) else {
            return false;
        };
        let idx = list.partition_point(|&(s, _)| s <= pos);
        idx > 0 && pos <= list[idx - 1].1
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn interval_count(&self) -> usize {
        self.intervals.values().map(|v| v.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_mask_lookup() {
        let data = "chr1\t100\t200\nchr1\t500\t600\nchr2\t50\t80\n#comment\n";
        let mask = Mask::from_reader(Cursor::new(data)).unwrap();

        assert!(mask.contains("chr1", 100));
        assert!(mask.contains("chr1", 150));
        assert!(mask.contains("chr1", 200)); // inclusive end
        assert!(!mask.contains("chr1", 201));
        assert!(!mask.contains("chr1", 99));
        assert!(mask.contains("chr1", 550));
        assert!(mask.contains("chr2", 50));
        assert!(!mask.contains("chr3", 150));
        assert_eq!(mask.interval_count(), 3);
    }

    #[test]
    fn test_mask_coalesce() {
        let data = "chr1\t100\t200\nchr1\t150\t300\nchr1\t301\t400\n";
        let mask = Mask::from_reader(Cursor::new(data)).unwrap();
        // three overlapping/adjacent intervals coalesce into one
        assert_eq!(mask.interval_count(), 1);
        assert!(mask.contains("chr1", 250));
        assert!(mask.contains("chr1", 400));
    }

    #[test]
    fn test_mask_malformed() {
        let data = "chr1\t100\t200\nchr2\t500\n";
        let result = Mask::from_reader(Cursor::new(data));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("line 2"));
    }

    #[test]
    fn test_mask_inverted_interval() {
        let data = "chr1\t200\t100\n";
        assert!(Mask::from_reader(Cursor::new(data)).is_err());
    }
}

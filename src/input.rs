//! Unified alignment input that supports BAM and plain SAM text via noodles.
//!
//! Each usable alignment line is normalized into a [`PairRecord`]: the tuple
//! the clustering pipeline consumes. Records failing the pairing-flag gate
//! are skipped silently; malformed records are skipped with a warning.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};

use anyhow::{Result, anyhow};
use log::warn;

use noodles::bam;
use noodles::bgzf;
use noodles::sam;
use noodles::sam::alignment::record::data::field::{Tag, Value};

pub const FLAG_PAIRED: u16 = 0x1;
pub const FLAG_UNMAPPED: u16 = 0x4;
pub const FLAG_MATE_UNMAPPED: u16 = 0x8;
pub const FLAG_REVERSE: u16 = 0x10;
pub const FLAG_MATE_REVERSE: u16 = 0x20;
pub const FLAG_SECONDARY: u16 = 0x100;
pub const FLAG_QC_FAIL: u16 = 0x200;
pub const FLAG_DUPLICATE: u16 = 0x400;
pub const FLAG_SUPPLEMENTARY: u16 = 0x800;

/// Records carrying any of these bits are skipped (samtools `-F 1804`,
/// plus supplementary alignments).
pub const EXCLUDE_FLAGS: u16 = FLAG_UNMAPPED
    | FLAG_MATE_UNMAPPED
    | FLAG_SECONDARY
    | FLAG_QC_FAIL
    | FLAG_DUPLICATE
    | FLAG_SUPPLEMENTARY;

/// Strand of one read half.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    pub fn from_flag(flags: u16, bit: u16) -> Self {
        if flags & bit != 0 { Strand::Reverse } else { Strand::Forward }
    }

    /// The opposite strand. Emission flips stored strands to the
    /// inward-pair convention through this.
    pub fn complement(self) -> Self {
        match self {
            Strand::Forward => Strand::Reverse,
            Strand::Reverse => Strand::Forward,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Strand::Forward => '+',
            Strand::Reverse => '-',
        }
    }
}

impl std::fmt::Display for Strand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// One normalized pair-half: the record the filter and clusterer consume.
#[derive(Debug, Clone)]
pub struct PairRecord {
    pub name: String,
    pub chrom1: String,
    /// 1-based leftmost position of this half
    pub pos1: u32,
    pub strand1: Strand,
    pub chrom2: String,
    pub pos2: u32,
    pub strand2: Strand,
    /// Absolute template length
    pub tlen: u32,
    pub mapq: u8,
    /// XT:A:U tag present
    pub unique: bool,
    pub seq_len: u32,
}

impl PairRecord {
    pub fn is_inter_chromosomal(&self) -> bool {
        self.chrom1 != self.chrom2
    }

    /// Inward-facing (FR): the leftmost mate is on the forward strand, the
    /// rightmost on the reverse. The standard paired-end orientation.
    pub fn is_fr(&self) -> bool {
        if self.pos1 <= self.pos2 {
            self.strand1 == Strand::Forward && self.strand2 == Strand::Reverse
        } else {
            self.strand2 == Strand::Forward && self.strand1 == Strand::Reverse
        }
    }

    /// Outward-facing (RF): the mates point away from each other. The
    /// characteristic mate-pair orientation.
    pub fn is_rf(&self) -> bool {
        if self.pos1 <= self.pos2 {
            self.strand1 == Strand::Reverse && self.strand2 == Strand::Forward
        } else {
            self.strand2 == Strand::Reverse && self.strand1 == Strand::Forward
        }
    }
}

enum Inner {
    Bam(bam::io::Reader<bgzf::Reader<BufReader<File>>>),
    Sam(BufReader<File>),
}

/// Unified alignment input wrapping either BAM or SAM text.
pub struct AlignmentInput {
    inner: Inner,
    /// Reference sequence names by BAM ref id
    refs: Vec<String>,
    /// Malformed records skipped so far
    pub malformed: u64,
    /// Records dropped by the pairing-flag gate
    pub flag_filtered: u64,
    file_path: String,
}

impl AlignmentInput {
    /// Open an alignment file, auto-detected by magic bytes: BGZF (gzip
    /// magic) means BAM, anything else is read as SAM text.
    pub fn open(path: &str) -> Result<Self> {
        if Self::is_bgzf_file(path) {
            Self::open_bam(path)
        } else {
            Self::open_sam(path)
        }
    }

    fn is_bgzf_file(path: &str) -> bool {
        if let Ok(mut f) = File::open(path) {
            let mut magic = [0u8; 2];
            if f.read_exact(&mut magic).is_ok() {
                return magic == [0x1f, 0x8b];
            }
        }
        path.ends_with(".bam")
    }

    fn open_bam(path: &str) -> Result<Self> {
        let file = File::open(path).map_err(|e| anyhow!("Failed to open BAM {}: {}", path, e))?;
        let mut reader = bam::io::Reader::new(BufReader::new(file));
        let header = reader.read_header()?;
        let refs = refs_from_header(&header);
        Ok(AlignmentInput {
            inner: Inner::Bam(reader),
            refs,
            malformed: 0,
            flag_filtered: 0,
            file_path: path.to_string(),
        })
    }

    fn open_sam(path: &str) -> Result<Self> {
        let file = File::open(path).map_err(|e| anyhow!("Failed to open SAM {}: {}", path, e))?;
        Ok(AlignmentInput {
            inner: Inner::Sam(BufReader::new(file)),
            refs: Vec::new(),
            malformed: 0,
            flag_filtered: 0,
            file_path: path.to_string(),
        })
    }

    /// Reset to the first record. Re-opens the reader (the record stream is
    /// otherwise consumed once, with no rewind) and restarts the counters.
    pub fn seek_start(&mut self) -> Result<()> {
        let reopened = Self::open(&self.file_path)?;
        self.inner = reopened.inner;
        self.refs = reopened.refs;
        self.malformed = 0;
        self.flag_filtered = 0;
        Ok(())
    }

    /// Read the next usable pair record, skipping flag-excluded and
    /// malformed records. Returns `None` at end of input.
    pub fn read_pair_record(&mut self) -> Result<Option<PairRecord>> {
        loop {
            match &mut self.inner {
                Inner::Bam(reader) => {
                    let mut buf = bam::Record::default();
                    match reader.read_record(&mut buf) {
                        Ok(0) => return Ok(None),
                        Ok(_) => {}
                        Err(e) => return Err(e.into()),
                    }
                    let flags = buf.flags().bits();
                    if flags & FLAG_PAIRED == 0 || flags & EXCLUDE_FLAGS != 0 {
                        self.flag_filtered += 1;
                        continue;
                    }
                    match decode_bam_record(&buf, &self.refs) {
                        Some(record) => return Ok(Some(record)),
                        None => {
                            self.malformed += 1;
                            warn!("Skipping malformed BAM record");
                        }
                    }
                }
                Inner::Sam(reader) => {
                    let mut line = String::new();
                    if reader.read_line(&mut line)? == 0 {
                        return Ok(None);
                    }
                    let line = line.trim_end();
                    if line.is_empty() || line.starts_with('@') {
                        continue;
                    }
                    match decode_sam_line(line) {
                        Ok(Some(record)) => return Ok(Some(record)),
                        Ok(None) => {
                            self.flag_filtered += 1;
                        }
                        Err(msg) => {
                            self.malformed += 1;
                            warn!("Skipping malformed record: {}", msg);
                        }
                    }
                }
            }
        }
    }
}

fn refs_from_header(header: &sam::Header) -> Vec<String> {
    header
        .reference_sequences()
        .iter()
        .map(|(name, _)| String::from_utf8_lossy(name).to_string())
        .collect()
}

/// Normalize a noodles BAM record. Returns `None` if a required field is
/// missing or undecodable (counted as malformed by the caller).
fn decode_bam_record(rec: &bam::Record, refs: &[String]) -> Option<PairRecord> {
    let name = rec.name().map(|n| String::from_utf8_lossy(n.as_ref()).to_string())?;

    let ref_id = match rec.reference_sequence_id() {
        Some(Ok(id)) => id,
        _ => return None,
    };
    let chrom1 = refs.get(ref_id)?.clone();

    let pos1 = match rec.alignment_start() {
        Some(Ok(p)) => p.get() as u32,
        _ => return None,
    };

    let mate_ref_id = match rec.mate_reference_sequence_id() {
        Some(Ok(id)) => id,
        _ => return None,
    };
    let chrom2 = refs.get(mate_ref_id)?.clone();

    let pos2 = match rec.mate_alignment_start() {
        Some(Ok(p)) => p.get() as u32,
        _ => return None,
    };

    let flags = rec.flags().bits();
    let mapq = rec.mapping_quality().map(|q| q.get()).unwrap_or(255);

    let unique = match rec.data().get(&Tag::from([b'X', b'T'])) {
        Some(Ok(Value::Character(c))) => c == b'U',
        _ => false,
    };

    Some(PairRecord {
        name,
        chrom1,
        pos1,
        strand1: Strand::from_flag(flags, FLAG_REVERSE),
        chrom2,
        pos2,
        strand2: Strand::from_flag(flags, FLAG_MATE_REVERSE),
        tlen: rec.template_length().unsigned_abs(),
        mapq,
        unique,
        seq_len: rec.sequence().len() as u32,
    })
}

/// Decode one tab-separated SAM line into a pair record.
///
/// Returns `Ok(None)` when the record fails the pairing-flag gate, and
/// `Err` (with a reason) when the line is malformed.
pub fn decode_sam_line(line: &str) -> std::result::Result<Option<PairRecord>, String> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 11 {
        return Err(format!("expected at least 11 fields, got {}", fields.len()));
    }

    let flags: u16 = fields[1]
        .parse()
        .map_err(|e| format!("invalid flag '{}': {}", fields[1], e))?;
    if flags & FLAG_PAIRED == 0 || flags & EXCLUDE_FLAGS != 0 {
        return Ok(None);
    }

    let chrom1 = fields[2].to_string();
    if chrom1 == "*" {
        return Err("unmapped record without unmapped flag".to_string());
    }
    let pos1: u32 = fields[3]
        .parse()
        .map_err(|e| format!("invalid position '{}': {}", fields[3], e))?;
    let mapq: u8 = fields[4]
        .parse()
        .map_err(|e| format!("invalid mapq '{}': {}", fields[4], e))?;

    // "=" marks a self-referencing mate chromosome
    let chrom2 = if fields[6] == "=" { chrom1.clone() } else { fields[6].to_string() };
    let pos2: u32 = fields[7]
        .parse()
        .map_err(|e| format!("invalid mate position '{}': {}", fields[7], e))?;
    let tlen: i64 = fields[8]
        .parse()
        .map_err(|e| format!("invalid template length '{}': {}", fields[8], e))?;

    let seq_len = if fields[9] == "*" { 0 } else { fields[9].len() as u32 };
    let unique = fields[11..].iter().any(|t| *t == "XT:A:U");

    Ok(Some(PairRecord {
        name: fields[0].to_string(),
        chrom1,
        pos1,
        strand1: Strand::from_flag(flags, FLAG_REVERSE),
        chrom2,
        pos2,
        strand2: Strand::from_flag(flags, FLAG_MATE_REVERSE),
        tlen: tlen.unsigned_abs() as u32,
        mapq,
        unique,
        seq_len,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sam_line(flags: u16) -> String {
        format!(
            "read1\t{}\tchr1\t10000\t37\t100M\t=\t12000\t2100\t{}\t*\tXT:A:U",
            flags,
            "A".repeat(100)
        )
    }

    #[test]
    fn test_decode_sam_line() {
        // paired, mate reverse
        let rec = decode_sam_line(&sam_line(0x21)).unwrap().unwrap();
        assert_eq!(rec.name, "read1");
        assert_eq!(rec.chrom1, "chr1");
        assert_eq!(rec.chrom2, "chr1");
        assert_eq!(rec.pos1, 10000);
        assert_eq!(rec.pos2, 12000);
        assert_eq!(rec.strand1, Strand::Forward);
        assert_eq!(rec.strand2, Strand::Reverse);
        assert_eq!(rec.tlen, 2100);
        assert_eq!(rec.seq_len, 100);
        assert!(rec.unique);
        assert!(rec.is_fr());
        assert!(!rec.is_rf());
    }

    #[test]
    fn test_flag_gate() {
        // duplicate bit set
        assert!(decode_sam_line(&sam_line(0x401)).unwrap().is_none());
        // unpaired
        assert!(decode_sam_line(&sam_line(0x0)).unwrap().is_none());
        // supplementary
        assert!(decode_sam_line(&sam_line(0x801)).unwrap().is_none());
    }

    #[test]
    fn test_malformed_line() {
        assert!(decode_sam_line("read1\tnot_a_flag\tchr1").is_err());
        assert!(decode_sam_line("read1\t1\tchr1\tten\t37\t100M\t=\t12000\t2100\tAAAA\t*").is_err());
    }

    #[test]
    fn test_negative_tlen_abs() {
        let line = format!(
            "read2\t{}\tchr1\t12000\t37\t100M\t=\t10000\t-2100\t{}\t*",
            0x11,
            "A".repeat(100)
        );
        let rec = decode_sam_line(&line).unwrap().unwrap();
        assert_eq!(rec.tlen, 2100);
        assert!(!rec.unique);
    }

    #[test]
    fn test_orientation_outward() {
        // leftmost half reverse, mate forward: RF
        let line = format!(
            "read3\t{}\tchr2\t5000\t60\t50M\t=\t9000\t4050\t{}\t*",
            0x11, // paired + self reverse
            "C".repeat(50)
        );
        let rec = decode_sam_line(&line).unwrap().unwrap();
        assert!(rec.is_rf());
        assert!(!rec.is_fr());
    }

    #[test]
    fn test_strand_complement() {
        assert_eq!(Strand::Forward.complement(), Strand::Reverse);
        assert_eq!(Strand::Reverse.complement(), Strand::Forward);
        assert_eq!(Strand::Forward.symbol(), '+');
    }
}

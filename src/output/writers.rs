//! Flat-file serializers for the call surface: SVP, BED, BEDPE, breakpoint
//! annotations, link/tile visualization tracks, and the fragment-size
//! histogram dump.

use std::fs::File;
use std::io::{BufWriter, Write};

use crate::sv::SvType;
use crate::sv::fragsize::FragmentHistogram;

use super::types::SvCall;

/// Write the SVP file: one line per call (CTX events already arrive as two
/// records). The header carries the program, the source file, and the
/// annotation-tag dictionary.
pub fn write_svp(path: &str, source: &str, calls: &[SvCall]) -> std::io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    writeln!(w, "##program=mpsvar {}", env!("CARGO_PKG_VERSION"))?;
    writeln!(w, "##source={}", source)?;
    writeln!(
        w,
        "##tags=TY:sv type;O1:side-1 orientation;O2:side-2 orientation;\
         NR:supporting pairs;MG:inward/outward merge;CTX:mate coordinates"
    )?;
    writeln!(
        w,
        "#name\tchrom1\tstart1\tend1\tchrom2\tstart2\tend2\tsize\ttags"
    )?;
    for call in calls {
        let mut tags = format!(
            "TY={};O1={};O2={};NR={};MG={}",
            call.sv_type,
            call.strand1,
            call.strand2,
            call.count,
            if call.merged { 1 } else { 0 }
        );
        if let Some(mate) = &call.ctx_mate {
            tags.push_str(&format!(";CTX={}", mate));
        }
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            call.name,
            call.chrom1,
            call.start1,
            call.end1,
            call.chrom2,
            call.start2,
            call.end2,
            call.size,
            tags
        )?;
    }
    Ok(())
}

/// Write intra-chromosomal calls as BED (0-based half-open anchors).
pub fn write_bed(path: &str, calls: &[SvCall]) -> std::io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    for call in calls {
        if !call.is_intra() || call.sv_type == SvType::Ctx {
            continue;
        }
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}",
            call.chrom1,
            call.anchor1.saturating_sub(1),
            call.anchor2,
            call.name,
            call.count
        )?;
    }
    Ok(())
}

/// Write inter-chromosomal calls as BEDPE, one line per CTX event (the
/// `_1` record of each pair carries the canonical side order).
pub fn write_bedpe(path: &str, calls: &[SvCall]) -> std::io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    for call in calls {
        if call.sv_type != SvType::Ctx || !call.name.ends_with("_1") {
            continue;
        }
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            call.chrom1,
            call.start1.saturating_sub(1),
            call.end1,
            call.chrom2,
            call.start2.saturating_sub(1),
            call.end2,
            call.name.trim_end_matches("_1"),
            call.count
        )?;
    }
    Ok(())
}

/// Write the per-breakpoint annotation records: two lines per call, one per
/// side, each a window around the anchor.
pub fn write_annotations(path: &str, calls: &[SvCall], window: u32) -> std::io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    for call in calls {
        writeln!(
            w,
            "{}\t1\t{}\t{}\t{}\t{}\t{}",
            call.name,
            call.chrom1,
            call.anchor1.saturating_sub(window),
            call.anchor1 + window,
            call.sv_type,
            call.strand1
        )?;
        writeln!(
            w,
            "{}\t2\t{}\t{}\t{}\t{}\t{}",
            call.name,
            call.chrom2,
            call.anchor2.saturating_sub(window),
            call.anchor2 + window,
            call.sv_type,
            call.strand2
        )?;
    }
    Ok(())
}

/// Write the link track: one line per call joining the two anchors.
pub fn write_links(path: &str, calls: &[SvCall]) -> std::io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    for call in calls {
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}\t{}",
            call.name, call.chrom1, call.anchor1, call.chrom2, call.anchor2, call.sv_type
        )?;
    }
    Ok(())
}

/// Write the tile track: one line per call side covering its evidence range.
pub fn write_tiles(path: &str, calls: &[SvCall]) -> std::io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    for call in calls {
        writeln!(w, "{}\t{}\t{}\t{}", call.chrom1, call.start1, call.end1, call.name)?;
        writeln!(w, "{}\t{}\t{}\t{}", call.chrom2, call.start2, call.end2, call.name)?;
    }
    Ok(())
}

/// Dump the fragment-size histogram as `bin_start<TAB>count` lines.
pub fn write_histogram(path: &str, hist: &FragmentHistogram) -> std::io::Result<()> {
    let w = BufWriter::new(File::create(path)?);
    hist.write_dump(w)
}

use std::path::Path;

use clap::{Parser, Subcommand, ValueEnum};
use log::{error, info};

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use mpsvar::config::{CallerConfig, InsertProfile};
use mpsvar::error::SvResult;
use mpsvar::input::AlignmentInput;
use mpsvar::output::writers;
use mpsvar::output::OutputCollector;
use mpsvar::pipeline::PipelineRunner;
use mpsvar::sv::fragsize::FragmentHistogram;
use mpsvar::utils::bed::Mask;

#[derive(Parser)]
#[command(name = "mpsvar")]
#[command(
    about = "Mate-Pair Structural VARiant caller",
    long_about = "Calls structural-variation breakpoints (INS, DEL, INV, ITX, CTX) from \
                  discordant read pairs of a mate-pair / Nextera-style library, which \
                  produces inward- and outward-facing pairs simultaneously."
)]
struct Cli {
    /// Log verbosity level
    #[arg(long, global = true, default_value = "info")]
    log_level: LogLevel,
    /// Write log output to a file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<String>,
    /// Append to log file instead of truncating
    #[arg(long, global = true)]
    append_log: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Shared options of the two calling commands.
#[derive(clap::Args)]
struct CallOpts {
    /// Sorted BAM (or SAM text) file of aligned mate-pair reads.
    #[arg(long, required = true)]
    bam: String,
    /// Prefix for output files (e.g. "results/sample1").
    #[arg(long, required = true)]
    out_prefix: String,
    /// BED file of genomic intervals to exclude (tab-separated chrom/start/end, inclusive).
    #[arg(long)]
    mask: Option<String>,
    /// Path to caller configuration JSON (thresholds, constants).
    #[arg(long)]
    config: Option<String>,
    /// Minimum pairs per cluster for a call.
    #[arg(long)]
    min_cluster_count: Option<u32>,
    /// Minimum mapping quality per record.
    #[arg(long)]
    min_mapping_quality: Option<u8>,
    /// Require the XT:A:U unique-mapping tag on every record.
    #[arg(long)]
    unique_mapping: bool,
    /// Annotation prefix for call names.
    #[arg(long)]
    sv_name: Option<String>,
    /// Enable the QC de-duplication sweep over overlapping clusters.
    #[arg(long)]
    qc_filter: bool,
    /// Force overwrite of existing output files.
    #[arg(short, long)]
    force: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Call SVs, inferring the insert windows from the library (two passes)
    Call {
        #[command(flatten)]
        opts: CallOpts,
    },
    /// Call SVs with explicit insert windows (single pass)
    CallLite {
        #[command(flatten)]
        opts: CallOpts,
        /// Lower bound of the inward (FR) insert window.
        #[arg(long, required = true)]
        inward_min: u32,
        /// Upper bound of the inward (FR) insert window.
        #[arg(long, required = true)]
        inward_max: u32,
        /// Lower bound of the outward (RF) insert window.
        #[arg(long, required = true)]
        outward_min: u32,
        /// Upper bound of the outward (RF) insert window.
        #[arg(long, required = true)]
        outward_max: u32,
    },
    /// Dump the fragment-size histogram for library QC
    Hist {
        /// Sorted BAM (or SAM text) file of aligned mate-pair reads.
        #[arg(long, required = true)]
        bam: String,
        /// Prefix for output files; writes <prefix>.hist.tsv.
        #[arg(long, required = true)]
        out_prefix: String,
        /// Force overwrite of existing output files.
        #[arg(short, long)]
        force: bool,
    },
    /// Print JSON Schema for the unified output format
    Schema {
        /// Write schema to file instead of stdout
        #[arg(long)]
        output: Option<String>,
    },
}

// Helper to check output paths and create directories
fn check_output_paths(
    prefix: &str,
    suffixes: &[&str],
    force: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(prefix);
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        info!("Creating output directory: {:?}", parent);
        std::fs::create_dir_all(parent)?;
    }

    if !force {
        for suffix in suffixes {
            let p = format!("{}{}", prefix, suffix);
            if Path::new(&p).exists() {
                return Err(Box::new(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    format!("Output file {} already exists. Use --force to overwrite.", p),
                )));
            }
        }
    }

    Ok(())
}

struct StepTimer {
    total_start: std::time::Instant,
    step_start: std::time::Instant,
}

impl StepTimer {
    fn new() -> Self {
        let now = std::time::Instant::now();
        Self {
            total_start: now,
            step_start: now,
        }
    }
    fn start(&mut self, name: &str) {
        info!("===== [STAGE] {} =====", name);
        self.step_start = std::time::Instant::now();
    }
    fn end(&self) {
        let now = std::time::Instant::now();
        info!("----- Stage Time: {:.2?} -----", now.duration_since(self.step_start));
        info!("----- Total Time: {:.2?} -----", now.duration_since(self.total_start));
    }
}

const CALL_SUFFIXES: &[&str] = &[
    ".result.json",
    ".svp",
    ".bed",
    ".bedpe",
    ".ann.tsv",
    ".links.tsv",
    ".tiles.tsv",
    ".hist.tsv",
];

/// Assemble the effective configuration from the optional JSON file and the
/// command-line overrides.
fn build_config(opts: &CallOpts, insert: Option<InsertProfile>) -> SvResult<CallerConfig> {
    let mut config = match &opts.config {
        Some(path) => CallerConfig::load(path)?,
        None => CallerConfig::default(),
    };
    if let Some(v) = opts.min_cluster_count {
        config.min_cluster_count = v;
    }
    if let Some(v) = opts.min_mapping_quality {
        config.min_mapping_quality = v;
    }
    if opts.unique_mapping {
        config.unique_mapping = true;
    }
    if let Some(v) = &opts.sv_name {
        config.sv_name = v.clone();
    }
    if opts.qc_filter {
        config.qc_filter = true;
    }
    if insert.is_some() {
        config.insert = insert;
        config.insert.as_ref().unwrap().validate()?;
    }
    Ok(config)
}

fn run_call(opts: &CallOpts, config: &CallerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut timer = StepTimer::new();

    let mask = match &opts.mask {
        Some(path) => {
            let mask = Mask::load(path)?;
            info!("Loaded {} mask intervals from {}", mask.interval_count(), path);
            mask
        }
        None => Mask::default(),
    };

    timer.start("Calling");
    let result = PipelineRunner::new(&opts.bam, config).with_mask(mask).run()?;
    timer.end();

    timer.start("Writing output");
    let prefix = &opts.out_prefix;
    writers::write_svp(&format!("{}.svp", prefix), &opts.bam, &result.calls)?;
    writers::write_bed(&format!("{}.bed", prefix), &result.calls)?;
    writers::write_bedpe(&format!("{}.bedpe", prefix), &result.calls)?;
    writers::write_annotations(
        &format!("{}.ann.tsv", prefix),
        &result.calls,
        config.constants.window,
    )?;
    writers::write_links(&format!("{}.links.tsv", prefix), &result.calls)?;
    writers::write_tiles(&format!("{}.tiles.tsv", prefix), &result.calls)?;
    writers::write_histogram(&format!("{}.hist.tsv", prefix), &result.histogram)?;

    let collector = OutputCollector::new(&opts.bam)
        .with_library(result.profile)
        .with_calls(result.calls)
        .with_stats(result.stats);
    collector.write_to_prefix(prefix)?;
    timer.end();

    info!("Done.");
    Ok(())
}

fn run_hist(bam: &str, out_prefix: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut input = AlignmentInput::open(bam)?;
    let mut hist = FragmentHistogram::new(100);
    while let Some(record) = input.read_pair_record()? {
        hist.observe(record.tlen);
    }
    info!("Observed {} fragments", hist.total());
    writers::write_histogram(&format!("{}.hist.tsv", out_prefix), &hist)?;
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let mut log_builder = env_logger::Builder::from_default_env();
    log_builder
        .filter_level(cli.log_level.to_level_filter())
        .format_module_path(false);
    if let Some(ref path) = cli.log_file {
        let file = if cli.append_log {
            std::fs::File::options().create(true).append(true).open(path)
        } else {
            std::fs::File::create(path)
        }
        .unwrap_or_else(|e| panic!("Could not open log file '{}': {}", path, e));
        log_builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    log_builder.init();

    let outcome = match &cli.command {
        Commands::Call { opts } => check_output_paths(&opts.out_prefix, CALL_SUFFIXES, opts.force)
            .and_then(|_| {
                let config = build_config(opts, None)?;
                run_call(opts, &config)
            }),
        Commands::CallLite {
            opts,
            inward_min,
            inward_max,
            outward_min,
            outward_max,
        } => check_output_paths(&opts.out_prefix, CALL_SUFFIXES, opts.force).and_then(|_| {
            let profile = InsertProfile {
                inward_min: *inward_min,
                inward_max: *inward_max,
                outward_min: *outward_min,
                outward_max: *outward_max,
            };
            let config = build_config(opts, Some(profile))?;
            run_call(opts, &config)
        }),
        Commands::Hist {
            bam,
            out_prefix,
            force,
        } => check_output_paths(out_prefix, &[".hist.tsv"], *force)
            .and_then(|_| run_hist(bam, out_prefix)),
        Commands::Schema { output } => {
            let schema = mpsvar::output::schema::schema_json_pretty();
            match output {
                Some(path) => std::fs::write(path, schema).map_err(Into::into),
                None => {
                    println!("{}", schema);
                    Ok(())
                }
            }
        }
    };

    if let Err(e) = outcome {
        error!("{}", e);
        std::process::exit(1);
    }
}

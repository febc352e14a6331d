use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};

use ehr_segmenter::config::{self, SegmenterConfig};
use ehr_segmenter::segmenter::page::format_dos;
use ehr_segmenter::segmenter::{Segmentation, Segmenter};
use ehr_segmenter::{db, emit, input};

#[derive(Parser)]
#[command(name = "ehr_segmenter", about = "Group EHR document pages into logical records")]
struct Cli {
    /// TOML file overriding grouping, extraction and category settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// SQLite file for recorded runs
    #[arg(long, global = true, default_value = db::DEFAULT_DB_PATH)]
    db: PathBuf,
    /// Log every boundary decision
    #[arg(long, global = true)]
    debug: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Segment one or more extracted documents (.json pages or form-feed text)
    Segment {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        /// Directory for <stem>.csv / <stem>.json output
        #[arg(short, long, default_value = "out")]
        out_dir: PathBuf,
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Csv)]
        format: OutputFormat,
        /// Record the run in the database
        #[arg(long)]
        save: bool,
    },
    /// Show the boundary decision behind every page of one document
    Explain { input: PathBuf },
    /// List recorded runs
    History {
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// Re-emit a recorded run as CSV
    Export {
        id: i64,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
}

impl OutputFormat {
    fn extension(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let t0 = Instant::now();

    let result = match cli.command {
        Commands::Segment {
            inputs,
            out_dir,
            format,
            save,
        } => {
            let config = config::load_config(cli.config.as_deref())?;
            std::fs::create_dir_all(&out_dir)
                .with_context(|| format!("Failed to create output directory: {}", out_dir.display()))?;
            let runs = segment_documents(&config, &inputs, &out_dir, format)?;

            let failed = runs.iter().filter(|r| r.outcome.is_err()).count();
            if save {
                let conn = db::connect(&cli.db)?;
                db::init_schema(&conn)?;
                for run in &runs {
                    if let Ok(seg) = &run.outcome {
                        let id = db::save_segmentation(&conn, &run.source, seg)?;
                        info!(id, source = %run.source, "recorded run");
                    }
                }
            }

            for run in &runs {
                match &run.outcome {
                    Ok(seg) => println!(
                        "{:<40} {:>5} pages {:>4} groups",
                        truncate(&run.source, 40),
                        seg.records.len(),
                        seg.groups.len()
                    ),
                    Err(e) => println!("{:<40} FAILED: {:#}", truncate(&run.source, 40), e),
                }
            }
            println!(
                "\n{} documents, {} ok, {} failed -> {}",
                runs.len(),
                runs.len() - failed,
                failed,
                out_dir.display()
            );
            if failed > 0 {
                bail!("{} of {} documents failed", failed, runs.len());
            }
            Ok(())
        }
        Commands::Explain { input } => {
            let config = config::load_config(cli.config.as_deref())?;
            let segmenter = Segmenter::new(&config)?;
            let doc = input::load_document(&input)?;
            let seg = segmenter.segment(&doc)?;
            print_explanation(&seg);
            Ok(())
        }
        Commands::History { limit } => {
            let conn = db::connect(&cli.db)?;
            db::init_schema(&conn)?;
            let rows = db::fetch_history(&conn, limit)?;
            if rows.is_empty() {
                println!("No recorded runs. Use 'segment --save' first.");
                return Ok(());
            }
            println!(
                "{:>5} | {:<40} | {:>5} | {:>6} | {:<19}",
                "ID", "Source", "Pages", "Groups", "Processed"
            );
            println!("{}", "-".repeat(87));
            for r in &rows {
                println!(
                    "{:>5} | {:<40} | {:>5} | {:>6} | {:<19}",
                    r.id,
                    truncate(&r.source, 40),
                    r.page_count,
                    r.group_count,
                    r.processed_at
                );
            }
            Ok(())
        }
        Commands::Export { id, output } => {
            let conn = db::connect(&cli.db)?;
            db::init_schema(&conn)?;
            let records = db::fetch_records(&conn, id)?;
            if records.is_empty() {
                bail!("No recorded run with id {}", id);
            }
            emit::write_csv(&records, output.as_deref())?;
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        eprintln!("\nDone in {}", format_duration(elapsed));
    }

    result
}

struct DocumentRun {
    source: String,
    outcome: anyhow::Result<Segmentation>,
}

/// Segments every input in parallel and writes one output file per success.
fn segment_documents(
    config: &SegmenterConfig,
    inputs: &[PathBuf],
    out_dir: &Path,
    format: OutputFormat,
) -> anyhow::Result<Vec<DocumentRun>> {
    use indicatif::{ProgressBar, ProgressStyle};
    use rayon::prelude::*;

    let segmenter = Segmenter::new(config)?;

    let pb = ProgressBar::new(inputs.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")?
            .progress_chars("#>-"),
    );

    let runs = inputs
        .par_iter()
        .map(|path| {
            let outcome = segment_one(&segmenter, path, out_dir, format);
            if let Err(e) = &outcome {
                error!(input = %path.display(), "{:#}", e);
            }
            pb.inc(1);
            DocumentRun {
                source: path.display().to_string(),
                outcome,
            }
        })
        .collect();

    pb.finish_and_clear();
    Ok(runs)
}

fn segment_one(
    segmenter: &Segmenter,
    path: &Path,
    out_dir: &Path,
    format: OutputFormat,
) -> anyhow::Result<Segmentation> {
    let doc = input::load_document(path)?;
    let seg = segmenter
        .segment(&doc)
        .with_context(|| format!("Failed to segment {}", path.display()))?;

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".into());
    let target = out_dir.join(format!("{}.{}", stem, format.extension()));
    match format {
        OutputFormat::Csv => emit::write_csv(&seg.records, Some(&target))?,
        OutputFormat::Json => emit::write_json(&seg.records, Some(&target))?,
    }
    Ok(seg)
}

fn print_explanation(seg: &Segmentation) {
    println!(
        "{:>4} | {:>5} | {:>5} | {:^5} | {:<22}",
        "Page", "Group", "Score", "H D P", "Verdict"
    );
    println!("{}", "-".repeat(52));
    for d in &seg.decisions {
        let score = d
            .content_score
            .map(|s| format!("{:.2}", s))
            .unwrap_or_else(|| "-".into());
        let flags = format!(
            "{} {} {}",
            mark(d.matches.header),
            mark(d.matches.dos),
            mark(d.matches.provider)
        );
        println!(
            "{:>4} | {:>5} | {:>5} | {:^5} | {:<22}",
            d.page,
            d.group.0,
            score,
            flags,
            format!("{:?}", d.verdict)
        );
    }

    println!("\n--- Groups ---");
    for g in &seg.groups {
        let first = g.pages.first().map(|p| p.number).unwrap_or_default();
        let last = g.pages.last().map(|p| p.number).unwrap_or_default();
        let dos = format_dos(g.consensus.dos);
        println!(
            "  {:>3}: pages {}-{} | cat {:>2} | {} | {} | {}",
            g.id.0,
            first,
            last,
            g.consensus.category,
            if dos.is_empty() { "-" } else { dos.as_str() },
            truncate(&g.consensus.header, 30),
            truncate(&g.consensus.provider, 40)
        );
    }
}

fn mark(matched: bool) -> char {
    if matched {
        'x'
    } else {
        '.'
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

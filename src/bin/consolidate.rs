//! CLI binary for case-consolidate.
//!
//! A thin shim over the library crate: registers the given files as one case
//! in a storage directory, consolidates them in argument order and prints the
//! report.

use anyhow::{Context, Result};
use clap::Parser;
use case_consolidate::{
    CaseId, ConsolidationConfig, ConsolidationProgressCallback, ConsolidationReport,
    Consolidator, Document, DocumentError, DocumentRegistry, FileStorage, InMemoryRegistry,
    LocalFileStorage, NewDocument, PageSize, ProgressCallback, StorageError,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar plus a log line per document.
struct CliProgressCallback {
    bar: ProgressBar,
    skipped: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Resolving documents…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            skipped: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Merging");
    }
}

impl ConsolidationProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_documents: usize) {
        self.activate_bar(total_documents);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Consolidating {total_documents} documents…"))
        ));
    }

    fn on_document_start(&self, _position: usize, _total: usize, document: &Document) {
        self.bar.set_message(document.display_name.clone());
    }

    fn on_document_complete(&self, position: usize, total: usize, pages: usize) {
        self.bar.println(format!(
            "  {} Document {:>3}/{:<3}  {}",
            green("✓"),
            position,
            total,
            dim(&format!("{pages:>3} pages")),
        ));
        self.bar.inc(1);
    }

    fn on_document_skipped(&self, position: usize, total: usize, error: &DocumentError) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
        let mut msg = error.to_string();
        if msg.chars().count() > 80 {
            msg = msg.chars().take(79).collect::<String>() + "\u{2026}";
        }
        self.bar.println(format!(
            "  {} Document {:>3}/{:<3}  {}",
            red("✗"),
            position,
            total,
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, total_documents: usize, processed: usize, pages: usize) {
        self.bar.finish_and_clear();
        let skipped = self.skipped.load(Ordering::SeqCst);
        if skipped == 0 {
            eprintln!(
                "{} {} documents merged into {} pages",
                green("✔"),
                bold(&processed.to_string()),
                pages
            );
        } else {
            eprintln!(
                "{} {}/{} documents merged into {} pages  ({} skipped)",
                if processed == 0 { red("✘") } else { cyan("⚠") },
                bold(&processed.to_string()),
                total_documents,
                pages,
                red(&skipped.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Merge scans and a contract into one PDF
  consolidate front.jpg back.jpg contract.pdf -o case.pdf

  # Keep artifacts in a storage directory, case 42
  consolidate --storage-dir ./store --case-id 42 *.png *.pdf

  # Dry run: show the resolved order and classification
  consolidate --plan photos/*.jpg -o out.pdf

  # Machine-readable report
  consolidate --json a.png b.pdf -o merged.pdf > report.json

SUPPORTED INPUTS:
  Images   jpg jpeg jpe jfif png gif bmp webp tif tiff  (one page each)
  PDF      pdf                                          (all pages, untouched)
  Anything else is skipped and listed in the report.

ENVIRONMENT VARIABLES:
  RUST_LOG   Override log filtering (e.g. case_consolidate=debug)
"#;

/// Merge images and PDFs into one page-ordered PDF.
#[derive(Parser, Debug)]
#[command(
    name = "consolidate",
    version,
    about = "Merge images and PDFs into one page-ordered PDF",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input files, merged in the order given.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Copy the published artifact to this path.
    #[arg(short, long, env = "CONSOLIDATE_OUTPUT", required_unless_present = "storage_dir")]
    output: Option<PathBuf>,

    /// Storage directory for sources and artifacts (temporary if omitted).
    #[arg(long, env = "CONSOLIDATE_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// Case id used for the artifact name.
    #[arg(long, env = "CONSOLIDATE_CASE_ID", default_value_t = 1)]
    case_id: u64,

    /// JPEG quality of image pages (10–95).
    #[arg(long, env = "CONSOLIDATE_QUALITY", default_value_t = 75,
          value_parser = clap::value_parser!(u8).range(10..=95))]
    quality: u8,

    /// Page size of image pages.
    #[arg(long, env = "CONSOLIDATE_PAGE_SIZE", value_enum, default_value = "a4")]
    page_size: PageSizeArg,

    /// Margin around image pages, in points.
    #[arg(long, env = "CONSOLIDATE_MARGIN", default_value_t = 36.0)]
    margin: f32,

    /// Reject runs whose inputs total more than this many bytes.
    #[arg(long, env = "CONSOLIDATE_MAX_INPUT_BYTES", default_value_t = 256 * 1024 * 1024)]
    max_input_bytes: u64,

    /// Per-document processing timeout in seconds.
    #[arg(long, env = "CONSOLIDATE_TIMEOUT", default_value_t = 30)]
    timeout: u64,

    /// Documents prepared concurrently.
    #[arg(short, long, env = "CONSOLIDATE_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Artifact name prefix.
    #[arg(long, env = "CONSOLIDATE_PREFIX", default_value = "consolidated")]
    prefix: String,

    /// Print the resolved plan and exit without merging.
    #[arg(long)]
    plan: bool,

    /// Output the report as JSON.
    #[arg(long, env = "CONSOLIDATE_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "CONSOLIDATE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "CONSOLIDATE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "CONSOLIDATE_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum PageSizeArg {
    A4,
    Letter,
}

impl From<PageSizeArg> for PageSize {
    fn from(v: PageSizeArg) -> Self {
        match v {
            PageSizeArg::A4 => PageSize::A4,
            PageSizeArg::Letter => PageSize::Letter,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.plan;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Collaborators ────────────────────────────────────────────────────
    // Held until the end of main so a temporary store outlives the copy-out.
    let temp_store;
    let storage_root = match cli.storage_dir {
        Some(ref dir) => dir.clone(),
        None => {
            temp_store = tempfile::tempdir().context("Failed to create temporary storage")?;
            temp_store.path().to_path_buf()
        }
    };
    let storage = Arc::new(LocalFileStorage::new(&storage_root));
    let registry = Arc::new(InMemoryRegistry::new());
    let case_id = CaseId(cli.case_id);
    registry.add_case(case_id);

    for (position, path) in cli.inputs.iter().enumerate() {
        register_input(&registry, &storage, case_id, position, path).await?;
    }

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConsolidationProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress)?;
    let consolidator = Consolidator::new(registry.clone(), registry, storage.clone(), config);

    // ── Plan-only mode ───────────────────────────────────────────────────
    if cli.plan {
        let plan = consolidator
            .plan(case_id, None)
            .await
            .context("Planning failed")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&plan).context("Failed to serialise plan")?
            );
        } else {
            for (i, doc) in plan.documents.iter().enumerate() {
                println!(
                    "{:>3}. {:<40} {:<12} {:>10} bytes",
                    i + 1,
                    doc.display_name,
                    format!("{:?}", doc.kind),
                    doc.byte_size
                );
            }
            println!("Total: {} of {} bytes allowed", plan.total_bytes, plan.limit_bytes);
        }
        return Ok(());
    }

    // ── Run consolidation ────────────────────────────────────────────────
    let report = consolidator
        .consolidate(case_id, None)
        .await
        .context("Consolidation failed")?;

    if let Some(ref output) = cli.output {
        let bytes = storage
            .read_file(&report.produced_document.storage_path)
            .await
            .context("Failed to read the published artifact")?;
        write_atomic(output, &bytes).await?;
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    } else if !cli.quiet {
        print_summary(&report, &storage_root, cli.output.as_deref());
    }

    Ok(())
}

/// Copy one input file into storage and register it at `position`.
async fn register_input(
    registry: &InMemoryRegistry,
    storage: &LocalFileStorage,
    case_id: CaseId,
    position: usize,
    path: &Path,
) -> Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read input {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .with_context(|| format!("Input {} has no file name", path.display()))?;
    let declared_type = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let mut attempt = 0;
    let storage_path = loop {
        let name = if attempt == 0 {
            format!("source-{position:04}-{file_name}")
        } else {
            format!("source-{position:04}-{attempt}-{file_name}")
        };
        match storage.write_file(&name, &bytes).await {
            Ok(stored) => break stored,
            Err(StorageError::AlreadyExists(_)) if attempt < 1000 => attempt += 1,
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to store {}", path.display()))
            }
        }
    };

    registry
        .insert_document(NewDocument {
            case_id,
            display_name: file_name,
            storage_path,
            byte_size: bytes.len() as u64,
            declared_type,
            order_index: position as i64,
            is_consolidated_output: false,
        })
        .await
        .with_context(|| format!("Failed to register {}", path.display()))?;
    Ok(())
}

/// Map CLI args to `ConsolidationConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConsolidationConfig> {
    let mut builder = ConsolidationConfig::builder()
        .page_size(cli.page_size.clone().into())
        .margin_pt(cli.margin)
        .jpeg_quality(cli.quality)
        .max_total_input_bytes(cli.max_input_bytes)
        .document_timeout_secs(cli.timeout)
        .concurrency(cli.concurrency)
        .artifact_prefix(cli.prefix.clone());

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Write to a temp file beside `path`, then rename over it.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("pdf.tmp");
    tokio::fs::write(&tmp_path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("Failed to move artifact to {}", path.display()))?;
    Ok(())
}

fn print_summary(report: &ConsolidationReport, storage_root: &Path, output: Option<&Path>) {
    let destination = match output {
        Some(p) => p.display().to_string(),
        None => storage_root
            .join(report.produced_document.storage_path.as_str())
            .display()
            .to_string(),
    };
    eprintln!(
        "{}  {} pages from {}/{} documents  {} bytes  {}ms  →  {}",
        if report.is_complete() {
            green("✔")
        } else {
            cyan("⚠")
        },
        report.pages_produced,
        report.documents_processed,
        report.documents_attempted(),
        report.byte_length,
        report.duration_ms,
        bold(&destination),
    );
    for skipped in &report.documents_skipped {
        eprintln!(
            "   {} {}  {}",
            red("skipped"),
            skipped.display_name,
            dim(&skipped.reason.to_string())
        );
    }
}

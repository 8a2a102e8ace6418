//! CLI binary for scan2text.
//!
//! A thin shim over the library crate that maps CLI flags to `RunConfig`,
//! drives a progress bar and prints the combined document.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use scan2text::convert::write_atomic;
use scan2text::{
    convert, inspect, ConversionProgressCallback, ExtractionResult, OutputFormat, PageSelection, ProgressCallback,
    RunConfig, RunReport,
};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const TICKS: [&str; 11] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── Progress bar ─────────────────────────────────────────────────────────

/// Live progress bar plus one log line per finished page. Pages may finish
/// out of order when `--concurrency` is above 1.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    /// Spinner until `on_conversion_start` tells us the page count.
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&TICKS),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut times| times.remove(&page_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_pages: usize) {
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} pages  ⏱ {elapsed_precise}  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(&TICKS),
        );
        self.bar.set_length(total_pages as u64);
        self.bar.set_prefix("Extracting");
        self.bar.reset_eta();
    }

    fn on_page_start(&self, page_num: usize, _total_pages: usize) {
        if let Ok(mut times) = self.start_times.lock() {
            times.insert(page_num, Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total_pages: usize, text_len: usize) {
        let secs = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            green("✓"),
            page_num,
            total_pages,
            dim(&format!("{text_len:>6} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let secs = self.elapsed_secs(page_num);
        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total_pages,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_conversion_complete(&self, total_pages: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = total_pages.saturating_sub(success_count);
        if failed == 0 {
            eprintln!("{} {} pages extracted", green("✔"), bold(&success_count.to_string()));
        } else {
            eprintln!(
                "{} {}/{} pages extracted  ({} without text)",
                if success_count == 0 { red("✘") } else { yellow("⚠") },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Markdown to stdout
  scan2text scan.pdf

  # JSON, written atomically to a file
  scan2text -f json scan.pdf -o scan.json

  # Higher resolution for small print, first ten pages, four at a time
  scan2text --dpi 300 --pages 1-10 -c 4 scan.pdf -o scan.md

  # Keep the rendered pages next to the output
  scan2text --images-dir pages/ scan.pdf -o scan.md

  # Page list only (no API key needed)
  scan2text --inspect-only scan.pdf

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  PDFIUM_LIB_PATH         Directory containing libpdfium
  RUST_LOG                Log filter, overrides -v / -q

EXIT STATUS:
  0  document produced (individual pages may have failed)
  1  fatal error: bad input, bad configuration, or credentials rejected
"#;

/// Extract text from scanned PDFs with Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "scan2text",
    version,
    about = "Extract Markdown, JSON, HTML or plain text from scanned PDFs with Vision LLMs",
    long_about = "Render each page of a scanned PDF (local file or URL) to an image and ask a \
vision-capable LLM to transcribe it in the requested format. Pages are independent: a page that \
cannot be rendered or read becomes a placeholder and the rest of the document is still produced.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Write the document to this file instead of stdout.
    #[arg(short, long, env = "SCAN2TEXT_OUTPUT")]
    output: Option<PathBuf>,

    /// Output format: markdown, json, html, plaintext.
    #[arg(short, long, env = "SCAN2TEXT_FORMAT", default_value = "markdown")]
    format: String,

    /// Rendering DPI (72–600).
    #[arg(long, env = "SCAN2TEXT_DPI", default_value_t = 144, conflicts_with = "zoom")]
    dpi: u32,

    /// Rendering zoom factor over 72 DPI (e.g. 2.0 = 144 DPI).
    #[arg(long, env = "SCAN2TEXT_ZOOM")]
    zoom: Option<f32>,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "SCAN2TEXT_PAGES", default_value = "all")]
    pages: String,

    /// Pages processed at once.
    #[arg(short, long, env = "SCAN2TEXT_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "SCAN2TEXT_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure. Auto-detected if unset.
    #[arg(long, env = "SCAN2TEXT_PROVIDER")]
    provider: Option<String>,

    /// Retries per page after a transient failure.
    #[arg(long, env = "SCAN2TEXT_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Max LLM output tokens per page.
    #[arg(long, env = "SCAN2TEXT_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "SCAN2TEXT_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "SCAN2TEXT_PASSWORD")]
    password: Option<String>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "SCAN2TEXT_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Directory containing the pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Save each rendered page as page-NNNN.png in this directory.
    #[arg(long, env = "SCAN2TEXT_IMAGES_DIR")]
    images_dir: Option<PathBuf>,

    /// Emit the full run report (pages, errors, stats) as JSON instead of the document.
    #[arg(long, env = "SCAN2TEXT_REPORT_JSON")]
    report_json: bool,

    /// Keep model output exactly as returned (skip cleanup).
    #[arg(long, env = "SCAN2TEXT_RAW")]
    raw: bool,

    /// List pages and sizes only, no extraction.
    #[arg(long)]
    inspect_only: bool,

    /// Disable progress bar.
    #[arg(long, env = "SCAN2TEXT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "SCAN2TEXT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "SCAN2TEXT_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "SCAN2TEXT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "SCAN2TEXT_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; -v brings them back at DEBUG.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress).await?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let info = inspect(&cli.input, &config).await.context("Failed to inspect PDF")?;
        if cli.report_json {
            println!("{}", serde_json::to_string_pretty(&info).context("Failed to serialise page list")?);
        } else {
            println!("File:   {}", cli.input);
            println!("Pages:  {}", info.page_count);
            for page in &info.pages {
                println!(
                    "  {:>4}  {:>7.1} × {:<7.1} pt",
                    page.number, page.width_pts, page.height_pts
                );
            }
        }
        return Ok(());
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let report = convert(&cli.input, &config).await.context("Conversion failed")?;

    if let Some(ref dir) = cli.images_dir {
        let written = save_images(&report, dir).await?;
        if !cli.quiet {
            eprintln!("   {} page images → {}", written, dir.display());
        }
    }

    if report.is_aborted() {
        if cli.report_json {
            eprintln!("{}", serde_json::to_string_pretty(&report).context("Failed to serialise run report")?);
        } else if !cli.quiet {
            eprint!("{}", abort_summary(&report));
        }
    }
    let report = report.into_result().context("Run aborted")?;
    warn_about_pages(&report, cli.quiet);

    let body = if cli.report_json {
        serde_json::to_string_pretty(&report).context("Failed to serialise run report")?
    } else {
        report.document()
    };

    match cli.output {
        Some(ref path) => {
            write_atomic(path, body)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            if !cli.quiet {
                eprintln!("   → {}", bold(&path.display().to_string()));
            }
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle.write_all(body.as_bytes()).context("Failed to write to stdout")?;
            if !body.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }
    }

    if !cli.quiet {
        let stats = &report.stats;
        if !show_progress {
            eprintln!(
                "Extracted {}/{} pages in {}ms",
                stats.succeeded, stats.selected_pages, stats.total_duration_ms
            );
        }
        eprintln!(
            "   {} tokens in  /  {} tokens out  /  {}ms total",
            dim(&stats.total_input_tokens.to_string()),
            dim(&stats.total_output_tokens.to_string()),
            stats.total_duration_ms,
        );
    }

    Ok(())
}

/// Map CLI args to `RunConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<RunConfig> {
    let system_prompt = match cli.system_prompt {
        Some(ref path) => Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        ),
        None => None,
    };
    let pages: PageSelection = cli.pages.parse().context("Invalid --pages")?;
    let format: OutputFormat = cli.format.parse().context("Invalid --format")?;

    let mut builder = RunConfig::builder()
        .dpi(cli.dpi)
        .format(format)
        .pages(pages)
        .concurrency(cli.concurrency)
        .max_retries(cli.max_retries)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout)
        .clean_output(!cli.raw)
        .retain_images(cli.images_dir.is_some());

    if let Some(zoom) = cli.zoom {
        builder = builder.zoom(zoom);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref dir) = cli.pdfium_lib {
        builder = builder.pdfium_library_path(dir);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Write retained page images as `page-NNNN.png`.
async fn save_images(report: &RunReport, dir: &Path) -> Result<usize> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let mut written = 0;
    for page in &report.pages {
        if let ExtractionResult::Success(p) = page {
            if let Some(ref image) = p.image {
                let path = dir.join(format!("page-{:04}.png", p.page_num));
                tokio::fs::write(&path, &image.bytes)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                written += 1;
            }
        }
    }
    Ok(written)
}

/// One line per page for a run that stopped early.
fn abort_summary(report: &RunReport) -> String {
    let mut out = String::new();
    for page in &report.pages {
        let status = match page {
            ExtractionResult::Success(_) => "done".to_string(),
            ExtractionResult::Failure { error, .. } => format!("failed ({}): {}", error.kind(), error.detail()),
            ExtractionResult::NotAttempted { .. } => "not attempted".to_string(),
        };
        out.push_str(&format!("  Page {}: {}\n", page.page_num(), status));
    }
    out
}

/// Surface JSON validity warnings; the bar already reported failures.
fn warn_about_pages(report: &RunReport, quiet: bool) {
    if quiet {
        return;
    }
    for page in &report.pages {
        if let ExtractionResult::Success(p) = page {
            if let Some(ref w) = p.warning {
                eprintln!("  {} Page {}: {}", yellow("⚠"), p.page_num, w);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan2text::{PageError, RunAbort, RunStats};

    #[test]
    fn abort_summary_lists_every_page() {
        let report = RunReport {
            format: OutputFormat::Markdown,
            pages: vec![
                ExtractionResult::Failure {
                    page_num: 1,
                    error: PageError::Auth {
                        page: 1,
                        detail: "401".into(),
                    },
                },
                ExtractionResult::NotAttempted { page_num: 2 },
            ],
            aborted: Some(RunAbort {
                page_num: 1,
                reason: "401".into(),
            }),
            stats: RunStats::default(),
        };
        assert_eq!(
            abort_summary(&report),
            "  Page 1: failed (AuthError): 401\n  Page 2: not attempted\n"
        );
    }
}

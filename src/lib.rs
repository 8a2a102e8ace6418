//! # scan2text
//!
//! Extract structured text from scanned PDFs with Vision Language Models.
//!
//! ## Why this crate?
//!
//! A scanned PDF has no text layer, so text extractors return nothing. This
//! crate rasterises each page into a PNG and asks a vision model to
//! transcribe it in the requested format: Markdown, JSON, HTML or plain text.
//! Every page is handled on its own, so one unreadable page costs one page,
//! not the document.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF bytes
//!  │
//!  ├─ 1. Input      read a local file or download from a URL
//!  ├─ 2. Render     rasterise each selected page via pdfium (spawn_blocking)
//!  ├─ 3. Prompt     format-specific instructions for that page
//!  ├─ 4. Extract    vision model call, transient failures retried
//!  ├─ 5. Clean      format-aware post-processing, JSON validity warning
//!  └─ 6. Aggregate  results in page order, combined document + stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scan2text::{convert, OutputFormat, RunConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = RunConfig::builder().format(OutputFormat::Json).build()?;
//!     let report = convert("scan.pdf", &config).await?.into_result()?;
//!     println!("{}", report.document());
//!     for failed in report.pages.iter().filter_map(|p| p.error()) {
//!         eprintln!("{failed}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Bring your own backends
//!
//! The pipeline only talks to two traits: [`Rasterizer`] (pdfium by default)
//! and [`VisionModel`] (any `edgequake_llm` provider by default). Pass your
//! own to [`convert_with`] or [`PagePipeline`].
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `scan2text` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! scan2text = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod aggregate;
pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use aggregate::{aggregate, AggregatedOutput, BlockStatus, PageBlock};
pub use config::{OutputFormat, PageSelection, RunConfig, RunConfigBuilder};
pub use convert::{convert, convert_bytes, convert_sync, convert_to_file, convert_with, inspect};
pub use error::{ExtractError, PageError, Scan2TextError};
pub use output::{DocumentInfo, ExtractionResult, PageExtraction, RunAbort, RunReport, RunStats};
pub use pipeline::llm::{VisionModel, VisionReply, VisionRequest};
pub use pipeline::page::{PagePipeline, PageState};
pub use pipeline::render::{Document, Page, RasterImage, Rasterizer};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompts::build_prompt;
pub use stream::{convert_stream, convert_stream_bytes, stream_with, PageStream};

//! Run configuration.
//!
//! Everything a run depends on lives in one [`RunConfig`] value that is
//! handed to the pipeline up front. Nothing is read from ambient process
//! state: the CLI maps its flags and environment variables onto the builder,
//! library callers set fields directly, and tests inject fakes.
//!
//! Validation happens once, in [`RunConfigBuilder::build`] (and again in
//! [`RunConfig::validate`] when a pipeline is constructed), so an unsupported
//! format or an out-of-range resolution aborts the run before any page is
//! touched.

use crate::error::Scan2TextError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

/// Lowest accepted rendering resolution.
pub const MIN_DPI: u32 = 72;
/// Highest accepted rendering resolution.
pub const MAX_DPI: u32 = 600;
/// PDF user space unit: 72 points per inch.
pub const POINTS_PER_INCH: f32 = 72.0;

/// Configuration for one extraction run.
///
/// Built via [`RunConfig::builder()`] or [`RunConfig::default()`].
///
/// # Example
/// ```rust
/// use scan2text::{OutputFormat, RunConfig};
///
/// let config = RunConfig::builder()
///     .dpi(200)
///     .format(OutputFormat::Json)
///     .build()
///     .unwrap();
/// assert_eq!(config.scale(), 200.0 / 72.0);
/// ```
#[derive(Clone)]
pub struct RunConfig {
    /// Rendering DPI. Range: 72–600. Default: 144 (zoom factor 2).
    pub dpi: u32,

    /// Cap on the longest rendered edge in pixels. Default: 4096.
    ///
    /// Keeps an oversized page (posters, plans) from producing an image the
    /// provider rejects. Smaller pages are unaffected.
    pub max_rendered_pixels: u32,

    /// Target output format for every page.
    pub format: OutputFormat,

    /// Pages processed at once. Default: 1 (sequential).
    pub concurrency: usize,

    /// Page selection. Default: all pages.
    pub pages: PageSelection,

    /// LLM model identifier. If None, `gpt-4.1-nano`.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens generated per page. Default: 4096.
    pub max_tokens: usize,

    /// Retries after a transient failure. Default: 2.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds; doubles per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout for the vision model in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Custom system prompt. If None, [`crate::prompts::DEFAULT_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,

    /// Directory holding the pdfium shared library. If None, the system library.
    pub pdfium_library_path: Option<PathBuf>,

    /// Run the format-aware cleanup pass on model output. Default: true.
    pub clean_output: bool,

    /// Keep each page's PNG in its result. Default: false.
    pub retain_images: bool,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dpi: 144,
            max_rendered_pixels: 4096,
            format: OutputFormat::default(),
            concurrency: 1,
            pages: PageSelection::default(),
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            max_retries: 2,
            retry_backoff_ms: 500,
            api_timeout_secs: 60,
            download_timeout_secs: 120,
            password: None,
            system_prompt: None,
            pdfium_library_path: None,
            clean_output: true,
            retain_images: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunConfig")
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("format", &self.format)
            .field("concurrency", &self.concurrency)
            .field("pages", &self.pages)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("clean_output", &self.clean_output)
            .field("retain_images", &self.retain_images)
            .finish()
    }
}

impl RunConfig {
    /// Create a new builder for `RunConfig`.
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder {
            config: Self::default(),
            format_name: None,
        }
    }

    /// Rasterisation scale factor (`dpi / 72`).
    pub fn scale(&self) -> f32 {
        self.dpi as f32 / POINTS_PER_INCH
    }

    /// Check every constraint the pipeline relies on.
    pub fn validate(&self) -> Result<(), Scan2TextError> {
        if !(MIN_DPI..=MAX_DPI).contains(&self.dpi) {
            return Err(Scan2TextError::InvalidConfig(format!(
                "DPI must be {MIN_DPI}–{MAX_DPI}, got {}",
                self.dpi
            )));
        }
        if self.max_rendered_pixels < 100 {
            return Err(Scan2TextError::InvalidConfig(format!(
                "max_rendered_pixels must be ≥ 100, got {}",
                self.max_rendered_pixels
            )));
        }
        if self.concurrency == 0 {
            return Err(Scan2TextError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(Scan2TextError::InvalidConfig(format!(
                "Temperature must be 0.0–2.0, got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(Scan2TextError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`RunConfig`].
#[derive(Debug)]
pub struct RunConfigBuilder {
    config: RunConfig,
    format_name: Option<String>,
}

impl RunConfigBuilder {
    /// Rendering resolution. Not clamped: out-of-range values fail in `build`.
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    /// Resolution as a zoom factor over the 72-DPI page size.
    pub fn zoom(mut self, zoom: f32) -> Self {
        self.config.dpi = (zoom.max(0.0) * POINTS_PER_INCH).round() as u32;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px;
        self
    }

    pub fn format(mut self, format: OutputFormat) -> Self {
        self.config.format = format;
        self.format_name = None;
        self
    }

    /// Select the format by name (`"markdown"`, `"json"`, …). Unknown names
    /// are reported by `build`.
    pub fn format_name(mut self, name: impl Into<String>) -> Self {
        self.format_name = Some(name.into());
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n;
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t;
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn pdfium_library_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(dir.into());
        self
    }

    pub fn clean_output(mut self, v: bool) -> Self {
        self.config.clean_output = v;
        self
    }

    pub fn retain_images(mut self, v: bool) -> Self {
        self.config.retain_images = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(mut self) -> Result<RunConfig, Scan2TextError> {
        if let Some(name) = self.format_name.take() {
            self.config.format = name.parse()?;
        }
        self.config.validate()?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// The structured representation requested from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Markdown,
    Json,
    Html,
    Plaintext,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [
        OutputFormat::Markdown,
        OutputFormat::Json,
        OutputFormat::Html,
        OutputFormat::Plaintext,
    ];

    /// Display name used inside prompts.
    pub fn name(self) -> &'static str {
        match self {
            OutputFormat::Markdown => "Markdown",
            OutputFormat::Json => "JSON",
            OutputFormat::Html => "HTML",
            OutputFormat::Plaintext => "Plaintext",
        }
    }

    /// Syntax-highlighting tag for rendering the page text, if any.
    pub fn code_language(self) -> Option<&'static str> {
        match self {
            OutputFormat::Markdown => Some("markdown"),
            OutputFormat::Json => Some("json"),
            OutputFormat::Html => Some("html"),
            OutputFormat::Plaintext => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OutputFormat {
    type Err = Scan2TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            "json" => Ok(OutputFormat::Json),
            "html" => Ok(OutputFormat::Html),
            "plaintext" | "text" | "txt" => Ok(OutputFormat::Plaintext),
            _ => Err(Scan2TextError::InvalidConfig(format!(
                "Unsupported output format '{}' (expected Markdown, JSON, HTML or Plaintext)",
                s.trim()
            ))),
        }
    }
}

/// Specifies which pages of the PDF to process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Every page (default).
    #[default]
    All,
    /// A single page (1-indexed).
    Single(usize),
    /// A contiguous range (1-indexed, inclusive).
    Range(usize, usize),
    /// Specific pages (1-indexed).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand into sorted, deduplicated 1-based page numbers that exist in a
    /// document of `total_pages` pages.
    pub fn to_page_numbers(&self, total_pages: usize) -> Vec<usize> {
        let in_range = |p: &usize| (1..=total_pages).contains(p);
        let mut numbers: Vec<usize> = match self {
            PageSelection::All => (1..=total_pages).collect(),
            PageSelection::Single(p) => Some(*p).filter(in_range).into_iter().collect(),
            PageSelection::Range(start, end) => ((*start).max(1)..=(*end).min(total_pages)).collect(),
            PageSelection::Set(pages) => pages.iter().copied().filter(in_range).collect(),
        };
        numbers.sort_unstable();
        numbers.dedup();
        numbers
    }
}

impl FromStr for PageSelection {
    type Err = Scan2TextError;

    /// Parse `all`, `5`, `3-15` or `1,3,5`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let bad = |what: &str| Scan2TextError::InvalidConfig(format!("Invalid page selection '{s}': {what}"));
        let number = |p: &str| -> Result<usize, Scan2TextError> {
            match p.trim().parse::<usize>() {
                Ok(0) => Err(bad("pages are 1-indexed")),
                Ok(n) => Ok(n),
                Err(_) => Err(bad(&format!("'{}' is not a page number", p.trim()))),
            }
        };

        if s == "all" {
            return Ok(PageSelection::All);
        }
        if let Some((start, end)) = s.split_once('-') {
            let (start, end) = (number(start)?, number(end)?);
            if start > end {
                return Err(bad("start must be <= end"));
            }
            return Ok(PageSelection::Range(start, end));
        }
        if s.contains(',') {
            let pages = s.split(',').map(number).collect::<Result<Vec<_>, _>>()?;
            return Ok(PageSelection::Set(pages));
        }
        Ok(PageSelection::Single(number(&s)?))
    }
}

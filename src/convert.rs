//! Eager (full-document) entry points.
//!
//! These wait for every selected page and return one [`RunReport`]. Use
//! [`crate::stream::convert_stream`] to receive pages as they are ready.
//!
//! Errors returned here are fatal to the whole run: unreadable input, a file
//! that is not a PDF, invalid configuration, no provider. Page failures are
//! inside the report. A run aborted by rejected credentials still returns
//! `Ok`; [`RunReport::into_result`] turns it into the run-level error.

use crate::config::RunConfig;
use crate::error::Scan2TextError;
use crate::output::{DocumentInfo, RunReport};
use crate::pipeline::input;
use crate::pipeline::llm::{LlmVisionModel, VisionModel};
use crate::pipeline::page::PagePipeline;
use crate::pipeline::render::{self, PdfiumRasterizer, Rasterizer};
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Model used when a provider is named without one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Convert a PDF file or URL.
///
/// # Example
/// ```rust,no_run
/// use scan2text::{convert, OutputFormat, RunConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = RunConfig::builder().format(OutputFormat::Markdown).build()?;
/// let report = convert("scan.pdf", &config).await?.into_result()?;
/// println!("{}", report.document());
/// eprintln!("{}/{} pages", report.stats.succeeded, report.stats.selected_pages);
/// # Ok(())
/// # }
/// ```
pub async fn convert(input_str: impl AsRef<str>, config: &RunConfig) -> Result<RunReport, Scan2TextError> {
    let input_str = input_str.as_ref();
    info!("Starting conversion: {}", input_str);
    config.validate()?;
    let bytes = input::load_input(input_str, config.download_timeout_secs).await?;
    convert_bytes(bytes, config).await
}

/// Convert PDF bytes already in memory.
pub async fn convert_bytes(bytes: impl Into<Arc<[u8]>>, config: &RunConfig) -> Result<RunReport, Scan2TextError> {
    let bytes: Arc<[u8]> = bytes.into();
    input::check_magic("<bytes>", &bytes)?;
    config.validate()?;

    let provider = resolve_provider(config)?;
    let model: Arc<dyn VisionModel> = Arc::new(LlmVisionModel::new(provider, config));
    let rasterizer: Arc<dyn Rasterizer> = Arc::new(PdfiumRasterizer::from_config(config));
    convert_with(bytes, config, rasterizer, model).await
}

/// Convert with explicit rasterizer and vision model.
///
/// The other entry points build the pdfium and `edgequake_llm` backends from
/// `config` and end up here.
pub async fn convert_with(
    bytes: Arc<[u8]>,
    config: &RunConfig,
    rasterizer: Arc<dyn Rasterizer>,
    model: Arc<dyn VisionModel>,
) -> Result<RunReport, Scan2TextError> {
    let pipeline = PagePipeline::new(config.clone(), Arc::clone(&rasterizer), model)?;
    let document = render::load_document(rasterizer, bytes).await?;
    Ok(pipeline.run(Arc::new(document)).await)
}

/// Convert and write the combined document to `output_path`.
///
/// The file is written to a temporary sibling and renamed into place, so a
/// reader never sees a partial file. An aborted run writes nothing.
pub async fn convert_to_file(
    input_str: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &RunConfig,
) -> Result<RunReport, Scan2TextError> {
    let report = convert(input_str, config).await?.into_result()?;
    write_atomic(output_path.as_ref(), report.document()).await?;
    Ok(report)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(input_str: impl AsRef<str>, config: &RunConfig) -> Result<RunReport, Scan2TextError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Scan2TextError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input_str, config))
}

/// List the pages of a PDF without converting anything.
///
/// Does not require an LLM provider or API key.
pub async fn inspect(input_str: impl AsRef<str>, config: &RunConfig) -> Result<DocumentInfo, Scan2TextError> {
    let bytes = input::load_input(input_str.as_ref(), config.download_timeout_secs).await?;
    let rasterizer: Arc<dyn Rasterizer> = Arc::new(PdfiumRasterizer::from_config(config));
    let document = render::load_document(rasterizer, bytes.into()).await?;
    Ok(DocumentInfo {
        page_count: document.page_count(),
        pages: document.pages().to_vec(),
    })
}

/// Write `contents` to `path` via a temp file in the same directory.
pub async fn write_atomic(path: &Path, contents: String) -> Result<(), Scan2TextError> {
    let path = path.to_path_buf();
    let target = path.clone();
    tokio::task::spawn_blocking(move || write_atomic_blocking(&target, contents.as_bytes()))
        .await
        .map_err(|e| Scan2TextError::Internal(format!("Write task panicked: {}", e)))?
        .map_err(|source| Scan2TextError::OutputWriteFailed { path, source })
}

fn write_atomic_blocking(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

// ── Provider resolution ──────────────────────────────────────────────────

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. `config.provider`, used as-is.
/// 2. `config.provider_name` plus `config.model` (default [`DEFAULT_MODEL`]);
///    the factory reads that provider's API key from the environment.
/// 3. [`ProviderFactory::from_env`] auto-detection.
pub(crate) fn resolve_provider(config: &RunConfig) -> Result<Arc<dyn LLMProvider>, Scan2TextError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return ProviderFactory::create_llm_provider(name, model).map_err(|e| {
            Scan2TextError::ProviderNotConfigured {
                provider: name.clone(),
                hint: format!("{e}"),
            }
        });
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Scan2TextError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn atomic_write_creates_parent_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.md");

        write_atomic(&path, "first".into()).await.unwrap();
        write_atomic(&path, "second".into()).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap()).unwrap().collect();
        assert_eq!(leftovers.len(), 1, "temp file left behind");
    }

    #[tokio::test]
    async fn bytes_that_are_not_pdf_fail_before_provider_lookup() {
        let err = convert_bytes(b"GIF89a".to_vec(), &RunConfig::default()).await.unwrap_err();
        assert!(matches!(err, Scan2TextError::NotAPdf { .. }));
    }

    #[tokio::test]
    async fn invalid_config_fails_before_input_is_read() {
        let config = RunConfig {
            dpi: 10,
            ..RunConfig::default()
        };
        let err = convert("/does/not/exist.pdf", &config).await.unwrap_err();
        assert!(err.is_config_error());
    }
}

//! Streaming API: yield each page's result as soon as it can be delivered.
//!
//! Unlike [`crate::convert::convert`], which returns after every page has
//! finished, [`convert_stream`] hands back a `Stream` of
//! [`ExtractionResult`]s. Results always arrive in page order, even with
//! `concurrency > 1`: a page that finishes early waits for its predecessors.
//! A rejected credential turns every page not yet started into
//! [`ExtractionResult::NotAttempted`].

use crate::config::RunConfig;
use crate::convert::resolve_provider;
use crate::error::Scan2TextError;
use crate::output::ExtractionResult;
use crate::pipeline::input;
use crate::pipeline::llm::{LlmVisionModel, VisionModel};
use crate::pipeline::page::PagePipeline;
use crate::pipeline::render::{self, PdfiumRasterizer, Rasterizer};
use std::pin::Pin;
use std::sync::Arc;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of page results, in page order.
pub type PageStream = Pin<Box<dyn Stream<Item = ExtractionResult> + Send>>;

/// Convert a PDF file or URL, streaming pages in page order.
///
/// The document is loaded before this returns, so input and configuration
/// errors surface here rather than inside the stream.
///
/// # Example
/// ```rust,no_run
/// use futures::StreamExt;
/// use scan2text::{convert_stream, ExtractionResult, RunConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut pages = convert_stream("scan.pdf", &RunConfig::default()).await?;
/// while let Some(result) = pages.next().await {
///     match result {
///         ExtractionResult::Success(p) => println!("{}", p.text),
///         other => eprintln!("page {} missing", other.page_num()),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub async fn convert_stream(input_str: impl AsRef<str>, config: &RunConfig) -> Result<PageStream, Scan2TextError> {
    let input_str = input_str.as_ref();
    info!("Starting streaming conversion: {}", input_str);
    config.validate()?;
    let bytes = input::load_input(input_str, config.download_timeout_secs).await?;
    convert_stream_bytes(bytes, config).await
}

/// Streaming counterpart of [`crate::convert::convert_bytes`].
pub async fn convert_stream_bytes(
    bytes: impl Into<Arc<[u8]>>,
    config: &RunConfig,
) -> Result<PageStream, Scan2TextError> {
    let bytes: Arc<[u8]> = bytes.into();
    input::check_magic("<bytes>", &bytes)?;
    config.validate()?;

    let provider = resolve_provider(config)?;
    let model: Arc<dyn VisionModel> = Arc::new(LlmVisionModel::new(provider, config));
    let rasterizer: Arc<dyn Rasterizer> = Arc::new(PdfiumRasterizer::from_config(config));
    stream_with(bytes, config, rasterizer, model).await
}

/// Streaming counterpart of [`crate::convert::convert_with`].
pub async fn stream_with(
    bytes: Arc<[u8]>,
    config: &RunConfig,
    rasterizer: Arc<dyn Rasterizer>,
    model: Arc<dyn VisionModel>,
) -> Result<PageStream, Scan2TextError> {
    let pipeline = PagePipeline::new(config.clone(), Arc::clone(&rasterizer), model)?;
    let document = render::load_document(rasterizer, bytes).await?;
    Ok(pipeline.stream(Arc::new(document)))
}

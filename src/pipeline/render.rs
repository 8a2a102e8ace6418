//! PDF rasterisation: one page → one PNG at a fixed resolution.
//!
//! The pipeline only sees the [`Rasterizer`] trait. [`PdfiumRasterizer`] is
//! the production implementation; tests plug in their own.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with process-global state. Calls into it are
//! CPU-bound and blocking, so [`load_document`] and [`rasterize_page`] move
//! them onto Tokio's blocking pool instead of stalling async workers.
//!
//! ## Sizing
//!
//! Pixel size is the page size in points times `dpi / 72`, with the longest
//! edge capped at `max_rendered_pixels`. Both steps are monotone in `dpi`,
//! so raising the resolution never shrinks the image.

use crate::config::{RunConfig, POINTS_PER_INCH};
use crate::error::{PageError, Scan2TextError};
use crate::pipeline::encode;
use pdfium_render::prelude::*;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// One page of a loaded document. Never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Page {
    /// 1-based page number.
    pub number: usize,
    /// Intrinsic width in PDF points.
    pub width_pts: f32,
    /// Intrinsic height in PDF points.
    pub height_pts: f32,
}

/// A PDF held in memory together with its page list.
#[derive(Debug, Clone)]
pub struct Document {
    bytes: Arc<[u8]>,
    pages: Vec<Page>,
}

impl Document {
    pub fn new(bytes: Arc<[u8]>, pages: Vec<Page>) -> Self {
        Self { bytes, pages }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Look up a page by 1-based number.
    pub fn page(&self, number: usize) -> Option<&Page> {
        number.checked_sub(1).and_then(|i| self.pages.get(i))
    }
}

/// A rendered page, PNG-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    /// 1-based number of the source page.
    pub page_num: usize,
    pub width: u32,
    pub height: u32,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Turns PDF bytes into pages and pages into images.
///
/// `rasterize` must be deterministic: the same page at the same DPI yields
/// byte-identical output.
pub trait Rasterizer: Send + Sync {
    /// Open the document and list its pages. Failure here is fatal to the run.
    fn load(&self, bytes: Arc<[u8]>) -> Result<Document, Scan2TextError>;

    /// Render one page. Failure here only affects that page.
    fn rasterize(&self, document: &Document, page: &Page, dpi: u32) -> Result<RasterImage, PageError>;
}

/// Pixel dimensions for a page of `width_pts × height_pts` at `dpi`,
/// longest edge capped at `max_pixels`.
pub fn render_dimensions(width_pts: f32, height_pts: f32, dpi: u32, max_pixels: u32) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let (mut w, mut h) = (width_pts.max(0.0) * scale, height_pts.max(0.0) * scale);
    let longest = w.max(h);
    let cap = max_pixels as f32;
    if longest > cap {
        let shrink = cap / longest;
        w *= shrink;
        h *= shrink;
    }
    (w.round().max(1.0) as u32, h.round().max(1.0) as u32)
}

/// Open `bytes` on the blocking pool.
pub async fn load_document(
    rasterizer: Arc<dyn Rasterizer>,
    bytes: Arc<[u8]>,
) -> Result<Document, Scan2TextError> {
    tokio::task::spawn_blocking(move || rasterizer.load(bytes))
        .await
        .map_err(|e| Scan2TextError::Internal(format!("Load task panicked: {}", e)))?
}

/// Render one page on the blocking pool.
pub async fn rasterize_page(
    rasterizer: Arc<dyn Rasterizer>,
    document: Arc<Document>,
    page: Page,
    dpi: u32,
) -> Result<RasterImage, PageError> {
    tokio::task::spawn_blocking(move || rasterizer.rasterize(&document, &page, dpi))
        .await
        .map_err(|e| PageError::RenderFailed {
            page: page.number,
            detail: format!("render task panicked: {}", e),
        })?
}

// ── pdfium ───────────────────────────────────────────────────────────────

/// [`Rasterizer`] backed by pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    /// Directory holding the pdfium shared library; system library if None.
    pub library_path: Option<PathBuf>,
    pub password: Option<String>,
    pub max_rendered_pixels: u32,
}

impl PdfiumRasterizer {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            library_path: config.pdfium_library_path.clone(),
            password: config.password.clone(),
            max_rendered_pixels: config.max_rendered_pixels,
        }
    }

    fn bind(&self) -> Result<Pdfium, String> {
        let bindings = match &self.library_path {
            Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| format!("{:?}", e))?;
        Ok(Pdfium::new(bindings))
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn load(&self, bytes: Arc<[u8]>) -> Result<Document, Scan2TextError> {
        let pdfium = self.bind().map_err(Scan2TextError::PdfiumBindingFailed)?;
        let password = self.password.as_deref();

        let pages = {
            let document = pdfium.load_pdf_from_byte_slice(&bytes, password).map_err(|e| {
                let err_str = format!("{:?}", e);
                if err_str.contains("Password") || err_str.contains("password") {
                    if password.is_some() {
                        Scan2TextError::WrongPassword
                    } else {
                        Scan2TextError::PasswordRequired
                    }
                } else {
                    Scan2TextError::CorruptPdf { detail: err_str }
                }
            })?;

            document
                .pages()
                .iter()
                .enumerate()
                .map(|(i, page)| Page {
                    number: i + 1,
                    width_pts: page.width().value,
                    height_pts: page.height().value,
                })
                .collect::<Vec<_>>()
        };

        info!("PDF loaded: {} pages", pages.len());
        Ok(Document::new(bytes, pages))
    }

    fn rasterize(&self, document: &Document, page: &Page, dpi: u32) -> Result<RasterImage, PageError> {
        let failed = |detail: String| PageError::RenderFailed {
            page: page.number,
            detail,
        };

        let pdfium = self.bind().map_err(&failed)?;
        let pdf = pdfium
            .load_pdf_from_byte_slice(document.bytes(), self.password.as_deref())
            .map_err(|e| failed(format!("{:?}", e)))?;
        let index = page_index(page.number).map_err(&failed)?;
        let pdf_page = pdf.pages().get(index).map_err(|e| failed(format!("{:?}", e)))?;

        let (width, height) = render_dimensions(page.width_pts, page.height_pts, dpi, self.max_rendered_pixels);
        let render_config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_maximum_height(height as i32);

        let bitmap = pdf_page
            .render_with_config(&render_config)
            .map_err(|e| failed(format!("{:?}", e)))?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} at {} DPI → {}x{} px",
            page.number,
            dpi,
            image.width(),
            image.height()
        );

        encode::encode_png(&image, page.number).map_err(|e| failed(format!("PNG encoding failed: {}", e)))
    }
}

/// pdfium's 0-based page index for 1-based page `number`.
fn page_index(number: usize) -> Result<u16, String> {
    number
        .checked_sub(1)
        .and_then(|i| u16::try_from(i).ok())
        .ok_or_else(|| format!("page {} is outside pdfium's addressable range", number))
}

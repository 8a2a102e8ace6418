//! Pipeline stages for scanned-PDF extraction.
//!
//! Each submodule implements one step; [`page`] drives them per page.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ llm ──▶ postprocess
//! (path/URL) (pdfium)   (PNG)     (VLM)   (cleanup)
//! ```
//!
//! 1. [`input`]: read the user-supplied path or URL into memory
//! 2. [`render`]: rasterise one page at the configured DPI; pdfium calls run
//!    in `spawn_blocking`
//! 3. [`encode`]: PNG-encode the bitmap and wrap it for the multimodal request
//! 4. [`llm`]: call the vision model with retry/backoff; the only stage
//!    with network I/O besides URL input
//! 5. [`postprocess`]: format-aware cleanup and the JSON validity check
//! 6. [`page`]: per-page state machine, failure isolation, run abort

pub mod encode;
pub mod input;
pub mod llm;
pub mod page;
pub mod postprocess;
pub mod render;

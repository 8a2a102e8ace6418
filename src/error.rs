//! Error types for the scan2text library.
//!
//! Three error types map onto three scopes of failure:
//!
//! * [`Scan2TextError`]: **Fatal**: the run cannot start or must stop
//!   (bad input file, invalid configuration, rejected credentials). Returned
//!   as `Err(Scan2TextError)` from the top-level `convert*` functions.
//!
//! * [`PageError`]: **Page-local**: one page failed to render or extract.
//!   Stored inside [`crate::output::ExtractionResult::Failure`] so the rest of
//!   the document is still delivered.
//!
//! * [`ExtractError`]: what the extraction client reports for a single
//!   request. The page pipeline turns it into a [`PageError`], and an
//!   [`ExtractError::Auth`] additionally aborts the run.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the scan2text library.
#[derive(Debug, Error)]
pub enum Scan2TextError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// The bytes were read, but they are not a PDF.
    #[error("Input '{input}' is not a PDF (first bytes: {magic:?})")]
    NotAPdf { input: String, magic: Vec<u8> },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF is corrupt: {detail}")]
    CorruptPdf { detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF is encrypted and requires a password (--password).")]
    PasswordRequired,

    /// A password was provided but it is wrong.
    #[error("Wrong password for encrypted PDF")]
    WrongPassword,

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH to the directory containing libpdfium, or install it system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Run parameters were rejected before any page was processed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Run-level errors ──────────────────────────────────────────────────
    /// Credentials were rejected; remaining pages were not attempted.
    #[error("Authentication rejected on page {page}: {detail}")]
    AuthError { page: usize, detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Scan2TextError {
    /// True for errors caused by invalid run parameters.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Scan2TextError::InvalidConfig(_) | Scan2TextError::ProviderNotConfigured { .. }
        )
    }
}

/// A page-local failure.
///
/// Never aborts the run on its own; see [`crate::output::RunAbort`] for the
/// one case ([`PageError::Auth`]) that also stops the remaining pages.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageError {
    /// The page could not be rasterised.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The upstream call kept failing transiently until retries ran out.
    #[error("Page {page}: extraction failed after {attempts} attempts: {detail}")]
    Transient {
        page: usize,
        attempts: u32,
        detail: String,
    },

    /// The model returned empty or unusable content.
    #[error("Page {page}: invalid model response: {detail}")]
    InvalidResponse { page: usize, detail: String },

    /// The provider rejected the credentials.
    #[error("Page {page}: authentication rejected: {detail}")]
    Auth { page: usize, detail: String },
}

impl PageError {
    /// The taxonomy name of this failure, as shown in placeholders and reports.
    pub fn kind(&self) -> &'static str {
        match self {
            PageError::RenderFailed { .. } => "RenderError",
            PageError::Transient { .. } => "TransientError",
            PageError::InvalidResponse { .. } => "InvalidResponseError",
            PageError::Auth { .. } => "AuthError",
        }
    }

    /// 1-based page number the error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::RenderFailed { page, .. }
            | PageError::Transient { page, .. }
            | PageError::InvalidResponse { page, .. }
            | PageError::Auth { page, .. } => *page,
        }
    }

    /// Human-readable reason without the page prefix.
    pub fn detail(&self) -> &str {
        match self {
            PageError::RenderFailed { detail, .. }
            | PageError::Transient { detail, .. }
            | PageError::InvalidResponse { detail, .. }
            | PageError::Auth { detail, .. } => detail,
        }
    }
}

/// Outcome of a failed extraction request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    /// Network, timeout or rate limit. Eligible for retry.
    #[error("transient upstream failure: {0}")]
    Transient(String),

    /// Transient failures persisted through every allowed attempt.
    #[error("gave up after {attempts} attempts: {detail}")]
    RetriesExhausted { attempts: u32, detail: String },

    /// Empty or structurally unusable response. Not retried.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Credentials rejected. Fatal to the whole run.
    #[error("authentication rejected: {0}")]
    Auth(String),
}

impl ExtractError {
    /// Attach the page number, producing the page-local error.
    pub fn into_page_error(self, page: usize) -> PageError {
        match self {
            ExtractError::Transient(detail) => PageError::Transient {
                page,
                attempts: 1,
                detail,
            },
            ExtractError::RetriesExhausted { attempts, detail } => PageError::Transient {
                page,
                attempts,
                detail,
            },
            ExtractError::InvalidResponse(detail) => PageError::InvalidResponse { page, detail },
            ExtractError::Auth(detail) => PageError::Auth { page, detail },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_error_kinds_match_taxonomy() {
        let render = PageError::RenderFailed {
            page: 2,
            detail: "bad xobject".into(),
        };
        assert_eq!(render.kind(), "RenderError");
        assert_eq!(render.page(), 2);
        assert_eq!(render.detail(), "bad xobject");

        let auth = ExtractError::Auth("401".into()).into_page_error(1);
        assert_eq!(auth.kind(), "AuthError");
    }

    #[test]
    fn retries_exhausted_keeps_attempt_count() {
        let e = ExtractError::RetriesExhausted {
            attempts: 3,
            detail: "HTTP 503".into(),
        }
        .into_page_error(4);
        assert_eq!(
            e,
            PageError::Transient {
                page: 4,
                attempts: 3,
                detail: "HTTP 503".into()
            }
        );
        assert!(e.to_string().contains("3 attempts"), "got: {e}");
    }

    #[test]
    fn config_errors_are_flagged() {
        assert!(Scan2TextError::InvalidConfig("dpi".into()).is_config_error());
        assert!(!Scan2TextError::PasswordRequired.is_config_error());
    }

    #[test]
    fn auth_error_display() {
        let e = Scan2TextError::AuthError {
            page: 1,
            detail: "invalid key".into(),
        };
        assert!(e.to_string().contains("page 1"));
        assert!(e.to_string().contains("invalid key"));
    }

    #[test]
    fn page_error_serialises_with_kind_tag() {
        let e = PageError::InvalidResponse {
            page: 3,
            detail: "empty".into(),
        };
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["kind"], "invalid_response");
        assert_eq!(json["page"], 3);
    }
}

//! Result types produced by a run.

use crate::aggregate::{self, AggregatedOutput};
use crate::config::OutputFormat;
use crate::error::{PageError, Scan2TextError};
use crate::pipeline::render::{Page, RasterImage};
use serde::Serialize;

/// A page that reached `Done`.
#[derive(Debug, Clone, Serialize)]
pub struct PageExtraction {
    /// 1-based page number.
    pub page_num: usize,
    pub format: OutputFormat,
    pub text: String,
    /// Set when the text does not satisfy the format contract (e.g. invalid JSON).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Model calls made for this page.
    pub attempts: u32,
    pub duration_ms: u64,
    /// The rendered page, when `RunConfig::retain_images` is set.
    #[serde(skip)]
    pub image: Option<RasterImage>,
}

/// Outcome for one selected page.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionResult {
    Success(PageExtraction),
    Failure { page_num: usize, error: PageError },
    /// The run was aborted before this page started.
    NotAttempted { page_num: usize },
}

impl ExtractionResult {
    pub fn page_num(&self) -> usize {
        match self {
            ExtractionResult::Success(p) => p.page_num,
            ExtractionResult::Failure { page_num, .. } | ExtractionResult::NotAttempted { page_num } => *page_num,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionResult::Success(_))
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            ExtractionResult::Success(p) => Some(&p.text),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&PageError> {
        match self {
            ExtractionResult::Failure { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Why a run stopped early.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunAbort {
    /// Page whose failure aborted the run.
    pub page_num: usize,
    pub reason: String,
}

/// Counters for a finished run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    /// Pages in the document.
    pub total_pages: usize,
    /// Pages selected for this run (one result each).
    pub selected_pages: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub not_attempted: usize,
    /// Successful pages that carry a format warning.
    pub warnings: usize,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_duration_ms: u64,
}

impl RunStats {
    /// Tally `results` for a document of `total_pages`.
    pub fn from_results(results: &[ExtractionResult], total_pages: usize, total_duration_ms: u64) -> Self {
        let mut stats = RunStats {
            total_pages,
            selected_pages: results.len(),
            total_duration_ms,
            ..Default::default()
        };
        for result in results {
            match result {
                ExtractionResult::Success(p) => {
                    stats.succeeded += 1;
                    stats.warnings += usize::from(p.warning.is_some());
                    stats.total_input_tokens += p.input_tokens;
                    stats.total_output_tokens += p.output_tokens;
                }
                ExtractionResult::Failure { .. } => stats.failed += 1,
                ExtractionResult::NotAttempted { .. } => stats.not_attempted += 1,
            }
        }
        stats
    }
}

/// Everything a run produced, pages in page order.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub format: OutputFormat,
    pub pages: Vec<ExtractionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<RunAbort>,
    pub stats: RunStats,
}

impl RunReport {
    /// The page-ordered combined view.
    pub fn aggregate(&self) -> AggregatedOutput {
        aggregate::aggregate(self.format, self.pages.iter().cloned())
    }

    /// The combined document in the run's format.
    pub fn document(&self) -> String {
        self.aggregate().render()
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    /// Surface an aborted run as its fatal error.
    pub fn into_result(self) -> Result<RunReport, Scan2TextError> {
        match self.aborted {
            Some(RunAbort { page_num, reason }) => Err(Scan2TextError::AuthError {
                page: page_num,
                detail: reason,
            }),
            None => Ok(self),
        }
    }
}

/// Page list of a PDF, from [`crate::inspect`].
#[derive(Debug, Clone, Serialize)]
pub struct DocumentInfo {
    pub page_count: usize,
    pub pages: Vec<Page>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success(page_num: usize, warning: Option<&str>) -> ExtractionResult {
        ExtractionResult::Success(PageExtraction {
            page_num,
            format: OutputFormat::Json,
            text: "{}".into(),
            warning: warning.map(String::from),
            input_tokens: 100,
            output_tokens: 20,
            attempts: 1,
            duration_ms: 5,
            image: None,
        })
    }

    #[test]
    fn stats_tally_each_outcome() {
        let results = vec![
            success(1, None),
            success(2, Some("not valid JSON")),
            ExtractionResult::Failure {
                page_num: 3,
                error: PageError::RenderFailed {
                    page: 3,
                    detail: "bad".into(),
                },
            },
            ExtractionResult::NotAttempted { page_num: 4 },
        ];
        let stats = RunStats::from_results(&results, 10, 42);
        assert_eq!(stats.total_pages, 10);
        assert_eq!(stats.selected_pages, 4);
        assert_eq!((stats.succeeded, stats.failed, stats.not_attempted), (2, 1, 1));
        assert_eq!(stats.warnings, 1);
        assert_eq!(stats.total_input_tokens, 200);
        assert_eq!(stats.total_output_tokens, 40);
    }

    #[test]
    fn aborted_report_into_result_is_auth_error() {
        let report = RunReport {
            format: OutputFormat::Markdown,
            pages: vec![],
            aborted: Some(RunAbort {
                page_num: 1,
                reason: "invalid key".into(),
            }),
            stats: RunStats::default(),
        };
        let err = report.into_result().unwrap_err();
        assert!(matches!(err, Scan2TextError::AuthError { page: 1, .. }));
    }

    #[test]
    fn result_serialises_with_status_tag() {
        let json = serde_json::to_value(ExtractionResult::NotAttempted { page_num: 2 }).unwrap();
        assert_eq!(json["status"], "not_attempted");
        assert_eq!(json["page_num"], 2);

        let json = serde_json::to_value(success(1, None)).unwrap();
        assert_eq!(json["status"], "success");
        assert!(json.get("warning").is_none());
        assert!(json.get("image").is_none());
    }
}

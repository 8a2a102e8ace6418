//! Page pipeline: Rasterizer → Prompt Builder → Extraction Client, per page.
//!
//! Every selected page walks an explicit state machine:
//!
//! ```text
//! Pending ──▶ Rendering ──▶ Extracting ──▶ Done
//!    │            │              │
//!    │            └──────────────┴──────▶ Failed
//!    └──▶ NotAttempted   (run already aborted)
//! ```
//!
//! A page failure is recorded in that page's result and never touches the
//! others. The single exception is a rejected credential: it sets the run's
//! abort signal, and pages that have not left `Pending` yet are reported as
//! `NotAttempted`. Pages already in flight finish normally.

use crate::config::RunConfig;
use crate::error::{ExtractError, PageError, Scan2TextError};
use crate::output::{ExtractionResult, PageExtraction, RunAbort, RunReport, RunStats};
use crate::pipeline::llm::{ExtractionClient, VisionModel};
use crate::pipeline::postprocess;
use crate::pipeline::render::{self, Document, Rasterizer};
use crate::prompts::build_prompt;
use crate::stream::PageStream;
use futures::stream::{self, StreamExt};
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Where a page is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageState {
    Pending,
    Rendering,
    Extracting,
    Done,
    Failed,
    NotAttempted,
}

impl PageState {
    /// Whether `self → next` is an edge of the page lifecycle.
    pub fn can_transition_to(self, next: PageState) -> bool {
        use PageState::*;
        matches!(
            (self, next),
            (Pending, Rendering)
                | (Pending, NotAttempted)
                | (Rendering, Extracting)
                | (Rendering, Failed)
                | (Extracting, Done)
                | (Extracting, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PageState::Done | PageState::Failed | PageState::NotAttempted)
    }
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PageState::Pending => "pending",
            PageState::Rendering => "rendering",
            PageState::Extracting => "extracting",
            PageState::Done => "done",
            PageState::Failed => "failed",
            PageState::NotAttempted => "not attempted",
        };
        f.write_str(name)
    }
}

/// A transition outside the page lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IllegalTransition {
    pub page_num: usize,
    pub from: PageState,
    pub to: PageState,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page {}: illegal transition {} → {}", self.page_num, self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// The current state of one page.
#[derive(Debug)]
pub struct PageTracker {
    page_num: usize,
    state: PageState,
}

impl PageTracker {
    pub fn new(page_num: usize) -> Self {
        Self {
            page_num,
            state: PageState::Pending,
        }
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    /// Move to `next`. Illegal transitions leave the state unchanged.
    pub fn advance(&mut self, next: PageState) -> Result<(), IllegalTransition> {
        if !self.state.can_transition_to(next) {
            return Err(IllegalTransition {
                page_num: self.page_num,
                from: self.state,
                to: next,
            });
        }
        debug!("Page {}: {} → {}", self.page_num, self.state, next);
        self.state = next;
        Ok(())
    }

    /// `advance` along an edge the pipeline knows to be legal.
    fn enter(&mut self, next: PageState) {
        let result = self.advance(next);
        debug_assert!(result.is_ok(), "{result:?}");
        if let Err(e) = result {
            error!("{}", e);
        }
    }
}

struct Inner {
    config: RunConfig,
    rasterizer: Arc<dyn Rasterizer>,
    client: ExtractionClient,
}

/// Runs the selected pages of a document through extraction.
///
/// Cheap to clone; one pipeline can serve several runs.
#[derive(Clone)]
pub struct PagePipeline {
    inner: Arc<Inner>,
}

impl PagePipeline {
    /// Validates `config` before anything else happens.
    pub fn new(
        config: RunConfig,
        rasterizer: Arc<dyn Rasterizer>,
        model: Arc<dyn VisionModel>,
    ) -> Result<Self, Scan2TextError> {
        config.validate()?;
        let client = ExtractionClient::from_config(model, &config);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                rasterizer,
                client,
            }),
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.inner.config
    }

    /// Process every selected page and collect the results in page order.
    ///
    /// Pages run `concurrency` at a time and complete in any order; the
    /// report is sorted before it is returned.
    pub async fn run(&self, document: Arc<Document>) -> RunReport {
        let started = Instant::now();
        let config = &self.inner.config;
        let numbers = config.pages.to_page_numbers(document.page_count());
        let selected = numbers.len();
        let abort: Arc<OnceLock<RunAbort>> = Arc::new(OnceLock::new());

        info!(
            "Processing {} of {} pages as {} (concurrency {})",
            selected,
            document.page_count(),
            config.format,
            config.concurrency
        );
        if let Some(ref cb) = config.progress_callback {
            cb.on_conversion_start(selected);
        }

        let mut pages: Vec<ExtractionResult> = stream::iter(numbers.into_iter().map(|page_num| {
            let this = self.clone();
            let document = Arc::clone(&document);
            let abort = Arc::clone(&abort);
            async move { this.process_page(&document, page_num, selected, &abort).await }
        }))
        .buffer_unordered(config.concurrency)
        .collect()
        .await;
        pages.sort_by_key(ExtractionResult::page_num);

        let stats = RunStats::from_results(&pages, document.page_count(), started.elapsed().as_millis() as u64);
        let aborted = abort.get().cloned();

        match &aborted {
            Some(a) => error!(
                "Run aborted at page {}: {} ({} pages not attempted)",
                a.page_num, a.reason, stats.not_attempted
            ),
            None => info!(
                "Run complete: {}/{} pages succeeded, {} failed, {}ms",
                stats.succeeded, selected, stats.failed, stats.total_duration_ms
            ),
        }
        if let Some(ref cb) = config.progress_callback {
            cb.on_conversion_complete(selected, stats.succeeded);
        }

        RunReport {
            format: config.format,
            pages,
            aborted,
            stats,
        }
    }

    /// Process the selected pages, yielding each result in page order.
    ///
    /// Up to `concurrency` pages are in flight; a finished page is held back
    /// until every earlier page has been yielded.
    pub fn stream(&self, document: Arc<Document>) -> PageStream {
        let numbers = self.inner.config.pages.to_page_numbers(document.page_count());
        let selected = numbers.len();
        let concurrency = self.inner.config.concurrency;
        let abort: Arc<OnceLock<RunAbort>> = Arc::new(OnceLock::new());
        let this = self.clone();

        let s = stream::iter(numbers)
            .map(move |page_num| {
                let this = this.clone();
                let document = Arc::clone(&document);
                let abort = Arc::clone(&abort);
                async move { this.process_page(&document, page_num, selected, &abort).await }
            })
            .buffered(concurrency);
        Box::pin(s)
    }

    async fn process_page(
        &self,
        document: &Arc<Document>,
        page_num: usize,
        total: usize,
        abort: &OnceLock<RunAbort>,
    ) -> ExtractionResult {
        let config = &self.inner.config;
        let mut tracker = PageTracker::new(page_num);

        if let Some(a) = abort.get() {
            tracker.enter(PageState::NotAttempted);
            debug!("Page {}: skipped, run aborted at page {}", page_num, a.page_num);
            return ExtractionResult::NotAttempted { page_num };
        }

        if let Some(ref cb) = config.progress_callback {
            cb.on_page_start(page_num, total);
        }
        let started = Instant::now();
        tracker.enter(PageState::Rendering);

        let Some(page) = document.page(page_num).copied() else {
            let error = PageError::RenderFailed {
                page: page_num,
                detail: format!("document has only {} pages", document.page_count()),
            };
            return self.fail(&mut tracker, error, total);
        };

        let image = match render::rasterize_page(
            Arc::clone(&self.inner.rasterizer),
            Arc::clone(document),
            page,
            config.dpi,
        )
        .await
        {
            Ok(image) => image,
            Err(e) => return self.fail(&mut tracker, e, total),
        };

        tracker.enter(PageState::Extracting);
        let instructions = build_prompt(page_num, config.format);
        let extracted = match self.inner.client.extract(&image, &instructions).await {
            Ok(extracted) => extracted,
            Err(e) => {
                if let ExtractError::Auth(reason) = &e {
                    let first = abort
                        .set(RunAbort {
                            page_num,
                            reason: reason.clone(),
                        })
                        .is_ok();
                    if first {
                        error!("Page {}: credentials rejected, aborting run", page_num);
                    }
                }
                return self.fail(&mut tracker, e.into_page_error(page_num), total);
            }
        };

        let text = if config.clean_output {
            postprocess::clean_output(&extracted.text, config.format)
        } else {
            extracted.text
        };
        if text.trim().is_empty() {
            let error = PageError::InvalidResponse {
                page: page_num,
                detail: "response was empty after cleanup".into(),
            };
            return self.fail(&mut tracker, error, total);
        }

        let warning = postprocess::check_format(&text, config.format);
        if let Some(ref w) = warning {
            warn!("Page {}: {}", page_num, w);
        }

        tracker.enter(PageState::Done);
        if let Some(ref cb) = config.progress_callback {
            cb.on_page_complete(page_num, total, text.len());
        }

        ExtractionResult::Success(PageExtraction {
            page_num,
            format: config.format,
            text,
            warning,
            input_tokens: extracted.input_tokens,
            output_tokens: extracted.output_tokens,
            attempts: extracted.attempts,
            duration_ms: started.elapsed().as_millis() as u64,
            image: config.retain_images.then_some(image),
        })
    }

    fn fail(&self, tracker: &mut PageTracker, error: PageError, total: usize) -> ExtractionResult {
        tracker.enter(PageState::Failed);
        warn!("{}", error);
        if let Some(ref cb) = self.inner.config.progress_callback {
            cb.on_page_error(error.page(), total, &error.to_string());
        }
        ExtractionResult::Failure {
            page_num: error.page(),
            error,
        }
    }
}

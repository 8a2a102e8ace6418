//! Result aggregation: page-ordered combined view of a run.
//!
//! Results may arrive in completion order when pages run concurrently;
//! [`aggregate`] is the single place that restores page order. Each page
//! stays independent: successful text is passed through untouched and
//! tagged with its format, failed or skipped pages become placeholders.

use crate::config::OutputFormat;
use crate::output::ExtractionResult;
use serde_json::{json, Value};

/// How a page ended up in the combined view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockStatus {
    Success,
    Failed { kind: &'static str },
    NotAttempted,
}

/// One page of the combined view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageBlock {
    pub page_num: usize,
    pub status: BlockStatus,
    /// Code-block language for rendering successful text (`None` for plaintext).
    pub language: Option<&'static str>,
    /// Extracted text, or the placeholder message.
    pub body: String,
    pub warning: Option<String>,
}

/// Page-ordered blocks for one format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedOutput {
    pub format: OutputFormat,
    pub blocks: Vec<PageBlock>,
}

/// Order `results` by page number and convert them to blocks.
pub fn aggregate(format: OutputFormat, results: impl IntoIterator<Item = ExtractionResult>) -> AggregatedOutput {
    let mut results: Vec<ExtractionResult> = results.into_iter().collect();
    results.sort_by_key(ExtractionResult::page_num);

    let blocks = results
        .into_iter()
        .map(|result| match result {
            ExtractionResult::Success(page) => PageBlock {
                page_num: page.page_num,
                status: BlockStatus::Success,
                language: page.format.code_language(),
                body: page.text,
                warning: page.warning,
            },
            ExtractionResult::Failure { page_num, error } => PageBlock {
                page_num,
                status: BlockStatus::Failed { kind: error.kind() },
                language: None,
                body: format!("Page {} failed ({}): {}", page_num, error.kind(), error.detail()),
                warning: None,
            },
            ExtractionResult::NotAttempted { page_num } => PageBlock {
                page_num,
                status: BlockStatus::NotAttempted,
                language: None,
                body: format!("Page {} not attempted: run aborted", page_num),
                warning: None,
            },
        })
        .collect();

    AggregatedOutput { format, blocks }
}

impl AggregatedOutput {
    /// Render the combined document.
    pub fn render(&self) -> String {
        match self.format {
            OutputFormat::Markdown => self.render_markdown(),
            OutputFormat::Html => self.render_html(),
            OutputFormat::Plaintext => self.render_plaintext(),
            OutputFormat::Json => self.render_json(),
        }
    }

    fn render_markdown(&self) -> String {
        let parts: Vec<String> = self
            .blocks
            .iter()
            .map(|b| match b.status {
                BlockStatus::Success => format!("<!-- page {} -->\n\n{}", b.page_num, b.body),
                _ => format!("<!-- page {} -->\n\n> **{}**", b.page_num, b.body),
            })
            .collect();
        finish(parts.join("\n\n"))
    }

    fn render_html(&self) -> String {
        let parts: Vec<String> = self
            .blocks
            .iter()
            .map(|b| match b.status {
                BlockStatus::Success => {
                    format!("<section data-page=\"{}\">\n{}\n</section>", b.page_num, b.body)
                }
                BlockStatus::Failed { .. } => format!(
                    "<section data-page=\"{}\" class=\"page-failed\">\n<p>{}</p>\n</section>",
                    b.page_num,
                    escape_html(&b.body)
                ),
                BlockStatus::NotAttempted => format!(
                    "<section data-page=\"{}\" class=\"page-skipped\">\n<p>{}</p>\n</section>",
                    b.page_num,
                    escape_html(&b.body)
                ),
            })
            .collect();
        finish(parts.join("\n"))
    }

    fn render_plaintext(&self) -> String {
        let parts: Vec<String> = self
            .blocks
            .iter()
            .map(|b| match b.status {
                BlockStatus::Success => format!("===== Page {} =====\n{}", b.page_num, b.body),
                _ => format!("===== Page {} =====\n[{}]", b.page_num, b.body),
            })
            .collect();
        finish(parts.join("\n\n"))
    }

    /// JSON array; page text that parses as JSON is embedded as a value.
    fn render_json(&self) -> String {
        let pages: Vec<Value> = self
            .blocks
            .iter()
            .map(|b| match &b.status {
                BlockStatus::Success => {
                    let content = serde_json::from_str::<Value>(&b.body).unwrap_or_else(|_| Value::String(b.body.clone()));
                    let mut page = json!({ "page": b.page_num, "status": "success", "content": content });
                    if let Some(w) = &b.warning {
                        page["warning"] = Value::String(w.clone());
                    }
                    page
                }
                BlockStatus::Failed { kind } => {
                    json!({ "page": b.page_num, "status": "failed", "error_kind": kind, "error": b.body })
                }
                BlockStatus::NotAttempted => json!({ "page": b.page_num, "status": "not_attempted" }),
            })
            .collect();
        let doc = Value::Array(pages);
        serde_json::to_string_pretty(&doc).unwrap_or_else(|_| doc.to_string())
    }
}

fn finish(mut s: String) -> String {
    if !s.is_empty() {
        s.push('\n');
    }
    s
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PageError;
    use crate::output::PageExtraction;

    fn ok(page_num: usize, format: OutputFormat, text: &str) -> ExtractionResult {
        ExtractionResult::Success(PageExtraction {
            page_num,
            format,
            text: text.into(),
            warning: None,
            input_tokens: 0,
            output_tokens: 0,
            attempts: 1,
            duration_ms: 0,
            image: None,
        })
    }

    fn failed(page_num: usize) -> ExtractionResult {
        ExtractionResult::Failure {
            page_num,
            error: PageError::InvalidResponse {
                page: page_num,
                detail: "model returned <nothing>".into(),
            },
        }
    }

    #[test]
    fn restores_page_order() {
        let out = aggregate(
            OutputFormat::Plaintext,
            vec![ok(3, OutputFormat::Plaintext, "c"), failed(1), ok(2, OutputFormat::Plaintext, "b")],
        );
        let order: Vec<usize> = out.blocks.iter().map(|b| b.page_num).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn failures_become_placeholders() {
        let out = aggregate(OutputFormat::Markdown, vec![failed(2)]);
        let block = &out.blocks[0];
        assert_eq!(block.status, BlockStatus::Failed { kind: "InvalidResponseError" });
        assert!(block.body.contains("Page 2 failed"));
        assert!(out.render().contains("> **Page 2 failed (InvalidResponseError)"));
    }

    #[test]
    fn success_blocks_are_tagged_with_format() {
        let out = aggregate(OutputFormat::Html, vec![ok(1, OutputFormat::Html, "<p>x</p>")]);
        assert_eq!(out.blocks[0].language, Some("html"));
        assert_eq!(out.render(), "<section data-page=\"1\">\n<p>x</p>\n</section>\n");
    }

    #[test]
    fn html_placeholders_are_escaped() {
        let rendered = aggregate(OutputFormat::Html, vec![failed(1)]).render();
        assert!(rendered.contains("&lt;nothing&gt;"));
        assert!(rendered.contains("class=\"page-failed\""));
    }

    #[test]
    fn plaintext_has_page_banners() {
        let rendered = aggregate(
            OutputFormat::Plaintext,
            vec![ok(1, OutputFormat::Plaintext, "one"), ExtractionResult::NotAttempted { page_num: 2 }],
        )
        .render();
        assert_eq!(
            rendered,
            "===== Page 1 =====\none\n\n===== Page 2 =====\n[Page 2 not attempted: run aborted]\n"
        );
    }

    #[test]
    fn json_embeds_valid_content_and_strings_otherwise() {
        let rendered = aggregate(
            OutputFormat::Json,
            vec![
                ok(1, OutputFormat::Json, "{\"title\": \"Invoice\"}"),
                ok(2, OutputFormat::Json, "not json"),
                failed(3),
            ],
        )
        .render();
        let doc: Value = serde_json::from_str(&rendered).expect("combined JSON must parse");
        assert_eq!(doc[0]["content"]["title"], "Invoice");
        assert_eq!(doc[1]["content"], "not json");
        assert_eq!(doc[2]["status"], "failed");
        assert_eq!(doc[2]["error_kind"], "InvalidResponseError");
    }

    #[test]
    fn empty_run_renders_empty_document() {
        assert_eq!(aggregate(OutputFormat::Markdown, vec![]).render(), "");
        assert_eq!(aggregate(OutputFormat::Json, vec![]).render(), "[]");
    }
}

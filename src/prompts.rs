//! Prompts sent to the vision model.
//!
//! The system prompt carries the role guidance; [`build_prompt`] produces the
//! per-page instruction that pins the output contract for the chosen format.
//! Both are plain data so tests can inspect them without a model.

use crate::config::OutputFormat;

/// Default role guidance, used when `RunConfig::system_prompt` is `None`.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert document transcription assistant. \
You receive the image of one page of a scanned PDF and extract its text content faithfully, \
in the reading order a human would use, structured exactly as requested. \
You never invent content that is not visible on the page and you never add commentary.";

/// Format-specific output rules.
fn format_rules(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::Json => {
            "- Output syntactically valid JSON only.\n\
             - Do NOT wrap the JSON in code fences and do NOT add any prose before or after it.\n\
             - Use an object with a \"page\" number and a \"content\" array of blocks \
               (headings, paragraphs, lists, tables) that mirrors the page structure."
        }
        OutputFormat::Markdown => {
            "- Use Markdown syntax: # headings by level, - or 1. for lists, GFM pipe tables.\n\
             - Use **bold** and *italic* where the page shows emphasis.\n\
             - Do NOT wrap the output in ```markdown fences."
        }
        OutputFormat::Html => {
            "- Output valid HTML markup (h1–h6, p, ul/ol/li, table) for the page body only.\n\
             - Do NOT include <html>, <head> or <body> wrappers.\n\
             - Do NOT add commentary, explanations or code fences."
        }
        OutputFormat::Plaintext => {
            "- Output clean, readable plain text.\n\
             - Do NOT use any markup: no Markdown, no HTML, no code fences.\n\
             - Separate paragraphs with a blank line; keep list items on their own lines."
        }
    }
}

/// Build the instruction for page `page_num` (1-based) in `format`.
///
/// Pure: identical inputs always give identical output.
pub fn build_prompt(page_num: usize, format: OutputFormat) -> String {
    format!(
        "Extract the text content from the image of page {page_num} of a scanned PDF document \
and convert it into {name} format.\n\n\
Instructions:\n\
- Preserve all visible text; skip running headers, footers and page numbers.\n\
{rules}\n\n\
Begin output below:",
        name = format.name(),
        rules = format_rules(format),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_page_and_format() {
        let p = build_prompt(7, OutputFormat::Html);
        assert!(p.contains("page 7"));
        assert!(p.contains("HTML format"));
    }

    #[test]
    fn json_prompt_forbids_prose() {
        let p = build_prompt(1, OutputFormat::Json);
        assert!(p.contains("valid JSON only"));
        assert!(p.contains("prose"));
    }

    #[test]
    fn plaintext_prompt_forbids_markup() {
        let p = build_prompt(1, OutputFormat::Plaintext);
        assert!(p.contains("no Markdown"));
        assert!(p.contains("no HTML"));
    }

    #[test]
    fn markdown_prompt_mentions_tables_and_headings() {
        let p = build_prompt(2, OutputFormat::Markdown);
        assert!(p.contains("headings"));
        assert!(p.contains("tables"));
    }

    #[test]
    fn prompt_is_deterministic_and_distinct_per_format() {
        for format in OutputFormat::ALL {
            assert_eq!(build_prompt(3, format), build_prompt(3, format));
        }
        assert_ne!(
            build_prompt(3, OutputFormat::Json),
            build_prompt(3, OutputFormat::Html)
        );
    }
}

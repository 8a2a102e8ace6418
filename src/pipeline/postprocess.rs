//! Post-processing: deterministic, format-aware cleanup of model output.
//!
//! Even with explicit instructions, models wrap answers in code fences, emit
//! CRLF line endings, leave zero-width characters behind, or drop the
//! separator row of a Markdown table. These passes fix such artefacts without
//! touching content. Rules that only make sense for one format (heading
//! spacing, table repair) run only for that format; JSON is never reflowed.
//!
//! [`check_format`] is the validity sanity check: it reports problems as a
//! warning string and never fails the page.

use crate::config::OutputFormat;
use once_cell::sync::Lazy;
use regex::Regex;

/// Clean raw model output for `format`.
///
/// Order matters: fences are stripped before line handling so the fence
/// regex sees the original text, and blank-line collapsing runs after
/// trailing whitespace is gone.
pub fn clean_output(input: &str, format: OutputFormat) -> String {
    let s = strip_outer_fence(input);
    let s = remove_invisible_chars(&normalise_line_endings(&s));
    match format {
        OutputFormat::Json => s.trim().to_string(),
        OutputFormat::Html => collapse_blank_lines(&trim_trailing_whitespace(&s)).trim().to_string(),
        OutputFormat::Plaintext => collapse_blank_lines(&trim_trailing_whitespace(&s)).trim().to_string(),
        OutputFormat::Markdown => {
            let s = trim_trailing_whitespace(&s);
            let s = space_headings(&s);
            let s = insert_missing_table_separators(&s);
            collapse_blank_lines(&s).trim().to_string()
        }
    }
}

/// Validity warning for `text` in `format`, if any.
pub fn check_format(text: &str, format: OutputFormat) -> Option<String> {
    match format {
        OutputFormat::Json => serde_json::from_str::<serde_json::Value>(text)
            .err()
            .map(|e| format!("response is not valid JSON: {e}")),
        _ => None,
    }
}

// ── Fences ───────────────────────────────────────────────────────────────

static RE_OUTER_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").unwrap());

/// Remove one code fence that wraps the whole answer (```json … ```).
///
/// A body with fence lines of its own means the answer opens and closes with
/// separate code blocks; that is content and stays.
fn strip_outer_fence(input: &str) -> String {
    let trimmed = input.trim();
    match RE_OUTER_FENCE.captures(trimmed) {
        Some(caps) if !caps[1].lines().any(|l| l.trim_start().starts_with("```")) => caps[1].to_string(),
        _ => trimmed.to_string(),
    }
}

// ── Whitespace ───────────────────────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn trim_trailing_whitespace(input: &str) -> String {
    input.lines().map(str::trim_end).collect::<Vec<_>>().join("\n")
}

static RE_BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// At most one empty line between blocks.
fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_RUN.replace_all(input, "\n\n").into_owned()
}

/// Zero-width spaces/joiners, word joiner, BOM, soft hyphen.
fn remove_invisible_chars(input: &str) -> String {
    input.replace(['\u{200B}', '\u{200C}', '\u{200D}', '\u{2060}', '\u{FEFF}', '\u{00AD}'], "")
}

// ── Markdown ─────────────────────────────────────────────────────────────

static RE_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,6}\s").unwrap());

/// Blank line before every ATX heading that follows other content.
fn space_headings(input: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for line in input.lines() {
        if RE_HEADING.is_match(line) && out.last().is_some_and(|prev| !prev.is_empty()) {
            out.push("");
        }
        out.push(line);
    }
    out.join("\n")
}

fn is_table_row(line: &str) -> bool {
    let t = line.trim();
    t.len() > 2 && t.starts_with('|') && t.ends_with('|')
}

fn is_separator_row(line: &str) -> bool {
    is_table_row(line)
        && line.contains('-')
        && line.trim().chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

/// A GFM table needs `| --- |` after its header row; add it when missing.
fn insert_missing_table_separators(input: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        out.push((*line).to_string());
        let starts_table = is_table_row(line)
            && !is_separator_row(line)
            && (i == 0 || !is_table_row(lines[i - 1]));
        let next = lines.get(i + 1).copied().unwrap_or("");
        if starts_table && is_table_row(next) && !is_separator_row(next) {
            let columns = line.trim().matches('|').count().saturating_sub(1).max(1);
            out.push(format!("|{}", " --- |".repeat(columns)));
        }
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_language_tagged_fence() {
        assert_eq!(strip_outer_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_outer_fence("```\nplain\n```\n"), "plain");
        assert_eq!(strip_outer_fence("no fence"), "no fence");
    }

    #[test]
    fn inner_fences_are_kept() {
        let md = "Intro\n\n```rust\nfn main() {}\n```\n\nOutro";
        assert_eq!(strip_outer_fence(md), md);
    }

    #[test]
    fn leading_and_trailing_code_blocks_are_not_an_outer_fence() {
        let md = "```\nfirst block\n```\n\nProse between.\n\n```\nsecond block\n```";
        assert_eq!(strip_outer_fence(md), md);
        assert_eq!(clean_output(md, OutputFormat::Markdown), md);
    }

    #[test]
    fn json_is_only_unfenced_and_trimmed() {
        let raw = "```json\r\n{\n  \"page\": 1\n}\r\n```";
        assert_eq!(clean_output(raw, OutputFormat::Json), "{\n  \"page\": 1\n}");
    }

    #[test]
    fn plaintext_whitespace_is_normalised() {
        let raw = "Line one   \r\n\r\n\r\n\r\nLine\u{200B} two  ";
        assert_eq!(clean_output(raw, OutputFormat::Plaintext), "Line one\n\nLine two");
    }

    #[test]
    fn markdown_headings_get_spacing() {
        let out = clean_output("text\n## Section\nbody", OutputFormat::Markdown);
        assert_eq!(out, "text\n\n## Section\nbody");
    }

    #[test]
    fn markdown_table_gets_separator() {
        let out = clean_output("| A | B |\n| 1 | 2 |", OutputFormat::Markdown);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(is_separator_row(lines[1]), "got {:?}", lines[1]);
    }

    #[test]
    fn complete_table_is_untouched() {
        let table = "| A | B |\n| --- | --- |\n| 1 | 2 |\n| 3 | 4 |";
        assert_eq!(clean_output(table, OutputFormat::Markdown), table);
    }

    #[test]
    fn html_is_not_heading_spaced() {
        let out = clean_output("<p>a</p>\n# not a heading", OutputFormat::Html);
        assert_eq!(out, "<p>a</p>\n# not a heading");
    }

    #[test]
    fn json_check_warns_without_failing() {
        assert!(check_format("{\"ok\": true}", OutputFormat::Json).is_none());
        let warning = check_format("Here is the JSON: {", OutputFormat::Json).unwrap();
        assert!(warning.contains("not valid JSON"));
        assert!(check_format("Here is the JSON: {", OutputFormat::Markdown).is_none());
    }
}

//! Heading-aware segmentation of page text into bounded context windows.
//!
//! Each paragraph stays attached to the last heading seen above it, so a
//! pattern searching one window never straddles an unrelated section.
//! Oversized sections fall back to sentence groups.

use crate::config::WindowConfig;
use crate::schema::{Page, Window};
use regex::Regex;
use std::sync::LazyLock;
use unicode_segmentation::UnicodeSegmentation;

/// Numbered ("5.", "5.1"), lettered ("A.", "(b)") or worded ("Article IV",
/// "Section 2") markers followed by a capitalized label.
static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:\d+(?:\.\d+)*\.?|[A-Z]\.|\([A-Za-z0-9]{1,4}\)|(?:Article|Section|Clause|ARTICLE|SECTION|CLAUSE)(?:\s+[0-9IVXLC]+(?:\.\d+)*[.:]?)?)\s+[A-Z][^\n]*$",
    )
    .expect("heading regex is valid")
});

/// Segment every page, preserving page order.
pub fn segment_pages(pages: &[Page], config: &WindowConfig) -> Vec<Window> {
    pages
        .iter()
        .flat_map(|page| segment_page(page, config))
        .collect()
}

/// Segment one page into windows tagged with its page number.
pub fn segment_page(page: &Page, config: &WindowConfig) -> Vec<Window> {
    let config = config.validated();
    let mut windows = Vec::new();

    for (heading, paragraph) in split_sections(&page.text) {
        let chunk = match &heading {
            Some(h) => format!("{}\n\n{}", h, paragraph),
            None => paragraph.clone(),
        };

        if char_len(&chunk) <= config.max_chars_sparse {
            push_window(&mut windows, page.page_number, chunk, &heading);
            continue;
        }

        let body = match &heading {
            Some(h) if char_len(h) <= config.max_chars_dense => {
                push_window(&mut windows, page.page_number, h.clone(), &heading);
                paragraph
            }
            _ => chunk,
        };

        for group in pack_sentences(&body, &config) {
            push_window(&mut windows, page.page_number, group, &heading);
        }
    }

    windows
}

/// Pair every paragraph buffer with the heading in scope above it.
fn split_sections(text: &str) -> Vec<(Option<String>, String)> {
    let mut sections = Vec::new();
    let mut heading: Option<String> = None;
    let mut buffer = String::new();

    for line in text.split_inclusive('\n') {
        if HEADING_RE.is_match(line.trim_end_matches(['\n', '\r'])) {
            flush(&mut sections, &heading, &mut buffer);
            heading = Some(line.trim().to_string());
        } else {
            buffer.push_str(line);
        }
    }
    flush(&mut sections, &heading, &mut buffer);

    sections
}

fn flush(sections: &mut Vec<(Option<String>, String)>, heading: &Option<String>, buffer: &mut String) {
    let paragraph = buffer.trim();
    if !paragraph.is_empty() {
        sections.push((heading.clone(), paragraph.to_string()));
    }
    buffer.clear();
}

/// Greedily pack sentences into groups bounded by `max_chars_dense` and
/// `max_sentences`. A sentence longer than the bound is hard-sliced.
fn pack_sentences(text: &str, config: &WindowConfig) -> Vec<String> {
    let sentences: Vec<&str> = text
        .unicode_sentences()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let mut groups = Vec::new();
    let mut idx = 0;

    while idx < sentences.len() {
        let mut group = String::new();
        let mut count = 0;

        while idx < sentences.len() && count < config.max_sentences {
            let sentence = sentences[idx];
            let candidate_len = if group.is_empty() {
                char_len(sentence)
            } else {
                char_len(&group) + 1 + char_len(sentence)
            };
            if candidate_len > config.max_chars_dense {
                break;
            }
            if !group.is_empty() {
                group.push(' ');
            }
            group.push_str(sentence);
            count += 1;
            idx += 1;
        }

        if count > 0 {
            groups.push(group);
        } else {
            // Emergency slice: one sentence alone exceeds the dense bound.
            groups.push(sentences[idx].chars().take(config.max_chars_dense).collect());
            idx += 1;
        }
    }

    groups
}

fn push_window(windows: &mut Vec<Window>, page_number: u32, text: String, heading: &Option<String>) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    windows.push(Window {
        page_number,
        text: text.to_string(),
        heading: heading.clone(),
    });
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

impl WindowConfig {
    /// Clamp the bounds into a usable shape: at least one sentence per group
    /// and a dense bound no larger than the sparse one.
    pub fn validated(&self) -> WindowConfig {
        let max_sentences = self.max_sentences.max(self.min_sentences).max(1);
        let max_chars_sparse = self.max_chars_sparse.max(1);
        WindowConfig {
            min_sentences: self.min_sentences.min(max_sentences),
            max_sentences,
            max_chars_dense: self.max_chars_dense.clamp(1, max_chars_sparse),
            max_chars_sparse,
        }
    }
}

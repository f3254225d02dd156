//! Page and snippet attribution for extracted values.
//!
//! Values are matched against a normalized form of each page (punctuation
//! stripped, whitespace collapsed, lowercased) while snippets are always cut
//! from the original page text, so a reported snippet is a literal excerpt.

use crate::schema::Page;
use tracing::debug;

/// Characters of context kept on each side of a match.
pub const DEFAULT_SNIPPET_RADIUS: usize = 180;

const MAX_PREFIX_TOKENS: usize = 6;
const MIN_PREFIX_TOKENS: usize = 3;

/// Resolved provenance of a value. Both parts are advisory and may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attribution {
    pub page_number: Option<u32>,
    pub snippet: Option<String>,
}

impl Attribution {
    pub fn none() -> Self {
        Self::default()
    }
}

/// Text in normalized form, with a map back to byte ranges of the original.
struct NormalizedText {
    text: String,
    /// For each byte of `text`, the original byte range of the char it came from.
    spans: Vec<(usize, usize)>,
}

impl NormalizedText {
    fn new(original: &str) -> Self {
        let mut text = String::with_capacity(original.len());
        let mut spans = Vec::with_capacity(original.len());
        let mut pending_space = false;

        for (start, c) in original.char_indices() {
            if c.is_whitespace() {
                pending_space = !text.is_empty();
                continue;
            }
            if !c.is_alphanumeric() {
                continue;
            }
            if pending_space {
                text.push(' ');
                spans.push((start, start));
                pending_space = false;
            }
            let end = start + c.len_utf8();
            for lower in c.to_lowercase() {
                text.push(lower);
                spans.extend(std::iter::repeat((start, end)).take(lower.len_utf8()));
            }
        }

        Self { text, spans }
    }

    /// Original byte range covering the first occurrence of `needle`.
    fn find(&self, needle: &str) -> Option<(usize, usize)> {
        if needle.is_empty() {
            return None;
        }
        let pos = self.text.find(needle)?;
        let first = self.spans[pos];
        let last = self.spans[pos + needle.len() - 1];
        Some((first.0, last.1))
    }
}

/// Normalize a value the same way pages are normalized.
pub fn normalize(text: &str) -> String {
    NormalizedText::new(text).text
}

struct IndexedPage<'a> {
    page_number: u32,
    original: &'a str,
    normalized: NormalizedText,
}

/// Locates the page and excerpt a value came from.
///
/// Pages are normalized once on construction; build one resolver per document.
pub struct AttributionResolver<'a> {
    pages: Vec<IndexedPage<'a>>,
    radius: usize,
}

impl<'a> AttributionResolver<'a> {
    pub fn new(pages: &'a [Page]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|p| IndexedPage {
                    page_number: p.page_number,
                    original: &p.text,
                    normalized: NormalizedText::new(&p.text),
                })
                .collect(),
            radius: DEFAULT_SNIPPET_RADIUS,
        }
    }

    pub fn with_radius(mut self, radius: usize) -> Self {
        self.radius = radius;
        self
    }

    pub fn has_page(&self, page_number: u32) -> bool {
        self.pages.iter().any(|p| p.page_number == page_number)
    }

    /// Resolve `value` to a page and snippet.
    ///
    /// Order: the known page (exact, then prefix), every page exact, every page
    /// by leading-token prefix, then the fallback block. A known page that
    /// exists is kept even when no snippet could be cut.
    pub fn resolve(&self, value: &str, known_page: Option<u32>, fallback_block: Option<&str>) -> Attribution {
        let known_page = known_page.filter(|p| self.has_page(*p));
        let needle = normalize(value);
        if needle.is_empty() {
            return Attribution {
                page_number: known_page,
                snippet: None,
            };
        }
        let prefixes = token_prefixes(&needle);

        if let Some(page_number) = known_page {
            if let Some(page) = self.pages.iter().find(|p| p.page_number == page_number) {
                if let Some(found) = self
                    .exact(page, &needle)
                    .or_else(|| prefixes.iter().find_map(|prefix| self.exact(page, prefix)))
                {
                    return found;
                }
                debug!("Value not found on page {}; scanning all pages", page_number);
            }
        }

        if let Some(found) = self.pages.iter().find_map(|page| self.exact(page, &needle)) {
            return found;
        }

        if let Some(found) = self
            .pages
            .iter()
            .find_map(|page| prefixes.iter().find_map(|prefix| self.exact(page, prefix)))
        {
            return found;
        }

        let snippet = fallback_block.and_then(|block| {
            let normalized = NormalizedText::new(block);
            std::iter::once(&needle)
                .chain(prefixes.iter())
                .find_map(|n| normalized.find(n))
                .map(|(start, end)| snippet_around(block, start, end, self.radius))
        });

        if snippet.is_none() && known_page.is_none() {
            debug!("No attribution found for value '{}'", truncate(value, 60));
        }

        Attribution {
            page_number: known_page,
            snippet,
        }
    }

    /// Content-based page search: first page containing the value, exactly
    /// or by leading-token prefix.
    pub fn locate_page(&self, value: &str) -> Option<u32> {
        let needle = normalize(value);
        if needle.is_empty() {
            return None;
        }
        let prefixes = token_prefixes(&needle);
        self.pages
            .iter()
            .find(|p| p.normalized.text.contains(&needle))
            .or_else(|| {
                self.pages
                    .iter()
                    .find(|p| prefixes.iter().any(|prefix| p.normalized.text.contains(prefix.as_str())))
            })
            .map(|p| p.page_number)
    }

    fn exact(&self, page: &IndexedPage<'_>, needle: &str) -> Option<Attribution> {
        let (start, end) = page.normalized.find(needle)?;
        Some(Attribution {
            page_number: Some(page.page_number),
            snippet: Some(snippet_around(page.original, start, end, self.radius)),
        })
    }
}

/// Leading-token prefixes of a normalized value, longest first, 6 down to 3 tokens.
fn token_prefixes(needle: &str) -> Vec<String> {
    let tokens: Vec<&str> = needle.split(' ').collect();
    let longest = tokens.len().min(MAX_PREFIX_TOKENS);
    if longest < MIN_PREFIX_TOKENS {
        return Vec::new();
    }
    (MIN_PREFIX_TOKENS..=longest)
        .rev()
        .map(|n| tokens[..n].join(" "))
        .filter(|prefix| prefix != needle)
        .collect()
}

/// Slice `radius` characters either side of `start..end`, clipped to the text.
fn snippet_around(text: &str, start: usize, end: usize, radius: usize) -> String {
    let from = text[..start]
        .char_indices()
        .rev()
        .take(radius)
        .last()
        .map(|(i, _)| i)
        .unwrap_or(start);
    let to = text[end..]
        .char_indices()
        .nth(radius)
        .map(|(i, _)| end + i)
        .unwrap_or(text.len());
    text[from..to].trim().to_string()
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

//! Cleanup and validation of free-text model answers.
//!
//! Completions are expected as one line, optionally suffixed with
//! `||| PAGE=<n|UNKNOWN>`. Everything else (fences, emphasis, bullets, label
//! prefixes, extra sentences) is stripped. Renewal and termination answers
//! that say nothing are replaced with the field's canonical "not specified".

use crate::attribution::AttributionResolver;
use crate::schema::{Field, NOT_FOUND};
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info};

/// Separates the answer from the page marker in a completion.
pub const PAGE_DELIMITER: &str = "|||";

pub const NO_RENEWAL_TERMS: &str = "No renewal terms specified";
pub const NOT_SPECIFIED: &str = "Not specified";

/// Phrasings always accepted as a legitimate "nothing in the contract" answer.
const ALLOWED_NON_ANSWERS: &[&str] = &[
    "not found",
    "not specified",
    "no renewal terms specified",
    "no termination notice period specified",
    "no notice period specified",
];

/// Abbreviations whose trailing period does not end a sentence.
const ABBREVIATIONS: &[&str] = &[
    "jan", "feb", "mar", "apr", "jun", "jul", "aug", "sep", "sept", "oct", "nov", "dec", "no",
    "inc", "ltd", "co", "corp", "mr", "ms", "mrs", "dr", "st", "approx", "vs", "e.g", "i.e", "u.s",
];

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("sanitizer regex is valid")
}

static FENCE: LazyLock<Regex> = LazyLock::new(|| compile(r"```[A-Za-z0-9_-]*"));
static EMPHASIS: LazyLock<Regex> = LazyLock::new(|| compile(r"\*\*|__|[*`]"));
static HEADING_MARK: LazyLock<Regex> = LazyLock::new(|| compile(r"^#+\s*"));
static BULLET: LazyLock<Regex> = LazyLock::new(|| compile(r"^(?:[-*•·▪‣>]|\d{1,2}[.)])\s+"));
static LABEL: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"(?i)^(?:final\s+answer|answer|summary|response|result|output|renewal\s+terms|termination\s+notice(?:\s+period)?|notice\s+period)\s*:\s*",
    )
});
static DATE_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"(?i)^(?:the\s+)?(?:effective|start|end|termination|commencement|expiration)\s+date\s*(?:is)?\s*:\s*")
});
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| compile(r"\s+"));
static PAGE_MARKER: LazyLock<Regex> = LazyLock::new(|| compile(r"(?i)\bpage\s*(?:=|:)?\s*(\d+)"));

static GENERIC_ANSWERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^(?:the\s+)?(?:contract\s+|agreement\s+)?renewal\s+(?:terms|conditions|provisions)\s+(?:are\s+|is\s+)?(?:mentioned|specified|included|apply|applicable|outlined|provided|stated|described)$",
        r"^(?:the\s+)?(?:contract\s+|agreement\s+)?termination\s+(?:notice\s+)?(?:period|terms|conditions|provisions|notice)\s+(?:is\s+|are\s+)?(?:mentioned|specified|required|applies|apply|outlined|stated|provided|included)$",
        r"^(?:see|refer\s+to|as\s+(?:per|stated\s+in|described\s+in))\s+(?:the\s+)?(?:contract|agreement|document|section|clause)\b.*$",
        r"^(?:details|information)\s+(?:is\s+|are\s+)?(?:provided|included|specified)\b.*$",
        r"^(?:n/?a|none|unknown|unclear|not\s+applicable)$",
    ]
    .iter()
    .map(|p| compile(p))
    .collect()
});

static NOTICE_VOCABULARY: LazyLock<Regex> = LazyLock::new(|| {
    compile(
        r"\b(?:(?:\d+|one|two|three|four|five|six|seven|eight|nine|ten|fifteen|thirty|forty-five|sixty|ninety)\s*(?:\(\d+\)\s*)?(?:business\s+|calendar\s+)?(?:days?|weeks?|months?|years?)|immediate(?:ly)?|(?:prior|advance|written)\s+notice|notice\s+period)\b",
    )
});
static RENEWAL_VOCABULARY: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"\b(?:renew\w*|extend\w*|extension|successive|evergreen)")
});

/// A usable model answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedAnswer {
    pub value: String,
    pub page_number: Option<u32>,
    /// The model's answer was judged vacuous and replaced.
    pub replaced: bool,
}

/// Clean a raw completion for `field`.
///
/// Returns `None` when nothing is left after cleaning. Page recovery checks
/// the page marker, then the whole completion, then the document content.
pub fn sanitize(field: Field, raw: &str, resolver: &AttributionResolver<'_>) -> Option<SanitizedAnswer> {
    let stripped = strip_markdown(raw);
    let (answer, marker) = match stripped.split_once(PAGE_DELIMITER) {
        Some((answer, marker)) => (answer, Some(marker)),
        None => (stripped.as_str(), None),
    };

    let value = clean_answer(field, answer)?;

    if is_vacuous(field, &value) {
        let canonical = canonical_not_specified(field);
        info!("Rejected vacuous answer for '{}': '{}' -> '{}'", field, value, canonical);
        return Some(SanitizedAnswer {
            value: canonical.to_string(),
            page_number: None,
            replaced: true,
        });
    }

    let page_number = marker
        .and_then(parse_page_marker)
        .or_else(|| parse_page_marker(raw))
        .filter(|p| {
            let exists = resolver.has_page(*p);
            if !exists {
                debug!("Ignoring page hint {} for '{}': no such page", p, field);
            }
            exists
        })
        .or_else(|| {
            if value == NOT_FOUND {
                None
            } else {
                resolver.locate_page(&value)
            }
        });

    Some(SanitizedAnswer {
        value,
        page_number,
        replaced: false,
    })
}

/// Clean the answer segment of a completion down to one sentence.
pub fn clean_answer(field: Field, answer: &str) -> Option<String> {
    let value = strip_markdown(answer)
        .lines()
        .map(|line| clean_line(field, line))
        .find(|line| !line.is_empty())?;

    let value = first_sentence(&value).to_string();

    if is_not_found(&value) {
        return Some(NOT_FOUND.to_string());
    }
    Some(value)
}

/// Whether a renewal/termination answer is a generic non-answer.
///
/// Date fields are never vacuous; the allow-listed "not specified" phrasings
/// always pass.
pub fn is_vacuous(field: Field, value: &str) -> bool {
    let vocabulary = match field {
        Field::RenewalTerms => &*RENEWAL_VOCABULARY,
        Field::TerminationNoticePeriod => &*NOTICE_VOCABULARY,
        Field::StartDate | Field::EndDate => return false,
    };

    let key = comparison_key(value);
    if ALLOWED_NON_ANSWERS.contains(&key.as_str()) {
        return false;
    }
    if GENERIC_ANSWERS.iter().any(|r| r.is_match(&key)) {
        return true;
    }
    !vocabulary.is_match(&key)
}

/// Literal substituted for a rejected answer.
pub fn canonical_not_specified(field: Field) -> &'static str {
    match field {
        Field::RenewalTerms => NO_RENEWAL_TERMS,
        Field::TerminationNoticePeriod => NOT_SPECIFIED,
        Field::StartDate | Field::EndDate => NOT_FOUND,
    }
}

fn strip_markdown(text: &str) -> String {
    let without_fences = FENCE.replace_all(text, "");
    EMPHASIS.replace_all(&without_fences, "").into_owned()
}

fn clean_line(field: Field, line: &str) -> String {
    let mut line = HEADING_MARK.replace(line.trim(), "").into_owned();

    // Bullets and labels can nest ("Answer: - Start date: ...").
    loop {
        let next = BULLET.replace(line.trim_start(), "").into_owned();
        let next = LABEL.replace(&next, "").into_owned();
        let next = if field.is_date() {
            DATE_LABEL.replace(&next, "").into_owned()
        } else {
            next
        };
        if next == line {
            break;
        }
        line = next;
    }

    let line = WHITESPACE.replace_all(line.trim(), " ");
    line.trim_matches(|c: char| matches!(c, '"' | '\'' | '“' | '”' | '‘' | '’'))
        .trim()
        .to_string()
}

/// Text up to and including the first `.`, `!` or `?` that ends a sentence.
fn first_sentence(text: &str) -> &str {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    for (i, &(pos, c)) in chars.iter().enumerate() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let at_boundary = chars.get(i + 1).map(|&(_, next)| next.is_whitespace()).unwrap_or(true);
        if !at_boundary {
            continue;
        }
        if c == '.' && ends_with_abbreviation(&text[..pos]) {
            continue;
        }
        return text[..pos + c.len_utf8()].trim();
    }
    text
}

fn ends_with_abbreviation(prefix: &str) -> bool {
    let word = prefix
        .rsplit(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("")
        .to_lowercase();
    ABBREVIATIONS.contains(&word.as_str())
}

fn parse_page_marker(text: &str) -> Option<u32> {
    PAGE_MARKER
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Lowercased, trimmed, trailing punctuation removed.
fn comparison_key(value: &str) -> String {
    value
        .trim()
        .trim_end_matches(|c: char| matches!(c, '.' | '!' | '?'))
        .trim()
        .to_lowercase()
}

fn is_not_found(value: &str) -> bool {
    comparison_key(value) == "not found"
}

//! Rhetorical role of a matched date: binding, example, historical or conditional.
//!
//! Each hypothesis is scored by additive regex heuristics over the lowercased
//! context and clamped to 1.0; the best score wins, ties going to the earlier
//! hypothesis. Scores below 0.3 are reported as `Unknown` at 0.1.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

const RELIABILITY_THRESHOLD: f64 = 0.3;
const UNKNOWN_CONFIDENCE: f64 = 0.1;
const SUPPORTING_TEXT_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateType {
    Binding,
    Example,
    Historical,
    Conditional,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateContext {
    pub date_type: DateType,
    pub confidence: f64,
    pub supporting_text: String,
}

fn compile_all(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("date heuristic regex is valid"))
        .collect()
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("date heuristic regex is valid")
}

static RECITAL: LazyLock<Regex> = LazyLock::new(|| compile(r"is\s+made\s+and\s+entered\s+into\s+as\s+of\b"));
static MODAL: LazyLock<Regex> = LazyLock::new(|| compile(r"\b(?:shall|will|must)\b"));
static DAY_OF: LazyLock<Regex> = LazyLock::new(|| compile(r"\bday\s+of\b"));
static PAST_TENSE: LazyLock<Regex> = LazyLock::new(|| compile(r"\b(?:was|were|had)\b"));

static BINDING: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"\b(?:effective|commence|start|begin|binding|entered\s+into)\s+(?:as\s+of|on|from)\b",
        r"\b(?:term|agreement)\s+(?:shall\s+)?(?:commence|begin|start)\b",
        r"\beffective\s+date\b",
        r"\b(?:signed|executed)\s+on\b",
    ])
});

static EXAMPLE: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"\b(?:for\s+(?:instance|example)|such\s+as|e\.?g\.?)\b",
        r"\b(?:assume|suppose|hypothetical)\b",
        r"\bif\s+(?:the\s+)?(?:date|agreement)\b",
    ])
});

static HISTORICAL: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"\b(?:previously|formerly|prior)\s+(?:dated|effective)\b",
        r"\bwas\s+(?:effective|signed|dated)\b",
        r"\bold\s+(?:agreement|contract|date)\b",
    ])
});

static CONDITIONAL: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile_all(&[
        r"\bif\s+(?:extended|renewed|terminated)\b",
        r"\bshould\s+the\s+date\b",
        r"\bunless\s+(?:extended|terminated)\b",
        r"\bprovided\s+that\b",
    ])
});

/// Classify the role `date_match` plays inside `context`.
///
/// Only the context is scored; the matched date is accepted for call-site
/// symmetry with pattern hits.
pub fn validate_date(_date_match: &str, context: &str) -> DateContext {
    let lowered = context.to_lowercase();

    let scores = [
        (DateType::Binding, binding_score(&lowered)),
        (DateType::Example, weighted(&EXAMPLE, &lowered, 0.4)),
        (DateType::Historical, historical_score(&lowered)),
        (DateType::Conditional, weighted(&CONDITIONAL, &lowered, 0.3)),
    ];

    let (mut date_type, mut confidence) = scores[0];
    for &(candidate, score) in &scores[1..] {
        if score > confidence {
            date_type = candidate;
            confidence = score;
        }
    }

    if confidence < RELIABILITY_THRESHOLD {
        date_type = DateType::Unknown;
        confidence = UNKNOWN_CONFIDENCE;
    }

    DateContext {
        date_type,
        confidence,
        supporting_text: supporting_text(context),
    }
}

fn binding_score(context: &str) -> f64 {
    if RECITAL.is_match(context) {
        return 1.0;
    }
    let mut score = weighted(&BINDING, context, 0.3);
    if MODAL.is_match(context) {
        score += 0.2;
    }
    if DAY_OF.is_match(context) {
        score += 0.4;
    }
    score.min(1.0)
}

fn historical_score(context: &str) -> f64 {
    let mut score = weighted(&HISTORICAL, context, 0.4);
    if PAST_TENSE.is_match(context) {
        score += 0.2;
    }
    score.min(1.0)
}

/// `weight` per matching pattern, clamped to 1.0.
fn weighted(patterns: &[Regex], context: &str, weight: f64) -> f64 {
    let hits = patterns.iter().filter(|r| r.is_match(context)).count();
    (hits as f64 * weight).min(1.0)
}

fn supporting_text(context: &str) -> String {
    match context.char_indices().nth(SUPPORTING_TEXT_CHARS) {
        Some((cut, _)) => format!("{}...", &context[..cut]),
        None => context.to_string(),
    }
}

//! Field extraction from window text using configured regex patterns.
//!
//! Pure functions, no async. Patterns are compiled once per process; invalid
//! regexes are logged and skipped so one bad entry never disables a field.

use crate::config::{PatternConfig, PatternStore};
use crate::error::PatternConfigError;
use crate::schema::{Field, Window};
use regex::{Captures, Regex, RegexBuilder};
use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;
use tracing::{debug, warn};

static NEWLINE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\n\s*").expect("newline regex is valid"));
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex is valid"));

/// Post-processing applied to an extracted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Formatter {
    Uppercase,
    Lowercase,
    TitleCase,
    CollapseWhitespace,
    StripTrailingPunctuation,
}

impl Formatter {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "uppercase" => Some(Self::Uppercase),
            "lowercase" => Some(Self::Lowercase),
            "title_case" => Some(Self::TitleCase),
            "collapse_whitespace" => Some(Self::CollapseWhitespace),
            "strip_trailing_punctuation" => Some(Self::StripTrailingPunctuation),
            _ => None,
        }
    }

    pub fn apply(self, value: &str) -> String {
        match self {
            Self::Uppercase => value.to_uppercase(),
            Self::Lowercase => value.to_lowercase(),
            Self::TitleCase => value
                .split_whitespace()
                .map(|word| {
                    let mut chars = word.chars();
                    match chars.next() {
                        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                        None => String::new(),
                    }
                })
                .collect::<Vec<String>>()
                .join(" "),
            Self::CollapseWhitespace => WHITESPACE_RUN.replace_all(value.trim(), " ").into_owned(),
            Self::StripTrailingPunctuation => value
                .trim_end()
                .trim_end_matches(|c: char| c.is_ascii_punctuation())
                .trim_end()
                .to_string(),
        }
    }
}

/// Compiled patterns for one field.
pub struct FieldPatterns {
    field: Field,
    regexes: Vec<Regex>,
    find_all: bool,
    formatter: Option<Formatter>,
}

impl FieldPatterns {
    /// Compile a field's configuration. Invalid regexes are skipped with a warning.
    pub fn compile(field: Field, config: &PatternConfig) -> Self {
        let mut regexes = Vec::with_capacity(config.patterns.len());
        for pattern in &config.patterns {
            match compile_pattern(field, pattern) {
                Ok(regex) => regexes.push(regex),
                Err(e) => warn!("Skipping pattern: {}", e),
            }
        }

        let formatter = config.formatter.as_deref().and_then(|name| {
            let parsed = Formatter::parse(name);
            if parsed.is_none() {
                warn!("Ignoring unknown formatter '{}' for '{}'", name, field);
            }
            parsed
        });

        Self {
            field,
            regexes,
            find_all: config.find_all,
            formatter,
        }
    }

    /// Apply the patterns to one window's text.
    ///
    /// `find_all` fields collect every match of every pattern, deduplicated and
    /// sorted, joined by `" | "`. Other fields return the first pattern that
    /// matches anywhere in the text.
    pub fn extract(&self, text: &str) -> Option<String> {
        let value = if self.find_all {
            let mut found = BTreeSet::new();
            for regex in &self.regexes {
                for caps in regex.captures_iter(text) {
                    let value = capture_value(&caps);
                    let value = value.trim();
                    if !value.is_empty() {
                        found.insert(value.to_string());
                    }
                }
            }
            if found.is_empty() {
                return None;
            }
            found.into_iter().collect::<Vec<_>>().join(" | ")
        } else {
            let caps = self.regexes.iter().find_map(|r| r.captures(text))?;
            let value = capture_value(&caps);
            NEWLINE_RUN.replace_all(value.trim(), " ").trim().to_string()
        };

        let value = match self.formatter {
            Some(formatter) => formatter.apply(&value),
            None => value,
        };

        if value.is_empty() {
            debug!("Pattern for '{}' matched an empty value", self.field);
            return None;
        }
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.regexes.len()
    }
}

fn compile_pattern(field: Field, pattern: &str) -> Result<Regex, PatternConfigError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .dot_matches_new_line(true)
        .build()
        .map_err(|source| PatternConfigError::Regex {
            field: field.key().to_string(),
            pattern: pattern.to_string(),
            source,
        })
}

/// Joined non-empty capture groups, or the whole match if the pattern has none.
fn capture_value(caps: &Captures<'_>) -> String {
    if caps.len() > 1 {
        caps.iter()
            .skip(1)
            .flatten()
            .map(|m| m.as_str())
            .filter(|s| !s.is_empty())
            .collect()
    } else {
        caps.get(0).map(|m| m.as_str().to_string()).unwrap_or_default()
    }
}

/// A raw pattern hit inside one window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowHit {
    pub field: Field,
    pub value: String,
    pub page_number: u32,
    pub window_text: String,
}

/// Compiled patterns for every configured field.
pub struct CompiledPatterns {
    fields: HashMap<Field, FieldPatterns>,
}

impl CompiledPatterns {
    pub fn compile(store: &PatternStore) -> Self {
        let fields: HashMap<Field, FieldPatterns> = Field::ALL
            .into_iter()
            .filter_map(|field| store.get(field).map(|cfg| (field, FieldPatterns::compile(field, cfg))))
            .collect();
        debug!(
            "Compiled patterns for {} fields ({} regexes)",
            fields.len(),
            fields.values().map(FieldPatterns::len).sum::<usize>()
        );
        Self { fields }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Run every field's patterns over one window.
    pub fn extract_window(&self, window: &Window) -> Vec<WindowHit> {
        Field::ALL
            .into_iter()
            .filter_map(|field| {
                let value = self.fields.get(&field)?.extract(&window.text)?;
                Some(WindowHit {
                    field,
                    value,
                    page_number: window.page_number,
                    window_text: window.text.clone(),
                })
            })
            .collect()
    }

    /// Run every field's patterns over every window, in window order.
    pub fn extract_all(&self, windows: &[Window]) -> Vec<WindowHit> {
        windows.iter().flat_map(|w| self.extract_window(w)).collect()
    }
}

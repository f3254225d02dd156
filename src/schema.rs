//! Contract extraction schema types.
//!
//! Shapes of the per-field results and of the JSON record returned to callers.

use crate::attribution::Attribution;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Value reported when neither a pattern nor the model produced an answer.
pub const NOT_FOUND: &str = "Not Found";

/// One page of document text as produced by the loader (1-indexed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub page_number: u32,
    pub text: String,
}

impl Page {
    pub fn new(page_number: u32, text: impl Into<String>) -> Self {
        Self {
            page_number,
            text: text.into(),
        }
    }
}

/// Heading-anchored span of page text used as the unit of pattern search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub page_number: u32,
    pub text: String,
    pub heading: Option<String>,
}

/// The closed set of contract attributes this service extracts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    StartDate,
    EndDate,
    RenewalTerms,
    TerminationNoticePeriod,
}

impl Field {
    pub const ALL: [Field; 4] = [
        Field::StartDate,
        Field::EndDate,
        Field::RenewalTerms,
        Field::TerminationNoticePeriod,
    ];

    /// Configuration / output key for this field.
    pub fn key(self) -> &'static str {
        match self {
            Field::StartDate => "start_date",
            Field::EndDate => "end_date",
            Field::RenewalTerms => "renewal_terms",
            Field::TerminationNoticePeriod => "termination_notice_period",
        }
    }

    /// Parse a configuration key. Unknown keys yield `None`.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.key() == key)
    }

    pub fn is_date(self) -> bool {
        matches!(self, Field::StartDate | Field::EndDate)
    }

    /// Whether a model answer of literally "Not Found" is refused as an override.
    ///
    /// The termination notice branch has never performed this check, so any
    /// non-empty answer for it replaces the deterministic result.
    pub fn rejects_not_found_override(self) -> bool {
        !matches!(self, Field::TerminationNoticePeriod)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Where a field's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionSource {
    Regex,
    #[serde(rename = "System Fallback")]
    SystemFallback,
    Inference,
    /// Reserved for fields that were never attempted.
    #[allow(dead_code)]
    None,
}

/// Extracted value for one field, with provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub value: String,
    pub source: ExtractionSource,
    pub page_number: Option<u32>,
    pub reference_snippet: Option<String>,
}

impl ExtractionResult {
    pub fn new(
        value: impl Into<String>,
        source: ExtractionSource,
        attribution: Attribution,
    ) -> Self {
        Self {
            value: value.into(),
            source,
            page_number: attribution.page_number,
            reference_snippet: attribution.snippet,
        }
    }

    /// Fallback entry: configured text, no page attribution.
    pub fn fallback(value: impl Into<String>) -> Self {
        Self::new(value, ExtractionSource::SystemFallback, Attribution::none())
    }
}

/// Timing and memory figures merged into every response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub execution_time_seconds: String,
    pub peak_memory_usage_mb: String,
}

/// Successful extraction record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractAnalysis {
    pub extraction_timestamp: String,
    pub contract_type: String,
    pub contract_length: usize,
    pub pages_analysed: usize,
    pub analysis: BTreeMap<Field, ExtractionResult>,
    pub performance_metrics: PerformanceMetrics,
}

/// Record returned in place of [`ContractAnalysis`] when the document is unusable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub error: String,
    pub performance_metrics: PerformanceMetrics,
}

/// Either shape of the top-level response.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ExtractionOutcome {
    Analysis(ContractAnalysis),
    Error(ErrorRecord),
}

impl ExtractionOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, ExtractionOutcome::Error(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_keys_round_trip() {
        for field in Field::ALL {
            assert_eq!(Field::from_key(field.key()), Some(field));
        }
        assert_eq!(Field::from_key("governing_law"), None);
    }

    #[test]
    fn test_source_serialization() {
        let json = serde_json::to_string(&ExtractionSource::SystemFallback).unwrap();
        assert_eq!(json, "\"System Fallback\"");
        let json = serde_json::to_string(&ExtractionSource::Regex).unwrap();
        assert_eq!(json, "\"Regex\"");
    }

    #[test]
    fn test_result_serializes_null_attribution() {
        let result = ExtractionResult::fallback(NOT_FOUND);
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["value"], "Not Found");
        assert!(value["page_number"].is_null());
        assert!(value["reference_snippet"].is_null());
    }

    #[test]
    fn test_analysis_keys_are_field_names() {
        let mut analysis = BTreeMap::new();
        analysis.insert(Field::RenewalTerms, ExtractionResult::fallback(NOT_FOUND));
        let value = serde_json::to_value(&analysis).unwrap();
        assert!(value.get("renewal_terms").is_some());
    }
}

//! Extraction pipeline: deterministic patterns plus an optional model pass.
//!
//! Both paths run for every document. A usable model answer takes priority,
//! then the regex result, then the field's configured fallback text.

use crate::attribution::{Attribution, AttributionResolver};
use crate::config::{PatternStore, WindowConfig};
use crate::contract_type::identify_contract_type;
use crate::document::load_document;
use crate::error::{DocumentError, ModelCallError};
use crate::llm::CompletionClient;
use crate::merger::merge_window_hits;
use crate::patterns::{CompiledPatterns, WindowHit};
use crate::profiler::Profiler;
use crate::prompts::{build_prompt, max_output_tokens, page_tagged_context, MAX_CONTEXT_CHARS};
use crate::sanitizer::sanitize;
use crate::schema::{
    ContractAnalysis, ErrorRecord, ExtractionOutcome, ExtractionResult, ExtractionSource, Field,
    Page, PerformanceMetrics, NOT_FOUND,
};
use crate::segmenter::segment_pages;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Extraction pipeline orchestrator.
pub struct ContractExtractor {
    store: PatternStore,
    patterns: Arc<CompiledPatterns>,
    window_config: WindowConfig,
    model: Option<Arc<dyn CompletionClient>>,
}

impl ContractExtractor {
    pub fn new(store: PatternStore, model: Option<Arc<dyn CompletionClient>>) -> Self {
        let patterns = Arc::new(CompiledPatterns::compile(&store));
        if patterns.is_empty() {
            warn!("No usable patterns configured; deterministic extraction disabled");
        }
        Self {
            store,
            patterns,
            window_config: WindowConfig::default(),
            model,
        }
    }

    pub fn model_name(&self) -> Option<&str> {
        self.model.as_deref().map(|m| m.name())
    }

    pub fn pattern_fields(&self) -> usize {
        self.store.len()
    }

    /// Analyse raw document bytes.
    ///
    /// Never fails: an unreadable document yields an [`ErrorRecord`]. Both
    /// shapes carry performance metrics.
    pub async fn analyze_document(&self, data: &[u8]) -> ExtractionOutcome {
        let mut profiler = Profiler::start();

        let pages = match load_document(data) {
            Ok(pages) => pages,
            Err(e) => return error_outcome(e, profiler.finish()),
        };
        profiler.sample();

        match self.analyze_pages(pages).await {
            Ok(mut analysis) => {
                analysis.performance_metrics = profiler.finish();
                info!(
                    "Extraction complete in {}s ({} pages, {})",
                    analysis.performance_metrics.execution_time_seconds,
                    analysis.pages_analysed,
                    analysis.contract_type
                );
                ExtractionOutcome::Analysis(analysis)
            }
            Err(e) => error_outcome(e, profiler.finish()),
        }
    }

    /// Analyse already-loaded pages. Metrics are left at their defaults.
    pub async fn analyze_pages(&self, pages: Vec<Page>) -> Result<ContractAnalysis, DocumentError> {
        if pages.iter().all(|p| p.text.trim().is_empty()) {
            return Err(DocumentError::NoText);
        }

        let pages = Arc::new(pages);
        info!("Analysing contract: {} pages", pages.len());

        let (hits, completions) = tokio::join!(
            self.run_patterns(Arc::clone(&pages)),
            self.query_model(&pages)
        );

        let resolver = AttributionResolver::new(&pages);
        let mut results = merge_window_hits(&hits, &resolver);

        for field in Field::ALL {
            let Some(raw) = completions.get(&field) else {
                continue;
            };
            let Some(answer) = sanitize(field, raw, &resolver) else {
                warn!("Model answer for '{}' was empty after cleaning", field);
                continue;
            };
            if field.rejects_not_found_override() && answer.value == NOT_FOUND {
                debug!("Model found nothing for '{}'; keeping deterministic result", field);
                continue;
            }

            let attribution = if answer.replaced {
                if results.contains_key(&field) {
                    debug!("Model answer for '{}' rejected; keeping deterministic result", field);
                    continue;
                }
                Attribution::none()
            } else {
                let attribution = resolver.resolve(&answer.value, answer.page_number, None);
                if attribution.snippet.is_none() {
                    // A page hint the text does not back up is dropped.
                    debug!("No attribution for '{}' answer '{}'", field, answer.value);
                    Attribution::none()
                } else {
                    attribution
                }
            };
            debug!(
                "Inference result for '{}': '{}' (page {:?})",
                field, answer.value, attribution.page_number
            );
            results.insert(
                field,
                ExtractionResult::new(answer.value, ExtractionSource::Inference, attribution),
            );
        }

        let analysis: BTreeMap<Field, ExtractionResult> = Field::ALL
            .into_iter()
            .map(|field| {
                let result = results.remove(&field).unwrap_or_else(|| {
                    debug!("No answer for '{}'; using fallback text", field);
                    ExtractionResult::fallback(self.store.fallback_text(field))
                });
                (field, result)
            })
            .collect();

        let full_text = pages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        Ok(ContractAnalysis {
            extraction_timestamp: chrono::Local::now().to_rfc3339(),
            contract_type: identify_contract_type(&full_text).to_string(),
            contract_length: full_text.chars().count(),
            pages_analysed: pages.len(),
            analysis,
            performance_metrics: PerformanceMetrics::default(),
        })
    }

    /// Segment and pattern-match off the async runtime.
    async fn run_patterns(&self, pages: Arc<Vec<Page>>) -> Vec<WindowHit> {
        if self.patterns.is_empty() {
            return Vec::new();
        }

        let patterns = Arc::clone(&self.patterns);
        let config = self.window_config;
        let task = tokio::task::spawn_blocking(move || {
            let windows = segment_pages(&pages, &config);
            debug!("Segmented {} pages into {} windows", pages.len(), windows.len());
            patterns.extract_all(&windows)
        });

        match task.await {
            Ok(hits) => {
                debug!("Deterministic pass produced {} hits", hits.len());
                hits
            }
            Err(e) => {
                error!("Pattern extraction task failed: {}", e);
                Vec::new()
            }
        }
    }

    /// One completion per field, issued concurrently. Failed fields are absent.
    async fn query_model(&self, pages: &[Page]) -> HashMap<Field, String> {
        let mut completions = HashMap::new();
        let Some(client) = &self.model else {
            debug!("No model configured; skipping inference");
            return completions;
        };

        let context = page_tagged_context(pages, MAX_CONTEXT_CHARS);
        info!(
            "Querying {} for {} fields ({} context chars)",
            client.name(),
            Field::ALL.len(),
            context.chars().count()
        );

        let mut handles = Vec::with_capacity(Field::ALL.len());
        for field in Field::ALL {
            let client = Arc::clone(client);
            let prompt = build_prompt(field, &context);
            let handle = tokio::spawn(async move {
                let limit = client.timeout();
                tokio::time::timeout(limit, client.complete(&prompt, max_output_tokens(field)))
                    .await
                    .unwrap_or(Err(ModelCallError::Timeout(limit)))
            });
            handles.push((field, handle));
        }

        for (field, handle) in handles {
            match handle.await {
                Ok(Ok(text)) => {
                    debug!("Model answered '{}': {:?}", field, text);
                    completions.insert(field, text);
                }
                Ok(Err(e)) => warn!("Model call for '{}' failed: {}", field, e),
                Err(e) => error!("Model task for '{}' failed: {}", field, e),
            }
        }

        completions
    }
}

fn error_outcome(e: DocumentError, performance_metrics: PerformanceMetrics) -> ExtractionOutcome {
    warn!("Document rejected: {}", e);
    ExtractionOutcome::Error(ErrorRecord {
        error: e.to_string(),
        performance_metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PatternConfig;
    use crate::date_semantics::{validate_date, DateType};
    use crate::sanitizer::{NOT_SPECIFIED, NO_RENEWAL_TERMS};
    use std::time::Duration;

    type Reply = Box<dyn Fn(Field) -> Result<String, ModelCallError> + Send + Sync>;

    /// Answers each field from a script; the field is recognised from the prompt.
    struct ScriptedClient {
        reply: Reply,
        slow_field: Option<Field>,
        timeout: Duration,
    }

    impl ScriptedClient {
        fn new(reply: impl Fn(Field) -> Result<String, ModelCallError> + Send + Sync + 'static) -> Self {
            Self {
                reply: Box::new(reply),
                slow_field: None,
                timeout: Duration::from_secs(5),
            }
        }
    }

    fn field_of(prompt: &str) -> Field {
        if prompt.contains("find the start date") {
            Field::StartDate
        } else if prompt.contains("find the end date") {
            Field::EndDate
        } else if prompt.contains("renewal terms") {
            Field::RenewalTerms
        } else {
            Field::TerminationNoticePeriod
        }
    }

    #[async_trait::async_trait]
    impl CompletionClient for ScriptedClient {
        fn name(&self) -> &str {
            "scripted"
        }

        fn timeout(&self) -> Duration {
            self.timeout
        }

        async fn complete(&self, prompt: &str, _max_output_tokens: u32) -> Result<String, ModelCallError> {
            let field = field_of(prompt);
            if self.slow_field == Some(field) {
                tokio::time::sleep(Duration::from_secs(10)).await;
            }
            (self.reply)(field)
        }
    }

    fn store() -> PatternStore {
        let config = |patterns: &[&str]| PatternConfig {
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            fallback_text: NOT_FOUND.to_string(),
            find_all: false,
            formatter: None,
        };
        PatternStore::from_configs([
            (
                Field::StartDate,
                config(&[r"entered\s+into\s+as\s+of\s+([A-Z][a-z]+\s+\d{1,2},\s*\d{4})"]),
            ),
            (
                Field::EndDate,
                config(&[r"(?:expire|terminate)s?\s+on\s+([A-Z][a-z]+\s+\d{1,2},\s*\d{4})"]),
            ),
            (
                Field::TerminationNoticePeriod,
                config(&[r"(\w+\s+\(\d+\)\s+days(?:'|’)?\s+(?:prior\s+)?written\s+notice)"]),
            ),
        ])
    }

    fn contract() -> Vec<Page> {
        vec![
            Page::new(
                1,
                "1. Term\n\nThis Agreement is made and entered into as of January 1, 2020 and shall continue for one year.",
            ),
            Page::new(
                2,
                "2. Termination\n\nEither party may terminate this Agreement upon thirty (30) days written notice.",
            ),
        ]
    }

    fn result(analysis: &ContractAnalysis, field: Field) -> &ExtractionResult {
        &analysis.analysis[&field]
    }

    #[tokio::test]
    async fn test_deterministic_only() {
        let extractor = ContractExtractor::new(store(), None);
        let analysis = extractor.analyze_pages(contract()).await.unwrap();

        let start = result(&analysis, Field::StartDate);
        assert_eq!(start.value, "January 1, 2020");
        assert_eq!(start.source, ExtractionSource::Regex);
        assert_eq!(start.page_number, Some(1));
        let snippet = start.reference_snippet.as_deref().unwrap();
        assert!(snippet.contains("January 1, 2020"));
        assert_eq!(validate_date(&start.value, snippet).date_type, DateType::Binding);

        let end = result(&analysis, Field::EndDate);
        assert_eq!(end.value, NOT_FOUND);
        assert_eq!(end.source, ExtractionSource::SystemFallback);
        assert_eq!(end.page_number, None);
        assert_eq!(end.reference_snippet, None);

        assert_eq!(analysis.pages_analysed, 2);
        assert_eq!(analysis.contract_type, "General Agreement");
    }

    #[tokio::test]
    async fn test_shipped_pattern_files() {
        let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("patterns");
        let store = PatternStore::load_from_dir(&dir);
        assert_eq!(store.len(), Field::ALL.len());

        let extractor = ContractExtractor::new(store, None);
        let analysis = extractor.analyze_pages(contract()).await.unwrap();
        assert_eq!(result(&analysis, Field::StartDate).value, "January 1, 2020");
        assert_eq!(
            result(&analysis, Field::TerminationNoticePeriod).value,
            "thirty (30) days written notice"
        );
        assert_eq!(result(&analysis, Field::TerminationNoticePeriod).page_number, Some(2));
    }

    #[tokio::test]
    async fn test_every_field_present_and_non_empty() {
        let extractor = ContractExtractor::new(PatternStore::default(), None);
        let analysis = extractor.analyze_pages(contract()).await.unwrap();

        assert_eq!(analysis.analysis.len(), Field::ALL.len());
        for field in Field::ALL {
            let r = result(&analysis, field);
            assert_eq!(r.value, NOT_FOUND);
            assert_eq!(r.source, ExtractionSource::SystemFallback);
            assert!(r.page_number.is_none());
            assert!(r.reference_snippet.is_none());
        }
    }

    #[tokio::test]
    async fn test_model_not_found_keeps_regex_result() {
        let client = ScriptedClient::new(|_| Ok("Not Found ||| PAGE=UNKNOWN".to_string()));
        let extractor = ContractExtractor::new(store(), Some(Arc::new(client)));
        let analysis = extractor.analyze_pages(contract()).await.unwrap();

        let start = result(&analysis, Field::StartDate);
        assert_eq!(start.value, "January 1, 2020");
        assert_eq!(start.source, ExtractionSource::Regex);

        // No regex and a "Not Found" answer: fallback, not inference.
        let end = result(&analysis, Field::EndDate);
        assert_eq!(end.source, ExtractionSource::SystemFallback);
    }

    #[tokio::test]
    async fn test_termination_not_found_overrides_regex() {
        // Known inconsistency: only termination lets a "Not Found" model answer
        // replace a deterministic match.
        let client = ScriptedClient::new(|_| Ok("Not Found".to_string()));
        let extractor = ContractExtractor::new(store(), Some(Arc::new(client)));
        let analysis = extractor.analyze_pages(contract()).await.unwrap();

        let termination = result(&analysis, Field::TerminationNoticePeriod);
        assert_eq!(termination.value, NOT_FOUND);
        assert_eq!(termination.source, ExtractionSource::Inference);
        assert_eq!(termination.page_number, None);
    }

    #[tokio::test]
    async fn test_model_answer_takes_priority() {
        let client = ScriptedClient::new(|field| match field {
            Field::StartDate => Ok("January 1, 2020 ||| PAGE=1".to_string()),
            Field::TerminationNoticePeriod => Ok("**Answer:** 30 days written notice.".to_string()),
            _ => Ok("Not Found".to_string()),
        });
        let extractor = ContractExtractor::new(store(), Some(Arc::new(client)));
        let analysis = extractor.analyze_pages(contract()).await.unwrap();

        let start = result(&analysis, Field::StartDate);
        assert_eq!(start.source, ExtractionSource::Inference);
        assert_eq!(start.page_number, Some(1));
        assert!(start.reference_snippet.as_deref().unwrap().contains("January 1, 2020"));

        let termination = result(&analysis, Field::TerminationNoticePeriod);
        assert_eq!(termination.value, "30 days written notice.");
        assert_eq!(termination.source, ExtractionSource::Inference);
        assert_eq!(termination.page_number, Some(2));
    }

    #[tokio::test]
    async fn test_vacuous_answers_are_canonicalised() {
        let client = ScriptedClient::new(|field| match field {
            Field::RenewalTerms => Ok("Renewal terms mentioned. ||| PAGE=3".to_string()),
            Field::TerminationNoticePeriod => Ok("See the agreement.".to_string()),
            _ => Ok("Not Found".to_string()),
        });
        let extractor = ContractExtractor::new(PatternStore::default(), Some(Arc::new(client)));
        let analysis = extractor.analyze_pages(contract()).await.unwrap();

        let renewal = result(&analysis, Field::RenewalTerms);
        assert_eq!(renewal.value, NO_RENEWAL_TERMS);
        assert_eq!(renewal.source, ExtractionSource::Inference);
        assert_eq!(renewal.page_number, None);
        assert_eq!(renewal.reference_snippet, None);

        let termination = result(&analysis, Field::TerminationNoticePeriod);
        assert_eq!(termination.value, NOT_SPECIFIED);
        assert_eq!(termination.source, ExtractionSource::Inference);
        assert_eq!(termination.page_number, None);
    }

    #[tokio::test]
    async fn test_vacuous_answer_keeps_regex_result() {
        let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("patterns");
        let client = ScriptedClient::new(|field| match field {
            Field::RenewalTerms => Ok("Renewal terms mentioned.".to_string()),
            Field::TerminationNoticePeriod => Ok("See the agreement.".to_string()),
            _ => Ok("Not Found".to_string()),
        });
        let extractor =
            ContractExtractor::new(PatternStore::load_from_dir(&dir), Some(Arc::new(client)));
        let pages = vec![
            Page::new(
                1,
                "3. Renewal\n\nThis Agreement shall automatically renew for successive one-year terms.",
            ),
            Page::new(
                2,
                "4. Termination\n\nEither party may terminate upon thirty (30) days written notice.",
            ),
        ];
        let analysis = extractor.analyze_pages(pages).await.unwrap();

        let renewal = result(&analysis, Field::RenewalTerms);
        assert_eq!(renewal.value, "shall automatically renew for successive one-year terms.");
        assert_eq!(renewal.source, ExtractionSource::Regex);
        assert_eq!(renewal.page_number, Some(1));

        let termination = result(&analysis, Field::TerminationNoticePeriod);
        assert_eq!(termination.value, "thirty (30) days written notice");
        assert_eq!(termination.source, ExtractionSource::Regex);
        assert_eq!(termination.page_number, Some(2));
    }

    #[tokio::test]
    async fn test_unsupported_page_hint_is_dropped() {
        let client = ScriptedClient::new(|field| match field {
            Field::EndDate => Ok("December 31, 2030 ||| PAGE=2".to_string()),
            _ => Ok("Not Found".to_string()),
        });
        let extractor = ContractExtractor::new(store(), Some(Arc::new(client)));
        let analysis = extractor.analyze_pages(contract()).await.unwrap();

        let end = result(&analysis, Field::EndDate);
        assert_eq!(end.value, "December 31, 2030");
        assert_eq!(end.source, ExtractionSource::Inference);
        assert_eq!(end.page_number, None);
        assert_eq!(end.reference_snippet, None);
    }

    #[tokio::test]
    async fn test_panicking_model_task_degrades_one_field() {
        let client = ScriptedClient::new(|field| match field {
            Field::StartDate => panic!("client bug"),
            Field::EndDate => Ok("December 31, 2020".to_string()),
            _ => Ok("Not Found".to_string()),
        });
        let extractor = ContractExtractor::new(store(), Some(Arc::new(client)));
        let analysis = extractor.analyze_pages(contract()).await.unwrap();

        assert_eq!(result(&analysis, Field::StartDate).source, ExtractionSource::Regex);
        assert_eq!(result(&analysis, Field::EndDate).source, ExtractionSource::Inference);
    }

    #[tokio::test]
    async fn test_failed_field_does_not_affect_others() {
        let client = ScriptedClient::new(|field| match field {
            Field::StartDate => Err(ModelCallError::Api {
                status: 500,
                body: "boom".to_string(),
            }),
            Field::EndDate => Ok("December 31, 2020".to_string()),
            _ => Ok("Not Found".to_string()),
        });
        let extractor = ContractExtractor::new(store(), Some(Arc::new(client)));
        let analysis = extractor.analyze_pages(contract()).await.unwrap();

        assert_eq!(result(&analysis, Field::StartDate).source, ExtractionSource::Regex);
        let end = result(&analysis, Field::EndDate);
        assert_eq!(end.value, "December 31, 2020");
        assert_eq!(end.source, ExtractionSource::Inference);
        assert_eq!(end.page_number, None);
    }

    #[tokio::test]
    async fn test_slow_field_times_out_alone() {
        let mut client = ScriptedClient::new(|field| match field {
            Field::EndDate => Ok("December 31, 2020".to_string()),
            _ => Ok("Not Found".to_string()),
        });
        client.slow_field = Some(Field::StartDate);
        client.timeout = Duration::from_millis(50);

        let extractor = ContractExtractor::new(store(), Some(Arc::new(client)));
        let analysis = extractor.analyze_pages(contract()).await.unwrap();

        assert_eq!(result(&analysis, Field::StartDate).source, ExtractionSource::Regex);
        assert_eq!(result(&analysis, Field::EndDate).source, ExtractionSource::Inference);
    }

    #[tokio::test]
    async fn test_attributed_snippets_come_from_the_named_page() {
        let client = ScriptedClient::new(|field| match field {
            Field::TerminationNoticePeriod => Ok("thirty (30) days written notice ||| PAGE=1".to_string()),
            _ => Ok("Not Found".to_string()),
        });
        let extractor = ContractExtractor::new(store(), Some(Arc::new(client)));
        let pages = contract();
        let analysis = extractor.analyze_pages(pages.clone()).await.unwrap();

        for r in analysis.analysis.values() {
            if let (Some(page), Some(snippet)) = (r.page_number, r.reference_snippet.as_deref()) {
                let text = &pages[page as usize - 1].text;
                assert!(text.contains(snippet), "snippet {:?} not on page {}", snippet, page);
            }
        }
        // The page hint was wrong; attribution moved to where the text is.
        assert_eq!(result(&analysis, Field::TerminationNoticePeriod).page_number, Some(2));
    }

    #[tokio::test]
    async fn test_unreadable_document_yields_error_record() {
        let extractor = ContractExtractor::new(store(), None);

        let outcome = extractor.analyze_document(b"").await;
        assert!(outcome.is_error());
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["error"], "No readable text found in the document.");
        assert!(json["performance_metrics"]["execution_time_seconds"].is_string());
        assert!(json.get("analysis").is_none());

        let outcome = extractor.analyze_document(b"%PDF-1.4\ngarbage").await;
        assert!(outcome.is_error());
    }

    #[tokio::test]
    async fn test_text_document_round_trip() {
        let extractor = ContractExtractor::new(store(), None);
        let text = "This Agreement is made and entered into as of March 3, 2021.\u{c}Page two text.";
        let outcome = extractor.analyze_document(text.as_bytes()).await;

        let ExtractionOutcome::Analysis(analysis) = outcome else {
            panic!("expected an analysis");
        };
        assert_eq!(analysis.pages_analysed, 2);
        assert_eq!(analysis.contract_length, text.chars().count());
        assert_eq!(result(&analysis, Field::StartDate).value, "March 3, 2021");
        assert!(!analysis.performance_metrics.execution_time_seconds.is_empty());
    }
}

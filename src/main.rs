//! Contract Extractor - contract attribute extraction server.

mod attribution;
mod config;
mod contract_type;
mod date_semantics;
mod document;
mod error;
mod extractor;
mod llm;
mod merger;
mod patterns;
mod profiler;
mod prompts;
mod sanitizer;
mod schema;
mod segmenter;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use config::{PatternStore, Settings};
use date_semantics::{validate_date, DateContext};
use extractor::ContractExtractor;
use llm::{CompletionClient, MistralClient};
use schema::{ContractAnalysis, ExtractionOutcome};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const ALLOWED_EXTENSIONS: &[&str] = &["pdf", "txt"];

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    extractor: Arc<ContractExtractor>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "contract_extractor=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env();

    let store = PatternStore::load_from_dir(&settings.patterns_dir);
    info!("Loaded patterns for {} fields from {:?}", store.len(), settings.patterns_dir);

    let model = match MistralClient::from_settings(
        settings.mistral_api_key.as_deref(),
        &settings.mistral_model,
        settings.llm_timeout,
    ) {
        Ok(client) => Some(Arc::new(client) as Arc<dyn CompletionClient>),
        Err(e) => {
            warn!("Model-assisted extraction disabled: {}", e);
            None
        }
    };

    let state = AppState {
        extractor: Arc::new(ContractExtractor::new(store, model)),
    };

    let app = Router::new()
        .route("/api/health", get(health))
        .route("/api/test", get(test_endpoint))
        .route("/api/analyze-contract", post(analyze_contract))
        .route("/api/validate-date", post(validate_date_handler))
        .layer(DefaultBodyLimit::max(settings.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    info!("Server listening on http://{}", settings.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "message": "Contract Analysis API is running",
    }))
}

/// Reports what the running extractor has available.
async fn test_endpoint(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "message": "Contract Analysis API is working!",
        "patterns_loaded": state.extractor.pattern_fields(),
        "model_enabled": state.extractor.model_name().is_some(),
        "model": state.extractor.model_name(),
    }))
}

#[derive(Serialize)]
struct AnalyzeResponse {
    #[serde(flatten)]
    analysis: ContractAnalysis,
    filename: String,
    file_size: usize,
}

/// Upload a contract and extract its attributes.
async fn analyze_contract(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    let mut upload = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        api_error(StatusCode::BAD_REQUEST, format!("Multipart error: {}", e))
    })? {
        if field.name() == Some("file") {
            let filename = clean_filename(field.file_name().unwrap_or(""));
            let data = field.bytes().await.map_err(|e| {
                api_error(StatusCode::BAD_REQUEST, format!("Failed to read file: {}", e))
            })?;
            upload = Some((filename, data));
            break;
        }
    }

    let Some((filename, data)) = upload else {
        return Err(api_error(StatusCode::BAD_REQUEST, "No file provided"));
    };
    if filename.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "No file selected"));
    }
    if !has_allowed_extension(&filename) {
        warn!("Rejected upload with unsupported type: {}", filename);
        return Err(api_error(StatusCode::BAD_REQUEST, "Only PDF and TXT files are allowed"));
    }
    if data.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Empty file provided"));
    }

    let file_size = data.len();
    info!("Received file: {} ({} bytes)", filename, file_size);

    match state.extractor.analyze_document(&data).await {
        ExtractionOutcome::Analysis(analysis) => {
            info!("Analysis completed for {}", filename);
            Ok(Json(AnalyzeResponse {
                analysis,
                filename,
                file_size,
            }))
        }
        ExtractionOutcome::Error(record) => {
            error!("Extraction failed for {}: {}", filename, record.error);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!(record)),
            ))
        }
    }
}

#[derive(Deserialize)]
struct ValidateDateRequest {
    date: String,
    context: String,
}

/// Classify a date mention within its surrounding text.
async fn validate_date_handler(Json(request): Json<ValidateDateRequest>) -> Json<DateContext> {
    Json(validate_date(&request.date, &request.context))
}

// ============================================================================
// Helper functions
// ============================================================================

/// Final path component of a client-supplied name.
fn clean_filename(name: &str) -> String {
    name.rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim()
        .to_string()
}

fn has_allowed_extension(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_filename() {
        assert_eq!(clean_filename("../../etc/lease.pdf"), "lease.pdf");
        assert_eq!(clean_filename("C:\\Users\\me\\nda.PDF"), "nda.PDF");
        assert_eq!(clean_filename(""), "");
    }

    #[test]
    fn test_allowed_extensions() {
        assert!(has_allowed_extension("lease.pdf"));
        assert!(has_allowed_extension("nda.PDF"));
        assert!(has_allowed_extension("notes.txt"));
        assert!(!has_allowed_extension("contract.docx"));
        assert!(!has_allowed_extension("pdf"));
    }
}

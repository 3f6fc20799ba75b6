//! Cascade Failover Integration Tests
//!
//! Scripted providers reproduce the canonical failover sequence: primary
//! returns a server error, the first fallback emits malformed JSON twice
//! (original attempt + repair), the second fallback succeeds. Telemetry
//! must report the fallback depth and the provider that won.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use counterscope::services::llm::{
    GenerationParams, LlmCascade, LlmError, LlmProvider, LlmRequest, LlmResult, TextGenerator,
};
use counterscope::services::workflow::{AnalysisInput, Stage};

use crate::support::{engine_with, healthy_sources};

struct ScriptedProvider {
    name: &'static str,
    responses: Vec<LlmResult<String>>,
    calls: AtomicU32,
}

impl ScriptedProvider {
    fn new(name: &'static str, responses: Vec<LlmResult<String>>) -> Arc<Self> {
        Arc::new(Self {
            name,
            responses,
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        self.name
    }
    fn model(&self) -> &str {
        "scripted"
    }
    fn is_configured(&self) -> bool {
        true
    }
    async fn generate(
        &self,
        _system: Option<&str>,
        _prompt: &str,
        _params: &GenerationParams,
    ) -> LlmResult<String> {
        let idx = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
        self.responses
            .get(idx.min(self.responses.len().saturating_sub(1)))
            .cloned()
            .unwrap_or(Err(LlmError::EmptyResponse))
    }
    async fn health_check(&self) -> LlmResult<()> {
        Ok(())
    }
}

fn report_body() -> String {
    json!({
        "company_info": {"status": "ACTIVE"},
        "summary": "## Отчёт\nСтабильный контрагент.",
        "findings": [],
        "citations": [],
        "recommendations": ["Стандартная проверка"]
    })
    .to_string()
}

fn scripted_cascade() -> (LlmCascade, Arc<ScriptedProvider>) {
    let openrouter = ScriptedProvider::new(
        "openrouter",
        vec![Err(LlmError::ServerError {
            message: "upstream 500".into(),
            status: Some(500),
        })],
    );
    let huggingface = ScriptedProvider::new(
        "huggingface",
        vec![
            Ok("not json, sorry".into()),
            Ok("still not json".into()),
        ],
    );
    let gigachat = ScriptedProvider::new("gigachat", vec![Ok(report_body())]);
    let hf_handle = huggingface.clone();
    (
        LlmCascade::new(vec![openrouter, huggingface, gigachat]),
        hf_handle,
    )
}

#[tokio::test]
async fn test_failover_depth_and_winner() {
    let (cascade, huggingface) = scripted_cascade();
    let schema = json!({
        "type": "object",
        "required": ["summary", "findings", "recommendations"]
    });

    let outcome = cascade
        .generate_json(&LlmRequest::new("analyze"), &schema)
        .await
        .unwrap();

    assert_eq!(outcome.provider_used, "gigachat");
    assert_eq!(outcome.fallback_depth, 2);
    // Malformed JSON got exactly one repair re-prompt before moving on.
    assert_eq!(huggingface.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_full_run_through_the_scripted_cascade() {
    let (cascade, _hf) = scripted_cascade();
    let generator: Arc<dyn TextGenerator> = Arc::new(cascade);
    let harness = engine_with(healthy_sources(), generator);

    let output = harness
        .engine
        .run(AnalysisInput {
            session_id: None,
            client_name: "Acme LLC".into(),
            inn: Some("7736050003".into()),
            notes: None,
        })
        .await;

    assert_eq!(output.status, Stage::Completed);
    let report = output.report.unwrap();
    assert!(!report.degraded, "gigachat rescued the run");
    assert_eq!(report.summary, "## Отчёт\nСтабильный контрагент.");
    assert_eq!(harness.reports.count().unwrap(), 1);
}

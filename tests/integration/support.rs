//! Shared test support: scriptable data sources, a deterministic stub
//! generator, and an engine builder over in-memory storage.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use counterscope::models::SearchFinding;
use counterscope::services::llm::{
    GenerationOutcome, JsonOutcome, LlmRequest, TextGenerator,
};
use counterscope::services::providers::{DataSource, SourcePayload, SourceQuery};
use counterscope::services::workflow::{WorkflowDeps, WorkflowEngine};
use counterscope::storage::{ReportsRepository, Storage, ThreadsRepository};
use counterscope::utils::error::{AppError, AppResult};
use counterscope::Config;

/// Scriptable source: a fixed payload or a fixed error.
pub struct ScriptedSource {
    pub name: &'static str,
    pub critical: bool,
    pub needs_inn: bool,
    pub outcome: Result<Value, String>,
}

#[async_trait]
impl DataSource for ScriptedSource {
    fn name(&self) -> &'static str {
        self.name
    }
    fn is_critical(&self) -> bool {
        self.critical
    }
    fn requires_inn(&self) -> bool {
        self.needs_inn
    }
    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }
    fn is_configured(&self) -> bool {
        true
    }
    async fn fetch(&self, _query: &SourceQuery) -> AppResult<SourcePayload> {
        match &self.outcome {
            Ok(value) => Ok(SourcePayload::complete(value.clone())),
            Err(message) => Err(AppError::transport(message.clone())),
        }
    }
    async fn healthcheck(&self, _timeout: Duration) -> AppResult<()> {
        Ok(())
    }
}

/// The standard five-source set, all succeeding with benign payloads.
pub fn healthy_sources() -> Vec<Arc<dyn DataSource>> {
    sources_with(Ok(()), Ok(()))
}

/// Five sources where the registry and analytics outcomes are scriptable.
pub fn sources_with(
    registry: Result<(), &str>,
    analytics: Result<(), &str>,
) -> Vec<Arc<dyn DataSource>> {
    let registry_outcome = match registry {
        Ok(()) => Ok(json!({
            "inn": "7736050003",
            "name_full": "ООО \"АКМЕ\"",
            "name_short": "ООО АКМЕ",
            "status": "ACTIVE",
            "address": "г Москва",
            "okved": "46.71",
            "management_name": "Иванов И.И.",
            "registration_date": "2005-03-14",
            "sanctions_listed": false,
            "tax_debt": false
        })),
        Err(message) => Err(message.to_string()),
    };
    let analytics_outcome = match analytics {
        Ok(()) => Ok(json!({
            "inn": "7736050003",
            "liquidity_ratio": 1.4,
            "debt_ratio": 0.3,
            "credit_rating": "BBB",
            "risk_flags": []
        })),
        Err(message) => Err(message.to_string()),
    };

    vec![
        Arc::new(ScriptedSource {
            name: "dadata",
            critical: true,
            needs_inn: true,
            outcome: registry_outcome,
        }),
        Arc::new(ScriptedSource {
            name: "casebook",
            critical: false,
            needs_inn: true,
            outcome: Ok(json!({
                "cases": [
                    {"case_number": "А40-100/2022", "category": "спор", "role": "defendant"},
                    {"case_number": "А40-200/2023", "category": "взыскание", "role": "plaintiff"}
                ],
                "pages_fetched": 1,
                "truncated": false
            })),
        }),
        Arc::new(ScriptedSource {
            name: "infosphere",
            critical: true,
            needs_inn: true,
            outcome: analytics_outcome,
        }),
        Arc::new(ScriptedSource {
            name: "perplexity",
            critical: false,
            needs_inn: false,
            outcome: Ok(json!({
                "content": "Компания работает на рынке с 2005 года, стабильный поставщик",
                "citations": ["https://example.org/profile"]
            })),
        }),
        Arc::new(ScriptedSource {
            name: "tavily",
            critical: false,
            needs_inn: false,
            outcome: Ok(json!({
                "answer": "Отзывы в основном нейтральные",
                "results": [
                    {"title": "Новости отрасли", "content": "компания открыла склад", "url": "https://example.org/n1"}
                ]
            })),
        }),
    ]
}

/// Deterministic stub generator returning a fixed LLM-shaped report body.
pub struct StubGenerator;

#[async_trait]
impl TextGenerator for StubGenerator {
    async fn generate_text(&self, _request: &LlmRequest) -> AppResult<GenerationOutcome> {
        Ok(GenerationOutcome {
            content: "ok".into(),
            provider_used: "openrouter".into(),
            model: "stub".into(),
            fallback_depth: 0,
            latency_ms: 1,
        })
    }

    async fn generate_json(
        &self,
        _request: &LlmRequest,
        _schema: &Value,
    ) -> AppResult<JsonOutcome> {
        Ok(JsonOutcome {
            value: json!({
                "company_info": {"status": "ACTIVE"},
                "summary": "## Отчёт\nКомпания выглядит стабильной.",
                "findings": [
                    {"category": "reputation", "source": "tavily", "sentiment": "neutral", "key_points": ["нейтральные отзывы"]}
                ],
                "citations": [],
                "recommendations": ["Стандартная проверка"]
            }),
            provider_used: "openrouter".into(),
            fallback_depth: 0,
            repaired: false,
            latency_ms: 1,
        })
    }
}

/// Engine test harness bundling the storage handles.
pub struct Harness {
    pub engine: Arc<WorkflowEngine>,
    pub reports: ReportsRepository,
    pub threads: ThreadsRepository,
}

pub fn engine_with(
    sources: Vec<Arc<dyn DataSource>>,
    generator: Arc<dyn TextGenerator>,
) -> Harness {
    let config = Arc::new(Config::default());
    let storage = Storage::in_memory();
    let reports = ReportsRepository::new(storage.clone());
    let threads = ThreadsRepository::new(storage.clone());

    let engine = WorkflowEngine::new(WorkflowDeps {
        config: config.clone(),
        sources,
        generator,
        reports: reports.clone(),
        threads: threads.clone(),
        global_search_permits: Arc::new(Semaphore::new(config.global_search_cap)),
        accept_degraded: false,
    });

    Harness {
        engine,
        reports,
        threads,
    }
}

#[allow(dead_code)]
pub fn finding(content: &str) -> SearchFinding {
    SearchFinding {
        source: "tavily".into(),
        category: "news".into(),
        query: "q".into(),
        title: String::new(),
        content: content.into(),
        url: None,
        sentiment: counterscope::models::Sentiment::Neutral,
    }
}

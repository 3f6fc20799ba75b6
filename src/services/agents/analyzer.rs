//! Analyzer Agent
//!
//! Serializes the collected evidence, asks the LLM cascade for a report in
//! JSON form, then overwrites the risk assessment with the deterministic
//! scorer. When the cascade is unusable or its JSON never validates, a
//! minimal degraded report is assembled from the scorer output alone.

use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::models::{ClientAnalysisReport, Finding, ReportMetadata, RiskAssessment, SearchFinding};
use crate::services::llm::{GenerationParams, LlmRequest, TextGenerator};
use crate::services::scoring::{calculate_risk, RiskScore, ScoringInput};
use crate::services::workflow::state::WorkflowState;
use crate::utils::error::{AppError, AppResult, ErrorKind};

const ANALYST_SYSTEM_PROMPT: &str = "You are a counterparty risk analyst. Using the evidence \
provided, produce a factual JSON report about the company. Cite only facts present in the \
evidence; never invent cases, numbers or events. Answer in Russian where the evidence is Russian.";

/// JSON shape requested from the cascade.
fn report_schema() -> Value {
    json!({
        "type": "object",
        "required": ["summary", "findings", "recommendations"],
        "properties": {
            "company_info": {"type": "object"},
            "summary": {"type": "string"},
            "findings": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["category", "source", "sentiment"],
                    "properties": {
                        "category": {"type": "string"},
                        "source": {"type": "string"},
                        "sentiment": {"enum": ["positive", "neutral", "negative"]},
                        "key_points": {"type": "array", "items": {"type": "string"}}
                    }
                }
            },
            "citations": {"type": "array", "items": {"type": "string"}},
            "recommendations": {"type": "array", "items": {"type": "string"}}
        }
    })
}

/// Produce the report for the current state. Cascade exhaustion and schema
/// failure both degrade to the scorer-built report; cancellation during
/// the in-flight LLM call aborts the run.
pub async fn analyze(
    generator: &Arc<dyn TextGenerator>,
    state: &WorkflowState,
    cancel: &CancellationToken,
) -> AppResult<ClientAnalysisReport> {
    let scoring_input = ScoringInput::from_evidence(&state.source_data, &state.search_results);
    let score = calculate_risk(&scoring_input);

    let request = LlmRequest::new(build_prompt(state))
        .with_system(ANALYST_SYSTEM_PROMPT)
        .with_params(GenerationParams {
            temperature: 0.2,
            max_tokens: 4000,
        });

    // The cascade is the longest suspension point in a run; race it
    // against the session's cancellation flag.
    let schema = report_schema();
    let generated = tokio::select! {
        _ = cancel.cancelled() => {
            return Err(AppError::Cancelled(state.session_id.clone()));
        }
        result = generator.generate_json(&request, &schema) => result,
    };

    match generated {
        Ok(outcome) => Ok(assemble_report(state, Some(&outcome.value), score, false)),
        Err(err) if matches!(err.kind(), ErrorKind::LlmUnavailable | ErrorKind::SchemaMismatch) => {
            warn!(error = %err, "analyzer: cascade unusable, building degraded report");
            Ok(assemble_report(state, None, score, true))
        }
        Err(err) => Err(err),
    }
}

fn build_prompt(state: &WorkflowState) -> String {
    let evidence = json!({
        "client_name": state.client_name,
        "inn": state.inn,
        "sources": state.source_data,
        "search_results": state.search_results,
    });

    let mut prompt = format!(
        "Проанализируй контрагента «{}» по собранным данным.\n\nEVIDENCE:\n{}",
        state.client_name,
        serde_json::to_string_pretty(&evidence).unwrap_or_else(|_| "{}".into())
    );

    if let Some(comment) = &state.user_comment {
        prompt.push_str(&format!(
            "\n\nПредыдущая версия отчёта была отклонена пользователем. Замечание: {}. \
             Учти это замечание; не выдумывай данных, которых нет в EVIDENCE.",
            comment
        ));
    }
    if let Some(previous) = &state.previous_report {
        prompt.push_str(&format!(
            "\n\nКраткое содержание предыдущего отчёта:\n{}",
            previous.summary.chars().take(2000).collect::<String>()
        ));
    }
    prompt
}

/// Merge the LLM body (when present) with deterministic fields. The risk
/// assessment always comes from the scorer.
fn assemble_report(
    state: &WorkflowState,
    llm_body: Option<&Value>,
    score: RiskScore,
    degraded: bool,
) -> ClientAnalysisReport {
    let sources_used = state.usable_sources();

    let company_info = llm_body
        .and_then(|v| v.get("company_info").cloned())
        .filter(|v| v.is_object())
        .unwrap_or_else(|| registry_company_info(state));

    let legal_cases_count = state
        .source_data
        .get("casebook")
        .filter(|env| env.is_usable())
        .and_then(|env| env.payload.get("cases"))
        .and_then(|cases| cases.as_array())
        .map(|cases| cases.len() as u64)
        .unwrap_or(0);

    let findings = llm_body
        .and_then(|v| v.get("findings").cloned())
        .and_then(|v| serde_json::from_value::<Vec<Finding>>(v).ok())
        .unwrap_or_else(|| findings_from_search(&state.search_results));

    let mut citations: Vec<String> = state
        .source_data
        .get("perplexity")
        .filter(|env| env.is_usable())
        .and_then(|env| env.payload.get("citations"))
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|c| c.as_str())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();
    if let Some(extra) = llm_body
        .and_then(|v| v.get("citations"))
        .and_then(|v| v.as_array())
    {
        for citation in extra.iter().filter_map(|c| c.as_str()) {
            if !citations.iter().any(|c| c == citation) {
                citations.push(citation.to_string());
            }
        }
    }

    let summary = llm_body
        .and_then(|v| v.get("summary"))
        .and_then(|v| v.as_str())
        .map(String::from)
        .unwrap_or_else(|| degraded_summary(state, &score));

    let recommendations = llm_body
        .and_then(|v| v.get("recommendations").cloned())
        .and_then(|v| serde_json::from_value::<Vec<String>>(v).ok())
        .unwrap_or_else(|| default_recommendations(&score));

    ClientAnalysisReport {
        metadata: ReportMetadata {
            client_name: state.client_name.clone(),
            inn: state.inn.clone(),
            analysis_date: chrono::Utc::now(),
            sources_used,
        },
        company_info,
        legal_cases_count,
        risk_assessment: RiskAssessment::new(score.score, score.factor_lines()),
        findings,
        summary,
        citations,
        recommendations,
        degraded,
    }
}

fn registry_company_info(state: &WorkflowState) -> Value {
    state
        .source_data
        .get("dadata")
        .filter(|env| env.is_usable())
        .map(|env| env.payload.clone())
        .unwrap_or_else(|| json!({}))
}

fn findings_from_search(search_results: &[SearchFinding]) -> Vec<Finding> {
    search_results
        .iter()
        .map(|finding| Finding {
            category: finding.category.clone(),
            source: finding.source.clone(),
            sentiment: finding.sentiment,
            key_points: vec![finding.content.chars().take(300).collect()],
        })
        .collect()
}

fn degraded_summary(state: &WorkflowState, score: &RiskScore) -> String {
    let mut lines = vec![
        format!("## Отчёт по контрагенту {}", state.client_name),
        String::new(),
        format!(
            "Риск-скор: **{}/100** (уровень: {}).",
            score.score, score.level
        ),
        String::new(),
    ];
    let factor_lines = score.factor_lines();
    if factor_lines.is_empty() {
        lines.push("Существенных риск-факторов не обнаружено.".into());
    } else {
        lines.push("Ключевые факторы:".into());
        for factor in factor_lines {
            lines.push(format!("- {}", factor));
        }
    }
    lines.push(String::new());
    lines.push("Автоматический отчёт: языковая модель была недоступна, текст сформирован из детерминированной оценки.".into());
    lines.join("\n")
}

fn default_recommendations(score: &RiskScore) -> Vec<String> {
    match score.level {
        crate::models::RiskLevel::Low => {
            vec!["Стандартная процедура проверки при заключении договора".into()]
        }
        crate::models::RiskLevel::Medium => vec![
            "Запросить дополнительные документы перед заключением договора".into(),
            "Предусмотреть поэтапную оплату".into(),
        ],
        crate::models::RiskLevel::High => vec![
            "Ограничить лимит сделки и работать по предоплате".into(),
            "Провести углублённую проверку бенефициаров".into(),
        ],
        crate::models::RiskLevel::Critical => vec![
            "Не рекомендуется заключать договор без обеспечения".into(),
            "Передать материалы в службу безопасности".into(),
        ],
    }
}

//! Collector Agent
//!
//! Fans the plan out to every applicable source concurrently. Each call is
//! bounded by the per-session semaphore (default 5), a global in-flight
//! cap shared across sessions, and the source's own timeout. Envelopes are
//! reported in completion order. Search snippets are annotated with the
//! deterministic sentiment rule. Both critical sources failing yields
//! `InsufficientData`; search failures are tolerated.

use futures_util::stream::{FuturesUnordered, StreamExt};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::models::SearchFinding;
use crate::services::providers::{
    label_text, DataSource, SourcePayload, SourceQuery, SourceResultEnvelope,
};
use crate::services::workflow::events::WorkflowEvent;
use crate::services::workflow::state::{CollectionStats, SearchIntent};
use crate::utils::error::{AppError, AppResult};
use crate::utils::inn::is_valid_inn;

/// Collector result delta handed back to the state machine.
#[derive(Debug)]
pub struct CollectorOutput {
    pub source_data: BTreeMap<String, SourceResultEnvelope>,
    pub search_results: Vec<SearchFinding>,
    pub stats: CollectionStats,
}

/// Everything the collector needs from the engine.
pub struct CollectorRun<'a> {
    pub sources: &'a [Arc<dyn DataSource>],
    pub client_name: &'a str,
    pub inn: Option<&'a str>,
    pub plan: &'a [SearchIntent],
    /// Per-session bound (MAX_CONCURRENT_SEARCHES)
    pub session_permits: Arc<Semaphore>,
    /// Global in-flight cap across sessions
    pub global_permits: Arc<Semaphore>,
    pub cancel: CancellationToken,
    pub events: broadcast::Sender<WorkflowEvent>,
    /// When set, only sources in this set run (restricted feedback pass)
    pub only_sources: Option<HashSet<String>>,
}

pub async fn collect(run: CollectorRun<'_>) -> AppResult<CollectorOutput> {
    let started = Instant::now();
    let inn_usable = run.inn.map(is_valid_inn).unwrap_or(false);

    let query = Arc::new(SourceQuery {
        client_name: run.client_name.to_string(),
        inn: run.inn.filter(|_| inn_usable).map(String::from),
        queries: run.plan.iter().map(|i| i.query.clone()).collect(),
    });
    let primary_category = run
        .plan
        .first()
        .map(|i| format!("{:?}", i.category).to_lowercase())
        .unwrap_or_else(|| "custom".to_string());

    let mut tasks = FuturesUnordered::new();
    let mut attempted_criticals = 0u32;

    for source in run.sources {
        if let Some(only) = &run.only_sources {
            if !only.contains(source.name()) {
                continue;
            }
        }
        // INN-keyed sources are skipped entirely without a usable INN.
        if source.requires_inn() && !inn_usable {
            debug!(source = source.name(), "collector: skipped, no valid INN");
            continue;
        }
        if source.is_critical() {
            attempted_criticals += 1;
        }

        let source = source.clone();
        let query = query.clone();
        let session_permits = run.session_permits.clone();
        let global_permits = run.global_permits.clone();
        let cancel = run.cancel.clone();

        tasks.push(async move {
            let call_started = Instant::now();
            let Ok(_session) = session_permits.acquire_owned().await else {
                return SourceResultEnvelope::failed(source.name(), "semaphore closed".into(), 0);
            };
            let Ok(_global) = global_permits.acquire_owned().await else {
                return SourceResultEnvelope::failed(source.name(), "semaphore closed".into(), 0);
            };

            if cancel.is_cancelled() {
                return SourceResultEnvelope::failed(
                    source.name(),
                    "cancelled".into(),
                    call_started.elapsed().as_millis() as u64,
                );
            }
            if !source.is_configured() {
                return SourceResultEnvelope::failed(source.name(), "not configured".into(), 0);
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => Err(AppError::Cancelled(source.name().to_string())),
                result = tokio::time::timeout(source.timeout(), source.fetch(&query)) => {
                    match result {
                        Ok(inner) => inner,
                        Err(_) => Err(AppError::Timeout {
                            context: format!("source {}", source.name()),
                            elapsed_ms: source.timeout().as_millis() as u64,
                        }),
                    }
                }
            };
            let duration_ms = call_started.elapsed().as_millis() as u64;

            match outcome {
                Ok(SourcePayload {
                    data,
                    partial: false,
                    ..
                }) => SourceResultEnvelope::success(source.name(), data, duration_ms),
                Ok(SourcePayload {
                    data,
                    partial_note,
                    ..
                }) => SourceResultEnvelope::partial(
                    source.name(),
                    data,
                    duration_ms,
                    partial_note.as_deref().unwrap_or("incomplete result"),
                ),
                Err(err) => {
                    SourceResultEnvelope::failed(source.name(), err.to_string(), duration_ms)
                }
            }
        });
    }

    let mut source_data = BTreeMap::new();
    // Envelopes arrive (and are reported) in completion order.
    while let Some(envelope) = tasks.next().await {
        let _ = run.events.send(WorkflowEvent::SourceResult {
            source: envelope.source.clone(),
            status: envelope.status,
            duration_ms: envelope.duration_ms,
        });
        source_data.insert(envelope.source.clone(), envelope);
    }

    if run.cancel.is_cancelled() {
        return Err(AppError::Cancelled("collection".into()));
    }

    // Both critical sources attempted and failed: the run cannot produce a
    // meaningful report.
    let failed_criticals = run
        .sources
        .iter()
        .filter(|s| s.is_critical())
        .filter_map(|s| source_data.get(s.name()))
        .filter(|env| !env.is_usable())
        .count() as u32;
    if attempted_criticals >= 2 && failed_criticals >= attempted_criticals {
        return Err(AppError::InsufficientData(
            "all critical sources (registry, analytics) failed".into(),
        ));
    }

    let search_results = extract_search_findings(&source_data, &primary_category, &query);
    let successful_sources: Vec<String> = source_data
        .iter()
        .filter(|(_, env)| env.is_usable())
        .map(|(name, _)| name.clone())
        .collect();
    let stats = CollectionStats {
        total_sources: source_data.len() as u32,
        successful: successful_sources.len() as u32,
        failed: source_data.len() as u32 - successful_sources.len() as u32,
        duration_ms: started.elapsed().as_millis() as u64,
        successful_sources,
    };

    info!(
        total = stats.total_sources,
        successful = stats.successful,
        duration_ms = stats.duration_ms,
        "collector: done"
    );

    Ok(CollectorOutput {
        source_data,
        search_results,
        stats,
    })
}

/// Flatten search-provider payloads into sentiment-annotated findings.
fn extract_search_findings(
    source_data: &BTreeMap<String, SourceResultEnvelope>,
    category: &str,
    query: &SourceQuery,
) -> Vec<SearchFinding> {
    let mut findings = Vec::new();
    let primary = query.primary_query();

    if let Some(env) = source_data.get("perplexity").filter(|env| env.is_usable()) {
        let content = env
            .payload
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if !content.is_empty() {
            findings.push(SearchFinding {
                source: "perplexity".into(),
                category: category.to_string(),
                query: primary.clone(),
                title: String::new(),
                content: content.to_string(),
                url: env
                    .payload
                    .get("citations")
                    .and_then(|v| v.as_array())
                    .and_then(|c| c.first())
                    .and_then(|v| v.as_str())
                    .map(String::from),
                sentiment: label_text(content),
            });
        }
    }

    if let Some(env) = source_data.get("tavily").filter(|env| env.is_usable()) {
        let answer = env
            .payload
            .get("answer")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        if !answer.is_empty() {
            findings.push(SearchFinding {
                source: "tavily".into(),
                category: category.to_string(),
                query: primary.clone(),
                title: String::new(),
                content: answer.to_string(),
                url: None,
                sentiment: label_text(answer),
            });
        }
        if let Some(results) = env.payload.get("results").and_then(|v| v.as_array()) {
            for item in results {
                let content = item
                    .get("content")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default();
                if content.is_empty() {
                    continue;
                }
                let title = item.get("title").and_then(|v| v.as_str()).unwrap_or_default();
                findings.push(SearchFinding {
                    source: "tavily".into(),
                    category: category.to_string(),
                    query: primary.clone(),
                    title: title.to_string(),
                    content: content.to_string(),
                    url: item.get("url").and_then(|v| v.as_str()).map(String::from),
                    sentiment: label_text(&format!("{} {}", title, content)),
                });
            }
        }
    }

    findings
}

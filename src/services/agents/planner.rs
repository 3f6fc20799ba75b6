//! Planner Agent
//!
//! Builds the search plan: five built-in intent templates parameterized by
//! client name and INN, plus one custom intent per non-empty line of the
//! caller's notes. When a valid INN is present the registry is consulted
//! first so the plan uses the official company name; registry failure
//! degrades to the caller-supplied name. An invalid INN produces a warning
//! but the run proceeds (INN-keyed sources are skipped downstream and the
//! scorer downweights legal/financial evidence accordingly).

use std::sync::Arc;
use tracing::{info, warn};

use crate::services::providers::{DataSource, SourceQuery};
use crate::services::workflow::state::{IntentCategory, SearchIntent};
use crate::utils::inn::is_valid_inn;
use crate::utils::sanitize::sanitize_for_prompt;

/// Planner output: the plan plus the name the rest of the run should use.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub plan: Vec<SearchIntent>,
    pub canonical_name: String,
    pub warnings: Vec<String>,
}

/// Build the plan. `registry` is the registry source used for canonical
/// name resolution; absent or failing lookups are tolerated.
pub async fn build_plan(
    client_name: &str,
    inn: Option<&str>,
    notes: Option<&str>,
    registry: Option<&Arc<dyn DataSource>>,
) -> PlanOutcome {
    let mut warnings = Vec::new();
    let (clean_name, flagged) = sanitize_for_prompt(client_name);
    if flagged {
        warnings.push("suspicious fragments removed from client name".to_string());
    }

    let inn_valid = inn.map(is_valid_inn).unwrap_or(false);
    if let Some(raw) = inn {
        if !inn_valid {
            warnings.push(format!("INN '{}' failed validation, proceeding without registry lookups", raw));
            warn!(inn = raw, "planner: invalid INN, proceeding degraded");
        }
    }

    let mut canonical_name = clean_name.clone();
    if inn_valid {
        if let (Some(source), Some(inn)) = (registry, inn) {
            let query = SourceQuery {
                client_name: clean_name.clone(),
                inn: Some(inn.to_string()),
                queries: Vec::new(),
            };
            match source.fetch(&query).await {
                Ok(payload) => {
                    if let Some(full_name) = payload
                        .data
                        .get("name_full")
                        .and_then(|v| v.as_str())
                        .filter(|s| !s.is_empty())
                    {
                        info!(canonical = full_name, "planner: using registry name");
                        canonical_name = full_name.to_string();
                    }
                }
                Err(err) => {
                    warnings.push(format!("registry lookup failed: {}", err));
                }
            }
        }
    }

    let plan = build_intents(&canonical_name, inn.filter(|_| inn_valid), notes);
    info!(intents = plan.len(), "planner: plan ready");

    PlanOutcome {
        plan,
        canonical_name,
        warnings,
    }
}

/// The deterministic template expansion. INN-parameterized templates are
/// only emitted when an INN is available.
pub fn build_intents(name: &str, inn: Option<&str>, notes: Option<&str>) -> Vec<SearchIntent> {
    let mut plan = vec![SearchIntent {
        category: IntentCategory::Reputation,
        query: format!("репутация компании {} отзывы клиентов", name),
    }];

    if let Some(inn) = inn {
        plan.push(SearchIntent {
            category: IntentCategory::Lawsuits,
            query: format!("{} ИНН {} судебные дела арбитраж", name, inn),
        });
    }

    plan.push(SearchIntent {
        category: IntentCategory::News,
        query: format!("{} новости последние события", name),
    });
    plan.push(SearchIntent {
        category: IntentCategory::Negative,
        query: format!("{} проблемы скандалы жалобы", name),
    });

    if let Some(inn) = inn {
        plan.push(SearchIntent {
            category: IntentCategory::Financial,
            query: format!("{} ИНН {} финансовое состояние банкротство", name, inn),
        });
    }

    if let Some(notes) = notes {
        for line in notes.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let (clean_line, _) = sanitize_for_prompt(line);
            if clean_line.is_empty() {
                continue;
            }
            plan.push(SearchIntent {
                category: IntentCategory::Custom,
                query: format!("{} {}", name, clean_line),
            });
        }
    }

    plan
}

/// Intents appended by feedback `focus_areas`.
pub fn focus_intents(name: &str, focus_areas: &[String]) -> Vec<SearchIntent> {
    focus_areas
        .iter()
        .map(|area| {
            let (clean, _) = sanitize_for_prompt(area);
            SearchIntent {
                category: IntentCategory::Custom,
                query: format!("{} {}", name, clean),
            }
        })
        .collect()
}

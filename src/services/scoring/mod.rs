//! Risk Scorer
//!
//! Deterministic, normalized risk scoring. Four capped category
//! contributions (legal 40, financial 30, reputation 20, regulatory 15)
//! are summed and normalized to 0–100 with half-up rounding; the band is
//! strictly derived from the thresholds 25/50/75. Every non-zero
//! contribution produces a human-readable factor. Identical inputs always
//! yield identical outputs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{RiskLevel, SearchFinding, Sentiment};
use crate::services::providers::casebook::CourtCase;
use crate::services::providers::dadata::RegistryRecord;
use crate::services::providers::infosphere::AnalyticsRecord;
use crate::services::providers::SourceResultEnvelope;

pub const LEGAL_CAP: u32 = 40;
pub const FINANCIAL_CAP: u32 = 30;
pub const REPUTATION_CAP: u32 = 20;
pub const REGULATORY_CAP: u32 = 15;
pub const MAX_POSSIBLE: u32 = LEGAL_CAP + FINANCIAL_CAP + REPUTATION_CAP + REGULATORY_CAP;

/// Statuses that immediately max out the legal category.
const TERMINAL_STATUSES: [&str; 3] = ["LIQUIDATING", "LIQUIDATED", "BANKRUPT"];

/// Scandal markers: the strongest negative keywords.
const SCANDAL_KEYWORDS: [&str; 4] = ["скандал", "мошеннич", "обман", "уголовное дело"];
const SANCTION_KEYWORDS: [&str; 4] = ["санкци", "санкционный", "ограничения", "запрет"];
const REGULATORY_KEYWORDS: [&str; 4] = ["штраф", "нарушение", "проверка фнс", "проверка фас"];

const LOW_RATINGS: [&str; 5] = ["CCC", "CC", "C", "D", "NR"];
const MEDIUM_RATINGS: [&str; 6] = ["BB+", "BB-", "BB", "B+", "B-", "B"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskCategory {
    Legal,
    Financial,
    Reputation,
    Regulatory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// One scoring driver, kept both for the report factor list and for audit
/// logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskFactor {
    pub category: RiskCategory,
    pub description: String,
    pub severity: Severity,
    pub score_contribution: i32,
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

/// Scorer output.
#[derive(Debug, Clone, Serialize)]
pub struct RiskScore {
    pub score: u32,
    pub level: RiskLevel,
    pub factors: Vec<RiskFactor>,
}

impl RiskScore {
    /// Factor descriptions for non-zero contributions, for the report.
    pub fn factor_lines(&self) -> Vec<String> {
        self.factors
            .iter()
            .filter(|f| f.score_contribution != 0)
            .map(|f| f.description.clone())
            .collect()
    }
}

/// Typed view over the collected evidence.
#[derive(Debug, Clone, Default)]
pub struct ScoringInput {
    pub registry: Option<RegistryRecord>,
    pub cases: Vec<CourtCase>,
    pub analytics: Option<AnalyticsRecord>,
    pub search_results: Vec<SearchFinding>,
}

impl ScoringInput {
    /// Extract typed evidence from the collector's envelopes. Failed
    /// envelopes simply leave their slot empty.
    pub fn from_evidence(
        source_data: &BTreeMap<String, SourceResultEnvelope>,
        search_results: &[SearchFinding],
    ) -> Self {
        let registry = source_data
            .get("dadata")
            .filter(|env| env.is_usable())
            .and_then(|env| serde_json::from_value(env.payload.clone()).ok());
        let cases = source_data
            .get("casebook")
            .filter(|env| env.is_usable())
            .and_then(|env| env.payload.get("cases").cloned())
            .and_then(|cases| serde_json::from_value(cases).ok())
            .unwrap_or_default();
        let analytics = source_data
            .get("infosphere")
            .filter(|env| env.is_usable())
            .and_then(|env| serde_json::from_value(env.payload.clone()).ok());

        Self {
            registry,
            cases,
            analytics,
            search_results: search_results.to_vec(),
        }
    }
}

/// Normalize a raw category sum to the 0–100 scale, half-up.
pub fn normalized_score(raw: u32) -> u32 {
    let scaled = raw as f64 / MAX_POSSIBLE as f64 * 100.0;
    (scaled.round() as u32).min(100)
}

/// Compute the full risk score from typed evidence.
pub fn calculate_risk(input: &ScoringInput) -> RiskScore {
    let mut factors = Vec::new();

    let legal = legal_risk(input, &mut factors);
    let financial = financial_risk(input, &mut factors);
    let reputation = reputation_risk(&input.search_results, &mut factors);
    let regulatory = regulatory_risk(input, &mut factors);

    let raw = legal + financial + reputation + regulatory;
    let score = normalized_score(raw);

    RiskScore {
        score,
        level: RiskLevel::from_score(score),
        factors,
    }
}

fn legal_risk(input: &ScoringInput, factors: &mut Vec<RiskFactor>) -> u32 {
    let mut score: i32 = 0;

    if let Some(registry) = &input.registry {
        if TERMINAL_STATUSES.contains(&registry.status.as_str()) {
            factors.push(RiskFactor {
                category: RiskCategory::Legal,
                description: format!(
                    "Company is being liquidated or bankrupt (status {})",
                    registry.status
                ),
                severity: Severity::Critical,
                score_contribution: LEGAL_CAP as i32,
                source: "dadata".into(),
                evidence: Some(format!("registry status: {}", registry.status)),
            });
            return LEGAL_CAP;
        }
        if registry.status == "ACTIVE" {
            factors.push(RiskFactor {
                category: RiskCategory::Legal,
                description: "Company is active and registered".into(),
                severity: Severity::Low,
                score_contribution: 0,
                source: "dadata".into(),
                evidence: Some("registry status: ACTIVE".into()),
            });
        }
    }

    let bankruptcy_cases: Vec<&CourtCase> = input
        .cases
        .iter()
        .filter(|c| c.category.to_lowercase().contains("банкрот"))
        .collect();
    let defendant_count = {
        let defendants = input.cases.iter().filter(|c| c.role == "defendant").count();
        if defendants > 0 {
            defendants
        } else {
            input.cases.len()
        }
    };
    let plaintiff_count = input.cases.iter().filter(|c| c.role == "plaintiff").count();

    if !bankruptcy_cases.is_empty() {
        let contribution = (30 + bankruptcy_cases.len() as u32 * 3).min(LEGAL_CAP);
        score += contribution as i32;
        factors.push(RiskFactor {
            category: RiskCategory::Legal,
            description: format!("Bankruptcy proceedings: {} case(s)", bankruptcy_cases.len()),
            severity: Severity::Critical,
            score_contribution: contribution as i32,
            source: "casebook".into(),
            evidence: Some(format!(
                "{} bankruptcy cases in arbitration records",
                bankruptcy_cases.len()
            )),
        });
    } else {
        let (contribution, severity) = match defendant_count {
            n if n >= 100 => (25, Severity::High),
            n if n >= 50 => (20, Severity::High),
            n if n >= 20 => (15, Severity::Medium),
            n if n >= 10 => (10, Severity::Medium),
            n if n > 0 => (5, Severity::Low),
            _ => (0, Severity::Low),
        };
        if contribution > 0 {
            score += contribution;
            factors.push(RiskFactor {
                category: RiskCategory::Legal,
                description: format!("Court cases as defendant: {}", defendant_count),
                severity,
                score_contribution: contribution,
                source: "casebook".into(),
                evidence: Some(format!("{} arbitration cases", defendant_count)),
            });
        }

        if plaintiff_count > 0 {
            score = (score - 3).max(0);
            factors.push(RiskFactor {
                category: RiskCategory::Legal,
                description: format!("Initiates claims itself: {} suit(s)", plaintiff_count),
                severity: Severity::Low,
                score_contribution: -3,
                source: "casebook".into(),
                evidence: Some(format!("{} cases as plaintiff", plaintiff_count)),
            });
        }
    }

    (score.max(0) as u32).min(LEGAL_CAP)
}

fn financial_risk(input: &ScoringInput, factors: &mut Vec<RiskFactor>) -> u32 {
    let mut score: u32 = 0;

    let Some(analytics) = &input.analytics else {
        score += 10;
        factors.push(RiskFactor {
            category: RiskCategory::Financial,
            description: "Financial data unavailable".into(),
            severity: Severity::Medium,
            score_contribution: 10,
            source: "infosphere".into(),
            evidence: Some("no analytics record".into()),
        });
        return score.min(FINANCIAL_CAP);
    };

    if let Some(liquidity) = analytics.liquidity_ratio {
        if liquidity < 0.5 {
            score += 28;
            factors.push(RiskFactor {
                category: RiskCategory::Financial,
                description: "Critically low liquidity".into(),
                severity: Severity::Critical,
                score_contribution: 28,
                source: "infosphere".into(),
                evidence: Some(format!("liquidity ratio {:.2}", liquidity)),
            });
        } else if liquidity < 1.0 {
            score += 18;
            factors.push(RiskFactor {
                category: RiskCategory::Financial,
                description: "Liquidity below norm".into(),
                severity: Severity::High,
                score_contribution: 18,
                source: "infosphere".into(),
                evidence: Some(format!("liquidity ratio {:.2}", liquidity)),
            });
        } else {
            factors.push(RiskFactor {
                category: RiskCategory::Financial,
                description: "Healthy liquidity".into(),
                severity: Severity::Low,
                score_contribution: 0,
                source: "infosphere".into(),
                evidence: Some(format!("liquidity ratio {:.2}", liquidity)),
            });
        }
    }

    if let Some(debt) = analytics.debt_ratio {
        if debt > 0.8 {
            score += 20;
            factors.push(RiskFactor {
                category: RiskCategory::Financial,
                description: "High debt load".into(),
                severity: Severity::High,
                score_contribution: 20,
                source: "infosphere".into(),
                evidence: Some(format!("debt ratio {:.2}", debt)),
            });
        } else if debt > 0.6 {
            score += 10;
            factors.push(RiskFactor {
                category: RiskCategory::Financial,
                description: "Elevated debt load".into(),
                severity: Severity::Medium,
                score_contribution: 10,
                source: "infosphere".into(),
                evidence: Some(format!("debt ratio {:.2}", debt)),
            });
        }
    }

    if let Some(rating) = &analytics.credit_rating {
        let rating_upper = rating.to_uppercase();
        if LOW_RATINGS.iter().any(|r| rating_upper.contains(r)) {
            score += 25;
            factors.push(RiskFactor {
                category: RiskCategory::Financial,
                description: "Junk credit rating".into(),
                severity: Severity::Critical,
                score_contribution: 25,
                source: "infosphere".into(),
                evidence: Some(format!("credit rating {}", rating_upper)),
            });
        } else if MEDIUM_RATINGS.iter().any(|r| rating_upper.contains(r)) {
            score += 15;
            factors.push(RiskFactor {
                category: RiskCategory::Financial,
                description: "Speculative credit rating".into(),
                severity: Severity::High,
                score_contribution: 15,
                source: "infosphere".into(),
                evidence: Some(format!("credit rating {}", rating_upper)),
            });
        }
    }

    score.min(FINANCIAL_CAP)
}

fn reputation_risk(search_results: &[SearchFinding], factors: &mut Vec<RiskFactor>) -> u32 {
    let mut negative_count = 0u32;
    let mut scandal_count = 0u32;

    for finding in search_results {
        if finding.sentiment == Sentiment::Negative {
            negative_count += 1;
        }
        let text = format!("{} {}", finding.title, finding.content).to_lowercase();
        if SCANDAL_KEYWORDS.iter().any(|kw| text.contains(kw)) {
            scandal_count += 1;
        }
    }

    let score;
    if scandal_count > 0 {
        score = (10 + scandal_count * 3).min(REPUTATION_CAP);
        factors.push(RiskFactor {
            category: RiskCategory::Reputation,
            description: format!("Scandal or fraud mentions found ({})", scandal_count),
            severity: if scandal_count >= 2 {
                Severity::High
            } else {
                Severity::Medium
            },
            score_contribution: score as i32,
            source: "perplexity/tavily".into(),
            evidence: Some(format!("{} snippets with scandal markers", scandal_count)),
        });
    } else if negative_count > 3 {
        score = 15;
        factors.push(RiskFactor {
            category: RiskCategory::Reputation,
            description: format!("Multiple negative mentions ({})", negative_count),
            severity: Severity::Medium,
            score_contribution: 15,
            source: "perplexity/tavily".into(),
            evidence: Some(format!("{} negative search results", negative_count)),
        });
    } else if negative_count > 0 {
        score = 5;
        factors.push(RiskFactor {
            category: RiskCategory::Reputation,
            description: format!("Some negative mentions ({})", negative_count),
            severity: Severity::Low,
            score_contribution: 5,
            source: "perplexity/tavily".into(),
            evidence: Some(format!("{} negative search results", negative_count)),
        });
    } else {
        score = 0;
        factors.push(RiskFactor {
            category: RiskCategory::Reputation,
            description: "Reputation neutral or positive".into(),
            severity: Severity::Low,
            score_contribution: 0,
            source: "perplexity/tavily".into(),
            evidence: Some("no negative mentions found".into()),
        });
    }

    score.min(REPUTATION_CAP)
}

fn regulatory_risk(input: &ScoringInput, factors: &mut Vec<RiskFactor>) -> u32 {
    let mut score: u32 = 0;

    if let Some(registry) = &input.registry {
        if registry.sanctions_listed {
            score += 15;
            factors.push(RiskFactor {
                category: RiskCategory::Regulatory,
                description: "Listed in sanctions registries".into(),
                severity: Severity::High,
                score_contribution: 15,
                source: "dadata".into(),
                evidence: Some("registry sanctions flag".into()),
            });
        }
        if registry.tax_debt {
            score += 10;
            factors.push(RiskFactor {
                category: RiskCategory::Regulatory,
                description: "Outstanding tax debt marker".into(),
                severity: Severity::Medium,
                score_contribution: 10,
                source: "dadata".into(),
                evidence: Some("registry tax-debt flag".into()),
            });
        }
    }

    // Every matching result contributes; only the category total is capped.
    for finding in &input.search_results {
        let text = format!("{} {}", finding.title, finding.content).to_lowercase();
        if let Some(kw) = SANCTION_KEYWORDS.iter().find(|kw| text.contains(**kw)) {
            score += 15;
            factors.push(RiskFactor {
                category: RiskCategory::Regulatory,
                description: "Sanction restrictions mentioned in search".into(),
                severity: Severity::High,
                score_contribution: 15,
                source: finding.source.clone(),
                evidence: Some(format!("keyword match: {}", kw)),
            });
        }
        if let Some(kw) = REGULATORY_KEYWORDS.iter().find(|kw| text.contains(**kw)) {
            score += 5;
            factors.push(RiskFactor {
                category: RiskCategory::Regulatory,
                description: format!("Regulatory issues mentioned: {}", kw),
                severity: Severity::Medium,
                score_contribution: 5,
                source: finding.source.clone(),
                evidence: Some(format!("keyword match: {}", kw)),
            });
        }
    }

    if score == 0 {
        factors.push(RiskFactor {
            category: RiskCategory::Regulatory,
            description: "No regulatory problems found".into(),
            severity: Severity::Low,
            score_contribution: 0,
            source: "combined".into(),
            evidence: Some("no sanctions or penalties".into()),
        });
    }

    score.min(REGULATORY_CAP)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(status: &str) -> RegistryRecord {
        RegistryRecord {
            inn: "7736050003".into(),
            status: status.into(),
            ..Default::default()
        }
    }

    fn case(role: &str, category: &str) -> CourtCase {
        CourtCase {
            case_number: "А40-1/2023".into(),
            category: category.into(),
            role: role.into(),
            amount: None,
            started_at: None,
        }
    }

    fn finding(content: &str, sentiment: Sentiment) -> SearchFinding {
        SearchFinding {
            source: "tavily".into(),
            category: "news".into(),
            query: "q".into(),
            title: String::new(),
            content: content.into(),
            url: None,
            sentiment,
        }
    }

    #[test]
    fn test_normalized_score_range_property() {
        // Any raw in [0, MAX_POSSIBLE] lands in [0, 100].
        for raw in 0..=MAX_POSSIBLE {
            let score = normalized_score(raw);
            assert!(score <= 100, "raw {} gave {}", raw, score);
        }
        assert_eq!(normalized_score(0), 0);
        assert_eq!(normalized_score(MAX_POSSIBLE), 100);
    }

    #[test]
    fn test_rounding_half_up() {
        // 56/105*100 = 53.33 → 53; 58/105*100 = 55.24 → 55; 79/105*100 = 75.24 → 75
        assert_eq!(normalized_score(56), 53);
        // 63/105*100 = 60.0 exactly
        assert_eq!(normalized_score(63), 60);
        // 11/105*100 = 10.476 → 10; 12/105*100 = 11.43 → 11
        assert_eq!(normalized_score(11), 10);
        // Half-up at .5: 21/2... construct: raw where fraction is exactly .5
        // 105/2 = 52.5 → raw=52.5 not integer; use 0.5 boundary via 21: 21/105*100 = 20.0
        assert_eq!(normalized_score(21), 20);
    }

    #[test]
    fn test_liquidation_maxes_legal() {
        let input = ScoringInput {
            registry: Some(registry("LIQUIDATING")),
            ..Default::default()
        };
        let result = calculate_risk(&input);
        // Legal 40 + financial-missing 10 → 50/105 → 48
        assert_eq!(result.score, normalized_score(50));
        assert!(result
            .factors
            .iter()
            .any(|f| f.category == RiskCategory::Legal && f.score_contribution == 40));
    }

    #[test]
    fn test_bankruptcy_cases_dominate_defendant_count() {
        let mut cases = vec![case("defendant", "банкротство")];
        cases.extend((0..150).map(|_| case("defendant", "спор")));
        let input = ScoringInput {
            registry: Some(registry("ACTIVE")),
            cases,
            analytics: Some(AnalyticsRecord::default()),
            ..Default::default()
        };
        let result = calculate_risk(&input);
        let legal: i32 = result
            .factors
            .iter()
            .filter(|f| f.category == RiskCategory::Legal)
            .map(|f| f.score_contribution)
            .sum();
        // One bankruptcy case: 30 + 3 = 33; defendant tiers suppressed.
        assert_eq!(legal, 33);
    }

    #[test]
    fn test_defendant_tiers_normalized() {
        for (count, expected) in [(150, 25), (60, 20), (25, 15), (12, 10), (3, 5)] {
            let input = ScoringInput {
                cases: (0..count).map(|_| case("defendant", "спор")).collect(),
                analytics: Some(AnalyticsRecord::default()),
                ..Default::default()
            };
            let result = calculate_risk(&input);
            let legal: i32 = result
                .factors
                .iter()
                .filter(|f| f.category == RiskCategory::Legal && f.score_contribution > 0)
                .map(|f| f.score_contribution)
                .sum();
            assert_eq!(legal, expected, "count {}", count);
        }
    }

    #[test]
    fn test_plaintiff_discount() {
        let input = ScoringInput {
            cases: vec![
                case("defendant", "спор"),
                case("plaintiff", "взыскание"),
            ],
            analytics: Some(AnalyticsRecord::default()),
            ..Default::default()
        };
        let result = calculate_risk(&input);
        let legal: i32 = result
            .factors
            .iter()
            .filter(|f| f.category == RiskCategory::Legal)
            .map(|f| f.score_contribution)
            .sum();
        // 5 for one defendant case, -3 for plaintiff activity.
        assert_eq!(legal, 2);
    }

    #[test]
    fn test_financial_rules() {
        let input = ScoringInput {
            analytics: Some(AnalyticsRecord {
                inn: "x".into(),
                liquidity_ratio: Some(0.3),
                debt_ratio: Some(0.9),
                credit_rating: Some("CCC".into()),
                risk_flags: vec![],
            }),
            ..Default::default()
        };
        let result = calculate_risk(&input);
        let financial: i32 = result
            .factors
            .iter()
            .filter(|f| f.category == RiskCategory::Financial)
            .map(|f| f.score_contribution)
            .sum();
        // 28 + 20 + 25 = 73, but the category caps at 30.
        assert_eq!(financial, 73);
        let capped = calculate_risk(&input);
        // Raw cap reflected in the final: 40-cat legal 0, fin 30, rest 0 → 30/105.
        assert_eq!(capped.score, normalized_score(30));
    }

    #[test]
    fn test_missing_analytics_penalty() {
        let input = ScoringInput::default();
        let result = calculate_risk(&input);
        assert!(result
            .factors
            .iter()
            .any(|f| f.description.contains("Financial data unavailable")));
        assert_eq!(result.score, normalized_score(10));
    }

    #[test]
    fn test_reputation_scandals() {
        let input = ScoringInput {
            analytics: Some(AnalyticsRecord::default()),
            search_results: vec![
                finding("компания попала в скандал", Sentiment::Negative),
                finding("обвинения в мошенничестве", Sentiment::Negative),
            ],
            ..Default::default()
        };
        let result = calculate_risk(&input);
        let reputation: i32 = result
            .factors
            .iter()
            .filter(|f| f.category == RiskCategory::Reputation)
            .map(|f| f.score_contribution)
            .sum();
        // 10 + 2*3 = 16
        assert_eq!(reputation, 16);
    }

    #[test]
    fn test_regulatory_registry_flags() {
        let mut record = registry("ACTIVE");
        record.sanctions_listed = true;
        record.tax_debt = true;
        let input = ScoringInput {
            registry: Some(record),
            analytics: Some(AnalyticsRecord::default()),
            ..Default::default()
        };
        let result = calculate_risk(&input);
        let regulatory: u32 = result
            .factors
            .iter()
            .filter(|f| f.category == RiskCategory::Regulatory && f.score_contribution > 0)
            .map(|f| f.score_contribution as u32)
            .sum();
        // 15 + 10 raw, capped to 15 in the category sum.
        assert_eq!(regulatory, 25);
        assert_eq!(result.score, normalized_score(15));
    }

    #[test]
    fn test_regulatory_counts_every_matching_result() {
        let input = ScoringInput {
            analytics: Some(AnalyticsRecord::default()),
            search_results: vec![
                finding("компании выписан штраф за нарушение", Sentiment::Neutral),
                finding("началась проверка фнс", Sentiment::Neutral),
            ],
            ..Default::default()
        };
        let result = calculate_risk(&input);
        let regulatory: i32 = result
            .factors
            .iter()
            .filter(|f| f.category == RiskCategory::Regulatory)
            .map(|f| f.score_contribution)
            .sum();
        // Each matching result contributes its own +5.
        assert_eq!(regulatory, 10);
        assert_eq!(result.score, normalized_score(10));
    }

    #[test]
    fn test_regulatory_category_capped() {
        let input = ScoringInput {
            analytics: Some(AnalyticsRecord::default()),
            search_results: vec![
                finding("введены санкции против компании", Sentiment::Neutral),
                finding("санкционный список пополнился", Sentiment::Neutral),
            ],
            ..Default::default()
        };
        let result = calculate_risk(&input);
        // Raw 15 + 15, but the category sum caps at 15.
        assert_eq!(result.score, normalized_score(REGULATORY_CAP));
    }

    #[test]
    fn test_determinism() {
        let input = ScoringInput {
            registry: Some(registry("ACTIVE")),
            cases: (0..30).map(|_| case("defendant", "спор")).collect(),
            analytics: Some(AnalyticsRecord {
                inn: "x".into(),
                liquidity_ratio: Some(0.8),
                debt_ratio: None,
                credit_rating: None,
                risk_flags: vec![],
            }),
            search_results: vec![finding("жалобы клиентов", Sentiment::Negative)],
        };
        let first = calculate_risk(&input);
        for _ in 0..5 {
            let next = calculate_risk(&input);
            assert_eq!(next.score, first.score);
            assert_eq!(next.level, first.level);
            assert_eq!(next.factors.len(), first.factors.len());
        }
    }

    #[test]
    fn test_factor_lines_skip_zero_contributions() {
        let input = ScoringInput {
            registry: Some(registry("ACTIVE")),
            analytics: Some(AnalyticsRecord::default()),
            ..Default::default()
        };
        let result = calculate_risk(&input);
        assert!(result
            .factor_lines()
            .iter()
            .all(|line| !line.contains("active and registered")));
    }

    #[test]
    fn test_from_evidence() {
        let mut source_data = BTreeMap::new();
        source_data.insert(
            "dadata".to_string(),
            SourceResultEnvelope::success(
                "dadata",
                serde_json::to_value(registry("ACTIVE")).unwrap(),
                10,
            ),
        );
        source_data.insert(
            "casebook".to_string(),
            SourceResultEnvelope::success(
                "casebook",
                serde_json::json!({"cases": [case("defendant", "спор")], "pages_fetched": 1, "truncated": false}),
                10,
            ),
        );
        source_data.insert(
            "infosphere".to_string(),
            SourceResultEnvelope::failed("infosphere", "503".into(), 10),
        );

        let input = ScoringInput::from_evidence(&source_data, &[]);
        assert!(input.registry.is_some());
        assert_eq!(input.cases.len(), 1);
        assert!(input.analytics.is_none(), "failed envelope leaves slot empty");
    }
}

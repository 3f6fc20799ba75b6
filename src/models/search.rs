//! Search Finding Model
//!
//! One web-search snippet with its deterministic sentiment annotation.

use serde::{Deserialize, Serialize};

use super::report::Sentiment;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchFinding {
    /// Which search provider produced it
    pub source: String,
    /// Plan category the driving query belonged to
    pub category: String,
    pub query: String,
    #[serde(default)]
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub sentiment: Sentiment,
}

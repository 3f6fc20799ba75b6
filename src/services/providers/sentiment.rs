//! Snippet Sentiment Labeling
//!
//! Deterministic lexicon rule for annotating web-search snippets. Counts
//! positive and negative keyword hits; ties and empty texts are neutral.
//! This is deliberately not an LLM call: annotations must be reproducible.

use crate::models::Sentiment;

/// Russian-domain keyword lists. Matching is lowercase substring search, so
/// inflected forms hit their stems.
pub struct SentimentLexicon {
    negative: &'static [&'static str],
    positive: &'static [&'static str],
}

pub const NEGATIVE_KEYWORDS: &[&str] = &[
    "скандал",
    "мошеннич",
    "обман",
    "уголовное дело",
    "банкрот",
    "ликвидац",
    "долги",
    "неплатеж",
    "жалоб",
    "претензи",
    "штраф",
    "санкци",
    "арест",
    "фальсифик",
];

pub const POSITIVE_KEYWORDS: &[&str] = &[
    "надежн",
    "лидер рынка",
    "награ",
    "рост выручки",
    "успешн",
    "положительные отзывы",
    "рекоменду",
    "стабильн",
    "партнерств",
];

impl Default for SentimentLexicon {
    fn default() -> Self {
        Self {
            negative: NEGATIVE_KEYWORDS,
            positive: POSITIVE_KEYWORDS,
        }
    }
}

impl SentimentLexicon {
    pub fn label(&self, text: &str) -> Sentiment {
        let lowered = text.to_lowercase();
        let negative_hits = self
            .negative
            .iter()
            .filter(|kw| lowered.contains(**kw))
            .count();
        let positive_hits = self
            .positive
            .iter()
            .filter(|kw| lowered.contains(**kw))
            .count();

        if negative_hits > positive_hits {
            Sentiment::Negative
        } else if positive_hits > negative_hits {
            Sentiment::Positive
        } else {
            Sentiment::Neutral
        }
    }
}

/// Label with the default lexicon.
pub fn label_text(text: &str) -> Sentiment {
    SentimentLexicon::default().label(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_detection() {
        assert_eq!(
            label_text("Компания замешана в скандале с неплатежами"),
            Sentiment::Negative
        );
        assert_eq!(
            label_text("суд начал дело о банкротстве подрядчика"),
            Sentiment::Negative
        );
    }

    #[test]
    fn test_positive_detection() {
        assert_eq!(
            label_text("Надежный поставщик, положительные отзывы клиентов"),
            Sentiment::Positive
        );
    }

    #[test]
    fn test_neutral_default() {
        assert_eq!(label_text("Компания зарегистрирована в Москве"), Sentiment::Neutral);
        assert_eq!(label_text(""), Sentiment::Neutral);
    }

    #[test]
    fn test_tie_is_neutral() {
        assert_eq!(
            label_text("успешная компания, но были жалобы"),
            Sentiment::Neutral
        );
    }

    #[test]
    fn test_determinism() {
        let text = "штрафы и претензии к надежному партнеру";
        let first = label_text(text);
        for _ in 0..10 {
            assert_eq!(label_text(text), first);
        }
    }
}

//! Keyword-based text analysis attached to single-email API responses.

use std::collections::HashMap;
use std::sync::LazyLock;

use mailsort_core::{Category, Priority, Sentiment};
use regex::Regex;
use serde::Serialize;

use crate::retrieval::extract_product_codes;

const MAX_KEYWORDS: usize = 10;

const POSITIVE_KEYWORDS: &[&str] = &[
    "thank",
    "great",
    "excellent",
    "wonderful",
    "amazing",
    "love",
    "perfect",
    "satisfied",
    "happy",
    "pleased",
];

const NEGATIVE_KEYWORDS: &[&str] = &[
    "terrible",
    "awful",
    "bad",
    "horrible",
    "disappointed",
    "angry",
    "frustrated",
    "upset",
    "unhappy",
    "hate",
    "worst",
];

const URGENT_KEYWORDS: &[&str] = &[
    "urgent",
    "emergency",
    "asap",
    "immediately",
    "right away",
    "as soon as possible",
];

const STOP_WORDS: &[&str] = &[
    "the", "and", "but", "for", "with", "from", "about", "into", "through", "during", "before",
    "after", "above", "below", "between", "among", "are", "was", "were", "been", "being", "have",
    "has", "had", "does", "did", "will", "would", "could", "should", "may", "might", "can", "you",
    "your", "this", "that", "these", "those", "there", "their", "what", "which", "who", "its",
    "our", "not", "any", "all", "also", "just", "than", "then", "them", "they", "she", "him",
    "her", "his", "hi", "hello", "dear", "thanks", "regards",
];

static WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-zA-Z]{3,}\b").expect("Invalid regex"));

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").expect("Invalid regex")
});

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}[-.]?\d{3}[-.]?\d{4}\b").expect("Invalid regex"));

static ORDER_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\border\b|#)\s*(?:number|no\.?)?\s*[-:#]?\s*(\d[a-z0-9-]*)")
        .expect("Invalid regex")
});

static MONEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\d+(?:\.\d{2})?").expect("Invalid regex"));

/// Kind of extracted entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Email,
    Phone,
    OrderId,
    Money,
    ProductCode,
}

/// A value found in the text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entity {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub value: String,
}

/// Analysis of one email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextAnalysis {
    pub sentiment: Sentiment,
    pub keywords: Vec<String>,
    pub entities: Vec<Entity>,
    pub priority: Priority,
}

/// Keyword-based sentiment: more positive than negative hits is positive.
#[must_use]
pub fn sentiment(text: &str) -> Sentiment {
    let lower = text.to_lowercase();
    let positive = count_hits(&lower, POSITIVE_KEYWORDS);
    let negative = count_hits(&lower, NEGATIVE_KEYWORDS);

    match positive.cmp(&negative) {
        std::cmp::Ordering::Greater => Sentiment::Positive,
        std::cmp::Ordering::Less => Sentiment::Negative,
        std::cmp::Ordering::Equal => Sentiment::Neutral,
    }
}

/// Most frequent words of three or more letters, stop words removed.
///
/// Ties keep the order of first appearance.
#[must_use]
pub fn keywords(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();

    for (position, word) in WORD_RE.find_iter(&lower).map(|m| m.as_str()).enumerate() {
        if STOP_WORDS.contains(&word) {
            continue;
        }
        counts.entry(word).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<(&str, usize, usize)> = counts
        .into_iter()
        .map(|(word, (count, first))| (word, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    ranked
        .into_iter()
        .take(MAX_KEYWORDS)
        .map(|(word, _, _)| word.to_string())
        .collect()
}

/// Email addresses, phone numbers, order numbers, money amounts, and
/// product codes.
#[must_use]
pub fn entities(text: &str) -> Vec<Entity> {
    let entity = |kind, value: &str| Entity {
        kind,
        value: value.to_string(),
    };

    let mut found: Vec<Entity> = EMAIL_RE
        .find_iter(text)
        .map(|m| entity(EntityKind::Email, m.as_str()))
        .collect();
    found.extend(
        PHONE_RE
            .find_iter(text)
            .map(|m| entity(EntityKind::Phone, m.as_str())),
    );
    found.extend(
        ORDER_NUMBER_RE
            .captures_iter(text)
            .filter_map(|caps| caps.get(1))
            .map(|m| entity(EntityKind::OrderId, m.as_str())),
    );
    found.extend(
        MONEY_RE
            .find_iter(text)
            .map(|m| entity(EntityKind::Money, m.as_str())),
    );
    found.extend(
        extract_product_codes(text)
            .into_iter()
            .map(|value| Entity {
                kind: EntityKind::ProductCode,
                value,
            }),
    );
    found
}

/// Urgent wording wins, then negative sentiment, then order requests.
#[must_use]
pub fn priority(text: &str, sentiment: Sentiment, category: Option<Category>) -> Priority {
    if count_hits(&text.to_lowercase(), URGENT_KEYWORDS) > 0 {
        Priority::Urgent
    } else if sentiment == Sentiment::Negative {
        Priority::High
    } else if category == Some(Category::OrderRequest) {
        Priority::Medium
    } else {
        Priority::Low
    }
}

/// Run every analysis over `text`.
#[must_use]
pub fn analyze(text: &str, category: Option<Category>) -> TextAnalysis {
    let sentiment = sentiment(text);
    TextAnalysis {
        sentiment,
        keywords: keywords(text),
        entities: entities(text),
        priority: priority(text, sentiment, category),
    }
}

fn count_hits(lower: &str, list: &[&str]) -> usize {
    list.iter().filter(|keyword| lower.contains(*keyword)).count()
}

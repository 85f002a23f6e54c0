//! Email classification.
//!
//! Asks the LLM for a `{"category", "confidence"}` JSON object. Any failure
//! (API error, malformed reply, unknown label) falls back to keyword
//! matching, so classification always yields one of the two categories.

use std::borrow::Cow;
use std::time::Instant;

use askama::Template;
use mailsort_core::{
    Category, CategoryDistribution, ClassificationResult, ClassificationSource, Email,
};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::openai::{CompletionOptions, OpenAiClient};

use super::orders::heuristic_lines;

const SYSTEM_PROMPT: &str = "You are an email classification system for a fashion store's \
    customer support team. Answer with JSON only.";

const MAX_SUBJECT_CHARS: usize = 200;
const MAX_BODY_CHARS: usize = 2000;
const CLASSIFY_MAX_TOKENS: u32 = 50;

/// Log progress every this many emails in a batch.
pub const PROGRESS_INTERVAL: usize = 10;

/// Phrases that signal purchase intent.
const ORDER_KEYWORDS: &[&str] = &[
    "order",
    "buy",
    "purchase",
    "i want",
    "i'd like to get",
    "i would like to get",
    "please send",
    "send me",
    "ship me",
    "i'll take",
    "i will take",
    "add to my",
    "checkout",
];

const FALLBACK_BASE_CONFIDENCE: f32 = 0.5;
const FALLBACK_STEP: f32 = 0.1;
const FALLBACK_MAX_CONFIDENCE: f32 = 0.8;

#[derive(Template)]
#[template(path = "prompts/classify.txt")]
struct ClassifyPrompt<'a> {
    subject: &'a str,
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct ClassificationReply {
    category: String,
    #[serde(default)]
    confidence: Option<serde_json::Value>,
}

/// Classifies emails as product inquiries or order requests.
#[derive(Clone, Default)]
pub struct EmailClassifier {
    llm: Option<OpenAiClient>,
}

impl EmailClassifier {
    /// Create a classifier. Without a client every email takes the keyword path.
    #[must_use]
    pub const fn new(llm: Option<OpenAiClient>) -> Self {
        Self { llm }
    }

    /// Classify one email.
    #[instrument(skip(self, email), fields(email_id = %email.id))]
    pub async fn classify(&self, email: &Email) -> ClassificationResult {
        if let Some(llm) = &self.llm {
            match self.classify_with_llm(llm, email).await {
                Ok((category, confidence)) => {
                    debug!(%category, confidence, "Classified by LLM");
                    return ClassificationResult::new(
                        email.id.clone(),
                        category,
                        confidence,
                        ClassificationSource::Llm,
                    );
                }
                Err(reason) => warn!(%reason, "LLM classification failed, using keywords"),
            }
        }

        let (category, confidence) = classify_by_keywords(&email.subject, &email.body);
        debug!(%category, confidence, "Classified by keywords");
        ClassificationResult::new(
            email.id.clone(),
            category,
            confidence,
            ClassificationSource::Keywords,
        )
    }

    /// Classify a list of emails sequentially, preserving order.
    ///
    /// Logs progress every [`PROGRESS_INTERVAL`] emails and the category
    /// distribution at the end.
    pub async fn classify_batch(&self, emails: &[Email]) -> Vec<ClassificationResult> {
        let started = Instant::now();
        let total = emails.len();
        info!(total, "Starting classification");

        let mut results = Vec::with_capacity(total);
        for (index, email) in emails.iter().enumerate() {
            results.push(self.classify(email).await);
            log_progress(index + 1, total, started);
        }

        let distribution = CategoryDistribution::from_results(&results);
        log_distribution(&distribution);
        info!(
            total,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Classification complete"
        );
        results
    }

    async fn classify_with_llm(
        &self,
        llm: &OpenAiClient,
        email: &Email,
    ) -> Result<(Category, f32), String> {
        let subject = truncate_chars(&email.subject, MAX_SUBJECT_CHARS);
        let body = truncate_chars(&email.body, MAX_BODY_CHARS);
        let prompt = ClassifyPrompt {
            subject: &subject,
            body: &body,
        }
        .render()
        .map_err(|e| format!("prompt render failed: {e}"))?;

        let reply = llm
            .complete(SYSTEM_PROMPT, &prompt, CompletionOptions::json(CLASSIFY_MAX_TOKENS))
            .await
            .map_err(|e| e.to_string())?;

        parse_classification(&reply)
    }
}

/// Log `Progress: n/total` every [`PROGRESS_INTERVAL`] items.
pub fn log_progress(done: usize, total: usize, started: Instant) {
    if done % PROGRESS_INTERVAL != 0 {
        return;
    }
    #[allow(clippy::cast_precision_loss)]
    let percent = done as f64 / total.max(1) as f64 * 100.0;
    info!(
        done,
        total,
        percent = %format!("{percent:.1}"),
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "Progress"
    );
}

/// Log one line per category with count and percentage.
pub fn log_distribution(distribution: &CategoryDistribution) {
    for (category, count) in distribution.iter() {
        info!(
            %category,
            count,
            percent = %format!("{:.1}", distribution.percentage(category)),
            "Category distribution"
        );
    }
}

/// Parse an LLM classification reply.
///
/// Accepts a JSON object (optionally inside a code fence) or a bare label.
/// Confidence defaults to 1.0 for a bare label and 0.9 when missing from the
/// object.
///
/// # Errors
///
/// Returns a description of the problem when no valid category is found.
pub fn parse_classification(reply: &str) -> Result<(Category, f32), String> {
    let cleaned = strip_code_fence(reply);

    if cleaned.starts_with('{') {
        let parsed: ClassificationReply =
            serde_json::from_str(cleaned).map_err(|e| format!("invalid JSON reply: {e}"))?;
        let category = parsed.category.parse::<Category>()?;
        let confidence = parsed
            .confidence
            .as_ref()
            .and_then(confidence_value)
            .unwrap_or(0.9);
        return Ok((category, confidence));
    }

    let label = cleaned.trim_matches(|c: char| c == '"' || c == '.' || c.is_whitespace());
    label.parse::<Category>().map(|category| (category, 1.0))
}

/// Confidence as a number or a numeric string.
#[allow(clippy::cast_possible_truncation)]
fn confidence_value(value: &serde_json::Value) -> Option<f32> {
    match value {
        serde_json::Value::Number(n) => n.as_f64().map(|v| v as f32),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Remove a surrounding Markdown code fence, if any.
#[must_use]
pub fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    // Drop a language tag such as `json`.
    let inner = match inner.find('\n') {
        Some(newline)
            if !inner
                .get(..newline)
                .unwrap_or_default()
                .trim_start()
                .starts_with(['{', '[']) =>
        {
            inner.get(newline + 1..).unwrap_or(inner)
        }
        _ => inner,
    };
    inner.trim()
}

/// Keyword-based classification.
///
/// Each order keyword found (case-insensitive) adds a hit, as does an
/// explicit product code with a stated quantity. Any hit means an order
/// request. Confidence starts at 0.5 and rises by 0.1 per hit, capped at 0.8.
#[must_use]
pub fn classify_by_keywords(subject: &str, body: &str) -> (Category, f32) {
    let text = format!("{subject}\n{body}");
    let lower = text.to_lowercase();

    let mut hits = ORDER_KEYWORDS
        .iter()
        .filter(|keyword| lower.contains(*keyword))
        .count();
    if heuristic_lines(&text).iter().any(|line| line.explicit_quantity) {
        hits += 1;
    }

    let category = if hits > 0 {
        Category::OrderRequest
    } else {
        Category::ProductInquiry
    };

    #[allow(clippy::cast_precision_loss)]
    let confidence =
        (FALLBACK_STEP.mul_add(hits as f32, FALLBACK_BASE_CONFIDENCE)).min(FALLBACK_MAX_CONFIDENCE);
    (category, confidence)
}

/// Truncate to `max` characters, appending `...` when cut.
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> Cow<'_, str> {
    match text.char_indices().nth(max) {
        Some((cut, _)) => Cow::Owned(format!("{}...", text.get(..cut).unwrap_or(text))),
        None => Cow::Borrowed(text),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdef", 3), "abc...");
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo...");
        assert_eq!(truncate_chars("exact", 5), "exact");
    }

    #[test]
    fn test_parse_classification_json() {
        let (category, confidence) =
            parse_classification(r#"{"category": "order request", "confidence": 0.92}"#).unwrap();
        assert_eq!(category, Category::OrderRequest);
        assert!((confidence - 0.92).abs() < 1e-6);
    }

    #[test]
    fn test_parse_classification_code_fence_and_string_confidence() {
        let reply = "```json\n{\"category\": \"Product Inquiry\", \"confidence\": \"0.7\"}\n```";
        let (category, confidence) = parse_classification(reply).unwrap();
        assert_eq!(category, Category::ProductInquiry);
        assert!((confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_parse_classification_bare_label() {
        let (category, confidence) = parse_classification("\"order request\".").unwrap();
        assert_eq!(category, Category::OrderRequest);
        assert!((confidence - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_parse_classification_rejects_unknown() {
        assert!(parse_classification(r#"{"category": "complaint"}"#).is_err());
        assert!(parse_classification("spam").is_err());
        assert!(parse_classification("{not json").is_err());
    }

    #[test]
    fn test_keywords_order_request() {
        let (category, confidence) =
            classify_by_keywords("Order", "I want to order two pairs of boots.");
        assert_eq!(category, Category::OrderRequest);
        // "order" and "i want"
        assert!((confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_keywords_product_code_with_quantity() {
        let (category, _) = classify_by_keywords("Hello", "3 x LTH0976 please");
        assert_eq!(category, Category::OrderRequest);
    }

    #[test]
    fn test_keywords_shoe_size_is_not_an_order() {
        let (category, confidence) =
            classify_by_keywords("Sizing", "I wear size 42. Is CBT8901 true to size?");
        assert_eq!(category, Category::ProductInquiry);
        assert!((confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_keywords_inquiry_and_cap() {
        let (category, confidence) =
            classify_by_keywords("Question", "Is the wool beret warm enough for winter?");
        assert_eq!(category, Category::ProductInquiry);
        assert!((confidence - 0.5).abs() < 1e-6);

        let (_, confidence) = classify_by_keywords(
            "Order: buy now",
            "I want to purchase this, please send it, ship me, checkout",
        );
        assert!((confidence - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_classify_without_llm_uses_keywords() {
        let classifier = EmailClassifier::new(None);
        let email = Email::new("E001", "Buying", "I would like to buy the leather wallet");
        let result = classifier.classify(&email).await;
        assert_eq!(result.category, Category::OrderRequest);
        assert_eq!(result.source, ClassificationSource::Keywords);
        assert_eq!(result.email_id.as_str(), "E001");
    }

    #[tokio::test]
    async fn test_classify_batch_preserves_order() {
        let classifier = EmailClassifier::default();
        let emails: Vec<Email> = (0..12)
            .map(|i| {
                let body = if i % 2 == 0 { "please send me one" } else { "what colours exist?" };
                Email::new(format!("E{i:03}"), "", body)
            })
            .collect();

        let results = classifier.classify_batch(&emails).await;
        assert_eq!(results.len(), 12);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.email_id.as_str(), format!("E{i:03}"));
            let expected = if i % 2 == 0 {
                Category::OrderRequest
            } else {
                Category::ProductInquiry
            };
            assert_eq!(result.category, expected);
        }
    }
}

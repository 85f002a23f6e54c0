//! Order request processing.
//!
//! Extracts `(product, quantity)` lines from an email, resolves each line to
//! a catalog product, and applies the lines to the stock table. Matching
//! runs against a catalog snapshot; the stock decrements for one email are
//! applied under a single write lock.

use std::sync::LazyLock;

use askama::Template;
use mailsort_core::{
    Email, EmailId, Inventory, InventoryError, LineStatus, OrderLineResult, OrderSummary, Product,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::openai::{CompletionOptions, OpenAiClient};
use crate::retrieval::{ProductMatcher, product_code_spans};

use super::classifier::{strip_code_fence, truncate_chars};

const SYSTEM_PROMPT: &str = "You extract order lines from customer emails for a fashion store. \
    Answer with JSON only.";

const EXTRACT_MAX_TOKENS: u32 = 300;
const MAX_BODY_CHARS: usize = 2000;

/// How far (in bytes) before a product mention a quantity may appear.
const QUANTITY_WINDOW: usize = 48;

/// `2 x `, `3× [` or a bare `2 ` at the very end of the text before a code.
/// A preceding size marker is captured so `size 42 CBT8901` can be rejected.
static QUANTITY_ADJACENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\b(size|sz|eu|us|uk)\s*)?\b(\d{1,3})\s*(x|×)?\s*[\[(]?\s*$")
        .expect("Invalid regex")
});

/// `2 pairs of`, `one piece`, `three units` anywhere in the window.
static QUANTITY_UNIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(\d{1,3}|one|two|three|four|five|six|seven|eight|nine|ten)\s+(?:pairs?|pcs|pieces?|units?)\b",
    )
    .expect("Invalid regex")
});

static NUMBER_WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(one|two|three|four|five|six|seven|eight|nine|ten)\b")
        .expect("Invalid regex")
});

static QUANTITY_AFTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^[\s\])]*(?:(?:x|×|qty:?|quantity:?)\s*(\d{1,3})\b|\(?\s*(\d{1,3})\s*(?:pcs|pieces|units|pairs)\b)",
    )
    .expect("Invalid regex")
});

#[derive(Template)]
#[template(path = "prompts/extract_order.txt")]
struct ExtractOrderPrompt<'a> {
    subject: &'a str,
    body: &'a str,
}

/// One requested line before matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedLine {
    /// Product ID or name as written by the customer.
    pub reference: String,
    /// Requested units, at least 1.
    pub quantity: u32,
    /// Whether the quantity was stated rather than defaulted.
    pub explicit_quantity: bool,
}

impl ExtractedLine {
    fn new(reference: impl Into<String>, quantity: Option<u32>) -> Self {
        Self {
            reference: reference.into(),
            quantity: quantity.unwrap_or(1).max(1),
            explicit_quantity: quantity.is_some(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExtractionReply {
    Wrapped { items: Vec<RawLine> },
    Bare(Vec<RawLine>),
}

#[derive(Debug, Deserialize)]
struct RawLine {
    #[serde(alias = "product_id", alias = "name")]
    product: String,
    #[serde(default)]
    quantity: Option<serde_json::Value>,
}

/// Extracts, matches, and applies order lines.
#[derive(Clone, Default)]
pub struct OrderProcessor {
    llm: Option<OpenAiClient>,
    matcher: ProductMatcher,
}

impl OrderProcessor {
    #[must_use]
    pub const fn new(llm: Option<OpenAiClient>, matcher: ProductMatcher) -> Self {
        Self { llm, matcher }
    }

    /// Process one order request against the shared stock table.
    #[instrument(skip(self, email, inventory), fields(email_id = %email.id))]
    pub async fn process(&self, email: &Email, inventory: &RwLock<Inventory>) -> OrderSummary {
        let catalog = inventory.read().await.products().to_vec();
        let lines = self.extract_lines(email, &catalog).await;

        let mut resolved = Vec::with_capacity(lines.len());
        for line in lines {
            let matched = self
                .matcher
                .find(&line.reference, &catalog)
                .await
                .map(|found| found.product);
            resolved.push((line, matched));
        }

        let results = {
            let mut inventory = inventory.write().await;
            apply_lines(&email.id, resolved, &mut inventory)
        };

        let summary = OrderSummary::from_lines(email.id.clone(), results);
        info!(
            lines = summary.lines.len(),
            items_created = summary.items_created(),
            total = %summary.total(),
            outcome = %summary.outcome,
            "Processed order"
        );
        summary
    }

    /// Extract requested lines: LLM first, then product codes in the text,
    /// then catalog names mentioned in the text.
    pub async fn extract_lines(&self, email: &Email, catalog: &[Product]) -> Vec<ExtractedLine> {
        if let Some(llm) = &self.llm {
            match extract_with_llm(llm, email).await {
                Ok(lines) if !lines.is_empty() => {
                    debug!(lines = lines.len(), "Extracted order lines with LLM");
                    return lines;
                }
                Ok(_) => debug!("LLM found no order lines, trying heuristics"),
                Err(reason) => warn!(%reason, "LLM order extraction failed, using heuristics"),
            }
        }

        let text = email.full_text();
        let lines = heuristic_lines(&text);
        if !lines.is_empty() {
            return lines;
        }
        name_mentions(&text, catalog)
    }
}

async fn extract_with_llm(llm: &OpenAiClient, email: &Email) -> Result<Vec<ExtractedLine>, String> {
    let body = truncate_chars(&email.body, MAX_BODY_CHARS);
    let prompt = ExtractOrderPrompt {
        subject: &email.subject,
        body: &body,
    }
    .render()
    .map_err(|e| format!("prompt render failed: {e}"))?;

    let reply = llm
        .complete(SYSTEM_PROMPT, &prompt, CompletionOptions::json(EXTRACT_MAX_TOKENS))
        .await
        .map_err(|e| e.to_string())?;

    parse_extraction(&reply)
}

/// Parse an extraction reply: `{"items": [...]}` or a bare array.
///
/// Quantities may be numbers or numeric strings; missing or non-positive
/// quantities become 1. Lines with a blank product are dropped.
///
/// # Errors
///
/// Returns a description of the problem if the reply is not valid JSON of
/// either shape.
pub fn parse_extraction(reply: &str) -> Result<Vec<ExtractedLine>, String> {
    let parsed: ExtractionReply = serde_json::from_str(strip_code_fence(reply))
        .map_err(|e| format!("invalid extraction reply: {e}"))?;
    let raw = match parsed {
        ExtractionReply::Wrapped { items } | ExtractionReply::Bare(items) => items,
    };

    Ok(raw
        .into_iter()
        .filter(|line| !line.product.trim().is_empty())
        .map(|line| {
            let quantity = line.quantity.as_ref().and_then(quantity_value);
            ExtractedLine::new(line.product.trim(), quantity)
        })
        .collect())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn quantity_value(value: &serde_json::Value) -> Option<u32> {
    match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|v| *v >= 0.0).map(|v| v.round() as u64))
            .map(|v| u32::try_from(v).unwrap_or(u32::MAX)),
        serde_json::Value::String(s) => parse_quantity(s.trim()),
        _ => None,
    }
}

/// Product codes in the text, each with a quantity found next to it.
///
/// A quantity is taken from just before the code (`2 x LTH0976`,
/// `three CBT8901`) or just after it (`LTH0976 x2`, `[CBT 89 01] (3 pcs)`).
/// A code mentioned twice yields one line.
#[must_use]
pub fn heuristic_lines(text: &str) -> Vec<ExtractedLine> {
    let spans = product_code_spans(text);
    let mut lines: Vec<ExtractedLine> = Vec::new();

    for (index, (range, code)) in spans.iter().enumerate() {
        let before_start = index
            .checked_sub(1)
            .and_then(|prev| spans.get(prev))
            .map_or(0, |(prev, _)| prev.end);
        let after_end = spans.get(index + 1).map_or(text.len(), |(next, _)| next.start);

        let before = text.get(before_start..range.start).unwrap_or_default();
        let after = text.get(range.end..after_end).unwrap_or_default();
        let quantity = quantity_after(after).or_else(|| quantity_before(before));

        match lines.iter_mut().find(|line| line.reference == *code) {
            Some(existing) => {
                if !existing.explicit_quantity && quantity.is_some() {
                    *existing = ExtractedLine::new(code.clone(), quantity);
                }
            }
            None => lines.push(ExtractedLine::new(code.clone(), quantity)),
        }
    }

    lines
}

/// Catalog products whose name appears in the text.
fn name_mentions(text: &str, catalog: &[Product]) -> Vec<ExtractedLine> {
    let lower = text.to_lowercase();
    catalog
        .iter()
        .filter_map(|product| {
            let name = product.name.trim().to_lowercase();
            if name.is_empty() {
                return None;
            }
            let position = lower.find(&name)?;
            let before = lower.get(..position).unwrap_or_default();
            Some(ExtractedLine::new(product.id.as_str(), quantity_before(before)))
        })
        .collect()
}

/// Quantity stated in front of a product mention.
///
/// In order of preference: `N x` right before the mention, `N pairs`/`one
/// piece` style counts, a number word, then bare digits right before the
/// mention. Digits after `size`, `EU`, `US` or `UK` are never a quantity.
fn quantity_before(before: &str) -> Option<u32> {
    let window = tail(before, QUANTITY_WINDOW);

    let adjacent = QUANTITY_ADJACENT_RE.captures(window);
    let multiplied = adjacent
        .as_ref()
        .filter(|caps| caps.get(3).is_some())
        .and_then(|caps| caps.get(2));
    let bare = adjacent
        .as_ref()
        .filter(|caps| caps.get(1).is_none() && caps.get(3).is_none())
        .and_then(|caps| caps.get(2));

    multiplied
        .or_else(|| {
            QUANTITY_UNIT_RE
                .captures_iter(window)
                .last()
                .and_then(|caps| caps.get(1))
        })
        .or_else(|| NUMBER_WORD_RE.find_iter(window).last())
        .or(bare)
        .and_then(|m| parse_quantity(m.as_str()))
}

/// The last `max_bytes` of `text`, moved forward to a char boundary.
fn tail(text: &str, max_bytes: usize) -> &str {
    let start = text.len().saturating_sub(max_bytes);
    (start..=text.len())
        .find_map(|index| text.get(index..))
        .unwrap_or_default()
}

fn quantity_after(after: &str) -> Option<u32> {
    let caps = QUANTITY_AFTER_RE.captures(after)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .and_then(|m| parse_quantity(m.as_str()))
}

/// Digits or a number word from one to ten.
fn parse_quantity(raw: &str) -> Option<u32> {
    let quantity = match raw.to_ascii_lowercase().as_str() {
        "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        "seven" => 7,
        "eight" => 8,
        "nine" => 9,
        "ten" => 10,
        digits => digits.parse().ok()?,
    };
    Some(quantity)
}

/// Apply resolved lines to the stock table, in order.
///
/// Unmatched lines are `not found`; lines exceeding the remaining stock are
/// `out of stock` and leave stock unchanged.
pub fn apply_lines(
    email_id: &EmailId,
    resolved: Vec<(ExtractedLine, Option<Product>)>,
    inventory: &mut Inventory,
) -> Vec<OrderLineResult> {
    resolved
        .into_iter()
        .map(|(line, product)| {
            let Some(product) = product else {
                return OrderLineResult {
                    email_id: email_id.clone(),
                    error: Some(format!("no catalog product matches \"{}\"", line.reference)),
                    reference: line.reference,
                    product_id: None,
                    quantity: line.quantity,
                    status: LineStatus::NotFound,
                    unit_price: None,
                };
            };

            let (status, error) = match inventory.apply_order(&product.id, line.quantity) {
                Ok(change) => {
                    debug!(
                        product_id = %product.id,
                        quantity = line.quantity,
                        remaining = change.remaining,
                        "Stock decremented"
                    );
                    (LineStatus::Created, None)
                }
                Err(InventoryError::InsufficientStock {
                    requested,
                    available,
                    ..
                }) => (
                    LineStatus::OutOfStock,
                    Some(format!(
                        "insufficient stock for {}: requested {requested}, available {available}",
                        product.id
                    )),
                ),
                Err(e) => (LineStatus::NotFound, Some(e.to_string())),
            };

            OrderLineResult {
                email_id: email_id.clone(),
                reference: line.reference,
                product_id: Some(product.id),
                quantity: line.quantity,
                status,
                unit_price: Some(product.price),
                error,
            }
        })
        .collect()
}

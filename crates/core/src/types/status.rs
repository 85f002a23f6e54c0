//! Labels and status enums.
//!
//! Every enum serializes to the exact string written to the output sheets,
//! and `Display` produces the same string.

use serde::{Deserialize, Serialize};

/// Email category assigned by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    /// Customer asks about products; no stock changes.
    #[serde(rename = "product inquiry")]
    ProductInquiry,
    /// Customer wants to buy; triggers order processing.
    #[serde(rename = "order request")]
    OrderRequest,
}

impl Category {
    /// Every category, in sheet order.
    pub const ALL: [Self; 2] = [Self::ProductInquiry, Self::OrderRequest];

    /// The label written to sheets and expected from the LLM.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::ProductInquiry => "product inquiry",
            Self::OrderRequest => "order request",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    /// Accepts the label with any case and `_`/`-` in place of the space.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['_', '-'], " ");
        match normalized.as_str() {
            "product inquiry" => Ok(Self::ProductInquiry),
            "order request" => Ok(Self::OrderRequest),
            _ => Err(format!("invalid category: {s}")),
        }
    }
}

/// Which path produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Llm,
    Keywords,
    /// Provided by the caller alongside the email.
    Supplied,
}

impl std::fmt::Display for ClassificationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Llm => write!(f, "llm"),
            Self::Keywords => write!(f, "keywords"),
            Self::Supplied => write!(f, "supplied"),
        }
    }
}

/// Which path produced a customer response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Llm,
    Template,
}

impl std::fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Llm => write!(f, "llm"),
            Self::Template => write!(f, "template"),
        }
    }
}

/// Status of a single order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LineStatus {
    /// Stock was decremented.
    #[serde(rename = "created")]
    Created,
    /// Product matched but stock was insufficient; stock unchanged.
    #[serde(rename = "out of stock")]
    OutOfStock,
    /// No catalog product matched the reference.
    #[serde(rename = "not found")]
    NotFound,
}

impl std::fmt::Display for LineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::OutOfStock => write!(f, "out of stock"),
            Self::NotFound => write!(f, "not found"),
        }
    }
}

/// Overall result of an email's order lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderOutcome {
    #[serde(rename = "created")]
    Created,
    #[serde(rename = "partially fulfilled")]
    PartiallyFulfilled,
    #[serde(rename = "out of stock")]
    OutOfStock,
    #[serde(rename = "no products found")]
    NoProductsFound,
    /// The email was not an order request.
    #[serde(rename = "not applicable")]
    NotApplicable,
}

impl OrderOutcome {
    /// Derive the overall outcome from line statuses.
    #[must_use]
    pub fn from_lines<'a>(statuses: impl IntoIterator<Item = &'a LineStatus>) -> Self {
        let (mut created, mut out_of_stock, mut total) = (0usize, 0usize, 0usize);
        for status in statuses {
            total += 1;
            match status {
                LineStatus::Created => created += 1,
                LineStatus::OutOfStock => out_of_stock += 1,
                LineStatus::NotFound => {}
            }
        }

        if total == 0 {
            Self::NoProductsFound
        } else if created == total {
            Self::Created
        } else if created > 0 {
            Self::PartiallyFulfilled
        } else if out_of_stock > 0 {
            Self::OutOfStock
        } else {
            Self::NoProductsFound
        }
    }
}

impl std::fmt::Display for OrderOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::PartiallyFulfilled => write!(f, "partially fulfilled"),
            Self::OutOfStock => write!(f, "out of stock"),
            Self::NoProductsFound => write!(f, "no products found"),
            Self::NotApplicable => write!(f, "not applicable"),
        }
    }
}

/// Keyword-based sentiment of an email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Positive => write!(f, "positive"),
            Self::Neutral => write!(f, "neutral"),
            Self::Negative => write!(f, "negative"),
        }
    }
}

/// Handling priority, lowest first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    Low,
    Medium,
    High,
    Urgent,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Urgent => write!(f, "urgent"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_labels_roundtrip() {
        for category in Category::ALL {
            let parsed: Category = category.label().parse().expect("parse label");
            assert_eq!(parsed, category);

            let json = serde_json::to_string(&category).expect("serialize");
            assert_eq!(json, format!("\"{}\"", category.label()));
        }
    }

    #[test]
    fn test_category_parse_lenient_separators() {
        assert_eq!(
            "Order_Request".parse::<Category>(),
            Ok(Category::OrderRequest)
        );
        assert_eq!(
            " product-inquiry ".parse::<Category>(),
            Ok(Category::ProductInquiry)
        );
        assert!("complaint".parse::<Category>().is_err());
    }

    #[test]
    fn test_order_outcome_from_lines() {
        use LineStatus::{Created, NotFound, OutOfStock};

        assert_eq!(
            OrderOutcome::from_lines(&[Created, Created]),
            OrderOutcome::Created
        );
        assert_eq!(
            OrderOutcome::from_lines(&[Created, OutOfStock]),
            OrderOutcome::PartiallyFulfilled
        );
        assert_eq!(
            OrderOutcome::from_lines(&[OutOfStock, NotFound]),
            OrderOutcome::OutOfStock
        );
        assert_eq!(
            OrderOutcome::from_lines(&[NotFound]),
            OrderOutcome::NoProductsFound
        );
        assert_eq!(OrderOutcome::from_lines(&[]), OrderOutcome::NoProductsFound);
    }

    #[test]
    fn test_line_status_serializes_with_spaces() {
        let json = serde_json::to_string(&LineStatus::OutOfStock).expect("serialize");
        assert_eq!(json, "\"out of stock\"");
    }

    #[test]
    fn test_classification_source_labels() {
        for (source, label) in [
            (ClassificationSource::Llm, "llm"),
            (ClassificationSource::Keywords, "keywords"),
            (ClassificationSource::Supplied, "supplied"),
        ] {
            assert_eq!(source.to_string(), label);
            let json = serde_json::to_string(&source).expect("serialize");
            assert_eq!(json, format!("\"{label}\""));
        }
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Urgent > Priority::High);
        assert!(Priority::Medium > Priority::Low);
    }
}

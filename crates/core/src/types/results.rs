//! Derived records produced while processing a batch.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{
    Category, ClassificationSource, EmailId, LineStatus, OrderOutcome, ProductId, ResponseSource,
};

/// The category assigned to one email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub email_id: EmailId,
    pub category: Category,
    /// Always within `[0, 1]`.
    pub confidence: f32,
    pub source: ClassificationSource,
}

impl ClassificationResult {
    /// Create a result, clamping the confidence into `[0, 1]`.
    ///
    /// A NaN confidence becomes `0.0`.
    #[must_use]
    pub fn new(
        email_id: EmailId,
        category: Category,
        confidence: f32,
        source: ClassificationSource,
    ) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            email_id,
            category,
            confidence,
            source,
        }
    }
}

/// Result of applying one requested line against the stock table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineResult {
    pub email_id: EmailId,
    /// Free-text reference as extracted from the email.
    pub reference: String,
    /// Matched catalog product, if any.
    pub product_id: Option<ProductId>,
    pub quantity: u32,
    pub status: LineStatus,
    /// Unit price of the matched product.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OrderLineResult {
    /// Value of the line if it was created.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        match (self.status, self.unit_price) {
            (LineStatus::Created, Some(price)) => price * Decimal::from(self.quantity),
            _ => Decimal::ZERO,
        }
    }
}

/// All order lines extracted from one email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub email_id: EmailId,
    pub lines: Vec<OrderLineResult>,
    pub outcome: OrderOutcome,
}

impl OrderSummary {
    /// Build a summary, deriving the outcome from the line statuses.
    #[must_use]
    pub fn from_lines(email_id: EmailId, lines: Vec<OrderLineResult>) -> Self {
        let outcome = OrderOutcome::from_lines(lines.iter().map(|line| &line.status));
        Self {
            email_id,
            lines,
            outcome,
        }
    }

    /// Sum of created line totals.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.lines.iter().map(OrderLineResult::line_total).sum()
    }

    /// Units actually taken from stock.
    #[must_use]
    pub fn items_created(&self) -> u32 {
        self.lines
            .iter()
            .filter(|line| line.status == LineStatus::Created)
            .map(|line| line.quantity)
            .sum()
    }

    /// Lines with the given status.
    pub fn lines_with(&self, status: LineStatus) -> impl Iterator<Item = &OrderLineResult> {
        self.lines.iter().filter(move |line| line.status == status)
    }

    /// One-cell rendering: `ID x qty [status]` joined by `; `.
    #[must_use]
    pub fn lines_cell(&self) -> String {
        self.lines
            .iter()
            .map(|line| {
                let id = line
                    .product_id
                    .as_ref()
                    .map_or(line.reference.as_str(), ProductId::as_str);
                format!("{id} x {} [{}]", line.quantity, line.status)
            })
            .collect::<Vec<_>>()
            .join("; ")
    }

    /// Line errors joined by `; `.
    #[must_use]
    pub fn errors_cell(&self) -> String {
        self.lines
            .iter()
            .filter_map(|line| line.error.as_deref())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Everything produced for one email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedEmail {
    pub email_id: EmailId,
    pub classification: ClassificationResult,
    /// Present for order requests only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<OrderSummary>,
    pub response: String,
    pub response_source: ResponseSource,
}

impl ProcessedEmail {
    /// Overall order outcome, `not applicable` for inquiries.
    #[must_use]
    pub fn order_outcome(&self) -> OrderOutcome {
        self.order
            .as_ref()
            .map_or(OrderOutcome::NotApplicable, |order| order.outcome)
    }
}

/// Count of emails per category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDistribution {
    counts: BTreeMap<Category, usize>,
    total: usize,
}

impl CategoryDistribution {
    /// Tally categories from classification results.
    #[must_use]
    pub fn from_results<'a>(results: impl IntoIterator<Item = &'a ClassificationResult>) -> Self {
        let mut distribution = Self::default();
        for result in results {
            distribution.record(result.category);
        }
        distribution
    }

    /// Count one more email in `category`.
    pub fn record(&mut self, category: Category) {
        *self.counts.entry(category).or_insert(0) += 1;
        self.total += 1;
    }

    #[must_use]
    pub fn count(&self, category: Category) -> usize {
        self.counts.get(&category).copied().unwrap_or(0)
    }

    #[must_use]
    pub const fn total(&self) -> usize {
        self.total
    }

    /// Share of emails in `category`, as a percentage.
    #[must_use]
    pub fn percentage(&self, category: Category) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)] // Batch sizes never approach f64 precision limits
        let share = self.count(category) as f64 / self.total as f64;
        share * 100.0
    }

    /// `(category, count)` pairs for every category, including zero counts.
    pub fn iter(&self) -> impl Iterator<Item = (Category, usize)> + '_ {
        Category::ALL
            .into_iter()
            .map(|category| (category, self.count(category)))
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn line(product: Option<&str>, quantity: u32, status: LineStatus, price: &str) -> OrderLineResult {
        OrderLineResult {
            email_id: EmailId::new("E001"),
            reference: product.unwrap_or("mystery item").to_string(),
            product_id: product.map(ProductId::new),
            quantity,
            status,
            unit_price: Some(Decimal::from_str(price).expect("decimal")),
            error: (status != LineStatus::Created).then(|| format!("{status}")),
        }
    }

    #[test]
    fn test_confidence_clamped() {
        let id = EmailId::new("E001");
        let high = ClassificationResult::new(
            id.clone(),
            Category::OrderRequest,
            1.7,
            ClassificationSource::Llm,
        );
        assert!((high.confidence - 1.0).abs() < f32::EPSILON);

        let nan = ClassificationResult::new(
            id,
            Category::OrderRequest,
            f32::NAN,
            ClassificationSource::Llm,
        );
        assert!(nan.confidence.abs() < f32::EPSILON);
    }

    #[test]
    fn test_summary_totals_only_created_lines() {
        let summary = OrderSummary::from_lines(
            EmailId::new("E001"),
            vec![
                line(Some("LTH0976"), 2, LineStatus::Created, "21.00"),
                line(Some("CBT8901"), 1, LineStatus::OutOfStock, "50.00"),
            ],
        );

        assert_eq!(summary.outcome, OrderOutcome::PartiallyFulfilled);
        assert_eq!(summary.total(), Decimal::from_str("42.00").expect("decimal"));
        assert_eq!(summary.items_created(), 2);
        assert_eq!(summary.lines_with(LineStatus::OutOfStock).count(), 1);
    }

    #[test]
    fn test_summary_cells() {
        let summary = OrderSummary::from_lines(
            EmailId::new("E001"),
            vec![
                line(Some("LTH0976"), 2, LineStatus::Created, "21.00"),
                line(None, 1, LineStatus::NotFound, "0"),
            ],
        );

        assert_eq!(
            summary.lines_cell(),
            "LTH0976 x 2 [created]; mystery item x 1 [not found]"
        );
        assert_eq!(summary.errors_cell(), "not found");
    }

    #[test]
    fn test_distribution_counts_and_percentages() {
        let results = [
            ClassificationResult::new(
                EmailId::new("E1"),
                Category::OrderRequest,
                0.9,
                ClassificationSource::Llm,
            ),
            ClassificationResult::new(
                EmailId::new("E2"),
                Category::ProductInquiry,
                0.9,
                ClassificationSource::Llm,
            ),
            ClassificationResult::new(
                EmailId::new("E3"),
                Category::OrderRequest,
                0.5,
                ClassificationSource::Keywords,
            ),
            ClassificationResult::new(
                EmailId::new("E4"),
                Category::OrderRequest,
                0.5,
                ClassificationSource::Keywords,
            ),
        ];

        let distribution = CategoryDistribution::from_results(&results);
        assert_eq!(distribution.total(), 4);
        assert_eq!(distribution.count(Category::OrderRequest), 3);
        assert!((distribution.percentage(Category::OrderRequest) - 75.0).abs() < 1e-9);
        assert_eq!(distribution.iter().count(), 2);
    }

    #[test]
    fn test_empty_distribution_percentage() {
        let distribution = CategoryDistribution::default();
        assert!(distribution.percentage(Category::ProductInquiry).abs() < f64::EPSILON);
    }
}

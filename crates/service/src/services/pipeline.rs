//! The end-to-end pipeline: classify, apply orders, respond.

use std::time::{Duration, Instant};

use mailsort_core::{
    Category, CategoryDistribution, ClassificationResult, Email, Inventory, OrderOutcome,
    ProcessedEmail,
};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, instrument};

use crate::config::ServiceConfig;
use crate::openai::OpenAiClient;
use crate::retrieval::ProductMatcher;

use super::classifier::{EmailClassifier, log_distribution, log_progress};
use super::orders::OrderProcessor;
use super::responder::Responder;

/// Results of a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub results: Vec<ProcessedEmail>,
    pub distribution: CategoryDistribution,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

impl BatchReport {
    /// Number of emails whose order outcome is `outcome`.
    #[must_use]
    pub fn count_outcome(&self, outcome: OrderOutcome) -> usize {
        self.results
            .iter()
            .filter(|result| result.order_outcome() == outcome)
            .count()
    }

    /// Units taken from stock across the batch.
    #[must_use]
    pub fn items_created(&self) -> u64 {
        self.results
            .iter()
            .filter_map(|result| result.order.as_ref())
            .map(|order| u64::from(order.items_created()))
            .sum()
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }
}

/// Runs emails through classification, order processing, and response
/// generation.
#[derive(Clone, Default)]
pub struct EmailProcessor {
    classifier: EmailClassifier,
    orders: OrderProcessor,
    responder: Responder,
}

impl EmailProcessor {
    /// Build the pipeline. Every stage shares the same LLM client and matcher.
    #[must_use]
    pub fn new(llm: Option<OpenAiClient>, matcher: ProductMatcher, config: &ServiceConfig) -> Self {
        let (temperature, max_tokens) = config
            .openai()
            .map_or((0.7, 1000), |openai| (openai.temperature, openai.max_tokens));

        Self {
            classifier: EmailClassifier::new(llm.clone()),
            orders: OrderProcessor::new(llm.clone(), matcher.clone()),
            responder: Responder::new(llm, matcher, temperature, max_tokens),
        }
    }

    /// Pipeline with keyword, heuristic, and template fallbacks only.
    #[must_use]
    pub fn offline() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn classifier(&self) -> &EmailClassifier {
        &self.classifier
    }

    /// Classify one email, apply its order if it is an order request, and
    /// write a reply.
    #[instrument(skip(self, email, inventory), fields(email_id = %email.id))]
    pub async fn process_email(&self, email: &Email, inventory: &RwLock<Inventory>) -> ProcessedEmail {
        let classification = self.classifier.classify(email).await;
        self.finish(email, classification, inventory).await
    }

    /// Reply using a supplied classification.
    ///
    /// Stock is never touched here; order requests are answered with related
    /// products instead of order results.
    pub async fn respond(
        &self,
        email: &Email,
        classification: ClassificationResult,
        inventory: &RwLock<Inventory>,
    ) -> ProcessedEmail {
        let (response, response_source) = self
            .responder
            .respond(email, &classification, None, inventory)
            .await;

        ProcessedEmail {
            email_id: email.id.clone(),
            classification,
            order: None,
            response,
            response_source,
        }
    }

    /// Process emails sequentially, preserving input order.
    pub async fn process_batch(&self, emails: &[Email], inventory: &RwLock<Inventory>) -> BatchReport {
        let started = Instant::now();
        let total = emails.len();
        info!(total, "Starting batch");

        let mut results = Vec::with_capacity(total);
        let mut distribution = CategoryDistribution::default();
        for (index, email) in emails.iter().enumerate() {
            let processed = self.process_email(email, inventory).await;
            distribution.record(processed.classification.category);
            results.push(processed);
            log_progress(index + 1, total, started);
        }

        log_distribution(&distribution);
        let report = BatchReport {
            results,
            distribution,
            elapsed: started.elapsed(),
        };
        info!(
            total,
            items_created = report.items_created(),
            elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
            "Batch complete"
        );
        report
    }

    async fn finish(
        &self,
        email: &Email,
        classification: ClassificationResult,
        inventory: &RwLock<Inventory>,
    ) -> ProcessedEmail {
        let order = if classification.category == Category::OrderRequest {
            Some(self.orders.process(email, inventory).await)
        } else {
            None
        };

        let (response, response_source) = self
            .responder
            .respond(email, &classification, order.as_ref(), inventory)
            .await;

        ProcessedEmail {
            email_id: email.id.clone(),
            classification,
            order,
            response,
            response_source,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use mailsort_core::{ClassificationSource, EmailId, Product, ProductId, ResponseSource};
    use rust_decimal::Decimal;

    use super::*;

    fn inventory() -> RwLock<Inventory> {
        let product = |id: &str, name: &str, stock| Product {
            id: ProductId::new(id),
            name: name.to_string(),
            description: String::new(),
            category: None,
            season: None,
            price: Decimal::new(1000, 2),
            stock,
        };
        RwLock::new(
            Inventory::new(vec![
                product("LTH0976", "Leather Bifold Wallet", 3),
                product("VBT2345", "Vintage Beret", 1),
            ])
            .unwrap(),
        )
    }

    fn emails() -> Vec<Email> {
        vec![
            Email::new("E001", "Order", "Please send 2 x LTH0976"),
            Email::new("E002", "Question", "Is the vintage beret made of wool?"),
            Email::new("E003", "Order again", "I want to order 2 x LTH0976"),
        ]
    }

    #[tokio::test]
    async fn test_process_batch_offline() {
        let processor = EmailProcessor::offline();
        let inventory = inventory();
        let report = processor.process_batch(&emails(), &inventory).await;

        let ids: Vec<&str> = report.results.iter().map(|r| r.email_id.as_str()).collect();
        assert_eq!(ids, vec!["E001", "E002", "E003"]);
        assert_eq!(report.distribution.count(Category::OrderRequest), 2);
        assert_eq!(report.distribution.count(Category::ProductInquiry), 1);

        assert_eq!(report.count_outcome(OrderOutcome::Created), 1);
        assert_eq!(report.count_outcome(OrderOutcome::OutOfStock), 1);
        assert_eq!(report.count_outcome(OrderOutcome::NotApplicable), 1);
        assert_eq!(report.items_created(), 2);
        assert_eq!(inventory.read().await.get("LTH0976").unwrap().stock, 1);

        assert!(report.results.iter().all(|r| !r.response.trim().is_empty()));
        assert!(
            report
                .results
                .iter()
                .all(|r| r.response_source == ResponseSource::Template)
        );
    }

    #[tokio::test]
    async fn test_respond_does_not_touch_stock() {
        let processor = EmailProcessor::offline();
        let inventory = inventory();
        let email = Email::new("E010", "", "2 x LTH0976 please");
        let classification = ClassificationResult::new(
            EmailId::new("E010"),
            Category::OrderRequest,
            1.0,
            ClassificationSource::Llm,
        );

        let processed = processor.respond(&email, classification, &inventory).await;
        assert!(processed.order.is_none());
        assert!(!processed.response.is_empty());
        assert_eq!(inventory.read().await.get("LTH0976").unwrap().stock, 3);
    }

    #[test]
    fn test_batch_report_serializes_elapsed_ms() {
        let report = BatchReport {
            results: Vec::new(),
            distribution: CategoryDistribution::default(),
            elapsed: Duration::from_millis(1500),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["elapsed"], 1500);
    }
}

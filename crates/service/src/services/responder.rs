//! Customer response generation.
//!
//! The LLM writes the reply with order results or related products inlined
//! as context. On any API error or empty reply a template is rendered
//! instead, so a response is always produced.

use askama::Template;
use mailsort_core::{
    Category, ClassificationResult, Email, Inventory, LineStatus, OrderSummary, Price, Product,
    ResponseSource,
};
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::openai::{CompletionOptions, OpenAiClient};
use crate::retrieval::ProductMatcher;

use super::classifier::truncate_chars;

const SYSTEM_PROMPT: &str = "You are a friendly, professional customer service assistant for a \
    fashion store. Write the email reply only, without a subject line.";

/// Related products inlined for inquiries.
pub const RAG_PRODUCTS: usize = 3;

/// Alternatives suggested per unavailable order line.
pub const MAX_ALTERNATIVES: usize = 2;

const MAX_BODY_CHARS: usize = 2000;
const DEFAULT_CUSTOMER: &str = "Customer";

/// Last-resort reply if even template rendering fails.
const STATIC_FALLBACK: &str = "Dear Customer,\n\nThank you for your email. Our team will get \
    back to you shortly.\n\nBest regards,\nCustomer Service";

#[derive(Template)]
#[template(path = "prompts/respond.txt")]
struct RespondPrompt<'a> {
    category: Category,
    customer: &'a str,
    subject: &'a str,
    body: &'a str,
    order_lines: &'a [String],
    total: &'a str,
    products: &'a [String],
}

#[derive(Template)]
#[template(path = "responses/order.txt")]
struct OrderResponse<'a> {
    customer: &'a str,
    created: &'a [String],
    total: &'a str,
    unavailable: &'a [String],
    alternatives: &'a [String],
}

#[derive(Template)]
#[template(path = "responses/inquiry.txt")]
struct InquiryResponse<'a> {
    customer: &'a str,
    products: &'a [String],
}

/// Context gathered for one reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseContext {
    pub category: Option<Category>,
    /// Created order lines, formatted.
    pub created: Vec<String>,
    /// Out-of-stock and unmatched lines, formatted.
    pub unavailable: Vec<String>,
    /// In-stock alternatives for unavailable lines, formatted.
    pub alternatives: Vec<String>,
    /// Order total, empty when nothing was created.
    pub total: String,
    /// Related products for inquiries, formatted.
    pub products: Vec<String>,
}

/// Writes replies to classified emails.
#[derive(Clone)]
pub struct Responder {
    llm: Option<OpenAiClient>,
    matcher: ProductMatcher,
    temperature: f32,
    max_tokens: u32,
}

impl Default for Responder {
    fn default() -> Self {
        Self::new(None, ProductMatcher::default(), 0.7, 1000)
    }
}

impl Responder {
    #[must_use]
    pub const fn new(
        llm: Option<OpenAiClient>,
        matcher: ProductMatcher,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            llm,
            matcher,
            temperature,
            max_tokens,
        }
    }

    /// Write a reply. Never returns an empty string.
    #[instrument(
        skip(self, email, classification, order, inventory),
        fields(email_id = %email.id, category = %classification.category)
    )]
    pub async fn respond(
        &self,
        email: &Email,
        classification: &ClassificationResult,
        order: Option<&OrderSummary>,
        inventory: &RwLock<Inventory>,
    ) -> (String, ResponseSource) {
        let catalog = inventory.read().await.products().to_vec();
        let context = self
            .build_context(email, classification.category, order, &catalog)
            .await;

        if let Some(llm) = &self.llm {
            match self.respond_with_llm(llm, email, &context).await {
                Ok(reply) => {
                    debug!(chars = reply.len(), "Generated response with LLM");
                    return (reply, ResponseSource::Llm);
                }
                Err(reason) => warn!(%reason, "LLM response failed, using template"),
            }
        }

        (render_template(&context), ResponseSource::Template)
    }

    /// Gather order results or related products for the reply.
    pub async fn build_context(
        &self,
        email: &Email,
        category: Category,
        order: Option<&OrderSummary>,
        catalog: &[Product],
    ) -> ResponseContext {
        let mut context = ResponseContext {
            category: Some(category),
            ..ResponseContext::default()
        };

        match (category, order) {
            (Category::OrderRequest, Some(order)) => {
                for line in &order.lines {
                    let product = line
                        .product_id
                        .as_ref()
                        .and_then(|id| catalog.iter().find(|p| p.id.matches(id.as_str())));
                    let label = product.map_or_else(
                        || format!("\"{}\"", line.reference),
                        |p| format!("{} ({})", p.name, p.id),
                    );

                    match line.status {
                        LineStatus::Created => {
                            let unit = line.unit_price.map(Price::usd);
                            let line_total = Price::usd(line.line_total());
                            context.created.push(match unit {
                                Some(unit) => {
                                    format!("{label} x {} at {unit} each = {line_total}", line.quantity)
                                }
                                None => format!("{label} x {}", line.quantity),
                            });
                        }
                        LineStatus::OutOfStock => {
                            context
                                .unavailable
                                .push(format!("{label} x {}: out of stock", line.quantity));
                            if let Some(product) = product {
                                for alternative in self.alternatives(product, catalog, &context.alternatives) {
                                    context.alternatives.push(alternative);
                                }
                            }
                        }
                        LineStatus::NotFound => context
                            .unavailable
                            .push(format!("{label}: not found in our catalog")),
                    }
                }
                if !context.created.is_empty() {
                    context.total = Price::usd(order.total()).to_string();
                }
            }
            _ => {
                context.products = self
                    .matcher
                    .search(&email.full_text(), RAG_PRODUCTS, catalog)
                    .await
                    .hits
                    .iter()
                    .map(|hit| describe_product(&hit.product))
                    .collect();
            }
        }

        context
    }

    /// Up to [`MAX_ALTERNATIVES`] in-stock products similar to `product`.
    fn alternatives(&self, product: &Product, catalog: &[Product], already: &[String]) -> Vec<String> {
        let mut candidates: Vec<&Product> = self
            .matcher
            .similar_to(product.id.as_str(), catalog.len(), catalog)
            .unwrap_or_default()
            .iter()
            .filter_map(|hit| catalog.iter().find(|p| p.id == hit.product.id))
            .collect();

        // Same category first when there are no similarity hits.
        if candidates.is_empty() {
            candidates = catalog
                .iter()
                .filter(|p| p.id != product.id)
                .filter(|p| product.category.is_some() && p.category == product.category)
                .collect();
        }

        candidates
            .into_iter()
            .filter(|p| p.has_stock(1))
            .map(describe_alternative)
            .filter(|line| !already.contains(line))
            .take(MAX_ALTERNATIVES)
            .collect()
    }

    async fn respond_with_llm(
        &self,
        llm: &OpenAiClient,
        email: &Email,
        context: &ResponseContext,
    ) -> Result<String, String> {
        let body = truncate_chars(&email.body, MAX_BODY_CHARS);
        let order_lines: Vec<String> = context
            .created
            .iter()
            .chain(&context.unavailable)
            .cloned()
            .chain(
                context
                    .alternatives
                    .iter()
                    .map(|alt| format!("alternative in stock: {alt}")),
            )
            .collect();

        let prompt = RespondPrompt {
            category: context.category.unwrap_or(Category::ProductInquiry),
            customer: DEFAULT_CUSTOMER,
            subject: &email.subject,
            body: &body,
            order_lines: &order_lines,
            total: &context.total,
            products: &context.products,
        }
        .render()
        .map_err(|e| format!("prompt render failed: {e}"))?;

        llm.complete(
            SYSTEM_PROMPT,
            &prompt,
            CompletionOptions::text(self.temperature, self.max_tokens),
        )
        .await
        .map_err(|e| e.to_string())
    }
}

/// Render the template reply for a context.
#[must_use]
pub fn render_template(context: &ResponseContext) -> String {
    let rendered = if context.category == Some(Category::OrderRequest) {
        OrderResponse {
            customer: DEFAULT_CUSTOMER,
            created: &context.created,
            total: &context.total,
            unavailable: &context.unavailable,
            alternatives: &context.alternatives,
        }
        .render()
    } else {
        InquiryResponse {
            customer: DEFAULT_CUSTOMER,
            products: &context.products,
        }
        .render()
    };

    match rendered {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => STATIC_FALLBACK.to_string(),
        Err(e) => {
            warn!(error = %e, "Response template failed to render");
            STATIC_FALLBACK.to_string()
        }
    }
}

fn describe_product(product: &Product) -> String {
    let availability = if product.has_stock(1) {
        format!("{} in stock", product.stock)
    } else {
        "currently out of stock".to_string()
    };
    let description = product.description.trim();
    if description.is_empty() {
        format!("{} ({}): {}, {availability}", product.name, product.id, product.unit_price())
    } else {
        format!(
            "{} ({}): {description}. {}, {availability}",
            product.name,
            product.id,
            product.unit_price()
        )
    }
}

fn describe_alternative(product: &Product) -> String {
    format!(
        "{} ({}) at {}, {} in stock",
        product.name,
        product.id,
        product.unit_price(),
        product.stock
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use mailsort_core::{ClassificationSource, EmailId, OrderLineResult, ProductId};
    use rust_decimal::Decimal;

    use super::*;

    fn product(id: &str, name: &str, category: &str, stock: u32) -> Product {
        Product {
            id: ProductId::new(id),
            name: name.to_string(),
            description: format!("{name} for every season"),
            category: Some(category.to_string()),
            season: None,
            price: Decimal::new(4000, 2),
            stock,
        }
    }

    fn inventory() -> RwLock<Inventory> {
        RwLock::new(
            Inventory::new(vec![
                product("CBT8901", "Chelsea Boots", "Shoes", 0),
                product("RBT1234", "Riding Boots", "Shoes", 3),
                product("SNK5678", "Canvas Sneakers", "Shoes", 5),
                product("LTH0976", "Leather Bifold Wallet", "Accessories", 2),
            ])
            .unwrap(),
        )
    }

    fn classification(category: Category) -> ClassificationResult {
        ClassificationResult::new(EmailId::new("E001"), category, 0.9, ClassificationSource::Keywords)
    }

    fn line(id: Option<&str>, reference: &str, quantity: u32, status: LineStatus) -> OrderLineResult {
        OrderLineResult {
            email_id: EmailId::new("E001"),
            reference: reference.to_string(),
            product_id: id.map(ProductId::new),
            quantity,
            status,
            unit_price: id.map(|_| Decimal::new(4000, 2)),
            error: None,
        }
    }

    #[tokio::test]
    async fn test_order_template_lists_lines_total_and_alternatives() {
        let responder = Responder::default();
        let order = OrderSummary::from_lines(
            EmailId::new("E001"),
            vec![
                line(Some("LTH0976"), "LTH0976", 2, LineStatus::Created),
                line(Some("CBT8901"), "CBT8901", 1, LineStatus::OutOfStock),
                line(None, "garden gnome", 1, LineStatus::NotFound),
            ],
        );
        let email = Email::new("E001", "Order", "2 x LTH0976 and CBT8901");

        let (reply, source) = responder
            .respond(&email, &classification(Category::OrderRequest), Some(&order), &inventory())
            .await;

        assert_eq!(source, ResponseSource::Template);
        assert!(reply.contains("Leather Bifold Wallet (LTH0976) x 2 at $40.00 each = $80.00"));
        assert!(reply.contains("Order total: $80.00"));
        assert!(reply.contains("Chelsea Boots (CBT8901) x 1: out of stock"));
        assert!(reply.contains("\"garden gnome\": not found"));
        assert!(reply.contains("Riding Boots (RBT1234)"));
        let alternatives = reply.lines().filter(|l| l.contains("in stock") && l.starts_with("- ")).count();
        assert!(alternatives <= MAX_ALTERNATIVES);
    }

    #[tokio::test]
    async fn test_inquiry_template_lists_related_products() {
        let responder = Responder::default();
        let email = Email::new("E002", "Boots", "Do you have riding boots in brown?");

        let (reply, source) = responder
            .respond(&email, &classification(Category::ProductInquiry), None, &inventory())
            .await;

        assert_eq!(source, ResponseSource::Template);
        assert!(reply.starts_with("Dear Customer,"));
        assert!(reply.contains("Riding Boots (RBT1234)"));
        assert!(reply.contains("3 in stock"));
    }

    #[tokio::test]
    async fn test_inquiry_without_matches_is_not_empty() {
        let responder = Responder::default();
        let email = Email::new("E003", "", "xyz?");
        let (reply, _) = responder
            .respond(&email, &classification(Category::ProductInquiry), None, &inventory())
            .await;
        assert!(reply.contains("could not find a product"));
    }

    #[test]
    fn test_order_template_without_matches() {
        let context = ResponseContext {
            category: Some(Category::OrderRequest),
            ..ResponseContext::default()
        };
        let reply = render_template(&context);
        assert!(reply.contains("could not find the products"));
        assert!(!reply.contains("Order total"));
    }
}

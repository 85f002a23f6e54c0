//! LLM and embedding paths against a local stub of the OpenAI API.
//!
//! Covers the happy paths, every fallback, and semantic product search.

use axum::http::StatusCode;
use mailsort_core::{
    Category, ClassificationSource, Email, Inventory, LineStatus, OrderOutcome, ResponseSource,
};
use mailsort_integration_tests::{STUB_RETRY_AFTER_SECS, StubLlm, TestServer, stub_state};
use mailsort_service::config::ServiceConfig;
use mailsort_service::openai::{CompletionOptions, OpenAiError};
use mailsort_service::retrieval::{MatchKind, ProductMatcher};
use mailsort_service::services::EmailProcessor;
use mailsort_service::sheets::sample_products;
use mailsort_service::state::{AppState, build_matcher};
use serde_json::{Value, json};
use tokio::sync::RwLock;

const STUB_REPLY: &str = "Dear customer, your beret is on its way. Best regards, Customer Service";

/// Answers like a well-behaved model for the beret emails below.
fn scripted_reply(prompt: &str) -> String {
    if prompt.contains("Classify the customer email") {
        if prompt.contains("beret") {
            r#"{"category": "order request", "confidence": 0.93}"#.to_string()
        } else {
            r#"{"category": "product inquiry", "confidence": 0.88}"#.to_string()
        }
    } else if prompt.contains("Extract the products") {
        r#"{"items": [{"product": "wool beret", "quantity": 1}]}"#.to_string()
    } else {
        STUB_REPLY.to_string()
    }
}

fn beret_email() -> Email {
    Email::new(
        "L001",
        "Beret",
        "Could I get a wool beret sent over? Just one.",
    )
}

fn lexical_processor(stub: &StubLlm) -> EmailProcessor {
    let mut config = ServiceConfig::default();
    config.openai = Some(stub.openai_config());
    EmailProcessor::new(Some(stub.client()), ProductMatcher::lexical(), &config)
}

fn sample_inventory() -> RwLock<Inventory> {
    RwLock::new(Inventory::new(sample_products()).expect("valid catalog"))
}

// ============================================================================
// Happy path
// ============================================================================

#[tokio::test]
async fn test_llm_pipeline_resolves_name_semantically() {
    let stub = StubLlm::replying(scripted_reply).await;
    let state = stub_state(&stub, sample_products()).await;

    let result = state
        .processor()
        .process_email(&beret_email(), state.inventory())
        .await;

    assert_eq!(result.classification.category, Category::OrderRequest);
    assert_eq!(result.classification.source, ClassificationSource::Llm);
    assert!((result.classification.confidence - 0.93).abs() < 1e-6);

    let order = result.order.expect("order summary");
    assert_eq!(order.outcome, OrderOutcome::Created);
    let line = order.lines.first().expect("one line");
    assert_eq!(line.reference, "wool beret");
    assert_eq!(
        line.product_id.as_ref().map(|id| id.as_str()),
        Some("VBT2345")
    );
    assert_eq!(line.status, LineStatus::Created);

    assert_eq!(result.response_source, ResponseSource::Llm);
    assert_eq!(result.response, STUB_REPLY);
    assert_eq!(
        state.inventory().read().await.get("VBT2345").map(|p| p.stock),
        Some(1)
    );
    assert_eq!(stub.chat_calls(), 3);
}

#[tokio::test]
async fn test_semantic_match_kind() {
    let stub = StubLlm::replying(scripted_reply).await;
    let products = sample_products();
    let matcher = stub.matcher(&products).await;

    let found = matcher
        .find("wool beret", &products)
        .await
        .expect("semantic match");
    assert_eq!(found.product.id.as_str(), "VBT2345");
    assert_eq!(found.kind, MatchKind::Semantic);
    assert!(found.score >= 0.5);

    let exact = matcher
        .find("CBT 89 01", &products)
        .await
        .expect("exact match");
    assert_eq!(exact.kind, MatchKind::ExactId);
}

#[tokio::test]
async fn test_api_reports_llm_sources() {
    let stub = StubLlm::replying(scripted_reply).await;
    let server = TestServer::spawn(stub_state(&stub, sample_products()).await).await;

    let classified: Value = server
        .post_json(
            "/api/v1/emails/classify",
            &json!({ "subject": "Beret", "body": "Could I get a wool beret sent over?" }),
        )
        .await
        .json()
        .await
        .expect("JSON body");
    assert_eq!(classified["category"], "order request");
    assert_eq!(classified["source"], "llm");

    let health: Value = server
        .get("/api/v1/health/detailed")
        .await
        .json()
        .await
        .expect("JSON body");
    assert_eq!(health["components"]["llm"]["status"], "configured");
    assert_eq!(server.stock("VBT2345").await, Some(2));
}

// ============================================================================
// Semantic search
// ============================================================================

#[tokio::test]
async fn test_semantic_search_ranks_by_meaning() {
    let stub = StubLlm::replying(scripted_reply).await;
    let server = TestServer::spawn(stub_state(&stub, sample_products()).await).await;

    for (query, expected) in [
        ("wool beret", "VBT2345"),
        ("linen shirt for a beach wedding", "LNS1122"),
        ("chelsea boots", "CBT8901"),
    ] {
        let body: Value = server
            .post_json("/api/v1/search", &json!({ "query": query, "limit": 3 }))
            .await
            .json()
            .await
            .expect("JSON body");
        assert_eq!(body["semantic"], true, "{query}");
        assert_eq!(body["results"][0]["product"]["id"], expected, "{query}");
    }
}

#[tokio::test]
async fn test_similar_uses_stored_vectors() {
    let stub = StubLlm::replying(scripted_reply).await;
    let server = TestServer::spawn(stub_state(&stub, sample_products()).await).await;

    let body: Value = server
        .get("/api/v1/search/similar/VBT2345?limit=4")
        .await
        .json()
        .await
        .expect("JSON body");
    let similar = body["similar"].as_array().expect("similar array");
    assert_eq!(similar.len(), 4);
    assert!(similar.iter().all(|hit| hit["product"]["id"] != "VBT2345"));
}

#[tokio::test]
async fn test_search_falls_back_to_lexical_when_embeddings_fail() {
    let working = StubLlm::replying(scripted_reply).await;
    let broken = StubLlm::failing(StatusCode::INTERNAL_SERVER_ERROR).await;
    let products = sample_products();

    let store = ProductMatcher::build_index(&working.embedding_client(), &products)
        .await
        .expect("index");
    let matcher = ProductMatcher::semantic(broken.embedding_client(), store);

    let results = matcher.search("leather wallet", 3, &products).await;
    assert!(!results.semantic);
    assert_eq!(
        results.hits.first().map(|hit| hit.product.id.as_str()),
        Some("LTH0976")
    );
}

#[tokio::test]
async fn test_api_search_reports_lexical_fallback() {
    let working = StubLlm::replying(scripted_reply).await;
    let broken = StubLlm::failing(StatusCode::INTERNAL_SERVER_ERROR).await;
    let products = sample_products();

    let store = ProductMatcher::build_index(&working.embedding_client(), &products)
        .await
        .expect("index");
    let matcher = ProductMatcher::semantic(broken.embedding_client(), store);
    assert!(matcher.has_vector_store());

    let state = AppState::new(
        ServiceConfig::default(),
        EmailProcessor::offline(),
        matcher,
        Inventory::new(products).expect("valid catalog"),
        false,
    );
    let server = TestServer::spawn(state).await;

    let body: Value = server
        .post_json("/api/v1/search", &json!({ "query": "leather wallet", "limit": 3 }))
        .await
        .json()
        .await
        .expect("JSON body");
    assert_eq!(body["semantic"], false);
    assert_eq!(body["results"][0]["product"]["id"], "LTH0976");
}

#[tokio::test]
async fn test_build_matcher_writes_and_reuses_vector_store() {
    let stub = StubLlm::replying(scripted_reply).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("vectors.json");

    let mut config = ServiceConfig::default();
    config.openai = Some(stub.openai_config());
    config.retrieval.enabled = true;
    config.retrieval.vector_store_path = path.clone();

    let products = sample_products();
    let matcher = build_matcher(&config, &products).await;
    assert!(matcher.has_vector_store());
    assert_eq!(matcher.indexed_products(), products.len());
    assert!(path.exists());

    let reloaded = build_matcher(&config, &products).await;
    assert_eq!(reloaded.indexed_products(), products.len());
}

#[tokio::test]
async fn test_build_matcher_falls_back_when_embeddings_fail() {
    let stub = StubLlm::failing(StatusCode::INTERNAL_SERVER_ERROR).await;
    let dir = tempfile::tempdir().expect("tempdir");

    let mut config = ServiceConfig::default();
    config.openai = Some(stub.openai_config());
    config.retrieval.enabled = true;
    config.retrieval.vector_store_path = dir.path().join("vectors.json");

    let matcher = build_matcher(&config, &sample_products()).await;
    assert!(!matcher.has_vector_store());
}

// ============================================================================
// Fallbacks
// ============================================================================

#[tokio::test]
async fn test_server_error_falls_back_everywhere() {
    let stub = StubLlm::failing(StatusCode::INTERNAL_SERVER_ERROR).await;
    let processor = lexical_processor(&stub);
    let inventory = sample_inventory();

    let email = Email::new("F001", "Order", "I want to order 2 x LTH0976 please.");
    let result = processor.process_email(&email, &inventory).await;

    assert_eq!(result.classification.category, Category::OrderRequest);
    assert_eq!(result.classification.source, ClassificationSource::Keywords);
    assert_eq!(result.order_outcome(), OrderOutcome::Created);
    assert_eq!(result.response_source, ResponseSource::Template);
    assert!(!result.response.trim().is_empty());
    assert_eq!(inventory.read().await.get("LTH0976").map(|p| p.stock), Some(2));
    assert_eq!(stub.chat_calls(), 3);
}

#[tokio::test]
async fn test_unparseable_reply_falls_back_to_keywords() {
    let stub = StubLlm::replying(|_| "I think this might be something".to_string()).await;
    let processor = lexical_processor(&stub);
    let inventory = sample_inventory();

    let email = Email::new("F002", "Boots", "Please send me 2 x CBT8901.");
    let result = processor.process_email(&email, &inventory).await;

    assert_eq!(result.classification.source, ClassificationSource::Keywords);
    assert_eq!(result.classification.category, Category::OrderRequest);
    let order = result.order.expect("order summary");
    assert_eq!(order.outcome, OrderOutcome::Created);
    assert_eq!(order.items_created(), 2);
}

#[tokio::test]
async fn test_empty_completion_uses_template() {
    let stub = StubLlm::replying(|_| "   ".to_string()).await;
    let processor = lexical_processor(&stub);
    let inventory = sample_inventory();

    let email = Email::new("F003", "Scarf", "Do you have any cashmere scarves in grey?");
    let result = processor.process_email(&email, &inventory).await;

    assert_eq!(result.classification.category, Category::ProductInquiry);
    assert_eq!(result.response_source, ResponseSource::Template);
    assert!(!result.response.trim().is_empty());
}

#[tokio::test]
async fn test_rate_limit_maps_retry_after() {
    let stub = StubLlm::failing(StatusCode::TOO_MANY_REQUESTS).await;
    let error = stub
        .client()
        .complete("system", "user", CompletionOptions::text(0.0, 5))
        .await
        .expect_err("rate limited");

    match error {
        OpenAiError::RateLimited(secs) => assert_eq!(secs, STUB_RETRY_AFTER_SECS),
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unauthorized_is_distinguished() {
    let stub = StubLlm::failing(StatusCode::UNAUTHORIZED).await;
    let error = stub
        .client()
        .complete("system", "user", CompletionOptions::text(0.0, 5))
        .await
        .expect_err("unauthorized");

    assert!(matches!(error, OpenAiError::Unauthorized(_)));
}

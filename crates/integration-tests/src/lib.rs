//! Integration test harness for mailsort.
//!
//! Provides an in-process API server on an ephemeral port and a stub of the
//! OpenAI-compatible API, so tests need neither network access nor an API
//! key.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p mailsort-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `api` - HTTP API against the offline pipeline
//! - `llm_stub` - LLM paths, fallbacks, and semantic search against the stub
//! - `pipeline_export` - Sample batch run and workbook export

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
    routing::post,
};
use mailsort_core::{Inventory, Product};
use mailsort_service::config::{OpenAiConfig, ServiceConfig};
use mailsort_service::openai::OpenAiClient;
use mailsort_service::retrieval::{EmbeddingClient, ProductMatcher};
use mailsort_service::services::EmailProcessor;
use mailsort_service::sheets::sample_products;
use mailsort_service::state::AppState;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Dimensions of the stub embedding vectors.
pub const STUB_DIMENSIONS: usize = 128;

/// Retry-After value sent with stubbed 429 responses.
pub const STUB_RETRY_AFTER_SECS: u64 = 7;

/// Bind an ephemeral port and serve `app` in the background.
async fn serve(app: Router) -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Failed to read listener address");

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Test server failed");
    });

    (format!("http://{addr}"), handle)
}

// ============================================================================
// API server
// ============================================================================

/// The mailsort router served on `127.0.0.1` with an ephemeral port.
///
/// The server task is aborted on drop.
pub struct TestServer {
    base_url: String,
    state: AppState,
    client: reqwest::Client,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Serve the router over `state`.
    pub async fn spawn(state: AppState) -> Self {
        let (base_url, handle) = serve(mailsort_service::app(state.clone())).await;
        Self {
            base_url,
            state,
            client: reqwest::Client::new(),
            handle,
        }
    }

    /// Serve the sample catalog with every stage on its local fallback.
    pub async fn offline() -> Self {
        Self::spawn(offline_state(sample_products())).await
    }

    /// Absolute URL for `path`.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    #[must_use]
    pub const fn state(&self) -> &AppState {
        &self.state
    }

    #[must_use]
    pub const fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// GET `path`.
    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("GET request failed")
    }

    /// POST `body` as JSON to `path`.
    pub async fn post_json(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("POST request failed")
    }

    /// Current stock of a product, read straight from the shared inventory.
    pub async fn stock(&self, product_id: &str) -> Option<u32> {
        self.state
            .inventory()
            .read()
            .await
            .get(product_id)
            .map(|product| product.stock)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// State with keyword classification, heuristic extraction, lexical
/// matching, and template responses.
#[must_use]
pub fn offline_state(products: Vec<Product>) -> AppState {
    let inventory = Inventory::new(products).expect("Invalid test catalog");
    AppState::new(
        ServiceConfig::default(),
        EmailProcessor::offline(),
        ProductMatcher::lexical(),
        inventory,
        false,
    )
}

/// State wired to `stub` for chat and embeddings, with the vector store
/// built from `products`.
pub async fn stub_state(stub: &StubLlm, products: Vec<Product>) -> AppState {
    let mut config = ServiceConfig::default();
    config.openai = Some(stub.openai_config());

    let inventory = Inventory::new(products).expect("Invalid test catalog");
    let matcher = stub.matcher(inventory.products()).await;
    let processor = EmailProcessor::new(Some(stub.client()), matcher.clone(), &config);

    AppState::new(config, processor, matcher, inventory, true)
}

// ============================================================================
// Stub LLM
// ============================================================================

type ReplyFn = dyn Fn(&str) -> String + Send + Sync;

#[derive(Clone)]
enum Behavior {
    /// Answer chat requests with the function applied to the user prompt.
    Reply(Arc<ReplyFn>),
    /// Fail every request with this status.
    Fail(StatusCode),
}

#[derive(Clone)]
struct StubContext {
    behavior: Behavior,
    chat_calls: Arc<AtomicUsize>,
}

/// A local stand-in for the chat completions and embeddings endpoints.
///
/// Embeddings are deterministic hashed bags of words, so texts sharing words
/// land close together.
pub struct StubLlm {
    base_url: String,
    chat_calls: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl StubLlm {
    /// Stub whose chat replies are produced by `reply` from the user prompt.
    pub async fn replying<F>(reply: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        Self::start(Behavior::Reply(Arc::new(reply))).await
    }

    /// Stub that fails every request with `status`.
    pub async fn failing(status: StatusCode) -> Self {
        Self::start(Behavior::Fail(status)).await
    }

    async fn start(behavior: Behavior) -> Self {
        let chat_calls = Arc::new(AtomicUsize::new(0));
        let context = StubContext {
            behavior,
            chat_calls: Arc::clone(&chat_calls),
        };

        let app = Router::new()
            .route("/v1/chat/completions", post(chat_completions))
            .route("/v1/embeddings", post(embeddings))
            .with_state(context);
        let (base_url, handle) = serve(app).await;

        Self {
            base_url: format!("{base_url}/v1"),
            chat_calls,
            handle,
        }
    }

    /// Configuration pointing at the stub.
    #[must_use]
    pub fn openai_config(&self) -> OpenAiConfig {
        OpenAiConfig::new(
            SecretString::from("sk-test-stub".to_string()),
            self.base_url.clone(),
        )
    }

    /// Chat client for the stub.
    #[must_use]
    pub fn client(&self) -> OpenAiClient {
        OpenAiClient::new(&self.openai_config()).expect("Failed to build chat client")
    }

    /// Embedding client for the stub.
    #[must_use]
    pub fn embedding_client(&self) -> EmbeddingClient {
        EmbeddingClient::new(&self.openai_config()).expect("Failed to build embedding client")
    }

    /// Semantic matcher over `products`, indexed through the stub.
    pub async fn matcher(&self, products: &[Product]) -> ProductMatcher {
        let client = self.embedding_client();
        let store = ProductMatcher::build_index(&client, products)
            .await
            .expect("Failed to build vector store");
        ProductMatcher::semantic(client, store)
    }

    /// Chat requests received so far.
    #[must_use]
    pub fn chat_calls(&self) -> usize {
        self.chat_calls.load(Ordering::SeqCst)
    }
}

impl Drop for StubLlm {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn chat_completions(State(stub): State<StubContext>, Json(request): Json<Value>) -> Response {
    stub.chat_calls.fetch_add(1, Ordering::SeqCst);

    let reply = match &stub.behavior {
        Behavior::Fail(status) => return failure(*status),
        Behavior::Reply(reply) => reply,
    };

    let prompt = request
        .get("messages")
        .and_then(Value::as_array)
        .and_then(|messages| {
            messages
                .iter()
                .rev()
                .find(|message| message.get("role").and_then(Value::as_str) == Some("user"))
        })
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .unwrap_or_default();

    Json(json!({
        "id": "chatcmpl-stub",
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": reply(prompt) },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 10, "completion_tokens": 10, "total_tokens": 20 }
    }))
    .into_response()
}

async fn embeddings(State(stub): State<StubContext>, Json(request): Json<Value>) -> Response {
    if let Behavior::Fail(status) = stub.behavior {
        return failure(status);
    }

    let inputs: Vec<&str> = match request.get("input") {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        Some(Value::String(text)) => vec![text.as_str()],
        _ => Vec::new(),
    };

    let data: Vec<Value> = inputs
        .iter()
        .enumerate()
        .map(|(index, text)| {
            json!({ "object": "embedding", "index": index, "embedding": stub_embedding(text) })
        })
        .collect();

    Json(json!({
        "object": "list",
        "data": data,
        "model": request.get("model").cloned().unwrap_or(Value::Null)
    }))
    .into_response()
}

fn failure(status: StatusCode) -> Response {
    let body = Json(json!({
        "error": { "message": "stub failure", "type": "server_error", "code": null }
    }));
    let mut response = (status, body).into_response();
    if status == StatusCode::TOO_MANY_REQUESTS {
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from(STUB_RETRY_AFTER_SECS));
    }
    response
}

/// Hashed bag-of-words vector: each lowercase alphanumeric token adds one to
/// the bucket picked by its FNV-1a hash.
#[must_use]
pub fn stub_embedding(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0_f32; STUB_DIMENSIONS];
    let lower = text.to_lowercase();
    for token in lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
    {
        if let Some(slot) = vector.get_mut(token_bucket(token)) {
            *slot += 1.0;
        }
    }
    vector
}

fn token_bucket(token: &str) -> usize {
    let hash = token
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325_u64, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
        });
    usize::try_from(hash % STUB_DIMENSIONS as u64).unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_stub_embedding_is_deterministic() {
        let a = stub_embedding("Wool Beret");
        let b = stub_embedding("wool   beret!");
        assert_eq!(a, b);
        assert_eq!(a.len(), STUB_DIMENSIONS);
        assert!((a.iter().sum::<f32>() - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_stub_embedding_of_empty_text_is_zero() {
        assert!(stub_embedding("  ").iter().all(|value| *value == 0.0));
    }
}

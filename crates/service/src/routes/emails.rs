//! Email endpoints: classify, process, batch, respond.

use std::time::Instant;

use axum::{Json, Router, extract::State, routing::post};
use mailsort_core::{
    Category, ClassificationResult, ClassificationSource, Email, EmailAddress, ProcessedEmail,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::{AppError, Result};
use crate::services::{BatchReport, TextAnalysis, analyze};
use crate::state::AppState;

use super::ApiJson;

/// Largest batch accepted in one request.
pub const MAX_BATCH_SIZE: usize = 500;

/// Create the `/emails` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/classify", post(classify))
        .route("/process", post(process))
        .route("/batch", post(batch))
        .route("/respond", post(respond))
}

/// An email submitted to the API.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailRequest {
    /// Generated when absent.
    #[serde(default)]
    pub email_id: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub subject: String,
    pub body: String,
}

impl EmailRequest {
    /// Validate and convert into an [`Email`].
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` for an empty body, an email longer than
    /// `max_len` characters, or an invalid sender address.
    pub fn into_email(self, max_len: usize) -> Result<Email> {
        if self.body.trim().is_empty() {
            return Err(AppError::BadRequest("body is required".to_string()));
        }

        let id = self
            .email_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut email = Email::new(id, self.subject, self.body);

        if email.char_len() > max_len {
            return Err(AppError::BadRequest(format!(
                "email exceeds {max_len} characters"
            )));
        }

        if let Some(sender) = self.sender.filter(|s| !s.trim().is_empty()) {
            let address = EmailAddress::parse(&sender)
                .map_err(|e| AppError::BadRequest(format!("invalid sender: {e}")))?;
            email = email.with_sender(address);
        }

        Ok(email)
    }
}

#[derive(Debug, Serialize)]
pub struct ClassifyResponse {
    #[serde(flatten)]
    pub classification: ClassificationResult,
    pub analysis: TextAnalysis,
    pub processing_time_ms: u64,
}

/// POST /api/v1/emails/classify
#[instrument(skip_all)]
async fn classify(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<EmailRequest>,
) -> Result<Json<ClassifyResponse>> {
    let started = Instant::now();
    let email = request.into_email(state.config().max_email_length)?;

    let classification = state.processor().classifier().classify(&email).await;
    let analysis = analyze(&email.full_text(), Some(classification.category));

    Ok(Json(ClassifyResponse {
        classification,
        analysis,
        processing_time_ms: elapsed_ms(started),
    }))
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    #[serde(flatten)]
    pub result: ProcessedEmail,
    pub analysis: TextAnalysis,
    pub processing_time_ms: u64,
}

/// POST /api/v1/emails/process
#[instrument(skip_all)]
async fn process(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<EmailRequest>,
) -> Result<Json<ProcessResponse>> {
    let started = Instant::now();
    let email = request.into_email(state.config().max_email_length)?;

    let result = state
        .processor()
        .process_email(&email, state.inventory())
        .await;
    let analysis = analyze(&email.full_text(), Some(result.classification.category));

    info!(
        email_id = %result.email_id,
        category = %result.classification.category,
        outcome = %result.order_outcome(),
        "Processed email"
    );

    Ok(Json(ProcessResponse {
        result,
        analysis,
        processing_time_ms: elapsed_ms(started),
    }))
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub emails: Vec<EmailRequest>,
}

/// POST /api/v1/emails/batch
#[instrument(skip_all)]
async fn batch(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<BatchRequest>,
) -> Result<Json<BatchReport>> {
    if request.emails.is_empty() {
        return Err(AppError::BadRequest("emails must not be empty".to_string()));
    }
    if request.emails.len() > MAX_BATCH_SIZE {
        return Err(AppError::BadRequest(format!(
            "at most {MAX_BATCH_SIZE} emails per batch"
        )));
    }

    let max_len = state.config().max_email_length;
    let emails = request
        .emails
        .into_iter()
        .enumerate()
        .map(|(index, email)| {
            email.into_email(max_len).map_err(|e| match e {
                AppError::BadRequest(message) => {
                    AppError::BadRequest(format!("emails[{index}]: {message}"))
                }
                other => other,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let report = state
        .processor()
        .process_batch(&emails, state.inventory())
        .await;
    Ok(Json(report))
}

/// A caller-supplied classification.
#[derive(Debug, Deserialize)]
pub struct ClassificationInput {
    /// Category label, case-insensitive.
    pub category: String,
    #[serde(default)]
    pub confidence: Option<f32>,
}

#[derive(Debug, Deserialize)]
pub struct RespondRequest {
    pub email: EmailRequest,
    pub classification: ClassificationInput,
}

/// POST /api/v1/emails/respond
///
/// Writes a reply for the supplied category without applying any order.
#[instrument(skip_all)]
async fn respond(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RespondRequest>,
) -> Result<Json<ProcessedEmail>> {
    let email = request.email.into_email(state.config().max_email_length)?;
    let category: Category = request
        .classification
        .category
        .parse()
        .map_err(AppError::BadRequest)?;

    let classification = ClassificationResult::new(
        email.id.clone(),
        category,
        request.classification.confidence.unwrap_or(1.0),
        ClassificationSource::Supplied,
    );

    let result = state
        .processor()
        .respond(&email, classification, state.inventory())
        .await;
    Ok(Json(result))
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn request(body: &str) -> EmailRequest {
        EmailRequest {
            email_id: None,
            sender: None,
            subject: "Hello".to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_into_email_generates_id() {
        let email = request("Do you have boots?").into_email(100).unwrap();
        assert!(!email.id.as_str().is_empty());
        assert_eq!(email.subject, "Hello");
    }

    #[test]
    fn test_into_email_keeps_id_and_sender() {
        let mut req = request("Do you have boots?");
        req.email_id = Some("E042".to_string());
        req.sender = Some("jane@example.com".to_string());

        let email = req.into_email(100).unwrap();
        assert_eq!(email.id.as_str(), "E042");
        assert_eq!(email.sender.unwrap().as_str(), "jane@example.com");
    }

    #[test]
    fn test_into_email_rejects_empty_body() {
        let err = request("   ").into_email(100).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn test_into_email_rejects_long_email() {
        let err = request(&"x".repeat(200)).into_email(100).unwrap_err();
        assert!(err.to_string().contains("100 characters"));
    }

    #[test]
    fn test_into_email_rejects_bad_sender() {
        let mut req = request("Do you have boots?");
        req.sender = Some("not an address".to_string());
        assert!(req.into_email(100).is_err());
    }
}

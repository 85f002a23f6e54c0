//! Single-email classification and the classifier self-test.

use mailsort_core::{Category, ClassificationResult, Email};
use mailsort_service::services::{EmailClassifier, TextAnalysis, analyze};
use serde::Serialize;
use tracing::{error, info, warn};

/// A labelled email for the self-test.
pub struct LabelledEmail {
    pub description: &'static str,
    pub subject: &'static str,
    pub body: &'static str,
    pub expected: Category,
}

/// Emails with known categories, phrased so keyword matching also gets them
/// right.
pub const SELF_TEST_EMAILS: &[LabelledEmail] = &[
    LabelledEmail {
        description: "Order with quantity",
        subject: "Order for boots",
        body: "I want to order 2 pairs of the Chelsea Boots, please.",
        expected: Category::OrderRequest,
    },
    LabelledEmail {
        description: "Material question",
        subject: "Question about the beret",
        body: "Is the vintage beret made of wool? Which colours does it come in?",
        expected: Category::ProductInquiry,
    },
    LabelledEmail {
        description: "Order by product code",
        subject: "Wallet",
        body: "Please send me 3 x LTH0976 to my home address.",
        expected: Category::OrderRequest,
    },
    LabelledEmail {
        description: "Sizing question",
        subject: "Sizing help",
        body: "Do the Chelsea boots run true to size? I usually wear a 42.",
        expected: Category::ProductInquiry,
    },
    LabelledEmail {
        description: "Recommendation request",
        subject: "Gift ideas",
        body: "Which scarves would you recommend as a winter gift for my mother?",
        expected: Category::ProductInquiry,
    },
];

#[derive(Serialize)]
struct ClassifyOutput {
    classification: ClassificationResult,
    analysis: TextAnalysis,
}

/// Classify one email and print the result as JSON.
///
/// # Errors
///
/// Returns an error if configuration cannot be loaded.
pub async fn classify(
    subject: &str,
    body: &str,
    offline: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(offline)?;
    let classifier = EmailClassifier::new(super::llm_client(&config)?);

    let email = Email::new("cli", subject, body);
    let classification = classifier.classify(&email).await;
    let analysis = analyze(&email.full_text(), Some(classification.category));

    let output = serde_json::to_string_pretty(&ClassifyOutput {
        classification,
        analysis,
    })?;
    #[allow(clippy::print_stdout)]
    {
        println!("{output}");
    }
    Ok(())
}

/// Run [`SELF_TEST_EMAILS`] through `classifier`, returning the pass count.
pub async fn run_cases(classifier: &EmailClassifier) -> usize {
    let mut passed = 0;
    for (index, case) in SELF_TEST_EMAILS.iter().enumerate() {
        let email = Email::new(format!("T{:03}", index + 1), case.subject, case.body);
        let result = classifier.classify(&email).await;
        if result.category == case.expected {
            info!(
                "Test {} PASSED: {} -> {}",
                index + 1,
                case.description,
                result.category
            );
            passed += 1;
        } else {
            warn!(
                "Test {} FAILED: {} -> expected {}, got {}",
                index + 1,
                case.description,
                case.expected,
                result.category
            );
        }
    }
    passed
}

/// Classify the labelled emails and report the pass rate.
///
/// # Errors
///
/// Returns an error if configuration cannot be loaded or any case fails.
pub async fn self_test(offline: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(offline)?;
    let classifier = EmailClassifier::new(super::llm_client(&config)?);

    let total = SELF_TEST_EMAILS.len();
    let passed = run_cases(&classifier).await;

    #[allow(clippy::cast_precision_loss)]
    let rate = passed as f64 / total as f64 * 100.0;
    info!("Test results: {passed}/{total} passed ({rate:.1}%)");

    if passed == total {
        Ok(())
    } else {
        error!("{} self-test case(s) failed", total - passed);
        Err(format!("{passed}/{total} self-test cases passed").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_self_test_cases_pass_offline() {
        let passed = run_cases(&EmailClassifier::default()).await;
        assert_eq!(passed, SELF_TEST_EMAILS.len());
    }
}

//! Customer email record.

use serde::{Deserialize, Serialize};

use super::{EmailAddress, EmailId};

/// An inbound customer email. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    /// Row identifier from the emails sheet.
    pub id: EmailId,
    /// Sender address, when the sheet carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<EmailAddress>,
    /// Subject line (may be empty).
    #[serde(default)]
    pub subject: String,
    /// Message body.
    pub body: String,
}

impl Email {
    /// Create an email without a sender.
    #[must_use]
    pub fn new(id: impl Into<EmailId>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sender: None,
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Attach a sender address.
    #[must_use]
    pub fn with_sender(mut self, sender: EmailAddress) -> Self {
        self.sender = Some(sender);
        self
    }

    /// Subject and body joined for analysis, subject first.
    #[must_use]
    pub fn full_text(&self) -> String {
        if self.subject.trim().is_empty() {
            self.body.clone()
        } else {
            format!("{}\n\n{}", self.subject, self.body)
        }
    }

    /// Length of subject plus body in characters.
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.subject.chars().count() + self.body.chars().count()
    }
}

//! Sender address type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing an [`EmailAddress`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// The input string is empty.
    #[error("address cannot be empty")]
    Empty,
    /// The input string is too long.
    #[error("address must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The input does not contain exactly one @ symbol.
    #[error("address must contain exactly one @ symbol")]
    AtSymbol,
    /// The local part (before @) is empty.
    #[error("address local part cannot be empty")]
    EmptyLocalPart,
    /// The domain part (after @) is empty.
    #[error("address domain cannot be empty")]
    EmptyDomain,
    /// The address contains whitespace.
    #[error("address cannot contain whitespace")]
    Whitespace,
    /// A `Name <addr>` mailbox is missing its closing bracket.
    #[error("unterminated mailbox bracket")]
    UnterminatedBracket,
}

/// A customer's email address.
///
/// Sender columns come from hand-maintained spreadsheets, so besides a bare
/// `user@example.com` the parser also accepts the mailbox form
/// `Jane Doe <jane@example.com>` and keeps only the address.
///
/// ## Constraints
///
/// - Length: 1-254 characters (RFC 5321 limit)
/// - Exactly one @ symbol, no whitespace
/// - Local part and domain must not be empty
///
/// ## Examples
///
/// ```
/// use mailsort_core::EmailAddress;
///
/// assert!(EmailAddress::parse("user@example.com").is_ok());
/// assert_eq!(
///     EmailAddress::parse("Jane <jane@example.com>").map(|a| a.into_inner()),
///     Ok("jane@example.com".to_string())
/// );
///
/// assert!(EmailAddress::parse("").is_err());
/// assert!(EmailAddress::parse("no-at-symbol").is_err());
/// assert!(EmailAddress::parse("a@b@c").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Maximum length of an address (RFC 5321).
    pub const MAX_LENGTH: usize = 254;

    /// Parse an `EmailAddress` from a bare address or a `Name <addr>` mailbox.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is empty, too long, has anything other
    /// than a single @, an empty local part or domain, or embedded whitespace.
    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let s = s.trim();
        let addr = match s.rfind('<') {
            Some(open) => {
                let rest = s.get(open + 1..).unwrap_or_default();
                let close = rest.find('>').ok_or(AddressError::UnterminatedBracket)?;
                rest.get(..close).unwrap_or_default().trim()
            }
            None => s,
        };

        if addr.is_empty() {
            return Err(AddressError::Empty);
        }

        if addr.len() > Self::MAX_LENGTH {
            return Err(AddressError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        if addr.chars().any(char::is_whitespace) {
            return Err(AddressError::Whitespace);
        }

        let (local, domain) = addr.split_once('@').ok_or(AddressError::AtSymbol)?;
        if domain.contains('@') {
            return Err(AddressError::AtSymbol);
        }
        if local.is_empty() {
            return Err(AddressError::EmptyLocalPart);
        }
        if domain.is_empty() {
            return Err(AddressError::EmptyDomain);
        }

        Ok(Self(addr.to_owned()))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the address and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Returns the local part (before the @).
    #[must_use]
    pub fn local_part(&self) -> &str {
        self.0.split('@').next().unwrap_or("")
    }

    /// Returns the domain part (after the @).
    #[must_use]
    pub fn domain(&self) -> &str {
        self.0.split('@').nth(1).unwrap_or("")
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for EmailAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for EmailAddress {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EmailAddress> for String {
    fn from(addr: EmailAddress) -> Self {
        addr.0
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

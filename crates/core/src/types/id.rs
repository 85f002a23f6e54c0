//! Newtype IDs for type-safe entity references.
//!
//! Use the `define_id!` macro to create type-safe ID wrappers that prevent
//! accidentally mixing IDs from different entity types. Spreadsheet IDs are
//! free-form strings (`LTH0976`, `E001`), so the wrapped value is a `String`.

/// Macro to define a type-safe string ID wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_str()`, `into_inner()`
/// - `From<String>`, `From<&str>` and `Into<String>` implementations
///
/// Leading and trailing whitespace is trimmed on construction.
///
/// # Example
///
/// ```rust
/// # use mailsort_core::define_id;
/// define_id!(SkuId);
/// define_id!(TicketId);
///
/// let sku = SkuId::new(" ABC123 ");
/// assert_eq!(sku.as_str(), "ABC123");
///
/// // These are different types, so this won't compile:
/// // let _: SkuId = TicketId::new("ABC123");
/// ```
#[macro_export]
macro_rules! define_id {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new ID, trimming surrounding whitespace.
            #[must_use]
            pub fn new(id: impl AsRef<str>) -> Self {
                Self(id.as_ref().trim().to_owned())
            }

            /// Get the underlying string value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the ID and return the inner string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }

            /// Case-insensitive comparison against a raw identifier.
            #[must_use]
            pub fn matches(&self, raw: &str) -> bool {
                self.0.eq_ignore_ascii_case(raw.trim())
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self::new(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(ProductId);
define_id!(EmailId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_trims_whitespace() {
        let id = ProductId::new("  LTH0976 ");
        assert_eq!(id.as_str(), "LTH0976");
        assert_eq!(id.to_string(), "LTH0976");
    }

    #[test]
    fn test_id_matches_case_insensitive() {
        let id = ProductId::new("LTH0976");
        assert!(id.matches("lth0976"));
        assert!(id.matches(" LTH0976 "));
        assert!(!id.matches("LTH0977"));
    }

    #[test]
    fn test_id_serializes_transparent() {
        let id = EmailId::new("E001");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"E001\"");

        let back: EmailId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }
}

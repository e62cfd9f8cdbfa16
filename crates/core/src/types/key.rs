//! Newtype keys for the opaque identifiers the gateway correlates.
//!
//! The HTTP layer knows a session id, the live-session layer knows a
//! connection id and a one-time token, the document engine knows author ids.
//! They are all strings on the wire; wrapping them keeps them from being
//! mixed up at the seams.

/// Macro to define a type-safe string key wrapper.
///
/// Creates a newtype wrapper around `String` with:
/// - `Serialize`/`Deserialize` with `#[serde(transparent)]`
/// - `Debug`, `Clone`, `PartialEq`, `Eq`, `Hash`, `PartialOrd`, `Ord`
/// - Conversion methods: `new()`, `as_str()`
/// - `Display`, `AsRef<str>`, `From<String>` and `From<&str>` implementations
///
/// # Example
///
/// ```rust
/// # use padgate_core::define_key;
/// define_key!(PadId);
/// define_key!(GroupId);
///
/// let pad = PadId::new("welcome");
/// let group = GroupId::new("welcome");
///
/// // These are different types, so this won't compile:
/// // let _: PadId = group;
/// assert_eq!(pad.as_str(), group.as_str());
/// ```
#[macro_export]
macro_rules! define_key {
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
            /// Create a new key from any string-like value.
            #[must_use]
            pub fn new(key: impl Into<String>) -> Self {
                Self(key.into())
            }

            /// Get the key as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(key: String) -> Self {
                Self(key)
            }
        }

        impl From<&str> for $name {
            fn from(key: &str) -> Self {
                Self(key.to_owned())
            }
        }

        impl From<$name> for String {
            fn from(key: $name) -> Self {
                key.0
            }
        }
    };
}

define_key!(SessionId);
define_key!(ConnectionId);
define_key!(AuthorToken);
define_key!(AuthorId);

impl ConnectionId {
    /// Generate a fresh random connection id.
    ///
    /// Used when the transport does not supply its own identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display_matches_inner() {
        let sid = SessionId::new("s%3Aabc");
        assert_eq!(sid.to_string(), "s%3Aabc");
        assert_eq!(sid.as_str(), "s%3Aabc");
    }

    #[test]
    fn test_key_serde_transparent() {
        let token = AuthorToken::from("t.0123456789");
        let json = serde_json::to_string(&token).unwrap();
        assert_eq!(json, "\"t.0123456789\"");

        let back: AuthorToken = serde_json::from_str(&json).unwrap();
        assert_eq!(back, token);
    }

    #[test]
    fn test_generated_connection_ids_are_unique() {
        let a = ConnectionId::generate();
        let b = ConnectionId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }
}

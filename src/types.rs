//! NewType wrappers for identifiers that flow through the auth layer.
//!
//! A token subject (`auth0|61470d…`) and the local user key (`61470d…`) are
//! both plain strings on the wire; keeping them apart in the type system stops
//! one from being stored where the other is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to generate a NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

newtype_string!(
    /// The `sub` claim of a validated bearer token.
    ///
    /// This is the identifier the identity provider's management API is
    /// queried with.
    Subject
);

newtype_string!(
    /// Key of a local `user` record.
    ///
    /// Derived from the identity provider's profile during resolution and
    /// injected into every authenticated handler.
    UserId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newtype_roundtrip() {
        let subject = Subject::new("auth0|abc");
        assert_eq!(subject.as_str(), "auth0|abc");
        assert_eq!(subject.to_string(), "auth0|abc");
    }

    #[test]
    fn test_newtype_serializes_transparently() {
        let id = UserId::from("61470d6d44672c00694cfd14");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"61470d6d44672c00694cfd14\"");
    }
}

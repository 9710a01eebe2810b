// SPDX-License-Identifier: MIT

//! ID newtype generation.

/// Trait for truncating identifiers to a short prefix.
pub trait ShortId {
    /// Returns a string slice truncated to at most `n` characters.
    fn short(&self, n: usize) -> &str;
}

impl ShortId for str {
    fn short(&self, n: usize) -> &str {
        if self.len() <= n {
            self
        } else {
            &self[..n]
        }
    }
}

/// Define a newtype ID wrapper around `String`.
///
/// Generates `new()`, `as_str()`, `short()`, `Display`, `From<String>`, `From<&str>`,
/// `PartialEq<str>`, `PartialEq<&str>`, and `Borrow<str>` implementations.
#[macro_export]
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn short(&self, n: usize) -> &str {
                if self.0.len() <= n {
                    &self.0
                } else {
                    &self.0[..n]
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
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

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

crate::define_id! {
    /// Opaque session identifier, generated by the child on first start and
    /// reused verbatim on resume.
    pub struct SessionId;
}

crate::define_id! {
    /// A project folder's name (last path segment). Restricted to lowercase
    /// alphanumerics and hyphens by the folder scanner's name policy.
    pub struct FolderName;
}

crate::define_id! {
    /// Identifier for one attached transport (websocket or SSE connection).
    pub struct ClientId;
}

crate::define_id! {
    /// Assistant message id as emitted by the child in `assistant-complete`.
    pub struct MessageId;
}

crate::define_id! {
    /// Tool-use id linking a tool-call to its eventual tool-result.
    pub struct ToolCallId;
}

#[cfg(test)]
mod tests {
    use super::*;

    define_id! {
        pub struct TestId;
    }

    #[test]
    fn short_truncates() {
        let id = TestId::new("abcdefgh");
        assert_eq!(id.short(4), "abcd");
        assert_eq!(id.short(100), "abcdefgh");
    }

    #[test]
    fn equality_against_str() {
        let id = TestId::new("same");
        assert_eq!(id, "same");
        assert_eq!(id, &"same");
        let set: std::collections::HashSet<&str> = ["same"].into_iter().collect();
        assert!(set.contains(std::borrow::Borrow::<str>::borrow(&id)));
    }

    #[test]
    fn display_roundtrip() {
        let id = TestId::from("x".to_string());
        assert_eq!(id.to_string(), "x");
        assert_eq!(id.as_str(), "x");
    }
}

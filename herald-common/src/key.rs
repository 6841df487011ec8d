//! Idempotency key newtype
//!
//! Wraps the caller-assigned key so it cannot be confused with backend names
//! or arbitrary detail strings. Cloning is cheap (`Arc<str>`), which matters
//! because the same key is held by the dedup cache, the status log and the
//! deferred queue at once.

use std::{
    fmt::{self, Display},
    ops::Deref,
    sync::Arc,
};

use serde::{Deserialize, Serialize};

/// Caller-supplied identity of a logical message
///
/// # Examples
///
/// ```
/// use herald_common::IdempotencyKey;
///
/// let key = IdempotencyKey::new("order-42");
/// assert_eq!(key.as_str(), "order-42");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct IdempotencyKey(Arc<str>);

impl IdempotencyKey {
    #[must_use]
    pub fn new(s: impl Into<Arc<str>>) -> Self {
        Self(s.into())
    }

    /// Parse an optional raw key, treating an empty string as absent
    ///
    /// ```
    /// use herald_common::IdempotencyKey;
    ///
    /// assert!(IdempotencyKey::parse("").is_none());
    /// assert!(IdempotencyKey::parse("k").is_some());
    /// ```
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() {
            None
        } else {
            Some(Self::new(raw))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for IdempotencyKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for IdempotencyKey {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<String> for IdempotencyKey {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<&str> for IdempotencyKey {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

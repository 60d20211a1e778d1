//! Destination table identifier.
//!
//! The table name prefix in BigQuery, and the name of the collection's
//! working directory, is the final segment of the collection path.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of the BigQuery table (prefix) a collection is exported to.
#[derive(Debug, Clone, Eq, Hash, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableId(String);

impl TableId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }

    /// Derive the table id from a collection path.
    ///
    /// Takes the last non-empty `/`-separated segment. Returns `None` when the
    /// path has no segments at all.
    ///
    /// # Examples
    ///
    /// ```
    /// use fs_to_bq::config::TableId;
    ///
    /// assert_eq!(TableId::from_collection_path("orders").unwrap().id(), "orders");
    /// assert_eq!(TableId::from_collection_path("users/alice/orders").unwrap().id(), "orders");
    /// assert!(TableId::from_collection_path("/").is_none());
    /// ```
    pub fn from_collection_path(path: &str) -> Option<Self> {
        path.rsplit('/')
            .find(|s| !s.trim().is_empty())
            .map(|s| Self(s.to_string()))
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for TableId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_level_collection() {
        assert_eq!(TableId::from_collection_path("users").unwrap().id(), "users");
    }

    #[test]
    fn test_subcollection_uses_last_segment() {
        let id = TableId::from_collection_path("users/alice/orders").unwrap();
        assert_eq!(id.id(), "orders");
    }

    #[test]
    fn test_trailing_slash() {
        assert_eq!(TableId::from_collection_path("users/").unwrap().id(), "users");
    }

    #[test]
    fn test_empty() {
        assert!(TableId::from_collection_path("").is_none());
        assert!(TableId::from_collection_path(" / ").is_none());
    }

    #[test]
    fn test_display_and_ordering() {
        let a = TableId::new("alpha");
        let b = TableId::new("beta");
        assert!(a < b);
        assert_eq!(format!("{}", a), "alpha");
    }
}

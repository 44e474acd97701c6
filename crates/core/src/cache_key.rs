use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordered tuple addressing one cached result set, e.g. `["products", "list"]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(Vec<String>);

impl CacheKey {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// Conventional key for everything cached about a collection.
    pub fn collection(name: &str) -> Self {
        Self(vec![name.to_string()])
    }

    pub fn parts(&self) -> &[String] {
        &self.0
    }

    /// Append one more part, e.g. a query parameter.
    pub fn child(&self, part: impl Into<String>) -> Self {
        let mut parts = self.0.clone();
        parts.push(part.into());
        Self(parts)
    }

    /// True when `self` addresses `other` or one of its ancestors.
    pub fn is_prefix_of(&self, other: &CacheKey) -> bool {
        other.0.starts_with(&self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_key_prefixes_its_queries() {
        let products = CacheKey::collection("products");
        let list = products.child("list");
        assert_eq!(list, CacheKey::new(["products", "list"]));
        assert!(products.is_prefix_of(&list));
        assert!(products.is_prefix_of(&products));
        assert!(!list.is_prefix_of(&products));
        assert!(!CacheKey::collection("brands").is_prefix_of(&list));
    }
}

// 📚 Catalog Lookup - does a catalog reference exist?
//
// Only consulted when an entry is created. The engine never performs I/O,
// so lookups run against a snapshot loaded by the caller beforehand.

use std::collections::HashSet;

pub trait CatalogLookup {
    fn exists(&self, catalog_ref: &str) -> bool;
}

/// In-memory set of known catalog references
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    refs: HashSet<String>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, catalog_ref: impl Into<String>) {
        self.refs.insert(catalog_ref.into());
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for StaticCatalog {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        StaticCatalog {
            refs: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl CatalogLookup for StaticCatalog {
    fn exists(&self, catalog_ref: &str) -> bool {
        self.refs.contains(catalog_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_catalog() {
        let mut catalog: StaticCatalog = ["X", "Y"].into_iter().collect();
        catalog.insert("Z");

        assert_eq!(catalog.len(), 3);
        assert!(catalog.exists("X"));
        assert!(catalog.exists("Z"));
        assert!(!catalog.exists("W"));
    }
}

use std::sync::Arc;

use super::cache::TreeCache;
use super::index::ModelIndex;

/// Outcome of checking a model route against the current tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Known,
    Unknown,
    /// No tree could be obtained, so nothing can be ruled out.
    Unverified,
}

impl Verdict {
    /// Unverified routes are permitted.
    pub fn is_allowed(self) -> bool {
        !matches!(self, Verdict::Unknown)
    }
}

/// Decides whether model pages exist, for page-route 404s.
#[derive(Clone)]
pub struct Validator {
    cache: Arc<TreeCache>,
}

impl Validator {
    pub fn new(cache: Arc<TreeCache>) -> Self {
        Self { cache }
    }

    pub async fn check(&self, model: &str, version: Option<&str>) -> Verdict {
        if model.is_empty() {
            return Verdict::Unknown;
        }

        let entries = match self.cache.get_tree(true).await {
            Ok(tree) => tree.entries,
            Err(e) => {
                log::warn!("Tree unavailable, not validating {:?}: {}", model, e);
                return Verdict::Unverified;
            }
        };
        if entries.is_empty() {
            log::warn!("Tree is empty, not validating {:?}", model);
            return Verdict::Unverified;
        }

        let index = ModelIndex::build(&entries);
        let known = match version {
            Some(version) => index.contains_version(model, version),
            None => index.contains_model(model),
        };
        if known {
            Verdict::Known
        } else {
            Verdict::Unknown
        }
    }

    pub async fn is_valid(&self, model: &str, version: Option<&str>) -> bool {
        self.check(model, version).await.is_allowed()
    }
}

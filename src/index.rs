use std::collections::{BTreeMap, BTreeSet};

use super::protocol::TreeEntry;

/// Directory, directly under `<model>/<version>/`, holding generated artifacts.
const GENERATED_DIR: &str = "gen";
/// Extension of the generated files that prove a version exists.
const ARTIFACT_EXTENSION: &str = ".html";

/// Known models and their versions, derived from a tree listing.
///
/// Kept ordered so iteration is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelIndex {
    models: BTreeMap<String, BTreeSet<String>>,
}

impl ModelIndex {
    /// Derives the index from a flat listing. Pure; recomputed per call.
    pub fn build(entries: &[TreeEntry]) -> Self {
        let mut models: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (model, version) in entries.iter().filter_map(artifact_of) {
            models
                .entry(model.to_string())
                .or_default()
                .insert(version.to_string());
        }
        Self { models }
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn contains_model(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    pub fn contains_version(&self, model: &str, version: &str) -> bool {
        self.models
            .get(model)
            .map_or(false, |versions| versions.contains(version))
    }

    /// Models in lexicographic order, each with its sorted versions.
    pub fn iter(&self) -> impl Iterator<Item = (&str, impl Iterator<Item = &str>)> {
        self.models
            .iter()
            .map(|(model, versions)| (model.as_str(), versions.iter().map(String::as_str)))
    }
}

/// `(model, version)` of a generated artifact, i.e. a blob at
/// `<model>/<version>/gen/.../<name>.html`.
fn artifact_of(entry: &TreeEntry) -> Option<(&str, &str)> {
    if !entry.is_blob() {
        return None;
    }
    match entry.path.segments() {
        [model, version, dir, .., file]
            if dir == GENERATED_DIR && file.ends_with(ARTIFACT_EXTENSION) =>
        {
            Some((model.as_str(), version.as_str()))
        }
        _ => None,
    }
}

use std::fmt::Write;
use std::sync::Arc;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use super::cache::TreeCache;
use super::index::ModelIndex;
use super::pages::escape_html;

/// Everything but unreserved characters gets encoded in a path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub const ROOT_PATH: &str = "/";
pub const DIFF_PATH: &str = "/diff";

/// Canonical site path of a model, or of one of its versions.
pub fn model_path(model: &str, version: Option<&str>) -> String {
    let mut path = format!("/models/{}", utf8_percent_encode(model, PATH_SEGMENT));
    if let Some(version) = version {
        // Writing to a String cannot fail
        let _ = write!(
            path,
            "/versions/{}",
            utf8_percent_encode(version, PATH_SEGMENT)
        );
    }
    path
}

/// Lists the canonical paths of the site.
#[derive(Clone)]
pub struct Sitemap {
    cache: Arc<TreeCache>,
}

impl Sitemap {
    pub fn new(cache: Arc<TreeCache>) -> Self {
        Self { cache }
    }

    /// Root, diff view, then every model followed by its versions, all sorted.
    pub async fn list_paths(&self) -> Vec<String> {
        let entries = match self.cache.get_tree(true).await {
            Ok(tree) => tree.entries,
            Err(e) => {
                log::warn!("Tree unavailable, sitemap lists static paths only: {}", e);
                Arc::new(Vec::new())
            }
        };
        paths_of(&ModelIndex::build(&entries))
    }
}

pub fn paths_of(index: &ModelIndex) -> Vec<String> {
    let mut paths = vec![ROOT_PATH.to_string(), DIFF_PATH.to_string()];
    for (model, versions) in index.iter() {
        paths.push(model_path(model, None));
        paths.extend(versions.map(|version| model_path(model, Some(version))));
    }
    paths
}

/// Renders `<urlset>` XML with one `<url>` per path under `base`.
pub fn render_xml(base: &str, paths: &[String]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );
    for path in paths {
        xml.push_str(&format!(
            "  <url><loc>{}</loc></url>\n",
            escape_html(&format!("{}{}", base, path))
        ));
    }
    xml.push_str("</urlset>\n");
    xml
}

use std::io::Write;

use super::cache::TreeCache;
use super::index::ModelIndex;
use super::sitemap;

type Error = Box<dyn std::error::Error + Send + Sync>;

/// One-shot listing of the catalog to stdout.
pub struct Report {
    cache: TreeCache,
    paths: bool,
}

impl Report {
    pub fn new(cache: TreeCache, paths: bool) -> Self {
        Self { cache, paths }
    }

    #[tokio::main]
    pub async fn run(&self) -> Result<(), Error> {
        // Fetch listing
        log::info!("Fetching tree listing");
        let tree = self.cache.get_tree(false).await?;
        let index = ModelIndex::build(&tree.entries);
        if index.is_empty() {
            log::warn!("No models found in {} tree entries", tree.entries.len());
        }

        let stdout = std::io::stdout();
        self.write(&index, &mut stdout.lock())?;
        Ok(())
    }

    fn write(&self, index: &ModelIndex, out: &mut impl Write) -> std::io::Result<()> {
        if self.paths {
            for path in sitemap::paths_of(index) {
                writeln!(out, "{}", path)?;
            }
        } else {
            for (model, versions) in index.iter() {
                for version in versions {
                    writeln!(out, "{}\t{}", model, version)?;
                }
            }
        }
        Ok(())
    }
}

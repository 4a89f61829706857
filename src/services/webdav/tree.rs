use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::{join_all, BoxFuture, FutureExt};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::models::RemoteEntry;

use super::config::ConcurrencyConfig;
use super::service::WebDAVService;

/// Folders nested deeper than this are left unexpanded. Cycles are caught
/// earlier by the ancestor check in `expand_child`; this bounds plain depth.
pub const MAX_TREE_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("invalid directory listing: {0}")]
    InvalidListing(String),
}

/// Anything that can produce a depth-1 listing whose first entry is the
/// listed directory itself
#[async_trait]
pub trait DirectoryLister: Send + Sync {
    async fn list(&self, path: &str) -> Vec<RemoteEntry>;
}

#[async_trait]
impl DirectoryLister for WebDAVService {
    async fn list(&self, path: &str) -> Vec<RemoteEntry> {
        WebDAVService::list(self, path).await
    }
}

/// Expands a flat listing into a nested tree, one listing request per folder.
///
/// Sibling folders are fetched concurrently up to the configured limit, but
/// children always keep the order the server listed them in.
#[derive(Clone)]
pub struct DirectoryTreeBuilder {
    lister: Arc<dyn DirectoryLister>,
    listing_semaphore: Arc<Semaphore>,
}

impl DirectoryTreeBuilder {
    pub fn new(lister: Arc<dyn DirectoryLister>) -> Self {
        Self::with_concurrency(lister, ConcurrencyConfig::default())
    }

    pub fn with_concurrency(lister: Arc<dyn DirectoryLister>, concurrency: ConcurrencyConfig) -> Self {
        let permits = concurrency.max_concurrent_listings.max(1);
        Self {
            lister,
            listing_semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Builds the tree rooted at the listing's first entry, which must be a folder
    pub async fn build_tree(&self, listing: Vec<RemoteEntry>) -> Result<RemoteEntry, TreeError> {
        let tree = self.build_subtree(listing, 0, Arc::new(HashSet::new())).await?;
        info!(
            "🌳 Built tree for '{}': {} entries, {} files",
            tree.path,
            tree.walk().count(),
            tree.file_count()
        );
        Ok(tree)
    }

    /// Lists `path` and builds its tree
    pub async fn build_tree_for(&self, path: &str) -> Result<RemoteEntry, TreeError> {
        let listing = self.lister.list(path).await;
        self.build_tree(listing).await
    }

    /// `ancestors` holds the paths of every folder above the listed one
    fn build_subtree(
        &self,
        listing: Vec<RemoteEntry>,
        depth: usize,
        ancestors: Arc<HashSet<String>>,
    ) -> BoxFuture<'_, Result<RemoteEntry, TreeError>> {
        async move {
            let mut entries = listing.into_iter();
            let mut root = match entries.next() {
                Some(first) if first.is_folder() => first,
                Some(first) => {
                    return Err(TreeError::InvalidListing(format!(
                        "first entry '{}' is a file, expected the listed folder",
                        first.path
                    )))
                }
                None => return Err(TreeError::InvalidListing("listing is empty".to_string())),
            };

            let root_path = root.path.clone();
            let mut visited = (*ancestors).clone();
            visited.insert(root_path.clone());
            let visited = Arc::new(visited);

            let pending = entries
                .filter(|entry| {
                    // Some servers repeat the self entry further down the listing
                    entry.path != root_path
                })
                .map(|entry| self.expand_child(entry, depth + 1, Arc::clone(&visited)));

            root.children = Some(join_all(pending).await);
            Ok(root)
        }
        .boxed()
    }

    async fn expand_child(&self, entry: RemoteEntry, depth: usize, ancestors: Arc<HashSet<String>>) -> RemoteEntry {
        if entry.is_file() {
            return entry;
        }
        if ancestors.contains(&entry.path) {
            warn!("🔄 Not expanding '{}': it is one of its own ancestors", entry.path);
            return entry;
        }
        if depth > MAX_TREE_DEPTH {
            warn!("Not expanding '{}': deeper than {} levels", entry.path, MAX_TREE_DEPTH);
            return entry;
        }

        let listing = {
            // Only the request holds a permit, recursion below does not
            let _permit = self.listing_semaphore.acquire().await.ok();
            debug!("Expanding folder '{}' at depth {}", entry.path, depth);
            self.lister.list(&entry.path).await
        };

        if listing.is_empty() {
            warn!("⚠️ Listing of '{}' came back empty, leaving it unexpanded", entry.path);
            return entry;
        }

        match self.build_subtree(listing, depth, ancestors).await {
            Ok(subtree) => subtree,
            Err(e) => {
                warn!("⚠️ Could not expand '{}': {}", entry.path, e);
                entry
            }
        }
    }
}

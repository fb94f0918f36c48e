//! Recursive discovery of candidate files under the configured roots.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::filter::PathFilter;
use crate::remote::RemoteSession;
use crate::retry::RetryExecutor;
use crate::types::{CandidateFile, RemotePath, SkippedDirectory};

/// Result of walking all roots
#[derive(Debug, Default)]
pub struct Listing {
    /// Qualifying files, each path at most once
    pub candidates: Vec<CandidateFile>,
    /// Directories that could not be listed even after retrying
    pub skipped: Vec<SkippedDirectory>,
}

/// Walks remote directory trees and collects files accepted by a [`PathFilter`]
pub struct Lister {
    session: Arc<dyn RemoteSession>,
    filter: PathFilter,
    retry: RetryExecutor,
}

impl Lister {
    /// Create a lister over `session`
    pub fn new(session: Arc<dyn RemoteSession>, filter: PathFilter, retry: RetryExecutor) -> Self {
        Self {
            session,
            filter,
            retry,
        }
    }

    /// Walk every root depth-first
    ///
    /// A directory that stays unreachable after retries is recorded in
    /// [`Listing::skipped`] and the walk continues with the rest of the tree
    /// and the remaining roots. Stops early (returning what was found so far)
    /// when `cancel` fires.
    pub async fn list(&self, roots: &[String], cancel: &CancellationToken) -> Listing {
        let mut listing = Listing::default();
        let mut seen_files: HashSet<RemotePath> = HashSet::new();
        let mut visited_dirs: HashSet<RemotePath> = HashSet::new();

        for root in roots {
            let trimmed = root.trim_end_matches('/');
            let root = if trimmed.is_empty() { "/" } else { trimmed };
            let mut stack = vec![RemotePath::new(root)];

            while let Some(dir) = stack.pop() {
                if cancel.is_cancelled() {
                    tracing::warn!(directory = %dir, "Listing cancelled");
                    return listing;
                }
                // overlapping roots or symlinked directories would otherwise be walked twice
                if !visited_dirs.insert(dir.clone()) {
                    continue;
                }

                let entries = match self.retry.execute(|| self.session.list(&dir)).await {
                    Ok(entries) => entries,
                    Err(e) => {
                        tracing::warn!(
                            directory = %dir,
                            error = %e,
                            "Skipping unreachable directory"
                        );
                        listing.skipped.push(SkippedDirectory {
                            path: dir.clone(),
                            reason: e.to_string(),
                        });
                        continue;
                    }
                };

                for entry in entries {
                    if entry.is_dir {
                        stack.push(entry.path);
                    } else if self.filter.matches(entry.path.as_str())
                        && seen_files.insert(entry.path.clone())
                    {
                        listing.candidates.push(CandidateFile::new(entry.path));
                    }
                }
            }
        }

        tracing::info!(
            roots = roots.len(),
            candidates = listing.candidates.len(),
            skipped = listing.skipped.len(),
            "Remote listing complete"
        );
        listing
    }
}

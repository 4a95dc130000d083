//! Document loading: recursive traversal in host order with bounded content
//! fetches. Loading has no partial-success mode; any failure aborts the run.

use std::fmt;

use futures_util::future::{join_all, LocalBoxFuture};
use tokio::sync::Semaphore;

use crate::documents::Document;
use crate::github::{EntryKind, HostError, Listing, RepoHost, RepoLocator};

/// File names excluded from loading: license files, lint/format ignore
/// files, and tool configuration with no semantic value to search over.
pub const IGNORED_FILES: &[&str] = &[
    "LICENSE",
    "LICENSE.md",
    "LICENSE.txt",
    ".eslintignore",
    ".prettierignore",
    ".stylelintignore",
    ".yarnrc.yml",
    ".yarnrc",
    ".npmrc",
    ".prettierrc",
    ".eslintrc.js",
    ".stylelintrc.js",
    "jest.config.js",
    "webpack.config.js",
    "vite.config.js",
    "tsconfig.json",
    "jsconfig.json",
    ".dockerignore",
    ".gitattributes",
    ".gitignore",
    ".editorconfig",
    ".babelrc",
    ".commitlintrc.js",
];

/// Errors surfaced while loading the document tree.
#[derive(Debug)]
pub enum LoaderError {
    /// Upstream rate limit, rewritten into a human-readable message.
    RateLimited(HostError),
    /// Any other host failure, propagated verbatim.
    Host(HostError),
}

impl From<HostError> for LoaderError {
    fn from(err: HostError) -> Self {
        if err.is_rate_limited() {
            Self::RateLimited(err)
        } else {
            Self::Host(err)
        }
    }
}

impl fmt::Display for LoaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited(_) => write!(
                f,
                "GitHub API rate limit exceeded. Please provide a valid GitHub token or try again later."
            ),
            Self::Host(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for LoaderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::RateLimited(err) | Self::Host(err) => Some(err),
        }
    }
}

/// Loads every non-ignored file of a repository, in host traversal order.
pub struct DocumentLoader<'a, H> {
    host: &'a H,
    locator: RepoLocator,
    fetch_concurrency: usize,
}

impl<'a, H: RepoHost> DocumentLoader<'a, H> {
    /// Creates a loader for one repository.
    pub fn new(host: &'a H, locator: RepoLocator, fetch_concurrency: usize) -> Self {
        Self {
            host,
            locator,
            fetch_concurrency: fetch_concurrency.max(1),
        }
    }

    /// Traverses the repository and fetches every kept file's content.
    ///
    /// Directory listings are walked depth-first so the returned documents
    /// preserve the host's traversal order; content fetches overlap up to the
    /// configured concurrency without reordering the result.
    pub async fn load(&self) -> Result<Vec<Document>, LoaderError> {
        let paths = self.collect_paths(String::new()).await?;
        let limiter = Semaphore::new(self.fetch_concurrency);
        let limiter = &limiter;
        let contents = join_all(paths.iter().map(|path| async move {
            let _permit = limiter.acquire().await.expect("fetch limiter is never closed");
            self.host
                .fetch_file(self.locator.owner(), self.locator.repo(), path)
                .await
        }))
        .await;

        let mut documents = Vec::with_capacity(paths.len());
        for (path, content) in paths.into_iter().zip(contents) {
            documents.push(Document::new(path, content?));
        }
        Ok(documents)
    }

    fn collect_paths<'s>(
        &'s self,
        path: String,
    ) -> LocalBoxFuture<'s, Result<Vec<String>, LoaderError>> {
        Box::pin(async move {
            let listing = self
                .host
                .list(self.locator.owner(), self.locator.repo(), &path)
                .await?;
            let mut paths = Vec::new();
            match listing {
                Listing::File => paths.push(path),
                Listing::Entries(entries) => {
                    for entry in entries {
                        match entry.kind {
                            EntryKind::File => {
                                if !is_ignored(&entry.name) {
                                    paths.push(entry.path);
                                }
                            }
                            EntryKind::Dir => {
                                paths.extend(self.collect_paths(entry.path).await?);
                            }
                            EntryKind::Other(kind) => eprintln!(
                                "warning: skipping {} (unsupported entry kind {kind})",
                                entry.path
                            ),
                        }
                    }
                }
            }
            Ok(paths)
        })
    }
}

fn is_ignored(name: &str) -> bool {
    IGNORED_FILES.contains(&name)
}

//! GitHub host boundary: directory listings, raw file contents, and the
//! recursive file counter used for credit gating.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::future::{join_all, LocalBoxFuture};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::Semaphore;

const GITHUB_API_BASE: &str = "https://api.github.com";
const CLIENT_USER_AGENT: &str = "reposense/0.1 (+https://github.com/reposense/reposense)";
const REQUEST_TIMEOUT_SECS: u64 = 30;
/// Upper bound on in-flight directory listings during a recursive count.
const LIST_CONCURRENCY: usize = 8;

/// Owner/repository pair parsed from a GitHub URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLocator {
    owner: String,
    repo: String,
}

impl RepoLocator {
    /// Parses `https://github.com/<owner>/<repo>` by positional `/` segment.
    ///
    /// Returns `None` when either segment is missing or empty.
    pub fn parse(url: &str) -> Option<Self> {
        let mut segments = url.split('/');
        let owner = segments.nth(3)?;
        let repo = segments.next()?;
        if owner.is_empty() || repo.is_empty() {
            return None;
        }
        Some(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    /// Repository owner segment.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Repository name segment.
    pub fn repo(&self) -> &str {
        &self.repo
    }
}

/// Kind of a directory entry reported by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// Regular file.
    File,
    /// Subdirectory.
    Dir,
    /// Anything else the host reports (symlink, submodule).
    Other(String),
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Entry file name.
    pub name: String,
    /// Repository-relative entry path.
    pub path: String,
    /// Entry kind as reported by the host.
    pub kind: EntryKind,
}

/// Result of resolving a repository path against the host.
#[derive(Debug, Clone)]
pub enum Listing {
    /// The path resolved to a single file.
    File,
    /// The path resolved to a directory listing.
    Entries(Vec<TreeEntry>),
}

/// Errors surfaced by the host boundary.
#[derive(Debug)]
pub enum HostError {
    /// The host returned a non-success status.
    Status {
        /// HTTP status code of the response.
        status: StatusCode,
        /// Response body, kept for rate-limit detection and diagnostics.
        body: String,
    },
    /// Transport-level failure before a response arrived.
    Transport(reqwest::Error),
    /// The response payload did not match the expected shape.
    Payload(String),
}

impl HostError {
    /// Whether the failure signals upstream rate limiting.
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::Status { status, body } => {
                *status == StatusCode::TOO_MANY_REQUESTS || body.contains("rate limit")
            }
            Self::Transport(_) | Self::Payload(_) => false,
        }
    }
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status { status, body } => write!(f, "host returned {status}: {body}"),
            Self::Transport(err) => write!(f, "host request failed: {err}"),
            Self::Payload(message) => write!(f, "unexpected host payload: {message}"),
        }
    }
}

impl std::error::Error for HostError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(err) => Some(err),
            Self::Status { .. } | Self::Payload(_) => None,
        }
    }
}

/// Remote repository host operations the pipeline depends on.
#[allow(async_fn_in_trait)]
pub trait RepoHost {
    /// Resolves a repository path to a file marker or a directory listing.
    async fn list(&self, owner: &str, repo: &str, path: &str) -> Result<Listing, HostError>;

    /// Fetches the raw content of a single file.
    async fn fetch_file(&self, owner: &str, repo: &str, path: &str) -> Result<String, HostError>;
}

/// GitHub REST client implementing [`RepoHost`] over the contents API.
pub struct GithubClient {
    client: Client,
    base_url: String,
}

impl GithubClient {
    /// Builds a new client, attaching the token to every request when given.
    pub fn new(token: Option<String>) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        match &token {
            Some(token) => {
                let auth = format!("Bearer {}", token.trim());
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&auth).context("invalid GitHub token")?,
                );
            }
            None => eprintln!(
                "warning: no GitHub token provided; unauthenticated requests exhaust the rate limit quickly"
            ),
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .default_headers(headers)
            .build()
            .context("failed to build GitHub HTTP client")?;
        Ok(Self {
            client,
            base_url: GITHUB_API_BASE.to_string(),
        })
    }

    fn contents_url(&self, owner: &str, repo: &str, path: &str) -> String {
        if path.is_empty() {
            format!("{}/repos/{}/{}/contents", self.base_url, owner, repo)
        } else {
            format!("{}/repos/{}/{}/contents/{}", self.base_url, owner, repo, path)
        }
    }

    async fn get(&self, url: &str, accept: &'static str) -> Result<reqwest::Response, HostError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, accept)
            .send()
            .await
            .map_err(HostError::Transport)?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(HostError::Status { status, body });
        }
        Ok(response)
    }
}

impl RepoHost for GithubClient {
    async fn list(&self, owner: &str, repo: &str, path: &str) -> Result<Listing, HostError> {
        let url = self.contents_url(owner, repo, path);
        let response = self.get(&url, "application/vnd.github+json").await?;
        let contents: ContentsResponse = response
            .json()
            .await
            .map_err(|err| HostError::Payload(err.to_string()))?;
        Ok(match contents {
            ContentsResponse::Listing(entries) => {
                Listing::Entries(entries.into_iter().map(RawEntry::into_entry).collect())
            }
            ContentsResponse::Single(entry) if entry.kind == "file" => Listing::File,
            // Symlinks and submodules resolve to a single non-file object
            // and contribute nothing to a count or a load.
            ContentsResponse::Single(_) => Listing::Entries(Vec::new()),
        })
    }

    async fn fetch_file(&self, owner: &str, repo: &str, path: &str) -> Result<String, HostError> {
        let url = self.contents_url(owner, repo, path);
        let response = self.get(&url, "application/vnd.github.raw").await?;
        response.text().await.map_err(HostError::Transport)
    }
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

impl RawEntry {
    fn into_entry(self) -> TreeEntry {
        let kind = if self.kind == "file" {
            EntryKind::File
        } else if self.kind == "dir" {
            EntryKind::Dir
        } else {
            EntryKind::Other(self.kind)
        };
        TreeEntry {
            name: self.name,
            path: self.path,
            kind,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentsResponse {
    Listing(Vec<RawEntry>),
    Single(RawEntry),
}

/// Recursively counts the leaf files reachable from `path`.
///
/// Sibling directories are counted in parallel; in-flight listing fetches are
/// bounded, and no fetch slot is held across recursion. Any fetch failure
/// aborts the whole count.
pub async fn count_files<H: RepoHost>(
    host: &H,
    locator: &RepoLocator,
    path: &str,
) -> Result<usize, HostError> {
    let limiter = Semaphore::new(LIST_CONCURRENCY);
    count_path(host, &limiter, locator, path.to_string()).await
}

fn count_path<'a, H: RepoHost>(
    host: &'a H,
    limiter: &'a Semaphore,
    locator: &'a RepoLocator,
    path: String,
) -> LocalBoxFuture<'a, Result<usize, HostError>> {
    Box::pin(async move {
        let listing = {
            let _permit = limiter.acquire().await.expect("listing limiter is never closed");
            host.list(locator.owner(), locator.repo(), &path).await?
        };
        match listing {
            Listing::File => Ok(1),
            Listing::Entries(entries) => {
                let mut count = 0;
                let mut directories = Vec::new();
                for entry in entries {
                    match entry.kind {
                        EntryKind::Dir => directories.push(entry.path),
                        // Non-directory entries are leaves.
                        EntryKind::File | EntryKind::Other(_) => count += 1,
                    }
                }
                let partials = join_all(
                    directories
                        .into_iter()
                        .map(|dir| count_path(host, limiter, locator, dir)),
                )
                .await;
                for partial in partials {
                    count += partial?;
                }
                Ok(count)
            }
        }
    })
}

/// Counts the files that indexing `github_url` would touch.
///
/// An unparseable URL short-circuits to 0 without contacting the host, so the
/// caller treats the repository as free rather than seeing an error.
pub async fn check_credits<H: RepoHost>(host: &H, github_url: &str) -> Result<usize, HostError> {
    let Some(locator) = RepoLocator::parse(github_url) else {
        return Ok(0);
    };
    count_files(host, &locator, "").await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::HashMap;

    struct FakeHost {
        listings: HashMap<String, Listing>,
        list_calls: Cell<usize>,
    }

    impl FakeHost {
        fn new(listings: Vec<(&str, Listing)>) -> Self {
            Self {
                listings: listings
                    .into_iter()
                    .map(|(path, listing)| (path.to_string(), listing))
                    .collect(),
                list_calls: Cell::new(0),
            }
        }
    }

    impl RepoHost for FakeHost {
        async fn list(&self, _owner: &str, _repo: &str, path: &str) -> Result<Listing, HostError> {
            self.list_calls.set(self.list_calls.get() + 1);
            self.listings
                .get(path)
                .cloned()
                .ok_or_else(|| HostError::Payload(format!("unknown path {path}")))
        }

        async fn fetch_file(
            &self,
            _owner: &str,
            _repo: &str,
            path: &str,
        ) -> Result<String, HostError> {
            Err(HostError::Payload(format!("no content for {path}")))
        }
    }

    fn file(path: &str) -> TreeEntry {
        TreeEntry {
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            path: path.to_string(),
            kind: EntryKind::File,
        }
    }

    fn dir(path: &str) -> TreeEntry {
        TreeEntry {
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            path: path.to_string(),
            kind: EntryKind::Dir,
        }
    }

    #[test]
    fn parse_extracts_owner_and_repo() {
        let locator = RepoLocator::parse("https://github.com/octocat/hello-world")
            .expect("locator parsed");
        assert_eq!(locator.owner(), "octocat");
        assert_eq!(locator.repo(), "hello-world");
    }

    #[test]
    fn parse_rejects_urls_missing_segments() {
        assert_eq!(RepoLocator::parse("https://github.com/octocat"), None);
        assert_eq!(RepoLocator::parse("https://github.com/"), None);
        assert_eq!(RepoLocator::parse("octocat/hello-world"), None);
        assert_eq!(RepoLocator::parse(""), None);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn counts_leaves_of_nested_tree() {
        let host = FakeHost::new(vec![
            (
                "",
                Listing::Entries(vec![
                    file("a.txt"),
                    file("b.txt"),
                    dir("sub1"),
                    dir("sub2"),
                ]),
            ),
            (
                "sub1",
                Listing::Entries(vec![file("sub1/c.txt"), dir("sub1/deep")]),
            ),
            (
                "sub1/deep",
                Listing::Entries(vec![file("sub1/deep/d.txt"), file("sub1/deep/e.txt")]),
            ),
            (
                "sub2",
                Listing::Entries(vec![
                    file("sub2/f.txt"),
                    TreeEntry {
                        name: "linked".to_string(),
                        path: "sub2/linked".to_string(),
                        kind: EntryKind::Other("symlink".to_string()),
                    },
                ]),
            ),
        ]);
        let locator = RepoLocator::parse("https://github.com/octocat/tree").expect("locator");

        let count = count_files(&host, &locator, "").await.expect("count");

        // Manually flattened: a, b, c, d, e, f, plus the symlink leaf.
        assert_eq!(count, 7);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn path_resolving_to_file_counts_one() {
        let host = FakeHost::new(vec![("docs/README.md", Listing::File)]);
        let locator = RepoLocator::parse("https://github.com/octocat/tree").expect("locator");

        let count = count_files(&host, &locator, "docs/README.md").await.expect("count");

        assert_eq!(count, 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn malformed_url_is_free_and_makes_no_host_calls() {
        let host = FakeHost::new(Vec::new());

        let count = check_credits(&host, "https://github.com/only-owner")
            .await
            .expect("credit check");

        assert_eq!(count, 0);
        assert_eq!(host.list_calls.get(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn credit_check_counts_from_repository_root() {
        let host = FakeHost::new(vec![(
            "",
            Listing::Entries(vec![file("README.md"), file("main.rs")]),
        )]);

        let count = check_credits(&host, "https://github.com/octocat/flat")
            .await
            .expect("credit check");

        assert_eq!(count, 2);
        assert_eq!(host.list_calls.get(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn listing_failure_propagates() {
        let host = FakeHost::new(vec![(
            "",
            Listing::Entries(vec![dir("missing")]),
        )]);
        let locator = RepoLocator::parse("https://github.com/octocat/broken").expect("locator");

        let err = count_files(&host, &locator, "")
            .await
            .expect_err("missing listing fails the count");

        match err {
            HostError::Payload(message) => assert!(message.contains("missing")),
            other => panic!("expected payload error, got {other:?}"),
        }
    }
}

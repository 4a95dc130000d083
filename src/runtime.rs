//! Application runner coordinating the ingestion pipeline stages.

use anyhow::{bail, Result};

use crate::controls::IngestControls;
use crate::documents::Document;
use crate::github::{RepoHost, RepoLocator};
use crate::loader::DocumentLoader;
use crate::pipeline;
use crate::services::{EmbeddingService, SummaryService};
use crate::store::RecordSink;

/// Loads a repository and drives it through summarization, embedding, and
/// persistence, strictly one stage at a time.
///
/// A loader failure aborts the run before any ingestion happens; everything
/// downstream tolerates per-item failure. Returns the loaded documents
/// regardless of how many records were ultimately persisted.
pub async fn index_repository<H, S, E, K>(
    host: &H,
    summarizer: &S,
    embedder: &E,
    sink: &K,
    repo_url: &str,
    controls: &IngestControls,
) -> Result<Vec<Document>>
where
    H: RepoHost,
    S: SummaryService,
    E: EmbeddingService,
    K: RecordSink,
{
    let Some(locator) = RepoLocator::parse(repo_url) else {
        bail!("unrecognized GitHub repository URL: {repo_url}");
    };
    let loader = DocumentLoader::new(host, locator, controls.fetch_concurrency());
    let documents = loader.load().await?;
    println!("Loaded {} documents from {repo_url}", documents.len());

    let summaries = pipeline::summarize_all(summarizer, &documents, controls).await;
    let embeddings = pipeline::embed_all(embedder, &summaries, controls).await;
    let stored = pipeline::persist_all(sink, &embeddings, controls).await;

    println!(
        "Indexed {repo_url}: {} summaries, {} embeddings, {stored} rows stored",
        summaries.len(),
        embeddings.len()
    );
    Ok(documents)
}

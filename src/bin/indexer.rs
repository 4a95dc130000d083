use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_postgres::NoTls;
use url::Url;

use reposense::{
    index_repository, ChatSummarizer, EmbeddingStore, GithubClient, IngestControls,
    OpenAiEmbedder, TableName,
};

/// Column width used when the embedding model reports no dimension override.
const DEFAULT_EMBEDDING_DIMS: usize = 1536;

#[derive(Parser, Debug)]
#[command(
    name = "reposense-indexer",
    about = "Summarize, embed, and store every file of a GitHub repository"
)]
struct IndexerCli {
    /// GitHub repository URL (https://github.com/owner/repo)
    #[arg(long, env = "REPOSENSE_REPO_URL")]
    repo_url: String,

    /// GitHub access token; unauthenticated requests are heavily rate limited
    #[arg(long, env = "GITHUB_TOKEN")]
    github_token: Option<String>,

    /// Project identifier attached to every stored row
    #[arg(long, env = "REPOSENSE_PROJECT_ID")]
    project_id: Option<String>,

    /// API key for the summarization and embedding endpoints
    #[arg(long, env = "OPENAI_API_KEY")]
    openai_api_key: String,

    /// Chat model used for file summaries
    #[arg(long, env = "REPOSENSE_SUMMARY_MODEL", default_value = "gpt-4o-mini")]
    summary_model: String,

    /// Embedding model identifier
    #[arg(
        long,
        env = "REPOSENSE_EMBED_MODEL",
        default_value = "text-embedding-3-small"
    )]
    embedding_model: String,

    /// Optional dimension override when supported by the model
    #[arg(long, env = "REPOSENSE_EMBED_DIMENSIONS")]
    embedding_dimensions: Option<usize>,

    /// Base URL for the OpenAI-compatible API
    #[arg(
        long,
        env = "REPOSENSE_OPENAI_BASE",
        default_value = "https://api.openai.com/v1"
    )]
    openai_base_url: String,

    /// Max seconds to wait for each model request
    #[arg(long, env = "REPOSENSE_OPENAI_TIMEOUT_SECS", default_value_t = 60)]
    openai_timeout_secs: u64,

    /// Postgres connection string (postgres://...)
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Target schema for the embedding table
    #[arg(long, env = "REPOSENSE_PG_SCHEMA", default_value = "public")]
    schema: String,

    /// Target table name inside the schema
    #[arg(long, env = "REPOSENSE_PG_TABLE", default_value = "SourceCodeEmbedding")]
    table: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = IndexerCli::parse();
    let parsed = Url::parse(&cli.repo_url)
        .with_context(|| format!("invalid repository URL {}", cli.repo_url))?;
    anyhow::ensure!(
        matches!(parsed.scheme(), "http" | "https"),
        "unsupported URL scheme {}; expected an https GitHub URL",
        parsed.scheme()
    );

    let timeout = Duration::from_secs(cli.openai_timeout_secs.max(1));
    let host = GithubClient::new(cli.github_token)?;
    let summarizer = ChatSummarizer::new(
        cli.openai_api_key.clone(),
        cli.openai_base_url.clone(),
        cli.summary_model,
        timeout,
    )?;
    let embedder = OpenAiEmbedder::new(
        cli.openai_api_key,
        cli.openai_base_url,
        cli.embedding_model,
        cli.embedding_dimensions,
        timeout,
    )?;

    let (client, connection) = tokio_postgres::connect(&cli.database_url, NoTls)
        .await
        .with_context(|| format!("failed to connect to Postgres at {}", cli.database_url))?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            eprintln!("postgres connection error: {err}");
        }
    });

    let table = TableName::new(cli.schema, cli.table)?;
    let store = EmbeddingStore::new(client, table, cli.project_id);
    store
        .ensure_schema(cli.embedding_dimensions.unwrap_or(DEFAULT_EMBEDDING_DIMS))
        .await?;

    let controls = IngestControls::default();
    let documents = index_repository(
        &host,
        &summarizer,
        &embedder,
        &store,
        &cli.repo_url,
        &controls,
    )
    .await?;

    println!(
        "Finished indexing {} document{} from {}.",
        documents.len(),
        if documents.len() == 1 { "" } else { "s" },
        cli.repo_url
    );
    Ok(())
}

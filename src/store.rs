//! pgvector-backed persistence for embedding records.

use anyhow::{Context, Result};
use pgvector::Vector;
use tokio_postgres::Client;

use crate::documents::EmbeddingRecord;

/// Fully-qualified Postgres table name (schema + table).
#[derive(Debug, Clone)]
pub struct TableName {
    schema: String,
    table: String,
}

impl TableName {
    /// Builds a new table identifier.
    pub fn new<S, T>(schema: S, table: T) -> Result<Self>
    where
        S: Into<String>,
        T: Into<String>,
    {
        let schema = schema.into();
        let table = table.into();
        anyhow::ensure!(!schema.trim().is_empty(), "schema name is required");
        anyhow::ensure!(!table.trim().is_empty(), "table name is required");
        Ok(Self { schema, table })
    }

    /// Fully-qualified table reference with quoted identifiers.
    pub fn qualified(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }
}

// Quotes Postgres identifiers, escaping embedded quotes.
fn quote_ident(input: &str) -> String {
    let escaped = input.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

/// Destination for completed embedding records.
#[allow(async_fn_in_trait)]
pub trait RecordSink {
    /// Durably writes one record.
    async fn persist(&self, record: &EmbeddingRecord) -> Result<()>;
}

/// Postgres sink that writes each row and its vector in two steps.
///
/// The target engine cannot take a vector literal in the same statement as
/// the relational insert, so the row is inserted first and the vector column
/// populated by a second write keyed on the returned id. The two writes are
/// not atomic; a crash in between leaves a row with a null vector.
pub struct EmbeddingStore {
    client: Client,
    table: TableName,
    project_id: Option<String>,
}

impl EmbeddingStore {
    /// Creates a sink writing to `table`, tagging rows with `project_id`
    /// when one is supplied.
    pub fn new(client: Client, table: TableName, project_id: Option<String>) -> Self {
        Self {
            client,
            table,
            project_id,
        }
    }

    /// Creates the vector extension and target table when missing.
    pub async fn ensure_schema(&self, dims: usize) -> Result<()> {
        anyhow::ensure!(dims > 0, "embedding dimension must be positive");
        self.client
            .execute("CREATE EXTENSION IF NOT EXISTS vector", &[])
            .await
            .context("failed to ensure pgvector extension")?;
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                \"id\" BIGSERIAL PRIMARY KEY,
                \"projectId\" TEXT,
                \"fileName\" TEXT NOT NULL,
                \"summary\" TEXT NOT NULL,
                \"sourceCode\" TEXT NOT NULL,
                \"summaryEmbedding\" VECTOR({dims})
            )",
            self.table.qualified()
        );
        self.client
            .execute(&ddl, &[])
            .await
            .context("failed to ensure embedding table")?;
        Ok(())
    }

    fn insert_statement(&self) -> String {
        format!(
            "INSERT INTO {} (\"fileName\", \"summary\", \"sourceCode\", \"projectId\") \
             VALUES ($1, $2, $3, $4) RETURNING \"id\"",
            self.table.qualified()
        )
    }

    fn update_statement(&self) -> String {
        format!(
            "UPDATE {} SET \"summaryEmbedding\" = $1 WHERE \"id\" = $2",
            self.table.qualified()
        )
    }
}

impl RecordSink for EmbeddingStore {
    async fn persist(&self, record: &EmbeddingRecord) -> Result<()> {
        let row = self
            .client
            .query_one(
                &self.insert_statement(),
                &[
                    &record.file_name,
                    &record.summary,
                    &record.source_code,
                    &self.project_id,
                ],
            )
            .await
            .with_context(|| format!("failed to insert row for {}", record.file_name))?;
        let id: i64 = row.try_get(0).context("insert did not return an id")?;
        let vector = Vector::from(record.embedding.clone());
        self.client
            .execute(&self.update_statement(), &[&vector, &id])
            .await
            .with_context(|| format!("failed to store vector for {}", record.file_name))?;
        Ok(())
    }
}

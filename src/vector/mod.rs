// Knowledge-base nearest-neighbour search over PostgreSQL + pgvector.
// The `documents` table is populated by an offline indexing job.

mod pgvector_sqlx;
pub use pgvector_sqlx::PgVector;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use tracing::info;

/// One knowledge-base hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeMatch {
    pub id: String,
    pub title: String,
    pub content: String,
    pub instrument: Option<String>,
    pub source_type: Option<String>,
    /// Cosine similarity in [0, 1]
    pub similarity: f64,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilters {
    pub instrument: Option<String>,
    pub source_type: Option<String>,
}

#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    /// Up to `limit` matches with similarity >= `similarity_threshold`, most similar first
    async fn search(
        &self,
        embedding: &[f32],
        limit: usize,
        similarity_threshold: f64,
        filters: Option<&SearchFilters>,
    ) -> Result<Vec<KnowledgeMatch>>;
}

pub struct PgKnowledgeBase {
    pool: PgPool,
}

impl PgKnowledgeBase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Check the pgvector extension is installed. Searches fail until it is.
    pub async fn verify(&self) -> Result<()> {
        sqlx::query("SELECT 1 FROM pg_extension WHERE extname = 'vector'")
            .persistent(false)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to verify pgvector extension")?
            .ok_or_else(|| {
                anyhow::anyhow!("pgvector extension not found. Please run migrations.")
            })?;

        Ok(())
    }

    /// Ensure an HNSW cosine index exists on `table.column`
    pub async fn ensure_hnsw_index(&self, table: &str, column: &str) -> Result<()> {
        let index_name = format!("idx_{}_{}_hnsw", table, column);

        let exists = sqlx::query("SELECT 1 FROM pg_indexes WHERE indexname = $1")
            .bind(&index_name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to check if HNSW index exists")?;

        if exists.is_some() {
            info!("HNSW index {} already exists", index_name);
            return Ok(());
        }

        let create_query = format!(
            "CREATE INDEX {} ON {} USING hnsw ({} vector_cosine_ops)",
            index_name, table, column
        );

        sqlx::query(&create_query)
            .execute(&self.pool)
            .await
            .context("Failed to create HNSW index")?;

        info!("Created HNSW index {} for {}.{}", index_name, table, column);
        Ok(())
    }

    /// (total documents, documents with embeddings)
    pub async fn document_stats(&self) -> Result<(i64, i64)> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, COUNT(embedding) AS embedded FROM documents",
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to get document statistics")?;

        Ok((row.try_get("total")?, row.try_get("embedded")?))
    }
}

#[async_trait]
impl KnowledgeBase for PgKnowledgeBase {
    async fn search(
        &self,
        embedding: &[f32],
        limit: usize,
        similarity_threshold: f64,
        filters: Option<&SearchFilters>,
    ) -> Result<Vec<KnowledgeMatch>> {
        let vector = PgVector::from(embedding);
        let instrument = filters.and_then(|f| f.instrument.clone());
        let source_type = filters.and_then(|f| f.source_type.clone());

        let rows = sqlx::query(
            r#"
            SELECT
                id::text AS id,
                COALESCE(title, '') AS title,
                content,
                instrument,
                source_type,
                metadata,
                1 - (embedding <=> $1) AS similarity
            FROM documents
            WHERE embedding IS NOT NULL
              AND 1 - (embedding <=> $1) >= $2
              AND ($3::text IS NULL OR instrument = $3)
              AND ($4::text IS NULL OR source_type = $4)
            ORDER BY embedding <=> $1
            LIMIT $5
            "#,
        )
        .bind(vector)
        .bind(similarity_threshold)
        .bind(instrument)
        .bind(source_type)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to execute similarity search")?;

        let mut matches = Vec::with_capacity(rows.len());
        for row in rows {
            let similarity: f64 = row.try_get("similarity")?;
            matches.push(KnowledgeMatch {
                id: row.try_get("id")?,
                title: row.try_get("title")?,
                content: row.try_get("content")?,
                instrument: row.try_get("instrument")?,
                source_type: row.try_get("source_type")?,
                similarity: similarity.clamp(0.0, 1.0),
                payload: row
                    .try_get::<Option<serde_json::Value>, _>("metadata")?
                    .unwrap_or(serde_json::Value::Null),
            });
        }

        info!(
            threshold = similarity_threshold,
            found = matches.len(),
            "Knowledge base search complete"
        );
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Requires DATABASE_URL with pgvector and an indexed documents table
    async fn test_search_against_database() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = PgPool::connect(&url).await.unwrap();
        let kb = PgKnowledgeBase::new(pool);
        kb.verify().await.unwrap();

        let matches = kb.search(&vec![0.01; 1536], 5, 0.0, None).await.unwrap();
        assert!(matches.len() <= 5);
        assert!(matches.windows(2).all(|w| w[0].similarity >= w[1].similarity));
    }
}

use crate::vector::PgKnowledgeBase;
use anyhow::{Context, Result};
use sqlx::PgPool;

pub async fn execute(pool: PgPool) -> Result<()> {
    tracing::info!("Running database migrations");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    // HNSW index is managed outside the migration set
    let knowledge_base = PgKnowledgeBase::new(pool);
    knowledge_base.verify().await?;
    knowledge_base.ensure_hnsw_index("documents", "embedding").await?;

    println!("Database migrations completed successfully");
    Ok(())
}

use super::{StoreTransaction, TemplateStore};
use crate::models::{PersistedState, StoredTemplate, TemplateRecord, TemplateStatus};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgQueryResult};
use sqlx::query::Query;
use sqlx::{FromRow, Postgres, Transaction};
use std::collections::HashMap;
use std::sync::Arc;

const TEMPLATE_COLUMNS: &str = "id, category_name, genre, style, mood, use_case, tags, base_prompt, \
     status, fingerprint, created_at, updated_at";

// Maps to a row of the templates table
#[derive(FromRow, Debug, Clone)]
struct TemplateRow {
    id: String,
    category_name: String,
    genre: String,
    style: String,
    mood: String,
    use_case: String,
    tags: serde_json::Value,
    base_prompt: String,
    status: String,
    fingerprint: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TemplateRow> for StoredTemplate {
    type Error = anyhow::Error;

    fn try_from(row: TemplateRow) -> Result<Self> {
        let status = TemplateStatus::parse(&row.status)
            .ok_or_else(|| anyhow!("template '{}' has unknown status '{}'", row.id, row.status))?;
        let tags = serde_json::from_value(row.tags)
            .with_context(|| format!("template '{}' has malformed tags", row.id))?;
        Ok(StoredTemplate {
            record: TemplateRecord {
                id: row.id,
                category_name: row.category_name,
                genre: row.genre,
                style: row.style,
                mood: row.mood,
                use_case: row.use_case,
                tags,
                base_prompt: row.base_prompt,
                status,
                fingerprint: row.fingerprint,
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// PostgreSQL storage implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;
        Ok(PostgresStore {
            pool: Arc::new(pool),
        })
    }

    /// Initializes the database schema if it doesn't exist.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS templates (
                id TEXT PRIMARY KEY,
                category_name TEXT NOT NULL,
                genre TEXT NOT NULL,
                style TEXT NOT NULL DEFAULT '',
                mood TEXT NOT NULL DEFAULT '',
                use_case TEXT NOT NULL DEFAULT '',
                tags JSONB NOT NULL DEFAULT '[]'::jsonb,
                base_prompt TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'inactive')),
                fingerprint TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            "#,
        )
        .execute(&*self.pool)
        .await
        .context("Failed to initialize database schema")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS templates_status_idx ON templates (status)")
            .execute(&*self.pool)
            .await
            .context("Failed to create templates status index")?;
        Ok(())
    }
}

#[async_trait]
impl TemplateStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin template sync transaction")?;
        Ok(Box::new(PgTransaction { tx }))
    }

    async fn list_templates(&self) -> Result<Vec<StoredTemplate>> {
        let rows: Vec<TemplateRow> =
            sqlx::query_as(&format!("SELECT {TEMPLATE_COLUMNS} FROM templates ORDER BY id"))
                .fetch_all(&*self.pool)
                .await
                .context("Failed to fetch templates from database")?;
        rows.into_iter().map(StoredTemplate::try_from).collect()
    }

    async fn get_template(&self, id: &str) -> Result<Option<StoredTemplate>> {
        let row: Option<TemplateRow> =
            sqlx::query_as(&format!("SELECT {TEMPLATE_COLUMNS} FROM templates WHERE id = $1"))
                .bind(id)
                .fetch_optional(&*self.pool)
                .await
                .with_context(|| format!("Failed to fetch template with id '{}' from database", id))?;
        row.map(StoredTemplate::try_from).transpose()
    }
}

struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PgTransaction {
    /// Runs one record write inside a savepoint. Postgres aborts the whole
    /// transaction on any failed statement, so the savepoint is what lets the
    /// remaining records of the pass still be written.
    async fn record_write(
        &mut self,
        query: Query<'_, Postgres, PgArguments>,
    ) -> Result<PgQueryResult, sqlx::Error> {
        sqlx::query("SAVEPOINT record_write")
            .execute(&mut *self.tx)
            .await?;
        match query.execute(&mut *self.tx).await {
            Ok(done) => {
                sqlx::query("RELEASE SAVEPOINT record_write")
                    .execute(&mut *self.tx)
                    .await?;
                Ok(done)
            }
            Err(e) => {
                sqlx::query("ROLLBACK TO SAVEPOINT record_write")
                    .execute(&mut *self.tx)
                    .await?;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn persisted_states(&mut self) -> Result<HashMap<String, PersistedState>> {
        let rows: Vec<(String, String, String)> =
            sqlx::query_as("SELECT id, fingerprint, status FROM templates")
                .fetch_all(&mut *self.tx)
                .await
                .context("Failed to read template fingerprints")?;

        rows.into_iter()
            .map(|(id, fingerprint, status)| -> Result<(String, PersistedState)> {
                let status = TemplateStatus::parse(&status)
                    .ok_or_else(|| anyhow!("template '{}' has unknown status '{}'", id, status))?;
                Ok((id, PersistedState { fingerprint, status }))
            })
            .collect()
    }

    async fn create_template(&mut self, record: &TemplateRecord) -> Result<()> {
        let tags = serde_json::to_value(&record.tags).context("Failed to serialize template tags")?;
        let query = sqlx::query(
            r#"
            INSERT INTO templates
                (id, category_name, genre, style, mood, use_case, tags, base_prompt, status, fingerprint)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'active', $9)
            "#,
        )
        .bind(&record.id)
        .bind(&record.category_name)
        .bind(&record.genre)
        .bind(&record.style)
        .bind(&record.mood)
        .bind(&record.use_case)
        .bind(tags)
        .bind(&record.base_prompt)
        .bind(&record.fingerprint);

        self.record_write(query)
            .await
            .with_context(|| format!("Failed to create template '{}'", record.id))?;
        Ok(())
    }

    async fn update_template(&mut self, record: &TemplateRecord) -> Result<()> {
        let tags = serde_json::to_value(&record.tags).context("Failed to serialize template tags")?;
        let query = sqlx::query(
            r#"
            UPDATE templates SET
                category_name = $2,
                genre = $3,
                style = $4,
                mood = $5,
                use_case = $6,
                tags = $7,
                base_prompt = $8,
                status = 'active',
                fingerprint = $9,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(&record.id)
        .bind(&record.category_name)
        .bind(&record.genre)
        .bind(&record.style)
        .bind(&record.mood)
        .bind(&record.use_case)
        .bind(tags)
        .bind(&record.base_prompt)
        .bind(&record.fingerprint);

        let done = self
            .record_write(query)
            .await
            .with_context(|| format!("Failed to update template '{}'", record.id))?;
        if done.rows_affected() == 0 {
            bail!("template '{}' not found", record.id);
        }
        Ok(())
    }

    async fn deactivate_templates(&mut self, ids: &[String]) -> Result<u64> {
        let done = sqlx::query(
            "UPDATE templates SET status = 'inactive', updated_at = NOW() \
             WHERE status = 'active' AND id = ANY($1)",
        )
        .bind(ids)
        .execute(&mut *self.tx)
        .await
        .context("Failed to deactivate templates")?;
        Ok(done.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let PgTransaction { tx } = *self;
        tx.commit()
            .await
            .context("Failed to commit template sync transaction")
    }
}

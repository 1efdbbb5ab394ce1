use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::{debug, info, instrument};

use crate::domain::{Agent, Assignment};
use crate::error::{LedgerError, Result};
use crate::store::traits::{AgentStore, AssignmentLedger, OrderLookup};

/// PostgreSQL storage adapter
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Create a PostgreSQL store from an existing connection pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the tables the engine reads and appends to.
    ///
    /// Schema evolution beyond this baseline belongs to the provisioning
    /// side, together with agent and order creation.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS agents (
                id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL,
                capacity INT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS orders (
                id BIGSERIAL PRIMARY KEY,
                reference TEXT NOT NULL UNIQUE,
                details TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS assignments (
                id BIGSERIAL PRIMARY KEY,
                order_ref TEXT NOT NULL UNIQUE,
                agent_id BIGINT NOT NULL REFERENCES agents(id),
                assigned_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_assignments_agent_time
            ON assignments (agent_id, assigned_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        debug!("Schema ensured");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ==================== Orders ====================

#[async_trait]
impl OrderLookup for PostgresStore {
    async fn exists(&self, order_ref: &str) -> Result<bool> {
        let row = sqlx::query(
            r#"SELECT EXISTS(SELECT 1 FROM orders WHERE reference = $1) AS present"#,
        )
        .bind(order_ref)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("present"))
    }
}

// ==================== Agents ====================

#[async_trait]
impl AgentStore for PostgresStore {
    async fn all(&self) -> Result<Vec<Agent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, capacity, created_at
            FROM agents
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| Agent {
                id: r.get("id"),
                name: r.get("name"),
                capacity: r.get("capacity"),
                created_at: r.get("created_at"),
            })
            .collect())
    }

    async fn get(&self, agent_id: i64) -> Result<Option<Agent>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, capacity, created_at
            FROM agents
            WHERE id = $1
            "#,
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Agent {
            id: r.get("id"),
            name: r.get("name"),
            capacity: r.get("capacity"),
            created_at: r.get("created_at"),
        }))
    }
}

// ==================== Assignments ====================

#[async_trait]
impl AssignmentLedger for PostgresStore {
    async fn count_since(&self, agent_id: i64, since: DateTime<Utc>) -> Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS active
            FROM assignments
            WHERE agent_id = $1 AND assigned_at >= $2
            "#,
        )
        .bind(agent_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("active"))
    }

    async fn get_for_order(&self, order_ref: &str) -> Result<Option<Assignment>> {
        let row = sqlx::query(
            r#"
            SELECT order_ref, agent_id, assigned_at
            FROM assignments
            WHERE order_ref = $1
            "#,
        )
        .bind(order_ref)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Assignment {
            order_ref: r.get("order_ref"),
            agent_id: r.get("agent_id"),
            assigned_at: r.get("assigned_at"),
        }))
    }

    async fn exists_for_order(&self, order_ref: &str) -> Result<bool> {
        let row = sqlx::query(
            r#"SELECT EXISTS(SELECT 1 FROM assignments WHERE order_ref = $1) AS present"#,
        )
        .bind(order_ref)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("present"))
    }

    /// The unique constraint on order_ref makes the claim atomic even
    /// across processes; a lost race comes back as a duplicate error.
    #[instrument(skip(self))]
    async fn append(&self, order_ref: &str, agent_id: i64, assigned_at: DateTime<Utc>) -> Result<()> {
        let claimed = sqlx::query(
            r#"
            INSERT INTO assignments (order_ref, agent_id, assigned_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (order_ref) DO NOTHING
            RETURNING order_ref
            "#,
        )
        .bind(order_ref)
        .bind(agent_id)
        .bind(assigned_at)
        .fetch_optional(&self.pool)
        .await?;

        if claimed.is_none() {
            return Err(LedgerError::DuplicateAssignment {
                order_ref: order_ref.to_string(),
            }
            .into());
        }

        debug!(order_ref, agent_id, "Assignment row appended");
        Ok(())
    }
}

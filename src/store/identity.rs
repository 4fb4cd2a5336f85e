use crate::error::{RegistryError, Result, StoreKind};
use crate::model::SensorIdentity;
use crate::store::IdentityStore;
use async_trait::async_trait;
use deadpool_postgres::{Config as PoolConfig, Object, Pool, Runtime};
use std::time::Duration;
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};
use tracing::{debug, info};

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS sensors (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
)";

/// Sensor identities in a PostgreSQL `sensors` table
pub struct PostgresIdentityStore {
    pool: Pool,
}

impl PostgresIdentityStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = create_pool(database_url, max_connections)?;
        let store = Self { pool };

        store.ping().await?;
        info!("Connected to PostgreSQL identity store");

        Ok(store)
    }

    pub async fn ensure_schema(&self) -> Result<()> {
        let client = self.client().await?;
        client.batch_execute(CREATE_TABLE_SQL).await?;
        debug!("Ensured sensors table exists");
        Ok(())
    }

    async fn client(&self) -> Result<Object> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait]
impl IdentityStore for PostgresIdentityStore {
    async fn get_by_id(&self, id: i64) -> Result<Option<SensorIdentity>> {
        let client = self.client().await?;
        let row = client
            .query_opt("SELECT id, name FROM sensors WHERE id = $1", &[&id])
            .await?;
        Ok(row.as_ref().map(row_to_identity))
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<SensorIdentity>> {
        let client = self.client().await?;
        let row = client
            .query_opt("SELECT id, name FROM sensors WHERE name = $1", &[&name])
            .await?;
        Ok(row.as_ref().map(row_to_identity))
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<SensorIdentity>> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT id, name FROM sensors ORDER BY id OFFSET $1 LIMIT $2",
                &[&offset, &limit],
            )
            .await?;
        Ok(rows.iter().map(row_to_identity).collect())
    }

    async fn create(&self, name: &str) -> Result<SensorIdentity> {
        let client = self.client().await?;
        let row = client
            .query_one(
                "INSERT INTO sensors (name) VALUES ($1) RETURNING id, name",
                &[&name],
            )
            .await
            .map_err(|e| {
                if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
                    RegistryError::Conflict {
                        message: format!("Sensor name '{}' is already registered", name),
                    }
                } else {
                    RegistryError::from(e)
                }
            })?;

        let identity = row_to_identity(&row);
        debug!(id = identity.id, name = %identity.name, "Inserted sensor identity");
        Ok(identity)
    }

    async fn delete(&self, id: i64) -> Result<SensorIdentity> {
        let client = self.client().await?;
        let row = client
            .query_opt("DELETE FROM sensors WHERE id = $1 RETURNING id, name", &[&id])
            .await?;

        row.as_ref()
            .map(row_to_identity)
            .ok_or_else(|| RegistryError::not_found("Sensor", id))
    }

    async fn ping(&self) -> Result<()> {
        let client = self.client().await?;
        client.execute("SELECT 1", &[]).await.map_err(|e| {
            RegistryError::unavailable(StoreKind::Identity, format!("Ping failed: {}", e))
        })?;
        Ok(())
    }
}

fn row_to_identity(row: &Row) -> SensorIdentity {
    SensorIdentity {
        id: row.get("id"),
        name: row.get("name"),
    }
}

fn create_pool(database_url: &str, max_size: u32) -> Result<Pool> {
    let mut cfg = PoolConfig::new();
    cfg.url = Some(database_url.to_string());

    cfg.pool = Some(deadpool_postgres::PoolConfig {
        max_size: max_size as usize,
        timeouts: deadpool_postgres::Timeouts {
            wait: Some(Duration::from_secs(5)),
            create: Some(Duration::from_secs(5)),
            recycle: Some(Duration::from_secs(5)),
        },
        ..Default::default()
    });

    cfg.create_pool(Some(Runtime::Tokio1), NoTls).map_err(|e| {
        RegistryError::unavailable(StoreKind::Identity, format!("Failed to create pool: {}", e))
    })
}

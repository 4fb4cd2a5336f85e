use crate::error::{RegistryError, Result, StoreKind};
use crate::model::TelemetrySnapshot;
use crate::store::TelemetryStore;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;
use tracing::{debug, info};

/// Latest telemetry per sensor, one JSON string per Redis key
pub struct RedisTelemetryStore {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisTelemetryStore {
    pub async fn connect(url: &str, key_prefix: &str) -> Result<Self> {
        let client = Client::open(url)?;

        let conn = tokio::time::timeout(Duration::from_secs(5), ConnectionManager::new(client))
            .await
            .map_err(|_| {
                RegistryError::unavailable(
                    StoreKind::Telemetry,
                    "Redis connection timeout after 5 seconds",
                )
            })??;

        let store = Self {
            conn,
            key_prefix: key_prefix.to_string(),
        };
        store.ping().await?;
        info!("Connected to Redis telemetry store");

        Ok(store)
    }

    fn key(&self, sensor_id: i64) -> String {
        format!("{}{}", self.key_prefix, sensor_id)
    }
}

#[async_trait]
impl TelemetryStore for RedisTelemetryStore {
    async fn set_snapshot(&self, sensor_id: i64, snapshot: &TelemetrySnapshot) -> Result<()> {
        let payload = encode_snapshot(snapshot)?;

        let mut conn = self.conn.clone();
        let _: () = conn.set(self.key(sensor_id), payload).await?;

        debug!(sensor_id, "Stored telemetry snapshot");
        Ok(())
    }

    async fn get_snapshot(&self, sensor_id: i64) -> Result<Option<TelemetrySnapshot>> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn.get(self.key(sensor_id)).await?;

        payload
            .map(|raw| decode_snapshot(sensor_id, &raw))
            .transpose()
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

// Readings must come back bit-for-bit; serde_json is built with `float_roundtrip`
fn encode_snapshot(snapshot: &TelemetrySnapshot) -> Result<String> {
    serde_json::to_string(snapshot)
        .map_err(|e| RegistryError::Internal(format!("Failed to encode telemetry: {}", e)))
}

fn decode_snapshot(sensor_id: i64, raw: &str) -> Result<TelemetrySnapshot> {
    serde_json::from_str(raw).map_err(|e| {
        RegistryError::Internal(format!(
            "Corrupt telemetry for sensor {}: {}",
            sensor_id, e
        ))
    })
}

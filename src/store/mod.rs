//! Store adapters
//!
//! The aggregation service only talks to the three traits below. Each backing
//! database has one adapter:
//!
//! - `identity`: PostgreSQL, sensor existence records
//! - `geo`: MongoDB, location + static metadata behind a `2dsphere` index
//! - `telemetry`: Redis, latest readings keyed by sensor id
//!
//! `memory` implements all three in-process for tests and local development.

mod geo;
mod identity;
pub mod memory;
mod telemetry;

pub use geo::MongoGeoStore;
pub use identity::PostgresIdentityStore;
pub use telemetry::RedisTelemetryStore;

use crate::config::{Config, StoreBackend};
use crate::error::Result;
use crate::model::{SensorGeoDocument, SensorIdentity, TelemetrySnapshot};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn get_by_id(&self, id: i64) -> Result<Option<SensorIdentity>>;

    async fn get_by_name(&self, name: &str) -> Result<Option<SensorIdentity>>;

    /// Page through identities in insertion order
    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<SensorIdentity>>;

    /// Insert a new identity; the store assigns the id
    async fn create(&self, name: &str) -> Result<SensorIdentity>;

    /// Remove an identity, failing with `NotFound` when it does not exist
    async fn delete(&self, id: i64) -> Result<SensorIdentity>;

    async fn ping(&self) -> Result<()>;
}

#[async_trait]
pub trait GeoStore: Send + Sync {
    /// Store or replace the document for `doc.id` and make sure the location index exists
    async fn upsert_geo_document(&self, doc: &SensorGeoDocument) -> Result<()>;

    /// Documents within `radius_meters` of the point, nearest first
    async fn find_near(
        &self,
        latitude: f64,
        longitude: f64,
        radius_meters: f64,
    ) -> Result<Vec<SensorGeoDocument>>;

    /// Returns whether a document was removed
    async fn delete_geo_document(&self, id: i64) -> Result<bool>;

    /// Wipe a whole geo namespace. Only reachable through the admin routes.
    async fn drop_database(&self, name: &str) -> Result<()>;

    async fn ping(&self) -> Result<()>;
}

#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Overwrite the snapshot for a sensor; nothing of the previous value is kept
    async fn set_snapshot(&self, sensor_id: i64, snapshot: &TelemetrySnapshot) -> Result<()>;

    async fn get_snapshot(&self, sensor_id: i64) -> Result<Option<TelemetrySnapshot>>;

    async fn ping(&self) -> Result<()>;
}

/// The three adapters the service is built from
#[derive(Clone)]
pub struct Stores {
    pub identity: Arc<dyn IdentityStore>,
    pub geo: Arc<dyn GeoStore>,
    pub telemetry: Arc<dyn TelemetryStore>,
}

impl Stores {
    /// Connect to the configured backend
    pub async fn connect(config: &Config) -> Result<Self> {
        match config.store_backend {
            StoreBackend::External => {
                let identity =
                    PostgresIdentityStore::connect(&config.database_url, config.max_connections)
                        .await?;
                identity.ensure_schema().await?;

                let geo = MongoGeoStore::connect(
                    &config.mongo_uri,
                    &config.mongo_database,
                    &config.mongo_collection,
                )
                .await?;

                let telemetry =
                    RedisTelemetryStore::connect(&config.redis_url, &config.telemetry_key_prefix)
                        .await?;

                info!("Connected to PostgreSQL, MongoDB and Redis");

                Ok(Self {
                    identity: Arc::new(identity),
                    geo: Arc::new(geo),
                    telemetry: Arc::new(telemetry),
                })
            }
            StoreBackend::Memory => {
                info!("Using in-memory stores; data is lost on restart");
                Ok(Self {
                    identity: Arc::new(memory::MemoryIdentityStore::new()),
                    geo: Arc::new(memory::MemoryGeoStore::with_database(&config.mongo_database)),
                    telemetry: Arc::new(memory::MemoryTelemetryStore::new()),
                })
            }
        }
    }

    pub fn in_memory() -> Self {
        Self {
            identity: Arc::new(memory::MemoryIdentityStore::new()),
            geo: Arc::new(memory::MemoryGeoStore::new()),
            telemetry: Arc::new(memory::MemoryTelemetryStore::new()),
        }
    }
}

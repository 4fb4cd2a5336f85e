//! In-process store adapters
//!
//! Used by the test-suite and by `STORE_BACKEND=memory`. They follow the same
//! contracts as the database adapters, including nearest-first ordering for
//! geo queries and overwrite semantics for telemetry.

use crate::error::{RegistryError, Result};
use crate::geo::GeoPoint;
use crate::model::{SensorGeoDocument, SensorIdentity, TelemetrySnapshot};
use crate::store::{GeoStore, IdentityStore, TelemetryStore};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct IdentityTable {
    next_id: i64,
    rows: BTreeMap<i64, SensorIdentity>,
}

/// Identities keyed by a monotonically increasing id, like a serial column
#[derive(Default)]
pub struct MemoryIdentityStore {
    table: RwLock<IdentityTable>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn get_by_id(&self, id: i64) -> Result<Option<SensorIdentity>> {
        Ok(self.table.read().await.rows.get(&id).cloned())
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<SensorIdentity>> {
        let table = self.table.read().await;
        Ok(table.rows.values().find(|s| s.name == name).cloned())
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<SensorIdentity>> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn create(&self, name: &str) -> Result<SensorIdentity> {
        let mut table = self.table.write().await;
        if table.rows.values().any(|s| s.name == name) {
            return Err(RegistryError::Conflict {
                message: format!("Sensor name '{}' is already registered", name),
            });
        }

        table.next_id += 1;
        let identity = SensorIdentity {
            id: table.next_id,
            name: name.to_string(),
        };
        table.rows.insert(identity.id, identity.clone());
        Ok(identity)
    }

    async fn delete(&self, id: i64) -> Result<SensorIdentity> {
        self.table
            .write()
            .await
            .rows
            .remove(&id)
            .ok_or_else(|| RegistryError::not_found("Sensor", id))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Geo documents grouped by namespace so `drop_database` has something to drop
pub struct MemoryGeoStore {
    database: String,
    namespaces: DashMap<String, DashMap<i64, SensorGeoDocument>>,
}

impl MemoryGeoStore {
    pub fn new() -> Self {
        Self::with_database("SensorsDB")
    }

    pub fn with_database(database: &str) -> Self {
        Self {
            database: database.to_string(),
            namespaces: DashMap::new(),
        }
    }

    pub fn contains(&self, id: i64) -> bool {
        self.namespaces
            .get(&self.database)
            .is_some_and(|docs| docs.contains_key(&id))
    }

    pub fn len(&self) -> usize {
        self.namespaces
            .get(&self.database)
            .map_or(0, |docs| docs.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryGeoStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GeoStore for MemoryGeoStore {
    async fn upsert_geo_document(&self, doc: &SensorGeoDocument) -> Result<()> {
        self.namespaces
            .entry(self.database.clone())
            .or_default()
            .insert(doc.id, doc.clone());
        Ok(())
    }

    async fn find_near(
        &self,
        latitude: f64,
        longitude: f64,
        radius_meters: f64,
    ) -> Result<Vec<SensorGeoDocument>> {
        let center = GeoPoint::new(latitude, longitude);

        let Some(docs) = self.namespaces.get(&self.database) else {
            return Ok(Vec::new());
        };

        let mut in_range: Vec<(f64, SensorGeoDocument)> = docs
            .iter()
            .filter_map(|entry| {
                let distance = center.distance_to(&entry.value().location);
                (distance <= radius_meters).then(|| (distance, entry.value().clone()))
            })
            .collect();

        in_range.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.id.cmp(&b.1.id)));
        Ok(in_range.into_iter().map(|(_, doc)| doc).collect())
    }

    async fn delete_geo_document(&self, id: i64) -> Result<bool> {
        Ok(self
            .namespaces
            .get(&self.database)
            .is_some_and(|docs| docs.remove(&id).is_some()))
    }

    async fn drop_database(&self, name: &str) -> Result<()> {
        self.namespaces.remove(name);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryTelemetryStore {
    snapshots: DashMap<i64, TelemetrySnapshot>,
}

impl MemoryTelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TelemetryStore for MemoryTelemetryStore {
    async fn set_snapshot(&self, sensor_id: i64, snapshot: &TelemetrySnapshot) -> Result<()> {
        self.snapshots.insert(sensor_id, snapshot.clone());
        Ok(())
    }

    async fn get_snapshot(&self, sensor_id: i64) -> Result<Option<TelemetrySnapshot>> {
        Ok(self.snapshots.get(&sensor_id).map(|s| s.value().clone()))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

//! Sensor aggregation service
//!
//! Orchestrates the identity, geo and telemetry stores. Every store call is
//! bounded by the configured timeout and reports which store failed.
//!
//! Cross-store writes are not transactional:
//! - creation inserts the identity first, then the geo document; if the geo
//!   insert fails the identity is deleted again (compensation)
//! - deletion removes the identity, then cascades to the geo document
//!
//! Near queries enrich each geo document with its telemetry. Sensors that
//! never reported get `null` telemetry fields instead of failing the query.

use crate::error::{RegistryError, Result, StoreKind};
use crate::geo::{is_valid_latitude, is_valid_longitude};
use crate::model::{
    EnrichedSensor, SensorCreate, SensorIdentity, TelemetryReport, TelemetrySnapshot,
};
use crate::store::Stores;
use futures::{StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_LIST_LIMIT: i64 = 100;
pub const MAX_LIST_LIMIT: i64 = 1000;

/// Reachability of each backing store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreHealth {
    pub identity: bool,
    pub geo: bool,
    pub telemetry: bool,
}

impl StoreHealth {
    pub fn all_up(&self) -> bool {
        self.identity && self.geo && self.telemetry
    }
}

pub struct SensorService {
    stores: Stores,
    store_timeout: Duration,
    enrichment_concurrency: usize,
}

impl SensorService {
    pub fn new(stores: Stores, store_timeout: Duration, enrichment_concurrency: usize) -> Self {
        Self {
            stores,
            store_timeout,
            enrichment_concurrency: enrichment_concurrency.max(1),
        }
    }

    pub async fn check_stores(&self) -> StoreHealth {
        let (identity, geo, telemetry) = tokio::join!(
            self.call(StoreKind::Identity, "ping", self.stores.identity.ping()),
            self.call(StoreKind::Geo, "ping", self.stores.geo.ping()),
            self.call(StoreKind::Telemetry, "ping", self.stores.telemetry.ping()),
        );

        for err in [&identity, &geo, &telemetry].into_iter().filter_map(|r| r.as_ref().err()) {
            warn!("Health check failed: {}", err);
        }

        StoreHealth {
            identity: identity.is_ok(),
            geo: geo.is_ok(),
            telemetry: telemetry.is_ok(),
        }
    }

    /// Run one store call under the store timeout
    async fn call<T, F>(&self, store: StoreKind, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(%store, operation, "Store call timed out after {:?}", self.store_timeout);
                Err(RegistryError::StoreTimeout {
                    store,
                    operation: operation.to_string(),
                })
            }
        }
    }

    pub async fn create_sensor(&self, input: SensorCreate) -> Result<SensorIdentity> {
        input.validate()?;

        let existing = self
            .call(
                StoreKind::Identity,
                "get_by_name",
                self.stores.identity.get_by_name(&input.name),
            )
            .await?;
        if existing.is_some() {
            return Err(RegistryError::Conflict {
                message: format!("Sensor name '{}' is already registered", input.name),
            });
        }

        let identity = match self
            .call(
                StoreKind::Identity,
                "create",
                self.stores.identity.create(&input.name),
            )
            .await
        {
            Ok(identity) => identity,
            Err(err @ RegistryError::StoreTimeout { .. }) => {
                self.discard_late_identity(&input.name).await;
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        let doc = input.into_geo_document(identity.id);
        let geo_result = self
            .call(
                StoreKind::Geo,
                "upsert_geo_document",
                self.stores.geo.upsert_geo_document(&doc),
            )
            .await;

        if let Err(geo_err) = geo_result {
            warn!(
                id = identity.id,
                "Geo insert failed after identity insert, rolling back identity: {}", geo_err
            );

            let compensated = match self
                .call(
                    StoreKind::Identity,
                    "delete",
                    self.stores.identity.delete(identity.id),
                )
                .await
            {
                Ok(_) => true,
                Err(e) => {
                    warn!(id = identity.id, "Identity rollback failed, record is orphaned: {}", e);
                    false
                }
            };

            return Err(RegistryError::DependencyFailure {
                step: "geo insert".to_string(),
                cause: geo_err.to_string(),
                compensated,
            });
        }

        info!(id = identity.id, name = %identity.name, "Sensor created");
        Ok(identity)
    }

    /// The insert may have committed after its deadline; nothing else will ever
    /// attach a geo document to it, so remove it if it is there.
    async fn discard_late_identity(&self, name: &str) {
        let late = match self
            .call(
                StoreKind::Identity,
                "get_by_name",
                self.stores.identity.get_by_name(name),
            )
            .await
        {
            Ok(Some(identity)) => identity,
            Ok(None) => return,
            Err(e) => {
                warn!(name, "Could not check for a late identity insert: {}", e);
                return;
            }
        };

        match self
            .call(
                StoreKind::Identity,
                "delete",
                self.stores.identity.delete(late.id),
            )
            .await
        {
            Ok(_) => info!(id = late.id, name, "Removed identity committed after timeout"),
            Err(e) => warn!(id = late.id, name, "Identity committed after timeout is orphaned: {}", e),
        }
    }

    pub async fn delete_sensor(&self, id: i64) -> Result<SensorIdentity> {
        let deleted = self
            .call(StoreKind::Identity, "delete", self.stores.identity.delete(id))
            .await?;

        match self
            .call(
                StoreKind::Geo,
                "delete_geo_document",
                self.stores.geo.delete_geo_document(id),
            )
            .await
        {
            Ok(true) => {}
            Ok(false) => debug!(id, "No geo document to delete"),
            Err(e) => {
                warn!(id, "Identity deleted but geo document remains: {}", e);
                return Err(RegistryError::DependencyFailure {
                    step: "geo delete".to_string(),
                    cause: e.to_string(),
                    compensated: false,
                });
            }
        }

        info!(id, name = %deleted.name, "Sensor deleted");
        Ok(deleted)
    }

    pub async fn get_sensor(&self, id: i64) -> Result<SensorIdentity> {
        self.call(
            StoreKind::Identity,
            "get_by_id",
            self.stores.identity.get_by_id(id),
        )
        .await?
        .ok_or_else(|| RegistryError::not_found("Sensor", id))
    }

    pub async fn get_sensor_by_name(&self, name: &str) -> Result<SensorIdentity> {
        self.call(
            StoreKind::Identity,
            "get_by_name",
            self.stores.identity.get_by_name(name),
        )
        .await?
        .ok_or_else(|| RegistryError::not_found("Sensor", name))
    }

    pub async fn list_sensors(
        &self,
        offset: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Vec<SensorIdentity>> {
        let offset = offset.unwrap_or(0);
        if offset < 0 {
            return Err(RegistryError::validation("skip", "must not be negative"));
        }

        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT);
        if limit < 0 {
            return Err(RegistryError::validation("limit", "must not be negative"));
        }
        let limit = limit.min(MAX_LIST_LIMIT);

        self.call(
            StoreKind::Identity,
            "list",
            self.stores.identity.list(offset, limit),
        )
        .await
    }

    pub async fn record_telemetry(
        &self,
        sensor_id: i64,
        report: TelemetryReport,
    ) -> Result<TelemetrySnapshot> {
        report.validate()?;

        let snapshot = report.into_snapshot(sensor_id);
        self.call(
            StoreKind::Telemetry,
            "set_snapshot",
            self.stores.telemetry.set_snapshot(sensor_id, &snapshot),
        )
        .await?;

        debug!(sensor_id, "Telemetry recorded");
        Ok(snapshot)
    }

    pub async fn get_telemetry(&self, sensor_id: i64) -> Result<TelemetrySnapshot> {
        self.call(
            StoreKind::Telemetry,
            "get_snapshot",
            self.stores.telemetry.get_snapshot(sensor_id),
        )
        .await?
        .ok_or_else(|| RegistryError::not_found("Telemetry for sensor", sensor_id))
    }

    /// Sensors within `radius_meters`, nearest first, merged with their latest telemetry
    pub async fn query_sensors_near(
        &self,
        latitude: f64,
        longitude: f64,
        radius_meters: f64,
    ) -> Result<Vec<EnrichedSensor>> {
        if !is_valid_latitude(latitude) {
            return Err(RegistryError::validation(
                "latitude",
                "must be between -90 and 90",
            ));
        }
        if !is_valid_longitude(longitude) {
            return Err(RegistryError::validation(
                "longitude",
                "must be between -180 and 180",
            ));
        }
        if !radius_meters.is_finite() || radius_meters < 0.0 {
            return Err(RegistryError::validation(
                "radius",
                "must be a non-negative number of meters",
            ));
        }

        let docs = self
            .call(
                StoreKind::Geo,
                "find_near",
                self.stores.geo.find_near(latitude, longitude, radius_meters),
            )
            .await?;

        // Lookups complete in any order; results are matched back by sensor id
        let ids: Vec<i64> = docs.iter().map(|doc| doc.id).collect();
        let telemetry: HashMap<i64, TelemetrySnapshot> =
            futures::stream::iter(ids)
                .map(|id| async move {
                    let snapshot = self
                        .call(
                            StoreKind::Telemetry,
                            "get_snapshot",
                            self.stores.telemetry.get_snapshot(id),
                        )
                        .await?;
                    Ok::<_, RegistryError>(snapshot.map(|s| (id, s)))
                })
                .buffer_unordered(self.enrichment_concurrency)
                .try_filter_map(|entry| async move { Ok(entry) })
                .try_collect()
                .await?;

        let missing = docs.len() - telemetry.len();
        if missing > 0 {
            debug!("{} of {} nearby sensors have no telemetry", missing, docs.len());
        }

        Ok(docs
            .into_iter()
            .map(|doc| {
                let snapshot = telemetry.get(&doc.id);
                EnrichedSensor::merge(doc, snapshot)
            })
            .collect())
    }

    /// Drop a geo namespace. Callers must sit behind the admin gate.
    pub async fn reset_geo_database(&self, name: &str) -> Result<()> {
        if !is_valid_database_name(name) {
            return Err(RegistryError::validation(
                "database",
                format!("'{}' is not a valid database name", name),
            ));
        }

        self.call(
            StoreKind::Geo,
            "drop_database",
            self.stores.geo.drop_database(name),
        )
        .await?;

        warn!("Geo database '{}' dropped", name);
        Ok(())
    }
}

/// MongoDB database names: no path or namespace separators, at most 63 bytes
fn is_valid_database_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

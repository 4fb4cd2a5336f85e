use crate::error::{RegistryError, Result, StoreKind};
use crate::model::SensorGeoDocument;
use crate::store::GeoStore;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::options::ReplaceOptions;
use mongodb::{Client, Collection, IndexModel};
use tracing::{debug, info, warn};

/// Sensor geo documents in a MongoDB collection with a `2dsphere` index on `location`
pub struct MongoGeoStore {
    client: Client,
    database: String,
    collection: Collection<SensorGeoDocument>,
}

impl MongoGeoStore {
    pub async fn connect(uri: &str, database: &str, collection: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri).await?;
        let collection = client
            .database(database)
            .collection::<SensorGeoDocument>(collection);

        let store = Self {
            client,
            database: database.to_string(),
            collection,
        };

        store.ping().await?;
        // $near fails on a collection without a geo index, so create it up front
        store.ensure_location_index().await?;
        info!("Connected to MongoDB geo store (database: {})", database);

        Ok(store)
    }

    async fn ensure_location_index(&self) -> Result<()> {
        let index = IndexModel::builder()
            .keys(doc! { "location": "2dsphere" })
            .build();
        self.collection.create_index(index, None).await?;
        Ok(())
    }
}

/// `$near` filter; coordinates are GeoJSON order, longitude first
fn near_filter(latitude: f64, longitude: f64, radius_meters: f64) -> Document {
    doc! {
        "location": {
            "$near": {
                "$geometry": { "type": "Point", "coordinates": [longitude, latitude] },
                "$maxDistance": radius_meters,
            }
        }
    }
}

#[async_trait]
impl GeoStore for MongoGeoStore {
    async fn upsert_geo_document(&self, sensor: &SensorGeoDocument) -> Result<()> {
        let options = ReplaceOptions::builder().upsert(true).build();
        self.collection
            .replace_one(doc! { "id": sensor.id }, sensor, options)
            .await?;
        self.ensure_location_index().await?;

        debug!(id = sensor.id, "Upserted geo document");
        Ok(())
    }

    async fn find_near(
        &self,
        latitude: f64,
        longitude: f64,
        radius_meters: f64,
    ) -> Result<Vec<SensorGeoDocument>> {
        let cursor = self
            .collection
            .find(near_filter(latitude, longitude, radius_meters), None)
            .await?;
        let sensors: Vec<SensorGeoDocument> = cursor.try_collect().await?;

        debug!(
            "Found {} sensors within {}m of ({}, {})",
            sensors.len(),
            radius_meters,
            latitude,
            longitude
        );
        Ok(sensors)
    }

    async fn delete_geo_document(&self, id: i64) -> Result<bool> {
        let result = self.collection.delete_one(doc! { "id": id }, None).await?;
        Ok(result.deleted_count > 0)
    }

    async fn drop_database(&self, name: &str) -> Result<()> {
        warn!("Dropping geo database '{}'", name);
        self.client.database(name).drop(None).await?;

        // Dropping our own namespace also drops the index
        if name == self.database {
            self.ensure_location_index().await?;
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.client
            .database(&self.database)
            .run_command(doc! { "ping": 1 }, None)
            .await
            .map_err(|e| RegistryError::unavailable(StoreKind::Geo, format!("Ping failed: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_near_filter_uses_longitude_first() {
        let filter = near_filter(40.0, -3.0, 1000.0);
        let geometry = filter
            .get_document("location")
            .and_then(|l| l.get_document("$near"))
            .and_then(|n| n.get_document("$geometry"))
            .unwrap();

        let coordinates = geometry.get_array("coordinates").unwrap();
        assert_eq!(coordinates[0].as_f64(), Some(-3.0));
        assert_eq!(coordinates[1].as_f64(), Some(40.0));
    }

    #[test]
    fn test_near_filter_bounds_distance() {
        let filter = near_filter(0.0, 0.0, 250.0);
        let near = filter
            .get_document("location")
            .and_then(|l| l.get_document("$near"))
            .unwrap();
        assert_eq!(near.get_f64("$maxDistance").unwrap(), 250.0);
    }
}

use serde::{Deserialize, Serialize};

pub mod auth;
pub mod bulk;
pub mod cancel;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod indexing;
pub mod query;
pub mod source;
pub mod store;

pub use error::{AuthError, ConfigError, IndexingError, QueryError, ResetError, SourceError, StoreError, WriteError};

pub type PlaceId = i64;

/// Mean Earth radius in metres, the same sphere the store's `arcDistance` uses.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self { Self { lat, lon } }

    pub fn in_range(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }

    /// Great-circle distance in metres (haversine).
    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlon = (other.lon - self.lon).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
    }
}

/// A point of interest as it is stored in, and read back from, the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub id: PlaceId,
    pub name: String,
    pub address: String,
    pub phone: String,
    pub location: GeoPoint,
}

impl Place {
    /// Document id used for idempotent upserts.
    pub fn doc_id(&self) -> String { self.id.to_string() }
}

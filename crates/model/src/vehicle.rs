use serde::{Deserialize, Serialize};
use utility::{
    geo::haversine_distance,
    id::{HasId, Id},
};

/// Tag type for vehicle ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vehicle;

impl HasId for Vehicle {
    type IdType = String;
}

/// A vehicle as reported by the backend. Any of the position fields may be
/// `null` (or missing), meaning the position is currently unknown. The label
/// (the line designation) may be missing as well.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawVehicleRecord {
    #[serde(rename = "vehicle_id")]
    pub id: Id<Vehicle>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
}

/// A point on the map, ordered the way map widgets expect it:
/// longitude first. Serialized as `[longitude, latitude]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Coordinates {
    pub longitude: f64,
    pub latitude: f64,
}

impl Coordinates {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            longitude,
            latitude,
        }
    }

    pub fn distance_km(&self, other: &Coordinates) -> f64 {
        haversine_distance(
            self.latitude,
            self.longitude,
            other.latitude,
            other.longitude,
        )
    }
}

impl From<[f64; 2]> for Coordinates {
    fn from([longitude, latitude]: [f64; 2]) -> Self {
        Self::new(longitude, latitude)
    }
}

impl From<Coordinates> for [f64; 2] {
    fn from(value: Coordinates) -> Self {
        [value.longitude, value.latitude]
    }
}

/// A vehicle whose position is fully known and can be drawn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehiclePosition {
    pub id: Id<Vehicle>,
    pub label: String,
    pub coordinates: Coordinates,
    pub speed_kmh: f64,
}

impl VehiclePosition {
    /// Returns `None` if latitude, longitude or speed is unknown. Vehicles
    /// without a label are labelled with their id.
    pub fn from_raw(record: RawVehicleRecord) -> Option<Self> {
        match (record.lat, record.lon, record.speed) {
            (Some(latitude), Some(longitude), Some(speed)) => Some(Self {
                label: record.label.unwrap_or_else(|| record.id.raw()),
                id: record.id,
                coordinates: Coordinates::new(longitude, latitude),
                speed_kmh: speed,
            }),
            _ => None,
        }
    }

    pub fn tooltip(&self) -> String {
        format!("{} · {:.1} km/h", self.label, self.speed_kmh)
    }
}

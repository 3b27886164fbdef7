use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A searchable property location as shown in the list view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyPoint {
    pub id: i64,
    pub title: String,

    pub latitude: f64,
    pub longitude: f64,

    pub price: i64,
    pub listing_type: String,  // "venta", "renta", ...
    pub property_type: String, // "casa", "departamento", ...

    pub bedrooms: Option<i64>,
    pub bathrooms: Option<i64>,

    pub address_line: Option<String>,
    pub city: Option<String>,
    pub state_abbr: Option<String>,
    pub postal_code: Option<String>,

    pub created_at: DateTime<Utc>,
}

/// A property annotated for direct display on the map (properties mode).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapMarker {
    pub id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub price: i64,
    pub title: String,
    pub listing_type: String,
    pub property_type: String,
    pub bedrooms: Option<i64>,
}

/// The minimal shape the clustering engine needs: coordinates, price and the
/// precomputed geohash key at the requested precision (if any).
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterPoint {
    pub id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub price: i64,
    pub spatial_key: Option<String>,
}

/// Incoming record for `import`. Spatial keys are derived, never supplied.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProperty {
    pub title: String,
    pub latitude: f64,
    pub longitude: f64,
    pub price: i64,
    pub listing_type: String,
    pub property_type: String,
    #[serde(default)]
    pub bedrooms: Option<i64>,
    #[serde(default)]
    pub bathrooms: Option<i64>,
    #[serde(default)]
    pub address_line: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state_abbr: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

use serde::{Deserialize, Serialize};

/// Geographic rectangle in WGS84 degrees. Constructed through validation,
/// so `north > south` and `east > west` always hold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl Bounds {
    pub fn center(&self) -> (f64, f64) {
        (
            (self.north + self.south) / 2.0,
            (self.east + self.west) / 2.0,
        )
    }

    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        latitude >= self.south
            && latitude <= self.north
            && longitude >= self.west
            && longitude <= self.east
    }
}

/// What the map currently shows: a rectangle, a zoom level and its center.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub bounds: Bounds,
    pub zoom: u8,
    pub center: (f64, f64),
}

impl Viewport {
    pub fn new(bounds: Bounds, zoom: u8) -> Self {
        Self {
            bounds,
            zoom,
            center: bounds.center(),
        }
    }
}

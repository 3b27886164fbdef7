use serde::{Deserialize, Serialize};
use std::fmt;

/// Zoom at and above which individual properties replace clusters.
pub const ZOOM_THRESHOLD: u8 = 14;

/// Length of a precomputed geohash key. Only the precisions the store
/// materializes (3..=7) can be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct GeohashPrecision(u8);

impl GeohashPrecision {
    pub const MIN: u8 = 3;
    pub const MAX: u8 = 7;

    pub fn new(len: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&len).then_some(Self(len))
    }

    /// Coarser buckets at low zoom, finer at high zoom.
    pub fn for_zoom(zoom: u8) -> Self {
        match zoom {
            0..=6 => Self(3),
            7..=9 => Self(4),
            10..=12 => Self(5),
            13..=14 => Self(6),
            _ => Self(7),
        }
    }

    pub fn len(self) -> u8 {
        self.0
    }

    /// Store column holding keys at this precision.
    pub fn column(self) -> &'static str {
        match self.0 {
            3 => "geohash_3",
            4 => "geohash_4",
            5 => "geohash_5",
            6 => "geohash_6",
            _ => "geohash_7",
        }
    }
}

impl TryFrom<u8> for GeohashPrecision {
    type Error = String;

    fn try_from(len: u8) -> Result<Self, Self::Error> {
        Self::new(len).ok_or_else(|| format!("unsupported geohash precision {len}"))
    }
}

impl From<GeohashPrecision> for u8 {
    fn from(p: GeohashPrecision) -> u8 {
        p.0
    }
}

impl fmt::Display for GeohashPrecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the map should represent the result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapMode {
    Clusters { precision: GeohashPrecision },
    Properties,
}

impl MapMode {
    /// Depends on zoom alone; data volume and filters never change the mode.
    pub fn for_zoom(zoom: u8, threshold: u8) -> Self {
        if zoom >= threshold {
            MapMode::Properties
        } else {
            MapMode::Clusters {
                precision: GeohashPrecision::for_zoom(zoom),
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MapMode::Clusters { .. } => "clusters",
            MapMode::Properties => "properties",
        }
    }

    pub fn precision(self) -> Option<GeohashPrecision> {
        match self {
            MapMode::Clusters { precision } => Some(precision),
            MapMode::Properties => None,
        }
    }
}

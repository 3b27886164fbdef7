use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::{Bounds, ClusterPoint};

/// Bucket id for points that have no precomputed key at the requested precision.
pub const UNKNOWN_CLUSTER_ID: &str = "unknown";

/// Aggregate over all points sharing a geohash prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub count: u64,
    pub min_price: i64,
    pub max_price: i64,
    pub bounds: Bounds,
}

struct Bucket {
    count: u64,
    lat_sum: f64,
    lng_sum: f64,
    min_price: i64,
    max_price: i64,
    bounds: Bounds,
}

impl Bucket {
    fn new(p: &ClusterPoint) -> Self {
        Self {
            count: 0,
            lat_sum: 0.0,
            lng_sum: 0.0,
            min_price: p.price,
            max_price: p.price,
            bounds: Bounds {
                north: p.latitude,
                south: p.latitude,
                east: p.longitude,
                west: p.longitude,
            },
        }
    }

    fn add(&mut self, p: &ClusterPoint) {
        self.count += 1;
        self.lat_sum += p.latitude;
        self.lng_sum += p.longitude;
        self.min_price = self.min_price.min(p.price);
        self.max_price = self.max_price.max(p.price);
        self.bounds.north = self.bounds.north.max(p.latitude);
        self.bounds.south = self.bounds.south.min(p.latitude);
        self.bounds.east = self.bounds.east.max(p.longitude);
        self.bounds.west = self.bounds.west.min(p.longitude);
    }

    fn finish(self, id: String) -> Cluster {
        let n = self.count as f64;
        Cluster {
            id,
            latitude: self.lat_sum / n,
            longitude: self.lng_sum / n,
            count: self.count,
            min_price: self.min_price,
            max_price: self.max_price,
            bounds: self.bounds,
        }
    }
}

/// Groups points by their spatial key and returns the `max_clusters` largest
/// buckets, biggest first.
///
/// Keys are expected to already be at the requested precision (the store
/// selects the matching column). Points without a key are kept in their own
/// [`UNKNOWN_CLUSTER_ID`] bucket rather than dropped.
pub fn build_clusters(points: &[ClusterPoint], max_clusters: usize) -> Vec<Cluster> {
    let mut buckets: HashMap<&str, Bucket> = HashMap::new();

    for p in points {
        let key = match p.spatial_key.as_deref() {
            Some(k) if !k.is_empty() => k,
            _ => UNKNOWN_CLUSTER_ID,
        };
        buckets
            .entry(key)
            .or_insert_with(|| Bucket::new(p))
            .add(p);
    }

    let mut clusters: Vec<Cluster> = buckets
        .into_iter()
        .map(|(key, bucket)| bucket.finish(key.to_string()))
        .collect();

    // Ties break on id so identical inputs always produce identical output.
    clusters.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.id.cmp(&b.id)));
    clusters.truncate(max_clusters);
    clusters
}

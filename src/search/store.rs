use tokio_util::sync::CancellationToken;

use crate::domain::{ClusterPoint, MapMarker, PropertyPoint};
use crate::search::error::StoreError;
use crate::search::mode::GeohashPrecision;
use crate::search::predicate::SearchPredicate;

/// Read-only point store the search service fans out against.
///
/// Every method takes the same [`SearchPredicate`]; implementations apply it
/// verbatim and add nothing but ordering, paging and caps. Calls are blocking
/// and are run on the blocking pool by the service.
///
/// `cancel` fires when the caller has stopped waiting (timeout, cancelled
/// search, failed sibling query). Implementations must stop promptly and
/// return [`StoreError::Interrupted`].
pub trait PointStore: Send + Sync + 'static {
    /// Exact number of matching points.
    fn count(
        &self,
        predicate: &SearchPredicate,
        cancel: &CancellationToken,
    ) -> Result<u64, StoreError>;

    /// One page of matching points, most recent first. `page` is 1-based;
    /// pages past the end are empty.
    fn list_page(
        &self,
        predicate: &SearchPredicate,
        page: u32,
        limit: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<PropertyPoint>, StoreError>;

    /// Up to `cap` matching points with their spatial key at `precision`.
    fn cluster_points(
        &self,
        predicate: &SearchPredicate,
        precision: GeohashPrecision,
        cap: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<ClusterPoint>, StoreError>;

    /// Up to `cap` matching points annotated for direct map display.
    fn map_markers(
        &self,
        predicate: &SearchPredicate,
        cap: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<MapMarker>, StoreError>;
}

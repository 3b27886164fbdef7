pub mod filters;
pub mod property;
pub mod viewport;

pub use filters::FilterSet;
pub use property::{ClusterPoint, MapMarker, NewProperty, PropertyPoint};
pub use viewport::{Bounds, Viewport};

pub mod cluster;
pub mod error;
pub mod mode;
pub mod predicate;
pub mod request;
pub mod response;
pub mod retry;
pub mod service;
pub mod store;

pub use cluster::{build_clusters, Cluster};
pub use error::{QueryKind, SearchError, SearchFailure, StoreError};
pub use mode::{GeohashPrecision, MapMode};
pub use predicate::SearchPredicate;
pub use request::{SearchRequest, ValidatedSearch};
pub use response::{MapData, ModeTag, SearchResult};
pub use service::SearchService;
pub use store::PointStore;

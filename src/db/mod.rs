pub mod connection;
pub mod properties;

pub use connection::{init_db, Database};
pub use properties::{backfill_spatial_keys, insert_properties, SqlitePointStore};

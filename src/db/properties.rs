use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::panic::AssertUnwindSafe;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::db::connection::Database;
use crate::domain::{ClusterPoint, MapMarker, NewProperty, PropertyPoint};
use crate::errors::ServerError;
use crate::search::error::StoreError;
use crate::search::mode::GeohashPrecision;
use crate::search::predicate::SearchPredicate;
use crate::search::store::PointStore;

const POINT_COLUMNS: &str = "id, title, latitude, longitude, price, listing_type, property_type, \
     bedrooms, bathrooms, address_line, city, state_abbr, postal_code, created_at";

const MARKER_COLUMNS: &str =
    "id, latitude, longitude, price, title, listing_type, property_type, bedrooms";

// Most recent first; id breaks ties so paging is stable.
const RECENCY_ORDER: &str = "ORDER BY created_at DESC, id DESC";

// VM instructions between cancellation checks.
const PROGRESS_OPS: i32 = 1000;

/// SQLite-backed point store. Each blocking-pool thread gets its own
/// connection through [`Database::with_conn`].
#[derive(Clone, Debug)]
pub struct SqlitePointStore {
    db: Database,
}

impl SqlitePointStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn point_from_row(row: &Row<'_>) -> rusqlite::Result<PropertyPoint> {
    Ok(PropertyPoint {
        id: row.get(0)?,
        title: row.get(1)?,
        latitude: row.get(2)?,
        longitude: row.get(3)?,
        price: row.get(4)?,
        listing_type: row.get(5)?,
        property_type: row.get(6)?,
        bedrooms: row.get(7)?,
        bathrooms: row.get(8)?,
        address_line: row.get(9)?,
        city: row.get(10)?,
        state_abbr: row.get(11)?,
        postal_code: row.get(12)?,
        created_at: row.get(13)?,
    })
}

fn marker_from_row(row: &Row<'_>) -> rusqlite::Result<MapMarker> {
    Ok(MapMarker {
        id: row.get(0)?,
        latitude: row.get(1)?,
        longitude: row.get(2)?,
        price: row.get(3)?,
        title: row.get(4)?,
        listing_type: row.get(5)?,
        property_type: row.get(6)?,
        bedrooms: row.get(7)?,
    })
}

fn query_all<T>(
    conn: &Connection,
    sql: &str,
    params: impl Iterator<Item = Value>,
    map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params_from_iter(params), map)?;

    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok(out)
}

/// Runs `f` with a progress handler that aborts the statement as soon as
/// `cancel` fires. SQLite then fails with `SQLITE_INTERRUPT`, which maps to
/// [`StoreError::Interrupted`].
fn interruptible<T>(
    conn: &Connection,
    cancel: &CancellationToken,
    f: impl FnOnce(&Connection) -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    if cancel.is_cancelled() {
        return Err(StoreError::Interrupted);
    }

    let token = AssertUnwindSafe(cancel.clone());
    conn.progress_handler(PROGRESS_OPS, Some(move || token.is_cancelled()));
    let out = f(conn);
    // The connection is reused by the next call on this thread.
    conn.progress_handler(PROGRESS_OPS, None::<fn() -> bool>);
    out
}

impl PointStore for SqlitePointStore {
    fn count(
        &self,
        predicate: &SearchPredicate,
        cancel: &CancellationToken,
    ) -> Result<u64, StoreError> {
        let sql = format!(
            "SELECT COUNT(*) FROM properties WHERE {}",
            predicate.where_sql()
        );
        self.db.with_conn(|conn| {
            interruptible(conn, cancel, |conn| {
                let n: i64 =
                    conn.query_row(&sql, params_from_iter(predicate.params()), |r| r.get(0))?;
                Ok(n.max(0) as u64)
            })
        })
    }

    fn list_page(
        &self,
        predicate: &SearchPredicate,
        page: u32,
        limit: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<PropertyPoint>, StoreError> {
        let sql = format!(
            "SELECT {POINT_COLUMNS} FROM properties WHERE {} {RECENCY_ORDER} LIMIT ? OFFSET ?",
            predicate.where_sql()
        );
        let offset = i64::from(page.saturating_sub(1)) * i64::from(limit);
        let params = predicate
            .params()
            .iter()
            .cloned()
            .chain([Value::Integer(i64::from(limit)), Value::Integer(offset)]);

        self.db.with_conn(|conn| {
            interruptible(conn, cancel, |conn| {
                query_all(conn, &sql, params, point_from_row)
            })
        })
    }

    fn cluster_points(
        &self,
        predicate: &SearchPredicate,
        precision: GeohashPrecision,
        cap: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<ClusterPoint>, StoreError> {
        // Column name comes from a closed set, never from input.
        let sql = format!(
            "SELECT id, latitude, longitude, price, {} FROM properties WHERE {} ORDER BY id LIMIT ?",
            precision.column(),
            predicate.where_sql()
        );
        let params = predicate
            .params()
            .iter()
            .cloned()
            .chain([Value::Integer(cap as i64)]);

        self.db.with_conn(|conn| {
            interruptible(conn, cancel, |conn| {
                query_all(conn, &sql, params, |row| {
                    Ok(ClusterPoint {
                        id: row.get(0)?,
                        latitude: row.get(1)?,
                        longitude: row.get(2)?,
                        price: row.get(3)?,
                        spatial_key: row.get(4)?,
                    })
                })
            })
        })
    }

    fn map_markers(
        &self,
        predicate: &SearchPredicate,
        cap: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<MapMarker>, StoreError> {
        let sql = format!(
            "SELECT {MARKER_COLUMNS} FROM properties WHERE {} {RECENCY_ORDER} LIMIT ?",
            predicate.where_sql()
        );
        let params = predicate
            .params()
            .iter()
            .cloned()
            .chain([Value::Integer(cap as i64)]);

        self.db.with_conn(|conn| {
            interruptible(conn, cancel, |conn| {
                query_all(conn, &sql, params, marker_from_row)
            })
        })
    }
}

/// Geohash keys for every materialized precision, shortest first.
///
/// Returns `None` when the coordinates cannot be encoded; such points are
/// stored without keys and end up in the `unknown` cluster.
pub fn spatial_keys(latitude: f64, longitude: f64) -> Option<Vec<String>> {
    let full = geohash::encode(
        geohash::Coord {
            x: longitude,
            y: latitude,
        },
        usize::from(GeohashPrecision::MAX),
    )
    .ok()?;

    // Geohash is hierarchical: the key at precision n is the first n chars.
    Some(
        (GeohashPrecision::MIN..=GeohashPrecision::MAX)
            .map(|len| full[..usize::from(len)].to_string())
            .collect(),
    )
}

/// Inserts new points in one transaction, computing their spatial keys.
pub fn insert_properties(db: &Database, properties: &[NewProperty]) -> Result<usize, ServerError> {
    let now = Utc::now();

    db.with_conn(|conn| {
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO properties (
                    title, latitude, longitude, price, listing_type, property_type,
                    bedrooms, bathrooms, address_line, city, state_abbr, postal_code,
                    status, created_at,
                    geohash_3, geohash_4, geohash_5, geohash_6, geohash_7
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
                "#,
            )?;

            for prop in properties {
                let keys = spatial_keys(prop.latitude, prop.longitude);
                if keys.is_none() {
                    warn!(
                        title = %prop.title,
                        latitude = prop.latitude,
                        longitude = prop.longitude,
                        "coordinates not encodable, storing without spatial keys"
                    );
                }
                let key = |i: usize| keys.as_ref().map(|k| k[i].clone());

                stmt.execute(params![
                    &prop.title,
                    prop.latitude,
                    prop.longitude,
                    prop.price,
                    &prop.listing_type,
                    &prop.property_type,
                    prop.bedrooms,
                    prop.bathrooms,
                    &prop.address_line,
                    &prop.city,
                    &prop.state_abbr,
                    &prop.postal_code,
                    prop.status.as_deref().unwrap_or("active"),
                    prop.created_at.unwrap_or(now),
                    key(0),
                    key(1),
                    key(2),
                    key(3),
                    key(4),
                ])?;
            }
        }
        tx.commit()?;
        debug!(count = properties.len(), "inserted properties");
        Ok(properties.len())
    })
}

/// Fills spatial keys for rows imported without them. Rows whose coordinates
/// still cannot be encoded are left alone. Returns how many rows were updated.
pub fn backfill_spatial_keys(db: &Database) -> Result<usize, ServerError> {
    db.with_conn(|conn| {
        let pending: Vec<(i64, f64, f64)> = {
            let mut stmt = conn.prepare(
                "SELECT id, latitude, longitude FROM properties WHERE geohash_7 IS NULL",
            )?;
            let rows = stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)))?;
            let collected = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            collected
        };

        let tx = conn.transaction()?;
        let mut updated = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                UPDATE properties SET
                    geohash_3 = ?1, geohash_4 = ?2, geohash_5 = ?3, geohash_6 = ?4, geohash_7 = ?5
                WHERE id = ?6
                "#,
            )?;
            for (id, lat, lng) in pending {
                let Some(keys) = spatial_keys(lat, lng) else {
                    continue;
                };
                stmt.execute(params![keys[0], keys[1], keys[2], keys[3], keys[4], id])?;
                updated += 1;
            }
        }
        tx.commit()?;
        Ok(updated)
    })
}

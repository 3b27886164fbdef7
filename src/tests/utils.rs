use crate::config::SearchConfig;
use crate::db::{init_db, insert_properties, Database, SqlitePointStore};
use crate::domain::{Bounds, FilterSet, NewProperty, Viewport};
use crate::search::error::{QueryKind, StoreError};
use crate::search::mode::GeohashPrecision;
use crate::search::predicate::SearchPredicate;
use crate::search::store::PointStore;
use crate::search::{SearchRequest, SearchService};
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::env;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;

/// Roughly the whole country, as seen at zoom 5.
pub const MEXICO: Bounds = Bounds {
    north: 32.7,
    south: 14.5,
    east: -86.7,
    west: -118.4,
};

/// A few blocks of central Mexico City, as seen at zoom 16.
pub const CDMX_CENTRO: Bounds = Bounds {
    north: 19.45,
    south: 19.40,
    east: -99.12,
    west: -99.18,
};

pub const COUNTRY_POINTS: usize = 400;
pub const CENTRO_POINTS: usize = 120;

/// Fresh, empty, schema-initialized database in the temp dir.
pub fn temp_db(label: &str) -> Database {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let path = env::temp_dir().join(format!("map_search_{label}_{nanos}.sqlite3"));
    let db = Database::new(path.to_string_lossy().into_owned());

    init_db(&db).unwrap_or_else(|e| panic!("Database initialization failed: {e}"));
    db
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn property(rng: &mut StdRng, i: usize, lat: f64, lng: f64) -> NewProperty {
    let listing_type = if rng.gen_bool(0.5) { "venta" } else { "renta" };
    let property_type = ["casa", "departamento", "terreno"][rng.gen_range(0..3)];
    let price = if listing_type == "venta" {
        rng.gen_range(500_000..10_000_000)
    } else {
        rng.gen_range(5_000..60_000)
    };
    let bedrooms = (property_type != "terreno").then(|| rng.gen_range(1..=5));

    NewProperty {
        title: format!("{property_type} {i}"),
        latitude: lat,
        longitude: lng,
        price,
        listing_type: listing_type.into(),
        property_type: property_type.into(),
        bedrooms,
        bathrooms: bedrooms.map(|b| (b + 1) / 2),
        address_line: Some(format!("Calle {i}")),
        city: None,
        state_abbr: None,
        postal_code: None,
        // Every tenth listing is off the market.
        status: (i % 10 == 9).then(|| "inactive".to_string()),
        // Distinct timestamps keep the recency order strict.
        created_at: Some(base_time() + ChronoDuration::minutes(i as i64)),
    }
}

/// Deterministic data set: points spread over the country plus a dense
/// neighborhood in central Mexico City.
pub fn fixture_properties() -> Vec<NewProperty> {
    let mut rng = StdRng::seed_from_u64(42);
    let mut out = Vec::with_capacity(COUNTRY_POINTS + CENTRO_POINTS);

    for i in 0..COUNTRY_POINTS {
        let lat = rng.gen_range(15.0..32.0);
        let lng = rng.gen_range(-117.0..-87.0);
        out.push(property(&mut rng, i, lat, lng));
    }
    for i in COUNTRY_POINTS..COUNTRY_POINTS + CENTRO_POINTS {
        let lat = rng.gen_range(19.401..19.449);
        let lng = rng.gen_range(-99.179..-99.121);
        out.push(property(&mut rng, i, lat, lng));
    }
    out
}

/// Database loaded with [`fixture_properties`].
pub fn seeded_db(label: &str) -> (Database, Vec<NewProperty>) {
    let db = temp_db(label);
    let fixtures = fixture_properties();
    let inserted = insert_properties(&db, &fixtures).expect("seed fixtures");
    assert_eq!(inserted, fixtures.len());
    (db, fixtures)
}

pub fn matches(p: &NewProperty, bounds: &Bounds, filters: &FilterSet) -> bool {
    p.status.as_deref().unwrap_or("active") == "active"
        && bounds.contains(p.latitude, p.longitude)
        && filters
            .listing_type
            .as_ref()
            .map_or(true, |t| *t == p.listing_type)
        && filters
            .property_type
            .as_ref()
            .map_or(true, |t| *t == p.property_type)
        && filters.min_price.map_or(true, |min| p.price >= min)
        && filters.max_price.map_or(true, |max| p.price <= max)
        && filters
            .min_bedrooms
            .map_or(true, |min| p.bedrooms.is_some_and(|b| b >= i64::from(min)))
}

/// Count computed in memory, independently of the store.
pub fn expected_total(fixtures: &[NewProperty], bounds: &Bounds, filters: &FilterSet) -> u64 {
    fixtures
        .iter()
        .filter(|p| matches(p, bounds, filters))
        .count() as u64
}

pub fn request(bounds: Bounds, zoom: u8, filters: FilterSet, page: u32) -> SearchRequest {
    SearchRequest::new(Viewport::new(bounds, zoom), filters, page, 20)
}

pub fn service(db: &Database) -> SearchService<SqlitePointStore> {
    SearchService::new(SqlitePointStore::new(db.clone()), SearchConfig::default())
}

/// Small timeouts and backoff so failure paths finish quickly.
pub fn fast_config() -> SearchConfig {
    let mut cfg = SearchConfig::default();
    cfg.retry.attempt_timeout = Duration::from_millis(100);
    cfg.retry.base_delay = Duration::from_millis(1);
    cfg.retry.max_delay = Duration::from_millis(5);
    cfg
}

/// How a [`FaultyStore`] misbehaves.
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// Every call of this kind fails with a non-retryable error.
    Broken(QueryKind),
    /// The first `n` calls of this kind report the store as unavailable.
    Flaky(QueryKind, u32),
    /// Every call of this kind blocks for the given time first, unless
    /// cancelled while waiting.
    Slow(QueryKind, Duration),
}

impl Fault {
    fn kind(&self) -> QueryKind {
        match *self {
            Fault::Broken(k) | Fault::Flaky(k, _) | Fault::Slow(k, _) => k,
        }
    }
}

/// What a [`FaultyStore`] saw. Only `calls` covers every query kind; the
/// rest count calls of the faulted kind, so they do not depend on how far
/// sibling queries got before a failure dropped them.
#[derive(Debug, Default)]
pub struct CallLog {
    pub calls: AtomicU32,
    pub faulted: AtomicU32,
    /// Slow calls that ran to the end.
    pub completed: AtomicU32,
    /// Slow calls that stopped because their token fired.
    pub interrupted: AtomicU32,
}

impl CallLog {
    pub fn get(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

/// Wraps the real store, injects one fault and logs calls.
pub struct FaultyStore {
    inner: SqlitePointStore,
    fault: Option<Fault>,
    log: Arc<CallLog>,
    failures: AtomicU32,
}

impl FaultyStore {
    pub fn new(db: &Database, fault: Option<Fault>) -> (Self, Arc<CallLog>) {
        let log = Arc::new(CallLog::default());
        let store = Self {
            inner: SqlitePointStore::new(db.clone()),
            fault,
            log: Arc::clone(&log),
            failures: AtomicU32::new(0),
        };
        (store, log)
    }

    fn before(&self, kind: QueryKind, cancel: &CancellationToken) -> Result<(), StoreError> {
        self.log.calls.fetch_add(1, Ordering::SeqCst);
        let Some(fault) = self.fault.filter(|f| f.kind() == kind) else {
            return Ok(());
        };
        self.log.faulted.fetch_add(1, Ordering::SeqCst);

        match fault {
            Fault::Broken(_) => Err(StoreError::Query("no such column: geohash_9".into())),
            Fault::Flaky(_, n) => {
                if self.failures.fetch_add(1, Ordering::SeqCst) < n {
                    Err(StoreError::Unavailable("database is locked".into()))
                } else {
                    Ok(())
                }
            }
            Fault::Slow(_, delay) => {
                let until = Instant::now() + delay;
                while Instant::now() < until {
                    if cancel.is_cancelled() {
                        self.log.interrupted.fetch_add(1, Ordering::SeqCst);
                        return Err(StoreError::Interrupted);
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
                self.log.completed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }
}

impl PointStore for FaultyStore {
    fn count(
        &self,
        predicate: &SearchPredicate,
        cancel: &CancellationToken,
    ) -> Result<u64, StoreError> {
        self.before(QueryKind::Count, cancel)?;
        self.inner.count(predicate, cancel)
    }

    fn list_page(
        &self,
        predicate: &SearchPredicate,
        page: u32,
        limit: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<crate::domain::PropertyPoint>, StoreError> {
        self.before(QueryKind::List, cancel)?;
        self.inner.list_page(predicate, page, limit, cancel)
    }

    fn cluster_points(
        &self,
        predicate: &SearchPredicate,
        precision: GeohashPrecision,
        cap: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<crate::domain::ClusterPoint>, StoreError> {
        self.before(QueryKind::Map, cancel)?;
        self.inner.cluster_points(predicate, precision, cap, cancel)
    }

    fn map_markers(
        &self,
        predicate: &SearchPredicate,
        cap: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<crate::domain::MapMarker>, StoreError> {
        self.before(QueryKind::Map, cancel)?;
        self.inner.map_markers(predicate, cap, cancel)
    }
}

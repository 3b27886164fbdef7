use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{MapMarker, PropertyPoint};
use crate::search::cluster::Cluster;
use crate::search::error::SearchFailure;
use crate::search::mode::MapMode;

/// `ceil(total / limit)`; zero when there is nothing to page through.
pub fn total_pages(total: u64, limit: u32) -> u64 {
    total.div_ceil(u64::from(limit.max(1)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeTag {
    Clusters,
    Properties,
}

impl From<MapMode> for ModeTag {
    fn from(mode: MapMode) -> Self {
        match mode {
            MapMode::Clusters { .. } => ModeTag::Clusters,
            MapMode::Properties => ModeTag::Properties,
        }
    }
}

/// What the map draws. The variant always agrees with the response `mode`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MapData {
    Clusters(Vec<Cluster>),
    Properties(Vec<MapMarker>),
}

impl MapData {
    pub fn mode(&self) -> ModeTag {
        match self {
            MapData::Clusters(_) => ModeTag::Clusters,
            MapData::Properties(_) => ModeTag::Properties,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            MapData::Clusters(c) => c.len(),
            MapData::Properties(p) => p.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One page of the list view.
#[derive(Debug, Clone, PartialEq)]
pub struct ListPage {
    pub items: Vec<PropertyPoint>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl ListPage {
    pub fn new(items: Vec<PropertyPoint>, page: u32, page_size: u32, total: u64) -> Self {
        Self {
            items,
            page,
            page_size,
            total,
            total_pages: total_pages(total, page_size),
        }
    }
}

/// Diagnostics attached to every successful response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchMeta {
    pub request_id: Uuid,
    pub duration_ms: u64,
    pub db_query_ms: u64,
    pub clustering_precision: Option<u8>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawSearchResult")]
pub struct SearchResult {
    pub mode: ModeTag,
    pub map_data: MapData,
    pub list_items: Vec<PropertyPoint>,
    pub total: u64,
    pub page: u32,
    pub total_pages: u64,
    pub meta: SearchMeta,
}

impl SearchResult {
    pub fn assemble(map_data: MapData, list: ListPage, meta: SearchMeta) -> Self {
        Self {
            mode: map_data.mode(),
            map_data,
            list_items: list.items,
            total: list.total,
            page: list.page,
            total_pages: list.total_pages,
            meta,
        }
    }
}

// `mapData` is decoded according to `mode`; an empty array is otherwise ambiguous.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSearchResult {
    mode: ModeTag,
    map_data: serde_json::Value,
    list_items: Vec<PropertyPoint>,
    total: u64,
    page: u32,
    total_pages: u64,
    meta: SearchMeta,
}

impl TryFrom<RawSearchResult> for SearchResult {
    type Error = String;

    fn try_from(raw: RawSearchResult) -> Result<Self, Self::Error> {
        let map_data = match raw.mode {
            ModeTag::Clusters => MapData::Clusters(
                serde_json::from_value(raw.map_data).map_err(|e| format!("mapData: {e}"))?,
            ),
            ModeTag::Properties => MapData::Properties(
                serde_json::from_value(raw.map_data).map_err(|e| format!("mapData: {e}"))?,
            ),
        };
        Ok(Self {
            mode: raw.mode,
            map_data,
            list_items: raw.list_items,
            total: raw.total,
            page: raw.page,
            total_pages: raw.total_pages,
            meta: raw.meta,
        })
    }
}

/// JSON body of every failed API call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    #[serde(default)]
    pub request_id: Option<Uuid>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub retryable: bool,
}

impl ErrorBody {
    pub fn new(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            message: message.into(),
            request_id: None,
            duration_ms: None,
            retryable: false,
        }
    }
}

impl From<&SearchFailure> for ErrorBody {
    fn from(failure: &SearchFailure) -> Self {
        Self {
            error: failure.source.kind().to_string(),
            message: failure.source.to_string(),
            request_id: Some(failure.request_id),
            duration_ms: Some(failure.duration_ms),
            retryable: failure.source.is_retryable(),
        }
    }
}

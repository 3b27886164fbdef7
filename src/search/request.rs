use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::{Bounds, FilterSet, Viewport};
use crate::search::error::SearchError;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_ZOOM: i64 = 24;

/// Bounds as they arrive on the wire; any missing edge is a validation failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundsInput {
    pub north: Option<f64>,
    pub south: Option<f64>,
    pub east: Option<f64>,
    pub west: Option<f64>,
}

impl From<Bounds> for BoundsInput {
    fn from(b: Bounds) -> Self {
        Self {
            north: Some(b.north),
            south: Some(b.south),
            east: Some(b.east),
            west: Some(b.west),
        }
    }
}

/// Unvalidated search request, as posted by clients.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub bounds: Option<BoundsInput>,
    #[serde(default)]
    pub zoom: Option<i64>,
    #[serde(default)]
    pub filters: FilterSet,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// A request that passed validation. Only this shape reaches the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSearch {
    pub viewport: Viewport,
    pub filters: FilterSet,
    pub page: u32,
    pub limit: u32,
}

impl SearchRequest {
    pub fn new(viewport: Viewport, filters: FilterSet, page: u32, limit: u32) -> Self {
        Self {
            bounds: Some(viewport.bounds.into()),
            zoom: Some(i64::from(viewport.zoom)),
            filters,
            page: Some(i64::from(page)),
            limit: Some(i64::from(limit)),
        }
    }

    /// Parses `GET /api/search` query parameters. Unknown keys are ignored;
    /// malformed numbers are validation failures.
    pub fn from_query(params: &HashMap<String, String>) -> Result<Self, SearchError> {
        fn num<T: std::str::FromStr>(
            params: &HashMap<String, String>,
            key: &str,
        ) -> Result<Option<T>, SearchError> {
            match params.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
                None => Ok(None),
                Some(v) => v
                    .parse()
                    .map(Some)
                    .map_err(|_| SearchError::Validation(format!("{key} is not a number: {v:?}"))),
            }
        }

        let bounds = BoundsInput {
            north: num(params, "north")?,
            south: num(params, "south")?,
            east: num(params, "east")?,
            west: num(params, "west")?,
        };
        let any_edge = bounds.north.is_some()
            || bounds.south.is_some()
            || bounds.east.is_some()
            || bounds.west.is_some();

        let filters = FilterSet {
            listing_type: params.get("listing_type").cloned(),
            property_type: params.get("property_type").cloned(),
            min_price: num(params, "min_price")?,
            max_price: num(params, "max_price")?,
            min_bedrooms: num(params, "min_bedrooms")?,
        }
        .normalized();

        Ok(Self {
            bounds: any_edge.then_some(bounds),
            zoom: num(params, "zoom")?,
            filters,
            page: num(params, "page")?,
            limit: num(params, "limit")?,
        })
    }

    /// Rejects malformed input before any query runs.
    pub fn validate(&self, max_page_size: u32) -> Result<ValidatedSearch, SearchError> {
        let input = self
            .bounds
            .ok_or_else(|| SearchError::Validation("bounds are required".into()))?;

        let edge = |v: Option<f64>, name: &str| {
            v.filter(|x| x.is_finite())
                .ok_or_else(|| SearchError::Validation(format!("bounds.{name} is required")))
        };
        let bounds = Bounds {
            north: edge(input.north, "north")?,
            south: edge(input.south, "south")?,
            east: edge(input.east, "east")?,
            west: edge(input.west, "west")?,
        };

        for (name, lat) in [("north", bounds.north), ("south", bounds.south)] {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(SearchError::Validation(format!(
                    "bounds.{name} must be within [-90, 90], got {lat}"
                )));
            }
        }
        for (name, lng) in [("east", bounds.east), ("west", bounds.west)] {
            if !(-180.0..=180.0).contains(&lng) {
                return Err(SearchError::Validation(format!(
                    "bounds.{name} must be within [-180, 180], got {lng}"
                )));
            }
        }
        if bounds.north <= bounds.south {
            return Err(SearchError::Validation(
                "bounds.north must be greater than bounds.south".into(),
            ));
        }
        if bounds.east <= bounds.west {
            return Err(SearchError::Validation(
                "bounds.east must be greater than bounds.west".into(),
            ));
        }

        let zoom = self
            .zoom
            .ok_or_else(|| SearchError::Validation("zoom is required".into()))?;
        if !(0..=MAX_ZOOM).contains(&zoom) {
            return Err(SearchError::Validation(format!(
                "zoom must be within [0, {MAX_ZOOM}], got {zoom}"
            )));
        }

        let page = self.page.unwrap_or(1);
        if page < 1 || page > i64::from(u32::MAX) {
            return Err(SearchError::Validation(format!(
                "page must be >= 1, got {page}"
            )));
        }

        let limit = self.limit.unwrap_or(i64::from(DEFAULT_PAGE_SIZE));
        if limit < 1 || limit > i64::from(max_page_size) {
            return Err(SearchError::Validation(format!(
                "limit must be within [1, {max_page_size}], got {limit}"
            )));
        }

        Ok(ValidatedSearch {
            viewport: Viewport::new(bounds, zoom as u8),
            filters: self.filters.clone().normalized(),
            page: page as u32,
            limit: limit as u32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> SearchRequest {
        SearchRequest {
            bounds: Some(BoundsInput {
                north: Some(32.7),
                south: Some(14.5),
                east: Some(-86.7),
                west: Some(-118.4),
            }),
            zoom: Some(5),
            filters: FilterSet::default(),
            page: Some(1),
            limit: Some(20),
        }
    }

    fn rejects(req: SearchRequest) -> String {
        match req.validate(100) {
            Err(SearchError::Validation(msg)) => msg,
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn accepts_well_formed_request() {
        let v = valid().validate(100).unwrap();
        assert_eq!(v.viewport.zoom, 5);
        assert_eq!((v.page, v.limit), (1, 20));
        assert_eq!(v.viewport.center, ((32.7 + 14.5) / 2.0, (-86.7 - 118.4) / 2.0));
    }

    #[test]
    fn missing_bounds_or_zoom_rejected() {
        let mut req = valid();
        req.bounds = None;
        assert!(rejects(req).contains("bounds"));

        let mut req = valid();
        req.bounds.as_mut().unwrap().east = None;
        assert!(rejects(req).contains("east"));

        let mut req = valid();
        req.zoom = None;
        assert!(rejects(req).contains("zoom"));
    }

    #[test]
    fn inverted_rectangle_rejected() {
        let mut req = valid();
        req.bounds.as_mut().unwrap().north = Some(10.0);
        assert!(rejects(req).contains("north"));

        let mut req = valid();
        req.bounds.as_mut().unwrap().west = Some(-80.0);
        assert!(rejects(req).contains("east"));
    }

    #[test]
    fn non_positive_page_or_limit_rejected() {
        let mut req = valid();
        req.page = Some(0);
        assert!(rejects(req).contains("page"));

        let mut req = valid();
        req.limit = Some(-5);
        assert!(rejects(req).contains("limit"));

        let mut req = valid();
        req.limit = Some(101);
        assert!(rejects(req).contains("limit"));
    }

    #[test]
    fn page_and_limit_default() {
        let mut req = valid();
        req.page = None;
        req.limit = None;
        let v = req.validate(100).unwrap();
        assert_eq!((v.page, v.limit), (1, DEFAULT_PAGE_SIZE));
    }

    #[test]
    fn parses_query_string_params() {
        let params: HashMap<String, String> = [
            ("north", "19.5"),
            ("south", "19.3"),
            ("east", "-99.0"),
            ("west", "-99.3"),
            ("zoom", "16"),
            ("listing_type", "venta"),
            ("property_type", ""),
            ("max_price", "2000000"),
            ("page", "2"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let req = SearchRequest::from_query(&params).unwrap();
        assert_eq!(req.zoom, Some(16));
        assert_eq!(req.filters.listing_type.as_deref(), Some("venta"));
        assert_eq!(req.filters.property_type, None);
        assert_eq!(req.filters.max_price, Some(2_000_000));
        assert_eq!(req.page, Some(2));
        assert_eq!(req.limit, None);
        assert!(req.validate(100).is_ok());
    }

    #[test]
    fn malformed_number_in_query_rejected() {
        let params: HashMap<String, String> = [("zoom", "close")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert!(matches!(
            SearchRequest::from_query(&params),
            Err(SearchError::Validation(_))
        ));
    }
}

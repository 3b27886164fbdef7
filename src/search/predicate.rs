use rusqlite::types::Value;

use crate::domain::{Bounds, FilterSet};

/// The one filter shared by the count, list and map queries.
///
/// Built once per request and handed to every store call unchanged. Store
/// implementations splice `where_sql` and bind `params` in order; they must
/// not add filtering of their own.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPredicate {
    where_sql: String,
    params: Vec<Value>,
}

impl SearchPredicate {
    pub fn build(bounds: &Bounds, filters: &FilterSet) -> Self {
        let mut clauses = vec![
            "status = 'active'".to_string(),
            "latitude BETWEEN ? AND ?".to_string(),
            "longitude BETWEEN ? AND ?".to_string(),
        ];
        let mut params = vec![
            Value::Real(bounds.south),
            Value::Real(bounds.north),
            Value::Real(bounds.west),
            Value::Real(bounds.east),
        ];

        if let Some(listing_type) = &filters.listing_type {
            clauses.push("listing_type = ?".into());
            params.push(Value::Text(listing_type.clone()));
        }
        if let Some(property_type) = &filters.property_type {
            clauses.push("property_type = ?".into());
            params.push(Value::Text(property_type.clone()));
        }
        // A min above max is passed through as-is and simply matches nothing.
        if let Some(min_price) = filters.min_price {
            clauses.push("price >= ?".into());
            params.push(Value::Integer(min_price));
        }
        if let Some(max_price) = filters.max_price {
            clauses.push("price <= ?".into());
            params.push(Value::Integer(max_price));
        }
        if let Some(min_bedrooms) = filters.min_bedrooms {
            clauses.push("bedrooms >= ?".into());
            params.push(Value::Integer(i64::from(min_bedrooms)));
        }

        Self {
            where_sql: clauses.join(" AND "),
            params,
        }
    }

    pub fn where_sql(&self) -> &str {
        &self.where_sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

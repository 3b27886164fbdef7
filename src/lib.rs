//! Unified map + list property search.
//!
//! One request (viewport, filters, page) yields one answer that drives both
//! the map (clusters or individual markers, chosen by zoom) and the paginated
//! list, with a single exact total shared by both.

pub mod client;
pub mod config;
pub mod db;
pub mod domain;
pub mod errors;
pub mod responses;
pub mod router;
pub mod search;

#[cfg(test)]
mod tests;

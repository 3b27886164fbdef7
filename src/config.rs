use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::search::mode::ZOOM_THRESHOLD;
use crate::search::retry::RetryPolicy;

pub const CLUSTER_INPUT_CAP: usize = 5000;
pub const CLUSTER_OUTPUT_CAP: usize = 500;
pub const PROPERTIES_MAP_CAP: usize = 500;
pub const MAX_PAGE_SIZE: u32 = 100;
pub const DEBOUNCE: Duration = Duration::from_millis(300);

/// Tunables of the search service. Defaults are the reference values.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    /// Zoom at and above which the map switches to individual properties.
    pub zoom_threshold: u8,
    /// Ceiling on points fetched for clustering.
    pub cluster_input_cap: usize,
    /// Ceiling on clusters returned.
    pub cluster_output_cap: usize,
    /// Ceiling on markers returned in properties mode.
    pub properties_map_cap: usize,
    pub max_page_size: u32,
    pub retry: RetryPolicy,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            zoom_threshold: ZOOM_THRESHOLD,
            cluster_input_cap: CLUSTER_INPUT_CAP,
            cluster_output_cap: CLUSTER_OUTPUT_CAP,
            properties_map_cap: PROPERTIES_MAP_CAP,
            max_page_size: MAX_PAGE_SIZE,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "map_search", about = "Map + list property search service")]
pub struct Cli {
    /// SQLite file holding the point store.
    #[arg(long, env = "MAP_SEARCH_DB", default_value = "map_search.sqlite3", global = true)]
    pub db: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the search API over HTTP.
    Serve(ServeArgs),
    /// Load properties from a JSON array file.
    Import {
        file: PathBuf,
    },
    /// Compute missing spatial keys for stored properties.
    Backfill,
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    #[arg(long, env = "MAP_SEARCH_ADDR", default_value = "127.0.0.1:3000")]
    pub addr: SocketAddr,

    #[arg(long, env = "MAP_SEARCH_WORKERS", default_value_t = 8)]
    pub workers: usize,

    #[arg(long, env = "MAP_SEARCH_ZOOM_THRESHOLD", default_value_t = ZOOM_THRESHOLD)]
    pub zoom_threshold: u8,

    #[arg(long, env = "MAP_SEARCH_CLUSTER_INPUT_CAP", default_value_t = CLUSTER_INPUT_CAP)]
    pub cluster_input_cap: usize,

    #[arg(long, env = "MAP_SEARCH_CLUSTER_OUTPUT_CAP", default_value_t = CLUSTER_OUTPUT_CAP)]
    pub cluster_output_cap: usize,

    #[arg(long, env = "MAP_SEARCH_PROPERTIES_MAP_CAP", default_value_t = PROPERTIES_MAP_CAP)]
    pub properties_map_cap: usize,

    #[arg(long, env = "MAP_SEARCH_MAX_PAGE_SIZE", default_value_t = MAX_PAGE_SIZE)]
    pub max_page_size: u32,

    /// Per-attempt store timeout in milliseconds.
    #[arg(long, env = "MAP_SEARCH_QUERY_TIMEOUT_MS", default_value_t = 5000)]
    pub query_timeout_ms: u64,

    /// Attempts per store call, including the first.
    #[arg(long, env = "MAP_SEARCH_QUERY_ATTEMPTS", default_value_t = 3)]
    pub query_attempts: u32,

    #[arg(long, env = "MAP_SEARCH_BACKOFF_BASE_MS", default_value_t = 50)]
    pub backoff_base_ms: u64,

    #[arg(long, env = "MAP_SEARCH_BACKOFF_MAX_MS", default_value_t = 1000)]
    pub backoff_max_ms: u64,
}

impl ServeArgs {
    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            zoom_threshold: self.zoom_threshold,
            cluster_input_cap: self.cluster_input_cap,
            cluster_output_cap: self.cluster_output_cap,
            properties_map_cap: self.properties_map_cap,
            max_page_size: self.max_page_size.max(1),
            retry: RetryPolicy {
                max_attempts: self.query_attempts.max(1),
                attempt_timeout: Duration::from_millis(self.query_timeout_ms),
                base_delay: Duration::from_millis(self.backoff_base_ms),
                max_delay: Duration::from_millis(self.backoff_max_ms),
            },
        }
    }
}

//! Configuration for search synchronization.
//!
//! # Example
//!
//! ```
//! use search_sync::SearchSyncConfig;
//!
//! // Minimal config (uses defaults)
//! let config = SearchSyncConfig::default();
//! assert!(config.auto_index);
//! assert_eq!(config.global_key_prefix, "redis_search");
//!
//! // Full config
//! let config = SearchSyncConfig {
//!     redis_url: Some("redis://localhost:6379".into()),
//!     page_size: 50,
//!     index_chunk_size: 500,
//!     ..Default::default()
//! };
//! ```

use serde::Deserialize;

/// Configuration for search synchronization.
///
/// All fields have sensible defaults; hosts usually deserialize it from
/// their own settings file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchSyncConfig {
    /// Process-wide switch. When off no change dispatcher is installed and
    /// every registry propagation call is a no-op.
    #[serde(default = "default_auto_index")]
    pub auto_index: bool,

    /// Redis Stack connection string (e.g., "redis://localhost:6379")
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Leading key segment: documents live at `{prefix}:{document}:{pk}`
    #[serde(default = "default_global_key_prefix")]
    pub global_key_prefix: String,

    /// Hits fetched per search window
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Records per chunk during bulk indexing
    #[serde(default = "default_index_chunk_size")]
    pub index_chunk_size: usize,

    /// Paginator default for serving page 1 of an empty result
    #[serde(default = "default_allow_empty_first_page")]
    pub allow_empty_first_page: bool,
}

fn default_auto_index() -> bool { true }
fn default_global_key_prefix() -> String { "redis_search".to_string() }
fn default_page_size() -> usize { 10 }
fn default_index_chunk_size() -> usize { 2000 }
fn default_allow_empty_first_page() -> bool { true }

impl Default for SearchSyncConfig {
    fn default() -> Self {
        Self {
            auto_index: default_auto_index(),
            redis_url: None,
            global_key_prefix: default_global_key_prefix(),
            page_size: default_page_size(),
            index_chunk_size: default_index_chunk_size(),
            allow_empty_first_page: default_allow_empty_first_page(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_source_uses_defaults() {
        let config: SearchSyncConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SearchSyncConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config: SearchSyncConfig =
            serde_json::from_str(r#"{"auto_index": false, "global_key_prefix": "shop"}"#).unwrap();
        assert!(!config.auto_index);
        assert_eq!(config.global_key_prefix, "shop");
        assert_eq!(config.page_size, 10);
        assert_eq!(config.index_chunk_size, 2000);
    }
}

//! Configuration for the operation log.
//!
//! # Example
//!
//! ```
//! use radix_store::LogConfig;
//!
//! // Minimal config (uses defaults)
//! let config = LogConfig::default();
//! assert_eq!(config.segment_max_bytes, 64 * 1024 * 1024); // 64 MB
//!
//! // Full config
//! let config = LogConfig {
//!     fsync_each_record: true,
//!     segment_max_bytes: 4 * 1024 * 1024,
//! };
//! ```

use serde::Deserialize;

/// Tuning knobs for the append-only operation log.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Fsync after every appended record. Durable but slow; off by default
    /// because the log is a recovery aid, not a commit protocol.
    #[serde(default)]
    pub fsync_each_record: bool,

    /// Roll to a new segment file once the current one grows past this
    /// many bytes.
    #[serde(default = "default_segment_max_bytes")]
    pub segment_max_bytes: u64,
}

fn default_segment_max_bytes() -> u64 {
    64 * 1024 * 1024 // 64 MB
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            fsync_each_record: false,
            segment_max_bytes: default_segment_max_bytes(),
        }
    }
}

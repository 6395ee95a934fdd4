#![forbid(unsafe_code)]

//! Runtime configuration.

use crate::stream::DEFAULT_MAX_SIZE;

/// Settings for a [`Trax`](crate::Trax) runtime.
///
/// # Example
///
/// ```
/// use trax_core::TraxConfig;
///
/// let config = TraxConfig::default()
///     .with_max_log_size(-1)
///     .with_log_reads(false);
/// assert_eq!(config.max_log_size, -1);
/// assert!(config.auto_reconciliation);
/// ```
#[derive(Debug, Clone)]
pub struct TraxConfig {
    /// Event buffer bound (`>= 2`, negative = unbounded).
    pub max_log_size: i64,
    /// Log `!GET` events for reads made by processors.
    pub log_reads: bool,
    /// Run `process_changes` before each cycle completes.
    pub auto_reconciliation: bool,
}

impl Default for TraxConfig {
    fn default() -> Self {
        Self {
            max_log_size: DEFAULT_MAX_SIZE,
            log_reads: true,
            auto_reconciliation: true,
        }
    }
}

impl TraxConfig {
    #[must_use]
    pub fn with_max_log_size(mut self, max_log_size: i64) -> Self {
        self.max_log_size = max_log_size;
        self
    }

    #[must_use]
    pub fn with_log_reads(mut self, log_reads: bool) -> Self {
        self.log_reads = log_reads;
        self
    }

    #[must_use]
    pub fn with_auto_reconciliation(mut self, auto_reconciliation: bool) -> Self {
        self.auto_reconciliation = auto_reconciliation;
        self
    }
}

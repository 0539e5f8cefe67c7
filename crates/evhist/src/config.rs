//! Histogram configuration with builder pattern.
//!
//! [`HistogramConfig`] controls how the segment operators of a
//! [`Histogram3D`](crate::Histogram3D) are scheduled. The builder is generated
//! by `bon` and validates at build time.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use evhist::HistogramConfig;
//!
//! // All defaults: 4 threads, 4 segments, 60 s timeout
//! let config = HistogramConfig::builder().build().unwrap();
//! assert_eq!(config.n_segments, 4);
//!
//! let config = HistogramConfig::builder()
//!     .n_threads(1)
//!     .n_segments(8)
//!     .timeout(Duration::from_secs(5))
//!     .build()
//!     .unwrap();
//! assert_eq!(config.n_threads, 1);
//! ```

use std::time::Duration;

use bon::Builder;

use crate::utils::Parallelism;

// =============================================================================
// ConfigError
// =============================================================================

/// Errors that can occur during configuration validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// At least one segment is required.
    InvalidNSegments,
    /// Timeout must be non-zero.
    InvalidTimeout(Duration),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidNSegments => write!(f, "n_segments must be at least 1"),
            Self::InvalidTimeout(t) => write!(f, "timeout must be non-zero, got {:?}", t),
        }
    }
}

impl std::error::Error for ConfigError {}

// =============================================================================
// HistogramConfig
// =============================================================================

/// Scheduling configuration for histogram segment operators.
///
/// Thread count semantics follow [`Parallelism::from_threads`]:
/// - `0` = all available cores
/// - `1` = run every segment on the calling thread
/// - `n > 1` = a dedicated pool of exactly `n` workers
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HistogramConfig {
    /// Worker pool size. Default: 4.
    #[builder(default = 4)]
    pub n_threads: usize,

    /// Upper bound on the number of page segments. Default: 4.
    ///
    /// The effective count is reduced to the number of pages for thin
    /// histograms.
    #[builder(default = 4)]
    pub n_segments: usize,

    /// Wall-clock limit for one batch of segment operators. Default: 60 s.
    #[builder(default = Duration::from_secs(60))]
    pub timeout: Duration,
}

impl<S: histogram_config_builder::IsComplete> HistogramConfigBuilder<S> {
    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `n_segments == 0` or the timeout is zero.
    pub fn build(self) -> Result<HistogramConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl HistogramConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_segments == 0 {
            return Err(ConfigError::InvalidNSegments);
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(self.timeout));
        }
        Ok(())
    }

    /// Parallelism implied by `n_threads`.
    #[inline]
    pub fn parallelism(&self) -> Parallelism {
        Parallelism::from_threads(self.n_threads)
    }

    /// Single worker, single segment. Useful as a reference for determinism checks.
    pub fn sequential() -> Self {
        Self {
            n_threads: 1,
            n_segments: 1,
            ..Self::default()
        }
    }
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            n_threads: 4,
            n_segments: 4,
            timeout: Duration::from_secs(60),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

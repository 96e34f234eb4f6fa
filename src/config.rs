//! engine tuning knobs
//!
//! the cutover points between algorithms are heuristics; they live here so
//! they can be tuned with `benchmark` instead of being baked into the compiler

use thiserror::Error;

/// errors from [`EngineConfig::validate()`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("hash_set_threshold must be greater than zero")]
    ZeroHashSetThreshold,

    #[error("bit_vector_filter_threshold must be at least 2")]
    BitVectorThresholdTooSmall,
}

/// configuration shared by the compiler and the interpreter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// minimum expected row count before an integer sort key uses radix sort
    pub radix_sort_threshold: usize,

    /// operand sets with at least this many values are probed through a hash
    /// set instead of binary search
    pub hash_set_threshold: usize,

    /// number of scan filters over a contiguous range at which the compiler
    /// evaluates them into bit vectors and ANDs them word by word
    pub bit_vector_filter_threshold: usize,

    /// index slabs kept by the interpreter's buffer pool between executions
    pub buffer_pool_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            radix_sort_threshold: 4096,
            hash_set_threshold: 16,
            bit_vector_filter_threshold: 3,
            buffer_pool_capacity: 32,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_radix_sort_threshold(mut self, rows: usize) -> Self {
        self.radix_sort_threshold = rows;
        self
    }

    #[must_use]
    pub fn with_hash_set_threshold(mut self, values: usize) -> Self {
        self.hash_set_threshold = values;
        self
    }

    #[must_use]
    pub fn with_bit_vector_filter_threshold(mut self, filters: usize) -> Self {
        self.bit_vector_filter_threshold = filters;
        self
    }

    #[must_use]
    pub fn with_buffer_pool_capacity(mut self, slabs: usize) -> Self {
        self.buffer_pool_capacity = slabs;
        self
    }

    /// never pick bit vectors for range filtering
    #[must_use]
    pub fn without_bit_vector_filters(mut self) -> Self {
        self.bit_vector_filter_threshold = usize::MAX;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hash_set_threshold == 0 {
            return Err(ConfigError::ZeroHashSetThreshold);
        }
        if self.bit_vector_filter_threshold < 2 {
            return Err(ConfigError::BitVectorThresholdTooSmall);
        }
        Ok(())
    }
}

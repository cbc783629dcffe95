//! Client limits and timing bounds.
//!
//! Every cache and timeout used on the routing path has an explicit bound.

/// Client-side limits for Kestrel routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    // Key limits.
    /// Maximum size of a routing key in bytes.
    pub max_key_bytes: u32,

    // Cache limits.
    /// Maximum number of cached range locations.
    pub max_range_cache_entries: u32,

    // Timeouts (in microseconds).
    /// Deadline for one fan-out attempt.
    pub rpc_timeout_us: u64,
    /// Delay before a further replica is tried while earlier ones are silent.
    pub send_next_timeout_us: u64,
    /// First retry backoff.
    pub retry_backoff_us: u64,
    /// Retry backoff ceiling.
    pub max_retry_backoff_us: u64,
}

impl Limits {
    /// Creates limits with safe defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            // Keys: 4KB.
            max_key_bytes: 4096,

            // Cache: 64k ranges.
            max_range_cache_entries: 65_536,

            // Timeouts: 15s per attempt, next replica after 1s,
            // backoff 1s doubling up to 30s.
            rpc_timeout_us: 15 * 1_000_000,
            send_next_timeout_us: 1_000_000,
            retry_backoff_us: 1_000_000,
            max_retry_backoff_us: 30 * 1_000_000,
        }
    }

    /// Validates that all limits are internally consistent.
    ///
    /// # Errors
    /// Returns an error if any limits are invalid or inconsistent.
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_key_bytes == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "max_key_bytes",
                reason: "must be positive",
            });
        }

        if self.max_range_cache_entries == 0 {
            return Err(crate::Error::InvalidArgument {
                name: "max_range_cache_entries",
                reason: "must be positive",
            });
        }

        // The next replica must be tried before the attempt gives up.
        if self.send_next_timeout_us > self.rpc_timeout_us {
            return Err(crate::Error::InvalidArgument {
                name: "send_next_timeout_us",
                reason: "must be <= rpc_timeout_us",
            });
        }

        if self.max_retry_backoff_us < self.retry_backoff_us {
            return Err(crate::Error::InvalidArgument {
                name: "max_retry_backoff_us",
                reason: "must be >= retry_backoff_us",
            });
        }

        Ok(())
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::new()
    }
}

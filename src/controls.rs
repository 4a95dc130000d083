//! Ingestion throttle and retry controls shared across pipeline stages.

use std::time::Duration;

/// Attempt budget and backoff schedule applied to each external service call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    rate_limit_unit: Duration,
    transient_backoff: Duration,
}

impl RetryPolicy {
    /// Largest exponent applied to the rate-limit backoff unit.
    const MAX_BACKOFF_EXPONENT: u32 = 16;

    /// Constructs a new retry policy.
    pub fn new(max_attempts: u32, rate_limit_unit: Duration, transient_backoff: Duration) -> Self {
        Self {
            max_attempts,
            rate_limit_unit,
            transient_backoff,
        }
    }

    /// Maximum number of attempts per item, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff before retrying after upstream rate limiting: `2^attempts`
    /// times the base unit, where `attempts` counts the failures so far.
    pub fn rate_limit_backoff(&self, attempts: u32) -> Duration {
        let capped = attempts.min(Self::MAX_BACKOFF_EXPONENT);
        self.rate_limit_unit * (1u32 << capped)
    }

    /// Fixed backoff before retrying after any other transient failure.
    pub fn transient_backoff(&self) -> Duration {
        self.transient_backoff
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            rate_limit_unit: Duration::from_secs(30),
            transient_backoff: Duration::from_secs(10),
        }
    }
}

/// Tunable knobs that pace the ingestion pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IngestControls {
    retry: RetryPolicy,
    simple_pacing: Duration,
    complex_pacing: Duration,
    jitter_floor_ms: u64,
    jitter_ceiling_ms: u64,
    min_stage_duration: Duration,
    persist_delay: Duration,
    fetch_concurrency: usize,
}

impl IngestControls {
    /// Retry policy applied to summarization and embedding calls.
    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Pacing delay after successfully summarizing an ordinary file.
    pub fn simple_pacing(&self) -> Duration {
        self.simple_pacing
    }

    /// Pacing delay after successfully summarizing a complex file.
    pub fn complex_pacing(&self) -> Duration {
        self.complex_pacing
    }

    /// Inclusive lower bound of the post-embedding jitter, in milliseconds.
    pub fn jitter_floor_ms(&self) -> u64 {
        self.jitter_floor_ms
    }

    /// Exclusive upper bound of the post-embedding jitter, in milliseconds.
    pub fn jitter_ceiling_ms(&self) -> u64 {
        self.jitter_ceiling_ms
    }

    /// Minimum wall-clock duration of the summarization stage.
    pub fn min_stage_duration(&self) -> Duration {
        self.min_stage_duration
    }

    /// Delay after every persistence attempt, success or failure.
    pub fn persist_delay(&self) -> Duration {
        self.persist_delay
    }

    /// Maximum concurrent content fetches inside the document loader.
    pub fn fetch_concurrency(&self) -> usize {
        self.fetch_concurrency
    }
}

impl Default for IngestControls {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            simple_pacing: Duration::from_secs(2),
            complex_pacing: Duration::from_secs(4),
            jitter_floor_ms: 2000,
            jitter_ceiling_ms: 4000,
            min_stage_duration: Duration::from_secs(10),
            persist_delay: Duration::from_secs(1),
            fetch_concurrency: 2,
        }
    }
}

use crate::journal::DurabilityMode;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Engine configuration
///
/// Controls durability of the command journal and the timing knobs of the
/// step execution loop. Timing values affect responsiveness only;
/// correctness never depends on them.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding the journal WAL and snapshot files
    pub data_dir: PathBuf,

    /// Journal durability mode
    pub durability: DurabilityMode,

    /// Suspension interval between remote status polls
    pub poll_interval: Duration,

    /// A step with no status update within this bound is treated as
    /// failed for retry-policy purposes
    pub step_timeout: Duration,

    /// How many times a failed step is retried before the failure is fatal.
    /// Each retry creates a fresh task handle at the same step index.
    pub retry_budget: u32,

    /// Journal entries between snapshot checkpoints
    pub checkpoint_threshold: usize,
}

impl EngineConfig {
    /// Create a configuration with defaults, journaling under `data_dir`
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            durability: DurabilityMode::Async,
            poll_interval: Duration::from_millis(250),
            step_timeout: Duration::from_secs(300),
            retry_budget: 1,
            checkpoint_threshold: 1000,
        }
    }

    /// Set the journal durability mode
    pub fn durability(mut self, durability: DurabilityMode) -> Self {
        self.durability = durability;
        self
    }

    /// Set the poll interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the step timeout
    pub fn step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Set the retry budget for failed steps
    pub fn retry_budget(mut self, retries: u32) -> Self {
        self.retry_budget = retries;
        self
    }

    /// Set the checkpoint threshold
    pub fn checkpoint_threshold(mut self, threshold: usize) -> Self {
        self.checkpoint_threshold = threshold;
        self
    }
}

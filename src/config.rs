// Global configuration constants - single source of truth

pub struct Config;

impl Config {
    // Adaptive delay policy
    pub const MIN_DELAY_SECS: u64 = 5;
    pub const MAX_DELAY_SECS: u64 = 10;
    pub const DIRECT_SEARCH_DELAY_SECS: u64 = 3; // Argos' own search tolerates a tighter cadence
    pub const BLOCK_COOLDOWN_SECS: u64 = 1800;
    pub const MAX_BACKOFF_SECS: u64 = 300;
    pub const SEARCH_JITTER_SECS: u64 = 5;
    pub const DIRECT_JITTER_SECS: u64 = 2;

    // Page fetch retry
    pub const FETCH_ATTEMPTS: u32 = 1;
    pub const RETRY_DELAY_SECS: u64 = 30;

    // Search settings
    pub const SEARCH_TIMEOUT_SECS: u64 = 20;
    pub const SEARCH_RESULT_LIMIT: usize = 3;

    // HTTP request settings
    pub const REQUEST_TIMEOUT_SECS: u64 = 15;
    pub const EXISTENCE_CHECK_TIMEOUT_SECS: u64 = 10;

    // Batch driver
    pub const SAVE_EVERY: usize = 5;
    pub const MAX_CONSECUTIVE_FAILURES: u32 = 10;
    pub const RESUME_LATER_THRESHOLD_SECS: u64 = 300;
}

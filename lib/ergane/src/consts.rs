use std::time::Duration;

/// Maximum time a fetch waits for new jobs before returning an empty batch
pub const BLOCK_TIME: Duration = Duration::from_secs(2);
pub const KEEP_COMPLETED: usize = 100;
pub const KEEP_FAILED: usize = 500;
pub const LEASE_DURATION: Duration = Duration::from_secs(30);
pub const MAX_ATTEMPTS: u32 = 3;
pub const MIN_BACKOFF_DURATION: Duration = Duration::from_secs(5);

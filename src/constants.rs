/// Default page size for kanji listings
pub const DEFAULT_PAGE_SIZE: usize = 30;

/// Upper bound for any listing page
pub const MAX_PAGE_SIZE: usize = 200;

/// Upper bound on units moved in one request
pub const MAX_MOVE_BATCH: usize = 500;

/// Upper bound on annotated or plain text accepted by the API, in chars
pub const MAX_TEXT_CHARS: usize = 2_000;

/// Cron expression for the daily schedule rollover (sec min hour dom mon dow), UTC
pub const SCHEDULE_ROLLOVER_CRON: &str = "5 0 0 * * *";

/// Timeout for one worker job run, in seconds
pub const WORKER_JOB_TIMEOUT_SECS: u64 = 60;

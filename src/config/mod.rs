pub mod settings;

pub use settings::{
    CacheSettings, DEFAULT_BULK_MAX_AGE_SECS, DEFAULT_LOCK_POLL_MS, DEFAULT_LOCK_TIMEOUT_SECS,
};

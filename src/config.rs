use log::warn;

pub const DEFAULT_PAGE_SIZE: usize = 4096;
const DEFAULT_NUM_PAGES: usize = 50;
const DEFAULT_SHARED_LOCK_TIMEOUT_MS: u64 = 100;
const DEFAULT_EXCLUSIVE_LOCK_TIMEOUT_MS: u64 = 1000;

/// Tunables recognized by the storage core. Construct with `default()` or
/// `from_env()`; a malformed environment value is logged and ignored rather
/// than panicking the process.
#[derive(Debug, Clone, Copy)]
pub struct DbConfig {
    pub num_pages: usize,
    pub page_size: usize,
    pub shared_lock_timeout_ms: u64,
    pub exclusive_lock_timeout_ms: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        DbConfig {
            num_pages: DEFAULT_NUM_PAGES,
            page_size: DEFAULT_PAGE_SIZE,
            shared_lock_timeout_ms: DEFAULT_SHARED_LOCK_TIMEOUT_MS,
            exclusive_lock_timeout_ms: DEFAULT_EXCLUSIVE_LOCK_TIMEOUT_MS,
        }
    }
}

impl DbConfig {
    pub fn from_env() -> Self {
        let mut config = DbConfig::default();

        overlay(&mut config.num_pages, "SMALL_DB_NUM_PAGES");
        overlay(&mut config.page_size, "SMALL_DB_PAGE_SIZE");
        overlay(&mut config.shared_lock_timeout_ms, "SMALL_DB_SHARED_LOCK_TIMEOUT_MS");
        overlay(
            &mut config.exclusive_lock_timeout_ms,
            "SMALL_DB_EXCLUSIVE_LOCK_TIMEOUT_MS",
        );

        config
    }
}

fn overlay<T: std::str::FromStr>(slot: &mut T, var: &str) {
    if let Ok(raw) = std::env::var(var) {
        match raw.parse::<T>() {
            Ok(v) => *slot = v,
            Err(_) => warn!("ignoring malformed {}={:?}", var, raw),
        }
    }
}

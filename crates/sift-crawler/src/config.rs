use std::cmp;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sift_frontier::SelectionMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlerConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Worker threads, each processing one claimed URL at a time.
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,

    /// Upper bound per claim call; the store may return fewer rows.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,

    /// Links discovered at a depth beyond this are not queued.
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,

    /// Failures beyond this count make a record terminally failed.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_selection")]
    pub selection: SelectionMode,

    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Size of the render-handle pool, when rendering is wired in.
    #[serde(default = "default_max_drivers")]
    pub max_drivers: usize,

    #[serde(default = "default_driver_checkout_secs")]
    pub driver_checkout_secs: u64,

    #[serde(default = "default_reclaim_interval_secs")]
    pub reclaim_interval_secs: u64,

    /// How long the dispatcher sleeps when the frontier has no eligible
    /// rows but work is still in flight.
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,

    /// Initial backoff after a store error; doubles up to a fixed cap.
    #[serde(default = "default_store_backoff_ms")]
    pub store_backoff_ms: u64,

    #[serde(default = "default_handle_sigint")]
    pub handle_sigint: bool,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            num_workers: default_num_workers(),
            batch_size: default_batch_size(),
            lease_secs: default_lease_secs(),
            max_depth: default_max_depth(),
            max_retries: default_max_retries(),
            selection: default_selection(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_drivers: default_max_drivers(),
            driver_checkout_secs: default_driver_checkout_secs(),
            reclaim_interval_secs: default_reclaim_interval_secs(),
            idle_poll_ms: default_idle_poll_ms(),
            store_backoff_ms: default_store_backoff_ms(),
            handle_sigint: default_handle_sigint(),
        }
    }
}

impl CrawlerConfig {
    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn driver_checkout_timeout(&self) -> Duration {
        Duration::from_secs(self.driver_checkout_secs)
    }

    pub fn reclaim_interval(&self) -> Duration {
        Duration::from_secs(self.reclaim_interval_secs)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn store_backoff(&self) -> Duration {
        Duration::from_millis(self.store_backoff_ms)
    }
}

fn default_user_agent() -> String {
    String::from("siftbot")
}

fn default_num_workers() -> usize {
    cmp::max(1, cmp::min(num_cpus::get(), 4))
}

fn default_batch_size() -> usize {
    16
}

fn default_lease_secs() -> u64 {
    300
}

fn default_max_depth() -> u32 {
    2
}

fn default_max_retries() -> u32 {
    3
}

fn default_selection() -> SelectionMode {
    SelectionMode::Deterministic
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_max_drivers() -> usize {
    2
}

fn default_driver_checkout_secs() -> u64 {
    10
}

fn default_reclaim_interval_secs() -> u64 {
    60
}

fn default_idle_poll_ms() -> u64 {
    500
}

fn default_store_backoff_ms() -> u64 {
    500
}

fn default_handle_sigint() -> bool {
    true
}

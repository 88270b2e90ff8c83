use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the student_records module
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StudentRecordsConfig {
    /// Days a soft-deleted record is kept before the purge cycle removes it.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_purge_interval", with = "humantime_serde")]
    pub purge_interval: Duration,
    #[serde(default = "default_true")]
    pub scheduler_enabled: bool,
    #[serde(default = "default_deleted_listing_limit")]
    pub deleted_listing_limit: u64,
    #[serde(default = "default_stop_timeout", with = "humantime_serde")]
    pub scheduler_stop_timeout: Duration,
}

impl Default for StudentRecordsConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
            purge_interval: default_purge_interval(),
            scheduler_enabled: default_true(),
            deleted_listing_limit: default_deleted_listing_limit(),
            scheduler_stop_timeout: default_stop_timeout(),
        }
    }
}

impl StudentRecordsConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.retention_days == 0 {
            anyhow::bail!("student_records.retention_days must be at least 1");
        }
        if self.purge_interval.is_zero() {
            anyhow::bail!("student_records.purge_interval must be greater than zero");
        }
        if self.deleted_listing_limit == 0 {
            anyhow::bail!("student_records.deleted_listing_limit must be at least 1");
        }
        Ok(())
    }
}

fn default_retention_days() -> u32 {
    30
}

fn default_purge_interval() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_true() -> bool {
    true
}

fn default_deleted_listing_limit() -> u64 {
    10_000
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(30)
}

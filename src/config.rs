//! Service configuration: documented defaults, environment overrides, clamps.

use log::warn;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Concurrent job-steps across the queue (workers x concurrency 1).
    pub queue_concurrency: usize,
    /// Hard cap on `layout.totalPages` at enqueue time.
    pub max_pages: u32,
    /// Hard cap on any series' arithmetic end value.
    pub max_series_end: i64,
    /// Pages per batch child.
    pub batch_size: u32,
    /// Attempts per batch child.
    pub batch_attempts: u32,
    /// Base delay of the exponential retry backoff.
    pub backoff_base: Duration,
    /// Per-document render lock TTL; must exceed the worst-case job.
    pub render_lock_ttl: Duration,
    /// Global active-job cap; 0 disables the cap.
    pub max_active_jobs: i64,
    /// Merge wall-clock budget; `None` disables the deadline.
    pub merge_max: Option<Duration>,
    /// Lifetime of final artifacts and their signed URLs.
    pub final_pdf_ttl: Duration,
    /// RUNNING jobs idle this long are reaped.
    pub stale_after: Duration,
    /// Reaper sweep interval.
    pub cleanup_interval: Duration,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            queue_concurrency: num_cpus::get().max(1),
            max_pages: 700,
            max_series_end: 1_000_000_000,
            batch_size: 10,
            batch_attempts: 3,
            backoff_base: Duration::from_secs(2),
            render_lock_ttl: Duration::from_secs(1800),
            max_active_jobs: 0,
            merge_max: None,
            final_pdf_ttl: Duration::from_secs(24 * 60 * 60),
            stale_after: Duration::from_millis(15 * 60 * 1000),
            cleanup_interval: Duration::from_millis(5 * 60 * 1000),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    match std::env::var(name) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("ignoring unparsable {name}={raw}");
                None
            }
        },
        Err(_) => None,
    }
}

impl RenderConfig {
    /// Defaults overridden by the well-known environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = env_parse::<usize>("VECTOR_QUEUE_CONCURRENCY") {
            config.queue_concurrency = v;
        }
        if let Some(v) = env_parse::<u32>("VECTOR_MAX_PAGES") {
            config.max_pages = v;
        }
        if let Some(v) = env_parse::<i64>("VECTOR_MAX_SERIES_END") {
            config.max_series_end = v;
        }
        if let Some(v) = env_parse::<u32>("VECTOR_BATCH_SIZE") {
            config.batch_size = v;
        }
        if let Some(v) = env_parse::<u32>("VECTOR_BATCH_ATTEMPTS") {
            config.batch_attempts = v;
        }
        if let Some(v) = env_parse::<u64>("VECTOR_RENDER_LOCK_TTL_SECONDS") {
            config.render_lock_ttl = Duration::from_secs(v);
        }
        if let Some(v) = env_parse::<i64>("VECTOR_MAX_ACTIVE_JOBS") {
            config.max_active_jobs = v;
        }
        if let Some(v) = env_parse::<u64>("VECTOR_MERGE_MAX_MS") {
            config.merge_max = (v > 0).then(|| Duration::from_millis(v));
        }
        if let Some(v) = env_parse::<u64>("FINAL_PDF_TTL_HOURS") {
            config.final_pdf_ttl = Duration::from_secs(v * 60 * 60);
        }
        if let Some(v) = env_parse::<u64>("PRINT_JOB_STALE_MS") {
            config.stale_after = Duration::from_millis(v);
        }
        if let Some(v) = env_parse::<u64>("JOB_CLEANUP_INTERVAL_MS") {
            config.cleanup_interval = Duration::from_millis(v);
        }
        config.normalized()
    }

    /// Applies the documented clamps: batch size capped at 50, lock TTL at
    /// least a minute, sane minimums everywhere.
    pub fn normalized(mut self) -> Self {
        if self.batch_size == 0 {
            self.batch_size = 1;
        }
        if self.batch_size > 50 {
            warn!("VECTOR_BATCH_SIZE {} capped to 50", self.batch_size);
            self.batch_size = 50;
        }
        if self.render_lock_ttl < Duration::from_secs(60) {
            warn!(
                "render lock TTL {:?} raised to the 60 s minimum",
                self.render_lock_ttl
            );
            self.render_lock_ttl = Duration::from_secs(60);
        }
        if self.batch_attempts == 0 {
            self.batch_attempts = 1;
        }
        if self.queue_concurrency == 0 {
            self.queue_concurrency = 1;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_knobs() {
        let config = RenderConfig::default();
        assert_eq!(config.max_pages, 700);
        assert_eq!(config.max_series_end, 1_000_000_000);
        assert_eq!(config.batch_attempts, 3);
        assert_eq!(config.backoff_base, Duration::from_secs(2));
        assert_eq!(config.render_lock_ttl, Duration::from_secs(1800));
        assert_eq!(config.max_active_jobs, 0);
        assert_eq!(config.merge_max, None);
        assert_eq!(config.final_pdf_ttl, Duration::from_secs(86_400));
        assert_eq!(config.stale_after, Duration::from_millis(900_000));
        assert_eq!(config.cleanup_interval, Duration::from_millis(300_000));
    }

    #[test]
    fn normalization_applies_caps_and_floors() {
        let config = RenderConfig {
            batch_size: 80,
            render_lock_ttl: Duration::from_secs(5),
            batch_attempts: 0,
            ..RenderConfig::default()
        }
        .normalized();
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.render_lock_ttl, Duration::from_secs(60));
        assert_eq!(config.batch_attempts, 1);
    }
}

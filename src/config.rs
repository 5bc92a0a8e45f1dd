use crate::adapters::outbound::RetryPolicy;
use crate::application::OrchestratorConfig;
use crate::domain::entities::MAX_CONSECUTIVE_FAILURES;
use crate::infrastructure::WatcherConfig;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    // Providers
    pub provider: String,
    pub http_deadline_secs: u64,
    pub http_retries: u32,
    pub backoff_ms: u64,

    // Refresh scheduling
    pub refresh_secs: u64,
    pub debounce_ms: u64,
    pub failure_threshold: u32,

    // Network change detection
    pub native_watch: bool,
    pub probe_addr: String,
    pub probe_interval_secs: u64,
    pub probe_timeout_secs: u64,

    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: "FreeIPAPI".to_string(),
            http_deadline_secs: 10,
            http_retries: 3,
            backoff_ms: 1000,
            refresh_secs: 15,
            debounce_ms: 2000,
            failure_threshold: 3,
            native_watch: true,
            probe_addr: "8.8.8.8:53".to_string(),
            probe_interval_secs: 15,
            probe_timeout_secs: 3,
            debug: false,
        }
    }
}

impl Config {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.http_retries,
            backoff_base: Duration::from_millis(self.backoff_ms),
            jitter: true,
            deadline: Duration::from_secs(self.http_deadline_secs),
        }
    }

    /// Cadence of the periodic refresh timer (zero disables it).
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_secs)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            debounce_window: Duration::from_millis(self.debounce_ms),
            failure_threshold: self.failure_threshold.clamp(1, MAX_CONSECUTIVE_FAILURES),
            ..Default::default()
        }
    }

    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            use_native: self.native_watch,
            probe_addr: self.probe_addr.clone(),
            probe_interval: Duration::from_secs(self.probe_interval_secs),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            ..Default::default()
        }
    }
}

fn env_number<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(default)
}

pub fn load_config() -> anyhow::Result<Config> {
    let defaults = Config::default();

    let provider = std::env::var("IPWIDGET_PROVIDER").unwrap_or(defaults.provider);

    let http_deadline_secs = env_number("IPWIDGET_HTTP_DEADLINE_SECS", defaults.http_deadline_secs);
    let http_retries = env_number("IPWIDGET_HTTP_RETRIES", defaults.http_retries);
    let backoff_ms = env_number("IPWIDGET_BACKOFF_MS", defaults.backoff_ms);

    let refresh_secs = env_number("IPWIDGET_REFRESH_SECS", defaults.refresh_secs);
    let debounce_ms = env_number("IPWIDGET_DEBOUNCE_MS", defaults.debounce_ms);
    let failure_threshold = env_number("IPWIDGET_FAILURE_THRESHOLD", defaults.failure_threshold);

    let native_watch = env_flag("IPWIDGET_NATIVE_WATCH", defaults.native_watch);
    let probe_addr = std::env::var("IPWIDGET_PROBE_ADDR").unwrap_or(defaults.probe_addr);
    let probe_interval_secs =
        env_number("IPWIDGET_PROBE_INTERVAL_SECS", defaults.probe_interval_secs);
    let probe_timeout_secs = env_number("IPWIDGET_PROBE_TIMEOUT_SECS", defaults.probe_timeout_secs);

    let debug = std::env::var("DEBUG").is_ok();

    if http_deadline_secs == 0 {
        anyhow::bail!("IPWIDGET_HTTP_DEADLINE_SECS must be greater than zero");
    }

    Ok(Config {
        provider,
        http_deadline_secs,
        http_retries,
        backoff_ms,
        refresh_secs,
        debounce_ms,
        failure_threshold,
        native_watch,
        probe_addr,
        probe_interval_secs,
        probe_timeout_secs,
        debug,
    })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    // Environment variables are process-wide; keep every env-touching
    // assertion in one test so parallel tests cannot interfere.
    #[test]
    fn test_load_config_from_env() {
        for key in [
            "IPWIDGET_PROVIDER",
            "IPWIDGET_REFRESH_SECS",
            "IPWIDGET_HTTP_RETRIES",
            "IPWIDGET_NATIVE_WATCH",
            "IPWIDGET_PROBE_ADDR",
            "IPWIDGET_DEBOUNCE_MS",
            "IPWIDGET_HTTP_DEADLINE_SECS",
        ] {
            std::env::remove_var(key);
        }

        let cfg = load_config().unwrap();
        assert_eq!(cfg.provider, "FreeIPAPI");
        assert_eq!(cfg.refresh_secs, 15);
        assert_eq!(cfg.http_retries, 3);
        assert!(cfg.native_watch);

        std::env::set_var("IPWIDGET_PROVIDER", "IP2Location");
        std::env::set_var("IPWIDGET_REFRESH_SECS", "60");
        std::env::set_var("IPWIDGET_NATIVE_WATCH", "false");
        std::env::set_var("IPWIDGET_PROBE_ADDR", "1.1.1.1:443");
        std::env::set_var("IPWIDGET_DEBOUNCE_MS", "not_a_number");
        let cfg = load_config().unwrap();
        assert_eq!(cfg.provider, "IP2Location");
        assert_eq!(cfg.refresh_secs, 60);
        assert!(!cfg.native_watch);
        assert_eq!(cfg.probe_addr, "1.1.1.1:443");
        assert_eq!(cfg.debounce_ms, 2000); // default

        std::env::set_var("IPWIDGET_HTTP_DEADLINE_SECS", "0");
        assert!(load_config().is_err());

        for key in [
            "IPWIDGET_PROVIDER",
            "IPWIDGET_REFRESH_SECS",
            "IPWIDGET_NATIVE_WATCH",
            "IPWIDGET_PROBE_ADDR",
            "IPWIDGET_DEBOUNCE_MS",
            "IPWIDGET_HTTP_DEADLINE_SECS",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.provider, "FreeIPAPI");
        assert_eq!(cfg.failure_threshold, 3);
        assert_eq!(cfg.probe_addr, "8.8.8.8:53");
        assert!(!cfg.debug);
    }

    #[test]
    fn test_derived_configs() {
        let cfg = Config::default();

        let policy = cfg.retry_policy();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.backoff_base, Duration::from_secs(1));
        assert_eq!(policy.deadline, Duration::from_secs(10));

        assert_eq!(cfg.refresh_interval(), Duration::from_secs(15));

        let orch = cfg.orchestrator_config();
        assert_eq!(orch.debounce_window, Duration::from_secs(2));

        let watcher = cfg.watcher_config();
        assert!(watcher.use_native);
        assert_eq!(watcher.probe_interval, Duration::from_secs(15));
        assert_eq!(watcher.probe_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_failure_threshold_at_least_one() {
        let cfg = Config {
            failure_threshold: 0,
            ..Default::default()
        };
        assert_eq!(cfg.orchestrator_config().failure_threshold, 1);
    }

    #[test]
    fn test_failure_threshold_capped() {
        let cfg = Config {
            failure_threshold: 25,
            ..Default::default()
        };
        assert_eq!(
            cfg.orchestrator_config().failure_threshold,
            MAX_CONSECUTIVE_FAILURES
        );
    }
}

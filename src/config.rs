use crate::error::Error;
use crate::prelude::*;

use serde::Deserialize;
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use std::time::Duration;

#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub inverter: Inverter,

    #[serde(default = "Config::default_loglevel")]
    pub loglevel: String,

    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "Config::default_poll_interval")]
    pub poll_interval: Duration,

    #[serde(default = "Config::default_offline_threshold")]
    pub offline_threshold: u32,

    #[serde(default)]
    pub scheduler: Scheduler,

    /// Optional path to append published readings to, one JSON object per line
    pub datalog_file: Option<String>,
}

// Inverter {{{
#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct Inverter {
    pub host: String,
    pub port: u16,

    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "read_timeout_ms", default = "Config::default_read_timeout")]
    pub read_timeout: Duration,

    #[serde(default)]
    pub mock: bool,
}
impl Inverter {
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn mock(&self) -> bool {
        self.mock
    }
} // }}}

// Scheduler {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Scheduler {
    #[serde(default = "Config::default_enabled")]
    pub enabled: bool,

    #[serde(default = "Config::default_daily_reset_cron")]
    pub daily_reset_cron: String,

    #[serde(default = "Config::default_daily_reset")]
    pub daily_reset: Vec<Field>,
}
impl Default for Scheduler {
    fn default() -> Self {
        Self {
            enabled: Config::default_enabled(),
            daily_reset_cron: Config::default_daily_reset_cron(),
            daily_reset: Config::default_daily_reset(),
        }
    }
}
impl Scheduler {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn daily_reset_cron(&self) -> &str {
        &self.daily_reset_cron
    }

    pub fn daily_reset(&self) -> &[Field] {
        &self.daily_reset
    }
} // }}}

impl Config {
    pub fn new(file: String) -> Result<Self> {
        let content = std::fs::read_to_string(&file)
            .map_err(|err| anyhow!("error reading {}: {}", file, err))?;

        Ok(Self::from_yaml(&content)?)
    }

    pub fn from_yaml(content: &str) -> Result<Self, Error> {
        let config: Self =
            serde_yaml::from_str(content).map_err(|e| Error::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn inverter(&self) -> &Inverter {
        &self.inverter
    }

    pub fn loglevel(&self) -> &str {
        &self.loglevel
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn offline_threshold(&self) -> u32 {
        self.offline_threshold
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn datalog_file(&self) -> Option<&str> {
        self.datalog_file.as_deref()
    }

    /// Logging isn't set up until the config is read, so this runs afterwards.
    pub fn log_summary(&self) {
        info!("Configuration loaded successfully:");
        info!("  Inverter:");
        info!("    Host: {}", self.inverter.host);
        info!("    Port: {}", self.inverter.port);
        info!("    Read Timeout: {}ms", self.inverter.read_timeout.as_millis());
        info!("    Mock: {}", self.inverter.mock);
        info!("  Poll Interval: {}s", self.poll_interval.as_secs());
        info!("  Offline Threshold: {}", self.offline_threshold);
        info!(
            "  Scheduler: {}",
            if self.scheduler.enabled { "enabled" } else { "disabled" }
        );
        if self.scheduler.enabled {
            info!("    Daily Reset Cron: {}", self.scheduler.daily_reset_cron);
            info!(
                "    Daily Reset Fields: {}",
                self.scheduler
                    .daily_reset
                    .iter()
                    .map(Field::name)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        info!(
            "  Datalog File: {}",
            self.datalog_file.as_deref().unwrap_or("none")
        );
        info!("  Log Level: {}", self.loglevel);
    }

    fn validate(&self) -> Result<(), Error> {
        if self.inverter.host.trim().is_empty() {
            return Err(Error::Configuration("inverter.host cannot be empty".to_string()));
        }
        if self.inverter.port == 0 {
            return Err(Error::Configuration(
                "inverter.port must be between 1 and 65535".to_string(),
            ));
        }
        if self.inverter.read_timeout.is_zero() {
            return Err(Error::Configuration(
                "inverter.read_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::Configuration(
                "poll_interval must be greater than 0".to_string(),
            ));
        }
        if self.offline_threshold == 0 {
            return Err(Error::Configuration(
                "offline_threshold must be at least 1".to_string(),
            ));
        }

        if self.scheduler.enabled {
            let cron = &self.scheduler.daily_reset_cron;
            cron_parser::parse(cron, &chrono::Utc::now()).map_err(|e| {
                Error::Configuration(format!("invalid daily_reset_cron {:?}: {:?}", cron, e))
            })?;

            if self.scheduler.daily_reset.contains(&Field::WorkMode) {
                return Err(Error::Configuration(
                    "work_mode cannot be reset".to_string(),
                ));
            }
        }

        Ok(())
    }

    fn default_loglevel() -> String {
        "info".to_string()
    }

    fn default_poll_interval() -> Duration {
        Duration::from_secs(10)
    }

    fn default_read_timeout() -> Duration {
        Duration::from_millis(1000)
    }

    fn default_offline_threshold() -> u32 {
        3
    }

    fn default_enabled() -> bool {
        true
    }

    fn default_daily_reset_cron() -> String {
        "0 0 * * *".to_string()
    }

    fn default_daily_reset() -> Vec<Field> {
        vec![Field::EToday]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults() -> Result<()> {
        let config = Config::from_yaml("inverter:\n  host: 192.168.1.50\n  port: 8899\n")?;

        assert_eq!(config.inverter().host(), "192.168.1.50");
        assert_eq!(config.inverter().port(), 8899);
        assert_eq!(config.inverter().read_timeout(), Duration::from_millis(1000));
        assert!(!config.inverter().mock());
        assert_eq!(config.loglevel(), "info");
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.offline_threshold(), 3);
        assert!(config.scheduler().enabled());
        assert_eq!(config.scheduler().daily_reset_cron(), "0 0 * * *");
        assert_eq!(config.scheduler().daily_reset(), &[Field::EToday]);
        assert_eq!(config.datalog_file(), None);

        Ok(())
    }

    #[test]
    fn reads_file() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(
            file,
            r#"
loglevel: debug
inverter:
  host: inverter.local
  port: 8899
  read_timeout_ms: 250
  mock: true
poll_interval: 30
offline_threshold: 5
scheduler:
  daily_reset_cron: "30 23 * * *"
  daily_reset: [e_today, pac]
datalog_file: /tmp/aa55.jsonl
"#
        )?;

        let config = Config::new(file.path().to_string_lossy().to_string())?;

        assert_eq!(config.loglevel(), "debug");
        assert_eq!(config.inverter().read_timeout(), Duration::from_millis(250));
        assert!(config.inverter().mock());
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.offline_threshold(), 5);
        assert_eq!(config.scheduler().daily_reset_cron(), "30 23 * * *");
        assert_eq!(
            config.scheduler().daily_reset(),
            &[Field::EToday, Field::Pac]
        );
        assert_eq!(config.datalog_file(), Some("/tmp/aa55.jsonl"));

        Ok(())
    }

    #[test]
    fn missing_file() {
        assert!(Config::new("/nonexistent/aa55.yaml".to_string()).is_err());
    }

    fn rejected(yaml: &str) -> bool {
        matches!(Config::from_yaml(yaml), Err(Error::Configuration(_)))
    }

    #[test]
    fn invalid_values() {
        assert!(rejected("inverter:\n  host: ''\n  port: 8899\n"));
        assert!(rejected("inverter:\n  host: inverter.local\n  port: 0\n"));
        assert!(rejected("inverter:\n  host: inverter.local\n  port: 70000\n"));
        assert!(rejected("inverter:\n  port: 8899\n"));
        assert!(rejected(
            "inverter:\n  host: inverter.local\n  port: 8899\n  read_timeout_ms: 0\n"
        ));
        assert!(rejected(
            "inverter:\n  host: inverter.local\n  port: 8899\npoll_interval: 0\n"
        ));
        assert!(rejected(
            "inverter:\n  host: inverter.local\n  port: 8899\noffline_threshold: 0\n"
        ));
        assert!(rejected(
            "inverter:\n  host: inverter.local\n  port: 8899\nscheduler:\n  daily_reset_cron: 'not a cron'\n"
        ));
        assert!(rejected(
            "inverter:\n  host: inverter.local\n  port: 8899\nscheduler:\n  daily_reset: [work_mode]\n"
        ));
        assert!(rejected(
            "inverter:\n  host: inverter.local\n  port: 8899\nscheduler:\n  daily_reset: [e_yesterday]\n"
        ));
    }

    #[test]
    fn disabled_scheduler_skips_cron_check() {
        assert!(!rejected(
            "inverter:\n  host: inverter.local\n  port: 8899\nscheduler:\n  enabled: false\n  daily_reset_cron: 'not a cron'\n"
        ));
    }
}

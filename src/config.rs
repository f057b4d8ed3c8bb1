use lazy_static::lazy_static;
use log::warn;
use parking_lot::RwLock;
use std::env;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{HwDecError, Result};

lazy_static! {
    static ref CONFIG: RwLock<Config> = RwLock::new(Config::load());
}

const TEMPLATE: &str = include_str!(concat!(env!("OUT_DIR"), "/config.template.toml"));

/// Environment variables are `HWVDEC_` followed by the upper-cased key.
const ENV_PREFIX: &str = "HWVDEC_";

const CONFIG_PATHS: [&str; 2] = ["./hwvdec.toml", "./config.toml"];

/// Tunables for a decoder session.
///
/// The hardware-specific constants (blocked-write threshold, clock
/// correction threshold) were tuned against real decoder timing; they are
/// kept overridable rather than re-derived.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Root of the kernel control surfaces, normally `/sys/class`.
    pub sysfs_root: PathBuf,
    /// A reset is requested once consecutive blocked writes exceed this.
    pub blocked_write_threshold: u32,
    /// Output clock drift, in seconds, that triggers a clock correction.
    pub clock_correction_threshold: f64,
    /// Sleep after each blocked write.
    pub write_retry_wait: Duration,
    /// Bounded wait for a new picture inside `decode`.
    pub picture_wait: Duration,
    /// Poller sleep when idle or when the control poll times out.
    pub poll_idle_wait: Duration,
    /// Bounded join of the poller thread on close.
    pub poller_join_timeout: Duration,
    /// Below this many buffered seconds `decode` asks for more data right away.
    pub low_water_secs: f64,
    /// Below this many buffered seconds a picture result also asks for more data.
    pub high_water_secs: f64,
    /// Ring buffer capacity assumed until the decoder reports one.
    pub default_vbuf_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sysfs_root: PathBuf::from("/sys/class"),
            blocked_write_threshold: 50,
            clock_correction_threshold: 0.20,
            write_retry_wait: Duration::from_millis(20),
            picture_wait: Duration::from_millis(100),
            poll_idle_wait: Duration::from_millis(10),
            poller_join_timeout: Duration::from_millis(500),
            low_water_secs: 1.0,
            high_water_secs: 2.0,
            default_vbuf_size: 1_000_000,
        }
    }
}

impl Config {
    /// Builds a config from defaults, then the environment, then the first
    /// readable config file. Bad values are logged and skipped.
    pub fn load() -> Self {
        let mut config = Config::default();

        for key in Self::keys() {
            let var = format!("{}{}", ENV_PREFIX, key.to_ascii_uppercase());
            if let Ok(value) = env::var(&var) {
                if let Err(e) = config.set(key, &value) {
                    warn!("ignoring {}={}: {}", var, value, e);
                }
            }
        }

        for path in &CONFIG_PATHS {
            if let Ok(mut file) = File::open(path) {
                let mut content = String::new();
                if file.read_to_string(&mut content).is_ok() {
                    config.apply_file(&content);
                    break;
                }
            }
        }

        config
    }

    /// Applies `key = value` lines. Comments and unknown keys are skipped.
    pub fn apply_file(&mut self, content: &str) {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim().trim_matches('"').trim_matches('\'');
            if !Self::keys().contains(&key) {
                continue;
            }
            if let Err(e) = self.set(key, value) {
                warn!("ignoring config line '{}': {}", line, e);
            }
        }
    }

    /// Sets one key from its textual value.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            "sysfs_root" => self.sysfs_root = PathBuf::from(value),
            "blocked_write_threshold" => self.blocked_write_threshold = value.parse()?,
            "clock_correction_threshold" => self.clock_correction_threshold = value.parse()?,
            "write_retry_wait_ms" => self.write_retry_wait = Duration::from_millis(value.parse()?),
            "picture_wait_ms" => self.picture_wait = Duration::from_millis(value.parse()?),
            "poll_idle_wait_ms" => self.poll_idle_wait = Duration::from_millis(value.parse()?),
            "poller_join_timeout_ms" => {
                self.poller_join_timeout = Duration::from_millis(value.parse()?)
            }
            "low_water_secs" => self.low_water_secs = value.parse()?,
            "high_water_secs" => self.high_water_secs = value.parse()?,
            "default_vbuf_size" => self.default_vbuf_size = value.parse()?,
            other => return Err(HwDecError::InvalidData(format!("unknown config key {}", other))),
        }
        Ok(())
    }

    fn keys() -> [&'static str; 10] {
        [
            "sysfs_root",
            "blocked_write_threshold",
            "clock_correction_threshold",
            "write_retry_wait_ms",
            "picture_wait_ms",
            "poll_idle_wait_ms",
            "poller_join_timeout_ms",
            "low_water_secs",
            "high_water_secs",
            "default_vbuf_size",
        ]
    }
}

/// Re-reads the environment and config file into the process-wide config.
pub fn reload() {
    let new_config = Config::load();
    *CONFIG.write() = new_config;
}

/// Returns a snapshot of the process-wide config.
pub fn current() -> Config {
    CONFIG.read().clone()
}

/// Writes the default config template to `path` if nothing is there yet.
pub fn create_default_config_template<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    if !path.as_ref().exists() {
        std::fs::write(path, TEMPLATE)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn template_round_trips_to_defaults() {
        let mut config = Config::default();
        config.sysfs_root = PathBuf::from("/elsewhere");
        config.apply_file(TEMPLATE);
        assert_eq!(config, Config::default());
    }

    #[test]
    fn file_lines_override_defaults() {
        let mut config = Config::default();
        config.apply_file(
            "# tuned for a slow board\n\
             blocked_write_threshold = 80\n\
             write_retry_wait_ms = 5\n\
             sysfs_root = \"/tmp/sys\"\n\
             unknown_key = 1\n\
             not a pair\n",
        );
        assert_eq!(config.blocked_write_threshold, 80);
        assert_eq!(config.write_retry_wait, Duration::from_millis(5));
        assert_eq!(config.sysfs_root, PathBuf::from("/tmp/sys"));
        assert_eq!(config.picture_wait, Duration::from_millis(100));
    }

    #[test]
    fn bad_values_are_rejected() {
        let mut config = Config::default();
        assert!(matches!(
            config.set("blocked_write_threshold", "many"),
            Err(HwDecError::ParseInt(_))
        ));
        assert!(matches!(
            config.set("low_water_secs", "soon"),
            Err(HwDecError::ParseFloat(_))
        ));
        assert!(config.set("no_such_key", "1").is_err());
        config.apply_file("clock_correction_threshold = fast\n");
        assert_eq!(config.clock_correction_threshold, 0.20);
    }

    #[test]
    fn global_config_is_readable() {
        reload();
        let config = current();
        assert!(config.high_water_secs >= config.low_water_secs);
    }
}

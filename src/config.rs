use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::{dlog_debug, Error, Result};

const DEFAULT_TEST_RUNS: usize = 5;
const DEFAULT_RANDOM_MAX: i64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Loop count used when `--loops` is not given.
    pub loops: Option<usize>,
    /// Number of runs performed by `--test`.
    pub test_runs: Option<usize>,
    /// Upper bound (inclusive) for randomized constants.
    pub random_max: Option<i64>,
    /// Multiplier applied to the demo system's delays.
    pub delay_scale: Option<f64>,
}

impl Config {
    pub fn app_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".detsched"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::app_dir()?.join("detsched.toml"))
    }

    pub fn effective_loops(&self) -> usize {
        self.loops.unwrap_or(1)
    }

    pub fn effective_test_runs(&self) -> usize {
        self.test_runs.unwrap_or(DEFAULT_TEST_RUNS)
    }

    pub fn effective_random_max(&self) -> i64 {
        self.random_max.unwrap_or(DEFAULT_RANDOM_MAX)
    }

    pub fn effective_delay_scale(&self) -> f64 {
        self.delay_scale.unwrap_or(1.0)
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        dlog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            dlog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        dlog_debug!(
            "Config loaded: loops={:?}, test_runs={:?}, random_max={:?}, delay_scale={:?}",
            config.loops,
            config.test_runs,
            config.random_max,
            config.delay_scale
        );
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        dlog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.loops == Some(0) {
            return Err(Error::InvalidArgument("loops must be > 0".to_string()));
        }
        if matches!(self.test_runs, Some(n) if n < 2) {
            return Err(Error::InvalidArgument("test_runs must be >= 2".to_string()));
        }
        if matches!(self.random_max, Some(n) if n < 0) {
            return Err(Error::InvalidArgument("random_max must be >= 0".to_string()));
        }
        if matches!(self.delay_scale, Some(s) if !(s >= 0.0 && s.is_finite())) {
            return Err(Error::InvalidArgument(
                "delay_scale must be a finite, non-negative number".to_string(),
            ));
        }
        Ok(())
    }
}

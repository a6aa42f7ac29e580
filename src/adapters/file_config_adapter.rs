//! INI file configuration adapter for the `[backtest]`, `[data]` and
//! `[sqlite]` sections.

use chrono::NaiveDate;
use configparser::ini::Ini;
use std::path::Path;

use crate::domain::error::EngineError;
use crate::ports::config_port::ConfigPort;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut config = Ini::new();
        config.load(path).map_err(std::io::Error::other)?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, String> {
        let mut config = Ini::new();
        config.read(content.to_string())?;
        Ok(Self { config })
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config.get(section, key)
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        self.config
            .getint(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
        self.config
            .getfloat(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.config
            .getboolcoerce(section, key)
            .ok()
            .flatten()
            .unwrap_or(default)
    }

    fn get_date(&self, section: &str, key: &str) -> Result<Option<NaiveDate>, EngineError> {
        let Some(value) = self.config.get(section, key) else {
            return Ok(None);
        };
        NaiveDate::parse_from_str(&value, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| EngineError::ConfigInvalid {
                section: section.to_string(),
                key: key.to_string(),
                reason: "expected a YYYY-MM-DD date".into(),
            })
    }
}

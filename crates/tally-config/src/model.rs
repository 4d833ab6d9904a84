use std::path::PathBuf;

use chrono::{FixedOffset, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::{manager::app_home, ConfigError};

const RUN_AT_FORMAT: &str = "%H:%M";

/// Engine settings. Every field has a default, so partial files load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    /// Directory holding `book.json` and its backups. Defaults to the app home.
    pub data_dir: Option<PathBuf>,
    /// Offset from UTC that decides which calendar day "today" is.
    pub utc_offset_minutes: i32,
    /// Local wall-clock time of the daily sweep, `HH:MM`.
    pub run_at: String,
    pub catch_up_on_start: bool,
    pub backup_retention: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_filter: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            utc_offset_minutes: 0,
            run_at: "00:05".into(),
            catch_up_on_start: true,
            backup_retention: 5,
            log_filter: None,
        }
    }
}

impl Config {
    pub fn resolve_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(app_home)
    }

    pub fn offset(&self) -> Result<FixedOffset, ConfigError> {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "utc_offset_minutes {} is outside +/-24h",
                    self.utc_offset_minutes
                ))
            })
    }

    pub fn run_at_time(&self) -> Result<NaiveTime, ConfigError> {
        NaiveTime::parse_from_str(self.run_at.trim(), RUN_AT_FORMAT).map_err(|_| {
            ConfigError::Invalid(format!("run_at `{}` is not a HH:MM time", self.run_at))
        })
    }

    /// Checks the fields that only fail when used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.offset()?;
        self.run_at_time()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().expect("defaults validate");
        assert_eq!(
            config.run_at_time().unwrap(),
            NaiveTime::from_hms_opt(0, 5, 0).unwrap()
        );
        assert_eq!(config.offset().unwrap().local_minus_utc(), 0);
    }

    #[test]
    fn offset_and_run_at_are_checked() {
        let config = Config {
            utc_offset_minutes: -180,
            run_at: "23:30".into(),
            ..Config::default()
        };
        assert_eq!(config.offset().unwrap().local_minus_utc(), -10_800);
        assert_eq!(
            config.run_at_time().unwrap(),
            NaiveTime::from_hms_opt(23, 30, 0).unwrap()
        );

        let bad_offset = Config {
            utc_offset_minutes: 24 * 60,
            ..Config::default()
        };
        assert!(matches!(
            bad_offset.validate(),
            Err(ConfigError::Invalid(_))
        ));

        let bad_time = Config {
            run_at: "25:00".into(),
            ..Config::default()
        };
        assert!(matches!(bad_time.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{ "run_at": "06:00" }"#).unwrap();
        assert_eq!(config.run_at, "06:00");
        assert_eq!(config.utc_offset_minutes, 0);
        assert!(config.catch_up_on_start);
    }
}

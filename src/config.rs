use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::clock::{TimeContext, DEFAULT_TIMEZONE};
use crate::error::{Result, StudyError};
use crate::planner::{PlannerLimits, DEFAULT_DRILL_LIMIT, DEFAULT_LEARN_LIMIT};

const APP_DIR: &str = "studyplan";
const DEFAULT_DB_NAME: &str = "studyplan.db";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_path: Option<PathBuf>,
    pub timezone: String,
    pub default_user: String,
    pub drill_limit: usize,
    pub learn_limit: usize,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            timezone: DEFAULT_TIMEZONE.to_string(),
            default_user: "local".to_string(),
            drill_limit: DEFAULT_DRILL_LIMIT,
            learn_limit: DEFAULT_LEARN_LIMIT,
            log_level: "warn".to_string(),
        }
    }
}

impl Config {
    /// Load from `$STUDYPLAN_CONFIG` or the platform config dir. A missing file means defaults.
    pub fn load() -> Result<Self> {
        let path = std::env::var("STUDYPLAN_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| app_dir().join(CONFIG_FILE));

        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };

        if let Ok(db) = std::env::var("STUDYPLAN_DB") {
            config.database_path = Some(PathBuf::from(db));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| StudyError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| StudyError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        TimeContext::from_name(&self.timezone)?;
        if self.default_user.trim().is_empty() {
            return Err(StudyError::Config("default_user must not be empty".into()));
        }
        Ok(())
    }

    pub fn db_path(&self) -> PathBuf {
        if let Some(path) = &self.database_path {
            return path.clone();
        }
        let dir = app_dir();
        std::fs::create_dir_all(&dir).ok();
        dir.join(DEFAULT_DB_NAME)
    }

    pub fn time_context(&self) -> Result<TimeContext> {
        TimeContext::from_name(&self.timezone)
    }

    pub fn limits(&self) -> PlannerLimits {
        PlannerLimits {
            drill: self.drill_limit,
            learn: self.learn_limit,
        }
    }
}

fn app_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.timezone, "America/Chicago");
        assert_eq!(c.default_user, "local");
        assert_eq!(c.limits(), PlannerLimits::default());
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = Config::from_toml("drill_limit = 3\n").unwrap();
        assert_eq!(c.drill_limit, 3);
        assert_eq!(c.learn_limit, DEFAULT_LEARN_LIMIT);
        assert_eq!(c.timezone, DEFAULT_TIMEZONE);
    }

    #[test]
    fn full_toml() {
        let raw = r#"
            database_path = "/tmp/plan.db"
            timezone = "UTC"
            default_user = "sam"
            drill_limit = 4
            learn_limit = 1
            log_level = "debug"
        "#;
        let c = Config::from_toml(raw).unwrap();
        assert_eq!(c.db_path(), PathBuf::from("/tmp/plan.db"));
        assert_eq!(c.default_user, "sam");
        assert_eq!(c.limits(), PlannerLimits { drill: 4, learn: 1 });
        assert_eq!(c.log_level, "debug");
    }

    #[test]
    fn bad_toml_is_config_error() {
        assert!(matches!(
            Config::from_toml("drill_limit = \"many\""),
            Err(StudyError::Config(_))
        ));
    }

    #[test]
    fn unknown_timezone_fails_validation() {
        let c = Config {
            timezone: "Nowhere/Special".into(),
            ..Config::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn blank_user_fails_validation() {
        let c = Config {
            default_user: " ".into(),
            ..Config::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn from_file_missing_path_errors() {
        let err = Config::from_file(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, StudyError::Config(_)));
    }
}

use crate::journal::{journal_file_name, plan_file_path};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use directories::ProjectDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SETTINGS_FILE: &str = "settings.yml";
const LOG_FILE: &str = "deepwork_activity.log";
const MIN_CHIME_SECS: u64 = 60;

/// Optional overrides read from the per-user `settings.yml`.
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub alert_minutes: Option<u64>,
    pub chime_seconds: Option<u64>,
    pub break_minutes: Option<u32>,
    pub poll_millis: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub journal_path: PathBuf,
    pub plan_path: PathBuf,
    pub log_path: PathBuf,
    pub alert_threshold: Duration,
    pub chime_interval: Duration,
    pub poll_interval: Duration,
    pub default_break_minutes: u32,
}

impl SessionConfig {
    /// Defaults for the given journal and plan files.
    pub fn for_paths(journal_path: PathBuf, plan_path: PathBuf) -> Self {
        SessionConfig {
            journal_path,
            plan_path,
            log_path: PathBuf::from(LOG_FILE),
            alert_threshold: Duration::from_secs(90 * 60),
            chime_interval: Duration::from_secs(MIN_CHIME_SECS),
            poll_interval: Duration::from_millis(100),
            default_break_minutes: 5,
        }
    }

    pub fn resolve(journal: Option<PathBuf>, today: NaiveDate) -> Result<Self> {
        let journal_path = journal.unwrap_or_else(|| PathBuf::from(journal_file_name(today)));
        let plan_path = plan_file_path(&journal_path, today);
        let mut config = SessionConfig::for_paths(journal_path, plan_path);
        let dirs = ProjectDirs::from("", "", "deepwork");
        if let Some(dirs) = &dirs {
            config.log_path = dirs.data_dir().join(LOG_FILE);
            let settings = load_settings(&dirs.config_dir().join(SETTINGS_FILE))?;
            config.apply(&settings);
        }
        Ok(config)
    }

    pub fn apply(&mut self, settings: &Settings) {
        if let Some(minutes) = settings.alert_minutes {
            self.alert_threshold = Duration::from_secs(minutes * 60);
        }
        if let Some(secs) = settings.chime_seconds {
            self.chime_interval = Duration::from_secs(secs.max(MIN_CHIME_SECS));
        }
        if let Some(minutes) = settings.break_minutes.filter(|m| *m > 0) {
            self.default_break_minutes = minutes;
        }
        if let Some(millis) = settings.poll_millis {
            self.poll_interval = Duration::from_millis(millis.clamp(10, 1000));
        }
    }

    pub fn journal_name(&self) -> String {
        self.journal_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("journal")
            .to_string()
    }
}

pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let data = fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?;
    let settings: Settings = serde_yaml::from_str(&data)
        .with_context(|| format!("parsing settings file {:?}", path))?;
    Ok(settings)
}

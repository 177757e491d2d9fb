use crate::domain::local_zone::LocalZone;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::todoist_client::{REST_API_BASE, SYNC_API_BASE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const APP_JSON: &str = "app.json";
pub const DEFAULT_SERVICE_RECORD_NAME: &str = "deloist goals";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct AppConfig {
    pub schema: u8,
    pub timer_minutes: u64,
    pub default_task_minutes: u64,
    pub add_time_minutes: u64,
    pub timezone: Option<String>,
    pub api_base_url: String,
    pub sync_api_base_url: String,
    pub service_record_name: String,
    pub completed_fetch_limit: usize,
    pub detail_fetch_concurrency: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            schema: 1,
            timer_minutes: 25,
            default_task_minutes: 25,
            add_time_minutes: 25,
            timezone: None,
            api_base_url: REST_API_BASE.to_string(),
            sync_api_base_url: SYNC_API_BASE.to_string(),
            service_record_name: DEFAULT_SERVICE_RECORD_NAME.to_string(),
            completed_fetch_limit: 100,
            detail_fetch_concurrency: 8,
        }
    }
}

impl AppConfig {
    pub fn zone(&self) -> Result<LocalZone, InfraError> {
        LocalZone::parse(self.timezone.as_deref()).map_err(InfraError::InvalidConfig)
    }

    fn validate(&self, path: &Path) -> Result<(), InfraError> {
        if self.schema != 1 {
            return Err(InfraError::InvalidConfig(format!(
                "unsupported schema {} in {}",
                self.schema,
                path.display()
            )));
        }
        for (field, value) in [
            ("timerMinutes", self.timer_minutes),
            ("defaultTaskMinutes", self.default_task_minutes),
            ("addTimeMinutes", self.add_time_minutes),
            ("completedFetchLimit", self.completed_fetch_limit as u64),
            ("detailFetchConcurrency", self.detail_fetch_concurrency as u64),
        ] {
            if value == 0 {
                return Err(InfraError::InvalidConfig(format!(
                    "{field} must be positive in {}",
                    path.display()
                )));
            }
        }
        if self.service_record_name.trim().is_empty() {
            return Err(InfraError::InvalidConfig(format!(
                "serviceRecordName must not be empty in {}",
                path.display()
            )));
        }
        self.zone().map(|_| ())
    }
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(APP_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&AppConfig::default())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

pub fn read_app_config(config_dir: &Path) -> Result<AppConfig, InfraError> {
    let path = config_dir.join(APP_JSON);
    let raw = fs::read_to_string(&path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    if parsed.get("schema").and_then(serde_json::Value::as_u64).is_none() {
        return Err(InfraError::InvalidConfig(format!(
            "missing schema in {}",
            path.display()
        )));
    }
    let config: AppConfig = serde_json::from_value(parsed)?;
    config.validate(&path)?;
    Ok(config)
}

pub fn save_timezone(config_dir: &Path, timezone: Option<&str>) -> Result<AppConfig, InfraError> {
    let timezone = timezone
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned);
    LocalZone::parse(timezone.as_deref()).map_err(InfraError::InvalidConfig)?;

    let mut config = read_app_config(config_dir)?;
    config.timezone = timezone;
    let formatted = serde_json::to_string_pretty(&config)?;
    fs::write(config_dir.join(APP_JSON), format!("{formatted}\n"))?;
    Ok(config)
}

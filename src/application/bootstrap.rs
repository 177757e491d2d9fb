use crate::infrastructure::config::{ensure_default_configs, read_app_config, AppConfig};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::settings_repository::SqliteSettingsRepository;
use std::fs;
use std::path::{Path, PathBuf};

pub const DATABASE_FILE: &str = "deloist.sqlite";

#[derive(Debug)]
pub struct BootstrapResult {
    pub config_dir: PathBuf,
    pub database_path: PathBuf,
    pub config: AppConfig,
    pub settings: SqliteSettingsRepository,
}

pub fn workspace_logs_dir(workspace_root: &Path) -> PathBuf {
    workspace_root.join("logs")
}

pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let logs_dir = workspace_logs_dir(workspace_root);
    let database_path = state_dir.join(DATABASE_FILE);

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;
    fs::create_dir_all(&logs_dir)?;

    ensure_default_configs(&config_dir)?;
    let config = read_app_config(&config_dir)?;
    let settings = SqliteSettingsRepository::open(&database_path)?;

    Ok(BootstrapResult {
        config_dir,
        database_path,
        config,
        settings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::settings_repository::SettingsRepository;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_WORKSPACE: AtomicUsize = AtomicUsize::new(0);

    #[test]
    fn creates_layout_and_is_idempotent() {
        let sequence = NEXT_TEMP_WORKSPACE.fetch_add(1, Ordering::Relaxed);
        let root = std::env::temp_dir().join(format!(
            "deloist-bootstrap-tests-{}-{}",
            std::process::id(),
            sequence
        ));

        let first = bootstrap_workspace(&root).expect("bootstrap");
        assert!(first.config_dir.join("app.json").exists());
        assert!(first.database_path.exists());
        assert!(workspace_logs_dir(&root).is_dir());
        assert_eq!(first.config, AppConfig::default());
        first.settings.set("timer.minutes", "50").expect("write setting");

        let second = bootstrap_workspace(&root).expect("bootstrap again");
        assert_eq!(
            second.settings.get("timer.minutes").expect("read setting"),
            Some("50".to_string())
        );

        let _ = fs::remove_dir_all(&root);
    }
}

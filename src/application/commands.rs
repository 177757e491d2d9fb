use crate::application::bootstrap::bootstrap_workspace;
use crate::application::completed_tasks::CompletedTaskAggregator;
use crate::application::goals_store::{CommentDocumentStore, GoalEdit, GoalsService};
use crate::application::label_resolver::LabelResolver;
use crate::application::task_loader::{NowProvider, TaskLoader};
use crate::application::timer_engine::{
    LoggingNotifier, TaskReloader, TimerEngine, TimerNotifier, TimerSnapshot, TransitionOutcome,
};
use crate::domain::local_zone::LocalZone;
use crate::domain::models::{GoalEntry, GoalsDocument, Task};
use crate::domain::statistics::{build_report, ColorPalette, StatsView, StatsWindow};
use crate::infrastructure::config::{save_timezone, AppConfig};
use crate::infrastructure::credential_store::{CredentialStore, KeyringCredentialStore};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::settings_repository::{
    SettingsRepository, STATS_DEFAULT_MINUTES_KEY, TIMER_MINUTES_KEY,
};
use crate::infrastructure::todoist_client::{ReqwestTodoistClient, TodoistClient};
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub struct AppState {
    config_dir: PathBuf,
    config: AppConfig,
    zone: LocalZone,
    credentials: Arc<dyn CredentialStore>,
    settings: Arc<dyn SettingsRepository>,
    labels: Arc<LabelResolver>,
    tasks: Arc<TaskLoader>,
    completed: Arc<CompletedTaskAggregator>,
    goals: GoalsService,
    timer: TimerEngine,
    palette: Mutex<ColorPalette>,
}

/// Collaborators an [`AppState`] is assembled from.
pub struct AppParts {
    pub client: Arc<dyn TodoistClient>,
    pub credentials: Arc<dyn CredentialStore>,
    pub settings: Arc<dyn SettingsRepository>,
    pub notifier: Arc<dyn TimerNotifier>,
    pub now_provider: NowProvider,
}

impl AppState {
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        Self::with_notifier(workspace_root, Arc::new(LoggingNotifier))
    }

    pub fn with_notifier(
        workspace_root: PathBuf,
        notifier: Arc<dyn TimerNotifier>,
    ) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let client = Arc::new(ReqwestTodoistClient::new(
            bootstrap.config.api_base_url.clone(),
            bootstrap.config.sync_api_base_url.clone(),
        ));

        Self::from_parts(
            bootstrap.config_dir,
            bootstrap.config,
            AppParts {
                client,
                credentials: Arc::new(KeyringCredentialStore::default()),
                settings: Arc::new(bootstrap.settings),
                notifier,
                now_provider: Arc::new(Utc::now),
            },
        )
    }

    pub fn from_parts(
        config_dir: PathBuf,
        config: AppConfig,
        parts: AppParts,
    ) -> Result<Self, InfraError> {
        let zone = config.zone()?;
        let timer_minutes = parts
            .settings
            .get_minutes(TIMER_MINUTES_KEY)?
            .unwrap_or(config.timer_minutes);

        let labels = Arc::new(LabelResolver::new(Arc::clone(&parts.client)));
        let tasks = Arc::new(
            TaskLoader::new(Arc::clone(&parts.client), Arc::clone(&labels), zone)
                .with_now_provider(Arc::clone(&parts.now_provider)),
        );
        let completed = Arc::new(CompletedTaskAggregator::new(
            Arc::clone(&parts.client),
            Arc::clone(&labels),
            config.completed_fetch_limit,
            config.detail_fetch_concurrency,
        ));
        let store = Arc::new(CommentDocumentStore::new(
            Arc::clone(&parts.client),
            Arc::clone(&parts.settings),
            config.service_record_name.clone(),
        ));
        let goals = GoalsService::new(store, Arc::clone(&labels));
        let timer = TimerEngine::new(
            parts.client,
            Arc::clone(&parts.credentials),
            parts.notifier,
            timer_minutes,
            config.add_time_minutes,
        )
        .with_now_provider(parts.now_provider)
        .with_reloader(Arc::clone(&tasks) as Arc<dyn TaskReloader>);

        Ok(Self {
            config_dir,
            config,
            zone,
            credentials: parts.credentials,
            settings: parts.settings,
            labels,
            tasks,
            completed,
            goals,
            timer,
            palette: Mutex::new(ColorPalette::default()),
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn timer(&self) -> &TimerEngine {
        &self.timer
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        error!(command, %error, "command failed");
        error.to_string()
    }

    fn access_token(&self) -> Result<Option<String>, InfraError> {
        self.credentials.load_token()
    }

    fn require_token(&self) -> Result<String, InfraError> {
        self.access_token()?.ok_or(InfraError::AuthRequired)
    }

    fn default_task_minutes(&self) -> Result<f64, InfraError> {
        Ok(self
            .settings
            .get_minutes(STATS_DEFAULT_MINUTES_KEY)?
            .unwrap_or(self.config.default_task_minutes) as f64)
    }

    fn invalidate_remote_caches(&self) -> Result<(), InfraError> {
        self.labels.invalidate();
        self.completed.invalidate()
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViewStatus {
    AuthRequired,
    Loaded,
    Failed,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TaskListView {
    pub status: ViewStatus,
    pub tasks: Vec<Task>,
    pub selected_task_id: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GoalsView {
    pub status: ViewStatus,
    pub goals: GoalsDocument,
    pub message: Option<String>,
}

/// A command result plus the background work it started. Awaiting the handle
/// is never required.
#[derive(Debug)]
pub struct CommandOutcome<T> {
    pub view: T,
    pub background: Option<JoinHandle<()>>,
}

fn task_ids(tasks: &[Task]) -> Vec<String> {
    tasks.iter().map(|task| task.id.clone()).collect()
}

pub fn save_token_impl(state: &AppState, token: String) -> Result<(), InfraError> {
    state.credentials.save_token(&token)?;
    state.invalidate_remote_caches()?;
    info!(command = "save_token", "stored todoist token");
    Ok(())
}

pub fn clear_token_impl(state: &AppState) -> Result<(), InfraError> {
    state.credentials.delete_token()?;
    state.invalidate_remote_caches()?;
    info!(command = "clear_token", "removed todoist token");
    Ok(())
}

pub async fn load_today_impl(state: &AppState) -> Result<TaskListView, InfraError> {
    Ok(load_today_with_refresh(state).await?.view)
}

/// Loads today's tasks and, on success, refreshes completed tasks in the
/// background.
pub async fn load_today_with_refresh(
    state: &AppState,
) -> Result<CommandOutcome<TaskListView>, InfraError> {
    let Some(access_token) = state.access_token()? else {
        return Ok(CommandOutcome {
            view: TaskListView {
                status: ViewStatus::AuthRequired,
                tasks: Vec::new(),
                selected_task_id: None,
                message: None,
            },
            background: None,
        });
    };

    match state.tasks.load_today(&access_token).await {
        Ok(tasks) => {
            state.timer.retain_selection(&task_ids(&tasks)).await;
            let completed = Arc::clone(&state.completed);
            let background = tokio::spawn(async move {
                if let Err(error) = completed.refresh(&access_token).await {
                    warn!(%error, "background completed-task refresh failed");
                }
            });
            info!(command = "load_today", count = tasks.len(), "loaded today's tasks");
            Ok(CommandOutcome {
                view: TaskListView {
                    status: ViewStatus::Loaded,
                    tasks,
                    selected_task_id: state.timer.snapshot().await.selected_task_id,
                    message: None,
                },
                background: Some(background),
            })
        }
        Err(load_error) => {
            error!(command = "load_today", error = %load_error, "failed to load tasks");
            Ok(CommandOutcome {
                view: TaskListView {
                    status: ViewStatus::Failed,
                    tasks: state.tasks.cached()?.unwrap_or_default(),
                    selected_task_id: state.timer.snapshot().await.selected_task_id,
                    message: Some(load_error.to_string()),
                },
                background: None,
            })
        }
    }
}

pub async fn timer_snapshot_impl(state: &AppState) -> TimerSnapshot {
    state.timer.snapshot().await
}

pub async fn select_task_impl(state: &AppState, task_id: String) -> TimerSnapshot {
    if !state.timer.select_task(&task_id).await {
        info!(command = "select_task", task_id = %task_id, "selection ignored");
    }
    state.timer.snapshot().await
}

pub async fn start_timer_impl(
    state: &AppState,
    task_id: Option<String>,
) -> CommandOutcome<TimerSnapshot> {
    let TransitionOutcome { applied, effect } = state.timer.start(task_id.as_deref()).await;
    info!(command = "start_timer", applied, "start requested");
    CommandOutcome {
        view: state.timer.snapshot().await,
        background: effect,
    }
}

pub async fn pause_timer_impl(state: &AppState) -> TimerSnapshot {
    state.timer.pause().await;
    state.timer.snapshot().await
}

pub async fn resume_timer_impl(state: &AppState) -> TimerSnapshot {
    state.timer.resume().await;
    state.timer.snapshot().await
}

pub async fn add_time_impl(state: &AppState) -> TimerSnapshot {
    state.timer.add_time().await
}

/// Stops the session. The background handle covers the duration push and the
/// task reload that follows it.
pub async fn stop_timer_impl(state: &AppState) -> CommandOutcome<TimerSnapshot> {
    let TransitionOutcome { applied, effect } = state.timer.stop().await;
    info!(command = "stop_timer", applied, "stop requested");
    CommandOutcome {
        view: state.timer.snapshot().await,
        background: effect,
    }
}

pub async fn cancel_timer_impl(state: &AppState) -> TimerSnapshot {
    state.timer.cancel().await;
    state.timer.snapshot().await
}

pub async fn reset_timer_impl(state: &AppState) -> TimerSnapshot {
    state.timer.reset().await;
    state.timer.snapshot().await
}

fn positive_minutes(minutes: u64, field: &str) -> Result<u64, InfraError> {
    if minutes == 0 {
        return Err(InfraError::InvalidInput(format!("{field} must be positive")));
    }
    Ok(minutes)
}

pub async fn set_timer_minutes_impl(
    state: &AppState,
    minutes: u64,
) -> Result<TimerSnapshot, InfraError> {
    let minutes = positive_minutes(minutes, "timer minutes")?;
    state.settings.set(TIMER_MINUTES_KEY, &minutes.to_string())?;
    info!(command = "set_timer_minutes", minutes, "updated timer length");
    Ok(state.timer.set_default_minutes(minutes).await)
}

pub fn set_default_task_minutes_impl(state: &AppState, minutes: u64) -> Result<(), InfraError> {
    let minutes = positive_minutes(minutes, "default task minutes")?;
    state
        .settings
        .set(STATS_DEFAULT_MINUTES_KEY, &minutes.to_string())?;
    info!(command = "set_default_task_minutes", minutes, "updated statistics fallback");
    Ok(())
}

/// Persists the zone to `app.json`; a running state keeps its current zone.
pub fn set_timezone_impl(state: &AppState, timezone: Option<String>) -> Result<AppConfig, InfraError> {
    let config = save_timezone(state.config_dir(), timezone.as_deref())?;
    info!(command = "set_timezone", timezone = ?config.timezone, "saved timezone");
    Ok(config)
}

pub fn statistics_impl(state: &AppState, window: StatsWindow) -> Result<StatsView, InfraError> {
    if state.access_token()?.is_none() {
        return Ok(StatsView::AuthRequired);
    }
    let Some(completed) = state.completed.snapshot()? else {
        return Ok(StatsView::NeedsRefresh);
    };
    if completed.is_empty() {
        return Ok(StatsView::NoData);
    }

    let default_minutes = state.default_task_minutes()?;
    let mut palette = state
        .palette
        .lock()
        .map_err(|error| InfraError::InvalidConfig(format!("palette lock poisoned: {error}")))?;
    let report = build_report(
        window,
        &completed,
        state.tasks.today(),
        &state.zone,
        default_minutes,
        &mut palette,
    );
    Ok(StatsView::Report(report))
}

/// Drops the completed and label caches, refetches, then renders `window`.
pub async fn refresh_statistics_impl(
    state: &AppState,
    window: StatsWindow,
) -> Result<StatsView, InfraError> {
    let Some(access_token) = state.access_token()? else {
        return Ok(StatsView::AuthRequired);
    };
    state.invalidate_remote_caches()?;
    match state.completed.refresh(&access_token).await {
        Ok(count) => info!(command = "refresh_statistics", count, "refreshed statistics"),
        Err(refresh_error) => {
            error!(command = "refresh_statistics", error = %refresh_error, "failed to refresh statistics")
        }
    }
    statistics_impl(state, window)
}

pub async fn load_goals_impl(state: &AppState, force: bool) -> Result<GoalsView, InfraError> {
    let Some(access_token) = state.access_token()? else {
        return Ok(GoalsView {
            status: ViewStatus::AuthRequired,
            goals: GoalsDocument::default(),
            message: None,
        });
    };

    match state.goals.load_goals(&access_token, force).await {
        Ok(goals) => Ok(GoalsView {
            status: ViewStatus::Loaded,
            goals,
            message: None,
        }),
        Err(load_error) => {
            error!(command = "load_goals", error = %load_error, "failed to load goals");
            Ok(GoalsView {
                status: ViewStatus::Failed,
                goals: state.goals.cached()?.unwrap_or_default(),
                message: Some(load_error.to_string()),
            })
        }
    }
}

pub async fn save_goal_impl(
    state: &AppState,
    label_id: String,
    entry: GoalEntry,
) -> Result<GoalsDocument, InfraError> {
    let access_token = state.require_token()?;
    let document = state.goals.save_goal(&access_token, &label_id, entry).await?;
    info!(command = "save_goal", label_id = %label_id, "saved goal");
    Ok(document)
}

pub async fn update_goal_impl(
    state: &AppState,
    label_id: String,
    edit: GoalEdit,
) -> Result<GoalsDocument, InfraError> {
    let access_token = state.require_token()?;
    let document = state.goals.update_goal(&access_token, &label_id, edit).await?;
    info!(command = "update_goal", label_id = %label_id, "updated goal");
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::fake_todoist::{due_on, label, raw_task, FakeTodoistClient};
    use crate::domain::models::{DurationSpec, LabelRef, RawLabels};
    use crate::domain::timer::TimerPhase;
    use crate::infrastructure::credential_store::InMemoryCredentialStore;
    use crate::infrastructure::settings_repository::InMemorySettingsRepository;
    use crate::infrastructure::todoist_payload::CompletedItem;
    use chrono::{DateTime, Duration};
    use std::fs;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

    static NEXT_TEMP_WORKSPACE: AtomicUsize = AtomicUsize::new(0);

    struct TempWorkspace {
        path: PathBuf,
    }

    impl TempWorkspace {
        fn new() -> Self {
            let sequence = NEXT_TEMP_WORKSPACE.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "deloist-command-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp workspace");
            Self { path }
        }
    }

    impl Drop for TempWorkspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    struct Harness {
        state: AppState,
        client: Arc<FakeTodoistClient>,
        settings: Arc<InMemorySettingsRepository>,
        offset_seconds: Arc<AtomicI64>,
        _workspace: TempWorkspace,
    }

    impl Harness {
        fn new(token: Option<&str>) -> Self {
            let workspace = TempWorkspace::new();
            let client = Arc::new(FakeTodoistClient::with_inbox());
            let settings = Arc::new(InMemorySettingsRepository::default());
            let credentials = Arc::new(match token {
                Some(token) => InMemoryCredentialStore::with_token(token),
                None => InMemoryCredentialStore::default(),
            });
            let offset_seconds = Arc::new(AtomicI64::new(0));
            let base = DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
                .expect("valid datetime")
                .with_timezone(&Utc);
            let offset = Arc::clone(&offset_seconds);

            let config = AppConfig {
                timezone: Some("UTC".to_string()),
                ..AppConfig::default()
            };
            let state = AppState::from_parts(
                workspace.path.clone(),
                config,
                AppParts {
                    client: client.clone(),
                    credentials,
                    settings: settings.clone(),
                    notifier: Arc::new(LoggingNotifier),
                    now_provider: Arc::new(move || {
                        base + Duration::seconds(offset.load(Ordering::SeqCst))
                    }),
                },
            )
            .expect("assemble app state");

            Self {
                state,
                client,
                settings,
                offset_seconds,
                _workspace: workspace,
            }
        }

        fn push_today(&self, id: &str, content: &str) {
            let mut task = raw_task(id, content);
            task.due = due_on("2024-06-01");
            self.client.push_task(task);
        }

        fn push_completed(&self, id: &str, minutes: f64, labels: &[&str]) {
            let mut task = raw_task(id, &format!("done {id}"));
            task.duration = Some(DurationSpec::minutes(minutes));
            task.labels = Some(RawLabels::List(
                labels
                    .iter()
                    .map(|name| LabelRef::ByName(name.to_string()))
                    .collect(),
            ));
            self.client.push_task(task);
            self.client.push_completed(CompletedItem {
                task_id: Some(id.to_string()),
                content: format!("done {id}"),
                completed_at: Some("2024-06-01T09:00:00Z".to_string()),
                ..CompletedItem::default()
            });
        }
    }

    #[tokio::test]
    async fn load_without_token_asks_for_auth_without_network() {
        let harness = Harness::new(None);
        let view = load_today_impl(&harness.state).await.expect("load");
        assert_eq!(view.status, ViewStatus::AuthRequired);
        assert_eq!(harness.client.calls("list_tasks"), 0);
        assert_eq!(
            statistics_impl(&harness.state, StatsWindow::Day).expect("stats"),
            StatsView::AuthRequired
        );
    }

    #[tokio::test]
    async fn load_refreshes_completed_tasks_in_background() {
        let harness = Harness::new(Some("token"));
        harness.push_today("1", "Write report");
        harness.push_completed("10", 30.0, &["Focus", "Deep"]);
        harness.push_completed("11", 20.0, &[]);

        assert_eq!(
            statistics_impl(&harness.state, StatsWindow::Day).expect("stats"),
            StatsView::NeedsRefresh
        );

        let outcome = load_today_with_refresh(&harness.state).await.expect("load");
        assert_eq!(outcome.view.status, ViewStatus::Loaded);
        assert_eq!(outcome.view.tasks.len(), 1);
        outcome
            .background
            .expect("refresh spawned")
            .await
            .expect("join");

        let StatsView::Report(report) =
            statistics_impl(&harness.state, StatsWindow::Day).expect("stats")
        else {
            panic!("expected a report");
        };
        assert_eq!(report.total_minutes, 50.0);
        assert_eq!(report.title, "Today's Completed Tasks (50m)");
        let labels: Vec<&str> = report.bars[0]
            .segments
            .iter()
            .map(|segment| segment.label.as_str())
            .collect();
        assert_eq!(labels, vec!["Deep", "Focus", "Untagged"]);
    }

    #[tokio::test]
    async fn failed_load_reports_error_and_keeps_previous_tasks() {
        let harness = Harness::new(Some("token"));
        harness.push_today("1", "Write report");
        load_today_impl(&harness.state).await.expect("first load");

        harness.client.fail("list_tasks");
        let view = load_today_impl(&harness.state).await.expect("load");
        assert_eq!(view.status, ViewStatus::Failed);
        assert_eq!(view.tasks.len(), 1);
        assert!(view.message.is_some_and(|message| message.contains("list_tasks")));
    }

    #[tokio::test]
    async fn empty_history_yields_no_data_and_failed_refresh_needs_refresh() {
        let harness = Harness::new(Some("token"));
        assert_eq!(
            refresh_statistics_impl(&harness.state, StatsWindow::Month)
                .await
                .expect("stats"),
            StatsView::NoData
        );

        harness.client.fail("list_completed");
        assert_eq!(
            refresh_statistics_impl(&harness.state, StatsWindow::Month)
                .await
                .expect("stats"),
            StatsView::NeedsRefresh
        );
    }

    #[tokio::test]
    async fn stop_pushes_duration_then_reloads_tasks() {
        let harness = Harness::new(Some("token"));
        harness.push_today("1", "Write report");
        load_today_impl(&harness.state).await.expect("load");

        let started = start_timer_impl(&harness.state, Some("1".to_string())).await;
        assert_eq!(started.view.phase, TimerPhase::Running);
        started.background.expect("stamp").await.expect("join");

        harness.offset_seconds.store(30 * 60, Ordering::SeqCst);
        let stopped = stop_timer_impl(&harness.state).await;
        assert_eq!(stopped.view.phase, TimerPhase::Idle);
        stopped.background.expect("push and reload").await.expect("join");

        let task = harness.client.task("1").expect("task");
        assert_eq!(task.duration, Some(DurationSpec::minutes(30.0)));
        assert_eq!(harness.client.calls("list_tasks"), 2);
    }

    #[tokio::test]
    async fn reload_drops_selection_of_vanished_task() {
        let harness = Harness::new(Some("token"));
        harness.push_today("1", "Write report");
        load_today_impl(&harness.state).await.expect("load");
        let snapshot = select_task_impl(&harness.state, "1".to_string()).await;
        assert_eq!(snapshot.selected_task_id.as_deref(), Some("1"));

        harness.client.tasks.lock().expect("tasks").clear();
        let view = load_today_impl(&harness.state).await.expect("reload");
        assert!(view.tasks.is_empty());
        assert_eq!(view.selected_task_id, None);
    }

    #[tokio::test]
    async fn minute_overrides_are_persisted_and_validated() {
        let harness = Harness::new(None);
        let snapshot = set_timer_minutes_impl(&harness.state, 50).await.expect("set");
        assert_eq!(snapshot.display, "50:00");
        assert_eq!(
            harness.settings.get(TIMER_MINUTES_KEY).expect("settings"),
            Some("50".to_string())
        );
        assert!(matches!(
            set_timer_minutes_impl(&harness.state, 0).await,
            Err(InfraError::InvalidInput(_))
        ));

        set_default_task_minutes_impl(&harness.state, 40).expect("set default");
        assert_eq!(harness.state.default_task_minutes().expect("minutes"), 40.0);
    }

    #[tokio::test]
    async fn goals_require_token_and_round_trip_through_the_service_record() {
        let harness = Harness::new(None);
        assert_eq!(
            load_goals_impl(&harness.state, false).await.expect("load").status,
            ViewStatus::AuthRequired
        );
        assert!(matches!(
            save_goal_impl(&harness.state, "12".to_string(), GoalEntry::default()).await,
            Err(InfraError::AuthRequired)
        ));

        save_token_impl(&harness.state, "token".to_string()).expect("save token");
        harness.client.push_label(label("12", "Focus"));
        update_goal_impl(
            &harness.state,
            "12".to_string(),
            GoalEdit {
                text: Some("Ship the beta".to_string()),
                ..GoalEdit::default()
            },
        )
        .await
        .expect("update");

        let view = load_goals_impl(&harness.state, true).await.expect("load");
        assert_eq!(view.status, ViewStatus::Loaded);
        assert_eq!(view.goals.goals["12"].text, "Ship the beta");
        assert_eq!(view.goals.goals["12"].label, "Focus");
        assert_eq!(harness.client.calls("create_task"), 1);
    }

    #[test]
    fn new_state_bootstraps_workspace_with_defaults() {
        let workspace = TempWorkspace::new();
        let state = AppState::new(workspace.path.clone()).expect("initialize app state");
        assert!(state.config_dir().join("app.json").exists());
        assert!(workspace.path.join("state").join("deloist.sqlite").exists());
    }
}

use crate::application::task_loader::NowProvider;
use crate::domain::models::DurationSpec;
use crate::domain::timer::{FinishedSession, TickOutcome, TimerPhase, TimerState};
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::todoist_client::TodoistClient;
use crate::infrastructure::todoist_payload::TaskUpdate;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub type MonotonicClock = Arc<dyn Fn() -> u64 + Send + Sync>;

const TICK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub phase: TimerPhase,
    pub duration_seconds: u64,
    pub remaining_seconds: u64,
    pub display: String,
    pub selected_task_id: Option<String>,
    pub session_started_at: Option<DateTime<Utc>>,
}

impl TimerSnapshot {
    fn of(state: &TimerState) -> Self {
        Self {
            phase: state.phase(),
            duration_seconds: state.duration_seconds,
            remaining_seconds: state.remaining_seconds,
            display: state.display(),
            selected_task_id: state.selected_task_id.clone(),
            session_started_at: state.session_started_at,
        }
    }
}

/// Receives timer events. Completion fires exactly once per natural expiry.
pub trait TimerNotifier: Send + Sync {
    fn on_tick(&self, _snapshot: &TimerSnapshot) {}
    fn on_complete(&self, snapshot: &TimerSnapshot);
}

#[derive(Debug, Default)]
pub struct LoggingNotifier;

impl TimerNotifier for LoggingNotifier {
    fn on_tick(&self, snapshot: &TimerSnapshot) {
        debug!(remaining = snapshot.remaining_seconds, "timer tick");
    }

    fn on_complete(&self, snapshot: &TimerSnapshot) {
        info!(task_id = ?snapshot.selected_task_id, "focus session complete");
    }
}

/// Reloads today's tasks once a finished session has been pushed.
#[async_trait]
pub trait TaskReloader: Send + Sync {
    async fn reload_task_ids(&self, access_token: &str) -> Result<Vec<String>, InfraError>;
}

/// Result of a transition that may start a remote side effect.
#[derive(Debug)]
pub struct TransitionOutcome {
    pub applied: bool,
    pub effect: Option<JoinHandle<()>>,
}

impl TransitionOutcome {
    fn rejected() -> Self {
        Self {
            applied: false,
            effect: None,
        }
    }
}

#[derive(Clone)]
pub struct TimerEngine {
    state: Arc<Mutex<TimerState>>,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
    expiry_push: Arc<Mutex<Option<JoinHandle<()>>>>,
    client: Arc<dyn TodoistClient>,
    credentials: Arc<dyn CredentialStore>,
    notifier: Arc<dyn TimerNotifier>,
    reloader: Option<Arc<dyn TaskReloader>>,
    default_seconds: Arc<AtomicU64>,
    add_seconds: u64,
    now_provider: NowProvider,
    monotonic: MonotonicClock,
    spawn_ticker: bool,
}

impl TimerEngine {
    pub fn new(
        client: Arc<dyn TodoistClient>,
        credentials: Arc<dyn CredentialStore>,
        notifier: Arc<dyn TimerNotifier>,
        default_minutes: u64,
        add_minutes: u64,
    ) -> Self {
        let origin = Instant::now();
        let default_seconds = default_minutes * 60;
        Self {
            state: Arc::new(Mutex::new(TimerState::new(default_seconds))),
            ticker: Arc::new(Mutex::new(None)),
            expiry_push: Arc::new(Mutex::new(None)),
            client,
            credentials,
            notifier,
            reloader: None,
            default_seconds: Arc::new(AtomicU64::new(default_seconds)),
            add_seconds: add_minutes * 60,
            now_provider: Arc::new(Utc::now),
            monotonic: Arc::new(move || origin.elapsed().as_millis() as u64),
            spawn_ticker: true,
        }
    }

    pub fn with_clocks(mut self, now_provider: NowProvider, monotonic: MonotonicClock) -> Self {
        self.now_provider = now_provider;
        self.monotonic = monotonic;
        self
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    /// Runs after every stop or expiry, once the duration push has settled.
    pub fn with_reloader(mut self, reloader: Arc<dyn TaskReloader>) -> Self {
        self.reloader = Some(reloader);
        self
    }

    /// Ticks are driven by the caller through [`TimerEngine::tick`].
    pub fn with_manual_ticks(mut self) -> Self {
        self.spawn_ticker = false;
        self
    }

    pub async fn snapshot(&self) -> TimerSnapshot {
        let mut state = self.state.lock().await;
        if state.is_running {
            state.remaining_seconds = state.remaining_at((self.monotonic)());
        }
        TimerSnapshot::of(&state)
    }

    pub async fn select_task(&self, task_id: &str) -> bool {
        self.state.lock().await.select_task(task_id)
    }

    /// Drops the selection when it is not in `known_ids` and no session is running.
    pub async fn retain_selection(&self, known_ids: &[String]) {
        let mut state = self.state.lock().await;
        let missing = state
            .selected_task_id
            .as_ref()
            .is_some_and(|selected| !known_ids.contains(selected));
        if missing {
            state.clear_selection();
        }
    }

    pub async fn start(&self, task_id: Option<&str>) -> TransitionOutcome {
        let started = {
            let mut state = self.state.lock().await;
            state.start(task_id, (self.now_provider)(), (self.monotonic)())
        };
        let Some(task_id) = started else {
            return TransitionOutcome::rejected();
        };

        info!(task_id = %task_id, "timer started");
        self.restart_ticker().await;
        TransitionOutcome {
            applied: true,
            effect: self.spawn_effect("stamp start time", {
                let client = Arc::clone(&self.client);
                let now = (self.now_provider)();
                move |token| async move { stamp_start_time(client, token, task_id, now).await }
            }),
        }
    }

    pub async fn pause(&self) -> bool {
        let paused = self.state.lock().await.pause((self.monotonic)());
        if paused {
            self.stop_ticker().await;
        }
        paused
    }

    pub async fn resume(&self) -> bool {
        let resumed = self.state.lock().await.resume((self.monotonic)());
        if resumed {
            self.restart_ticker().await;
        }
        resumed
    }

    pub async fn add_time(&self) -> TimerSnapshot {
        let mut state = self.state.lock().await;
        state.add_time(self.add_seconds);
        TimerSnapshot::of(&state)
    }

    pub async fn stop(&self) -> TransitionOutcome {
        let finished = self.state.lock().await.stop((self.now_provider)());
        let Some(finished) = finished else {
            return TransitionOutcome::rejected();
        };
        self.stop_ticker().await;
        TransitionOutcome {
            applied: true,
            effect: self.finish_session(finished),
        }
    }

    pub async fn cancel(&self) -> bool {
        let cancelled = self.state.lock().await.cancel();
        if cancelled {
            self.stop_ticker().await;
            info!("timer cancelled");
        }
        cancelled
    }

    pub async fn reset(&self) -> bool {
        let default_seconds = self.default_seconds.load(Ordering::SeqCst);
        self.state.lock().await.reset(default_seconds)
    }

    /// Changes the default session length; applied immediately when idle.
    pub async fn set_default_minutes(&self, minutes: u64) -> TimerSnapshot {
        self.default_seconds.store(minutes * 60, Ordering::SeqCst);
        let mut state = self.state.lock().await;
        state.reset(minutes * 60);
        TimerSnapshot::of(&state)
    }

    /// Advances the countdown. Returns `false` once the session is no longer
    /// running, which ends the ticker loop.
    pub async fn tick(&self) -> bool {
        let mut state = self.state.lock().await;
        match state.tick((self.monotonic)()) {
            TickOutcome::Inactive => false,
            TickOutcome::Remaining(_) => {
                if state.is_paused {
                    return false;
                }
                self.notifier.on_tick(&TimerSnapshot::of(&state));
                true
            }
            TickOutcome::Expired => {
                let finished = state.stop((self.now_provider)());
                let snapshot = TimerSnapshot::of(&state);
                drop(state);

                self.notifier.on_complete(&snapshot);
                if let Some(finished) = finished {
                    *self.expiry_push.lock().await = self.finish_session(finished);
                }
                false
            }
        }
    }

    /// Handle of the push and reload started by the last natural expiry.
    pub async fn take_expiry_push(&self) -> Option<JoinHandle<()>> {
        self.expiry_push.lock().await.take()
    }

    async fn restart_ticker(&self) {
        let mut ticker = self.ticker.lock().await;
        if let Some(previous) = ticker.take() {
            previous.abort();
        }
        if !self.spawn_ticker {
            return;
        }
        let engine = self.clone();
        *ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                if !engine.tick().await {
                    break;
                }
            }
        }));
    }

    async fn stop_ticker(&self) {
        if let Some(ticker) = self.ticker.lock().await.take() {
            ticker.abort();
        }
    }

    fn finish_session(&self, finished: FinishedSession) -> Option<JoinHandle<()>> {
        info!(task_id = ?finished.task_id, minutes = finished.minutes, "timer stopped");
        let minutes = finished.minutes;
        let push_to = finished.task_id.filter(|_| minutes > 0);
        if push_to.is_none() && self.reloader.is_none() {
            return None;
        }
        let client = Arc::clone(&self.client);
        let reloader = self.reloader.clone();
        let engine = self.clone();
        self.spawn_effect("finish session", move |token| async move {
            if let Some(task_id) = push_to {
                if let Err(error) = push_session_duration(client, token.clone(), task_id, minutes).await {
                    warn!(%error, "failed to push session duration");
                }
            }
            if let Some(reloader) = reloader {
                let known_ids = reloader.reload_task_ids(&token).await?;
                engine.retain_selection(&known_ids).await;
            }
            Ok(())
        })
    }

    /// Spawns a best-effort remote call. Without a token nothing is spawned.
    fn spawn_effect<F, Fut>(&self, action: &'static str, effect: F) -> Option<JoinHandle<()>>
    where
        F: FnOnce(String) -> Fut,
        Fut: std::future::Future<Output = Result<(), InfraError>> + Send + 'static,
    {
        let token = match self.credentials.load_token() {
            Ok(Some(token)) => token,
            Ok(None) => return None,
            Err(error) => {
                warn!(%error, action, "skipping remote update");
                return None;
            }
        };
        let future = effect(token);
        Some(tokio::spawn(async move {
            if let Err(error) = future.await {
                warn!(%error, action, "remote update failed");
            }
        }))
    }
}

fn duration_in_minutes(spec: Option<&DurationSpec>) -> f64 {
    let Some(spec) = spec else {
        return 0.0;
    };
    let amount = spec.amount.filter(|value| value.is_finite()).unwrap_or(0.0);
    match spec.unit.as_deref() {
        Some("minute") => amount,
        Some("hour") => amount * 60.0,
        _ => 0.0,
    }
}

/// Sets the due datetime to `now` unless the task already has one.
pub async fn stamp_start_time(
    client: Arc<dyn TodoistClient>,
    access_token: String,
    task_id: String,
    now: DateTime<Utc>,
) -> Result<(), InfraError> {
    let Some(task) = client.get_task(&access_token, &task_id).await? else {
        return Ok(());
    };
    let has_datetime = task
        .due
        .as_ref()
        .and_then(|due| due.datetime.as_deref())
        .is_some_and(|value| !value.trim().is_empty());
    if has_datetime {
        return Ok(());
    }
    client
        .update_task(&access_token, &task_id, &TaskUpdate::due_at(now))
        .await
}

/// Adds `minutes` to the task's recorded duration, always writing minutes back.
pub async fn push_session_duration(
    client: Arc<dyn TodoistClient>,
    access_token: String,
    task_id: String,
    minutes: i64,
) -> Result<(), InfraError> {
    let Some(task) = client.get_task(&access_token, &task_id).await? else {
        return Ok(());
    };
    let current = duration_in_minutes(task.duration.as_ref());
    let total = (current + minutes as f64).round() as i64;
    client
        .update_task(&access_token, &task_id, &TaskUpdate::duration_minutes(total))
        .await?;
    info!(task_id = %task_id, added = minutes, total, "pushed session duration");
    Ok(())
}

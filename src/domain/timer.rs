use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimerPhase {
    Idle,
    Running,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Inactive,
    Remaining(u64),
    Expired,
}

/// A session that ended through `stop`, ready to be reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedSession {
    pub task_id: Option<String>,
    pub minutes: i64,
}

/// Countdown state for a single focus session.
///
/// Remaining time is always derived from a monotonic start instant minus paused
/// intervals, so it does not matter how many ticks actually ran. Monotonic
/// instants are plain milliseconds from whatever clock the caller uses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimerState {
    pub duration_seconds: u64,
    pub remaining_seconds: u64,
    pub is_running: bool,
    pub is_paused: bool,
    pub session_started_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub monotonic_start_ms: Option<u64>,
    #[serde(skip)]
    pub paused_accumulated_ms: u64,
    #[serde(skip)]
    pub pause_started_ms: Option<u64>,
    pub selected_task_id: Option<String>,
}

impl TimerState {
    pub fn new(default_seconds: u64) -> Self {
        Self {
            duration_seconds: default_seconds,
            remaining_seconds: default_seconds,
            is_running: false,
            is_paused: false,
            session_started_at: None,
            monotonic_start_ms: None,
            paused_accumulated_ms: 0,
            pause_started_ms: None,
            selected_task_id: None,
        }
    }

    pub fn phase(&self) -> TimerPhase {
        match (self.is_running, self.is_paused) {
            (false, _) => TimerPhase::Idle,
            (true, false) => TimerPhase::Running,
            (true, true) => TimerPhase::Paused,
        }
    }

    pub fn select_task(&mut self, task_id: &str) -> bool {
        let task_id = task_id.trim();
        if self.is_running || task_id.is_empty() {
            return false;
        }
        self.selected_task_id = Some(task_id.to_string());
        true
    }

    pub fn clear_selection(&mut self) {
        if !self.is_running {
            self.selected_task_id = None;
        }
    }

    /// Starts a session for `task_id` (or the current selection). Returns the task id
    /// the session runs against, or `None` when the start was rejected.
    pub fn start(
        &mut self,
        task_id: Option<&str>,
        wall_now: DateTime<Utc>,
        now_ms: u64,
    ) -> Option<String> {
        if self.is_running {
            return None;
        }
        if let Some(task_id) = task_id.map(str::trim).filter(|value| !value.is_empty()) {
            self.selected_task_id = Some(task_id.to_string());
        }
        let task_id = self.selected_task_id.clone()?;

        self.is_running = true;
        self.is_paused = false;
        self.session_started_at = Some(wall_now);
        self.monotonic_start_ms = Some(now_ms);
        self.paused_accumulated_ms = 0;
        self.pause_started_ms = None;
        self.remaining_seconds = self.duration_seconds;
        Some(task_id)
    }

    pub fn active_elapsed_ms(&self, now_ms: u64) -> u64 {
        let Some(start) = self.monotonic_start_ms else {
            return 0;
        };
        let current_pause = match (self.is_paused, self.pause_started_ms) {
            (true, Some(pause_start)) => now_ms.saturating_sub(pause_start),
            _ => 0,
        };
        now_ms
            .saturating_sub(start)
            .saturating_sub(self.paused_accumulated_ms)
            .saturating_sub(current_pause)
    }

    pub fn remaining_at(&self, now_ms: u64) -> u64 {
        if !self.is_running {
            return self.remaining_seconds;
        }
        let elapsed_seconds = self.active_elapsed_ms(now_ms) / 1000;
        self.duration_seconds.saturating_sub(elapsed_seconds)
    }

    pub fn tick(&mut self, now_ms: u64) -> TickOutcome {
        if !self.is_running || self.monotonic_start_ms.is_none() {
            return TickOutcome::Inactive;
        }
        self.remaining_seconds = self.remaining_at(now_ms);
        if self.remaining_seconds == 0 {
            TickOutcome::Expired
        } else {
            TickOutcome::Remaining(self.remaining_seconds)
        }
    }

    pub fn pause(&mut self, now_ms: u64) -> bool {
        if !self.is_running || self.is_paused {
            return false;
        }
        self.remaining_seconds = self.remaining_at(now_ms);
        self.is_paused = true;
        self.pause_started_ms = Some(now_ms);
        true
    }

    pub fn resume(&mut self, now_ms: u64) -> bool {
        if !self.is_paused {
            return false;
        }
        if let Some(pause_start) = self.pause_started_ms.take() {
            self.paused_accumulated_ms = self
                .paused_accumulated_ms
                .saturating_add(now_ms.saturating_sub(pause_start));
        }
        self.is_paused = false;
        true
    }

    pub fn add_time(&mut self, seconds: u64) {
        self.duration_seconds = self.duration_seconds.saturating_add(seconds);
        self.remaining_seconds = self.remaining_seconds.saturating_add(seconds);
    }

    pub fn stop(&mut self, wall_now: DateTime<Utc>) -> Option<FinishedSession> {
        if !self.is_running {
            return None;
        }
        let minutes = self
            .session_started_at
            .map(|started| {
                let elapsed_ms = (wall_now - started).num_milliseconds().max(0);
                (elapsed_ms as f64 / 60_000.0).round() as i64
            })
            .unwrap_or(0);
        let finished = FinishedSession {
            task_id: self.selected_task_id.clone(),
            minutes,
        };
        self.clear_session();
        Some(finished)
    }

    pub fn cancel(&mut self) -> bool {
        if !self.is_running {
            return false;
        }
        self.clear_session();
        true
    }

    pub fn reset(&mut self, default_seconds: u64) -> bool {
        if self.is_running {
            return false;
        }
        self.duration_seconds = default_seconds;
        self.remaining_seconds = default_seconds;
        self.clear_session();
        true
    }

    pub fn display(&self) -> String {
        format!(
            "{:02}:{:02}",
            self.remaining_seconds / 60,
            self.remaining_seconds % 60
        )
    }

    fn clear_session(&mut self) {
        self.is_running = false;
        self.is_paused = false;
        self.remaining_seconds = self.duration_seconds;
        self.session_started_at = None;
        self.monotonic_start_ms = None;
        self.paused_accumulated_ms = 0;
        self.pause_started_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fixed_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-02-16T09:00:00Z")
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn running_timer(seconds: u64) -> TimerState {
        let mut timer = TimerState::new(seconds);
        timer.select_task("task-1");
        timer.start(None, fixed_time(), 0).expect("start");
        timer
    }

    #[test]
    fn start_without_task_is_rejected() {
        let mut timer = TimerState::new(1500);
        assert_eq!(timer.start(None, fixed_time(), 0), None);
        assert_eq!(timer.phase(), TimerPhase::Idle);
    }

    #[test]
    fn start_while_running_is_rejected() {
        let mut timer = running_timer(1500);
        assert_eq!(timer.start(Some("task-2"), fixed_time(), 10), None);
        assert_eq!(timer.selected_task_id.as_deref(), Some("task-1"));
    }

    #[test]
    fn select_is_locked_while_running() {
        let mut timer = running_timer(1500);
        assert!(!timer.select_task("task-2"));
        assert_eq!(timer.selected_task_id.as_deref(), Some("task-1"));
    }

    #[test]
    fn pause_when_idle_is_a_noop() {
        let mut timer = TimerState::new(1500);
        let before = timer.clone();
        assert!(!timer.pause(5_000));
        assert_eq!(timer, before);
    }

    #[test]
    fn paused_interval_is_excluded_from_elapsed_time() {
        let mut timer = running_timer(1500);
        assert!(timer.pause(60_000));
        assert_eq!(timer.tick(600_000), TickOutcome::Remaining(1440));
        assert!(timer.resume(600_000));
        assert_eq!(timer.tick(660_000), TickOutcome::Remaining(1380));
    }

    #[test]
    fn expiry_is_reported_once_elapsed_reaches_duration() {
        let mut timer = running_timer(1500);
        assert_eq!(timer.tick(1_499_999), TickOutcome::Remaining(1));
        assert_eq!(timer.tick(1_500_000), TickOutcome::Expired);
    }

    #[test]
    fn add_time_extends_duration_in_any_state() {
        let mut idle = TimerState::new(1500);
        idle.add_time(1500);
        assert_eq!((idle.duration_seconds, idle.remaining_seconds), (3000, 3000));

        let mut running = running_timer(1500);
        running.add_time(1500);
        assert_eq!(running.tick(1_500_000), TickOutcome::Remaining(1500));
    }

    #[test]
    fn stop_reports_rounded_wall_clock_minutes() {
        let mut timer = running_timer(1500);
        let finished = timer
            .stop(fixed_time() + chrono::Duration::seconds(12 * 60 + 31))
            .expect("stop running timer");
        assert_eq!(finished.minutes, 13);
        assert_eq!(finished.task_id.as_deref(), Some("task-1"));
        assert_eq!(timer.phase(), TimerPhase::Idle);
        assert_eq!(timer.remaining_seconds, 1500);
        assert!(timer.stop(fixed_time()).is_none());
    }

    #[test]
    fn cancel_discards_the_session() {
        let mut timer = running_timer(1500);
        timer.pause(1_000);
        assert!(timer.cancel());
        assert_eq!(timer.phase(), TimerPhase::Idle);
        assert!(timer.session_started_at.is_none());
        assert!(!timer.cancel());
    }

    #[test]
    fn reset_only_applies_while_idle() {
        let mut timer = running_timer(1500);
        timer.add_time(1500);
        assert!(!timer.reset(1500));
        timer.cancel();
        assert!(timer.reset(1500));
        assert_eq!(timer.duration_seconds, 1500);
        assert_eq!(timer.display(), "25:00");
    }

    // Remaining time depends only on total elapsed and total paused time.
    proptest! {
        #[test]
        fn remaining_time_ignores_tick_count(
            run_ms in proptest::collection::vec(0u64..400_000, 1..6),
            pause_ms in proptest::collection::vec(0u64..400_000, 1..6),
            ticks_per_segment in 0usize..5
        ) {
            let mut ticked = running_timer(3600);
            let mut silent = running_timer(3600);
            let mut now = 0u64;
            let mut total_run = 0u64;

            for (run, pause) in run_ms.iter().zip(pause_ms.iter()) {
                for step in 1..=ticks_per_segment {
                    let _ = ticked.tick(now + run * step as u64 / ticks_per_segment as u64);
                }
                now += run;
                total_run += run;
                ticked.pause(now);
                silent.pause(now);
                now += pause;
                ticked.resume(now);
                silent.resume(now);
            }

            let expected = 3600u64.saturating_sub(total_run / 1000);
            prop_assert_eq!(ticked.remaining_at(now), expected);
            prop_assert_eq!(silent.remaining_at(now), expected);
        }
    }
}

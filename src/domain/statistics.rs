use crate::domain::local_zone::LocalZone;
use crate::domain::models::{CompletedTask, UNTAGGED_LABEL};
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const LABEL_COLORS: [&str; 12] = [
    "#007AFF", "#0051D5", "#003D82", "#5AC8FA", "#32ADE6", "#1F8FD6", "#AF52DE", "#8E44AD",
    "#6C3483", "#BF5AF2", "#9B59B6", "#7D3C98",
];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StatsWindow {
    Day,
    Last7Days,
    WorkingWeek,
    Month,
}

impl StatsWindow {
    fn heading(self) -> &'static str {
        match self {
            Self::Day => "Today's Completed Tasks",
            Self::Last7Days => "Last 7 Days Completed Tasks",
            Self::WorkingWeek => "This Working Week's Completed Tasks",
            Self::Month => "This Month's Completed Tasks",
        }
    }

    fn bar_name(self) -> &'static str {
        match self {
            Self::Day => "Today",
            Self::Last7Days => "Week",
            Self::WorkingWeek => "Working Week",
            Self::Month => "Month",
        }
    }

    fn day_titles(self) -> Option<DayTitleStyle> {
        match self {
            Self::Last7Days => Some(DayTitleStyle::MonthDay),
            Self::WorkingWeek => Some(DayTitleStyle::Weekday),
            Self::Day | Self::Month => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayTitleStyle {
    Weekday,
    MonthDay,
}

/// Half-open `[start, end)` range in UTC covering whole local days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRange {
    pub first_day: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl WindowRange {
    pub fn contains(&self, instant: Option<DateTime<Utc>>) -> bool {
        instant.is_some_and(|value| value >= self.start && value < self.end)
    }
}

pub fn window_range(window: StatsWindow, today: NaiveDate, zone: &LocalZone) -> WindowRange {
    let (first_day, end_day) = match window {
        StatsWindow::Day => (today, today + Duration::days(1)),
        StatsWindow::Last7Days => (today - Duration::days(6), today + Duration::days(1)),
        StatsWindow::WorkingWeek => {
            let monday =
                today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
            (monday, monday + Duration::days(7))
        }
        StatsWindow::Month => {
            let first = today.with_day(1).unwrap_or(today);
            let next = first
                .checked_add_months(Months::new(1))
                .unwrap_or(NaiveDate::MAX);
            (first, next)
        }
    };

    WindowRange {
        first_day,
        start: zone.start_of_day(first_day),
        end: zone.start_of_day(end_day),
    }
}

pub fn bucket_by_window<'a>(
    tasks: &'a [CompletedTask],
    range: &WindowRange,
) -> Vec<&'a CompletedTask> {
    tasks
        .iter()
        .filter(|task| range.contains(task.completed_at))
        .collect()
}

/// Minutes credited to a completed task: parsed duration, then the raw remote
/// duration (minute/hour only), then the configured default.
pub fn task_duration_minutes(task: &CompletedTask, default_minutes: f64) -> f64 {
    if let Some(parsed) = task.task.parsed_duration_minutes.filter(|value| *value > 0.0) {
        return parsed;
    }
    task.task
        .remote_duration
        .as_ref()
        .and_then(|spec| {
            let amount = spec.amount.filter(|value| value.is_finite() && *value != 0.0)?;
            match spec.unit.as_deref() {
                Some("minute") => Some(amount),
                Some("hour") => Some(amount * 60.0),
                _ => None,
            }
        })
        .unwrap_or(default_minutes)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabelMinutes {
    pub label: String,
    pub minutes: f64,
}

/// Minutes per label in first-seen order, plus the grand total.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LabelStats {
    pub entries: Vec<LabelMinutes>,
    pub total: f64,
}

impl LabelStats {
    pub fn get(&self, label: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|entry| entry.label == label)
            .map(|entry| entry.minutes)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn add(&mut self, label: &str, minutes: f64) {
        match self.entries.iter_mut().find(|entry| entry.label == label) {
            Some(entry) => entry.minutes += minutes,
            None => self.entries.push(LabelMinutes {
                label: label.to_string(),
                minutes,
            }),
        }
        self.total += minutes;
    }
}

pub fn group_by_label<'a, I>(tasks: I, default_minutes: f64) -> LabelStats
where
    I: IntoIterator<Item = &'a CompletedTask>,
{
    let mut stats = LabelStats::default();
    for task in tasks {
        let duration = task_duration_minutes(task, default_minutes);
        let labels: Vec<&str> = if task.task.labels.is_empty() {
            vec![UNTAGGED_LABEL]
        } else {
            task.task.labels.iter().map(String::as_str).collect()
        };
        let share = duration / labels.len() as f64;
        for label in labels {
            stats.add(label, share);
        }
    }
    stats
}

#[derive(Debug, Clone, PartialEq)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub title: String,
    pub stats: LabelStats,
}

pub fn daily_breakdown(
    tasks: &[&CompletedTask],
    window_start: NaiveDate,
    zone: &LocalZone,
    style: DayTitleStyle,
    default_minutes: f64,
) -> Vec<DailyStats> {
    const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

    (0..7)
        .map(|offset| {
            let date = window_start + Duration::days(offset);
            let day = WindowRange {
                first_day: date,
                start: zone.start_of_day(date),
                end: zone.start_of_day(date + Duration::days(1)),
            };
            let stats = group_by_label(
                tasks
                    .iter()
                    .copied()
                    .filter(|task| day.contains(task.completed_at)),
                default_minutes,
            );
            let title = match style {
                DayTitleStyle::Weekday => WEEKDAYS[offset as usize].to_string(),
                DayTitleStyle::MonthDay => format!("{}/{}", date.month(), date.day()),
            };
            DailyStats { date, title, stats }
        })
        .collect()
}

/// Session-scoped label colors, handed out in first-seen order.
#[derive(Debug, Clone, Default)]
pub struct ColorPalette {
    assigned: HashMap<String, &'static str>,
}

impl ColorPalette {
    pub fn color_for(&mut self, label: &str) -> &'static str {
        if let Some(color) = self.assigned.get(label).copied() {
            return color;
        }
        let color = LABEL_COLORS[self.assigned.len() % LABEL_COLORS.len()];
        self.assigned.insert(label.to_string(), color);
        color
    }

    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}

pub fn format_minutes(minutes: f64) -> String {
    let rounded = minutes.max(0.0).round() as u64;
    if rounded < 60 {
        return format!("{rounded}m");
    }
    let (hours, rest) = (rounded / 60, rounded % 60);
    if rest == 0 {
        format!("{hours}h")
    } else {
        format!("{hours}h {rest}m")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BarSegment {
    pub label: String,
    pub minutes: f64,
    pub display: String,
    pub share: f64,
    pub color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChartBar {
    pub name: String,
    pub total_minutes: f64,
    pub display: String,
    pub height_ratio: f64,
    pub segments: Vec<BarSegment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub title: String,
    pub total_minutes: f64,
    pub display: String,
    pub segments: Vec<BarSegment>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatsReport {
    pub window: StatsWindow,
    pub title: String,
    pub total_minutes: f64,
    pub bars: Vec<ChartBar>,
    pub daily: Vec<DailyBar>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatsView {
    AuthRequired,
    NeedsRefresh,
    NoData,
    Report(StatsReport),
}

fn segment(label: &str, minutes: f64, total: f64, palette: &mut ColorPalette) -> BarSegment {
    BarSegment {
        label: label.to_string(),
        minutes,
        display: format_minutes(minutes),
        share: if total > 0.0 { minutes / total } else { 0.0 },
        color: palette.color_for(label).to_string(),
    }
}

/// Bars scaled against the largest total; segments sorted by label name.
pub fn normalize_bars(series: &[(String, LabelStats)], palette: &mut ColorPalette) -> Vec<ChartBar> {
    let max_total = series
        .iter()
        .map(|(_, stats)| stats.total)
        .fold(0.0_f64, f64::max);

    series
        .iter()
        .map(|(name, stats)| {
            let mut entries: Vec<&LabelMinutes> =
                stats.entries.iter().filter(|entry| entry.minutes > 0.0).collect();
            entries.sort_by(|left, right| left.label.cmp(&right.label));
            ChartBar {
                name: name.clone(),
                total_minutes: stats.total,
                display: format_minutes(stats.total),
                height_ratio: if max_total > 0.0 {
                    stats.total / max_total
                } else {
                    0.0
                },
                segments: entries
                    .into_iter()
                    .map(|entry| segment(&entry.label, entry.minutes, stats.total, palette))
                    .collect(),
            }
        })
        .collect()
}

pub fn build_report(
    window: StatsWindow,
    tasks: &[CompletedTask],
    today: NaiveDate,
    zone: &LocalZone,
    default_minutes: f64,
    palette: &mut ColorPalette,
) -> StatsReport {
    let range = window_range(window, today, zone);
    let in_window = bucket_by_window(tasks, &range);
    let stats = group_by_label(in_window.iter().copied(), default_minutes);
    let total_minutes = stats.total;

    let bars = if stats.is_empty() {
        Vec::new()
    } else {
        normalize_bars(&[(window.bar_name().to_string(), stats)], palette)
    };

    let daily = window
        .day_titles()
        .map(|style| {
            daily_breakdown(&in_window, range.first_day, zone, style, default_minutes)
                .into_iter()
                .map(|day| DailyBar {
                    date: day.date,
                    title: day.title,
                    total_minutes: day.stats.total,
                    display: format_minutes(day.stats.total),
                    segments: day
                        .stats
                        .entries
                        .iter()
                        .map(|entry| segment(&entry.label, entry.minutes, day.stats.total, palette))
                        .collect(),
                })
                .collect()
        })
        .unwrap_or_default();

    StatsReport {
        window,
        title: format!("{} ({})", window.heading(), format_minutes(total_minutes)),
        total_minutes,
        bars,
        daily,
    }
}

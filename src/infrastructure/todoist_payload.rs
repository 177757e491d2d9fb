use crate::domain::models::{lenient_id, lenient_optional_id, Due, DurationSpec, RawLabels, RawTask};
use chrono::{DateTime, NaiveDateTime, Utc};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct RemoteProject {
    #[serde(deserialize_with = "lenient_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_inbox_project: bool,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct RemoteComment {
    #[serde(deserialize_with = "lenient_id")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_optional_id")]
    pub task_id: Option<String>,
    #[serde(default)]
    pub content: String,
}

/// One record from the sync completed-items endpoint.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Default)]
pub struct CompletedItem {
    #[serde(default, deserialize_with = "lenient_optional_id")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_optional_id")]
    pub task_id: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default, deserialize_with = "lenient_optional_id")]
    pub project_id: Option<String>,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub completed_date: Option<String>,
    #[serde(default)]
    pub labels: Option<RawLabels>,
    #[serde(default)]
    pub due: Option<Due>,
    #[serde(default)]
    pub duration: Option<DurationSpec>,
}

impl CompletedItem {
    pub fn remote_task_id(&self) -> Option<&str> {
        self.task_id
            .as_deref()
            .or(self.id.as_deref())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
            .as_deref()
            .or(self.completed_date.as_deref())
            .and_then(parse_remote_timestamp)
    }

    pub fn to_raw_task(&self) -> RawTask {
        RawTask {
            id: self.remote_task_id().unwrap_or_default().to_string(),
            content: self.content.clone(),
            project_id: self.project_id.clone(),
            labels: self.labels.clone(),
            due: self.due.clone(),
            duration: self.duration.clone(),
        }
    }
}

/// Detail fields win over the completion event; the id always comes from the event.
pub fn merge_completed_item(item: &CompletedItem, detail: Option<RawTask>) -> RawTask {
    let fallback = item.to_raw_task();
    let Some(detail) = detail else {
        return fallback;
    };
    RawTask {
        id: fallback.id,
        content: if detail.content.trim().is_empty() {
            fallback.content
        } else {
            detail.content
        },
        project_id: detail.project_id.or(fallback.project_id),
        labels: detail.labels.or(fallback.labels),
        due: detail.due.or(fallback.due),
        duration: detail.duration.or(fallback.duration),
    }
}

pub fn parse_remote_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

#[derive(Debug, Clone, serde::Serialize, PartialEq, Eq, Default)]
pub struct TaskUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_datetime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_unit: Option<String>,
}

impl TaskUpdate {
    pub fn due_at(instant: DateTime<Utc>) -> Self {
        Self {
            due_datetime: Some(instant.to_rfc3339_opts(chrono::SecondsFormat::Secs, true)),
            ..Self::default()
        }
    }

    pub fn duration_minutes(minutes: i64) -> Self {
        Self {
            duration: Some(minutes),
            duration_unit: Some("minute".to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, PartialEq, Eq)]
pub struct NewTask {
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

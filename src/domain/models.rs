use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

pub const UNTAGGED_LABEL: &str = "Untagged";
pub const GOALS_DOCUMENT_VERSION: u32 = 1;

/// One entry of a task's remote label list: either a label name or a numeric id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum LabelRef {
    ById(i64),
    ByName(String),
}

/// The remote label field as it appears across API generations.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RawLabels {
    List(Vec<LabelRef>),
    LegacyCsv(String),
}

impl<'de> Deserialize<'de> for RawLabels {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // List entries that are neither names nor integer ids are dropped.
        let labels = match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(raw) => Self::LegacyCsv(raw),
            serde_json::Value::Array(items) => {
                Self::List(items.into_iter().filter_map(label_ref_from_value).collect())
            }
            _ => Self::List(Vec::new()),
        };
        Ok(labels)
    }
}

fn label_ref_from_value(value: serde_json::Value) -> Option<LabelRef> {
    match value {
        serde_json::Value::String(name) => Some(LabelRef::ByName(name)),
        serde_json::Value::Number(number) => number.as_i64().map(LabelRef::ById),
        _ => None,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DurationSpec {
    #[serde(default, deserialize_with = "lenient_amount")]
    pub amount: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
}

impl DurationSpec {
    pub fn minutes(amount: f64) -> Self {
        Self {
            amount: Some(amount),
            unit: Some("minute".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Due {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub datetime: Option<String>,
}

/// A parsed due datetime. Floating values carry no offset and mean local
/// wall-clock time wherever the user is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueAt {
    Instant(DateTime<Utc>),
    Floating(NaiveDateTime),
}

impl Due {
    pub fn due_at(&self) -> Option<DueAt> {
        let raw = self.datetime.as_deref()?.trim();
        if let Ok(value) = DateTime::parse_from_rfc3339(raw) {
            return Some(DueAt::Instant(value.with_timezone(&Utc)));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(DueAt::Floating)
    }

    /// The due instant, when the datetime carries an explicit offset.
    pub fn datetime_utc(&self) -> Option<DateTime<Utc>> {
        match self.due_at()? {
            DueAt::Instant(instant) => Some(instant),
            DueAt::Floating(_) => None,
        }
    }

    pub fn date_only(&self) -> Option<NaiveDate> {
        let raw = self.date.as_deref()?.trim();
        let head = raw.get(..10).unwrap_or(raw);
        NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
    }
}

/// A task record as returned by the remote service, before normalization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RawTask {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, deserialize_with = "lenient_optional_id")]
    pub project_id: Option<String>,
    #[serde(default)]
    pub labels: Option<RawLabels>,
    #[serde(default)]
    pub due: Option<Due>,
    #[serde(default)]
    pub duration: Option<DurationSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Label {
    #[serde(deserialize_with = "lenient_id")]
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub content: String,
    pub project_id: Option<String>,
    pub due: Option<Due>,
    pub labels: Vec<String>,
    pub parsed_duration_minutes: Option<f64>,
    pub remote_duration: Option<DurationSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompletedTask {
    pub task: Task,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct GoalEntry {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GoalsDocument {
    #[serde(default = "default_document_version")]
    pub version: u32,
    #[serde(default)]
    pub goals: BTreeMap<String, GoalEntry>,
}

impl Default for GoalsDocument {
    fn default() -> Self {
        Self {
            version: GOALS_DOCUMENT_VERSION,
            goals: BTreeMap::new(),
        }
    }
}

fn default_document_version() -> u32 {
    GOALS_DOCUMENT_VERSION
}

fn lenient_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(serde_json::Value::as_f64))
}

fn id_from_value(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(raw) => {
            let trimmed = raw.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        serde_json::Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

pub(crate) fn lenient_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(id_from_value).unwrap_or_default())
}

pub(crate) fn lenient_optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(id_from_value))
}

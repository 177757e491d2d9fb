use crate::domain::models::{DurationSpec, Label, LabelRef, RawLabels, RawTask, Task};
use std::collections::{HashMap, HashSet};

/// Lookup from label id (in its string form) to display name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelIndex {
    names: HashMap<String, String>,
}

impl LabelIndex {
    pub fn new(labels: &[Label]) -> Self {
        let names = labels
            .iter()
            .filter(|label| !label.id.trim().is_empty())
            .map(|label| (label.id.trim().to_string(), label.name.clone()))
            .collect();
        Self { names }
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn name_for(&self, key: &str) -> Option<&str> {
        self.names.get(key.trim()).map(String::as_str)
    }

    pub fn name_for_id(&self, id: i64) -> Option<&str> {
        self.name_for(&id.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTask {
    pub labels: Vec<String>,
    pub duration_minutes: Option<f64>,
}

#[derive(Debug, Default)]
struct NormalizedLabels {
    resolved: Vec<String>,
    mentions: Vec<String>,
}

impl NormalizedLabels {
    fn push_name(&mut self, raw: &str, index: &LabelIndex) {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return;
        }
        if let Some(mention) = trimmed.strip_prefix('@') {
            let mention = mention.trim();
            if !mention.is_empty() {
                self.mentions.push(mention.to_string());
            }
            return;
        }
        let resolved = index.name_for(trimmed).unwrap_or(trimmed);
        self.resolved.push(resolved.to_string());
    }

    fn push_id(&mut self, id: i64, index: &LabelIndex) {
        let resolved = index
            .name_for_id(id)
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| format!("label_{id}"));
        self.resolved.push(resolved);
    }
}

fn normalize_label_field(field: &RawLabels, index: &LabelIndex) -> NormalizedLabels {
    let mut normalized = NormalizedLabels::default();
    match field {
        RawLabels::List(entries) => {
            for entry in entries {
                match entry {
                    LabelRef::ById(id) => normalized.push_id(*id, index),
                    LabelRef::ByName(name) => normalized.push_name(name, index),
                }
            }
        }
        RawLabels::LegacyCsv(raw) => {
            for token in raw.split(',') {
                normalized.push_name(token, index);
            }
        }
    }
    normalized
}

fn is_label_emoji(value: char) -> bool {
    matches!(
        u32::from(value),
        0x1F600..=0x1F64F
            | 0x1F300..=0x1F5FF
            | 0x1F680..=0x1F6FF
            | 0x1F1E0..=0x1F1FF
            | 0x2600..=0x26FF
            | 0x2700..=0x27BF
    )
}

/// Labels implied by a task title: emoji (glued to a following ASCII word) and `@mentions`.
pub fn extract_content_labels(content: &str) -> Vec<String> {
    let mut labels = Vec::new();

    for (offset, character) in content.char_indices() {
        if !is_label_emoji(character) {
            continue;
        }
        let rest = &content[offset + character.len_utf8()..];
        let word_len = rest
            .chars()
            .take_while(char::is_ascii_alphabetic)
            .count();
        let mut label = character.to_string();
        label.push_str(&rest[..word_len]);
        labels.push(label);
    }

    let mut remaining = content;
    while let Some(at) = remaining.find('@') {
        let after = &remaining[at + 1..];
        let token_len = after
            .char_indices()
            .find(|(_, character)| character.is_whitespace() || *character == '@')
            .map(|(index, _)| index)
            .unwrap_or(after.len());
        if token_len > 0 {
            labels.push(after[..token_len].to_string());
        }
        remaining = &after[token_len..];
    }

    labels
}

pub fn parse_duration_minutes(spec: &DurationSpec) -> Option<f64> {
    let amount = spec.amount.filter(|value| value.is_finite() && *value > 0.0)?;
    let factor = match spec.unit.as_deref().map(str::trim) {
        Some("minute") => 1.0,
        Some("hour") => 60.0,
        Some("day") => 1440.0,
        _ => return None,
    };
    Some(amount * factor)
}

fn dedupe_preserving_order(labels: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    labels
        .into_iter()
        .filter(|label| !label.trim().is_empty())
        .filter(|label| seen.insert(label.clone()))
        .collect()
}

pub fn parse_task(raw: &RawTask, index: &LabelIndex) -> ParsedTask {
    let normalized = raw
        .labels
        .as_ref()
        .map(|field| normalize_label_field(field, index))
        .unwrap_or_default();

    let mut labels = normalized.resolved;
    labels.extend(normalized.mentions);
    labels.extend(extract_content_labels(&raw.content));

    ParsedTask {
        labels: dedupe_preserving_order(labels),
        duration_minutes: raw.duration.as_ref().and_then(parse_duration_minutes),
    }
}

pub fn to_task(raw: &RawTask, index: &LabelIndex) -> Task {
    let parsed = parse_task(raw, index);
    Task {
        id: raw.id.clone(),
        content: raw.content.clone(),
        project_id: raw.project_id.clone(),
        due: raw.due.clone(),
        labels: parsed.labels,
        parsed_duration_minutes: parsed.duration_minutes,
        remote_duration: raw.duration.clone(),
    }
}

use crate::application::label_resolver::LabelResolver;
use crate::domain::models::{GoalEntry, GoalsDocument, RawLabels, RawTask};
use crate::domain::task_parser::LabelIndex;
use crate::infrastructure::cache::SnapshotCache;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::goals_codec::{
    decode_goals_comment, encode_goals_comment, has_goals_marker, DecodedGoals,
};
use crate::infrastructure::settings_repository::{SettingsRepository, SERVICE_RECORD_ID_KEY};
use crate::infrastructure::todoist_client::TodoistClient;
use crate::infrastructure::todoist_payload::NewTask;
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Where a goals document lives: a comment on the service record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentHandle {
    pub task_id: String,
    pub comment_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoredDocument {
    Found {
        document: GoalsDocument,
        handle: CommentHandle,
        needs_repair: bool,
    },
    /// The marker is present but no fenced block follows it.
    Unreadable { handle: CommentHandle },
    Malformed {
        handle: CommentHandle,
        reason: String,
    },
    Missing,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn read(&self, access_token: &str) -> Result<StoredDocument, InfraError>;

    /// Writes in place when `handle` is known, otherwise creates a new comment.
    async fn write(
        &self,
        access_token: &str,
        document: &GoalsDocument,
        handle: Option<&CommentHandle>,
    ) -> Result<CommentHandle, InfraError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureServiceRecordResult {
    Reused(String),
    LinkedExisting(String),
    Created(String),
}

impl EnsureServiceRecordResult {
    pub fn record_id(&self) -> &str {
        match self {
            Self::Reused(id) | Self::LinkedExisting(id) | Self::Created(id) => id,
        }
    }
}

fn has_no_labels(task: &RawTask) -> bool {
    match &task.labels {
        None => true,
        Some(RawLabels::List(entries)) => entries.is_empty(),
        Some(RawLabels::LegacyCsv(raw)) => raw.trim().is_empty(),
    }
}

pub struct CommentDocumentStore {
    client: Arc<dyn TodoistClient>,
    settings: Arc<dyn SettingsRepository>,
    record_name: String,
}

impl CommentDocumentStore {
    pub fn new(
        client: Arc<dyn TodoistClient>,
        settings: Arc<dyn SettingsRepository>,
        record_name: impl Into<String>,
    ) -> Self {
        Self {
            client,
            settings,
            record_name: record_name.into(),
        }
    }

    pub async fn locate_service_record(
        &self,
        access_token: &str,
    ) -> Result<EnsureServiceRecordResult, InfraError> {
        if let Some(record_id) = self.settings.get(SERVICE_RECORD_ID_KEY)? {
            if self.client.get_task(access_token, &record_id).await?.is_some() {
                return Ok(EnsureServiceRecordResult::Reused(record_id));
            }
            warn!(record_id = %record_id, "cached service record no longer exists");
            self.settings.remove(SERVICE_RECORD_ID_KEY)?;
        }

        let inbox_id = self
            .client
            .list_projects(access_token)
            .await?
            .into_iter()
            .find(|project| project.is_inbox_project)
            .map(|project| project.id);

        let candidates = self
            .client
            .list_tasks(access_token, inbox_id.as_deref())
            .await?;
        if let Some(existing) = candidates
            .into_iter()
            .find(|task| task.content.trim() == self.record_name && has_no_labels(task))
        {
            self.settings.set(SERVICE_RECORD_ID_KEY, &existing.id)?;
            return Ok(EnsureServiceRecordResult::LinkedExisting(existing.id));
        }

        let created = self
            .client
            .create_task(
                access_token,
                &NewTask {
                    content: self.record_name.clone(),
                    project_id: inbox_id,
                },
            )
            .await?;
        self.ensure_document_exists(access_token, &created.id).await?;
        self.settings.set(SERVICE_RECORD_ID_KEY, &created.id)?;
        info!(record_id = %created.id, "created goals service record");
        Ok(EnsureServiceRecordResult::Created(created.id))
    }

    pub async fn ensure_document_exists(
        &self,
        access_token: &str,
        record_id: &str,
    ) -> Result<(), InfraError> {
        let comments = self.client.list_comments(access_token, record_id).await?;
        if comments
            .iter()
            .any(|comment| has_goals_marker(&comment.content))
        {
            return Ok(());
        }
        let content = encode_goals_comment(&GoalsDocument::default())?;
        self.client
            .create_comment(access_token, record_id, &content)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for CommentDocumentStore {
    async fn read(&self, access_token: &str) -> Result<StoredDocument, InfraError> {
        let located = self.locate_service_record(access_token).await?;
        let record_id = located.record_id();
        let comments = self.client.list_comments(access_token, record_id).await?;

        for comment in comments {
            let Some(decoded) = decode_goals_comment(&comment.content) else {
                continue;
            };
            let handle = CommentHandle {
                task_id: record_id.to_string(),
                comment_id: comment.id,
            };
            return Ok(match decoded {
                DecodedGoals::Decoded {
                    document,
                    needs_repair,
                } => StoredDocument::Found {
                    document,
                    handle,
                    needs_repair,
                },
                DecodedGoals::NoFence => StoredDocument::Unreadable { handle },
                DecodedGoals::Malformed(reason) => StoredDocument::Malformed { handle, reason },
            });
        }
        Ok(StoredDocument::Missing)
    }

    async fn write(
        &self,
        access_token: &str,
        document: &GoalsDocument,
        handle: Option<&CommentHandle>,
    ) -> Result<CommentHandle, InfraError> {
        let content = encode_goals_comment(document)?;
        if let Some(handle) = handle {
            self.client
                .update_comment(access_token, &handle.comment_id, &content)
                .await?;
            return Ok(handle.clone());
        }

        let located = self.locate_service_record(access_token).await?;
        let created = self
            .client
            .create_comment(access_token, located.record_id(), &content)
            .await?;
        Ok(CommentHandle {
            task_id: located.record_id().to_string(),
            comment_id: created.id,
        })
    }
}

/// Partial update of a goal entry. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct GoalEdit {
    pub text: Option<String>,
    pub image: Option<String>,
    pub label: Option<String>,
    pub hidden: Option<bool>,
    pub completed: Option<bool>,
}

impl GoalEdit {
    fn apply(self, entry: &mut GoalEntry) {
        if let Some(text) = self.text {
            entry.text = text;
        }
        if let Some(image) = self.image {
            entry.image = image;
        }
        if let Some(label) = self.label {
            entry.label = label;
        }
        if let Some(hidden) = self.hidden {
            entry.hidden = hidden;
        }
        if let Some(completed) = self.completed {
            entry.completed = completed;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDocument {
    pub document: GoalsDocument,
    pub handle: Option<CommentHandle>,
    pub needs_repair: bool,
}

/// Fills empty display names from the label index. Returns whether anything changed.
pub fn backfill_labels(document: &mut GoalsDocument, index: &LabelIndex) -> bool {
    let mut changed = false;
    for (label_id, entry) in document.goals.iter_mut() {
        if !entry.label.trim().is_empty() {
            continue;
        }
        if let Some(name) = index.name_for(label_id) {
            entry.label = name.to_string();
            changed = true;
        }
    }
    changed
}

fn normalized_label_id(label_id: &str) -> Result<String, InfraError> {
    let label_id = label_id.trim();
    if label_id.is_empty() {
        return Err(InfraError::InvalidInput(
            "goal label id must not be empty".to_string(),
        ));
    }
    Ok(label_id.to_string())
}

pub struct GoalsService {
    store: Arc<dyn DocumentStore>,
    labels: Arc<LabelResolver>,
    cache: SnapshotCache<GoalsDocument>,
}

impl GoalsService {
    pub fn new(store: Arc<dyn DocumentStore>, labels: Arc<LabelResolver>) -> Self {
        Self {
            store,
            labels,
            cache: SnapshotCache::new("goals"),
        }
    }

    pub fn cached(&self) -> Result<Option<GoalsDocument>, InfraError> {
        self.cache.get()
    }

    pub async fn read_document(&self, access_token: &str) -> Result<LoadedDocument, InfraError> {
        let loaded = match self.store.read(access_token).await? {
            StoredDocument::Found {
                document,
                handle,
                needs_repair,
            } => LoadedDocument {
                document,
                handle: Some(handle),
                needs_repair,
            },
            StoredDocument::Malformed { handle, reason } => {
                // Never substitute an empty document for unreadable remote goals.
                let Some(document) = self.cache.get()? else {
                    return Err(InfraError::Remote(format!(
                        "goals document in comment {} is unreadable: {reason}",
                        handle.comment_id
                    )));
                };
                warn!(%reason, comment_id = %handle.comment_id, "goals document is malformed; using cached copy");
                LoadedDocument {
                    document,
                    handle: Some(handle),
                    needs_repair: false,
                }
            }
            StoredDocument::Unreadable { handle } => LoadedDocument {
                document: GoalsDocument::default(),
                handle: Some(handle),
                needs_repair: false,
            },
            StoredDocument::Missing => LoadedDocument {
                document: GoalsDocument::default(),
                handle: None,
                needs_repair: false,
            },
        };
        Ok(loaded)
    }

    pub async fn load_goals(
        &self,
        access_token: &str,
        force: bool,
    ) -> Result<GoalsDocument, InfraError> {
        if !force {
            if let Some(document) = self.cache.get()? {
                return Ok(document);
            }
        } else {
            self.labels.invalidate();
        }

        let index = self.labels.resolve_labels(access_token).await;
        let mut loaded = self.read_document(access_token).await?;
        let backfilled = backfill_labels(&mut loaded.document, &index);

        if backfilled || loaded.needs_repair {
            match self
                .store
                .write(access_token, &loaded.document, loaded.handle.as_ref())
                .await
            {
                Ok(_) => info!(backfilled, repaired = loaded.needs_repair, "rewrote goals document"),
                Err(error) => warn!(%error, "failed to persist repaired goals document"),
            }
        }

        self.cache.replace(loaded.document.clone())?;
        info!(goals = loaded.document.goals.len(), "loaded goals");
        Ok(loaded.document)
    }

    /// Replaces one entry. Reads the latest remote copy first; concurrent edits
    /// from elsewhere are overwritten by whoever writes last.
    pub async fn save_goal(
        &self,
        access_token: &str,
        label_id: &str,
        entry: GoalEntry,
    ) -> Result<GoalsDocument, InfraError> {
        let label_id = normalized_label_id(label_id)?;
        self.splice(access_token, |document| {
            document.goals.insert(label_id, entry);
        })
        .await
    }

    pub async fn update_goal(
        &self,
        access_token: &str,
        label_id: &str,
        edit: GoalEdit,
    ) -> Result<GoalsDocument, InfraError> {
        let label_id = normalized_label_id(label_id)?;
        self.splice(access_token, |document| {
            edit.apply(document.goals.entry(label_id).or_default());
        })
        .await
    }

    async fn splice<F>(&self, access_token: &str, change: F) -> Result<GoalsDocument, InfraError>
    where
        F: FnOnce(&mut GoalsDocument) + Send,
    {
        let mut loaded = self.read_document(access_token).await?;
        change(&mut loaded.document);
        let handle = self
            .store
            .write(access_token, &loaded.document, loaded.handle.as_ref())
            .await?;
        self.cache.replace(loaded.document.clone())?;
        info!(comment_id = %handle.comment_id, "saved goals document");
        Ok(loaded.document)
    }
}

use crate::application::label_resolver::LabelResolver;
use crate::domain::models::{CompletedTask, RawTask};
use crate::domain::task_parser::to_task;
use crate::infrastructure::cache::SnapshotCache;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::todoist_client::TodoistClient;
use crate::infrastructure::todoist_payload::{merge_completed_item, CompletedItem};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

type DetailResult = (usize, Option<RawTask>);

pub struct CompletedTaskAggregator {
    client: Arc<dyn TodoistClient>,
    labels: Arc<LabelResolver>,
    cache: SnapshotCache<Vec<CompletedTask>>,
    fetch_limit: usize,
    detail_concurrency: usize,
}

impl CompletedTaskAggregator {
    pub fn new(
        client: Arc<dyn TodoistClient>,
        labels: Arc<LabelResolver>,
        fetch_limit: usize,
        detail_concurrency: usize,
    ) -> Self {
        Self {
            client,
            labels,
            cache: SnapshotCache::new("completed tasks"),
            fetch_limit: fetch_limit.max(1),
            detail_concurrency: detail_concurrency.max(1),
        }
    }

    pub fn snapshot(&self) -> Result<Option<Vec<CompletedTask>>, InfraError> {
        self.cache.get()
    }

    pub fn invalidate(&self) -> Result<(), InfraError> {
        self.cache.clear()
    }

    /// Rebuilds the completed-task cache. Items whose detail lookup fails keep
    /// the fields of the completion event.
    pub async fn refresh(&self, access_token: &str) -> Result<usize, InfraError> {
        let index = self.labels.resolve_labels(access_token).await;
        let mut items = self
            .client
            .list_completed(access_token, self.fetch_limit)
            .await?;
        items.truncate(self.fetch_limit);

        let details = self.fetch_details(access_token, &items).await;
        let merged: Vec<CompletedTask> = items
            .iter()
            .zip(details)
            .map(|(item, detail)| CompletedTask {
                task: to_task(&merge_completed_item(item, detail), &index),
                completed_at: item.completed_at(),
            })
            .collect();

        let count = merged.len();
        self.cache.replace(merged)?;
        info!(count, "refreshed completed tasks");
        Ok(count)
    }

    async fn fetch_details(
        &self,
        access_token: &str,
        items: &[CompletedItem],
    ) -> Vec<Option<RawTask>> {
        let mut details = vec![None; items.len()];
        let mut lookups: JoinSet<DetailResult> = JoinSet::new();

        for (index, item) in items.iter().enumerate() {
            let Some(task_id) = item.remote_task_id().map(ToOwned::to_owned) else {
                continue;
            };
            let client = Arc::clone(&self.client);
            let access_token = access_token.to_string();

            lookups.spawn(async move {
                match client.get_task(&access_token, &task_id).await {
                    Ok(detail) => (index, detail),
                    Err(error) => {
                        warn!(%error, task_id = %task_id, "task detail lookup failed; using completion record");
                        (index, None)
                    }
                }
            });

            if lookups.len() >= self.detail_concurrency {
                collect_detail(&mut lookups, &mut details).await;
            }
        }

        while !lookups.is_empty() {
            collect_detail(&mut lookups, &mut details).await;
        }
        details
    }
}

async fn collect_detail(lookups: &mut JoinSet<DetailResult>, details: &mut [Option<RawTask>]) {
    let Some(joined) = lookups.join_next().await else {
        return;
    };
    match joined {
        Ok((index, detail)) => {
            if let Some(slot) = details.get_mut(index) {
                *slot = detail;
            }
        }
        Err(error) => warn!(%error, "task detail lookup did not finish"),
    }
}

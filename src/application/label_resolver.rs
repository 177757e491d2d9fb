use crate::domain::task_parser::LabelIndex;
use crate::infrastructure::cache::SnapshotCache;
use crate::infrastructure::todoist_client::TodoistClient;
use std::sync::Arc;
use tracing::warn;

pub struct LabelResolver {
    client: Arc<dyn TodoistClient>,
    cache: SnapshotCache<LabelIndex>,
}

impl LabelResolver {
    pub fn new(client: Arc<dyn TodoistClient>) -> Self {
        Self {
            client,
            cache: SnapshotCache::new("labels"),
        }
    }

    /// Cached label index, fetched on first use. A failed fetch yields an empty
    /// index and leaves the cache unset so the next call retries.
    pub async fn resolve_labels(&self, access_token: &str) -> LabelIndex {
        match self.cache.get() {
            Ok(Some(index)) => return index,
            Ok(None) => {}
            Err(error) => warn!(%error, "label cache unavailable"),
        }

        match self.client.list_labels(access_token).await {
            Ok(labels) => {
                let index = LabelIndex::new(&labels);
                if let Err(error) = self.cache.replace(index.clone()) {
                    warn!(%error, "failed to cache labels");
                }
                index
            }
            Err(error) => {
                warn!(%error, "failed to fetch labels; continuing without names");
                LabelIndex::default()
            }
        }
    }

    pub fn invalidate(&self) {
        if let Err(error) = self.cache.clear() {
            warn!(%error, "failed to clear label cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::fake_todoist::{label, FakeTodoistClient};

    #[tokio::test]
    async fn labels_are_fetched_once_until_invalidated() {
        let client = Arc::new(FakeTodoistClient::new());
        client.push_label(label("12", "Focus"));
        let resolver = LabelResolver::new(client.clone());

        let first = resolver.resolve_labels("token").await;
        let second = resolver.resolve_labels("token").await;
        assert_eq!(first.name_for_id(12), Some("Focus"));
        assert_eq!(first, second);
        assert_eq!(client.calls("list_labels"), 1);

        resolver.invalidate();
        resolver.resolve_labels("token").await;
        assert_eq!(client.calls("list_labels"), 2);
    }

    #[tokio::test]
    async fn fetch_failure_yields_empty_index_and_retries_later() {
        let client = Arc::new(FakeTodoistClient::new());
        client.push_label(label("12", "Focus"));
        client.fail("list_labels");
        let resolver = LabelResolver::new(client.clone());

        assert!(resolver.resolve_labels("token").await.is_empty());

        client.recover("list_labels");
        assert_eq!(resolver.resolve_labels("token").await.len(), 1);
        assert_eq!(client.calls("list_labels"), 2);
    }
}

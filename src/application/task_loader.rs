use crate::application::label_resolver::LabelResolver;
use crate::application::timer_engine::TaskReloader;
use crate::domain::local_zone::LocalZone;
use crate::domain::models::{DueAt, RawTask, Task};
use crate::domain::task_parser::to_task;
use crate::infrastructure::cache::SnapshotCache;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::todoist_client::TodoistClient;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use tracing::info;

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// True when the task is due on `date` in `zone`. A due datetime wins over the
/// plain date field; floating datetimes are already local wall-clock time.
pub fn is_due_on(task: &RawTask, date: NaiveDate, zone: &LocalZone) -> bool {
    let Some(due) = task.due.as_ref() else {
        return false;
    };
    match due.due_at() {
        Some(DueAt::Instant(instant)) => zone.date_of(instant) == date,
        Some(DueAt::Floating(local)) => local.date() == date,
        None => due.date_only() == Some(date),
    }
}

pub struct TaskLoader {
    client: Arc<dyn TodoistClient>,
    labels: Arc<LabelResolver>,
    tasks: SnapshotCache<Vec<Task>>,
    zone: LocalZone,
    now_provider: NowProvider,
}

impl TaskLoader {
    pub fn new(client: Arc<dyn TodoistClient>, labels: Arc<LabelResolver>, zone: LocalZone) -> Self {
        Self {
            client,
            labels,
            tasks: SnapshotCache::new("tasks"),
            zone,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.zone.date_of((self.now_provider)())
    }

    /// Replaces the task cache with today's tasks. On failure the previous list
    /// is kept.
    pub async fn load_today(&self, access_token: &str) -> Result<Vec<Task>, InfraError> {
        let today = self.today();
        let remote = self.client.list_tasks(access_token, None).await?;
        let index = self.labels.resolve_labels(access_token).await;

        let tasks: Vec<Task> = remote
            .iter()
            .filter(|task| is_due_on(task, today, &self.zone))
            .map(|task| to_task(task, &index))
            .collect();

        self.tasks.replace(tasks.clone())?;
        info!(
            fetched = remote.len(),
            due_today = tasks.len(),
            %today,
            "loaded today's tasks"
        );
        Ok(tasks)
    }

    pub fn cached(&self) -> Result<Option<Vec<Task>>, InfraError> {
        self.tasks.get()
    }

    pub fn find(&self, task_id: &str) -> Result<Option<Task>, InfraError> {
        Ok(self
            .tasks
            .get()?
            .and_then(|tasks| tasks.into_iter().find(|task| task.id == task_id)))
    }
}

#[async_trait]
impl TaskReloader for TaskLoader {
    async fn reload_task_ids(&self, access_token: &str) -> Result<Vec<String>, InfraError> {
        let tasks = self.load_today(access_token).await?;
        Ok(tasks.into_iter().map(|task| task.id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::fake_todoist::{due_on, label, raw_task, FakeTodoistClient};
    use crate::domain::models::{Due, LabelRef, RawLabels};

    fn fixed_now() -> NowProvider {
        Arc::new(|| {
            DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
                .expect("valid datetime")
                .with_timezone(&Utc)
        })
    }

    fn loader(client: Arc<FakeTodoistClient>, zone: &str) -> TaskLoader {
        let labels = Arc::new(LabelResolver::new(client.clone()));
        TaskLoader::new(
            client,
            labels,
            LocalZone::parse(Some(zone)).expect("valid zone"),
        )
        .with_now_provider(fixed_now())
    }

    #[test]
    fn due_datetime_is_compared_in_the_local_zone() {
        let zone = LocalZone::parse(Some("Asia/Tokyo")).expect("zone");
        let mut task = raw_task("1", "late call");
        task.due = Some(Due {
            date: Some("2024-05-31".to_string()),
            datetime: Some("2024-05-31T20:00:00Z".to_string()),
        });

        let june_first = NaiveDate::from_ymd_opt(2024, 6, 1).expect("date");
        assert!(is_due_on(&task, june_first, &zone));
        assert!(!is_due_on(&raw_task("2", "no due"), june_first, &zone));
    }

    #[test]
    fn floating_due_datetime_keeps_its_local_date() {
        let zone = LocalZone::parse(Some("Asia/Tokyo")).expect("zone");
        let mut task = raw_task("1", "late call");
        task.due = Some(Due {
            date: Some("2024-06-01".to_string()),
            datetime: Some("2024-06-01T23:30:00".to_string()),
        });

        let june_first = NaiveDate::from_ymd_opt(2024, 6, 1).expect("date");
        let june_second = NaiveDate::from_ymd_opt(2024, 6, 2).expect("date");
        assert!(is_due_on(&task, june_first, &zone));
        assert!(!is_due_on(&task, june_second, &zone));
    }

    #[tokio::test]
    async fn keeps_only_tasks_due_today_with_resolved_labels() {
        let client = Arc::new(FakeTodoistClient::new());
        client.push_label(label("12", "Focus"));
        let mut sprint = raw_task("1", "🎯Sprint planning");
        sprint.due = due_on("2024-06-01");
        sprint.labels = Some(RawLabels::List(vec![
            LabelRef::ByName("@deepwork".to_string()),
            LabelRef::ById(12),
        ]));
        let mut tomorrow = raw_task("2", "later");
        tomorrow.due = due_on("2024-06-02");
        client.push_task(sprint);
        client.push_task(tomorrow);

        let loader = loader(client, "UTC");
        let tasks = loader.load_today("token").await.expect("load");

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].labels, vec!["Focus", "deepwork", "🎯Sprint"]);
        assert_eq!(loader.cached().expect("cache").map(|tasks| tasks.len()), Some(1));
    }

    #[tokio::test]
    async fn failed_load_keeps_previous_list() {
        let client = Arc::new(FakeTodoistClient::new());
        let mut task = raw_task("1", "write");
        task.due = due_on("2024-06-01");
        client.push_task(task);
        let loader = loader(client.clone(), "UTC");
        loader.load_today("token").await.expect("first load");

        client.fail("list_tasks");
        assert!(loader.load_today("token").await.is_err());
        assert!(loader.find("1").expect("cache").is_some());
    }
}

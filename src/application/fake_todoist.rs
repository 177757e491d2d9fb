use crate::domain::models::{Due, DurationSpec, Label, RawLabels, RawTask};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::todoist_client::TodoistClient;
use crate::infrastructure::todoist_payload::{
    CompletedItem, NewTask, RemoteComment, RemoteProject, TaskUpdate,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// In-memory stand-in for the remote service. Writes mutate the stored records
/// so read-after-write flows behave like the real API.
#[derive(Debug, Default)]
pub struct FakeTodoistClient {
    pub tasks: Mutex<Vec<RawTask>>,
    pub labels: Mutex<Vec<Label>>,
    pub projects: Mutex<Vec<RemoteProject>>,
    pub comments: Mutex<Vec<RemoteComment>>,
    pub completed: Mutex<Vec<CompletedItem>>,
    pub task_updates: Mutex<Vec<(String, TaskUpdate)>>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    next_id: AtomicUsize,
    detail_delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

pub fn raw_task(id: &str, content: &str) -> RawTask {
    RawTask {
        id: id.to_string(),
        content: content.to_string(),
        ..RawTask::default()
    }
}

pub fn due_on(date: &str) -> Option<Due> {
    Some(Due {
        date: Some(date.to_string()),
        datetime: None,
    })
}

pub fn label(id: &str, name: &str) -> Label {
    Label {
        id: id.to_string(),
        name: name.to_string(),
    }
}

impl FakeTodoistClient {
    pub fn new() -> Self {
        Self {
            next_id: AtomicUsize::new(1000),
            ..Self::default()
        }
    }

    pub fn with_inbox() -> Self {
        let client = Self::new();
        client.projects.lock().expect("projects mutex poisoned").push(RemoteProject {
            id: "inbox".to_string(),
            name: "Inbox".to_string(),
            is_inbox_project: true,
        });
        client
    }

    pub fn push_task(&self, task: RawTask) {
        self.tasks.lock().expect("tasks mutex poisoned").push(task);
    }

    pub fn push_label(&self, value: Label) {
        self.labels.lock().expect("labels mutex poisoned").push(value);
    }

    pub fn push_completed(&self, item: CompletedItem) {
        self.completed.lock().expect("completed mutex poisoned").push(item);
    }

    pub fn fail(&self, operation: &str) {
        self.failing
            .lock()
            .expect("failing mutex poisoned")
            .insert(operation.to_string());
    }

    /// Fails a single operation for one id, e.g. `get_task:42`.
    pub fn fail_for(&self, operation: &str, id: &str) {
        self.fail(&format!("{operation}:{id}"));
    }

    pub fn recover(&self, operation: &str) {
        self.failing
            .lock()
            .expect("failing mutex poisoned")
            .remove(operation);
    }

    pub fn set_detail_delay(&self, delay: Duration) {
        *self.detail_delay.lock().expect("delay mutex poisoned") = Some(delay);
    }

    pub fn calls(&self, operation: &'static str) -> usize {
        self.calls
            .lock()
            .expect("calls mutex poisoned")
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    pub fn task(&self, id: &str) -> Option<RawTask> {
        self.tasks
            .lock()
            .expect("tasks mutex poisoned")
            .iter()
            .find(|task| task.id == id)
            .cloned()
    }

    pub fn comment_contents(&self) -> Vec<String> {
        self.comments
            .lock()
            .expect("comments mutex poisoned")
            .iter()
            .map(|comment| comment.content.clone())
            .collect()
    }

    fn record(&self, operation: &'static str, id: Option<&str>) -> Result<(), InfraError> {
        *self
            .calls
            .lock()
            .expect("calls mutex poisoned")
            .entry(operation)
            .or_default() += 1;
        let failing = self.failing.lock().expect("failing mutex poisoned");
        let scoped = id.map(|id| format!("{operation}:{id}"));
        if failing.contains(operation) || scoped.is_some_and(|key| failing.contains(&key)) {
            return Err(InfraError::Remote(format!("{operation} failed")));
        }
        Ok(())
    }

    fn next_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::SeqCst).to_string()
    }
}

#[async_trait]
impl TodoistClient for FakeTodoistClient {
    async fn list_tasks(
        &self,
        _access_token: &str,
        project_id: Option<&str>,
    ) -> Result<Vec<RawTask>, InfraError> {
        self.record("list_tasks", None)?;
        Ok(self
            .tasks
            .lock()
            .expect("tasks mutex poisoned")
            .iter()
            .filter(|task| project_id.is_none() || task.project_id.as_deref() == project_id)
            .cloned()
            .collect())
    }

    async fn get_task(
        &self,
        _access_token: &str,
        task_id: &str,
    ) -> Result<Option<RawTask>, InfraError> {
        let delay = *self.detail_delay.lock().expect("delay mutex poisoned");
        if let Some(delay) = delay {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        self.record("get_task", Some(task_id))?;
        Ok(self.task(task_id))
    }

    async fn create_task(&self, _access_token: &str, task: &NewTask) -> Result<RawTask, InfraError> {
        self.record("create_task", None)?;
        let created = RawTask {
            id: self.next_id(),
            content: task.content.clone(),
            project_id: task.project_id.clone(),
            labels: Some(RawLabels::List(Vec::new())),
            ..RawTask::default()
        };
        self.push_task(created.clone());
        Ok(created)
    }

    async fn update_task(
        &self,
        _access_token: &str,
        task_id: &str,
        update: &TaskUpdate,
    ) -> Result<(), InfraError> {
        self.record("update_task", Some(task_id))?;
        self.task_updates
            .lock()
            .expect("updates mutex poisoned")
            .push((task_id.to_string(), update.clone()));

        let mut tasks = self.tasks.lock().expect("tasks mutex poisoned");
        let task = tasks
            .iter_mut()
            .find(|task| task.id == task_id)
            .ok_or_else(|| InfraError::Remote(format!("http 404; task {task_id}")))?;
        if let Some(datetime) = &update.due_datetime {
            let due = task.due.get_or_insert_with(Due::default);
            due.datetime = Some(datetime.clone());
        }
        if let Some(amount) = update.duration {
            task.duration = Some(DurationSpec {
                amount: Some(amount as f64),
                unit: update.duration_unit.clone(),
            });
        }
        Ok(())
    }

    async fn list_labels(&self, _access_token: &str) -> Result<Vec<Label>, InfraError> {
        self.record("list_labels", None)?;
        Ok(self.labels.lock().expect("labels mutex poisoned").clone())
    }

    async fn list_projects(&self, _access_token: &str) -> Result<Vec<RemoteProject>, InfraError> {
        self.record("list_projects", None)?;
        Ok(self.projects.lock().expect("projects mutex poisoned").clone())
    }

    async fn list_comments(
        &self,
        _access_token: &str,
        task_id: &str,
    ) -> Result<Vec<RemoteComment>, InfraError> {
        self.record("list_comments", None)?;
        Ok(self
            .comments
            .lock()
            .expect("comments mutex poisoned")
            .iter()
            .filter(|comment| comment.task_id.as_deref() == Some(task_id))
            .cloned()
            .collect())
    }

    async fn create_comment(
        &self,
        _access_token: &str,
        task_id: &str,
        content: &str,
    ) -> Result<RemoteComment, InfraError> {
        self.record("create_comment", None)?;
        let comment = RemoteComment {
            id: self.next_id(),
            task_id: Some(task_id.to_string()),
            content: content.to_string(),
        };
        self.comments
            .lock()
            .expect("comments mutex poisoned")
            .push(comment.clone());
        Ok(comment)
    }

    async fn update_comment(
        &self,
        _access_token: &str,
        comment_id: &str,
        content: &str,
    ) -> Result<(), InfraError> {
        self.record("update_comment", None)?;
        let mut comments = self.comments.lock().expect("comments mutex poisoned");
        let comment = comments
            .iter_mut()
            .find(|comment| comment.id == comment_id)
            .ok_or_else(|| InfraError::Remote(format!("http 404; comment {comment_id}")))?;
        comment.content = content.to_string();
        Ok(())
    }

    async fn list_completed(
        &self,
        _access_token: &str,
        limit: usize,
    ) -> Result<Vec<CompletedItem>, InfraError> {
        self.record("list_completed", None)?;
        let mut items = self.completed.lock().expect("completed mutex poisoned").clone();
        items.truncate(limit);
        Ok(items)
    }
}

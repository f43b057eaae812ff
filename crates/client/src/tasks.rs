//! Task v2: create, assign, file into tasklists, list.

use feishu_core::errors::PlatformError;
use serde_json::{json, Value};
use tracing::info;

use crate::calendar::items_of;
use crate::http::{data_of, FeishuClient};

const TASKS_PATH: &str = "/open-apis/task/v2/tasks";
const USER_ID_TYPE: (&str, &str) = ("user_id_type", "open_id");
const LIST_PAGE_SIZE: &str = "50";

/// Task to create. Times are unix milliseconds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub start: Option<i64>,
    pub due: Option<i64>,
}

impl TaskDraft {
    fn to_payload(&self) -> Value {
        let mut payload = json!({ "summary": self.title, "description": self.description });
        if let Some(start) = self.start {
            payload["start"] = json!({ "timestamp": start.to_string() });
        }
        if let Some(due) = self.due {
            payload["due"] = json!({ "timestamp": due.to_string() });
        }
        payload
    }
}

/// Narrows [`FeishuClient::list_tasks`]. The default lists every task
/// visible to the app.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub tasklist_guid: Option<String>,
    pub assignee_open_id: Option<String>,
    pub completed: Option<bool>,
}

fn is_assigned_to(task: &Value, open_id: &str) -> bool {
    task.get("members").and_then(Value::as_array).into_iter().flatten().any(|member| {
        member.get("id").and_then(Value::as_str) == Some(open_id)
            && member.get("role").and_then(Value::as_str) == Some("assignee")
    })
}

impl FeishuClient {
    /// Returns the created `task` object (`guid`, `summary`, ...).
    pub async fn create_task(&self, draft: &TaskDraft) -> Result<Value, PlatformError> {
        let data = data_of(self.post(TASKS_PATH, &[USER_ID_TYPE], &draft.to_payload()).await?);
        let task = data.get("task").cloned().ok_or_else(|| PlatformError::Decode {
            path: TASKS_PATH.to_string(),
            message: "response data has no `task`".to_string(),
        })?;
        info!(task_guid = ?task.get("guid"), title = %draft.title, "task created");
        Ok(task)
    }

    pub async fn assign_task(
        &self,
        task_guid: &str,
        assignee_open_ids: &[String],
    ) -> Result<Value, PlatformError> {
        let path = format!("{TASKS_PATH}/{task_guid}/add_members");
        let members: Vec<Value> = assignee_open_ids
            .iter()
            .map(|open_id| json!({ "id": open_id, "type": "user", "role": "assignee" }))
            .collect();
        let data = data_of(self.post(&path, &[USER_ID_TYPE], &json!({ "members": members })).await?);
        info!(task_guid, assignee_count = assignee_open_ids.len(), "task assigned");
        Ok(data)
    }

    pub async fn add_task_to_list(
        &self,
        task_guid: &str,
        tasklist_guid: &str,
    ) -> Result<Value, PlatformError> {
        let path = format!("{TASKS_PATH}/{task_guid}/add_tasklist");
        let body = json!({ "tasklist_guid": tasklist_guid });
        let data = data_of(self.post(&path, &[USER_ID_TYPE], &body).await?);
        info!(task_guid, tasklist_guid, "task added to tasklist");
        Ok(data)
    }

    /// First page of tasks. The assignee filter is applied locally to what
    /// the platform returns.
    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Value>, PlatformError> {
        let path = match filter.tasklist_guid.as_deref().filter(|guid| !guid.is_empty()) {
            Some(tasklist_guid) => format!("/open-apis/task/v2/tasklists/{tasklist_guid}/tasks"),
            None => TASKS_PATH.to_string(),
        };
        let mut query = vec![("page_size", LIST_PAGE_SIZE), USER_ID_TYPE];
        if let Some(completed) = filter.completed {
            query.push(("completed", if completed { "true" } else { "false" }));
        }

        let mut tasks = items_of(data_of(self.get(&path, &query).await?));
        if let Some(open_id) = filter.assignee_open_id.as_deref().filter(|id| !id.is_empty()) {
            tasks.retain(|task| is_assigned_to(task, open_id));
        }
        Ok(tasks)
    }
}

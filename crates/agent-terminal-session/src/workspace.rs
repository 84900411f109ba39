//! Shared workspace of files and tasks.
//!
//! Records live in the external store as JSON under the keys defined in
//! `agent_terminal_core::workspace`. Nothing is cached here: every call reads
//! the store, and every mutation is broadcast to all sessions.

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use agent_terminal_core::{
    BroadcastHub, ServerEvent,
    event::WorkspaceAction,
    traits::{StoreError, WorkspaceStore},
    workspace::{
        FILES_INDEX_KEY, FileIndexEntry, ProgressEntry, TASKS_INDEX_KEY, Task, TaskStatus,
        TaskSummary, WorkspaceFile, file_key, task_key,
    },
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

const DEFAULT_FILE_NAME: &str = "untitled.txt";
const DEFAULT_FILE_TYPE: &str = "text";
const DEFAULT_TASK_NAME: &str = "Untitled Task";

/// Workspace error.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("File not found: {0}")]
    FileNotFound(String),
    #[error("Task not found: {0}")]
    TaskNotFound(String),
    #[error("Corrupt workspace record {key}: {source}")]
    Corrupt {
        key: String,
        source: serde_json::Error,
    },
    #[error("{0}")]
    Invalid(String),
}

/// File upload request. Missing name and type fall back to defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadFile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default, rename = "type")]
    pub file_type: Option<String>,
}

/// Task creation request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTask {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "terminals", alias = "assigned_terminals")]
    pub assigned_terminals: Vec<String>,
}

/// Progress report against a task.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewProgress {
    #[serde(default)]
    pub terminal: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub details: String,
}

/// Workspace operations with broadcast-on-change.
pub struct WorkspaceService {
    store: Arc<dyn WorkspaceStore>,
    hub: Arc<BroadcastHub<ServerEvent>>,
    /// Serializes read-modify-write of index and task records.
    write_lock: Mutex<()>,
}

impl WorkspaceService {
    #[must_use]
    pub fn new(store: Arc<dyn WorkspaceStore>, hub: Arc<BroadcastHub<ServerEvent>>) -> Self {
        Self {
            store,
            hub,
            write_lock: Mutex::new(()),
        }
    }

    /// Store a file, replacing any file of the same name.
    ///
    /// # Errors
    /// Returns error if the store fails or holds a corrupt index.
    pub async fn upload_file(&self, upload: UploadFile) -> Result<WorkspaceFile, WorkspaceError> {
        let file = WorkspaceFile {
            name: non_empty(upload.name).unwrap_or_else(|| DEFAULT_FILE_NAME.to_string()),
            content: upload.content,
            file_type: non_empty(upload.file_type).unwrap_or_else(|| DEFAULT_FILE_TYPE.to_string()),
            uploaded_at: now(),
        };

        {
            // Index first: a record is never stored without being listed.
            let _guard = self.write_lock.lock().await;
            let mut index: Vec<FileIndexEntry> = self.read_json(FILES_INDEX_KEY).await?.unwrap_or_default();
            let entry = FileIndexEntry::from(&file);
            match index.iter_mut().find(|e| e.name == file.name) {
                Some(existing) => *existing = entry,
                None => index.push(entry),
            }
            self.write_json(FILES_INDEX_KEY, &index).await?;
            self.write_json(&file_key(&file.name), &file).await?;
        }

        tracing::info!(file_name = %file.name, file_type = %file.file_type, "Workspace file uploaded");
        self.hub.publish(&ServerEvent::WorkspaceUpdated {
            action: WorkspaceAction::FileUploaded,
            file_name: file.name.clone(),
            file_type: file.file_type.clone(),
        });
        Ok(file)
    }

    /// Index of uploaded files, in upload order.
    ///
    /// # Errors
    /// Returns error if the store fails or holds a corrupt index.
    pub async fn list_files(&self) -> Result<Vec<FileIndexEntry>, WorkspaceError> {
        Ok(self.read_json(FILES_INDEX_KEY).await?.unwrap_or_default())
    }

    /// Fetch a file by name.
    ///
    /// # Errors
    /// Returns `FileNotFound` for unknown names.
    pub async fn get_file(&self, name: &str) -> Result<WorkspaceFile, WorkspaceError> {
        self.read_json(&file_key(name))
            .await?
            .ok_or_else(|| WorkspaceError::FileNotFound(name.to_string()))
    }

    /// Create an active task with an empty progress log.
    ///
    /// # Errors
    /// Returns error if the store fails or holds a corrupt index.
    pub async fn create_task(&self, request: NewTask) -> Result<Task, WorkspaceError> {
        let task = Task {
            id: format!("task_{}", Uuid::new_v4().simple()),
            name: non_empty(request.name).unwrap_or_else(|| DEFAULT_TASK_NAME.to_string()),
            description: request.description,
            assigned_terminals: request.assigned_terminals,
            status: TaskStatus::Active,
            created_at: now(),
            progress: Vec::new(),
        };

        {
            let _guard = self.write_lock.lock().await;
            let mut index: Vec<TaskSummary> = self.read_json(TASKS_INDEX_KEY).await?.unwrap_or_default();
            index.push(TaskSummary::from(&task));
            self.write_json(TASKS_INDEX_KEY, &index).await?;
            self.write_json(&task_key(&task.id), &task).await?;
        }

        tracing::info!(task_id = %task.id, name = %task.name, "Task created");
        self.hub.publish(&ServerEvent::TaskCreated(task.clone()));
        Ok(task)
    }

    /// Index of tasks, in creation order.
    ///
    /// # Errors
    /// Returns error if the store fails or holds a corrupt index.
    pub async fn list_tasks(&self) -> Result<Vec<TaskSummary>, WorkspaceError> {
        Ok(self.read_json(TASKS_INDEX_KEY).await?.unwrap_or_default())
    }

    /// Fetch a task with its progress log.
    ///
    /// # Errors
    /// Returns `TaskNotFound` for unknown ids.
    pub async fn get_task(&self, id: &str) -> Result<Task, WorkspaceError> {
        self.read_json(&task_key(id))
            .await?
            .ok_or_else(|| WorkspaceError::TaskNotFound(id.to_string()))
    }

    /// Append a progress entry to a task's log.
    ///
    /// # Errors
    /// Returns `Invalid` when terminal or action is missing and
    /// `TaskNotFound` for unknown ids.
    pub async fn append_progress(&self, id: &str, report: NewProgress) -> Result<ProgressEntry, WorkspaceError> {
        if report.terminal.trim().is_empty() || report.action.trim().is_empty() {
            return Err(WorkspaceError::Invalid("Missing required fields: terminal, action".into()));
        }
        let entry = ProgressEntry {
            terminal: report.terminal,
            action: report.action,
            details: report.details,
            timestamp: now(),
        };

        {
            let _guard = self.write_lock.lock().await;
            let key = task_key(id);
            let mut task: Task = self
                .read_json(&key)
                .await?
                .ok_or_else(|| WorkspaceError::TaskNotFound(id.to_string()))?;
            task.progress.push(entry.clone());
            self.write_json(&key, &task).await?;
        }

        tracing::debug!(task_id = id, terminal = %entry.terminal, action = %entry.action, "Task progress appended");
        self.hub.publish(&ServerEvent::TaskProgressUpdated {
            task_id: id.to_string(),
            progress: entry.clone(),
        });
        Ok(entry)
    }

    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, WorkspaceError> {
        self.store
            .get(key)
            .await?
            .map(|raw| {
                serde_json::from_str(&raw).map_err(|source| WorkspaceError::Corrupt {
                    key: key.to_string(),
                    source,
                })
            })
            .transpose()
    }

    async fn write_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), WorkspaceError> {
        let raw = serde_json::to_string(value).map_err(|source| WorkspaceError::Corrupt {
            key: key.to_string(),
            source,
        })?;
        self.store.set(key, raw).await?;
        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn fixture() -> (WorkspaceService, Arc<BroadcastHub<ServerEvent>>, Arc<MemoryStore>) {
        let hub = Arc::new(BroadcastHub::new(16));
        let store = Arc::new(MemoryStore::new());
        let service = WorkspaceService::new(Arc::clone(&store) as Arc<dyn WorkspaceStore>, Arc::clone(&hub));
        (service, hub, store)
    }

    #[tokio::test]
    async fn reupload_broadcasts_twice_and_indexes_once() {
        let (service, hub, _) = fixture();
        let (tx, mut rx) = hub.channel();
        hub.register(Uuid::new_v4(), tx);

        for content in ["v1", "v2"] {
            service
                .upload_file(UploadFile {
                    name: Some("notes.txt".into()),
                    content: content.into(),
                    file_type: None,
                })
                .await
                .unwrap();
        }

        for _ in 0..2 {
            assert!(matches!(
                rx.try_recv(),
                Ok(ServerEvent::WorkspaceUpdated { ref file_name, .. }) if file_name == "notes.txt"
            ));
        }
        let files = service.list_files().await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].file_type, "text");
        assert_eq!(service.get_file("notes.txt").await.unwrap().content, "v2");
    }

    #[tokio::test]
    async fn upload_defaults_and_missing_file() {
        let (service, _, _) = fixture();
        let file = service.upload_file(UploadFile::default()).await.unwrap();
        assert_eq!(file.name, "untitled.txt");
        assert_eq!(file.file_type, "text");

        assert!(matches!(
            service.get_file("nope.rs").await,
            Err(WorkspaceError::FileNotFound(ref n)) if n == "nope.rs"
        ));
    }

    #[tokio::test]
    async fn task_lifecycle() {
        let (service, hub, _) = fixture();
        let (tx, mut rx) = hub.channel();
        hub.register(Uuid::new_v4(), tx);

        let task = service
            .create_task(NewTask {
                name: None,
                description: "split the parser".into(),
                assigned_terminals: vec!["gemini-1".into(), "gemini-2".into()],
            })
            .await
            .unwrap();
        assert_eq!(task.name, "Untitled Task");
        assert!(task.id.starts_with("task_"));
        assert!(matches!(rx.try_recv(), Ok(ServerEvent::TaskCreated(ref t)) if t.id == task.id));

        for action in ["started", "finished"] {
            service
                .append_progress(
                    &task.id,
                    NewProgress {
                        terminal: "gemini-1".into(),
                        action: action.into(),
                        details: String::new(),
                    },
                )
                .await
                .unwrap();
        }

        let stored = service.get_task(&task.id).await.unwrap();
        let actions: Vec<_> = stored.progress.iter().map(|p| p.action.as_str()).collect();
        assert_eq!(actions, ["started", "finished"]);
        assert!(matches!(
            rx.try_recv(),
            Ok(ServerEvent::TaskProgressUpdated { ref task_id, .. }) if *task_id == task.id
        ));

        let tasks = service.list_tasks().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].assigned_terminals, ["gemini-1", "gemini-2"]);
    }

    #[tokio::test]
    async fn progress_validation() {
        let (service, _, _) = fixture();
        let report = NewProgress {
            terminal: "gemini-1".into(),
            action: "started".into(),
            details: String::new(),
        };
        assert!(matches!(
            service.append_progress("task_missing", report).await,
            Err(WorkspaceError::TaskNotFound(_))
        ));
        assert!(matches!(
            service.append_progress("task_missing", NewProgress::default()).await,
            Err(WorkspaceError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn corrupt_index_is_reported() {
        let (service, _, store) = fixture();
        store.set(FILES_INDEX_KEY, "not json".into()).await.unwrap();
        assert!(matches!(
            service.list_files().await,
            Err(WorkspaceError::Corrupt { ref key, .. }) if key == FILES_INDEX_KEY
        ));
    }

    /// Memory store refusing writes to one key.
    struct RefusingStore {
        inner: MemoryStore,
        refused: &'static str,
    }

    #[async_trait::async_trait]
    impl WorkspaceStore for RefusingStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
            if key == self.refused {
                return Err(StoreError::Unavailable("connection reset".into()));
            }
            self.inner.set(key, value).await
        }
    }

    #[tokio::test]
    async fn failed_index_write_stores_nothing_and_stays_quiet() {
        let hub = Arc::new(BroadcastHub::new(16));
        let store = Arc::new(RefusingStore {
            inner: MemoryStore::new(),
            refused: FILES_INDEX_KEY,
        });
        let service = WorkspaceService::new(Arc::clone(&store) as Arc<dyn WorkspaceStore>, Arc::clone(&hub));
        let (tx, mut rx) = hub.channel();
        hub.register(Uuid::new_v4(), tx);

        let upload = UploadFile {
            name: Some("notes.txt".into()),
            content: "draft".into(),
            file_type: None,
        };
        assert!(matches!(
            service.upload_file(upload).await,
            Err(WorkspaceError::Store(StoreError::Unavailable(_)))
        ));
        assert_eq!(store.inner.get(&file_key("notes.txt")).await.unwrap(), None);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn corrupt_index_blocks_upload_before_any_write() {
        let (service, _, store) = fixture();
        store.set(FILES_INDEX_KEY, "not json".into()).await.unwrap();

        let upload = UploadFile {
            name: Some("notes.txt".into()),
            ..UploadFile::default()
        };
        assert!(matches!(
            service.upload_file(upload).await,
            Err(WorkspaceError::Corrupt { .. })
        ));
        assert_eq!(store.get(&file_key("notes.txt")).await.unwrap(), None);
    }

    #[test]
    fn new_task_accepts_terminals_key() {
        let request: NewTask = serde_json::from_str(r#"{"name":"t","terminals":["gemini-1"]}"#).unwrap();
        assert_eq!(request.assigned_terminals, ["gemini-1"]);
    }
}

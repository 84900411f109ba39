//! Shared workspace records and their store keys.

use serde::{Deserialize, Serialize};

/// Index of uploaded files.
pub const FILES_INDEX_KEY: &str = "workspace:files";
/// Index of tasks.
pub const TASKS_INDEX_KEY: &str = "workspace:tasks";

/// Store key of a file record.
#[must_use]
pub fn file_key(name: &str) -> String {
    format!("workspace:file:{name}")
}

/// Store key of a task record.
#[must_use]
pub fn task_key(id: &str) -> String {
    format!("workspace:task:{id}")
}

/// An uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceFile {
    pub name: String,
    pub content: String,
    #[serde(rename = "type")]
    pub file_type: String,
    /// Unix epoch seconds.
    pub uploaded_at: i64,
}

/// Entry in the file index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileIndexEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub file_type: String,
    pub uploaded_at: i64,
}

impl From<&WorkspaceFile> for FileIndexEntry {
    fn from(file: &WorkspaceFile) -> Self {
        Self {
            name: file.name.clone(),
            file_type: file.file_type.clone(),
            uploaded_at: file.uploaded_at,
        }
    }
}

/// Task status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Active,
    Completed,
}

/// One step reported against a task. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEntry {
    /// Terminal that reported the step.
    pub terminal: String,
    pub action: String,
    #[serde(default)]
    pub details: String,
    pub timestamp: i64,
}

/// A collaborative task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub assigned_terminals: Vec<String>,
    #[serde(default)]
    pub status: TaskStatus,
    pub created_at: i64,
    #[serde(default)]
    pub progress: Vec<ProgressEntry>,
}

/// Entry in the task index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: String,
    pub name: String,
    pub status: TaskStatus,
    pub assigned_terminals: Vec<String>,
}

impl From<&Task> for TaskSummary {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            name: task.name.clone(),
            status: task.status,
            assigned_terminals: task.assigned_terminals.clone(),
        }
    }
}

//! Task storage.
//!
//! The service keeps its tasks in memory; every operation is timed by the
//! handlers as a database query.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use thiserror::Error;
use validator::Validate;

/// Errors that can occur during task store operations.
#[derive(Debug, Error)]
pub enum TaskStoreError {
    /// Failed to acquire lock on the store.
    #[error("Failed to acquire lock on task store")]
    LockError,
}

/// A stored task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Assigned by the store, starting at 1.
    pub id: u64,
    /// Short title.
    pub title: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Whether the task is done.
    pub completed: bool,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
}

/// Body of `POST /api/tasks`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewTask {
    /// Short title. A missing title fails validation rather than decoding.
    #[serde(default)]
    #[validate(length(min = 1, max = 200, message = "Title is required"))]
    pub title: String,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Whether the task starts out done.
    #[serde(default)]
    pub completed: bool,
}

/// Body of `PUT /api/tasks/{id}`. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct TaskUpdate {
    /// New title.
    #[validate(length(min = 1, max = 200, message = "Title cannot be empty"))]
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New completion state.
    pub completed: Option<bool>,
}

impl TaskUpdate {
    fn apply(self, task: &mut Task) {
        if let Some(title) = self.title {
            task.title = title;
        }
        if let Some(description) = self.description {
            task.description = Some(description);
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
    }
}

/// Trait for task storage backends.
pub trait TaskStore: Send + Sync {
    /// Returns every task, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn list(&self) -> Result<Vec<Task>, TaskStoreError>;

    /// Returns one task.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get(&self, id: u64) -> Result<Option<Task>, TaskStoreError>;

    /// Stores a new task and returns it with its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn create(&self, task: NewTask) -> Result<Task, TaskStoreError>;

    /// Applies `update` to an existing task. Returns `None` if there is no
    /// such task.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn update(&self, id: u64, update: TaskUpdate) -> Result<Option<Task>, TaskStoreError>;

    /// Removes a task. Returns false if there was no such task.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn delete(&self, id: u64) -> Result<bool, TaskStoreError>;
}

/// In-memory task store.
///
/// **Note:** Data is not persisted across restarts.
///
/// # Example
///
/// ```
/// use service::store::{InMemoryTaskStore, NewTask, TaskStore};
///
/// let store = InMemoryTaskStore::new();
/// let task = store
///     .create(NewTask {
///         title: "Write docs".to_string(),
///         description: None,
///         completed: false,
///     })
///     .unwrap();
///
/// assert_eq!(task.id, 1);
/// assert_eq!(store.list().unwrap().len(), 1);
/// ```
#[derive(Debug)]
pub struct InMemoryTaskStore {
    tasks: RwLock<BTreeMap<u64, Task>>,
    next_id: AtomicU64,
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTaskStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl TaskStore for InMemoryTaskStore {
    fn list(&self) -> Result<Vec<Task>, TaskStoreError> {
        let tasks = self.tasks.read().map_err(|_| TaskStoreError::LockError)?;
        Ok(tasks.values().cloned().collect())
    }

    fn get(&self, id: u64) -> Result<Option<Task>, TaskStoreError> {
        let tasks = self.tasks.read().map_err(|_| TaskStoreError::LockError)?;
        Ok(tasks.get(&id).cloned())
    }

    fn create(&self, task: NewTask) -> Result<Task, TaskStoreError> {
        let mut tasks = self.tasks.write().map_err(|_| TaskStoreError::LockError)?;
        let task = Task {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            title: task.title,
            description: task.description,
            completed: task.completed,
            created_at: Utc::now(),
        };
        tasks.insert(task.id, task.clone());
        Ok(task)
    }

    fn update(&self, id: u64, update: TaskUpdate) -> Result<Option<Task>, TaskStoreError> {
        let mut tasks = self.tasks.write().map_err(|_| TaskStoreError::LockError)?;
        Ok(tasks.get_mut(&id).map(|task| {
            update.apply(task);
            task.clone()
        }))
    }

    fn delete(&self, id: u64) -> Result<bool, TaskStoreError> {
        let mut tasks = self.tasks.write().map_err(|_| TaskStoreError::LockError)?;
        Ok(tasks.remove(&id).is_some())
    }
}

//! `oompa task`: task-store operations.

use anyhow::Result;
use std::path::Path;

use crate::domain::models::Task;
use crate::services::task_store::TaskStore;

/// Create a pending task file.
#[allow(clippy::too_many_arguments)]
pub async fn handle_add(
    project_root: &Path,
    tasks_root: &Path,
    id: String,
    summary: String,
    description: Option<String>,
    files: Vec<String>,
    priority: Option<i64>,
) -> Result<()> {
    let store = TaskStore::new(project_root.join(tasks_root));
    let task = Task {
        description,
        files,
        priority,
        ..Task::new(id, summary)
    };
    let path = store.create(&task).await?;
    println!("{}", path.display());
    Ok(())
}

#[cfg(test)]
#[path = "executor_test.rs"]
mod tests;

use super::TodoPatch;
use super::TodoStore;
use crate::domain::models::CreatedBy;
use crate::domain::models::Operation;
use crate::domain::models::Todo;

/// Counts of the changes a batch actually made.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub added: usize,
    pub deleted: usize,
    pub updated: usize,
}

impl ExecutionSummary {
    pub fn message(&self) -> String {
        let ExecutionSummary {
            added,
            deleted,
            updated,
        } = *self;

        return match (added, deleted, updated) {
            (0, 0, 0) => "No tasks were changed.".to_string(),
            (added, 0, 0) => format!("Added {added} task(s)."),
            (0, deleted, 0) => format!("Deleted {deleted} task(s)."),
            (0, 0, updated) => format!("Updated {updated} task(s)."),
            _ => format!("Done. Added {added}, deleted {deleted}, updated {updated}."),
        };
    }
}

pub struct ActionExecutor {}

impl ActionExecutor {
    /// Applies operations one at a time, in order, so later operations see
    /// the effects of earlier ones. Unknown ids are skipped.
    pub async fn execute(store: &mut TodoStore, ops: &[Operation]) -> ExecutionSummary {
        let mut summary = ExecutionSummary::default();

        for op in ops {
            match op {
                Operation::Add { title } => {
                    let todo = Todo::new(store.unused_id(), title, CreatedBy::Assistant);
                    match store.add(todo).await {
                        Ok(()) => summary.added += 1,
                        Err(err) => tracing::warn!(error = ?err, title, "Skipping add"),
                    }
                }
                Operation::Delete { id } => {
                    if store.delete(*id).await {
                        summary.deleted += 1;
                    } else {
                        tracing::debug!(id, "Delete target not found");
                    }
                }
                Operation::Update {
                    id,
                    title,
                    completed,
                } => {
                    let patch = TodoPatch {
                        title: title.clone(),
                        completed: *completed,
                    };
                    if store.update(*id, patch).await {
                        summary.updated += 1;
                    } else {
                        tracing::debug!(id, "Update target not found");
                    }
                }
            }
        }

        return summary;
    }
}

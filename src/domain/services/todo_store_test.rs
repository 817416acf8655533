use anyhow::Result;
use tempfile::TempDir;
use tokio::fs;

use super::TodoPatch;
use super::TodoStore;
use crate::domain::models::CreatedBy;
use crate::domain::models::Todo;

fn store_in(dir: &TempDir) -> std::path::PathBuf {
    return dir.path().join("nested/todos.json");
}

#[tokio::test]
async fn it_loads_empty_when_file_is_missing() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = TodoStore::load(store_in(&dir)).await;
    assert!(store.is_empty());
    assert!(store.last().is_none());

    return Ok(());
}

#[tokio::test]
async fn it_loads_empty_when_file_is_corrupt() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("todos.json");
    fs::write(&path, "not json").await?;

    let store = TodoStore::load(path).await;
    assert!(store.is_empty());

    return Ok(());
}

#[tokio::test]
async fn it_round_trips_through_the_file() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = store_in(&dir);

    let mut store = TodoStore::load(path.clone()).await;
    store
        .add(Todo::new(1, "Buy milk", CreatedBy::User).with_description("2 litres"))
        .await?;
    store
        .add(Todo::new(2, "Walk dog", CreatedBy::Assistant))
        .await?;
    store
        .update(
            2,
            TodoPatch {
                completed: Some(true),
                ..TodoPatch::default()
            },
        )
        .await;

    let reloaded = TodoStore::load(path).await;
    assert_eq!(reloaded.list(), store.list());
    assert_eq!(reloaded.list()[0].description, Some("2 litres".to_string()));
    assert_eq!(reloaded.list()[1].created_by, CreatedBy::Assistant);
    assert!(reloaded.list()[1].completed);

    return Ok(());
}

#[tokio::test]
async fn it_rejects_duplicate_ids() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut store = TodoStore::load(store_in(&dir)).await;
    store.add(Todo::new(1, "First", CreatedBy::User)).await?;

    let res = store.add(Todo::new(1, "Second", CreatedBy::User)).await;
    assert!(res.is_err());
    assert_eq!(store.len(), 1);
    assert_eq!(store.list()[0].title, "First");

    return Ok(());
}

#[tokio::test]
async fn it_rejects_empty_titles() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut store = TodoStore::load(store_in(&dir)).await;

    let res = store.add(Todo::new(1, "   ", CreatedBy::User)).await;
    assert!(res.is_err());
    assert!(store.is_empty());

    return Ok(());
}

#[tokio::test]
async fn it_merges_only_present_fields_on_update() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut store = TodoStore::load(store_in(&dir)).await;
    store.add(Todo::new(5, "X", CreatedBy::User)).await?;

    let updated = store
        .update(
            5,
            TodoPatch {
                title: None,
                completed: Some(true),
            },
        )
        .await;

    assert!(updated);
    let todo = store.get(5).unwrap();
    assert_eq!(todo.title, "X");
    assert!(todo.completed);

    return Ok(());
}

#[tokio::test]
async fn it_ignores_updates_for_unknown_ids() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut store = TodoStore::load(store_in(&dir)).await;
    store.add(Todo::new(5, "X", CreatedBy::User)).await?;

    let updated = store
        .update(
            6,
            TodoPatch {
                title: Some("Y".to_string()),
                completed: None,
            },
        )
        .await;

    assert!(!updated);
    assert_eq!(store.get(5).unwrap().title, "X");

    return Ok(());
}

#[tokio::test]
async fn it_deletes_by_id() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = store_in(&dir);
    let mut store = TodoStore::load(path.clone()).await;
    store.add(Todo::new(1, "A", CreatedBy::User)).await?;
    store.add(Todo::new(2, "B", CreatedBy::User)).await?;

    assert!(store.delete(1).await);
    assert!(!store.delete(1).await);
    assert_eq!(store.len(), 1);
    assert_eq!(store.last().unwrap().id, 2);

    let reloaded = TodoStore::load(path).await;
    assert_eq!(reloaded.len(), 1);

    return Ok(());
}

#[tokio::test]
async fn it_keeps_memory_state_when_writes_fail() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, "").await?;

    // The parent "directory" is a file, so every write fails.
    let mut store = TodoStore::new(blocker.join("todos.json"));
    store.add(Todo::new(1, "A", CreatedBy::User)).await?;

    assert_eq!(store.len(), 1);

    return Ok(());
}

#[tokio::test]
async fn it_snapshots_minimal_fields() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut store = TodoStore::load(store_in(&dir)).await;
    store
        .add(Todo::new(1, "A", CreatedBy::Assistant).with_description("secret"))
        .await?;

    let snapshot = serde_json::to_string(&store.snapshot())?;
    assert_eq!(snapshot, r#"[{"id":1,"title":"A","completed":false}]"#);

    return Ok(());
}

#[tokio::test]
async fn it_hands_out_unused_ids() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut store = TodoStore::load(store_in(&dir)).await;

    for idx in 0..50 {
        let id = store.unused_id();
        assert!(!store.contains(id));
        store
            .add(Todo::new(id, &format!("Task {idx}"), CreatedBy::User))
            .await?;
    }
    assert_eq!(store.len(), 50);

    return Ok(());
}

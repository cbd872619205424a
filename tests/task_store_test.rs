//! Task store integration: racing claimers over a shared store.

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use common::init_repo;
use oompa::domain::models::{ClaimResult, Task, TaskState};
use oompa::services::TaskStore;

#[tokio::test]
async fn test_claim_race_two_workers_two_tasks() {
    let (_tmp, root) = init_repo();
    let store = Arc::new(TaskStore::new(root.join("tasks")));
    store.ensure_layout().await.unwrap();
    store.create(&Task::new("task-a", "a")).await.unwrap();
    store.create(&Task::new("task-b", "b")).await.unwrap();

    let ids = vec!["task-a".to_string(), "task-b".to_string()];
    let s0 = store.clone();
    let s1 = store.clone();
    let ids0 = ids.clone();
    let ids1 = ids.clone();
    let (r0, r1) = tokio::join!(
        tokio::spawn(async move { s0.claim_by_ids(&ids0).await.unwrap() }),
        tokio::spawn(async move { s1.claim_by_ids(&ids1).await.unwrap() }),
    );
    let (r0, r1) = (r0.unwrap(), r1.unwrap());

    // Each task claimed by exactly one worker; the loser sees
    // already-claimed; nothing is lost or duplicated.
    for (idx, id) in ids.iter().enumerate() {
        let outcomes = [r0[idx].1, r1[idx].1];
        assert_eq!(
            outcomes.iter().filter(|o| **o == ClaimResult::Claimed).count(),
            1,
            "exactly one claim must win for {id}"
        );
        assert_eq!(
            outcomes.iter().filter(|o| **o == ClaimResult::AlreadyClaimed).count(),
            1,
            "the losing claim must observe already-claimed for {id}"
        );
    }
    assert!(store.ids_in(TaskState::Pending).await.unwrap().is_empty());
    assert_eq!(store.ids_in(TaskState::Current).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_many_claimers_no_task_lost_or_doubled() {
    let (_tmp, root) = init_repo();
    let store = Arc::new(TaskStore::new(root.join("tasks")));
    store.ensure_layout().await.unwrap();

    let ids: Vec<String> = (0..4).map(|i| format!("task-{i}")).collect();
    for id in &ids {
        store.create(&Task::new(id.clone(), "contended")).await.unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let ids = ids.clone();
        handles.push(tokio::spawn(async move {
            store.claim_by_ids(&ids).await.unwrap()
        }));
    }

    let mut winners_per_task = vec![0usize; ids.len()];
    for handle in handles {
        for (idx, (_, result)) in handle.await.unwrap().into_iter().enumerate() {
            if result == ClaimResult::Claimed {
                winners_per_task[idx] += 1;
            }
        }
    }
    assert_eq!(winners_per_task, vec![1, 1, 1, 1]);

    let current = store.ids_in(TaskState::Current).await.unwrap();
    assert_eq!(current, ids.iter().cloned().collect::<BTreeSet<_>>());
}

#[tokio::test]
async fn test_lifecycle_pending_current_complete() {
    let (_tmp, root) = init_repo();
    let store = TaskStore::new(root.join("tasks"));
    store.ensure_layout().await.unwrap();
    store.create(&Task::new("task-l", "lifecycle")).await.unwrap();

    store.claim_by_ids(&["task-l".to_string()]).await.unwrap();
    store.complete_by_ids(&["task-l".to_string()]).await.unwrap();

    assert!(store.ids_in(TaskState::Pending).await.unwrap().is_empty());
    assert!(store.ids_in(TaskState::Current).await.unwrap().is_empty());
    assert!(store.ids_in(TaskState::Complete).await.unwrap().contains("task-l"));
}

#[tokio::test]
async fn test_recycle_returns_abandoned_claims() {
    let (_tmp, root) = init_repo();
    let store = TaskStore::new(root.join("tasks"));
    store.ensure_layout().await.unwrap();
    for id in ["task-1", "task-2"] {
        store.create(&Task::new(id, "abandoned")).await.unwrap();
    }
    let ids = vec!["task-1".to_string(), "task-2".to_string()];
    store.claim_by_ids(&ids).await.unwrap();

    let recycled = store.recycle_by_ids(&ids).await.unwrap();
    assert_eq!(recycled.len(), 2);
    assert_eq!(store.ids_in(TaskState::Pending).await.unwrap().len(), 2);

    // Second recycle is a no-op, not an error.
    assert!(store.recycle_by_ids(&ids).await.unwrap().is_empty());
}

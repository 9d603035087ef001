// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn unknown_session_returns_none() {
    let store = InMemorySessionStateStore::new();
    assert!(store.get_state("u1", "c1").await.unwrap().is_none());
}

#[tokio::test]
async fn set_state_then_get_roundtrips() {
    let store = InMemorySessionStateStore::new();
    store.set_state("u1", "c1", SessionLifecycleState::InProgress).await.unwrap();
    let state = store.get_state("u1", "c1").await.unwrap().unwrap();
    assert_eq!(state.state, SessionLifecycleState::InProgress);
    assert!(state.completed_at.is_none());
}

#[tokio::test]
async fn reaching_complete_stamps_completed_at_once() {
    let store = InMemorySessionStateStore::new();
    store.set_state("u1", "c1", SessionLifecycleState::InProgress).await.unwrap();
    store.set_state("u1", "c1", SessionLifecycleState::Complete).await.unwrap();
    let first = store.get_state("u1", "c1").await.unwrap().unwrap().completed_at;
    assert!(first.is_some());

    store.set_state("u1", "c1", SessionLifecycleState::Complete).await.unwrap();
    let second = store.get_state("u1", "c1").await.unwrap().unwrap().completed_at;
    assert_eq!(first, second);
}

#[tokio::test]
async fn reaching_error_does_not_stamp_completed_at() {
    let store = InMemorySessionStateStore::new();
    store.set_state("u1", "c1", SessionLifecycleState::InProgress).await.unwrap();
    store.set_state("u1", "c1", SessionLifecycleState::Error).await.unwrap();
    let state = store.get_state("u1", "c1").await.unwrap().unwrap();
    assert_eq!(state.state, SessionLifecycleState::Error);
    assert!(state.completed_at.is_none());
}

#[tokio::test]
async fn list_active_for_user_excludes_terminal_sessions() {
    let store = InMemorySessionStateStore::new();
    store.set_state("u1", "c1", SessionLifecycleState::InProgress).await.unwrap();
    store.set_state("u1", "c2", SessionLifecycleState::Complete).await.unwrap();
    store.set_state("u2", "c3", SessionLifecycleState::Clarify).await.unwrap();

    let active = store.list_active_for_user("u1").await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].chat_id, "c1");
}

#[tokio::test]
async fn count_completed_for_user_counts_only_complete() {
    let store = InMemorySessionStateStore::new();
    store.set_state("u1", "c1", SessionLifecycleState::Complete).await.unwrap();
    store.set_state("u1", "c2", SessionLifecycleState::Error).await.unwrap();
    store.set_state("u1", "c3", SessionLifecycleState::Complete).await.unwrap();

    assert_eq!(store.count_completed_for_user("u1").await.unwrap(), 2);
}

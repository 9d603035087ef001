// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn append_then_list_unsent_preserves_order() {
    let store = InMemoryOutboxStore::new();
    store.append("u1", "c1", b"one".to_vec(), OutboxEntryKind::Progress).await.unwrap();
    store.append("u1", "c1", b"two".to_vec(), OutboxEntryKind::Progress).await.unwrap();

    let unsent = store.list_unsent("u1", "c1").await.unwrap();
    assert_eq!(unsent.len(), 2);
    assert_eq!(unsent[0].payload, b"one");
    assert_eq!(unsent[1].payload, b"two");
}

#[tokio::test]
async fn mark_sent_excludes_entry_from_future_replay() {
    let store = InMemoryOutboxStore::new();
    let entry = store.append("u1", "c1", b"one".to_vec(), OutboxEntryKind::Progress).await.unwrap();
    store.mark_sent(entry.id).await.unwrap();

    assert!(store.list_unsent("u1", "c1").await.unwrap().is_empty());
}

#[tokio::test]
async fn is_complete_true_only_after_terminal_entry() {
    let store = InMemoryOutboxStore::new();
    store.append("u1", "c1", b"progress".to_vec(), OutboxEntryKind::Progress).await.unwrap();
    assert!(!store.is_complete("u1", "c1").await.unwrap());

    store.append("u1", "c1", b"done".to_vec(), OutboxEntryKind::Complete).await.unwrap();
    assert!(store.is_complete("u1", "c1").await.unwrap());
}

#[tokio::test]
async fn cleanup_removes_only_sent_entries_older_than_cutoff() {
    let store = InMemoryOutboxStore::new();
    let entry = store.append("u1", "c1", b"one".to_vec(), OutboxEntryKind::Progress).await.unwrap();
    store.append("u1", "c1", b"two".to_vec(), OutboxEntryKind::Progress).await.unwrap();
    store.mark_sent(entry.id).await.unwrap();

    let cutoff = Utc::now() + chrono::Duration::seconds(60);
    let removed = store.cleanup(cutoff).await.unwrap();

    assert_eq!(removed, 1);
    let remaining = store.list_unsent("u1", "c1").await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].payload, b"two");
}

mod property {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// For any sequence of appended frames with any subset marked sent,
        /// ordering among the remaining unsent entries is preserved and no
        /// entry that was marked sent ever reappears as unsent (`spec.md`
        /// §8 properties 2 and 4). Payloads are index-derived so they are
        /// unique even when the random mask happens to repeat values.
        #[test]
        fn ordering_preserved_and_sent_is_monotonic(mark_mask in proptest::collection::vec(any::<bool>(), 1..12)) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let store = InMemoryOutboxStore::new();
                let mut ids = Vec::new();
                for i in 0..mark_mask.len() {
                    let entry = store
                        .append("u1", "c1", format!("item-{i}").into_bytes(), OutboxEntryKind::Progress)
                        .await
                        .unwrap();
                    ids.push(entry.id);
                }

                for (i, mark) in mark_mask.iter().enumerate() {
                    if *mark {
                        store.mark_sent(ids[i]).await.unwrap();
                    }
                }

                let expected_unsent: Vec<Vec<u8>> = mark_mask
                    .iter()
                    .enumerate()
                    .filter(|(_, mark)| !**mark)
                    .map(|(i, _)| format!("item-{i}").into_bytes())
                    .collect();

                let unsent = store.list_unsent("u1", "c1").await.unwrap();
                let unsent_payloads: Vec<Vec<u8>> = unsent.iter().map(|e| e.payload.clone()).collect();
                prop_assert_eq!(unsent_payloads, expected_unsent);

                // Marking sent again must never resurrect an entry as unsent.
                for id in &ids {
                    store.mark_sent(*id).await.unwrap();
                }
                prop_assert!(store.list_unsent("u1", "c1").await.unwrap().is_empty());
            });
        }
    }
}

#[tokio::test]
async fn mark_all_sent_clears_the_whole_session() {
    let store = InMemoryOutboxStore::new();
    store.append("u1", "c1", b"one".to_vec(), OutboxEntryKind::Progress).await.unwrap();
    store.append("u1", "c1", b"two".to_vec(), OutboxEntryKind::Progress).await.unwrap();

    store.mark_all_sent("u1", "c1").await.unwrap();

    assert!(store.list_unsent("u1", "c1").await.unwrap().is_empty());
}

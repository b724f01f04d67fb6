//! Query cache wired into the application context.

mod common;

use common::TestApp;
use feedguard_lib::cache::{MemoryStore, Record, Transaction, TransactionalStore};
use feedguard_lib::core::GuardError;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Post {
    id: u32,
    body: String,
}

#[tokio::test]
async fn test_cache_hits_feed_the_shared_monitor() {
    let app = TestApp::new().build();
    let cache = app.query_cache();

    for _ in 0..3 {
        let post: Result<Post, GuardError> = cache
            .cached_query(
                "post:1",
                || async {
                    Ok(Post {
                        id: 1,
                        body: "hello".to_string(),
                    })
                },
                Duration::from_secs(60),
            )
            .await;
        assert_eq!(post.unwrap().id, 1);
    }

    let report = app.monitor().performance_report();
    assert_eq!(report.cache.hits, 2);
    assert_eq!(report.cache.misses, 1);
    assert_eq!(report.database.query_count, 1);

    let optimization = cache.optimization_report();
    assert_eq!(optimization.total_queries, 3);
    assert_eq!(optimization.cached_queries, 2);
}

#[tokio::test]
async fn test_timeline_pages_through_store() {
    let app = TestApp::new().build();
    let store = MemoryStore::new();
    let mut tx = store.begin().await.unwrap();
    for id in 1..=5u32 {
        tx.put(format!("post:{:03}", id), id);
    }
    tx.commit().await.unwrap();

    let mut cursor: Option<String> = None;
    let mut seen = Vec::new();
    loop {
        let scan = store.clone();
        let page = app
            .query_cache()
            .paginated_query(
                move |after, fetch| async move {
                    Ok::<Vec<Record<u32>>, GuardError>(scan.scan_after(after.as_deref(), fetch))
                },
                cursor.as_deref(),
                2,
            )
            .await
            .unwrap();
        seen.extend(page.data.iter().map(|record| record.value));
        cursor = page.next_cursor;
        if !page.has_more {
            break;
        }
    }
    assert_eq!(seen, vec![1, 2, 3, 4, 5]);
    assert_eq!(cursor.as_deref(), Some("post:005"));

    // the final cursor is past every row
    let scan = store.clone();
    let tail = app
        .query_cache()
        .paginated_query(
            move |after, fetch| async move {
                Ok::<Vec<Record<u32>>, GuardError>(scan.scan_after(after.as_deref(), fetch))
            },
            cursor.as_deref(),
            2,
        )
        .await
        .unwrap();
    assert!(tail.data.is_empty());
    assert!(!tail.has_more);
}

#[tokio::test]
async fn test_failed_transaction_leaves_store_untouched() {
    let app = TestApp::new().build();
    let store: MemoryStore<String> = MemoryStore::new();

    let result: Result<(), GuardError> = app
        .query_cache()
        .with_transaction(&store, |tx| {
            async move {
                tx.put("like:1", "alice".to_string());
                Err(GuardError::transaction("duplicate like"))
            }
            .boxed()
        })
        .await;

    assert!(matches!(result, Err(GuardError::Transaction(_))));
    assert!(store.is_empty());

    app.query_cache()
        .with_transaction(&store, |tx| {
            async move {
                tx.put("like:1", "alice".to_string());
                Ok(())
            }
            .boxed()
        })
        .await
        .unwrap();
    assert_eq!(store.get("like:1").as_deref(), Some("alice"));
}

use fieldpoll_storage::{CoordinationStore, InMemoryCoordinationStore};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn set_if_absent_respects_ttl() {
    let store = InMemoryCoordinationStore::new();
    let ttl = Duration::from_secs(60);
    assert!(store.set_if_absent("lock:gateway:1", "a", ttl).await.expect("set"));
    assert!(!store.set_if_absent("lock:gateway:1", "b", ttl).await.expect("set"));
    assert_eq!(
        store.get("lock:gateway:1").await.expect("get").as_deref(),
        Some("a")
    );

    tokio::time::advance(Duration::from_secs(61)).await;
    assert_eq!(store.get("lock:gateway:1").await.expect("get"), None);
    assert!(store.set_if_absent("lock:gateway:1", "b", ttl).await.expect("set"));
}

#[tokio::test]
async fn delete_if_equals_checks_owner() {
    let store = InMemoryCoordinationStore::new();
    store
        .set_if_absent("lock:system", "owner-1", Duration::from_secs(300))
        .await
        .expect("set");
    assert!(!store
        .delete_if_equals("lock:system", "owner-2")
        .await
        .expect("delete"));
    assert!(store
        .delete_if_equals("lock:system", "owner-1")
        .await
        .expect("delete"));
    assert_eq!(store.get("lock:system").await.expect("get"), None);
}

#[tokio::test]
async fn prefix_delete_leaves_other_keys() {
    let store = InMemoryCoordinationStore::new();
    for key in ["schedule:gateway:1", "schedule:gateway:2", "lock:gateway:1"] {
        store.set(key, "{}", None).await.expect("set");
    }
    store
        .set("system:status", "{}", Some(Duration::from_secs(60)))
        .await
        .expect("set");

    let keys = store.scan_prefix("schedule:gateway:").await.expect("scan");
    assert_eq!(keys, vec!["schedule:gateway:1", "schedule:gateway:2"]);

    let removed = store.delete_prefix("schedule:gateway:").await.expect("delete");
    assert_eq!(removed, 2);
    assert!(store.get("lock:gateway:1").await.expect("get").is_some());
    assert!(store.get("system:status").await.expect("get").is_some());
    assert!(store.ttl("system:status").is_some());
    assert!(store.ttl("lock:gateway:1").is_none());
}

#[tokio::test]
async fn publish_reaches_current_subscribers() {
    let store = InMemoryCoordinationStore::new();
    assert_eq!(store.publish("readings:new", "ignored").await.expect("publish"), 0);

    let mut subscriber = store.subscribe();
    assert_eq!(store.publish("readings:new", "{\"id\":1}").await.expect("publish"), 1);
    let message = subscriber.recv().await.expect("message");
    assert_eq!(message.channel, "readings:new");
    assert_eq!(message.message, "{\"id\":1}");
}

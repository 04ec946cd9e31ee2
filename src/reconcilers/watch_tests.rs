// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `watch.rs`

#[cfg(test)]
mod tests {
    use crate::errors::Result;
    use crate::platform::memory::InMemoryPlatform;
    use crate::platform::{ConfigEvent, Platform};
    use crate::reconcilers::dispatch::EventHandler;
    use crate::reconcilers::watch::WatchLoop;
    use crate::selector::Selector;
    use async_trait::async_trait;
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::{watch, Semaphore};

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventHandler for Recorder {
        fn scope(&self) -> &'static str {
            "watch_test"
        }

        async fn handle(&self, event: ConfigEvent) -> Result<()> {
            let kind = match &event {
                ConfigEvent::Added(_) => "added",
                ConfigEvent::Modified(_) => "modified",
                ConfigEvent::Deleted(_) => "deleted",
                ConfigEvent::Restarted | ConfigEvent::Synced | ConfigEvent::Error(_) => "other",
            };
            self.seen.lock().unwrap().push(format!(
                "{kind}:{}",
                event.record_name().unwrap_or_default()
            ));
            Ok(())
        }
    }

    fn record(name: &str, value: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(BTreeMap::from([(
                    "type".to_string(),
                    "address-config".to_string(),
                )])),
                ..Default::default()
            },
            data: Some(BTreeMap::from([("v".to_string(), value.to_string())])),
            ..Default::default()
        }
    }

    fn start(
        platform: &Arc<InMemoryPlatform>,
        handler: &Arc<Recorder>,
    ) -> (watch::Sender<bool>, tokio::task::JoinHandle<()>) {
        let watch_loop = WatchLoop::new(
            platform.clone(),
            "acme",
            Selector::new().with("type", "address-config"),
            handler.clone(),
            Arc::new(Semaphore::new(2)),
        );
        let (stop, shutdown) = watch::channel(false);
        (stop, tokio::spawn(watch_loop.run(shutdown)))
    }

    #[tokio::test]
    async fn test_loop_delivers_listing_and_changes() {
        let platform = Arc::new(InMemoryPlatform::new());
        let handler = Arc::new(Recorder::default());
        platform.put_config("acme", &record("a", "1")).await.unwrap();

        let (stop, task) = start(&platform, &handler);
        tokio::time::sleep(Duration::from_millis(50)).await;
        platform.put_config("acme", &record("a", "2")).await.unwrap();
        platform.delete_config("acme", "a").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        stop.send_replace(true);
        task.await.unwrap();

        assert_eq!(handler.seen(), vec!["added:a", "modified:a", "deleted:a"]);
        assert_eq!(platform.watcher_count(), 0, "subscription released on shutdown");
    }

    #[tokio::test]
    async fn test_resubscribes_and_synthesizes_missed_deletes() {
        let platform = Arc::new(InMemoryPlatform::new());
        let handler = Arc::new(Recorder::default());
        platform.put_config("acme", &record("a", "1")).await.unwrap();
        platform.put_config("acme", &record("b", "1")).await.unwrap();

        let (stop, task) = start(&platform, &handler);
        tokio::time::sleep(Duration::from_millis(50)).await;

        platform.disconnect_watches();
        // Happens while no subscription is open
        platform.delete_config("acme", "a").await.unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;

        stop.send_replace(true);
        task.await.unwrap();

        let seen = handler.seen();
        assert!(seen.contains(&"deleted:a".to_string()), "seen: {seen:?}");
        assert!(!seen.contains(&"deleted:b".to_string()), "seen: {seen:?}");
        assert_eq!(platform.watcher_count(), 0);
    }

    #[tokio::test]
    async fn test_relist_on_open_subscription_synthesizes_missed_deletes() {
        let platform = Arc::new(InMemoryPlatform::new());
        let handler = Arc::new(Recorder::default());
        platform.put_config("acme", &record("a", "1")).await.unwrap();
        platform.put_config("acme", &record("b", "1")).await.unwrap();

        let (stop, task) = start(&platform, &handler);
        tokio::time::sleep(Duration::from_millis(50)).await;

        platform.suspend_watches();
        platform.delete_config("acme", "a").await.unwrap();
        platform.put_config("acme", &record("c", "1")).await.unwrap();
        platform.resume_watches();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(platform.watcher_count(), 1, "the subscription stays open");
        stop.send_replace(true);
        task.await.unwrap();

        let seen = handler.seen();
        assert!(seen.contains(&"deleted:a".to_string()), "seen: {seen:?}");
        assert!(seen.contains(&"added:c".to_string()), "seen: {seen:?}");
        assert!(!seen.contains(&"deleted:b".to_string()), "seen: {seen:?}");
    }

    #[tokio::test]
    async fn test_loop_retries_when_platform_unavailable() {
        let platform = Arc::new(InMemoryPlatform::new());
        let handler = Arc::new(Recorder::default());
        platform.put_config("acme", &record("a", "1")).await.unwrap();
        platform.fail_next(1);

        let (stop, task) = start(&platform, &handler);
        tokio::time::sleep(Duration::from_millis(1500)).await;

        stop.send_replace(true);
        task.await.unwrap();

        assert_eq!(handler.seen(), vec!["added:a"]);
    }

    #[tokio::test]
    async fn test_shutdown_while_backing_off() {
        let platform = Arc::new(InMemoryPlatform::new());
        let handler = Arc::new(Recorder::default());
        platform.set_unavailable(true);

        let (stop, task) = start(&platform, &handler);
        tokio::time::sleep(Duration::from_millis(20)).await;
        stop.send_replace(true);

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("loop stops promptly")
            .unwrap();
        assert!(handler.seen().is_empty());
    }
}

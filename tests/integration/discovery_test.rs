// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use homecrawl::config::settings::DiscoverySettings;
use homecrawl::crawl::discovery::{ParameterDiscoverer, QueryIdCache};
use homecrawl::domain::repositories::object_store::ObjectStore;
use homecrawl::infrastructure::storage::InMemoryStorage;
use homecrawl::utils::errors::StageError;

use super::helpers::{detail_request, unrelated_request, ScriptedDriver, ScriptedPortal};

const SNAPSHOT_KEY: &str = "queryid-error.html";

fn discoverer(store: Arc<InMemoryStorage>, max_attempts: u32) -> ParameterDiscoverer {
    let settings = DiscoverySettings {
        max_attempts,
        attempt_timeout_secs: 1,
    };
    ParameterDiscoverer::new("https://portal.test/los-angeles-ca/", &settings, store)
}

#[tokio::test]
async fn test_discovery_ignores_unrelated_operations() {
    let portal = ScriptedPortal::new(vec![], vec![]);
    portal.set_click_scripts(vec![vec![
        unrelated_request("HowItWorksQuery"),
        detail_request("realqid01"),
    ]]);
    let driver = ScriptedDriver::new(portal.clone());
    let store = Arc::new(InMemoryStorage::new());

    let query_id = discoverer(store, 3)
        .discover(&driver)
        .await
        .expect("matching request should be observed");

    assert_eq!(query_id.as_str(), "realqid01");
    assert_eq!(portal.sessions_created.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_discovery_retries_after_silent_attempt() {
    let portal = ScriptedPortal::new(vec![], vec![]);
    // 第一次点击没有触发任何请求，第二次才出现目标调用
    portal.set_click_scripts(vec![vec![], vec![detail_request("qid-attempt2")]]);
    let driver = ScriptedDriver::new(portal.clone());
    let store = Arc::new(InMemoryStorage::new());

    let query_id = discoverer(store.clone(), 3)
        .discover(&driver)
        .await
        .expect("second attempt should succeed");

    assert_eq!(query_id.as_str(), "qid-attempt2");
    assert_eq!(portal.sessions_created.load(Ordering::SeqCst), 2);

    // 失败的尝试留下页面快照
    let snapshot = store.get(SNAPSHOT_KEY).await.unwrap();
    assert!(snapshot.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_discovery_exhaustion_persists_snapshot() {
    let portal = ScriptedPortal::new(vec![], vec![]);
    portal.set_click_scripts(vec![]);
    let driver = ScriptedDriver::new(portal.clone());
    let store = Arc::new(InMemoryStorage::new());

    let error = discoverer(store.clone(), 2)
        .discover(&driver)
        .await
        .expect_err("budget should be exhausted");

    assert!(matches!(error, StageError::Discovery(_)));
    assert_eq!(portal.sessions_created.load(Ordering::SeqCst), 2);
    assert_eq!(
        portal.sessions_created.load(Ordering::SeqCst),
        portal.sessions_closed.load(Ordering::SeqCst)
    );
    assert!(store.get(SNAPSHOT_KEY).await.unwrap().is_some());
}

#[tokio::test]
async fn test_query_id_cache_discovers_once() {
    let portal = ScriptedPortal::new(vec![], vec![]);
    let driver = ScriptedDriver::new(portal.clone());
    let store = Arc::new(InMemoryStorage::new());

    let cache = QueryIdCache::new(discoverer(store, 3));
    let first = cache.get_or_discover(&driver).await.unwrap();
    let second = cache.get_or_discover(&driver).await.unwrap();

    assert_eq!(first, second);
    // 第二次读取命中缓存，不再开会话
    assert_eq!(portal.sessions_created.load(Ordering::SeqCst), 1);
}

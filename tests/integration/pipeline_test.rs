// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use homecrawl::config::settings::Settings;
use homecrawl::infrastructure::sink::MemorySink;
use homecrawl::infrastructure::storage::InMemoryStorage;
use homecrawl::workers::manager::{RunSummary, WorkerManager};

use super::helpers::{
    map_result, map_result_without_id, property, test_settings, ScriptedDriver, ScriptedPortal,
};

async fn run_to_completion(
    portal: &Arc<ScriptedPortal>,
    settings: Settings,
    store: Arc<InMemoryStorage>,
    sink: Arc<MemorySink>,
) -> RunSummary {
    let mut manager = WorkerManager::new(
        Arc::new(settings),
        Arc::new(ScriptedDriver::new(portal.clone())),
        store,
        sink,
        None,
    )
    .expect("manager should build");
    manager.run().await.expect("run should succeed")
}

fn priced_properties(zpids: &[&str]) -> Vec<(String, Value)> {
    zpids
        .iter()
        .enumerate()
        .map(|(i, zpid)| {
            (
                zpid.to_string(),
                property(zpid, 500_000.0 + i as f64, Some(1_700_000_000_000 + i as i64)),
            )
        })
        .collect()
}

#[tokio::test]
async fn test_zip_seed_extracts_only_candidates_with_ids() {
    let portal = ScriptedPortal::new(
        vec![map_result("101"), map_result_without_id(), map_result("102")],
        priced_properties(&["101", "102"]),
    );
    let sink = Arc::new(MemorySink::new());

    let summary = run_to_completion(
        &portal,
        test_settings(None, &["90001"]),
        Arc::new(InMemoryStorage::new()),
        sink.clone(),
    )
    .await;

    assert_eq!(summary.tasks_completed, 1);
    assert_eq!(summary.tasks_terminal, 0);
    assert_eq!(summary.records_extracted, 2);

    // 缺少标识的候选不发详情请求
    assert_eq!(portal.detail_calls.lock().len(), 2);

    let records = sink.records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].zpid, "101");
    assert_eq!(records[1].zpid, "102");

    // 入口页按种子slug构造
    assert!(portal
        .visited
        .lock()
        .iter()
        .any(|url| url.ends_with("/homes/90001")));
}

#[tokio::test]
async fn test_min_date_excludes_records_posted_at_or_before_cutoff() {
    let portal = ScriptedPortal::new(
        vec![map_result("201"), map_result("202"), map_result("203")],
        vec![
            ("201".to_string(), property("201", 400_000.0, Some(999))),
            ("202".to_string(), property("202", 500_000.0, Some(1000))),
            ("203".to_string(), property("203", 600_000.0, Some(1001))),
        ],
    );
    let sink = Arc::new(MemorySink::new());
    let mut settings = test_settings(None, &["90001"]);
    settings.crawl.min_date = Some("1000".to_string());

    let summary = run_to_completion(
        &portal,
        settings,
        Arc::new(InMemoryStorage::new()),
        sink.clone(),
    )
    .await;

    // 等于下限的不输出，严格大于的输出
    let records = sink.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].zpid, "203");

    // 被过滤的记录仍计入去重集，重跑时不再访问
    assert_eq!(summary.records_extracted, 3);
}

#[tokio::test]
async fn test_max_items_halts_run_without_error() {
    let portal = ScriptedPortal::new(
        vec![
            map_result("301"),
            map_result("302"),
            map_result("303"),
            map_result("304"),
            map_result("305"),
        ],
        priced_properties(&["301", "302", "303", "304", "305"]),
    );
    let sink = Arc::new(MemorySink::new());
    let mut settings = test_settings(None, &["90001"]);
    settings.crawl.max_items = Some(2);

    let summary = run_to_completion(
        &portal,
        settings,
        Arc::new(InMemoryStorage::new()),
        sink.clone(),
    )
    .await;

    // 达到上限后不再发起详情请求
    assert_eq!(summary.records_extracted, 2);
    assert_eq!(portal.detail_calls.lock().len(), 2);
    assert_eq!(sink.records().len(), 2);
    assert_eq!(summary.tasks_completed, 1);
}

#[tokio::test]
async fn test_captcha_then_clear_completes_normally() {
    let portal = ScriptedPortal::new(vec![map_result("401")], priced_properties(&["401"]));
    portal.present_captcha(1);
    let sink = Arc::new(MemorySink::new());

    let summary = run_to_completion(
        &portal,
        test_settings(None, &["90001"]),
        Arc::new(InMemoryStorage::new()),
        sink.clone(),
    )
    .await;

    assert_eq!(summary.tasks_completed, 1);
    assert_eq!(summary.tasks_terminal, 0);
    assert_eq!(sink.records().len(), 1);

    // 碰到挑战页的会话被退役，重试用新会话
    let created = portal.sessions_created.load(Ordering::SeqCst);
    let closed = portal.sessions_closed.load(Ordering::SeqCst);
    assert!(created >= 3, "discovery + challenge + retry, got {created}");
    assert_eq!(created, closed);
}

#[tokio::test]
async fn test_search_without_candidate_collection_fails_task() {
    let portal = ScriptedPortal::new(vec![map_result("601")], priced_properties(&["601"]));
    // 响应是合法JSON但缺少候选集合，按硬失败处理
    portal.override_search(json!({"state": {"cat1": {"searchResults": {}}}}));
    let sink = Arc::new(MemorySink::new());
    let mut settings = test_settings(None, &["90001"]);
    settings.crawl.max_retries = 0;

    let summary = run_to_completion(
        &portal,
        settings,
        Arc::new(InMemoryStorage::new()),
        sink.clone(),
    )
    .await;

    // 任务终止，但运行本身正常结束
    assert_eq!(summary.tasks_completed, 0);
    assert_eq!(summary.tasks_terminal, 1);
    assert!(sink.records().is_empty());
    assert_eq!(portal.detail_calls.lock().len(), 0);
}

#[tokio::test]
async fn test_same_listing_extracted_once_across_seeds() {
    let portal = ScriptedPortal::new(
        vec![map_result("501"), map_result("502"), map_result("503")],
        priced_properties(&["501", "502", "503"]),
    );
    let sink = Arc::new(MemorySink::new());

    let summary = run_to_completion(
        &portal,
        test_settings(None, &["90001", "90002"]),
        Arc::new(InMemoryStorage::new()),
        sink.clone(),
    )
    .await;

    assert_eq!(summary.tasks_completed, 2);
    assert_eq!(summary.search_requests, 2);

    // 两个种子命中同样的候选，输出每个房源至多一次
    assert_eq!(summary.records_extracted, 3);
    assert_eq!(sink.records().len(), 3);
    assert_eq!(portal.detail_calls.lock().len(), 3);
}

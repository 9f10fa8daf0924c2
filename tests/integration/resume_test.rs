// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde_json::Value;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use homecrawl::infrastructure::sink::MemorySink;
use homecrawl::infrastructure::storage::InMemoryStorage;
use homecrawl::workers::manager::WorkerManager;

use super::helpers::{map_result, property, test_settings, ScriptedDriver, ScriptedPortal};

fn five_candidates() -> (Vec<Value>, Vec<(String, Value)>) {
    let zpids = ["1", "2", "3", "4", "5"];
    let results = zpids.iter().map(|z| map_result(z)).collect();
    let properties = zpids
        .iter()
        .map(|z| (z.to_string(), property(z, 350_000.0, Some(1_700_000_000_000))))
        .collect();
    (results, properties)
}

#[tokio::test]
async fn test_failed_chunk_retries_from_watermark() {
    let (results, properties) = five_candidates();
    let portal = ScriptedPortal::new(results, properties);
    // 第3个候选的详情请求失败一次，任务整体重试
    portal.fail_detail("3", 1);

    let sink = Arc::new(MemorySink::new());
    let mut settings = test_settings(None, &["90001"]);
    settings.crawl.detail_concurrency = 1;

    let mut manager = WorkerManager::new(
        Arc::new(settings),
        Arc::new(ScriptedDriver::new(portal.clone())),
        Arc::new(InMemoryStorage::new()),
        sink.clone(),
        None,
    )
    .expect("manager should build");
    let summary = manager.run().await.expect("run should succeed");

    assert_eq!(summary.tasks_completed, 1);
    assert_eq!(summary.tasks_terminal, 0);

    // 每个房源恰好输出一次，顺序保持
    let zpids: Vec<String> = sink.records().iter().map(|r| r.zpid.clone()).collect();
    assert_eq!(zpids, ["1", "2", "3", "4", "5"]);

    // 重放从失败的候选继续，前两个不再发详情请求
    let calls = portal.detail_calls.lock().clone();
    assert_eq!(calls, ["1", "2", "3", "3", "4", "5"]);

    // 搜索页在重试时会重新拉取
    assert_eq!(portal.search_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_partial_chunk_persists_prefix_before_failure() {
    let (results, properties) = five_candidates();
    let portal = ScriptedPortal::new(results, properties);
    // 并发窗口里第二个位置的候选失败一次
    portal.fail_detail("4", 1);

    let sink = Arc::new(MemorySink::new());
    let settings = test_settings(None, &["90001"]);

    let mut manager = WorkerManager::new(
        Arc::new(settings),
        Arc::new(ScriptedDriver::new(portal.clone())),
        Arc::new(InMemoryStorage::new()),
        sink.clone(),
        None,
    )
    .expect("manager should build");
    let summary = manager.run().await.expect("run should succeed");

    assert_eq!(summary.tasks_completed, 1);

    // 失败批内已成功的前缀落盘，重放只补失败位置起的部分
    let zpids: Vec<String> = sink.records().iter().map(|r| r.zpid.clone()).collect();
    assert_eq!(zpids, ["1", "2", "3", "4", "5"]);

    let calls = portal.detail_calls.lock().clone();
    assert_eq!(calls, ["1", "2", "3", "4", "4", "5"]);
    assert_eq!(portal.search_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_exhausted_retries_leave_run_intact() {
    let (results, properties) = five_candidates();
    let portal = ScriptedPortal::new(results, properties);
    portal.fail_detail("3", 10);

    let sink = Arc::new(MemorySink::new());
    let mut settings = test_settings(None, &["90001"]);
    settings.crawl.detail_concurrency = 1;
    settings.crawl.max_retries = 0;

    let mut manager = WorkerManager::new(
        Arc::new(settings),
        Arc::new(ScriptedDriver::new(portal.clone())),
        Arc::new(InMemoryStorage::new()),
        sink.clone(),
        None,
    )
    .expect("manager should build");
    let summary = manager.run().await.expect("run should still succeed");

    // 任务终止但运行本身正常结束，已落盘的块保留
    assert_eq!(summary.tasks_completed, 0);
    assert_eq!(summary.tasks_terminal, 1);
    assert_eq!(summary.records_extracted, 2);

    let zpids: Vec<String> = sink.records().iter().map(|r| r.zpid.clone()).collect();
    assert_eq!(zpids, ["1", "2"]);
}

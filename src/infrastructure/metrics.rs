// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tracing::{debug, error, info, warn};

use crate::config::settings::MetricsSettings;

static SYSTEM: Lazy<Arc<Mutex<System>>> = Lazy::new(|| {
    let mut sys = System::new_with_specifics(
        RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::everything())
            .with_memory(MemoryRefreshKind::everything()),
    );
    sys.refresh_all();
    Arc::new(Mutex::new(sys))
});

/// 初始化指标系统
///
/// 启动Prometheus导出端点并注册应用所需的各类监控指标。
/// 指标关闭时直接返回。
pub fn init_metrics(settings: &MetricsSettings) {
    if !settings.enabled {
        debug!("Metrics disabled");
        return;
    }

    let addr: SocketAddr = match settings.listen_addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!(
                "Invalid metrics listen address '{}': {}. Metrics disabled.",
                settings.listen_addr, e
            );
            return;
        }
    };

    // Start the exporter
    // Ignore error if address is already in use (for development/testing)
    let builder = PrometheusBuilder::new();
    if let Err(e) = builder.with_http_listener(addr).install() {
        warn!("Failed to install Prometheus recorder: {}. This might happen if the port is already in use.", e);
        return;
    }

    info!("Metrics exporter listening on {}", addr);

    // Start background task to update system metrics
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            interval.tick().await;
            update_system_metrics();
        }
    });

    // Register metrics
    describe_gauge!(
        "system_cpu_usage_ratio",
        "Current CPU usage ratio (0.0 to 1.0)"
    );
    describe_gauge!(
        "system_memory_usage_ratio",
        "Current memory usage ratio (0.0 to 1.0)"
    );
    describe_counter!("crawl_tasks_total", "Total number of crawl tasks submitted");
    describe_counter!(
        "crawl_tasks_completed_total",
        "Total number of crawl tasks completed"
    );
    describe_counter!(
        "crawl_tasks_failed_total",
        "Total number of crawl tasks that ended in terminal failure"
    );
    describe_counter!(
        "crawl_task_retries_total",
        "Total number of task retry reschedules"
    );
    describe_counter!(
        "crawl_records_extracted_total",
        "Total number of home records extracted"
    );
    describe_counter!(
        "crawl_captcha_hits_total",
        "Total number of challenge pages encountered"
    );
    describe_counter!(
        "crawl_search_pages_total",
        "Total number of search result pages fetched"
    );
    describe_counter!(
        "crawl_discovery_attempts_total",
        "Total number of query parameter discovery attempts"
    );
    describe_histogram!(
        "crawl_task_duration_seconds",
        "Duration of crawl tasks in seconds"
    );
}

fn update_system_metrics() {
    if let Ok(mut sys) = SYSTEM.lock() {
        sys.refresh_cpu_all();
        sys.refresh_memory();

        let cpu_usage = sys.global_cpu_usage() / 100.0;
        gauge!("system_cpu_usage_ratio").set(cpu_usage as f64);

        // Alerting logic
        if cpu_usage > 0.9 {
            error!(
                "CRITICAL: System CPU usage is extremely high: {:.2}%",
                cpu_usage * 100.0
            );
        } else if cpu_usage > 0.8 {
            warn!(
                "ALARM: System CPU usage is high: {:.2}%",
                cpu_usage * 100.0
            );
        }

        let total_mem = sys.total_memory();
        if total_mem > 0 {
            let used_mem = sys.used_memory();
            let mem_usage = used_mem as f64 / total_mem as f64;
            gauge!("system_memory_usage_ratio").set(mem_usage);

            if mem_usage > 0.9 {
                error!(
                    "CRITICAL: System memory usage is extremely high: {:.2}%",
                    mem_usage * 100.0
                );
            } else if mem_usage > 0.8 {
                warn!(
                    "ALARM: System memory usage is high: {:.2}%",
                    mem_usage * 100.0
                );
            }
        }
    }
}

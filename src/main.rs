// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use homecrawl::config::settings::Settings;
use homecrawl::domain::repositories::object_store::ObjectStore;
use homecrawl::domain::repositories::record_sink::RecordSink;
use homecrawl::driver::chromium::ChromiumDriver;
use homecrawl::driver::traits::PageDriver;
use homecrawl::infrastructure::export::BulkExporter;
use homecrawl::infrastructure::sink::DatasetSink;
use homecrawl::infrastructure::storage::create_object_store;
use homecrawl::workers::manager::WorkerManager;
use std::sync::Arc;
use tracing::info;

use homecrawl::utils::telemetry;

/// 主函数
///
/// 应用程序入口点，负责初始化所有组件并执行一次完整运行
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize logging
    telemetry::init_telemetry();
    info!("Starting homecrawl...");

    // 2. Load configuration
    let settings = Arc::new(Settings::new()?);
    info!("Configuration loaded");

    // Initialize Prometheus Metrics
    homecrawl::infrastructure::metrics::init_metrics(&settings.metrics);

    // 3. Initialize object store
    let store: Arc<dyn ObjectStore + Send + Sync> =
        Arc::from(create_object_store(&settings.storage).await?);
    info!(
        "Object store initialized ({})",
        settings.storage.storage_type
    );

    // 4. Initialize record sink and optional bulk exporter
    let sink: Arc<dyn RecordSink> = Arc::new(DatasetSink::new(store.clone()));
    let exporter = if settings.export.enabled {
        let export_store: Arc<dyn ObjectStore + Send + Sync> =
            Arc::from(create_object_store(&settings.export.storage).await?);
        info!(
            "Bulk export enabled ({})",
            settings.export.storage.storage_type
        );
        Some(Arc::new(BulkExporter::new(export_store)))
    } else {
        None
    };

    // 5. Initialize page driver
    let driver: Arc<dyn PageDriver> = Arc::new(ChromiumDriver::new(settings.browser.clone()));
    info!("Page driver initialized");

    // 6. Run the crawl to completion
    let mut manager = WorkerManager::new(settings, driver, store, sink, exporter)?;
    let summary = manager.run().await?;

    info!(
        tasks_completed = summary.tasks_completed,
        tasks_terminal = summary.tasks_terminal,
        records_extracted = summary.records_extracted,
        search_requests = summary.search_requests,
        "Run finished"
    );

    Ok(())
}

// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::counter;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};
use url::Url;

use crate::config::settings::Settings;
use crate::crawl::detail::HomeDetailFetcher;
use crate::crawl::discovery::{ParameterDiscoverer, QueryIdCache};
use crate::crawl::search::SearchResultFetcher;
use crate::domain::models::seed::Seed;
use crate::domain::models::task::CrawlTask;
use crate::domain::repositories::object_store::ObjectStore;
use crate::domain::repositories::record_sink::RecordSink;
use crate::driver::traits::PageDriver;
use crate::infrastructure::export::BulkExporter;
use crate::infrastructure::state_store::CrawlStateStore;
use crate::queue::task_queue::{InMemoryTaskQueue, TaskQueue};
use crate::utils::errors::RunError;
use crate::workers::crawl_worker::CrawlWorker;

/// 运行结果汇总
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// 正常完成的任务数
    pub tasks_completed: u64,
    /// 进入终态的任务数
    pub tasks_terminal: u64,
    /// 提取的去重房源总数
    pub records_extracted: u64,
    /// 发出的搜索请求总数
    pub search_requests: u64,
}

/// 工作管理器
///
/// 负责一次完整运行的编排：恢复检查点、把种子转成任务入队、
/// 预热查询参数发现、启动工作器池并监督运行直到任务耗尽、
/// 提取数量达到上限或收到停机信号。
pub struct WorkerManager {
    settings: Arc<Settings>,
    driver: Arc<dyn PageDriver>,
    queue: Arc<InMemoryTaskQueue>,
    state: Arc<CrawlStateStore>,
    sink: Arc<dyn RecordSink>,
    exporter: Option<Arc<BulkExporter>>,
    search: Arc<SearchResultFetcher>,
    details: Arc<HomeDetailFetcher>,
    query_ids: Arc<QueryIdCache>,
    request_seq: Arc<AtomicU64>,
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerManager {
    /// 创建工作管理器
    ///
    /// 在这里组装整条流水线的共享组件：请求序号计数器、
    /// 搜索与详情获取器、查询参数缓存、去重状态存储和任务队列。
    ///
    /// # 参数
    ///
    /// * `settings` - 应用配置
    /// * `driver` - 页面驱动
    /// * `store` - 检查点与诊断快照的存储后端
    /// * `sink` - 记录输出
    /// * `exporter` - 可选的批量导出器
    ///
    /// # 返回值
    ///
    /// * `Ok(WorkerManager)` - 组装完成的管理器
    /// * `Err(RunError::InvalidConfig)` - 门户地址无法解析
    pub fn new(
        settings: Arc<Settings>,
        driver: Arc<dyn PageDriver>,
        store: Arc<dyn ObjectStore + Send + Sync>,
        sink: Arc<dyn RecordSink>,
        exporter: Option<Arc<BulkExporter>>,
    ) -> Result<Self, RunError> {
        let discovery_url = Url::parse(&settings.portal.base_url)
            .and_then(|base| base.join(&settings.portal.discovery_path))
            .map_err(|e| RunError::InvalidConfig(format!("invalid discovery url: {e}")))?;

        let request_seq = Arc::new(AtomicU64::new(0));
        let search = Arc::new(SearchResultFetcher::new(
            settings.portal.base_url.clone(),
            request_seq.clone(),
        ));
        let details = Arc::new(HomeDetailFetcher::new(
            settings.portal.base_url.clone(),
            settings.crawl.detail_concurrency,
        ));
        let discoverer =
            ParameterDiscoverer::new(discovery_url.as_str(), &settings.discovery, store.clone());
        let query_ids = Arc::new(QueryIdCache::new(discoverer));
        let state = Arc::new(CrawlStateStore::new(store));
        let queue = Arc::new(InMemoryTaskQueue::new());
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            settings,
            driver,
            queue,
            state,
            sink,
            exporter,
            search,
            details,
            query_ids,
            request_seq,
            shutdown,
            handles: Vec::new(),
        })
    }

    /// 执行一次完整运行
    ///
    /// # 返回值
    ///
    /// * `Ok(RunSummary)` - 运行汇总；任务级失败只体现在终态计数里
    /// * `Err(RunError)` - 无种子、配置无效或发现预算耗尽
    pub async fn run(&mut self) -> Result<RunSummary, RunError> {
        let restored = self.state.restore().await?;
        if restored > 0 {
            info!("Restored {} extracted ids from checkpoint", restored);
        }

        let seeds = self.build_seeds();
        if seeds.is_empty() {
            return Err(RunError::NoSeeds);
        }
        let total_tasks = seeds.len() as u64;
        info!("Submitting {} seed tasks", total_tasks);

        for seed in seeds {
            let url = seed
                .start_url(&self.settings.portal.base_url)
                .map_err(|e| RunError::InvalidConfig(format!("invalid portal base url: {e}")))?;
            let task = CrawlTask::new(seed, url, self.settings.crawl.max_retries);
            self.queue.enqueue(task).await?;
            counter!("crawl_tasks_total").increment(1);
        }

        // 发现是一次性阻塞门槛，预热失败则整个运行失败
        self.query_ids
            .get_or_discover(self.driver.as_ref())
            .await
            .map_err(|e| {
                error!("Query parameter discovery failed: {}", e);
                RunError::DiscoveryExhausted {
                    attempts: self.settings.discovery.max_attempts,
                }
            })?;
        info!("Query parameter discovered, starting workers");

        self.spawn_ctrl_c_listener();
        self.start_workers(self.settings.crawl.workers);
        self.supervise(total_tasks).await;
        self.shutdown_workers().await;

        if let Err(e) = self.state.flush().await {
            warn!("Final checkpoint flush failed: {}", e);
        }

        let stats = self.queue.stats();
        Ok(RunSummary {
            tasks_completed: stats.completed,
            tasks_terminal: stats.failed,
            records_extracted: self.state.total_extracted(),
            search_requests: self.request_seq.load(Ordering::Relaxed),
        })
    }

    /// 把配置的种子输入展开为种子列表
    ///
    /// 搜索词在前，邮编按配置顺序在后；空白条目被忽略
    fn build_seeds(&self) -> Vec<Seed> {
        let mut seeds = Vec::new();
        if let Some(term) = &self.settings.crawl.search {
            if !term.trim().is_empty() {
                seeds.push(Seed::SearchTerm(term.clone()));
            }
        }
        for zip in &self.settings.crawl.zipcodes {
            if !zip.trim().is_empty() {
                seeds.push(Seed::ZipCode(zip.clone()));
            }
        }
        seeds
    }

    /// 启动工作进程
    ///
    /// # 参数
    ///
    /// * `count` - 要启动的工作进程数量
    fn start_workers(&mut self, count: usize) {
        for _ in 0..count {
            let worker = CrawlWorker::new(
                self.queue.clone(),
                self.driver.clone(),
                self.search.clone(),
                self.details.clone(),
                self.query_ids.clone(),
                self.state.clone(),
                self.sink.clone(),
                self.exporter.clone(),
                self.settings.crawl.clone(),
                self.shutdown.subscribe(),
            );

            // We spawn the worker loop on a separate task to avoid blocking the main thread
            // or the loop that spawns workers.
            let handle = tokio::spawn(async move {
                worker.run().await;
            });
            self.handles.push(handle);
        }
    }

    fn spawn_ctrl_c_listener(&self) {
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            match signal::ctrl_c().await {
                Ok(()) => {
                    info!("Shutdown signal received");
                    let _ = shutdown.send(true);
                }
                Err(err) => error!("Unable to listen for shutdown signal: {}", err),
            }
        });
    }

    /// 监督运行直到结束条件之一出现
    ///
    /// 结束条件：全部任务进入完成或终态、提取数量达到上限、
    /// 或停机信号到达。
    async fn supervise(&self, total_tasks: u64) {
        let mut shutdown = self.shutdown.subscribe();

        loop {
            if *shutdown.borrow() {
                break;
            }
            if let Some(cap) = self.settings.crawl.max_items {
                if self.state.total_extracted() >= cap {
                    info!("Extraction cap of {} reached, halting run", cap);
                    break;
                }
            }
            let stats = self.queue.stats();
            if stats.completed + stats.failed >= total_tasks {
                info!("All tasks settled, draining workers");
                break;
            }

            tokio::select! {
                _ = sleep(Duration::from_millis(500)) => {}
                _ = shutdown.changed() => {}
            }
        }
    }

    /// 关闭工作进程
    ///
    /// 停机信号触发的关闭直接中止工作器；正常结束时等待
    /// 工作器自行退出，让进行中的批次走完持久化。
    async fn shutdown_workers(&mut self) {
        let interrupted = *self.shutdown.borrow();
        let _ = self.shutdown.send(true);
        info!("Shutting down workers...");

        if interrupted {
            for handle in &self.handles {
                handle.abort();
            }
        }
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!("Worker task failed: {}", e);
                }
            }
        }

        info!("Workers shut down successfully");
    }
}

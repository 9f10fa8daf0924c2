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

use chrono::Utc;
use metrics::{counter, histogram};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::settings::CrawlSettings;
use crate::crawl::captcha::CaptchaGuard;
use crate::crawl::detail::HomeDetailFetcher;
use crate::crawl::discovery::QueryIdCache;
use crate::crawl::extractor::QueryStateExtractor;
use crate::crawl::search::SearchResultFetcher;
use crate::domain::models::listing::{HomeRecord, ListingRef};
use crate::domain::models::task::CrawlTask;
use crate::domain::repositories::record_sink::RecordSink;
use crate::driver::traits::{PageDriver, PageSession};
use crate::infrastructure::export::BulkExporter;
use crate::infrastructure::state_store::CrawlStateStore;
use crate::queue::task_queue::{QueueError, TaskQueue};
use crate::utils::errors::StageError;
use crate::utils::retry_policy::RetryPolicy;

/// 爬取工作者
///
/// 从队列领取任务并执行完整的提取流水线：人机验证检查、
/// 查询状态获取、搜索、去重过滤、详情获取和持久化。
/// 每个任务使用独立的页面会话，任务结束（无论成败）后会话被退役。
pub struct CrawlWorker<Q>
where
    Q: TaskQueue + Send + Sync,
{
    queue: Arc<Q>,
    driver: Arc<dyn PageDriver>,
    captcha: CaptchaGuard,
    extractor: QueryStateExtractor,
    search: Arc<SearchResultFetcher>,
    details: Arc<HomeDetailFetcher>,
    query_ids: Arc<QueryIdCache>,
    state: Arc<CrawlStateStore>,
    sink: Arc<dyn RecordSink>,
    exporter: Option<Arc<BulkExporter>>,
    settings: CrawlSettings,
    retry_policy: RetryPolicy,
    captcha_policy: RetryPolicy,
    shutdown: watch::Receiver<bool>,
    worker_id: Uuid,
}

impl<Q> CrawlWorker<Q>
where
    Q: TaskQueue + Send + Sync,
{
    /// 创建新的爬取工作器实例
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<Q>,
        driver: Arc<dyn PageDriver>,
        search: Arc<SearchResultFetcher>,
        details: Arc<HomeDetailFetcher>,
        query_ids: Arc<QueryIdCache>,
        state: Arc<CrawlStateStore>,
        sink: Arc<dyn RecordSink>,
        exporter: Option<Arc<BulkExporter>>,
        settings: CrawlSettings,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let retry_policy = RetryPolicy::standard().with_max_retries(settings.max_retries);
        let captcha_policy = RetryPolicy::fixed(settings.captcha_cooldown());

        Self {
            queue,
            driver,
            captcha: CaptchaGuard,
            extractor: QueryStateExtractor,
            search,
            details,
            query_ids,
            state,
            sink,
            exporter,
            settings,
            retry_policy,
            captcha_policy,
            shutdown,
            worker_id: Uuid::new_v4(),
        }
    }

    /// 运行爬取工作器
    ///
    /// 循环领取到期任务直到收到停机信号或提取数量达到上限。
    /// 队列为空时退避一秒再试。
    pub async fn run(&self) {
        info!("Crawl worker {} started", self.worker_id);
        let mut shutdown = self.shutdown.clone();

        loop {
            if *shutdown.borrow() {
                break;
            }
            if self.reached_max_items() {
                info!("Extraction cap reached, worker stopping");
                break;
            }

            match self.process_next_task().await {
                Ok(processed) => {
                    if !processed {
                        tokio::select! {
                            _ = sleep(Duration::from_secs(1)) => {}
                            _ = shutdown.changed() => {}
                        }
                    }
                }
                Err(e) => {
                    error!("Error processing task: {}", e);
                    sleep(Duration::from_secs(1)).await;
                }
            }
        }

        info!("Crawl worker {} stopped", self.worker_id);
    }

    async fn process_next_task(&self) -> Result<bool, QueueError> {
        let task_opt = self.queue.dequeue(self.worker_id).await?;

        if let Some(task) = task_opt {
            self.process_task(task).await?;
            return Ok(true);
        }

        Ok(false)
    }

    #[instrument(skip(self, task), fields(task_id = %task.id, seed = %task.seed, attempt = task.attempt_count))]
    async fn process_task(&self, task: CrawlTask) -> Result<(), QueueError> {
        info!("Processing crawl task");
        let started = Instant::now();
        let task_id = task.id;

        let mut task = match task.start() {
            Ok(task) => task,
            Err(e) => {
                warn!("Task not in a runnable state: {}", e);
                self.queue.fail(task_id).await?;
                return Ok(());
            }
        };

        let outcome = self.run_pipeline(&mut task).await;
        histogram!("crawl_task_duration_seconds").record(started.elapsed().as_secs_f64());

        match outcome {
            Ok(()) => {
                if let Err(e) = task.complete() {
                    warn!("Task state transition failed: {}", e);
                }
                self.queue.complete(task_id).await?;
                counter!("crawl_tasks_completed_total").increment(1);
                info!(
                    total_extracted = self.state.total_extracted(),
                    "Task completed"
                );
                Ok(())
            }
            Err(error) => self.handle_failure(task, error).await,
        }
    }

    /// 在时间预算内执行流水线
    ///
    /// 会话的创建与关闭不计入预算：超时会丢弃流水线中
    /// 未完成的调用，但会话本身仍要正常退役。
    async fn run_pipeline(&self, task: &mut CrawlTask) -> Result<(), StageError> {
        let mut session = self.driver.new_session().await?;

        let outcome = match timeout(
            self.settings.task_timeout(),
            self.crawl_seed(session.as_ref(), task),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(StageError::TimedOut),
        };

        if let Err(e) = session.close().await {
            warn!("Failed to close page session: {}", e);
        }

        outcome
    }

    /// 执行一个种子任务的提取流水线
    ///
    /// 候选按详情并发度分批处理，每批持久化后推进 `resume_index`
    /// 水位线。批内失败时已成功的前缀照常落盘，水位线停在失败
    /// 候选上，重试从那里重放而不重做已完成的部分。
    async fn crawl_seed(
        &self,
        session: &dyn PageSession,
        task: &mut CrawlTask,
    ) -> Result<(), StageError> {
        session.goto(&task.url).await?;
        self.captcha.check(session).await?;

        let query_state = match task.query_state.clone() {
            Some(state) => state,
            None => {
                let state = self.extractor.extract(session).await?;
                task.query_state = Some(state.clone());
                state
            }
        };

        let listings = self.search.fetch(session, &query_state).await?;
        counter!("crawl_search_pages_total").increment(1);

        let candidates: Vec<(usize, ListingRef)> = listings
            .into_iter()
            .take(self.settings.results_per_search)
            .enumerate()
            .collect();
        debug!(
            candidates = candidates.len(),
            resume_index = task.resume_index,
            "Search results capped"
        );

        let pending: Vec<(usize, ListingRef)> = candidates
            .into_iter()
            .skip(task.resume_index)
            .filter(|(_, listing)| !self.state.is_extracted(&listing.zpid))
            .collect();

        if pending.is_empty() {
            debug!("No new listings to extract");
            return Ok(());
        }

        let query_id = self.query_ids.get_or_discover(self.driver.as_ref()).await?;
        let min_date = self.settings.min_date_millis();

        for chunk in pending.chunks(self.details.concurrency()) {
            if self.reached_max_items() {
                info!("Extraction cap reached, stopping task early");
                break;
            }

            let refs: Vec<ListingRef> = chunk.iter().map(|(_, listing)| listing.clone()).collect();
            let outcome = self.details.fetch_batch(session, &refs, &query_id).await;

            // 先占有再输出：并发任务撞上同一房源时只有一方占到
            let newly: HashSet<String> = self
                .state
                .record_batch(outcome.records.iter().map(|r| r.zpid.clone()))
                .into_iter()
                .collect();
            debug!(
                fetched = outcome.records.len(),
                newly = newly.len(),
                "Detail batch fetched"
            );

            for (pos, record) in outcome.records.iter().enumerate() {
                if !newly.contains(&record.zpid) {
                    debug!(zpid = %record.zpid, "Listing claimed by another task, skipped");
                    continue;
                }
                if !passes_min_date(record, min_date) {
                    debug!(zpid = %record.zpid, "Listing posted before cutoff, skipped");
                    continue;
                }
                if let Err(e) = self.emit(task, record).await {
                    // 未输出的占有退回集合，重放时重新获取
                    let unemitted: Vec<&str> = outcome.records[pos..]
                        .iter()
                        .filter(|r| newly.contains(&r.zpid))
                        .map(|r| r.zpid.as_str())
                        .collect();
                    self.state.release_batch(unemitted);
                    task.resume_index = chunk[pos].0;
                    if let Err(fe) = self.state.flush().await {
                        warn!("Checkpoint flush after sink failure failed: {}", fe);
                    }
                    return Err(e);
                }
            }

            self.state.flush().await?;

            match &outcome.error {
                None => {
                    if let Some((last_index, _)) = chunk.last() {
                        task.resume_index = *last_index + 1;
                    }
                }
                // 失败项是前缀之后的第一个候选，重放从它开始
                Some(_) => task.resume_index = chunk[outcome.records.len()].0,
            }

            if let Some(error) = outcome.error {
                return Err(error);
            }
        }

        Ok(())
    }

    /// 输出一条记录到数据集和可选的批量导出目标
    async fn emit(&self, task: &CrawlTask, record: &HomeRecord) -> Result<(), StageError> {
        self.sink
            .push(record)
            .await
            .map_err(|e| StageError::Sink(e.to_string()))?;
        if let Some(exporter) = &self.exporter {
            exporter
                .export(&task.seed, record)
                .await
                .map_err(|e| StageError::Sink(e.to_string()))?;
        }
        counter!("crawl_records_extracted_total").increment(1);
        Ok(())
    }

    /// 处理任务失败
    ///
    /// 可重试的失败按退避策略重新入队；人机验证使用固定
    /// 冷却时间。重试次数耗尽或不可重试的失败转入终态，
    /// 只记录日志，不影响整个运行。
    async fn handle_failure(&self, task: CrawlTask, error: StageError) -> Result<(), QueueError> {
        if error.is_captcha() {
            warn!("Challenge detected, cooling down before retry");
            counter!("crawl_captcha_hits_total").increment(1);
        } else {
            error!("Task stage failed: {}", error);
        }

        let task_id = task.id;

        if !error.is_retryable() || !task.can_retry() {
            let attempts = task.attempt_count + 1;
            if let Err(e) = task.terminal() {
                warn!("Task state transition failed: {}", e);
            }
            self.queue.fail(task_id).await?;
            counter!("crawl_tasks_failed_total").increment(1);
            warn!("Task failed permanently after {} attempts, dropping", attempts);
            return Ok(());
        }

        let policy = if error.is_captcha() {
            &self.captcha_policy
        } else {
            &self.retry_policy
        };
        let next_retry = policy.next_retry_time(task.attempt_count + 1, Utc::now());
        let resume_index = task.resume_index;

        let task = match task.retry(next_retry, resume_index) {
            Ok(task) => task,
            Err(e) => {
                warn!("Task state transition failed: {}", e);
                self.queue.fail(task_id).await?;
                counter!("crawl_tasks_failed_total").increment(1);
                return Ok(());
            }
        };

        counter!("crawl_task_retries_total").increment(1);
        info!(
            "Scheduled retry {}/{} for task {} at {}",
            task.attempt_count, task.max_retries, task.id, next_retry
        );
        self.queue.enqueue(task).await?;
        Ok(())
    }

    fn reached_max_items(&self) -> bool {
        self.settings
            .max_items
            .map_or(false, |cap| self.state.total_extracted() >= cap)
    }
}

/// 判断记录是否通过发布日期下限过滤
///
/// 发布时间严格晚于下限才保留；设置了下限但记录缺少
/// 发布时间的按不通过处理。未设置下限时全部通过。
fn passes_min_date(record: &HomeRecord, min_date: Option<i64>) -> bool {
    match min_date {
        None => true,
        Some(cutoff) => record.date_posted.map_or(false, |posted| posted > cutoff),
    }
}

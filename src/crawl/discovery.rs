// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::counter;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::detail::DETAIL_OPERATION;
use crate::config::settings::DiscoverySettings;
use crate::domain::repositories::object_store::ObjectStore;
use crate::driver::traits::{ObservedRequest, PageDriver, PageSession};
use crate::utils::errors::StageError;

/// 发现失败时页面快照的存储键，多次失败时后写覆盖先写
const DIAGNOSTIC_KEY: &str = "queryid-error.html";

/// 触发详情请求的房源卡片选择器
const LISTING_CARD_SELECTOR: &str = "a.list-card-link";

/// 详情API要求的不透明查询参数
///
/// 无公开文档，只能通过观测真实流量习得。进程生命周期内
/// 发现一次后只读使用。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryId(String);

impl QueryId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 查询参数发现器
///
/// 打开已知的房源列表页，装上流量观测器，点开一个详情视图
/// 诱发目标API调用，再从请求体里取出查询参数。每次尝试用
/// 独立会话并受固定超时约束，预算耗尽后整体失败。
pub struct ParameterDiscoverer {
    discovery_url: String,
    max_attempts: u32,
    attempt_timeout: Duration,
    store: Arc<dyn ObjectStore + Send + Sync>,
}

impl ParameterDiscoverer {
    /// 创建发现器
    ///
    /// # 参数
    ///
    /// * `discovery_url` - 已知会出详情请求的列表页URL
    /// * `settings` - 发现预算配置
    /// * `store` - 诊断快照的存储后端
    pub fn new(
        discovery_url: impl Into<String>,
        settings: &DiscoverySettings,
        store: Arc<dyn ObjectStore + Send + Sync>,
    ) -> Self {
        Self {
            discovery_url: discovery_url.into(),
            max_attempts: settings.max_attempts,
            attempt_timeout: settings.attempt_timeout(),
            store,
        }
    }

    /// 发现查询参数
    ///
    /// 逐次尝试直到观测到匹配的详情请求。每次失败都会留下
    /// 当前页面的诊断快照，最后一次的快照在预算耗尽后供人工
    /// 排查使用。
    ///
    /// # 参数
    ///
    /// * `driver` - 页面驱动
    ///
    /// # 返回值
    ///
    /// * `Ok(QueryId)` - 发现到的查询参数
    /// * `Err(StageError::Discovery)` - 预算耗尽仍未观测到
    pub async fn discover(&self, driver: &dyn PageDriver) -> Result<QueryId, StageError> {
        info!(url = %self.discovery_url, "Extracting initial settings");

        for attempt in 1..=self.max_attempts {
            counter!("crawl_discovery_attempts_total").increment(1);
            let mut session = match driver.new_session().await {
                Ok(session) => session,
                Err(error) => {
                    warn!(attempt, error = %error, "Discovery session launch failed");
                    continue;
                }
            };

            match timeout(self.attempt_timeout, self.attempt(session.as_ref())).await {
                Ok(Ok(query_id)) => {
                    let _ = session.close().await;
                    info!(attempt, query_id = %query_id, "Query parameter discovered");
                    return Ok(query_id);
                }
                Ok(Err(error)) => {
                    debug!(attempt, error = %error, "Settings extraction in progress");
                }
                Err(_) => {
                    debug!(attempt, "Discovery attempt timed out");
                }
            }

            self.snapshot_page(session.as_ref()).await;
            let _ = session.close().await;
        }

        Err(StageError::Discovery(format!(
            "no matching operation observed after {} attempts",
            self.max_attempts
        )))
    }

    async fn attempt(&self, session: &dyn PageSession) -> Result<QueryId, StageError> {
        let mut requests = session.observe_requests().await?;
        session.goto(&self.discovery_url).await?;
        session.click(LISTING_CARD_SELECTOR).await?;

        while let Some(request) = requests.recv().await {
            if let Some(query_id) = match_detail_request(&request) {
                return Ok(query_id);
            }
        }
        Err(StageError::Discovery(
            "traffic observer closed without a match".to_string(),
        ))
    }

    /// 保存当前页面内容作为诊断快照，尽力而为
    async fn snapshot_page(&self, session: &dyn PageSession) {
        match session.content().await {
            Ok(html) => {
                if let Err(error) = self.store.save(DIAGNOSTIC_KEY, html.as_bytes()).await {
                    warn!(error = %error, "Failed to persist discovery snapshot");
                }
            }
            Err(error) => {
                debug!(error = %error, "Could not capture page content for snapshot");
            }
        }
    }
}

/// 判断一个被观测的请求是否携带目标查询参数
fn match_detail_request(request: &ObservedRequest) -> Option<QueryId> {
    if !request.url.contains("/graphql") {
        return None;
    }
    let body = request.post_body.as_deref()?;
    let payload: Value = serde_json::from_str(body).ok()?;
    match payload.get("operationName").and_then(Value::as_str) {
        Some(DETAIL_OPERATION) => payload
            .get("queryId")
            .and_then(Value::as_str)
            .map(QueryId::new),
        Some(other) => {
            debug!(operation = other, "Ignoring non-matching operation");
            None
        }
        None => None,
    }
}

/// 查询参数缓存
///
/// 进程级的一次性写入缓存。并发调用只触发一次发现，
/// 其余调用等待同一个结果。
pub struct QueryIdCache {
    discoverer: ParameterDiscoverer,
    cell: OnceCell<QueryId>,
}

impl QueryIdCache {
    /// 创建查询参数缓存
    pub fn new(discoverer: ParameterDiscoverer) -> Self {
        Self {
            discoverer,
            cell: OnceCell::new(),
        }
    }

    /// 读取缓存的查询参数，未命中时执行一次发现
    pub async fn get_or_discover(&self, driver: &dyn PageDriver) -> Result<QueryId, StageError> {
        self.cell
            .get_or_try_init(|| self.discoverer.discover(driver))
            .await
            .map(|query_id| query_id.clone())
    }
}

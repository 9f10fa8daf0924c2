// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::domain::models::listing::ListingRef;
use crate::domain::models::query_state::QueryState;
use crate::driver::traits::PageSession;
use crate::utils::errors::StageError;

/// 搜索API的结果分区选择器
const WANTS_SELECTOR: &str = r#"{"cat1":["listResults","mapResults"]}"#;

/// 搜索结果获取器
///
/// 用查询状态调用门户的搜索API并返回候选房源引用。
/// 请求通过页面自身的网络上下文发出，以便携带入口页
/// 建立的会话凭证。请求序号由编排器注入，进程内单调递增。
pub struct SearchResultFetcher {
    base_url: String,
    request_seq: Arc<AtomicU64>,
}

impl SearchResultFetcher {
    /// 创建搜索结果获取器
    ///
    /// # 参数
    ///
    /// * `base_url` - 门户基础URL
    /// * `request_seq` - 编排器持有的进程级请求序号
    pub fn new(base_url: impl Into<String>, request_seq: Arc<AtomicU64>) -> Self {
        Self {
            base_url: base_url.into(),
            request_seq,
        }
    }

    /// 获取候选房源引用
    ///
    /// 发起调用前先给查询状态并入固定的已售状态过滤器。
    /// 响应无法解码或缺少结果集合都是硬失败，让调用方
    /// 重试整个任务而不是拿着零结果继续。
    ///
    /// # 参数
    ///
    /// * `session` - 已通过入口页的页面会话
    /// * `query_state` - 本任务的查询状态
    ///
    /// # 返回值
    ///
    /// 按响应顺序排列的候选引用，缺少标识的条目已被过滤
    pub async fn fetch(
        &self,
        session: &dyn PageSession,
        query_state: &QueryState,
    ) -> Result<Vec<ListingRef>, StageError> {
        let augmented = query_state.with_sold_filter();
        let url = self.build_search_url(&augmented)?;
        let outcome = session.evaluate(&build_fetch_script(&url)).await?;

        if outcome
            .get("challenge")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            return Err(StageError::CaptchaDetected);
        }
        if let Some(error) = outcome.get("error").and_then(Value::as_str) {
            return Err(StageError::Search(format!(
                "search response is not valid JSON: {error}"
            )));
        }

        let state = outcome.get("state").ok_or_else(|| {
            StageError::Search("search call returned no response body".to_string())
        })?;
        let map_results = extract_map_results(state)
            .ok_or_else(|| StageError::Search("search response lacks mapResults".to_string()))?;

        let listings: Vec<ListingRef> =
            map_results.iter().filter_map(ListingRef::from_result).collect();
        debug!(
            total = map_results.len(),
            with_id = listings.len(),
            "Search results fetched"
        );
        Ok(listings)
    }

    /// 构造搜索API的URL
    ///
    /// 查询状态序列化后整体URL编码，并附带结果分区选择器
    /// 和下一个请求序号
    fn build_search_url(&self, query_state: &QueryState) -> Result<String, StageError> {
        let serialized = serde_json::to_string(query_state.as_value())
            .map_err(|e| StageError::Search(format!("query state serialization failed: {e}")))?;
        let seq = self.request_seq.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(format!(
            "{}/search/GetSearchPageState.htm?searchQueryState={}&wants={}&requestId={}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(&serialized),
            urlencoding::encode(WANTS_SELECTOR),
            seq
        ))
    }
}

/// 构造页面内取搜索结果的脚本
///
/// 响应先按文本读取：携带挑战标记的响应体按人机验证
/// 事件上报而不是解析错误
fn build_fetch_script(url: &str) -> String {
    let url_literal = Value::String(url.to_string()).to_string();
    format!(
        r#"(async () => {{
    const resp = await fetch({url_literal});
    const text = await resp.text();
    if (text.includes('captcha-container') || text.includes('px-captcha')) {{
        return {{ challenge: true }};
    }}
    try {{
        return {{ challenge: false, state: JSON.parse(text) }};
    }} catch (e) {{
        return {{ challenge: false, error: String(e) }};
    }}
}})()"#
    )
}

/// 从响应信封中取出结果集合
///
/// 优先读当前版本的 cat1 分区，找不到时退回旧版布局
fn extract_map_results(state: &Value) -> Option<&Vec<Value>> {
    state
        .pointer("/cat1/searchResults/mapResults")
        .and_then(Value::as_array)
        .or_else(|| {
            state
                .pointer("/searchResults/mapResults")
                .and_then(Value::as_array)
        })
}

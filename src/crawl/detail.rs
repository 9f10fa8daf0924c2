// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use futures::stream::StreamExt;
use serde_json::{json, Value};
use tracing::debug;

use super::discovery::QueryId;
use crate::domain::models::listing::{HomeRecord, ListingRef};
use crate::driver::traits::PageSession;
use crate::utils::errors::StageError;

/// 详情API的操作名
pub const DETAIL_OPERATION: &str = "ForSaleDoubleScrollFullRenderQuery";

/// 详情请求携带的固定请求头
const GRAPHQL_HEADERS: &str =
    r#"{"accept":"*/*","accept-language":"cs,en-US;q=0.9,en;q=0.8,de;q=0.7,es;q=0.6","content-type":"text/plain"}"#;

/// 一批详情请求的结果
///
/// `records` 按输入顺序保存首个失败之前成功的记录，
/// `error` 是首个失败（若有）。失败时 `records.len()`
/// 即失败项在本批中的位置，调用方据此持久化前缀并从
/// 失败位置重放。
#[derive(Debug)]
pub struct BatchOutcome {
    pub records: Vec<HomeRecord>,
    pub error: Option<StageError>,
}

/// 房源详情获取器
///
/// 用发现到的查询参数逐个拉取房源详情。请求通过页面的
/// 网络上下文发出；操作名、房源标识和查询参数按目标API
/// 的约定同时出现在请求体和URL查询参数里。
pub struct HomeDetailFetcher {
    base_url: String,
    concurrency: usize,
}

impl HomeDetailFetcher {
    /// 创建详情获取器
    ///
    /// # 参数
    ///
    /// * `base_url` - 门户基础URL
    /// * `concurrency` - 同一会话上并发详情请求的上限
    pub fn new(base_url: impl Into<String>, concurrency: usize) -> Self {
        Self {
            base_url: base_url.into(),
            concurrency: concurrency.max(1),
        }
    }

    /// 单会话并发详情请求的上限
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// 获取单个房源的详情记录
    ///
    /// 任何传输或解码错误都收敛成一个带房源标识的失败，
    /// 便于定位。响应中缺失的白名单字段直接省略，不算错误。
    ///
    /// # 参数
    ///
    /// * `session` - 页面会话
    /// * `listing` - 候选房源引用
    /// * `query_id` - 已发现的查询参数
    pub async fn fetch_one(
        &self,
        session: &dyn PageSession,
        listing: &ListingRef,
        query_id: &QueryId,
    ) -> Result<HomeRecord, StageError> {
        let url = self.build_detail_url(&listing.zpid, query_id);
        let body = build_request_body(&listing.zpid, query_id);
        let outcome = session
            .evaluate(&build_detail_script(&url, &body))
            .await
            .map_err(|e| StageError::Detail {
                zpid: listing.zpid.clone(),
                reason: e.to_string(),
            })?;

        let property = outcome
            .pointer("/data/property")
            .filter(|v| !v.is_null())
            .ok_or_else(|| StageError::Detail {
                zpid: listing.zpid.clone(),
                reason: "response lacks data.property".to_string(),
            })?;

        debug!(zpid = %listing.zpid, "Home detail fetched");
        Ok(HomeRecord::from_property(listing.zpid.clone(), property))
    }

    /// 并发获取一批房源的详情
    ///
    /// 以 `concurrency` 为窗口并发拉取，产出顺序与输入顺序
    /// 一致。遇到首个失败即停止：失败之前的记录原样返回，
    /// 之后的（包括窗口内已完成的）全部丢弃，由重放补齐。
    pub async fn fetch_batch(
        &self,
        session: &dyn PageSession,
        listings: &[ListingRef],
        query_id: &QueryId,
    ) -> BatchOutcome {
        let fetches: Vec<_> = listings
            .iter()
            .map(|listing| self.fetch_one(session, listing, query_id))
            .collect();
        let mut results = futures::stream::iter(fetches).buffered(self.concurrency);

        let mut records = Vec::with_capacity(listings.len());
        while let Some(result) = results.next().await {
            match result {
                Ok(record) => records.push(record),
                Err(e) => {
                    return BatchOutcome {
                        records,
                        error: Some(e),
                    }
                }
            }
        }
        BatchOutcome {
            records,
            error: None,
        }
    }

    fn build_detail_url(&self, zpid: &str, query_id: &QueryId) -> String {
        format!(
            "{}/graphql/?zpid={}&queryId={}&operationName={}",
            self.base_url.trim_end_matches('/'),
            urlencoding::encode(zpid),
            urlencoding::encode(query_id.as_str()),
            DETAIL_OPERATION
        )
    }
}

/// 构造详情API的请求体
fn build_request_body(zpid: &str, query_id: &QueryId) -> Value {
    json!({
        "operationName": DETAIL_OPERATION,
        "variables": {
            "zpid": zpid,
            "contactFormRenderParameter": {
                "zpid": zpid,
                "platform": "desktop",
                "isDoubleScroll": true
            }
        },
        "queryId": query_id.as_str()
    })
}

/// 构造页面内发详情请求的脚本
fn build_detail_script(url: &str, body: &Value) -> String {
    let url_literal = Value::String(url.to_string()).to_string();
    let body_literal = Value::String(body.to_string()).to_string();
    format!(
        r#"(async () => {{
    const resp = await fetch({url_literal}, {{
        method: 'POST',
        body: {body_literal},
        headers: {GRAPHQL_HEADERS}
    }});
    return await resp.json();
}})()"#
    )
}

// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use homecrawl::config::settings::{
    BrowserSettings, CrawlSettings, DiscoverySettings, ExportSettings, MetricsSettings,
    PortalSettings, Settings, StorageSettings,
};
use homecrawl::crawl::detail::DETAIL_OPERATION;
use homecrawl::driver::traits::{DriverError, ObservedRequest, PageDriver, PageSession};

/// 脚本化的门户站点
///
/// 整个门户的可观测行为集中在这里：入口页内嵌的查询状态、
/// 搜索响应的候选列表、每个房源的详情载荷以及点击时发出的
/// 网络请求。各测试按需拼装自己的门户。
pub struct ScriptedPortal {
    /// 入口页内嵌的查询状态
    pub query_state: Value,
    /// 搜索响应返回的候选条目
    pub map_results: Mutex<Vec<Value>>,
    /// 搜索响应原文替换，设置后优先于候选条目
    pub search_override: Mutex<Option<Value>>,
    /// 按zpid索引的详情载荷
    pub properties: Mutex<HashMap<String, Value>>,
    /// 注入的详情失败：zpid -> 剩余失败次数
    pub detail_failures: Mutex<HashMap<String, u32>>,
    /// 还要报告挑战页的检查次数
    pub captcha_checks: AtomicUsize,
    /// 每次点击发出的请求脚本，按会话顺序消费
    pub click_scripts: Mutex<VecDeque<Vec<ObservedRequest>>>,
    /// 已创建的会话数
    pub sessions_created: AtomicUsize,
    /// 已关闭的会话数
    pub sessions_closed: AtomicUsize,
    /// 搜索调用次数
    pub search_calls: AtomicUsize,
    /// 详情调用过的zpid序列
    pub detail_calls: Mutex<Vec<String>>,
    /// 访问过的页面URL
    pub visited: Mutex<Vec<String>>,
}

impl ScriptedPortal {
    /// 创建门户，候选与详情载荷直接给定
    pub fn new(map_results: Vec<Value>, properties: Vec<(String, Value)>) -> Arc<Self> {
        Arc::new(Self {
            query_state: json!({
                "pagination": {},
                "mapBounds": {"west": -118.7, "east": -118.1, "south": 33.7, "north": 34.3},
                "filterState": {"sortSelection": {"value": "days"}}
            }),
            map_results: Mutex::new(map_results),
            search_override: Mutex::new(None),
            properties: Mutex::new(properties.into_iter().collect()),
            detail_failures: Mutex::new(HashMap::new()),
            captcha_checks: AtomicUsize::new(0),
            click_scripts: Mutex::new(VecDeque::from([vec![detail_request("abc123defg")]])),
            sessions_created: AtomicUsize::new(0),
            sessions_closed: AtomicUsize::new(0),
            search_calls: AtomicUsize::new(0),
            detail_calls: Mutex::new(Vec::new()),
            visited: Mutex::new(Vec::new()),
        })
    }

    /// 让之后的前 `count` 次挑战检查都报告挑战页
    pub fn present_captcha(&self, count: usize) {
        self.captcha_checks.store(count, Ordering::SeqCst);
    }

    /// 注入详情失败
    pub fn fail_detail(&self, zpid: &str, times: u32) {
        self.detail_failures.lock().insert(zpid.to_string(), times);
    }

    /// 替换点击脚本序列
    pub fn set_click_scripts(&self, scripts: Vec<Vec<ObservedRequest>>) {
        *self.click_scripts.lock() = scripts.into();
    }

    /// 替换搜索响应原文，用于模拟缺失候选集合等畸形响应
    pub fn override_search(&self, body: Value) {
        *self.search_override.lock() = Some(body);
    }

    fn serve_search(&self) -> Value {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(body) = self.search_override.lock().clone() {
            return body;
        }
        json!({
            "state": {
                "cat1": {
                    "searchResults": {
                        "mapResults": self.map_results.lock().clone()
                    }
                }
            }
        })
    }

    fn serve_detail(&self, zpid: &str) -> Result<Value, DriverError> {
        self.detail_calls.lock().push(zpid.to_string());

        let mut failures = self.detail_failures.lock();
        if let Some(remaining) = failures.get_mut(zpid) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(DriverError::Evaluation(format!(
                    "scripted failure for zpid {zpid}"
                )));
            }
        }
        drop(failures);

        let property = self.properties.lock().get(zpid).cloned();
        Ok(json!({ "data": { "property": property.unwrap_or(Value::Null) } }))
    }
}

/// 候选条目构造器
pub fn map_result(zpid: &str) -> Value {
    json!({"zpid": zpid, "statusType": "RECENTLY_SOLD"})
}

/// 缺少标识的候选条目
pub fn map_result_without_id() -> Value {
    json!({"statusType": "RECENTLY_SOLD"})
}

/// 详情载荷构造器
pub fn property(zpid: &str, price: f64, date_posted: Option<i64>) -> Value {
    let mut value = json!({
        "zpid": zpid,
        "price": price,
        "bedrooms": 3.0,
        "bathrooms": 2.0,
        "homeType": "SINGLE_FAMILY",
        "currency": "USD",
        "address": {"city": "Los Angeles", "state": "CA"}
    });
    if let Some(millis) = date_posted {
        value["datePosted"] = json!(millis);
    }
    value
}

/// 构造与详情操作名匹配的观测请求
pub fn detail_request(query_id: &str) -> ObservedRequest {
    ObservedRequest {
        url: "https://portal.test/graphql/".to_string(),
        post_body: Some(json!({"operationName": DETAIL_OPERATION, "queryId": query_id}).to_string()),
    }
}

/// 操作名不匹配的观测请求
pub fn unrelated_request(operation: &str) -> ObservedRequest {
    ObservedRequest {
        url: "https://portal.test/graphql/".to_string(),
        post_body: Some(json!({"operationName": operation, "queryId": "zzz"}).to_string()),
    }
}

/// 面向脚本化门户的页面驱动
pub struct ScriptedDriver {
    portal: Arc<ScriptedPortal>,
}

impl ScriptedDriver {
    pub fn new(portal: Arc<ScriptedPortal>) -> Self {
        Self { portal }
    }
}

#[async_trait]
impl PageDriver for ScriptedDriver {
    async fn new_session(&self) -> Result<Box<dyn PageSession>, DriverError> {
        self.portal.sessions_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            portal: self.portal.clone(),
            observer: Mutex::new(None),
        }))
    }
}

/// 脚本化的页面会话
///
/// 按执行脚本的内容识别流水线阶段：入口页数据块读取、
/// 搜索调用和详情调用各有稳定的特征片段。
pub struct ScriptedSession {
    portal: Arc<ScriptedPortal>,
    observer: Mutex<Option<mpsc::Sender<ObservedRequest>>>,
}

fn zpid_from_script(script: &str) -> Option<String> {
    let start = script.find("zpid=")? + "zpid=".len();
    let rest = &script[start..];
    let end = rest.find('&').unwrap_or(rest.len());
    Some(rest[..end].to_string())
}

#[async_trait]
impl PageSession for ScriptedSession {
    async fn goto(&self, url: &str) -> Result<(), DriverError> {
        self.portal.visited.lock().push(url.to_string());
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, DriverError> {
        if expression.contains("data-zrr-shared-data-key") {
            let frame = format!("<!--{}-->", json!({ "queryState": self.portal.query_state }));
            return Ok(Value::String(frame));
        }
        if expression.contains("GetSearchPageState.htm") {
            return Ok(self.portal.serve_search());
        }
        if expression.contains("/graphql/?zpid=") {
            let zpid = zpid_from_script(expression)
                .ok_or_else(|| DriverError::Evaluation("detail script without zpid".to_string()))?;
            return self.portal.serve_detail(&zpid);
        }
        Ok(Value::Null)
    }

    async fn click(&self, _selector: &str) -> Result<(), DriverError> {
        let script = self.portal.click_scripts.lock().pop_front();
        let observer = self.observer.lock().clone();
        if let (Some(requests), Some(tx)) = (script, observer) {
            for request in requests {
                let _ = tx.send(request).await;
            }
        }
        Ok(())
    }

    async fn has_element(&self, selector: &str) -> Result<bool, DriverError> {
        if selector == ".captcha-container" {
            let remaining = self.portal.captcha_checks.load(Ordering::SeqCst);
            if remaining > 0 {
                self.portal
                    .captcha_checks
                    .store(remaining - 1, Ordering::SeqCst);
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn content(&self) -> Result<String, DriverError> {
        Ok("<html><body>scripted portal page</body></html>".to_string())
    }

    async fn observe_requests(&self) -> Result<mpsc::Receiver<ObservedRequest>, DriverError> {
        let (tx, rx) = mpsc::channel(16);
        *self.observer.lock() = Some(tx);
        Ok(rx)
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.portal.sessions_closed.fetch_add(1, Ordering::SeqCst);
        *self.observer.lock() = None;
        Ok(())
    }
}

fn memory_storage() -> StorageSettings {
    StorageSettings {
        storage_type: "memory".to_string(),
        local_path: None,
        s3_region: None,
        s3_bucket: None,
        s3_access_key: None,
        s3_secret_key: None,
        s3_endpoint: None,
    }
}

/// 快速时序的测试配置
///
/// 人机验证冷却归零，发现尝试预算收紧到秒级
pub fn test_settings(search: Option<&str>, zipcodes: &[&str]) -> Settings {
    Settings {
        crawl: CrawlSettings {
            search: search.map(str::to_string),
            zipcodes: zipcodes.iter().map(|z| z.to_string()).collect(),
            min_date: None,
            max_items: None,
            results_per_search: 500,
            max_retries: 3,
            workers: 1,
            detail_concurrency: 2,
            task_timeout_secs: 30,
            captcha_cooldown_secs: 0,
        },
        portal: PortalSettings {
            base_url: "https://portal.test".to_string(),
            discovery_path: "/los-angeles-ca/".to_string(),
        },
        discovery: DiscoverySettings {
            max_attempts: 3,
            attempt_timeout_secs: 1,
        },
        browser: BrowserSettings {
            headless: true,
            remote_debugging_url: None,
            nav_timeout_secs: 5,
        },
        storage: memory_storage(),
        export: ExportSettings {
            enabled: false,
            storage: memory_storage(),
        },
        metrics: MetricsSettings {
            enabled: false,
            listen_addr: "0.0.0.0:9000".to_string(),
        },
    }
}

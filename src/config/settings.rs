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

use chrono::{DateTime, NaiveDate};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;
use validator::Validate;

/// 应用程序配置设置
///
/// 包含爬取、门户、参数发现、浏览器、存储和指标等所有配置项
#[derive(Debug, Deserialize, Validate)]
pub struct Settings {
    /// 爬取配置
    #[validate(nested)]
    pub crawl: CrawlSettings,
    /// 门户站点配置
    #[validate(nested)]
    pub portal: PortalSettings,
    /// 查询参数发现配置
    #[validate(nested)]
    pub discovery: DiscoverySettings,
    /// 浏览器配置
    pub browser: BrowserSettings,
    /// 存储配置
    pub storage: StorageSettings,
    /// 批量导出配置
    pub export: ExportSettings,
    /// 指标配置
    pub metrics: MetricsSettings,
}

/// 爬取配置设置
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CrawlSettings {
    /// 搜索词种子（如 "Los Angeles, CA"），可选
    pub search: Option<String>,
    /// 邮编种子列表
    pub zipcodes: Vec<String>,
    /// 发布日期下限，epoch 毫秒或日期字符串；发布时间不晚于它的房源不会输出
    pub min_date: Option<String>,
    /// 提取数量上限，达到后干净停机
    pub max_items: Option<u64>,
    /// 单次搜索处理的候选数量上限
    #[validate(range(min = 1, max = 10000))]
    pub results_per_search: usize,
    /// 单个任务的最大重试次数
    #[validate(range(min = 0, max = 100))]
    pub max_retries: u32,
    /// 并行工作器数量
    #[validate(range(min = 1, max = 64))]
    pub workers: usize,
    /// 单个任务内详情请求的并发度
    #[validate(range(min = 1, max = 16))]
    pub detail_concurrency: usize,
    /// 单个任务的处理时间预算（秒）
    #[validate(range(min = 1))]
    pub task_timeout_secs: u64,
    /// 人机验证后的固定冷却时间（秒）
    pub captcha_cooldown_secs: u64,
}

impl CrawlSettings {
    /// 任务处理时间预算
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    /// 人机验证冷却时间
    pub fn captcha_cooldown(&self) -> Duration {
        Duration::from_secs(self.captcha_cooldown_secs)
    }

    /// 解析发布日期下限为 epoch 毫秒
    ///
    /// 接受纯数字（epoch 毫秒）、RFC 3339 时间戳或 `YYYY-MM-DD` 日期；
    /// 无法解析时返回 None
    pub fn min_date_millis(&self) -> Option<i64> {
        let raw = self.min_date.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        if let Ok(millis) = raw.parse::<i64>() {
            return Some(millis);
        }
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.timestamp_millis());
        }
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis());
        }
        None
    }
}

/// 门户站点配置设置
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PortalSettings {
    /// 门户站点根地址
    #[validate(url)]
    pub base_url: String,
    /// 参数发现使用的房源列表页路径
    pub discovery_path: String,
}

/// 查询参数发现配置设置
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DiscoverySettings {
    /// 发现尝试次数上限
    #[validate(range(min = 1, max = 1000))]
    pub max_attempts: u32,
    /// 单次发现尝试的时间预算（秒）
    #[validate(range(min = 1))]
    pub attempt_timeout_secs: u64,
}

impl DiscoverySettings {
    /// 单次发现尝试的时间预算
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }
}

/// 浏览器配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserSettings {
    /// 是否无头模式运行
    pub headless: bool,
    /// 远程调试地址（设置后连接已有 Chrome 实例而非本地启动）
    pub remote_debugging_url: Option<String>,
    /// 页面导航超时时间（秒）
    pub nav_timeout_secs: u64,
}

impl BrowserSettings {
    /// 页面导航超时时间
    pub fn nav_timeout(&self) -> Duration {
        Duration::from_secs(self.nav_timeout_secs)
    }
}

/// 存储配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// 存储类型 (local, s3, memory)
    pub storage_type: String,
    /// 本地存储路径 (当 type=local 时使用)
    pub local_path: Option<String>,
    /// S3 区域
    pub s3_region: Option<String>,
    /// S3 存储桶名称
    pub s3_bucket: Option<String>,
    /// S3 访问密钥
    pub s3_access_key: Option<String>,
    /// S3 密钥
    pub s3_secret_key: Option<String>,
    /// S3 端点 (可选，用于 MinIO 等兼容服务)
    pub s3_endpoint: Option<String>,
}

/// 批量导出配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct ExportSettings {
    /// 是否启用批量导出
    pub enabled: bool,
    /// 导出目标存储
    pub storage: StorageSettings,
}

/// 指标配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSettings {
    /// 是否启用 Prometheus 指标导出
    pub enabled: bool,
    /// 指标监听地址
    pub listen_addr: String,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 从默认值、配置文件和环境变量依次加载配置并校验
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载或校验失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Config::builder()
            // Default crawl settings
            .set_default("crawl.search", None::<String>)?
            .set_default("crawl.zipcodes", Vec::<String>::new())?
            .set_default("crawl.min_date", None::<String>)?
            .set_default("crawl.max_items", None::<u64>)?
            .set_default("crawl.results_per_search", 500)?
            .set_default("crawl.max_retries", 10)?
            .set_default("crawl.workers", 2)?
            .set_default("crawl.detail_concurrency", 4)?
            .set_default("crawl.task_timeout_secs", 600)?
            .set_default("crawl.captcha_cooldown_secs", 60)?
            // Default portal settings
            .set_default("portal.base_url", "https://www.zillow.com")?
            .set_default("portal.discovery_path", "/los-angeles-ca/")?
            // Default discovery settings
            .set_default("discovery.max_attempts", 100)?
            .set_default("discovery.attempt_timeout_secs", 50)?
            // Default browser settings
            .set_default("browser.headless", true)?
            .set_default("browser.remote_debugging_url", None::<String>)?
            .set_default("browser.nav_timeout_secs", 30)?
            // Default storage settings
            .set_default("storage.storage_type", "local")?
            .set_default("storage.local_path", "./storage")?
            // Default export settings
            .set_default("export.enabled", false)?
            .set_default("export.storage.storage_type", "local")?
            .set_default("export.storage.local_path", "./export")?
            // Default metrics settings
            .set_default("metrics.enabled", false)?
            .set_default("metrics.listen_addr", "0.0.0.0:9000")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("HOMECRAWL").separator("__"));

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        Ok(settings)
    }
}

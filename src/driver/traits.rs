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

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

/// 驱动错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 会话启动失败
    #[error("Session launch failed: {0}")]
    Launch(String),
    /// 页面导航失败
    #[error("Navigation failed: {0}")]
    Navigation(String),
    /// 脚本执行失败
    #[error("Evaluation failed: {0}")]
    Evaluation(String),
    /// 页面交互失败
    #[error("Interaction failed: {0}")]
    Interaction(String),
    /// 协议通信失败
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// 超时
    #[error("Timeout")]
    Timeout,
}

/// 被观测到的页面请求
///
/// 会话在开启请求观测后，页面发出的每个网络请求
/// 都会以该结构投递给观测方。
#[derive(Debug, Clone)]
pub struct ObservedRequest {
    /// 请求URL
    pub url: String,
    /// POST请求体，GET请求为None
    pub post_body: Option<String>,
}

/// 页面会话特质
///
/// 一个会话对应一个独立的浏览器上下文。流水线各阶段
/// 共享同一个会话的页面环境，使页面内脚本发出的请求
/// 携带入口页建立的会话凭证。
#[async_trait]
pub trait PageSession: Send + Sync {
    /// 导航到指定URL并等待页面加载完成
    async fn goto(&self, url: &str) -> Result<(), DriverError>;

    /// 在页面上下文执行脚本并返回其结果
    ///
    /// 表达式返回Promise时等待其落定；未定义的结果折叠为null
    async fn evaluate(&self, expression: &str) -> Result<Value, DriverError>;

    /// 点击匹配选择器的第一个元素
    async fn click(&self, selector: &str) -> Result<(), DriverError>;

    /// 检查页面中是否存在匹配选择器的元素
    async fn has_element(&self, selector: &str) -> Result<bool, DriverError>;

    /// 获取当前页面的HTML内容
    async fn content(&self) -> Result<String, DriverError>;

    /// 开始观测页面发出的网络请求
    async fn observe_requests(&self) -> Result<mpsc::Receiver<ObservedRequest>, DriverError>;

    /// 关闭会话并释放浏览器资源
    async fn close(&mut self) -> Result<(), DriverError>;
}

/// 页面驱动特质
///
/// 负责创建页面会话。每个任务使用独立的新会话，
/// 任务结束后会话被关闭，避免跨任务的状态污染。
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// 创建一个新的页面会话
    async fn new_session(&self) -> Result<Box<dyn PageSession>, DriverError>;
}

#[async_trait]
impl<T: PageDriver + ?Sized> PageDriver for std::sync::Arc<T> {
    async fn new_session(&self) -> Result<Box<dyn PageSession>, DriverError> {
        (**self).new_session().await
    }
}

// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::EventRequestWillBeSent;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info};

use super::traits::{DriverError, ObservedRequest, PageDriver, PageSession};
use crate::config::settings::BrowserSettings;

/// CDP命令超时，需覆盖页面内长时间运行的Promise求值
const CDP_REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

/// 请求观测通道容量
const OBSERVED_REQUEST_BUFFER: usize = 256;

/// Chromium页面驱动
///
/// 基于CDP协议驱动Chromium浏览器。每次创建会话都会启动
/// 一个全新的浏览器进程（或连接到配置的远程调试端点），
/// 会话关闭时进程一并回收。
pub struct ChromiumDriver {
    settings: BrowserSettings,
}

impl ChromiumDriver {
    /// 创建Chromium驱动
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }

    fn browser_config(&self) -> Result<BrowserConfig, DriverError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(1920, 1080)
            .request_timeout(CDP_REQUEST_TIMEOUT)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage");
        if !self.settings.headless {
            builder = builder.with_head();
        }
        builder.build().map_err(DriverError::Launch)
    }
}

#[async_trait]
impl PageDriver for ChromiumDriver {
    async fn new_session(&self) -> Result<Box<dyn PageSession>, DriverError> {
        let (browser, mut handler, owned) = match &self.settings.remote_debugging_url {
            Some(endpoint) => {
                info!(endpoint = %endpoint, "Connecting to remote browser");
                let (browser, handler) = Browser::connect(endpoint.clone())
                    .await
                    .map_err(|e| DriverError::Launch(e.to_string()))?;
                (browser, handler, false)
            }
            None => {
                debug!("Launching browser process");
                let (browser, handler) = Browser::launch(self.browser_config()?)
                    .await
                    .map_err(|e| DriverError::Launch(e.to_string()))?;
                (browser, handler, true)
            }
        };

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        Ok(Box::new(ChromiumSession {
            browser,
            page,
            handler_task,
            nav_timeout: self.settings.nav_timeout(),
            owned,
        }))
    }
}

/// Chromium页面会话
///
/// 持有浏览器连接和单个页面。所有阶段都在这一个页面上
/// 执行，使页面环境中积累的会话凭证在阶段间延续。
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
    nav_timeout: Duration,
    /// 浏览器进程是否归本会话所有，远程连接模式下为false
    owned: bool,
}

#[async_trait]
impl PageSession for ChromiumSession {
    async fn goto(&self, url: &str) -> Result<(), DriverError> {
        let navigate = async {
            self.page
                .goto(url)
                .await
                .map_err(|e| DriverError::Navigation(e.to_string()))?;
            self.page
                .wait_for_navigation()
                .await
                .map_err(|e| DriverError::Navigation(e.to_string()))?;
            Ok(())
        };
        timeout(self.nav_timeout, navigate)
            .await
            .map_err(|_| DriverError::Timeout)?
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, DriverError> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(DriverError::Evaluation)?;
        let result = self
            .page
            .evaluate(params)
            .await
            .map_err(|e| DriverError::Evaluation(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn click(&self, selector: &str) -> Result<(), DriverError> {
        self.page
            .find_element(selector)
            .await
            .map_err(|e| DriverError::Interaction(e.to_string()))?
            .click()
            .await
            .map_err(|e| DriverError::Interaction(e.to_string()))?;
        Ok(())
    }

    async fn has_element(&self, selector: &str) -> Result<bool, DriverError> {
        Ok(self.page.find_element(selector).await.is_ok())
    }

    async fn content(&self) -> Result<String, DriverError> {
        self.page
            .content()
            .await
            .map_err(|e| DriverError::Protocol(e.to_string()))
    }

    async fn observe_requests(&self) -> Result<mpsc::Receiver<ObservedRequest>, DriverError> {
        let mut events = self
            .page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(|e| DriverError::Protocol(e.to_string()))?;

        let (tx, rx) = mpsc::channel(OBSERVED_REQUEST_BUFFER);
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let observed = ObservedRequest {
                    url: event.request.url.clone(),
                    post_body: event.request.post_data.clone(),
                };
                if tx.send(observed).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        if self.owned {
            if let Err(error) = self.browser.close().await {
                debug!(error = %error, "Browser close failed, killing process");
                let _ = self.browser.kill().await;
            }
            let _ = self.browser.wait().await;
        } else {
            // 远程浏览器不归本会话所有，只关闭自己的页面
            let _ = self.page.clone().close().await;
        }
        self.handler_task.abort();
        Ok(())
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

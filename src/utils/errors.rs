// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use thiserror::Error;

use crate::domain::repositories::object_store::StorageError;
use crate::driver::traits::DriverError;
use crate::infrastructure::state_store::StateError;
use crate::queue::task_queue::QueueError;

/// 阶段错误类型
///
/// 爬取流水线各阶段可能产生的错误。阶段失败只会让当前任务
/// 重新入队或终止，不会让整个运行失败。
#[derive(Error, Debug)]
pub enum StageError {
    /// 页面出现人机验证
    #[error("检测到人机验证")]
    CaptchaDetected,

    /// 查询状态提取失败
    #[error("查询状态提取失败: {0}")]
    Extraction(String),

    /// 搜索结果获取失败
    #[error("搜索结果获取失败: {0}")]
    Search(String),

    /// 房源详情获取失败
    #[error("房源详情获取失败 (zpid={zpid}): {reason}")]
    Detail { zpid: String, reason: String },

    /// 查询参数发现失败
    #[error("查询参数发现失败: {0}")]
    Discovery(String),

    /// 浏览器驱动错误
    #[error("浏览器驱动错误: {0}")]
    Driver(#[from] DriverError),

    /// 任务处理超时
    #[error("任务处理超时")]
    TimedOut,

    /// 状态存储错误
    #[error("状态存储错误: {0}")]
    State(#[from] StateError),

    /// 数据输出错误
    #[error("数据输出错误: {0}")]
    Sink(String),
}

impl StageError {
    /// 判断错误是否可通过任务重试恢复
    ///
    /// # 返回值
    ///
    /// 参数发现失败不可重试（发现预算由发现器自身管理），
    /// 其余阶段错误均可通过重新入队恢复
    pub fn is_retryable(&self) -> bool {
        !matches!(self, StageError::Discovery(_))
    }

    /// 判断是否为人机验证错误
    ///
    /// 人机验证走固定冷却时间而非指数退避
    pub fn is_captcha(&self) -> bool {
        matches!(self, StageError::CaptchaDetected)
    }
}

/// 运行级错误类型
///
/// 只有无法继续运行的条件才会产生运行级错误，
/// 单个任务的失败不在此列。
#[derive(Error, Debug)]
pub enum RunError {
    /// 未配置种子输入
    #[error("未配置任何种子输入")]
    NoSeeds,

    /// 配置无效
    #[error("配置无效: {0}")]
    InvalidConfig(String),

    /// 查询参数发现预算耗尽
    #[error("查询参数发现失败，已尝试 {attempts} 次")]
    DiscoveryExhausted { attempts: u32 },

    /// 存储错误
    #[error("存储错误: {0}")]
    Storage(#[from] StorageError),

    /// 状态存储错误
    #[error("状态存储错误: {0}")]
    State(#[from] StateError),

    /// 队列错误
    #[error("队列错误: {0}")]
    Queue(#[from] QueueError),
}

// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use super::query_state::QueryState;
use super::seed::Seed;

/// 抓取任务实体
///
/// 表示一个种子的完整抓取流程：搜索、翻页、详情提取。
/// 任务具有状态、重试机制和断点续传位置，失败重试时
/// 从上次成功的分块位置继续而不重复已完成的部分。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlTask {
    /// 任务唯一标识符
    pub id: Uuid,
    /// 任务对应的种子
    pub seed: Seed,
    /// 种子对应的搜索入口URL
    pub url: String,
    /// 任务状态，跟踪任务在其生命周期中的当前阶段
    pub status: TaskStatus,
    /// 断点续传位置，重试时跳过此位置之前的详情分块
    pub resume_index: usize,
    /// 已尝试次数，记录任务已经尝试执行的次数
    pub attempt_count: u32,
    /// 最大重试次数，任务失败时的最大重试限制
    pub max_retries: u32,
    /// 搜索查询状态，首次执行时从入口页提取后缓存在任务上
    pub query_state: Option<QueryState>,
    /// 计划执行时间，退避重试时的延迟执行时间
    pub scheduled_at: Option<DateTime<Utc>>,
    /// 创建时间，任务创建的时间戳
    pub created_at: DateTime<Utc>,
    /// 开始执行时间，任务开始处理的时间戳
    pub started_at: Option<DateTime<Utc>>,
    /// 完成时间，任务处理结束的时间戳
    pub completed_at: Option<DateTime<Utc>>,
}

/// 任务状态枚举
///
/// 表示任务在其生命周期中的不同状态，用于跟踪任务的执行进度。
/// 状态转换遵循以下流程：
/// Pending → Running → Completed/Retry/Terminal，Retry → Running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// 待执行，任务已创建但尚未开始执行
    #[default]
    Pending,
    /// 执行中，任务正在被某个工作器处理
    Running,
    /// 已完成，任务成功执行完成
    Completed,
    /// 待重试，任务执行失败并等待退避后重新执行
    Retry,
    /// 终态失败，任务重试耗尽或遇到不可重试的错误
    Terminal,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Retry => write!(f, "retry"),
            TaskStatus::Terminal => write!(f, "terminal"),
        }
    }
}

impl FromStr for TaskStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "retry" => Ok(TaskStatus::Retry),
            "terminal" => Ok(TaskStatus::Terminal),
            _ => Err(()),
        }
    }
}

/// 领域错误类型
///
/// 表示在领域层可能发生的各种错误情况，包括状态转换错误
/// 和验证失败。
#[derive(Error, Debug)]
pub enum DomainError {
    /// 无效的状态转换，当任务状态转换不符合业务规则时发生
    #[error("Invalid state transition")]
    InvalidStateTransition,

    /// 验证错误，当输入数据不符合领域规则时发生
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl CrawlTask {
    /// 创建一个新的抓取任务
    ///
    /// # 参数
    ///
    /// * `seed` - 任务对应的种子
    /// * `url` - 种子对应的搜索入口URL
    /// * `max_retries` - 最大重试次数
    ///
    /// # 返回值
    ///
    /// 返回新创建的任务实例
    pub fn new(seed: Seed, url: String, max_retries: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            seed,
            url,
            status: TaskStatus::Pending,
            resume_index: 0,
            attempt_count: 0,
            max_retries,
            query_state: None,
            scheduled_at: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// 启动任务
    ///
    /// 将任务状态从Pending或Retry变更为Running
    ///
    /// # 返回值
    ///
    /// * `Ok(CrawlTask)` - 成功启动的任务
    /// * `Err(DomainError)` - 状态转换失败
    pub fn start(mut self) -> Result<Self, DomainError> {
        match self.status {
            TaskStatus::Pending | TaskStatus::Retry => {
                self.status = TaskStatus::Running;
                self.started_at = Some(Utc::now());
                Ok(self)
            }
            _ => Err(DomainError::InvalidStateTransition),
        }
    }

    /// 完成任务
    ///
    /// 将任务状态从Running变更为Completed
    ///
    /// # 返回值
    ///
    /// * `Ok(CrawlTask)` - 成功完成的任务
    /// * `Err(DomainError)` - 状态转换失败
    pub fn complete(mut self) -> Result<Self, DomainError> {
        match self.status {
            TaskStatus::Running => {
                self.status = TaskStatus::Completed;
                self.completed_at = Some(Utc::now());
                Ok(self)
            }
            _ => Err(DomainError::InvalidStateTransition),
        }
    }

    /// 安排任务重试
    ///
    /// 将任务状态从Running变更为Retry，累计尝试次数并记录
    /// 断点位置。断点位置只前进不后退，保证重试不会重做
    /// 已经持久化过的分块。
    ///
    /// # 参数
    ///
    /// * `scheduled_at` - 退避后的计划执行时间
    /// * `resume_index` - 本次执行推进到的分块位置
    ///
    /// # 返回值
    ///
    /// * `Ok(CrawlTask)` - 已安排重试的任务
    /// * `Err(DomainError)` - 状态转换失败
    pub fn retry(
        mut self,
        scheduled_at: DateTime<Utc>,
        resume_index: usize,
    ) -> Result<Self, DomainError> {
        match self.status {
            TaskStatus::Running => {
                self.status = TaskStatus::Retry;
                self.attempt_count += 1;
                self.resume_index = self.resume_index.max(resume_index);
                self.scheduled_at = Some(scheduled_at);
                Ok(self)
            }
            _ => Err(DomainError::InvalidStateTransition),
        }
    }

    /// 标记任务终态失败
    ///
    /// 将任务状态从Running变更为Terminal
    ///
    /// # 返回值
    ///
    /// * `Ok(CrawlTask)` - 终态失败的任务
    /// * `Err(DomainError)` - 状态转换失败
    pub fn terminal(mut self) -> Result<Self, DomainError> {
        match self.status {
            TaskStatus::Running => {
                self.status = TaskStatus::Terminal;
                self.completed_at = Some(Utc::now());
                Ok(self)
            }
            _ => Err(DomainError::InvalidStateTransition),
        }
    }

    /// 判断任务是否可以重试
    ///
    /// # 返回值
    ///
    /// 如果任务未达到最大重试次数则返回true，否则返回false
    pub fn can_retry(&self) -> bool {
        self.attempt_count < self.max_retries
    }

    /// 判断任务是否到达计划执行时间
    ///
    /// 没有计划时间的任务立即可执行
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at.map_or(true, |at| at <= now)
    }
}
